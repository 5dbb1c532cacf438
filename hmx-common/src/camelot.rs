//! Camelot wheel notation
//!
//! The wheel places the 24 major/minor keys on 12 numbered positions.
//! Letter `A` marks the minor key at a position, `B` the major key.
//! Keys one step apart on the same ring, or on the same number across
//! rings, mix without a harmonic clash.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Key names per wheel number (index = number - 1): (minor/A, major/B)
const WHEEL: [(&str, &str); 12] = [
    ("Abm", "B"),
    ("Ebm", "F#"),
    ("Bbm", "Db"),
    ("Fm", "Ab"),
    ("Cm", "Eb"),
    ("Gm", "Bb"),
    ("Dm", "F"),
    ("Am", "C"),
    ("Em", "G"),
    ("Bm", "D"),
    ("F#m", "A"),
    ("Dbm", "E"),
];

/// Pitch class of the tonic at wheel position 1, per mode
const MINOR_ROOT_PITCH: u8 = 8; // Ab
const MAJOR_ROOT_PITCH: u8 = 11; // B

/// Musical mode of a key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyType {
    Major,
    Minor,
}

impl KeyType {
    /// Camelot ring letter for this mode
    pub fn letter(self) -> char {
        match self {
            KeyType::Minor => 'A',
            KeyType::Major => 'B',
        }
    }

    fn other(self) -> Self {
        match self {
            KeyType::Minor => KeyType::Major,
            KeyType::Major => KeyType::Minor,
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyType::Major => write!(f, "major"),
            KeyType::Minor => write!(f, "minor"),
        }
    }
}

/// A position on the Camelot wheel, e.g. `8A` (A minor)
///
/// Serialized as its code string (`"8A"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CamelotKey {
    number: u8,
    mode: KeyType,
}

impl CamelotKey {
    /// Create a wheel position; `number` must be in 1..=12
    pub fn new(number: u8, mode: KeyType) -> Option<Self> {
        (1..=12).contains(&number).then_some(Self { number, mode })
    }

    pub fn number(self) -> u8 {
        self.number
    }

    pub fn mode(self) -> KeyType {
        self.mode
    }

    /// Musical key name for this position, e.g. "Am" or "F#"
    pub fn key_name(self) -> &'static str {
        let (minor, major) = WHEEL[usize::from(self.number - 1)];
        match self.mode {
            KeyType::Minor => minor,
            KeyType::Major => major,
        }
    }

    /// Position `delta` steps around the same ring (wraps 12 -> 1)
    pub fn step(self, delta: i8) -> Self {
        let zero_based = i16::from(self.number) - 1 + i16::from(delta);
        let number = zero_based.rem_euclid(12) as u8 + 1;
        Self { number, mode: self.mode }
    }

    /// Relative major/minor at the same number
    pub fn relative(self) -> Self {
        Self { number: self.number, mode: self.mode.other() }
    }

    /// Self, one step up, one step down, and the relative key, in that order
    pub fn compatible_keys(self) -> Vec<CamelotKey> {
        vec![self, self.step(1), self.step(-1), self.relative()]
    }

    pub fn is_compatible_with(self, other: CamelotKey) -> bool {
        self.compatible_keys().contains(&other)
    }

    /// Look up the wheel position of a musical key name
    ///
    /// Accepts "Am", "A minor", "Amin", "C", "C major", "Cmaj" and enharmonic
    /// spellings ("G#m" and "Abm" are both 1A).
    pub fn from_key_name(name: &str) -> Option<Self> {
        let compact: String = name.split_whitespace().collect();
        let lower = compact.to_ascii_lowercase();

        let (root, mode) = if let Some(stripped) = strip_suffix_len(&lower, &["minor", "min"]) {
            (&compact[..stripped], KeyType::Minor)
        } else if let Some(stripped) = strip_suffix_len(&lower, &["major", "maj"]) {
            (&compact[..stripped], KeyType::Major)
        } else if compact.len() > 1 && compact.ends_with('m') {
            (&compact[..compact.len() - 1], KeyType::Minor)
        } else {
            (compact.as_str(), KeyType::Major)
        };

        let pitch = pitch_class(root)?;
        let base = match mode {
            KeyType::Minor => MINOR_ROOT_PITCH,
            KeyType::Major => MAJOR_ROOT_PITCH,
        };
        // Each wheel step is a fifth (7 semitones); 7 is its own inverse mod 12.
        let offset = (pitch + 12 - base) % 12;
        let number = (offset * 7) % 12 + 1;
        Some(Self { number, mode })
    }
}

fn strip_suffix_len(lower: &str, suffixes: &[&str]) -> Option<usize> {
    suffixes
        .iter()
        .find(|suffix| lower.len() > suffix.len() && lower.ends_with(*suffix))
        .map(|suffix| lower.len() - suffix.len())
}

fn pitch_class(root: &str) -> Option<u8> {
    let mut chars = root.chars();
    let natural = match chars.next()?.to_ascii_uppercase() {
        'C' => 0,
        'D' => 2,
        'E' => 4,
        'F' => 5,
        'G' => 7,
        'A' => 9,
        'B' => 11,
        _ => return None,
    };
    let pitch = match chars.next() {
        None => natural,
        Some('#') | Some('♯') => (natural + 1) % 12,
        Some('b') | Some('♭') => (natural + 11) % 12,
        Some(_) => return None,
    };
    chars.next().is_none().then_some(pitch)
}

impl fmt::Display for CamelotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.number, self.mode.letter())
    }
}

impl FromStr for CamelotKey {
    type Err = Error;

    fn from_str(code: &str) -> Result<Self> {
        let code = code.trim();
        let invalid = || Error::InvalidInput(format!("Invalid Camelot code: {:?}", code));

        let letter = code.chars().last().ok_or_else(invalid)?;
        let mode = match letter.to_ascii_uppercase() {
            'A' => KeyType::Minor,
            'B' => KeyType::Major,
            _ => return Err(invalid()),
        };
        let number: u8 = code[..code.len() - letter.len_utf8()]
            .parse()
            .map_err(|_| invalid())?;

        CamelotKey::new(number, mode).ok_or_else(invalid)
    }
}

impl TryFrom<String> for CamelotKey {
    type Error = Error;

    fn try_from(code: String) -> Result<Self> {
        code.parse()
    }
}

impl From<CamelotKey> for String {
    fn from(key: CamelotKey) -> Self {
        key.to_string()
    }
}

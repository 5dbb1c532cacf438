//! Analysis result data model
//!
//! `AnalysisResult` is the shape produced by an analysis provider, cached by
//! the request coordinator and consumed by the harmonic scorer. The Camelot
//! position is stored once; the key name, mode and compatible keys are derived
//! from it so they can never disagree.
//!
//! On the wire (provider responses, cache files, CLI output) the result uses
//! `AnalysisPayload`: camelCase JSON that still carries the derived fields.
//! Incoming payloads are validated against the wheel before they become an
//! `AnalysisResult`.

use crate::camelot::{CamelotKey, KeyType};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};

/// Plausible tempo range in beats per minute
pub const BPM_RANGE: std::ops::RangeInclusive<u16> = 40..=250;

/// Energy assumed when a provider omits it
pub const DEFAULT_ENERGY: f64 = 0.5;

/// Tempo, key and energy analysis for a single track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "AnalysisPayload", try_from = "AnalysisPayload")]
pub struct AnalysisResult {
    /// Identifier of the analyzed input (URL or content hash)
    pub source_identifier: String,
    /// Tempo in beats per minute
    pub bpm: u16,
    /// Wheel position; determines key name, mode and compatible keys
    pub camelot: CamelotKey,
    pub energy: f64,
    pub danceability: f64,
    pub valence: f64,
    pub tempo_stability: f64,
    pub confidence: f64,
    /// Integrated loudness in dB (negative)
    pub loudness: f64,
    /// Track length in seconds
    pub duration_secs: u32,
    pub analyzed_at: DateTime<Utc>,
}

impl AnalysisResult {
    /// Result with neutral feature values, mainly for tests and fixtures
    pub fn new(source_identifier: impl Into<String>, bpm: u16, camelot: CamelotKey) -> Self {
        Self {
            source_identifier: source_identifier.into(),
            bpm,
            camelot,
            energy: DEFAULT_ENERGY,
            danceability: 0.5,
            valence: 0.5,
            tempo_stability: 1.0,
            confidence: 0.0,
            loudness: -10.0,
            duration_secs: 0,
            analyzed_at: Utc::now(),
        }
    }

    pub fn with_energy(mut self, energy: f64) -> Self {
        self.energy = energy.clamp(0.0, 1.0);
        self
    }

    pub fn with_loudness(mut self, loudness: f64) -> Self {
        self.loudness = loudness;
        self
    }

    /// Musical key name, e.g. "Am"
    pub fn key(&self) -> &'static str {
        self.camelot.key_name()
    }

    pub fn key_type(&self) -> KeyType {
        self.camelot.mode()
    }

    pub fn compatible_keys(&self) -> Vec<CamelotKey> {
        self.camelot.compatible_keys()
    }
}

/// JSON wire form of an `AnalysisResult`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisPayload {
    #[serde(default)]
    pub source_identifier: String,
    #[serde(serialize_with = "serialize_whole_number")]
    pub bpm: f64,
    #[serde(default)]
    pub key: Option<String>,
    pub camelot: String,
    #[serde(default)]
    pub key_type: Option<KeyType>,
    #[serde(default = "default_energy")]
    pub energy: f64,
    #[serde(default = "default_half")]
    pub danceability: f64,
    #[serde(default = "default_half")]
    pub valence: f64,
    #[serde(default = "default_stability")]
    pub tempo_stability: f64,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default = "default_loudness")]
    pub loudness: f64,
    #[serde(default)]
    pub duration: u32,
    #[serde(default)]
    pub compatible_keys: Vec<String>,
    #[serde(default)]
    pub analyzed_at: Option<DateTime<Utc>>,
}

fn default_energy() -> f64 {
    DEFAULT_ENERGY
}

fn default_half() -> f64 {
    0.5
}

fn default_stability() -> f64 {
    1.0
}

fn default_loudness() -> f64 {
    -10.0
}

fn serialize_whole_number<S: Serializer>(value: &f64, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_u64(value.round().max(0.0) as u64)
}

fn unit_interval(name: &str, value: f64) -> Result<f64> {
    if value.is_finite() {
        Ok(value.clamp(0.0, 1.0))
    } else {
        Err(Error::MalformedPayload(format!("{} is not a finite number", name)))
    }
}

impl From<AnalysisResult> for AnalysisPayload {
    fn from(result: AnalysisResult) -> Self {
        Self {
            key: Some(result.key().to_string()),
            key_type: Some(result.key_type()),
            compatible_keys: result.compatible_keys().iter().map(ToString::to_string).collect(),
            camelot: result.camelot.to_string(),
            source_identifier: result.source_identifier,
            bpm: f64::from(result.bpm),
            energy: result.energy,
            danceability: result.danceability,
            valence: result.valence,
            tempo_stability: result.tempo_stability,
            confidence: result.confidence,
            loudness: result.loudness,
            duration: result.duration_secs,
            analyzed_at: Some(result.analyzed_at),
        }
    }
}

impl TryFrom<AnalysisPayload> for AnalysisResult {
    type Error = Error;

    fn try_from(payload: AnalysisPayload) -> Result<Self> {
        let camelot: CamelotKey = payload
            .camelot
            .parse()
            .map_err(|e: Error| Error::MalformedPayload(e.to_string()))?;

        if let Some(name) = payload.key.as_deref() {
            if CamelotKey::from_key_name(name) != Some(camelot) {
                return Err(Error::MalformedPayload(format!(
                    "key {:?} does not match camelot {}",
                    name, camelot
                )));
            }
        }

        if let Some(key_type) = payload.key_type {
            if key_type != camelot.mode() {
                return Err(Error::MalformedPayload(format!(
                    "keyType {} does not match camelot {}",
                    key_type, camelot
                )));
            }
        }

        if !payload.compatible_keys.is_empty() {
            let derived = camelot.compatible_keys();
            let mut claimed = Vec::with_capacity(payload.compatible_keys.len());
            for code in &payload.compatible_keys {
                let parsed: CamelotKey = code
                    .parse()
                    .map_err(|e: Error| Error::MalformedPayload(e.to_string()))?;
                claimed.push(parsed);
            }
            let consistent = claimed.len() == derived.len()
                && derived.iter().all(|k| claimed.contains(k));
            if !consistent {
                return Err(Error::MalformedPayload(format!(
                    "compatibleKeys {:?} inconsistent with camelot {}",
                    payload.compatible_keys, camelot
                )));
            }
        }

        if !payload.bpm.is_finite() {
            return Err(Error::MalformedPayload("bpm is not a finite number".to_string()));
        }
        let rounded = payload.bpm.round();
        if rounded < f64::from(*BPM_RANGE.start()) || rounded > f64::from(*BPM_RANGE.end()) {
            return Err(Error::MalformedPayload(format!(
                "bpm {} outside plausible range {}-{}",
                payload.bpm,
                BPM_RANGE.start(),
                BPM_RANGE.end()
            )));
        }

        if !payload.loudness.is_finite() {
            return Err(Error::MalformedPayload("loudness is not a finite number".to_string()));
        }

        Ok(Self {
            source_identifier: payload.source_identifier,
            bpm: rounded as u16,
            camelot,
            energy: unit_interval("energy", payload.energy)?,
            danceability: unit_interval("danceability", payload.danceability)?,
            valence: unit_interval("valence", payload.valence)?,
            tempo_stability: unit_interval("tempoStability", payload.tempo_stability)?,
            confidence: unit_interval("confidence", payload.confidence)?,
            loudness: payload.loudness,
            duration_secs: payload.duration,
            analyzed_at: payload.analyzed_at.unwrap_or_else(Utc::now),
        })
    }
}

//! Pairwise compatibility score
//!
//! Four weighted terms, summed then rounded and clamped to 0..=100:
//!
//! | Term     | Max | Formula                                    |
//! |----------|-----|--------------------------------------------|
//! | key      | 40  | 40 if `b.camelot` is in `a`'s compatible keys |
//! | tempo    | 30  | `max(0, 30 - 0.3 * abs(Δbpm))`             |
//! | energy   | 20  | `max(0, 20 - 40 * abs(Δenergy))`           |
//! | loudness | 10  | `max(0, 10 - 0.5 * abs(ΔdB))`              |
//!
//! The score is directional in principle (it reads `a`'s compatible keys) but
//! symmetric in practice because wheel compatibility is symmetric.

use hmx_common::AnalysisResult;
use serde::Serialize;

pub const KEY_WEIGHT: f64 = 40.0;
pub const TEMPO_WEIGHT: f64 = 30.0;
pub const ENERGY_WEIGHT: f64 = 20.0;
pub const LOUDNESS_WEIGHT: f64 = 10.0;

/// Points lost per BPM of difference
const TEMPO_PENALTY_PER_BPM: f64 = 0.3;
/// Points lost per unit of energy difference
const ENERGY_PENALTY: f64 = 40.0;
/// Points lost per dB of loudness difference
const LOUDNESS_PENALTY_PER_DB: f64 = 0.5;

/// Unrounded contribution of each term
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub key: f64,
    pub tempo: f64,
    pub energy: f64,
    pub loudness: f64,
}

impl ScoreBreakdown {
    pub fn raw_total(&self) -> f64 {
        self.key + self.tempo + self.energy + self.loudness
    }

    /// Rounded total clamped to 0..=100
    pub fn total(&self) -> u8 {
        let total = self.raw_total();
        if total.is_nan() {
            return 0;
        }
        total.round().clamp(0.0, 100.0) as u8
    }
}

fn decay(weight: f64, penalty: f64, difference: f64) -> f64 {
    let value = weight - penalty * difference.abs();
    // NaN inputs contribute nothing
    if value.is_nan() {
        0.0
    } else {
        value.max(0.0)
    }
}

/// Per-term scores for the move from `a` to `b`
pub fn breakdown(a: &AnalysisResult, b: &AnalysisResult) -> ScoreBreakdown {
    let key = if a.compatible_keys().contains(&b.camelot) {
        KEY_WEIGHT
    } else {
        0.0
    };
    let bpm_difference = f64::from(a.bpm) - f64::from(b.bpm);

    ScoreBreakdown {
        key,
        tempo: decay(TEMPO_WEIGHT, TEMPO_PENALTY_PER_BPM, bpm_difference),
        energy: decay(ENERGY_WEIGHT, ENERGY_PENALTY, a.energy - b.energy),
        loudness: decay(LOUDNESS_WEIGHT, LOUDNESS_PENALTY_PER_DB, a.loudness - b.loudness),
    }
}

/// Compatibility of `a` followed by `b`, 0..=100
pub fn score(a: &AnalysisResult, b: &AnalysisResult) -> u8 {
    breakdown(a, b).total()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(id: &str, bpm: u16, camelot: &str, energy: f64) -> AnalysisResult {
        AnalysisResult::new(id, bpm, camelot.parse().unwrap()).with_energy(energy)
    }

    #[test]
    fn test_identical_tracks_score_100() {
        let a = track("a", 124, "5A", 0.7);
        assert_eq!(score(&a, &a.clone()), 100);
    }

    #[test]
    fn test_breakdown_terms() {
        let a = track("a", 128, "8B", 0.5);
        let b = track("b", 130, "9B", 0.6);

        let parts = breakdown(&a, &b);
        assert_eq!(parts.key, 40.0);
        assert!((parts.tempo - 29.4).abs() < 1e-9);
        assert!((parts.energy - 16.0).abs() < 1e-9);
        assert_eq!(parts.loudness, 10.0);
        assert_eq!(parts.total(), 95);
    }

    #[test]
    fn test_loudness_gap_costs_points() {
        let a = track("a", 128, "8B", 0.5);
        let b = track("b", 130, "9B", 0.6).with_loudness(-30.0);

        assert_eq!(breakdown(&a, &b).loudness, 0.0);
        assert_eq!(score(&a, &b), 85);
    }

    #[test]
    fn test_terms_floor_at_zero() {
        let a = track("a", 60, "1A", 0.0).with_loudness(-60.0);
        let b = track("b", 200, "6B", 1.0).with_loudness(0.0);

        let parts = breakdown(&a, &b);
        assert_eq!(parts, ScoreBreakdown { key: 0.0, tempo: 0.0, energy: 0.0, loudness: 0.0 });
        assert_eq!(score(&a, &b), 0);
    }

    #[test]
    fn test_nan_loudness_contributes_nothing() {
        let a = track("a", 120, "8A", 0.5).with_loudness(f64::NAN);
        let b = track("b", 120, "8A", 0.5);
        assert_eq!(score(&a, &b), 90);
    }

    #[test]
    fn test_score_is_in_range_and_deterministic() {
        let keys = ["1A", "4B", "8A", "8B", "12B"];
        for (i, ka) in keys.iter().enumerate() {
            for (j, kb) in keys.iter().enumerate() {
                let a = track("a", 90 + 10 * i as u16, ka, 0.2 * i as f64);
                let b = track("b", 95 + 7 * j as u16, kb, 0.15 * j as f64);
                let first = score(&a, &b);
                assert!(first <= 100);
                assert_eq!(first, score(&a, &b));
            }
        }
    }
}

//! Harmonic compatibility
//!
//! Pure functions over `AnalysisResult`s: pairwise scoring, greedy set
//! sequencing and candidate ranking. No I/O, no shared state.

pub mod recommend;
pub mod scorer;
pub mod sequence;

pub use recommend::{recommend, Recommendation};
pub use scorer::{breakdown, score, ScoreBreakdown};
pub use sequence::{build_sequence, plan_set, MixPlan, Transition};

use hmx_common::{AnalysisResult, CamelotKey};
use serde::Serialize;

/// How two keys relate on the Camelot wheel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    /// Same number and letter
    SameKey,
    /// One step around the same ring
    Adjacent,
    /// Same number, other letter (relative major/minor)
    Relative,
    Clash,
}

impl TransitionKind {
    pub fn between_keys(from: CamelotKey, to: CamelotKey) -> Self {
        if from == to {
            TransitionKind::SameKey
        } else if to == from.step(1) || to == from.step(-1) {
            TransitionKind::Adjacent
        } else if to == from.relative() {
            TransitionKind::Relative
        } else {
            TransitionKind::Clash
        }
    }

    /// Classify the move from track `a` to track `b`
    pub fn classify(a: &AnalysisResult, b: &AnalysisResult) -> Self {
        Self::between_keys(a.camelot, b.camelot)
    }

    pub fn is_harmonic(self) -> bool {
        self != TransitionKind::Clash
    }
}

impl std::fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            TransitionKind::SameKey => "same key",
            TransitionKind::Adjacent => "adjacent",
            TransitionKind::Relative => "relative",
            TransitionKind::Clash => "clash",
        };
        write!(f, "{}", label)
    }
}

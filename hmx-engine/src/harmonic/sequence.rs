//! Greedy set sequencing
//!
//! Starts from the lowest-energy track and repeatedly appends the remaining
//! track that scores best against the current tail. When nothing scores
//! above the acceptance threshold the oldest remaining track (in energy
//! order) is taken instead, so every input is placed exactly once.

use super::scorer::score;
use super::TransitionKind;
use hmx_common::AnalysisResult;
use serde::Serialize;

/// Best candidate must score strictly above this to be chosen on merit
pub const ACCEPT_THRESHOLD: u8 = 50;

/// Order tracks for smooth transitions; returns a permutation of the input
pub fn build_sequence(tracks: &[AnalysisResult]) -> Vec<AnalysisResult> {
    if tracks.len() < 2 {
        return tracks.to_vec();
    }

    let mut pool = tracks.to_vec();
    // Stable: equal energies keep input order
    pool.sort_by(|a, b| a.energy.total_cmp(&b.energy));

    let mut sequence = Vec::with_capacity(pool.len());
    sequence.push(pool.remove(0));

    while !pool.is_empty() {
        let last = &sequence[sequence.len() - 1];

        let mut best_index = 0;
        let mut best_score = score(last, &pool[0]);
        for (index, candidate) in pool.iter().enumerate().skip(1) {
            let candidate_score = score(last, candidate);
            if candidate_score > best_score {
                best_index = index;
                best_score = candidate_score;
            }
        }

        let next = if best_score > ACCEPT_THRESHOLD {
            pool.remove(best_index)
        } else {
            tracing::trace!(
                from = %last.source_identifier,
                best_score,
                "No candidate above threshold, taking next by energy"
            );
            pool.remove(0)
        };
        sequence.push(next);
    }

    sequence
}

/// One step of a planned set
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transition {
    pub from: String,
    pub to: String,
    pub score: u8,
    pub kind: TransitionKind,
}

/// A sequenced set with its per-transition scores
#[derive(Debug, Clone, Serialize)]
pub struct MixPlan {
    pub tracks: Vec<AnalysisResult>,
    pub transitions: Vec<Transition>,
    /// Mean transition score; 0.0 for sets with fewer than two tracks
    pub average_score: f64,
}

impl MixPlan {
    /// Transitions that leave the compatible keys
    pub fn clashes(&self) -> impl Iterator<Item = &Transition> {
        self.transitions
            .iter()
            .filter(|transition| !transition.kind.is_harmonic())
    }
}

/// Sequence `tracks` and describe every transition in the result
pub fn plan_set(tracks: &[AnalysisResult]) -> MixPlan {
    let sequence = build_sequence(tracks);

    let transitions: Vec<Transition> = sequence
        .windows(2)
        .map(|pair| Transition {
            from: pair[0].source_identifier.clone(),
            to: pair[1].source_identifier.clone(),
            score: score(&pair[0], &pair[1]),
            kind: TransitionKind::classify(&pair[0], &pair[1]),
        })
        .collect();

    let average_score = if transitions.is_empty() {
        0.0
    } else {
        transitions.iter().map(|t| f64::from(t.score)).sum::<f64>() / transitions.len() as f64
    };

    MixPlan {
        tracks: sequence,
        transitions,
        average_score,
    }
}

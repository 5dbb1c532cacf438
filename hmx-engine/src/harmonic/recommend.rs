//! Rank candidate tracks against a target

use super::scorer::score;
use super::TransitionKind;
use hmx_common::AnalysisResult;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct Recommendation {
    pub track: AnalysisResult,
    pub score: u8,
    pub kind: TransitionKind,
}

/// Best `limit` candidates to follow `target`, highest score first
///
/// Candidates sharing the target's source identifier are skipped. Equal
/// scores keep candidate order.
pub fn recommend(
    target: &AnalysisResult,
    candidates: &[AnalysisResult],
    limit: usize,
) -> Vec<Recommendation> {
    let mut ranked: Vec<Recommendation> = candidates
        .iter()
        .filter(|candidate| candidate.source_identifier != target.source_identifier)
        .map(|candidate| Recommendation {
            track: candidate.clone(),
            score: score(target, candidate),
            kind: TransitionKind::classify(target, candidate),
        })
        .collect();

    ranked.sort_by(|a, b| b.score.cmp(&a.score));
    ranked.truncate(limit);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(id: &str, bpm: u16, camelot: &str, energy: f64) -> AnalysisResult {
        AnalysisResult::new(id, bpm, camelot.parse().unwrap()).with_energy(energy)
    }

    #[test]
    fn test_ranks_by_score_and_skips_target() {
        let target = track("a", 128, "8B", 0.5);
        let candidates = vec![
            track("clash", 128, "3A", 0.5),
            track("a", 128, "8B", 0.5),
            track("close", 130, "9B", 0.6),
            track("same", 128, "8B", 0.5),
        ];

        let picks = recommend(&target, &candidates, 10);
        let ids: Vec<&str> = picks.iter().map(|r| r.track.source_identifier.as_str()).collect();
        assert_eq!(ids, ["same", "close", "clash"]);
        assert_eq!(picks[0].score, 100);
        assert_eq!(picks[0].kind, TransitionKind::SameKey);
        assert_eq!(picks[2].kind, TransitionKind::Clash);
    }

    #[test]
    fn test_limit_and_stable_ties() {
        let target = track("t", 120, "5A", 0.5);
        let candidates = vec![
            track("x", 120, "5A", 0.5),
            track("y", 120, "5A", 0.5),
            track("z", 120, "5A", 0.5),
        ];

        let picks = recommend(&target, &candidates, 2);
        let ids: Vec<&str> = picks.iter().map(|r| r.track.source_identifier.as_str()).collect();
        assert_eq!(ids, ["x", "y"]);
        assert!(recommend(&target, &candidates, 0).is_empty());
    }
}

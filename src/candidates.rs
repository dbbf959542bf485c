// 🔎 Candidate Index - Two-stage retrieval of canonical names
// Stage 1: cheap token overlap keeps the top 20; stage 2: full scorer re-rank

use crate::error::Result;
use crate::normalizer::ObjectKind;
use crate::similarity::{token_set_ratio, SimilarityScorer};
use rusqlite::Connection;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

/// Candidates kept after coarse ranking
pub const COARSE_LIMIT: usize = 20;

/// Maximum candidates returned
pub const RESULT_LIMIT: usize = 20;

/// Coarse scores below threshold * this factor are not rescored
pub const COARSE_PREFILTER: f64 = 0.7;

const COARSE_WEIGHT: f64 = 0.6;
const PRECISE_WEIGHT: f64 = 0.4;

// ============================================================================
// NAME SOURCE
// ============================================================================

/// Anything able to list the currently known canonical names of a kind
pub trait NameSource {
    fn canonical_names(&self, kind: ObjectKind) -> Result<Vec<String>>;
}

impl NameSource for Connection {
    fn canonical_names(&self, kind: ObjectKind) -> Result<Vec<String>> {
        crate::db::canonical_names(self, kind)
    }
}

impl NameSource for HashMap<ObjectKind, Vec<String>> {
    fn canonical_names(&self, kind: ObjectKind) -> Result<Vec<String>> {
        Ok(self.get(&kind).cloned().unwrap_or_default())
    }
}

// ============================================================================
// CANDIDATE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub name: String,

    /// 0.6 * coarse + 0.4 * precise
    pub score: f64,

    pub coarse: f64,
    pub precise: f64,
}

// ============================================================================
// INDEX
// ============================================================================

pub struct CandidateIndex {
    scorer: SimilarityScorer,
}

impl CandidateIndex {
    pub fn new() -> Self {
        CandidateIndex {
            scorer: SimilarityScorer::new(),
        }
    }

    pub fn scorer(&self) -> &SimilarityScorer {
        &self.scorer
    }

    /// Rank every canonical name of `kind` known to `source`
    pub fn find_similar(
        &self,
        target: &str,
        kind: ObjectKind,
        threshold: f64,
        source: &dyn NameSource,
    ) -> Result<Vec<Candidate>> {
        let names = source.canonical_names(kind)?;
        Ok(self.rank_in(target, kind, &names, threshold))
    }

    /// Rank an explicit list of names (e.g. siblings under one parent)
    pub fn rank_in(&self, target: &str, kind: ObjectKind, names: &[String], threshold: f64) -> Vec<Candidate> {
        let target_key = coarse_form(target);
        if target_key.is_empty() {
            return Vec::new();
        }

        // Stage 1: coarse ranking
        let mut seen = HashSet::new();
        let mut coarse: Vec<(&str, f64)> = names
            .iter()
            .map(String::as_str)
            .filter(|name| !name.trim().is_empty() && seen.insert(*name))
            .map(|name| (name, token_set_ratio(&target_key, &coarse_form(name))))
            .collect();

        coarse.sort_by(|a, b| by_score_then_name(a.1, a.0, b.1, b.0));
        coarse.truncate(COARSE_LIMIT);

        // Stage 2: precise rescoring of survivors
        let mut ranked: Vec<Candidate> = coarse
            .into_iter()
            .filter(|(_, coarse)| *coarse >= threshold * COARSE_PREFILTER)
            .map(|(name, coarse)| {
                let precise = self.scorer.score(target, name, kind);
                Candidate {
                    name: name.to_string(),
                    score: COARSE_WEIGHT * coarse + PRECISE_WEIGHT * precise,
                    coarse,
                    precise,
                }
            })
            .filter(|c| c.score >= threshold)
            .collect();

        ranked.sort_by(|a, b| by_score_then_name(a.score, &a.name, b.score, &b.name));
        ranked.truncate(RESULT_LIMIT);
        ranked
    }
}

impl Default for CandidateIndex {
    fn default() -> Self {
        Self::new()
    }
}

fn coarse_form(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

fn by_score_then_name(score_a: f64, name_a: &str, score_b: f64, name_b: &str) -> Ordering {
    score_b
        .partial_cmp(&score_a)
        .unwrap_or(Ordering::Equal)
        .then_with(|| name_a.cmp(name_b))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_exact_name_ranks_first_with_full_score() {
        let index = CandidateIndex::new();
        let ranked = index.rank_in(
            "Старий Шлях",
            ObjectKind::Street,
            &names(&["Шевченка", "Старий шлях", "Старокозацька"]),
            0.5,
        );

        assert_eq!(ranked[0].name, "Старий шлях");
        assert!((ranked[0].score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_results_sorted_and_thresholded() {
        let index = CandidateIndex::new();
        let ranked = index.rank_in(
            "Шевченка",
            ObjectKind::Street,
            &names(&["Шевченко", "Шевченка", "Набережна Перемоги", "Гоголя"]),
            0.6,
        );

        assert!(!ranked.is_empty());
        assert!(ranked.windows(2).all(|w| w[0].score >= w[1].score));
        assert!(ranked.iter().all(|c| c.score >= 0.6));
        assert!(ranked.iter().all(|c| c.name != "Набережна Перемоги"));
    }

    #[test]
    fn test_result_cap() {
        let index = CandidateIndex::new();
        let many: Vec<String> = (0..50).map(|i| format!("Садова {}", i)).collect();
        let ranked = index.rank_in("Садова", ObjectKind::Street, &many, 0.0);
        assert!(ranked.len() <= RESULT_LIMIT);
    }

    #[test]
    fn test_duplicate_names_ranked_once() {
        let index = CandidateIndex::new();
        let ranked = index.rank_in("Гоголя", ObjectKind::Street, &names(&["Гоголя", "Гоголя"]), 0.5);
        assert_eq!(ranked.len(), 1);
    }

    #[test]
    fn test_find_similar_from_map_source() {
        let mut source: HashMap<ObjectKind, Vec<String>> = HashMap::new();
        source.insert(ObjectKind::District, names(&["Самарський", "Центральний"]));

        let index = CandidateIndex::new();
        let ranked = index
            .find_similar("Самарський район", ObjectKind::District, 0.75, &source)
            .unwrap();

        assert_eq!(ranked[0].name, "Самарський");
        assert!(index
            .find_similar("Самарський", ObjectKind::City, 0.75, &source)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_empty_target_yields_nothing() {
        let index = CandidateIndex::new();
        assert!(index.rank_in("  ", ObjectKind::Street, &names(&["Шлях"]), 0.0).is_empty());
    }
}

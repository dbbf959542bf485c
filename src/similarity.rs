// 📏 Similarity Scorer - Weighted multi-metric comparison of address names
// Five metrics blended per object kind, result clipped to [0, 1]

use crate::normalizer::{ObjectKind, TextNormalizer};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// ============================================================================
// WEIGHTS
// ============================================================================

/// Per-kind blend of the five scored metrics (sums to 1.0)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricWeights {
    pub exact: f64,
    pub token_set: f64,
    pub phonetic: f64,
    pub edit_distance: f64,
    pub boundary: f64,
}

impl MetricWeights {
    pub fn for_kind(kind: ObjectKind) -> Self {
        let (exact, token_set, phonetic, edit_distance, boundary) = match kind {
            ObjectKind::Street => (0.30, 0.25, 0.20, 0.15, 0.10),
            ObjectKind::District => (0.40, 0.20, 0.15, 0.15, 0.10),
            ObjectKind::StreetType => (0.50, 0.20, 0.15, 0.10, 0.05),
            ObjectKind::City => (0.35, 0.25, 0.20, 0.10, 0.10),
            ObjectKind::Building => (0.60, 0.15, 0.10, 0.10, 0.05),
            ObjectKind::Generic => (0.30, 0.25, 0.20, 0.15, 0.10),
        };

        MetricWeights {
            exact,
            token_set,
            phonetic,
            edit_distance,
            boundary,
        }
    }

    pub fn total(&self) -> f64 {
        self.exact + self.token_set + self.phonetic + self.edit_distance + self.boundary
    }
}

// ============================================================================
// BREAKDOWN
// ============================================================================

/// Every component metric of one comparison, plus the weighted score
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SimilarityBreakdown {
    pub exact: f64,
    pub token_set: f64,
    pub token_sort: f64,
    pub edit_distance: f64,
    pub boundary: f64,
    pub phonetic: f64,
    pub score: f64,
}

/// Cluster and letter folds applied in order before phonetic comparison
const PHONETIC_FOLDS: &[(&str, &str)] = &[
    ("і", "и"),
    ("ї", "и"),
    ("є", "е"),
    ("ґ", "г"),
    ("й", "и"),
    ("ю", "у"),
    ("я", "а"),
    ("кс", "х"),
    ("гз", "з"),
    ("дз", "з"),
    ("тц", "ц"),
    ("дц", "ц"),
];

// ============================================================================
// SCORER
// ============================================================================

pub struct SimilarityScorer {
    normalizer: TextNormalizer,
}

impl SimilarityScorer {
    pub fn new() -> Self {
        SimilarityScorer {
            normalizer: TextNormalizer::new(),
        }
    }

    pub fn normalizer(&self) -> &TextNormalizer {
        &self.normalizer
    }

    /// Weighted similarity in [0, 1]; 0 when either side normalizes to empty
    pub fn score(&self, a: &str, b: &str, kind: ObjectKind) -> f64 {
        self.breakdown(a, b, kind).score
    }

    pub fn breakdown(&self, a: &str, b: &str, kind: ObjectKind) -> SimilarityBreakdown {
        let left = self.normalizer.normalize(a, kind);
        let right = self.normalizer.normalize(b, kind);

        if left.is_empty() || right.is_empty() {
            return SimilarityBreakdown::default();
        }

        let exact = if left == right { 1.0 } else { 0.0 };
        let token_set = finite(token_set_ratio(&left, &right));
        let token_sort = finite(token_sort_ratio(&left, &right));
        let edit_distance = finite(strsim::normalized_levenshtein(&left, &right));
        let boundary = finite(boundary_similarity(&left, &right));
        let phonetic = finite(phonetic_similarity(&left, &right));

        let w = MetricWeights::for_kind(kind);
        let weighted = w.exact * exact
            + w.token_set * token_set
            + w.phonetic * phonetic
            + w.edit_distance * edit_distance
            + w.boundary * boundary;

        SimilarityBreakdown {
            exact,
            token_set,
            token_sort,
            edit_distance,
            boundary,
            phonetic,
            score: finite(weighted),
        }
    }
}

impl Default for SimilarityScorer {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// METRICS
// ============================================================================

fn finite(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

fn tokens(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

fn join(tokens: &[&String]) -> String {
    tokens.iter().map(|t| t.as_str()).collect::<Vec<_>>().join(" ")
}

/// Token-set overlap: a name whose tokens are a subset of the other scores 1.0
pub(crate) fn token_set_ratio(a: &str, b: &str) -> f64 {
    let left = tokens(a);
    let right = tokens(b);

    match (left.is_empty(), right.is_empty()) {
        (true, true) => return strsim::normalized_levenshtein(a, b),
        (true, false) | (false, true) => return 0.0,
        _ => {}
    }

    let common: Vec<&String> = left.intersection(&right).collect();
    let only_left: Vec<&String> = left.difference(&right).collect();
    let only_right: Vec<&String> = right.difference(&left).collect();

    let common_text = join(&common);
    let combined_left = [common_text.as_str(), join(&only_left).as_str()]
        .iter()
        .filter(|s| !s.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" ");
    let combined_right = [common_text.as_str(), join(&only_right).as_str()]
        .iter()
        .filter(|s| !s.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" ");

    let mut best = strsim::normalized_levenshtein(&combined_left, &combined_right);
    if !common_text.is_empty() {
        best = best
            .max(strsim::normalized_levenshtein(&common_text, &combined_left))
            .max(strsim::normalized_levenshtein(&common_text, &combined_right));
    }
    best
}

/// Token-order-insensitive ratio
pub(crate) fn token_sort_ratio(a: &str, b: &str) -> f64 {
    let left: Vec<String> = tokens(a).into_iter().collect();
    let right: Vec<String> = tokens(b).into_iter().collect();
    strsim::normalized_levenshtein(&left.join(" "), &right.join(" "))
}

/// Prefix-favoring similarity, averaged over both argument orders
fn boundary_similarity(a: &str, b: &str) -> f64 {
    (strsim::jaro_winkler(a, b) + strsim::jaro_winkler(b, a)) / 2.0
}

pub(crate) fn phonetic_fold(text: &str) -> String {
    PHONETIC_FOLDS
        .iter()
        .fold(text.to_lowercase(), |acc, (from, to)| acc.replace(from, to))
}

fn phonetic_similarity(a: &str, b: &str) -> f64 {
    let left = phonetic_fold(a);
    let right = phonetic_fold(b);
    (token_set_ratio(&left, &right) + strsim::normalized_levenshtein(&left, &right)) / 2.0
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_weights_sum_to_one() {
        for kind in ObjectKind::ALL {
            let total = MetricWeights::for_kind(kind).total();
            assert!((total - 1.0).abs() < 1e-9, "{:?} weights sum to {}", kind, total);
        }
    }

    #[test]
    fn test_building_weights_exact_highest() {
        let building = MetricWeights::for_kind(ObjectKind::Building);
        let street = MetricWeights::for_kind(ObjectKind::Street);
        let city = MetricWeights::for_kind(ObjectKind::City);
        assert!(building.exact > street.exact);
        assert!(building.exact > city.exact);
    }

    #[test]
    fn test_identical_names_score_one() {
        let scorer = SimilarityScorer::new();
        for kind in ObjectKind::ALL {
            let score = scorer.score("Старий Шлях", "старий  шлях", kind);
            assert!((score - 1.0).abs() < 1e-9, "{:?} scored {}", kind, score);
        }
    }

    #[test]
    fn test_empty_scores_zero() {
        let scorer = SimilarityScorer::new();
        assert_eq!(scorer.score("", "Шлях", ObjectKind::Street), 0.0);
        assert_eq!(scorer.score("   ", "   ", ObjectKind::Street), 0.0);
    }

    #[test]
    fn test_district_suffix_is_exact_match() {
        let scorer = SimilarityScorer::new();
        let breakdown = scorer.breakdown("Самарський район", "Самарський", ObjectKind::District);
        assert_eq!(breakdown.exact, 1.0);
    }

    #[test]
    fn test_phonetic_fold_bridges_spellings() {
        assert_eq!(phonetic_fold("Київська"), phonetic_fold("Киивська"));

        let scorer = SimilarityScorer::new();
        let breakdown = scorer.breakdown("Гоголя", "Гоголa", ObjectKind::Street);
        assert!(breakdown.phonetic > breakdown.exact);
    }

    #[test]
    fn test_token_set_subset_is_full_match() {
        assert_eq!(token_set_ratio("старий шлях", "шлях"), 1.0);
        assert_eq!(token_set_ratio("шлях старий", "старий шлях"), 1.0);
    }

    #[test]
    fn test_unrelated_names_score_low() {
        let scorer = SimilarityScorer::new();
        let score = scorer.score("Шевченка", "Набережна Перемоги", ObjectKind::Street);
        assert!(score < 0.5, "unexpected score {}", score);
    }

    proptest! {
        #[test]
        fn prop_score_is_symmetric(
            a in "[a-zа-яі ]{0,20}",
            b in "[a-zа-яі ]{0,20}",
            idx in 0usize..6,
        ) {
            let scorer = SimilarityScorer::new();
            let kind = ObjectKind::ALL[idx];
            let forward = scorer.score(&a, &b, kind);
            let backward = scorer.score(&b, &a, kind);
            prop_assert!((forward - backward).abs() < 1e-9);
            prop_assert!((0.0..=1.0).contains(&forward));
        }

        #[test]
        fn prop_self_score_is_one(a in "[a-zа-яі]{1,12}( [a-zа-яі]{1,12}){0,2}", idx in 0usize..6) {
            let scorer = SimilarityScorer::new();
            let kind = ObjectKind::ALL[idx];
            prop_assert!((scorer.score(&a, &a, kind) - 1.0).abs() < 1e-9);
        }
    }
}

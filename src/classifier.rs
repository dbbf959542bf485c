// 🎯 Confidence Classifier - Best match → tier → recommendation
// Pure decision table; never mutates anything

use crate::candidates::{Candidate, CandidateIndex, NameSource};
use crate::error::Result;
use crate::normalizer::ObjectKind;
use serde::{Deserialize, Serialize};

/// Threshold used when validating a name against all known canonical names
pub const VALIDATION_THRESHOLD: f64 = 0.75;

const TOP_MATCHES: usize = 5;

// ============================================================================
// THRESHOLDS
// ============================================================================

/// Descending tier boundaries; shorter, low-entropy strings get tighter ones
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierThresholds {
    pub very_high: f64,
    pub high: f64,
    pub medium: f64,
    pub low: f64,
}

impl TierThresholds {
    pub fn for_kind(kind: ObjectKind) -> Self {
        let (very_high, high, medium, low) = match kind {
            ObjectKind::District => (0.90, 0.85, 0.80, 0.75),
            ObjectKind::Building => (0.98, 0.95, 0.90, 0.85),
            ObjectKind::Street | ObjectKind::StreetType | ObjectKind::City | ObjectKind::Generic => {
                (0.95, 0.90, 0.85, 0.80)
            }
        };

        TierThresholds {
            very_high,
            high,
            medium,
            low,
        }
    }

    pub fn tier(&self, score: f64) -> ConfidenceTier {
        if score >= self.very_high {
            ConfidenceTier::VeryHigh
        } else if score >= self.high {
            ConfidenceTier::High
        } else if score >= self.medium {
            ConfidenceTier::Medium
        } else if score >= self.low {
            ConfidenceTier::Low
        } else {
            ConfidenceTier::VeryLow
        }
    }
}

// ============================================================================
// TIER / RECOMMENDATION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceTier {
    VeryHigh,
    High,
    Medium,
    Low,
    VeryLow,
}

impl ConfidenceTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceTier::VeryHigh => "very_high",
            ConfidenceTier::High => "high",
            ConfidenceTier::Medium => "medium",
            ConfidenceTier::Low => "low",
            ConfidenceTier::VeryLow => "very_low",
        }
    }

    pub fn recommendation(&self) -> Recommendation {
        match self {
            ConfidenceTier::VeryHigh => Recommendation::UseExisting,
            ConfidenceTier::High => Recommendation::Review,
            ConfidenceTier::Medium => Recommendation::CreateWithNote,
            ConfidenceTier::Low => Recommendation::CreateNewWithWarning,
            ConfidenceTier::VeryLow => Recommendation::CreateNew,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    UseExisting,
    Review,
    CreateWithNote,
    CreateNewWithWarning,
    CreateNew,
}

impl Recommendation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Recommendation::UseExisting => "use_existing",
            Recommendation::Review => "review",
            Recommendation::CreateWithNote => "create_with_note",
            Recommendation::CreateNewWithWarning => "create_new_with_warning",
            Recommendation::CreateNew => "create_new",
        }
    }

    /// Only a very-high match reuses the existing row
    pub fn reuses_existing(&self) -> bool {
        matches!(self, Recommendation::UseExisting)
    }
}

// ============================================================================
// CLASSIFICATION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    pub best_match: Option<Candidate>,
    pub tier: ConfidenceTier,
    pub recommendation: Recommendation,
    pub total_found: usize,
    pub top_matches: Vec<Candidate>,
}

impl Classification {
    pub fn best_score(&self) -> f64 {
        self.best_match.as_ref().map(|c| c.score).unwrap_or(0.0)
    }
}

pub struct ConfidenceClassifier;

impl ConfidenceClassifier {
    pub fn new() -> Self {
        ConfidenceClassifier
    }

    /// Classify a ranked candidate list (best first)
    pub fn classify(&self, ranked: &[Candidate], kind: ObjectKind) -> Classification {
        let best_match = ranked.first().cloned();

        let tier = match &best_match {
            Some(best) => TierThresholds::for_kind(kind).tier(best.score),
            None => ConfidenceTier::VeryLow,
        };

        Classification {
            best_match,
            tier,
            recommendation: tier.recommendation(),
            total_found: ranked.len(),
            top_matches: ranked.iter().take(TOP_MATCHES).cloned().collect(),
        }
    }
}

impl Default for ConfidenceClassifier {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// ENTITY MATCHER (index + classifier)
// ============================================================================

pub struct EntityMatcher {
    index: CandidateIndex,
    classifier: ConfidenceClassifier,
    threshold: f64,
}

impl EntityMatcher {
    pub fn new() -> Self {
        EntityMatcher {
            index: CandidateIndex::new(),
            classifier: ConfidenceClassifier::new(),
            threshold: VALIDATION_THRESHOLD,
        }
    }

    /// Match a name against every known canonical name of its kind
    pub fn validate(&self, target: &str, kind: ObjectKind, source: &dyn NameSource) -> Result<Classification> {
        let ranked = self.index.find_similar(target, kind, self.threshold, source)?;
        Ok(self.classifier.classify(&ranked, kind))
    }

    /// Match a name against an explicit candidate list
    pub fn match_among(&self, target: &str, kind: ObjectKind, names: &[String]) -> Classification {
        let ranked = self.index.rank_in(target, kind, names, self.threshold);
        self.classifier.classify(&ranked, kind)
    }
}

impl Default for EntityMatcher {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn candidate(name: &str, score: f64) -> Candidate {
        Candidate {
            name: name.to_string(),
            score,
            coarse: score,
            precise: score,
        }
    }

    #[test]
    fn test_building_high_tier_review() {
        let classifier = ConfidenceClassifier::new();
        let result = classifier.classify(&[candidate("192", 0.97)], ObjectKind::Building);

        assert_eq!(result.tier, ConfidenceTier::High);
        assert_eq!(result.recommendation, Recommendation::Review);
    }

    #[test]
    fn test_building_very_high_use_existing() {
        let classifier = ConfidenceClassifier::new();
        let result = classifier.classify(&[candidate("192", 0.99)], ObjectKind::Building);

        assert_eq!(result.tier, ConfidenceTier::VeryHigh);
        assert_eq!(result.recommendation, Recommendation::UseExisting);
    }

    #[test]
    fn test_district_thresholds_are_looser() {
        let thresholds = TierThresholds::for_kind(ObjectKind::District);
        assert_eq!(thresholds.tier(0.91), ConfidenceTier::VeryHigh);
        assert_eq!(thresholds.tier(0.76), ConfidenceTier::Low);
        assert_eq!(thresholds.tier(0.70), ConfidenceTier::VeryLow);
    }

    #[test]
    fn test_full_decision_table() {
        let thresholds = TierThresholds::for_kind(ObjectKind::Street);
        let cases = [
            (0.96, Recommendation::UseExisting),
            (0.92, Recommendation::Review),
            (0.86, Recommendation::CreateWithNote),
            (0.81, Recommendation::CreateNewWithWarning),
            (0.50, Recommendation::CreateNew),
        ];
        for (score, expected) in cases {
            assert_eq!(thresholds.tier(score).recommendation(), expected, "score {}", score);
        }
    }

    #[test]
    fn test_no_candidates_create_new() {
        let result = ConfidenceClassifier::new().classify(&[], ObjectKind::City);
        assert!(result.best_match.is_none());
        assert_eq!(result.total_found, 0);
        assert_eq!(result.recommendation, Recommendation::CreateNew);
    }

    #[test]
    fn test_top_matches_capped_at_five() {
        let ranked: Vec<Candidate> = (0..8).map(|i| candidate(&format!("n{}", i), 0.9 - i as f64 * 0.01)).collect();
        let result = ConfidenceClassifier::new().classify(&ranked, ObjectKind::Street);
        assert_eq!(result.total_found, 8);
        assert_eq!(result.top_matches.len(), 5);
        assert_eq!(result.best_match.map(|c| c.name), Some("n0".to_string()));
    }

    #[test]
    fn test_tied_candidates_keep_ranked_order() {
        let ranked = [candidate("Робоча", 0.99), candidate("Робочa", 0.99), candidate("Рибна", 0.80)];
        let result = ConfidenceClassifier::new().classify(&ranked, ObjectKind::Street);

        assert_eq!(result.best_match.map(|c| c.name), Some("Робоча".to_string()));
        assert_eq!(result.recommendation, Recommendation::UseExisting);
    }

    #[test]
    fn test_validate_against_name_source() {
        let mut source: HashMap<ObjectKind, Vec<String>> = HashMap::new();
        source.insert(ObjectKind::Street, vec!["Старий Шлях".to_string(), "Шевченка".to_string()]);

        let matcher = EntityMatcher::new();
        let result = matcher.validate("старий шлях", ObjectKind::Street, &source).unwrap();

        assert_eq!(result.recommendation, Recommendation::UseExisting);
        assert_eq!(result.best_match.map(|c| c.name), Some("Старий Шлях".to_string()));
    }
}

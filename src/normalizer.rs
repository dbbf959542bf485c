// 🧹 Text Normalizer - Canonical forms for address names
// Pure and deterministic: normalize(normalize(x)) == normalize(x)

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// OBJECT KIND
// ============================================================================

/// Kind of named object being compared; selects normalization rules,
/// similarity weights and confidence thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    Street,
    StreetType,
    District,
    City,
    Building,
    /// Untyped text
    Generic,
}

impl ObjectKind {
    pub const ALL: [ObjectKind; 6] = [
        ObjectKind::Street,
        ObjectKind::StreetType,
        ObjectKind::District,
        ObjectKind::City,
        ObjectKind::Building,
        ObjectKind::Generic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Street => "street",
            ObjectKind::StreetType => "street_type",
            ObjectKind::District => "district",
            ObjectKind::City => "city",
            ObjectKind::Building => "building",
            ObjectKind::Generic => "none",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "street" => Some(ObjectKind::Street),
            "street_type" => Some(ObjectKind::StreetType),
            "district" => Some(ObjectKind::District),
            "city" => Some(ObjectKind::City),
            "building" => Some(ObjectKind::Building),
            "none" | "generic" | "" => Some(ObjectKind::Generic),
            _ => None,
        }
    }
}

// ============================================================================
// STREET TYPE TABLES
// ============================================================================

/// Abbreviation (and full form) → full form
const STREET_TYPES: &[(&str, &str)] = &[
    ("вул", "вулиця"),
    ("вул.", "вулиця"),
    ("вулиця", "вулиця"),
    ("просп", "проспект"),
    ("просп.", "проспект"),
    ("пр-т", "проспект"),
    ("проспект", "проспект"),
    ("бул", "бульвар"),
    ("бул.", "бульвар"),
    ("бульвар", "бульвар"),
    ("пров", "провулок"),
    ("пров.", "провулок"),
    ("провулок", "провулок"),
    ("ш", "шосе"),
    ("ш.", "шосе"),
    ("шосе", "шосе"),
    ("туп", "тупик"),
    ("туп.", "тупик"),
    ("тупик", "тупик"),
    ("майд", "майдан"),
    ("майд.", "майдан"),
    ("майдан", "майдан"),
    ("ал", "алея"),
    ("ал.", "алея"),
    ("алея", "алея"),
    ("наб", "набережна"),
    ("наб.", "набережна"),
    ("набережна", "набережна"),
    ("пл", "площа"),
    ("пл.", "площа"),
    ("площа", "площа"),
    ("узв", "узвіз"),
    ("узв.", "узвіз"),
    ("узвіз", "узвіз"),
    ("ж/м", "житловий масив"),
    ("житловий масив", "житловий масив"),
];

/// Full form → short form stored alongside the street type
const SHORT_FORMS: &[(&str, &str)] = &[
    ("вулиця", "вул."),
    ("проспект", "просп."),
    ("бульвар", "бул."),
    ("провулок", "пров."),
    ("шосе", "ш."),
    ("тупик", "туп."),
    ("майдан", "майд."),
    ("алея", "ал."),
    ("набережна", "наб."),
    ("площа", "пл."),
    ("узвіз", "узв."),
    ("житловий масив", "ж/м"),
];

/// Default street type when a source row carries none
pub const DEFAULT_STREET_TYPE: &str = "вулиця";

const APOSTROPHES: &[char] = &['’', '‘', 'ʼ', '`', '´', '′'];
const DOUBLE_QUOTES: &[char] = &['"', '“', '”', '„', '«', '»'];

// ============================================================================
// NORMALIZER
// ============================================================================

pub struct TextNormalizer {
    street_types: HashMap<&'static str, &'static str>,
    short_forms: HashMap<&'static str, &'static str>,
}

impl TextNormalizer {
    pub fn new() -> Self {
        TextNormalizer {
            street_types: STREET_TYPES.iter().copied().collect(),
            short_forms: SHORT_FORMS.iter().copied().collect(),
        }
    }

    /// Storage form: whitespace collapsed, quotes unified, kind rules applied.
    /// Original casing is kept except for recognized street types.
    pub fn clean(&self, text: &str, kind: ObjectKind) -> String {
        let collapsed = collapse_whitespace(&unify_quotes(text));

        match kind {
            ObjectKind::StreetType => match self.street_types.get(collapsed.to_lowercase().as_str()) {
                Some(full) => (*full).to_string(),
                None => collapsed,
            },
            ObjectKind::District => strip_district_affixes(&collapsed),
            _ => collapsed,
        }
    }

    /// Comparison form: `clean` lower-cased
    pub fn normalize(&self, text: &str, kind: ObjectKind) -> String {
        self.clean(text, kind).to_lowercase()
    }

    /// Short form of a street type, e.g. "проспект" → "просп."
    pub fn short_form(&self, street_type: &str) -> String {
        let full = self.normalize(street_type, ObjectKind::StreetType);
        match self.short_forms.get(full.as_str()) {
            Some(short) => (*short).to_string(),
            None => {
                let head: String = full.chars().take(4).collect();
                format!("{}.", head)
            }
        }
    }

    /// True when the token (with or without a trailing dot) names a street type
    pub fn is_street_type(&self, token: &str) -> bool {
        let lower = token.trim().to_lowercase();
        self.street_types.contains_key(lower.as_str())
            || self.street_types.contains_key(lower.trim_end_matches('.'))
    }
}

impl Default for TextNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Building number with its corpus appended, e.g. ("12", "1") → "12/1"
pub fn building_number(number: &str, corpus: Option<&str>) -> String {
    let number = collapse_whitespace(number);
    match corpus.map(collapse_whitespace).filter(|c| !c.is_empty()) {
        Some(corpus) if !number.ends_with(&format!("/{}", corpus)) => format!("{}/{}", number, corpus),
        _ => number,
    }
}

fn unify_quotes(text: &str) -> String {
    text.chars()
        .filter(|c| !DOUBLE_QUOTES.contains(c))
        .map(|c| if APOSTROPHES.contains(&c) { '\'' } else { c })
        .collect()
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Drops trailing "район" and leading "м." until nothing changes.
/// A lone remaining token is kept.
fn strip_district_affixes(text: &str) -> String {
    let mut tokens: Vec<String> = text.split_whitespace().map(str::to_string).collect();
    while strip_district_once(&mut tokens) {}
    tokens.join(" ")
}

fn strip_district_once(tokens: &mut Vec<String>) -> bool {
    if tokens.len() > 1 && tokens.last().map(|t| t.to_lowercase() == "район").unwrap_or(false) {
        tokens.pop();
        return true;
    }

    if tokens.len() > 1 && tokens.first().map(|t| t.to_lowercase() == "м.").unwrap_or(false) {
        tokens.remove(0);
        return true;
    }

    if let Some(first) = tokens.first_mut() {
        let lower = first.to_lowercase();
        if lower != "м." && lower.starts_with("м.") {
            *first = first.chars().skip(2).collect();
            return true;
        }
    }

    false
}

// ============================================================================
// TESTS
// ============================================================================

// 🌳 Hierarchical Path - Dotted ancestor ids → named levels
// "1.2.3.4.5" → country=1, region=2, district=3, community=4, city=5

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Country,
    Region,
    District,
    Community,
    City,
    CityDistrict,
}

impl Level {
    pub const ALL: [Level; 6] = [
        Level::Country,
        Level::Region,
        Level::District,
        Level::Community,
        Level::City,
        Level::CityDistrict,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Country => "country",
            Level::Region => "region",
            Level::District => "district",
            Level::Community => "community",
            Level::City => "city",
            Level::CityDistrict => "city_district",
        }
    }

    fn position(&self) -> usize {
        *self as usize
    }
}

/// Parsed path; any depth is accepted, missing levels are absent
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HierarchyPath {
    segments: Vec<Option<String>>,
}

impl HierarchyPath {
    pub fn parse(path: &str) -> Self {
        if path.trim().is_empty() {
            return HierarchyPath::default();
        }

        let segments = path
            .split('.')
            .map(|segment| {
                let cleaned: String = segment.chars().filter(|c| !c.is_whitespace()).collect();
                if cleaned.is_empty() {
                    None
                } else {
                    Some(cleaned)
                }
            })
            .collect();

        HierarchyPath { segments }
    }

    pub fn get(&self, level: Level) -> Option<&str> {
        self.segments.get(level.position()).and_then(|s| s.as_deref())
    }

    /// Segments below the city district, in order
    pub fn objects(&self) -> Vec<Option<&str>> {
        self.segments
            .iter()
            .skip(Level::ALL.len())
            .map(|s| s.as_deref())
            .collect()
    }

    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// Ordered (level name, id) pairs covering every named level and each extra object level
    pub fn levels(&self) -> Vec<(String, Option<&str>)> {
        let mut levels: Vec<(String, Option<&str>)> = Level::ALL
            .iter()
            .map(|level| (level.as_str().to_string(), self.get(*level)))
            .collect();

        for (i, object) in self.objects().into_iter().enumerate() {
            levels.push((format!("object_{}", i + 1), object));
        }

        levels
    }

    /// Path re-joined up to and including `level`; None when that level is absent
    pub fn prefix(&self, level: Level) -> Option<String> {
        self.get(level)?;
        Some(
            self.segments
                .iter()
                .take(level.position() + 1)
                .map(|s| s.as_deref().unwrap_or(""))
                .collect::<Vec<_>>()
                .join("."),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_five_levels() {
        let path = HierarchyPath::parse("1.2.3.4.5");

        assert_eq!(path.get(Level::Country), Some("1"));
        assert_eq!(path.get(Level::Region), Some("2"));
        assert_eq!(path.get(Level::District), Some("3"));
        assert_eq!(path.get(Level::Community), Some("4"));
        assert_eq!(path.get(Level::City), Some("5"));
        assert_eq!(path.get(Level::CityDistrict), None);
        assert!(path.objects().is_empty());
    }

    #[test]
    fn test_empty_path_all_absent() {
        let path = HierarchyPath::parse("");
        for level in Level::ALL {
            assert_eq!(path.get(level), None);
        }
        assert_eq!(path.depth(), 0);
    }

    #[test]
    fn test_deep_path_keeps_objects() {
        let path = HierarchyPath::parse("1.2.3.4.5.6.7.8");
        assert_eq!(path.get(Level::CityDistrict), Some("6"));
        assert_eq!(path.objects(), vec![Some("7"), Some("8")]);

        let levels = path.levels();
        assert_eq!(levels.len(), 8);
        assert_eq!(levels[7], ("object_2".to_string(), Some("8")));
    }

    #[test]
    fn test_empty_segments_absent() {
        let path = HierarchyPath::parse("1..3. 4 ");
        assert_eq!(path.get(Level::Region), None);
        assert_eq!(path.get(Level::District), Some("3"));
        assert_eq!(path.get(Level::Community), Some("4"));
    }

    #[test]
    fn test_prefix() {
        let path = HierarchyPath::parse("1.2.3.4.5.6");
        assert_eq!(path.prefix(Level::City), Some("1.2.3.4.5".to_string()));
        assert_eq!(HierarchyPath::parse("1.2").prefix(Level::City), None);
    }
}

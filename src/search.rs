// 🔎 Address Search - free-text queries and autocomplete over the registry
//
// Query flow: parse_free_text → dispatch on the filled slots
//   street + building → search_building
//   street            → search_street
//   district          → search_district
//   otherwise         → search_general
// Empty results come back with "did you mean" suggestions.

use crate::candidates::CandidateIndex;
use crate::error::{Result, StoreContext};
use crate::normalizer::{building_number, ObjectKind, TextNormalizer};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

pub const DEFAULT_CITY: &str = "Дніпро";
pub const DEFAULT_LIMIT: usize = 50;

const STREET_THRESHOLD: f64 = 0.6;
const BUILDING_STREET_THRESHOLD: f64 = 0.7;
const BUILDING_NUMBER_THRESHOLD: f64 = 0.8;
const DISTRICT_THRESHOLD: f64 = 0.7;
const GENERAL_THRESHOLD: f64 = 0.6;
const SUGGESTION_THRESHOLD: f64 = 0.5;

const DISTRICT_INDICATORS: &[&str] = &["район", "р-н", "мікрорайон", "мкр", "ж/м"];
const BUILDING_INDICATORS: &[&str] = &["буд", "будинок", "дім", "д", "№"];
const CITY_TOKENS: &[&str] = &["м", "місто"];

// ============================================================================
// QUERY / RESULTS
// ============================================================================

/// Slots recognized in a free-text query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedQuery {
    pub original: String,
    pub street: Option<String>,
    pub street_type: Option<String>,
    pub building: Option<String>,
    pub district: Option<String>,
    pub city: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AddressMatch {
    Building {
        id: i64,
        street: String,
        number: String,
        corpus: Option<String>,
        city: String,
        full_address: String,
        confidence: f64,
    },
    Street {
        id: i64,
        name: String,
        type_name: String,
        city: String,
        buildings_count: i64,
        sample_buildings: Vec<String>,
        confidence: f64,
    },
    District {
        id: i64,
        name: String,
        type_name: String,
        city: String,
        streets_count: i64,
        confidence: f64,
    },
    /// Name-only hit from the general search
    Object {
        kind: ObjectKind,
        name: String,
        confidence: f64,
    },
}

impl AddressMatch {
    pub fn confidence(&self) -> f64 {
        match self {
            AddressMatch::Building { confidence, .. }
            | AddressMatch::Street { confidence, .. }
            | AddressMatch::District { confidence, .. }
            | AddressMatch::Object { confidence, .. } => *confidence,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Suggestion {
    pub kind: ObjectKind,
    pub name: String,
    pub confidence: f64,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResults {
    pub query: String,
    pub parsed: ParsedQuery,
    pub matches: Vec<AddressMatch>,
    pub total_found: usize,
    pub suggestions: Vec<Suggestion>,
}

// ============================================================================
// ENGINE
// ============================================================================

pub struct AddressSearchEngine {
    index: CandidateIndex,
}

impl AddressSearchEngine {
    pub fn new() -> Self {
        AddressSearchEngine {
            index: CandidateIndex::new(),
        }
    }

    fn normalizer(&self) -> &TextNormalizer {
        self.index.scorer().normalizer()
    }

    /// Split free text into street / type / building / district / city slots
    pub fn parse_free_text(&self, text: &str) -> ParsedQuery {
        let lowered = text.trim().to_lowercase().replace([',', '.'], " ");
        let tokens: Vec<&str> = lowered.split_whitespace().collect();
        let n = self.normalizer();

        let mut building = None;
        let mut building_at = None;
        for (i, token) in tokens.iter().enumerate() {
            if BUILDING_INDICATORS.contains(token) && i + 1 < tokens.len() {
                building = Some(tokens[i + 1].to_string());
                building_at = Some(i + 1);
                break;
            }
            if is_building_number(token) {
                building = Some(token.to_string());
                building_at = Some(i);
            }
        }

        let street_type = tokens.iter().find(|t| n.is_street_type(t)).map(|t| t.to_string());

        let district_at = tokens.iter().position(|t| DISTRICT_INDICATORS.contains(t)).and_then(|i| {
            let is_name = |j: usize| {
                let token = tokens[j];
                !n.is_street_type(token)
                    && !DISTRICT_INDICATORS.contains(&token)
                    && !is_building_number(token)
                    && Some(j) != building_at
            };
            if i > 0 && is_name(i - 1) {
                Some(i - 1)
            } else if i + 1 < tokens.len() && is_name(i + 1) {
                Some(i + 1)
            } else {
                None
            }
        });
        let district = district_at.map(|i| title_case(tokens[i]));

        let default_city = n.normalize(DEFAULT_CITY, ObjectKind::City);
        let street_words: Vec<String> = tokens
            .iter()
            .enumerate()
            .filter(|&(i, token)| {
                Some(i) != building_at
                    && Some(i) != district_at
                    && !n.is_street_type(token)
                    && !DISTRICT_INDICATORS.contains(token)
                    && !BUILDING_INDICATORS.contains(token)
                    && !CITY_TOKENS.contains(token)
                    && *token != default_city
                    && !token.chars().all(|c| c.is_ascii_digit())
            })
            .map(|(_, token)| title_case(token))
            .collect();

        ParsedQuery {
            original: text.to_string(),
            street: if street_words.is_empty() {
                None
            } else {
                Some(street_words.join(" "))
            },
            street_type,
            building,
            district,
            city: DEFAULT_CITY.to_string(),
        }
    }

    pub fn search_by_free_text(&self, conn: &Connection, query: &str, limit: usize) -> Result<SearchResults> {
        let parsed = self.parse_free_text(query);

        let mut matches = match (&parsed.street, &parsed.building, &parsed.district) {
            (Some(street), Some(building), _) => self.search_building(conn, street, building, Some(&parsed.city))?,
            (Some(street), None, district) => self.search_street(conn, street, Some(&parsed.city), district.as_deref())?,
            (None, _, Some(district)) => self.search_district(conn, district, Some(&parsed.city))?,
            _ => self.search_general(conn, query)?,
        };
        matches.truncate(limit);

        let suggestions = if matches.is_empty() {
            self.suggestions(conn, query)?
        } else {
            Vec::new()
        };

        Ok(SearchResults {
            query: query.to_string(),
            total_found: matches.len(),
            parsed,
            matches,
            suggestions,
        })
    }

    /// Buildings with a matching number on streets resembling `street`
    pub fn search_building(
        &self,
        conn: &Connection,
        street: &str,
        number: &str,
        city: Option<&str>,
    ) -> Result<Vec<AddressMatch>> {
        let scorer = self.index.scorer();
        let number_key = self.normalizer().normalize(number, ObjectKind::Building);
        let city_id = match city {
            Some(city) => self.city_id(conn, city)?,
            None => None,
        };

        let known = current_streets(conn, city_id)?;
        let names: Vec<String> = known.iter().map(|(_, name, _)| name.clone()).collect();
        let mut streets: Vec<(i64, String, String, f64)> = Vec::new();
        for candidate in self
            .index
            .rank_in(street, ObjectKind::Street, &names, BUILDING_STREET_THRESHOLD)
            .into_iter()
            .take(10)
        {
            for (id, name, city_name) in known.iter().filter(|(_, name, _)| *name == candidate.name) {
                streets.push((*id, name.clone(), city_name.clone(), scorer.score(street, name, ObjectKind::Street)));
            }
        }

        let mut matches = Vec::new();
        for (street_id, street_name, city_name, street_score) in streets {
            let mut stmt = conn
                .prepare_cached("SELECT id, number, name_key, corpus FROM buildings WHERE street_entity_id = ?1 ORDER BY id")
                .store_context("listing street buildings")?;
            let buildings = stmt
                .query_map(params![street_id], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<String>>(3)?,
                    ))
                })
                .store_context("listing street buildings")?
                .collect::<std::result::Result<Vec<_>, _>>()
                .store_context("listing street buildings")?;

            let hits = buildings
                .into_iter()
                .filter(|(_, found, key, _)| {
                    *key == number_key || scorer.score(number, found, ObjectKind::Building) > BUILDING_NUMBER_THRESHOLD
                })
                .take(5);

            for (id, found, key, corpus) in hits {
                let number_score = if key == number_key { 1.0 } else { 0.5 };
                matches.push(AddressMatch::Building {
                    id,
                    street: street_name.clone(),
                    full_address: self
                        .full_address(conn, id)?
                        .unwrap_or_else(|| format!("{}, {} {}", city_name, street_name, found)),
                    number: found,
                    corpus,
                    city: city_name.clone(),
                    confidence: 0.7 * street_score + 0.3 * number_score,
                });
            }
        }

        sort_matches(&mut matches);
        Ok(matches)
    }

    pub fn search_street(
        &self,
        conn: &Connection,
        street: &str,
        city: Option<&str>,
        district: Option<&str>,
    ) -> Result<Vec<AddressMatch>> {
        let city_id = match city {
            Some(city) => self.city_id(conn, city)?,
            None => None,
        };
        let district_key = district.map(|d| self.normalizer().normalize(d, ObjectKind::District));

        let mut matches = Vec::new();
        for candidate in self.index.find_similar(street, ObjectKind::Street, STREET_THRESHOLD, conn)? {
            let mut stmt = conn
                .prepare_cached(
                    "SELECT se.id, st.name_uk, c.name_uk, se.city_id, cd.name_key
                     FROM street_names sn
                     JOIN street_entities se ON se.id = sn.street_entity_id
                     JOIN street_types st ON st.id = se.street_type_id
                     JOIN cities c ON c.id = se.city_id
                     LEFT JOIN city_districts cd ON cd.id = se.city_district_id
                     WHERE sn.name = ?1 AND sn.is_current = 1
                     ORDER BY se.id",
                )
                .store_context("looking up street")?;
            let streets = stmt
                .query_map(params![candidate.name], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, Option<String>>(4)?,
                    ))
                })
                .store_context("looking up street")?
                .collect::<std::result::Result<Vec<_>, _>>()
                .store_context("looking up street")?;

            for (id, type_name, city_name, street_city, street_district) in streets {
                if city_id.is_some_and(|c| c != street_city) {
                    continue;
                }
                if district_key.is_some() && street_district.is_some() && district_key != street_district {
                    continue;
                }

                let (buildings_count, sample_buildings) = street_buildings(conn, id)?;
                matches.push(AddressMatch::Street {
                    id,
                    name: candidate.name.clone(),
                    type_name,
                    city: city_name,
                    buildings_count,
                    sample_buildings,
                    confidence: candidate.score,
                });
            }
        }

        sort_matches(&mut matches);
        Ok(matches)
    }

    pub fn search_district(&self, conn: &Connection, district: &str, city: Option<&str>) -> Result<Vec<AddressMatch>> {
        let city_id = match city {
            Some(city) => self.city_id(conn, city)?,
            None => None,
        };

        let mut matches = Vec::new();
        for candidate in self
            .index
            .find_similar(district, ObjectKind::District, DISTRICT_THRESHOLD, conn)?
            .into_iter()
            .take(10)
        {
            let found = conn
                .query_row(
                    "SELECT cd.id, cd.name_uk, cd.type, c.name_uk, cd.city_id,
                            (SELECT COUNT(*) FROM street_entities se WHERE se.city_district_id = cd.id)
                     FROM city_districts cd
                     JOIN cities c ON c.id = cd.city_id
                     WHERE cd.name_uk = ?1
                     ORDER BY cd.id LIMIT 1",
                    params![candidate.name],
                    |row| {
                        Ok((
                            row.get::<_, i64>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, String>(3)?,
                            row.get::<_, i64>(4)?,
                            row.get::<_, i64>(5)?,
                        ))
                    },
                )
                .optional()
                .store_context("looking up city district")?;

            // Candidates may also be rural districts, which have no city row
            if let Some((id, name, type_name, city_name, district_city, streets_count)) = found {
                if city_id.is_some_and(|c| c != district_city) {
                    continue;
                }
                matches.push(AddressMatch::District {
                    id,
                    name,
                    type_name,
                    city: city_name,
                    streets_count,
                    confidence: candidate.score,
                });
            }
        }

        sort_matches(&mut matches);
        Ok(matches)
    }

    /// Name matches across streets, districts and cities
    pub fn search_general(&self, conn: &Connection, query: &str) -> Result<Vec<AddressMatch>> {
        let mut matches = Vec::new();
        for kind in [ObjectKind::Street, ObjectKind::District, ObjectKind::City] {
            for candidate in self
                .index
                .find_similar(query, kind, GENERAL_THRESHOLD, conn)?
                .into_iter()
                .take(5)
            {
                matches.push(AddressMatch::Object {
                    kind,
                    name: candidate.name,
                    confidence: candidate.score,
                });
            }
        }

        sort_matches(&mut matches);
        Ok(matches)
    }

    fn suggestions(&self, conn: &Connection, query: &str) -> Result<Vec<Suggestion>> {
        let mut suggestions = Vec::new();
        for kind in [ObjectKind::Street, ObjectKind::District] {
            for candidate in self
                .index
                .find_similar(query, kind, SUGGESTION_THRESHOLD, conn)?
                .into_iter()
                .take(3)
            {
                suggestions.push(Suggestion {
                    kind,
                    text: format!("Можливо ви мали на увазі: {}?", candidate.name),
                    name: candidate.name,
                    confidence: candidate.score,
                });
            }
        }
        Ok(suggestions)
    }

    /// Canonical names of `kind` starting with `partial`, shortest first
    pub fn autocomplete(&self, conn: &Connection, partial: &str, kind: ObjectKind, limit: usize) -> Result<Vec<String>> {
        let prefix = self.normalizer().normalize(partial, kind);
        if prefix.is_empty() {
            return Ok(Vec::new());
        }

        let sql = match kind {
            ObjectKind::Street => {
                "SELECT DISTINCT name FROM street_names
                 WHERE is_current = 1 AND substr(name_key, 1, length(?1)) = ?1
                 ORDER BY length(name), name LIMIT ?2"
            }
            ObjectKind::District => {
                "SELECT DISTINCT name_uk FROM city_districts
                 WHERE substr(name_key, 1, length(?1)) = ?1
                 ORDER BY length(name_uk), name_uk LIMIT ?2"
            }
            ObjectKind::City => {
                "SELECT DISTINCT name_uk FROM cities
                 WHERE substr(name_key, 1, length(?1)) = ?1
                 ORDER BY length(name_uk), name_uk LIMIT ?2"
            }
            ObjectKind::StreetType => {
                "SELECT DISTINCT name_uk FROM street_types
                 WHERE substr(name_key, 1, length(?1)) = ?1
                 ORDER BY length(name_uk), name_uk LIMIT ?2"
            }
            ObjectKind::Building | ObjectKind::Generic => return Ok(Vec::new()),
        };

        let mut stmt = conn.prepare_cached(sql).store_context("autocomplete")?;
        let names = stmt
            .query_map(params![prefix, limit as i64], |row| row.get(0))
            .store_context("autocomplete")?
            .collect::<std::result::Result<Vec<String>, _>>()
            .store_context("autocomplete")?;

        Ok(names)
    }

    /// "<city>, <street> <type short>, <number>" for a building
    pub fn full_address(&self, conn: &Connection, building_id: i64) -> Result<Option<String>> {
        let row = conn
            .query_row(
                "SELECT c.name_uk, sn.name, st.short_name_uk, b.number, b.corpus
                 FROM buildings b
                 JOIN cities c ON c.id = b.city_id
                 LEFT JOIN street_entities se ON se.id = b.street_entity_id
                 LEFT JOIN street_names sn ON sn.street_entity_id = se.id AND sn.is_current = 1
                 LEFT JOIN street_types st ON st.id = se.street_type_id
                 WHERE b.id = ?1",
                params![building_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, Option<String>>(4)?,
                    ))
                },
            )
            .optional()
            .store_context("building address")?;

        Ok(row.map(|(city, street, short_type, number, corpus)| {
            let number = building_number(&number, corpus.as_deref());
            match (street, short_type) {
                (Some(street), Some(short_type)) => format!("{}, {} {}, {}", city, street, short_type, number),
                (Some(street), None) => format!("{}, {}, {}", city, street, number),
                _ => format!("{}, {}", city, number),
            }
        }))
    }

    fn city_id(&self, conn: &Connection, city: &str) -> Result<Option<i64>> {
        conn.query_row(
            "SELECT id FROM cities WHERE name_key = ?1 ORDER BY id LIMIT 1",
            params![self.normalizer().normalize(city, ObjectKind::City)],
            |row| row.get(0),
        )
        .optional()
        .store_context("looking up city")
    }
}

impl Default for AddressSearchEngine {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// HELPERS
// ============================================================================

/// (street id, current name, city name), restricted to one city when given
fn current_streets(conn: &Connection, city_id: Option<i64>) -> Result<Vec<(i64, String, String)>> {
    let mut stmt = conn
        .prepare_cached(
            "SELECT se.id, sn.name, c.name_uk
             FROM street_entities se
             JOIN street_names sn ON sn.street_entity_id = se.id AND sn.is_current = 1
             JOIN cities c ON c.id = se.city_id
             WHERE ?1 IS NULL OR se.city_id = ?1
             ORDER BY se.id",
        )
        .store_context("listing streets")?;

    let streets = stmt
        .query_map(params![city_id], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
        .store_context("listing streets")?
        .collect::<std::result::Result<Vec<_>, _>>()
        .store_context("listing streets")?;

    Ok(streets)
}

fn street_buildings(conn: &Connection, street_id: i64) -> Result<(i64, Vec<String>)> {
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM buildings WHERE street_entity_id = ?1",
            params![street_id],
            |row| row.get(0),
        )
        .store_context("counting street buildings")?;

    let mut stmt = conn
        .prepare_cached("SELECT number FROM buildings WHERE street_entity_id = ?1 ORDER BY number LIMIT 5")
        .store_context("sampling street buildings")?;
    let sample = stmt
        .query_map(params![street_id], |row| row.get(0))
        .store_context("sampling street buildings")?
        .collect::<std::result::Result<Vec<String>, _>>()
        .store_context("sampling street buildings")?;

    Ok((count, sample))
}

fn sort_matches(matches: &mut [AddressMatch]) {
    matches.sort_by(|a, b| b.confidence().total_cmp(&a.confidence()));
}

fn is_building_number(token: &str) -> bool {
    token.chars().next().is_some_and(|c| c.is_ascii_digit()) && token.chars().count() <= 8
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::setup_database;
    use crate::pipeline::Migrator;
    use crate::resolver::Mode;
    use crate::sources::{EkAddrRow, EkAddrSource, SourceKind, SourceRow, SourceSchema};

    fn migrated_store(rows: &[(&str, &str, &str)]) -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let source = EkAddrSource::new();
        let rows = rows
            .iter()
            .map(|(district, street, build)| {
                let row = EkAddrRow {
                    district: Some(district.to_string()),
                    street: Some(street.to_string()),
                    build: Some(build.to_string()),
                    ..Default::default()
                };
                SourceRow {
                    line: 2,
                    row_key: source.row_key(&row),
                    record: Ok(source.to_record(&row, 2)),
                }
            })
            .collect();

        let mut migrator = Migrator::new(conn, Mode::Live).unwrap();
        migrator.run_rows(SourceKind::EkAddr, rows).unwrap();
        migrator.into_connection()
    }

    #[test]
    fn test_parse_city_street_building() {
        let engine = AddressSearchEngine::new();
        let parsed = engine.parse_free_text("Дніпро, Старий Шлях 192");

        assert_eq!(parsed.street.as_deref(), Some("Старий Шлях"));
        assert_eq!(parsed.building.as_deref(), Some("192"));
        assert_eq!(parsed.city, "Дніпро");
        assert_eq!(parsed.district, None);
    }

    #[test]
    fn test_parse_type_and_building_indicator() {
        let engine = AddressSearchEngine::new();
        let parsed = engine.parse_free_text("Кірова вул., буд. 100");

        assert_eq!(parsed.street.as_deref(), Some("Кірова"));
        assert_eq!(parsed.street_type.as_deref(), Some("вул"));
        assert_eq!(parsed.building.as_deref(), Some("100"));
    }

    #[test]
    fn test_parse_district() {
        let engine = AddressSearchEngine::new();
        let parsed = engine.parse_free_text("Таромський район, Золотоосіння 117");

        assert_eq!(parsed.district.as_deref(), Some("Таромський"));
        assert_eq!(parsed.street.as_deref(), Some("Золотоосіння"));
        assert_eq!(parsed.building.as_deref(), Some("117"));

        let only_district = engine.parse_free_text("Таромський район");
        assert_eq!(only_district.district.as_deref(), Some("Таромський"));
        assert_eq!(only_district.street, None);
    }

    #[test]
    fn test_search_building_and_full_address() {
        let conn = migrated_store(&[("Самарський", "Старий Шлях", "192"), ("Самарський", "Робоча", "5")]);
        let engine = AddressSearchEngine::new();

        let results = engine.search_by_free_text(&conn, "Дніпро, Старий Шлях 192", DEFAULT_LIMIT).unwrap();
        assert_eq!(results.total_found, 1);
        match &results.matches[0] {
            AddressMatch::Building {
                full_address,
                confidence,
                ..
            } => {
                assert_eq!(full_address, "Дніпро, Старий Шлях вул., 192");
                assert!((*confidence - 1.0).abs() < 1e-9);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_search_district_counts_streets() {
        let conn = migrated_store(&[("Самарський", "Старий Шлях", "192"), ("Самарський", "Робоча", "5")]);
        let engine = AddressSearchEngine::new();

        let matches = engine.search_district(&conn, "Самарський", Some(DEFAULT_CITY)).unwrap();
        assert_eq!(matches.len(), 1);
        assert!(matches!(matches[0], AddressMatch::District { streets_count: 2, .. }));
    }

    #[test]
    fn test_autocomplete_prefix() {
        let conn = migrated_store(&[
            ("Самарський", "Старий Шлях", "192"),
            ("Самарський", "Старокозацька", "1"),
            ("Самарський", "Робоча", "5"),
        ]);
        let engine = AddressSearchEngine::new();

        let names = engine.autocomplete(&conn, "стар", ObjectKind::Street, 10).unwrap();
        assert_eq!(names, vec!["Старий Шлях".to_string(), "Старокозацька".to_string()]);
        assert!(engine.autocomplete(&conn, "  ", ObjectKind::Street, 10).unwrap().is_empty());
    }

    #[test]
    fn test_no_match_returns_suggestions() {
        let conn = migrated_store(&[("Самарський", "Старий Шлях", "192")]);
        let engine = AddressSearchEngine::new();

        let results = engine.search_by_free_text(&conn, "Старий Шлак 999", DEFAULT_LIMIT).unwrap();
        assert!(results.matches.is_empty());
        assert!(results.suggestions.iter().any(|s| s.name == "Старий Шлях"));
    }
}

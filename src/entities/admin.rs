// 🏛️ Administrative Units - country → region → district → community → city → city district
// Each level hangs under exactly one parent; names are unique per parent

use super::{query_id, query_siblings, EntityRecord, NaturalKey, Repository, Scope, Sibling, Table};
use crate::error::Result;
use crate::normalizer::{ObjectKind, TextNormalizer};
use rusqlite::{params, Connection};

// ============================================================================
// RECORDS
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct NewCountry {
    pub natural_key: String,
    pub name: String,
    pub name_key: String,
    pub iso_code: String,
}

impl NewCountry {
    pub fn new(normalizer: &TextNormalizer, name: &str, iso_code: &str) -> Self {
        NewCountry {
            natural_key: NaturalKey::Code(iso_code.to_uppercase()).to_string(),
            name: normalizer.clean(name, ObjectKind::Generic),
            name_key: normalizer.normalize(name, ObjectKind::Generic),
            iso_code: iso_code.to_uppercase(),
        }
    }
}

impl EntityRecord for NewCountry {
    fn natural_key(&self) -> &str {
        &self.natural_key
    }

    fn display_name(&self) -> &str {
        &self.name
    }

    fn name_key(&self) -> &str {
        &self.name_key
    }

    fn scope(&self) -> Scope {
        Scope::root()
    }
}

/// Region, district, community, city or city district
#[derive(Debug, Clone, PartialEq)]
pub struct NewAdminUnit {
    pub natural_key: String,
    pub name: String,
    pub name_key: String,
    pub parent_id: i64,

    /// `міська`/`сільська` for communities, `м.` for cities, `адміністративний` for city districts
    pub unit_type: Option<String>,

    /// Identifier the source system uses for this unit
    pub source_code: Option<String>,
}

impl NewAdminUnit {
    /// `source_key` wins when present; otherwise the name scoped to the parent is the key
    pub fn new(
        normalizer: &TextNormalizer,
        kind: ObjectKind,
        name: &str,
        parent_id: i64,
        source_key: Option<NaturalKey>,
    ) -> Self {
        let name_key = normalizer.normalize(name, kind);
        let source_code = match &source_key {
            Some(NaturalKey::Source { id, .. }) => Some(id.clone()),
            _ => None,
        };
        let natural_key = source_key
            .unwrap_or_else(|| NaturalKey::Scoped {
                scope: Scope::under(parent_id),
                name_key: name_key.clone(),
            })
            .to_string();

        NewAdminUnit {
            natural_key,
            name: normalizer.clean(name, ObjectKind::Generic),
            name_key,
            parent_id,
            unit_type: None,
            source_code,
        }
    }

    pub fn with_type(mut self, unit_type: impl Into<String>) -> Self {
        self.unit_type = Some(unit_type.into());
        self
    }
}

impl EntityRecord for NewAdminUnit {
    fn natural_key(&self) -> &str {
        &self.natural_key
    }

    fn display_name(&self) -> &str {
        &self.name
    }

    fn name_key(&self) -> &str {
        &self.name_key
    }

    fn scope(&self) -> Scope {
        Scope::under(self.parent_id)
    }
}

/// Community type derived from its name
pub fn community_type(name: &str) -> &'static str {
    if name.to_lowercase().contains("міська") {
        "міська"
    } else {
        "сільська"
    }
}

pub const DEFAULT_CITY_TYPE: &str = "м.";
pub const CITY_DISTRICT_TYPE: &str = "адміністративний";

// ============================================================================
// COUNTRIES
// ============================================================================

pub struct CountryRepo;

impl Repository for CountryRepo {
    type Record = NewCountry;

    const TABLE: Table = Table::Country;
    const KIND: ObjectKind = ObjectKind::Generic;
    const FUZZY: bool = false;

    fn find_by_natural_key(conn: &Connection, key: &str) -> Result<Option<i64>> {
        query_id(conn, "SELECT id FROM countries WHERE natural_key = ?1", params![key], Self::TABLE)
    }

    fn find_by_name(conn: &Connection, _scope: Scope, name_key: &str) -> Result<Option<i64>> {
        query_id(
            conn,
            "SELECT id FROM countries WHERE name_key = ?1 ORDER BY id LIMIT 1",
            params![name_key],
            Self::TABLE,
        )
    }

    fn siblings(conn: &Connection, _scope: Scope) -> Result<Vec<Sibling>> {
        query_siblings(conn, "SELECT id, name_uk FROM countries ORDER BY id", [], Self::TABLE)
    }

    fn insert(conn: &Connection, record: &NewCountry) -> Result<Option<i64>> {
        query_id(
            conn,
            "INSERT INTO countries (natural_key, name_uk, name_key, iso_code)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(natural_key) DO NOTHING
             RETURNING id",
            params![record.natural_key, record.name, record.name_key, record.iso_code],
            Self::TABLE,
        )
    }
}

// ============================================================================
// REGIONS
// ============================================================================

pub struct RegionRepo;

impl Repository for RegionRepo {
    type Record = NewAdminUnit;

    const TABLE: Table = Table::Region;
    const KIND: ObjectKind = ObjectKind::Generic;
    const FUZZY: bool = true;

    fn find_by_natural_key(conn: &Connection, key: &str) -> Result<Option<i64>> {
        query_id(conn, "SELECT id FROM regions WHERE natural_key = ?1", params![key], Self::TABLE)
    }

    fn find_by_name(conn: &Connection, scope: Scope, name_key: &str) -> Result<Option<i64>> {
        query_id(
            conn,
            "SELECT id FROM regions WHERE country_id IS ?1 AND name_key = ?2 ORDER BY id LIMIT 1",
            params![scope.parent, name_key],
            Self::TABLE,
        )
    }

    fn siblings(conn: &Connection, scope: Scope) -> Result<Vec<Sibling>> {
        query_siblings(
            conn,
            "SELECT id, name_uk FROM regions WHERE country_id IS ?1 ORDER BY id",
            params![scope.parent],
            Self::TABLE,
        )
    }

    fn insert(conn: &Connection, record: &NewAdminUnit) -> Result<Option<i64>> {
        query_id(
            conn,
            "INSERT INTO regions (natural_key, name_uk, name_key, country_id, source_code)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(natural_key) DO NOTHING
             RETURNING id",
            params![
                record.natural_key,
                record.name,
                record.name_key,
                record.parent_id,
                record.source_code
            ],
            Self::TABLE,
        )
    }
}

// ============================================================================
// DISTRICTS
// ============================================================================

pub struct DistrictRepo;

impl Repository for DistrictRepo {
    type Record = NewAdminUnit;

    const TABLE: Table = Table::District;
    const KIND: ObjectKind = ObjectKind::District;
    const FUZZY: bool = true;

    fn find_by_natural_key(conn: &Connection, key: &str) -> Result<Option<i64>> {
        query_id(conn, "SELECT id FROM districts WHERE natural_key = ?1", params![key], Self::TABLE)
    }

    fn find_by_name(conn: &Connection, scope: Scope, name_key: &str) -> Result<Option<i64>> {
        query_id(
            conn,
            "SELECT id FROM districts WHERE region_id IS ?1 AND name_key = ?2 ORDER BY id LIMIT 1",
            params![scope.parent, name_key],
            Self::TABLE,
        )
    }

    fn siblings(conn: &Connection, scope: Scope) -> Result<Vec<Sibling>> {
        query_siblings(
            conn,
            "SELECT id, name_uk FROM districts WHERE region_id IS ?1 ORDER BY id",
            params![scope.parent],
            Self::TABLE,
        )
    }

    fn insert(conn: &Connection, record: &NewAdminUnit) -> Result<Option<i64>> {
        query_id(
            conn,
            "INSERT INTO districts (natural_key, name_uk, name_key, region_id, source_code)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(natural_key) DO NOTHING
             RETURNING id",
            params![
                record.natural_key,
                record.name,
                record.name_key,
                record.parent_id,
                record.source_code
            ],
            Self::TABLE,
        )
    }
}

// ============================================================================
// COMMUNITIES
// ============================================================================

pub struct CommunityRepo;

impl Repository for CommunityRepo {
    type Record = NewAdminUnit;

    const TABLE: Table = Table::Community;
    const KIND: ObjectKind = ObjectKind::Generic;
    const FUZZY: bool = true;

    fn find_by_natural_key(conn: &Connection, key: &str) -> Result<Option<i64>> {
        query_id(conn, "SELECT id FROM communities WHERE natural_key = ?1", params![key], Self::TABLE)
    }

    fn find_by_name(conn: &Connection, scope: Scope, name_key: &str) -> Result<Option<i64>> {
        query_id(
            conn,
            "SELECT id FROM communities WHERE district_id IS ?1 AND name_key = ?2 ORDER BY id LIMIT 1",
            params![scope.parent, name_key],
            Self::TABLE,
        )
    }

    fn siblings(conn: &Connection, scope: Scope) -> Result<Vec<Sibling>> {
        query_siblings(
            conn,
            "SELECT id, name_uk FROM communities WHERE district_id IS ?1 ORDER BY id",
            params![scope.parent],
            Self::TABLE,
        )
    }

    fn insert(conn: &Connection, record: &NewAdminUnit) -> Result<Option<i64>> {
        query_id(
            conn,
            "INSERT INTO communities (natural_key, name_uk, name_key, district_id, type, source_code)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(natural_key) DO NOTHING
             RETURNING id",
            params![
                record.natural_key,
                record.name,
                record.name_key,
                record.parent_id,
                record.unit_type,
                record.source_code
            ],
            Self::TABLE,
        )
    }
}

// ============================================================================
// CITIES
// ============================================================================

pub struct CityRepo;

impl Repository for CityRepo {
    type Record = NewAdminUnit;

    const TABLE: Table = Table::City;
    const KIND: ObjectKind = ObjectKind::City;
    const FUZZY: bool = true;

    fn find_by_natural_key(conn: &Connection, key: &str) -> Result<Option<i64>> {
        query_id(conn, "SELECT id FROM cities WHERE natural_key = ?1", params![key], Self::TABLE)
    }

    fn find_by_name(conn: &Connection, scope: Scope, name_key: &str) -> Result<Option<i64>> {
        query_id(
            conn,
            "SELECT id FROM cities WHERE community_id IS ?1 AND name_key = ?2 ORDER BY id LIMIT 1",
            params![scope.parent, name_key],
            Self::TABLE,
        )
    }

    fn siblings(conn: &Connection, scope: Scope) -> Result<Vec<Sibling>> {
        query_siblings(
            conn,
            "SELECT id, name_uk FROM cities WHERE community_id IS ?1 ORDER BY id",
            params![scope.parent],
            Self::TABLE,
        )
    }

    fn insert(conn: &Connection, record: &NewAdminUnit) -> Result<Option<i64>> {
        query_id(
            conn,
            "INSERT INTO cities (natural_key, name_uk, name_key, community_id, type, source_code)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(natural_key) DO NOTHING
             RETURNING id",
            params![
                record.natural_key,
                record.name,
                record.name_key,
                record.parent_id,
                record.unit_type.as_deref().unwrap_or(DEFAULT_CITY_TYPE),
                record.source_code
            ],
            Self::TABLE,
        )
    }
}

// ============================================================================
// CITY DISTRICTS
// ============================================================================

pub struct CityDistrictRepo;

impl Repository for CityDistrictRepo {
    type Record = NewAdminUnit;

    const TABLE: Table = Table::CityDistrict;
    const KIND: ObjectKind = ObjectKind::District;
    const FUZZY: bool = true;

    fn find_by_natural_key(conn: &Connection, key: &str) -> Result<Option<i64>> {
        query_id(conn, "SELECT id FROM city_districts WHERE natural_key = ?1", params![key], Self::TABLE)
    }

    fn find_by_name(conn: &Connection, scope: Scope, name_key: &str) -> Result<Option<i64>> {
        query_id(
            conn,
            "SELECT id FROM city_districts WHERE city_id IS ?1 AND name_key = ?2 ORDER BY id LIMIT 1",
            params![scope.parent, name_key],
            Self::TABLE,
        )
    }

    fn siblings(conn: &Connection, scope: Scope) -> Result<Vec<Sibling>> {
        query_siblings(
            conn,
            "SELECT id, name_uk FROM city_districts WHERE city_id IS ?1 ORDER BY id",
            params![scope.parent],
            Self::TABLE,
        )
    }

    fn insert(conn: &Connection, record: &NewAdminUnit) -> Result<Option<i64>> {
        query_id(
            conn,
            "INSERT INTO city_districts (natural_key, name_uk, name_key, city_id, type, source_code)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(natural_key) DO NOTHING
             RETURNING id",
            params![
                record.natural_key,
                record.name,
                record.name_key,
                record.parent_id,
                record.unit_type.as_deref().unwrap_or(CITY_DISTRICT_TYPE),
                record.source_code
            ],
            Self::TABLE,
        )
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::setup_database;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    #[test]
    fn test_country_insert_is_conflict_tolerant() {
        let conn = setup();
        let normalizer = TextNormalizer::new();
        let ua = NewCountry::new(&normalizer, "Україна", "ua");

        let first = CountryRepo::insert(&conn, &ua).unwrap();
        let second = CountryRepo::insert(&conn, &ua).unwrap();

        assert!(first.is_some());
        assert_eq!(second, None);
        assert_eq!(CountryRepo::find_by_natural_key(&conn, "UA").unwrap(), first);
    }

    #[test]
    fn test_named_key_falls_back_to_scope() {
        let normalizer = TextNormalizer::new();
        let unit = NewAdminUnit::new(&normalizer, ObjectKind::District, "Самарський район", 4, None);

        assert_eq!(unit.natural_key, "name:4:-:самарський");
        assert_eq!(unit.name, "Самарський район");
        assert_eq!(unit.source_code, None);

        let keyed = NewAdminUnit::new(
            &normalizer,
            ObjectKind::City,
            "Дніпро",
            3,
            Some(NaturalKey::Source {
                source: "rtg".into(),
                id: "5".into(),
            }),
        );
        assert_eq!(keyed.natural_key, "rtg:5");
        assert_eq!(keyed.source_code.as_deref(), Some("5"));
    }

    #[test]
    fn test_region_lookup_by_name_under_parent() {
        let conn = setup();
        let normalizer = TextNormalizer::new();
        let country = CountryRepo::insert(&conn, &NewCountry::new(&normalizer, "Україна", "UA"))
            .unwrap()
            .unwrap();

        let region = NewAdminUnit::new(&normalizer, ObjectKind::Generic, "Дніпропетровська область", country, None);
        let id = RegionRepo::insert(&conn, &region).unwrap().unwrap();

        assert_eq!(
            RegionRepo::find_by_name(&conn, Scope::under(country), "дніпропетровська область").unwrap(),
            Some(id)
        );
        assert_eq!(
            RegionRepo::find_by_name(&conn, Scope::under(country + 100), "дніпропетровська область").unwrap(),
            None
        );
        assert_eq!(RegionRepo::siblings(&conn, Scope::under(country)).unwrap().len(), 1);
    }

    #[test]
    fn test_community_type_from_name() {
        assert_eq!(community_type("Дніпровська міська громада"), "міська");
        assert_eq!(community_type("Слобожанська громада"), "сільська");
    }
}

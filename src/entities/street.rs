// 🛣️ Streets - street types, street entities and their name aliases
// A street is identified by (city, type, name); each has exactly one current name

use super::{query_id, query_siblings, EntityRecord, NaturalKey, Repository, Scope, Sibling, Table};
use crate::error::{Result, StoreContext};
use crate::normalizer::{ObjectKind, TextNormalizer};
use rusqlite::{params, Connection};

// ============================================================================
// STREET TYPES
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct NewStreetType {
    pub natural_key: String,

    /// Full form, e.g. "проспект"
    pub name: String,
    pub name_key: String,

    /// Short form, e.g. "просп."
    pub short_name: String,
}

impl NewStreetType {
    pub fn new(normalizer: &TextNormalizer, raw: &str) -> Self {
        let name = normalizer.clean(raw, ObjectKind::StreetType);
        let name_key = normalizer.normalize(raw, ObjectKind::StreetType);

        NewStreetType {
            natural_key: NaturalKey::Scoped {
                scope: Scope::root(),
                name_key: name_key.clone(),
            }
            .to_string(),
            short_name: normalizer.short_form(raw),
            name,
            name_key,
        }
    }
}

impl EntityRecord for NewStreetType {
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

pub struct StreetTypeRepo;

impl Repository for StreetTypeRepo {
    type Record = NewStreetType;

    const TABLE: Table = Table::StreetType;
    const KIND: ObjectKind = ObjectKind::StreetType;
    const FUZZY: bool = true;

    fn find_by_natural_key(conn: &Connection, key: &str) -> Result<Option<i64>> {
        query_id(conn, "SELECT id FROM street_types WHERE natural_key = ?1", params![key], Self::TABLE)
    }

    fn find_by_name(conn: &Connection, _scope: Scope, name_key: &str) -> Result<Option<i64>> {
        query_id(
            conn,
            "SELECT id FROM street_types
             WHERE name_key = ?1 OR lower(short_name_uk) = ?1
             ORDER BY id LIMIT 1",
            params![name_key],
            Self::TABLE,
        )
    }

    fn siblings(conn: &Connection, _scope: Scope) -> Result<Vec<Sibling>> {
        query_siblings(conn, "SELECT id, name_uk FROM street_types ORDER BY id", [], Self::TABLE)
    }

    fn insert(conn: &Connection, record: &NewStreetType) -> Result<Option<i64>> {
        query_id(
            conn,
            "INSERT INTO street_types (natural_key, name_uk, name_key, short_name_uk)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(natural_key) DO NOTHING
             RETURNING id",
            params![record.natural_key, record.name, record.name_key, record.short_name],
            Self::TABLE,
        )
    }
}

// ============================================================================
// STREET ENTITIES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreetNameType {
    /// The name in use today
    Official,

    /// Historical name taken from a secondary address field
    Old,

    /// Spelling seen in a source that fuzzy-matched an existing street
    Variant,
}

impl StreetNameType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreetNameType::Official => "official",
            StreetNameType::Old => "old",
            StreetNameType::Variant => "variant",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewStreet {
    pub natural_key: String,

    /// Current name as stored
    pub name: String,
    pub name_key: String,
    pub city_id: i64,
    pub city_district_id: Option<i64>,
    pub street_type_id: i64,
    pub source_code: Option<String>,
}

impl NewStreet {
    /// Streets are name-keyed under (city, street type) for every source
    pub fn new(
        normalizer: &TextNormalizer,
        name: &str,
        city_id: i64,
        city_district_id: Option<i64>,
        street_type_id: i64,
    ) -> Self {
        let name_key = normalizer.normalize(name, ObjectKind::Street);
        let scope = Scope {
            parent: Some(city_id),
            qualifier: Some(street_type_id),
        };

        NewStreet {
            natural_key: NaturalKey::Scoped {
                scope,
                name_key: name_key.clone(),
            }
            .to_string(),
            name: normalizer.clean(name, ObjectKind::Street),
            name_key,
            city_id,
            city_district_id,
            street_type_id,
            source_code: None,
        }
    }

    pub fn with_source_code(mut self, code: Option<String>) -> Self {
        self.source_code = code;
        self
    }
}

impl EntityRecord for NewStreet {
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
        Scope {
            parent: Some(self.city_id),
            qualifier: Some(self.street_type_id),
        }
    }
}

pub struct StreetRepo;

impl StreetRepo {
    /// Insert-or-ignore a non-current alias; true when a new name row was written
    pub fn add_alias(
        conn: &Connection,
        street_id: i64,
        name: &str,
        name_key: &str,
        name_type: StreetNameType,
    ) -> Result<bool> {
        let changed = conn
            .execute(
                "INSERT INTO street_names (street_entity_id, name, name_key, language_code, is_current, name_type)
                 VALUES (?1, ?2, ?3, 'uk', 0, ?4)
                 ON CONFLICT(street_entity_id, name) DO NOTHING",
                params![street_id, name, name_key, name_type.as_str()],
            )
            .store_context("adding street alias")?;

        Ok(changed > 0)
    }

    pub fn has_name(conn: &Connection, street_id: i64, name: &str) -> Result<bool> {
        let found = query_id(
            conn,
            "SELECT id FROM street_names WHERE street_entity_id = ?1 AND name = ?2",
            params![street_id, name],
            Table::StreetName,
        )?;
        Ok(found.is_some())
    }
}

impl Repository for StreetRepo {
    type Record = NewStreet;

    const TABLE: Table = Table::Street;
    const KIND: ObjectKind = ObjectKind::Street;
    const FUZZY: bool = true;

    fn find_by_natural_key(conn: &Connection, key: &str) -> Result<Option<i64>> {
        query_id(conn, "SELECT id FROM street_entities WHERE natural_key = ?1", params![key], Self::TABLE)
    }

    /// Matches the current name or any alias
    fn find_by_name(conn: &Connection, scope: Scope, name_key: &str) -> Result<Option<i64>> {
        query_id(
            conn,
            "SELECT se.id FROM street_entities se
             WHERE se.city_id IS ?1 AND se.street_type_id IS ?2
               AND (se.name_key = ?3
                    OR EXISTS (SELECT 1 FROM street_names sn
                               WHERE sn.street_entity_id = se.id AND sn.name_key = ?3))
             ORDER BY se.id LIMIT 1",
            params![scope.parent, scope.qualifier, name_key],
            Self::TABLE,
        )
    }

    fn siblings(conn: &Connection, scope: Scope) -> Result<Vec<Sibling>> {
        query_siblings(
            conn,
            "SELECT se.id, sn.name FROM street_entities se
             JOIN street_names sn ON sn.street_entity_id = se.id AND sn.is_current = 1
             WHERE se.city_id IS ?1 AND se.street_type_id IS ?2
             ORDER BY se.id",
            params![scope.parent, scope.qualifier],
            Self::TABLE,
        )
    }

    /// Inserts the entity and its current name
    fn insert(conn: &Connection, record: &NewStreet) -> Result<Option<i64>> {
        let id = query_id(
            conn,
            "INSERT INTO street_entities (natural_key, name_key, city_id, city_district_id, street_type_id, source_code)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(natural_key) DO NOTHING
             RETURNING id",
            params![
                record.natural_key,
                record.name_key,
                record.city_id,
                record.city_district_id,
                record.street_type_id,
                record.source_code
            ],
            Self::TABLE,
        )?;

        if let Some(street_id) = id {
            conn.execute(
                "INSERT INTO street_names (street_entity_id, name, name_key, language_code, is_current, name_type)
                 VALUES (?1, ?2, ?3, 'uk', 1, ?4)",
                params![street_id, record.name, record.name_key, StreetNameType::Official.as_str()],
            )
            .store_context("inserting current street name")?;
        }

        Ok(id)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::setup_database;
    use crate::entities::admin::{CityRepo, CommunityRepo, CountryRepo, DistrictRepo, NewAdminUnit, NewCountry, RegionRepo};

    /// Returns (conn, city_id, street_type_id)
    fn setup() -> (Connection, i64, i64) {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        let n = TextNormalizer::new();

        let country = CountryRepo::insert(&conn, &NewCountry::new(&n, "Україна", "UA")).unwrap().unwrap();
        let region = RegionRepo::insert(&conn, &NewAdminUnit::new(&n, ObjectKind::Generic, "Область", country, None))
            .unwrap()
            .unwrap();
        let district = DistrictRepo::insert(&conn, &NewAdminUnit::new(&n, ObjectKind::District, "Район", region, None))
            .unwrap()
            .unwrap();
        let community =
            CommunityRepo::insert(&conn, &NewAdminUnit::new(&n, ObjectKind::Generic, "Громада", district, None))
                .unwrap()
                .unwrap();
        let city = CityRepo::insert(&conn, &NewAdminUnit::new(&n, ObjectKind::City, "Дніпро", community, None))
            .unwrap()
            .unwrap();
        let street_type = StreetTypeRepo::insert(&conn, &NewStreetType::new(&n, "вул."))
            .unwrap()
            .unwrap();

        (conn, city, street_type)
    }

    #[test]
    fn test_street_type_record_uses_full_and_short_forms() {
        let n = TextNormalizer::new();
        let record = NewStreetType::new(&n, "ПРОСП.");

        assert_eq!(record.name, "проспект");
        assert_eq!(record.short_name, "просп.");
        assert_eq!(record.natural_key, "name:-:-:проспект");
    }

    #[test]
    fn test_street_type_found_by_short_name() {
        let (conn, _, street_type) = setup();
        assert_eq!(
            StreetTypeRepo::find_by_name(&conn, Scope::root(), "вул.").unwrap(),
            Some(street_type)
        );
    }

    #[test]
    fn test_street_insert_writes_current_name() {
        let (conn, city, street_type) = setup();
        let n = TextNormalizer::new();
        let street = NewStreet::new(&n, "Старий Шлях", city, None, street_type);

        let id = StreetRepo::insert(&conn, &street).unwrap().unwrap();
        let current: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM street_names WHERE street_entity_id = ?1 AND is_current = 1",
                [id],
                |row| row.get(0),
            )
            .unwrap();

        assert_eq!(current, 1);
        assert_eq!(StreetRepo::insert(&conn, &street).unwrap(), None);
    }

    #[test]
    fn test_alias_lookup_and_idempotence() {
        let (conn, city, street_type) = setup();
        let n = TextNormalizer::new();
        let id = StreetRepo::insert(&conn, &NewStreet::new(&n, "Старий Шлях", city, None, street_type))
            .unwrap()
            .unwrap();

        assert!(StreetRepo::add_alias(&conn, id, "Леніна", "леніна", StreetNameType::Old).unwrap());
        assert!(!StreetRepo::add_alias(&conn, id, "Леніна", "леніна", StreetNameType::Old).unwrap());
        assert!(!StreetRepo::add_alias(&conn, id, "Старий Шлях", "старий шлях", StreetNameType::Old).unwrap());

        let scope = Scope {
            parent: Some(city),
            qualifier: Some(street_type),
        };
        assert_eq!(StreetRepo::find_by_name(&conn, scope, "леніна").unwrap(), Some(id));
        assert_eq!(StreetRepo::siblings(&conn, scope).unwrap().len(), 1);
        assert!(StreetRepo::has_name(&conn, id, "Леніна").unwrap());
    }
}

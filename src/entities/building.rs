// 🏠 Buildings & Premises - leaf levels of the registry
// Keyed by source ids; an exact number under the same parent also resolves

use super::{query_id, query_siblings, EntityRecord, Repository, Scope, Sibling, Table};
use crate::error::Result;
use crate::normalizer::{ObjectKind, TextNormalizer};
use rusqlite::{params, Connection};

// ============================================================================
// BUILDINGS
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct NewBuilding {
    pub natural_key: String,

    /// Number with corpus appended, e.g. "12/1"
    pub number: String,
    pub name_key: String,
    pub street_id: Option<i64>,
    pub city_id: i64,
    pub corpus: Option<String>,
    pub postal_code: Option<String>,
    pub source_code: Option<String>,
}

impl NewBuilding {
    pub fn new(
        normalizer: &TextNormalizer,
        natural_key: String,
        number: &str,
        street_id: Option<i64>,
        city_id: i64,
    ) -> Self {
        NewBuilding {
            natural_key,
            number: normalizer.clean(number, ObjectKind::Building),
            name_key: normalizer.normalize(number, ObjectKind::Building),
            street_id,
            city_id,
            corpus: None,
            postal_code: None,
            source_code: None,
        }
    }
}

impl EntityRecord for NewBuilding {
    fn natural_key(&self) -> &str {
        &self.natural_key
    }

    fn display_name(&self) -> &str {
        &self.number
    }

    fn name_key(&self) -> &str {
        &self.name_key
    }

    fn scope(&self) -> Scope {
        Scope {
            parent: self.street_id,
            qualifier: Some(self.city_id),
        }
    }
}

pub struct BuildingRepo;

impl Repository for BuildingRepo {
    type Record = NewBuilding;

    const TABLE: Table = Table::Building;
    const KIND: ObjectKind = ObjectKind::Building;
    const FUZZY: bool = false;

    fn find_by_natural_key(conn: &Connection, key: &str) -> Result<Option<i64>> {
        query_id(conn, "SELECT id FROM buildings WHERE natural_key = ?1", params![key], Self::TABLE)
    }

    fn find_by_name(conn: &Connection, scope: Scope, name_key: &str) -> Result<Option<i64>> {
        query_id(
            conn,
            "SELECT id FROM buildings
             WHERE street_entity_id IS ?1 AND city_id IS ?2 AND name_key = ?3
             ORDER BY id LIMIT 1",
            params![scope.parent, scope.qualifier, name_key],
            Self::TABLE,
        )
    }

    fn siblings(conn: &Connection, scope: Scope) -> Result<Vec<Sibling>> {
        query_siblings(
            conn,
            "SELECT id, number FROM buildings WHERE street_entity_id IS ?1 AND city_id IS ?2 ORDER BY id",
            params![scope.parent, scope.qualifier],
            Self::TABLE,
        )
    }

    fn insert(conn: &Connection, record: &NewBuilding) -> Result<Option<i64>> {
        query_id(
            conn,
            "INSERT INTO buildings (natural_key, number, name_key, street_entity_id, city_id, corpus, postal_code, source_code)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(natural_key) DO NOTHING
             RETURNING id",
            params![
                record.natural_key,
                record.number,
                record.name_key,
                record.street_id,
                record.city_id,
                record.corpus,
                record.postal_code,
                record.source_code
            ],
            Self::TABLE,
        )
    }
}

// ============================================================================
// PREMISES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PremiseType {
    Apartment,
    Room,
}

impl PremiseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PremiseType::Apartment => "квартира",
            PremiseType::Room => "кімната",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewPremise {
    pub natural_key: String,
    pub number: String,
    pub name_key: String,
    pub building_id: i64,
    pub premise_type: PremiseType,
    pub floor: Option<String>,
    pub entrance: Option<String>,
}

impl NewPremise {
    pub fn new(
        normalizer: &TextNormalizer,
        natural_key: String,
        number: &str,
        building_id: i64,
        premise_type: PremiseType,
    ) -> Self {
        NewPremise {
            natural_key,
            number: normalizer.clean(number, ObjectKind::Building),
            name_key: normalizer.normalize(number, ObjectKind::Building),
            building_id,
            premise_type,
            floor: None,
            entrance: None,
        }
    }
}

impl EntityRecord for NewPremise {
    fn natural_key(&self) -> &str {
        &self.natural_key
    }

    fn display_name(&self) -> &str {
        &self.number
    }

    fn name_key(&self) -> &str {
        &self.name_key
    }

    fn scope(&self) -> Scope {
        Scope::under(self.building_id)
    }
}

pub struct PremiseRepo;

impl Repository for PremiseRepo {
    type Record = NewPremise;

    const TABLE: Table = Table::Premise;
    const KIND: ObjectKind = ObjectKind::Building;
    const FUZZY: bool = false;

    fn find_by_natural_key(conn: &Connection, key: &str) -> Result<Option<i64>> {
        query_id(conn, "SELECT id FROM premises WHERE natural_key = ?1", params![key], Self::TABLE)
    }

    fn find_by_name(conn: &Connection, scope: Scope, name_key: &str) -> Result<Option<i64>> {
        query_id(
            conn,
            "SELECT id FROM premises WHERE building_id IS ?1 AND name_key = ?2 ORDER BY id LIMIT 1",
            params![scope.parent, name_key],
            Self::TABLE,
        )
    }

    fn siblings(conn: &Connection, scope: Scope) -> Result<Vec<Sibling>> {
        query_siblings(
            conn,
            "SELECT id, number FROM premises WHERE building_id IS ?1 ORDER BY id",
            params![scope.parent],
            Self::TABLE,
        )
    }

    fn insert(conn: &Connection, record: &NewPremise) -> Result<Option<i64>> {
        query_id(
            conn,
            "INSERT INTO premises (natural_key, number, name_key, building_id, type, floor, entrance)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(natural_key) DO NOTHING
             RETURNING id",
            params![
                record.natural_key,
                record.number,
                record.name_key,
                record.building_id,
                record.premise_type.as_str(),
                record.floor,
                record.entrance
            ],
            Self::TABLE,
        )
    }
}

// Canonical Entities - one statically typed repository per registry table
//
// Each table has:
// - Synthetic id (INTEGER PRIMARY KEY)
// - Source-scoped natural key (UNIQUE), the idempotency anchor
// - Normalized name key for scoped exact lookups and fuzzy sibling matching

pub mod admin;
pub mod building;
pub mod street;

pub use admin::{
    CityDistrictRepo, CityRepo, CommunityRepo, CountryRepo, DistrictRepo, NewAdminUnit, NewCountry, RegionRepo,
};
pub use building::{BuildingRepo, NewBuilding, NewPremise, PremiseRepo, PremiseType};
pub use street::{NewStreet, NewStreetType, StreetNameType, StreetRepo, StreetTypeRepo};

use crate::error::{Result, StoreContext};
use crate::normalizer::ObjectKind;
use rusqlite::{Connection, OptionalExtension, Params};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// TABLE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Country,
    Region,
    District,
    Community,
    City,
    CityDistrict,
    StreetType,
    Street,
    StreetName,
    Building,
    Premise,
}

impl Table {
    pub const ALL: [Table; 11] = [
        Table::Country,
        Table::Region,
        Table::District,
        Table::Community,
        Table::City,
        Table::CityDistrict,
        Table::StreetType,
        Table::Street,
        Table::StreetName,
        Table::Building,
        Table::Premise,
    ];

    /// SQL table name
    pub fn name(&self) -> &'static str {
        match self {
            Table::Country => "countries",
            Table::Region => "regions",
            Table::District => "districts",
            Table::Community => "communities",
            Table::City => "cities",
            Table::CityDistrict => "city_districts",
            Table::StreetType => "street_types",
            Table::Street => "street_entities",
            Table::StreetName => "street_names",
            Table::Building => "buildings",
            Table::Premise => "premises",
        }
    }

    /// Singular label used in logs and provenance links
    pub fn label(&self) -> &'static str {
        match self {
            Table::Country => "country",
            Table::Region => "region",
            Table::District => "district",
            Table::Community => "community",
            Table::City => "city",
            Table::CityDistrict => "city_district",
            Table::StreetType => "street_type",
            Table::Street => "street",
            Table::StreetName => "street_name",
            Table::Building => "building",
            Table::Premise => "premise",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ============================================================================
// SCOPE / NATURAL KEY
// ============================================================================

/// Parent reference(s) a name is unique under
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Scope {
    pub parent: Option<i64>,

    /// Second parent (street type for streets, city for buildings)
    pub qualifier: Option<i64>,
}

impl Scope {
    pub fn root() -> Self {
        Scope::default()
    }

    pub fn under(parent: i64) -> Self {
        Scope {
            parent: Some(parent),
            qualifier: None,
        }
    }

    pub fn ids(&self) -> impl Iterator<Item = i64> {
        self.parent.into_iter().chain(self.qualifier)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NaturalKey {
    /// Id issued by a migration source, e.g. "rtg:5"
    Source { source: String, id: String },

    /// Normalized name under its parent(s)
    Scoped { scope: Scope, name_key: String },

    /// Fixed code such as an ISO country code
    Code(String),
}

impl fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn part(id: Option<i64>) -> String {
            id.map(|id| id.to_string()).unwrap_or_else(|| "-".to_string())
        }

        match self {
            NaturalKey::Source { source, id } => write!(f, "{}:{}", source, id),
            NaturalKey::Scoped { scope, name_key } => {
                write!(f, "name:{}:{}:{}", part(scope.parent), part(scope.qualifier), name_key)
            }
            NaturalKey::Code(code) => f.write_str(code),
        }
    }
}

/// Existing row under the same scope, offered to fuzzy matching
#[derive(Debug, Clone, PartialEq)]
pub struct Sibling {
    pub id: i64,
    pub name: String,
}

// ============================================================================
// CONTRACTS
// ============================================================================

/// Record ready to be resolved against one table
pub trait EntityRecord: fmt::Debug {
    fn natural_key(&self) -> &str;
    fn display_name(&self) -> &str;
    fn name_key(&self) -> &str;
    fn scope(&self) -> Scope;
}

/// Static SQL for one canonical table
pub trait Repository {
    type Record: EntityRecord;

    const TABLE: Table;
    const KIND: ObjectKind;

    /// Whether a near-identical sibling name may be reused
    const FUZZY: bool;

    fn find_by_natural_key(conn: &Connection, key: &str) -> Result<Option<i64>>;

    /// Exact normalized-name match under a scope
    fn find_by_name(conn: &Connection, scope: Scope, name_key: &str) -> Result<Option<i64>>;

    fn siblings(conn: &Connection, scope: Scope) -> Result<Vec<Sibling>>;

    /// Conflict-tolerant insert; None when another insert already owns the natural key
    fn insert(conn: &Connection, record: &Self::Record) -> Result<Option<i64>>;
}

// ============================================================================
// SHARED QUERY HELPERS
// ============================================================================

pub(crate) fn query_id<P: Params>(conn: &Connection, sql: &str, params: P, table: Table) -> Result<Option<i64>> {
    conn.prepare_cached(sql)
        .and_then(|mut stmt| stmt.query_row(params, |row| row.get(0)).optional())
        .store_context(format!("querying {}", table.name()))
}

pub(crate) fn query_siblings<P: Params>(conn: &Connection, sql: &str, params: P, table: Table) -> Result<Vec<Sibling>> {
    let context = format!("listing {} siblings", table.name());
    let mut stmt = conn.prepare_cached(sql).store_context(context.as_str())?;
    let rows = stmt
        .query_map(params, |row| {
            Ok(Sibling {
                id: row.get(0)?,
                name: row.get(1)?,
            })
        })
        .store_context(context.as_str())?;

    rows.collect::<std::result::Result<Vec<_>, _>>().store_context(context)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_natural_key_rendering() {
        let source = NaturalKey::Source {
            source: "rtg".into(),
            id: "5".into(),
        };
        let scoped = NaturalKey::Scoped {
            scope: Scope {
                parent: Some(3),
                qualifier: None,
            },
            name_key: "самарський".into(),
        };

        assert_eq!(source.to_string(), "rtg:5");
        assert_eq!(scoped.to_string(), "name:3:-:самарський");
        assert_eq!(NaturalKey::Code("UA".into()).to_string(), "UA");
    }

    #[test]
    fn test_scope_ids() {
        let scope = Scope {
            parent: Some(1),
            qualifier: Some(2),
        };
        assert_eq!(scope.ids().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(Scope::root().ids().count(), 0);
    }
}

use crate::entities::Table;
use crate::error::{Result, StoreContext};
use crate::normalizer::ObjectKind;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Duration;

// ============================================================================
// SCHEMA
// ============================================================================

/// (object, DDL) pairs applied in order; every statement is idempotent
const SCHEMA: &[(&str, &str)] = &[
    (
        "countries",
        "CREATE TABLE IF NOT EXISTS countries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            natural_key TEXT UNIQUE NOT NULL,
            name_uk TEXT NOT NULL,
            name_key TEXT NOT NULL,
            iso_code TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
    ),
    (
        "regions",
        "CREATE TABLE IF NOT EXISTS regions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            natural_key TEXT UNIQUE NOT NULL,
            name_uk TEXT NOT NULL,
            name_key TEXT NOT NULL,
            country_id INTEGER NOT NULL REFERENCES countries(id),
            source_code TEXT,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
    ),
    (
        "districts",
        "CREATE TABLE IF NOT EXISTS districts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            natural_key TEXT UNIQUE NOT NULL,
            name_uk TEXT NOT NULL,
            name_key TEXT NOT NULL,
            region_id INTEGER NOT NULL REFERENCES regions(id),
            source_code TEXT,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
    ),
    (
        "communities",
        "CREATE TABLE IF NOT EXISTS communities (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            natural_key TEXT UNIQUE NOT NULL,
            name_uk TEXT NOT NULL,
            name_key TEXT NOT NULL,
            district_id INTEGER NOT NULL REFERENCES districts(id),
            type TEXT,
            source_code TEXT,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
    ),
    (
        "cities",
        "CREATE TABLE IF NOT EXISTS cities (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            natural_key TEXT UNIQUE NOT NULL,
            name_uk TEXT NOT NULL,
            name_key TEXT NOT NULL,
            community_id INTEGER NOT NULL REFERENCES communities(id),
            type TEXT NOT NULL DEFAULT 'м.',
            source_code TEXT,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
    ),
    (
        "city_districts",
        "CREATE TABLE IF NOT EXISTS city_districts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            natural_key TEXT UNIQUE NOT NULL,
            name_uk TEXT NOT NULL,
            name_key TEXT NOT NULL,
            city_id INTEGER NOT NULL REFERENCES cities(id),
            type TEXT NOT NULL DEFAULT 'адміністративний',
            source_code TEXT,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
    ),
    (
        "street_types",
        "CREATE TABLE IF NOT EXISTS street_types (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            natural_key TEXT UNIQUE NOT NULL,
            name_uk TEXT NOT NULL,
            name_key TEXT NOT NULL,
            short_name_uk TEXT NOT NULL,
            source_code TEXT,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
    ),
    (
        "street_entities",
        "CREATE TABLE IF NOT EXISTS street_entities (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            natural_key TEXT UNIQUE NOT NULL,
            name_key TEXT NOT NULL,
            city_id INTEGER NOT NULL REFERENCES cities(id),
            city_district_id INTEGER REFERENCES city_districts(id),
            street_type_id INTEGER NOT NULL REFERENCES street_types(id),
            source_code TEXT,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
    ),
    (
        "street_names",
        "CREATE TABLE IF NOT EXISTS street_names (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            street_entity_id INTEGER NOT NULL REFERENCES street_entities(id),
            name TEXT NOT NULL,
            name_key TEXT NOT NULL,
            language_code TEXT NOT NULL DEFAULT 'uk',
            is_current INTEGER NOT NULL DEFAULT 0,
            name_type TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            UNIQUE(street_entity_id, name)
        )",
    ),
    (
        "buildings",
        "CREATE TABLE IF NOT EXISTS buildings (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            natural_key TEXT UNIQUE NOT NULL,
            number TEXT NOT NULL,
            name_key TEXT NOT NULL,
            street_entity_id INTEGER REFERENCES street_entities(id),
            city_id INTEGER NOT NULL REFERENCES cities(id),
            corpus TEXT,
            postal_code TEXT,
            source_code TEXT,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
    ),
    (
        "premises",
        "CREATE TABLE IF NOT EXISTS premises (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            natural_key TEXT UNIQUE NOT NULL,
            number TEXT NOT NULL,
            name_key TEXT NOT NULL,
            building_id INTEGER NOT NULL REFERENCES buildings(id),
            type TEXT NOT NULL,
            floor TEXT,
            entrance TEXT,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
    ),
    (
        "data_sources",
        "CREATE TABLE IF NOT EXISTS data_sources (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT UNIQUE NOT NULL,
            description TEXT,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
    ),
    (
        "object_sources",
        "CREATE TABLE IF NOT EXISTS object_sources (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            object_type TEXT NOT NULL,
            object_id INTEGER NOT NULL,
            source_id INTEGER NOT NULL REFERENCES data_sources(id),
            source_key TEXT NOT NULL,
            original_data TEXT NOT NULL,
            payload_hash TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            UNIQUE(object_type, object_id, source_id)
        )",
    ),
    (
        "migration_runs",
        "CREATE TABLE IF NOT EXISTS migration_runs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            run_id TEXT UNIQUE NOT NULL,
            source TEXT NOT NULL,
            dry_run INTEGER NOT NULL,
            started_at TEXT NOT NULL,
            finished_at TEXT NOT NULL,
            stats TEXT NOT NULL
        )",
    ),
    (
        "migration_events",
        "CREATE TABLE IF NOT EXISTS migration_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_key TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL
        )",
    ),
    // ==========================================================================
    // Indexes
    // ==========================================================================
    ("idx_regions_scope", "CREATE INDEX IF NOT EXISTS idx_regions_scope ON regions(country_id, name_key)"),
    ("idx_districts_scope", "CREATE INDEX IF NOT EXISTS idx_districts_scope ON districts(region_id, name_key)"),
    (
        "idx_communities_scope",
        "CREATE INDEX IF NOT EXISTS idx_communities_scope ON communities(district_id, name_key)",
    ),
    ("idx_cities_scope", "CREATE INDEX IF NOT EXISTS idx_cities_scope ON cities(community_id, name_key)"),
    (
        "idx_city_districts_scope",
        "CREATE INDEX IF NOT EXISTS idx_city_districts_scope ON city_districts(city_id, name_key)",
    ),
    (
        "idx_street_entities_scope",
        "CREATE INDEX IF NOT EXISTS idx_street_entities_scope ON street_entities(city_id, street_type_id, name_key)",
    ),
    (
        "idx_street_names_key",
        "CREATE INDEX IF NOT EXISTS idx_street_names_key ON street_names(name_key)",
    ),
    (
        "idx_street_names_current",
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_street_names_current
            ON street_names(street_entity_id) WHERE is_current = 1",
    ),
    (
        "idx_buildings_scope",
        "CREATE INDEX IF NOT EXISTS idx_buildings_scope ON buildings(street_entity_id, city_id, name_key)",
    ),
    ("idx_premises_scope", "CREATE INDEX IF NOT EXISTS idx_premises_scope ON premises(building_id, name_key)"),
    (
        "idx_events_entity",
        "CREATE INDEX IF NOT EXISTS idx_events_entity ON migration_events(entity_type, entity_key)",
    ),
];

pub fn setup_database(conn: &Connection) -> Result<()> {
    // WAL for crash recovery; in-memory stores silently keep their own journal
    conn.pragma_update(None, "journal_mode", "WAL")
        .store_context("enabling WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")
        .store_context("enabling foreign keys")?;
    conn.busy_timeout(Duration::from_secs(5))
        .store_context("setting busy timeout")?;

    for (object, ddl) in SCHEMA {
        conn.execute(ddl, []).store_context(format!("creating {}", object))?;
    }

    Ok(())
}

// ============================================================================
// DATA SOURCES
// ============================================================================

/// Upsert a data source by name and return its id
pub fn register_data_source(conn: &Connection, name: &str, description: &str) -> Result<i64> {
    conn.query_row(
        "INSERT INTO data_sources (name, description) VALUES (?1, ?2)
         ON CONFLICT(name) DO UPDATE SET description = excluded.description
         RETURNING id",
        params![name, description],
        |row| row.get(0),
    )
    .store_context(format!("registering data source {}", name))
}

pub fn find_data_source(conn: &Connection, name: &str) -> Result<Option<i64>> {
    conn.query_row("SELECT id FROM data_sources WHERE name = ?1", params![name], |row| row.get(0))
        .optional()
        .store_context(format!("looking up data source {}", name))
}

// ============================================================================
// PROVENANCE
// ============================================================================

/// Link between a canonical object and the source row it came from
#[derive(Debug, Clone, Serialize)]
pub struct ObjectSourceLink {
    pub object_type: Table,
    pub object_id: i64,
    pub source_id: i64,

    /// Row identifier inside the source (id, objectid or synthetic key)
    pub source_key: String,

    /// Raw source row
    pub payload: serde_json::Value,
}

impl ObjectSourceLink {
    /// SHA-256 of the serialized payload; identical rows hash identically
    pub fn payload_hash(&self) -> Result<String> {
        let body = serde_json::to_string(&self.payload)?;
        let mut hasher = Sha256::new();
        hasher.update(body.as_bytes());
        Ok(format!("{:x}", hasher.finalize()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkOutcome {
    Created,
    Unchanged,

    /// Same object and source, different payload
    Refreshed,
}

fn existing_link_hash(conn: &Connection, link: &ObjectSourceLink) -> Result<Option<String>> {
    conn.query_row(
        "SELECT payload_hash FROM object_sources
         WHERE object_type = ?1 AND object_id = ?2 AND source_id = ?3",
        params![link.object_type.label(), link.object_id, link.source_id],
        |row| row.get(0),
    )
    .optional()
    .store_context("reading provenance link")
}

/// What `link_object_source` would do, without writing
pub fn preview_object_source(conn: &Connection, link: &ObjectSourceLink) -> Result<LinkOutcome> {
    let hash = link.payload_hash()?;
    Ok(match existing_link_hash(conn, link)? {
        None => LinkOutcome::Created,
        Some(existing) if existing == hash => LinkOutcome::Unchanged,
        Some(_) => LinkOutcome::Refreshed,
    })
}

/// Idempotent provenance write keyed by (object_type, object_id, source_id)
pub fn link_object_source(conn: &Connection, link: &ObjectSourceLink) -> Result<LinkOutcome> {
    let outcome = preview_object_source(conn, link)?;
    if outcome == LinkOutcome::Unchanged {
        return Ok(outcome);
    }

    let hash = link.payload_hash()?;
    let body = serde_json::to_string(&link.payload)?;

    conn.execute(
        "INSERT INTO object_sources (object_type, object_id, source_id, source_key, original_data, payload_hash)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(object_type, object_id, source_id) DO UPDATE SET
            source_key = excluded.source_key,
            original_data = excluded.original_data,
            payload_hash = excluded.payload_hash,
            updated_at = CURRENT_TIMESTAMP",
        params![
            link.object_type.label(),
            link.object_id,
            link.source_id,
            link.source_key,
            body,
            hash
        ],
    )
    .store_context("writing provenance link")?;

    Ok(outcome)
}

// ============================================================================
// MIGRATION RUNS
// ============================================================================

/// One finished pass of one source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationRun {
    pub run_id: String,
    pub source: String,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub stats: serde_json::Value,
}

impl MigrationRun {
    pub fn new(source: &str, dry_run: bool, started_at: DateTime<Utc>, stats: serde_json::Value) -> Self {
        MigrationRun {
            run_id: uuid::Uuid::new_v4().to_string(),
            source: source.to_string(),
            dry_run,
            started_at,
            finished_at: Utc::now(),
            stats,
        }
    }
}

pub fn record_migration_run(conn: &Connection, run: &MigrationRun) -> Result<()> {
    let stats = serde_json::to_string(&run.stats)?;
    conn.execute(
        "INSERT INTO migration_runs (run_id, source, dry_run, started_at, finished_at, stats)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            run.run_id,
            run.source,
            run.dry_run,
            run.started_at.to_rfc3339(),
            run.finished_at.to_rfc3339(),
            stats
        ],
    )
    .store_context("recording migration run")?;
    Ok(())
}

pub fn get_migration_runs(conn: &Connection) -> Result<Vec<MigrationRun>> {
    let mut stmt = conn
        .prepare("SELECT run_id, source, dry_run, started_at, finished_at, stats FROM migration_runs ORDER BY id")
        .store_context("listing migration runs")?;

    let rows = stmt
        .query_map([], |row| {
            let started: String = row.get(3)?;
            let finished: String = row.get(4)?;
            let stats: String = row.get(5)?;
            Ok(MigrationRun {
                run_id: row.get(0)?,
                source: row.get(1)?,
                dry_run: row.get(2)?,
                started_at: parse_timestamp(&started),
                finished_at: parse_timestamp(&finished),
                stats: serde_json::from_str(&stats).unwrap_or(serde_json::Value::Null),
            })
        })
        .store_context("listing migration runs")?;

    rows.collect::<std::result::Result<Vec<_>, _>>()
        .store_context("listing migration runs")
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_default()
}

// ============================================================================
// EVENTS (audit trail of notable resolution decisions)
// ============================================================================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MigrationEvent {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_key: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl MigrationEvent {
    pub fn new(event_type: &str, entity_type: &str, entity_key: &str, data: serde_json::Value, actor: &str) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_key: entity_key.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

pub fn insert_event(conn: &Connection, event: &MigrationEvent) -> Result<()> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO migration_events (
            event_id, timestamp, event_type, entity_type, entity_key, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.entity_type,
            event.entity_key,
            data_json,
            event.actor,
        ],
    )
    .store_context("recording migration event")?;

    Ok(())
}

pub fn get_events_for_entity(conn: &Connection, entity_type: &str, entity_key: &str) -> Result<Vec<MigrationEvent>> {
    let mut stmt = conn
        .prepare(
            "SELECT event_id, timestamp, event_type, entity_type, entity_key, data, actor
             FROM migration_events
             WHERE entity_type = ?1 AND entity_key = ?2
             ORDER BY timestamp ASC",
        )
        .store_context("listing events")?;

    let events = stmt
        .query_map(params![entity_type, entity_key], |row| {
            let timestamp: String = row.get(1)?;
            let data: String = row.get(5)?;
            Ok(MigrationEvent {
                event_id: row.get(0)?,
                timestamp: parse_timestamp(&timestamp),
                event_type: row.get(2)?,
                entity_type: row.get(3)?,
                entity_key: row.get(4)?,
                data: serde_json::from_str(&data).unwrap_or(serde_json::Value::Null),
                actor: row.get(6)?,
            })
        })
        .store_context("listing events")?
        .collect::<std::result::Result<Vec<_>, _>>()
        .store_context("listing events")?;

    Ok(events)
}

// ============================================================================
// READ HELPERS
// ============================================================================

/// Every canonical name currently known for a kind
pub fn canonical_names(conn: &Connection, kind: ObjectKind) -> Result<Vec<String>> {
    let sql = match kind {
        ObjectKind::Street => "SELECT DISTINCT name FROM street_names WHERE is_current = 1",
        ObjectKind::District => "SELECT name_uk FROM city_districts UNION SELECT name_uk FROM districts",
        ObjectKind::StreetType => "SELECT name_uk FROM street_types UNION SELECT short_name_uk FROM street_types",
        ObjectKind::City => "SELECT DISTINCT name_uk FROM cities",
        ObjectKind::Building => "SELECT DISTINCT number FROM buildings",
        ObjectKind::Generic => return Ok(Vec::new()),
    };

    let context = format!("listing {} names", kind.as_str());
    let mut stmt = conn.prepare_cached(sql).store_context(context.as_str())?;
    let names = stmt
        .query_map([], |row| row.get(0))
        .store_context(context.as_str())?
        .collect::<std::result::Result<Vec<String>, _>>()
        .store_context(context)?;

    Ok(names)
}

pub fn count_rows(conn: &Connection, table: Table) -> Result<i64> {
    let sql = match table {
        Table::Country => "SELECT COUNT(*) FROM countries",
        Table::Region => "SELECT COUNT(*) FROM regions",
        Table::District => "SELECT COUNT(*) FROM districts",
        Table::Community => "SELECT COUNT(*) FROM communities",
        Table::City => "SELECT COUNT(*) FROM cities",
        Table::CityDistrict => "SELECT COUNT(*) FROM city_districts",
        Table::StreetType => "SELECT COUNT(*) FROM street_types",
        Table::Street => "SELECT COUNT(*) FROM street_entities",
        Table::StreetName => "SELECT COUNT(*) FROM street_names",
        Table::Building => "SELECT COUNT(*) FROM buildings",
        Table::Premise => "SELECT COUNT(*) FROM premises",
    };

    conn.query_row(sql, [], |row| row.get(0))
        .store_context(format!("counting {}", table.name()))
}

pub fn count_object_sources(conn: &Connection) -> Result<i64> {
    conn.query_row("SELECT COUNT(*) FROM object_sources", [], |row| row.get(0))
        .store_context("counting object_sources")
}

/// Highest id used by any canonical table; dry runs number their rows above it
pub fn max_canonical_id(conn: &Connection) -> Result<i64> {
    conn.query_row(
        "SELECT MAX(m) FROM (
            SELECT COALESCE(MAX(id), 0) AS m FROM countries
            UNION ALL SELECT COALESCE(MAX(id), 0) FROM regions
            UNION ALL SELECT COALESCE(MAX(id), 0) FROM districts
            UNION ALL SELECT COALESCE(MAX(id), 0) FROM communities
            UNION ALL SELECT COALESCE(MAX(id), 0) FROM cities
            UNION ALL SELECT COALESCE(MAX(id), 0) FROM city_districts
            UNION ALL SELECT COALESCE(MAX(id), 0) FROM street_types
            UNION ALL SELECT COALESCE(MAX(id), 0) FROM street_entities
            UNION ALL SELECT COALESCE(MAX(id), 0) FROM buildings
            UNION ALL SELECT COALESCE(MAX(id), 0) FROM premises
        )",
        [],
        |row| row.get(0),
    )
    .store_context("reading highest canonical id")
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    #[test]
    fn test_setup_is_idempotent() {
        let conn = setup();
        setup_database(&conn).unwrap();

        for table in Table::ALL {
            assert_eq!(count_rows(&conn, table).unwrap(), 0, "{} not empty", table.name());
        }
        assert_eq!(max_canonical_id(&conn).unwrap(), 0);
    }

    #[test]
    fn test_register_data_source_upserts() {
        let conn = setup();
        let first = register_data_source(&conn, "ek_addr", "first").unwrap();
        let second = register_data_source(&conn, "ek_addr", "second").unwrap();

        assert_eq!(first, second);
        assert_eq!(find_data_source(&conn, "ek_addr").unwrap(), Some(first));
        assert_eq!(find_data_source(&conn, "bld_local").unwrap(), None);
    }

    #[test]
    fn test_provenance_link_is_idempotent() {
        let conn = setup();
        let source_id = register_data_source(&conn, "ek_addr", "test").unwrap();

        let mut link = ObjectSourceLink {
            object_type: Table::Building,
            object_id: 7,
            source_id,
            source_key: "Самарський|192".into(),
            payload: serde_json::json!({"street": "Старий Шлях", "build": "192"}),
        };

        assert_eq!(link_object_source(&conn, &link).unwrap(), LinkOutcome::Created);
        assert_eq!(link_object_source(&conn, &link).unwrap(), LinkOutcome::Unchanged);

        link.payload = serde_json::json!({"street": "Старий Шлях", "build": "192", "corp": "1"});
        assert_eq!(preview_object_source(&conn, &link).unwrap(), LinkOutcome::Refreshed);
        assert_eq!(link_object_source(&conn, &link).unwrap(), LinkOutcome::Refreshed);

        assert_eq!(count_object_sources(&conn).unwrap(), 1);
    }

    #[test]
    fn test_payload_hash_is_stable() {
        let link = ObjectSourceLink {
            object_type: Table::Street,
            object_id: 1,
            source_id: 1,
            source_key: "1".into(),
            payload: serde_json::json!({"b": 1, "a": 2}),
        };
        let hash = link.payload_hash().unwrap();

        assert_eq!(hash.len(), 64);
        assert_eq!(hash, link.payload_hash().unwrap());
    }

    #[test]
    fn test_migration_run_round_trip() {
        let conn = setup();
        let run = MigrationRun::new("rtg_addr", false, Utc::now(), serde_json::json!({"processed": 3}));
        record_migration_run(&conn, &run).unwrap();

        let runs = get_migration_runs(&conn).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].run_id, run.run_id);
        assert_eq!(runs[0].stats["processed"], 3);
    }

    #[test]
    fn test_event_audit_trail() {
        let conn = setup();
        let event = MigrationEvent::new(
            "similar_object_noted",
            "street",
            "name:1:1:старий шлях",
            serde_json::json!({"candidate": "Старий Шлях", "score": 0.88}),
            "ek_addr",
        );
        insert_event(&conn, &event).unwrap();

        let events = get_events_for_entity(&conn, "street", "name:1:1:старий шлях").unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "similar_object_noted");
    }

    #[test]
    fn test_canonical_names_empty_store() {
        let conn = setup();
        for kind in ObjectKind::ALL {
            assert!(canonical_names(&conn, kind).unwrap().is_empty());
        }
    }
}

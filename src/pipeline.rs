// 🚚 Migration Pipeline - one pass per source, one transaction per row
//
// Per row: admin chain (country → city district) → street type → street
// (+ old/variant names) → building → premise → provenance link.
// A failing row rolls back alone; counters are the operator-facing outcome.

use crate::db::{
    find_data_source, link_object_source, max_canonical_id, preview_object_source, record_migration_run,
    register_data_source, LinkOutcome, MigrationRun, ObjectSourceLink,
};
use crate::entities::admin::{community_type, CITY_DISTRICT_TYPE, DEFAULT_CITY_TYPE};
use crate::entities::{
    BuildingRepo, CityDistrictRepo, CityRepo, CommunityRepo, CountryRepo, DistrictRepo, NewAdminUnit, NewBuilding,
    NewCountry, NewPremise, NewStreet, NewStreetType, PremiseRepo, RegionRepo, StreetNameType, StreetRepo,
    StreetTypeRepo, Table,
};
use crate::error::{MigrationError, Result, StoreContext};
use crate::normalizer::{ObjectKind, TextNormalizer};
use crate::resolver::{EntityResolver, Mode, Outcome, ResolverStats};
use crate::sources::{
    get_source, AddressRecord, AddressSource, SourceKind, SourceRow, StreetFields, DEFAULT_COUNTRY,
    DEFAULT_COUNTRY_CODE,
};
use chrono::Utc;
use rusqlite::Connection;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, error, info, warn};

pub const DEFAULT_BATCH_SIZE: usize = 1000;

// ============================================================================
// OUTCOMES / STATS
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome {
    Migrated {
        object_type: Table,
        object_id: i64,
        link: LinkOutcome,
    },
    Skipped(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct MigrationStats {
    pub source: SourceKind,
    pub mode: Mode,
    pub processed: u64,
    pub migrated: u64,
    pub skipped: u64,
    pub errors: u64,
    pub links_created: u64,
    pub links_unchanged: u64,
    pub links_refreshed: u64,
    pub resolver: ResolverStats,
}

impl MigrationStats {
    pub fn new(source: SourceKind, mode: Mode) -> Self {
        MigrationStats {
            source,
            mode,
            processed: 0,
            migrated: 0,
            skipped: 0,
            errors: 0,
            links_created: 0,
            links_unchanged: 0,
            links_refreshed: 0,
            resolver: ResolverStats::default(),
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "{}: {} processed, {} migrated, {} skipped, {} errors | {} created, {} duplicates | links {} new, {} unchanged, {} refreshed",
            self.source.name(),
            self.processed,
            self.migrated,
            self.skipped,
            self.errors,
            self.resolver.total_created(),
            self.resolver.total_duplicates(),
            self.links_created,
            self.links_unchanged,
            self.links_refreshed
        )
    }

    fn count_link(&mut self, link: LinkOutcome) {
        match link {
            LinkOutcome::Created => self.links_created += 1,
            LinkOutcome::Unchanged => self.links_unchanged += 1,
            LinkOutcome::Refreshed => self.links_refreshed += 1,
        }
    }
}

// ============================================================================
// MIGRATOR
// ============================================================================

pub struct Migrator {
    conn: Connection,
    mode: Mode,
    batch_size: usize,
    resolver: EntityResolver,
    normalizer: TextNormalizer,

    /// Dry mode only: payload hashes of links "written" so far
    dry_links: HashMap<(Table, i64, i64), String>,
}

impl Migrator {
    /// Expects a store with the schema applied (`db::setup_database`)
    pub fn new(conn: Connection, mode: Mode) -> Result<Self> {
        let resolver = match mode {
            Mode::Live => EntityResolver::live(),
            Mode::Dry => EntityResolver::dry(max_canonical_id(&conn)? + 1),
        };

        Ok(Migrator {
            conn,
            mode,
            batch_size: DEFAULT_BATCH_SIZE,
            resolver,
            normalizer: TextNormalizer::new(),
            dry_links: HashMap::new(),
        })
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn into_connection(self) -> Connection {
        self.conn
    }

    /// Load and migrate one source file with its registered schema
    pub fn run(&mut self, kind: SourceKind, path: &Path) -> Result<MigrationStats> {
        let source = get_source(kind);
        self.run_source(source.as_ref(), path)
    }

    pub fn run_source(&mut self, source: &dyn AddressSource, path: &Path) -> Result<MigrationStats> {
        info!(source = source.kind().name(), path = %path.display(), version = source.version(), "loading source");
        let rows = source.load(path)?;
        self.run_rows(source.kind(), rows)
    }

    pub fn run_rows(&mut self, kind: SourceKind, rows: Vec<SourceRow>) -> Result<MigrationStats> {
        let started_at = Utc::now();
        let source_id = self.data_source(kind)?;
        self.resolver.set_actor(kind.name());

        info!(source = kind.name(), rows = rows.len(), mode = ?self.mode, "migration started");

        let mut stats = MigrationStats::new(kind, self.mode);
        for row in rows {
            stats.processed += 1;
            let (line, row_key) = (row.line, row.row_key.clone());

            match self.migrate_row(row, source_id) {
                Ok(RowOutcome::Migrated { link, .. }) => {
                    stats.migrated += 1;
                    stats.count_link(link);
                }
                Ok(RowOutcome::Skipped(reason)) => {
                    stats.skipped += 1;
                    debug!(source = kind.name(), line, row = %row_key, %reason, "row skipped");
                }
                Err(e) => {
                    stats.errors += 1;
                    error!(source = kind.name(), line, row = %row_key, error = %e, "row failed, rolled back");
                }
            }

            if stats.processed % self.batch_size as u64 == 0 {
                info!(
                    source = kind.name(),
                    processed = stats.processed,
                    migrated = stats.migrated,
                    skipped = stats.skipped,
                    errors = stats.errors,
                    "progress"
                );
            }
        }

        stats.resolver = self.resolver.take_stats();
        log_summary(&stats);

        if self.mode == Mode::Live {
            let run = MigrationRun::new(kind.name(), false, started_at, serde_json::to_value(&stats)?);
            record_migration_run(&self.conn, &run)?;
        }

        Ok(stats)
    }

    /// Registered source id; dry mode only looks it up (0 never matches a row)
    fn data_source(&self, kind: SourceKind) -> Result<i64> {
        match self.mode {
            Mode::Live => register_data_source(&self.conn, kind.name(), kind.description()),
            Mode::Dry => Ok(find_data_source(&self.conn, kind.name())?.unwrap_or(0)),
        }
    }

    pub fn migrate_row(&mut self, row: SourceRow, source_id: i64) -> Result<RowOutcome> {
        match row.record {
            Ok(record) => self.migrate_record(&record, source_id),
            Err(MigrationError::Validation { reason, .. }) => Ok(RowOutcome::Skipped(reason)),
            Err(e) => Err(e),
        }
    }

    fn migrate_record(&mut self, record: &AddressRecord, source_id: i64) -> Result<RowOutcome> {
        self.resolver.begin_row();

        let tx = match self.conn.transaction().store_context("opening row transaction") {
            Ok(tx) => tx,
            Err(e) => {
                self.resolver.abort_row();
                return Err(e);
            }
        };

        let result = resolve_record(&tx, &mut self.resolver, &self.normalizer, record).and_then(
            |(object_type, object_id)| {
                let link = ObjectSourceLink {
                    object_type,
                    object_id,
                    source_id,
                    source_key: record.row_key.clone(),
                    payload: record.payload.clone(),
                };
                let outcome = match self.mode {
                    Mode::Live => link_object_source(&tx, &link)?,
                    Mode::Dry => preview_dry_link(&tx, &mut self.dry_links, &link)?,
                };
                Ok(RowOutcome::Migrated {
                    object_type,
                    object_id,
                    link: outcome,
                })
            },
        );

        match result {
            Ok(outcome) => {
                // Dry mode never commits; dropping the transaction rolls it back
                if self.mode == Mode::Live {
                    if let Err(e) = tx.commit().store_context("committing row") {
                        self.resolver.abort_row();
                        return Err(e);
                    }
                }
                self.resolver.commit_row();
                Ok(outcome)
            }
            Err(e) => {
                drop(tx);
                self.resolver.abort_row();
                Err(e)
            }
        }
    }
}

fn preview_dry_link(
    conn: &Connection,
    dry_links: &mut HashMap<(Table, i64, i64), String>,
    link: &ObjectSourceLink,
) -> Result<LinkOutcome> {
    let hash = link.payload_hash()?;
    let key = (link.object_type, link.object_id, link.source_id);

    let outcome = match dry_links.get(&key) {
        Some(previous) if *previous == hash => LinkOutcome::Unchanged,
        Some(_) => LinkOutcome::Refreshed,
        None => preview_object_source(conn, link)?,
    };

    dry_links.insert(key, hash);
    Ok(outcome)
}

// ============================================================================
// ROW RESOLUTION
// ============================================================================

/// Resolve the record's entity chain; returns the deepest entity for provenance
fn resolve_record(
    conn: &Connection,
    resolver: &mut EntityResolver,
    n: &TextNormalizer,
    record: &AddressRecord,
) -> Result<(Table, i64)> {
    let admin = &record.admin;

    let country = resolver.resolve::<CountryRepo>(conn, &NewCountry::new(n, DEFAULT_COUNTRY, DEFAULT_COUNTRY_CODE))?;

    let region = NewAdminUnit::new(n, ObjectKind::Generic, &admin.region.name, country.id, admin.region.source_key.clone());
    let region = resolver.resolve::<RegionRepo>(conn, &region)?;

    let district = NewAdminUnit::new(
        n,
        ObjectKind::District,
        &admin.district.name,
        region.id,
        admin.district.source_key.clone(),
    );
    let district = resolver.resolve::<DistrictRepo>(conn, &district)?;

    let community = NewAdminUnit::new(
        n,
        ObjectKind::Generic,
        &admin.community.name,
        district.id,
        admin.community.source_key.clone(),
    )
    .with_type(community_type(&admin.community.name));
    let community = resolver.resolve::<CommunityRepo>(conn, &community)?;

    let city = NewAdminUnit::new(n, ObjectKind::City, &admin.city.name, community.id, admin.city.source_key.clone())
        .with_type(admin.city_type.clone().unwrap_or_else(|| DEFAULT_CITY_TYPE.to_string()));
    let city = resolver.resolve::<CityRepo>(conn, &city)?;

    let city_district = match &admin.city_district {
        Some(unit) => {
            let record = NewAdminUnit::new(n, ObjectKind::District, &unit.name, city.id, unit.source_key.clone())
                .with_type(CITY_DISTRICT_TYPE);
            Some(resolver.resolve::<CityDistrictRepo>(conn, &record)?.id)
        }
        None => None,
    };

    let mut target = (Table::City, city.id);

    let street_id = match &record.street {
        Some(street) => {
            let id = resolve_street(conn, resolver, n, street, city.id, city_district)?;
            target = (Table::Street, id);
            Some(id)
        }
        None => None,
    };

    if let Some(fields) = &record.building {
        let mut building = NewBuilding::new(n, fields.natural_key.clone(), &fields.number, street_id, city.id);
        building.corpus = fields.corpus.clone();
        building.postal_code = fields.postal_code.clone();
        building.source_code = fields.source_code.clone();

        let building_id = resolver.resolve::<BuildingRepo>(conn, &building)?.id;
        target = (Table::Building, building_id);

        if let Some(fields) = &record.premise {
            let mut premise = NewPremise::new(n, fields.natural_key.clone(), &fields.number, building_id, fields.premise_type);
            premise.floor = fields.floor.clone();
            premise.entrance = fields.entrance.clone();

            target = (Table::Premise, resolver.resolve::<PremiseRepo>(conn, &premise)?.id);
        }
    }

    Ok(target)
}

fn resolve_street(
    conn: &Connection,
    resolver: &mut EntityResolver,
    n: &TextNormalizer,
    street: &StreetFields,
    city_id: i64,
    city_district_id: Option<i64>,
) -> Result<i64> {
    let street_type = resolver.resolve::<StreetTypeRepo>(conn, &NewStreetType::new(n, &street.street_type))?;

    let entity = NewStreet::new(n, &street.name, city_id, city_district_id, street_type.id)
        .with_source_code(street.source_code.clone());
    let resolution = resolver.resolve::<StreetRepo>(conn, &entity)?;

    // Spelling that only fuzzy-matched is kept so the next lookup is exact
    if let Outcome::Matched { .. } = resolution.outcome {
        resolver.add_street_alias(conn, resolution.id, &entity.name, &entity.name_key, StreetNameType::Variant)?;
    }

    if let Some(old) = &street.old_name {
        let added = resolver.add_street_alias(
            conn,
            resolution.id,
            &n.clean(old, ObjectKind::Street),
            &n.normalize(old, ObjectKind::Street),
            StreetNameType::Old,
        )?;
        if added {
            debug!(street_id = resolution.id, old = %old, "historical street name recorded");
        }
    }

    Ok(resolution.id)
}

fn log_summary(stats: &MigrationStats) {
    info!(
        source = stats.source.name(),
        processed = stats.processed,
        migrated = stats.migrated,
        skipped = stats.skipped,
        errors = stats.errors,
        created = stats.resolver.total_created(),
        duplicates = stats.resolver.total_duplicates(),
        "migration finished"
    );

    for (table, counters) in &stats.resolver.tables {
        info!(
            table = %table,
            created = counters.created,
            duplicates = counters.duplicates,
            fuzzy_matched = counters.fuzzy_matched,
            similar_found = counters.similar_found,
            conflicts = counters.conflicts,
            "table summary"
        );
    }

    if stats.errors > 0 {
        warn!(source = stats.source.name(), errors = stats.errors, "some rows were rolled back");
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{count_object_sources, count_rows, get_migration_runs, setup_database};
    use crate::sources::{BldLocalRow, BldLocalSource, EkAddrRow, EkAddrSource, SourceSchema};

    fn store() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    fn ek_row(street: &str, build: &str) -> SourceRow {
        let source = EkAddrSource::new();
        let row = EkAddrRow {
            district: Some("Самарський".into()),
            street: Some(street.into()),
            build: Some(build.into()),
            ..Default::default()
        };
        SourceRow {
            line: 2,
            row_key: source.row_key(&row),
            record: Ok(source.to_record(&row, 2)),
        }
    }

    fn bld_row(objectid: &str, old_address: Option<&str>) -> SourceRow {
        let source = BldLocalSource::new();
        let row = BldLocalRow {
            objectid: Some(objectid.into()),
            adres_n_uk: Some("Старий Шлях вул. 192".into()),
            adres_o_uk: old_address.map(String::from),
            street_ukr: Some("Старий Шлях".into()),
            raion: Some("Самарський".into()),
            l: Some("192".into()),
            ..Default::default()
        };
        SourceRow {
            line: 2,
            row_key: source.row_key(&row),
            record: Ok(source.to_record(&row, 2)),
        }
    }

    #[test]
    fn test_sources_merge_on_same_building() {
        let mut migrator = Migrator::new(store(), Mode::Live).unwrap();

        migrator.run_rows(SourceKind::BldLocal, vec![bld_row("1", None)]).unwrap();
        let stats = migrator.run_rows(SourceKind::EkAddr, vec![ek_row("Старий Шлях", "192")]).unwrap();

        let conn = migrator.connection();
        assert_eq!(count_rows(conn, Table::Building).unwrap(), 1);
        assert_eq!(count_rows(conn, Table::Street).unwrap(), 1);
        assert_eq!(count_object_sources(conn).unwrap(), 2);
        assert_eq!(stats.resolver.created(Table::Building), 0);
        assert_eq!(stats.resolver.duplicates(Table::Building), 1);
        assert_eq!(get_migration_runs(conn).unwrap().len(), 2);
    }

    #[test]
    fn test_old_street_name_recorded_once() {
        let mut migrator = Migrator::new(store(), Mode::Live).unwrap();

        let stats = migrator
            .run_rows(
                SourceKind::BldLocal,
                vec![bld_row("1", Some("192 Кірова вул.")), bld_row("2", Some("194 Кірова вул."))],
            )
            .unwrap();

        let conn = migrator.connection();
        let (old, current): (i64, i64) = conn
            .query_row(
                "SELECT SUM(name_type = 'old'), SUM(is_current) FROM street_names",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();

        assert_eq!((old, current), (1, 1));
        assert_eq!(stats.resolver.created(Table::StreetName), 1);
        assert_eq!(stats.resolver.duplicates(Table::StreetName), 1);
    }

    #[test]
    fn test_skipped_and_broken_rows_are_counted() {
        let mut migrator = Migrator::new(store(), Mode::Live).unwrap();
        let rows = vec![
            ek_row("Старий Шлях", "192"),
            SourceRow {
                line: 3,
                row_key: "line 3".into(),
                record: Err(MigrationError::validation("line 3", "missing street and building")),
            },
            SourceRow {
                line: 4,
                row_key: "line 4".into(),
                record: Err(MigrationError::parse("ek_addr", "bad quoting")),
            },
        ];

        let stats = migrator.run_rows(SourceKind::EkAddr, rows).unwrap();

        assert_eq!(stats.processed, 3);
        assert_eq!(stats.migrated, 1);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.links_created, 1);
    }

    #[test]
    fn test_dry_run_matches_live_counts() {
        let rows = || vec![ek_row("Старий Шлях", "192"), ek_row("Старий Шлях", "194"), ek_row("Робоча", "5")];

        let mut live = Migrator::new(store(), Mode::Live).unwrap();
        let live_stats = live.run_rows(SourceKind::EkAddr, rows()).unwrap();

        let mut dry = Migrator::new(store(), Mode::Dry).unwrap();
        let dry_stats = dry.run_rows(SourceKind::EkAddr, rows()).unwrap();

        assert_eq!(dry_stats.resolver, live_stats.resolver);
        assert_eq!(dry_stats.links_created, live_stats.links_created);
        assert_eq!(count_rows(dry.connection(), Table::Building).unwrap(), 0);
        assert!(get_migration_runs(dry.connection()).unwrap().is_empty());
    }

    #[test]
    fn test_rerun_refreshes_changed_payload() {
        let mut migrator = Migrator::new(store(), Mode::Live).unwrap();
        migrator.run_rows(SourceKind::BldLocal, vec![bld_row("1", None)]).unwrap();

        let again = migrator.run_rows(SourceKind::BldLocal, vec![bld_row("1", None)]).unwrap();
        assert_eq!(again.links_unchanged, 1);
        assert_eq!(again.resolver.total_created(), 0);

        let changed = migrator
            .run_rows(SourceKind::BldLocal, vec![bld_row("1", Some("192 Кірова вул."))])
            .unwrap();
        assert_eq!(changed.links_refreshed, 1);
        assert_eq!(count_object_sources(migrator.connection()).unwrap(), 1);
    }
}

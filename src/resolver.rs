// 🧭 Entity Resolver - Idempotent get-or-create per canonical table
//
// Resolution order per call:
//   1. run-scoped cache (committed rows, then the current row's pending entries)
//   2. store lookup: natural key → exact name under scope → fuzzy sibling match
//   3. conflict-tolerant insert (live) or synthetic id (dry)
//
// Everything a row adds to the cache, the counters or the dry-run shadow stays
// pending until `commit_row`; `abort_row` discards it.

use crate::classifier::EntityMatcher;
use crate::db::{insert_event, MigrationEvent};
use crate::entities::{EntityRecord, Repository, Scope, StreetNameType, StreetRepo, Table};
use crate::error::{MigrationError, Result};
use rusqlite::Connection;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, info, warn};

// ============================================================================
// MODE / OUTCOME
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Live,

    /// Same decisions, no writes, synthetic ids
    Dry,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Already resolved earlier in this run
    Cached,

    /// Existing row found by natural key or exact scoped name
    Found,

    /// Existing sibling reused after a very-high fuzzy match
    Matched { score: f64 },

    Created,

    /// Insert raced with another writer; the winner's row was re-read
    Conflict,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Resolution {
    pub id: i64,
    pub outcome: Outcome,
}

impl Resolution {
    pub fn is_new(&self) -> bool {
        self.outcome == Outcome::Created
    }
}

// ============================================================================
// COUNTERS
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TableCounters {
    pub created: u64,
    pub duplicates: u64,

    /// Subset of duplicates reused through fuzzy matching
    pub fuzzy_matched: u64,

    /// Near matches that were not strong enough to reuse
    pub similar_found: u64,

    /// Subset of duplicates resolved after an insert conflict
    pub conflicts: u64,
}

impl TableCounters {
    fn merge(&mut self, other: &TableCounters) {
        self.created += other.created;
        self.duplicates += other.duplicates;
        self.fuzzy_matched += other.fuzzy_matched;
        self.similar_found += other.similar_found;
        self.conflicts += other.conflicts;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolverStats {
    pub tables: BTreeMap<Table, TableCounters>,
}

impl ResolverStats {
    pub fn table(&self, table: Table) -> TableCounters {
        self.tables.get(&table).cloned().unwrap_or_default()
    }

    pub fn created(&self, table: Table) -> u64 {
        self.table(table).created
    }

    pub fn duplicates(&self, table: Table) -> u64 {
        self.table(table).duplicates
    }

    pub fn total_created(&self) -> u64 {
        self.tables.values().map(|c| c.created).sum()
    }

    pub fn total_duplicates(&self) -> u64 {
        self.tables.values().map(|c| c.duplicates).sum()
    }

    fn entry(&mut self, table: Table) -> &mut TableCounters {
        self.tables.entry(table).or_default()
    }

    fn merge(&mut self, other: &ResolverStats) {
        for (table, counters) in &other.tables {
            self.entry(*table).merge(counters);
        }
    }
}

// ============================================================================
// DRY-RUN SHADOW
// ============================================================================

/// Row that dry mode pretends to have inserted
#[derive(Debug, Clone)]
struct ShadowRow {
    id: i64,
    natural_key: String,
    name: String,
    name_key: String,
    scope: Scope,
}

#[derive(Debug, Default)]
struct Staged {
    cache: HashMap<(Table, String), i64>,
    stats: ResolverStats,
    shadow: Vec<(Table, ShadowRow)>,
    aliases: Vec<(i64, String)>,
}

// ============================================================================
// RESOLVER
// ============================================================================

pub struct EntityResolver {
    mode: Mode,
    matcher: EntityMatcher,
    actor: String,

    cache: HashMap<(Table, String), i64>,
    stats: ResolverStats,

    /// Dry mode only: rows and aliases "created" so far
    shadow: HashMap<Table, Vec<ShadowRow>>,
    shadow_aliases: HashSet<(i64, String)>,

    /// Dry mode only: ids at or above this value never exist in the store
    first_synthetic_id: i64,
    next_synthetic_id: i64,

    staged: Staged,
}

impl EntityResolver {
    /// `first_synthetic_id` must be above every id in the store (see `db::max_canonical_id`)
    pub fn new(mode: Mode, matcher: EntityMatcher, first_synthetic_id: i64) -> Self {
        let first = first_synthetic_id.max(1);
        EntityResolver {
            mode,
            matcher,
            actor: "migration".to_string(),
            cache: HashMap::new(),
            stats: ResolverStats::default(),
            shadow: HashMap::new(),
            shadow_aliases: HashSet::new(),
            first_synthetic_id: first,
            next_synthetic_id: first,
            staged: Staged::default(),
        }
    }

    pub fn live() -> Self {
        Self::new(Mode::Live, EntityMatcher::new(), 1)
    }

    pub fn dry(first_synthetic_id: i64) -> Self {
        Self::new(Mode::Dry, EntityMatcher::new(), first_synthetic_id)
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Name recorded as the actor of audit events
    pub fn set_actor(&mut self, actor: &str) {
        self.actor = actor.to_string();
    }

    // ------------------------------------------------------------------------
    // Row staging
    // ------------------------------------------------------------------------

    pub fn begin_row(&mut self) {
        self.staged = Staged::default();
    }

    pub fn commit_row(&mut self) {
        let staged = std::mem::take(&mut self.staged);

        self.cache.extend(staged.cache);
        self.stats.merge(&staged.stats);
        for (table, row) in staged.shadow {
            self.shadow.entry(table).or_default().push(row);
        }
        self.shadow_aliases.extend(staged.aliases);
    }

    pub fn abort_row(&mut self) {
        self.staged = Staged::default();
    }

    /// Committed counters
    pub fn stats(&self) -> &ResolverStats {
        &self.stats
    }

    /// Committed counters, resetting them for the next source
    pub fn take_stats(&mut self) -> ResolverStats {
        std::mem::take(&mut self.stats)
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.len()
    }

    // ------------------------------------------------------------------------
    // Resolution
    // ------------------------------------------------------------------------

    pub fn resolve<R: Repository>(&mut self, conn: &Connection, record: &R::Record) -> Result<Resolution> {
        let key = (R::TABLE, record.natural_key().to_string());

        if let Some(id) = self.cached(&key) {
            self.staged.stats.entry(R::TABLE).duplicates += 1;
            return Ok(Resolution {
                id,
                outcome: Outcome::Cached,
            });
        }

        let resolution = match self.lookup::<R>(conn, record)? {
            Some(found) => {
                let counters = self.staged.stats.entry(R::TABLE);
                counters.duplicates += 1;
                if let Outcome::Matched { .. } = found.outcome {
                    counters.fuzzy_matched += 1;
                }
                found
            }
            None => self.create::<R>(conn, record)?,
        };

        self.staged.cache.insert(key, resolution.id);
        Ok(resolution)
    }

    fn cached(&self, key: &(Table, String)) -> Option<i64> {
        self.cache
            .get(key)
            .or_else(|| self.staged.cache.get(key))
            .copied()
    }

    fn is_synthetic(&self, id: i64) -> bool {
        self.mode == Mode::Dry && id >= self.first_synthetic_id
    }

    /// Store queries under a scope that only exists in the dry-run shadow are pointless
    fn scope_in_store(&self, scope: Scope) -> bool {
        scope.ids().all(|id| !self.is_synthetic(id))
    }

    fn shadow_rows(&self, table: Table) -> impl Iterator<Item = &ShadowRow> {
        self.shadow
            .get(&table)
            .into_iter()
            .flatten()
            .chain(
                self.staged
                    .shadow
                    .iter()
                    .filter(move |(t, _)| *t == table)
                    .map(|(_, row)| row),
            )
    }

    fn lookup<R: Repository>(&mut self, conn: &Connection, record: &R::Record) -> Result<Option<Resolution>> {
        let scope = record.scope();
        let in_store = self.scope_in_store(scope);
        let found = |id| Resolution {
            id,
            outcome: Outcome::Found,
        };

        // Natural key
        if let Some(row) = self.shadow_rows(R::TABLE).find(|r| r.natural_key == record.natural_key()) {
            return Ok(Some(found(row.id)));
        }
        if let Some(id) = R::find_by_natural_key(conn, record.natural_key())? {
            return Ok(Some(found(id)));
        }

        // Exact name under the same scope
        if let Some(row) = self
            .shadow_rows(R::TABLE)
            .find(|r| r.scope == scope && r.name_key == record.name_key())
        {
            return Ok(Some(found(row.id)));
        }
        if in_store {
            if let Some(id) = R::find_by_name(conn, scope, record.name_key())? {
                return Ok(Some(found(id)));
            }
        }

        if !R::FUZZY {
            return Ok(None);
        }

        // Fuzzy match among siblings
        let mut siblings = if in_store { R::siblings(conn, scope)? } else { Vec::new() };
        siblings.extend(
            self.shadow_rows(R::TABLE)
                .filter(|r| r.scope == scope)
                .map(|r| crate::entities::Sibling {
                    id: r.id,
                    name: r.name.clone(),
                }),
        );
        if siblings.is_empty() {
            return Ok(None);
        }

        let names: Vec<String> = siblings.iter().map(|s| s.name.clone()).collect();
        let classification = self.matcher.match_among(record.display_name(), R::KIND, &names);

        let best = match classification.best_match {
            Some(ref best) => best.clone(),
            None => return Ok(None),
        };

        if classification.recommendation.reuses_existing() {
            if let Some(sibling) = siblings.iter().find(|s| s.name == best.name) {
                debug!(
                    table = %R::TABLE,
                    name = record.display_name(),
                    matched = %sibling.name,
                    score = best.score,
                    "fuzzy match reused existing row"
                );
                return Ok(Some(Resolution {
                    id: sibling.id,
                    outcome: Outcome::Matched { score: best.score },
                }));
            }
        }

        if classification.recommendation != crate::classifier::Recommendation::CreateNew {
            self.staged.stats.entry(R::TABLE).similar_found += 1;
            info!(
                table = %R::TABLE,
                name = record.display_name(),
                similar = %best.name,
                score = best.score,
                recommendation = classification.recommendation.as_str(),
                "similar object exists, creating new"
            );

            if self.mode == Mode::Live {
                let event = MigrationEvent::new(
                    "similar_object_noted",
                    R::TABLE.label(),
                    record.natural_key(),
                    serde_json::json!({
                        "name": record.display_name(),
                        "similar": best.name,
                        "score": best.score,
                        "tier": classification.tier.as_str(),
                        "recommendation": classification.recommendation.as_str(),
                    }),
                    &self.actor,
                );
                insert_event(conn, &event)?;
            }
        }

        Ok(None)
    }

    fn create<R: Repository>(&mut self, conn: &Connection, record: &R::Record) -> Result<Resolution> {
        match self.mode {
            Mode::Live => match R::insert(conn, record)? {
                Some(id) => {
                    self.staged.stats.entry(R::TABLE).created += 1;
                    Ok(Resolution {
                        id,
                        outcome: Outcome::Created,
                    })
                }
                None => {
                    let id = R::find_by_natural_key(conn, record.natural_key())?.ok_or_else(|| {
                        MigrationError::ResolutionConflict {
                            table: R::TABLE.name(),
                            key: record.natural_key().to_string(),
                        }
                    })?;
                    warn!(table = %R::TABLE, key = record.natural_key(), id, "insert conflict resolved by re-fetch");

                    let counters = self.staged.stats.entry(R::TABLE);
                    counters.duplicates += 1;
                    counters.conflicts += 1;
                    Ok(Resolution {
                        id,
                        outcome: Outcome::Conflict,
                    })
                }
            },
            Mode::Dry => {
                let id = self.next_synthetic_id;
                self.next_synthetic_id += 1;

                self.staged.shadow.push((
                    R::TABLE,
                    ShadowRow {
                        id,
                        natural_key: record.natural_key().to_string(),
                        name: record.display_name().to_string(),
                        name_key: record.name_key().to_string(),
                        scope: record.scope(),
                    },
                ));
                self.staged.stats.entry(R::TABLE).created += 1;

                Ok(Resolution {
                    id,
                    outcome: Outcome::Created,
                })
            }
        }
    }

    // ------------------------------------------------------------------------
    // Street aliases
    // ------------------------------------------------------------------------

    /// Record a non-current street name; true when it was new
    pub fn add_street_alias(
        &mut self,
        conn: &Connection,
        street_id: i64,
        name: &str,
        name_key: &str,
        name_type: StreetNameType,
    ) -> Result<bool> {
        let added = match self.mode {
            Mode::Live => StreetRepo::add_alias(conn, street_id, name, name_key, name_type)?,
            Mode::Dry => {
                let staged = self
                    .staged
                    .aliases
                    .iter()
                    .any(|(id, n)| *id == street_id && n == name);
                let known = staged
                    || self.shadow_aliases.contains(&(street_id, name.to_string()))
                    || self.shadow_current_name(street_id) == Some(name)
                    || (!self.is_synthetic(street_id) && StreetRepo::has_name(conn, street_id, name)?);

                if !known {
                    self.staged.aliases.push((street_id, name.to_string()));
                }
                !known
            }
        };

        let counters = self.staged.stats.entry(Table::StreetName);
        if added {
            counters.created += 1;
        } else {
            counters.duplicates += 1;
        }
        Ok(added)
    }

    fn shadow_current_name(&self, street_id: i64) -> Option<&str> {
        self.shadow_rows(Table::Street)
            .find(|r| r.id == street_id)
            .map(|r| r.name.as_str())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{count_rows, setup_database};
    use crate::entities::{CountryRepo, NewAdminUnit, NewCountry, RegionRepo};
    use crate::normalizer::{ObjectKind, TextNormalizer};

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    fn resolve_country(resolver: &mut EntityResolver, conn: &Connection) -> Resolution {
        let n = TextNormalizer::new();
        resolver.begin_row();
        let resolution = resolver
            .resolve::<CountryRepo>(conn, &NewCountry::new(&n, "Україна", "UA"))
            .unwrap();
        resolver.commit_row();
        resolution
    }

    #[test]
    fn test_same_key_twice_same_id() {
        let conn = setup();
        let mut resolver = EntityResolver::live();

        let first = resolve_country(&mut resolver, &conn);
        let second = resolve_country(&mut resolver, &conn);

        assert_eq!(first.id, second.id);
        assert_eq!(first.outcome, Outcome::Created);
        assert_eq!(second.outcome, Outcome::Cached);
        assert_eq!(resolver.stats().created(Table::Country), 1);
        assert_eq!(resolver.stats().duplicates(Table::Country), 1);
    }

    #[test]
    fn test_fresh_resolver_finds_existing_row() {
        let conn = setup();
        let first = resolve_country(&mut EntityResolver::live(), &conn);

        let mut rerun = EntityResolver::live();
        let second = resolve_country(&mut rerun, &conn);

        assert_eq!(second.id, first.id);
        assert_eq!(second.outcome, Outcome::Found);
        assert_eq!(rerun.stats().created(Table::Country), 0);
        assert_eq!(count_rows(&conn, Table::Country).unwrap(), 1);
    }

    #[test]
    fn test_exact_name_under_scope_reused_across_key_spaces() {
        let conn = setup();
        let n = TextNormalizer::new();
        let mut resolver = EntityResolver::live();
        let country = resolve_country(&mut resolver, &conn).id;

        let keyed = NewAdminUnit::new(
            &n,
            ObjectKind::Generic,
            "Дніпропетровська область",
            country,
            Some(crate::entities::NaturalKey::Source {
                source: "rtg".into(),
                id: "2".into(),
            }),
        );
        let named = NewAdminUnit::new(&n, ObjectKind::Generic, "Дніпропетровська  область", country, None);

        resolver.begin_row();
        let a = resolver.resolve::<RegionRepo>(&conn, &keyed).unwrap();
        let b = resolver.resolve::<RegionRepo>(&conn, &named).unwrap();
        resolver.commit_row();

        assert_eq!(a.id, b.id);
        assert_eq!(b.outcome, Outcome::Found);
        assert_eq!(count_rows(&conn, Table::Region).unwrap(), 1);
    }

    #[test]
    fn test_fuzzy_sibling_reused_when_name_key_is_stale() {
        let conn = setup();
        let n = TextNormalizer::new();
        let mut resolver = EntityResolver::live();
        let country = resolve_country(&mut resolver, &conn).id;

        // Row written by an older import with a different key scheme
        conn.execute(
            "INSERT INTO regions (natural_key, name_uk, name_key, country_id)
             VALUES ('legacy:1', 'Київська область', 'kyivska', ?1)",
            [country],
        )
        .unwrap();
        let legacy = conn.last_insert_rowid();

        resolver.begin_row();
        let resolved = resolver
            .resolve::<RegionRepo>(&conn, &NewAdminUnit::new(&n, ObjectKind::Generic, "київська  область", country, None))
            .unwrap();
        resolver.commit_row();

        assert!(matches!(resolved.outcome, Outcome::Matched { .. }), "{:?}", resolved.outcome);
        assert_eq!(resolved.id, legacy);
        assert_eq!(resolver.stats().table(Table::Region).fuzzy_matched, 1);
        assert_eq!(count_rows(&conn, Table::Region).unwrap(), 1);
    }

    #[test]
    fn test_similar_sibling_noted_but_new_row_created() {
        let conn = setup();
        let n = TextNormalizer::new();
        let mut resolver = EntityResolver::live();
        let country = resolve_country(&mut resolver, &conn).id;

        resolver.begin_row();
        let first = resolver
            .resolve::<RegionRepo>(&conn, &NewAdminUnit::new(&n, ObjectKind::Generic, "Кам'янська", country, None))
            .unwrap();
        let second = resolver
            .resolve::<RegionRepo>(&conn, &NewAdminUnit::new(&n, ObjectKind::Generic, "Кам янська", country, None))
            .unwrap();
        resolver.commit_row();

        assert_ne!(first.id, second.id);
        assert_eq!(second.outcome, Outcome::Created);
        assert_eq!(resolver.stats().table(Table::Region).similar_found, 1);

        let noted: i64 = conn
            .query_row("SELECT COUNT(*) FROM migration_events WHERE event_type = 'similar_object_noted'", [], |row| row.get(0))
            .unwrap();
        assert_eq!(noted, 1);
    }

    #[test]
    fn test_aborted_row_leaves_no_trace() {
        let conn = setup();
        let n = TextNormalizer::new();
        let mut resolver = EntityResolver::dry(1);

        resolver.begin_row();
        resolver
            .resolve::<CountryRepo>(&conn, &NewCountry::new(&n, "Україна", "UA"))
            .unwrap();
        resolver.abort_row();

        assert_eq!(resolver.cached_entries(), 0);
        assert_eq!(resolver.stats().total_created(), 0);

        let retry = resolve_country(&mut resolver, &conn);
        assert_eq!(retry.outcome, Outcome::Created);
    }

    #[test]
    fn test_dry_mode_writes_nothing_and_ids_increase() {
        let conn = setup();
        let n = TextNormalizer::new();
        let mut resolver = EntityResolver::dry(1);

        let country = resolve_country(&mut resolver, &conn).id;
        resolver.begin_row();
        let region = resolver
            .resolve::<RegionRepo>(&conn, &NewAdminUnit::new(&n, ObjectKind::Generic, "Область", country, None))
            .unwrap();
        let again = resolver
            .resolve::<RegionRepo>(&conn, &NewAdminUnit::new(&n, ObjectKind::Generic, "область", country, None))
            .unwrap();
        resolver.commit_row();

        assert!(region.id > country);
        assert_eq!(again.id, region.id);
        assert_eq!(count_rows(&conn, Table::Country).unwrap(), 0);
        assert_eq!(count_rows(&conn, Table::Region).unwrap(), 0);
        assert_eq!(resolver.stats().created(Table::Region), 1);
    }
}

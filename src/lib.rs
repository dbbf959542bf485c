// Address Registry - Core Library
// Shared by the migration CLI, the search server and the tests

pub mod candidates;     // Two-stage candidate ranking
pub mod classifier;     // Confidence tiers and recommendations
pub mod config;
pub mod db;
pub mod entities;       // Canonical tables and their repositories
pub mod error;
pub mod hierarchy;      // Dotted path ids
pub mod normalizer;
pub mod pipeline;       // Source → registry migration
pub mod resolver;       // Idempotent get-or-create
pub mod search;         // Free-text search and autocomplete
pub mod similarity;
pub mod sources;        // rtg_addr, bld_local, ek_addr

// Re-export commonly used types
pub use candidates::{Candidate, CandidateIndex, NameSource};
pub use classifier::{
    Classification, ConfidenceClassifier, ConfidenceTier, EntityMatcher, Recommendation, TierThresholds,
};
pub use config::{RunConfig, SourceInputs};
pub use db::{
    count_object_sources, count_rows, get_events_for_entity, get_migration_runs, link_object_source,
    register_data_source, setup_database, LinkOutcome, MigrationEvent, MigrationRun, ObjectSourceLink,
};
pub use entities::{NaturalKey, Repository, Scope, Table};
pub use error::{MigrationError, Result};
pub use hierarchy::{HierarchyPath, Level};
pub use normalizer::{building_number, ObjectKind, TextNormalizer};
pub use pipeline::{MigrationStats, Migrator, RowOutcome, DEFAULT_BATCH_SIZE};
pub use resolver::{EntityResolver, Mode, Outcome, Resolution, ResolverStats, TableCounters};
pub use search::{AddressMatch, AddressSearchEngine, ParsedQuery, SearchResults, Suggestion};
pub use similarity::{MetricWeights, SimilarityBreakdown, SimilarityScorer};
pub use sources::{get_source, AddressRecord, AddressSource, SourceKind, SourceRow};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

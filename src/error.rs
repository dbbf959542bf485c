// ⚠️ Error Taxonomy - Typed failures for the migration library
// Row-level kinds are recoverable, source/startup kinds are fatal for their scope

use std::path::PathBuf;
use thiserror::Error;

/// Library result alias
pub type Result<T, E = MigrationError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum MigrationError {
    /// Mandatory fields missing - row is skipped and counted, never fatal
    #[error("row {row} failed validation: {reason}")]
    Validation { row: String, reason: String },

    /// Natural-key insert lost a race and the winning row could not be re-read
    #[error("natural key conflict on {table} for key {key}")]
    ResolutionConflict { table: &'static str, key: String },

    /// Non-conflict write or read failure - fatal for the current row only
    #[error("persistence failure while {context}: {source}")]
    Persistence {
        context: String,
        #[source]
        source: rusqlite::Error,
    },

    /// Malformed source section, header or row
    #[error("failed to parse {source_name}: {message}")]
    Parse { source_name: String, message: String },

    /// Source file could not be read
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Provenance payload could not be encoded
    #[error("failed to encode payload: {0}")]
    Payload(#[from] serde_json::Error),

    /// Missing connection or input settings - fatal at startup
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl MigrationError {
    pub fn validation(row: impl Into<String>, reason: impl Into<String>) -> Self {
        MigrationError::Validation {
            row: row.into(),
            reason: reason.into(),
        }
    }

    pub fn parse(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        MigrationError::Parse {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    /// True for failures that stop a whole source rather than a single row
    pub fn is_source_fatal(&self) -> bool {
        matches!(
            self,
            MigrationError::Parse { .. } | MigrationError::Io { .. } | MigrationError::Configuration(_)
        )
    }
}

/// Attach a description of the store operation to a rusqlite failure
pub trait StoreContext<T> {
    fn store_context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> StoreContext<T> for std::result::Result<T, rusqlite::Error> {
    fn store_context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|source| MigrationError::Persistence {
            context: context.into(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_context_wraps_rusqlite_error() {
        let raw: std::result::Result<(), rusqlite::Error> = Err(rusqlite::Error::QueryReturnedNoRows);
        let err = raw.store_context("reading cities").unwrap_err();

        assert!(matches!(err, MigrationError::Persistence { .. }));
        assert!(err.to_string().contains("reading cities"));
    }

    #[test]
    fn test_source_fatal_kinds() {
        assert!(MigrationError::parse("rtg_addr", "no header").is_source_fatal());
        assert!(MigrationError::Configuration("no db".into()).is_source_fatal());
        assert!(!MigrationError::validation("17", "missing city").is_source_fatal());
        assert!(!MigrationError::ResolutionConflict { table: "cities", key: "rtg:5".into() }.is_source_fatal());
    }
}

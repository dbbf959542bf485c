// ⚙️ Run Configuration - checked settings for one migration invocation
// CLI flags and environment values are collected by the binary, validated here

use crate::db::setup_database;
use crate::error::{MigrationError, Result, StoreContext};
use crate::pipeline::DEFAULT_BATCH_SIZE;
use crate::resolver::Mode;
use crate::sources::SourceKind;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use tracing::info;

pub const DB_PATH_ENV: &str = "ADDR_DB_PATH";

/// Input file per source
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceInputs {
    pub rtg_addr: Option<PathBuf>,
    pub bld_local: Option<PathBuf>,
    pub ek_addr: Option<PathBuf>,
}

impl SourceInputs {
    pub fn path(&self, kind: SourceKind) -> Option<&Path> {
        match kind {
            SourceKind::RtgAddr => self.rtg_addr.as_deref(),
            SourceKind::BldLocal => self.bld_local.as_deref(),
            SourceKind::EkAddr => self.ek_addr.as_deref(),
        }
    }

    /// Environment variable consulted for a source's input path
    pub fn env_var(kind: SourceKind) -> &'static str {
        match kind {
            SourceKind::RtgAddr => "ADDR_RTG_PATH",
            SourceKind::BldLocal => "ADDR_BLD_PATH",
            SourceKind::EkAddr => "ADDR_EK_PATH",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    /// Sources to run, in run order
    pub sources: Vec<SourceKind>,
    pub mode: Mode,
    pub batch_size: usize,
    pub db_path: Option<PathBuf>,
    pub inputs: SourceInputs,
}

impl RunConfig {
    pub fn new(sources: Vec<SourceKind>, mode: Mode) -> Self {
        RunConfig {
            sources,
            mode,
            batch_size: DEFAULT_BATCH_SIZE,
            db_path: None,
            inputs: SourceInputs::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.sources.is_empty() {
            return Err(MigrationError::Configuration("no source selected".to_string()));
        }
        if self.batch_size == 0 {
            return Err(MigrationError::Configuration("batch size must be positive".to_string()));
        }
        if self.mode == Mode::Live && self.db_path.is_none() {
            return Err(MigrationError::Configuration(format!(
                "{} is required unless running with --dry-run",
                DB_PATH_ENV
            )));
        }

        for kind in &self.sources {
            if self.inputs.path(*kind).is_none() {
                return Err(MigrationError::Configuration(format!(
                    "{} selected but no input file given (--{} or {})",
                    kind.name(),
                    kind.name().replace('_', "-"),
                    SourceInputs::env_var(*kind)
                )));
            }
        }

        Ok(())
    }

    /// Input path of a selected source
    pub fn input(&self, kind: SourceKind) -> Result<&Path> {
        self.inputs
            .path(kind)
            .ok_or_else(|| MigrationError::Configuration(format!("no input file for {}", kind.name())))
    }

    /// Open the store with the schema applied; a dry run without a path uses memory
    pub fn open_store(&self) -> Result<Connection> {
        let conn = match &self.db_path {
            Some(path) => {
                info!(path = %path.display(), "opening registry store");
                Connection::open(path).store_context(format!("opening {}", path.display()))?
            }
            None => {
                info!("no database given, dry run uses an in-memory store");
                Connection::open_in_memory().store_context("opening in-memory store")?
            }
        };

        setup_database(&conn)?;
        Ok(conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::count_rows;
    use crate::entities::Table;

    fn ek_only(mode: Mode) -> RunConfig {
        let mut config = RunConfig::new(vec![SourceKind::EkAddr], mode);
        config.inputs.ek_addr = Some(PathBuf::from("ek.csv"));
        config
    }

    #[test]
    fn test_live_requires_database() {
        let err = ek_only(Mode::Live).validate().unwrap_err();
        assert!(matches!(err, MigrationError::Configuration(_)));
        assert!(err.to_string().contains(DB_PATH_ENV));
    }

    #[test]
    fn test_selected_source_requires_input() {
        let mut config = ek_only(Mode::Dry);
        config.sources.push(SourceKind::RtgAddr);

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("rtg_addr"));
        assert!(err.to_string().contains("ADDR_RTG_PATH"));
    }

    #[test]
    fn test_dry_run_uses_memory_store() {
        let config = ek_only(Mode::Dry);
        config.validate().unwrap();

        let conn = config.open_store().unwrap();
        assert_eq!(count_rows(&conn, Table::Building).unwrap(), 0);
        assert_eq!(config.input(SourceKind::EkAddr).unwrap(), Path::new("ek.csv"));
        assert!(config.input(SourceKind::BldLocal).is_err());
    }

    #[test]
    fn test_live_store_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ek_only(Mode::Live);
        config.db_path = Some(dir.path().join("registry.db"));

        config.validate().unwrap();
        let conn = config.open_store().unwrap();
        assert_eq!(count_rows(&conn, Table::Country).unwrap(), 0);
        assert!(dir.path().join("registry.db").exists());
    }
}

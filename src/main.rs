// 🗄️ addr-migrate - Migration CLI
// Runs the selected sources into the registry, one after another

use addr_registry::{Migrator, Mode, RunConfig, SourceInputs, SourceKind, DEFAULT_BATCH_SIZE};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum TableArg {
    #[value(name = "rtg_addr")]
    RtgAddr,
    #[value(name = "bld_local")]
    BldLocal,
    #[value(name = "ek_addr")]
    EkAddr,
    All,
}

/// Selected sources in run order, without repeats
fn selected_sources(tables: &[TableArg]) -> Vec<SourceKind> {
    SourceKind::ALL
        .into_iter()
        .filter(|kind| {
            tables.iter().any(|table| match table {
                TableArg::All => true,
                TableArg::RtgAddr => *kind == SourceKind::RtgAddr,
                TableArg::BldLocal => *kind == SourceKind::BldLocal,
                TableArg::EkAddr => *kind == SourceKind::EkAddr,
            })
        })
        .collect()
}

#[derive(Debug, Parser)]
#[command(name = "addr-migrate", version, about = "Migrate address sources into the canonical registry")]
struct Cli {
    /// Sources to migrate
    #[arg(long, value_enum, num_args = 1.., default_value = "all")]
    tables: Vec<TableArg>,

    /// Evaluate every decision without writing
    #[arg(long)]
    dry_run: bool,

    /// Rows between progress reports
    #[arg(long, env = "ADDR_BATCH_SIZE", default_value_t = DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    /// SQLite registry file
    #[arg(long, env = "ADDR_DB_PATH")]
    db: Option<PathBuf>,

    /// rtg_addr export (pipe-delimited dump)
    #[arg(long = "rtg-addr", env = "ADDR_RTG_PATH")]
    rtg_addr: Option<PathBuf>,

    /// bld_local CSV export
    #[arg(long = "bld-local", env = "ADDR_BLD_PATH")]
    bld_local: Option<PathBuf>,

    /// ek_addr CSV export
    #[arg(long = "ek-addr", env = "ADDR_EK_PATH")]
    ek_addr: Option<PathBuf>,
}

impl Cli {
    fn into_config(self) -> RunConfig {
        let mode = if self.dry_run { Mode::Dry } else { Mode::Live };
        let mut config = RunConfig::new(selected_sources(&self.tables), mode);
        config.batch_size = self.batch_size;
        config.db_path = self.db;
        config.inputs = SourceInputs {
            rtg_addr: self.rtg_addr,
            bld_local: self.bld_local,
            ek_addr: self.ek_addr,
        };
        config
    }
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Cli::parse().into_config();
    config.validate().context("invalid configuration")?;

    println!("🗄️  Address registry migration");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    if config.mode == Mode::Dry {
        println!("🧪 Dry run: nothing will be written");
    }

    let conn = config.open_store().context("opening registry store")?;
    let mut migrator = Migrator::new(conn, config.mode)
        .context("preparing migrator")?
        .with_batch_size(config.batch_size);

    let mut failed = Vec::new();
    for kind in &config.sources {
        let path = config.input(*kind)?;
        info!(source = kind.name(), path = %path.display(), "running source");

        match migrator.run(*kind, path) {
            Ok(stats) => println!("✓ {}", stats.summary()),
            Err(e) if e.is_source_fatal() => {
                error!(source = kind.name(), error = %e, "source aborted");
                println!("❌ {}: {}", kind.name(), e);
                failed.push(kind.name());
            }
            Err(e) => return Err(e).with_context(|| format!("migrating {}", kind.name())),
        }
    }

    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    if !failed.is_empty() {
        anyhow::bail!("sources failed: {}", failed.join(", "));
    }

    println!("✅ Migration complete");
    Ok(())
}

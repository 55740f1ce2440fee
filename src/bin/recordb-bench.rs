//! recordb benchmark harness
//!
//! Usage: recordb-bench [users|students] [--count N] [--chunk N] [--seed N]
//!                      [--config path.json] [--no-index]
//!
//! Log verbosity follows RUST_LOG (default `info`).

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use recordb::workload::{self, ScenarioOptions};
use recordb::{DBConfig, Database};

#[derive(Parser)]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run recordb object-store benchmark scenarios")]
struct Cli {
    #[command(subcommand)]
    scenario: Option<Scenario>,

    /// Number of users / students (scenario default when omitted)
    #[arg(long, global = true)]
    count: Option<usize>,

    /// Commit every N records instead of one transaction
    #[arg(long, global = true)]
    chunk: Option<usize>,

    /// RNG seed for generated data
    #[arg(long, global = true, default_value_t = 42)]
    seed: u64,

    /// JSON database config (defaults to the benchmark preset)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Skip index declaration (every query scans)
    #[arg(long, global = true)]
    no_index: bool,
}

#[derive(Subcommand, Clone, Copy)]
enum Scenario {
    /// Simple objects (default 100,000)
    Users,
    /// Complex linked objects (default 10,000 across 100 schools)
    Students,
}

impl Scenario {
    fn default_count(self) -> usize {
        match self {
            Scenario::Users => 100_000,
            Scenario::Students => 10_000,
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let scenario = cli.scenario.unwrap_or(Scenario::Users);

    let config = match &cli.config {
        Some(path) => DBConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => DBConfig::for_benchmark(),
    };
    tracing::info!(writer_mode = config.writer_mode.description(), "config loaded");
    let db = Database::with_config(config).context("creating database")?;

    let options = ScenarioOptions {
        count: cli.count.unwrap_or(scenario.default_count()),
        chunk: cli.chunk,
        seed: cli.seed,
        indexes: !cli.no_index,
    };

    let report = match scenario {
        Scenario::Users => workload::users::run(&db, &options),
        Scenario::Students => workload::students::run(&db, &options),
    }
    .context("scenario failed")?;

    println!("{}", report);
    Ok(())
}

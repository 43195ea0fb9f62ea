use std::error::Error;
use std::path::Path;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use log::info;

use flurry::artifact::ArtifactWriter;
use flurry::config::Config;
use flurry::extract::{Extractor, HttpExtractor, SimulatedExtractor};
use flurry::pipeline::{Pipeline, RunOutcome};
use flurry::run_state::RunStateStore;
use flurry::warehouse::duckdb::DuckdbWarehouse;
use flurry::warehouse::snowflake::SnowflakeWarehouse;
use flurry::warehouse::Warehouse;

#[derive(ValueEnum, Clone, Debug)]
enum WarehouseKind {
    Snowflake,
    Duckdb,
}

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Environment name, e.g., test, prod
    #[arg(short, long, default_value = "prod")]
    env: String,

    /// Target warehouse; duckdb loads into a local file next to the artifacts
    #[arg(long, value_enum, default_value = "snowflake")]
    warehouse: WarehouseKind,
}

/// Run this job from cron on the first of the month.  Re-invocations within
/// the same calendar month are no-ops, so a daily schedule is also fine.
fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .init();

    let _ = dotenvy::from_path(Path::new(format!(".env/{}.env", args.env).as_str()));

    // fail fast, before any file or network I/O
    let config = Config::from_env()?;

    let extractor: Box<dyn Extractor> = match &config.source_url {
        Some(url) => Box::new(HttpExtractor {
            url: url.clone(),
            timeout: Duration::from_secs(60),
        }),
        None => Box::new(SimulatedExtractor { record_count: 10 }),
    };
    let warehouse: Box<dyn Warehouse> = match args.warehouse {
        WarehouseKind::Snowflake => Box::new(SnowflakeWarehouse {
            credentials: config.credentials.clone(),
        }),
        WarehouseKind::Duckdb => Box::new(DuckdbWarehouse {
            duckdb_path: config
                .data_save_path
                .join("monthly_data.duckdb")
                .display()
                .to_string(),
        }),
    };

    let pipeline = Pipeline {
        store: RunStateStore {
            path: config.state_path.clone(),
        },
        extractor,
        writer: ArtifactWriter {
            base_dir: config.data_save_path.clone(),
        },
        warehouse,
        target_table: config.target_table.clone(),
        max_load_attempts: 3,
        initial_retry_wait: Duration::from_secs(2),
    };

    match pipeline.run()? {
        RunOutcome::NotDue { next_due } => {
            info!("monthly data load not required yet, next due at {}", next_due)
        }
        RunOutcome::Empty => info!("no new records in the window, nothing to load"),
        RunOutcome::Loaded {
            rows_loaded,
            artifact,
        } => info!("loaded {} rows from {}", rows_loaded, artifact.display()),
    }

    Ok(())
}

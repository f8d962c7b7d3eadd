//! SRPG - Development Tools

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use srpg_core::data::Database;
use srpg_tools::scenario::{Scenario, ScenarioError};
use srpg_tools::simulate::{simulate, verify_replay};

#[derive(Parser)]
#[command(name = "srpg-tools")]
#[command(about = "Development tools for the SRPG combat resolver")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate data files
    Validate {
        /// Path to data directory
        #[arg(default_value = "assets/data")]
        path: String,
    },
    /// Resolve a scenario's encounter headlessly
    Simulate {
        /// Content database
        database: PathBuf,
        /// Scenario file
        scenario: PathBuf,
        /// Override the scenario's seed
        #[arg(long)]
        seed: Option<u64>,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
        /// Also save the encounter as a replay file
        #[arg(long)]
        replay: Option<PathBuf>,
    },
    /// Re-run a replay file and check it reproduces
    VerifyReplay {
        /// Content database
        database: PathBuf,
        /// Replay file
        replay: PathBuf,
    },
}

fn run_simulation(
    database: &Path,
    scenario: &Path,
    seed: Option<u64>,
    json: bool,
    replay: Option<&Path>,
) -> Result<(), ScenarioError> {
    let db = Database::load(database)?;
    let scenario = Scenario::load(scenario)?;
    let report = simulate(&db, &scenario, seed, replay)?;
    if json {
        let text = serde_json::to_string_pretty(&report)
            .map_err(|e| ScenarioError::Invalid(vec![format!("report serialization failed: {e}")]))?;
        println!("{text}");
    } else {
        for line in report.to_text() {
            println!("{line}");
        }
    }
    Ok(())
}

fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { path } => {
            tracing::info!("Validating data files in: {path}");
            match srpg_tools::validate::validate_data_directory(Path::new(&path)) {
                Ok(count) => tracing::info!("Validation passed ({count} scenarios)"),
                Err(e) => {
                    tracing::error!("Validation failed: {e}");
                    std::process::exit(1);
                }
            }
        }
        Commands::Simulate { database, scenario, seed, json, replay } => {
            if let Err(e) = run_simulation(&database, &scenario, seed, json, replay.as_deref()) {
                tracing::error!("Simulation failed: {e}");
                std::process::exit(1);
            }
        }
        Commands::VerifyReplay { database, replay } => {
            let result = Database::load(&database).map_err(ScenarioError::from).and_then(|db| verify_replay(&db, &replay));
            match result {
                Ok(true) => tracing::info!("Replay reproduces"),
                Ok(false) => {
                    tracing::error!("Replay diverged");
                    std::process::exit(1);
                }
                Err(e) => {
                    tracing::error!("Replay check failed: {e}");
                    std::process::exit(1);
                }
            }
        }
    }
}

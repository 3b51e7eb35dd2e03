//! ForgeEditions CLI
//!
//! Commands: generate, layers, validate
//! Outputs JSON to stdout, logs to stderr
//! Returns 2 when a run aborts, 1 when it cannot start

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use forgeeditions_core::{
    edition::fs_persistence, DirElementSource, EditionConfig, EditionDriver, GenerationError,
    LayerRegistry,
};

#[derive(Parser)]
#[command(name = "forgeeditions-cli")]
#[command(about = "ForgeEditions CLI - Edition Compiler")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the edition configuration (JSON)
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// Overrides layersDir from the configuration
    #[arg(long)]
    layers_dir: Option<PathBuf>,

    /// Raise log verbosity (-d debug, -dd trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    debug: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate the edition into the build directory
    Generate {
        /// Overrides buildDir from the configuration
        #[arg(short, long)]
        build_dir: Option<PathBuf>,

        /// Overrides editionSize from the configuration
        #[arg(short = 'n', long)]
        edition_size: Option<u32>,

        /// Seed for a reproducible edition
        #[arg(short, long)]
        seed: Option<u64>,
    },

    /// List layers, elements and rarities
    Layers,

    /// Validate the configuration only
    Validate,
}

/// Filter used when `RUST_LOG` is unset.
fn default_filter(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

fn setup_logging(verbosity: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbosity)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();
}

/// Failure report; `lastCompleted` is present once generation was attempted.
fn failure_json(error: &GenerationError, last_completed: Option<u32>) -> serde_json::Value {
    let mut output = serde_json::json!({
        "success": false,
        "error": error.to_string(),
    });
    if let Some(last) = last_completed {
        output["lastCompleted"] = last.into();
    }
    output
}

fn fail(error: &GenerationError) -> ExitCode {
    println!("{}", failure_json(error, None));
    ExitCode::FAILURE
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(cli.debug);

    let mut config = match EditionConfig::load(&cli.config) {
        Ok(c) => c,
        Err(e) => return fail(&e),
    };
    if let Some(dir) = &cli.layers_dir {
        config.layers_dir = dir.clone();
    }

    match cli.command {
        Commands::Validate => {
            let output = serde_json::json!({
                "valid": true,
                "layers": config.layer_names(),
                "editionSize": config.edition_size,
            });
            println!("{}", output);
            ExitCode::SUCCESS
        }

        Commands::Layers => {
            let registry = match LayerRegistry::from_config(
                &config,
                &DirElementSource::new(&config.layers_dir),
            ) {
                Ok(r) => r,
                Err(e) => return fail(&e),
            };
            let output = serde_json::json!({
                "layers": registry.layers(),
                "combinations": registry.combination_count().to_string(),
            });
            match serde_json::to_string_pretty(&output) {
                Ok(json) => {
                    println!("{}", json);
                    ExitCode::SUCCESS
                }
                Err(e) => fail(&e.into()),
            }
        }

        Commands::Generate {
            build_dir,
            edition_size,
            seed,
        } => {
            if let Some(dir) = build_dir {
                config.build_dir = dir;
            }
            if let Some(size) = edition_size {
                config.edition_size = size;
            }

            let mut persistence = fs_persistence(&config);
            let driver = match EditionDriver::from_config(config) {
                Ok(d) => d,
                Err(e) => {
                    println!("{}", failure_json(&e, Some(0)));
                    return ExitCode::FAILURE;
                }
            };
            let mut driver = match seed {
                Some(seed) => driver.with_seed(seed),
                None => driver,
            };

            match driver.run(&mut persistence) {
                Ok(report) => {
                    let output = serde_json::json!({
                        "success": true,
                        "state": driver.state(),
                        "report": report,
                    });
                    match serde_json::to_string_pretty(&output) {
                        Ok(json) => {
                            println!("{}", json);
                            ExitCode::SUCCESS
                        }
                        Err(e) => fail(&e.into()),
                    }
                }
                Err(aborted) => {
                    let mut output = failure_json(&aborted.cause, Some(aborted.last_completed));
                    output["state"] = serde_json::json!(driver.state());
                    println!("{}", output);
                    ExitCode::from(2)
                }
            }
        }
    }
}

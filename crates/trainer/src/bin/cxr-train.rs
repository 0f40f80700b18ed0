//! Chest X-ray training harness CLI
//!
//! Prepares class folders from a label table, runs training through an
//! external per-epoch program, and inspects or exports saved checkpoints.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use train_core::{DeviceKind, Epoch, RuntimeManager, TerminationReason, TrainingConfig};
use trainer::commands::{self, TrainOptions};

#[derive(Parser, Debug)]
#[command(name = "cxr-train", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train with the configured step program
    Train {
        /// Configuration file (.yaml, .yml or .json)
        #[arg(short, long)]
        config: PathBuf,

        /// Resume from the latest checkpoint in the save directory
        #[arg(short, long)]
        resume: bool,

        /// Device to use: cpu, cuda or hpu (default: auto)
        #[arg(short, long)]
        device: Option<DeviceKind>,
    },
    /// Copy labelled images into negative/positive class folders
    Prepare {
        /// CSV file with ID and LABEL columns
        #[arg(long)]
        labels: PathBuf,

        /// Directory searched recursively for *.png images
        #[arg(long)]
        source: PathBuf,

        /// Output directory for the class folders
        #[arg(long)]
        out: PathBuf,
    },
    /// List the checkpoints in a save directory
    Inspect {
        #[arg(short, long)]
        dir: PathBuf,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Extract a checkpoint's state and metadata
    Export {
        #[arg(short, long)]
        dir: PathBuf,

        /// Epoch to export (default: the best checkpoint)
        #[arg(short, long)]
        epoch: Option<Epoch>,

        #[arg(short, long)]
        out: PathBuf,
    },
}

fn init_tracing(default_level: Level) {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_level.as_str().to_lowercase())),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Train {
            config,
            resume,
            device,
        } => {
            let config = TrainingConfig::from_file(&config)
                .with_context(|| format!("loading {}", config.display()))?;
            init_tracing(config.log_level());

            let runtime = RuntimeManager::new(config.runtime.io_threads)?;
            runtime.install_interrupt_handler();

            tracing::info!(
                name = %config.name,
                save_dir = %config.save_dir.display(),
                "Starting run"
            );
            let options = TrainOptions { resume, device };
            let summary = commands::train(&config, &options, &runtime)?;

            println!("{}", serde_json::to_string_pretty(&summary)?);
            if summary.reason == TerminationReason::Interrupted {
                drop(runtime);
                std::process::exit(130);
            }
        }
        Command::Prepare {
            labels,
            source,
            out,
        } => {
            init_tracing(Level::INFO);
            let report = commands::prepare(&labels, &source, &out)?;
            for (class, count) in &report.copied {
                println!("{:10} {}", class, count);
            }
            println!("{:10} {}", "unlabeled", report.unlabeled.len());
        }
        Command::Inspect { dir, json } => {
            init_tracing(Level::WARN);
            let runtime = RuntimeManager::new(1)?;
            let infos = commands::inspect(&dir, &runtime)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&infos)?);
            } else {
                println!(
                    "{:28} {:>6} {:>12} {:>12}  {}",
                    "KEY", "EPOCH", "BEST", "MODEL", "ARCH"
                );
                for info in &infos {
                    let best = info
                        .monitor_best
                        .map(|v| format!("{:.6}", v))
                        .unwrap_or_else(|| "-".to_string());
                    println!(
                        "{:28} {:>6} {:>12} {:>12}  {}",
                        info.key, info.epoch, best, info.model_bytes, info.arch
                    );
                }
            }
        }
        Command::Export { dir, epoch, out } => {
            init_tracing(Level::INFO);
            let runtime = RuntimeManager::new(1)?;
            let report = commands::export(&dir, epoch, &out, &runtime)?;
            println!("{} -> {}", report.source, out.display());
        }
    }

    Ok(())
}

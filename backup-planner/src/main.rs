//! Backup Planner - Main entry point

use anyhow::{Context, Result};
use backup_planner::config::SuccessPolicy;
use backup_planner::{backup, utils, BackupConfig};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Plan and execute a backup described by a configuration file
    Run {
        /// Path to configuration file
        #[arg(short, long, value_name = "FILE")]
        config: PathBuf,

        /// Only plan and save actions.json, do not touch the target
        #[arg(long)]
        dry_run: bool,

        /// Log level (trace, debug, info, warn, error)
        #[arg(short, long)]
        log_level: Option<String>,
    },

    /// Execute the actions.json saved in a snapshot directory
    Apply {
        /// Snapshot directory containing metadata.json and actions.json
        #[arg(short, long, value_name = "DIR")]
        snapshot: PathBuf,

        /// Record the snapshot as successful only if no action failed
        #[arg(long)]
        no_failures: bool,

        /// Log level (trace, debug, info, warn, error)
        #[arg(short, long)]
        log_level: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Command::Run {
            config,
            dry_run,
            log_level,
        } => {
            let mut config = BackupConfig::from_file(&config)
                .with_context(|| format!("Failed to load configuration from {}", config.display()))?;
            if dry_run {
                config.apply_actions = false;
            }

            let log_level = log_level.as_deref().unwrap_or(&config.log.level);
            let log = utils::logger::init(log_level)?;

            tracing::info!(
                "Starting backup-planner v{} ({} mode)",
                env!("CARGO_PKG_VERSION"),
                config.mode
            );

            let outcome = backup::run(&config, Some(&log)).await?;
            tracing::info!("Actions: {}", outcome.planned.summary());

            if let Some(report) = &outcome.report {
                for failed in &report.failed {
                    tracing::error!("{} {}: {}", failed.kind, failed.name, failed.error);
                }
                if !outcome.successful() {
                    anyhow::bail!(
                        "Backup {} was not successful ({} failed actions)",
                        outcome.planned.metadata.name,
                        report.failed.len()
                    );
                }
            }
        }
        Command::Apply {
            snapshot,
            no_failures,
            log_level,
        } => {
            let log = utils::logger::init(log_level.as_deref().unwrap_or("info"))?;

            let policy = if no_failures {
                SuccessPolicy::NoFailures
            } else {
                SuccessPolicy::Completed
            };
            let (metadata, report) = backup::apply_snapshot(&snapshot, policy, Some(&log))
                .await
                .with_context(|| format!("Failed to apply {}", snapshot.display()))?;

            if !metadata.successful {
                anyhow::bail!(
                    "Snapshot {} was not successful ({} failed actions)",
                    metadata.name,
                    report.failed.len()
                );
            }
        }
    }

    Ok(())
}

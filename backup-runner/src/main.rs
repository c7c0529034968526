//! Document database backup runner - Main entry point
//!
//! One-shot backups, coverage checks, restores, and cron-scheduled backups.

mod config;
mod gateways;
mod logger;
mod scheduler;
mod shutdown;

use crate::config::AppConfig;
use crate::gateways::Gateways;
use crate::scheduler::{BackupScheduler, RunContext};
use anyhow::Result;
use backup_engine::coverage::check_coverage;
use backup_engine::restore::restored_collection_name;
use backup_engine::{
    run_backup, BackupConfiguration, BackupOrchestrator, ChunkSelection, RestoreExecutor, RunStatus,
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Back up every configured collection once
    Backup,

    /// Report live collections missing from the backup configuration
    Check,

    /// Restore a backup file into `<collection>_restored`
    Restore {
        /// Collection the backup file was taken from
        #[arg(long)]
        collection: String,

        /// Folder holding the file (run ID for full backups)
        #[arg(long)]
        folder: String,

        /// Restore only this chunk number
        #[arg(long, conflicts_with = "all")]
        chunk: Option<usize>,

        /// Restore every chunk of the backup in order
        #[arg(long)]
        all: bool,
    },

    /// Run backups on a cron schedule until interrupted
    Schedule {
        /// Cron expression with seconds (overrides backup.schedule)
        #[arg(long)]
        cron: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // Load configuration
    let config = AppConfig::load(args.config.as_deref())?;

    // Initialize logging
    let log_level = args.log_level.as_deref().unwrap_or(&config.log.level);
    logger::init(log_level)?;

    tracing::info!("Starting docdb-backup v{}", env!("CARGO_PKG_VERSION"));

    // Mode tokens are validated before anything connects
    let plans = config.backup_configuration()?;

    let gateways = Gateways::connect(&config).await?;
    let result = dispatch(args.command, &config, plans, &gateways).await;

    // Close database
    gateways.close().await;
    result
}

async fn dispatch(
    command: Command,
    config: &AppConfig,
    plans: BackupConfiguration,
    gateways: &Gateways,
) -> Result<ExitCode> {
    let orchestrator = || {
        BackupOrchestrator::new(gateways.documents.clone(), gateways.blobs.clone())
            .with_bulk_size_limit(config.backup.bulk_size_limit)
    };

    match command {
        Command::Backup => {
            let outcome = run_backup(&orchestrator(), &plans).await;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            Ok(exit_code(outcome.status))
        }
        Command::Check => match check_coverage(gateways.documents.as_ref(), &plans).await {
            Ok(()) => {
                tracing::info!("All collections are covered by the backup configuration");
                Ok(ExitCode::SUCCESS)
            }
            Err(e) if e.is_coverage_gap() => {
                tracing::warn!("{}", e);
                Ok(ExitCode::FAILURE)
            }
            Err(e) => Err(e.into()),
        },
        Command::Restore {
            collection,
            folder,
            chunk,
            all,
        } => {
            let selection = match (chunk, all) {
                (Some(seq), _) => ChunkSelection::Chunk(seq),
                (None, true) => ChunkSelection::All,
                (None, false) => ChunkSelection::Unchunked,
            };
            let executor = RestoreExecutor::new(gateways.documents.clone(), gateways.blobs.clone());
            let count = executor
                .restore_selection(&collection, &folder, selection)
                .await?;
            println!("{count} documents restored into {}", restored_collection_name(&collection));
            Ok(ExitCode::SUCCESS)
        }
        Command::Schedule { cron } => {
            let cron = cron
                .or_else(|| config.backup.schedule.clone())
                .ok_or_else(|| anyhow::anyhow!("no cron expression: pass --cron or set backup.schedule"))?;
            let context = Arc::new(RunContext {
                orchestrator: orchestrator(),
                config: plans,
            });
            run_scheduler(context, &cron).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn run_scheduler(context: Arc<RunContext>, cron: &str) -> Result<()> {
    let scheduler = BackupScheduler::new(context).await?;
    scheduler.schedule(cron).await?;
    scheduler.start().await?;

    // Graceful shutdown
    let cancel = CancellationToken::new();
    shutdown::shutdown_signal(cancel.clone()).await;

    tracing::info!("Shutting down...");
    if let Err(e) = scheduler.shutdown().await {
        tracing::warn!("Scheduler shutdown error: {}", e);
    }
    tracing::info!("Scheduler stopped");
    Ok(())
}

fn exit_code(status: RunStatus) -> ExitCode {
    match status {
        RunStatus::Ok | RunStatus::Warning => ExitCode::SUCCESS,
        RunStatus::Error => ExitCode::FAILURE,
    }
}

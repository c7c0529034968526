//! Cron-driven backup runs.

use backup_engine::{run_backup, BackupConfiguration, BackupOrchestrator, RunOutcome};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

/// Everything a scheduled run needs.
pub struct RunContext {
    pub orchestrator: BackupOrchestrator,
    pub config: BackupConfiguration,
}

pub struct BackupScheduler {
    scheduler: Mutex<JobScheduler>,
    context: Arc<RunContext>,
    running: Arc<Mutex<()>>,
}

impl BackupScheduler {
    pub async fn new(context: Arc<RunContext>) -> anyhow::Result<Self> {
        let scheduler = JobScheduler::new().await?;
        Ok(Self {
            scheduler: Mutex::new(scheduler),
            context,
            running: Arc::new(Mutex::new(())),
        })
    }

    pub async fn schedule(&self, cron_expression: &str) -> anyhow::Result<()> {
        let context = self.context.clone();
        let running = self.running.clone();

        let job = Job::new_async(cron_expression, move |_uuid, _lock| {
            let context = context.clone();
            let running = running.clone();
            Box::pin(async move {
                run_exclusive(&context, &running).await;
            })
        })?;

        self.scheduler.lock().await.add(job).await?;
        info!(cron = %cron_expression, "Backup scheduled");
        Ok(())
    }

    pub async fn start(&self) -> anyhow::Result<()> {
        self.scheduler.lock().await.start().await?;
        Ok(())
    }

    /// Stop scheduling, then wait for an in-flight run to finish.
    pub async fn shutdown(&self) -> anyhow::Result<()> {
        self.scheduler.lock().await.shutdown().await?;
        let _idle = self.running.lock().await;
        Ok(())
    }
}

/// Run one backup unless the previous one is still going.
async fn run_exclusive(context: &RunContext, running: &Mutex<()>) -> Option<RunOutcome> {
    let Ok(_guard) = running.try_lock() else {
        warn!("Skipping scheduled run: previous backup still running");
        return None;
    };

    info!("Starting scheduled backup");
    let outcome = run_backup(&context.orchestrator, &context.config).await;
    if let Some(e) = &outcome.error {
        error!(status = %outcome.status, error = %e, "Scheduled backup failed");
    } else {
        info!(status = %outcome.status, "Scheduled backup finished");
    }
    Some(outcome)
}

//! One complete backup run with a single OK / WARNING / ERROR status.
//!
//! A coverage gap only downgrades the run to WARNING; the configured
//! collections are still backed up. Any other failure ends the run as ERROR.

use crate::config::BackupConfiguration;
use crate::coverage::check_coverage;
use crate::executor::{BackupOrchestrator, BackupReport, RunId};
use serde::Serialize;
use std::fmt;
use std::time::Instant;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunStatus {
    Ok,
    Warning,
    Error,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunStatus::Ok => "OK",
            RunStatus::Warning => "WARNING",
            RunStatus::Error => "ERROR",
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub status: RunStatus,
    pub report: Option<BackupReport>,
    pub warning: Option<String>,
    pub error: Option<String>,
    pub duration_ms: u64,
}

pub async fn run_backup(orchestrator: &BackupOrchestrator, config: &BackupConfiguration) -> RunOutcome {
    run_backup_with_run_id(orchestrator, config, &RunId::now()).await
}

pub async fn run_backup_with_run_id(
    orchestrator: &BackupOrchestrator,
    config: &BackupConfiguration,
    run_id: &RunId,
) -> RunOutcome {
    let start_time = Instant::now();
    let mut outcome = RunOutcome {
        status: RunStatus::Ok,
        report: None,
        warning: None,
        error: None,
        duration_ms: 0,
    };

    match check_coverage(orchestrator.documents(), config).await {
        Ok(()) => {}
        Err(e) if e.is_coverage_gap() => {
            warn!("{}", e);
            outcome.status = RunStatus::Warning;
            outcome.warning = Some(e.to_string());
        }
        Err(e) => {
            error!("Backup failed ({})", e);
            outcome.status = RunStatus::Error;
            outcome.error = Some(e.to_string());
        }
    }

    if outcome.status != RunStatus::Error {
        match orchestrator.backup_with_run_id(config, run_id).await {
            Ok(report) => outcome.report = Some(report),
            Err(e) => {
                error!("Backup failed ({})", e);
                outcome.status = RunStatus::Error;
                outcome.error = Some(e.to_string());
            }
        }
    }

    outcome.duration_ms = start_time.elapsed().as_millis() as u64;
    info!(
        run_id = %run_id,
        status = %outcome.status,
        duration_ms = outcome.duration_ms,
        "DB backup finished"
    );
    outcome
}

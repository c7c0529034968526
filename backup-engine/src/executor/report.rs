//! Reports produced by a backup run.

use crate::config::BackupMode;
use serde::Serialize;

/// Outcome of backing up one collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionReport {
    pub collection: String,
    pub mode: BackupMode,
    pub chunks_written: usize,
    pub documents_exported: usize,
    /// Last key written to the checkpoint during this run, if any
    pub last_key: Option<String>,
    pub duration_ms: u64,
}

/// Outcome of one orchestrator invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupReport {
    pub run_id: String,
    pub collections: Vec<CollectionReport>,
}

impl BackupReport {
    pub fn total_chunks(&self) -> usize {
        self.collections.iter().map(|c| c.chunks_written).sum()
    }

    pub fn total_documents(&self) -> usize {
        self.collections.iter().map(|c| c.documents_exported).sum()
    }

    pub fn collection(&self, name: &str) -> Option<&CollectionReport> {
        self.collections.iter().find(|c| c.collection == name)
    }
}

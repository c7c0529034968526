//! Document Database Backup Engine
//!
//! Full and incremental backups of document collections into an object
//! store, split into size-bounded JSON chunks, with per-collection
//! checkpoints for resuming incremental runs.

pub mod blob;
pub mod checkpoint;
pub mod config;
pub mod coverage;
pub mod executor;
pub mod exporter;
pub mod extjson;
pub mod restore;
pub mod run;
pub mod store;
pub mod utils;

// Re-export commonly used types
pub use blob::{BlobStore, S3Settings};
pub use config::{BackupConfiguration, BackupMode, CollectionPlan};
pub use executor::{BackupOrchestrator, BackupReport, RunId};
pub use restore::{ChunkSelection, RestoreExecutor};
pub use run::{run_backup, RunOutcome, RunStatus};
pub use store::{DocumentStore, MemoryDocumentStore, MongoDocumentStore, MongoSettings};
pub use utils::errors::BackupError;
pub type Result<T> = std::result::Result<T, BackupError>;

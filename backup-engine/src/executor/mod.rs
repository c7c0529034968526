//! Backup Orchestrator.
//!
//! Walks the configured collections one at a time and, for each, resolves
//! where its files and checkpoint live, exports it in chunks and writes every
//! chunk before advancing the checkpoint. A crash between the two therefore
//! re-exports the last chunk on the next run instead of skipping it.
//!
//! File layout:
//! - full:        `<run_id>/<collection>.bak<seq>`, checkpoint `<run_id>/<collection>-last_key.txt`
//! - incremental: `<collection>/<collection>-<run_id>.bak<seq>`, checkpoint `<collection>/last_key.txt`

pub mod report;

use crate::blob::BlobStore;
use crate::checkpoint::CheckpointTracker;
use crate::config::{BackupConfiguration, BackupMode, CollectionPlan, DEFAULT_BULK_SIZE_LIMIT};
use crate::exporter::ChunkedExporter;
use crate::store::DocumentStore;
use crate::utils::errors::{BackupError, Result};
use chrono::{DateTime, TimeZone};
use mongodb::bson::{doc, Document};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

pub use report::{BackupReport, CollectionReport};

const RUN_ID_FORMAT: &str = "%Y_%m_%d-%H_%M_%S";

/// Timestamp-derived identifier shared by every collection in one run.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RunId(String);

impl RunId {
    pub fn now() -> Self {
        Self::from_datetime(&chrono::Local::now())
    }

    pub fn from_datetime<Tz: TimeZone>(at: &DateTime<Tz>) -> Self
    where
        Tz::Offset: fmt::Display,
    {
        Self(at.format(RUN_ID_FORMAT).to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RunId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// `<folder>/<file>.bak`
pub fn backup_file_key(folder: &str, file: &str) -> String {
    format!("{folder}/{file}.bak")
}

/// Key of the `seq`-th chunk (1-based) of a backup file.
pub fn chunk_key(file_key: &str, seq: usize) -> String {
    format!("{file_key}{seq:06}")
}

/// Where one collection's backup goes.
#[derive(Debug, Clone, PartialEq, Eq)]
struct BackupTarget {
    folder: String,
    file_key: String,
    checkpoint_prefix: String,
}

impl BackupTarget {
    fn full(collection: &str, run_id: &RunId) -> Self {
        Self {
            folder: run_id.to_string(),
            file_key: backup_file_key(run_id.as_str(), collection),
            checkpoint_prefix: format!("{collection}-"),
        }
    }

    fn incremental(collection: &str, run_id: &RunId) -> Self {
        Self {
            folder: collection.to_string(),
            file_key: backup_file_key(collection, &format!("{collection}-{run_id}")),
            checkpoint_prefix: String::new(),
        }
    }
}

pub struct BackupOrchestrator {
    documents: Arc<dyn DocumentStore>,
    blobs: BlobStore,
    checkpoints: CheckpointTracker,
    bulk_size_limit: usize,
}

impl BackupOrchestrator {
    pub fn new(documents: Arc<dyn DocumentStore>, blobs: BlobStore) -> Self {
        Self {
            documents,
            checkpoints: CheckpointTracker::new(blobs.clone()),
            blobs,
            bulk_size_limit: DEFAULT_BULK_SIZE_LIMIT,
        }
    }

    pub fn with_bulk_size_limit(mut self, bulk_size_limit: usize) -> Self {
        self.bulk_size_limit = bulk_size_limit;
        self
    }

    pub fn documents(&self) -> &dyn DocumentStore {
        self.documents.as_ref()
    }

    pub fn blobs(&self) -> &BlobStore {
        &self.blobs
    }

    /// Back up every configured collection under a fresh run ID.
    pub async fn backup(&self, config: &BackupConfiguration) -> Result<BackupReport> {
        self.backup_with_run_id(config, &RunId::now()).await
    }

    /// Back up every configured collection, sequentially. The first failure
    /// aborts the run.
    pub async fn backup_with_run_id(
        &self,
        config: &BackupConfiguration,
        run_id: &RunId,
    ) -> Result<BackupReport> {
        info!(run_id = %run_id, collections = config.len(), "Starting backup run");

        let mut collections = Vec::with_capacity(config.len());
        for (name, plan) in config.iter() {
            collections.push(self.backup_collection(name, plan, run_id).await?);
        }

        Ok(BackupReport {
            run_id: run_id.to_string(),
            collections,
        })
    }

    pub async fn backup_collection(
        &self,
        collection: &str,
        plan: &CollectionPlan,
        run_id: &RunId,
    ) -> Result<CollectionReport> {
        let start_time = Instant::now();

        let (target, filter) = match plan.mode {
            BackupMode::Full => {
                info!("Full backup for collection {}", collection);
                (BackupTarget::full(collection, run_id), Document::new())
            }
            BackupMode::Incremental => {
                let target = BackupTarget::incremental(collection, run_id);
                let (filter, starting_from) = self
                    .incremental_filter(&target.folder, &plan.key_field)
                    .await?;
                info!(
                    "Incremental backup for collection {}, starting from {}",
                    collection, starting_from
                );
                (target, filter)
            }
            BackupMode::Skip => {
                info!("Collection {} is excluded from backups", collection);
                return Ok(CollectionReport {
                    collection: collection.to_string(),
                    mode: plan.mode,
                    chunks_written: 0,
                    documents_exported: 0,
                    last_key: None,
                    duration_ms: 0,
                });
            }
        };

        let mut exporter = ChunkedExporter::open(
            self.documents.as_ref(),
            collection,
            filter,
            &plan.key_field,
            self.bulk_size_limit,
        )
        .await?;

        let mut chunks_written = 0usize;
        let mut documents_exported = 0usize;
        let mut last_saved = None;

        while let Some(chunk) = exporter.next_chunk().await? {
            chunks_written += 1;
            let key = chunk_key(&target.file_key, chunks_written);
            let count = chunk.document_count;
            self.blobs.put(&key, chunk.body).await?;
            documents_exported += count;

            let last_key = chunk.last_key.filter(|k| count > 0 && !k.is_degenerate());
            debug!(
                "Saved {} documents from {} ({}) to {}, last key = {}, in {:.3} seconds",
                count,
                collection,
                plan.mode,
                key,
                last_key.as_ref().map(|k| k.as_str()).unwrap_or("None"),
                start_time.elapsed().as_secs_f64()
            );

            // Only after the chunk is stored.
            if let Some(last_key) = last_key {
                self.checkpoints
                    .save(&target.folder, &last_key, &target.checkpoint_prefix)
                    .await?;
                last_saved = Some(last_key);
            }
        }

        let duration_ms = start_time.elapsed().as_millis() as u64;
        info!(
            collection,
            mode = %plan.mode,
            chunks = chunks_written,
            documents = documents_exported,
            duration_ms,
            "Collection backup complete"
        );

        Ok(CollectionReport {
            collection: collection.to_string(),
            mode: plan.mode,
            chunks_written,
            documents_exported,
            last_key: last_saved.map(|k| k.as_str().to_string()),
            duration_ms,
        })
    }

    /// Filter selecting documents after the stored checkpoint, plus a
    /// human-readable description of the starting point.
    async fn incremental_filter(&self, folder: &str, key_field: &str) -> Result<(Document, String)> {
        match self.checkpoints.last_checkpoint(folder).await {
            Ok(checkpoint) => {
                let mut filter = Document::new();
                filter.insert(key_field, doc! { "$gt": checkpoint.to_bson()? });
                Ok((filter, checkpoint.to_string()))
            }
            Err(BackupError::CheckpointMissing(_)) => {
                Ok((Document::new(), "first document".to_string()))
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::Checkpoint;
    use crate::extjson;
    use crate::store::MemoryDocumentStore;
    use mongodb::bson::{Bson, DateTime as BsonDateTime};

    fn run(id: &str) -> RunId {
        RunId::from(id)
    }

    async fn blob_text(blobs: &BlobStore, key: &str) -> String {
        String::from_utf8(blobs.get(key).await.unwrap().to_vec()).unwrap()
    }

    async fn chunk_docs(blobs: &BlobStore, key: &str) -> Vec<Document> {
        extjson::decode_chunk(&blobs.get(key).await.unwrap()).unwrap()
    }

    fn user(i: i32) -> Document {
        doc! { "_id": i, "name": format!("user-{i}"), "email": format!("user{i}@example.com") }
    }

    #[test]
    fn test_run_id_format() {
        let at = chrono::Utc.with_ymd_and_hms(2024, 1, 31, 2, 5, 9).unwrap();
        assert_eq!(RunId::from_datetime(&at).as_str(), "2024_01_31-02_05_09");
    }

    #[test]
    fn test_file_keys() {
        let run_id = run("2024_01_31-02_00_00");
        let full = BackupTarget::full("users", &run_id);
        assert_eq!(full.file_key, "2024_01_31-02_00_00/users.bak");
        assert_eq!(full.folder, "2024_01_31-02_00_00");
        assert_eq!(full.checkpoint_prefix, "users-");

        let incremental = BackupTarget::incremental("sessions", &run_id);
        assert_eq!(
            incremental.file_key,
            "sessions/sessions-2024_01_31-02_00_00.bak"
        );
        assert_eq!(incremental.folder, "sessions");
        assert_eq!(incremental.checkpoint_prefix, "");

        assert_eq!(chunk_key(&full.file_key, 1), "2024_01_31-02_00_00/users.bak000001");
        assert_eq!(chunk_key(&full.file_key, 123456), "2024_01_31-02_00_00/users.bak123456");
    }

    #[tokio::test]
    async fn test_full_backup_splits_into_two_chunks() {
        let store = Arc::new(MemoryDocumentStore::new());
        store.insert_many("users", (1..=3).map(user)).await;
        let blobs = BlobStore::in_memory();

        let one_doc = extjson::encode_document(&user(1)).unwrap().len();
        let orchestrator = BackupOrchestrator::new(store.clone(), blobs.clone())
            .with_bulk_size_limit(one_doc + 2);
        let config = BackupConfiguration::from_tokens([("users", "full")]).unwrap();

        let report = orchestrator
            .backup_with_run_id(&config, &run("r1"))
            .await
            .unwrap();

        let users = report.collection("users").unwrap();
        assert_eq!(users.chunks_written, 2);
        assert_eq!(users.documents_exported, 3);

        let first = chunk_docs(&blobs, "r1/users.bak000001").await;
        let second = chunk_docs(&blobs, "r1/users.bak000002").await;
        assert_eq!(first.len() + second.len(), 3);
        assert!(blobs.get("r1/users.bak000003").await.is_err());

        assert_eq!(
            blob_text(&blobs, "r1/users-last_key.txt").await,
            r#"{"$numberInt":"3"}"#
        );
    }

    #[tokio::test]
    async fn test_incremental_backup_without_checkpoint_exports_everything() {
        let store = Arc::new(MemoryDocumentStore::new());
        store
            .insert_many(
                "sessions",
                (1..=5).map(|i| {
                    doc! { "_id": i, "created_at": BsonDateTime::from_millis(1_700_000_000_000 + i64::from(i)) }
                }),
            )
            .await;
        let blobs = BlobStore::in_memory();
        let orchestrator = BackupOrchestrator::new(store.clone(), blobs.clone());
        let config =
            BackupConfiguration::from_tokens([("sessions", "incremental-created_at")]).unwrap();

        let report = orchestrator
            .backup_with_run_id(&config, &run("r1"))
            .await
            .unwrap();
        assert_eq!(report.total_documents(), 5);
        assert_eq!(report.total_chunks(), 1);

        let docs = chunk_docs(&blobs, "sessions/sessions-r1.bak000001").await;
        assert_eq!(docs, store.documents("sessions").await);

        let expected =
            extjson::encode_value(&Bson::DateTime(BsonDateTime::from_millis(1_700_000_000_005)))
                .unwrap();
        assert_eq!(blob_text(&blobs, "sessions/last_key.txt").await, expected);
        assert_eq!(report.collections[0].last_key.as_deref(), Some(expected.as_str()));
    }

    #[tokio::test]
    async fn test_incremental_rerun_without_new_documents() {
        let store = Arc::new(MemoryDocumentStore::new());
        store.insert_many("sessions", (1..=4).map(user)).await;
        let blobs = BlobStore::in_memory();
        let orchestrator = BackupOrchestrator::new(store.clone(), blobs.clone());
        let config = BackupConfiguration::from_tokens([("sessions", "i")]).unwrap();

        orchestrator
            .backup_with_run_id(&config, &run("r1"))
            .await
            .unwrap();
        let before = blob_text(&blobs, "sessions/last_key.txt").await;

        let report = orchestrator
            .backup_with_run_id(&config, &run("r2"))
            .await
            .unwrap();
        let sessions = report.collection("sessions").unwrap();
        assert_eq!(sessions.chunks_written, 1);
        assert_eq!(sessions.documents_exported, 0);
        assert_eq!(sessions.last_key, None);

        assert_eq!(blob_text(&blobs, "sessions/sessions-r2.bak000001").await, "[]");
        assert_eq!(blob_text(&blobs, "sessions/last_key.txt").await, before);
    }

    #[tokio::test]
    async fn test_incremental_backup_resumes_after_checkpoint() {
        let store = Arc::new(MemoryDocumentStore::new());
        store
            .insert_many("events", (1..=3).map(|i| doc! { "seq": i64::from(i) }))
            .await;
        let blobs = BlobStore::in_memory();
        let orchestrator = BackupOrchestrator::new(store.clone(), blobs.clone())
            .with_bulk_size_limit(1);
        let config = BackupConfiguration::from_tokens([("events", "i-seq")]).unwrap();

        orchestrator
            .backup_with_run_id(&config, &run("r1"))
            .await
            .unwrap();
        let checkpoint = CheckpointTracker::new(blobs.clone())
            .last_checkpoint("events")
            .await
            .unwrap();
        assert_eq!(checkpoint.to_bson().unwrap(), Bson::Int64(3));

        store
            .insert_many("events", (4..=6).map(|i| doc! { "seq": i64::from(i) }))
            .await;
        let report = orchestrator
            .backup_with_run_id(&config, &run("r2"))
            .await
            .unwrap();

        // One document per chunk plus the empty terminal chunk.
        let events = report.collection("events").unwrap();
        assert_eq!(events.documents_exported, 3);
        assert_eq!(events.chunks_written, 4);

        let mut exported = Vec::new();
        for seq in 1..=events.chunks_written {
            let key = chunk_key("events/events-r2.bak", seq);
            exported.extend(chunk_docs(&blobs, &key).await);
        }
        let seqs: Vec<i64> = exported.iter().map(|d| d.get_i64("seq").unwrap()).collect();
        assert_eq!(seqs, vec![4, 5, 6]);

        assert_eq!(
            blob_text(&blobs, "events/last_key.txt").await,
            r#"{"$numberLong":"6"}"#
        );
    }

    #[tokio::test]
    async fn test_full_backup_ignores_existing_checkpoint() {
        let store = Arc::new(MemoryDocumentStore::new());
        store.insert_many("users", (1..=3).map(user)).await;
        let blobs = BlobStore::in_memory();
        CheckpointTracker::new(blobs.clone())
            .save("users", &Checkpoint::new(r#"{"$numberInt":"2"}"#), "")
            .await
            .unwrap();
        let orchestrator = BackupOrchestrator::new(store, blobs.clone());
        let config = BackupConfiguration::new().with_collection("users", CollectionPlan::full());

        let report = orchestrator
            .backup_with_run_id(&config, &run("r1"))
            .await
            .unwrap();
        assert_eq!(report.total_documents(), 3);
    }

    #[tokio::test]
    async fn test_skipped_collection_writes_nothing() {
        let store = Arc::new(MemoryDocumentStore::new());
        store.insert_many("assets", (1..=3).map(user)).await;
        let blobs = BlobStore::in_memory();
        let orchestrator = BackupOrchestrator::new(store, blobs.clone());
        let config = BackupConfiguration::from_tokens([("assets", "0")]).unwrap();

        let report = orchestrator
            .backup_with_run_id(&config, &run("r1"))
            .await
            .unwrap();
        assert_eq!(report.collection("assets").unwrap().mode, BackupMode::Skip);
        assert_eq!(report.total_chunks(), 0);
        assert!(blobs.list("").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_checkpoint_aborts_run() {
        let store = Arc::new(MemoryDocumentStore::new());
        store.insert_many("sessions", (1..=2).map(user)).await;
        let blobs = BlobStore::in_memory();
        blobs.put("sessions/last_key.txt", "{not json").await.unwrap();
        let orchestrator = BackupOrchestrator::new(store, blobs.clone());
        let config = BackupConfiguration::from_tokens([("sessions", "i")]).unwrap();

        let result = orchestrator.backup_with_run_id(&config, &run("r1")).await;
        assert!(result.is_err());
        assert!(blobs.get("sessions/sessions-r1.bak000001").await.is_err());
    }

    #[tokio::test]
    async fn test_collections_share_one_run_id() {
        let store = Arc::new(MemoryDocumentStore::new());
        store.insert_many("users", (1..=2).map(user)).await;
        store.insert_many("clients", (1..=2).map(user)).await;
        let blobs = BlobStore::in_memory();
        let orchestrator = BackupOrchestrator::new(store, blobs.clone());
        let config =
            BackupConfiguration::from_tokens([("users", "f"), ("clients", "full")]).unwrap();

        let report = orchestrator.backup(&config).await.unwrap();
        let keys = blobs.list(&report.run_id).await.unwrap();
        assert!(keys.contains(&format!("{}/users.bak000001", report.run_id)));
        assert!(keys.contains(&format!("{}/clients.bak000001", report.run_id)));
    }
}

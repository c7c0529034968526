//! Restore Executor.
//!
//! Reads backup files back out of the object store and inserts their
//! documents one by one into `<collection>_restored`. There is no upsert or
//! dedup, so restoring the same file twice duplicates its documents, and an
//! insert failure part-way leaves the target partially populated.

use crate::blob::BlobStore;
use crate::executor::{backup_file_key, chunk_key};
use crate::extjson;
use crate::store::DocumentStore;
use crate::utils::errors::{BackupError, Result};
use std::sync::Arc;
use tracing::{debug, info};

/// Which file(s) of a backup to restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChunkSelection {
    /// Exactly `<folder>/<collection>.bak`
    #[default]
    Unchunked,
    /// `<folder>/<collection>.bak<n:06>`
    Chunk(usize),
    /// Every `<folder>/<collection>.bak<6 digits>` file, in sequence order
    All,
}

pub fn restored_collection_name(collection: &str) -> String {
    format!("{collection}_restored")
}

pub struct RestoreExecutor {
    documents: Arc<dyn DocumentStore>,
    blobs: BlobStore,
}

impl RestoreExecutor {
    pub fn new(documents: Arc<dyn DocumentStore>, blobs: BlobStore) -> Self {
        Self { documents, blobs }
    }

    /// Restore the single unchunked file `<folder>/<collection>.bak`.
    pub async fn restore(&self, collection: &str, folder: &str) -> Result<usize> {
        self.restore_selection(collection, folder, ChunkSelection::Unchunked)
            .await
    }

    /// Restore the selected file(s) and return the number of documents inserted.
    pub async fn restore_selection(
        &self,
        collection: &str,
        folder: &str,
        selection: ChunkSelection,
    ) -> Result<usize> {
        let file_key = backup_file_key(folder, collection);
        let keys = match selection {
            ChunkSelection::Unchunked => vec![file_key],
            ChunkSelection::Chunk(seq) => vec![chunk_key(&file_key, seq)],
            ChunkSelection::All => {
                let keys = self.chunk_files(collection, folder).await?;
                if keys.is_empty() {
                    return Err(BackupError::ObjectNotFound(format!("{file_key}*")));
                }
                keys
            }
        };

        let target = restored_collection_name(collection);
        let mut count = 0;
        for key in &keys {
            count += self.restore_file(key, &target).await?;
        }

        info!(
            collection,
            target = %target,
            files = keys.len(),
            documents = count,
            "{} documents restored",
            count
        );
        Ok(count)
    }

    /// Chunk files of `<folder>/<collection>.bak`, in sequence order.
    pub async fn chunk_files(&self, collection: &str, folder: &str) -> Result<Vec<String>> {
        let file_key = backup_file_key(folder, collection);
        let mut keys: Vec<String> = self
            .blobs
            .list(folder)
            .await?
            .into_iter()
            .filter(|key| {
                key.strip_prefix(&file_key).is_some_and(|seq| {
                    seq.len() == 6 && seq.bytes().all(|b| b.is_ascii_digit())
                })
            })
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn restore_file(&self, key: &str, target: &str) -> Result<usize> {
        let body = self.blobs.get(key).await?;
        let documents = extjson::decode_chunk(&body)?;

        let mut count = 0;
        for doc in documents {
            self.documents.insert_one(target, doc).await?;
            count += 1;
        }

        debug!(key, target, count, "Restored backup file");
        Ok(count)
    }
}

//! Checkpoint Tracker.
//!
//! A checkpoint is the Extended JSON text of the last exported key, stored as
//! a small blob at `<folder>/<prefix>last_key.txt`. Incremental backups read
//! it once to build their `$gt` filter and overwrite it after every chunk that
//! carried documents.
//!
//! There is no locking: two processes backing up the same collection at once
//! race on this blob.

use crate::blob::BlobStore;
use crate::extjson;
use crate::utils::errors::{BackupError, Result};
use mongodb::bson::Bson;
use tracing::debug;

pub const CHECKPOINT_FILE_NAME: &str = "last_key.txt";

/// Serialized forms of a key that must never be persisted as a checkpoint.
const DEGENERATE_KEYS: [&str; 3] = ["", "null", "None"];

/// Last exported key, in its serialized form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint(String);

impl Checkpoint {
    pub fn new(serialized: impl Into<String>) -> Self {
        Self(serialized.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for values that would clobber a good checkpoint with nothing.
    pub fn is_degenerate(&self) -> bool {
        DEGENERATE_KEYS.contains(&self.0.trim())
    }

    /// Decode the stored key back into a BSON value for use in a filter.
    pub fn to_bson(&self) -> Result<Bson> {
        extjson::decode_value(&self.0)
    }
}

impl std::fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn checkpoint_key(folder: &str, prefix: &str) -> String {
    format!("{folder}/{prefix}{CHECKPOINT_FILE_NAME}")
}

#[derive(Debug, Clone)]
pub struct CheckpointTracker {
    blobs: BlobStore,
}

impl CheckpointTracker {
    pub fn new(blobs: BlobStore) -> Self {
        Self { blobs }
    }

    /// Read the unprefixed checkpoint in `folder`.
    ///
    /// Fails with `CheckpointMissing` when nothing was stored yet; callers
    /// treat that as "start from the first document".
    pub async fn last_checkpoint(&self, folder: &str) -> Result<Checkpoint> {
        let key = checkpoint_key(folder, "");
        let body = match self.blobs.get(&key).await {
            Ok(body) => body,
            Err(BackupError::ObjectNotFound(_)) => return Err(BackupError::CheckpointMissing(key)),
            Err(e) => return Err(e),
        };

        let text = String::from_utf8(body.to_vec()).map_err(|e| BackupError::InvalidCheckpoint {
            key: key.clone(),
            reason: e.to_string(),
        })?;
        let checkpoint = Checkpoint::new(text.trim());
        if checkpoint.is_degenerate() {
            return Err(BackupError::InvalidCheckpoint {
                key,
                reason: format!("degenerate value {:?}", checkpoint.as_str()),
            });
        }
        Ok(checkpoint)
    }

    /// Overwrite the checkpoint at `<folder>/<prefix>last_key.txt`.
    pub async fn save(&self, folder: &str, checkpoint: &Checkpoint, prefix: &str) -> Result<()> {
        let key = checkpoint_key(folder, prefix);
        self.blobs.put(&key, checkpoint.as_str().to_string()).await?;
        debug!(key = %key, value = %checkpoint, "Checkpoint saved");
        Ok(())
    }
}

//! Construction of the document store and object store clients.
//!
//! Both are created once per process, passed explicitly to the engine and
//! closed by the caller when it is done with them.

use crate::config::{AppConfig, StorageBackend};
use anyhow::Context;
use backup_engine::{BlobStore, MongoDocumentStore};
use std::sync::Arc;
use tracing::info;

pub struct Gateways {
    pub documents: Arc<MongoDocumentStore>,
    pub blobs: BlobStore,
}

impl Gateways {
    pub async fn connect(config: &AppConfig) -> anyhow::Result<Self> {
        let blobs = build_blob_store(config)?;
        let documents = MongoDocumentStore::connect(&config.mongo_settings())
            .await
            .context("connecting to the document store")?;
        info!(store = %blobs.name(), "Gateways ready");

        Ok(Self {
            documents: Arc::new(documents),
            blobs,
        })
    }

    pub async fn close(self) {
        self.documents.shutdown().await;
    }
}

pub fn build_blob_store(config: &AppConfig) -> anyhow::Result<BlobStore> {
    let blobs = match config.storage.backend {
        StorageBackend::S3 => BlobStore::s3(&config.s3_settings()?)?,
        StorageBackend::Local => BlobStore::local(&config.storage.root)?,
        StorageBackend::Memory => BlobStore::in_memory(),
    };
    Ok(blobs)
}

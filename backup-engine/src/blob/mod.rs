//! Object Store Gateway.
//!
//! Thin wrapper over the `object_store` crate: puts and gets opaque blobs by
//! key in one bucket. Keys are plain `/`-separated strings such as
//! `2024_01_31-02_00_00/users.bak000001`.

use crate::utils::errors::{BackupError, Result};
use bytes::Bytes;
use futures_util::TryStreamExt;
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Settings for an S3-compatible bucket.
#[derive(Debug, Clone)]
pub struct S3Settings {
    pub bucket: String,
    pub region: Option<String>,
    /// Custom endpoint for MinIO and other S3-compatible services
    pub endpoint: Option<String>,
    pub allow_http: bool,
}

impl S3Settings {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            region: None,
            endpoint: None,
            allow_http: false,
        }
    }
}

#[derive(Clone)]
pub struct BlobStore {
    store: Arc<dyn ObjectStore>,
    name: String,
}

impl BlobStore {
    /// Wrap an existing `ObjectStore`.
    pub fn from_store(store: Arc<dyn ObjectStore>, name: impl Into<String>) -> Self {
        Self {
            store,
            name: name.into(),
        }
    }

    /// S3 bucket; credentials come from the standard AWS environment variables.
    pub fn s3(settings: &S3Settings) -> Result<Self> {
        let mut builder = AmazonS3Builder::from_env()
            .with_bucket_name(&settings.bucket)
            .with_allow_http(settings.allow_http);

        if let Some(region) = &settings.region {
            builder = builder.with_region(region);
        }
        if let Some(endpoint) = &settings.endpoint {
            builder = builder
                .with_endpoint(endpoint)
                .with_virtual_hosted_style_request(false);
        }

        let store = builder.build()?;
        Ok(Self::from_store(
            Arc::new(store),
            format!("s3://{}", settings.bucket),
        ))
    }

    /// Directory on the local filesystem acting as the bucket.
    pub fn local(root: &Path) -> Result<Self> {
        std::fs::create_dir_all(root)
            .map_err(|e| BackupError::Config(format!("{}: {}", root.display(), e)))?;
        let store = LocalFileSystem::new_with_prefix(root)?;
        Ok(Self::from_store(
            Arc::new(store),
            format!("file://{}", root.display()),
        ))
    }

    pub fn in_memory() -> Self {
        Self::from_store(Arc::new(InMemory::new()), "memory")
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self, body))]
    pub async fn put(&self, key: &str, body: impl Into<Bytes>) -> Result<()> {
        let body: Bytes = body.into();
        debug!("Writing {} bytes to {}/{}", body.len(), self.name, key);
        self.store.put(&ObjectPath::from(key), body.into()).await?;
        Ok(())
    }

    /// Fetch a blob, failing with `ObjectNotFound` when the key is absent.
    #[instrument(skip(self))]
    pub async fn get(&self, key: &str) -> Result<Bytes> {
        match self.store.get(&ObjectPath::from(key)).await {
            Ok(result) => Ok(result.bytes().await?),
            Err(object_store::Error::NotFound { .. }) => {
                Err(BackupError::ObjectNotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Keys directly or transitively under `folder`, sorted.
    #[instrument(skip(self))]
    pub async fn list(&self, folder: &str) -> Result<Vec<String>> {
        let prefix = ObjectPath::from(folder);
        let mut keys: Vec<String> = self
            .store
            .list(Some(&prefix))
            .map_ok(|meta| meta.location.to_string())
            .try_collect()
            .await?;
        keys.sort();
        Ok(keys)
    }
}

impl std::fmt::Debug for BlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobStore").field("name", &self.name).finish()
    }
}

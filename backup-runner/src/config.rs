//! Configuration management for the backup runner.
//!
//! Loads configuration from an optional TOML file, then applies environment
//! variable overrides (a `.env` file is read first if present).

use anyhow::Context;
use backup_engine::config::DEFAULT_BULK_SIZE_LIMIT;
use backup_engine::{BackupConfiguration, MongoSettings, S3Settings};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const ENV_MONGO_URI: &str = "MONGO_URI";
pub const ENV_MONGO_USER: &str = "MONGO_USER";
pub const ENV_MONGO_PWD: &str = "MONGO_PWD";
pub const ENV_MONGO_DB: &str = "MONGO_DB";
pub const ENV_BUCKET_NAME: &str = "DB_BACKUP_BUCKET_NAME";
pub const ENV_BULK_SIZE_LIMIT: &str = "DB_BACKUP_BULK_SIZE_LIMIT";
pub const ENV_BACKUP_CONF: &str = "DB_BACKUP_CONF";
pub const ENV_SCHEDULE: &str = "DB_BACKUP_SCHEDULE";
pub const ENV_STORAGE: &str = "DB_BACKUP_STORAGE";
pub const ENV_LOG_LEVEL: &str = "LOG_LEVEL";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub backup: BackupConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// MongoDB/DocumentDB connection string
    #[serde(default = "default_uri")]
    pub uri: String,

    /// Database holding the collections to back up
    #[serde(default = "default_database_name")]
    pub name: String,

    #[serde(default)]
    pub user: Option<String>,

    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    S3,
    Local,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Object store backend (s3, local, memory)
    #[serde(default = "default_backend")]
    pub backend: StorageBackend,

    /// Bucket name (s3 backend)
    #[serde(default)]
    pub bucket: String,

    #[serde(default)]
    pub region: Option<String>,

    /// Custom endpoint for MinIO and other S3-compatible services
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default)]
    pub allow_http: bool,

    /// Root directory (local backend)
    #[serde(default = "default_root")]
    pub root: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Byte limit of one chunk file (default: 5MB)
    #[serde(default = "default_bulk_size_limit")]
    pub bulk_size_limit: usize,

    /// Cron expression (with seconds) for the `schedule` command
    #[serde(default)]
    pub schedule: Option<String>,

    /// Collection name to mode token (`full`, `incremental-<key>`, `0`, ...)
    #[serde(default)]
    pub collections: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default values
fn default_uri() -> String {
    "mongodb://localhost:27017".to_string()
}

fn default_database_name() -> String {
    "app".to_string()
}

fn default_backend() -> StorageBackend {
    StorageBackend::S3
}

fn default_root() -> PathBuf {
    PathBuf::from("./backups")
}

fn default_bulk_size_limit() -> usize {
    DEFAULT_BULK_SIZE_LIMIT
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            uri: default_uri(),
            name: default_database_name(),
            user: None,
            password: None,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            bucket: String::new(),
            region: None,
            endpoint: None,
            allow_http: false,
            root: default_root(),
        }
    }
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            bulk_size_limit: default_bulk_size_limit(),
            schedule: None,
            collections: BTreeMap::new(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl AppConfig {
    /// File (if any) plus `.env` and process environment overrides.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let _ = dotenvy::dotenv();

        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: AppConfig =
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    /// Apply overrides from `lookup`, which maps variable names to values.
    pub fn apply_env<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(uri) = lookup(ENV_MONGO_URI) {
            self.database.uri = uri;
        }
        if let Some(name) = lookup(ENV_MONGO_DB) {
            self.database.name = name;
        }
        if let Some(user) = lookup(ENV_MONGO_USER) {
            self.database.user = Some(user);
        }
        if let Some(password) = lookup(ENV_MONGO_PWD) {
            self.database.password = Some(password);
        }
        if let Some(bucket) = lookup(ENV_BUCKET_NAME) {
            self.storage.bucket = bucket;
        }
        if let Some(backend) = lookup(ENV_STORAGE) {
            self.storage.backend = match backend.trim().to_lowercase().as_str() {
                "s3" => StorageBackend::S3,
                "local" => StorageBackend::Local,
                "memory" => StorageBackend::Memory,
                other => anyhow::bail!("{ENV_STORAGE}: unknown storage backend {other:?}"),
            };
        }
        if let Some(limit) = lookup(ENV_BULK_SIZE_LIMIT) {
            self.backup.bulk_size_limit = limit
                .trim()
                .parse()
                .with_context(|| format!("{ENV_BULK_SIZE_LIMIT}: invalid byte limit {limit:?}"))?;
        }
        if let Some(conf) = lookup(ENV_BACKUP_CONF) {
            self.backup.collections = serde_json::from_str(&conf)
                .with_context(|| format!("{ENV_BACKUP_CONF}: expected a JSON object of collection to mode"))?;
        }
        if let Some(schedule) = lookup(ENV_SCHEDULE) {
            self.backup.schedule = Some(schedule);
        }
        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            self.log.level = level;
        }
        Ok(())
    }

    /// Parse the collection mode tokens. Any unknown token fails here,
    /// before a run starts.
    pub fn backup_configuration(&self) -> anyhow::Result<BackupConfiguration> {
        BackupConfiguration::from_tokens(&self.backup.collections)
            .context("invalid backup.collections")
    }

    pub fn mongo_settings(&self) -> MongoSettings {
        MongoSettings {
            uri: self.database.uri.clone(),
            database: self.database.name.clone(),
            user: self.database.user.clone(),
            password: self.database.password.clone(),
        }
    }

    pub fn s3_settings(&self) -> anyhow::Result<S3Settings> {
        if self.storage.bucket.trim().is_empty() {
            anyhow::bail!("storage.bucket ({ENV_BUCKET_NAME}) is required for the s3 backend");
        }
        Ok(S3Settings {
            bucket: self.storage.bucket.clone(),
            region: self.storage.region.clone(),
            endpoint: self.storage.endpoint.clone(),
            allow_http: self.storage.allow_http,
        })
    }
}

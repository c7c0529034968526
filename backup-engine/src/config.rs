//! Backup configuration: which collections to back up, and how.
//!
//! Each collection maps to a mode token of the form `<mode>[-<key_field>]`:
//! `full` / `f`, `incremental` / `i`, or `0` / empty to leave the collection
//! out of backups. The optional key field names the monotonic field used to
//! order an incremental backup and defaults to `_id`.

use crate::utils::errors::{BackupError, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Primary document identifier field.
pub const DEFAULT_KEY_FIELD: &str = "_id";

/// Default byte limit for one chunk body.
pub const DEFAULT_BULK_SIZE_LIMIT: usize = 5_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupMode {
    Full,
    Incremental,
    Skip,
}

impl BackupMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupMode::Full => "full",
            BackupMode::Incremental => "incremental",
            BackupMode::Skip => "skip",
        }
    }
}

impl fmt::Display for BackupMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parsed form of one mode token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionPlan {
    pub mode: BackupMode,
    pub key_field: String,
}

impl CollectionPlan {
    pub fn full() -> Self {
        Self {
            mode: BackupMode::Full,
            key_field: DEFAULT_KEY_FIELD.to_string(),
        }
    }

    pub fn incremental(key_field: impl Into<String>) -> Self {
        Self {
            mode: BackupMode::Incremental,
            key_field: key_field.into(),
        }
    }
}

impl FromStr for CollectionPlan {
    type Err = BackupError;

    fn from_str(token: &str) -> Result<Self> {
        let mut parts = token.trim().splitn(2, '-');
        let mode_word = parts.next().unwrap_or_default().trim().to_lowercase();
        let key_field = parts
            .next()
            .map(str::trim)
            .filter(|field| !field.is_empty())
            .unwrap_or(DEFAULT_KEY_FIELD)
            .to_string();

        let mode = match mode_word.as_str() {
            "f" | "full" => BackupMode::Full,
            "i" | "incremental" => BackupMode::Incremental,
            "" | "0" | "none" => BackupMode::Skip,
            _ => return Err(BackupError::UnsupportedBackupType(token.trim().to_string())),
        };

        Ok(Self { mode, key_field })
    }
}

/// Collection name to plan, validated once when loaded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackupConfiguration {
    collections: BTreeMap<String, CollectionPlan>,
}

impl BackupConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a raw collection → token mapping. Fails on the first token that
    /// does not name a known mode, before any backup work happens.
    pub fn from_tokens<I, K, V>(tokens: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: AsRef<str>,
    {
        let mut config = Self::new();
        for (name, token) in tokens {
            let plan = token.as_ref().parse()?;
            config.collections.insert(name.into(), plan);
        }
        Ok(config)
    }

    pub fn with_collection(mut self, name: impl Into<String>, plan: CollectionPlan) -> Self {
        self.collections.insert(name.into(), plan);
        self
    }

    pub fn get(&self, name: &str) -> Option<&CollectionPlan> {
        self.collections.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.collections.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &CollectionPlan)> {
        self.collections.iter()
    }

    pub fn len(&self) -> usize {
        self.collections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mode_words_and_aliases() {
        assert_eq!("full".parse::<CollectionPlan>().unwrap(), CollectionPlan::full());
        assert_eq!(" F ".parse::<CollectionPlan>().unwrap(), CollectionPlan::full());
        assert_eq!(
            "i".parse::<CollectionPlan>().unwrap(),
            CollectionPlan::incremental("_id")
        );
        assert_eq!(
            "Incremental".parse::<CollectionPlan>().unwrap().mode,
            BackupMode::Incremental
        );
    }

    #[test]
    fn test_parse_key_field_override() {
        let plan: CollectionPlan = "incremental-created_at".parse().unwrap();
        assert_eq!(plan, CollectionPlan::incremental("created_at"));

        let plan: CollectionPlan = " i - updatedAt ".parse().unwrap();
        assert_eq!(plan.key_field, "updatedAt");

        let plan: CollectionPlan = "full-seq".parse().unwrap();
        assert_eq!(plan.mode, BackupMode::Full);
        assert_eq!(plan.key_field, "seq");
    }

    #[test]
    fn test_parse_skip_tokens() {
        for token in ["0", "", "  ", "none"] {
            let plan: CollectionPlan = token.parse().unwrap();
            assert_eq!(plan.mode, BackupMode::Skip, "token {token:?}");
        }
    }

    #[test]
    fn test_parse_unknown_mode() {
        let err = "weekly".parse::<CollectionPlan>().unwrap_err();
        assert!(matches!(err, BackupError::UnsupportedBackupType(t) if t == "weekly"));
    }

    #[test]
    fn test_from_tokens_fails_fast() {
        let result = BackupConfiguration::from_tokens([("users", "f"), ("logs", "daily")]);
        assert!(matches!(result, Err(BackupError::UnsupportedBackupType(_))));

        let config =
            BackupConfiguration::from_tokens([("users", "f"), ("sessions", "i-created_at")])
                .unwrap();
        assert_eq!(config.len(), 2);
        assert!(config.contains("users"));
        assert_eq!(config.get("sessions").unwrap().key_field, "created_at");
    }
}

//! Configuration Validator.
//!
//! Every live collection should appear in the backup configuration, even if
//! only to be skipped. A gap is reported as `MissingCollectionConfig`, which
//! the top-level run downgrades to a warning.

use crate::config::BackupConfiguration;
use crate::store::DocumentStore;
use crate::utils::errors::{BackupError, Result};

/// Live collections absent from `config`, in the order the store listed them.
pub fn missing_collections(live: &[String], config: &BackupConfiguration) -> Vec<String> {
    live.iter()
        .filter(|name| !config.contains(name))
        .cloned()
        .collect()
}

pub async fn check_coverage(store: &dyn DocumentStore, config: &BackupConfiguration) -> Result<()> {
    let live = store.list_collection_names().await?;
    let missing = missing_collections(&live, config);
    if missing.is_empty() {
        Ok(())
    } else {
        Err(BackupError::MissingCollectionConfig(missing))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryDocumentStore;

    fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_missing_is_set_difference() {
        let config = BackupConfiguration::from_tokens([("users", "f"), ("ghost", "i")]).unwrap();
        let live = names(&["users", "sessions", "assets"]);

        assert_eq!(missing_collections(&live, &config), names(&["sessions", "assets"]));
    }

    #[test]
    fn test_skipped_collections_count_as_configured() {
        let config = BackupConfiguration::from_tokens([("users", "f"), ("assets", "0")]).unwrap();
        let live = names(&["users", "assets"]);

        assert!(missing_collections(&live, &config).is_empty());
    }

    #[tokio::test]
    async fn test_check_coverage() {
        let store = MemoryDocumentStore::new();
        store.create_collection("users").await;
        store.create_collection("tokens").await;

        let config = BackupConfiguration::from_tokens([("users", "f")]).unwrap();
        let err = check_coverage(&store, &config).await.unwrap_err();
        assert!(matches!(&err, BackupError::MissingCollectionConfig(m) if *m == names(&["tokens"])));
        assert!(err.to_string().contains("tokens"));

        let config = config.with_collection("tokens", "i".parse().unwrap());
        assert!(check_coverage(&store, &config).await.is_ok());
    }
}

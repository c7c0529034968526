//! In-process document store.
//!
//! Collections are vectors of documents kept in insertion order. Filters
//! support field equality and the `$eq`, `$gt`, `$gte`, `$lt`, `$lte`
//! comparison operators, which covers everything the backup engine issues.

use super::{DocumentStore, DocumentStream};
use crate::utils::errors::{BackupError, Result};
use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use mongodb::bson::{Bson, Document};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    collections: RwLock<BTreeMap<String, Vec<Document>>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty collection so that it shows up in `list_collection_names`.
    pub async fn create_collection(&self, collection: &str) {
        self.collections
            .write()
            .await
            .entry(collection.to_string())
            .or_default();
    }

    pub async fn insert_many(&self, collection: &str, documents: impl IntoIterator<Item = Document>) {
        self.collections
            .write()
            .await
            .entry(collection.to_string())
            .or_default()
            .extend(documents);
    }

    /// Snapshot of a collection's documents.
    pub async fn documents(&self, collection: &str) -> Vec<Document> {
        self.collections
            .read()
            .await
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    fn backend_type(&self) -> &'static str {
        "memory"
    }

    async fn list_collection_names(&self) -> Result<Vec<String>> {
        Ok(self.collections.read().await.keys().cloned().collect())
    }

    async fn find(&self, collection: &str, filter: Document) -> Result<DocumentStream> {
        let collections = self.collections.read().await;
        let mut matched = Vec::new();
        for doc in collections.get(collection).into_iter().flatten() {
            if matches_filter(doc, &filter)? {
                matched.push(doc.clone());
            }
        }
        Ok(stream::iter(matched.into_iter().map(Ok)).boxed())
    }

    async fn insert_one(&self, collection: &str, document: Document) -> Result<()> {
        self.insert_many(collection, [document]).await;
        Ok(())
    }
}

fn matches_filter(doc: &Document, filter: &Document) -> Result<bool> {
    for (field, condition) in filter {
        let value = doc.get(field);
        match condition {
            Bson::Document(ops) if is_operator_document(ops) => {
                for (op, operand) in ops {
                    let ordering = value.and_then(|v| compare_bson(v, operand));
                    let ok = match op.as_str() {
                        "$eq" => ordering == Some(Ordering::Equal),
                        "$gt" => ordering == Some(Ordering::Greater),
                        "$gte" => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
                        "$lt" => ordering == Some(Ordering::Less),
                        "$lte" => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
                        other => return Err(BackupError::UnsupportedFilter(other.to_string())),
                    };
                    if !ok {
                        return Ok(false);
                    }
                }
            }
            expected => {
                if value != Some(expected) {
                    return Ok(false);
                }
            }
        }
    }
    Ok(true)
}

fn is_operator_document(doc: &Document) -> bool {
    doc.keys().next().is_some_and(|k| k.starts_with('$'))
}

/// Order two values of the same BSON type family. Values from different
/// families never compare, so range filters skip them like MongoDB does.
fn compare_bson(a: &Bson, b: &Bson) -> Option<Ordering> {
    match (a, b) {
        (Bson::String(x), Bson::String(y)) => Some(x.cmp(y)),
        (Bson::ObjectId(x), Bson::ObjectId(y)) => Some(x.bytes().cmp(&y.bytes())),
        (Bson::DateTime(x), Bson::DateTime(y)) => Some(x.cmp(y)),
        (Bson::Timestamp(x), Bson::Timestamp(y)) => {
            Some((x.time, x.increment).cmp(&(y.time, y.increment)))
        }
        (Bson::Boolean(x), Bson::Boolean(y)) => Some(x.cmp(y)),
        _ => match (as_i64(a), as_i64(b)) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            _ => as_f64(a)?.partial_cmp(&as_f64(b)?),
        },
    }
}

fn as_i64(value: &Bson) -> Option<i64> {
    match value {
        Bson::Int32(v) => Some(i64::from(*v)),
        Bson::Int64(v) => Some(*v),
        _ => None,
    }
}

fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(v) => Some(f64::from(*v)),
        Bson::Int64(v) => Some(*v as f64),
        Bson::Double(v) => Some(*v),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::TryStreamExt;
    use mongodb::bson::{doc, oid::ObjectId, DateTime};

    async fn collect(store: &MemoryDocumentStore, collection: &str, filter: Document) -> Vec<Document> {
        store
            .find(collection, filter)
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_find_keeps_insertion_order() {
        let store = MemoryDocumentStore::new();
        store
            .insert_many("users", [doc! { "n": 3 }, doc! { "n": 1 }, doc! { "n": 2 }])
            .await;

        let docs = collect(&store, "users", doc! {}).await;
        let ns: Vec<i32> = docs.iter().map(|d| d.get_i32("n").unwrap()).collect();
        assert_eq!(ns, vec![3, 1, 2]);
    }

    #[tokio::test]
    async fn test_find_missing_collection_is_empty() {
        let store = MemoryDocumentStore::new();
        assert!(collect(&store, "ghost", doc! {}).await.is_empty());
        assert!(store.list_collection_names().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_gt_filter_on_numbers_and_dates() {
        let store = MemoryDocumentStore::new();
        store
            .insert_many(
                "events",
                (1..=5).map(|i| {
                    doc! { "seq": i as i64, "at": DateTime::from_millis(i * 1000) }
                }),
            )
            .await;

        let docs = collect(&store, "events", doc! { "seq": { "$gt": 3_i32 } }).await;
        assert_eq!(docs.len(), 2);

        let docs = collect(
            &store,
            "events",
            doc! { "at": { "$gt": DateTime::from_millis(1000) } },
        )
        .await;
        assert_eq!(docs.len(), 4);
    }

    #[tokio::test]
    async fn test_gt_filter_on_object_ids() {
        let store = MemoryDocumentStore::new();
        let first = ObjectId::parse_str("65a1f0c2e4b0a1b2c3d4e501").unwrap();
        let second = ObjectId::parse_str("65a1f0c2e4b0a1b2c3d4e502").unwrap();
        store
            .insert_many("users", [doc! { "_id": first }, doc! { "_id": second }])
            .await;

        let docs = collect(&store, "users", doc! { "_id": { "$gt": first } }).await;
        assert_eq!(docs, vec![doc! { "_id": second }]);
    }

    #[tokio::test]
    async fn test_range_skips_other_types_and_missing_fields() {
        let store = MemoryDocumentStore::new();
        store
            .insert_many(
                "mixed",
                [doc! { "k": "zzz" }, doc! { "other": 1 }, doc! { "k": 10 }],
            )
            .await;

        let docs = collect(&store, "mixed", doc! { "k": { "$gt": 5 } }).await;
        assert_eq!(docs, vec![doc! { "k": 10 }]);
    }

    #[tokio::test]
    async fn test_equality_filter_and_unknown_operator() {
        let store = MemoryDocumentStore::new();
        store
            .insert_many("users", [doc! { "name": "ada" }, doc! { "name": "bob" }])
            .await;

        let docs = collect(&store, "users", doc! { "name": "bob" }).await;
        assert_eq!(docs.len(), 1);

        let err = store
            .find("users", doc! { "name": { "$regex": "^a" } })
            .await
            .err()
            .unwrap();
        assert!(matches!(err, BackupError::UnsupportedFilter(op) if op == "$regex"));
    }
}

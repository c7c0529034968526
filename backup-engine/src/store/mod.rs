//! Document Store Gateway.
//!
//! The engine only needs three things from the database: the live collection
//! names, a cursor over the documents matching a filter, and single-document
//! inserts. `MongoDocumentStore` talks to MongoDB/DocumentDB,
//! `MemoryDocumentStore` keeps everything in process.

pub mod memory;
pub mod mongo;

use crate::utils::errors::Result;
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use mongodb::bson::Document;

pub use memory::MemoryDocumentStore;
pub use mongo::{MongoDocumentStore, MongoSettings};

/// Lazily evaluated documents, in the store's natural order.
pub type DocumentStream = BoxStream<'static, Result<Document>>;

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Backend type name (e.g. "mongodb", "memory")
    fn backend_type(&self) -> &'static str;

    async fn list_collection_names(&self) -> Result<Vec<String>>;

    /// Open a cursor over the documents of `collection` matching `filter`.
    /// An empty filter matches everything; a missing collection yields nothing.
    async fn find(&self, collection: &str, filter: Document) -> Result<DocumentStream>;

    async fn insert_one(&self, collection: &str, document: Document) -> Result<()>;
}

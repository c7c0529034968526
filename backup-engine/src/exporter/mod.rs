//! Chunked Exporter.
//!
//! Streams the documents matching a filter out of one collection and packs
//! them into JSON-array chunk bodies. A chunk is closed as soon as its body
//! grows past the byte limit, so every chunk except the last is strictly
//! larger than the limit. The last chunk is always produced, even when it
//! holds no documents.

use crate::checkpoint::Checkpoint;
use crate::extjson::{self, DOCUMENT_SEPARATOR};
use crate::store::{DocumentStore, DocumentStream};
use crate::utils::errors::Result;
use futures_util::TryStreamExt;
use mongodb::bson::{Bson, Document};

/// One size-bounded segment of an export.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportChunk {
    /// JSON array of Extended JSON documents
    pub body: String,
    /// Serialized key field of the last document in the chunk
    pub last_key: Option<Checkpoint>,
    pub document_count: usize,
}

impl ExportChunk {
    pub fn is_empty(&self) -> bool {
        self.document_count == 0
    }

    pub fn size(&self) -> usize {
        self.body.len()
    }
}

/// Lazy, single-pass sequence of chunks over one cursor.
pub struct ChunkedExporter {
    cursor: DocumentStream,
    key_field: String,
    bulk_size_limit: usize,
    exhausted: bool,
}

impl ChunkedExporter {
    /// Open a cursor on `collection` and wrap it.
    pub async fn open(
        store: &dyn DocumentStore,
        collection: &str,
        filter: Document,
        key_field: &str,
        bulk_size_limit: usize,
    ) -> Result<Self> {
        let cursor = store.find(collection, filter).await?;
        Ok(Self::from_stream(cursor, key_field, bulk_size_limit))
    }

    pub fn from_stream(cursor: DocumentStream, key_field: &str, bulk_size_limit: usize) -> Self {
        Self {
            cursor,
            key_field: key_field.to_string(),
            bulk_size_limit,
            exhausted: false,
        }
    }

    /// Produce the next chunk, or `None` once the terminal chunk has been returned.
    pub async fn next_chunk(&mut self) -> Result<Option<ExportChunk>> {
        if self.exhausted {
            return Ok(None);
        }

        let mut builder = ChunkBuilder::new();
        while let Some(doc) = self.cursor.try_next().await? {
            builder.push(&doc, &self.key_field)?;
            if builder.size() > self.bulk_size_limit {
                return Ok(Some(builder.finish()));
            }
        }

        self.exhausted = true;
        Ok(Some(builder.finish()))
    }
}

struct ChunkBuilder {
    body: String,
    last_key: Option<Checkpoint>,
    document_count: usize,
}

impl ChunkBuilder {
    fn new() -> Self {
        Self {
            body: String::from("["),
            last_key: None,
            document_count: 0,
        }
    }

    fn push(&mut self, doc: &Document, key_field: &str) -> Result<()> {
        if self.document_count > 0 {
            self.body.push_str(DOCUMENT_SEPARATOR);
        }
        self.body.push_str(&extjson::encode_document(doc)?);
        self.last_key = serialized_key(doc, key_field)?;
        self.document_count += 1;
        Ok(())
    }

    /// Byte length of the body accumulated so far, without the closing bracket.
    fn size(&self) -> usize {
        self.body.len()
    }

    fn finish(mut self) -> ExportChunk {
        self.body.push(']');
        ExportChunk {
            body: self.body,
            last_key: self.last_key,
            document_count: self.document_count,
        }
    }
}

fn serialized_key(doc: &Document, key_field: &str) -> Result<Option<Checkpoint>> {
    match doc.get(key_field) {
        None | Some(Bson::Null) => Ok(None),
        Some(value) => {
            let checkpoint = Checkpoint::new(extjson::encode_value(value)?);
            Ok((!checkpoint.is_degenerate()).then_some(checkpoint))
        }
    }
}

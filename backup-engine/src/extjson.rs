//! Document interchange format.
//!
//! Documents are written as canonical MongoDB Extended JSON so that every
//! native type (ObjectId, dates, Int32 vs Int64, Decimal128, binary) survives
//! a dump/load cycle. A chunk body is a JSON array of such documents joined by
//! `", "`.

use crate::utils::errors::{BackupError, Result};
use mongodb::bson::{Bson, Document};

/// Separator placed between documents inside a chunk body.
pub const DOCUMENT_SEPARATOR: &str = ", ";

/// Serialize a single BSON value to its canonical Extended JSON text.
pub fn encode_value(value: &Bson) -> Result<String> {
    let json = value.clone().into_canonical_extjson();
    Ok(serde_json::to_string(&json)?)
}

pub fn encode_document(doc: &Document) -> Result<String> {
    encode_value(&Bson::Document(doc.clone()))
}

/// Parse Extended JSON text back into a BSON value.
pub fn decode_value(text: &str) -> Result<Bson> {
    let json: serde_json::Value = serde_json::from_str(text)?;
    Bson::try_from(json).map_err(|e| BackupError::ExtendedJson(e.to_string()))
}

/// Assemble a chunk body from already-loaded documents.
pub fn encode_chunk(docs: &[Document]) -> Result<String> {
    let mut body = String::from("[");
    for (i, doc) in docs.iter().enumerate() {
        if i > 0 {
            body.push_str(DOCUMENT_SEPARATOR);
        }
        body.push_str(&encode_document(doc)?);
    }
    body.push(']');
    Ok(body)
}

/// Parse a chunk body into its documents, in file order.
pub fn decode_chunk(body: &[u8]) -> Result<Vec<Document>> {
    let values: Vec<serde_json::Value> = serde_json::from_slice(body)?;
    values
        .into_iter()
        .map(|value| match Bson::try_from(value) {
            Ok(Bson::Document(doc)) => Ok(doc),
            Ok(other) => Err(BackupError::ExtendedJson(format!(
                "expected a document, found {:?}",
                other.element_type()
            ))),
            Err(e) => Err(BackupError::ExtendedJson(e.to_string())),
        })
        .collect()
}

//! Store abstractions the sync core reads from and writes to.
//!
//! # Document store
//!
//! A key-addressable collection of JSON documents with at-least-once writes
//! and no cross-document transactions. Concurrent writers resolve by
//! last-writer-wins.
//!
//! - [`MemoryDocumentStore`] - in-process, used in tests and local development
//! - [`crate::db::PgDocumentStore`] - `PostgreSQL` JSONB table
//!
//! # Local storage
//!
//! A synchronous, device-scoped string key-value store with no capacity
//! guarantee. See [`local`].

pub mod local;
mod memory;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

use krd_core::DocumentId;

pub use local::{FileLocalStorage, LocalStorage, MemoryLocalStorage, StorageError};
pub use memory::MemoryDocumentStore;

/// Collection names used by the storefront.
pub mod collections {
    pub const CARTS: &str = "carts";
    pub const WISHLISTS: &str = "wishlists";
    pub const IMAGES: &str = "images";
    pub const QUOTES: &str = "quotes";
}

/// Errors that can occur when talking to the document store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// `update` addressed a document that does not exist.
    #[error("document not found: {collection}/{key}")]
    NotFound { collection: String, key: String },

    /// Quota or rate limit exhausted; retrying later may succeed.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// The store could not be reached at all.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The store refused this particular write.
    #[error("write rejected: {0}")]
    Rejected(String),

    /// Document could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Backend failure that fits none of the classes above. May be transient.
    #[error("database error: {0}")]
    Database(String),
}

impl StoreError {
    /// Whether the failure concerns the store as a whole rather than one document.
    #[must_use]
    pub const fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }

    #[must_use]
    pub const fn is_resource_exhausted(&self) -> bool {
        matches!(self, Self::ResourceExhausted(_))
    }

    /// Whether the same write is certain to fail again.
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(
            self,
            Self::Rejected(_) | Self::Serialization(_) | Self::NotFound { .. }
        )
    }
}

/// How `set` treats fields already present in the stored document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SetMode {
    /// Top-level fields not supplied are preserved; supplied fields are replaced whole.
    #[default]
    Merge,
    /// The stored document becomes exactly the supplied one.
    Replace,
}

/// Keyed document storage.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch a document, or `None` if it does not exist.
    async fn get(&self, collection: &str, key: &str) -> Result<Option<Value>, StoreError>;

    /// Write a document, creating it if missing.
    async fn set(
        &self,
        collection: &str,
        key: &str,
        document: Map<String, Value>,
        mode: SetMode,
    ) -> Result<(), StoreError>;

    /// Replace only the supplied top-level fields of an existing document.
    ///
    /// Fails with [`StoreError::NotFound`] if the document does not exist.
    async fn update(
        &self,
        collection: &str,
        key: &str,
        fields: Map<String, Value>,
    ) -> Result<(), StoreError>;

    /// Create a new document under a store-assigned key.
    async fn create(
        &self,
        collection: &str,
        document: Map<String, Value>,
    ) -> Result<DocumentId, StoreError>;

    /// Cheap reachability probe used by readiness checks.
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Serialize `value` into a document body.
///
/// # Errors
///
/// Returns `StoreError::Rejected` if `value` does not serialize to a JSON object.
pub fn to_document<T: serde::Serialize>(value: &T) -> Result<Map<String, Value>, StoreError> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::Rejected(format!(
            "document must be a JSON object, got {}",
            json_kind(&other)
        ))),
    }
}

const fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_document_requires_object() {
        assert!(to_document(&serde_json::json!({"a": 1})).is_ok());
        assert!(matches!(to_document(&vec![1, 2]), Err(StoreError::Rejected(_))));
    }

    #[test]
    fn test_error_classification() {
        assert!(StoreError::Unavailable("down".into()).is_unavailable());
        assert!(!StoreError::Rejected("bad".into()).is_unavailable());
        assert!(StoreError::ResourceExhausted("quota".into()).is_resource_exhausted());
        assert!(StoreError::Rejected("bad".into()).is_permanent());
        assert!(!StoreError::Database("connection reset".into()).is_permanent());
        assert!(!StoreError::Unavailable("down".into()).is_permanent());
    }
}

//! Document store module
//!
//! The store is the only owner of persisted parcel state. Handlers talk to it
//! through [`DocumentStore`], one single-document call at a time; there are no
//! transactions and no compare-and-set.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;

use crate::config::{StoreBackend, StoreConfig};

/// A stored document: a JSON object keyed by field name.
pub type Document = Map<String, Value>;

/// Longest accepted document key, in bytes.
pub const MAX_KEY_BYTES: usize = 1500;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid document key {key:?}: {reason}")]
    InvalidKey { key: String, reason: &'static str },

    #[error("no document to update: {collection}/{key}")]
    NotFound { collection: String, key: String },

    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("store serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Single-collection document store.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Collection name, used in log lines and errors.
    fn collection(&self) -> &str;

    /// Fetches a document, `None` if absent.
    async fn get(&self, key: &str) -> StoreResult<Option<Document>>;

    /// Writes a document, replacing whatever was stored under `key`.
    async fn set(&self, key: &str, document: Document) -> StoreResult<()>;

    /// Shallow-merges `fields` into an existing document.
    ///
    /// Top-level fields in `fields` replace the stored ones; all other fields
    /// are kept. Fails with [`StoreError::NotFound`] if the document is absent.
    async fn update(&self, key: &str, fields: Document) -> StoreResult<()>;

    /// Removes a document. Deleting an absent key is not an error.
    async fn delete(&self, key: &str) -> StoreResult<()>;

    /// Readiness check.
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    /// Flushes and releases the store at process exit.
    async fn close(&self) -> StoreResult<()> {
        Ok(())
    }
}

pub type SharedStore = Arc<dyn DocumentStore>;

/// Opens the backend selected in configuration.
pub fn open(config: &StoreConfig) -> StoreResult<SharedStore> {
    let store: SharedStore = match config.backend {
        StoreBackend::Memory => Arc::new(MemoryStore::new(&config.collection)),
        StoreBackend::File => Arc::new(FileStore::open(&config.path, &config.collection)?),
    };
    Ok(store)
}

/// Rejects keys the store cannot address.
pub fn validate_key(key: &str) -> StoreResult<()> {
    let reason = if key.is_empty() {
        "key is empty"
    } else if key.len() > MAX_KEY_BYTES {
        "key is longer than 1500 bytes"
    } else if key.contains('/') {
        "key contains '/'"
    } else if key == "." || key == ".." {
        "key is a relative path segment"
    } else {
        return Ok(());
    };

    Err(StoreError::InvalidKey {
        key: key.to_string(),
        reason,
    })
}

/// Applies a shallow merge of `fields` onto `document`.
pub(crate) fn merge_fields(document: &mut Document, fields: Document) {
    for (name, value) in fields {
        document.insert(name, value);
    }
}

// In-memory document store

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{merge_fields, validate_key, Document, DocumentStore, StoreError, StoreResult};

/// Process-local store; contents are lost at exit.
pub struct MemoryStore {
    collection: String,
    documents: RwLock<HashMap<String, Document>>,
}

impl MemoryStore {
    pub fn new(collection: &str) -> Self {
        Self {
            collection: collection.to_string(),
            documents: RwLock::new(HashMap::new()),
        }
    }

    /// Number of stored documents
    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn collection(&self) -> &str {
        &self.collection
    }

    async fn get(&self, key: &str) -> StoreResult<Option<Document>> {
        validate_key(key)?;
        Ok(self.documents.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, document: Document) -> StoreResult<()> {
        validate_key(key)?;
        self.documents
            .write()
            .await
            .insert(key.to_string(), document);
        Ok(())
    }

    async fn update(&self, key: &str, fields: Document) -> StoreResult<()> {
        validate_key(key)?;
        let mut documents = self.documents.write().await;
        let Some(document) = documents.get_mut(key) else {
            return Err(StoreError::NotFound {
                collection: self.collection.clone(),
                key: key.to_string(),
            });
        };
        merge_fields(document, fields);
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        validate_key(key)?;
        self.documents.write().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: serde_json::Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let store = MemoryStore::new("parcels");
        store.set("p1", doc(json!({"id": "p1", "weight": 5}))).await.unwrap();

        let loaded = store.get("p1").await.unwrap().unwrap();
        assert_eq!(loaded, doc(json!({"id": "p1", "weight": 5})));
        assert!(store.get("p2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_overwrites() {
        let store = MemoryStore::new("parcels");
        store.set("p1", doc(json!({"id": "p1", "weight": 5}))).await.unwrap();
        store.set("p1", doc(json!({"id": "p1"}))).await.unwrap();

        let loaded = store.get("p1").await.unwrap().unwrap();
        assert!(!loaded.contains_key("weight"));
    }

    #[tokio::test]
    async fn test_update_missing_document_fails() {
        let store = MemoryStore::new("parcels");
        let err = store
            .update("ghost", doc(json!({"status": "done"})))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = MemoryStore::new("parcels");
        store.set("p1", doc(json!({"id": "p1"}))).await.unwrap();

        store.delete("p1").await.unwrap();
        store.delete("p1").await.unwrap();
        assert!(store.get("p1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_invalid_key_is_rejected_before_access() {
        let store = MemoryStore::new("parcels");
        let err = store.set("a/b", Document::new()).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidKey { .. }));
        assert_eq!(store.len().await, 0);
    }
}

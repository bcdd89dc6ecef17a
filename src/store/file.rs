// File-backed document store
// Mirrors the collection to a single JSON file, rewritten after every mutation

use async_trait::async_trait;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

use super::{merge_fields, validate_key, Document, DocumentStore, StoreError, StoreResult};
use crate::logger;

/// JSON file store
pub struct FileStore {
    collection: String,
    /// Path to the collection file
    path: PathBuf,
    /// Current documents (cached in memory)
    documents: RwLock<HashMap<String, Document>>,
}

impl FileStore {
    /// Open a store backed by `path`
    ///
    /// A missing file starts an empty collection. A file that exists but
    /// cannot be read or parsed is an error; starting empty would overwrite it
    /// on the first write.
    pub fn open(path: impl AsRef<Path>, collection: &str) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let documents = Self::load(&path)?;

        logger::write_info(&format!(
            "[Store] Opened {} ({} documents) from {}",
            collection,
            documents.len(),
            path.display()
        ));

        Ok(Self {
            collection: collection.to_string(),
            path,
            documents: RwLock::new(documents),
        })
    }

    fn load(path: &Path) -> StoreResult<HashMap<String, Document>> {
        if !path.exists() {
            return Ok(HashMap::new());
        }

        let content = fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(HashMap::new());
        }
        Ok(serde_json::from_str(&content)?)
    }

    /// Write the whole collection back to disk
    ///
    /// Called with the write lock held so file contents follow lock order.
    async fn save(&self, documents: &HashMap<String, Document>) -> StoreResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let content = serde_json::to_string_pretty(documents)?;
        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, content).await?;
        if let Err(e) = tokio::fs::rename(&tmp_path, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }
        Ok(())
    }

    /// Persist a change to `key`, putting `previous` back if the write fails
    ///
    /// The write lock is held across the save, so readers never observe a
    /// change that did not reach disk.
    async fn save_or_restore(
        &self,
        documents: &mut HashMap<String, Document>,
        key: &str,
        previous: Option<Document>,
    ) -> StoreResult<()> {
        let Err(e) = self.save(documents).await else {
            return Ok(());
        };

        match previous {
            Some(document) => {
                documents.insert(key.to_string(), document);
            }
            None => {
                documents.remove(key);
            }
        }
        logger::write_error(&format!(
            "[Store] Write to {}/{} rolled back: {e}",
            self.collection, key
        ));
        Err(e)
    }

    #[cfg(test)]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl DocumentStore for FileStore {
    fn collection(&self) -> &str {
        &self.collection
    }

    async fn get(&self, key: &str) -> StoreResult<Option<Document>> {
        validate_key(key)?;
        Ok(self.documents.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, document: Document) -> StoreResult<()> {
        validate_key(key)?;
        let mut documents = self.documents.write().await;
        let previous = documents.insert(key.to_string(), document);
        self.save_or_restore(&mut documents, key, previous).await
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
        let previous = document.clone();
        merge_fields(document, fields);
        self.save_or_restore(&mut documents, key, Some(previous)).await
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        validate_key(key)?;
        let mut documents = self.documents.write().await;
        match documents.remove(key) {
            Some(removed) => self.save_or_restore(&mut documents, key, Some(removed)).await,
            None => Ok(()),
        }
    }

    async fn ping(&self) -> StoreResult<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        if dir.exists() {
            Ok(())
        } else {
            Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("store directory {} is missing", dir.display()),
            )))
        }
    }

    async fn close(&self) -> StoreResult<()> {
        let documents = self.documents.write().await;
        self.save(&documents).await?;
        logger::write_info(&format!(
            "[Store] Closed {} ({} documents) at {}",
            self.collection,
            documents.len(),
            self.path.display()
        ));
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
    async fn test_missing_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path().join("parcels.json"), "parcels").unwrap();
        assert!(store.get("p1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_documents_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("parcels.json");

        {
            let store = FileStore::open(&path, "parcels").unwrap();
            store.set("p1", doc(json!({"id": "p1", "weight": 5}))).await.unwrap();
            store.set("p2", doc(json!({"id": "p2"}))).await.unwrap();
            store.update("p1", doc(json!({"status": "done"}))).await.unwrap();
            store.delete("p2").await.unwrap();
        }

        let reopened = FileStore::open(&path, "parcels").unwrap();
        assert_eq!(
            reopened.get("p1").await.unwrap().unwrap(),
            doc(json!({"id": "p1", "weight": 5, "status": "done"}))
        );
        assert!(reopened.get("p2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parcels.json");
        fs::write(&path, "{not json").unwrap();

        let result = FileStore::open(&path, "parcels");
        assert!(matches!(result, Err(StoreError::Serialization(_))));
    }

    #[tokio::test]
    async fn test_update_missing_document_leaves_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parcels.json");
        let store = FileStore::open(&path, "parcels").unwrap();

        let err = store.update("ghost", doc(json!({"a": 1}))).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_failed_write_is_not_visible() {
        let dir = tempfile::tempdir().unwrap();
        // The parent of the collection file is a regular file
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "").unwrap();
        let store = FileStore::open(blocker.join("parcels.json"), "parcels").unwrap();

        let err = store.set("p1", doc(json!({"id": "p1", "weight": 5}))).await.unwrap_err();
        assert!(matches!(err, StoreError::Io(_)));
        assert!(store.get("p1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_writes_restore_previous_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parcels.json");
        let store = FileStore::open(&path, "parcels").unwrap();
        store.set("p1", doc(json!({"id": "p1", "weight": 5}))).await.unwrap();
        let on_disk = fs::read_to_string(&path).unwrap();

        // A directory where the temporary file goes makes every save fail
        let tmp_path = path.with_extension("json.tmp");
        fs::create_dir(&tmp_path).unwrap();

        assert!(store.set("p1", doc(json!({"id": "p1"}))).await.is_err());
        assert!(store.set("p2", doc(json!({"id": "p2"}))).await.is_err());
        assert!(store.update("p1", doc(json!({"status": "done"}))).await.is_err());
        assert!(store.delete("p1").await.is_err());

        assert_eq!(
            store.get("p1").await.unwrap().unwrap(),
            doc(json!({"id": "p1", "weight": 5}))
        );
        assert!(store.get("p2").await.unwrap().is_none());
        assert_eq!(fs::read_to_string(&path).unwrap(), on_disk);

        fs::remove_dir(&tmp_path).unwrap();
        store.delete("p1").await.unwrap();
        assert!(store.get("p1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_close_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parcels.json");
        let store = FileStore::open(&path, "parcels").unwrap();

        store.ping().await.unwrap();
        store.close().await.unwrap();
        assert_eq!(fs::read_to_string(store.path()).unwrap().trim(), "{}");
    }
}

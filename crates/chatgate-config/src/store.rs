use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store holds invalid json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Key-value configuration store.
///
/// Stand-in for the browser's localStorage: callers read and write opaque
/// JSON values under fixed keys. Implementations decide where the bytes
/// live, so tests can swap in [`MemoryStore`].
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;
    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError>;
    async fn remove(&self, key: &str) -> Result<(), StoreError>;
}

#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

/// JSON-file-backed store: one file holding a single object, loaded lazily
/// and written through on every mutation.
pub struct FileStore {
    path: PathBuf,
    cache: RwLock<Option<HashMap<String, Value>>>,
}

impl FileStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            cache: RwLock::new(None),
        }
    }

    /// Store under the default data directory, named `state.json`.
    pub fn in_data_dir(data_dir: &std::path::Path) -> Self {
        Self::new(data_dir.join("state.json"))
    }

    async fn load(&self) -> Result<HashMap<String, Value>, StoreError> {
        {
            let cache = self.cache.read().await;
            if let Some(ref entries) = *cache {
                return Ok(entries.clone());
            }
        }

        let entries = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => serde_json::from_str(&content)?,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(error) => return Err(error.into()),
        };

        let mut cache = self.cache.write().await;
        *cache = Some(entries.clone());
        Ok(entries)
    }

    async fn persist(&self, entries: &HashMap<String, Value>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(entries)?;
        tokio::fs::write(&self.path, content).await?;
        Ok(())
    }
}

#[async_trait]
impl KvStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.load().await?.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let mut entries = self.load().await?;
        entries.insert(key.to_string(), value);
        self.persist(&entries).await?;
        let mut cache = self.cache.write().await;
        *cache = Some(entries);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self.load().await?;
        if entries.remove(key).is_some() {
            self.persist(&entries).await?;
        }
        let mut cache = self.cache.write().await;
        *cache = Some(entries);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn memory_store_roundtrip() {
        let store = MemoryStore::new();
        store.set("models", json!([{"id": "gpt-4"}])).await.unwrap();

        let value = store.get("models").await.unwrap().unwrap();
        assert_eq!(value[0]["id"], "gpt-4");

        store.remove("models").await.unwrap();
        assert!(store.get("models").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn file_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        {
            let store = FileStore::new(path.clone());
            store
                .set("categories", json!({"Claude": "claude"}))
                .await
                .unwrap();
        }

        let reopened = FileStore::new(path);
        let value = reopened.get("categories").await.unwrap().unwrap();
        assert_eq!(value["Claude"], "claude");
    }

    #[tokio::test]
    async fn file_store_missing_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("absent.json"));
        assert!(store.get("anything").await.unwrap().is_none());
    }
}

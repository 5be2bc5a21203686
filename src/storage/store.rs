use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::storage::{repository, Database};

/// Persistent string key-value store used for every report cache.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> Result<()>;

    async fn remove(&self, key: &str) -> Result<()>;

    async fn list_keys(&self) -> Result<Vec<String>>;
}

#[async_trait]
impl KeyValueStore for Database {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let key = key.to_string();
        self.reader()
            .call(move |conn| repository::get_cache_entry(conn, &key))
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let key = key.to_string();
        let value = value.to_string();
        self.writer()
            .call(move |conn| repository::set_cache_entry(conn, &key, &value))
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let key = key.to_string();
        self.writer()
            .call(move |conn| repository::delete_cache_entry(conn, &key))
            .await?;
        Ok(())
    }

    async fn list_keys(&self) -> Result<Vec<String>> {
        self.reader()
            .call(|conn| repository::list_cache_keys(conn))
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }
}

/// A process-local store. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, String>> {
        // A poisoned map is still a valid map.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.lock().remove(key);
        Ok(())
    }

    async fn list_keys(&self) -> Result<Vec<String>> {
        Ok(self.lock().keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn exercise(store: &dyn KeyValueStore) {
        assert_eq!(store.get("a").await.unwrap(), None);
        store.set("a", "1").await.unwrap();
        store.set("b", "2").await.unwrap();
        store.set("a", "3").await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), Some("3".to_string()));
        assert_eq!(store.list_keys().await.unwrap(), vec!["a", "b"]);
        store.remove("a").await.unwrap();
        store.remove("missing").await.unwrap();
        assert_eq!(store.list_keys().await.unwrap(), vec!["b"]);
    }

    #[tokio::test]
    async fn test_memory_store() {
        exercise(&MemoryStore::new()).await;
    }

    #[tokio::test]
    async fn test_database_store() {
        let db = Database::open_memory().await.unwrap();
        exercise(&db).await;
    }
}

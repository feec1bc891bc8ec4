use std::sync::atomic::{AtomicBool, Ordering};
use ahash::AHashMap;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;

use super::{AsyncStore, StorageError};

/// In-process async store. Nothing survives a restart.
pub struct MemoryStore {
    name: String,
    entries: RwLock<AHashMap<String, Value>>,
    available: bool,
    disposed: AtomicBool,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: RwLock::new(AHashMap::new()),
            available: true,
            disposed: AtomicBool::new(false),
        }
    }

    /// A store whose `init` always fails, e.g. a blocked browser database
    pub fn unavailable(name: impl Into<String>) -> Self {
        Self {
            available: false,
            ..Self::new(name)
        }
    }

    /// Seed a value before the store is handed out
    pub fn with_value(self, key: &str, value: Value) -> Self {
        self.entries.write().insert(key.to_string(), value);
        self
    }

    /// Peek at a value without going through the async interface
    pub fn snapshot(&self, key: &str) -> Option<Value> {
        self.entries.read().get(key).cloned()
    }

    /// Whether `dispose` has been called
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    fn check_open(&self) -> Result<(), StorageError> {
        if !self.available {
            return Err(StorageError::Unavailable(self.name.clone()));
        }
        if self.is_disposed() {
            return Err(StorageError::Disposed(self.name.clone()));
        }
        Ok(())
    }
}

#[async_trait]
impl AsyncStore for MemoryStore {
    async fn init(&self) -> Result<(), StorageError> {
        self.check_open()
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        self.check_open()?;
        Ok(self.entries.read().get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        self.check_open()?;
        self.entries.write().insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.check_open()?;
        self.entries.write().remove(key);
        Ok(())
    }

    fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
    }

    fn is_persistent(&self) -> bool {
        false
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_get_set_remove() {
        let store = MemoryStore::new("settings");
        store.init().await.unwrap();

        assert!(store.get("k").await.unwrap().is_none());
        store.set("k", json!([1, 2])).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(json!([1, 2])));

        store.remove("k").await.unwrap();
        assert!(store.snapshot("k").is_none());
    }

    #[tokio::test]
    async fn test_unavailable_and_disposed() {
        let store = MemoryStore::unavailable("db");
        assert!(matches!(store.init().await, Err(StorageError::Unavailable(_))));

        let store = MemoryStore::new("db");
        store.dispose();
        assert!(matches!(store.get("k").await, Err(StorageError::Disposed(_))));
    }
}

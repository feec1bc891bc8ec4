use std::sync::Arc;
use ahash::AHashMap;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;

use super::{AsyncStore, StorageError, SyncStore};

/// Synchronous string store in the shape of browser local storage
#[derive(Default)]
pub struct LocalStore {
    items: RwLock<AHashMap<String, String>>,
}

impl LocalStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }
}

impl SyncStore for LocalStore {
    fn get_item(&self, key: &str) -> Option<String> {
        self.items.read().get(key).cloned()
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.items.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) {
        self.items.write().remove(key);
    }
}

/// Presents a [`SyncStore`] through the async interface
///
/// Blobs are stored as JSON text. Used as the fallback when the async
/// backend cannot be opened.
pub struct SyncStoreAdapter {
    inner: Arc<dyn SyncStore>,
}

impl SyncStoreAdapter {
    pub fn new(inner: Arc<dyn SyncStore>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl AsyncStore for SyncStoreAdapter {
    async fn init(&self) -> Result<(), StorageError> {
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        match self.inner.get_item(key) {
            Some(text) => Ok(Some(serde_json::from_str(&text)?)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        let text = serde_json::to_string(&value)?;
        self.inner.set_item(key, &text)
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.inner.remove_item(key);
        Ok(())
    }

    fn dispose(&self) {}

    fn is_persistent(&self) -> bool {
        self.inner.is_persistent()
    }

    fn name(&self) -> &str {
        "sync-adapter"
    }
}

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::debug;

use super::{AsyncStore, StorageError};

/// JSON document on disk; each key is a top-level member
///
/// Writes go to a sibling temp file which is then renamed over the target.
pub struct FileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
    disposed: AtomicBool,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
            disposed: AtomicBool::new(false),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn check_open(&self) -> Result<(), StorageError> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(StorageError::Disposed(self.path.display().to_string()));
        }
        Ok(())
    }

    async fn read_document(&self) -> Result<Map<String, Value>, StorageError> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(e.into()),
        };

        if text.trim().is_empty() {
            return Ok(Map::new());
        }

        match serde_json::from_str::<Value>(&text)? {
            Value::Object(map) => Ok(map),
            _ => Err(StorageError::Corrupt(format!(
                "{} does not contain a JSON object",
                self.path.display()
            ))),
        }
    }

    async fn write_document(&self, document: Map<String, Value>) -> Result<(), StorageError> {
        let text = serde_json::to_string_pretty(&Value::Object(document))?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, text).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!("Wrote {}", self.path.display());
        Ok(())
    }
}

#[async_trait]
impl AsyncStore for FileStore {
    async fn init(&self) -> Result<(), StorageError> {
        self.check_open()?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        // Surface a corrupt document at open time rather than on first read
        self.read_document().await.map(|_| ())
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        self.check_open()?;
        Ok(self.read_document().await?.remove(key))
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        self.check_open()?;
        let _guard = self.write_lock.lock().await;
        let mut document = self.read_document().await?;
        document.insert(key.to_string(), value);
        self.write_document(document).await
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.check_open()?;
        let _guard = self.write_lock.lock().await;
        let mut document = self.read_document().await?;
        if document.remove(key).is_some() {
            self.write_document(document).await?;
        }
        Ok(())
    }

    fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
    }

    fn is_persistent(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn temp_path() -> PathBuf {
        std::env::temp_dir()
            .join(format!("os-core-{}", uuid::Uuid::new_v4()))
            .join("settings.json")
    }

    #[tokio::test]
    async fn test_values_survive_reopen() {
        crate::init_test_tracing();
        let path = temp_path();
        let store = FileStore::new(&path);
        store.init().await.unwrap();
        store.set("columnMappings", json!([{"id": "m1"}])).await.unwrap();
        store.set("other", json!(true)).await.unwrap();

        let reopened = FileStore::new(&path);
        reopened.init().await.unwrap();
        assert_eq!(
            reopened.get("columnMappings").await.unwrap(),
            Some(json!([{"id": "m1"}]))
        );

        reopened.remove("columnMappings").await.unwrap();
        assert!(reopened.get("columnMappings").await.unwrap().is_none());
        assert_eq!(reopened.get("other").await.unwrap(), Some(json!(true)));

        let _ = tokio::fs::remove_dir_all(path.parent().unwrap()).await;
    }

    #[tokio::test]
    async fn test_corrupt_document_fails_init() {
        let path = temp_path();
        tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        tokio::fs::write(&path, "[1, 2, 3]").await.unwrap();

        let store = FileStore::new(&path);
        assert!(matches!(store.init().await, Err(StorageError::Corrupt(_))));

        let _ = tokio::fs::remove_dir_all(path.parent().unwrap()).await;
    }
}

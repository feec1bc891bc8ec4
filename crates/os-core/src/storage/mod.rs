//! Key/value persistence backends
//!
//! The engines never pick a backend themselves. They receive an
//! [`AsyncStore`] (or a legacy [`SyncStore`]) from the composition root.

mod file;
mod local;
mod memory;

pub use file::FileStore;
pub use local::{LocalStore, SyncStoreAdapter};
pub use memory::MemoryStore;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Errors raised by storage backends
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Storage '{0}' has been disposed")]
    Disposed(String),

    #[error("Corrupt storage contents: {0}")]
    Corrupt(String),
}

/// Asynchronous key/value backend holding JSON blobs
#[async_trait]
pub trait AsyncStore: Send + Sync {
    /// Open the backend. A failure here means the backend must not be used.
    async fn init(&self) -> Result<(), StorageError>;

    /// Read a blob, `None` if the key is absent
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError>;

    /// Write a blob, replacing any previous value
    async fn set(&self, key: &str, value: Value) -> Result<(), StorageError>;

    /// Delete a single key
    async fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// Release the backend handle. Later calls fail with [`StorageError::Disposed`].
    fn dispose(&self);

    /// Whether data written here survives a restart
    fn is_persistent(&self) -> bool;

    /// Short backend name for logs
    fn name(&self) -> &str;
}

/// Synchronous string key/value store (the legacy backend)
pub trait SyncStore: Send + Sync {
    fn get_item(&self, key: &str) -> Option<String>;

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;

    fn remove_item(&self, key: &str);

    fn is_persistent(&self) -> bool {
        false
    }
}

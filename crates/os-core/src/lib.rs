//! Core building blocks shared by the query and column mapping engines
//!
//! This crate provides the key utilities, the typed event bus, the
//! coalescing debounce task, the key/value storage abstraction and the
//! engine configuration.

pub mod config;
pub mod debounce;
pub mod events;
pub mod keys;
pub mod storage;

// Re-export commonly used types
pub use config::{ColumnMappingSettings, ConfigError, EngineConfig};
pub use debounce::{DebouncedTask, Debouncer};
pub use events::{Event, EventBus, SubscriptionId};
pub use keys::{entry_key, hash_column, is_wildcard, WILDCARD};
pub use storage::{
    AsyncStore, FileStore, LocalStore, MemoryStore, StorageError, SyncStore, SyncStoreAdapter,
};

/// Install a fmt subscriber for tests. Safe to call from every test.
#[cfg(test)]
pub(crate) fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

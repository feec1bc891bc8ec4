//! Column mapping store
//!
//! Keeps the set of [`ColumnMapping`]s, a reverse index from `layer#column`
//! to the owning mapping, and persists the collection through an
//! [`os_core::AsyncStore`] with a debounced save.

pub mod index;
pub mod manager;
pub mod mapping;
pub mod migration;

use thiserror::Error;
use os_core::StorageError;

pub use index::ColumnIndex;
pub use manager::EntryStore;
pub use mapping::{ColumnEvent, ColumnMapping, ColumnObserver, ColumnRef, MappingConfig, ObserverId};
pub use migration::StorageSources;

/// Errors raised while reading or writing column mappings
#[derive(Error, Debug)]
pub enum ColumnError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid column mapping: {0}")]
    InvalidMapping(String),
}

#[cfg(test)]
pub(crate) fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

//! One-shot startup migration of persisted mappings
//!
//! Older builds kept mappings in a synchronous store and later in an
//! intermediate async store. Both are drained into the settings store once.

use std::sync::Arc;
use serde_json::Value;
use tracing::{info, warn};
use os_core::{AsyncStore, SyncStore};

use crate::manager::{parse_mappings, EntryStore};
use crate::ColumnError;

/// Backends consulted by [`EntryStore::create`]
#[derive(Clone)]
pub struct StorageSources {
    /// Synchronous store written by the oldest builds
    pub legacy: Arc<dyn SyncStore>,
    /// Async store that also decides whether async storage works at all
    pub intermediate: Arc<dyn AsyncStore>,
    /// Store used from now on
    pub settings: Arc<dyn AsyncStore>,
}

fn parse_legacy(text: &str) -> Result<Value, ColumnError> {
    let value: Value = serde_json::from_str(text)?;
    if !value.is_array() {
        return Err(ColumnError::InvalidMapping("legacy mappings are not an array".into()));
    }
    Ok(value)
}

/// Move mappings out of the legacy store into `store`
///
/// The legacy key is deleted even when its contents cannot be parsed so a
/// corrupt blob is not retried on every start.
pub(crate) async fn migrate_legacy(store: &EntryStore, legacy: &dyn SyncStore) -> usize {
    let key = store.settings().legacy_key.clone();
    let Some(text) = legacy.get_item(&key) else {
        return 0;
    };

    let mappings = match parse_legacy(&text) {
        Ok(value) => parse_mappings(value),
        Err(e) => {
            warn!("Discarding unreadable legacy column mappings: {}", e);
            Vec::new()
        }
    };

    let count = mappings.len();
    if count > 0 {
        store.bulk_add(mappings);
        // written before the legacy key goes away
        store.flush().await;
    }
    legacy.remove_item(&key);
    info!("Migrated {} column mappings from legacy storage", count);
    count
}

/// Copy the mappings under `key` from the intermediate store to the settings store
///
/// Entries already present in the settings store keep their saved form. The
/// key is removed from the intermediate store and its handle disposed.
pub(crate) async fn migrate_intermediate(
    intermediate: &dyn AsyncStore,
    settings: &dyn AsyncStore,
    key: &str,
) -> usize {
    let migrated = match intermediate.get(key).await {
        Ok(Some(Value::Array(items))) if !items.is_empty() => {
            match merge_into(settings, key, items).await {
                Ok(count) => {
                    if let Err(e) = intermediate.remove(key).await {
                        warn!("Failed to remove {} from {}: {}", key, intermediate.name(), e);
                    }
                    info!("Migrated {} column mappings from {}", count, intermediate.name());
                    count
                }
                Err(e) => {
                    warn!("Failed to migrate column mappings from {}: {}", intermediate.name(), e);
                    0
                }
            }
        }
        Ok(Some(Value::Array(_))) | Ok(None) => 0,
        Ok(Some(_)) => {
            warn!("Column mappings in {} are not an array, ignoring", intermediate.name());
            0
        }
        Err(e) => {
            warn!("Failed to read column mappings from {}: {}", intermediate.name(), e);
            0
        }
    };

    intermediate.dispose();
    migrated
}

async fn merge_into(
    settings: &dyn AsyncStore,
    key: &str,
    items: Vec<Value>,
) -> Result<usize, ColumnError> {
    let mut merged = match settings.get(key).await? {
        Some(Value::Array(existing)) => existing,
        _ => Vec::new(),
    };

    let mut added = 0;
    for item in items {
        let id = item.get("id").cloned();
        let present = id.is_some() && merged.iter().any(|m| m.get("id") == id.as_ref());
        if !present {
            merged.push(item);
            added += 1;
        }
    }

    settings.set(key, Value::Array(merged)).await?;
    Ok(added)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use os_core::{ColumnMappingSettings, EventBus, FileStore, LocalStore, MemoryStore};

    use crate::mapping::{ColumnMapping, ColumnRef};

    const KEY: &str = "columnMappings";

    fn legacy_blob(ids: &[&str]) -> String {
        let configs: Vec<_> = ids
            .iter()
            .map(|id| {
                let mapping = ColumnMapping::with_id(*id, *id);
                mapping.add_column("L1", format!("{id}_col"));
                mapping.persist()
            })
            .collect();
        serde_json::to_string(&configs).unwrap()
    }

    async fn create(
        legacy: Arc<LocalStore>,
        intermediate: Arc<MemoryStore>,
        settings: Arc<MemoryStore>,
    ) -> EntryStore {
        crate::init_test_tracing();
        let sources = StorageSources {
            legacy,
            intermediate,
            settings,
        };
        let events = Arc::new(EventBus::new());
        EntryStore::create(ColumnMappingSettings::default(), sources, events).await
    }

    #[tokio::test]
    async fn test_legacy_mappings_reach_settings_store() {
        let legacy = Arc::new(LocalStore::new());
        legacy.set_item(KEY, &legacy_blob(&["m1", "m2"])).unwrap();
        let intermediate = Arc::new(MemoryStore::new("intermediate"));
        let settings = Arc::new(MemoryStore::new("settings"));

        let store = create(legacy.clone(), intermediate.clone(), settings.clone()).await;

        let saved = settings.snapshot(KEY).unwrap();
        assert_eq!(saved.as_array().map(Vec::len), Some(2));
        assert!(legacy.get_item(KEY).is_none());
        assert_eq!(store.len(), 2);
        assert!(store.get_owner_mapping_by_column(&ColumnRef::new("L1", "m2_col")).is_some());
        assert!(intermediate.is_disposed());
    }

    #[tokio::test]
    async fn test_corrupt_legacy_blob_is_deleted() {
        let legacy = Arc::new(LocalStore::new());
        legacy.set_item(KEY, "{not json").unwrap();

        let store = create(
            legacy.clone(),
            Arc::new(MemoryStore::new("intermediate")),
            Arc::new(MemoryStore::new("settings")),
        )
        .await;

        assert!(store.is_empty());
        assert!(legacy.is_empty());
    }

    #[tokio::test]
    async fn test_intermediate_store_is_drained() {
        let legacy = Arc::new(LocalStore::new());
        legacy.set_item(KEY, &legacy_blob(&["old"])).unwrap();
        let intermediate = Arc::new(
            MemoryStore::new("intermediate")
                .with_value(KEY, json!([{"id": "mid", "name": "Mid", "columns": []}]))
                .with_value("unrelated", json!(true)),
        );
        let settings = Arc::new(MemoryStore::new("settings"));

        let store = create(legacy, intermediate.clone(), settings.clone()).await;

        let ids: Vec<String> = store.mappings().iter().map(|m| m.id().to_string()).collect();
        assert_eq!(ids, vec!["old", "mid"]);
        assert_eq!(settings.snapshot(KEY).and_then(|v| v.as_array().map(Vec::len)), Some(2));

        // only the one key is removed before the handle is disposed
        assert!(intermediate.snapshot(KEY).is_none());
        assert_eq!(intermediate.snapshot("unrelated"), Some(json!(true)));
        assert!(intermediate.is_disposed());
    }

    #[tokio::test]
    async fn test_falls_back_to_legacy_store() {
        let legacy = Arc::new(LocalStore::new());
        legacy.set_item(KEY, &legacy_blob(&["m1"])).unwrap();
        let settings = Arc::new(MemoryStore::new("settings"));

        let intermediate = Arc::new(MemoryStore::unavailable("intermediate"));
        let store = create(legacy.clone(), intermediate, settings.clone()).await;

        assert_eq!(store.len(), 1);
        assert!(!store.is_persistent());
        assert!(settings.snapshot(KEY).is_none());

        // saves now go through the adapter into the legacy store
        store.add(ColumnMapping::with_id("m2", "m2"));
        store.flush().await;
        let text = legacy.get_item(KEY).unwrap();
        assert_eq!(serde_json::from_str::<Value>(&text).unwrap().as_array().map(Vec::len), Some(2));
    }

    #[tokio::test]
    async fn test_fallback_uses_legacy_key() {
        crate::init_test_tracing();
        let legacy = Arc::new(LocalStore::new());
        legacy.set_item("legacyMappings", &legacy_blob(&["m1"])).unwrap();
        let settings = ColumnMappingSettings {
            legacy_key: "legacyMappings".to_string(),
            ..ColumnMappingSettings::default()
        };
        let sources = StorageSources {
            legacy: legacy.clone(),
            intermediate: Arc::new(MemoryStore::unavailable("intermediate")),
            settings: Arc::new(MemoryStore::new("settings")),
        };

        let store = EntryStore::create(settings, sources, Arc::new(EventBus::new())).await;
        assert_eq!(store.len(), 1);

        store.add(ColumnMapping::with_id("m2", "m2"));
        store.flush().await;
        let text = legacy.get_item("legacyMappings").unwrap();
        let saved: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(saved.as_array().map(Vec::len), Some(2));
        assert!(legacy.get_item(KEY).is_none());
    }

    #[tokio::test]
    async fn test_settings_failure_disposes_intermediate() {
        let legacy = Arc::new(LocalStore::new());
        legacy.set_item(KEY, &legacy_blob(&["m1"])).unwrap();
        let intermediate = Arc::new(MemoryStore::new("intermediate"));

        let store = create(
            legacy,
            intermediate.clone(),
            Arc::new(MemoryStore::unavailable("settings")),
        )
        .await;

        assert_eq!(store.len(), 1);
        assert!(intermediate.is_disposed());
    }

    #[tokio::test]
    async fn test_file_backed_store_is_persistent() {
        crate::init_test_tracing();
        let dir = std::env::temp_dir().join(format!("os-column-{}", uuid::Uuid::new_v4()));
        let path = dir.join("settings.json");
        let legacy = Arc::new(LocalStore::new());
        legacy.set_item(KEY, &legacy_blob(&["m1"])).unwrap();

        let sources = StorageSources {
            legacy: legacy.clone(),
            intermediate: Arc::new(MemoryStore::new("intermediate")),
            settings: Arc::new(FileStore::new(&path)),
        };
        let events = Arc::new(EventBus::new());
        let store = EntryStore::create(ColumnMappingSettings::default(), sources, events).await;
        assert!(store.is_persistent());
        store.dispose();

        // a fresh store over the same file sees the migrated mapping
        let reopened = FileStore::new(&path);
        reopened.init().await.unwrap();
        let saved = reopened.get(KEY).await.unwrap().unwrap();
        assert_eq!(saved[0]["id"], "m1");

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn test_merge_keeps_existing_ids() {
        let settings =
            MemoryStore::new("settings").with_value(KEY, json!([{"id": "a", "name": "kept"}]));
        let intermediate = MemoryStore::new("intermediate")
            .with_value(KEY, json!([{"id": "a", "name": "dropped"}, {"id": "b"}]));

        let migrated = migrate_intermediate(&intermediate, &settings, KEY).await;
        assert_eq!(migrated, 1);
        assert_eq!(
            settings.snapshot(KEY),
            Some(json!([{"id": "a", "name": "kept"}, {"id": "b"}]))
        );
    }
}

//! Column mapping collection with a live reverse index

use std::sync::{Arc, Weak};
use ahash::AHashMap;
use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tracing::{debug, info, warn};
use os_core::config::ColumnMappingSettings;
use os_core::events::events::MappingsChanged;
use os_core::{AsyncStore, DebouncedTask, Debouncer, EventBus, StorageError, SyncStoreAdapter};

use crate::index::ColumnIndex;
use crate::mapping::{ColumnEvent, ColumnMapping, ColumnRef, MappingConfig, ObserverId};
use crate::migration::{self, StorageSources};

struct StoreInner {
    settings: ColumnMappingSettings,
    mappings: RwLock<IndexMap<String, Arc<ColumnMapping>>>,
    index: ColumnIndex,
    observers: Mutex<AHashMap<String, ObserverId>>,
    storage: Arc<dyn AsyncStore>,
    events: Arc<EventBus>,
    debouncer: Debouncer,
}

impl StoreInner {
    fn on_column_event(&self, mapping: &ColumnMapping, event: &ColumnEvent) {
        match event {
            ColumnEvent::Added(column) => {
                self.index.insert(column.hash(), mapping.id());
            }
            ColumnEvent::Removed(column) => {
                self.index.remove_if_owner(&column.hash(), mapping.id());
            }
        }
        self.debouncer.trigger();
    }

    async fn try_save(&self) -> Result<(), StorageError> {
        let configs: Vec<MappingConfig> = self
            .mappings
            .read()
            .values()
            .map(|mapping| mapping.persist())
            .collect();
        let count = configs.len();
        let value = serde_json::to_value(configs)?;
        self.storage.set(&self.settings.storage_key, value).await?;
        debug!("Saved {} column mappings to {}", count, self.storage.name());
        Ok(())
    }

    async fn save(&self) {
        if let Err(e) = self.try_save().await {
            warn!("Failed to save column mappings to {}: {}", self.storage.name(), e);
        }
    }
}

#[async_trait]
impl DebouncedTask for StoreInner {
    async fn run(&self) {
        self.save().await;
        let count = self.mappings.read().len();
        self.events.publish(MappingsChanged { count });
    }
}

/// Owns the column mappings and answers which mapping governs a column
///
/// Every mutation (including column changes made directly on a stored
/// mapping) restarts a debounce window; when it elapses the collection is
/// saved once and one [`MappingsChanged`] event is published.
#[derive(Clone)]
pub struct EntryStore {
    inner: Arc<StoreInner>,
}

impl EntryStore {
    /// Create a store over an already initialized backend
    pub fn new(
        settings: ColumnMappingSettings,
        storage: Arc<dyn AsyncStore>,
        events: Arc<EventBus>,
    ) -> Self {
        let inner = Arc::new_cyclic(|weak: &Weak<StoreInner>| {
            let task: Weak<dyn DebouncedTask> = weak.clone();
            StoreInner {
                debouncer: Debouncer::new(settings.debounce(), task),
                settings,
                mappings: RwLock::new(IndexMap::new()),
                index: ColumnIndex::new(),
                observers: Mutex::new(AHashMap::new()),
                storage,
                events,
            }
        });
        Self { inner }
    }

    /// Open storage, migrate older stores and load the saved mappings
    ///
    /// Never fails. If the async backend cannot be opened the legacy
    /// synchronous store is used through [`SyncStoreAdapter`], keeping the
    /// mappings under the legacy key.
    pub async fn create(
        settings: ColumnMappingSettings,
        sources: StorageSources,
        events: Arc<EventBus>,
    ) -> Self {
        let backend_ready = match sources.intermediate.init().await {
            Ok(()) => match sources.settings.init().await {
                Ok(()) => true,
                Err(e) => {
                    warn!("Settings storage {} unavailable: {}", sources.settings.name(), e);
                    sources.intermediate.dispose();
                    false
                }
            },
            Err(e) => {
                warn!("Async storage {} unavailable: {}", sources.intermediate.name(), e);
                false
            }
        };

        if !backend_ready {
            warn!("Falling back to legacy storage for column mappings");
            let fallback: Arc<dyn AsyncStore> =
                Arc::new(SyncStoreAdapter::new(sources.legacy.clone()));
            let settings = ColumnMappingSettings {
                storage_key: settings.legacy_key.clone(),
                ..settings
            };
            let store = Self::new(settings, fallback, events);
            store.load().await;
            return store;
        }

        let store = Self::new(settings, sources.settings.clone(), events);
        migration::migrate_legacy(&store, sources.legacy.as_ref()).await;
        migration::migrate_intermediate(
            sources.intermediate.as_ref(),
            sources.settings.as_ref(),
            &store.inner.settings.storage_key,
        )
        .await;
        store.load().await;
        store
    }

    /// Insert or replace a mapping and index its columns
    ///
    /// A different mapping with the same id is replaced. Adding the same
    /// instance again changes nothing.
    pub fn add(&self, mapping: Arc<ColumnMapping>) -> Arc<ColumnMapping> {
        let previous = self
            .inner
            .mappings
            .write()
            .insert(mapping.id().to_string(), mapping.clone());

        match previous {
            Some(previous) if Arc::ptr_eq(&previous, &mapping) => return mapping,
            Some(previous) => self.detach(&previous),
            None => {}
        }

        self.attach(&mapping);
        self.inner.debouncer.trigger();
        mapping
    }

    /// Add each mapping; the debounce window coalesces the saves
    pub fn bulk_add<I>(&self, mappings: I)
    where
        I: IntoIterator<Item = Arc<ColumnMapping>>,
    {
        for mapping in mappings {
            self.add(mapping);
        }
    }

    /// Remove a mapping by id
    pub fn remove_by_id(&self, id: &str) -> Option<Arc<ColumnMapping>> {
        let removed = self.inner.mappings.write().shift_remove(id)?;
        self.detach(&removed);
        self.inner.debouncer.trigger();
        Some(removed)
    }

    /// Remove the stored mapping sharing this mapping's id
    pub fn remove(&self, mapping: &ColumnMapping) -> Option<Arc<ColumnMapping>> {
        self.remove_by_id(mapping.id())
    }

    /// Remove every mapping, returning them in insertion order
    pub fn clear(&self) -> Vec<Arc<ColumnMapping>> {
        let removed: Vec<Arc<ColumnMapping>> =
            self.inner.mappings.write().drain(..).map(|(_, m)| m).collect();
        for mapping in &removed {
            self.detach(mapping);
        }
        if !removed.is_empty() {
            self.inner.debouncer.trigger();
        }
        removed
    }

    /// Mapping owning the column with this `layer#column` hash
    pub fn get_owner_mapping_by_hash(&self, hash: &str) -> Option<Arc<ColumnMapping>> {
        self.owner_of(hash)
    }

    /// Mapping owning this column
    pub fn get_owner_mapping_by_column(&self, column: &ColumnRef) -> Option<Arc<ColumnMapping>> {
        self.owner_of(&column.hash())
    }

    fn owner_of(&self, hash: &str) -> Option<Arc<ColumnMapping>> {
        let id = self.inner.index.owner(hash)?;
        self.inner.mappings.read().get(&id).cloned()
    }

    pub fn get(&self, id: &str) -> Option<Arc<ColumnMapping>> {
        self.inner.mappings.read().get(id).cloned()
    }

    /// All mappings in insertion order
    pub fn mappings(&self) -> Vec<Arc<ColumnMapping>> {
        self.inner.mappings.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.mappings.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.mappings.read().is_empty()
    }

    /// Write every mapping to storage. Failures are logged, never returned.
    pub async fn save(&self) {
        self.inner.save().await;
    }

    /// Like [`EntryStore::save`] but surfaces the backend error
    pub async fn try_save(&self) -> Result<(), StorageError> {
        self.inner.try_save().await
    }

    /// Read the saved mappings and add them
    ///
    /// Entries that cannot be parsed are skipped with a warning.
    pub async fn load(&self) -> Vec<Arc<ColumnMapping>> {
        let key = &self.inner.settings.storage_key;
        let value = match self.inner.storage.get(key).await {
            Ok(Some(value)) => value,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!("Failed to read column mappings from {}: {}", self.inner.storage.name(), e);
                return Vec::new();
            }
        };

        let mappings = parse_mappings(value);
        info!("Loaded {} column mappings from {}", mappings.len(), self.inner.storage.name());
        self.bulk_add(mappings.iter().cloned());
        mappings
    }

    /// Run a pending save and change event now. Returns whether one was pending.
    pub async fn flush(&self) -> bool {
        self.inner.debouncer.flush().await
    }

    /// Whether a save is waiting for the debounce window
    pub fn has_pending_save(&self) -> bool {
        self.inner.debouncer.is_pending()
    }

    /// Cancel pending work, detach mapping observers and release storage
    pub fn dispose(&self) {
        if self.inner.debouncer.cancel() {
            debug!("Dropped pending column mapping save on dispose");
        }
        for mapping in self.mappings() {
            if let Some(observer) = self.inner.observers.lock().remove(mapping.id()) {
                mapping.unobserve(observer);
            }
        }
        self.inner.storage.dispose();
    }

    /// Whether the backend in use survives a restart
    pub fn is_persistent(&self) -> bool {
        self.inner.storage.is_persistent()
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.inner.events
    }

    pub fn settings(&self) -> &ColumnMappingSettings {
        &self.inner.settings
    }

    fn attach(&self, mapping: &Arc<ColumnMapping>) {
        for column in mapping.columns() {
            self.inner.index.insert(column.hash(), mapping.id());
        }

        let weak = Arc::downgrade(&self.inner);
        let observer = mapping.observe(Arc::new(
            move |mapping: &ColumnMapping, event: &ColumnEvent| {
                if let Some(inner) = weak.upgrade() {
                    inner.on_column_event(mapping, event);
                }
            },
        ));
        self.inner.observers.lock().insert(mapping.id().to_string(), observer);
    }

    fn detach(&self, mapping: &Arc<ColumnMapping>) {
        for column in mapping.columns() {
            self.inner.index.remove_if_owner(&column.hash(), mapping.id());
        }
        if let Some(observer) = self.inner.observers.lock().remove(mapping.id()) {
            mapping.unobserve(observer);
        }
    }
}

/// Parse a persisted array of mappings, skipping malformed entries
pub(crate) fn parse_mappings(value: Value) -> Vec<Arc<ColumnMapping>> {
    let Value::Array(items) = value else {
        warn!("Persisted column mappings are not an array, ignoring");
        return Vec::new();
    };

    items
        .into_iter()
        .filter_map(|item| match ColumnMapping::restore_value(item) {
            Ok(mapping) => Some(mapping),
            Err(e) => {
                warn!("Skipping malformed column mapping: {}", e);
                None
            }
        })
        .collect()
}

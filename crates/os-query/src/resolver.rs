//! Query entry table and its read operations

use std::collections::BTreeMap;
use std::sync::Arc;
use indexmap::IndexMap;
use parking_lot::RwLock;
use tracing::debug;
use os_core::events::events::{EntriesChanged, EntryChange, HandlersChanged};
use os_core::events::EventBus;
use os_core::keys::is_wildcard;

use crate::entry::{Entry, EntryId};
use crate::expand::{expand, sort_entries, Scope};
use crate::registry::{AreaRegistry, AreaState, QueryHandler};

/// Flat table of query entries with wildcard-expanding reads
///
/// All mutations are synchronous and visible to the next read. Reads copy
/// the table before expanding, so no lock is held while results are built.
pub struct QueryEntryResolver {
    entries: RwLock<IndexMap<EntryId, Entry>>,
    handlers: RwLock<IndexMap<String, Arc<dyn QueryHandler>>>,
    areas: Arc<dyn AreaRegistry>,
    events: Arc<EventBus>,
}

impl QueryEntryResolver {
    /// Create an empty resolver
    pub fn new(areas: Arc<dyn AreaRegistry>, events: Arc<EventBus>) -> Self {
        Self {
            entries: RwLock::new(IndexMap::new()),
            handlers: RwLock::new(IndexMap::new()),
            areas,
            events,
        }
    }

    /// Add a row. A row with the same (layer, area, filter) already present
    /// is kept as is and `false` is returned.
    pub fn add_entry(&self, entry: Entry) -> bool {
        let added = self.insert(entry);
        if added {
            self.publish_change(EntryChange::Added, 1);
        }
        added
    }

    /// Add rows with the same merge rule as [`Self::add_entry`].
    /// Publishes one change event for the whole batch.
    pub fn add_entries<I>(&self, entries: I) -> usize
    where
        I: IntoIterator<Item = Entry>,
    {
        let mut added = 0;
        for entry in entries {
            if self.insert(entry) {
                added += 1;
            }
        }
        if added > 0 {
            self.publish_change(EntryChange::Added, added);
        }
        added
    }

    fn insert(&self, entry: Entry) -> bool {
        let id = entry.id();
        let mut entries = self.entries.write();
        if entries.contains_key(&id) {
            debug!("Entry {} already present", entry.key());
            return false;
        }
        entries.insert(id, entry);
        true
    }

    /// Remove rows whose given fields match exactly. `None` does not filter on
    /// that field; `Some("*")` only matches rows holding the literal wildcard.
    pub fn remove_entries(
        &self,
        layer_id: Option<&str>,
        area_id: Option<&str>,
        filter_id: Option<&str>,
    ) -> Vec<Entry> {
        let removed: Vec<Entry> = {
            let mut entries = self.entries.write();
            let ids: Vec<EntryId> = entries
                .iter()
                .filter(|(_, entry)| entry.matches_exact(layer_id, area_id, filter_id))
                .map(|(id, _)| id.clone())
                .collect();
            ids.iter().filter_map(|id| entries.shift_remove(id)).collect()
        };

        if !removed.is_empty() {
            debug!("Removed {} query entries", removed.len());
            self.publish_change(EntryChange::Removed, removed.len());
        }
        removed
    }

    /// Remove every row
    pub fn clear_entries(&self) -> Vec<Entry> {
        let removed: Vec<Entry> =
            std::mem::take(&mut *self.entries.write()).into_values().collect();
        if !removed.is_empty() {
            self.publish_change(EntryChange::Cleared, removed.len());
        }
        removed
    }

    /// Effective rows for a scope
    ///
    /// With `include_wildcard` the table is expanded (see [`crate::expand`]).
    /// Without it the raw rows matching the scope exactly are returned,
    /// negated rows included.
    pub fn get_entries(
        &self,
        layer_id: Option<&str>,
        area_id: Option<&str>,
        filter_id: Option<&str>,
        include_wildcard: bool,
    ) -> Vec<Entry> {
        let snapshot = self.snapshot();

        if !include_wildcard {
            let mut raw: Vec<Entry> = snapshot
                .into_iter()
                .filter(|entry| entry.matches_exact(layer_id, area_id, filter_id))
                .collect();
            sort_entries(&mut raw);
            return raw;
        }

        let layers = self.handler_layers();
        expand(&snapshot, &layers, Scope::new(layer_id, area_id, filter_id))
    }

    /// How `area_id` is used by non-negated rows, counting only areas the
    /// registry knows and currently shows
    pub fn has_area(&self, area_id: &str) -> AreaState {
        if self.areas.is_shown(area_id) != Some(true) {
            return AreaState::None;
        }

        self.entries
            .read()
            .values()
            .filter(|entry| !entry.negate && entry.area_id == area_id)
            .map(|entry| match entry.include_area {
                true => AreaState::Inclusion,
                false => AreaState::Exclusion,
            })
            .fold(AreaState::None, |state, usage| state | usage)
    }

    /// Whether the layer has an inclusion area that is currently shown
    pub fn has_inclusion(&self, layer_id: &str) -> bool {
        self.get_entries(Some(layer_id), None, None, true)
            .iter()
            .filter(|entry| entry.include_area && !is_wildcard(&entry.area_id))
            .any(|entry| self.areas.is_shown(&entry.area_id) == Some(true))
    }

    /// Whether a registered layer has a row of its own that does something
    pub fn has_active_explicit_entries(&self) -> bool {
        let handlers = self.handlers.read();
        self.entries.read().values().any(|entry| {
            !entry.negate && !entry.is_placeholder() && handlers.contains_key(&entry.layer_id)
        })
    }

    /// Filter group of the first row for `filter_id`, `true` if there is none
    ///
    /// Without a layer the answer comes from whichever row was added first.
    /// With a layer, that layer's own row wins over a wildcard-layer row.
    pub fn is_and(&self, filter_id: &str, layer_id: Option<&str>) -> bool {
        let entries = self.entries.read();
        let mut rows = entries
            .values()
            .filter(|entry| entry.filter_id == filter_id && !entry.negate);

        let found = match layer_id {
            None => rows.next(),
            Some(layer) => {
                let candidates: Vec<&Entry> = rows
                    .filter(|entry| entry.layer_id == layer || entry.has_wildcard_layer())
                    .collect();
                candidates
                    .iter()
                    .find(|entry| entry.layer_id == layer)
                    .or_else(|| candidates.first())
                    .copied()
            }
        };
        found.map_or(true, |entry| entry.filter_group)
    }

    /// Whether any non-negated row references the filter
    pub fn has_filter(&self, filter_id: &str) -> bool {
        self.entries
            .read()
            .values()
            .any(|entry| !entry.negate && entry.filter_id == filter_id)
    }

    /// Layer ids of the registered handlers, mapped to themselves
    pub fn get_layer_set(&self) -> BTreeMap<String, String> {
        self.handlers
            .read()
            .keys()
            .map(|id| (id.clone(), id.clone()))
            .collect()
    }

    /// Register a handler, replacing any handler for the same layer
    pub fn register_handler(&self, handler: Arc<dyn QueryHandler>) {
        let layer_id = handler.layer_id().to_string();
        self.handlers.write().insert(layer_id.clone(), handler);
        debug!("Registered query handler for {}", layer_id);
        self.events.publish(HandlersChanged { layer_id, registered: true });
    }

    /// Unregister the handler for a layer
    pub fn unregister_handler(&self, layer_id: &str) -> Option<Arc<dyn QueryHandler>> {
        let removed = self.handlers.write().shift_remove(layer_id);
        if removed.is_some() {
            debug!("Unregistered query handler for {}", layer_id);
            self.events.publish(HandlersChanged {
                layer_id: layer_id.to_string(),
                registered: false,
            });
        }
        removed
    }

    pub fn get_handler(&self, layer_id: &str) -> Option<Arc<dyn QueryHandler>> {
        self.handlers.read().get(layer_id).cloned()
    }

    pub fn handlers(&self) -> Vec<Arc<dyn QueryHandler>> {
        self.handlers.read().values().cloned().collect()
    }

    /// Number of raw rows
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn snapshot(&self) -> Vec<Entry> {
        self.entries.read().values().cloned().collect()
    }

    fn handler_layers(&self) -> Vec<String> {
        self.handlers.read().keys().cloned().collect()
    }

    fn publish_change(&self, change: EntryChange, count: usize) {
        self.events.publish(EntriesChanged { change, count });
    }
}

//! Column mappings: named sets of (layer, column) pairs treated as equivalent

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;
use os_core::keys::hash_column;

use crate::ColumnError;

/// A column of a layer
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnRef {
    pub layer: String,
    pub column: String,
}

impl ColumnRef {
    pub fn new(layer: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            layer: layer.into(),
            column: column.into(),
        }
    }

    /// Reverse index key, `layer#column`
    pub fn hash(&self) -> String {
        hash_column(&self.layer, &self.column)
    }
}

/// Plain serialized form of a mapping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingConfig {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_type: Option<String>,
    #[serde(default)]
    pub columns: Vec<ColumnRef>,
}

/// Change to a mapping's column set
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnEvent {
    Added(ColumnRef),
    Removed(ColumnRef),
}

/// Callback notified after a mapping's column set changes
pub type ColumnObserver = Arc<dyn Fn(&ColumnMapping, &ColumnEvent) + Send + Sync>;

/// Token for [`ColumnMapping::unobserve`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

#[derive(Debug, Default)]
struct MappingState {
    name: String,
    description: Option<String>,
    value_type: Option<String>,
    columns: Vec<ColumnRef>,
}

/// A named association of columns across layers
///
/// Shared as `Arc<ColumnMapping>`; the store hands out the same instance it
/// holds, so identity comparisons with `Arc::ptr_eq` are meaningful.
pub struct ColumnMapping {
    id: String,
    state: RwLock<MappingState>,
    observers: RwLock<Vec<(ObserverId, ColumnObserver)>>,
    next_observer: AtomicU64,
}

impl ColumnMapping {
    /// New empty mapping with a generated id
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Self::with_id(Uuid::new_v4().to_string(), name)
    }

    pub fn with_id(id: impl Into<String>, name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            state: RwLock::new(MappingState {
                name: name.into(),
                ..MappingState::default()
            }),
            observers: RwLock::new(Vec::new()),
            next_observer: AtomicU64::new(1),
        })
    }

    /// Rebuild a mapping from its serialized form
    pub fn restore(config: MappingConfig) -> Arc<Self> {
        let mapping = Self::with_id(config.id, config.name);
        {
            let mut state = mapping.state.write();
            state.description = config.description;
            state.value_type = config.value_type;
            state.columns = config.columns;
        }
        mapping
    }

    /// Rebuild a mapping from a plain JSON object
    pub fn restore_value(value: Value) -> Result<Arc<Self>, ColumnError> {
        let config: MappingConfig = serde_json::from_value(value)?;
        if config.id.is_empty() {
            return Err(ColumnError::InvalidMapping("mapping id is empty".into()));
        }
        Ok(Self::restore(config))
    }

    /// Serialized form; `restore(persist())` yields the same id and columns
    pub fn persist(&self) -> MappingConfig {
        let state = self.state.read();
        MappingConfig {
            id: self.id.clone(),
            name: state.name.clone(),
            description: state.description.clone(),
            value_type: state.value_type.clone(),
            columns: state.columns.clone(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> String {
        self.state.read().name.clone()
    }

    pub fn set_name(&self, name: impl Into<String>) {
        self.state.write().name = name.into();
    }

    pub fn description(&self) -> Option<String> {
        self.state.read().description.clone()
    }

    pub fn set_description(&self, description: Option<String>) {
        self.state.write().description = description;
    }

    pub fn value_type(&self) -> Option<String> {
        self.state.read().value_type.clone()
    }

    pub fn set_value_type(&self, value_type: Option<String>) {
        self.state.write().value_type = value_type;
    }

    /// Columns in insertion order
    pub fn columns(&self) -> Vec<ColumnRef> {
        self.state.read().columns.clone()
    }

    pub fn column_count(&self) -> usize {
        self.state.read().columns.len()
    }

    pub fn has_column(&self, column: &ColumnRef) -> bool {
        self.state.read().columns.contains(column)
    }

    /// First column mapped for a layer
    pub fn column_for_layer(&self, layer: &str) -> Option<ColumnRef> {
        self.state
            .read()
            .columns
            .iter()
            .find(|c| c.layer == layer)
            .cloned()
    }

    /// Append a column. Returns false if it was already present.
    pub fn add_column(&self, layer: impl Into<String>, column: impl Into<String>) -> bool {
        let column = ColumnRef::new(layer, column);
        {
            let mut state = self.state.write();
            if state.columns.contains(&column) {
                return false;
            }
            state.columns.push(column.clone());
        }
        self.notify(&ColumnEvent::Added(column));
        true
    }

    /// Remove a column. Returns false if it was not present.
    pub fn remove_column(&self, column: &ColumnRef) -> bool {
        {
            let mut state = self.state.write();
            let Some(pos) = state.columns.iter().position(|c| c == column) else {
                return false;
            };
            state.columns.remove(pos);
        }
        self.notify(&ColumnEvent::Removed(column.clone()));
        true
    }

    /// Register a callback for column set changes
    pub fn observe(&self, observer: ColumnObserver) -> ObserverId {
        let id = ObserverId(self.next_observer.fetch_add(1, Ordering::Relaxed));
        self.observers.write().push((id, observer));
        id
    }

    pub fn unobserve(&self, id: ObserverId) -> bool {
        let mut observers = self.observers.write();
        let before = observers.len();
        observers.retain(|(oid, _)| *oid != id);
        observers.len() != before
    }

    pub fn observer_count(&self) -> usize {
        self.observers.read().len()
    }

    fn notify(&self, event: &ColumnEvent) {
        let observers: Vec<ColumnObserver> = self
            .observers
            .read()
            .iter()
            .map(|(_, observer)| observer.clone())
            .collect();
        for observer in observers {
            observer(self, event);
        }
    }
}

impl std::fmt::Debug for ColumnMapping {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("ColumnMapping")
            .field("id", &self.id)
            .field("name", &state.name)
            .field("columns", &state.columns)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    #[test]
    fn test_persist_restore_round_trip() {
        let mapping = ColumnMapping::new("Altitude");
        mapping.add_column("L1", "ALT");
        mapping.add_column("L2", "altitude_m");
        mapping.set_value_type(Some("decimal".into()));

        let restored = ColumnMapping::restore(mapping.persist());
        assert_eq!(restored.id(), mapping.id());
        assert_eq!(restored.columns(), mapping.columns());
        assert_eq!(restored.value_type().as_deref(), Some("decimal"));
        assert_eq!(restored.persist(), mapping.persist());
    }

    #[test]
    fn test_restore_value() {
        let restored = ColumnMapping::restore_value(json!({
            "id": "m1",
            "name": "Time",
            "columns": [{"layer": "L1", "column": "T"}]
        }))
        .unwrap();
        assert_eq!(restored.columns(), vec![ColumnRef::new("L1", "T")]);
        assert!(restored.description().is_none());

        assert!(ColumnMapping::restore_value(json!({"name": "no id"})).is_err());
        assert!(matches!(
            ColumnMapping::restore_value(json!({"id": ""})),
            Err(ColumnError::InvalidMapping(_))
        ));
    }

    #[test]
    fn test_column_events() {
        let mapping = ColumnMapping::new("m");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let id = mapping.observe(Arc::new(move |m: &ColumnMapping, event: &ColumnEvent| {
            sink.lock().push((m.id().to_string(), event.clone()));
        }));

        assert!(mapping.add_column("L1", "C1"));
        assert!(!mapping.add_column("L1", "C1"));
        assert!(mapping.remove_column(&ColumnRef::new("L1", "C1")));
        assert!(!mapping.remove_column(&ColumnRef::new("L1", "C1")));

        assert!(mapping.unobserve(id));
        mapping.add_column("L2", "C2");

        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].1, ColumnEvent::Added(ColumnRef::new("L1", "C1")));
        assert_eq!(seen[1].1, ColumnEvent::Removed(ColumnRef::new("L1", "C1")));
        assert_eq!(mapping.observer_count(), 0);
    }

    #[test]
    fn test_column_lookup() {
        let mapping = ColumnMapping::with_id("m1", "Speed");
        mapping.add_column("L1", "SPD");
        mapping.add_column("L2", "speed");

        assert_eq!(mapping.column_for_layer("L2"), Some(ColumnRef::new("L2", "speed")));
        assert!(mapping.column_for_layer("L3").is_none());
        assert!(mapping.has_column(&ColumnRef::new("L1", "SPD")));
        assert_eq!(ColumnRef::new("L1", "SPD").hash(), "L1#SPD");
    }
}

use std::any::{Any, TypeId};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use parking_lot::RwLock;
use ahash::AHashMap;

/// Engine-wide event bus
///
/// Handlers are keyed by event type. Publishing snapshots the handler list
/// before invoking it, so a handler may publish or subscribe re-entrantly.
pub struct EventBus {
    handlers: Arc<RwLock<AHashMap<TypeId, Vec<(SubscriptionId, Arc<dyn EventHandler>)>>>>,
    next_id: AtomicU64,
}

/// Event trait that all events must implement
pub trait Event: Send + Sync + 'static {
    fn as_any(&self) -> &dyn Any;
}

/// Handler trait for event handlers
pub trait EventHandler: Send + Sync {
    fn handle(&self, event: &dyn Event);
}

/// Token returned by [`EventBus::subscribe`], used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Common engine events
pub mod events {
    use super::Event;

    /// The column mapping collection changed and was saved
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct MappingsChanged {
        pub count: usize,
    }

    /// What kind of mutation touched the query entry table
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum EntryChange {
        Added,
        Removed,
        Cleared,
    }

    /// The query entry table changed
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct EntriesChanged {
        pub change: EntryChange,
        pub count: usize,
    }

    /// A query handler was registered or unregistered
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct HandlersChanged {
        pub layer_id: String,
        pub registered: bool,
    }

    macro_rules! impl_event {
        ($($t:ty),*) => {
            $(
                impl Event for $t {
                    fn as_any(&self) -> &dyn std::any::Any {
                        self
                    }
                }
            )*
        }
    }

    impl_event!(MappingsChanged, EntriesChanged, HandlersChanged);
}

impl EventBus {
    /// Create a new event bus
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(RwLock::new(AHashMap::new())),
            next_id: AtomicU64::new(1),
        }
    }

    /// Subscribe to events of a specific type
    pub fn subscribe<E: Event>(&self, handler: Arc<dyn EventHandler>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .write()
            .entry(TypeId::of::<E>())
            .or_insert_with(Vec::new)
            .push((id, handler));
        id
    }

    /// Subscribe a typed closure to events of type `E`
    pub fn subscribe_fn<E, F>(&self, f: F) -> SubscriptionId
    where
        E: Event,
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.subscribe::<E>(handler_from_fn(move |event: &dyn Event| {
            if let Some(event) = event.as_any().downcast_ref::<E>() {
                f(event);
            }
        }))
    }

    /// Remove a subscription. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.write();
        for list in handlers.values_mut() {
            if let Some(pos) = list.iter().position(|(sid, _)| *sid == id) {
                list.remove(pos);
                return true;
            }
        }
        false
    }

    /// Publish an event
    pub fn publish<E: Event>(&self, event: E) {
        let handlers = self.handlers.read();
        let snapshot: Vec<Arc<dyn EventHandler>> = match handlers.get(&TypeId::of::<E>()) {
            Some(list) => list.iter().map(|(_, h)| h.clone()).collect(),
            None => return,
        };
        drop(handlers);

        for handler in snapshot {
            handler.handle(&event);
        }
    }

    /// Number of handlers registered for `E`
    pub fn handler_count<E: Event>(&self) -> usize {
        self.handlers
            .read()
            .get(&TypeId::of::<E>())
            .map(Vec::len)
            .unwrap_or(0)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Helper struct for creating event handlers from closures
pub struct ClosureEventHandler<F> {
    handler: F,
}

impl<F> EventHandler for ClosureEventHandler<F>
where
    F: Fn(&dyn Event) + Send + Sync,
{
    fn handle(&self, event: &dyn Event) {
        (self.handler)(event);
    }
}

/// Create an event handler from a closure
pub fn handler_from_fn<F>(f: F) -> Arc<dyn EventHandler>
where
    F: Fn(&dyn Event) + Send + Sync + 'static,
{
    Arc::new(ClosureEventHandler { handler: f })
}

//! Query entry resolution
//!
//! Holds the flat `(layer, area, filter)` entry table and answers which
//! concrete area/filter combinations apply to a layer, expanding the `*`
//! wildcard against the concrete rows.

pub mod entry;
pub mod expand;
pub mod registry;
pub mod resolver;

pub use entry::{Entry, EntryId};
pub use expand::{sort_entries, Scope};
pub use registry::{AreaRegistry, AreaState, InMemoryAreaRegistry, LayerHandler, QueryHandler};
pub use resolver::QueryEntryResolver;

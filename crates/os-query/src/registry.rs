//! Collaborators consulted by the resolver

use std::ops::BitOr;
use ahash::AHashMap;
use parking_lot::RwLock;

/// Shown-state lookup for areas
pub trait AreaRegistry: Send + Sync {
    /// `None` while the registry does not know the area yet
    fn is_shown(&self, area_id: &str) -> Option<bool>;
}

/// A registered consumer of query entries for one concrete layer
pub trait QueryHandler: Send + Sync {
    fn layer_id(&self) -> &str;
}

/// Handler that only carries a layer id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerHandler {
    layer_id: String,
}

impl LayerHandler {
    pub fn new(layer_id: impl Into<String>) -> Self {
        Self { layer_id: layer_id.into() }
    }
}

impl QueryHandler for LayerHandler {
    fn layer_id(&self) -> &str {
        &self.layer_id
    }
}

/// Area registry backed by a map of area id to shown flag
#[derive(Default)]
pub struct InMemoryAreaRegistry {
    areas: RwLock<AHashMap<String, bool>>,
}

impl InMemoryAreaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an area
    pub fn add_area(&self, area_id: impl Into<String>, shown: bool) {
        self.areas.write().insert(area_id.into(), shown);
    }

    /// Update the shown flag. Returns false if the area is unknown.
    pub fn set_shown(&self, area_id: &str, shown: bool) -> bool {
        match self.areas.write().get_mut(area_id) {
            Some(flag) => {
                *flag = shown;
                true
            }
            None => false,
        }
    }

    pub fn remove_area(&self, area_id: &str) -> bool {
        self.areas.write().remove(area_id).is_some()
    }
}

impl AreaRegistry for InMemoryAreaRegistry {
    fn is_shown(&self, area_id: &str) -> Option<bool> {
        self.areas.read().get(area_id).copied()
    }
}

/// How an area is used across the query table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum AreaState {
    #[default]
    None = 0,
    Exclusion = 1,
    Inclusion = 2,
    Both = 3,
}

impl AreaState {
    pub fn bits(self) -> u8 {
        self as u8
    }

    pub fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            1 => AreaState::Exclusion,
            2 => AreaState::Inclusion,
            3 => AreaState::Both,
            _ => AreaState::None,
        }
    }

    pub fn has_inclusion(self) -> bool {
        self.bits() & AreaState::Inclusion.bits() != 0
    }

    pub fn has_exclusion(self) -> bool {
        self.bits() & AreaState::Exclusion.bits() != 0
    }
}

impl BitOr for AreaState {
    type Output = AreaState;

    fn bitor(self, rhs: Self) -> Self::Output {
        AreaState::from_bits(self.bits() | rhs.bits())
    }
}

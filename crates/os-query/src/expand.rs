//! Wildcard expansion of the query table
//!
//! For every layer in scope the table is reduced to three slot sets:
//! areas (`area` concrete, `filter` wildcard), filters (`area` wildcard,
//! `filter` concrete) and pairs (both concrete). Wildcard-layer rows fill the
//! slots first, then the layer's own rows override or negate them. Areas are
//! crossed with filters; the area supplies `include_area` and the filter
//! supplies `filter_group`.

use indexmap::{IndexMap, IndexSet};
use os_core::keys::{is_wildcard, WILDCARD};

use crate::entry::{Entry, EntryId};

/// Read scope of a query. `None` means any value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Scope<'a> {
    pub layer_id: Option<&'a str>,
    pub area_id: Option<&'a str>,
    pub filter_id: Option<&'a str>,
}

impl<'a> Scope<'a> {
    /// A scope where the wildcard id is read as "any"
    pub fn new(
        layer_id: Option<&'a str>,
        area_id: Option<&'a str>,
        filter_id: Option<&'a str>,
    ) -> Self {
        let any = |id: Option<&'a str>| id.filter(|id| !is_wildcard(id));
        Self {
            layer_id: any(layer_id),
            area_id: any(area_id),
            filter_id: any(filter_id),
        }
    }

    /// Rows with a wildcard area or filter apply to every concrete value
    fn admits(&self, entry: &Entry) -> bool {
        self.layer_id.map_or(true, |id| entry.layer_id == id)
            && self
                .area_id
                .map_or(true, |id| entry.area_id == id || is_wildcard(&entry.area_id))
            && self
                .filter_id
                .map_or(true, |id| entry.filter_id == id || is_wildcard(&entry.filter_id))
    }
}

/// A filter slot and whether it came from a wildcard-layer row
struct FilterSlot<'e> {
    entry: &'e Entry,
    inherited: bool,
}

/// Expand `entries` into concrete rows for `scope`
///
/// The layers expanded are the pinned layer if the scope has one, otherwise
/// `known_layers` plus every concrete layer that owns an area, filter or
/// placeholder row. Concrete pair rows pass through and override expanded
/// rows for the same triple; negated rows never appear in the output.
pub fn expand(entries: &[Entry], known_layers: &[String], scope: Scope<'_>) -> Vec<Entry> {
    let mut resolved: IndexMap<EntryId, Entry> = IndexMap::new();

    for layer in layers_to_expand(entries, known_layers, scope.layer_id) {
        expand_layer(entries, layer, &mut resolved);
    }

    for entry in entries
        .iter()
        .filter(|e| !e.has_wildcard_layer() && e.is_pair_row())
    {
        if entry.negate {
            resolved.shift_remove(&entry.id());
        } else {
            resolved.insert(entry.id(), entry.clone());
        }
    }

    let mut result: Vec<Entry> = resolved
        .into_values()
        .filter(|entry| scope.admits(entry))
        .collect();
    sort_entries(&mut result);
    result
}

/// Deterministic order: layer, then area, then filter
pub fn sort_entries(entries: &mut [Entry]) {
    entries.sort_by(|a, b| {
        a.layer_id
            .cmp(&b.layer_id)
            .then_with(|| a.area_id.cmp(&b.area_id))
            .then_with(|| a.filter_id.cmp(&b.filter_id))
            .then_with(|| a.key().cmp(&b.key()))
    });
}

fn layers_to_expand<'a>(
    entries: &'a [Entry],
    known_layers: &'a [String],
    pinned: Option<&'a str>,
) -> Vec<&'a str> {
    if let Some(layer) = pinned {
        return vec![layer];
    }

    let mut layers: IndexSet<&str> = known_layers.iter().map(String::as_str).collect();
    for entry in entries {
        if !entry.has_wildcard_layer() && !entry.is_pair_row() {
            layers.insert(&entry.layer_id);
        }
    }
    layers.into_iter().collect()
}

fn expand_layer(entries: &[Entry], layer: &str, resolved: &mut IndexMap<EntryId, Entry>) {
    let mut areas: IndexMap<&str, &Entry> = IndexMap::new();
    let mut filters: IndexMap<&str, FilterSlot<'_>> = IndexMap::new();
    let mut pairs: Vec<&Entry> = Vec::new();
    let mut negated_areas: Vec<&str> = Vec::new();
    let mut negated_filters: Vec<&str> = Vec::new();

    // Wildcard-layer rows first so this layer's own rows win
    for entry in entries.iter().filter(|e| e.has_wildcard_layer() && !e.negate) {
        if entry.is_area_row() {
            areas.insert(&entry.area_id, entry);
        } else if entry.is_filter_row() {
            filters.insert(&entry.filter_id, FilterSlot { entry, inherited: true });
        } else if entry.is_pair_row() {
            pairs.push(entry);
        }
    }

    for entry in entries.iter().filter(|e| e.layer_id == layer) {
        if entry.is_area_row() {
            if entry.negate {
                areas.shift_remove(entry.area_id.as_str());
                negated_areas.push(&entry.area_id);
            } else {
                areas.insert(&entry.area_id, entry);
            }
        } else if entry.is_filter_row() {
            if entry.negate {
                filters.shift_remove(entry.filter_id.as_str());
                negated_filters.push(&entry.filter_id);
            } else {
                filters.insert(&entry.filter_id, FilterSlot { entry, inherited: false });
            }
        }
    }

    // One AND filter of the layer's own puts inherited filters in the AND group too
    let layer_is_and = filters
        .values()
        .any(|slot| !slot.inherited && slot.entry.filter_group);
    let group_of =
        |slot: &FilterSlot<'_>| slot.entry.filter_group || (slot.inherited && layer_is_and);

    let mut push = |entry: Entry| {
        resolved.insert(entry.id(), entry);
    };

    match (areas.is_empty(), filters.is_empty()) {
        (false, false) => {
            for area in areas.values() {
                for slot in filters.values() {
                    push(Entry {
                        layer_id: layer.to_string(),
                        area_id: area.area_id.clone(),
                        filter_id: slot.entry.filter_id.clone(),
                        include_area: area.include_area,
                        filter_group: group_of(slot),
                        negate: false,
                    });
                }
            }
        }
        (false, true) => {
            for area in areas.values() {
                push(area.for_layer(layer));
            }
        }
        (true, false) => {
            for slot in filters.values() {
                push(Entry {
                    layer_id: layer.to_string(),
                    area_id: WILDCARD.to_string(),
                    filter_id: slot.entry.filter_id.clone(),
                    include_area: slot.entry.include_area,
                    filter_group: group_of(slot),
                    negate: false,
                });
            }
        }
        (true, true) => {}
    }

    for pair in pairs {
        if negated_areas.contains(&pair.area_id.as_str())
            || negated_filters.contains(&pair.filter_id.as_str())
        {
            continue;
        }
        push(pair.for_layer(layer));
    }
}

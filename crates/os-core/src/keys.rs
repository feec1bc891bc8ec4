//! Hashing and key helpers shared by both engines

/// Sentinel id meaning "every concrete value of this field".
pub const WILDCARD: &str = "*";

/// Separator between layer and column in a column hash.
///
/// Layer and column names are assumed not to contain it.
pub const COLUMN_HASH_SEPARATOR: char = '#';

/// Whether an id is the wildcard sentinel
pub fn is_wildcard(id: &str) -> bool {
    id == WILDCARD
}

/// Reverse index key for a (layer, column) pair, e.g. `L1#C1`
pub fn hash_column(layer: &str, column: &str) -> String {
    let mut hash = String::with_capacity(layer.len() + column.len() + 1);
    hash.push_str(layer);
    hash.push(COLUMN_HASH_SEPARATOR);
    hash.push_str(column);
    hash
}

/// Identity key of a resolved query entry: `layer|area|filter|includeArea|filterGroup`
pub fn entry_key(
    layer_id: &str,
    area_id: &str,
    filter_id: &str,
    include_area: bool,
    filter_group: bool,
) -> String {
    format!("{layer_id}|{area_id}|{filter_id}|{include_area}|{filter_group}")
}

//! Query entry rows

use serde::{Deserialize, Serialize};
use os_core::keys::{entry_key, is_wildcard, WILDCARD};

/// One row of the query table
///
/// Any of the three ids may be the wildcard `*`. Serializes with the
/// camelCase field names used by persisted query state, so the sentinel
/// survives a round trip.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    pub layer_id: String,
    pub area_id: String,
    pub filter_id: String,

    /// Inclusion (spatial AND) when true, exclusion (spatial NOT) when false
    #[serde(default = "default_true")]
    pub include_area: bool,

    /// Filter joins the layer's AND group when true, the OR group when false
    #[serde(default = "default_true")]
    pub filter_group: bool,

    /// Cancels what a wildcard row would otherwise produce for this layer
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub negate: bool,
}

fn default_true() -> bool {
    true
}

/// Identity of a row in the table
pub type EntryId = (String, String, String);

impl Entry {
    /// New inclusion row in the AND group
    pub fn new(
        layer_id: impl Into<String>,
        area_id: impl Into<String>,
        filter_id: impl Into<String>,
    ) -> Self {
        Self {
            layer_id: layer_id.into(),
            area_id: area_id.into(),
            filter_id: filter_id.into(),
            include_area: true,
            filter_group: true,
            negate: false,
        }
    }

    pub fn include_area(mut self, include_area: bool) -> Self {
        self.include_area = include_area;
        self
    }

    pub fn filter_group(mut self, filter_group: bool) -> Self {
        self.filter_group = filter_group;
        self
    }

    pub fn negated(mut self) -> Self {
        self.negate = true;
        self
    }

    pub fn id(&self) -> EntryId {
        (self.layer_id.clone(), self.area_id.clone(), self.filter_id.clone())
    }

    /// `layer|area|filter|includeArea|filterGroup`
    pub fn key(&self) -> String {
        entry_key(
            &self.layer_id,
            &self.area_id,
            &self.filter_id,
            self.include_area,
            self.filter_group,
        )
    }

    pub fn has_wildcard_layer(&self) -> bool {
        is_wildcard(&self.layer_id)
    }

    /// Concrete area with any filter
    pub fn is_area_row(&self) -> bool {
        !is_wildcard(&self.area_id) && is_wildcard(&self.filter_id)
    }

    /// Concrete filter with any area
    pub fn is_filter_row(&self) -> bool {
        is_wildcard(&self.area_id) && !is_wildcard(&self.filter_id)
    }

    /// Concrete area and concrete filter
    pub fn is_pair_row(&self) -> bool {
        !is_wildcard(&self.area_id) && !is_wildcard(&self.filter_id)
    }

    /// Neither area nor filter is set; the row only marks the layer
    pub fn is_placeholder(&self) -> bool {
        is_wildcard(&self.area_id) && is_wildcard(&self.filter_id)
    }

    /// Copy of this row bound to a concrete layer
    pub(crate) fn for_layer(&self, layer_id: &str) -> Self {
        Self {
            layer_id: layer_id.to_string(),
            ..self.clone()
        }
    }

    /// Exact field match used by removal and the raw view.
    /// `None` does not filter; `Some("*")` only matches a literal wildcard.
    pub(crate) fn matches_exact(
        &self,
        layer_id: Option<&str>,
        area_id: Option<&str>,
        filter_id: Option<&str>,
    ) -> bool {
        layer_id.map_or(true, |id| self.layer_id == id)
            && area_id.map_or(true, |id| self.area_id == id)
            && filter_id.map_or(true, |id| self.filter_id == id)
    }
}

impl Default for Entry {
    fn default() -> Self {
        Self::new(WILDCARD, WILDCARD, WILDCARD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_and_key() {
        let entry = Entry::new("A", "box", "*");
        assert!(entry.include_area);
        assert!(entry.filter_group);
        assert!(!entry.negate);
        assert!(entry.is_area_row());
        assert_eq!(entry.key(), "A|box|*|true|true");

        let entry = Entry::new("A", "*", "F1").filter_group(false);
        assert!(entry.is_filter_row());
        assert_eq!(entry.key(), "A|*|F1|true|false");
    }

    #[test]
    fn test_serde_uses_persisted_field_names() {
        let entry: Entry = serde_json::from_str(
            r#"{"layerId":"A","areaId":"box","filterId":"*","includeArea":true,
                "filterGroup":true,"negate":true}"#,
        )
        .unwrap();
        assert_eq!(entry, Entry::new("A", "box", "*").negated());

        let entry: Entry = serde_json::from_str(
            r#"{"layerId":"*","areaId":"circle","filterId":"*","includeArea":false}"#,
        )
        .unwrap();
        assert!(!entry.include_area);
        assert!(entry.filter_group);

        let json = serde_json::to_value(Entry::new("*", "box", "*")).unwrap();
        assert_eq!(json["layerId"], "*");
        assert!(json.get("negate").is_none());
    }

    #[test]
    fn test_matches_exact_treats_wildcard_literally() {
        let wildcard_layer = Entry::new("*", "box", "*");
        let concrete_layer = Entry::new("A", "box", "*");

        assert!(wildcard_layer.matches_exact(Some("*"), Some("box"), None));
        assert!(!concrete_layer.matches_exact(Some("*"), Some("box"), None));
        assert!(concrete_layer.matches_exact(None, Some("box"), None));
    }
}

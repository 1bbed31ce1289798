//! The item template, the central entity of a solution.
//!
//! A template is a de-identified recipe for recreating one item: its metadata
//! (`item`), its type-specific payload (`data`), the auxiliary files that were
//! copied alongside it (`resources`), and the ids of the items it references
//! (`dependencies`). Concrete identifiers inside `item` and `data` are replaced
//! with `{{<key>.<suffix>}}` placeholders at creation time; see
//! [`crate::templating`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Default estimate of API calls needed to deploy one item.
pub const DEFAULT_DEPLOYMENT_COST: u32 = 3;

/// A folder/filename pair identifying a copied auxiliary file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourcePath {
    /// Folder inside the item's resource store, `None` for the root
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,
    /// File name
    pub filename: String,
}

impl ResourcePath {
    /// Create a resource path.
    pub fn new(folder: Option<&str>, filename: impl Into<String>) -> Self {
        Self {
            folder: folder.filter(|f| !f.is_empty()).map(str::to_string),
            filename: filename.into(),
        }
    }

    /// Parse `folder/file` (or `file`) into a resource path.
    #[must_use]
    pub fn parse(path: &str) -> Self {
        match path.rsplit_once('/') {
            Some((folder, file)) => Self::new(Some(folder), file),
            None => Self::new(None, path),
        }
    }

    /// The `folder/file` form of this path.
    #[must_use]
    pub fn path(&self) -> String {
        match &self.folder {
            Some(folder) => format!("{folder}/{}", self.filename),
            None => self.filename.clone(),
        }
    }

    /// Same path nested under `prefix`, as stored inside a solution item.
    #[must_use]
    pub fn prefixed(&self, prefix: &str) -> Self {
        let folder = match &self.folder {
            Some(folder) => format!("{prefix}/{folder}"),
            None => prefix.to_string(),
        };
        Self {
            folder: Some(folder),
            filename: self.filename.clone(),
        }
    }
}

/// A de-identified, placeholder-bearing recipe for recreating one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemTemplate {
    /// Source-system identifier
    pub item_id: String,
    /// Item type, e.g. "Feature Service", "Web Map", "Group"
    #[serde(rename = "type")]
    pub item_type: String,
    /// Synthetic placeholder namespace root, distinct from `item_id`
    pub key: String,
    /// Item metadata fields
    #[serde(default)]
    pub item: Map<String, Value>,
    /// Type-specific payload
    #[serde(default)]
    pub data: Value,
    /// Type-specific extra information captured at creation (service definitions, ...)
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub properties: Value,
    /// Copied auxiliary files
    #[serde(default)]
    pub resources: Vec<ResourcePath>,
    /// Ids of items this item references, unique, never its own id
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Estimated number of API calls needed to deploy this item
    #[serde(default = "default_cost")]
    pub estimated_deployment_cost_factor: u32,
}

const fn default_cost() -> u32 {
    DEFAULT_DEPLOYMENT_COST
}

impl ItemTemplate {
    /// Create an empty template for `item_id` under placeholder root `key`.
    pub fn new(item_id: impl Into<String>, item_type: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            item_id: item_id.into(),
            item_type: item_type.into(),
            key: key.into(),
            item: Map::new(),
            data: Value::Null,
            properties: Value::Null,
            resources: Vec::new(),
            dependencies: Vec::new(),
            estimated_deployment_cost_factor: DEFAULT_DEPLOYMENT_COST,
        }
    }

    /// Add a dependency, keeping the list unique and in first-seen order.
    ///
    /// Returns `true` if the id was not already present.
    pub fn add_dependency(&mut self, item_id: impl Into<String>) -> bool {
        let item_id = item_id.into();
        if self.dependencies.contains(&item_id) {
            return false;
        }
        self.dependencies.push(item_id);
        true
    }

    /// Title from the item metadata, falling back to the item id.
    #[must_use]
    pub fn title(&self) -> &str {
        self.item.get("title").and_then(Value::as_str).unwrap_or(&self.item_id)
    }

    /// Whether this template is of the given type (case-insensitive).
    #[must_use]
    pub fn is_type(&self, item_type: &str) -> bool {
        self.item_type.eq_ignore_ascii_case(item_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_path_parse_and_prefix() {
        let path = ResourcePath::parse("images/logo.png");
        assert_eq!(path.folder.as_deref(), Some("images"));
        assert_eq!(path.filename, "logo.png");
        assert_eq!(path.prefixed("abc").path(), "abc/images/logo.png");

        let root = ResourcePath::parse("thumbnail.png");
        assert!(root.folder.is_none());
        assert_eq!(root.prefixed("abc").path(), "abc/thumbnail.png");
    }

    #[test]
    fn test_add_dependency_is_unique_and_ordered() {
        let mut template = ItemTemplate::new("a", "Web Map", "k1");
        assert!(template.add_dependency("c"));
        assert!(template.add_dependency("b"));
        assert!(!template.add_dependency("c"));
        assert_eq!(template.dependencies, vec!["c", "b"]);
    }

    #[test]
    fn test_serde_uses_camel_case_wire_names() {
        let template = ItemTemplate::new("a", "Web Map", "k1");
        let json = serde_json::to_value(&template).unwrap();
        assert_eq!(json["itemId"], "a");
        assert_eq!(json["type"], "Web Map");
        assert_eq!(json["estimatedDeploymentCostFactor"], DEFAULT_DEPLOYMENT_COST);

        let back: ItemTemplate = serde_json::from_value(serde_json::json!({
            "itemId": "b", "type": "Group", "key": "k2"
        }))
        .unwrap();
        assert_eq!(back.estimated_deployment_cost_factor, DEFAULT_DEPLOYMENT_COST);
        assert!(back.dependencies.is_empty());
    }
}

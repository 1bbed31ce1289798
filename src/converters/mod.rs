//! Type-specific item converters.
//!
//! A converter knows how to turn one kind of portal item into an
//! [`ItemTemplate`] (fetching its type-specific data and declaring the ids it
//! references) and how to recreate the item from that template in a
//! destination portal.
//!
//! The resolver and the replayer dispatch through a [`ConverterRegistry`]
//! keyed by lower-cased item type. A type registered without a converter, or
//! not registered at all, is *unsupported*: it is skipped with a warning, never
//! treated as an error.
//!
//! | Type | Converter |
//! |---|---|
//! | Group | [`GroupConverter`] |
//! | Feature Service | [`FeatureServiceConverter`] |
//! | Web Map | [`WebMapConverter`] |
//! | Web Mapping Application | [`WebAppConverter`] |
//! | Dashboard | [`DashboardConverter`] |
//! | documents, images, templates | [`SimpleConverter`] |

pub mod dashboard;
pub mod feature_service;
pub mod group;
pub mod simple;
pub mod web_app;
pub mod web_map;

pub use dashboard::DashboardConverter;
pub use feature_service::FeatureServiceConverter;
pub use group::GroupConverter;
pub use simple::SimpleConverter;
pub use web_app::WebAppConverter;
pub use web_map::WebMapConverter;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::sync::Arc;

use crate::core::{ItemTemplate, SolutionError, item_type};
use crate::portal::{CreateItemRequest, PortalReader, PortalWriter};
use crate::resolver::TemplateStore;
use crate::templating::{TemplateDictionary, detemplatize};

/// Item metadata fields carried into a template.
///
/// Everything else (`id`, `owner`, timestamps, sharing, usage counters) is
/// specific to the source item and is dropped.
pub const ITEM_FIELDS: &[&str] = &[
    "title",
    "type",
    "typeKeywords",
    "description",
    "snippet",
    "tags",
    "extent",
    "accessInformation",
    "licenseInfo",
    "culture",
    "properties",
    "url",
    "name",
    "spatialReference",
    "categories",
];

/// Everything a converter needs while building a template.
pub struct ConvertContext<'a> {
    /// Source portal
    pub reader: &'a dyn PortalReader,
    /// Store of the current resolution run
    pub store: &'a TemplateStore,
}

impl ConvertContext<'_> {
    /// Template key for a source item id.
    pub fn key_for(&self, item_id: &str) -> String {
        self.store.key_for(item_id)
    }

    /// Base url of the source portal.
    pub fn portal_url(&self) -> &str {
        self.reader.portal_url()
    }
}

/// Everything a converter needs while recreating an item.
pub struct DeployContext<'a> {
    /// Destination portal
    pub writer: &'a dyn PortalWriter,
    /// Dictionary as of the start of this template's creation
    pub dictionary: &'a TemplateDictionary,
    /// Destination folder
    pub folder_id: Option<&'a str>,
    /// Source id → destination id of every item created so far
    pub created: &'a HashMap<String, String>,
}

impl DeployContext<'_> {
    /// Resolve every placeholder in `value` against the dictionary.
    pub fn detemplatize(&self, value: &Value, item_id: &str) -> Result<Value> {
        detemplatize(value, self.dictionary, item_id)
    }

    /// Resolve placeholders, additionally allowing references to the item
    /// being created under `key`.
    ///
    /// Used for self-references (an app url containing its own id) that can
    /// only be resolved once the new id exists. The shared dictionary is not
    /// modified; the replayer records the entry after creation settles.
    pub fn detemplatize_with_self(&self, value: &Value, item_id: &str, key: &str, own: &Value) -> Result<Value> {
        let mut local = self.dictionary.clone();
        local.seed(key, own.clone());
        detemplatize(value, &local, item_id)
    }

    /// Resolve the template's metadata fields.
    pub fn item_fields(&self, template: &ItemTemplate) -> Result<Map<String, Value>> {
        match self.detemplatize(&Value::Object(template.item.clone()), &template.item_id)? {
            Value::Object(map) => Ok(map),
            _ => Err(SolutionError::InvalidTemplate {
                item_id: template.item_id.clone(),
                reason: "item metadata is not an object".to_string(),
            }
            .into()),
        }
    }
}

/// What a converter reports after creating an item.
#[derive(Debug, Clone, PartialEq)]
pub struct CreatedItem {
    /// Destination item id
    pub item_id: String,
    /// Item type of the new item
    pub item_type: String,
    /// Value recorded in the dictionary under the template's key; always an
    /// object with at least `itemId`
    pub dictionary_value: Value,
}

impl CreatedItem {
    /// A created item whose dictionary value is just `{itemId}`.
    pub fn new(item_id: impl Into<String>, item_type: impl Into<String>) -> Self {
        let item_id = item_id.into();
        Self {
            dictionary_value: json!({ "itemId": item_id }),
            item_id,
            item_type: item_type.into(),
        }
    }
}

/// Capability implemented once per supported item type.
#[async_trait]
pub trait ItemConverter: Send + Sync {
    /// Build a populated template from the raw item metadata.
    ///
    /// The returned template's `dependencies` lists every id its payload
    /// references. The resolver templatizes those ids and rejects a template
    /// that lists its own id.
    async fn convert_item_to_template(&self, ctx: &ConvertContext<'_>, item: Value) -> Result<ItemTemplate>;

    /// Recreate the item in the destination portal.
    async fn create_item_from_template(
        &self,
        ctx: &DeployContext<'_>,
        template: &ItemTemplate,
    ) -> Result<CreatedItem>;
}

/// Start a template from raw item metadata, keeping only [`ITEM_FIELDS`].
pub fn base_template(ctx: &ConvertContext<'_>, item: &Value, item_type: &str) -> Result<ItemTemplate> {
    let item_id = item.get("id").and_then(Value::as_str).ok_or_else(|| SolutionError::InvalidTemplate {
        item_id: "<unknown>".to_string(),
        reason: "item metadata has no id".to_string(),
    })?;
    let mut template = ItemTemplate::new(item_id, item_type, ctx.key_for(item_id));
    if let Some(source) = item.as_object() {
        template.item = ITEM_FIELDS
            .iter()
            .filter_map(|field| source.get(*field).filter(|v| !v.is_null()).map(|v| (field.to_string(), v.clone())))
            .collect();
    }
    template.item.insert("type".to_string(), Value::String(item_type.to_string()));
    Ok(template)
}

/// Create an item from the template's metadata and data, unchanged apart
/// from placeholder resolution.
pub async fn create_plain_item(ctx: &DeployContext<'_>, template: &ItemTemplate) -> Result<String> {
    let item = ctx.item_fields(template)?;
    let data = if template.data.is_null() {
        None
    } else {
        Some(ctx.detemplatize(&template.data, &template.item_id)?)
    };
    ctx.writer
        .create_item(CreateItemRequest {
            item,
            data,
            folder: ctx.folder_id.map(str::to_string),
        })
        .await
}

/// Maps lower-cased item types to converters.
///
/// A `None` entry marks a known type as deliberately unsupported.
#[derive(Clone, Default)]
pub struct ConverterRegistry {
    converters: HashMap<String, Option<Arc<dyn ItemConverter>>>,
}

impl ConverterRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in converters.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(item_type::GROUP, Arc::new(GroupConverter));
        registry.register(item_type::FEATURE_SERVICE, Arc::new(FeatureServiceConverter));
        registry.register(item_type::WEB_MAP, Arc::new(WebMapConverter));
        registry.register(item_type::WEB_MAPPING_APPLICATION, Arc::new(WebAppConverter));
        registry.register(item_type::DASHBOARD, Arc::new(DashboardConverter));
        let simple: Arc<dyn ItemConverter> = Arc::new(SimpleConverter);
        for name in item_type::PASS_THROUGH_TYPES {
            registry.register(name, Arc::clone(&simple));
        }
        for name in item_type::UNSUPPORTED_TYPES {
            registry.register_unsupported(name);
        }
        registry
    }

    /// Register (or replace) the converter for an item type.
    pub fn register(&mut self, item_type: &str, converter: Arc<dyn ItemConverter>) {
        self.converters.insert(item_type::type_key(item_type), Some(converter));
    }

    /// Mark an item type as known but unsupported.
    pub fn register_unsupported(&mut self, item_type: &str) {
        self.converters.insert(item_type::type_key(item_type), None);
    }

    /// Converter for `item_type`; `None` means unsupported.
    #[must_use]
    pub fn get(&self, item_type: &str) -> Option<Arc<dyn ItemConverter>> {
        self.converters.get(&item_type::type_key(item_type)).cloned().flatten()
    }

    /// Whether the type has an entry at all (supported or not).
    #[must_use]
    pub fn is_known(&self, item_type: &str) -> bool {
        self.converters.contains_key(&item_type::type_key(item_type))
    }
}

impl std::fmt::Debug for ConverterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<&String> = self.converters.keys().collect();
        types.sort();
        f.debug_struct("ConverterRegistry").field("types", &types).finish()
    }
}

/// Collect every string value stored under `key` anywhere in `value`.
pub(crate) fn collect_strings(value: &Value, key: &str, out: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for (name, child) in map {
                match child {
                    Value::String(s) if name == key && !s.is_empty() => {
                        if !out.contains(s) {
                            out.push(s.clone());
                        }
                    }
                    _ => collect_strings(child, key, out),
                }
            }
        }
        Value::Array(items) => {
            for child in items {
                collect_strings(child, key, out);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_lookup_is_case_insensitive() {
        let registry = ConverterRegistry::with_defaults();
        assert!(registry.get("web map").is_some());
        assert!(registry.get("FEATURE SERVICE").is_some());
        assert!(registry.get("PDF").is_some());
    }

    #[test]
    fn test_unsupported_and_unknown_types_have_no_converter() {
        let registry = ConverterRegistry::with_defaults();
        assert!(registry.is_known("Geoprocessing Service"));
        assert!(registry.get("Geoprocessing Service").is_none());
        assert!(!registry.is_known("Mystery Item"));
        assert!(registry.get("Mystery Item").is_none());
    }

    #[test]
    fn test_collect_strings() {
        let value = json!({
            "widgets": [
                {"type": "mapWidget", "itemId": "m1"},
                {"datasets": [{"dataSource": {"itemId": "fs1"}}, {"dataSource": {"itemId": "m1"}}]}
            ]
        });
        let mut ids = Vec::new();
        collect_strings(&value, "itemId", &mut ids);
        assert_eq!(ids, vec!["m1", "fs1"]);
    }
}

//! Datasource-aware field templatizing.
//!
//! Feature services can be renamed or re-created with adjusted field names in
//! the destination, so payloads that mention field names (web map popups,
//! renderers, definition expressions, dashboard statistics, app search
//! settings) are rewritten to `{{<fsKey>.layer<N>.fields.<field>.name}}`.
//!
//! To rewrite a field reference against the *correct* layer, each feature
//! service layer/table is captured as a [`DatasourceInfo`]. Web map
//! operational layers that point at the layer, either through an
//! `{{<key>.layer<N>.url}}` url or through an `{{<key>.itemId}}` plus `layerId`
//! pair, contribute their map-layer ids, which lets dashboards and apps that
//! reference a map layer id be traced back to the service layer.

use anyhow::Result;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::LazyLock;
use tracing::debug;

use super::{Suffix, is_placeholder_segment, parse_item_id_placeholder, parse_layer_url_placeholder, placeholder};
use crate::core::{ItemTemplate, item_type};

/// Object keys whose string value is exactly one field name.
const FIELD_NAME_KEYS: &[&str] = &[
    "field",
    "field1",
    "field2",
    "field3",
    "fieldName",
    "normalizationField",
    "rotationField",
    "onStatisticField",
    "categoryField",
    "valueField",
    "labelField",
    "idField",
    "dateField",
    "sortField",
    "displayField",
    "objectIdField",
];

/// Object keys whose string value is an expression mentioning fields by bare name.
const EXPRESSION_KEYS: &[&str] =
    &["definitionExpression", "labelExpression", "expression", "where", "whereClause", "valueExpression"];

/// Object keys whose string value is display text mentioning fields as `{FIELD}`.
const TEXT_KEYS: &[&str] = &["title", "description", "text", "content", "labelPlaceholder"];

static EXISTING_PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{[^{}]*\}\}").expect("placeholder span pattern is valid"));

/// Per-layer metadata of a feature service template.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasourceInfo {
    /// Source item id of the feature service
    pub item_id: String,
    /// Template key of the feature service
    pub key: String,
    /// Layer or table id within the service
    pub layer_id: u64,
    /// Field names as they appear in the source layer
    pub fields: Vec<String>,
    /// Relationship definitions of the layer
    pub relationships: Vec<Value>,
    /// Ids of web map operational layers that draw from this layer
    pub map_layer_ids: Vec<String>,
}

impl DatasourceInfo {
    /// `{{<key>.layer<N>.url}}` for this layer.
    #[must_use]
    pub fn url_placeholder(&self) -> String {
        placeholder(&self.key, Suffix::LayerUrl(self.layer_id))
    }

    /// Placeholder for `field` if it belongs to this layer (case-insensitive).
    #[must_use]
    pub fn field_placeholder(&self, field: &str) -> Option<String> {
        self.fields.iter().find(|f| f.eq_ignore_ascii_case(field)).map(|_| {
            placeholder(
                &self.key,
                Suffix::LayerField {
                    layer: self.layer_id,
                    field,
                },
            )
        })
    }

    fn field_alternation(&self) -> Option<String> {
        if self.fields.is_empty() {
            return None;
        }
        let mut names: Vec<&String> = self.fields.iter().collect();
        names.sort_by(|a, b| b.len().cmp(&a.len()));
        Some(names.iter().map(|f| regex::escape(f)).collect::<Vec<_>>().join("|"))
    }
}

/// Collect one [`DatasourceInfo`] per layer and table of every feature
/// service template.
///
/// Layers are read from `properties.layers` / `properties.tables`, as captured
/// by the feature service converter.
#[must_use]
pub fn collect_datasources(templates: &[ItemTemplate]) -> Vec<DatasourceInfo> {
    let mut datasources = Vec::new();
    for template in templates.iter().filter(|t| t.is_type(item_type::FEATURE_SERVICE)) {
        for section in ["layers", "tables"] {
            let Some(layers) = template.properties.get(section).and_then(Value::as_array) else {
                continue;
            };
            for layer in layers {
                let Some(layer_id) = layer.get("id").and_then(Value::as_u64) else {
                    continue;
                };
                let fields = layer
                    .get("fields")
                    .and_then(Value::as_array)
                    .map(|fields| {
                        fields
                            .iter()
                            .filter_map(|f| f.get("name").and_then(Value::as_str))
                            .filter(|name| {
                                let usable = is_placeholder_segment(name);
                                if !usable {
                                    debug!(
                                        "Field '{}' of '{}' layer {} cannot be templatized; references keep its name",
                                        name, template.item_id, layer_id
                                    );
                                }
                                usable
                            })
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default();
                let relationships =
                    layer.get("relationships").and_then(Value::as_array).cloned().unwrap_or_default();
                datasources.push(DatasourceInfo {
                    item_id: template.item_id.clone(),
                    key: template.key.clone(),
                    layer_id,
                    fields,
                    relationships,
                    map_layer_ids: Vec::new(),
                });
            }
        }
    }
    datasources
}

/// Attach the ids of web map operational layers to the datasources they draw from.
pub fn attach_map_layer_ids(datasources: &mut [DatasourceInfo], templates: &[ItemTemplate]) {
    for template in templates.iter().filter(|t| t.is_type(item_type::WEB_MAP)) {
        for layer in map_layers(&template.data) {
            let Some(layer_id) = layer.get("id").and_then(Value::as_str) else {
                continue;
            };
            if let Some(index) = find_layer_datasource(datasources, layer)
                && !datasources[index].map_layer_ids.iter().any(|id| id == layer_id)
            {
                datasources[index].map_layer_ids.push(layer_id.to_string());
            }
        }
    }
}

/// Rewrite field references in web maps, dashboards and web mapping
/// applications to field placeholders of the datasource they belong to.
///
/// Runs after every template has been resolved and id/url templatized.
pub fn templatize_field_references(templates: &mut [ItemTemplate]) -> Result<()> {
    let mut datasources = collect_datasources(templates);
    if datasources.is_empty() {
        return Ok(());
    }
    attach_map_layer_ids(&mut datasources, templates);

    let mut patterns: HashMap<usize, FieldPatterns> = HashMap::new();
    for (index, ds) in datasources.iter().enumerate() {
        if let Some(p) = FieldPatterns::new(ds)? {
            patterns.insert(index, p);
        }
    }

    for template in templates.iter_mut() {
        if template.is_type(item_type::WEB_MAP) {
            for section in ["operationalLayers", "tables"] {
                let Some(layers) = template.data.get_mut(section).and_then(Value::as_array_mut) else {
                    continue;
                };
                for layer in layers {
                    if let Some(index) = find_layer_datasource(&datasources, layer)
                        && let Some(p) = patterns.get(&index)
                    {
                        rewrite_fields(layer, &datasources[index], p);
                    }
                }
            }
        } else if template.is_type(item_type::DASHBOARD) || template.is_type(item_type::WEB_MAPPING_APPLICATION) {
            rewrite_referencing_objects(&mut template.data, &datasources, &patterns);
        }
    }
    Ok(())
}

/// Operational layers and tables of a web map payload.
fn map_layers(data: &Value) -> impl Iterator<Item = &Value> {
    ["operationalLayers", "tables"]
        .into_iter()
        .filter_map(|section| data.get(section).and_then(Value::as_array))
        .flatten()
}

/// Locate the datasource a web map layer draws from.
fn find_layer_datasource(datasources: &[DatasourceInfo], layer: &Value) -> Option<usize> {
    if let Some((key, layer_id)) = layer.get("url").and_then(Value::as_str).and_then(parse_layer_url_placeholder) {
        return datasources.iter().position(|ds| ds.key == key && ds.layer_id == layer_id);
    }
    let key = layer.get("itemId").and_then(Value::as_str).and_then(parse_item_id_placeholder)?;
    let layer_id = layer.get("layerId").and_then(value_as_u64).unwrap_or(0);
    datasources.iter().position(|ds| ds.key == key && ds.layer_id == layer_id)
}

/// Walk a dashboard or app payload and rewrite fields inside every object that
/// references a datasource, either by `{{key.itemId}}` + `layerId` or by a
/// web map layer id.
fn rewrite_referencing_objects(
    value: &mut Value,
    datasources: &[DatasourceInfo],
    patterns: &HashMap<usize, FieldPatterns>,
) {
    match value {
        Value::Object(map) => {
            if let Some(index) = referenced_datasource(map, datasources)
                && let Some(p) = patterns.get(&index)
            {
                // The owning object (widget, dataset, search layer) carries the field settings.
                rewrite_fields_map(map, &datasources[index], p);
                return;
            }
            for child in map.values_mut() {
                rewrite_referencing_objects(child, datasources, patterns);
            }
        }
        Value::Array(items) => {
            for child in items {
                rewrite_referencing_objects(child, datasources, patterns);
            }
        }
        _ => {}
    }
}

fn referenced_datasource(map: &Map<String, Value>, datasources: &[DatasourceInfo]) -> Option<usize> {
    // Dashboards nest the reference in a `dataSource` object.
    let source = map.get("dataSource").and_then(Value::as_object).unwrap_or(map);
    if let Some(key) = source.get("itemId").and_then(Value::as_str).and_then(parse_item_id_placeholder) {
        let layer_id = source.get("layerId").and_then(value_as_u64).unwrap_or(0);
        if let Some(index) = datasources.iter().position(|ds| ds.key == key && ds.layer_id == layer_id) {
            return Some(index);
        }
    }
    let map_layer_id = source
        .get("layerId")
        .and_then(Value::as_str)
        .or_else(|| map.get("id").and_then(Value::as_str))?;
    // Dashboards qualify map layers as `<widgetId>#<layerId>`.
    let map_layer_id = map_layer_id.rsplit_once('#').map_or(map_layer_id, |(_, layer)| layer);
    datasources.iter().position(|ds| ds.map_layer_ids.iter().any(|id| id == map_layer_id))
}

fn value_as_u64(value: &Value) -> Option<u64> {
    value.as_u64().or_else(|| value.as_str().and_then(|s| s.parse().ok()))
}

/// Precompiled matchers for one datasource's field names.
struct FieldPatterns {
    /// Bare field names on word boundaries
    bare: Regex,
    /// `{FIELD}` tokens in display text
    braced: Regex,
}

impl FieldPatterns {
    fn new(ds: &DatasourceInfo) -> Result<Option<Self>> {
        let Some(alternation) = ds.field_alternation() else {
            return Ok(None);
        };
        Ok(Some(Self {
            bare: Regex::new(&format!(r"(?i)\b({alternation})\b"))?,
            braced: Regex::new(&format!(r"(?i)\{{({alternation})\}}"))?,
        }))
    }
}

fn rewrite_fields(value: &mut Value, ds: &DatasourceInfo, patterns: &FieldPatterns) {
    match value {
        Value::Object(map) => rewrite_fields_map(map, ds, patterns),
        Value::Array(items) => {
            for item in items {
                rewrite_fields(item, ds, patterns);
            }
        }
        _ => {}
    }
}

fn rewrite_fields_map(map: &mut Map<String, Value>, ds: &DatasourceInfo, patterns: &FieldPatterns) {
    for (key, child) in map.iter_mut() {
        let key = key.as_str();
        match child {
            Value::String(text) if FIELD_NAME_KEYS.contains(&key) => {
                if let Some(replacement) = ds.field_placeholder(text) {
                    *text = replacement;
                }
            }
            Value::String(text) if EXPRESSION_KEYS.contains(&key) => {
                *text = replace_outside_placeholders(text, &patterns.bare, ds, false);
            }
            Value::String(text) if TEXT_KEYS.contains(&key) => {
                *text = replace_outside_placeholders(text, &patterns.braced, ds, true);
            }
            Value::Object(_) | Value::Array(_) => rewrite_fields(child, ds, patterns),
            _ => {}
        }
    }
}

/// Apply a field regex to the parts of `text` that are not already placeholders.
fn replace_outside_placeholders(text: &str, re: &Regex, ds: &DatasourceInfo, braced: bool) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    let spans = EXISTING_PLACEHOLDER_RE.find_iter(text).map(|m| (m.start(), m.end()));
    for (start, end) in spans.chain(std::iter::once((text.len(), text.len()))) {
        let segment = &text[last..start];
        out.push_str(&re.replace_all(segment, |caps: &regex::Captures<'_>| {
            let name = &caps[1];
            match ds.field_placeholder(name) {
                Some(p) if braced => format!("{{{p}}}"),
                Some(p) => p,
                None => caps[0].to_string(),
            }
        }));
        out.push_str(&text[start..end]);
        last = end;
    }
    out
}

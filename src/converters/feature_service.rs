//! Hosted feature services.
//!
//! The service definition (layers and tables with their fields and
//! relationships) is captured into the template's `properties`, which is
//! where the datasource-aware field pass reads it from. The service url is
//! templatized to `{{<key>.url}}` and layer urls to `{{<key>.layer<N>.url}}`.
//!
//! At deploy the service is created empty, its layers are added, and the
//! dictionary value published for the key carries the new url and a
//! `layer<N>` entry per layer:
//!
//! ```json
//! {"itemId": "...", "url": "...", "name": "...",
//!  "layer0": {"id": 0, "url": ".../0", "fields": {"status": {"name": "STATUS"}}}}
//! ```

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tracing::debug;

use super::{ConvertContext, CreatedItem, DeployContext, ItemConverter, base_template};
use crate::core::{DEFAULT_DEPLOYMENT_COST, ItemTemplate, SolutionError, item_type};
use crate::portal::{CreateServiceRequest, SERVICE_TO_SERVICE};
use crate::templating::templatize_service_url;

/// Service-level properties carried into the template.
const SERVICE_FIELDS: &[&str] = &[
    "serviceDescription",
    "description",
    "capabilities",
    "spatialReference",
    "initialExtent",
    "fullExtent",
    "maxRecordCount",
    "supportedQueryFormats",
    "allowGeometryUpdates",
    "units",
    "hasStaticData",
    "xssPreventionInfo",
];

/// Layer properties dropped from the captured definition; the destination
/// assigns them.
const LAYER_DROPPED_FIELDS: &[&str] = &["url", "serviceItemId", "currentVersion", "editingInfo"];

/// Converter for hosted feature services and views.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureServiceConverter;

fn strip_layer(layer: &Value) -> Value {
    match layer {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(name, _)| !LAYER_DROPPED_FIELDS.contains(&name.as_str()))
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Unique service name derived from the title; hosted service names must be
/// unique per organization.
fn service_name(title: &str) -> String {
    let base: String = title
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect::<String>()
        .trim_matches('_')
        .to_string();
    let base = if base.is_empty() { "service".to_string() } else { base };
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}_{}", base, &suffix[..8])
}

/// Dictionary value for a created service.
fn service_dictionary_value(item_id: &str, url: &str, name: &str, properties: &Value) -> Value {
    let mut value = Map::new();
    value.insert("itemId".to_string(), json!(item_id));
    value.insert("url".to_string(), json!(url));
    value.insert("name".to_string(), json!(name));
    for section in ["layers", "tables"] {
        let Some(layers) = properties.get(section).and_then(Value::as_array) else {
            continue;
        };
        for layer in layers {
            let Some(id) = layer.get("id").and_then(Value::as_u64) else {
                continue;
            };
            let fields: Map<String, Value> = layer
                .get("fields")
                .and_then(Value::as_array)
                .map(|fields| {
                    fields
                        .iter()
                        .filter_map(|f| f.get("name").and_then(Value::as_str))
                        .map(|name| (name.to_lowercase(), json!({ "name": name })))
                        .collect()
                })
                .unwrap_or_default();
            value.insert(
                format!("layer{id}"),
                json!({ "id": id, "url": format!("{url}/{id}"), "fields": fields }),
            );
        }
    }
    Value::Object(value)
}

#[async_trait]
impl ItemConverter for FeatureServiceConverter {
    async fn convert_item_to_template(&self, ctx: &ConvertContext<'_>, item: Value) -> Result<ItemTemplate> {
        let mut template = base_template(ctx, &item, item_type::FEATURE_SERVICE)?;
        let url = template
            .item
            .get("url")
            .and_then(Value::as_str)
            .map(|u| u.trim_end_matches('/').to_string())
            .ok_or_else(|| SolutionError::InvalidTemplate {
                item_id: template.item_id.clone(),
                reason: "feature service item has no url".to_string(),
            })?;

        let definition = ctx.reader.service_definition(&url).await?;
        let service: Map<String, Value> = SERVICE_FIELDS
            .iter()
            .filter_map(|f| definition.get(*f).map(|v| (f.to_string(), v.clone())))
            .collect();
        let section = |name: &str| -> Vec<Value> {
            definition
                .get(name)
                .and_then(Value::as_array)
                .map(|layers| layers.iter().map(strip_layer).collect())
                .unwrap_or_default()
        };
        let layers = section("layers");
        let tables = section("tables");

        let is_view = item
            .get("typeKeywords")
            .and_then(Value::as_array)
            .is_some_and(|kw| kw.iter().any(|k| k.as_str() == Some("View Service")));
        if is_view {
            for source in ctx.reader.related_items(&template.item_id, SERVICE_TO_SERVICE).await? {
                if source != template.item_id {
                    template.add_dependency(source);
                }
            }
        }

        template.estimated_deployment_cost_factor =
            DEFAULT_DEPLOYMENT_COST + u32::try_from(layers.len() + tables.len()).unwrap_or(u32::MAX);
        template.properties = json!({
            "service": service,
            "layers": layers,
            "tables": tables,
            "isView": is_view,
        });
        template.data = ctx.reader.item_data(&template.item_id).await?.unwrap_or(Value::Null);

        let key = template.key.clone();
        let mut item_value = Value::Object(std::mem::take(&mut template.item));
        templatize_service_url(&mut item_value, &url, &key)?;
        if let Value::Object(map) = item_value {
            template.item = map;
        }
        templatize_service_url(&mut template.data, &url, &key)?;
        debug!(
            "Captured {} layer(s) and {} table(s) for service '{}'",
            template.properties["layers"].as_array().map_or(0, Vec::len),
            template.properties["tables"].as_array().map_or(0, Vec::len),
            template.item_id
        );
        Ok(template)
    }

    async fn create_item_from_template(
        &self,
        ctx: &DeployContext<'_>,
        template: &ItemTemplate,
    ) -> Result<CreatedItem> {
        let mut stripped = template.clone();
        // The url belongs to the new service and is only known after creation.
        stripped.item.remove("url");
        let item = ctx.item_fields(&stripped)?;

        let mut parameters = template.properties.get("service").cloned().unwrap_or_else(|| json!({}));
        if let Value::Object(map) = &mut parameters {
            map.insert("name".to_string(), json!(service_name(template.title())));
            if template.properties.get("isView").and_then(Value::as_bool).unwrap_or(false) {
                map.insert("isView".to_string(), json!(true));
            }
        }

        let created = ctx
            .writer
            .create_service(CreateServiceRequest {
                item,
                parameters,
                folder: ctx.folder_id.map(str::to_string),
            })
            .await?;
        debug!("Created service {} at {}", created.item_id, created.url);

        let layers = template.properties.get("layers").cloned().unwrap_or_else(|| json!([]));
        let tables = template.properties.get("tables").cloned().unwrap_or_else(|| json!([]));
        let has_layers = layers.as_array().is_some_and(|l| !l.is_empty())
            || tables.as_array().is_some_and(|t| !t.is_empty());
        if has_layers {
            ctx.writer
                .add_to_service_definition(&created.url, json!({ "layers": layers, "tables": tables }))
                .await?;
        }

        let value = service_dictionary_value(&created.item_id, &created.url, &created.name, &template.properties);
        if !template.data.is_null() {
            let data = ctx.detemplatize_with_self(&template.data, &template.item_id, &template.key, &value)?;
            ctx.writer.update_item(&created.item_id, Map::new(), Some(data)).await?;
        }

        Ok(CreatedItem {
            item_id: created.item_id,
            item_type: item_type::FEATURE_SERVICE.to_string(),
            dictionary_value: value,
        })
    }
}

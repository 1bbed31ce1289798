//! Web maps.
//!
//! Operational layers and tables that reference a portal item make that item
//! a dependency. When such a layer draws from a layer of a service, its url
//! is templatized against the service's key so the map follows the service to
//! its new location. Layers on services other than hosted feature services
//! keep their url. The map extent is replaced with `{{solutionItemExtent}}`.

use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use serde_json::{Value, json};
use std::sync::LazyLock;

use super::{ConvertContext, CreatedItem, DeployContext, ItemConverter, base_template, create_plain_item};
use crate::core::{ItemTemplate, item_type};
use crate::templating::{SOLUTION_ITEM_EXTENT, Suffix, placeholder, templatize_service_url};

static LAYER_URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+?)/(\d+)/?$").expect("layer url pattern is valid"));

/// Converter for web maps.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebMapConverter;

/// Templatize a layer's url against the service it draws from and return the
/// id of the item it references, if any.
fn templatize_layer(ctx: &ConvertContext<'_>, layer: &mut Value) -> Result<Option<String>> {
    let Some(item_id) = layer.get("itemId").and_then(Value::as_str).map(str::to_string) else {
        return Ok(None);
    };
    // Only hosted feature services publish layer urls under their key; other
    // services keep their original url.
    if let Some(url) = layer.get("url").and_then(Value::as_str).map(str::to_string)
        && url.to_lowercase().contains("/featureserver")
    {
        let base = LAYER_URL_RE.captures(&url).map_or(url.clone(), |caps| caps[1].to_string());
        let key = ctx.key_for(&item_id);
        let mut url_value = json!(url);
        templatize_service_url(&mut url_value, &base, &key)?;
        layer["url"] = url_value;
    }
    Ok(Some(item_id))
}

#[async_trait]
impl ItemConverter for WebMapConverter {
    async fn convert_item_to_template(&self, ctx: &ConvertContext<'_>, item: Value) -> Result<ItemTemplate> {
        let mut template = base_template(ctx, &item, item_type::WEB_MAP)?;
        template.item.remove("url");
        if template.item.contains_key("extent") {
            template.item.insert("extent".to_string(), json!(placeholder(SOLUTION_ITEM_EXTENT, Suffix::None)));
        }

        let mut data = ctx.reader.item_data(&template.item_id).await?.unwrap_or_else(|| json!({}));
        let mut references = Vec::new();
        for section in ["operationalLayers", "tables"] {
            let Some(layers) = data.get_mut(section).and_then(Value::as_array_mut) else {
                continue;
            };
            for layer in layers.iter_mut() {
                if let Some(id) = templatize_layer(ctx, layer)? {
                    references.push(id);
                }
                // Group layers nest their children.
                if let Some(children) = layer.get_mut("layers").and_then(Value::as_array_mut) {
                    for child in children {
                        if let Some(id) = templatize_layer(ctx, child)? {
                            references.push(id);
                        }
                    }
                }
            }
        }
        for id in references {
            if id != template.item_id {
                template.add_dependency(id);
            }
        }
        template.data = data;
        Ok(template)
    }

    async fn create_item_from_template(
        &self,
        ctx: &DeployContext<'_>,
        template: &ItemTemplate,
    ) -> Result<CreatedItem> {
        let item_id = create_plain_item(ctx, template).await?;
        Ok(CreatedItem::new(item_id, item_type::WEB_MAP))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layer_url_pattern() {
        let caps = LAYER_URL_RE.captures("https://svc/arcgis/rest/services/P/FeatureServer/12").unwrap();
        assert_eq!(&caps[1], "https://svc/arcgis/rest/services/P/FeatureServer");
        assert_eq!(&caps[2], "12");
        assert!(LAYER_URL_RE.captures("https://svc/arcgis/rest/services/P/FeatureServer").is_none());
    }
}

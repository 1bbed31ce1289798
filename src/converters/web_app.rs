//! Web mapping applications.
//!
//! An app references its web map (`values.webmap` or `map.itemId`) and
//! optionally a group (`values.group`). Its own url embeds its own id, so the
//! url is templatized to `{{portalBaseUrl}}/...{{<own key>.itemId}}` and
//! patched with a second update once the new id exists.

use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use serde_json::{Map, Value, json};
use tracing::debug;

use super::{ConvertContext, CreatedItem, DeployContext, ItemConverter, base_template, create_plain_item};
use crate::core::{DEFAULT_DEPLOYMENT_COST, ItemTemplate, item_type};
use crate::templating::{PORTAL_BASE_URL, Suffix, placeholder};

/// Converter for configurable web mapping applications.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebAppConverter;

/// Ids referenced by an app payload, in discovery order.
fn app_references(data: &Value) -> Vec<String> {
    let candidates = [
        data.pointer("/values/webmap"),
        data.pointer("/map/itemId"),
        data.pointer("/values/group"),
    ];
    let mut ids: Vec<String> = Vec::new();
    for id in candidates.into_iter().flatten().filter_map(Value::as_str) {
        if !id.is_empty() && !ids.iter().any(|known| known == id) {
            ids.push(id.to_string());
        }
    }
    ids
}

/// Rewrite the portal prefix and the app's own id inside its url.
fn templatize_app_url(url: &str, portal_url: &str, item_id: &str, key: &str) -> Result<String> {
    let portal = Regex::new(&format!(r"(?i)^{}", regex::escape(portal_url.trim_end_matches('/'))))?;
    let url = portal.replace(url, placeholder(PORTAL_BASE_URL, Suffix::None).as_str()).into_owned();
    let own_id = Regex::new(&format!("(?i){}", regex::escape(item_id)))?;
    Ok(own_id.replace_all(&url, placeholder(key, Suffix::ItemId).as_str()).into_owned())
}

#[async_trait]
impl ItemConverter for WebAppConverter {
    async fn convert_item_to_template(&self, ctx: &ConvertContext<'_>, item: Value) -> Result<ItemTemplate> {
        let mut template = base_template(ctx, &item, item_type::WEB_MAPPING_APPLICATION)?;
        template.data = ctx.reader.item_data(&template.item_id).await?.unwrap_or_else(|| json!({}));

        for id in app_references(&template.data) {
            if id != template.item_id {
                template.add_dependency(id);
            }
        }

        if let Some(url) = template.item.get("url").and_then(Value::as_str) {
            let url = templatize_app_url(url, ctx.portal_url(), &template.item_id, &template.key)?;
            template.item.insert("url".to_string(), json!(url));
            // Extra update call for the url patch.
            template.estimated_deployment_cost_factor = DEFAULT_DEPLOYMENT_COST + 1;
        }
        Ok(template)
    }

    async fn create_item_from_template(
        &self,
        ctx: &DeployContext<'_>,
        template: &ItemTemplate,
    ) -> Result<CreatedItem> {
        let mut without_url = template.clone();
        let url = without_url.item.remove("url");
        let item_id = create_plain_item(ctx, &without_url).await?;
        let mut created = CreatedItem::new(item_id, item_type::WEB_MAPPING_APPLICATION);

        if let Some(url) = url {
            let url = ctx.detemplatize_with_self(&url, &template.item_id, &template.key, &created.dictionary_value)?;
            debug!("Patching url of app {} to {}", created.item_id, url);
            let mut fields = Map::new();
            fields.insert("url".to_string(), url.clone());
            ctx.writer.update_item(&created.item_id, fields, None).await?;
            if let Value::Object(value) = &mut created.dictionary_value {
                value.insert("url".to_string(), url);
            }
        }
        Ok(created)
    }
}

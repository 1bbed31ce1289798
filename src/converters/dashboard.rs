//! Dashboards.
//!
//! Map widgets reference a web map by `itemId`; datasets of other widgets
//! reference a service or map through `dataSource.itemId`. Both make the
//! referenced item a dependency. Field and `#`-qualified layer references
//! inside widgets are left to the datasource-aware field pass.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Value, json};

use super::{
    ConvertContext, CreatedItem, DeployContext, ItemConverter, base_template, collect_strings, create_plain_item,
};
use crate::core::{ItemTemplate, item_type};

/// Converter for dashboards.
#[derive(Debug, Clone, Copy, Default)]
pub struct DashboardConverter;

/// Sections of a dashboard payload that hold widgets.
const WIDGET_SECTIONS: &[&str] = &["widgets", "headerPanel", "leftPanel", "desktopView", "mobileView"];

#[async_trait]
impl ItemConverter for DashboardConverter {
    async fn convert_item_to_template(&self, ctx: &ConvertContext<'_>, item: Value) -> Result<ItemTemplate> {
        let mut template = base_template(ctx, &item, item_type::DASHBOARD)?;
        template.item.remove("url");
        template.data = ctx.reader.item_data(&template.item_id).await?.unwrap_or_else(|| json!({}));

        let mut references = Vec::new();
        for section in WIDGET_SECTIONS {
            if let Some(widgets) = template.data.get(*section) {
                collect_strings(widgets, "itemId", &mut references);
            }
        }
        for id in references {
            if id != template.item_id {
                template.add_dependency(id);
            }
        }
        Ok(template)
    }

    async fn create_item_from_template(
        &self,
        ctx: &DeployContext<'_>,
        template: &ItemTemplate,
    ) -> Result<CreatedItem> {
        let item_id = create_plain_item(ctx, template).await?;
        Ok(CreatedItem::new(item_id, item_type::DASHBOARD))
    }
}

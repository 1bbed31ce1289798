//! Items copied as-is: documents, images, and desktop templates.
//!
//! They reference nothing, so their templates have no dependencies; the
//! resolver still templatizes any ids they happen to mention.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use super::{ConvertContext, CreatedItem, DeployContext, ItemConverter, base_template, create_plain_item};
use crate::core::ItemTemplate;

/// Converter for pass-through item types.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleConverter;

#[async_trait]
impl ItemConverter for SimpleConverter {
    async fn convert_item_to_template(&self, ctx: &ConvertContext<'_>, item: Value) -> Result<ItemTemplate> {
        let item_type = item.get("type").and_then(Value::as_str).unwrap_or_default().to_string();
        let mut template = base_template(ctx, &item, &item_type)?;
        template.data = ctx.reader.item_data(&template.item_id).await?.unwrap_or(Value::Null);
        Ok(template)
    }

    async fn create_item_from_template(
        &self,
        ctx: &DeployContext<'_>,
        template: &ItemTemplate,
    ) -> Result<CreatedItem> {
        let item_id = create_plain_item(ctx, template).await?;
        Ok(CreatedItem::new(item_id, template.item_type.clone()))
    }
}

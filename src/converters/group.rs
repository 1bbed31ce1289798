//! Groups.
//!
//! A group depends on the items shared into it, so every contained item is
//! created first and shared into the new group once it exists.

use anyhow::Result;
use async_trait::async_trait;
use futures::future::try_join_all;
use serde_json::{Map, Value, json};
use tracing::debug;

use super::{ConvertContext, CreatedItem, DeployContext, ItemConverter};
use crate::core::{ItemTemplate, SolutionError, item_type};

/// Group metadata fields carried into a template.
const GROUP_FIELDS: &[&str] =
    &["title", "description", "snippet", "tags", "sortField", "sortOrder", "isViewOnly", "isInvitationOnly"];

/// Converter for groups.
#[derive(Debug, Clone, Copy, Default)]
pub struct GroupConverter;

#[async_trait]
impl ItemConverter for GroupConverter {
    async fn convert_item_to_template(&self, ctx: &ConvertContext<'_>, item: Value) -> Result<ItemTemplate> {
        let group_id = item.get("id").and_then(Value::as_str).ok_or_else(|| SolutionError::InvalidTemplate {
            item_id: "<unknown>".to_string(),
            reason: "group metadata has no id".to_string(),
        })?;
        let mut template = ItemTemplate::new(group_id, item_type::GROUP, ctx.key_for(group_id));
        if let Some(source) = item.as_object() {
            template.item = GROUP_FIELDS
                .iter()
                .filter_map(|f| source.get(*f).filter(|v| !v.is_null()).map(|v| (f.to_string(), v.clone())))
                .collect();
        }
        template.item.insert("type".to_string(), json!(item_type::GROUP));

        let contents = ctx.reader.group_contents(group_id).await?;
        debug!("Group '{}' contains {} item(s)", group_id, contents.len());
        for member in &contents {
            if member != group_id {
                template.add_dependency(member.clone());
            }
        }
        // One share call per member on top of the create.
        template.estimated_deployment_cost_factor = 2 + u32::try_from(contents.len()).unwrap_or(u32::MAX);
        Ok(template)
    }

    async fn create_item_from_template(
        &self,
        ctx: &DeployContext<'_>,
        template: &ItemTemplate,
    ) -> Result<CreatedItem> {
        let mut fields: Map<String, Value> = ctx.item_fields(template)?;
        fields.remove("type");
        let group_id = ctx.writer.create_group(fields).await?;

        let members: Vec<&String> =
            template.dependencies.iter().filter_map(|source_id| ctx.created.get(source_id)).collect();
        debug!("Sharing {} item(s) into group {}", members.len(), group_id);
        let groups = [group_id.clone()];
        try_join_all(members.into_iter().map(|member| ctx.writer.share_item(member, None, &groups))).await?;

        Ok(CreatedItem::new(group_id, item_type::GROUP))
    }
}

//! Creating a solution from items in a source portal.

use anyhow::{Context, Result};
use chrono::Utc;
use futures::stream::{self, StreamExt, TryStreamExt};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{PassthroughItem, SolutionData, SolutionMetadata, SolutionThumbnail};
use crate::constants::{DEFAULT_MAX_PARALLEL_COPIES, DEFAULT_RESOURCE_COPY_DELAY_MS, SOLUTION_TYPE_KEYWORDS};
use crate::converters::ConverterRegistry;
use crate::core::{Failure, ItemTemplate, ResourcePath, Stage, item_type};
use crate::deploy::Throttle;
use crate::portal::{CreateItemRequest, PortalReader, PortalWriter};
use crate::resolver::{DependencyResolver, TemplateStore};
use crate::templating::{Suffix, placeholder, templatize_field_references};

/// Parameters for [`create_solution`].
#[derive(Debug, Clone)]
pub struct CreateSolutionRequest {
    /// Items to build the solution from
    pub root_ids: Vec<String>,
    /// Title of the new solution item
    pub title: String,
    /// Tags of the new solution item
    pub tags: Vec<String>,
    /// Folder for the solution item, `None` for the root folder
    pub folder_id: Option<String>,
    /// Spacing between resource copy starts
    pub resource_copy_delay: Duration,
    /// Resource copies in flight per template
    pub max_parallel_copies: usize,
}

impl CreateSolutionRequest {
    /// Request with default copy throttling.
    pub fn new(title: impl Into<String>, root_ids: Vec<String>) -> Self {
        Self {
            root_ids,
            title: title.into(),
            tags: Vec::new(),
            folder_id: None,
            resource_copy_delay: Duration::from_millis(DEFAULT_RESOURCE_COPY_DELAY_MS),
            max_parallel_copies: DEFAULT_MAX_PARALLEL_COPIES,
        }
    }
}

/// Result of [`create_solution`].
#[derive(Debug, Clone, PartialEq)]
pub struct CreatedSolution {
    /// Id of the new solution item
    pub solution_id: String,
    /// Number of templates stored
    pub template_count: usize,
    /// Items kept by reference
    pub passthrough: Vec<PassthroughItem>,
    /// Thumbnail source item, if one was tagged
    pub thumbnail: Option<String>,
}

/// Resolve `request.root_ids` in the source portal and store the templates
/// as a new solution item.
///
/// The solution item is created through `writer`, normally the same portal
/// as `reader`.
///
/// # Errors
///
/// A [`Failure`] at [`Stage::Resolve`]. Resolution failures name the failing
/// item. If persisting fails after the solution item was created, that item
/// is left in place.
pub async fn create_solution(
    reader: &dyn PortalReader,
    writer: &dyn PortalWriter,
    registry: &ConverterRegistry,
    request: &CreateSolutionRequest,
) -> Result<CreatedSolution, Failure> {
    if request.root_ids.is_empty() {
        return Err(Failure::new(Stage::Resolve, "no items given to build the solution from"));
    }

    let store = TemplateStore::new();
    DependencyResolver::new(reader, registry).resolve_all(&request.root_ids, &store).await?;

    persist(reader, writer, &store, request).await.map_err(|err| Failure::from_anyhow(Stage::Resolve, err))
}

async fn persist(
    reader: &dyn PortalReader,
    writer: &dyn PortalWriter,
    store: &TemplateStore,
    request: &CreateSolutionRequest,
) -> Result<CreatedSolution> {
    let mut templates = store.templates();
    templatize_field_references(&mut templates)?;

    let thumbnail_source = store.thumbnail_source();
    if let Some(source_id) = &thumbnail_source {
        restore_references(&mut templates, source_id, &store.key_for(source_id))?;
    }
    let passthrough: BTreeMap<String, PassthroughItem> = store
        .skipped()
        .into_iter()
        .filter(|(item_id, _, _)| thumbnail_source.as_deref() != Some(item_id.as_str()))
        .map(|(item_id, key, item_type)| {
            (
                key,
                PassthroughItem {
                    item_id,
                    item_type,
                },
            )
        })
        .collect();
    for item in passthrough.values() {
        warn!("'{}' ({}) is kept by reference and will not be recreated", item.item_id, item.item_type);
    }

    let mut metadata = SolutionMetadata {
        title: request.title.clone(),
        source_portal: reader.portal_url().to_string(),
        root_ids: request.root_ids.clone(),
        passthrough,
        thumbnail: None,
        extent: root_extent(reader, &request.root_ids).await,
        created: Utc::now().to_rfc3339(),
    };

    let mut item = Map::new();
    item.insert("type".to_string(), json!(item_type::SOLUTION));
    item.insert("title".to_string(), json!(request.title));
    item.insert("typeKeywords".to_string(), json!(SOLUTION_TYPE_KEYWORDS));
    if !request.tags.is_empty() {
        item.insert("tags".to_string(), json!(request.tags));
    }
    if !metadata.extent.is_null() {
        item.insert("extent".to_string(), metadata.extent.clone());
    }
    let solution_id = writer
        .create_item(CreateItemRequest {
            item,
            data: None,
            folder: request.folder_id.clone(),
        })
        .await
        .context("Failed to create solution item")?;
    info!("Created solution item {} for {} template(s)", solution_id, templates.len());

    let throttle = Throttle::new(request.resource_copy_delay);
    for template in &templates {
        copy_into_solution(reader, writer, &solution_id, template, &throttle, request.max_parallel_copies).await?;
    }

    if let Some(source_id) = &thumbnail_source {
        metadata.thumbnail = Some(copy_thumbnail(reader, writer, &solution_id, source_id).await?);
    }

    let created = CreatedSolution {
        solution_id: solution_id.clone(),
        template_count: templates.len(),
        passthrough: metadata.passthrough.values().cloned().collect(),
        thumbnail: thumbnail_source,
    };
    let data = serde_json::to_value(SolutionData {
        metadata,
        templates,
    })?;
    writer
        .update_item(&solution_id, Map::new(), Some(data))
        .await
        .with_context(|| format!("Failed to write templates to solution item {solution_id}"))?;
    Ok(created)
}

/// Point references to an item that is not recreated back at its original id
/// and drop it from the dependencies of the templates that mention it.
fn restore_references(templates: &mut [ItemTemplate], item_id: &str, key: &str) -> Result<()> {
    let placeholder_text = placeholder(key, Suffix::ItemId);
    for template in templates.iter_mut().filter(|t| t.dependencies.iter().any(|dep| dep == item_id)) {
        debug!("'{}' keeps its reference to '{}'", template.item_id, item_id);
        template.dependencies.retain(|dep| dep != item_id);
        let mut item = Value::Object(std::mem::take(&mut template.item));
        replace_text(&mut item, &placeholder_text, item_id)?;
        if let Value::Object(map) = item {
            template.item = map;
        }
        replace_text(&mut template.data, &placeholder_text, item_id)?;
    }
    Ok(())
}

fn replace_text(value: &mut Value, from: &str, to: &str) -> Result<()> {
    let text = serde_json::to_string(value)?;
    if text.contains(from) {
        *value = serde_json::from_str(&text.replace(from, to))?;
    }
    Ok(())
}

/// Copy a template's resources into the solution under `<itemId>/...`.
async fn copy_into_solution(
    reader: &dyn PortalReader,
    writer: &dyn PortalWriter,
    solution_id: &str,
    template: &ItemTemplate,
    throttle: &Throttle,
    max_parallel: usize,
) -> Result<()> {
    if template.resources.is_empty() {
        return Ok(());
    }
    debug!("Storing {} resource(s) of '{}'", template.resources.len(), template.item_id);
    stream::iter(template.resources.iter())
        .map(|resource| async move {
            throttle.wait().await;
            let bytes = reader.resource(&template.item_id, resource).await.with_context(|| {
                format!("Failed to read resource '{}' of '{}'", resource.path(), template.item_id)
            })?;
            writer
                .add_resource(solution_id, &resource.prefixed(&template.item_id), bytes)
                .await
                .with_context(|| format!("Failed to store resource '{}'", resource.path()))
        })
        .buffer_unordered(max_parallel.max(1))
        .try_collect::<Vec<()>>()
        .await?;
    Ok(())
}

async fn copy_thumbnail(
    reader: &dyn PortalReader,
    writer: &dyn PortalWriter,
    solution_id: &str,
    source_id: &str,
) -> Result<SolutionThumbnail> {
    let name = reader
        .item(source_id)
        .await?
        .and_then(|item| item.get("thumbnail").and_then(Value::as_str).map(str::to_string));
    let Some(name) = name else {
        warn!("Thumbnail source '{}' has no thumbnail image", source_id);
        return Ok(SolutionThumbnail {
            item_id: source_id.to_string(),
            resource: None,
        });
    };

    let bytes = reader
        .thumbnail(source_id, &name)
        .await
        .with_context(|| format!("Failed to read thumbnail of '{source_id}'"))?;
    let filename = name.rsplit('/').next().unwrap_or(&name);
    let path = ResourcePath::new(Some("thumbnail"), filename);
    writer.add_resource(solution_id, &path, bytes).await.context("Failed to store solution thumbnail")?;
    Ok(SolutionThumbnail {
        item_id: source_id.to_string(),
        resource: Some(path.path()),
    })
}

/// Extent of the first root item that has a non-empty one.
async fn root_extent(reader: &dyn PortalReader, root_ids: &[String]) -> Value {
    for root_id in root_ids {
        if let Ok(Some(item)) = reader.item(root_id).await
            && let Some(extent) = item.get("extent").filter(|e| e.as_array().is_some_and(|a| !a.is_empty()))
        {
            return extent.clone();
        }
    }
    Value::Null
}

//! Deploying a stored solution into a destination portal.

use anyhow::{Context, Result};
use chrono::Utc;
use serde_json::{Map, Value, json};
use tracing::info;

use super::{SolutionData, load_solution};
use crate::constants::DEPLOYED_TYPE_KEYWORDS;
use crate::converters::ConverterRegistry;
use crate::core::{Failure, Stage, item_type};
use crate::deploy::{DeployOptions, DeployProgress, DeployedItem, Replayer, ResourceSource};
use crate::portal::{CreateItemRequest, PortalReader, PortalWriter};
use crate::resolver::sort_templates;
use crate::templating::{FOLDER_ID, PORTAL_BASE_URL, SOLUTION_ITEM_EXTENT, TemplateDictionary};

/// Parameters for [`deploy_solution`].
#[derive(Debug, Clone)]
pub struct DeploySolutionRequest {
    /// Solution item in the source portal
    pub solution_id: String,
    /// Title of the destination folder to create
    pub folder_title: String,
    /// Destination user that will own the items
    pub username: String,
    /// Extent overriding the one stored in the solution
    pub extent: Option<Value>,
    /// Copy throttling; `folder_id` is replaced by the new folder
    pub options: DeployOptions,
}

/// Result of [`deploy_solution`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployedSolution {
    /// Id of the deployed solution item
    pub solution_id: String,
    /// Destination folder holding every created item
    pub folder_id: String,
    /// Created items, in creation order
    pub items: Vec<DeployedItem>,
}

/// Deploy a stored solution.
///
/// `dictionary` may be pre-seeded with caller entries, which win over the
/// defaults seeded here. It keeps every entry written before a failure.
///
/// # Errors
///
/// - [`Stage::Deploy`] if the solution cannot be loaded or an item cannot be
///   created; `item_ids` names the failing template.
/// - [`Stage::Sequence`] if the templates form a cycle; nothing is created.
pub async fn deploy_solution(
    source: &dyn PortalReader,
    destination: &dyn PortalWriter,
    registry: &ConverterRegistry,
    request: &DeploySolutionRequest,
    dictionary: &mut TemplateDictionary,
    progress: Option<&(dyn Fn(&DeployProgress) + Send + Sync)>,
) -> Result<DeployedSolution, Failure> {
    let solution = load_solution(source, &request.solution_id)
        .await
        .map_err(|err| Failure::from_anyhow(Stage::Deploy, err))?;
    let SolutionData {
        metadata,
        templates,
    } = solution;

    let ordered = sort_templates(templates).map_err(|err| Failure::from_anyhow(Stage::Sequence, err))?;
    info!("Deploying '{}' ({} template(s))", metadata.title, ordered.len());

    let folder_id = destination
        .create_folder(&request.folder_title)
        .await
        .with_context(|| format!("Failed to create folder '{}'", request.folder_title))
        .map_err(|err| Failure::from_anyhow(Stage::Deploy, err))?;

    let extent = request.extent.clone().unwrap_or_else(|| metadata.extent.clone());
    seed_default(dictionary, FOLDER_ID, json!(folder_id));
    seed_default(dictionary, PORTAL_BASE_URL, json!(destination.portal_url()));
    seed_default(dictionary, "user.username", json!(request.username));
    seed_default(dictionary, SOLUTION_ITEM_EXTENT, extent);
    for (key, item) in &metadata.passthrough {
        seed_default(dictionary, key, json!({ "itemId": item.item_id }));
    }

    let options = DeployOptions {
        folder_id: Some(folder_id.clone()),
        ..request.options.clone()
    };
    let mut replayer = Replayer::new(destination, registry).with_options(options).with_resource_source(
        ResourceSource {
            reader: source,
            solution_id: request.solution_id.clone(),
        },
    );
    if let Some(callback) = progress {
        replayer = replayer.on_progress(callback);
    }
    let items = replayer.deploy(&ordered, dictionary).await?;

    let solution_id = record_deployment(destination, &request.solution_id, &metadata.title, &folder_id, &items)
        .await
        .map_err(|err| Failure::from_anyhow(Stage::Deploy, err))?;
    info!("Deployed solution item {} in folder {}", solution_id, folder_id);

    Ok(DeployedSolution {
        solution_id,
        folder_id,
        items,
    })
}

fn seed_default(dictionary: &mut TemplateDictionary, path: &str, value: Value) {
    if dictionary.lookup(path).is_none() {
        dictionary.seed(path, value);
    }
}

/// Create the deployed solution item listing every created item.
async fn record_deployment(
    destination: &dyn PortalWriter,
    source_solution_id: &str,
    title: &str,
    folder_id: &str,
    items: &[DeployedItem],
) -> Result<String> {
    let mut item = Map::new();
    item.insert("type".to_string(), json!(item_type::SOLUTION));
    item.insert("title".to_string(), json!(title));
    item.insert("typeKeywords".to_string(), json!(DEPLOYED_TYPE_KEYWORDS));

    let data = json!({
        "metadata": {
            "sourceSolutionId": source_solution_id,
            "deployed": Utc::now().to_rfc3339(),
        },
        "items": items
            .iter()
            .map(|i| json!({ "sourceId": i.source_id, "itemId": i.item_id, "type": i.item_type }))
            .collect::<Vec<_>>(),
    });
    destination
        .create_item(CreateItemRequest {
            item,
            data: Some(data),
            folder: Some(folder_id.to_string()),
        })
        .await
        .context("Failed to create deployed solution item")
}

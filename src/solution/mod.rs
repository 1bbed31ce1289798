//! End-to-end solution operations.
//!
//! A *solution* is a `Solution` item whose data holds every template needed to
//! recreate a set of items, plus a little metadata:
//!
//! ```json
//! {
//!   "metadata": {
//!     "title": "Permit Review",
//!     "sourcePortal": "https://source.example.com/portal",
//!     "rootIds": ["4f2e..."],
//!     "passthrough": { "k3b1c9d2e": { "itemId": "9ab0...", "type": "Notebook" } },
//!     "thumbnail": { "itemId": "77c1...", "resource": "thumbnail/cover.png" },
//!     "extent": [[-120.1, 35.2], [-119.7, 35.6]],
//!     "created": "2026-10-17T09:30:00Z"
//!   },
//!   "templates": [ ... ]
//! }
//! ```
//!
//! - [`create_solution`] resolves roots in a source portal, templatizes, and
//!   persists the result as a new solution item.
//! - [`deploy_solution`] loads a solution, sequences its templates and replays
//!   them into a destination portal.
//! - [`plan_solution`] loads a solution and reports the deploy order without
//!   creating anything.

mod create;
mod deploy;

pub use create::{CreateSolutionRequest, CreatedSolution, create_solution};
pub use deploy::{DeploySolutionRequest, DeployedSolution, deploy_solution};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::core::{Failure, ItemTemplate, SolutionError, Stage};
use crate::portal::PortalReader;
use crate::resolver::DependencyGraph;

/// An item the solution references but does not recreate.
///
/// Its key de-templatizes to the original id so references survive deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PassthroughItem {
    /// Original item id
    pub item_id: String,
    /// Item type
    #[serde(rename = "type")]
    pub item_type: String,
}

/// Where the solution's thumbnail came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolutionThumbnail {
    /// Item tagged as the thumbnail source
    pub item_id: String,
    /// Resource path of the copied image inside the solution item
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
}

/// Descriptive part of a stored solution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolutionMetadata {
    /// Solution title
    #[serde(default)]
    pub title: String,
    /// Portal the templates were resolved from
    #[serde(default)]
    pub source_portal: String,
    /// Items the solution was created from
    #[serde(default)]
    pub root_ids: Vec<String>,
    /// Template key → item kept by reference
    #[serde(default)]
    pub passthrough: BTreeMap<String, PassthroughItem>,
    /// Thumbnail source, if one was tagged
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<SolutionThumbnail>,
    /// Extent of the first root that had one
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub extent: Value,
    /// RFC 3339 creation time
    #[serde(default)]
    pub created: String,
}

/// The data payload of a solution item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SolutionData {
    /// Descriptive metadata
    #[serde(default)]
    pub metadata: SolutionMetadata,
    /// Templates, in resolution order
    #[serde(default)]
    pub templates: Vec<ItemTemplate>,
}

/// Read and parse a solution item's data.
///
/// # Errors
///
/// Returns [`SolutionError::ItemNotFound`] if the item has no data and
/// [`SolutionError::InvalidTemplate`] if the data is not a solution.
pub async fn load_solution(reader: &dyn PortalReader, solution_id: &str) -> Result<SolutionData> {
    let data = reader
        .item_data(solution_id)
        .await
        .with_context(|| format!("Failed to read solution '{solution_id}'"))?
        .ok_or_else(|| SolutionError::ItemNotFound {
            item_id: solution_id.to_string(),
        })?;
    if data.get("templates").is_none() {
        return Err(SolutionError::InvalidTemplate {
            item_id: solution_id.to_string(),
            reason: "item data has no templates; is this a solution?".to_string(),
        }
        .into());
    }
    serde_json::from_value(data).map_err(|err| {
        SolutionError::InvalidTemplate {
            item_id: solution_id.to_string(),
            reason: format!("malformed solution data: {err}"),
        }
        .into()
    })
}

/// One line of a deploy plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanStep {
    /// Source item id
    pub item_id: String,
    /// Item type
    pub item_type: String,
    /// Item title
    pub title: String,
    /// Estimated API calls
    pub cost: u32,
}

/// What a deployment would do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolutionPlan {
    /// Solution title
    pub title: String,
    /// Creation order
    pub steps: Vec<PlanStep>,
    /// Dependency tree of every root, one block per root
    pub trees: Vec<String>,
    /// Items kept by reference
    pub passthrough: Vec<PassthroughItem>,
}

/// Load a solution and compute its deploy order without creating anything.
///
/// # Errors
///
/// A [`Failure`] at [`Stage::Sequence`] if the solution cannot be loaded or
/// its templates form a cycle.
pub async fn plan_solution(reader: &dyn PortalReader, solution_id: &str) -> Result<SolutionPlan, Failure> {
    let solution = load_solution(reader, solution_id)
        .await
        .map_err(|err| Failure::from_anyhow(Stage::Sequence, err))?;
    plan(&solution).map_err(|err| Failure::from_anyhow(Stage::Sequence, err))
}

/// Deploy order and dependency trees for loaded solution data.
///
/// # Errors
///
/// Returns [`SolutionError::CyclicDependency`] if the templates form a cycle.
pub fn plan(solution: &SolutionData) -> Result<SolutionPlan> {
    let graph = DependencyGraph::from_templates(&solution.templates);
    let order = graph.topological_order()?;
    let by_id: BTreeMap<&str, &ItemTemplate> =
        solution.templates.iter().map(|t| (t.item_id.as_str(), t)).collect();

    let steps = order
        .iter()
        .filter_map(|id| by_id.get(id.as_str()))
        .map(|template| PlanStep {
            item_id: template.item_id.clone(),
            item_type: template.item_type.clone(),
            title: template.title().to_string(),
            cost: template.estimated_deployment_cost_factor,
        })
        .collect();
    let trees = graph.roots().iter().map(|root| graph.to_tree_string(root)).collect();

    Ok(SolutionPlan {
        title: solution.metadata.title.clone(),
        steps,
        trees,
        passthrough: solution.metadata.passthrough.values().cloned().collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn template(id: &str, deps: &[&str]) -> ItemTemplate {
        let mut t = ItemTemplate::new(id, "Web Map", format!("k{id}"));
        t.item.insert("title".into(), json!(format!("Title {id}")));
        for dep in deps {
            t.add_dependency(*dep);
        }
        t
    }

    #[test]
    fn test_solution_data_serializes_camel_case() {
        let mut data = SolutionData::default();
        data.metadata.root_ids = vec!["a".into()];
        data.metadata.passthrough.insert(
            "kx".into(),
            PassthroughItem {
                item_id: "x".into(),
                item_type: "Notebook".into(),
            },
        );
        let value = serde_json::to_value(&data).unwrap();
        assert_eq!(value["metadata"]["rootIds"], json!(["a"]));
        assert_eq!(value["metadata"]["passthrough"]["kx"]["type"], "Notebook");
        assert!(value["metadata"].get("thumbnail").is_none());
    }

    #[test]
    fn test_plan_orders_dependencies_first() {
        let data = SolutionData {
            metadata: SolutionMetadata {
                title: "Demo".into(),
                ..SolutionMetadata::default()
            },
            templates: vec![template("app", &["map"]), template("map", &["fs"]), template("fs", &[])],
        };
        let plan = plan(&data).unwrap();
        let ids: Vec<&str> = plan.steps.iter().map(|s| s.item_id.as_str()).collect();
        assert_eq!(ids, vec!["fs", "map", "app"]);
        assert_eq!(plan.trees.len(), 1);
        assert!(plan.trees[0].contains("Title fs"));
    }

    #[test]
    fn test_plan_rejects_cycles() {
        let data = SolutionData {
            metadata: SolutionMetadata::default(),
            templates: vec![template("a", &["b"]), template("b", &["a"])],
        };
        let err = plan(&data).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SolutionError>(),
            Some(SolutionError::CyclicDependency { .. })
        ));
    }
}

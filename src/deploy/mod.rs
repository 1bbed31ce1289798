//! Deployment replay.
//!
//! The [`Replayer`] walks an ordered template list and recreates each item in
//! the destination portal. Templates are processed strictly one at a time: a
//! later template may reference an id that only exists once an earlier one has
//! been created. Each template moves through [`DeployState`]:
//!
//! ```text
//! Pending → Templatized → Created → PostProcessed → Done
//! ```
//!
//! - **Templatized**: every placeholder the template uses resolves against the
//!   dictionary built so far (self-references excepted).
//! - **Created**: the converter created the item and reported its new id.
//! - **PostProcessed**: the dictionary entry for the template's key is written
//!   and resource files are copied (concurrently, with throttled starts).
//!
//! A failure aborts the remaining sequence. Items already created stay in
//! place, and their dictionary entries remain in the caller's dictionary.
//! That includes an item whose resource copy failed after creation, which is
//! reported as [`SolutionError::PostProcessFailed`] rather than as a creation
//! failure.

pub mod throttle;

pub use throttle::Throttle;

use anyhow::{Context, Result};
use futures::stream::{self, StreamExt, TryStreamExt};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info};

use crate::constants::{DEFAULT_MAX_PARALLEL_COPIES, DEFAULT_RESOURCE_COPY_DELAY_MS};
use crate::converters::{ConverterRegistry, DeployContext};
use crate::core::{Failure, ItemTemplate, SolutionError, Stage};
use crate::portal::{PortalReader, PortalWriter};
use crate::templating::{TemplateDictionary, find_placeholders};

/// Default spacing between resource copy starts.
pub const DEFAULT_RESOURCE_COPY_DELAY: Duration = Duration::from_millis(DEFAULT_RESOURCE_COPY_DELAY_MS);

/// Per-template deployment state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployState {
    /// Not started
    Pending,
    /// Placeholders verified against the dictionary
    Templatized,
    /// Item exists in the destination
    Created,
    /// Dictionary updated, resources copied
    PostProcessed,
    /// Finished
    Done,
}

impl fmt::Display for DeployState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Templatized => "templatized",
            Self::Created => "created",
            Self::PostProcessed => "post-processed",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

/// Progress notification sent after each template finishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployProgress {
    /// Percent complete, by cumulative deployment cost
    pub percent: u8,
    /// Source id of the template that just finished
    pub item_id: String,
    /// Title of that template
    pub title: String,
}

/// Options controlling a replay.
#[derive(Debug, Clone)]
pub struct DeployOptions {
    /// Destination folder for created items
    pub folder_id: Option<String>,
    /// Spacing between resource copy starts
    pub resource_copy_delay: Duration,
    /// Resource copies in flight per template
    pub max_parallel_copies: usize,
}

impl Default for DeployOptions {
    fn default() -> Self {
        Self {
            folder_id: None,
            resource_copy_delay: DEFAULT_RESOURCE_COPY_DELAY,
            max_parallel_copies: DEFAULT_MAX_PARALLEL_COPIES,
        }
    }
}

/// Where template resource files are read from: the solution item that
/// stores them under `<itemId>/<folder>/<file>`.
pub struct ResourceSource<'a> {
    /// Portal holding the solution item
    pub reader: &'a dyn PortalReader,
    /// Id of the solution item
    pub solution_id: String,
}

/// One item created by a replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployedItem {
    /// Source id of the template
    pub source_id: String,
    /// Id of the new item
    pub item_id: String,
    /// Item type
    pub item_type: String,
}

type ProgressFn<'a> = Box<dyn Fn(&DeployProgress) + Send + Sync + 'a>;

/// Replays an ordered template list into a destination portal.
pub struct Replayer<'a> {
    writer: &'a dyn PortalWriter,
    registry: &'a ConverterRegistry,
    options: DeployOptions,
    resources: Option<ResourceSource<'a>>,
    progress: Option<ProgressFn<'a>>,
}

impl<'a> Replayer<'a> {
    /// Create a replayer writing to `writer`.
    pub fn new(writer: &'a dyn PortalWriter, registry: &'a ConverterRegistry) -> Self {
        Self {
            writer,
            registry,
            options: DeployOptions::default(),
            resources: None,
            progress: None,
        }
    }

    /// Set deployment options.
    #[must_use]
    pub fn with_options(mut self, options: DeployOptions) -> Self {
        self.options = options;
        self
    }

    /// Copy template resources from a solution item.
    #[must_use]
    pub fn with_resource_source(mut self, source: ResourceSource<'a>) -> Self {
        self.resources = Some(source);
        self
    }

    /// Receive a notification after each template finishes.
    #[must_use]
    pub fn on_progress(mut self, callback: impl Fn(&DeployProgress) + Send + Sync + 'a) -> Self {
        self.progress = Some(Box::new(callback));
        self
    }

    /// Deploy `ordered` in sequence, recording each created item in
    /// `dictionary` under its template key.
    ///
    /// `ordered` must already be in dependency order (see
    /// [`crate::resolver::sort_templates`]).
    ///
    /// # Errors
    ///
    /// A [`Failure`] at [`Stage::Deploy`] whose `item_ids` names the template
    /// that failed. Entries for templates created before the failure remain
    /// in `dictionary`; nothing is rolled back.
    pub async fn deploy(
        &self,
        ordered: &[ItemTemplate],
        dictionary: &mut TemplateDictionary,
    ) -> Result<Vec<DeployedItem>, Failure> {
        info!("Deploying {} template(s)", ordered.len());
        let total_cost: u64 =
            ordered.iter().map(|t| u64::from(t.estimated_deployment_cost_factor.max(1))).sum::<u64>().max(1);
        let mut done_cost = 0u64;
        let mut created: HashMap<String, String> = HashMap::new();
        let mut deployed = Vec::with_capacity(ordered.len());
        let throttle = Throttle::new(self.options.resource_copy_delay);

        for (index, template) in ordered.iter().enumerate() {
            debug!("[{}/{}] '{}' {}", index + 1, ordered.len(), template.item_id, DeployState::Pending);
            let item = self
                .deploy_one(template, dictionary, &created, &throttle)
                .await
                .map_err(|err| Failure::from_anyhow(Stage::Deploy, err))?;

            created.insert(template.item_id.clone(), item.item_id.clone());
            deployed.push(item);

            done_cost += u64::from(template.estimated_deployment_cost_factor.max(1));
            debug!("'{}' {}", template.item_id, DeployState::Done);
            if let Some(progress) = &self.progress {
                progress(&DeployProgress {
                    percent: u8::try_from(done_cost * 100 / total_cost).unwrap_or(100),
                    item_id: template.item_id.clone(),
                    title: template.title().to_string(),
                });
            }
        }

        info!("Deployed {} item(s)", deployed.len());
        Ok(deployed)
    }

    async fn deploy_one(
        &self,
        template: &ItemTemplate,
        dictionary: &mut TemplateDictionary,
        created: &HashMap<String, String>,
        throttle: &Throttle,
    ) -> Result<DeployedItem> {
        let creation_failed = |reason: String| SolutionError::CreationFailed {
            item_id: template.item_id.clone(),
            item_type: template.item_type.clone(),
            reason,
        };

        check_placeholders(template, dictionary)?;
        debug!("'{}' {}", template.item_id, DeployState::Templatized);

        let converter = self
            .registry
            .get(&template.item_type)
            .ok_or_else(|| creation_failed(format!("no converter for type '{}'", template.item_type)))?;
        let ctx = DeployContext {
            writer: self.writer,
            dictionary: &*dictionary,
            folder_id: self.options.folder_id.as_deref(),
            created,
        };
        let item = match converter.create_item_from_template(&ctx, template).await {
            Ok(item) => item,
            Err(err) => {
                let reason = format!("{err:#}");
                return Err(err.context(creation_failed(reason)));
            }
        };
        debug!("'{}' {} as {}", template.item_id, DeployState::Created, item.item_id);

        // The item exists from here on, so its entry is kept even if copying fails.
        dictionary.insert(template.key.clone(), item.dictionary_value.clone())?;
        self.copy_resources(template, &item.item_id, throttle).await.map_err(|err| {
            let reason = format!("resource copy failed: {err:#}");
            err.context(SolutionError::PostProcessFailed {
                item_id: template.item_id.clone(),
                created_id: item.item_id.clone(),
                reason,
            })
        })?;
        debug!("'{}' {}", template.item_id, DeployState::PostProcessed);

        Ok(DeployedItem {
            source_id: template.item_id.clone(),
            item_id: item.item_id,
            item_type: item.item_type,
        })
    }

    async fn copy_resources(&self, template: &ItemTemplate, new_id: &str, throttle: &Throttle) -> Result<()> {
        let Some(source) = &self.resources else {
            return Ok(());
        };
        if template.resources.is_empty() {
            return Ok(());
        }
        debug!("Copying {} resource(s) to {}", template.resources.len(), new_id);
        stream::iter(template.resources.iter())
            .map(|resource| async move {
                throttle.wait().await;
                let stored = resource.prefixed(&template.item_id);
                let bytes = source
                    .reader
                    .resource(&source.solution_id, &stored)
                    .await
                    .with_context(|| format!("Failed to read resource '{}'", stored.path()))?;
                self.writer
                    .add_resource(new_id, resource, bytes)
                    .await
                    .with_context(|| format!("Failed to upload resource '{}'", resource.path()))
            })
            .buffer_unordered(self.options.max_parallel_copies.max(1))
            .try_collect::<Vec<()>>()
            .await?;
        Ok(())
    }
}

/// Verify that every placeholder in the template resolves, apart from
/// references to the template's own key, which only exist after creation.
fn check_placeholders(template: &ItemTemplate, dictionary: &TemplateDictionary) -> Result<()> {
    let own_prefix = format!("{}.", template.key);
    let mut unresolved: Vec<String> = [Value::Object(template.item.clone()), template.data.clone()]
        .iter()
        .flat_map(find_placeholders)
        .filter(|path| path != &template.key && !path.starts_with(&own_prefix))
        .filter(|path| dictionary.lookup(path).is_none())
        .map(|path| format!("{{{{{path}}}}}"))
        .collect();
    if unresolved.is_empty() {
        return Ok(());
    }
    unresolved.sort();
    unresolved.dedup();
    Err(SolutionError::UnresolvedPlaceholders {
        item_id: template.item_id.clone(),
        placeholders: unresolved,
    }
    .into())
}

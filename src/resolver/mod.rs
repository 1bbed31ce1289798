//! Dependency resolution for solution items.
//!
//! This module turns one or more root item ids into a complete, self-consistent
//! set of [`ItemTemplate`]s: every item reachable from the roots through the
//! references its payload makes, each templatized so that it can be recreated
//! elsewhere.
//!
//! # Resolution Process
//!
//! For each id, [`DependencyResolver`]:
//! 1. **Reserves** the id in the [`TemplateStore`]. If the id is already present
//!    (resolved, or in flight elsewhere in the walk) resolution stops there;
//!    this is what breaks cycles in the item graph.
//! 2. **Fetches** the item metadata, retrying the id as a group when it is not
//!    an item (groups and items share an id space).
//! 3. **Filters** items tagged `deploy.thumbnail` (consumed as the container's
//!    thumbnail) and unsupported types (skipped with a warning).
//! 4. **Converts** the item through the registered [`ItemConverter`], which
//!    fetches type-specific data and declares the item's dependencies.
//! 5. **Templatizes** every dependency id in `item` and `data` into
//!    `{{<key>.itemId}}` and records the item's resource files.
//! 6. **Populates** the template into the placeholder's slot.
//! 7. **Recurses** into all dependencies concurrently and waits for all of
//!    them; any failure fails the parent.
//!
//! Ordering the resolved set for deployment is the job of
//! [`dependency_graph`].
//!
//! # Example
//!
//! ```rust,no_run
//! use solution_deploy::converters::ConverterRegistry;
//! use solution_deploy::portal::RestPortal;
//! use solution_deploy::resolver::{DependencyResolver, TemplateStore};
//!
//! # async fn example() -> Result<(), solution_deploy::core::Failure> {
//! let portal = RestPortal::new("https://org.example.com/portal", "casey", None);
//! let registry = ConverterRegistry::with_defaults();
//! let store = TemplateStore::new();
//! DependencyResolver::new(&portal, &registry).resolve("4f2e...", &store).await?;
//! println!("{} templates", store.templates().len());
//! # Ok(())
//! # }
//! ```
//!
//! [`ItemConverter`]: crate::converters::ItemConverter

pub mod dependency_graph;
pub mod store;

pub use dependency_graph::{DependencyGraph, order, sort_templates};
pub use store::{Reservation, StoreEntry, TemplateStore};

use anyhow::Result;
use futures::future::try_join_all;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use tracing::{debug, info, warn};

use crate::converters::{ConvertContext, ConverterRegistry};
use crate::core::{Failure, ItemTemplate, SolutionError, Stage, find_solution_error, item_type};
use crate::portal::PortalReader;
use crate::templating::templatize_item_ids;

type ResolveFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// Walks the item graph of a source portal and fills a [`TemplateStore`].
pub struct DependencyResolver<'a> {
    reader: &'a dyn PortalReader,
    registry: &'a ConverterRegistry,
}

impl<'a> DependencyResolver<'a> {
    /// Create a resolver reading from `reader` and converting with `registry`.
    pub fn new(reader: &'a dyn PortalReader, registry: &'a ConverterRegistry) -> Self {
        Self {
            reader,
            registry,
        }
    }

    /// Resolve `root_id` and everything it depends on into `store`.
    ///
    /// Returns immediately if `root_id` is already in the store.
    ///
    /// # Errors
    ///
    /// A [`Failure`] at [`Stage::Resolve`] naming the item whose fetch or
    /// conversion failed. The store's contents are not usable after a failure.
    pub async fn resolve(&self, root_id: &str, store: &TemplateStore) -> Result<(), Failure> {
        self.resolve_item(root_id.to_string(), store)
            .await
            .map_err(|err| Failure::from_anyhow(Stage::Resolve, err))
    }

    /// Resolve several roots concurrently into one store.
    ///
    /// # Errors
    ///
    /// Same as [`resolve`](Self::resolve); the first failure wins.
    pub async fn resolve_all(&self, root_ids: &[String], store: &TemplateStore) -> Result<(), Failure> {
        info!("Resolving {} root item(s)", root_ids.len());
        try_join_all(root_ids.iter().map(|id| self.resolve_item(id.clone(), store)))
            .await
            .map_err(|err| Failure::from_anyhow(Stage::Resolve, err))?;
        info!("Resolved {} item(s)", store.len());
        Ok(())
    }

    fn resolve_item<'s>(&'s self, item_id: String, store: &'s TemplateStore) -> ResolveFuture<'s> {
        Box::pin(async move {
            // Reserve before the first await so a concurrent visit sees the id.
            if store.reserve(&item_id) == Reservation::AlreadyPresent {
                debug!("'{}' already in store, skipping", item_id);
                return Ok(());
            }

            let dependencies = self.populate(&item_id, store).await.map_err(|err| {
                // Errors that already name an item are specific enough.
                if find_solution_error(&err).is_some_and(|typed| !typed.item_ids().is_empty()) {
                    return err;
                }
                let reason = err.root_cause().to_string();
                err.context(SolutionError::ResolutionFailed {
                    item_id: item_id.clone(),
                    reason,
                })
            })?;

            let pending: Vec<String> = dependencies.into_iter().filter(|id| !store.contains(id)).collect();
            if !pending.is_empty() {
                debug!("Resolving {} dependency(ies) of '{}'", pending.len(), item_id);
            }
            try_join_all(pending.into_iter().map(|id| self.resolve_item(id, store))).await?;
            Ok(())
        })
    }

    /// Fetch, convert and templatize one item; returns its dependencies.
    async fn populate(&self, item_id: &str, store: &TemplateStore) -> Result<Vec<String>> {
        let (item, is_group) = match self.reader.item(item_id).await? {
            Some(item) => (item, false),
            None => match self.reader.group(item_id).await? {
                Some(group) => (group, true),
                None => {
                    return Err(SolutionError::ItemNotFound {
                        item_id: item_id.to_string(),
                    }
                    .into());
                }
            },
        };
        let type_name = if is_group {
            item_type::GROUP.to_string()
        } else {
            item.get("type").and_then(Value::as_str).unwrap_or_default().to_string()
        };

        if !is_group && has_thumbnail_tag(&item) {
            info!("Item '{}' is tagged {}; using it as the solution thumbnail", item_id, item_type::THUMBNAIL_SOURCE_TAG);
            store.set_thumbnail_source(item_id);
            store.skip(item_id, &type_name);
            return Ok(Vec::new());
        }

        let Some(converter) = self.registry.get(&type_name) else {
            warn!("Item '{}' has unsupported type '{}'; it will not be templated", item_id, type_name);
            store.skip(item_id, &type_name);
            return Ok(Vec::new());
        };

        let ctx = ConvertContext {
            reader: self.reader,
            store,
        };
        let mut template = converter.convert_item_to_template(&ctx, item).await?;
        if template.item_id != item_id {
            return Err(SolutionError::InvalidTemplate {
                item_id: item_id.to_string(),
                reason: format!("converter produced a template for '{}'", template.item_id),
            }
            .into());
        }
        if template.dependencies.iter().any(|dep| dep == item_id) {
            return Err(SolutionError::SelfDependency {
                item_id: item_id.to_string(),
            }
            .into());
        }

        templatize_references(&mut template, store)?;
        if !is_group {
            template.resources = self.reader.item_resources(item_id).await?;
        }

        debug!(
            "Populated {} '{}' with {} dependency(ies)",
            template.item_type,
            template.item_id,
            template.dependencies.len()
        );
        let dependencies = template.dependencies.clone();
        store.populate(template)?;
        Ok(dependencies)
    }
}

/// Replace every dependency id in the template payload with its placeholder.
fn templatize_references(template: &mut ItemTemplate, store: &TemplateStore) -> Result<()> {
    let references: HashMap<String, String> =
        template.dependencies.iter().map(|id| (id.clone(), store.key_for(id))).collect();
    let mut item = Value::Object(std::mem::take(&mut template.item));
    templatize_item_ids(&mut item, &references)?;
    if let Value::Object(map) = item {
        template.item = map;
    }
    templatize_item_ids(&mut template.data, &references)
}

fn has_thumbnail_tag(item: &Value) -> bool {
    item.get("tags")
        .and_then(Value::as_array)
        .is_some_and(|tags| {
            tags.iter()
                .filter_map(Value::as_str)
                .any(|tag| tag.eq_ignore_ascii_case(item_type::THUMBNAIL_SOURCE_TAG))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_has_thumbnail_tag() {
        assert!(has_thumbnail_tag(&json!({"tags": ["a", "Deploy.Thumbnail"]})));
        assert!(!has_thumbnail_tag(&json!({"tags": ["a"]})));
        assert!(!has_thumbnail_tag(&json!({})));
    }

    #[test]
    fn test_templatize_references() {
        let store = TemplateStore::new();
        let mut template = ItemTemplate::new("app", "Web Mapping Application", "kapp");
        template.data = json!({"values": {"webmap": "map1"}});
        template.item.insert("snippet".into(), json!("Uses map1"));
        template.add_dependency("map1");

        templatize_references(&mut template, &store).unwrap();
        let key = store.key_for("map1");
        assert_eq!(template.data["values"]["webmap"], format!("{{{{{key}.itemId}}}}"));
        assert_eq!(template.item["snippet"], format!("Uses {{{{{key}.itemId}}}}"));
    }
}

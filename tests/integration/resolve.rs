//! Resolving items into a solution.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Value, json};
use solution_deploy::converters::{
    ConvertContext, ConverterRegistry, CreatedItem, DeployContext, ItemConverter, base_template,
};
use solution_deploy::core::{ItemTemplate, SolutionError, Stage};
use solution_deploy::resolver::{DependencyResolver, TemplateStore, sort_templates};
use solution_deploy::solution::{CreateSolutionRequest, create_solution, load_solution};
use solution_deploy::test_utils::{InMemoryPortal, init_test_logging};
use solution_deploy::test_utils::fixtures::{
    feature_service, group, plain_item, seed_app_stack, service_definition, web_app, web_map, web_map_data,
};
use std::sync::Arc;
use std::time::Duration;

fn request(title: &str, roots: &[&str]) -> CreateSolutionRequest {
    let mut request = CreateSolutionRequest::new(title, roots.iter().map(|r| (*r).to_string()).collect());
    request.resource_copy_delay = Duration::ZERO;
    request
}

#[tokio::test]
async fn test_create_solution_from_app_stack() {
    init_test_logging(None);
    let portal = InMemoryPortal::default();
    let stack = seed_app_stack(&portal);
    portal.add_resource_bytes(stack.map, "images/legend.png", b"png-bytes");
    let registry = ConverterRegistry::with_defaults();

    let created = create_solution(&portal, &portal, &registry, &request("Permit Review", &[stack.app]))
        .await
        .unwrap();
    assert_eq!(created.template_count, 3);
    assert!(created.passthrough.is_empty());

    let solution = portal.item_snapshot(&created.solution_id).unwrap();
    assert_eq!(solution["type"], "Solution");
    assert_eq!(solution["title"], "Permit Review");
    assert_eq!(portal.resource_paths(&created.solution_id), vec![format!("{}/images/legend.png", stack.map)]);

    let data = load_solution(&portal, &created.solution_id).await.unwrap();
    assert_eq!(data.metadata.root_ids, vec![stack.app]);
    assert_eq!(data.metadata.source_portal, "https://portal.test/portal");

    let find = |id: &str| data.templates.iter().find(|t| t.item_id == id).cloned().unwrap();
    let (app, map, service) = (find(stack.app), find(stack.map), find(stack.service));

    assert_eq!(app.dependencies, vec![stack.map]);
    assert_eq!(map.dependencies, vec![stack.service]);
    assert!(service.dependencies.is_empty());

    // References point at template keys, never at source ids.
    assert_eq!(app.data["values"]["webmap"], format!("{{{{{}.itemId}}}}", map.key));
    assert_eq!(map.data["operationalLayers"][0]["itemId"], format!("{{{{{}.itemId}}}}", service.key));
    assert_eq!(map.data["operationalLayers"][0]["url"], format!("{{{{{}.layer0.url}}}}", service.key));
    assert_eq!(map.item["extent"], "{{solutionItemExtent}}");
    let url = app.item["url"].as_str().unwrap();
    assert!(url.starts_with("{{portalBaseUrl}}/apps/"));
    assert!(url.ends_with(&format!("{{{{{}.itemId}}}}", app.key)));
    assert!(!serde_json::to_string(&data.templates).unwrap().contains("portal.test"));
    assert_eq!(map.resources.len(), 1);
}

#[tokio::test]
async fn test_shared_dependency_yields_one_template() {
    let portal = InMemoryPortal::default();
    let url = "https://portal.test/portal/rest/services/Hosted/Roads/FeatureServer";
    portal.add_item(feature_service("roads", "Roads", url));
    portal.set_service_definition(url, service_definition(&[(0, &["OBJECTID"][..])]));
    let layer_url = format!("{url}/0");
    for map in ["north", "south"] {
        portal.add_item_with_data(web_map(map, map), web_map_data(&[("roads_0", "roads", layer_url.as_str())]));
    }
    let registry = ConverterRegistry::with_defaults();
    let store = TemplateStore::new();

    DependencyResolver::new(&portal, &registry)
        .resolve_all(&["north".to_string(), "south".to_string()], &store)
        .await
        .unwrap();

    let templates = store.templates();
    assert_eq!(templates.len(), 3);
    assert_eq!(templates.iter().filter(|t| t.item_id == "roads").count(), 1);
    let roads_key = store.key_for("roads");
    for map in templates.iter().filter(|t| t.item_type == "Web Map") {
        assert_eq!(map.data["operationalLayers"][0]["itemId"], format!("{{{{{roads_key}.itemId}}}}"));
    }
    let fetches = portal.calls().iter().filter(|c| c.as_str() == "item:roads").count();
    assert_eq!(fetches, 1);
}

#[tokio::test]
async fn test_cyclic_item_graph_resolves_once_per_item() {
    let portal = InMemoryPortal::default();
    portal.add_item_with_data(
        web_app("app", "Team Viewer", "https://portal.test/portal"),
        json!({ "values": { "group": "grp" } }),
    );
    portal.add_group(group("grp", "Team"), &["app"]);
    let registry = ConverterRegistry::with_defaults();
    let store = TemplateStore::new();

    DependencyResolver::new(&portal, &registry).resolve("app", &store).await.unwrap();

    let templates = store.templates();
    assert_eq!(templates.len(), 2);
    assert!(store.pending().is_empty());
    let calls = portal.calls();
    let count = |call: &str| calls.iter().filter(|c| c.as_str() == call).count();
    assert_eq!(count("item:app"), 1);
    assert_eq!(count("group:grp"), 1);
    assert_eq!(count("group:app"), 0);

    let err = sort_templates(templates).unwrap_err();
    match err.downcast_ref::<SolutionError>() {
        Some(SolutionError::CyclicDependency {
            cycle,
        }) => assert_eq!(cycle, &vec!["app".to_string(), "grp".to_string(), "app".to_string()]),
        other => panic!("expected cyclic dependency, got {other:?}"),
    }
}

#[tokio::test]
async fn test_unsupported_type_is_kept_by_reference() {
    let portal = InMemoryPortal::default();
    portal.add_item(plain_item("doc1", "PDF", "Guide"));
    portal.add_item(plain_item("ms1", "Map Service", "Imagery"));
    portal.add_group(group("grp1", "Team"), &["doc1", "ms1"]);
    let registry = ConverterRegistry::with_defaults();

    let created = create_solution(&portal, &portal, &registry, &request("Team", &["grp1"])).await.unwrap();
    assert_eq!(created.template_count, 2);
    assert_eq!(created.passthrough.len(), 1);
    assert_eq!(created.passthrough[0].item_id, "ms1");
    assert_eq!(created.passthrough[0].item_type, "Map Service");

    let data = load_solution(&portal, &created.solution_id).await.unwrap();
    assert_eq!(data.metadata.passthrough.len(), 1);
    assert!(data.templates.iter().all(|t| t.item_id != "ms1"));
}

#[tokio::test]
async fn test_tagged_item_becomes_solution_thumbnail() {
    let portal = InMemoryPortal::default();
    portal.add_item(plain_item("doc1", "PDF", "Guide"));
    portal.add_item(json!({
        "id": "img1",
        "type": "Image",
        "title": "Cover",
        "tags": ["Deploy.Thumbnail"],
        "thumbnail": "thumbnail/cover.png",
    }));
    portal.set_thumbnail("img1", "thumbnail/cover.png", b"image");
    portal.add_group(group("grp1", "Team"), &["doc1", "img1"]);
    let registry = ConverterRegistry::with_defaults();

    let created = create_solution(&portal, &portal, &registry, &request("Team", &["grp1"])).await.unwrap();
    assert_eq!(created.thumbnail.as_deref(), Some("img1"));
    assert!(created.passthrough.is_empty());
    assert!(portal.resource_paths(&created.solution_id).contains(&"thumbnail/cover.png".to_string()));

    let data = load_solution(&portal, &created.solution_id).await.unwrap();
    let thumbnail = data.metadata.thumbnail.unwrap();
    assert_eq!(thumbnail.resource.as_deref(), Some("thumbnail/cover.png"));
}

#[tokio::test]
async fn test_missing_root_fails_resolution() {
    let portal = InMemoryPortal::default();
    let registry = ConverterRegistry::with_defaults();

    let failure = create_solution(&portal, &portal, &registry, &request("Nothing", &["nope"])).await.unwrap_err();
    assert_eq!(failure.stage, Stage::Resolve);
    assert_eq!(failure.item_ids, vec!["nope"]);
    assert!(matches!(failure.solution_error(), Some(SolutionError::ItemNotFound { .. })));
    assert!(portal.created_ids().is_empty());
}

#[tokio::test]
async fn test_no_roots_is_rejected() {
    let portal = InMemoryPortal::default();
    let registry = ConverterRegistry::with_defaults();

    let failure = create_solution(&portal, &portal, &registry, &request("Empty", &[])).await.unwrap_err();
    assert_eq!(failure.stage, Stage::Resolve);
    assert!(portal.calls().is_empty());
}

/// Converter that lists the item as its own dependency.
struct SelfReferencing;

#[async_trait]
impl ItemConverter for SelfReferencing {
    async fn convert_item_to_template(&self, ctx: &ConvertContext<'_>, item: Value) -> Result<ItemTemplate> {
        let mut template = base_template(ctx, &item, "Loop Item")?;
        let own = template.item_id.clone();
        template.add_dependency(own);
        Ok(template)
    }

    async fn create_item_from_template(
        &self,
        _ctx: &DeployContext<'_>,
        template: &ItemTemplate,
    ) -> Result<CreatedItem> {
        Ok(CreatedItem::new(template.item_id.clone(), "Loop Item"))
    }
}

#[tokio::test]
async fn test_self_dependency_is_rejected() {
    let portal = InMemoryPortal::default();
    portal.add_item(plain_item("loop1", "Loop Item", "Loop"));
    let mut registry = ConverterRegistry::with_defaults();
    registry.register("Loop Item", Arc::new(SelfReferencing));

    let failure = DependencyResolver::new(&portal, &registry)
        .resolve("loop1", &TemplateStore::new())
        .await
        .unwrap_err();
    assert_eq!(failure.stage, Stage::Resolve);
    assert_eq!(failure.item_ids, vec!["loop1"]);
    assert!(matches!(failure.solution_error(), Some(SolutionError::SelfDependency { .. })));
}

//! Deploying solutions into a destination portal.

use serde_json::json;
use solution_deploy::converters::ConverterRegistry;
use solution_deploy::core::{ResourcePath, SolutionError, Stage};
use solution_deploy::deploy::{DeployProgress, Replayer, ResourceSource};
use solution_deploy::resolver::sort_templates;
use solution_deploy::solution::{
    CreateSolutionRequest, DeploySolutionRequest, create_solution, deploy_solution, plan_solution,
};
use solution_deploy::templating::TemplateDictionary;
use solution_deploy::test_utils::{InMemoryPortal, init_test_logging};
use solution_deploy::solution::load_solution;
use solution_deploy::test_utils::fixtures::{
    feature_service, group, plain_item, seed_app_stack, service_definition, web_map,
};
use std::sync::Mutex;
use std::time::Duration;

use crate::common::{fast_options, template};

const DEST_URL: &str = "https://dest.test/portal";

async fn store_solution(source: &InMemoryPortal, title: &str, roots: &[&str]) -> String {
    let mut request = CreateSolutionRequest::new(title, roots.iter().map(|r| (*r).to_string()).collect());
    request.resource_copy_delay = Duration::ZERO;
    create_solution(source, source, &ConverterRegistry::with_defaults(), &request).await.unwrap().solution_id
}

fn deploy_request(solution_id: &str) -> DeploySolutionRequest {
    DeploySolutionRequest {
        solution_id: solution_id.to_string(),
        folder_title: "Permits Copy".to_string(),
        username: "casey".to_string(),
        extent: None,
        options: fast_options(),
    }
}

#[tokio::test]
async fn test_deploy_app_stack_rewires_references() {
    init_test_logging(None);
    let source = InMemoryPortal::default();
    let stack = seed_app_stack(&source);
    source.add_resource_bytes(stack.map, "images/legend.png", b"png-bytes");
    let solution_id = store_solution(&source, "Permit Review", &[stack.app]).await;

    let dest = InMemoryPortal::new(DEST_URL);
    let registry = ConverterRegistry::with_defaults();
    let mut request = deploy_request(&solution_id);
    request.extent = Some(json!([[0, 0], [1, 1]]));
    let mut dictionary = TemplateDictionary::new();

    let deployed = deploy_solution(&source, &dest, &registry, &request, &mut dictionary, None).await.unwrap();

    let sources: Vec<&str> = deployed.items.iter().map(|i| i.source_id.as_str()).collect();
    assert_eq!(sources, vec![stack.service, stack.map, stack.app]);
    let (service_id, map_id, app_id) =
        (&deployed.items[0].item_id, &deployed.items[1].item_id, &deployed.items[2].item_id);

    let service_url = dest.item_snapshot(service_id).unwrap()["url"].as_str().unwrap().to_string();
    assert!(service_url.starts_with(DEST_URL));

    let map_data = dest.data_snapshot(map_id).unwrap();
    assert_eq!(map_data["operationalLayers"][0]["itemId"], service_id.as_str());
    assert_eq!(map_data["operationalLayers"][0]["url"], format!("{service_url}/0"));
    assert_eq!(dest.item_snapshot(map_id).unwrap()["extent"], json!([[0, 0], [1, 1]]));

    assert_eq!(dest.data_snapshot(app_id).unwrap()["values"]["webmap"], map_id.as_str());
    assert_eq!(
        dest.item_snapshot(app_id).unwrap()["url"],
        format!("{DEST_URL}/apps/webappviewer/index.html?id={app_id}")
    );

    assert_eq!(dest.folder_titles(), vec!["Permits Copy"]);
    for item in &deployed.items {
        assert_eq!(dest.folder_of(&item.item_id).as_deref(), Some(deployed.folder_id.as_str()));
    }
    assert_eq!(dest.resource_paths(map_id), vec!["images/legend.png"]);

    let record = dest.data_snapshot(&deployed.solution_id).unwrap();
    assert_eq!(record["metadata"]["sourceSolutionId"], solution_id.as_str());
    assert_eq!(record["items"].as_array().unwrap().len(), 3);

    assert_eq!(dictionary.lookup("portalBaseUrl"), Some(&json!(DEST_URL)));
    assert_eq!(dictionary.lookup("user.username"), Some(&json!("casey")));
    assert_eq!(dictionary.lookup("folderId"), Some(&json!(&deployed.folder_id)));
}

#[tokio::test]
async fn test_deploy_reports_progress_up_to_complete() {
    let source = InMemoryPortal::default();
    let stack = seed_app_stack(&source);
    let solution_id = store_solution(&source, "Permit Review", &[stack.app]).await;
    let dest = InMemoryPortal::new(DEST_URL);

    let seen: Mutex<Vec<(u8, String)>> = Mutex::new(Vec::new());
    let on_progress: &(dyn Fn(&DeployProgress) + Send + Sync) =
        &|progress: &DeployProgress| seen.lock().unwrap().push((progress.percent, progress.item_id.clone()));

    deploy_solution(
        &source,
        &dest,
        &ConverterRegistry::with_defaults(),
        &deploy_request(&solution_id),
        &mut TemplateDictionary::new(),
        Some(on_progress),
    )
    .await
    .unwrap();

    let seen = seen.into_inner().unwrap();
    assert_eq!(seen.len(), 3);
    assert!(seen.windows(2).all(|pair| pair[0].0 <= pair[1].0));
    assert_eq!(seen.last().map(|(percent, id)| (*percent, id.as_str())), Some((100, stack.app)));
}

#[tokio::test]
async fn test_caller_dictionary_entries_win_over_defaults() {
    let source = InMemoryPortal::default();
    let stack = seed_app_stack(&source);
    let solution_id = store_solution(&source, "Permit Review", &[stack.app]).await;
    let dest = InMemoryPortal::new(DEST_URL);

    let mut dictionary = TemplateDictionary::new();
    dictionary.seed("portalBaseUrl", json!("https://apps.dest.test"));
    let deployed = deploy_solution(
        &source,
        &dest,
        &ConverterRegistry::with_defaults(),
        &deploy_request(&solution_id),
        &mut dictionary,
        None,
    )
    .await
    .unwrap();

    let app_id = &deployed.items[2].item_id;
    assert_eq!(
        dest.item_snapshot(app_id).unwrap()["url"],
        format!("https://apps.dest.test/apps/webappviewer/index.html?id={app_id}")
    );
}

#[tokio::test]
async fn test_failure_stops_sequence_and_keeps_earlier_items() {
    init_test_logging(None);
    let dest = InMemoryPortal::new(DEST_URL);
    dest.fail_on_title("Y");
    let registry = ConverterRegistry::with_defaults();
    let ordered = sort_templates(vec![
        template("z", "PDF", &["y"]),
        template("y", "PDF", &["x"]),
        template("x", "PDF", &[]),
    ])
    .unwrap();
    let mut dictionary = TemplateDictionary::new();

    let failure = Replayer::new(&dest, &registry)
        .with_options(fast_options())
        .deploy(&ordered, &mut dictionary)
        .await
        .unwrap_err();

    assert_eq!(failure.stage, Stage::Deploy);
    assert_eq!(failure.item_ids, vec!["y"]);
    assert!(matches!(
        failure.solution_error(),
        Some(SolutionError::CreationFailed { item_id, .. }) if item_id == "y"
    ));
    assert!(failure.to_string().contains("injected failure"));

    assert!(dictionary.contains_key("kx"));
    assert!(!dictionary.contains_key("ky"));
    assert!(!dictionary.contains_key("kz"));
    assert_eq!(dest.created_titles(), vec!["X"]);
    assert!(!dest.calls().iter().any(|call| call == "create_item:Z"));
}

#[tokio::test]
async fn test_resource_copy_failure_names_the_created_item() {
    let source = InMemoryPortal::default();
    let dest = InMemoryPortal::new(DEST_URL);
    let registry = ConverterRegistry::with_defaults();
    let mut y = template("y", "PDF", &["x"]);
    // Not stored in the solution item, so the copy fails.
    y.resources.push(ResourcePath::new(Some("images"), "missing.png"));
    let ordered = sort_templates(vec![template("z", "PDF", &["y"]), y, template("x", "PDF", &[])]).unwrap();
    let mut dictionary = TemplateDictionary::new();

    let failure = Replayer::new(&dest, &registry)
        .with_options(fast_options())
        .with_resource_source(ResourceSource {
            reader: &source,
            solution_id: "sol1".to_string(),
        })
        .deploy(&ordered, &mut dictionary)
        .await
        .unwrap_err();

    assert_eq!(failure.stage, Stage::Deploy);
    assert_eq!(failure.item_ids, vec!["y"]);
    let created_id = match failure.solution_error() {
        Some(SolutionError::PostProcessFailed {
            item_id,
            created_id,
            reason,
        }) => {
            assert_eq!(item_id, "y");
            assert!(reason.contains("missing.png"));
            created_id.clone()
        }
        other => panic!("unexpected error: {other:?}"),
    };
    assert!(dest.created_ids().contains(&created_id));
    // Y exists, so its entry stays; Z was never attempted.
    assert_eq!(dictionary.created_item_id("ky"), Some(created_id.as_str()));
    assert!(!dictionary.contains_key("kz"));
    assert_eq!(dest.created_titles(), vec!["X", "Y"]);
}

#[tokio::test]
async fn test_reference_to_thumbnail_item_keeps_original_id() {
    let source = InMemoryPortal::default();
    source.add_item(json!({
        "id": "img1",
        "type": "Image",
        "title": "Cover",
        "tags": ["deploy.thumbnail"],
        "thumbnail": "thumbnail/cover.png",
    }));
    source.set_thumbnail("img1", "thumbnail/cover.png", b"image");
    source.add_item_with_data(
        plain_item("db1", "Dashboard", "Operations"),
        json!({ "widgets": [{ "type": "imageWidget", "itemId": "img1" }] }),
    );
    let solution_id = store_solution(&source, "Operations", &["db1"]).await;

    let stored = load_solution(&source, &solution_id).await.unwrap();
    assert_eq!(stored.templates.len(), 1);
    assert!(stored.templates[0].dependencies.is_empty());
    assert_eq!(stored.templates[0].data["widgets"][0]["itemId"], "img1");

    let dest = InMemoryPortal::new(DEST_URL);
    let deployed = deploy_solution(
        &source,
        &dest,
        &ConverterRegistry::with_defaults(),
        &deploy_request(&solution_id),
        &mut TemplateDictionary::new(),
        None,
    )
    .await
    .unwrap();

    assert_eq!(deployed.items.len(), 1);
    let data = dest.data_snapshot(&deployed.items[0].item_id).unwrap();
    assert_eq!(data["widgets"][0]["itemId"], "img1");
}

#[tokio::test]
async fn test_web_map_field_references_resolve_on_deploy() {
    let source = InMemoryPortal::default();
    let service_url = "https://portal.test/portal/rest/services/Hosted/Permits/FeatureServer";
    let layer_url = format!("{service_url}/0");
    source.add_item(feature_service("svc1", "Permits", service_url));
    source.set_service_definition(service_url, service_definition(&[(0, &["OBJECTID", "Status"][..])]));
    source.add_item_with_data(
        web_map("map1", "Permit Map"),
        json!({
            "operationalLayers": [{
                "id": "permits_0",
                "itemId": "svc1",
                "url": layer_url.as_str(),
                "layerDefinition": { "definitionExpression": "Status = 'open'" },
                "popupInfo": {
                    "title": "{Status} permit",
                    "fieldInfos": [{ "fieldName": "OBJECTID" }, { "fieldName": "Status" }]
                }
            }]
        }),
    );
    let solution_id = store_solution(&source, "Permit Map", &["map1"]).await;

    let stored = load_solution(&source, &solution_id).await.unwrap();
    let map = stored.templates.iter().find(|t| t.item_id == "map1").unwrap();
    let expression = map.data["operationalLayers"][0]["layerDefinition"]["definitionExpression"].as_str().unwrap();
    assert!(expression.starts_with("{{"), "field names are templatized: {expression}");

    let dest = InMemoryPortal::new(DEST_URL);
    let deployed = deploy_solution(
        &source,
        &dest,
        &ConverterRegistry::with_defaults(),
        &deploy_request(&solution_id),
        &mut TemplateDictionary::new(),
        None,
    )
    .await
    .unwrap();

    let map_id = &deployed.items.iter().find(|i| i.source_id == "map1").unwrap().item_id;
    let layer = &dest.data_snapshot(map_id).unwrap()["operationalLayers"][0];
    assert_eq!(layer["layerDefinition"]["definitionExpression"], "Status = 'open'");
    assert_eq!(layer["popupInfo"]["title"], "{Status} permit");
    assert_eq!(layer["popupInfo"]["fieldInfos"][0]["fieldName"], "OBJECTID");
    assert_eq!(layer["popupInfo"]["fieldInfos"][1]["fieldName"], "Status");
}

#[tokio::test]
async fn test_group_members_are_shared_into_new_group() {
    let source = InMemoryPortal::default();
    source.add_item(plain_item("doc1", "PDF", "Guide"));
    source.add_item(plain_item("ms1", "Map Service", "Imagery"));
    source.add_group(group("grp1", "Team"), &["doc1", "ms1"]);
    let solution_id = store_solution(&source, "Team", &["grp1"]).await;
    let dest = InMemoryPortal::new(DEST_URL);
    let mut dictionary = TemplateDictionary::new();

    let deployed = deploy_solution(
        &source,
        &dest,
        &ConverterRegistry::with_defaults(),
        &deploy_request(&solution_id),
        &mut dictionary,
        None,
    )
    .await
    .unwrap();

    let find = |source_id: &str| {
        deployed.items.iter().find(|i| i.source_id == source_id).map(|i| i.item_id.clone()).unwrap()
    };
    let (doc, team) = (find("doc1"), find("grp1"));
    assert_eq!(dest.shares(&doc), vec![team.clone()]);
    assert_eq!(dest.item_snapshot(&team).unwrap()["title"], "Team");
    assert!(deployed.items.iter().all(|i| i.source_id != "ms1"));
    // The passthrough item keeps its original id.
    assert!(dictionary.keys().any(|key| dictionary.created_item_id(key) == Some("ms1")));
}

#[tokio::test]
async fn test_cyclic_solution_fails_before_creating_anything() {
    let source = InMemoryPortal::default();
    let templates = vec![template("a", "PDF", &["b"]), template("b", "PDF", &["a"])];
    source.add_item_with_data(
        plain_item("sol1", "Solution", "Broken"),
        json!({ "metadata": { "title": "Broken" }, "templates": templates }),
    );
    let dest = InMemoryPortal::new(DEST_URL);

    let failure = deploy_solution(
        &source,
        &dest,
        &ConverterRegistry::with_defaults(),
        &deploy_request("sol1"),
        &mut TemplateDictionary::new(),
        None,
    )
    .await
    .unwrap_err();
    assert_eq!(failure.stage, Stage::Sequence);
    assert!(failure.is_cyclic());
    assert!(dest.folder_titles().is_empty());
    assert!(dest.calls().is_empty());

    let plan = plan_solution(&source, "sol1").await.unwrap_err();
    assert!(plan.is_cyclic());
}

#[tokio::test]
async fn test_plan_lists_creation_order() {
    let source = InMemoryPortal::default();
    let stack = seed_app_stack(&source);
    source.add_item(plain_item("ms1", "Map Service", "Imagery"));
    source.add_group(group("grp1", "Team"), &[stack.app, "ms1"]);
    let solution_id = store_solution(&source, "Team", &["grp1"]).await;

    let plan = plan_solution(&source, &solution_id).await.unwrap();
    let order: Vec<&str> = plan.steps.iter().map(|s| s.item_id.as_str()).collect();
    assert_eq!(order.last(), Some(&"grp1"));
    let position = |id: &str| order.iter().position(|o| *o == id).unwrap();
    assert!(position(stack.service) < position(stack.map));
    assert!(position(stack.map) < position(stack.app));
    assert_eq!(plan.passthrough.len(), 1);
    assert_eq!(plan.trees.len(), 1);
    assert!(plan.trees[0].contains("grp1"));
}

//! Placeholders, substitution and the template dictionary.

use serde_json::json;
use solution_deploy::core::SolutionError;
use solution_deploy::templating::{
    Suffix, TemplateDictionary, detemplatize, find_placeholders, placeholder, templatize_item_ids,
    templatize_service_url,
};
use std::collections::HashMap;

#[test]
fn test_placeholder_forms() {
    assert_eq!(placeholder("k1", Suffix::ItemId), "{{k1.itemId}}");
    assert_eq!(placeholder("k1", Suffix::LayerUrl(2)), "{{k1.layer2.url}}");
    assert_eq!(
        placeholder(
            "k1",
            Suffix::LayerField {
                layer: 0,
                field: "STATUS",
            }
        ),
        "{{k1.layer0.fields.status.name}}"
    );
    assert_eq!(placeholder("portalBaseUrl", Suffix::None), "{{portalBaseUrl}}");
}

#[test]
fn test_templatize_then_detemplatize_restores_source() {
    let source = json!({
        "values": {"webmap": "map0001", "note": "see map0001"},
        "layer": {"url": "https://src.example.com/rest/services/P/FeatureServer/0"},
        "service": "https://src.example.com/rest/services/P/FeatureServer",
    });
    let mut value = source.clone();
    templatize_item_ids(&mut value, &HashMap::from([("map0001".to_string(), "kmap".to_string())])).unwrap();
    templatize_service_url(&mut value, "https://src.example.com/rest/services/P/FeatureServer", "ksvc").unwrap();
    assert_eq!(value["values"]["webmap"], "{{kmap.itemId}}");
    assert_eq!(value["layer"]["url"], "{{ksvc.layer0.url}}");

    let mut dictionary = TemplateDictionary::new();
    dictionary.insert("kmap", json!({"itemId": "map0001"})).unwrap();
    dictionary
        .insert(
            "ksvc",
            json!({
                "url": "https://src.example.com/rest/services/P/FeatureServer",
                "layer0": {"url": "https://src.example.com/rest/services/P/FeatureServer/0"},
            }),
        )
        .unwrap();
    assert_eq!(detemplatize(&value, &dictionary, "app").unwrap(), source);
}

#[test]
fn test_detemplatize_rewires_to_new_items() {
    let template = json!({"webmap": "{{kmap.itemId}}", "url": "{{portalBaseUrl}}/home/item.html?id={{kmap.itemId}}"});
    let mut dictionary = TemplateDictionary::new();
    dictionary.seed("portalBaseUrl", json!("https://dest.example.com/portal"));
    dictionary.insert("kmap", json!({"itemId": "new-map"})).unwrap();

    let out = detemplatize(&template, &dictionary, "app").unwrap();
    assert_eq!(out["webmap"], "new-map");
    assert_eq!(out["url"], "https://dest.example.com/portal/home/item.html?id=new-map");
}

#[test]
fn test_missing_entry_names_the_item_and_placeholder() {
    let err = detemplatize(&json!({"webmap": "{{kmap.itemId}}"}), &TemplateDictionary::new(), "app").unwrap_err();
    match err.downcast_ref::<SolutionError>() {
        Some(SolutionError::UnresolvedPlaceholders {
            item_id,
            placeholders,
        }) => {
            assert_eq!(item_id, "app");
            assert_eq!(placeholders, &vec!["{{kmap.itemId}}".to_string()]);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_find_placeholders_lists_each_path_once() {
    let found = find_placeholders(&json!(["{{k1.itemId}}", "{{k1.itemId}}/x", "{{portalBaseUrl}}"]));
    assert_eq!(found.len(), 2);
    assert!(found.contains("k1.itemId"));
    assert!(found.contains("portalBaseUrl"));
}

#[test]
fn test_dictionary_grows_but_never_overwrites() {
    let mut dictionary = TemplateDictionary::new();
    dictionary.insert("k1", json!({"itemId": "a"})).unwrap();
    assert!(dictionary.insert("k1", json!({"itemId": "b"})).is_err());
    assert_eq!(dictionary.created_item_id("k1"), Some("a"));
    assert_eq!(dictionary.len(), 1);
}

//! Source item fixtures.
//!
//! Small builders for the JSON an ArcGIS-style portal returns, plus
//! [`seed_app_stack`], a realistic app → map → service chain shared by the
//! integration suites.

use serde_json::{Value, json};

use super::InMemoryPortal;
use crate::portal::Portal;

/// Item metadata for a hosted feature service.
#[must_use]
pub fn feature_service(id: &str, title: &str, url: &str) -> Value {
    json!({
        "id": id,
        "type": "Feature Service",
        "title": title,
        "url": url,
        "typeKeywords": ["Data", "Service", "Feature Service", "Hosted Service"],
        "tags": ["fixture"],
        "extent": [[-120.5, 35.0], [-119.5, 36.0]],
        "owner": "source_user",
    })
}

/// Service definition with one layer per `(id, fields)` entry.
#[must_use]
pub fn service_definition(layers: &[(u64, &[&str])]) -> Value {
    let layers: Vec<Value> = layers
        .iter()
        .map(|(id, fields)| {
            json!({
                "id": id,
                "name": format!("Layer {id}"),
                "type": "Feature Layer",
                "fields": fields.iter().map(|f| json!({"name": f, "type": "esriFieldTypeString"})).collect::<Vec<_>>(),
                "relationships": [],
            })
        })
        .collect();
    json!({
        "serviceDescription": "",
        "capabilities": "Query",
        "spatialReference": {"wkid": 4326},
        "layers": layers,
        "tables": [],
    })
}

/// Item metadata for a web map.
#[must_use]
pub fn web_map(id: &str, title: &str) -> Value {
    json!({
        "id": id,
        "type": "Web Map",
        "title": title,
        "extent": [[-120.5, 35.0], [-119.5, 36.0]],
        "owner": "source_user",
    })
}

/// Web map data with one operational layer per `(layer id, item id, url)`.
#[must_use]
pub fn web_map_data(layers: &[(&str, &str, &str)]) -> Value {
    let layers: Vec<Value> = layers
        .iter()
        .map(|(layer_id, item_id, url)| {
            json!({
                "id": layer_id,
                "itemId": item_id,
                "url": url,
                "title": format!("Layer {layer_id}"),
                "layerType": "ArcGISFeatureLayer",
            })
        })
        .collect();
    json!({
        "operationalLayers": layers,
        "baseMap": {"baseMapLayers": [], "title": "Topographic"},
        "version": "2.20",
    })
}

/// Item metadata for a web mapping application hosted on `portal_url`.
#[must_use]
pub fn web_app(id: &str, title: &str, portal_url: &str) -> Value {
    json!({
        "id": id,
        "type": "Web Mapping Application",
        "title": title,
        "url": format!("{portal_url}/apps/webappviewer/index.html?id={id}"),
        "owner": "source_user",
    })
}

/// Web app data pointing at a web map.
#[must_use]
pub fn web_app_data(webmap_id: &str) -> Value {
    json!({
        "values": { "webmap": webmap_id, "title": "Viewer" },
    })
}

/// Group metadata.
#[must_use]
pub fn group(id: &str, title: &str) -> Value {
    json!({
        "id": id,
        "title": title,
        "access": "private",
        "tags": ["fixture"],
        "owner": "source_user",
    })
}

/// Metadata for an item of any other type.
#[must_use]
pub fn plain_item(id: &str, item_type: &str, title: &str) -> Value {
    json!({
        "id": id,
        "type": item_type,
        "title": title,
        "owner": "source_user",
    })
}

/// Ids seeded by [`seed_app_stack`].
#[derive(Debug, Clone, Copy)]
pub struct AppStack {
    /// Web mapping application
    pub app: &'static str,
    /// Web map the app shows
    pub map: &'static str,
    /// Feature service the map draws
    pub service: &'static str,
}

/// Seed an app → map → feature service chain.
///
/// The service has layer 0 with fields `OBJECTID` and `Status`; the map shows
/// that layer; the app shows the map.
pub fn seed_app_stack(portal: &InMemoryPortal) -> AppStack {
    let stack = AppStack {
        app: "app0001",
        map: "map0001",
        service: "svc0001",
    };
    let service_url = format!("{}/rest/services/Hosted/Permits/FeatureServer", portal.portal_url());

    portal.add_item(feature_service(stack.service, "Permits", &service_url));
    portal.set_service_definition(&service_url, service_definition(&[(0, &["OBJECTID", "Status"][..])]));
    portal.add_item_with_data(
        web_map(stack.map, "Permit Map"),
        web_map_data(&[("permits_0", stack.service, &format!("{service_url}/0"))]),
    );
    portal.add_item_with_data(
        web_app(stack.app, "Permit Viewer", portal.portal_url()),
        web_app_data(stack.map),
    );
    stack
}

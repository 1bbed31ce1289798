//! Thin REST implementation of the portal traits over `reqwest`.
//!
//! Every call is one request with `f=json` and the configured token. The
//! portal reports failures as `{"error": {"code", "message"}}` inside an
//! HTTP 200, so responses are inspected for an error object before use.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::multipart;
use serde_json::{Map, Value, json};
use tracing::debug;

use super::{CreateItemRequest, CreateServiceRequest, CreatedService, Portal, PortalReader, PortalWriter};
use crate::core::{ResourcePath, SolutionError};

/// Portal error codes that mean "no such item or group".
const NOT_FOUND_CODES: &[i64] = &[400, 404];

/// A portal reached over its sharing REST API.
#[derive(Debug, Clone)]
pub struct RestPortal {
    client: reqwest::Client,
    portal_url: String,
    username: String,
    token: Option<String>,
}

impl RestPortal {
    /// Connect to the portal at `portal_url` as `username`.
    pub fn new(portal_url: impl Into<String>, username: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            portal_url: portal_url.into().trim_end_matches('/').to_string(),
            username: username.into(),
            token,
        }
    }

    fn rest_url(&self, path: &str) -> String {
        format!("{}/sharing/rest/{}", self.portal_url, path.trim_start_matches('/'))
    }

    fn user_url(&self, path: &str) -> String {
        self.rest_url(&format!("content/users/{}/{}", self.username, path))
    }

    fn auth_query(&self) -> Vec<(&'static str, String)> {
        let mut query = vec![("f", "json".to_string())];
        if let Some(token) = &self.token {
            query.push(("token", token.clone()));
        }
        query
    }

    async fn send(&self, operation: &str, request: reqwest::RequestBuilder) -> Result<Value> {
        let response = request.send().await.map_err(|e| SolutionError::NetworkError {
            operation: operation.to_string(),
            reason: e.to_string(),
        })?;
        let status = response.status();
        let text = response
            .text()
            .await
            .with_context(|| format!("Failed to read response body for {operation}"))?;
        if !status.is_success() {
            return Err(SolutionError::PortalError {
                operation: operation.to_string(),
                code: i64::from(status.as_u16()),
                message: text,
            }
            .into());
        }
        let value: Value = serde_json::from_str(&text)
            .with_context(|| format!("Portal returned invalid JSON for {operation}"))?;
        if let Some(error) = value.get("error") {
            return Err(SolutionError::PortalError {
                operation: operation.to_string(),
                code: error.get("code").and_then(Value::as_i64).unwrap_or_default(),
                message: error.get("message").and_then(Value::as_str).unwrap_or("unknown error").to_string(),
            }
            .into());
        }
        Ok(value)
    }

    async fn get_json(&self, operation: &str, url: &str, query: &[(&str, String)]) -> Result<Value> {
        debug!("GET {} ({})", url, operation);
        let request = self.client.get(url).query(&self.auth_query()).query(query);
        self.send(operation, request).await
    }

    async fn get_optional(&self, operation: &str, url: &str) -> Result<Option<Value>> {
        match self.get_json(operation, url, &[]).await {
            Ok(value) => Ok(Some(value)),
            Err(err) => match err.downcast_ref::<SolutionError>() {
                Some(SolutionError::PortalError {
                    code,
                    ..
                }) if NOT_FOUND_CODES.contains(code) => Ok(None),
                _ => Err(err),
            },
        }
    }

    async fn get_bytes(&self, operation: &str, url: &str) -> Result<Vec<u8>> {
        debug!("GET {} ({})", url, operation);
        let query: Vec<(&str, String)> =
            self.auth_query().into_iter().filter(|(name, _)| *name == "token").collect();
        let response = self.client.get(url).query(&query).send().await.map_err(|e| {
            SolutionError::NetworkError {
                operation: operation.to_string(),
                reason: e.to_string(),
            }
        })?;
        if !response.status().is_success() {
            return Err(SolutionError::PortalError {
                operation: operation.to_string(),
                code: i64::from(response.status().as_u16()),
                message: "request failed".to_string(),
            }
            .into());
        }
        Ok(response.bytes().await?.to_vec())
    }

    async fn post_form(&self, operation: &str, url: &str, fields: Vec<(String, String)>) -> Result<Value> {
        debug!("POST {} ({})", url, operation);
        let mut form: Vec<(String, String)> =
            self.auth_query().into_iter().map(|(name, value)| (name.to_string(), value)).collect();
        form.extend(fields);
        let request = self.client.post(url).form(&form);
        self.send(operation, request).await
    }
}

/// Flatten item metadata into form fields; non-string values are JSON encoded,
/// arrays of strings are comma separated as the portal expects for tags.
fn form_fields(item: &Map<String, Value>) -> Vec<(String, String)> {
    item.iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(name, value)| {
            let text = match value {
                Value::String(s) => s.clone(),
                Value::Array(values) if values.iter().all(Value::is_string) => values
                    .iter()
                    .filter_map(Value::as_str)
                    .collect::<Vec<_>>()
                    .join(","),
                other => other.to_string(),
            };
            (name.clone(), text)
        })
        .collect()
}

fn ids_from(value: &Value, list: &str) -> Vec<String> {
    value
        .get(list)
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| entry.get("id").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn required_str(value: &Value, field: &str, operation: &str) -> Result<String> {
    value.get(field).and_then(Value::as_str).map(str::to_string).ok_or_else(|| {
        SolutionError::PortalError {
            operation: operation.to_string(),
            code: 0,
            message: format!("response has no '{field}'"),
        }
        .into()
    })
}

impl Portal for RestPortal {
    fn portal_url(&self) -> &str {
        &self.portal_url
    }
}

#[async_trait]
impl PortalReader for RestPortal {
    async fn item(&self, item_id: &str) -> Result<Option<Value>> {
        self.get_optional("getItem", &self.rest_url(&format!("content/items/{item_id}"))).await
    }

    async fn group(&self, group_id: &str) -> Result<Option<Value>> {
        self.get_optional("getGroup", &self.rest_url(&format!("community/groups/{group_id}"))).await
    }

    async fn item_data(&self, item_id: &str) -> Result<Option<Value>> {
        let data = self.get_optional("getItemData", &self.rest_url(&format!("content/items/{item_id}/data"))).await?;
        Ok(data.filter(|value| !value.as_object().is_some_and(Map::is_empty)))
    }

    async fn item_resources(&self, item_id: &str) -> Result<Vec<ResourcePath>> {
        let value = self
            .get_json("getItemResources", &self.rest_url(&format!("content/items/{item_id}/resources")), &[])
            .await?;
        Ok(value
            .get("resources")
            .and_then(Value::as_array)
            .map(|resources| {
                resources
                    .iter()
                    .filter_map(|r| r.get("resource").and_then(Value::as_str))
                    .map(ResourcePath::parse)
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn resource(&self, item_id: &str, path: &ResourcePath) -> Result<Vec<u8>> {
        let url = self.rest_url(&format!("content/items/{item_id}/resources/{}", path.path()));
        self.get_bytes("getItemResource", &url).await
    }

    async fn group_contents(&self, group_id: &str) -> Result<Vec<String>> {
        let value = self
            .get_json(
                "getGroupContents",
                &self.rest_url(&format!("content/groups/{group_id}")),
                &[("num", "100".to_string())],
            )
            .await?;
        Ok(ids_from(&value, "items"))
    }

    async fn related_items(&self, item_id: &str, relationship: &str) -> Result<Vec<String>> {
        let value = self
            .get_json(
                "getRelatedItems",
                &self.rest_url(&format!("content/items/{item_id}/relatedItems")),
                &[("relationshipType", relationship.to_string()), ("direction", "forward".to_string())],
            )
            .await?;
        Ok(ids_from(&value, "relatedItems"))
    }

    async fn service_definition(&self, url: &str) -> Result<Value> {
        let base = url.trim_end_matches('/');
        let mut service = self.get_json("getServiceDefinition", base, &[]).await?;
        let layers = self.get_json("getServiceLayers", &format!("{base}/layers"), &[]).await?;
        if let Value::Object(map) = &mut service {
            map.insert("layers".to_string(), layers.get("layers").cloned().unwrap_or(json!([])));
            map.insert("tables".to_string(), layers.get("tables").cloned().unwrap_or(json!([])));
        }
        Ok(service)
    }

    async fn thumbnail(&self, item_id: &str, name: &str) -> Result<Vec<u8>> {
        self.get_bytes("getThumbnail", &self.rest_url(&format!("content/items/{item_id}/info/{name}")))
            .await
    }

    async fn metadata(&self, item_id: &str) -> Result<Option<String>> {
        let url = self.rest_url(&format!("content/items/{item_id}/info/metadata/metadata.xml"));
        match self.get_bytes("getMetadata", &url).await {
            Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
            Err(err) => match err.downcast_ref::<SolutionError>() {
                Some(SolutionError::PortalError {
                    code,
                    ..
                }) if NOT_FOUND_CODES.contains(code) => Ok(None),
                _ => Err(err),
            },
        }
    }
}

#[async_trait]
impl PortalWriter for RestPortal {
    async fn create_folder(&self, title: &str) -> Result<String> {
        let value = self
            .post_form("createFolder", &self.user_url("createFolder"), vec![("title".into(), title.into())])
            .await?;
        value
            .get("folder")
            .map(|folder| required_str(folder, "id", "createFolder"))
            .unwrap_or_else(|| required_str(&value, "id", "createFolder"))
    }

    async fn create_item(&self, request: CreateItemRequest) -> Result<String> {
        let url = match &request.folder {
            Some(folder) => self.user_url(&format!("{folder}/addItem")),
            None => self.user_url("addItem"),
        };
        let mut fields = form_fields(&request.item);
        if let Some(data) = &request.data {
            fields.push(("text".into(), data.to_string()));
        }
        let value = self.post_form("addItem", &url, fields).await?;
        required_str(&value, "id", "addItem")
    }

    async fn update_item(&self, item_id: &str, fields: Map<String, Value>, data: Option<Value>) -> Result<()> {
        let mut form = form_fields(&fields);
        if let Some(data) = data {
            form.push(("text".into(), data.to_string()));
        }
        self.post_form("updateItem", &self.user_url(&format!("items/{item_id}/update")), form).await?;
        Ok(())
    }

    async fn add_resource(&self, item_id: &str, path: &ResourcePath, bytes: Vec<u8>) -> Result<()> {
        let url = self.user_url(&format!("items/{item_id}/addResources"));
        debug!("POST {} (addResources {})", url, path.path());
        let mut form = multipart::Form::new()
            .text("f", "json")
            .part("file", multipart::Part::bytes(bytes).file_name(path.filename.clone()));
        if let Some(folder) = &path.folder {
            form = form.text("resourcesPrefix", folder.clone());
        }
        if let Some(token) = &self.token {
            form = form.text("token", token.clone());
        }
        self.send("addResources", self.client.post(url).multipart(form)).await?;
        Ok(())
    }

    async fn create_group(&self, fields: Map<String, Value>) -> Result<String> {
        let mut form = form_fields(&fields);
        if !fields.contains_key("access") {
            form.push(("access".into(), "private".into()));
        }
        let value = self.post_form("createGroup", &self.rest_url("community/createGroup"), form).await?;
        value
            .get("group")
            .map(|group| required_str(group, "id", "createGroup"))
            .unwrap_or_else(|| required_str(&value, "id", "createGroup"))
    }

    async fn share_item(&self, item_id: &str, access: Option<&str>, group_ids: &[String]) -> Result<()> {
        let mut form = vec![("groups".to_string(), group_ids.join(","))];
        match access {
            Some("public") => {
                form.push(("everyone".into(), "true".into()));
                form.push(("org".into(), "true".into()));
            }
            Some("org") => form.push(("org".into(), "true".into())),
            _ => {}
        }
        self.post_form("shareItem", &self.user_url(&format!("items/{item_id}/share")), form).await?;
        Ok(())
    }

    async fn move_item(&self, item_id: &str, folder: &str) -> Result<()> {
        self.post_form(
            "moveItem",
            &self.user_url(&format!("items/{item_id}/move")),
            vec![("folder".into(), folder.into())],
        )
        .await?;
        Ok(())
    }

    async fn create_service(&self, request: CreateServiceRequest) -> Result<CreatedService> {
        let url = match &request.folder {
            Some(folder) => self.user_url(&format!("{folder}/createService")),
            None => self.user_url("createService"),
        };
        let mut form = form_fields(&request.item);
        form.push(("createParameters".into(), request.parameters.to_string()));
        form.push(("outputType".into(), "featureService".into()));
        let value = self.post_form("createService", &url, form).await?;
        let url = value
            .get("encodedServiceURL")
            .or_else(|| value.get("serviceurl"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| SolutionError::PortalError {
                operation: "createService".to_string(),
                code: 0,
                message: "response has no service url".to_string(),
            })?;
        Ok(CreatedService {
            item_id: required_str(&value, "serviceItemId", "createService")?,
            name: value
                .get("name")
                .and_then(Value::as_str)
                .map_or_else(|| url.rsplit('/').nth(1).unwrap_or_default().to_string(), str::to_string),
            url,
        })
    }

    async fn add_to_service_definition(&self, service_url: &str, definition: Value) -> Result<()> {
        let admin_url = format!(
            "{}/addToDefinition",
            service_url.trim_end_matches('/').replacen("/rest/services", "/rest/admin/services", 1)
        );
        self.post_form(
            "addToDefinition",
            &admin_url,
            vec![("addToDefinition".into(), definition.to_string())],
        )
        .await?;
        Ok(())
    }
}

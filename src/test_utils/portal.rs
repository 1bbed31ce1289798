//! In-memory portal for tests.
//!
//! [`InMemoryPortal`] implements both [`PortalReader`] and [`PortalWriter`]
//! over plain maps. Seed it with source items, run an operation, then inspect
//! what was created. Creation can be made to fail for a given title, and every
//! call is recorded in order.

use anyhow::{Result, bail};
use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::core::{ResourcePath, SolutionError};
use crate::portal::{
    CreateItemRequest, CreateServiceRequest, CreatedService, Portal, PortalReader, PortalWriter,
};

#[derive(Debug, Default)]
struct State {
    items: HashMap<String, Value>,
    groups: HashMap<String, Value>,
    data: HashMap<String, Value>,
    resources: HashMap<String, BTreeMap<String, Vec<u8>>>,
    group_contents: HashMap<String, Vec<String>>,
    related: HashMap<(String, String), Vec<String>>,
    service_definitions: HashMap<String, Value>,
    thumbnails: HashMap<(String, String), Vec<u8>>,
    metadata: HashMap<String, String>,
    folders: Vec<(String, String)>,
    item_folders: HashMap<String, String>,
    shares: HashMap<String, Vec<String>>,
    created: Vec<String>,
    failing_titles: HashSet<String>,
    calls: Vec<String>,
    next_id: usize,
}

impl State {
    fn mint(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}{:03}", self.next_id)
    }

    fn check_title(&self, operation: &str, fields: &Map<String, Value>) -> Result<()> {
        let title = fields.get("title").and_then(Value::as_str).unwrap_or_default();
        if self.failing_titles.contains(title) {
            return Err(SolutionError::PortalError {
                operation: operation.to_string(),
                code: 500,
                message: format!("injected failure for '{title}'"),
            }
            .into());
        }
        Ok(())
    }
}

/// A portal held entirely in memory.
#[derive(Debug)]
pub struct InMemoryPortal {
    url: String,
    state: Mutex<State>,
}

impl Default for InMemoryPortal {
    fn default() -> Self {
        Self::new("https://portal.test/portal")
    }
}

impl InMemoryPortal {
    /// Empty portal at `url`.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            state: Mutex::new(State::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add an item; its id is taken from the `id` field.
    pub fn add_item(&self, item: Value) -> &Self {
        let id = item["id"].as_str().unwrap_or_default().to_string();
        self.state().items.insert(id, item);
        self
    }

    /// Add an item together with its data payload.
    pub fn add_item_with_data(&self, item: Value, data: Value) -> &Self {
        let id = item["id"].as_str().unwrap_or_default().to_string();
        self.add_item(item);
        self.state().data.insert(id, data);
        self
    }

    /// Add a group and the ids shared into it.
    pub fn add_group(&self, group: Value, contents: &[&str]) -> &Self {
        let id = group["id"].as_str().unwrap_or_default().to_string();
        let mut state = self.state();
        state.group_contents.insert(id.clone(), contents.iter().map(|s| (*s).to_string()).collect());
        state.groups.insert(id, group);
        drop(state);
        self
    }

    /// Store a resource file on an item.
    pub fn add_resource_bytes(&self, item_id: &str, path: &str, bytes: &[u8]) -> &Self {
        self.state()
            .resources
            .entry(item_id.to_string())
            .or_default()
            .insert(path.to_string(), bytes.to_vec());
        self
    }

    /// Relate `from` to `to` under `relationship`.
    pub fn add_relationship(&self, from: &str, relationship: &str, to: &str) -> &Self {
        self.state()
            .related
            .entry((from.to_string(), relationship.to_string()))
            .or_default()
            .push(to.to_string());
        self
    }

    /// Serve `definition` for a service url.
    pub fn set_service_definition(&self, url: &str, definition: Value) -> &Self {
        self.state().service_definitions.insert(url.to_string(), definition);
        self
    }

    /// Serve thumbnail bytes for an item.
    pub fn set_thumbnail(&self, item_id: &str, name: &str, bytes: &[u8]) -> &Self {
        self.state().thumbnails.insert((item_id.to_string(), name.to_string()), bytes.to_vec());
        self
    }

    /// Make creation of any item, group or service with this title fail.
    pub fn fail_on_title(&self, title: &str) -> &Self {
        self.state().failing_titles.insert(title.to_string());
        self
    }

    /// Item metadata by id, source or created.
    #[must_use]
    pub fn item_snapshot(&self, item_id: &str) -> Option<Value> {
        let state = self.state();
        state.items.get(item_id).or_else(|| state.groups.get(item_id)).cloned()
    }

    /// Data payload by id.
    #[must_use]
    pub fn data_snapshot(&self, item_id: &str) -> Option<Value> {
        self.state().data.get(item_id).cloned()
    }

    /// Ids created through the writer, in order.
    #[must_use]
    pub fn created_ids(&self) -> Vec<String> {
        self.state().created.clone()
    }

    /// Titles of created items, in creation order.
    #[must_use]
    pub fn created_titles(&self) -> Vec<String> {
        let state = self.state();
        state
            .created
            .iter()
            .filter_map(|id| state.items.get(id).or_else(|| state.groups.get(id)))
            .filter_map(|item| item.get("title").and_then(Value::as_str).map(str::to_string))
            .collect()
    }

    /// Resource paths stored on an item.
    #[must_use]
    pub fn resource_paths(&self, item_id: &str) -> Vec<String> {
        self.state().resources.get(item_id).map(|r| r.keys().cloned().collect()).unwrap_or_default()
    }

    /// Group ids an item was shared into.
    #[must_use]
    pub fn shares(&self, item_id: &str) -> Vec<String> {
        self.state().shares.get(item_id).cloned().unwrap_or_default()
    }

    /// Folder an item was created in or moved to.
    #[must_use]
    pub fn folder_of(&self, item_id: &str) -> Option<String> {
        self.state().item_folders.get(item_id).cloned()
    }

    /// Titles of created folders.
    #[must_use]
    pub fn folder_titles(&self) -> Vec<String> {
        self.state().folders.iter().map(|(_, title)| title.clone()).collect()
    }

    /// Every call made, as `operation:target`.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }
}

impl Portal for InMemoryPortal {
    fn portal_url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl PortalReader for InMemoryPortal {
    async fn item(&self, item_id: &str) -> Result<Option<Value>> {
        let mut state = self.state();
        state.calls.push(format!("item:{item_id}"));
        Ok(state.items.get(item_id).cloned())
    }

    async fn group(&self, group_id: &str) -> Result<Option<Value>> {
        let mut state = self.state();
        state.calls.push(format!("group:{group_id}"));
        Ok(state.groups.get(group_id).cloned())
    }

    async fn item_data(&self, item_id: &str) -> Result<Option<Value>> {
        Ok(self.state().data.get(item_id).cloned())
    }

    async fn item_resources(&self, item_id: &str) -> Result<Vec<ResourcePath>> {
        Ok(self
            .state()
            .resources
            .get(item_id)
            .map(|files| files.keys().map(|p| ResourcePath::parse(p)).collect())
            .unwrap_or_default())
    }

    async fn resource(&self, item_id: &str, path: &ResourcePath) -> Result<Vec<u8>> {
        let state = self.state();
        match state.resources.get(item_id).and_then(|files| files.get(&path.path())) {
            Some(bytes) => Ok(bytes.clone()),
            None => bail!("resource '{}' not found on '{item_id}'", path.path()),
        }
    }

    async fn group_contents(&self, group_id: &str) -> Result<Vec<String>> {
        Ok(self.state().group_contents.get(group_id).cloned().unwrap_or_default())
    }

    async fn related_items(&self, item_id: &str, relationship: &str) -> Result<Vec<String>> {
        Ok(self
            .state()
            .related
            .get(&(item_id.to_string(), relationship.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn service_definition(&self, url: &str) -> Result<Value> {
        Ok(self
            .state()
            .service_definitions
            .get(url)
            .cloned()
            .unwrap_or_else(|| json!({ "layers": [], "tables": [] })))
    }

    async fn thumbnail(&self, item_id: &str, name: &str) -> Result<Vec<u8>> {
        let state = self.state();
        match state.thumbnails.get(&(item_id.to_string(), name.to_string())) {
            Some(bytes) => Ok(bytes.clone()),
            None => bail!("thumbnail '{name}' not found on '{item_id}'"),
        }
    }

    async fn metadata(&self, item_id: &str) -> Result<Option<String>> {
        Ok(self.state().metadata.get(item_id).cloned())
    }
}

#[async_trait]
impl PortalWriter for InMemoryPortal {
    async fn create_folder(&self, title: &str) -> Result<String> {
        let mut state = self.state();
        let id = state.mint("folder");
        state.calls.push(format!("create_folder:{title}"));
        state.folders.push((id.clone(), title.to_string()));
        Ok(id)
    }

    async fn create_item(&self, request: CreateItemRequest) -> Result<String> {
        let mut state = self.state();
        let title = request.item.get("title").and_then(Value::as_str).unwrap_or_default().to_string();
        state.calls.push(format!("create_item:{title}"));
        state.check_title("addItem", &request.item)?;

        let id = state.mint("new");
        let mut item = request.item;
        item.insert("id".to_string(), json!(id));
        state.items.insert(id.clone(), Value::Object(item));
        if let Some(data) = request.data {
            state.data.insert(id.clone(), data);
        }
        if let Some(folder) = request.folder {
            state.item_folders.insert(id.clone(), folder);
        }
        state.created.push(id.clone());
        Ok(id)
    }

    async fn update_item(&self, item_id: &str, fields: Map<String, Value>, data: Option<Value>) -> Result<()> {
        let mut state = self.state();
        state.calls.push(format!("update_item:{item_id}"));
        let Some(Value::Object(item)) = state.items.get_mut(item_id) else {
            bail!("cannot update unknown item '{item_id}'");
        };
        item.extend(fields);
        if let Some(data) = data {
            state.data.insert(item_id.to_string(), data);
        }
        Ok(())
    }

    async fn add_resource(&self, item_id: &str, path: &ResourcePath, bytes: Vec<u8>) -> Result<()> {
        let mut state = self.state();
        state.calls.push(format!("add_resource:{item_id}/{}", path.path()));
        state.resources.entry(item_id.to_string()).or_default().insert(path.path(), bytes);
        Ok(())
    }

    async fn create_group(&self, fields: Map<String, Value>) -> Result<String> {
        let mut state = self.state();
        let title = fields.get("title").and_then(Value::as_str).unwrap_or_default().to_string();
        state.calls.push(format!("create_group:{title}"));
        state.check_title("createGroup", &fields)?;

        let id = state.mint("group");
        let mut group = fields;
        group.insert("id".to_string(), json!(id));
        state.groups.insert(id.clone(), Value::Object(group));
        state.created.push(id.clone());
        Ok(id)
    }

    async fn share_item(&self, item_id: &str, access: Option<&str>, group_ids: &[String]) -> Result<()> {
        let mut state = self.state();
        state.calls.push(format!("share_item:{item_id}"));
        if let Some(access) = access
            && let Some(Value::Object(item)) = state.items.get_mut(item_id)
        {
            item.insert("access".to_string(), json!(access));
        }
        state.shares.entry(item_id.to_string()).or_default().extend(group_ids.iter().cloned());
        Ok(())
    }

    async fn move_item(&self, item_id: &str, folder: &str) -> Result<()> {
        let mut state = self.state();
        state.calls.push(format!("move_item:{item_id}"));
        state.item_folders.insert(item_id.to_string(), folder.to_string());
        Ok(())
    }

    async fn create_service(&self, request: CreateServiceRequest) -> Result<CreatedService> {
        let mut state = self.state();
        let title = request.item.get("title").and_then(Value::as_str).unwrap_or_default().to_string();
        state.calls.push(format!("create_service:{title}"));
        state.check_title("createService", &request.item)?;

        let name = request.parameters.get("name").and_then(Value::as_str).unwrap_or("service").to_string();
        let id = state.mint("svc");
        let url = format!("{}/rest/services/Hosted/{name}/FeatureServer", self.url);
        let mut item = request.item;
        item.insert("id".to_string(), json!(id));
        item.insert("url".to_string(), json!(url));
        state.items.insert(id.clone(), Value::Object(item));
        if let Some(folder) = request.folder {
            state.item_folders.insert(id.clone(), folder);
        }
        state.created.push(id.clone());
        Ok(CreatedService {
            item_id: id,
            url,
            name,
        })
    }

    async fn add_to_service_definition(&self, service_url: &str, definition: Value) -> Result<()> {
        let mut state = self.state();
        state.calls.push(format!("add_to_definition:{service_url}"));
        state.service_definitions.insert(service_url.to_string(), definition);
        Ok(())
    }
}

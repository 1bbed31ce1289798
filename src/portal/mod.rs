//! The portal: the external item store the core reads from and writes to.
//!
//! The resolver and the replayer only ever talk to the portal through the
//! [`PortalReader`] and [`PortalWriter`] traits, so the same engine runs
//! against [`RestPortal`] in production and an in-memory fake in tests.
//! Everything behind these traits (sessions, request encoding, retries) is
//! glue and stays thin.

pub mod rest;

pub use rest::RestPortal;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::ResourcePath;

/// Relationship type linking a view service to its source services.
pub const SERVICE_TO_SERVICE: &str = "Service2Service";

/// Identity shared by both sides of a portal connection.
pub trait Portal: Send + Sync {
    /// Base url of the portal (`https://org.example.com/portal`).
    fn portal_url(&self) -> &str;
}

/// Read access to the source portal.
#[async_trait]
pub trait PortalReader: Portal {
    /// Item metadata, `None` if the id is not an item.
    async fn item(&self, item_id: &str) -> Result<Option<Value>>;

    /// Group metadata, `None` if the id is not a group.
    async fn group(&self, group_id: &str) -> Result<Option<Value>>;

    /// The item's data payload, `None` if it has none.
    async fn item_data(&self, item_id: &str) -> Result<Option<Value>>;

    /// Auxiliary files stored with the item.
    async fn item_resources(&self, item_id: &str) -> Result<Vec<ResourcePath>>;

    /// Bytes of one auxiliary file.
    async fn resource(&self, item_id: &str, path: &ResourcePath) -> Result<Vec<u8>>;

    /// Ids of the items shared into a group.
    async fn group_contents(&self, group_id: &str) -> Result<Vec<String>>;

    /// Ids of items related to `item_id` in the forward direction.
    async fn related_items(&self, item_id: &str, relationship: &str) -> Result<Vec<String>>;

    /// Service definition with `layers` and `tables`, each carrying `fields`
    /// and `relationships`.
    async fn service_definition(&self, url: &str) -> Result<Value>;

    /// Thumbnail bytes.
    async fn thumbnail(&self, item_id: &str, name: &str) -> Result<Vec<u8>>;

    /// Metadata XML, `None` if the item has none.
    async fn metadata(&self, item_id: &str) -> Result<Option<String>>;
}

/// Parameters for [`PortalWriter::create_item`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateItemRequest {
    /// Item metadata; must include `type` and `title`
    pub item: Map<String, Value>,
    /// Data payload
    pub data: Option<Value>,
    /// Destination folder id, `None` for the root folder
    pub folder: Option<String>,
}

/// Parameters for [`PortalWriter::create_service`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateServiceRequest {
    /// Item metadata for the service item
    pub item: Map<String, Value>,
    /// Service-level parameters (`name`, `spatialReference`, capabilities, ...)
    pub parameters: Value,
    /// Destination folder id
    pub folder: Option<String>,
}

/// Result of [`PortalWriter::create_service`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedService {
    /// Id of the new service item
    pub item_id: String,
    /// Url of the new service
    pub url: String,
    /// Service name as assigned by the portal
    pub name: String,
}

/// Write access to the destination portal.
#[async_trait]
pub trait PortalWriter: Portal {
    /// Create a folder for the signed-in user, returning its id.
    async fn create_folder(&self, title: &str) -> Result<String>;

    /// Create an item, returning its id.
    async fn create_item(&self, request: CreateItemRequest) -> Result<String>;

    /// Update item metadata fields and optionally replace its data.
    async fn update_item(&self, item_id: &str, fields: Map<String, Value>, data: Option<Value>) -> Result<()>;

    /// Upload one auxiliary file.
    async fn add_resource(&self, item_id: &str, path: &ResourcePath, bytes: Vec<u8>) -> Result<()>;

    /// Create a group, returning its id.
    async fn create_group(&self, fields: Map<String, Value>) -> Result<String>;

    /// Set access level and/or share into groups.
    async fn share_item(&self, item_id: &str, access: Option<&str>, group_ids: &[String]) -> Result<()>;

    /// Move an item to a folder.
    async fn move_item(&self, item_id: &str, folder: &str) -> Result<()>;

    /// Create an empty hosted service.
    async fn create_service(&self, request: CreateServiceRequest) -> Result<CreatedService>;

    /// Add layers and tables to a hosted service.
    async fn add_to_service_definition(&self, service_url: &str, definition: Value) -> Result<()>;
}

//! Global configuration management for soldeploy.
//!
//! This module handles the global user configuration file
//! (`~/.soldeploy/config.toml`) which stores portal connection profiles and
//! deployment tuning. Portal tokens live only here, never in solution items.
//!
//! # Configuration File Location
//!
//! - **Unix/macOS**: `~/.soldeploy/config.toml`
//! - **Windows**: `%LOCALAPPDATA%\soldeploy\config.toml`
//!
//! The location can be overridden with `--config` or the
//! `SOLDEPLOY_CONFIG_PATH` environment variable.
//!
//! # File Format
//!
//! ```toml
//! [portals.source]
//! url = "https://source.example.com/portal"
//! username = "casey"
//! token = "..."
//!
//! [portals.dest]
//! url = "https://dest.example.com/portal"
//! username = "casey"
//!
//! [deploy]
//! resource_copy_delay_ms = 1000
//! max_parallel_copies = 4
//! default_folder_prefix = "Deployed"
//! ```
//!
//! Tokens are obtained out of band and pasted in; signing in is not handled
//! here.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

use crate::constants::{CONFIG_PATH_ENV, DEFAULT_MAX_PARALLEL_COPIES, DEFAULT_RESOURCE_COPY_DELAY_MS};
use crate::core::SolutionError;
use crate::deploy::DeployOptions;

/// Connection details for one portal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortalProfile {
    /// Portal base url
    pub url: String,
    /// User that owns created content
    pub username: String,
    /// Access token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl PortalProfile {
    /// Copy of this profile with the token masked, for display.
    #[must_use]
    pub fn masked(&self) -> Self {
        Self {
            token: self.token.as_ref().map(|_| "********".to_string()),
            ..self.clone()
        }
    }
}

/// Deployment tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployConfig {
    /// Milliseconds between consecutive resource copy starts
    #[serde(default = "default_copy_delay")]
    pub resource_copy_delay_ms: u64,
    /// Resource copies in flight per item
    #[serde(default = "default_parallel_copies")]
    pub max_parallel_copies: usize,
    /// Prefix of the destination folder name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_folder_prefix: Option<String>,
}

const fn default_copy_delay() -> u64 {
    DEFAULT_RESOURCE_COPY_DELAY_MS
}

const fn default_parallel_copies() -> usize {
    DEFAULT_MAX_PARALLEL_COPIES
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            resource_copy_delay_ms: DEFAULT_RESOURCE_COPY_DELAY_MS,
            max_parallel_copies: DEFAULT_MAX_PARALLEL_COPIES,
            default_folder_prefix: None,
        }
    }
}

impl DeployConfig {
    /// Replay options for a destination folder.
    #[must_use]
    pub fn options(&self, folder_id: Option<String>) -> DeployOptions {
        DeployOptions {
            folder_id,
            resource_copy_delay: Duration::from_millis(self.resource_copy_delay_ms),
            max_parallel_copies: self.max_parallel_copies.max(1),
        }
    }
}

/// The global configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Named portal profiles
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub portals: BTreeMap<String, PortalProfile>,

    /// Deployment tuning
    #[serde(default)]
    pub deploy: DeployConfig,
}

impl GlobalConfig {
    /// Load from `path`, or from the default location when `None`.
    ///
    /// A missing file yields the default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub async fn load_with_optional(path: Option<PathBuf>) -> Result<Self> {
        let path = match path {
            Some(path) => path,
            None => Self::default_path()?,
        };
        if fs::try_exists(&path).await.unwrap_or(false) {
            Self::load_from(&path).await
        } else {
            tracing::debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Load global configuration from a specific file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid TOML for
    /// this schema.
    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read global config from {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .map_err(SolutionError::from)
            .with_context(|| format!("Failed to parse global config from {}", path.display()))?;
        Ok(config)
    }

    /// Save global configuration to a specific file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file or its parent directory cannot be written.
    pub async fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize global config")?;

        fs::write(path, content)
            .await
            .with_context(|| format!("Failed to write global config to {}", path.display()))?;

        // Tokens: owner read/write only.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;

            let mut perms = fs::metadata(path)
                .await
                .with_context(|| format!("Failed to read permissions for {}", path.display()))?
                .permissions();
            perms.set_mode(0o600);
            fs::set_permissions(path, perms).await.with_context(|| {
                format!("Failed to set secure permissions on {}", path.display())
            })?;
        }

        Ok(())
    }

    /// The config path in effect: `SOLDEPLOY_CONFIG_PATH`, else the platform
    /// default.
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined.
    pub fn default_path() -> Result<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV)
            && !path.is_empty()
        {
            return Ok(PathBuf::from(path));
        }
        let config_dir = if cfg!(target_os = "windows") {
            dirs::data_local_dir()
                .ok_or_else(|| anyhow::anyhow!("Unable to determine local data directory"))?
                .join("soldeploy")
        } else {
            dirs::home_dir()
                .ok_or_else(|| anyhow::anyhow!("Unable to determine home directory"))?
                .join(".soldeploy")
        };

        Ok(config_dir.join("config.toml"))
    }

    /// Look up a portal profile by name.
    ///
    /// # Errors
    ///
    /// Returns [`SolutionError::ConfigError`] naming the known profiles if
    /// `name` is not configured.
    pub fn portal(&self, name: &str) -> Result<&PortalProfile> {
        self.portals.get(name).ok_or_else(|| {
            let known: Vec<&str> = self.portals.keys().map(String::as_str).collect();
            SolutionError::ConfigError {
                message: format!(
                    "portal profile '{name}' is not configured (known: {})",
                    if known.is_empty() { "none".to_string() } else { known.join(", ") }
                ),
            }
            .into()
        })
    }

    /// Copy with every token masked, for display.
    #[must_use]
    pub fn masked(&self) -> Self {
        Self {
            portals: self.portals.iter().map(|(name, p)| (name.clone(), p.masked())).collect(),
            deploy: self.deploy.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_load_missing_file_gives_defaults() {
        let temp = TempDir::new().unwrap();
        let config = GlobalConfig::load_with_optional(Some(temp.path().join("nope.toml"))).await.unwrap();
        assert!(config.portals.is_empty());
        assert_eq!(config.deploy.resource_copy_delay_ms, 1000);
        assert_eq!(config.deploy.max_parallel_copies, 4);
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");

        let mut config = GlobalConfig::default();
        config.portals.insert(
            "dest".to_string(),
            PortalProfile {
                url: "https://dest.example.com/portal".to_string(),
                username: "casey".to_string(),
                token: Some("secret".to_string()),
            },
        );
        config.deploy.resource_copy_delay_ms = 250;
        config.save_to(&path).await.unwrap();

        let loaded = GlobalConfig::load_from(&path).await.unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.portal("dest").unwrap().username, "casey");
    }

    #[tokio::test]
    async fn test_partial_deploy_section_uses_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        fs::write(&path, "[deploy]\nmax_parallel_copies = 2\n").await.unwrap();

        let config = GlobalConfig::load_from(&path).await.unwrap();
        assert_eq!(config.deploy.max_parallel_copies, 2);
        assert_eq!(config.deploy.resource_copy_delay_ms, 1000);
    }

    #[tokio::test]
    async fn test_invalid_toml_is_a_config_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        fs::write(&path, "[portals.dest\nurl = 1").await.unwrap();
        let err = GlobalConfig::load_from(&path).await.unwrap_err();
        assert!(err.to_string().contains("Failed to parse global config"));
    }

    #[test]
    fn test_unknown_portal_lists_known_profiles() {
        let mut config = GlobalConfig::default();
        config.portals.insert(
            "source".to_string(),
            PortalProfile {
                url: "https://a".to_string(),
                username: "u".to_string(),
                token: None,
            },
        );
        let err = config.portal("dest").unwrap_err();
        assert!(err.to_string().contains("known: source"));
    }

    #[test]
    fn test_masked_hides_tokens() {
        let profile = PortalProfile {
            url: "https://a".to_string(),
            username: "u".to_string(),
            token: Some("secret".to_string()),
        };
        assert_eq!(profile.masked().token.as_deref(), Some("********"));
        assert_eq!(profile.masked().url, "https://a");
    }

    #[test]
    fn test_deploy_options() {
        let options = DeployConfig::default().options(Some("f1".to_string()));
        assert_eq!(options.resource_copy_delay, Duration::from_millis(1000));
        assert_eq!(options.folder_id.as_deref(), Some("f1"));
    }
}

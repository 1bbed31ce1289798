//! Helpers shared by the commands.

use anyhow::{Context, Result};
use chrono::Local;
use serde_json::Value;

use super::CliContext;
use crate::config::GlobalConfig;
use crate::portal::RestPortal;

/// Load the global config named by `--config`, or the default one.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be parsed.
pub async fn load_config(ctx: &CliContext) -> Result<GlobalConfig> {
    GlobalConfig::load_with_optional(ctx.config_path.clone()).await
}

/// Open a portal connection for a named profile.
///
/// # Errors
///
/// Returns a config error if the profile does not exist.
pub fn connect(config: &GlobalConfig, profile: &str) -> Result<RestPortal> {
    let profile = config.portal(profile)?;
    if profile.token.is_none() {
        tracing::warn!("Portal profile for {} has no token; only public content is visible", profile.url);
    }
    Ok(RestPortal::new(&profile.url, &profile.username, profile.token.clone()))
}

/// Parse a `--set key=value` dictionary entry.
///
/// The value is parsed as JSON when possible (`layer=3`, `extent=[[0,0],[1,1]]`)
/// and kept as a string otherwise.
///
/// # Errors
///
/// Returns an error if there is no `=` or the key is empty.
pub fn parse_assignment(raw: &str) -> Result<(String, Value)> {
    let (key, value) = raw.split_once('=').context("expected key=value")?;
    let key = key.trim();
    anyhow::ensure!(!key.is_empty(), "key must not be empty");
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

/// Title for a deployment folder: `<prefix> <title> <timestamp>`.
#[must_use]
pub fn folder_title(prefix: Option<&str>, title: &str) -> String {
    let stamp = Local::now().format("%Y-%m-%d %H%M%S");
    match prefix.filter(|p| !p.is_empty()) {
        Some(prefix) => format!("{prefix} {title} {stamp}"),
        None => format!("{title} {stamp}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_assignment() {
        assert_eq!(parse_assignment("layer=3").unwrap(), ("layer".to_string(), json!(3)));
        assert_eq!(parse_assignment("user.orgId=abc").unwrap(), ("user.orgId".to_string(), json!("abc")));
        assert_eq!(parse_assignment("url=https://x/y?a=b").unwrap().1, json!("https://x/y?a=b"));
        assert!(parse_assignment("novalue").is_err());
        assert!(parse_assignment("=1").is_err());
    }

    #[test]
    fn test_folder_title() {
        assert!(folder_title(Some("Deployed"), "Permits").starts_with("Deployed Permits "));
        assert!(folder_title(None, "Permits").starts_with("Permits "));
    }

    #[test]
    fn test_connect_unknown_profile() {
        let err = connect(&GlobalConfig::default(), "dest").unwrap_err();
        assert!(err.to_string().contains("dest"));
    }
}

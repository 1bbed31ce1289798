//! Placeholder templating for item payloads.
//!
//! Templatizing replaces concrete identifiers inside a template's `item` and
//! `data` with symbolic placeholders; de-templatizing replaces the placeholders
//! with values from a [`TemplateDictionary`] at deploy time.
//!
//! # Placeholder grammar
//!
//! ```text
//! {{<root>(.<segment>)*}}
//! ```
//!
//! `root` is a template's synthetic `key` (or a seeded dictionary entry such as
//! `portalBaseUrl`), and the segments form a structured suffix:
//!
//! | Suffix | Meaning |
//! |---|---|
//! | `.itemId` | id of the created item |
//! | `.url` | service or item url |
//! | `.name` | service name |
//! | `.layer<N>.url` | url of layer/table `N` |
//! | `.layer<N>.id` | id of layer/table `N` |
//! | `.layer<N>.fields.<field>.name` | destination name of a field (field lower-cased) |
//!
//! De-templatizing is a dictionary path lookup plus string substitution; the
//! suffix is never parsed beyond splitting on `.`.
//!
//! # Substitution
//!
//! Payloads are serialized, substituted in a single regex pass, and
//! deserialized again (see [`detemplatize`]). A placeholder that is the whole
//! of a JSON string is replaced by the JSON value itself, so numeric layer ids
//! come back as numbers.

pub mod datasource;
pub mod dictionary;
pub mod substitute;

pub use datasource::{DatasourceInfo, collect_datasources, templatize_field_references};
pub use dictionary::TemplateDictionary;
pub use substitute::{detemplatize, detemplatize_str, find_placeholders};

use anyhow::Result;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::LazyLock;

/// Dictionary root holding the destination portal's base url.
pub const PORTAL_BASE_URL: &str = "portalBaseUrl";
/// Dictionary root holding the destination folder id.
pub const FOLDER_ID: &str = "folderId";
/// Dictionary root holding the extent to apply to deployed items.
pub const SOLUTION_ITEM_EXTENT: &str = "solutionItemExtent";
/// Dictionary root holding information about the deploying user.
pub const USER: &str = "user";

/// Matches one placeholder, either as a whole JSON string (group 1) or
/// embedded inside a longer string (group 2).
pub(crate) static PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""\{\{([A-Za-z0-9_\-]+(?:\.[^{}"\s.]+)*)\}\}"|\{\{([A-Za-z0-9_\-]+(?:\.[^{}"\s.]+)*)\}\}"#)
        .expect("placeholder pattern is valid")
});

/// Whether `text` can appear as one dot-separated segment of a placeholder
/// path. Anything else would not be recognised by the substitution pass.
#[must_use]
pub fn is_placeholder_segment(text: &str) -> bool {
    !text.is_empty() && !text.chars().any(|c| c.is_whitespace() || matches!(c, '{' | '}' | '"' | '.'))
}

/// The structured part of a placeholder following its root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suffix<'a> {
    /// No suffix, the root itself (`{{portalBaseUrl}}`)
    None,
    /// `.itemId`
    ItemId,
    /// `.url`
    Url,
    /// `.name`
    Name,
    /// `.layer<N>.url`
    LayerUrl(u64),
    /// `.layer<N>.id`
    LayerId(u64),
    /// `.layer<N>.fields.<field>.name`
    LayerField {
        /// Layer or table id in the source service
        layer: u64,
        /// Source field name
        field: &'a str,
    },
}

/// Build a placeholder string for `root` and `suffix`.
///
/// ```rust
/// use solution_deploy::templating::{Suffix, placeholder};
///
/// assert_eq!(placeholder("k1", Suffix::ItemId), "{{k1.itemId}}");
/// assert_eq!(placeholder("k1", Suffix::LayerUrl(2)), "{{k1.layer2.url}}");
/// assert_eq!(
///     placeholder("k1", Suffix::LayerField { layer: 0, field: "STATUS" }),
///     "{{k1.layer0.fields.status.name}}"
/// );
/// ```
#[must_use]
pub fn placeholder(root: &str, suffix: Suffix<'_>) -> String {
    match suffix {
        Suffix::None => format!("{{{{{root}}}}}"),
        Suffix::ItemId => format!("{{{{{root}.itemId}}}}"),
        Suffix::Url => format!("{{{{{root}.url}}}}"),
        Suffix::Name => format!("{{{{{root}.name}}}}"),
        Suffix::LayerUrl(layer) => format!("{{{{{root}.layer{layer}.url}}}}"),
        Suffix::LayerId(layer) => format!("{{{{{root}.layer{layer}.id}}}}"),
        Suffix::LayerField {
            layer,
            field,
        } => format!("{{{{{root}.layer{layer}.fields.{}.name}}}}", field.to_lowercase()),
    }
}

/// Generate a fresh, process-unique template key.
#[must_use]
pub fn new_template_key() -> String {
    format!("k{}", uuid::Uuid::new_v4().simple())
}

/// Replace every occurrence of each source item id in `value` with the
/// `{{<key>.itemId}}` placeholder of the template that will recreate it.
///
/// `references` maps source item id to template key. All ids are replaced in
/// one pass over the serialized payload; matching is case-insensitive since
/// portal ids appear in urls with varying case.
pub fn templatize_item_ids(value: &mut Value, references: &HashMap<String, String>) -> Result<()> {
    if references.is_empty() || value.is_null() {
        return Ok(());
    }
    let mut ids: Vec<&String> = references.keys().collect();
    // Longest first so an id never shadows a longer one sharing its prefix.
    ids.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    let alternation = ids.iter().map(|id| regex::escape(id)).collect::<Vec<_>>().join("|");
    let re = Regex::new(&format!("(?i){alternation}"))?;
    let lowered: HashMap<String, &String> =
        references.iter().map(|(id, key)| (id.to_lowercase(), key)).collect();

    let text = serde_json::to_string(value)?;
    let replaced = re.replace_all(&text, |caps: &regex::Captures<'_>| {
        let found = caps[0].to_lowercase();
        lowered
            .get(&found)
            .map_or_else(|| caps[0].to_string(), |key| placeholder(key, Suffix::ItemId))
    });
    *value = serde_json::from_str(&replaced)?;
    Ok(())
}

/// Replace a service base url (and its `/<layer>` sub-urls) inside `value`
/// with `{{<key>.url}}` / `{{<key>.layer<N>.url}}`.
pub fn templatize_service_url(value: &mut Value, base_url: &str, key: &str) -> Result<()> {
    let base = base_url.trim_end_matches('/');
    if base.is_empty() || value.is_null() {
        return Ok(());
    }
    let re = Regex::new(&format!(r"(?i){}(?:/(\d+)\b)?", regex::escape(base)))?;
    let text = serde_json::to_string(value)?;
    let replaced = re.replace_all(&text, |caps: &regex::Captures<'_>| match caps.get(1) {
        Some(layer) => layer
            .as_str()
            .parse::<u64>()
            .map_or_else(|_| caps[0].to_string(), |n| placeholder(key, Suffix::LayerUrl(n))),
        None => placeholder(key, Suffix::Url),
    });
    *value = serde_json::from_str(&replaced)?;
    Ok(())
}

/// Parse the layer number out of a `{{<key>.layer<N>.url}}` placeholder url.
///
/// Returns the key and layer id, or `None` if `url` is not such a placeholder.
#[must_use]
pub fn parse_layer_url_placeholder(url: &str) -> Option<(String, u64)> {
    static LAYER_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"^\{\{([A-Za-z0-9_\-]+)\.layer(\d+)\.url\}\}$").expect("layer url pattern is valid")
    });
    let caps = LAYER_URL_RE.captures(url.trim())?;
    let layer = caps[2].parse().ok()?;
    Some((caps[1].to_string(), layer))
}

/// Parse the key out of a `{{<key>.itemId}}` placeholder.
#[must_use]
pub fn parse_item_id_placeholder(text: &str) -> Option<String> {
    static ITEM_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"^\{\{([A-Za-z0-9_\-]+)\.itemId\}\}$").expect("item id pattern is valid")
    });
    ITEM_ID_RE.captures(text.trim()).map(|caps| caps[1].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_templatize_item_ids_replaces_all_occurrences() {
        let mut value = json!({
            "values": {"webmap": "ABC123", "url": "https://x/apps/view?webmap=abc123"},
            "other": "unrelated",
        });
        let refs = HashMap::from([("abc123".to_string(), "k9".to_string())]);
        templatize_item_ids(&mut value, &refs).unwrap();

        assert_eq!(value["values"]["webmap"], "{{k9.itemId}}");
        assert_eq!(value["values"]["url"], "https://x/apps/view?webmap={{k9.itemId}}");
        assert_eq!(value["other"], "unrelated");
    }

    #[test]
    fn test_templatize_item_ids_prefers_longest_match() {
        let mut value = json!(["ab", "abcd"]);
        let refs = HashMap::from([
            ("ab".to_string(), "short".to_string()),
            ("abcd".to_string(), "long".to_string()),
        ]);
        templatize_item_ids(&mut value, &refs).unwrap();
        assert_eq!(value, json!(["{{short.itemId}}", "{{long.itemId}}"]));
    }

    #[test]
    fn test_templatize_service_url() {
        let mut value = json!({
            "url": "https://services.example.com/arcgis/rest/services/Parcels/FeatureServer",
            "layers": [
                {"url": "https://services.example.com/arcgis/rest/services/Parcels/FeatureServer/0"},
                {"url": "https://services.example.com/arcgis/rest/services/Parcels/FeatureServer/12/query"}
            ]
        });
        templatize_service_url(
            &mut value,
            "https://services.example.com/arcgis/rest/services/Parcels/FeatureServer/",
            "fs",
        )
        .unwrap();

        assert_eq!(value["url"], "{{fs.url}}");
        assert_eq!(value["layers"][0]["url"], "{{fs.layer0.url}}");
        assert_eq!(value["layers"][1]["url"], "{{fs.layer12.url}}/query");
    }

    #[test]
    fn test_placeholder_segments() {
        assert!(is_placeholder_segment("status_date"));
        assert!(is_placeholder_segment("OBJECTID"));
        assert!(!is_placeholder_segment("Due Date"));
        assert!(!is_placeholder_segment("a.b"));
        assert!(!is_placeholder_segment("{x}"));
        assert!(!is_placeholder_segment(""));
    }

    #[test]
    fn test_parse_placeholders() {
        assert_eq!(parse_layer_url_placeholder("{{k1.layer3.url}}"), Some(("k1".to_string(), 3)));
        assert_eq!(parse_layer_url_placeholder("{{k1.url}}"), None);
        assert_eq!(parse_item_id_placeholder("{{k1.itemId}}"), Some("k1".to_string()));
        assert_eq!(parse_item_id_placeholder("abc"), None);
    }

    #[test]
    fn test_new_template_keys_are_unique() {
        let a = new_template_key();
        let b = new_template_key();
        assert_ne!(a, b);
        assert!(a.starts_with('k'));
    }
}

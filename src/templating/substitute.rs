//! Single-pass placeholder substitution.

use anyhow::{Context, Result};
use regex::Captures;
use serde_json::Value;
use std::collections::BTreeSet;

use super::{PLACEHOLDER_RE, TemplateDictionary};
use crate::core::SolutionError;

/// Replace every placeholder in `value` with its dictionary value.
///
/// The payload is serialized once and all placeholders are substituted in a
/// single regex pass. A placeholder forming an entire JSON string is replaced
/// by the JSON encoding of its value; an embedded placeholder is replaced by
/// the value's text.
///
/// # Errors
///
/// Returns [`SolutionError::UnresolvedPlaceholders`] naming every placeholder
/// whose path is absent from `dictionary`. Nothing is substituted partially in
/// that case.
pub fn detemplatize(value: &Value, dictionary: &TemplateDictionary, item_id: &str) -> Result<Value> {
    let text = serde_json::to_string(value)?;
    let replaced = substitute(&text, dictionary, item_id, true)?;
    serde_json::from_str(&replaced)
        .with_context(|| format!("Substituted payload for '{item_id}' is no longer valid JSON"))
}

/// Replace every placeholder in a plain string.
///
/// # Errors
///
/// Same as [`detemplatize`].
pub fn detemplatize_str(text: &str, dictionary: &TemplateDictionary, item_id: &str) -> Result<String> {
    substitute(text, dictionary, item_id, false)
}

/// All distinct placeholder paths in `value`, sorted.
#[must_use]
pub fn find_placeholders(value: &Value) -> BTreeSet<String> {
    let text = serde_json::to_string(value).unwrap_or_default();
    PLACEHOLDER_RE
        .captures_iter(&text)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)))
        .map(|m| m.as_str().to_string())
        .collect()
}

fn substitute(text: &str, dictionary: &TemplateDictionary, item_id: &str, json: bool) -> Result<String> {
    let mut unresolved = BTreeSet::new();
    let replaced = PLACEHOLDER_RE.replace_all(text, |caps: &Captures<'_>| {
        // Outside JSON text the quoted form has no meaning.
        if let Some(path) = caps.get(1) {
            return match dictionary.lookup(path.as_str()) {
                Some(found) if json => serde_json::to_string(found).unwrap_or_default(),
                Some(found) => format!("\"{}\"", plain_text(found)),
                None => {
                    unresolved.insert(format!("{{{{{}}}}}", path.as_str()));
                    caps[0].to_string()
                }
            };
        }
        let path = &caps[2];
        match dictionary.lookup(path) {
            Some(found) if json => escape_json_fragment(&plain_text(found)),
            Some(found) => plain_text(found),
            None => {
                unresolved.insert(format!("{{{{{path}}}}}"));
                caps[0].to_string()
            }
        }
    });

    if !unresolved.is_empty() {
        return Err(SolutionError::UnresolvedPlaceholders {
            item_id: item_id.to_string(),
            placeholders: unresolved.into_iter().collect(),
        }
        .into());
    }
    Ok(replaced.into_owned())
}

/// Text form of a value when it is spliced into a longer string.
fn plain_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Escape `text` for insertion inside an existing JSON string literal.
fn escape_json_fragment(text: &str) -> String {
    let quoted = serde_json::to_string(text).unwrap_or_else(|_| "\"\"".to_string());
    quoted[1..quoted.len() - 1].to_string()
}

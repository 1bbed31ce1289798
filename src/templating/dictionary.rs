//! The deploy-time template dictionary.
//!
//! Maps placeholder roots (template keys, plus seeded roots such as
//! `portalBaseUrl` or `user`) to the values discovered once the corresponding
//! item exists in the destination. The dictionary only grows during a
//! deployment; writing the same template key twice is a bug and is rejected.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::SolutionError;

/// Deploy-time map from placeholder roots to created values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TemplateDictionary {
    entries: Map<String, Value>,
}

impl TemplateDictionary {
    /// Create an empty dictionary.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a value at a dotted path (`user.username`), creating intermediate
    /// objects and overwriting existing values.
    ///
    /// Seeding is for caller-supplied context before deployment starts; use
    /// [`insert`](Self::insert) for values produced by created items.
    pub fn seed(&mut self, path: &str, value: Value) {
        let mut segments = path.split('.').peekable();
        let mut current = &mut self.entries;
        while let Some(segment) = segments.next() {
            if segments.peek().is_none() {
                current.insert(segment.to_string(), value);
                return;
            }
            let slot = current
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            let Value::Object(next) = slot else {
                return;
            };
            current = next;
        }
    }

    /// Record the values for a created template under its key.
    ///
    /// # Errors
    ///
    /// Returns [`SolutionError::DuplicateDictionaryEntry`] if `key` was
    /// already written.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Result<()> {
        let key = key.into();
        if self.entries.contains_key(&key) {
            return Err(SolutionError::DuplicateDictionaryEntry {
                key,
            }
            .into());
        }
        tracing::debug!("Dictionary entry added for '{}'", key);
        self.entries.insert(key, value);
        Ok(())
    }

    /// Whether a root entry exists for `key`.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// The root entry for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Resolve a dotted placeholder path (`k1.layer0.url`).
    #[must_use]
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let mut current = self.entries.get(segments.next()?)?;
        for segment in segments {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Convenience accessor for `<key>.itemId`.
    #[must_use]
    pub fn created_item_id(&self, key: &str) -> Option<&str> {
        self.entries.get(key)?.get("itemId")?.as_str()
    }

    /// Root keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }

    /// Number of root entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the dictionary has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

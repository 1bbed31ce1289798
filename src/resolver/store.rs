//! The template store used during a resolution run.
//!
//! Holds exactly one entry per source item id. An entry starts as a
//! placeholder the instant resolution of the id begins and is replaced in its
//! original slot once the template is populated, so the store's ordering
//! reflects discovery order.
//!
//! [`TemplateStore::reserve`] is the only mutual-exclusion mechanism of the
//! resolver: the check and the placeholder insert happen under one lock, so two
//! concurrent resolutions of the same id can never both proceed.

use anyhow::{Result, bail};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::core::{ItemTemplate, SolutionError};
use crate::templating::new_template_key;

/// One slot of the store.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEntry {
    /// Resolution of this id has started but no content has been fetched yet.
    Placeholder {
        /// Source item id
        item_id: String,
        /// Template key assigned to the id
        key: String,
    },
    /// Content fetched, dependencies enumerated, values templatized.
    Populated(ItemTemplate),
    /// Resolved successfully but deliberately not templated (unsupported
    /// type, thumbnail source).
    Skipped {
        /// Source item id
        item_id: String,
        /// Template key assigned to the id
        key: String,
        /// Item type as reported by the portal
        item_type: String,
    },
}

impl StoreEntry {
    /// Source item id of this entry.
    #[must_use]
    pub fn item_id(&self) -> &str {
        match self {
            Self::Placeholder {
                item_id,
                ..
            }
            | Self::Skipped {
                item_id,
                ..
            } => item_id,
            Self::Populated(template) => &template.item_id,
        }
    }

    /// Whether this entry is still an in-flight placeholder.
    #[must_use]
    pub fn is_placeholder(&self) -> bool {
        matches!(self, Self::Placeholder { .. })
    }
}

/// Outcome of [`TemplateStore::reserve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reservation {
    /// The caller owns resolution of the id; a placeholder has been written.
    Reserved {
        /// Template key assigned to the id
        key: String,
    },
    /// Another resolution already owns (or finished) the id.
    AlreadyPresent,
}

#[derive(Debug, Default)]
struct StoreInner {
    entries: Vec<StoreEntry>,
    index: HashMap<String, usize>,
    keys: HashMap<String, String>,
    thumbnail_source: Option<String>,
}

impl StoreInner {
    fn key_for(&mut self, item_id: &str) -> String {
        self.keys.entry(item_id.to_string()).or_insert_with(new_template_key).clone()
    }
}

/// Append-only-by-id collection of templates built during resolution.
#[derive(Debug, Default)]
pub struct TemplateStore {
    inner: Mutex<StoreInner>,
}

impl TemplateStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with already resolved templates.
    ///
    /// Their ids are treated as resolved and their keys are reused.
    #[must_use]
    pub fn with_templates(templates: Vec<ItemTemplate>) -> Self {
        let store = Self::new();
        {
            let mut inner = store.lock();
            for template in templates {
                inner.keys.insert(template.item_id.clone(), template.key.clone());
                let slot = inner.entries.len();
                inner.index.insert(template.item_id.clone(), slot);
                inner.entries.push(StoreEntry::Populated(template));
            }
        }
        store
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Atomically check for `item_id` and, if absent, insert a placeholder.
    pub fn reserve(&self, item_id: &str) -> Reservation {
        let mut inner = self.lock();
        if inner.index.contains_key(item_id) {
            return Reservation::AlreadyPresent;
        }
        let key = inner.key_for(item_id);
        let slot = inner.entries.len();
        inner.entries.push(StoreEntry::Placeholder {
            item_id: item_id.to_string(),
            key: key.clone(),
        });
        inner.index.insert(item_id.to_string(), slot);
        tracing::debug!("Reserved '{}' as {}", item_id, key);
        Reservation::Reserved {
            key,
        }
    }

    /// Template key for `item_id`, assigning one if the id has none yet.
    ///
    /// Keys are independent of entries: a converter may need the key of an id
    /// it references before that id's resolution has started.
    pub fn key_for(&self, item_id: &str) -> String {
        self.lock().key_for(item_id)
    }

    /// Replace the placeholder for `template.item_id` with the populated
    /// template, in the placeholder's original slot.
    ///
    /// # Errors
    ///
    /// Fails if the id was never reserved or was already populated; populated
    /// templates are immutable for the rest of the run.
    pub fn populate(&self, template: ItemTemplate) -> Result<()> {
        let mut inner = self.lock();
        let Some(&slot) = inner.index.get(&template.item_id) else {
            bail!("Template '{}' was populated without being reserved", template.item_id);
        };
        if !inner.entries[slot].is_placeholder() {
            return Err(SolutionError::InvalidTemplate {
                item_id: template.item_id.clone(),
                reason: "template was already populated in this run".to_string(),
            }
            .into());
        }
        inner.entries[slot] = StoreEntry::Populated(template);
        Ok(())
    }

    /// Mark a reserved id as resolved but not templated.
    pub fn skip(&self, item_id: &str, item_type: &str) {
        let mut inner = self.lock();
        let key = inner.key_for(item_id);
        let entry = StoreEntry::Skipped {
            item_id: item_id.to_string(),
            key,
            item_type: item_type.to_string(),
        };
        match inner.index.get(item_id).copied() {
            Some(slot) => inner.entries[slot] = entry,
            None => {
                let slot = inner.entries.len();
                inner.entries.push(entry);
                inner.index.insert(item_id.to_string(), slot);
            }
        }
    }

    /// Whether the id has any entry (placeholder, populated or skipped).
    #[must_use]
    pub fn contains(&self, item_id: &str) -> bool {
        self.lock().index.contains_key(item_id)
    }

    /// Whether the id has a non-placeholder entry.
    #[must_use]
    pub fn is_resolved(&self, item_id: &str) -> bool {
        let inner = self.lock();
        inner.index.get(item_id).is_some_and(|&slot| !inner.entries[slot].is_placeholder())
    }

    /// Populated template for `item_id`.
    #[must_use]
    pub fn get(&self, item_id: &str) -> Option<ItemTemplate> {
        let inner = self.lock();
        match inner.index.get(item_id).map(|&slot| &inner.entries[slot]) {
            Some(StoreEntry::Populated(template)) => Some(template.clone()),
            _ => None,
        }
    }

    /// Snapshot of every entry in slot order.
    #[must_use]
    pub fn entries(&self) -> Vec<StoreEntry> {
        self.lock().entries.clone()
    }

    /// Populated templates in slot order.
    #[must_use]
    pub fn templates(&self) -> Vec<ItemTemplate> {
        self.lock()
            .entries
            .iter()
            .filter_map(|entry| match entry {
                StoreEntry::Populated(template) => Some(template.clone()),
                _ => None,
            })
            .collect()
    }

    /// `(item id, key, item type)` of every skipped entry.
    #[must_use]
    pub fn skipped(&self) -> Vec<(String, String, String)> {
        self.lock()
            .entries
            .iter()
            .filter_map(|entry| match entry {
                StoreEntry::Skipped {
                    item_id,
                    key,
                    item_type,
                } => Some((item_id.clone(), key.clone(), item_type.clone())),
                _ => None,
            })
            .collect()
    }

    /// Ids still waiting for their content.
    #[must_use]
    pub fn pending(&self) -> Vec<String> {
        self.lock()
            .entries
            .iter()
            .filter(|entry| entry.is_placeholder())
            .map(|entry| entry.item_id().to_string())
            .collect()
    }

    /// Record the item consumed as the container's thumbnail.
    pub fn set_thumbnail_source(&self, item_id: &str) {
        self.lock().thumbnail_source = Some(item_id.to_string());
    }

    /// The item consumed as the container's thumbnail, if any.
    #[must_use]
    pub fn thumbnail_source(&self) -> Option<String> {
        self.lock().thumbnail_source.clone()
    }

    /// Number of entries of any kind.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Whether the store has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserve_is_exclusive() {
        let store = TemplateStore::new();
        let first = store.reserve("a");
        assert!(matches!(first, Reservation::Reserved { .. }));
        assert_eq!(store.reserve("a"), Reservation::AlreadyPresent);
        assert_eq!(store.pending(), vec!["a"]);
        assert!(!store.is_resolved("a"));
    }

    #[test]
    fn test_populate_keeps_original_slot() {
        let store = TemplateStore::new();
        let Reservation::Reserved {
            key: key_a,
        } = store.reserve("a")
        else {
            panic!("expected reservation");
        };
        store.reserve("b");
        store.populate(ItemTemplate::new("b", "Web Map", store.key_for("b"))).unwrap();
        store.populate(ItemTemplate::new("a", "Web Map", key_a.clone())).unwrap();

        let ids: Vec<String> = store.templates().into_iter().map(|t| t.item_id).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(store.get("a").unwrap().key, key_a);
        assert!(store.pending().is_empty());
    }

    #[test]
    fn test_populate_twice_or_unreserved_fails() {
        let store = TemplateStore::new();
        assert!(store.populate(ItemTemplate::new("x", "Group", "k")).is_err());

        store.reserve("a");
        store.populate(ItemTemplate::new("a", "Group", store.key_for("a"))).unwrap();
        assert!(store.populate(ItemTemplate::new("a", "Group", store.key_for("a"))).is_err());
    }

    #[test]
    fn test_key_for_is_stable_and_independent_of_reservation() {
        let store = TemplateStore::new();
        let key = store.key_for("later");
        assert!(!store.contains("later"));
        let Reservation::Reserved {
            key: reserved,
        } = store.reserve("later")
        else {
            panic!("expected reservation");
        };
        assert_eq!(key, reserved);
        assert_ne!(key, "later");
    }

    #[test]
    fn test_skip_replaces_placeholder() {
        let store = TemplateStore::new();
        store.reserve("gp");
        store.skip("gp", "Geoprocessing Service");
        assert!(store.is_resolved("gp"));
        assert!(store.templates().is_empty());
        assert_eq!(store.skipped()[0].0, "gp");
        assert_eq!(store.len(), 1);
    }
}

//! External → internal user identifier registry.
//!
//! # Responsibilities
//! - Assign internal ids per tag, monotonically, starting at 1
//! - Resolve external ids for the traffic path (read-mostly)
//! - Resolve internal ids back to external ids for accounting
//!
//! # Design Decisions
//! - `DashMap` keyed by tag: lookups take a shard read lock, writes take
//!   the shard write lock, so a whole-tag update is atomic to readers
//! - Independent from the engine lifecycle lock
//! - The per-tag counter survives removals; ids are never handed out twice
//!   unless the tag is reset

use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("User {external_id:?} not found under tag {tag:?}")]
    NotFound { tag: String, external_id: String },
}

#[derive(Debug, Default)]
struct TagTable {
    next_id: u64,
    by_external: HashMap<String, u64>,
    by_internal: HashMap<u64, String>,
}

impl TagTable {
    fn insert(&mut self, external_id: &str) -> u64 {
        if let Some(id) = self.by_external.get(external_id) {
            return *id;
        }
        self.next_id += 1;
        let id = self.next_id;
        self.by_external.insert(external_id.to_string(), id);
        self.by_internal.insert(id, external_id.to_string());
        id
    }

    fn remove(&mut self, external_id: &str) -> Option<u64> {
        let id = self.by_external.remove(external_id)?;
        self.by_internal.remove(&id);
        Some(id)
    }
}

/// Concurrent user registry shared between the control plane and the
/// traffic path.
#[derive(Debug, Default)]
pub struct UserRegistry {
    tags: DashMap<String, TagTable>,
}

impl UserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the internal id for a user, assigning one if unseen.
    pub fn add_or_update(&self, tag: &str, external_id: &str) -> u64 {
        if let Some(id) = self.lookup(tag, external_id) {
            return id;
        }
        self.tags
            .entry(tag.to_string())
            .or_default()
            .insert(external_id)
    }

    /// Delete a mapping. Returns the internal id it had.
    pub fn remove(&self, tag: &str, external_id: &str) -> Option<u64> {
        self.tags.get_mut(tag)?.remove(external_id)
    }

    pub fn lookup(&self, tag: &str, external_id: &str) -> Option<u64> {
        self.tags
            .get(tag)
            .and_then(|table| table.by_external.get(external_id).copied())
    }

    /// Like [`lookup`](Self::lookup), for callers that treat a miss as an error.
    pub fn resolve(&self, tag: &str, external_id: &str) -> Result<u64, RegistryError> {
        self.lookup(tag, external_id)
            .ok_or_else(|| RegistryError::NotFound {
                tag: tag.to_string(),
                external_id: external_id.to_string(),
            })
    }

    /// Reverse lookup for traffic attribution.
    pub fn external_id(&self, tag: &str, internal_id: u64) -> Option<String> {
        self.tags
            .get(tag)
            .and_then(|table| table.by_internal.get(&internal_id).cloned())
    }

    /// Keep only `keep` under `tag` and add any missing ones, in one
    /// write. Returns the removed `(external, internal)` pairs.
    pub fn sync_tag(&self, tag: &str, keep: &[&str]) -> Vec<(String, u64)> {
        let mut table = self.tags.entry(tag.to_string()).or_default();
        let wanted: HashSet<&str> = keep.iter().copied().collect();

        let stale: Vec<String> = table
            .by_external
            .keys()
            .filter(|id| !wanted.contains(id.as_str()))
            .cloned()
            .collect();
        let mut removed = Vec::with_capacity(stale.len());
        for external in stale {
            if let Some(id) = table.remove(&external) {
                removed.push((external, id));
            }
        }
        for external in keep {
            table.insert(external);
        }
        removed
    }

    /// Number of users under a tag.
    pub fn len(&self, tag: &str) -> usize {
        self.tags.get(tag).map(|t| t.by_external.len()).unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.tags.iter().map(|t| t.by_external.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Snapshot of a tag's users, sorted by internal id.
    pub fn users(&self, tag: &str) -> Vec<(String, u64)> {
        let mut users: Vec<(String, u64)> = self
            .tags
            .get(tag)
            .map(|t| t.by_external.iter().map(|(k, v)| (k.clone(), *v)).collect())
            .unwrap_or_default();
        users.sort_by_key(|(_, id)| *id);
        users
    }

    pub fn tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = self.tags.iter().map(|t| t.key().clone()).collect();
        tags.sort();
        tags
    }

    /// Drop a tag entirely, counter included. Returns how many users it had.
    pub fn reset(&self, tag: &str) -> usize {
        self.tags
            .remove(tag)
            .map(|(_, t)| t.by_external.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_add_is_idempotent() {
        let registry = UserRegistry::new();
        let first = registry.add_or_update("A", "u1");
        let second = registry.add_or_update("A", "u1");
        assert_eq!(first, second);
        assert_eq!(registry.len("A"), 1);
    }

    #[test]
    fn test_ids_are_per_tag_and_monotonic() {
        let registry = UserRegistry::new();
        assert_eq!(registry.add_or_update("A", "u1"), 1);
        assert_eq!(registry.add_or_update("A", "u2"), 2);
        assert_eq!(registry.add_or_update("B", "u1"), 1);

        registry.remove("A", "u2");
        assert_eq!(registry.add_or_update("A", "u3"), 3);
        assert_eq!(registry.add_or_update("A", "u2"), 4);
    }

    #[test]
    fn test_remove_then_lookup() {
        let registry = UserRegistry::new();
        let id = registry.add_or_update("A", "u1");
        assert_eq!(registry.remove("A", "u1"), Some(id));
        assert_eq!(registry.lookup("A", "u1"), None);
        assert_eq!(
            registry.resolve("A", "u1"),
            Err(RegistryError::NotFound {
                tag: "A".into(),
                external_id: "u1".into()
            })
        );
        assert_eq!(registry.external_id("A", id), None);
        assert_eq!(registry.remove("A", "u1"), None);
        assert_eq!(registry.remove("Z", "u1"), None);
    }

    #[test]
    fn test_reverse_lookup() {
        let registry = UserRegistry::new();
        let id = registry.add_or_update("A", "u1");
        assert_eq!(registry.external_id("A", id).as_deref(), Some("u1"));
        assert_eq!(registry.external_id("B", id), None);
    }

    #[test]
    fn test_sync_tag() {
        let registry = UserRegistry::new();
        registry.add_or_update("A", "u1");
        let u2 = registry.add_or_update("A", "u2");

        let removed = registry.sync_tag("A", &["u2", "u3"]);
        assert_eq!(removed, vec![("u1".to_string(), 1)]);
        assert_eq!(registry.lookup("A", "u2"), Some(u2));
        assert_eq!(registry.lookup("A", "u3"), Some(3));
        assert_eq!(registry.users("A").len(), 2);
    }

    #[test]
    fn test_reset_restarts_counter() {
        let registry = UserRegistry::new();
        registry.add_or_update("A", "u1");
        registry.add_or_update("A", "u2");
        assert_eq!(registry.reset("A"), 2);
        assert!(registry.is_empty());
        assert_eq!(registry.add_or_update("A", "u9"), 1);
    }

    #[test]
    fn test_concurrent_adds_agree() {
        let registry = Arc::new(UserRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || registry.add_or_update("A", "shared"))
            })
            .collect();
        let ids: HashSet<u64> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(ids.len(), 1);
        assert_eq!(registry.len("A"), 1);
    }
}

//! Per-user traffic counters.

use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::observability::metrics;
use crate::users::registry::UserRegistry;

#[derive(Debug, Default)]
struct Counters {
    uplink: AtomicU64,
    downlink: AtomicU64,
}

/// Traffic attributed to one external user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserTraffic {
    pub id: String,
    pub internal_id: u64,
    pub uplink: u64,
    pub downlink: u64,
}

/// Byte counters keyed by `(tag, internal id)`, fed by the engine.
#[derive(Debug, Default)]
pub struct TrafficStats {
    counters: DashMap<(String, u64), Counters>,
}

impl TrafficStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add bytes to a user's counters.
    pub fn record(&self, tag: &str, internal_id: u64, uplink: u64, downlink: u64) {
        let key = (tag.to_string(), internal_id);
        if let Some(counters) = self.counters.get(&key) {
            counters.uplink.fetch_add(uplink, Ordering::Relaxed);
            counters.downlink.fetch_add(downlink, Ordering::Relaxed);
        } else {
            let counters = self.counters.entry(key).or_default();
            counters.uplink.fetch_add(uplink, Ordering::Relaxed);
            counters.downlink.fetch_add(downlink, Ordering::Relaxed);
        }
        metrics::record_user_traffic(uplink, downlink);
    }

    /// Non-zero traffic for a tag, attributed through the registry.
    ///
    /// Counters whose internal id no longer resolves are dropped: the user
    /// is unknown and its bytes cannot be reported.
    pub fn collect(&self, tag: &str, reset: bool, registry: &UserRegistry) -> Vec<UserTraffic> {
        let mut out = Vec::new();
        let mut orphans = Vec::new();

        for entry in self.counters.iter().filter(|e| e.key().0 == tag) {
            let internal_id = entry.key().1;
            let Some(id) = registry.external_id(tag, internal_id) else {
                orphans.push(entry.key().clone());
                continue;
            };
            let (uplink, downlink) = if reset {
                (
                    entry.uplink.swap(0, Ordering::Relaxed),
                    entry.downlink.swap(0, Ordering::Relaxed),
                )
            } else {
                (
                    entry.uplink.load(Ordering::Relaxed),
                    entry.downlink.load(Ordering::Relaxed),
                )
            };
            if uplink > 0 || downlink > 0 {
                out.push(UserTraffic {
                    id,
                    internal_id,
                    uplink,
                    downlink,
                });
            }
        }

        for key in orphans {
            self.counters.remove(&key);
        }
        out.sort_by_key(|t| t.internal_id);
        out
    }

    /// Drop every counter of a tag. Returns how many users had counters.
    pub fn forget(&self, tag: &str) -> usize {
        let before = self.counters.len();
        self.counters.retain(|key, _| key.0 != tag);
        before - self.counters.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_attributes_and_resets() {
        let registry = UserRegistry::new();
        let stats = TrafficStats::new();
        let u1 = registry.add_or_update("A", "u1");
        let u2 = registry.add_or_update("A", "u2");

        stats.record("A", u1, 100, 200);
        stats.record("A", u1, 1, 2);
        stats.record("A", u2, 0, 0);
        stats.record("B", u1, 5, 5);

        let traffic = stats.collect("A", true, &registry);
        assert_eq!(
            traffic,
            vec![UserTraffic {
                id: "u1".into(),
                internal_id: u1,
                uplink: 101,
                downlink: 202
            }]
        );
        assert!(stats.collect("A", false, &registry).is_empty());
    }

    #[test]
    fn test_unknown_users_are_dropped() {
        let registry = UserRegistry::new();
        let stats = TrafficStats::new();
        stats.record("A", 42, 10, 10);
        assert!(stats.collect("A", false, &registry).is_empty());
    }

    #[test]
    fn test_forget_drops_one_tag() {
        let stats = TrafficStats::new();
        stats.record("A", 1, 10, 10);
        stats.record("A", 2, 10, 10);
        stats.record("B", 1, 10, 10);

        assert_eq!(stats.forget("A"), 2);
        assert_eq!(stats.forget("A"), 0);

        let registry = UserRegistry::new();
        registry.add_or_update("B", "u1");
        assert_eq!(stats.collect("B", false, &registry).len(), 1);
    }
}

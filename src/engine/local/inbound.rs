//! In-memory inbound user tables.

use dashmap::DashMap;
use std::collections::HashMap;

use crate::engine::config::{Config, InboundUser, Protocol};
use crate::engine::{EngineError, InboundManager};

#[derive(Debug)]
struct InboundTable {
    protocol: Protocol,
    users: HashMap<String, InboundUser>,
}

/// Tracks the users of every inbound, keyed by email.
#[derive(Debug, Default)]
pub struct LocalInboundManager {
    inbounds: DashMap<String, InboundTable>,
}

impl LocalInboundManager {
    pub fn from_config(config: &Config) -> Self {
        let inbounds = DashMap::new();
        for inbound in &config.inbounds {
            let users = inbound
                .users
                .iter()
                .map(|u| (u.email.clone(), u.clone()))
                .collect();
            inbounds.insert(
                inbound.tag.clone(),
                InboundTable {
                    protocol: inbound.protocol,
                    users,
                },
            );
        }
        Self { inbounds }
    }

    /// Look up a user by credential, the way a protocol handler authenticates.
    pub fn authenticate(&self, tag: &str, credential: &str) -> Option<InboundUser> {
        self.inbounds.get(tag).and_then(|table| {
            table
                .users
                .values()
                .find(|u| u.credential == credential)
                .cloned()
        })
    }

    pub fn protocol(&self, tag: &str) -> Option<Protocol> {
        self.inbounds.get(tag).map(|t| t.protocol)
    }
}

impl InboundManager for LocalInboundManager {
    fn tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = self.inbounds.iter().map(|r| r.key().clone()).collect();
        tags.sort();
        tags
    }

    fn add_users(&self, tag: &str, users: &[InboundUser]) -> Result<usize, EngineError> {
        let mut table = self
            .inbounds
            .get_mut(tag)
            .ok_or_else(|| EngineError::UnknownInbound(tag.to_string()))?;
        let mut added = 0;
        for user in users {
            if table.users.insert(user.email.clone(), user.clone()).is_none() {
                added += 1;
            }
        }
        Ok(added)
    }

    fn remove_users(&self, tag: &str, emails: &[String]) -> Result<usize, EngineError> {
        let mut table = self
            .inbounds
            .get_mut(tag)
            .ok_or_else(|| EngineError::UnknownInbound(tag.to_string()))?;
        Ok(emails
            .iter()
            .filter(|email| table.users.remove(email.as_str()).is_some())
            .count())
    }

    fn user_count(&self, tag: &str) -> Result<usize, EngineError> {
        self.inbounds
            .get(tag)
            .map(|t| t.users.len())
            .ok_or_else(|| EngineError::UnknownInbound(tag.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::config::LogPolicy;
    use crate::node::descriptor::{NodeDescriptor, UserInfo};
    use crate::synth::build_config;

    fn manager() -> LocalInboundManager {
        let mut node: NodeDescriptor = serde_json::from_value(serde_json::json!({
            "tag": "A", "protocol": "trojan", "port": 2443
        }))
        .unwrap();
        node.users.push(UserInfo::new("u1"));
        let config = build_config(&[node], LogPolicy::default()).unwrap();
        LocalInboundManager::from_config(&config)
    }

    fn user(id: &str) -> InboundUser {
        InboundUser {
            email: InboundUser::email_for("A", id),
            id: id.to_string(),
            credential: id.to_string(),
            level: 0,
            speed_limit: 0,
            device_limit: 0,
        }
    }

    #[test]
    fn test_add_and_remove_users() {
        let manager = manager();
        assert_eq!(manager.user_count("A").unwrap(), 1);

        assert_eq!(manager.add_users("A", &[user("u1"), user("u2")]).unwrap(), 1);
        assert_eq!(manager.user_count("A").unwrap(), 2);
        assert!(manager.authenticate("A", "u2").is_some());

        assert_eq!(manager.remove_users("A", &["A|u1".to_string(), "A|nobody".to_string()]).unwrap(), 1);
        assert!(manager.authenticate("A", "u1").is_none());
    }

    #[test]
    fn test_unknown_inbound() {
        let manager = manager();
        assert!(matches!(
            manager.add_users("Z", &[user("u1")]),
            Err(EngineError::UnknownInbound(_))
        ));
        assert_eq!(manager.tags(), vec!["A".to_string()]);
        assert_eq!(manager.protocol("A"), Some(Protocol::Trojan));
    }
}

//! Configuration synthesis.
//!
//! # Data Flow
//! ```text
//! [NodeDescriptor] (ordered)
//!     → outbound.rs (built-ins + node outbounds, dedup by tag)
//!     → inbound.rs  (one InboundConfig per node, users validated)
//!     → dns.rs      (merged resolver policy, localhost fallback)
//!     → routing.rs  (node order, then rule order; first match wins)
//!     → Synthesized (all four or nothing)
//! ```
//!
//! # Design Decisions
//! - Pure functions: no I/O, no shared state, safe to call concurrently
//! - Every outbound reference is checked against the final outbound set
//! - Any error discards the whole result

pub mod dns;
pub mod inbound;
pub mod outbound;
pub mod routing;

use std::collections::HashSet;
use thiserror::Error;

use crate::engine::config::{
    Config, DispatcherPolicy, DnsConfig, InboundConfig, InboundManagerPolicy, LogPolicy,
    OutboundConfig, OutboundManagerPolicy, PolicyConfig, RoutingConfig, StatsPolicy,
};
use crate::node::descriptor::NodeDescriptor;

/// Errors produced while synthesizing engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SynthesisError {
    #[error("Node tag must not be empty")]
    EmptyTag,

    #[error("Duplicate node tag: {0}")]
    DuplicateTag(String),

    #[error("Node {tag}: unknown protocol {protocol:?}")]
    UnknownProtocol { tag: String, protocol: String },

    #[error("Node {tag}: unknown network {network:?}")]
    UnknownNetwork { tag: String, network: String },

    #[error("Node {tag}: invalid listen address: {reason}")]
    InvalidListen { tag: String, reason: String },

    #[error("Node {tag}: shadowsocks requires a cipher")]
    MissingCipher { tag: String },

    #[error("Node {tag}: invalid user {user:?}: {reason}")]
    InvalidUser { tag: String, user: String, reason: String },

    #[error("Outbound {tag}: {reason}")]
    InvalidOutbound { tag: String, reason: String },

    #[error("Outbound {0} declared twice with different settings")]
    DuplicateOutbound(String),

    #[error("Node {node}: references unknown outbound {outbound:?}")]
    UnknownOutbound { node: String, outbound: String },

    #[error("Node {tag}: invalid DNS server {server:?}")]
    InvalidDns { tag: String, server: String },

    #[error("Node {tag}: invalid route rule: {reason}")]
    InvalidRule { tag: String, reason: String },
}

/// The four node-derived sub-configs.
#[derive(Debug, Clone, PartialEq)]
pub struct Synthesized {
    pub dns: DnsConfig,
    pub outbounds: Vec<OutboundConfig>,
    pub routing: RoutingConfig,
    pub inbounds: Vec<InboundConfig>,
}

/// Turn node descriptors into engine sub-configs.
pub fn synthesize(nodes: &[NodeDescriptor]) -> Result<Synthesized, SynthesisError> {
    let mut seen = HashSet::new();
    for node in nodes {
        if node.tag.is_empty() {
            return Err(SynthesisError::EmptyTag);
        }
        if !seen.insert(node.tag.as_str()) {
            return Err(SynthesisError::DuplicateTag(node.tag.clone()));
        }
    }

    let outbounds = outbound::build_outbounds(nodes)?;
    let known: HashSet<&str> = outbounds.iter().map(|o| o.tag.as_str()).collect();

    let inbounds = nodes
        .iter()
        .map(|node| inbound::build_inbound(node, &known))
        .collect::<Result<Vec<_>, _>>()?;
    let routing = routing::build_routing(nodes, &known)?;
    let dns = dns::build_dns(nodes)?;

    Ok(Synthesized {
        dns,
        outbounds,
        routing,
        inbounds,
    })
}

/// Synthesize and merge with the process-wide policies.
pub fn build_config(nodes: &[NodeDescriptor], log: LogPolicy) -> Result<Config, SynthesisError> {
    let Synthesized {
        dns,
        outbounds,
        routing,
        inbounds,
    } = synthesize(nodes)?;

    Ok(Config {
        log,
        dispatcher: DispatcherPolicy::default(),
        stats: StatsPolicy::default(),
        inbound_manager: InboundManagerPolicy::default(),
        outbound_manager: OutboundManagerPolicy::default(),
        policy: PolicyConfig::default(),
        dns,
        routing,
        inbounds,
        outbounds,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::engine::config::{DnsServer, DIRECT_TAG};
    use crate::node::descriptor::{OutboundDescriptor, RouteRuleDescriptor, UserInfo};

    pub(crate) fn node(tag: &str, protocol: &str, port: u16) -> NodeDescriptor {
        NodeDescriptor {
            tag: tag.to_string(),
            protocol: protocol.to_string(),
            listen_ip: "0.0.0.0".to_string(),
            port,
            network: "tcp".to_string(),
            network_settings: None,
            tls: None,
            cipher: None,
            server_key: None,
            flow: None,
            users: Vec::new(),
            routes: Vec::new(),
            dns: None,
            outbounds: Vec::new(),
            default_outbound: None,
        }
    }

    #[test]
    fn test_empty_input_is_well_formed() {
        let out = synthesize(&[]).unwrap();
        assert!(out.inbounds.is_empty());
        assert!(out.routing.rules.is_empty());
        assert_eq!(out.dns.servers, vec![DnsServer::Local]);
        assert_eq!(out.outbounds[0].tag, DIRECT_TAG);
    }

    #[test]
    fn test_every_inbound_outbound_exists() {
        let mut a = node("A", "trojan", 8443);
        a.users.push(UserInfo::new("u1"));
        a.outbounds.push(OutboundDescriptor {
            tag: "warp".into(),
            protocol: "socks".into(),
            address: Some("127.0.0.1:40000".into()),
            settings: None,
        });
        a.default_outbound = Some("warp".into());
        let b = node("B", "trojan", 8444);

        let out = synthesize(&[a, b]).unwrap();
        for inbound in &out.inbounds {
            assert!(out.outbounds.iter().any(|o| o.tag == inbound.default_outbound));
        }
        for rule in &out.routing.rules {
            assert!(out.outbounds.iter().any(|o| o.tag == rule.outbound_tag));
        }
    }

    #[test]
    fn test_dangling_rule_fails_whole_build() {
        let mut a = node("A", "trojan", 8443);
        a.routes.push(RouteRuleDescriptor {
            domains: vec!["example.com".into()],
            ips: vec![],
            ports: vec![],
            outbound: "missing".into(),
        });
        let err = synthesize(&[a]).unwrap_err();
        assert_eq!(
            err,
            SynthesisError::UnknownOutbound {
                node: "A".into(),
                outbound: "missing".into()
            }
        );
    }

    #[test]
    fn test_duplicate_tag_rejected() {
        let err = synthesize(&[node("A", "trojan", 1), node("A", "trojan", 2)]).unwrap_err();
        assert_eq!(err, SynthesisError::DuplicateTag("A".into()));
    }

    #[test]
    fn test_unknown_protocol_rejected() {
        let err = synthesize(&[node("A", "gopher", 80)]).unwrap_err();
        assert!(matches!(err, SynthesisError::UnknownProtocol { .. }));
    }

    #[test]
    fn test_build_config_carries_policies() {
        let log = LogPolicy {
            level: "debug".into(),
            access_log: Some("/var/log/access.log".into()),
            error_log: None,
        };
        let config = build_config(&[node("A", "trojan", 443)], log.clone()).unwrap();
        assert_eq!(config.log, log);
        assert_eq!(config.policy.level(0).connection_idle_secs, 300);
        assert!(config.inbound("A").is_some());
        assert!(config.outbound("block").is_some());
        assert!(config.to_json().unwrap().contains("\"tag\": \"A\""));
    }
}

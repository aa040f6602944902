//! Node descriptor definitions.
//!
//! These are the shapes the panel hands us. Strings stay strings here;
//! interpretation (protocol names, addresses, uuids) happens in `synth`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One proxy node as reported by the panel.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct NodeDescriptor {
    /// Unique node tag. Becomes the inbound tag.
    pub tag: String,

    /// Protocol name (e.g., "vmess", "vless", "trojan", "shadowsocks").
    pub protocol: String,

    /// Listen IP (default "0.0.0.0").
    #[serde(default = "default_listen_ip")]
    pub listen_ip: String,

    /// Listen port.
    pub port: u16,

    /// Transport network ("tcp", "ws", "grpc", "httpupgrade", "xhttp").
    #[serde(default = "default_network")]
    pub network: String,

    /// Transport specific settings, passed through untouched.
    #[serde(default)]
    pub network_settings: Option<serde_json::Value>,

    /// Optional TLS settings.
    #[serde(default)]
    pub tls: Option<TlsDescriptor>,

    /// Shadowsocks cipher.
    #[serde(default)]
    pub cipher: Option<String>,

    /// Shadowsocks 2022 server key.
    #[serde(default)]
    pub server_key: Option<String>,

    /// VLESS flow control (e.g., "xtls-rprx-vision").
    #[serde(default)]
    pub flow: Option<String>,

    /// Users allowed on this node.
    #[serde(default)]
    pub users: Vec<UserInfo>,

    /// Routing rules, in precedence order.
    #[serde(default)]
    pub routes: Vec<RouteRuleDescriptor>,

    /// DNS policy for this node.
    #[serde(default)]
    pub dns: Option<DnsDescriptor>,

    /// Extra outbounds this node needs.
    #[serde(default)]
    pub outbounds: Vec<OutboundDescriptor>,

    /// Outbound used when no route rule matches.
    #[serde(default)]
    pub default_outbound: Option<String>,
}

fn default_listen_ip() -> String {
    "0.0.0.0".to_string()
}

fn default_network() -> String {
    "tcp".to_string()
}

/// A user entry on a node.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct UserInfo {
    /// External identifier issued by the panel.
    pub id: String,

    /// Credential (uuid or password). Falls back to `id` when absent.
    #[serde(default)]
    pub uuid: Option<String>,

    /// Speed limit in Mbps (0 = unlimited).
    #[serde(default)]
    pub speed_limit: u64,

    /// Concurrent device limit (0 = unlimited).
    #[serde(default)]
    pub device_limit: u32,
}

impl UserInfo {
    /// Create a user whose credential equals its id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            uuid: None,
            speed_limit: 0,
            device_limit: 0,
        }
    }

    /// The credential the engine authenticates against.
    pub fn credential(&self) -> &str {
        self.uuid.as_deref().unwrap_or(&self.id)
    }
}

/// TLS settings for a node.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TlsDescriptor {
    /// Server name presented to clients.
    pub server_name: String,

    /// Path to certificate file (PEM).
    #[serde(default)]
    pub cert_file: Option<String>,

    /// Path to private key file (PEM).
    #[serde(default)]
    pub key_file: Option<String>,

    /// ALPN protocols.
    #[serde(default)]
    pub alpn: Vec<String>,
}

/// A routing rule attached to a node.
///
/// All non-empty conditions must match (AND). A rule with no
/// conditions matches all traffic of its node.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RouteRuleDescriptor {
    /// Domain conditions ("full:", "domain:", "keyword:" prefixes; bare = suffix).
    #[serde(default)]
    pub domains: Vec<String>,

    /// IP / CIDR conditions.
    #[serde(default)]
    pub ips: Vec<String>,

    /// Destination ports ("443", "1000-2000").
    #[serde(default)]
    pub ports: Vec<String>,

    /// Outbound tag to send matching traffic to.
    pub outbound: String,
}

/// DNS policy attached to a node.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
pub struct DnsDescriptor {
    /// Resolver addresses ("localhost", "1.1.1.1", "udp://1.1.1.1:53", "https://...").
    #[serde(default)]
    pub servers: Vec<String>,

    /// Static host mappings.
    #[serde(default)]
    pub hosts: BTreeMap<String, Vec<String>>,

    /// Query strategy ("UseIP", "UseIPv4", "UseIPv6").
    #[serde(default)]
    pub query_strategy: Option<String>,
}

/// An outbound a node depends on.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct OutboundDescriptor {
    /// Outbound tag (global across nodes).
    pub tag: String,

    /// Outbound protocol ("freedom", "blackhole", "socks", "http", "shadowsocks", ...).
    pub protocol: String,

    /// Upstream address ("host:port"), required for relaying protocols.
    #[serde(default)]
    pub address: Option<String>,

    /// Protocol settings, passed through untouched.
    #[serde(default)]
    pub settings: Option<serde_json::Value>,
}

//! Engine configuration schema.
//!
//! This is the declarative description handed to an engine. It is built
//! by `synth` plus the process-wide policies below and is never mutated
//! after assembly; a reload builds a fresh one.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

/// Handshake timeout in seconds.
pub const HANDSHAKE_SECS: u32 = 8;
/// Connection idle timeout in seconds.
pub const CONNECTION_IDLE_SECS: u32 = 300;
/// Timeout after the downlink closes, in seconds.
pub const UPLINK_ONLY_SECS: u32 = 5;
/// Timeout after the uplink closes, in seconds.
pub const DOWNLINK_ONLY_SECS: u32 = 8;
/// Per-connection buffer size in KiB.
pub const BUFFER_SIZE_KIB: i32 = 64;

/// Complete engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Config {
    pub log: LogPolicy,
    pub dispatcher: DispatcherPolicy,
    pub stats: StatsPolicy,
    pub inbound_manager: InboundManagerPolicy,
    pub outbound_manager: OutboundManagerPolicy,
    pub policy: PolicyConfig,
    pub dns: DnsConfig,
    pub routing: RoutingConfig,
    pub inbounds: Vec<InboundConfig>,
    pub outbounds: Vec<OutboundConfig>,
}

impl Config {
    /// Find an inbound by tag.
    pub fn inbound(&self, tag: &str) -> Option<&InboundConfig> {
        self.inbounds.iter().find(|i| i.tag == tag)
    }

    /// Find an outbound by tag.
    pub fn outbound(&self, tag: &str) -> Option<&OutboundConfig> {
        self.outbounds.iter().find(|o| o.tag == tag)
    }

    /// Pretty JSON rendering, for `--check` and debugging.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Engine log policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogPolicy {
    pub level: String,
    pub access_log: Option<String>,
    pub error_log: Option<String>,
}

impl Default for LogPolicy {
    fn default() -> Self {
        Self {
            level: "warning".to_string(),
            access_log: None,
            error_log: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatcherPolicy {}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatsPolicy {}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InboundManagerPolicy {}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OutboundManagerPolicy {}

/// Per-level traffic policy. Only level 0 is used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyConfig {
    pub levels: BTreeMap<u32, TrafficPolicy>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        let mut levels = BTreeMap::new();
        levels.insert(0, TrafficPolicy::default());
        Self { levels }
    }
}

impl PolicyConfig {
    /// Policy for a user level, falling back to level 0.
    pub fn level(&self, level: u32) -> TrafficPolicy {
        self.levels
            .get(&level)
            .or_else(|| self.levels.get(&0))
            .cloned()
            .unwrap_or_default()
    }
}

/// Fixed traffic accounting policy. Not derived from node input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrafficPolicy {
    pub handshake_secs: u32,
    pub connection_idle_secs: u32,
    pub uplink_only_secs: u32,
    pub downlink_only_secs: u32,
    pub buffer_size_kib: i32,
    pub stats_user_uplink: bool,
    pub stats_user_downlink: bool,
}

impl Default for TrafficPolicy {
    fn default() -> Self {
        Self {
            handshake_secs: HANDSHAKE_SECS,
            connection_idle_secs: CONNECTION_IDLE_SECS,
            uplink_only_secs: UPLINK_ONLY_SECS,
            downlink_only_secs: DOWNLINK_ONLY_SECS,
            buffer_size_kib: BUFFER_SIZE_KIB,
            stats_user_uplink: true,
            stats_user_downlink: true,
        }
    }
}

impl TrafficPolicy {
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_secs as u64)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_idle_secs as u64)
    }
}

// --- DNS ---

/// Resolver address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "address", rename_all = "lowercase")]
pub enum DnsServer {
    /// System resolver.
    Local,
    Udp(SocketAddr),
    Tcp(SocketAddr),
    Https(String),
}

impl fmt::Display for DnsServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DnsServer::Local => write!(f, "localhost"),
            DnsServer::Udp(addr) => write!(f, "udp://{}", addr),
            DnsServer::Tcp(addr) => write!(f, "tcp://{}", addr),
            DnsServer::Https(url) => write!(f, "{}", url),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum QueryStrategy {
    #[default]
    UseIP,
    UseIPv4,
    UseIPv6,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DnsConfig {
    pub servers: Vec<DnsServer>,
    pub hosts: BTreeMap<String, Vec<String>>,
    pub query_strategy: QueryStrategy,
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            servers: vec![DnsServer::Local],
            hosts: BTreeMap::new(),
            query_strategy: QueryStrategy::UseIP,
        }
    }
}

// --- Routing ---

/// Domain condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum DomainMatch {
    Full(String),
    Suffix(String),
    Keyword(String),
}

impl DomainMatch {
    /// Case-insensitive match against a destination host.
    pub fn matches(&self, host: &str) -> bool {
        let host = host.trim_end_matches('.').to_ascii_lowercase();
        match self {
            DomainMatch::Full(d) => host == *d,
            DomainMatch::Suffix(d) => {
                host == *d
                    || (host.len() > d.len()
                        && host.ends_with(d.as_str())
                        && host.as_bytes()[host.len() - d.len() - 1] == b'.')
            }
            DomainMatch::Keyword(k) => host.contains(k.as_str()),
        }
    }
}

/// IP network condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Cidr {
    pub addr: IpAddr,
    pub prefix: u8,
}

impl Cidr {
    pub fn contains(&self, ip: IpAddr) -> bool {
        match (self.addr, ip) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                let mask = prefix_mask_u32(self.prefix);
                u32::from(net) & mask == u32::from(ip) & mask
            }
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                let mask = prefix_mask_u128(self.prefix);
                u128::from(net) & mask == u128::from(ip) & mask
            }
            _ => false,
        }
    }
}

fn prefix_mask_u32(prefix: u8) -> u32 {
    if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - prefix.min(32) as u32)
    }
}

fn prefix_mask_u128(prefix: u8) -> u128 {
    if prefix == 0 {
        0
    } else {
        u128::MAX << (128 - prefix.min(128) as u32)
    }
}

/// Inclusive destination port range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PortRange {
    pub start: u16,
    pub end: u16,
}

impl PortRange {
    pub fn contains(&self, port: u16) -> bool {
        (self.start..=self.end).contains(&port)
    }
}

/// One compiled routing rule. Empty condition lists are wildcards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoutingRule {
    pub inbound_tags: Vec<String>,
    pub domains: Vec<DomainMatch>,
    pub cidrs: Vec<Cidr>,
    pub ports: Vec<PortRange>,
    pub outbound_tag: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoutingConfig {
    pub domain_strategy: String,
    pub rules: Vec<RoutingRule>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            domain_strategy: "AsIs".to_string(),
            rules: Vec::new(),
        }
    }
}

// --- Inbounds ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Vmess,
    Vless,
    Trojan,
    Shadowsocks,
    Hysteria2,
    Tuic,
}

impl Protocol {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "vmess" => Some(Protocol::Vmess),
            "vless" => Some(Protocol::Vless),
            "trojan" => Some(Protocol::Trojan),
            "shadowsocks" | "ss" => Some(Protocol::Shadowsocks),
            "hysteria2" | "hy2" => Some(Protocol::Hysteria2),
            "tuic" => Some(Protocol::Tuic),
            _ => None,
        }
    }

    /// Protocols whose user credential must be a UUID.
    pub fn requires_uuid(&self) -> bool {
        matches!(self, Protocol::Vmess | Protocol::Vless | Protocol::Tuic)
    }

    /// QUIC based protocols listen on UDP.
    pub fn is_udp(&self) -> bool {
        matches!(self, Protocol::Hysteria2 | Protocol::Tuic)
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Protocol::Vmess => "vmess",
            Protocol::Vless => "vless",
            Protocol::Trojan => "trojan",
            Protocol::Shadowsocks => "shadowsocks",
            Protocol::Hysteria2 => "hysteria2",
            Protocol::Tuic => "tuic",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Tcp,
    Ws,
    Grpc,
    HttpUpgrade,
    Xhttp,
}

impl Network {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "tcp" | "raw" => Some(Network::Tcp),
            "ws" | "websocket" => Some(Network::Ws),
            "grpc" => Some(Network::Grpc),
            "httpupgrade" => Some(Network::HttpUpgrade),
            "xhttp" | "splithttp" => Some(Network::Xhttp),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransportConfig {
    pub network: Network,
    pub settings: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TlsConfig {
    pub server_name: String,
    pub cert_file: Option<String>,
    pub key_file: Option<String>,
    pub alpn: Vec<String>,
}

/// A user as the engine sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InboundUser {
    /// Engine-facing identity, `"<tag>|<id>"`.
    pub email: String,
    /// External id.
    pub id: String,
    pub credential: String,
    pub level: u32,
    pub speed_limit: u64,
    pub device_limit: u32,
}

impl InboundUser {
    pub fn email_for(tag: &str, id: &str) -> String {
        format!("{}|{}", tag, id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InboundConfig {
    pub tag: String,
    pub protocol: Protocol,
    pub listen: SocketAddr,
    pub transport: TransportConfig,
    pub tls: Option<TlsConfig>,
    pub cipher: Option<String>,
    pub server_key: Option<String>,
    pub flow: Option<String>,
    pub users: Vec<InboundUser>,
    pub default_outbound: String,
    pub sniffing: bool,
}

// --- Outbounds ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutboundProtocol {
    Freedom,
    Blackhole,
    Socks,
    Http,
    Shadowsocks,
    Trojan,
    Vmess,
    Vless,
}

impl OutboundProtocol {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "freedom" | "direct" => Some(OutboundProtocol::Freedom),
            "blackhole" | "block" => Some(OutboundProtocol::Blackhole),
            "socks" | "socks5" => Some(OutboundProtocol::Socks),
            "http" => Some(OutboundProtocol::Http),
            "shadowsocks" | "ss" => Some(OutboundProtocol::Shadowsocks),
            "trojan" => Some(OutboundProtocol::Trojan),
            "vmess" => Some(OutboundProtocol::Vmess),
            "vless" => Some(OutboundProtocol::Vless),
            _ => None,
        }
    }

    /// Relaying protocols need an upstream address.
    pub fn needs_address(&self) -> bool {
        !matches!(self, OutboundProtocol::Freedom | OutboundProtocol::Blackhole)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundConfig {
    pub tag: String,
    pub protocol: OutboundProtocol,
    /// Upstream "host:port".
    pub address: Option<String>,
    pub settings: Option<serde_json::Value>,
}

impl OutboundConfig {
    pub fn direct() -> Self {
        Self {
            tag: DIRECT_TAG.to_string(),
            protocol: OutboundProtocol::Freedom,
            address: None,
            settings: None,
        }
    }

    pub fn block() -> Self {
        Self {
            tag: BLOCK_TAG.to_string(),
            protocol: OutboundProtocol::Blackhole,
            address: None,
            settings: None,
        }
    }
}

/// Built-in outbound tags.
pub const DIRECT_TAG: &str = "direct";
pub const BLOCK_TAG: &str = "block";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_traffic_policy_constants() {
        let policy = PolicyConfig::default().level(0);
        assert_eq!(policy.handshake_secs, 8);
        assert_eq!(policy.connection_idle_secs, 300);
        assert_eq!(policy.uplink_only_secs, 5);
        assert_eq!(policy.downlink_only_secs, 8);
        assert_eq!(policy.buffer_size_kib, 64);
        assert!(policy.stats_user_uplink && policy.stats_user_downlink);
        assert_eq!(policy.handshake_timeout(), Duration::from_secs(8));
    }

    #[test]
    fn test_unknown_level_falls_back() {
        let policies = PolicyConfig::default();
        assert_eq!(policies.level(7), policies.level(0));
    }

    #[test]
    fn test_domain_match() {
        let suffix = DomainMatch::Suffix("example.com".into());
        assert!(suffix.matches("example.com"));
        assert!(suffix.matches("WWW.Example.com"));
        assert!(!suffix.matches("badexample.com"));

        let full = DomainMatch::Full("a.example.com".into());
        assert!(full.matches("a.example.com"));
        assert!(!full.matches("b.a.example.com"));

        let keyword = DomainMatch::Keyword("ads".into());
        assert!(keyword.matches("cdn.ads.net"));
    }

    #[test]
    fn test_cidr_contains() {
        let net = Cidr { addr: "10.0.0.0".parse().unwrap(), prefix: 8 };
        assert!(net.contains("10.1.2.3".parse().unwrap()));
        assert!(!net.contains("11.0.0.1".parse().unwrap()));
        assert!(!net.contains("::1".parse().unwrap()));

        let any = Cidr { addr: "0.0.0.0".parse().unwrap(), prefix: 0 };
        assert!(any.contains("8.8.8.8".parse().unwrap()));

        let v6 = Cidr { addr: "fd00::".parse().unwrap(), prefix: 8 };
        assert!(v6.contains("fd12::1".parse().unwrap()));
    }

    #[test]
    fn test_protocol_names() {
        assert_eq!(Protocol::from_name("VMess"), Some(Protocol::Vmess));
        assert_eq!(Protocol::from_name("ss"), Some(Protocol::Shadowsocks));
        assert_eq!(Protocol::from_name("wireguard"), None);
        assert!(Protocol::Tuic.is_udp());
        assert_eq!(Protocol::Hysteria2.to_string(), "hysteria2");
    }
}

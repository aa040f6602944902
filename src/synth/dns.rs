//! DNS policy synthesis.
//!
//! Servers and hosts from every node are merged in node order with
//! duplicates dropped. The first node that names a query strategy wins.
//! With no servers at all the system resolver is used.

use std::net::{IpAddr, SocketAddr};
use url::Url;

use crate::engine::config::{DnsConfig, DnsServer, QueryStrategy};
use crate::node::descriptor::NodeDescriptor;
use crate::synth::SynthesisError;

pub fn build_dns(nodes: &[NodeDescriptor]) -> Result<DnsConfig, SynthesisError> {
    let mut config = DnsConfig {
        servers: Vec::new(),
        ..DnsConfig::default()
    };
    let mut strategy: Option<QueryStrategy> = None;

    for node in nodes {
        let Some(dns) = &node.dns else { continue };

        for raw in &dns.servers {
            let server = parse_server(raw).ok_or_else(|| SynthesisError::InvalidDns {
                tag: node.tag.clone(),
                server: raw.clone(),
            })?;
            if !config.servers.contains(&server) {
                config.servers.push(server);
            }
        }

        for (host, addrs) in &dns.hosts {
            let entry = config.hosts.entry(host.to_ascii_lowercase()).or_default();
            for addr in addrs {
                if !entry.contains(addr) {
                    entry.push(addr.clone());
                }
            }
        }

        if strategy.is_none() {
            if let Some(raw) = &dns.query_strategy {
                strategy = Some(parse_strategy(raw).ok_or_else(|| SynthesisError::InvalidDns {
                    tag: node.tag.clone(),
                    server: format!("query strategy {:?}", raw),
                })?);
            }
        }
    }

    if config.servers.is_empty() {
        config.servers.push(DnsServer::Local);
    }
    config.query_strategy = strategy.unwrap_or_default();
    Ok(config)
}

/// "localhost", a bare IP (UDP/53), "udp://ip[:port]", "tcp://ip[:port]", "https://...".
pub fn parse_server(raw: &str) -> Option<DnsServer> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("localhost") {
        return Some(DnsServer::Local);
    }
    if let Ok(ip) = raw.parse::<IpAddr>() {
        return Some(DnsServer::Udp(SocketAddr::new(ip, 53)));
    }
    if let Ok(addr) = raw.parse::<SocketAddr>() {
        return Some(DnsServer::Udp(addr));
    }

    let url = Url::parse(raw).ok()?;
    match url.scheme() {
        "https" => url.host_str().map(|_| DnsServer::Https(url.to_string())),
        scheme @ ("udp" | "tcp") => {
            let host = url.host_str()?.trim_start_matches('[').trim_end_matches(']');
            let ip: IpAddr = host.parse().ok()?;
            let addr = SocketAddr::new(ip, url.port().unwrap_or(53));
            Some(if scheme == "udp" {
                DnsServer::Udp(addr)
            } else {
                DnsServer::Tcp(addr)
            })
        }
        _ => None,
    }
}

fn parse_strategy(raw: &str) -> Option<QueryStrategy> {
    match raw.to_ascii_lowercase().as_str() {
        "useip" => Some(QueryStrategy::UseIP),
        "useipv4" => Some(QueryStrategy::UseIPv4),
        "useipv6" => Some(QueryStrategy::UseIPv6),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::descriptor::DnsDescriptor;
    use crate::synth::tests::node;

    #[test]
    fn test_parse_server_forms() {
        assert_eq!(parse_server("localhost"), Some(DnsServer::Local));
        assert_eq!(
            parse_server("1.1.1.1"),
            Some(DnsServer::Udp("1.1.1.1:53".parse().unwrap()))
        );
        assert_eq!(
            parse_server("tcp://8.8.8.8:5353"),
            Some(DnsServer::Tcp("8.8.8.8:5353".parse().unwrap()))
        );
        assert!(matches!(
            parse_server("https://dns.google/dns-query"),
            Some(DnsServer::Https(_))
        ));
        assert_eq!(parse_server("udp://dns.google"), None);
        assert_eq!(parse_server("ftp://1.1.1.1"), None);
    }

    #[test]
    fn test_merge_across_nodes() {
        let mut a = node("A", "trojan", 1);
        a.dns = Some(DnsDescriptor {
            servers: vec!["1.1.1.1".into(), "8.8.8.8".into()],
            hosts: [("Example.com".to_string(), vec!["1.2.3.4".to_string()])].into(),
            query_strategy: Some("UseIPv4".into()),
        });
        let mut b = node("B", "trojan", 2);
        b.dns = Some(DnsDescriptor {
            servers: vec!["8.8.8.8".into()],
            hosts: [("example.com".to_string(), vec!["1.2.3.4".to_string(), "5.6.7.8".to_string()])].into(),
            query_strategy: Some("UseIPv6".into()),
        });

        let dns = build_dns(&[a, b]).unwrap();
        assert_eq!(dns.servers.len(), 2);
        assert_eq!(dns.hosts["example.com"], vec!["1.2.3.4", "5.6.7.8"]);
        assert_eq!(dns.query_strategy, QueryStrategy::UseIPv4);
    }

    #[test]
    fn test_invalid_server_rejected() {
        let mut a = node("A", "trojan", 1);
        a.dns = Some(DnsDescriptor {
            servers: vec!["not a resolver".into()],
            ..DnsDescriptor::default()
        });
        assert!(matches!(build_dns(&[a]).unwrap_err(), SynthesisError::InvalidDns { .. }));
    }

    #[test]
    fn test_fallback_resolver() {
        let dns = build_dns(&[node("A", "trojan", 1)]).unwrap();
        assert_eq!(dns.servers, vec![DnsServer::Local]);
    }
}

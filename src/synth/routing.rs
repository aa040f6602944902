//! Routing policy synthesis.
//!
//! Rules are scoped to their node's inbound tag and emitted in node
//! order, then rule order. A node with a `default_outbound` gets a
//! trailing catch-all rule for its inbound.

use std::collections::HashSet;
use std::net::IpAddr;

use crate::engine::config::{Cidr, DomainMatch, PortRange, RoutingConfig, RoutingRule};
use crate::node::descriptor::{NodeDescriptor, RouteRuleDescriptor};
use crate::synth::SynthesisError;

pub fn build_routing(
    nodes: &[NodeDescriptor],
    known: &HashSet<&str>,
) -> Result<RoutingConfig, SynthesisError> {
    let mut rules = Vec::new();

    for node in nodes {
        for desc in &node.routes {
            rules.push(build_rule(&node.tag, desc, known)?);
        }

        if let Some(default) = &node.default_outbound {
            if !known.contains(default.as_str()) {
                return Err(SynthesisError::UnknownOutbound {
                    node: node.tag.clone(),
                    outbound: default.clone(),
                });
            }
            rules.push(RoutingRule {
                inbound_tags: vec![node.tag.clone()],
                domains: Vec::new(),
                cidrs: Vec::new(),
                ports: Vec::new(),
                outbound_tag: default.clone(),
            });
        }
    }

    Ok(RoutingConfig {
        rules,
        ..RoutingConfig::default()
    })
}

fn build_rule(
    tag: &str,
    desc: &RouteRuleDescriptor,
    known: &HashSet<&str>,
) -> Result<RoutingRule, SynthesisError> {
    if !known.contains(desc.outbound.as_str()) {
        return Err(SynthesisError::UnknownOutbound {
            node: tag.to_string(),
            outbound: desc.outbound.clone(),
        });
    }

    let invalid = |reason: String| SynthesisError::InvalidRule {
        tag: tag.to_string(),
        reason,
    };

    let domains = desc
        .domains
        .iter()
        .map(|d| parse_domain(d).map_err(&invalid))
        .collect::<Result<Vec<_>, _>>()?;
    let cidrs = desc
        .ips
        .iter()
        .map(|ip| parse_cidr(ip).map_err(&invalid))
        .collect::<Result<Vec<_>, _>>()?;
    let ports = desc
        .ports
        .iter()
        .map(|p| parse_port_range(p).map_err(&invalid))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(RoutingRule {
        inbound_tags: vec![tag.to_string()],
        domains,
        cidrs,
        ports,
        outbound_tag: desc.outbound.clone(),
    })
}

/// "full:", "domain:", "keyword:" prefixes; a bare value is a suffix match.
pub fn parse_domain(raw: &str) -> Result<DomainMatch, String> {
    let (kind, value) = match raw.split_once(':') {
        Some((kind, value)) => (kind, value),
        None => ("domain", raw),
    };
    let value = value
        .trim()
        .trim_matches('.')
        .to_ascii_lowercase();
    if value.is_empty() {
        return Err(format!("empty domain in {:?}", raw));
    }
    match kind {
        "full" => Ok(DomainMatch::Full(value)),
        "domain" => Ok(DomainMatch::Suffix(value)),
        "keyword" => Ok(DomainMatch::Keyword(value)),
        other => Err(format!("unsupported domain matcher {:?}", other)),
    }
}

/// "10.0.0.0/8", "fd00::/8", or a bare address.
pub fn parse_cidr(raw: &str) -> Result<Cidr, String> {
    let (addr, prefix) = match raw.split_once('/') {
        Some((addr, prefix)) => (addr, Some(prefix)),
        None => (raw, None),
    };
    let addr: IpAddr = addr
        .trim()
        .parse()
        .map_err(|_| format!("{:?} is not an IP address", raw))?;
    let max = if addr.is_ipv4() { 32 } else { 128 };
    let prefix = match prefix {
        Some(p) => p
            .trim()
            .parse::<u8>()
            .ok()
            .filter(|p| *p <= max)
            .ok_or_else(|| format!("{:?} has an invalid prefix", raw))?,
        None => max,
    };
    Ok(Cidr { addr, prefix })
}

/// "443" or "1000-2000".
pub fn parse_port_range(raw: &str) -> Result<PortRange, String> {
    let parse = |s: &str| {
        s.trim()
            .parse::<u16>()
            .map_err(|_| format!("{:?} is not a port", raw))
    };
    let (start, end) = match raw.split_once('-') {
        Some((start, end)) => (parse(start)?, parse(end)?),
        None => {
            let port = parse(raw)?;
            (port, port)
        }
    };
    if start > end {
        return Err(format!("{:?} is an empty range", raw));
    }
    Ok(PortRange { start, end })
}

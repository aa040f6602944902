//! Rule condition matching.
//!
//! # Responsibilities
//! - Match inbound tag (exact)
//! - Match destination domain (full / suffix / keyword, case-insensitive)
//! - Match destination IP (CIDR) and port (ranges)
//! - Combine conditions with AND semantics
//!
//! # Design Decisions
//! - Empty condition = always matches (wildcard)
//! - A domain or IP condition never matches a session lacking that field
//! - No regex to guarantee O(n) matching

use crate::engine::config::{Cidr, DomainMatch, PortRange, RoutingRule};
use crate::engine::SessionTarget;

/// Trait for matching sessions against conditions.
pub trait Matcher: Send + Sync + std::fmt::Debug {
    /// Returns true if the session matches this condition.
    fn matches(&self, target: &SessionTarget) -> bool;
}

/// Matches the inbound the session arrived on.
#[derive(Debug, Clone)]
pub struct InboundTagMatcher {
    tags: Vec<String>,
}

impl InboundTagMatcher {
    pub fn new(tags: Vec<String>) -> Self {
        Self { tags }
    }
}

impl Matcher for InboundTagMatcher {
    fn matches(&self, target: &SessionTarget) -> bool {
        self.tags.iter().any(|t| *t == target.inbound_tag)
    }
}

#[derive(Debug, Clone)]
pub struct DomainMatcher {
    domains: Vec<DomainMatch>,
}

impl DomainMatcher {
    pub fn new(domains: Vec<DomainMatch>) -> Self {
        Self { domains }
    }
}

impl Matcher for DomainMatcher {
    fn matches(&self, target: &SessionTarget) -> bool {
        target
            .domain
            .as_deref()
            .map(|host| self.domains.iter().any(|d| d.matches(host)))
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone)]
pub struct CidrMatcher {
    cidrs: Vec<Cidr>,
}

impl CidrMatcher {
    pub fn new(cidrs: Vec<Cidr>) -> Self {
        Self { cidrs }
    }
}

impl Matcher for CidrMatcher {
    fn matches(&self, target: &SessionTarget) -> bool {
        target
            .ip
            .map(|ip| self.cidrs.iter().any(|c| c.contains(ip)))
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone)]
pub struct PortMatcher {
    ranges: Vec<PortRange>,
}

impl PortMatcher {
    pub fn new(ranges: Vec<PortRange>) -> Self {
        Self { ranges }
    }
}

impl Matcher for PortMatcher {
    fn matches(&self, target: &SessionTarget) -> bool {
        self.ranges.iter().any(|r| r.contains(target.port))
    }
}

/// Combines multiple matchers with AND semantics.
#[derive(Debug)]
pub struct AndMatcher {
    matchers: Vec<Box<dyn Matcher>>,
}

impl AndMatcher {
    pub fn new(matchers: Vec<Box<dyn Matcher>>) -> Self {
        Self { matchers }
    }

    /// Compile a routing rule; empty condition lists are skipped.
    pub fn from_rule(rule: &RoutingRule) -> Self {
        let mut matchers: Vec<Box<dyn Matcher>> = Vec::new();
        if !rule.inbound_tags.is_empty() {
            matchers.push(Box::new(InboundTagMatcher::new(rule.inbound_tags.clone())));
        }
        if !rule.domains.is_empty() {
            matchers.push(Box::new(DomainMatcher::new(rule.domains.clone())));
        }
        if !rule.cidrs.is_empty() {
            matchers.push(Box::new(CidrMatcher::new(rule.cidrs.clone())));
        }
        if !rule.ports.is_empty() {
            matchers.push(Box::new(PortMatcher::new(rule.ports.clone())));
        }
        Self::new(matchers)
    }
}

impl Matcher for AndMatcher {
    fn matches(&self, target: &SessionTarget) -> bool {
        self.matchers.iter().all(|m| m.matches(target))
    }
}

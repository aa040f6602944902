//! Rule-based outbound selection.

use std::collections::HashMap;

use crate::engine::config::Config;
use crate::engine::local::matcher::{AndMatcher, Matcher};
use crate::engine::{Dispatcher, EngineError, SessionTarget};

/// Walks the compiled rules in order; first match wins, then the
/// inbound's default outbound.
#[derive(Debug)]
pub struct RuleDispatcher {
    rules: Vec<(AndMatcher, String)>,
    defaults: HashMap<String, String>,
}

impl RuleDispatcher {
    pub fn from_config(config: &Config) -> Self {
        let rules = config
            .routing
            .rules
            .iter()
            .map(|rule| (AndMatcher::from_rule(rule), rule.outbound_tag.clone()))
            .collect();
        let defaults = config
            .inbounds
            .iter()
            .map(|i| (i.tag.clone(), i.default_outbound.clone()))
            .collect();
        Self { rules, defaults }
    }
}

impl Dispatcher for RuleDispatcher {
    fn select_outbound(&self, target: &SessionTarget) -> Result<String, EngineError> {
        if let Some((_, outbound)) = self.rules.iter().find(|(m, _)| m.matches(target)) {
            return Ok(outbound.clone());
        }
        self.defaults
            .get(&target.inbound_tag)
            .cloned()
            .ok_or_else(|| EngineError::UnknownInbound(target.inbound_tag.clone()))
    }
}

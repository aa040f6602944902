//! Shared utilities for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use proxy_node::engine::config::{Config, InboundUser};
use proxy_node::engine::local::{LocalInboundManager, RuleDispatcher};
use proxy_node::engine::{
    Dispatcher, Engine, EngineError, EngineFactory, InboundManager, OutboundManager,
};
use proxy_node::node::{NodeDescriptor, NodeSource, SourceError, UserInfo};

/// Failure switches and counters shared by every engine a factory makes.
#[derive(Debug, Default)]
pub struct MockControl {
    pub fail_create: AtomicBool,
    pub fail_start: AtomicBool,
    pub fail_stop: AtomicBool,
    pub fail_add_users: AtomicBool,
    pub start_delay_ms: AtomicU64,
    pub created: AtomicUsize,
    pub live: AtomicUsize,
    pub max_live: AtomicUsize,
}

impl MockControl {
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn max_live(&self) -> usize {
        self.max_live.load(Ordering::SeqCst)
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Default, Clone)]
pub struct MockEngineFactory {
    pub control: Arc<MockControl>,
}

impl MockEngineFactory {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EngineFactory for MockEngineFactory {
    fn create(&self, config: Arc<Config>) -> Result<Box<dyn Engine>, EngineError> {
        if self.control.fail_create.load(Ordering::SeqCst) {
            return Err(EngineError::Create("injected".into()));
        }
        self.control.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockEngine {
            control: self.control.clone(),
            inbounds: Arc::new(MockInbounds {
                control: self.control.clone(),
                inner: LocalInboundManager::from_config(&config),
            }),
            outbounds: Arc::new(MockOutbounds(
                config.outbounds.iter().map(|o| o.tag.clone()).collect(),
            )),
            dispatcher: Arc::new(RuleDispatcher::from_config(&config)),
            started: false,
        }))
    }
}

/// Local user tables. `fail_add_users` rejects the next `add_users` call.
struct MockInbounds {
    control: Arc<MockControl>,
    inner: LocalInboundManager,
}

impl InboundManager for MockInbounds {
    fn tags(&self) -> Vec<String> {
        self.inner.tags()
    }

    fn add_users(&self, tag: &str, users: &[InboundUser]) -> Result<usize, EngineError> {
        if self.control.fail_add_users.swap(false, Ordering::SeqCst) {
            return Err(EngineError::Start("add rejected".into()));
        }
        self.inner.add_users(tag, users)
    }

    fn remove_users(&self, tag: &str, emails: &[String]) -> Result<usize, EngineError> {
        self.inner.remove_users(tag, emails)
    }

    fn user_count(&self, tag: &str) -> Result<usize, EngineError> {
        self.inner.user_count(tag)
    }
}

struct MockOutbounds(Vec<String>);

impl OutboundManager for MockOutbounds {
    fn tags(&self) -> Vec<String> {
        self.0.clone()
    }

    fn default_tag(&self) -> Option<String> {
        self.0.first().cloned()
    }
}

pub struct MockEngine {
    control: Arc<MockControl>,
    inbounds: Arc<MockInbounds>,
    outbounds: Arc<MockOutbounds>,
    dispatcher: Arc<RuleDispatcher>,
    started: bool,
}

#[async_trait]
impl Engine for MockEngine {
    async fn start(&mut self) -> Result<(), EngineError> {
        let delay = self.control.start_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.control.fail_start.load(Ordering::SeqCst) {
            return Err(EngineError::Start("injected".into()));
        }
        let live = self.control.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.control.max_live.fetch_max(live, Ordering::SeqCst);
        self.started = true;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), EngineError> {
        if self.started {
            self.started = false;
            self.control.live.fetch_sub(1, Ordering::SeqCst);
        }
        if self.control.fail_stop.load(Ordering::SeqCst) {
            return Err(EngineError::Stop("injected".into()));
        }
        Ok(())
    }

    fn inbound_manager(&self) -> Arc<dyn InboundManager> {
        self.inbounds.clone()
    }

    fn outbound_manager(&self) -> Arc<dyn OutboundManager> {
        self.outbounds.clone()
    }

    fn dispatcher(&self) -> Arc<dyn Dispatcher> {
        self.dispatcher.clone()
    }

    fn version(&self) -> String {
        "mock/1".into()
    }
}

/// Node source backed by memory; tests swap the node set between fetches.
#[derive(Debug, Default)]
pub struct StaticSource {
    nodes: Mutex<Vec<NodeDescriptor>>,
    pub fetches: AtomicUsize,
    pub fail: AtomicBool,
}

impl StaticSource {
    pub fn new(nodes: Vec<NodeDescriptor>) -> Self {
        Self {
            nodes: Mutex::new(nodes),
            ..Default::default()
        }
    }

    pub fn set(&self, nodes: Vec<NodeDescriptor>) {
        *self.nodes.lock().unwrap() = nodes;
    }
}

#[async_trait]
impl NodeSource for StaticSource {
    async fn fetch_nodes(&self) -> Result<Vec<NodeDescriptor>, SourceError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(SourceError::Unavailable("injected".into()));
        }
        Ok(self.nodes.lock().unwrap().clone())
    }
}

pub fn node(tag: &str, protocol: &str, port: u16) -> NodeDescriptor {
    serde_json::from_value(serde_json::json!({
        "tag": tag,
        "protocol": protocol,
        "listen_ip": "127.0.0.1",
        "port": port,
    }))
    .unwrap()
}

pub fn uuid_user(id: &str) -> UserInfo {
    let mut user = UserInfo::new(id);
    user.uuid = Some(uuid::Uuid::new_v4().to_string());
    user
}

/// Poll `check` until it holds or the timeout passes.
pub async fn wait_for(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

//! Engine lifecycle manager.
//!
//! # Responsibilities
//! - Own at most one live engine instance
//! - Serialize start / close / reload / user updates under one lock
//! - Publish handles for lock-free reads while running
//! - Keep the user registry in step with the applied node set
//!
//! # Design Decisions
//! - `tokio::sync::Mutex` is the lifecycle lock: FIFO-fair, held across
//!   engine start and stop
//! - The published handle lives in an `ArcSwapOption`; readers never
//!   touch the lifecycle lock
//! - Reload synthesizes before tearing down, so a bad node set leaves the
//!   running engine alone; a failed start after teardown stays stopped
//! - No retries here; callers own retry policy

use arc_swap::ArcSwapOption;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::engine::config::{Config, LogPolicy, Protocol};
use crate::engine::{Dispatcher, Engine, EngineError, EngineFactory, InboundManager, OutboundManager};
use crate::lifecycle::handle::EngineHandle;
use crate::lifecycle::state::{AtomicState, LifecycleState};
use crate::node::descriptor::{NodeDescriptor, UserInfo};
use crate::node::source::SourceError;
use crate::observability::metrics;
use crate::synth::{build_config, inbound::build_users, SynthesisError};
use crate::users::{diff_users, TrafficStats, UserDiff, UserRegistry, UserTraffic};

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid node set: {0}")]
    Synthesis(#[from] SynthesisError),

    #[error("Engine failed to start: {0}")]
    EngineStart(#[source] EngineError),

    #[error("Engine failed to stop: {0}")]
    EngineStop(#[source] EngineError),

    #[error("Engine rejected the update: {0}")]
    Engine(#[source] EngineError),

    #[error("Engine is already running")]
    AlreadyRunning,

    #[error("Engine is not running")]
    NotRunning,

    #[error("Unknown inbound: {0}")]
    UnknownInbound(String),

    #[error("Inbound {0} is still running")]
    InboundActive(String),

    #[error("Node source failed: {0}")]
    Source(#[from] SourceError),
}

/// Users to push into one running inbound.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct AddUsersParams {
    pub tag: String,
    pub users: Vec<UserInfo>,
}

/// Everything guarded by the lifecycle lock.
#[derive(Default)]
struct Inner {
    engine: Option<Box<dyn Engine>>,
    /// Last user list applied to each inbound.
    applied_users: HashMap<String, Vec<UserInfo>>,
}

/// Engine lifecycle manager. Share it behind an `Arc`.
pub struct NodeCore {
    factory: Arc<dyn EngineFactory>,
    log: LogPolicy,
    access: Mutex<Inner>,
    handle: ArcSwapOption<EngineHandle>,
    state: AtomicState,
    generation: AtomicU64,
    registry: Arc<UserRegistry>,
    traffic: Arc<TrafficStats>,
}

impl NodeCore {
    pub fn new(factory: Arc<dyn EngineFactory>, log: LogPolicy) -> Self {
        Self::with_registry(factory, log, Arc::new(UserRegistry::new()))
    }

    /// Use an existing registry, for example one shared with a stats reader.
    pub fn with_registry(
        factory: Arc<dyn EngineFactory>,
        log: LogPolicy,
        registry: Arc<UserRegistry>,
    ) -> Self {
        Self {
            factory,
            log,
            access: Mutex::new(Inner::default()),
            handle: ArcSwapOption::empty(),
            state: AtomicState::default(),
            generation: AtomicU64::new(0),
            registry,
            traffic: Arc::new(TrafficStats::new()),
        }
    }

    /// Synthesize a config from `nodes` and bring an engine up with it.
    pub async fn start(&self, nodes: &[NodeDescriptor]) -> Result<(), CoreError> {
        let mut inner = self.access.lock().await;
        if inner.engine.is_some() {
            return Err(CoreError::AlreadyRunning);
        }
        self.start_locked(&mut inner, nodes).await
    }

    /// Stop the running engine. A no-op when already stopped.
    pub async fn close(&self) -> Result<(), CoreError> {
        let mut inner = self.access.lock().await;
        self.close_locked(&mut inner).await
    }

    /// Replace the running engine with one built from `nodes`.
    pub async fn reload(&self, nodes: &[NodeDescriptor]) -> Result<(), CoreError> {
        let mut inner = self.access.lock().await;

        if inner.engine.is_none() {
            tracing::info!("Reload requested while stopped, starting fresh");
            let result = self.start_locked(&mut inner, nodes).await;
            metrics::record_reload(result.is_ok());
            return result;
        }

        let config = match build_config(nodes, self.log.clone()) {
            Ok(config) => Arc::new(config),
            Err(e) => {
                tracing::warn!(error = %e, "Reload rejected, keeping the running engine");
                metrics::record_reload(false);
                return Err(e.into());
            }
        };

        if let Err(e) = self.close_locked(&mut inner).await {
            tracing::warn!(error = %e, "Previous engine did not stop cleanly");
        }

        self.state.set(LifecycleState::Starting);
        let result = self.launch(&mut inner, config, nodes).await;
        metrics::record_reload(result.is_ok());
        result
    }

    async fn start_locked(
        &self,
        inner: &mut Inner,
        nodes: &[NodeDescriptor],
    ) -> Result<(), CoreError> {
        self.state.set(LifecycleState::Starting);
        let config = match build_config(nodes, self.log.clone()) {
            Ok(config) => Arc::new(config),
            Err(e) => {
                self.state.set(LifecycleState::Stopped);
                metrics::record_engine_start(false);
                tracing::error!(error = %e, "Node set rejected");
                return Err(e.into());
            }
        };
        self.launch(inner, config, nodes).await
    }

    /// Create, start and publish an engine. Leaves the manager stopped on
    /// any failure.
    async fn launch(
        &self,
        inner: &mut Inner,
        config: Arc<Config>,
        nodes: &[NodeDescriptor],
    ) -> Result<(), CoreError> {
        let mut engine = match self.factory.create(config.clone()) {
            Ok(engine) => engine,
            Err(e) => return Err(self.fail_start(e)),
        };

        if let Err(e) = engine.start().await {
            if let Err(close_err) = engine.close().await {
                tracing::debug!(error = %close_err, "Cleanup after failed start");
            }
            return Err(self.fail_start(e));
        }

        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let handle = EngineHandle::capture(engine.as_ref(), config, generation);

        for node in nodes {
            let ids: Vec<&str> = node.users.iter().map(|u| u.id.as_str()).collect();
            let removed = self.registry.sync_tag(&node.tag, &ids);
            if !removed.is_empty() {
                tracing::debug!(tag = %node.tag, removed = removed.len(), "Dropped stale users");
            }
            metrics::record_registry_users(&node.tag, self.registry.len(&node.tag));
        }
        inner.applied_users = nodes
            .iter()
            .map(|n| (n.tag.clone(), n.users.clone()))
            .collect();
        inner.engine = Some(engine);

        tracing::info!(
            generation,
            version = %handle.version(),
            inbounds = nodes.len(),
            "Engine running"
        );
        self.handle.store(Some(Arc::new(handle)));
        self.state.set(LifecycleState::Running);
        metrics::record_engine_start(true);
        metrics::record_engine_running(true);
        Ok(())
    }

    fn fail_start(&self, e: EngineError) -> CoreError {
        self.state.set(LifecycleState::Stopped);
        metrics::record_engine_start(false);
        metrics::record_engine_running(false);
        tracing::error!(error = %e, "Engine failed to start");
        CoreError::EngineStart(e)
    }

    async fn close_locked(&self, inner: &mut Inner) -> Result<(), CoreError> {
        let Some(mut engine) = inner.engine.take() else {
            tracing::debug!("Close requested while stopped");
            return Ok(());
        };

        self.state.set(LifecycleState::Stopping);
        self.handle.store(None);
        inner.applied_users.clear();

        let result = engine.close().await;
        drop(engine);
        self.state.set(LifecycleState::Stopped);
        metrics::record_engine_running(false);

        match result {
            Ok(()) => {
                tracing::info!("Engine stopped");
                Ok(())
            }
            Err(e) => Err(CoreError::EngineStop(e)),
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state.get()
    }

    pub fn is_running(&self) -> bool {
        self.state() == LifecycleState::Running
    }

    /// Current handle. Only available while running.
    pub fn handle(&self) -> Result<Arc<EngineHandle>, CoreError> {
        if !self.is_running() {
            return Err(CoreError::NotRunning);
        }
        self.handle.load_full().ok_or(CoreError::NotRunning)
    }

    pub fn inbound_manager(&self) -> Result<Arc<dyn InboundManager>, CoreError> {
        Ok(self.handle()?.inbound_manager())
    }

    pub fn outbound_manager(&self) -> Result<Arc<dyn OutboundManager>, CoreError> {
        Ok(self.handle()?.outbound_manager())
    }

    pub fn dispatcher(&self) -> Result<Arc<dyn Dispatcher>, CoreError> {
        Ok(self.handle()?.dispatcher())
    }

    pub fn config(&self) -> Result<Arc<Config>, CoreError> {
        Ok(self.handle()?.config())
    }

    pub fn registry(&self) -> Arc<UserRegistry> {
        self.registry.clone()
    }

    pub fn traffic(&self) -> Arc<TrafficStats> {
        self.traffic.clone()
    }

    /// Traffic per user on one inbound, optionally resetting the counters.
    pub fn user_traffic(&self, tag: &str, reset: bool) -> Vec<UserTraffic> {
        self.traffic.collect(tag, reset, &self.registry)
    }

    /// Register users and push them to a running inbound.
    pub async fn add_users(&self, params: AddUsersParams) -> Result<usize, CoreError> {
        let mut inner = self.access.lock().await;
        let handle = self.handle()?;
        let protocol = inbound_protocol(&handle, &params.tag)?;
        let users = build_users(&params.tag, protocol, &params.users)?;

        let added = handle
            .inbound_manager()
            .add_users(&params.tag, &users)
            .map_err(CoreError::Engine)?;

        for user in &params.users {
            self.registry.add_or_update(&params.tag, &user.id);
        }
        let applied = inner.applied_users.entry(params.tag.clone()).or_default();
        for user in params.users {
            match applied.iter_mut().find(|u| u.id == user.id) {
                Some(existing) => *existing = user,
                None => applied.push(user),
            }
        }
        metrics::record_registry_users(&params.tag, self.registry.len(&params.tag));

        tracing::info!(tag = %params.tag, added, "Users added");
        Ok(added)
    }

    /// Remove users from the registry and from a running inbound.
    pub async fn remove_users(&self, tag: &str, ids: &[String]) -> Result<usize, CoreError> {
        let mut inner = self.access.lock().await;
        let handle = self.handle()?;
        inbound_protocol(&handle, tag)?;

        let emails: Vec<String> = ids
            .iter()
            .map(|id| crate::engine::config::InboundUser::email_for(tag, id))
            .collect();
        let removed = handle
            .inbound_manager()
            .remove_users(tag, &emails)
            .map_err(CoreError::Engine)?;

        for id in ids {
            self.registry.remove(tag, id);
        }
        if let Some(applied) = inner.applied_users.get_mut(tag) {
            applied.retain(|u| !ids.contains(&u.id));
        }
        metrics::record_registry_users(tag, self.registry.len(tag));

        tracing::info!(tag = %tag, removed, "Users removed");
        Ok(removed)
    }

    /// Forget a tag's id mappings and traffic counters. Ids for the tag
    /// start over at 1 afterwards, so a tag served by the running engine
    /// is refused.
    pub async fn reset_users(&self, tag: &str) -> Result<usize, CoreError> {
        let inner = self.access.lock().await;
        if inner.applied_users.contains_key(tag) {
            return Err(CoreError::InboundActive(tag.to_string()));
        }

        let users = self.registry.reset(tag);
        let counters = self.traffic.forget(tag);
        metrics::record_registry_users(tag, 0);

        tracing::info!(tag = %tag, users, counters, "Registry tag reset");
        Ok(users)
    }

    /// Bring one inbound's users in line with `users` without a restart.
    pub async fn sync_users(&self, tag: &str, users: &[UserInfo]) -> Result<UserDiff, CoreError> {
        let mut inner = self.access.lock().await;
        let handle = self.handle()?;
        let protocol = inbound_protocol(&handle, tag)?;

        let old = inner.applied_users.get(tag).cloned().unwrap_or_default();
        let diff = diff_users(&old, users);
        if diff.is_empty() {
            return Ok(diff);
        }

        // Validate the whole list before touching anything.
        let validated = build_users(tag, protocol, users)?;
        let added_ids: HashSet<&str> = diff.added.iter().map(|u| u.id.as_str()).collect();
        let to_add: Vec<_> = validated
            .into_iter()
            .filter(|u| added_ids.contains(u.id.as_str()))
            .collect();
        let to_remove: Vec<String> = diff
            .removed
            .iter()
            .map(|u| crate::engine::config::InboundUser::email_for(tag, &u.id))
            .collect();

        let restore = build_users(tag, protocol, &diff.removed)?;

        let inbounds = handle.inbound_manager();
        inbounds.remove_users(tag, &to_remove).map_err(CoreError::Engine)?;
        if let Err(e) = inbounds.add_users(tag, &to_add) {
            // Put the previous users back so the engine matches the registry.
            let partial: Vec<String> = to_add.iter().map(|u| u.email.clone()).collect();
            let rollback = inbounds
                .remove_users(tag, &partial)
                .and_then(|_| inbounds.add_users(tag, &restore));
            if let Err(rollback_err) = rollback {
                tracing::error!(tag = %tag, error = %rollback_err, "Failed to restore users");
            }
            return Err(CoreError::Engine(e));
        }

        let keep: HashSet<&str> = users.iter().map(|u| u.id.as_str()).collect();
        for user in diff.removed.iter().filter(|u| !keep.contains(u.id.as_str())) {
            self.registry.remove(tag, &user.id);
        }
        for user in &diff.added {
            self.registry.add_or_update(tag, &user.id);
        }
        inner.applied_users.insert(tag.to_string(), users.to_vec());
        metrics::record_registry_users(tag, self.registry.len(tag));

        tracing::info!(
            tag = %tag,
            added = diff.added.len(),
            removed = diff.removed.len(),
            "Users synced"
        );
        Ok(diff)
    }
}

fn inbound_protocol(handle: &EngineHandle, tag: &str) -> Result<Protocol, CoreError> {
    handle
        .config()
        .inbound(tag)
        .map(|inbound| inbound.protocol)
        .ok_or_else(|| CoreError::UnknownInbound(tag.to_string()))
}

impl std::fmt::Debug for NodeCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeCore")
            .field("state", &self.state())
            .field("generation", &self.generation.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::local::LocalEngineFactory;
    use crate::synth::tests::node;

    fn new_core() -> NodeCore {
        NodeCore::new(Arc::new(LocalEngineFactory::default()), LogPolicy::default())
    }

    #[tokio::test]
    async fn test_accessors_fail_while_stopped() {
        let core = new_core();
        assert_eq!(core.state(), LifecycleState::Stopped);
        assert!(matches!(core.handle(), Err(CoreError::NotRunning)));
        assert!(matches!(core.inbound_manager(), Err(CoreError::NotRunning)));
        assert!(matches!(core.config(), Err(CoreError::NotRunning)));
        assert!(core.close().await.is_ok());
    }

    #[tokio::test]
    async fn test_invalid_nodes_leave_manager_stopped() {
        let core = new_core();
        let nodes = [node("A", "trojan", 28320), node("A", "trojan", 28320)];
        let result = core.start(&nodes).await;
        assert!(matches!(
            result,
            Err(CoreError::Synthesis(SynthesisError::DuplicateTag(_)))
        ));
        assert_eq!(core.state(), LifecycleState::Stopped);
    }

    #[tokio::test]
    async fn test_user_sync_roundtrip() {
        let core = new_core();
        let mut a = node("A", "trojan", 28321);
        a.listen_ip = "127.0.0.1".into();
        a.users = vec![UserInfo::new("u1"), UserInfo::new("u2")];
        core.start(&[a]).await.unwrap();

        let u2 = core.registry().lookup("A", "u2").unwrap();
        let diff = core
            .sync_users("A", &[UserInfo::new("u2"), UserInfo::new("u3")])
            .await
            .unwrap();
        assert_eq!(diff.added, vec![UserInfo::new("u3")]);
        assert_eq!(diff.removed, vec![UserInfo::new("u1")]);

        let registry = core.registry();
        assert_eq!(registry.lookup("A", "u1"), None);
        assert_eq!(registry.lookup("A", "u2"), Some(u2));
        assert!(registry.lookup("A", "u3").is_some());
        assert_eq!(core.inbound_manager().unwrap().user_count("A").unwrap(), 2);

        let removed = core.remove_users("A", &["u2".to_string()]).await.unwrap();
        assert_eq!(removed, 1);
        let added = core
            .add_users(AddUsersParams {
                tag: "A".into(),
                users: vec![UserInfo::new("u4")],
            })
            .await
            .unwrap();
        assert_eq!(added, 1);
        assert_eq!(core.inbound_manager().unwrap().user_count("A").unwrap(), 2);

        assert!(matches!(
            core.sync_users("missing", &[]).await,
            Err(CoreError::UnknownInbound(_))
        ));
        core.close().await.unwrap();
    }
}

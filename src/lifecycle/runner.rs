//! Node run loop.
//!
//! # Responsibilities
//! - Bring the engine up from the node source, retrying with backoff
//! - Reload when the reload signal fires
//! - Poll the source: user-only changes are synced in place, anything
//!   else reloads the engine
//! - Close the engine on shutdown
//!
//! # Design Decisions
//! - Failures after the initial start are logged and the loop keeps
//!   going; a stopped engine is brought back on the next reload or poll
//! - Retry waits are interruptible by shutdown

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{Instant, Interval};

use crate::config::schema::SyncConfig;
use crate::lifecycle::manager::{CoreError, NodeCore};
use crate::lifecycle::reload::ReloadSignal;
use crate::node::descriptor::NodeDescriptor;
use crate::node::source::NodeSource;
use crate::resilience::backoff::calculate_backoff;

pub struct NodeRunner {
    core: Arc<NodeCore>,
    source: Arc<dyn NodeSource>,
    reload: ReloadSignal,
    retry: SyncConfig,
    poll_interval: Option<Duration>,
    /// Node set the engine was last built or synced from.
    applied: Vec<NodeDescriptor>,
}

impl NodeRunner {
    pub fn new(
        core: Arc<NodeCore>,
        source: Arc<dyn NodeSource>,
        reload: ReloadSignal,
        retry: SyncConfig,
    ) -> Self {
        Self {
            core,
            source,
            reload,
            retry,
            poll_interval: None,
            applied: Vec::new(),
        }
    }

    pub fn with_poll_interval(mut self, interval: Option<Duration>) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Run until shutdown. Returns an error only when the initial start
    /// exhausts its attempts or the final close fails.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) -> Result<(), CoreError> {
        if !self.start_with_retry(&mut shutdown).await? {
            return Ok(());
        }

        let mut ticker = self
            .poll_interval
            .map(|period| tokio::time::interval_at(Instant::now() + period, period));

        loop {
            tokio::select! {
                _ = self.reload.notified() => {
                    if let Err(e) = self.reload_from_source().await {
                        tracing::warn!(error = %e, "Reload failed");
                    }
                }
                _ = tick(&mut ticker) => {
                    if let Err(e) = self.poll().await {
                        tracing::warn!(error = %e, "Node poll failed");
                    }
                }
                _ = shutdown.recv() => break,
            }
        }

        tracing::info!("Shutting down engine");
        self.core.close().await
    }

    /// Returns `Ok(false)` if shutdown arrived before the engine came up.
    async fn start_with_retry(
        &mut self,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> Result<bool, CoreError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.fetch_and_start().await {
                Ok(()) => return Ok(true),
                Err(e) => {
                    if self.retry.max_attempts > 0 && attempt >= self.retry.max_attempts {
                        tracing::error!(attempt, error = %e, "Giving up on engine start");
                        return Err(e);
                    }
                    let delay = calculate_backoff(
                        attempt,
                        self.retry.retry_base_delay_ms,
                        self.retry.retry_max_delay_ms,
                    );
                    tracing::warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Engine start failed, retrying"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = shutdown.recv() => return Ok(false),
                    }
                }
            }
        }
    }

    async fn fetch_and_start(&mut self) -> Result<(), CoreError> {
        let nodes = self.source.fetch_nodes().await?;
        self.core.start(&nodes).await?;
        self.applied = nodes;
        Ok(())
    }

    async fn reload_from_source(&mut self) -> Result<(), CoreError> {
        let nodes = self.source.fetch_nodes().await?;
        self.apply_reload(nodes).await
    }

    async fn apply_reload(&mut self, nodes: Vec<NodeDescriptor>) -> Result<(), CoreError> {
        self.core.reload(&nodes).await?;
        self.applied = nodes;
        Ok(())
    }

    async fn poll(&mut self) -> Result<(), CoreError> {
        let nodes = self.source.fetch_nodes().await?;

        if !self.core.is_running() || !same_except_users(&self.applied, &nodes) {
            tracing::info!(nodes = nodes.len(), "Node set changed, reloading");
            return self.apply_reload(nodes).await;
        }

        for (old, new) in self.applied.iter().zip(&nodes) {
            if old.users != new.users {
                self.core.sync_users(&new.tag, &new.users).await?;
            }
        }
        self.applied = nodes;
        Ok(())
    }
}

async fn tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// True when the two node sets differ at most in their user lists.
fn same_except_users(old: &[NodeDescriptor], new: &[NodeDescriptor]) -> bool {
    old.len() == new.len()
        && old.iter().zip(new).all(|(a, b)| {
            NodeDescriptor {
                users: Vec::new(),
                ..a.clone()
            } == NodeDescriptor {
                users: Vec::new(),
                ..b.clone()
            }
        })
}

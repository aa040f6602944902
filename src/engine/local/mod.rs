//! Reference engine.
//!
//! Binds every inbound's listen address, keeps per-inbound user tables
//! and routes sessions with the compiled rule set. It carries no
//! protocol handlers: accepted connections are held until the handshake
//! timeout or engine close, whichever comes first. Useful for standalone runs (port ownership,
//! user sync, route checks) and for tests.

pub mod dispatcher;
pub mod inbound;
pub mod matcher;

use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpStream, UdpSocket};
use tokio::task::JoinHandle;

use crate::engine::config::Config;
use crate::engine::{Dispatcher, Engine, EngineError, EngineFactory, InboundManager, OutboundManager};
use crate::lifecycle::shutdown::Shutdown;
use crate::net::listener::{ConnectionPermit, Listener, ListenerError};

pub use dispatcher::RuleDispatcher;
pub use inbound::LocalInboundManager;

/// Outbound tags from the config; the first is the default.
#[derive(Debug)]
pub struct LocalOutboundManager {
    tags: Vec<String>,
}

impl OutboundManager for LocalOutboundManager {
    fn tags(&self) -> Vec<String> {
        self.tags.clone()
    }

    fn default_tag(&self) -> Option<String> {
        self.tags.first().cloned()
    }
}

/// Builds [`LocalEngine`]s.
#[derive(Debug, Clone)]
pub struct LocalEngineFactory {
    /// Per-inbound connection limit.
    pub max_connections: usize,
}

impl Default for LocalEngineFactory {
    fn default() -> Self {
        Self {
            max_connections: 10_000,
        }
    }
}

impl EngineFactory for LocalEngineFactory {
    fn create(&self, config: Arc<Config>) -> Result<Box<dyn Engine>, EngineError> {
        Ok(Box::new(LocalEngine::new(config, self.max_connections)))
    }
}

pub struct LocalEngine {
    config: Arc<Config>,
    inbounds: Arc<LocalInboundManager>,
    outbounds: Arc<LocalOutboundManager>,
    dispatcher: Arc<RuleDispatcher>,
    max_connections: usize,
    shutdown: Option<Shutdown>,
    tasks: Vec<JoinHandle<()>>,
    udp_sockets: Vec<UdpSocket>,
}

impl LocalEngine {
    pub fn new(config: Arc<Config>, max_connections: usize) -> Self {
        let inbounds = Arc::new(LocalInboundManager::from_config(&config));
        let outbounds = Arc::new(LocalOutboundManager {
            tags: config.outbounds.iter().map(|o| o.tag.clone()).collect(),
        });
        let dispatcher = Arc::new(RuleDispatcher::from_config(&config));
        Self {
            config,
            inbounds,
            outbounds,
            dispatcher,
            max_connections,
            shutdown: None,
            tasks: Vec::new(),
            udp_sockets: Vec::new(),
        }
    }

    /// Concrete inbound manager, for credential checks.
    pub fn local_inbounds(&self) -> Arc<LocalInboundManager> {
        self.inbounds.clone()
    }

    fn bind_error(addr: SocketAddr, err: ListenerError) -> EngineError {
        match err {
            ListenerError::Bind(source) => EngineError::Bind {
                address: addr.to_string(),
                source,
            },
            other => EngineError::Start(other.to_string()),
        }
    }
}

#[async_trait]
impl Engine for LocalEngine {
    async fn start(&mut self) -> Result<(), EngineError> {
        if self.shutdown.is_some() {
            return Err(EngineError::Start("engine already started".to_string()));
        }

        // Bind everything first so a failure releases what was bound.
        let mut listeners = Vec::new();
        let mut udp_sockets = Vec::new();
        for inbound in &self.config.inbounds {
            if inbound.protocol.is_udp() {
                let socket = UdpSocket::bind(inbound.listen)
                    .await
                    .map_err(|source| EngineError::Bind {
                        address: inbound.listen.to_string(),
                        source,
                    })?;
                udp_sockets.push(socket);
            } else {
                let listener = Listener::bind(inbound.listen, self.max_connections)
                    .await
                    .map_err(|e| Self::bind_error(inbound.listen, e))?;
                listeners.push((inbound.tag.clone(), listener));
            }
        }

        let shutdown = Shutdown::new();
        let handshake = self.config.policy.level(0).handshake_timeout();
        for (tag, listener) in listeners {
            let rx = shutdown.subscribe();
            self.tasks
                .push(tokio::spawn(accept_loop(tag, listener, rx, handshake)));
        }
        self.udp_sockets = udp_sockets;
        self.shutdown = Some(shutdown);

        tracing::info!(
            inbounds = self.config.inbounds.len(),
            outbounds = self.config.outbounds.len(),
            "Local engine started"
        );
        Ok(())
    }

    async fn close(&mut self) -> Result<(), EngineError> {
        let Some(shutdown) = self.shutdown.take() else {
            return Ok(());
        };
        shutdown.trigger();
        self.udp_sockets.clear();

        let mut failures = Vec::new();
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                failures.push(e.to_string());
            }
        }

        tracing::info!("Local engine stopped");
        if failures.is_empty() {
            Ok(())
        } else {
            Err(EngineError::Stop(failures.join(", ")))
        }
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
        format!("local/{}", env!("CARGO_PKG_VERSION"))
    }
}

impl Drop for LocalEngine {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

async fn accept_loop(
    tag: String,
    listener: Listener,
    mut shutdown: tokio::sync::broadcast::Receiver<()>,
    handshake: Duration,
) {
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer, permit)) => {
                    tokio::spawn(hold_connection(
                        tag.clone(),
                        stream,
                        peer,
                        permit,
                        handshake,
                        shutdown.resubscribe(),
                    ));
                }
                Err(ListenerError::Accept(e)) => {
                    tracing::warn!(inbound = %tag, error = %e, "Accept failed");
                }
                Err(_) => break,
            },
            _ = shutdown.recv() => break,
        }
    }
    tracing::debug!(inbound = %tag, "Accept loop exited");
}

async fn hold_connection(
    tag: String,
    stream: TcpStream,
    peer: SocketAddr,
    _permit: ConnectionPermit,
    handshake: Duration,
    mut shutdown: tokio::sync::broadcast::Receiver<()>,
) {
    let mut buf = [0u8; 1];
    let sent = tokio::select! {
        peeked = tokio::time::timeout(handshake, stream.peek(&mut buf)) => {
            matches!(peeked, Ok(Ok(n)) if n > 0)
        }
        _ = shutdown.recv() => {
            tracing::debug!(inbound = %tag, peer = %peer, "Connection dropped by engine close");
            return;
        }
    };
    tracing::debug!(inbound = %tag, peer = %peer, sent, "Closing connection without protocol handler");
}

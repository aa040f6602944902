//! Engine capability.
//!
//! # Data Flow
//! ```text
//! Config (config.rs)
//!     → EngineFactory::create
//!     → Engine::start (binds, initializes)
//!     → inbound_manager / outbound_manager / dispatcher handles
//!     → Engine::close (releases resources)
//! ```
//!
//! # Design Decisions
//! - The proxy protocols live behind these traits; the control plane
//!   never touches traffic
//! - Handles are typed trait objects, fetched once after start
//! - `local` is a reference engine for standalone use and tests

pub mod config;
pub mod local;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::engine::config::{Config, InboundUser};

/// Errors reported by an engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Failed to create engine: {0}")]
    Create(String),

    #[error("Failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Engine start failed: {0}")]
    Start(String),

    #[error("Engine stop failed: {0}")]
    Stop(String),

    #[error("Unknown inbound: {0}")]
    UnknownInbound(String),

    #[error("No route for inbound {0}")]
    NoRoute(String),
}

/// Manages the running inbound handlers.
pub trait InboundManager: Send + Sync {
    /// Tags of every running inbound.
    fn tags(&self) -> Vec<String>;

    /// Add users to an inbound. Returns how many were new.
    fn add_users(&self, tag: &str, users: &[InboundUser]) -> Result<usize, EngineError>;

    /// Remove users (by email) from an inbound. Returns how many were present.
    fn remove_users(&self, tag: &str, emails: &[String]) -> Result<usize, EngineError>;

    /// Number of users currently on an inbound.
    fn user_count(&self, tag: &str) -> Result<usize, EngineError>;
}

/// Manages the running outbound handlers.
pub trait OutboundManager: Send + Sync {
    fn tags(&self) -> Vec<String>;

    /// Outbound used when nothing else applies.
    fn default_tag(&self) -> Option<String>;
}

/// What the dispatcher knows about a new session.
#[derive(Debug, Clone, Default)]
pub struct SessionTarget {
    pub inbound_tag: String,
    pub domain: Option<String>,
    pub ip: Option<std::net::IpAddr>,
    pub port: u16,
}

/// Picks an outbound for each session.
pub trait Dispatcher: Send + Sync {
    fn select_outbound(&self, target: &SessionTarget) -> Result<String, EngineError>;
}

/// A proxy engine instance.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Bring the instance up. May block on bind.
    async fn start(&mut self) -> Result<(), EngineError>;

    /// Tear the instance down.
    async fn close(&mut self) -> Result<(), EngineError>;

    fn inbound_manager(&self) -> Arc<dyn InboundManager>;

    fn outbound_manager(&self) -> Arc<dyn OutboundManager>;

    fn dispatcher(&self) -> Arc<dyn Dispatcher>;

    fn version(&self) -> String;
}

/// Creates engine instances from a config.
pub trait EngineFactory: Send + Sync {
    fn create(&self, config: Arc<Config>) -> Result<Box<dyn Engine>, EngineError>;
}

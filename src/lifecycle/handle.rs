//! Cached handles into a running engine.

use std::sync::Arc;

use crate::engine::config::Config;
use crate::engine::{Dispatcher, Engine, InboundManager, OutboundManager};

/// Handles captured right after an engine starts. Replaced as a whole on
/// every reload; callers holding an old handle keep talking to the old
/// engine's managers, so re-fetch when `generation` changes.
#[derive(Clone)]
pub struct EngineHandle {
    inbound: Arc<dyn InboundManager>,
    outbound: Arc<dyn OutboundManager>,
    dispatcher: Arc<dyn Dispatcher>,
    config: Arc<Config>,
    generation: u64,
    version: String,
}

impl EngineHandle {
    pub(crate) fn capture(engine: &dyn Engine, config: Arc<Config>, generation: u64) -> Self {
        Self {
            inbound: engine.inbound_manager(),
            outbound: engine.outbound_manager(),
            dispatcher: engine.dispatcher(),
            config,
            generation,
            version: engine.version(),
        }
    }

    pub fn inbound_manager(&self) -> Arc<dyn InboundManager> {
        self.inbound.clone()
    }

    pub fn outbound_manager(&self) -> Arc<dyn OutboundManager> {
        self.outbound.clone()
    }

    pub fn dispatcher(&self) -> Arc<dyn Dispatcher> {
        self.dispatcher.clone()
    }

    pub fn config(&self) -> Arc<Config> {
        self.config.clone()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn version(&self) -> &str {
        &self.version
    }
}

impl std::fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineHandle")
            .field("generation", &self.generation)
            .field("version", &self.version)
            .field("inbounds", &self.config.inbounds.len())
            .finish()
    }
}

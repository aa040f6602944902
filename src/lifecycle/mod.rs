//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! NodeRunner (runner.rs):
//!     NodeSource → NodeCore::start (retry with backoff)
//!     ReloadSignal / poll tick → NodeCore::reload or NodeCore::sync_users
//!     Shutdown → NodeCore::close
//!
//! NodeCore (manager.rs):
//!     nodes → synth::build_config → EngineFactory::create → Engine::start
//!     → EngineHandle published (handle.rs), state Running (state.rs)
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown (shutdown.rs)
//!     SIGHUP → ReloadSignal (reload.rs)
//! ```
//!
//! # Design Decisions
//! - One lifecycle lock per NodeCore; no process-wide globals
//! - Handles are read lock-free while running
//! - Ordered shutdown: stop the run loop, then close the engine

pub mod handle;
pub mod manager;
pub mod reload;
pub mod runner;
pub mod shutdown;
pub mod signals;
pub mod state;

pub use handle::EngineHandle;
pub use manager::{AddUsersParams, CoreError, NodeCore};
pub use reload::ReloadSignal;
pub use runner::NodeRunner;
pub use shutdown::Shutdown;
pub use state::LifecycleState;

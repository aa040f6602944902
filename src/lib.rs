//! Proxy node control plane.
//!
//! Turns node descriptors into engine configuration, owns the engine
//! instance across start / close / reload, and maps panel users to the
//! engine's internal ids.

pub mod admin;
pub mod config;
pub mod engine;
pub mod lifecycle;
pub mod net;
pub mod node;
pub mod observability;
pub mod resilience;
pub mod synth;
pub mod users;

pub use config::NodeConfig;
pub use lifecycle::{NodeCore, NodeRunner, ReloadSignal, Shutdown};
pub use users::UserRegistry;

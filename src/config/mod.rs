//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! node.toml
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks, all errors at once)
//!     → NodeConfig (validated, immutable)
//!
//! nodes file change:
//!     watcher.rs detects it
//!     → ReloadSignal
//!     → runner re-reads the nodes through the node source
//! ```
//!
//! # Design Decisions
//! - Process config is loaded once; only node descriptors hot-reload
//! - All fields have defaults to allow minimal configs

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::NodeConfig;

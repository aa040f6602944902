//! User bookkeeping.
//!
//! # Data Flow
//! ```text
//! panel user list
//!     → diff.rs (added / removed against the last applied list)
//!     → registry.rs (external id ↔ internal id, per tag)
//!     → engine inbound manager (add/remove users)
//!
//! engine traffic events (tag, internal id, bytes)
//!     → traffic.rs (atomic counters)
//!     → collect() resolves external ids through registry.rs
//! ```

pub mod diff;
pub mod registry;
pub mod traffic;

pub use diff::{diff_users, UserDiff};
pub use registry::{RegistryError, UserRegistry};
pub use traffic::{TrafficStats, UserTraffic};

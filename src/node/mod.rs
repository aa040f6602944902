//! Node descriptors and where they come from.
//!
//! # Data Flow
//! ```text
//! panel / nodes file
//!     → source.rs (NodeSource::fetch_nodes)
//!     → descriptor.rs (NodeDescriptor, UserInfo, ...)
//!     → synth (validated, engine-facing Config)
//! ```
//!
//! # Design Decisions
//! - Descriptors are immutable; a new cycle replaces the whole set
//! - No validation here beyond serde shape checks

pub mod descriptor;
pub mod source;

pub use descriptor::{
    DnsDescriptor, NodeDescriptor, OutboundDescriptor, RouteRuleDescriptor, TlsDescriptor,
    UserInfo,
};
pub use source::{FileNodeSource, NodeSource, SourceError};

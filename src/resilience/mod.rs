//! Resilience helpers.
//!
//! # Data Flow
//! ```text
//! engine start / reload failure
//!     → backoff.rs (exponential delay with jitter)
//!     → runner retries until success, the attempt limit, or shutdown
//! ```

pub mod backoff;

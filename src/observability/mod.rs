//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! lifecycle / users / engine:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters and gauges via the metrics facade)
//!
//! Consumers:
//!     → stdout
//!     → Prometheus scrape endpoint
//! ```

pub mod logging;
pub mod metrics;

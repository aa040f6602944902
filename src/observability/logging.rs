//! Structured logging.
//!
//! # Design Decisions
//! - Uses the tracing crate; `RUST_LOG` overrides the configured level
//! - Engine log levels (`debug`, `info`, `warning`, `error`, `none`) are
//!   mapped onto tracing filter directives

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Translate an engine log level into a filter directive for this crate.
pub fn filter_directive(level: &str) -> String {
    let level = match level.to_ascii_lowercase().as_str() {
        "debug" => "debug",
        "info" => "info",
        "warning" | "warn" => "warn",
        "error" => "error",
        "none" => "off",
        _ => "info",
    };
    format!("proxy_node={level},node_cli={level}")
}

/// Install the global subscriber. Safe to call once per process; later
/// calls are ignored.
pub fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(level)));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

//! Proxy node
//!
//! ```text
//!   nodes file ──▶ FileNodeSource ──▶ NodeRunner ──▶ NodeCore ──▶ Engine
//!        │                               ▲   ▲          │
//!        └── NodesWatcher ── ReloadSignal┘   │          ├─ UserRegistry
//!                 SIGHUP ─────┘              │          └─ EngineHandle
//!                 admin API ─────────────────┘ (reload, users, status)
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use proxy_node::admin::{self, AdminState};
use proxy_node::config::load_config;
use proxy_node::config::watcher::NodesWatcher;
use proxy_node::engine::local::LocalEngineFactory;
use proxy_node::lifecycle::signals::spawn_signal_handler;
use proxy_node::node::{FileNodeSource, NodeSource};
use proxy_node::observability::{logging, metrics};
use proxy_node::synth::build_config;
use proxy_node::{NodeCore, NodeRunner, ReloadSignal, Shutdown};

#[derive(Parser)]
#[command(name = "proxy-node")]
#[command(about = "Proxy node control plane", version)]
struct Args {
    /// Process configuration file.
    #[arg(short, long, default_value = "node.toml")]
    config: PathBuf,

    /// Synthesize the engine config from the nodes file, print it and exit.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load_config(&args.config)?;

    logging::init_logging(&config.log.level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "proxy-node starting");

    let source = Arc::new(FileNodeSource::new(config.source.nodes_file.clone()));

    if args.check {
        let nodes = source.fetch_nodes().await?;
        let engine_config = build_config(&nodes, config.log.to_policy())?;
        println!("{}", engine_config.to_json()?);
        return Ok(());
    }

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let core = Arc::new(NodeCore::new(
        Arc::new(LocalEngineFactory::default()),
        config.log.to_policy(),
    ));
    let reload = ReloadSignal::new();
    let shutdown = Shutdown::new();
    spawn_signal_handler(shutdown.clone(), reload.clone());

    // Dropping the watcher stops it, so hold it until exit.
    let _watcher = if config.source.watch {
        match NodesWatcher::new(source.path(), reload.clone()).run() {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                tracing::warn!(error = %e, "Nodes watcher unavailable, relying on polling");
                None
            }
        }
    } else {
        None
    };

    let admin_task = if config.admin.enabled {
        let listener = tokio::net::TcpListener::bind(&config.admin.bind_address).await?;
        let state = AdminState::new(core.clone(), reload.clone(), &config.admin.api_key);
        Some(tokio::spawn(admin::serve(listener, state, shutdown.subscribe())))
    } else {
        None
    };

    let runner = NodeRunner::new(core, source, reload, config.sync.clone())
        .with_poll_interval(config.source.poll_interval());
    let result = runner.run(shutdown.subscribe()).await;

    // The runner also ends when its start attempts run out; stop the rest.
    shutdown.trigger();
    if let Some(task) = admin_task {
        match task.await {
            Ok(Err(e)) => tracing::error!(error = %e, "Admin API failed"),
            Err(e) => tracing::error!(error = %e, "Admin task panicked"),
            Ok(Ok(())) => {}
        }
    }

    result?;
    tracing::info!("Shutdown complete");
    Ok(())
}

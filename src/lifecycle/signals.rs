//! OS signal handling.
//!
//! # Responsibilities
//! - SIGTERM / SIGINT: trigger graceful shutdown
//! - SIGHUP: trigger a node reload, not a shutdown
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - A second SIGTERM/SIGINT exits the process immediately

use crate::lifecycle::reload::ReloadSignal;
use crate::lifecycle::shutdown::Shutdown;

/// Spawn the signal listener. Returns immediately.
pub fn spawn_signal_handler(shutdown: Shutdown, reload: ReloadSignal) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = listen(shutdown, reload).await {
            tracing::error!(error = %e, "Signal handler failed");
        }
    })
}

#[cfg(unix)]
async fn listen(shutdown: Shutdown, reload: ReloadSignal) -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = signal(SignalKind::terminate())?;
    let mut int = signal(SignalKind::interrupt())?;
    let mut hup = signal(SignalKind::hangup())?;
    let mut requested = false;

    loop {
        tokio::select! {
            _ = term.recv() => {}
            _ = int.recv() => {}
            _ = hup.recv() => {
                tracing::info!("SIGHUP received, reloading nodes");
                reload.trigger();
                continue;
            }
        }
        if requested {
            tracing::warn!("Second termination signal, exiting now");
            std::process::exit(130);
        }
        requested = true;
        tracing::info!("Termination signal received, shutting down");
        shutdown.trigger();
    }
}

#[cfg(not(unix))]
async fn listen(shutdown: Shutdown, _reload: ReloadSignal) -> std::io::Result<()> {
    tokio::signal::ctrl_c().await?;
    tracing::info!("Ctrl-C received, shutting down");
    shutdown.trigger();
    tokio::signal::ctrl_c().await?;
    std::process::exit(130);
}

//! Admin API.
//!
//! Every route sits behind the Bearer-token middleware in `auth.rs`.

pub mod auth;
pub mod handlers;

use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::lifecycle::{NodeCore, ReloadSignal};

/// Shared state for admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub core: Arc<NodeCore>,
    pub reload: ReloadSignal,
    pub api_key: Arc<str>,
}

impl AdminState {
    pub fn new(core: Arc<NodeCore>, reload: ReloadSignal, api_key: &str) -> Self {
        Self {
            core,
            reload,
            api_key: Arc::from(api_key),
        }
    }
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/reload", post(post_reload))
        .route(
            "/admin/users/{tag}",
            get(get_users).post(post_users).delete(delete_users),
        )
        .route("/admin/registry/{tag}", delete(delete_registry))
        .route("/admin/traffic/{tag}", get(get_traffic))
        .route("/admin/route", post(post_route))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            admin_auth_middleware,
        ))
        .with_state(state)
}

/// Serve the admin API until shutdown.
pub async fn serve(
    listener: tokio::net::TcpListener,
    state: AdminState,
    mut shutdown: tokio::sync::broadcast::Receiver<()>,
) -> std::io::Result<()> {
    let app = setup_admin_router(state)
        .layer(tower_http::trace::TraceLayer::new_for_http());
    tracing::info!(address = ?listener.local_addr().ok(), "Admin API listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await
}

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

use crate::admin::AdminState;
use crate::engine::SessionTarget;
use crate::lifecycle::{AddUsersParams, CoreError, LifecycleState};
use crate::node::descriptor::UserInfo;
use crate::users::UserTraffic;

/// Error body returned by every handler.
pub struct ApiError(CoreError);

impl From<CoreError> for ApiError {
    fn from(e: CoreError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            CoreError::NotRunning => StatusCode::SERVICE_UNAVAILABLE,
            CoreError::UnknownInbound(_) => StatusCode::NOT_FOUND,
            CoreError::Synthesis(_) => StatusCode::BAD_REQUEST,
            CoreError::Engine(_) => StatusCode::UNPROCESSABLE_ENTITY,
            CoreError::AlreadyRunning | CoreError::InboundActive(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(serde_json::json!({ "error": self.0.to_string() }))).into_response()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InboundStatus {
    pub tag: String,
    pub protocol: String,
    pub listen: String,
    pub users: usize,
}

#[derive(Debug, Serialize)]
pub struct NodeStatus {
    pub version: String,
    pub state: LifecycleState,
    pub generation: Option<u64>,
    pub engine: Option<String>,
    pub inbounds: Vec<InboundStatus>,
    pub registered_users: usize,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<NodeStatus> {
    let core = &state.core;
    let handle = core.handle().ok();

    let inbounds = handle
        .as_ref()
        .map(|handle| {
            let manager = handle.inbound_manager();
            handle
                .config()
                .inbounds
                .iter()
                .map(|inbound| InboundStatus {
                    tag: inbound.tag.clone(),
                    protocol: inbound.protocol.to_string(),
                    listen: inbound.listen.to_string(),
                    users: manager.user_count(&inbound.tag).unwrap_or(0),
                })
                .collect()
        })
        .unwrap_or_default();

    Json(NodeStatus {
        version: env!("CARGO_PKG_VERSION").to_string(),
        state: core.state(),
        generation: handle.as_ref().map(|h| h.generation()),
        engine: handle.as_ref().map(|h| h.version().to_string()),
        inbounds,
        registered_users: core.registry().total(),
    })
}

pub async fn post_reload(State(state): State<AdminState>) -> StatusCode {
    tracing::info!("Reload requested through admin API");
    state.reload.trigger();
    StatusCode::ACCEPTED
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisteredUser {
    pub id: String,
    pub internal_id: u64,
}

pub async fn get_users(
    State(state): State<AdminState>,
    Path(tag): Path<String>,
) -> Json<Vec<RegisteredUser>> {
    let users = state
        .core
        .registry()
        .users(&tag)
        .into_iter()
        .map(|(id, internal_id)| RegisteredUser { id, internal_id })
        .collect();
    Json(users)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AddUsersRequest {
    pub users: Vec<UserInfo>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RemoveUsersRequest {
    pub ids: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UsersChanged {
    pub changed: usize,
}

pub async fn post_users(
    State(state): State<AdminState>,
    Path(tag): Path<String>,
    Json(body): Json<AddUsersRequest>,
) -> Result<Json<UsersChanged>, ApiError> {
    let changed = state
        .core
        .add_users(AddUsersParams {
            tag,
            users: body.users,
        })
        .await?;
    Ok(Json(UsersChanged { changed }))
}

pub async fn delete_users(
    State(state): State<AdminState>,
    Path(tag): Path<String>,
    Json(body): Json<RemoveUsersRequest>,
) -> Result<Json<UsersChanged>, ApiError> {
    let changed = state.core.remove_users(&tag, &body.ids).await?;
    Ok(Json(UsersChanged { changed }))
}

/// Drop a tag that is no longer served from the registry.
pub async fn delete_registry(
    State(state): State<AdminState>,
    Path(tag): Path<String>,
) -> Result<Json<UsersChanged>, ApiError> {
    let changed = state.core.reset_users(&tag).await?;
    Ok(Json(UsersChanged { changed }))
}

#[derive(Debug, Default, Deserialize)]
pub struct TrafficQuery {
    #[serde(default)]
    pub reset: bool,
}

pub async fn get_traffic(
    State(state): State<AdminState>,
    Path(tag): Path<String>,
    Query(query): Query<TrafficQuery>,
) -> Json<Vec<UserTraffic>> {
    Json(state.core.user_traffic(&tag, query.reset))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RouteRequest {
    pub inbound: String,
    pub domain: Option<String>,
    pub ip: Option<IpAddr>,
    pub port: u16,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RouteDecision {
    pub outbound: String,
}

/// Which outbound a session would take.
pub async fn post_route(
    State(state): State<AdminState>,
    Json(body): Json<RouteRequest>,
) -> Result<Json<RouteDecision>, ApiError> {
    let dispatcher = state.core.dispatcher()?;
    let target = SessionTarget {
        inbound_tag: body.inbound,
        domain: body.domain,
        ip: body.ip,
        port: body.port,
    };
    let outbound = dispatcher
        .select_outbound(&target)
        .map_err(CoreError::Engine)?;
    Ok(Json(RouteDecision { outbound }))
}

//! Agent presence routes
//!
//! HTTP face of the heartbeat control surface. Heartbeats are independent of
//! any WebSocket connection.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    presence::AgentPresence,
    state::AppState,
};

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct HeartbeatRequest {
    /// `online`, `busy` or `away`; anything else counts as `online`
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OnlineAgentsResponse {
    pub agents: Vec<AgentPresence>,
    pub total: usize,
}

impl From<Vec<AgentPresence>> for OnlineAgentsResponse {
    fn from(agents: Vec<AgentPresence>) -> Self {
        Self {
            total: agents.len(),
            agents,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DepartmentStatsResponse {
    pub departments: HashMap<String, usize>,
}

// =============================================================================
// Handlers
// =============================================================================

/// Refresh an agent's presence
pub async fn heartbeat(
    State(state): State<AppState>,
    Path(agent_id): Path<Uuid>,
    body: Option<Json<HeartbeatRequest>>,
) -> ApiResult<Json<AgentPresence>> {
    let request = body.map(|Json(request)| request).unwrap_or_default();
    let presence = state
        .presence
        .heartbeat(agent_id, request.status.as_deref())
        .await?;
    Ok(Json(presence))
}

/// Explicit logout
pub async fn set_offline(
    State(state): State<AppState>,
    Path(agent_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state.presence.set_offline(agent_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_online(State(state): State<AppState>) -> ApiResult<Json<OnlineAgentsResponse>> {
    Ok(Json(state.presence.get_online().await?.into()))
}

pub async fn list_online_by_department(
    State(state): State<AppState>,
    Path(department_id): Path<Uuid>,
) -> ApiResult<Json<OnlineAgentsResponse>> {
    Ok(Json(
        state
            .presence
            .get_online_by_department(department_id)
            .await?
            .into(),
    ))
}

pub async fn get_status(
    State(state): State<AppState>,
    Path(agent_id): Path<Uuid>,
) -> ApiResult<Json<AgentPresence>> {
    state
        .presence
        .get_agent_status(agent_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Agent is offline".to_string()))
}

pub async fn department_stats(State(state): State<AppState>) -> ApiResult<Json<DepartmentStatsResponse>> {
    Ok(Json(DepartmentStatsResponse {
        departments: state.presence.department_stats().await?,
    }))
}

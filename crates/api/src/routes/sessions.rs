//! Chat session routes
//!
//! Read endpoints clients use to recover after missed live pushes, plus the
//! assignment and close operations.

use axum::{
    extract::{Path, State},
    Json,
};
use livechat_shared::{ChatMessage, ChatSession, ConnectionStatus, ParticipantKind};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    chat::OutgoingMessage,
    error::{ApiError, ApiResult},
    state::AppState,
};

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub sender_id: Option<Uuid>,
    pub sender_type: ParticipantKind,
    pub message: String,
    #[serde(default)]
    pub message_type: Option<String>,
    #[serde(default)]
    pub attachments: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct AssignRequest {
    pub agent_id: Uuid,
    #[serde(default)]
    pub assigned_by: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct CloseRequest {
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub closed_by: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct SessionsResponse {
    pub sessions: Vec<ChatSession>,
    pub total: usize,
}

impl From<Vec<ChatSession>> for SessionsResponse {
    fn from(sessions: Vec<ChatSession>) -> Self {
        Self {
            total: sessions.len(),
            sessions,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MessagesResponse {
    pub session_id: Uuid,
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
pub struct AutoAssignResponse {
    pub session_id: Uuid,
    /// `None` when no agent was available
    pub agent_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct ConnectionStatusResponse {
    pub session_id: Uuid,
    pub connection_status: ConnectionStatus,
}

// =============================================================================
// Handlers
// =============================================================================

pub async fn list_waiting(State(state): State<AppState>) -> ApiResult<Json<SessionsResponse>> {
    Ok(Json(state.chat.waiting_sessions().await?.into()))
}

pub async fn list_active(State(state): State<AppState>) -> ApiResult<Json<SessionsResponse>> {
    Ok(Json(state.chat.active_sessions().await?.into()))
}

pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<ChatSession>> {
    Ok(Json(state.chat.get_session(session_id).await?))
}

/// Full message history, oldest first
pub async fn list_messages(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<MessagesResponse>> {
    let messages = state.chat.history(session_id).await?;
    Ok(Json(MessagesResponse { session_id, messages }))
}

/// Send a message outside the WebSocket channel; joined connections still
/// receive it live
pub async fn send_message(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(request): Json<SendMessageRequest>,
) -> ApiResult<Json<ChatMessage>> {
    if request.message.trim().is_empty() {
        return Err(ApiError::Validation("Message text is required".to_string()));
    }

    let message = state
        .chat
        .send_message(OutgoingMessage {
            session_id,
            sender_id: request.sender_id,
            sender_kind: request.sender_type,
            body: request.message,
            message_type: request.message_type,
            attachments: request.attachments,
        })
        .await?;

    Ok(Json(message))
}

pub async fn assign(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(request): Json<AssignRequest>,
) -> ApiResult<Json<ChatSession>> {
    let session = state
        .assignment
        .assign(session_id, request.agent_id, request.assigned_by)
        .await?;
    Ok(Json(session))
}

pub async fn auto_assign(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<AutoAssignResponse>> {
    let agent_id = state.assignment.auto_assign(session_id).await?;
    Ok(Json(AutoAssignResponse { session_id, agent_id }))
}

pub async fn close(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(request): Json<CloseRequest>,
) -> ApiResult<Json<ChatSession>> {
    let session = state
        .assignment
        .close(session_id, &request.reason, request.closed_by)
        .await?;
    Ok(Json(session))
}

/// Who is connected to a session right now
pub async fn connection_status(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Json<ConnectionStatusResponse> {
    Json(ConnectionStatusResponse {
        session_id,
        connection_status: state.hub.connected_counts(session_id).await,
    })
}

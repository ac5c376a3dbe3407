//! WebSocket handler for Axum
//!
//! Upgrades `/ws/chat`, pumps outbound events through a writer task and
//! dispatches inbound frames to the hub and the chat service.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{stream::StreamExt, SinkExt};
use livechat_shared::ConnectionId;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::chat::{ChatService, OutgoingMessage};
use crate::state::AppState;

use super::{
    connection::Participant,
    events::{ClientFrame, JoinedSessionData, ServerEvent, TypingData, UserJoinedData},
    hub::{ConnectionHub, HubError},
};

/// Error text for frames that target a session the connection has not joined
pub const NOT_JOINED: &str = "Not joined to session";

/// WebSocket handler - upgrades HTTP connection to WebSocket
pub async fn ws_handler(ws: WebSocketUpgrade, State(app_state): State<AppState>) -> Response {
    let dispatcher = FrameDispatcher::new(app_state.hub.clone(), app_state.chat.clone());
    ws.on_upgrade(move |socket| handle_socket(socket, dispatcher))
}

/// Handle individual WebSocket connection
async fn handle_socket(socket: WebSocket, dispatcher: FrameDispatcher) {
    let (mut sender, mut receiver) = socket.split();

    // Create channel for sending events to this connection
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();
    let connection_id = dispatcher.hub.accept(tx).await;

    // Spawn task to send events to client
    let send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => {
                    if sender.send(Message::Text(json)).await.is_err() {
                        break; // Connection closed
                    }
                }
                Err(e) => {
                    tracing::error!(error = ?e, "Failed to serialize WebSocket event");
                }
            }
        }
    });

    // Handle incoming messages
    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => dispatcher.dispatch(connection_id, &text).await,
            Ok(Message::Close(_)) => {
                tracing::info!(connection_id = %connection_id, "WebSocket close frame received");
                break;
            }
            Ok(_) => {} // Axum answers pings; binary frames are ignored
            Err(e) => {
                tracing::warn!(error = ?e, connection_id = %connection_id, "WebSocket read error");
                break;
            }
        }
    }

    // Cleanup on disconnect
    tracing::info!(connection_id = %connection_id, "WebSocket connection closing");
    dispatcher.hub.close(connection_id).await;
    send_task.abort();
}

/// Routes decoded inbound frames
///
/// Protocol errors are answered with an error frame to the sender only; the
/// connection always stays open.
#[derive(Clone)]
pub struct FrameDispatcher {
    hub: ConnectionHub,
    chat: ChatService,
}

impl FrameDispatcher {
    pub fn new(hub: ConnectionHub, chat: ChatService) -> Self {
        Self { hub, chat }
    }

    pub async fn dispatch(&self, connection_id: ConnectionId, text: &str) {
        let frame = match ClientFrame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(
                    error = ?e,
                    connection_id = %connection_id,
                    "Rejected client frame"
                );
                self.hub.send(connection_id, ServerEvent::error(e.to_string())).await;
                return;
            }
        };

        match frame {
            ClientFrame::JoinSession {
                session_id,
                participant,
            } => {
                self.join(connection_id, session_id, participant).await;
            }
            ClientFrame::SendMessage { session_id, message } => {
                self.send_message(connection_id, session_id, message).await;
            }
            ClientFrame::Typing {
                session_id,
                sender,
                is_typing,
            } => {
                if self.joined_participant(connection_id, session_id).await.is_none() {
                    return;
                }
                self.hub
                    .broadcast_except(
                        session_id,
                        connection_id,
                        ServerEvent::Typing(TypingData {
                            session_id,
                            sender_type: sender,
                            is_typing,
                        }),
                    )
                    .await;
            }
        }
    }

    async fn join(&self, connection_id: ConnectionId, session_id: Uuid, participant: Participant) {
        let outcome = match self.hub.join(connection_id, session_id, participant).await {
            Ok(outcome) => outcome,
            Err(e @ HubError::ParticipantChanged) => {
                self.hub.send(connection_id, ServerEvent::error(e.to_string())).await;
                return;
            }
            Err(e @ HubError::UnknownConnection(_)) => {
                tracing::warn!(error = %e, "Join from a connection that is no longer open");
                return;
            }
        };

        if let Some(previous) = outcome.left_session {
            self.hub.broadcast_connection_status(previous).await;
        }

        let participant = outcome.participant;
        self.hub
            .send(
                connection_id,
                ServerEvent::JoinedSession(JoinedSessionData {
                    session_id,
                    client_id: connection_id,
                    user_type: participant.kind,
                }),
            )
            .await;
        let status = self.hub.connection_status_event(session_id).await;
        self.hub.send(connection_id, status).await;

        self.hub
            .broadcast_except(
                session_id,
                connection_id,
                ServerEvent::UserJoined(UserJoinedData {
                    session_id,
                    user_type: participant.kind,
                    user_id: participant.id,
                }),
            )
            .await;
        self.hub.broadcast_connection_status(session_id).await;
    }

    async fn send_message(&self, connection_id: ConnectionId, session_id: Uuid, body: String) {
        let Some(participant) = self.joined_participant(connection_id, session_id).await else {
            return;
        };

        let outgoing = OutgoingMessage::text(session_id, participant.id, participant.kind, body);
        if let Err(e) = self.chat.send_message(outgoing).await {
            if e.is_domain() {
                tracing::debug!(error = %e, session_id = %session_id, "Chat message rejected");
            } else {
                tracing::error!(
                    error = %e,
                    connection_id = %connection_id,
                    session_id = %session_id,
                    "Failed to send chat message"
                );
            }
            self.hub
                .send(connection_id, ServerEvent::error(format!("Failed to send message: {e}")))
                .await;
        }
    }

    /// The connection's participant if it is joined to `session_id`;
    /// otherwise answers with an error frame
    async fn joined_participant(&self, connection_id: ConnectionId, session_id: Uuid) -> Option<Participant> {
        let joined = self
            .hub
            .connection(connection_id)
            .await
            .filter(|info| info.session_id == Some(session_id))
            .map(|info| info.participant);

        if joined.is_none() {
            self.hub.send(connection_id, ServerEvent::error(NOT_JOINED)).await;
        }
        joined
    }
}

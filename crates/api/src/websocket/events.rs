//! WebSocket frame types and serialization
//!
//! Inbound frames are decoded once into [`ClientFrame`]; outbound frames are
//! built as [`ServerEvent`] and serialized to the
//! `{"type", "success", "data", "error"}` envelope.

use livechat_shared::{ChatMessage, ConnectionId, ConnectionStatus, ParticipantKind, SessionStatus};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use super::connection::Participant;

// =============================================================================
// Client-to-Server Frames
// =============================================================================

/// Frames sent from client to server
#[derive(Debug, Clone, PartialEq)]
pub enum ClientFrame {
    /// Join a session; a non-null `agent_id` identifies the connection as an
    /// agent, carrying the id only when it is a UUID
    JoinSession {
        session_id: Uuid,
        participant: Participant,
    },

    /// Post a text message into the joined session
    SendMessage { session_id: Uuid, message: String },

    /// Typing indicator from `agent_typing` or `customer_typing`
    Typing {
        session_id: Uuid,
        sender: ParticipantKind,
        is_typing: bool,
    },
}

/// Why an inbound frame was rejected. Reported to the sender only.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("Invalid message format")]
    Malformed,
    #[error("Unknown message type")]
    UnknownType(String),
    #[error("Invalid message data")]
    InvalidData,
    #[error("Message text is required")]
    MissingText,
}

/// Wire envelope before the `type` tag is interpreted
#[derive(Debug, Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    frame_type: String,
    #[serde(default)]
    session_id: Option<Uuid>,
    #[serde(default)]
    data: Value,
}

impl ClientFrame {
    /// Decode one text frame
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        let raw: RawFrame = serde_json::from_str(text).map_err(|_| FrameError::Malformed)?;

        let frame_type = raw.frame_type.as_str();
        if !matches!(
            frame_type,
            "join_session" | "send_message" | "agent_typing" | "customer_typing"
        ) {
            return Err(FrameError::UnknownType(raw.frame_type));
        }

        let session_id = raw.session_id.ok_or(FrameError::Malformed)?;

        match frame_type {
            "join_session" => {
                let agent_id = match &raw.data {
                    Value::Null => None,
                    Value::Object(data) => data.get("agent_id"),
                    _ => return Err(FrameError::InvalidData),
                };
                let participant = match agent_id {
                    None | Some(Value::Null) => Participant::customer(),
                    Some(other) => Participant::agent(other.as_str().and_then(|id| id.parse().ok())),
                };
                Ok(ClientFrame::JoinSession {
                    session_id,
                    participant,
                })
            }
            "send_message" => {
                let data = raw.data.as_object().ok_or(FrameError::InvalidData)?;
                let message = data
                    .get("message")
                    .and_then(Value::as_str)
                    .filter(|text| !text.trim().is_empty())
                    .ok_or(FrameError::MissingText)?;
                Ok(ClientFrame::SendMessage {
                    session_id,
                    message: message.to_string(),
                })
            }
            _ => {
                let sender = if frame_type == "agent_typing" {
                    ParticipantKind::Agent
                } else {
                    ParticipantKind::Customer
                };
                let data = raw.data.as_object().ok_or(FrameError::InvalidData)?;
                let is_typing = data.get("is_typing").and_then(Value::as_bool).unwrap_or(false);
                Ok(ClientFrame::Typing {
                    session_id,
                    sender,
                    is_typing,
                })
            }
        }
    }
}

// =============================================================================
// Server-to-Client Events
// =============================================================================

/// Events sent from server to client
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    /// Join acknowledged
    JoinedSession(JoinedSessionData),

    /// New message persisted in a session
    NewMessage(MessageEventData),

    /// Another participant started or stopped typing
    Typing(TypingData),

    /// Another participant joined the session
    UserJoined(UserJoinedData),

    /// Participant counts for the session changed
    ConnectionStatusUpdate(ConnectionStatusData),

    /// Session status or assignment changed
    SessionUpdate(SessionUpdateData),

    /// Error message
    Error { message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JoinedSessionData {
    pub session_id: Uuid,
    pub client_id: ConnectionId,
    pub user_type: ParticipantKind,
}

/// Message event data
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageEventData {
    pub session_id: Uuid,
    pub message_id: Uuid,
    pub message: String,
    pub sender_type: ParticipantKind,
    pub sender_id: Option<Uuid>,
    pub message_type: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl From<&ChatMessage> for MessageEventData {
    fn from(message: &ChatMessage) -> Self {
        Self {
            session_id: message.session_id,
            message_id: message.id,
            message: message.message.clone(),
            sender_type: message.sender_type,
            sender_id: message.sender_id,
            message_type: message.message_type.clone(),
            timestamp: message.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypingData {
    pub session_id: Uuid,
    pub sender_type: ParticipantKind,
    pub is_typing: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserJoinedData {
    pub session_id: Uuid,
    pub user_type: ParticipantKind,
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionStatusData {
    pub session_id: Uuid,
    pub connection_status: ConnectionStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionUpdateData {
    pub session_id: Uuid,
    pub status: SessionStatus,
    pub agent_id: Option<Uuid>,
}

impl ServerEvent {
    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::Error {
            message: message.into(),
        }
    }

    /// Wire value of the `type` field
    pub fn event_type(&self) -> &'static str {
        match self {
            ServerEvent::JoinedSession(_) => "joined_session",
            ServerEvent::NewMessage(_) => "new_message",
            ServerEvent::Typing(_) => "typing",
            ServerEvent::UserJoined(_) => "user_joined",
            ServerEvent::ConnectionStatusUpdate(_) => "connection_status_update",
            ServerEvent::SessionUpdate(_) => "session_update",
            ServerEvent::Error { .. } => "error",
        }
    }

    pub fn is_success(&self) -> bool {
        !matches!(self, ServerEvent::Error { .. })
    }
}

impl Serialize for ServerEvent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("type", self.event_type())?;
        map.serialize_entry("success", &self.is_success())?;
        match self {
            ServerEvent::JoinedSession(data) => map.serialize_entry("data", data)?,
            ServerEvent::NewMessage(data) => map.serialize_entry("data", data)?,
            ServerEvent::Typing(data) => map.serialize_entry("data", data)?,
            ServerEvent::UserJoined(data) => map.serialize_entry("data", data)?,
            ServerEvent::ConnectionStatusUpdate(data) => map.serialize_entry("data", data)?,
            ServerEvent::SessionUpdate(data) => map.serialize_entry("data", data)?,
            ServerEvent::Error { message } => map.serialize_entry("error", message)?,
        }
        map.end()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    const SESSION: &str = "550e8400-e29b-41d4-a716-446655440000";

    #[test]
    fn test_join_as_customer() {
        let text = format!(r#"{{"type":"join_session","session_id":"{SESSION}","data":{{"agent_id":null}}}}"#);
        let frame = ClientFrame::parse(&text).unwrap();
        assert_eq!(
            frame,
            ClientFrame::JoinSession {
                session_id: SESSION.parse().unwrap(),
                participant: Participant::customer(),
            }
        );

        let bare = format!(r#"{{"type":"join_session","session_id":"{SESSION}"}}"#);
        assert!(matches!(
            ClientFrame::parse(&bare).unwrap(),
            ClientFrame::JoinSession { participant, .. } if participant == Participant::customer()
        ));
    }

    #[test]
    fn test_join_as_agent() {
        let agent = Uuid::new_v4();
        let text = format!(
            r#"{{"type":"join_session","session_id":"{SESSION}","data":{{"agent_id":"{agent}"}}}}"#
        );
        match ClientFrame::parse(&text).unwrap() {
            ClientFrame::JoinSession { participant, .. } => assert_eq!(participant, Participant::agent(Some(agent))),
            other => panic!("Expected JoinSession, got {:?}", other),
        }
    }

    #[test]
    fn test_join_with_non_uuid_agent_id_is_anonymous_agent() {
        for agent_id in [r#""agent-7""#, "42", "true"] {
            let text = format!(
                r#"{{"type":"join_session","session_id":"{SESSION}","data":{{"agent_id":{agent_id}}}}}"#
            );
            match ClientFrame::parse(&text).unwrap() {
                ClientFrame::JoinSession { participant, .. } => assert_eq!(participant, Participant::agent(None)),
                other => panic!("Expected JoinSession, got {:?}", other),
            }
        }

        let text = format!(r#"{{"type":"join_session","session_id":"{SESSION}","data":"agent"}}"#);
        assert_eq!(ClientFrame::parse(&text), Err(FrameError::InvalidData));
    }

    #[test]
    fn test_send_message_validation() {
        let ok = format!(r#"{{"type":"send_message","session_id":"{SESSION}","data":{{"message":"hello"}}}}"#);
        assert!(matches!(
            ClientFrame::parse(&ok).unwrap(),
            ClientFrame::SendMessage { ref message, .. } if message == "hello"
        ));

        let no_data = format!(r#"{{"type":"send_message","session_id":"{SESSION}"}}"#);
        assert_eq!(ClientFrame::parse(&no_data), Err(FrameError::InvalidData));

        let no_text = format!(r#"{{"type":"send_message","session_id":"{SESSION}","data":{{"message":42}}}}"#);
        assert_eq!(ClientFrame::parse(&no_text), Err(FrameError::MissingText));
    }

    #[test]
    fn test_typing_frames() {
        let text = format!(r#"{{"type":"agent_typing","session_id":"{SESSION}","data":{{"is_typing":true}}}}"#);
        assert!(matches!(
            ClientFrame::parse(&text).unwrap(),
            ClientFrame::Typing {
                sender: ParticipantKind::Agent,
                is_typing: true,
                ..
            }
        ));

        let text = format!(r#"{{"type":"customer_typing","session_id":"{SESSION}","data":{{}}}}"#);
        assert!(matches!(
            ClientFrame::parse(&text).unwrap(),
            ClientFrame::Typing {
                sender: ParticipantKind::Customer,
                is_typing: false,
                ..
            }
        ));
    }

    #[test]
    fn test_unknown_and_malformed_frames() {
        let unknown = format!(r#"{{"type":"dance","session_id":"{SESSION}"}}"#);
        assert_eq!(
            ClientFrame::parse(&unknown),
            Err(FrameError::UnknownType("dance".to_string()))
        );
        assert_eq!(ClientFrame::parse("not json"), Err(FrameError::Malformed));
        assert_eq!(
            ClientFrame::parse(r#"{"type":"send_message","data":{"message":"x"}}"#),
            Err(FrameError::Malformed)
        );
    }

    #[test]
    fn test_error_event_serialization() {
        let json = serde_json::to_value(ServerEvent::error("Unknown message type")).unwrap();
        assert_eq!(
            json,
            json!({"type": "error", "success": false, "error": "Unknown message type"})
        );
    }

    #[test]
    fn test_connection_status_serialization() {
        let session_id: Uuid = SESSION.parse().unwrap();
        let event = ServerEvent::ConnectionStatusUpdate(ConnectionStatusData {
            session_id,
            connection_status: ConnectionStatus {
                customer_connected: true,
                agent_connected: false,
                total_customer: 1,
                total_agent: 0,
            },
        });
        let json = serde_json::to_value(event).unwrap();
        assert_eq!(json["type"], "connection_status_update");
        assert_eq!(json["success"], true);
        assert_eq!(json["data"]["session_id"], SESSION);
        assert_eq!(json["data"]["connection_status"]["agent_connected"], false);
        assert_eq!(json["data"]["connection_status"]["total_customer"], 1);
    }
}

//! Domain types shared by the live-chat core

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::ChatError;

// =============================================================================
// ID Wrappers
// =============================================================================

/// Connection ID wrapper
///
/// Generated once when a socket is accepted and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for ConnectionId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// =============================================================================
// Enums
// =============================================================================

/// Which side of a conversation a connection or message belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ParticipantKind {
    Customer,
    Agent,
}

impl Default for ParticipantKind {
    fn default() -> Self {
        Self::Customer
    }
}

impl ParticipantKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::Agent => "agent",
        }
    }
}

impl fmt::Display for ParticipantKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParticipantKind {
    type Err = ChatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" => Ok(Self::Customer),
            "agent" => Ok(Self::Agent),
            other => Err(ChatError::Validation(format!("unknown participant kind: {other}"))),
        }
    }
}

/// Chat session lifecycle: `waiting -> active -> closed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Waiting,
    Active,
    Closed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Active => "active",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = ChatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "waiting" => Ok(Self::Waiting),
            "active" => Ok(Self::Active),
            "closed" => Ok(Self::Closed),
            other => Err(ChatError::Validation(format!("unknown session status: {other}"))),
        }
    }
}

/// Agent availability as reported by heartbeats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Online,
    Busy,
    Away,
}

impl Default for AgentStatus {
    fn default() -> Self {
        Self::Online
    }
}

impl AgentStatus {
    /// Parse a client-supplied status, falling back to `online` for anything
    /// that is not one of the three known values.
    pub fn normalize(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some("busy") => Self::Busy,
            Some("away") => Self::Away,
            _ => Self::Online,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Busy => "busy",
            Self::Away => "away",
        }
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Staff role from the user directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    Agent,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Agent => "agent",
        }
    }
}

impl FromStr for UserRole {
    type Err = ChatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Self::Admin),
            "agent" => Ok(Self::Agent),
            other => Err(ChatError::Validation(format!("unknown user role: {other}"))),
        }
    }
}

// =============================================================================
// Entities
// =============================================================================

/// Staff member as seen by the chat core
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: UserRole,
    pub department_id: Option<Uuid>,
    pub department_name: Option<String>,
    pub is_active: bool,
}

impl User {
    pub fn is_agent(&self) -> bool {
        self.role == UserRole::Agent
    }
}

/// A customer-support conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: Uuid,
    pub customer_id: Option<Uuid>,
    pub agent_id: Option<Uuid>,
    pub department_id: Option<Uuid>,
    pub topic: Option<String>,
    pub status: SessionStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub ended_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl ChatSession {
    /// A fresh session in the `waiting` state
    pub fn waiting(customer_id: Option<Uuid>, topic: Option<String>) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: Uuid::new_v4(),
            customer_id,
            agent_id: None,
            department_id: None,
            topic,
            status: SessionStatus::Waiting,
            started_at: now,
            ended_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Default `message_type` when the sender does not provide one
pub const DEFAULT_MESSAGE_TYPE: &str = "text";

/// A persisted chat message. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub session_id: Uuid,
    pub sender_id: Option<Uuid>,
    pub sender_type: ParticipantKind,
    pub message: String,
    pub message_type: String,
    pub attachments: Vec<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Input for creating a message in the message store
#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub session_id: Uuid,
    pub sender_id: Option<Uuid>,
    pub sender_type: ParticipantKind,
    pub message: String,
    pub message_type: String,
    pub attachments: Vec<String>,
}

/// One row of the per-session audit trail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatLogEntry {
    pub id: Uuid,
    pub session_id: Uuid,
    pub action: String,
    pub details: Option<String>,
    pub user_id: Option<Uuid>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Who is currently connected to a session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub customer_connected: bool,
    pub agent_connected: bool,
    pub total_customer: usize,
    pub total_agent: usize,
}

impl ConnectionStatus {
    /// Count one more connected participant of the given kind
    pub fn record(&mut self, kind: ParticipantKind) {
        match kind {
            ParticipantKind::Customer => {
                self.total_customer += 1;
                self.customer_connected = true;
            }
            ParticipantKind::Agent => {
                self.total_agent += 1;
                self.agent_connected = true;
            }
        }
    }
}

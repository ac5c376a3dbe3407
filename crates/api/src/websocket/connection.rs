//! WebSocket connection management
//!
//! Represents one open real-time channel and the identity it joined with.

use livechat_shared::{ConnectionId, ParticipantKind};
use time::OffsetDateTime;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::events::ServerEvent;

/// Who is on the other end of a connection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Participant {
    pub kind: ParticipantKind,
    /// Agent id, or the id of an authenticated contact
    pub id: Option<Uuid>,
}

impl Participant {
    pub fn customer() -> Self {
        Self {
            kind: ParticipantKind::Customer,
            id: None,
        }
    }

    pub fn agent(agent_id: Option<Uuid>) -> Self {
        Self {
            kind: ParticipantKind::Agent,
            id: agent_id,
        }
    }
}

/// Represents an active WebSocket connection
#[derive(Debug)]
pub struct Connection {
    /// Unique id generated at accept time
    pub id: ConnectionId,

    /// Identity; defaults to customer until the first join
    pub participant: Participant,

    /// Session this connection is joined to
    pub session_id: Option<Uuid>,

    /// Channel to send events to this connection's writer task
    pub sender: mpsc::UnboundedSender<ServerEvent>,

    pub connected_at: OffsetDateTime,

    /// Set by the first successful join; the participant is fixed afterwards
    pub identified: bool,
}

impl Connection {
    /// Create a new anonymous connection
    pub fn new(sender: mpsc::UnboundedSender<ServerEvent>) -> Self {
        Self {
            id: ConnectionId::new(),
            participant: Participant::customer(),
            session_id: None,
            sender,
            connected_at: OffsetDateTime::now_utc(),
            identified: false,
        }
    }

    /// Send an event to this connection
    ///
    /// Returns Err if the writer side has gone away
    #[allow(clippy::result_large_err)] // Error type is from tokio mpsc, containing the failed event
    pub fn send(&self, event: ServerEvent) -> Result<(), mpsc::error::SendError<ServerEvent>> {
        self.sender.send(event)
    }

    /// Snapshot of the fields callers outside the hub may read
    pub fn info(&self) -> ConnectionInfo {
        ConnectionInfo {
            id: self.id,
            participant: self.participant,
            session_id: self.session_id,
            connected_at: self.connected_at,
        }
    }
}

/// Read-only view of a connection
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConnectionInfo {
    pub id: ConnectionId,
    pub participant: Participant,
    pub session_id: Option<Uuid>,
    pub connected_at: OffsetDateTime,
}

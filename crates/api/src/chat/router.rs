//! Message fanout
//!
//! Turns persisted messages and session changes into outbound events and
//! hands them to the hub. Delivery is best-effort: a client that is not
//! joined at broadcast time recovers by re-reading the session history.

use livechat_shared::{ChatMessage, ChatSession};

use crate::websocket::{
    events::{MessageEventData, SessionUpdateData},
    ConnectionHub, ServerEvent,
};

#[derive(Clone)]
pub struct MessageRouter {
    hub: ConnectionHub,
}

impl MessageRouter {
    pub fn new(hub: ConnectionHub) -> Self {
        Self { hub }
    }

    /// Broadcast a freshly persisted message to its session
    ///
    /// Callers invoke this on the same path that created the message, so
    /// per-session delivery order follows creation order.
    pub async fn on_message_created(&self, message: &ChatMessage) -> usize {
        let delivered = self
            .hub
            .broadcast(
                message.session_id,
                ServerEvent::NewMessage(MessageEventData::from(message)),
            )
            .await;

        tracing::debug!(
            session_id = %message.session_id,
            message_id = %message.id,
            sender_type = %message.sender_type,
            recipients = delivered,
            "Message fanned out"
        );

        delivered
    }

    pub async fn on_session_updated(&self, session: &ChatSession) -> usize {
        self.hub
            .broadcast(
                session.id,
                ServerEvent::SessionUpdate(SessionUpdateData {
                    session_id: session.id,
                    status: session.status,
                    agent_id: session.agent_id,
                }),
            )
            .await
    }
}

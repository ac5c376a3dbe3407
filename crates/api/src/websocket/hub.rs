//! Connection hub
//!
//! Owns every live connection together with the session registry. One
//! `RwLock` guards both: writers are accept/join/leave/close, readers are
//! sends, broadcasts and membership queries. Pushing to a connection is a
//! non-blocking channel send, so no I/O happens while the lock is held.

use livechat_shared::{ConnectionId, ConnectionStatus};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use super::connection::{Connection, ConnectionInfo, Participant};
use super::events::{ConnectionStatusData, ServerEvent};
use super::registry::SessionRegistry;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HubError {
    #[error("Connection not found: {0}")]
    UnknownConnection(ConnectionId),
    #[error("Participant type cannot change after join")]
    ParticipantChanged,
}

/// Result of a join
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinOutcome {
    /// Session the connection implicitly left, if it switched sessions
    pub left_session: Option<Uuid>,
    pub participant: Participant,
}

#[derive(Default)]
struct HubInner {
    connections: HashMap<ConnectionId, Connection>,
    registry: SessionRegistry,
}

impl HubInner {
    /// Push to every member of a session, skipping ids no longer in the
    /// connection table
    fn fan_out(&self, session_id: Uuid, except: Option<ConnectionId>, event: &ServerEvent) -> usize {
        let mut delivered = 0;
        let mut failed = 0;

        for connection_id in self.registry.iter_members(session_id) {
            if Some(connection_id) == except {
                continue;
            }
            let Some(conn) = self.connections.get(&connection_id) else {
                tracing::debug!(
                    connection_id = %connection_id,
                    session_id = %session_id,
                    "Skipping member without an open connection"
                );
                continue;
            };
            match conn.send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(_) => {
                    failed += 1;
                    tracing::warn!(
                        connection_id = %connection_id,
                        "Failed to send event to connection (likely closed)"
                    );
                }
            }
        }

        tracing::debug!(
            session_id = %session_id,
            event_type = event.event_type(),
            recipients = delivered,
            failed = failed,
            "Broadcast event to session"
        );

        delivered
    }

    fn status_event(&self, session_id: Uuid) -> ServerEvent {
        ServerEvent::ConnectionStatusUpdate(ConnectionStatusData {
            session_id,
            connection_status: self.registry.connected_counts(session_id),
        })
    }
}

/// Shared handle to the connection table and session registry
#[derive(Clone, Default)]
pub struct ConnectionHub {
    inner: Arc<RwLock<HubInner>>,
}

impl ConnectionHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a newly accepted socket as an anonymous customer
    pub async fn accept(&self, sender: mpsc::UnboundedSender<ServerEvent>) -> ConnectionId {
        let conn = Connection::new(sender);
        let id = conn.id;

        let mut inner = self.inner.write().await;
        inner.connections.insert(id, conn);

        tracing::info!(
            connection_id = %id,
            total_connections = inner.connections.len(),
            "WebSocket connection added"
        );

        id
    }

    /// Join a connection to a session
    ///
    /// The first join fixes the participant. A later join that names a
    /// different participant kind is rejected.
    pub async fn join(
        &self,
        connection_id: ConnectionId,
        session_id: Uuid,
        participant: Participant,
    ) -> Result<JoinOutcome, HubError> {
        let mut guard = self.inner.write().await;
        let inner = &mut *guard;

        let conn = inner
            .connections
            .get_mut(&connection_id)
            .ok_or(HubError::UnknownConnection(connection_id))?;

        if conn.identified {
            if conn.participant.kind != participant.kind {
                return Err(HubError::ParticipantChanged);
            }
        } else {
            conn.participant = participant;
            conn.identified = true;
        }
        conn.session_id = Some(session_id);
        let participant = conn.participant;

        let left_session = inner.registry.join(connection_id, session_id, participant);

        tracing::info!(
            connection_id = %connection_id,
            session_id = %session_id,
            user_type = %participant.kind,
            "Client joined session"
        );

        Ok(JoinOutcome {
            left_session,
            participant,
        })
    }

    /// Leave the current session, if any, and notify the members left behind
    pub async fn leave(&self, connection_id: ConnectionId) -> Option<Uuid> {
        let left = {
            let mut inner = self.inner.write().await;
            let left = inner.registry.leave(connection_id);
            if let Some(conn) = inner.connections.get_mut(&connection_id) {
                conn.session_id = None;
            }
            left
        };

        if let Some(session_id) = left {
            self.broadcast_connection_status(session_id).await;
        }
        left
    }

    /// Tear down a connection
    ///
    /// Idempotent: closing an id that is no longer present does nothing.
    pub async fn close(&self, connection_id: ConnectionId) {
        let left_session = {
            let mut inner = self.inner.write().await;
            let Some(conn) = inner.connections.remove(&connection_id) else {
                return;
            };
            let left_session = inner.registry.leave(connection_id);

            tracing::info!(
                connection_id = %connection_id,
                user_type = %conn.participant.kind,
                remaining_connections = inner.connections.len(),
                "WebSocket connection removed"
            );
            left_session
        };

        if let Some(session_id) = left_session {
            self.broadcast_connection_status(session_id).await;
        }
    }

    /// Best-effort push to one connection
    ///
    /// Failures are logged, not returned: the read loop notices the dead
    /// socket and performs the single cleanup.
    pub async fn send(&self, connection_id: ConnectionId, event: ServerEvent) -> bool {
        let inner = self.inner.read().await;
        let Some(conn) = inner.connections.get(&connection_id) else {
            tracing::debug!(connection_id = %connection_id, "Send to unknown connection ignored");
            return false;
        };

        match conn.send(event) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    connection_id = %connection_id,
                    event_type = e.0.event_type(),
                    "Failed to send event to connection"
                );
                false
            }
        }
    }

    /// Push to every member of a session; returns the number of deliveries
    pub async fn broadcast(&self, session_id: Uuid, event: ServerEvent) -> usize {
        let inner = self.inner.read().await;
        inner.fan_out(session_id, None, &event)
    }

    /// Push to every member of a session except one connection
    pub async fn broadcast_except(
        &self,
        session_id: Uuid,
        excluded: ConnectionId,
        event: ServerEvent,
    ) -> usize {
        let inner = self.inner.read().await;
        inner.fan_out(session_id, Some(excluded), &event)
    }

    /// Send the current participant counts to every member of a session
    pub async fn broadcast_connection_status(&self, session_id: Uuid) -> usize {
        let inner = self.inner.read().await;
        if !inner.registry.contains_session(session_id) {
            return 0;
        }
        let event = inner.status_event(session_id);
        inner.fan_out(session_id, None, &event)
    }

    /// Current participant counts as a `connection_status_update` event
    pub async fn connection_status_event(&self, session_id: Uuid) -> ServerEvent {
        self.inner.read().await.status_event(session_id)
    }

    pub async fn members_of(&self, session_id: Uuid) -> HashSet<ConnectionId> {
        self.inner.read().await.registry.members_of(session_id)
    }

    pub async fn connected_counts(&self, session_id: Uuid) -> ConnectionStatus {
        self.inner.read().await.registry.connected_counts(session_id)
    }

    pub async fn connection(&self, connection_id: ConnectionId) -> Option<ConnectionInfo> {
        self.inner
            .read()
            .await
            .connections
            .get(&connection_id)
            .map(Connection::info)
    }

    /// Get total number of open connections
    pub async fn connection_count(&self) -> usize {
        self.inner.read().await.connections.len()
    }

    /// Get number of sessions with at least one member
    pub async fn session_count(&self) -> usize {
        self.inner.read().await.registry.session_count()
    }

    pub async fn stats(&self) -> HubStats {
        let inner = self.inner.read().await;
        HubStats {
            active_connections: inner.connections.len(),
            active_sessions: inner.registry.session_count(),
        }
    }
}

/// Statistics about WebSocket connections
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct HubStats {
    /// Number of open connections
    pub active_connections: usize,
    /// Number of sessions with at least one joined connection
    pub active_sessions: usize,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use livechat_shared::ParticipantKind;

    type Rx = mpsc::UnboundedReceiver<ServerEvent>;

    async fn open(hub: &ConnectionHub) -> (ConnectionId, Rx) {
        let (tx, rx) = mpsc::unbounded_channel();
        (hub.accept(tx).await, rx)
    }

    fn drain(rx: &mut Rx) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_accept_registers_anonymous_customer() {
        let hub = ConnectionHub::new();
        let (id, _rx) = open(&hub).await;

        let info = hub.connection(id).await.unwrap();
        assert_eq!(info.participant.kind, ParticipantKind::Customer);
        assert!(info.session_id.is_none());
        assert_eq!(hub.connection_count().await, 1);
    }

    #[tokio::test]
    async fn test_broadcast_reaches_only_members() {
        let hub = ConnectionHub::new();
        let session = Uuid::new_v4();
        let (a, mut rx_a) = open(&hub).await;
        let (b, mut rx_b) = open(&hub).await;
        let (_outsider, mut rx_c) = open(&hub).await;

        hub.join(a, session, Participant::customer()).await.unwrap();
        hub.join(b, session, Participant::agent(None)).await.unwrap();

        let delivered = hub.broadcast(session, ServerEvent::error("ping")).await;
        assert_eq!(delivered, 2);
        assert_eq!(drain(&mut rx_a).len(), 1);
        assert_eq!(drain(&mut rx_b).len(), 1);
        assert!(drain(&mut rx_c).is_empty());

        let delivered = hub.broadcast_except(session, a, ServerEvent::error("pong")).await;
        assert_eq!(delivered, 1);
        assert!(drain(&mut rx_a).is_empty());
        assert_eq!(drain(&mut rx_b).len(), 1);
    }

    #[tokio::test]
    async fn test_close_notifies_remaining_member() {
        let hub = ConnectionHub::new();
        let session = Uuid::new_v4();
        let (a, mut rx_a) = open(&hub).await;
        let (b, _rx_b) = open(&hub).await;

        hub.join(a, session, Participant::customer()).await.unwrap();
        hub.join(b, session, Participant::agent(None)).await.unwrap();

        hub.close(b).await;

        assert_eq!(hub.members_of(session).await, HashSet::from([a]));
        let events = drain(&mut rx_a);
        match events.last() {
            Some(ServerEvent::ConnectionStatusUpdate(data)) => {
                assert!(data.connection_status.customer_connected);
                assert!(!data.connection_status.agent_connected);
            }
            other => panic!("Expected connection status update, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_close_last_member_removes_session() {
        let hub = ConnectionHub::new();
        let session = Uuid::new_v4();
        let (a, _rx) = open(&hub).await;
        hub.join(a, session, Participant::customer()).await.unwrap();

        hub.close(a).await;
        hub.close(a).await;

        assert!(hub.members_of(session).await.is_empty());
        assert_eq!(hub.session_count().await, 0);
        assert_eq!(hub.connection_count().await, 0);
        assert_eq!(hub.broadcast(session, ServerEvent::error("late")).await, 0);
    }

    #[tokio::test]
    async fn test_participant_is_fixed_after_first_join() {
        let hub = ConnectionHub::new();
        let (a, _rx) = open(&hub).await;
        let session = Uuid::new_v4();
        let agent = Uuid::new_v4();

        let outcome = hub.join(a, session, Participant::agent(Some(agent))).await.unwrap();
        assert_eq!(outcome.participant.id, Some(agent));

        let result = hub.join(a, session, Participant::customer()).await;
        assert_eq!(result, Err(HubError::ParticipantChanged));

        let again = hub.join(a, session, Participant::agent(None)).await.unwrap();
        assert_eq!(again.participant.id, Some(agent));
    }

    #[tokio::test]
    async fn test_join_unknown_connection() {
        let hub = ConnectionHub::new();
        let ghost = ConnectionId::new();
        let result = hub.join(ghost, Uuid::new_v4(), Participant::customer()).await;
        assert_eq!(result, Err(HubError::UnknownConnection(ghost)));
    }

    #[tokio::test]
    async fn test_send_to_dropped_receiver_is_not_an_error() {
        let hub = ConnectionHub::new();
        let (a, rx) = open(&hub).await;
        drop(rx);

        assert!(!hub.send(a, ServerEvent::error("nobody home")).await);
        // Connection stays until the read loop closes it
        assert_eq!(hub.connection_count().await, 1);
    }
}

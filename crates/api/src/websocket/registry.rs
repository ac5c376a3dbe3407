//! Session membership bookkeeping
//!
//! Maps each chat session to the connections joined to it. The registry has
//! no lock of its own: it lives inside the hub's lock so membership and the
//! connection table always change together.

use livechat_shared::{ConnectionId, ConnectionStatus};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use super::connection::Participant;

#[derive(Debug, Default)]
pub struct SessionRegistry {
    /// session_id -> joined connections and who they are
    sessions: HashMap<Uuid, HashMap<ConnectionId, Participant>>,
    /// connection_id -> session it is joined to
    memberships: HashMap<ConnectionId, Uuid>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection to a session
    ///
    /// Re-joining the same session only refreshes the participant. Joining a
    /// different session first leaves the current one, whose id is returned.
    pub fn join(
        &mut self,
        connection_id: ConnectionId,
        session_id: Uuid,
        participant: Participant,
    ) -> Option<Uuid> {
        let previous = match self.session_of(connection_id) {
            Some(current) if current == session_id => None,
            Some(_) => self.leave(connection_id),
            None => None,
        };

        self.sessions
            .entry(session_id)
            .or_default()
            .insert(connection_id, participant);
        self.memberships.insert(connection_id, session_id);

        tracing::debug!(
            session_id = %session_id,
            connection_id = %connection_id,
            members = self.sessions.get(&session_id).map(HashMap::len).unwrap_or(0),
            "Connection joined session"
        );

        previous
    }

    /// Remove a connection's membership, returning the session it left
    pub fn leave(&mut self, connection_id: ConnectionId) -> Option<Uuid> {
        let session_id = self.memberships.remove(&connection_id)?;

        if let Some(members) = self.sessions.get_mut(&session_id) {
            members.remove(&connection_id);

            // Clean up empty sessions
            if members.is_empty() {
                self.sessions.remove(&session_id);
                tracing::debug!(session_id = %session_id, "Removed empty session");
            } else {
                tracing::debug!(
                    session_id = %session_id,
                    connection_id = %connection_id,
                    members = members.len(),
                    "Connection left session"
                );
            }
        }

        Some(session_id)
    }

    pub fn session_of(&self, connection_id: ConnectionId) -> Option<Uuid> {
        self.memberships.get(&connection_id).copied()
    }

    pub fn members_of(&self, session_id: Uuid) -> HashSet<ConnectionId> {
        self.sessions
            .get(&session_id)
            .map(|members| members.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Iterate members without allocating; empty for unknown sessions
    pub fn iter_members(&self, session_id: Uuid) -> impl Iterator<Item = ConnectionId> + '_ {
        self.sessions
            .get(&session_id)
            .into_iter()
            .flat_map(|members| members.keys().copied())
    }

    /// Customer/agent presence derived from current members
    pub fn connected_counts(&self, session_id: Uuid) -> ConnectionStatus {
        let mut status = ConnectionStatus::default();
        if let Some(members) = self.sessions.get(&session_id) {
            for participant in members.values() {
                status.record(participant.kind);
            }
        }
        status
    }

    pub fn contains_session(&self, session_id: Uuid) -> bool {
        self.sessions.contains_key(&session_id)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_and_leave() {
        let mut registry = SessionRegistry::new();
        let session = Uuid::new_v4();
        let conn = ConnectionId::new();

        assert!(registry.members_of(session).is_empty());

        registry.join(conn, session, Participant::customer());
        assert_eq!(registry.members_of(session), HashSet::from([conn]));
        assert_eq!(registry.session_of(conn), Some(session));

        assert_eq!(registry.leave(conn), Some(session));
        assert!(registry.members_of(session).is_empty());
        assert!(!registry.contains_session(session));
        assert_eq!(registry.leave(conn), None);
    }

    #[test]
    fn test_rejoin_same_session_is_idempotent() {
        let mut registry = SessionRegistry::new();
        let session = Uuid::new_v4();
        let conn = ConnectionId::new();

        registry.join(conn, session, Participant::customer());
        assert_eq!(registry.join(conn, session, Participant::customer()), None);
        assert_eq!(registry.members_of(session).len(), 1);
    }

    #[test]
    fn test_join_other_session_moves_membership() {
        let mut registry = SessionRegistry::new();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        let conn = ConnectionId::new();
        let other = ConnectionId::new();

        registry.join(conn, first, Participant::customer());
        registry.join(other, first, Participant::agent(None));

        assert_eq!(registry.join(conn, second, Participant::customer()), Some(first));
        assert_eq!(registry.members_of(first), HashSet::from([other]));
        assert_eq!(registry.members_of(second), HashSet::from([conn]));
    }

    #[test]
    fn test_membership_matches_join_leave_sequence() {
        let mut registry = SessionRegistry::new();
        let session = Uuid::new_v4();
        let conns: Vec<ConnectionId> = (0..6).map(|_| ConnectionId::new()).collect();
        let mut expected = HashSet::new();

        for (i, conn) in conns.iter().enumerate() {
            registry.join(*conn, session, Participant::customer());
            expected.insert(*conn);
            if i % 2 == 1 {
                registry.leave(conns[i - 1]);
                expected.remove(&conns[i - 1]);
            }
            assert_eq!(registry.members_of(session), expected);
        }

        for conn in &conns {
            registry.leave(*conn);
        }
        assert_eq!(registry.session_count(), 0);
    }

    #[test]
    fn test_connected_counts() {
        let mut registry = SessionRegistry::new();
        let session = Uuid::new_v4();

        assert_eq!(registry.connected_counts(session), ConnectionStatus::default());

        registry.join(ConnectionId::new(), session, Participant::customer());
        registry.join(ConnectionId::new(), session, Participant::customer());
        registry.join(ConnectionId::new(), session, Participant::agent(Some(Uuid::new_v4())));

        let status = registry.connected_counts(session);
        assert!(status.customer_connected);
        assert!(status.agent_connected);
        assert_eq!(status.total_customer, 2);
        assert_eq!(status.total_agent, 1);
    }
}

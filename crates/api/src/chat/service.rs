//! Message sending path and session reads

use livechat_shared::{
    ChatError, ChatMessage, ChatResult, ChatSession, NewMessage, ParticipantKind, DEFAULT_MESSAGE_TYPE,
};
use std::collections::HashMap;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::lifecycle::{self, SessionEvent};
use super::{record_audit, MessageRouter};
use crate::audit_constants::{chat_action, chat_details};
use crate::store::{AuditSink, MessageStore, SessionStore};

/// A message about to be sent into a session
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingMessage {
    pub session_id: Uuid,
    pub sender_id: Option<Uuid>,
    pub sender_kind: ParticipantKind,
    pub body: String,
    /// Defaults to `text` when absent or blank
    pub message_type: Option<String>,
    pub attachments: Vec<String>,
}

impl OutgoingMessage {
    /// Plain text message with no attachments
    pub fn text(
        session_id: Uuid,
        sender_id: Option<Uuid>,
        sender_kind: ParticipantKind,
        body: impl Into<String>,
    ) -> Self {
        Self {
            session_id,
            sender_id,
            sender_kind,
            body: body.into(),
            message_type: None,
            attachments: Vec::new(),
        }
    }
}

/// One async lock per session with a send in flight
///
/// Entries are dropped once no sender holds or waits on them.
#[derive(Clone, Default)]
struct SessionLocks {
    inner: Arc<Mutex<HashMap<Uuid, Arc<Mutex<()>>>>>,
}

impl SessionLocks {
    async fn acquire(&self, session_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.inner.lock().await;
            Arc::clone(locks.entry(session_id).or_default())
        };
        lock.lock_owned().await
    }

    async fn release(&self, session_id: Uuid, guard: OwnedMutexGuard<()>) {
        drop(guard);
        let mut locks = self.inner.lock().await;
        if locks.get(&session_id).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(&session_id);
        }
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }
}

#[derive(Clone)]
pub struct ChatService {
    sessions: Arc<dyn SessionStore>,
    messages: Arc<dyn MessageStore>,
    audit: Arc<dyn AuditSink>,
    router: MessageRouter,
    locks: SessionLocks,
}

impl ChatService {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        messages: Arc<dyn MessageStore>,
        audit: Arc<dyn AuditSink>,
        router: MessageRouter,
    ) -> Self {
        Self {
            sessions,
            messages,
            audit,
            router,
            locks: SessionLocks::default(),
        }
    }

    /// Persist a message and fan it out to the session
    ///
    /// A closed session fails before anything is written or broadcast. The
    /// first agent message into a waiting session activates it. Sends into
    /// one session are serialized from the status read through the fanout,
    /// so members receive messages in the order they were persisted.
    pub async fn send_message(&self, outgoing: OutgoingMessage) -> ChatResult<ChatMessage> {
        if outgoing.body.trim().is_empty() {
            return Err(ChatError::Validation("message text is required".to_string()));
        }

        let session_id = outgoing.session_id;
        let guard = self.locks.acquire(session_id).await;
        let result = self.send_serialized(outgoing).await;
        self.locks.release(session_id, guard).await;
        result
    }

    async fn send_serialized(&self, outgoing: OutgoingMessage) -> ChatResult<ChatMessage> {
        let mut session = self
            .sessions
            .get_session(outgoing.session_id)
            .await?
            .ok_or(ChatError::SessionNotFound)?;

        let transition = lifecycle::apply(session.status, SessionEvent::Message(outgoing.sender_kind))?;

        let message_type = outgoing
            .message_type
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_MESSAGE_TYPE.to_string());

        let message = self
            .messages
            .create_message(NewMessage {
                session_id: outgoing.session_id,
                sender_id: outgoing.sender_id,
                sender_type: outgoing.sender_kind,
                message: outgoing.body,
                message_type,
                attachments: outgoing.attachments,
            })
            .await?;

        if let Some(status) = transition {
            session.status = status;
            session.updated_at = OffsetDateTime::now_utc();
            self.sessions.update_session(&session).await?;

            record_audit(
                self.audit.as_ref(),
                session.id,
                chat_action::RESPONSE,
                chat_details::AGENT_RESPONDED,
                outgoing.sender_id,
            )
            .await;

            tracing::info!(
                session_id = %session.id,
                agent_id = ?outgoing.sender_id,
                "Session activated by first agent message"
            );
        }

        self.router.on_message_created(&message).await;
        if transition.is_some() {
            self.router.on_session_updated(&session).await;
        }

        Ok(message)
    }

    /// Full message history of a session, oldest first
    pub async fn history(&self, session_id: Uuid) -> ChatResult<Vec<ChatMessage>> {
        self.sessions
            .get_session(session_id)
            .await?
            .ok_or(ChatError::SessionNotFound)?;
        self.messages.list_messages(session_id).await
    }

    pub async fn get_session(&self, session_id: Uuid) -> ChatResult<ChatSession> {
        self.sessions
            .get_session(session_id)
            .await?
            .ok_or(ChatError::SessionNotFound)
    }

    pub async fn waiting_sessions(&self) -> ChatResult<Vec<ChatSession>> {
        self.sessions.list_waiting().await
    }

    pub async fn active_sessions(&self) -> ChatResult<Vec<ChatSession>> {
        self.sessions.list_active().await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::websocket::{ConnectionHub, Participant, ServerEvent};
    use async_trait::async_trait;
    use livechat_shared::SessionStatus;
    use std::time::Duration;
    use tokio::sync::mpsc;

    /// Message store that stalls after persisting any message whose text is `slow`
    struct StallingStore {
        inner: MemoryStore,
        slow: &'static str,
    }

    #[async_trait]
    impl MessageStore for StallingStore {
        async fn create_message(&self, message: NewMessage) -> ChatResult<ChatMessage> {
            let stall = message.message == self.slow;
            let created = self.inner.create_message(message).await?;
            if stall {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            Ok(created)
        }

        async fn get_message(&self, id: Uuid) -> ChatResult<Option<ChatMessage>> {
            self.inner.get_message(id).await
        }

        async fn list_messages(&self, session_id: Uuid) -> ChatResult<Vec<ChatMessage>> {
            self.inner.list_messages(session_id).await
        }
    }

    struct Fixture {
        store: MemoryStore,
        hub: ConnectionHub,
        service: ChatService,
    }

    fn fixture() -> Fixture {
        let store = MemoryStore::new();
        let hub = ConnectionHub::new();
        let service = ChatService::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            MessageRouter::new(hub.clone()),
        );
        Fixture { store, hub, service }
    }

    #[tokio::test]
    async fn test_closed_session_rejects_without_side_effects() {
        let fx = fixture();
        let mut session = ChatSession::waiting(None, None);
        session.status = SessionStatus::Closed;
        fx.store.insert_session(session.clone()).await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = fx.hub.accept(tx).await;
        fx.hub.join(id, session.id, Participant::customer()).await.unwrap();

        let result = fx
            .service
            .send_message(OutgoingMessage::text(session.id, None, ParticipantKind::Customer, "hi"))
            .await;

        assert!(matches!(result, Err(ChatError::SessionClosed)));
        assert!(fx.service.history(session.id).await.unwrap().is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let fx = fixture();
        let result = fx
            .service
            .send_message(OutgoingMessage::text(Uuid::new_v4(), None, ParticipantKind::Customer, "hi"))
            .await;
        assert!(matches!(result, Err(ChatError::SessionNotFound)));
    }

    #[tokio::test]
    async fn test_message_type_defaults_to_text() {
        let fx = fixture();
        let session = ChatSession::waiting(None, None);
        fx.store.insert_session(session.clone()).await;

        let mut outgoing = OutgoingMessage::text(session.id, None, ParticipantKind::Customer, "hi");
        outgoing.message_type = Some(String::new());
        let message = fx.service.send_message(outgoing).await.unwrap();
        assert_eq!(message.message_type, "text");

        let mut outgoing = OutgoingMessage::text(session.id, None, ParticipantKind::Customer, "pic");
        outgoing.message_type = Some("image".to_string());
        outgoing.attachments = vec!["https://cdn.example.com/a.png".to_string()];
        let message = fx.service.send_message(outgoing).await.unwrap();
        assert_eq!(message.message_type, "image");
        assert_eq!(message.attachments.len(), 1);
    }

    #[tokio::test]
    async fn test_first_agent_message_activates_once() {
        let fx = fixture();
        let session = ChatSession::waiting(None, None);
        fx.store.insert_session(session.clone()).await;
        let agent = Uuid::new_v4();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = fx.hub.accept(tx).await;
        fx.hub.join(id, session.id, Participant::customer()).await.unwrap();

        for body in ["Hi, I can help", "What seems to be the problem?"] {
            fx.service
                .send_message(OutgoingMessage::text(session.id, Some(agent), ParticipantKind::Agent, body))
                .await
                .unwrap();
        }

        let stored = fx.service.get_session(session.id).await.unwrap();
        assert_eq!(stored.status, SessionStatus::Active);

        let responses = fx
            .store
            .audit_entries(session.id)
            .await
            .into_iter()
            .filter(|entry| entry.action == chat_action::RESPONSE)
            .count();
        assert_eq!(responses, 1);

        let mut updates = 0;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, ServerEvent::SessionUpdate(_)) {
                updates += 1;
            }
        }
        assert_eq!(updates, 1);
    }

    #[tokio::test]
    async fn test_audit_failure_does_not_block_send() {
        let fx = fixture();
        let session = ChatSession::waiting(None, None);
        fx.store.insert_session(session.clone()).await;
        fx.store.set_audit_failure(true);

        let result = fx
            .service
            .send_message(OutgoingMessage::text(
                session.id,
                Some(Uuid::new_v4()),
                ParticipantKind::Agent,
                "hello",
            ))
            .await;

        assert!(result.is_ok());
        let stored = fx.service.get_session(session.id).await.unwrap();
        assert_eq!(stored.status, SessionStatus::Active);
    }

    #[tokio::test]
    async fn test_concurrent_sends_fan_out_in_persisted_order() {
        let store = MemoryStore::new();
        let hub = ConnectionHub::new();
        let service = ChatService::new(
            Arc::new(store.clone()),
            Arc::new(StallingStore {
                inner: store.clone(),
                slow: "first",
            }),
            Arc::new(store.clone()),
            MessageRouter::new(hub.clone()),
        );
        let session = ChatSession::waiting(None, None);
        store.insert_session(session.clone()).await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = hub.accept(tx).await;
        hub.join(id, session.id, Participant::customer()).await.unwrap();

        let first = {
            let service = service.clone();
            tokio::spawn(async move {
                service
                    .send_message(OutgoingMessage::text(session.id, None, ParticipantKind::Customer, "first"))
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        service
            .send_message(OutgoingMessage::text(session.id, None, ParticipantKind::Customer, "second"))
            .await
            .unwrap();
        first.await.unwrap().unwrap();

        let persisted: Vec<String> = service
            .history(session.id)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.message)
            .collect();
        let mut delivered = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let ServerEvent::NewMessage(data) = event {
                delivered.push(data.message);
            }
        }

        assert_eq!(persisted, vec!["first", "second"]);
        assert_eq!(delivered, persisted);
        assert_eq!(service.locks.len().await, 0);
    }
}

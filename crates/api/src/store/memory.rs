//! In-memory collaborator implementations
//!
//! Backs every store trait with maps behind a `tokio::sync::RwLock`. Agents
//! are kept in insertion order so "first available" is deterministic.

use async_trait::async_trait;
use livechat_shared::{
    ChatError, ChatLogEntry, ChatMessage, ChatResult, ChatSession, NewMessage, SessionStatus, User,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{AuditSink, MessageStore, SessionStore, UserDirectory};

#[derive(Default)]
struct Tables {
    sessions: HashMap<Uuid, ChatSession>,
    messages: Vec<ChatMessage>,
    users: Vec<User>,
    logs: Vec<ChatLogEntry>,
}

/// Thread-safe in-memory store
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
    fail_audit: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a session
    pub async fn insert_session(&self, session: ChatSession) {
        let mut tables = self.tables.write().await;
        tables.sessions.insert(session.id, session);
    }

    /// Seed a staff member
    pub async fn insert_user(&self, user: User) {
        let mut tables = self.tables.write().await;
        tables.users.retain(|u| u.id != user.id);
        tables.users.push(user);
    }

    /// Audit entries recorded for a session, oldest first
    pub async fn audit_entries(&self, session_id: Uuid) -> Vec<ChatLogEntry> {
        let tables = self.tables.read().await;
        tables
            .logs
            .iter()
            .filter(|entry| entry.session_id == session_id)
            .cloned()
            .collect()
    }

    /// Make every subsequent audit append fail
    pub fn set_audit_failure(&self, fail: bool) {
        self.fail_audit.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn create_message(&self, message: NewMessage) -> ChatResult<ChatMessage> {
        let mut tables = self.tables.write().await;
        if !tables.sessions.contains_key(&message.session_id) {
            return Err(ChatError::SessionNotFound);
        }

        let now = OffsetDateTime::now_utc();
        let created = ChatMessage {
            id: Uuid::now_v7(),
            session_id: message.session_id,
            sender_id: message.sender_id,
            sender_type: message.sender_type,
            message: message.message,
            message_type: message.message_type,
            attachments: message.attachments,
            created_at: now,
            updated_at: now,
        };
        tables.messages.push(created.clone());
        Ok(created)
    }

    async fn get_message(&self, id: Uuid) -> ChatResult<Option<ChatMessage>> {
        let tables = self.tables.read().await;
        Ok(tables.messages.iter().find(|m| m.id == id).cloned())
    }

    async fn list_messages(&self, session_id: Uuid) -> ChatResult<Vec<ChatMessage>> {
        let tables = self.tables.read().await;
        Ok(tables
            .messages
            .iter()
            .filter(|m| m.session_id == session_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn get_session(&self, id: Uuid) -> ChatResult<Option<ChatSession>> {
        let tables = self.tables.read().await;
        Ok(tables.sessions.get(&id).cloned())
    }

    async fn update_session(&self, session: &ChatSession) -> ChatResult<()> {
        let mut tables = self.tables.write().await;
        match tables.sessions.get_mut(&session.id) {
            Some(existing) => {
                *existing = session.clone();
                Ok(())
            }
            None => Err(ChatError::SessionNotFound),
        }
    }

    async fn close_session(&self, id: Uuid) -> ChatResult<()> {
        let mut tables = self.tables.write().await;
        let session = tables.sessions.get_mut(&id).ok_or(ChatError::SessionNotFound)?;
        let now = OffsetDateTime::now_utc();
        session.status = SessionStatus::Closed;
        session.ended_at = Some(now);
        session.updated_at = now;
        Ok(())
    }

    async fn list_waiting(&self) -> ChatResult<Vec<ChatSession>> {
        Ok(self.sessions_with_status(SessionStatus::Waiting).await)
    }

    async fn list_active(&self) -> ChatResult<Vec<ChatSession>> {
        Ok(self.sessions_with_status(SessionStatus::Active).await)
    }
}

impl MemoryStore {
    async fn sessions_with_status(&self, status: SessionStatus) -> Vec<ChatSession> {
        let tables = self.tables.read().await;
        let mut sessions: Vec<ChatSession> = tables
            .sessions
            .values()
            .filter(|s| s.status == status)
            .cloned()
            .collect();
        sessions.sort_by_key(|s| s.created_at);
        sessions
    }
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn get_user(&self, id: Uuid) -> ChatResult<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables.users.iter().find(|u| u.id == id).cloned())
    }

    async fn list_available_agents(&self, department_id: Option<Uuid>) -> ChatResult<Vec<User>> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .iter()
            .filter(|u| u.is_active && u.is_agent())
            .filter(|u| department_id.is_none() || u.department_id == department_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl AuditSink for MemoryStore {
    async fn append(
        &self,
        session_id: Uuid,
        action: &str,
        details: &str,
        actor_id: Option<Uuid>,
    ) -> ChatResult<()> {
        if self.fail_audit.load(Ordering::SeqCst) {
            return Err(ChatError::Storage("audit log unavailable".to_string()));
        }

        let mut tables = self.tables.write().await;
        tables.logs.push(ChatLogEntry {
            id: Uuid::now_v7(),
            session_id,
            action: action.to_string(),
            details: Some(details.to_string()),
            user_id: actor_id,
            created_at: OffsetDateTime::now_utc(),
        });
        Ok(())
    }
}

//! Collaborator contracts consumed by the chat core
//!
//! The core only talks to persistence through these traits:
//! - **MessageStore**: creates and reads chat messages
//! - **SessionStore**: reads and updates chat sessions
//! - **UserDirectory**: resolves staff members and available agents
//! - **AuditSink**: appends entries to a session's audit trail
//!
//! `postgres` holds the sqlx-backed implementations, `memory` an in-process
//! implementation of all four used by tests and local development.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use livechat_shared::{ChatMessage, ChatResult, ChatSession, NewMessage, User};
use uuid::Uuid;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn create_message(&self, message: NewMessage) -> ChatResult<ChatMessage>;

    async fn get_message(&self, id: Uuid) -> ChatResult<Option<ChatMessage>>;

    /// Full history of a session, oldest first. Used by clients to recover
    /// after missing live pushes.
    async fn list_messages(&self, session_id: Uuid) -> ChatResult<Vec<ChatMessage>>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get_session(&self, id: Uuid) -> ChatResult<Option<ChatSession>>;

    async fn update_session(&self, session: &ChatSession) -> ChatResult<()>;

    /// Mark a session closed and stamp `ended_at`
    async fn close_session(&self, id: Uuid) -> ChatResult<()>;

    async fn list_waiting(&self) -> ChatResult<Vec<ChatSession>>;

    async fn list_active(&self) -> ChatResult<Vec<ChatSession>>;
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn get_user(&self, id: Uuid) -> ChatResult<Option<User>>;

    /// Active users with the agent role, optionally limited to one department
    async fn list_available_agents(&self, department_id: Option<Uuid>) -> ChatResult<Vec<User>>;
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(
        &self,
        session_id: Uuid,
        action: &str,
        details: &str,
        actor_id: Option<Uuid>,
    ) -> ChatResult<()>;
}

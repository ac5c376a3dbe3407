//! Postgres-backed collaborators

use async_trait::async_trait;
use livechat_shared::{
    ChatError, ChatMessage, ChatResult, ChatSession, NewMessage, ParticipantKind, SessionStatus,
    User, UserRole,
};
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use super::{AuditSink, MessageStore, SessionStore, UserDirectory};

/// sqlx implementation of every store trait over one pool
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// =============================================================================
// Row types
// =============================================================================

#[derive(sqlx::FromRow)]
struct MessageRow {
    id: Uuid,
    session_id: Uuid,
    sender_id: Option<Uuid>,
    sender_type: String,
    message: String,
    message_type: String,
    attachments: Vec<String>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl TryFrom<MessageRow> for ChatMessage {
    type Error = ChatError;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        Ok(ChatMessage {
            id: row.id,
            session_id: row.session_id,
            sender_id: row.sender_id,
            sender_type: row.sender_type.parse::<ParticipantKind>()?,
            message: row.message,
            message_type: row.message_type,
            attachments: row.attachments,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    id: Uuid,
    customer_id: Option<Uuid>,
    agent_id: Option<Uuid>,
    department_id: Option<Uuid>,
    topic: Option<String>,
    status: String,
    started_at: OffsetDateTime,
    ended_at: Option<OffsetDateTime>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl TryFrom<SessionRow> for ChatSession {
    type Error = ChatError;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        Ok(ChatSession {
            id: row.id,
            customer_id: row.customer_id,
            agent_id: row.agent_id,
            department_id: row.department_id,
            topic: row.topic,
            status: row.status.parse::<SessionStatus>()?,
            started_at: row.started_at,
            ended_at: row.ended_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    name: String,
    email: String,
    role: String,
    department_id: Option<Uuid>,
    department_name: Option<String>,
    is_active: bool,
}

impl UserRow {
    /// Rows with a role outside the chat staff roles are skipped
    fn into_user(self) -> Option<User> {
        let role = self.role.parse::<UserRole>().ok()?;
        Some(User {
            id: self.id,
            name: self.name,
            email: self.email,
            role,
            department_id: self.department_id,
            department_name: self.department_name,
            is_active: self.is_active,
        })
    }
}

const SESSION_COLUMNS: &str = "id, customer_id, agent_id, department_id, topic, status, \
     started_at, ended_at, created_at, updated_at";

const USER_SELECT: &str = r#"
    SELECT u.id, u.name, u.email, u.role, u.department_id,
           d.name AS department_name, u.is_active
    FROM users u
    LEFT JOIN departments d ON d.id = u.department_id
"#;

// =============================================================================
// Trait implementations
// =============================================================================

#[async_trait]
impl MessageStore for PgStore {
    async fn create_message(&self, message: NewMessage) -> ChatResult<ChatMessage> {
        let row = sqlx::query_as::<_, MessageRow>(
            r#"
            INSERT INTO chat_messages
              (id, session_id, sender_id, sender_type, message, message_type, attachments)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, session_id, sender_id, sender_type, message, message_type,
                      attachments, created_at, updated_at
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(message.session_id)
        .bind(message.sender_id)
        .bind(message.sender_type.as_str())
        .bind(&message.message)
        .bind(&message.message_type)
        .bind(&message.attachments)
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    async fn get_message(&self, id: Uuid) -> ChatResult<Option<ChatMessage>> {
        let row = sqlx::query_as::<_, MessageRow>(
            r#"
            SELECT id, session_id, sender_id, sender_type, message, message_type,
                   attachments, created_at, updated_at
            FROM chat_messages
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(ChatMessage::try_from).transpose()
    }

    async fn list_messages(&self, session_id: Uuid) -> ChatResult<Vec<ChatMessage>> {
        let rows = sqlx::query_as::<_, MessageRow>(
            r#"
            SELECT id, session_id, sender_id, sender_type, message, message_type,
                   attachments, created_at, updated_at
            FROM chat_messages
            WHERE session_id = $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ChatMessage::try_from).collect()
    }
}

#[async_trait]
impl SessionStore for PgStore {
    async fn get_session(&self, id: Uuid) -> ChatResult<Option<ChatSession>> {
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            "SELECT {SESSION_COLUMNS} FROM chat_sessions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(ChatSession::try_from).transpose()
    }

    async fn update_session(&self, session: &ChatSession) -> ChatResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE chat_sessions
            SET agent_id = $2, department_id = $3, topic = $4, status = $5,
                ended_at = $6, updated_at = $7
            WHERE id = $1
            "#,
        )
        .bind(session.id)
        .bind(session.agent_id)
        .bind(session.department_id)
        .bind(&session.topic)
        .bind(session.status.as_str())
        .bind(session.ended_at)
        .bind(session.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ChatError::SessionNotFound);
        }
        Ok(())
    }

    async fn close_session(&self, id: Uuid) -> ChatResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE chat_sessions
            SET status = 'closed', ended_at = NOW(), updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ChatError::SessionNotFound);
        }
        Ok(())
    }

    async fn list_waiting(&self) -> ChatResult<Vec<ChatSession>> {
        self.sessions_with_status(SessionStatus::Waiting).await
    }

    async fn list_active(&self) -> ChatResult<Vec<ChatSession>> {
        self.sessions_with_status(SessionStatus::Active).await
    }
}

impl PgStore {
    async fn sessions_with_status(&self, status: SessionStatus) -> ChatResult<Vec<ChatSession>> {
        let rows = sqlx::query_as::<_, SessionRow>(&format!(
            "SELECT {SESSION_COLUMNS} FROM chat_sessions WHERE status = $1 ORDER BY created_at ASC"
        ))
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ChatSession::try_from).collect()
    }
}

#[async_trait]
impl UserDirectory for PgStore {
    async fn get_user(&self, id: Uuid) -> ChatResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!("{USER_SELECT} WHERE u.id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.and_then(UserRow::into_user))
    }

    async fn list_available_agents(&self, department_id: Option<Uuid>) -> ChatResult<Vec<User>> {
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            r#"{USER_SELECT}
            WHERE u.role = 'agent' AND u.is_active = TRUE
              AND ($1::uuid IS NULL OR u.department_id = $1)
            ORDER BY u.created_at ASC"#
        ))
        .bind(department_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().filter_map(UserRow::into_user).collect())
    }
}

#[async_trait]
impl AuditSink for PgStore {
    async fn append(
        &self,
        session_id: Uuid,
        action: &str,
        details: &str,
        actor_id: Option<Uuid>,
    ) -> ChatResult<()> {
        sqlx::query(
            r#"
            INSERT INTO chat_logs (id, session_id, action, details, user_id)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(session_id)
        .bind(action)
        .bind(details)
        .bind(actor_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

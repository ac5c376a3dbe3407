//! Agent assignment and session closing
//!
//! Automatic assignment delegates the choice of agent to an
//! [`AssignmentStrategy`]. The default, [`FirstAvailable`], takes the first
//! agent the directory lists, with no load or skill weighting.

use livechat_shared::{ChatError, ChatResult, ChatSession, SessionStatus, User};
use std::sync::Arc;
use time::OffsetDateTime;
use uuid::Uuid;

use super::lifecycle::{self, SessionEvent};
use super::{record_audit, MessageRouter};
use crate::audit_constants::{chat_action, chat_details};
use crate::store::{AuditSink, SessionStore, UserDirectory};

/// Picks an agent for a session out of the currently available ones
pub trait AssignmentStrategy: Send + Sync {
    fn pick<'a>(&self, session: &ChatSession, candidates: &'a [User]) -> Option<&'a User>;
}

/// First-match assignment
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstAvailable;

impl AssignmentStrategy for FirstAvailable {
    fn pick<'a>(&self, _session: &ChatSession, candidates: &'a [User]) -> Option<&'a User> {
        candidates.first()
    }
}

#[derive(Clone)]
pub struct AssignmentEngine {
    sessions: Arc<dyn SessionStore>,
    directory: Arc<dyn UserDirectory>,
    audit: Arc<dyn AuditSink>,
    router: MessageRouter,
    strategy: Arc<dyn AssignmentStrategy>,
}

impl AssignmentEngine {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        directory: Arc<dyn UserDirectory>,
        audit: Arc<dyn AuditSink>,
        router: MessageRouter,
    ) -> Self {
        Self {
            sessions,
            directory,
            audit,
            router,
            strategy: Arc::new(FirstAvailable),
        }
    }

    /// Replace the auto-assignment strategy
    pub fn with_strategy(mut self, strategy: Arc<dyn AssignmentStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    async fn load(&self, session_id: Uuid) -> ChatResult<ChatSession> {
        self.sessions
            .get_session(session_id)
            .await?
            .ok_or(ChatError::SessionNotFound)
    }

    /// Manual assignment
    ///
    /// Sets the agent and inherits the agent's department. The status is left
    /// alone: a waiting session becomes active on the agent's first message.
    pub async fn assign(
        &self,
        session_id: Uuid,
        agent_id: Uuid,
        actor_id: Option<Uuid>,
    ) -> ChatResult<ChatSession> {
        let mut session = self.load(session_id).await?;
        lifecycle::apply(session.status, SessionEvent::ManualAssign)?;

        let agent = self
            .directory
            .get_user(agent_id)
            .await?
            .ok_or(ChatError::AgentNotFound)?;
        if !agent.is_agent() {
            return Err(ChatError::NotAnAgent);
        }

        session.agent_id = Some(agent.id);
        session.department_id = agent.department_id;
        session.updated_at = OffsetDateTime::now_utc();
        self.sessions.update_session(&session).await?;

        record_audit(
            self.audit.as_ref(),
            session.id,
            chat_action::ASSIGNED,
            &chat_details::assigned(&agent.name),
            actor_id,
        )
        .await;

        tracing::info!(
            session_id = %session.id,
            agent_id = %agent.id,
            actor_id = ?actor_id,
            "Chat session assigned"
        );

        self.router.on_session_updated(&session).await;
        Ok(session)
    }

    /// Automatic assignment
    ///
    /// Returns the chosen agent, or `None` when nobody is available, in which
    /// case the session is left untouched.
    pub async fn auto_assign(&self, session_id: Uuid) -> ChatResult<Option<Uuid>> {
        let mut session = self.load(session_id).await?;
        let transition = lifecycle::apply(session.status, SessionEvent::AutoAssign)?;

        let candidates = self
            .directory
            .list_available_agents(session.department_id)
            .await?;

        let Some(agent) = self.strategy.pick(&session, &candidates) else {
            tracing::info!(
                session_id = %session.id,
                department_id = ?session.department_id,
                "No agents available, session stays waiting"
            );
            return Ok(None);
        };

        session.agent_id = Some(agent.id);
        if let Some(status) = transition {
            session.status = status;
        }
        session.updated_at = OffsetDateTime::now_utc();
        self.sessions.update_session(&session).await?;

        record_audit(
            self.audit.as_ref(),
            session.id,
            chat_action::AUTO_ASSIGNED,
            &chat_details::auto_assigned(&agent.name),
            Some(agent.id),
        )
        .await;

        tracing::info!(
            session_id = %session.id,
            agent_id = %agent.id,
            candidates = candidates.len(),
            "Chat session auto-assigned"
        );

        self.router.on_session_updated(&session).await;
        Ok(Some(agent.id))
    }

    /// Close a session; rejects one that is already closed
    pub async fn close(
        &self,
        session_id: Uuid,
        reason: &str,
        actor_id: Option<Uuid>,
    ) -> ChatResult<ChatSession> {
        let mut session = self.load(session_id).await?;
        lifecycle::apply(session.status, SessionEvent::Close)?;

        self.sessions.close_session(session_id).await?;

        let now = OffsetDateTime::now_utc();
        session.status = SessionStatus::Closed;
        session.ended_at = Some(now);
        session.updated_at = now;

        record_audit(
            self.audit.as_ref(),
            session.id,
            chat_action::CLOSED,
            &chat_details::closed(reason),
            actor_id,
        )
        .await;

        tracing::info!(
            session_id = %session.id,
            actor_id = ?actor_id,
            reason = reason,
            "Chat session closed"
        );

        self.router.on_session_updated(&session).await;
        Ok(session)
    }
}

//! Agent presence tracking
//!
//! Presence is a TTL-bound record per agent. A heartbeat writes or refreshes
//! the record; absence of the record means the agent is offline. Two indexes
//! (all online agents, online agents per department) outlive single records
//! and are pruned lazily whenever a listing touches an expired member.
//!
//! - **PresenceStore**: storage contract with Redis and in-process backends
//! - **PresenceService**: heartbeat control surface, resolves agent details
//!   through the user directory before writing

pub mod memory;
pub mod redis;

use async_trait::async_trait;
use livechat_shared::{AgentStatus, ChatError, ChatResult, UserRole};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::store::UserDirectory;

pub use self::memory::MemoryPresenceStore;
pub use self::redis::RedisPresenceStore;

/// Default record TTL (5 minutes)
pub const DEFAULT_PRESENCE_TTL: Duration = Duration::from_secs(300);

/// Label used by `department_stats` for agents without a department
pub const NO_DEPARTMENT: &str = "No Department";

/// Presence record for one agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentPresence {
    pub agent_id: Uuid,
    pub name: String,
    pub email: String,
    pub department_id: Option<Uuid>,
    #[serde(default)]
    pub department: Option<String>,
    pub status: AgentStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub last_heartbeat: OffsetDateTime,
}

#[derive(Debug, thiserror::Error)]
pub enum PresenceError {
    #[error("Presence backend error: {0}")]
    Backend(String),
    #[error("Presence record encoding error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<::redis::RedisError> for PresenceError {
    fn from(err: ::redis::RedisError) -> Self {
        PresenceError::Backend(err.to_string())
    }
}

impl From<PresenceError> for ChatError {
    fn from(err: PresenceError) -> Self {
        ChatError::Storage(err.to_string())
    }
}

pub type PresenceResult<T> = Result<T, PresenceError>;

#[async_trait]
pub trait PresenceStore: Send + Sync {
    /// Write or refresh the record and index it under the global and
    /// department sets
    async fn set_online(&self, presence: &AgentPresence) -> PresenceResult<()>;

    /// `None` once the record has outlived its TTL
    async fn get(&self, agent_id: Uuid) -> PresenceResult<Option<AgentPresence>>;

    /// All online agents, evicting expired members from the global set
    async fn list_online(&self) -> PresenceResult<Vec<AgentPresence>>;

    /// Online agents of one department, evicting expired members from that
    /// department's set
    async fn list_online_by_department(&self, department_id: Uuid) -> PresenceResult<Vec<AgentPresence>>;

    /// Explicit offline: drops the record and the global-set membership.
    /// Department sets are left to lazy eviction.
    async fn remove(&self, agent_id: Uuid) -> PresenceResult<()>;

    /// Online agent count per department name
    async fn department_stats(&self) -> PresenceResult<HashMap<String, usize>> {
        let agents = self.list_online().await?;
        let mut stats = HashMap::new();
        for agent in agents {
            let label = agent
                .department
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| NO_DEPARTMENT.to_string());
            *stats.entry(label).or_insert(0) += 1;
        }
        Ok(stats)
    }
}

/// Heartbeat control surface consumed by the HTTP layer
#[derive(Clone)]
pub struct PresenceService {
    store: Arc<dyn PresenceStore>,
    directory: Arc<dyn UserDirectory>,
}

impl PresenceService {
    pub fn new(store: Arc<dyn PresenceStore>, directory: Arc<dyn UserDirectory>) -> Self {
        Self { store, directory }
    }

    /// Refresh an agent's presence. Unknown status values become `online`.
    pub async fn heartbeat(&self, agent_id: Uuid, status: Option<&str>) -> ChatResult<AgentPresence> {
        let agent = self
            .directory
            .get_user(agent_id)
            .await?
            .ok_or(ChatError::AgentNotFound)?;

        if !matches!(agent.role, UserRole::Agent | UserRole::Admin) {
            return Err(ChatError::NotAnAgent);
        }

        let presence = AgentPresence {
            agent_id: agent.id,
            name: agent.name,
            email: agent.email,
            department_id: agent.department_id,
            department: agent.department_name,
            status: AgentStatus::normalize(status),
            last_heartbeat: OffsetDateTime::now_utc(),
        };

        self.store.set_online(&presence).await?;

        tracing::debug!(
            agent_id = %agent_id,
            status = %presence.status,
            "Agent heartbeat recorded"
        );

        Ok(presence)
    }

    pub async fn set_offline(&self, agent_id: Uuid) -> ChatResult<()> {
        self.store.remove(agent_id).await?;
        tracing::info!(agent_id = %agent_id, "Agent set offline");
        Ok(())
    }

    pub async fn get_online(&self) -> ChatResult<Vec<AgentPresence>> {
        Ok(self.store.list_online().await?)
    }

    pub async fn get_online_by_department(&self, department_id: Uuid) -> ChatResult<Vec<AgentPresence>> {
        Ok(self.store.list_online_by_department(department_id).await?)
    }

    /// `None` means the agent is offline
    pub async fn get_agent_status(&self, agent_id: Uuid) -> ChatResult<Option<AgentPresence>> {
        Ok(self.store.get(agent_id).await?)
    }

    pub async fn department_stats(&self) -> ChatResult<HashMap<String, usize>> {
        Ok(self.store.department_stats().await?)
    }
}

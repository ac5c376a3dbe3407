//! Redis presence backend
//!
//! Key layout:
//! - `agent:online:<agent_id>`: JSON record, `SET EX <ttl>`
//! - `agents:all`: set of online agent ids, `EXPIRE <2 * ttl>`
//! - `agents:dept:<department_id>`: per-department set, `EXPIRE <2 * ttl>`
//!
//! Record expiry is handled by Redis; set members whose record is gone are
//! removed with `SREM` by the next listing that reads them.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;
use uuid::Uuid;

use super::{AgentPresence, PresenceResult, PresenceStore};

const AGENT_ONLINE_PREFIX: &str = "agent:online:";
const AGENTS_BY_DEPT_PREFIX: &str = "agents:dept:";
const ALL_AGENTS_KEY: &str = "agents:all";

fn agent_key(agent_id: &str) -> String {
    format!("{AGENT_ONLINE_PREFIX}{agent_id}")
}

fn department_key(department_id: Uuid) -> String {
    format!("{AGENTS_BY_DEPT_PREFIX}{department_id}")
}

#[derive(Clone)]
pub struct RedisPresenceStore {
    conn: ConnectionManager,
    ttl: Duration,
}

impl RedisPresenceStore {
    /// Connect to Redis and build a store whose records live for `ttl`
    pub async fn connect(redis_url: &str, ttl: Duration) -> PresenceResult<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn, ttl })
    }

    /// Fetch the records of every member of `set_key`, removing members
    /// whose record has expired
    async fn list_set(&self, set_key: &str) -> PresenceResult<Vec<AgentPresence>> {
        let mut conn = self.conn.clone();

        let agent_ids: Vec<String> = conn.smembers(set_key).await?;
        if agent_ids.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<String> = agent_ids.iter().map(|id| agent_key(id)).collect();
        let records: Vec<Option<String>> = redis::cmd("MGET").arg(&keys).query_async(&mut conn).await?;

        let mut online = Vec::with_capacity(records.len());
        for (agent_id, record) in agent_ids.iter().zip(records) {
            let Some(json) = record else {
                // Record expired: drop the member so the set heals itself
                if let Err(e) = conn.srem::<_, _, ()>(set_key, agent_id).await {
                    tracing::warn!(
                        error = ?e,
                        set = %set_key,
                        agent_id = %agent_id,
                        "Failed to evict expired agent from presence set"
                    );
                } else {
                    tracing::debug!(set = %set_key, agent_id = %agent_id, "Evicted expired agent");
                }
                continue;
            };

            match serde_json::from_str::<AgentPresence>(&json) {
                Ok(presence) => online.push(presence),
                Err(e) => {
                    tracing::warn!(error = ?e, agent_id = %agent_id, "Skipping malformed presence record");
                }
            }
        }

        Ok(online)
    }
}

#[async_trait]
impl PresenceStore for RedisPresenceStore {
    async fn set_online(&self, presence: &AgentPresence) -> PresenceResult<()> {
        let json = serde_json::to_string(presence)?;
        let agent_id = presence.agent_id.to_string();
        let record_ttl = self.ttl.as_secs().max(1);
        let index_ttl = (record_ttl * 2) as i64;

        let mut pipe = redis::pipe();
        pipe.atomic()
            .set_ex(agent_key(&agent_id), json, record_ttl)
            .ignore()
            .sadd(ALL_AGENTS_KEY, &agent_id)
            .ignore()
            .expire(ALL_AGENTS_KEY, index_ttl)
            .ignore();

        if let Some(department_id) = presence.department_id {
            let dept_key = department_key(department_id);
            pipe.sadd(&dept_key, &agent_id)
                .ignore()
                .expire(&dept_key, index_ttl)
                .ignore();
        }

        let mut conn = self.conn.clone();
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    async fn get(&self, agent_id: Uuid) -> PresenceResult<Option<AgentPresence>> {
        let mut conn = self.conn.clone();
        let json: Option<String> = conn.get(agent_key(&agent_id.to_string())).await?;
        json.map(|raw| serde_json::from_str(&raw))
            .transpose()
            .map_err(Into::into)
    }

    async fn list_online(&self) -> PresenceResult<Vec<AgentPresence>> {
        self.list_set(ALL_AGENTS_KEY).await
    }

    async fn list_online_by_department(&self, department_id: Uuid) -> PresenceResult<Vec<AgentPresence>> {
        self.list_set(&department_key(department_id)).await
    }

    async fn remove(&self, agent_id: Uuid) -> PresenceResult<()> {
        let agent_id = agent_id.to_string();
        let mut conn = self.conn.clone();
        let _: () = redis::pipe()
            .del(agent_key(&agent_id))
            .ignore()
            .srem(ALL_AGENTS_KEY, &agent_id)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }
}

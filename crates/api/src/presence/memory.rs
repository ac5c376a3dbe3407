//! In-process presence backend with TTL
//!
//! Mirrors the key layout of the Redis backend: one expiring record per
//! agent plus expiring index sets that live twice as long as a record.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use std::time::{Duration, Instant};
use uuid::Uuid;

use super::{AgentPresence, PresenceError, PresenceResult, PresenceStore};

/// Record with expiration
#[derive(Clone)]
struct RecordEntry {
    presence: AgentPresence,
    expires_at: Instant,
}

impl RecordEntry {
    fn is_expired(&self) -> bool {
        Instant::now() > self.expires_at
    }
}

/// Index set with expiration, refreshed on every heartbeat that touches it
#[derive(Default)]
struct IndexSet {
    members: HashSet<Uuid>,
    expires_at: Option<Instant>,
}

impl IndexSet {
    fn is_expired(&self) -> bool {
        self.expires_at.map(|at| Instant::now() > at).unwrap_or(false)
    }

    fn add(&mut self, agent_id: Uuid, ttl: Duration) {
        if self.is_expired() {
            self.members.clear();
        }
        self.members.insert(agent_id);
        self.expires_at = Some(Instant::now() + ttl);
    }
}

#[derive(Default)]
struct PresenceTables {
    records: HashMap<Uuid, RecordEntry>,
    all: IndexSet,
    departments: HashMap<Uuid, IndexSet>,
}

/// Which index a listing reads
#[derive(Clone, Copy)]
enum Index {
    All,
    Department(Uuid),
}

/// Thread-safe in-memory presence store
pub struct MemoryPresenceStore {
    tables: RwLock<PresenceTables>,
    ttl: Duration,
}

impl MemoryPresenceStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            tables: RwLock::new(PresenceTables::default()),
            ttl,
        }
    }

    fn poisoned() -> PresenceError {
        PresenceError::Backend("presence table lock poisoned".to_string())
    }

    /// Read an index, drop members whose record has expired, return the rest
    fn list_index(&self, index: Index) -> PresenceResult<Vec<AgentPresence>> {
        let mut tables = self.tables.write().map_err(|_| Self::poisoned())?;

        let (member_ids, set_expired): (Vec<Uuid>, bool) = match index {
            Index::All => (tables.all.members.iter().copied().collect(), tables.all.is_expired()),
            Index::Department(id) => tables
                .departments
                .get(&id)
                .map(|set| (set.members.iter().copied().collect(), set.is_expired()))
                .unwrap_or_default(),
        };

        let mut online = Vec::with_capacity(member_ids.len());
        let mut stale = Vec::new();
        for agent_id in member_ids {
            match tables.records.get(&agent_id) {
                Some(entry) if !set_expired && !entry.is_expired() => online.push(entry.presence.clone()),
                _ => stale.push(agent_id),
            }
        }

        for agent_id in &stale {
            if tables.records.get(agent_id).is_some_and(RecordEntry::is_expired) {
                tables.records.remove(agent_id);
            }
        }

        match index {
            Index::All => {
                if tables.all.is_expired() {
                    tables.all = IndexSet::default();
                } else {
                    for agent_id in &stale {
                        tables.all.members.remove(agent_id);
                    }
                }
            }
            Index::Department(id) => {
                if let Some(set) = tables.departments.get_mut(&id) {
                    for agent_id in &stale {
                        set.members.remove(agent_id);
                    }
                    if set.is_expired() || set.members.is_empty() {
                        tables.departments.remove(&id);
                    }
                }
            }
        }

        if !stale.is_empty() {
            tracing::debug!(evicted = stale.len(), "Evicted expired agents from presence index");
        }

        online.sort_by(|a, b| a.name.cmp(&b.name).then(a.agent_id.cmp(&b.agent_id)));
        Ok(online)
    }
}

#[async_trait]
impl PresenceStore for MemoryPresenceStore {
    async fn set_online(&self, presence: &AgentPresence) -> PresenceResult<()> {
        let mut tables = self.tables.write().map_err(|_| Self::poisoned())?;
        let index_ttl = self.ttl * 2;

        tables.records.insert(
            presence.agent_id,
            RecordEntry {
                presence: presence.clone(),
                expires_at: Instant::now() + self.ttl,
            },
        );
        tables.all.add(presence.agent_id, index_ttl);
        if let Some(department_id) = presence.department_id {
            tables
                .departments
                .entry(department_id)
                .or_default()
                .add(presence.agent_id, index_ttl);
        }
        Ok(())
    }

    async fn get(&self, agent_id: Uuid) -> PresenceResult<Option<AgentPresence>> {
        let tables = self.tables.read().map_err(|_| Self::poisoned())?;
        Ok(tables
            .records
            .get(&agent_id)
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.presence.clone()))
    }

    async fn list_online(&self) -> PresenceResult<Vec<AgentPresence>> {
        self.list_index(Index::All)
    }

    async fn list_online_by_department(&self, department_id: Uuid) -> PresenceResult<Vec<AgentPresence>> {
        self.list_index(Index::Department(department_id))
    }

    async fn remove(&self, agent_id: Uuid) -> PresenceResult<()> {
        let mut tables = self.tables.write().map_err(|_| Self::poisoned())?;
        tables.records.remove(&agent_id);
        tables.all.members.remove(&agent_id);
        Ok(())
    }
}

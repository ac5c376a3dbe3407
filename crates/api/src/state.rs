//! Shared application state

use sqlx::PgPool;
use std::sync::Arc;

use crate::chat::{AssignmentEngine, ChatService, MessageRouter};
use crate::config::Config;
use crate::presence::{PresenceService, PresenceStore};
use crate::store::{AuditSink, MemoryStore, MessageStore, PgStore, SessionStore, UserDirectory};
use crate::websocket::ConnectionHub;

/// The four persistence collaborators the chat core consumes
#[derive(Clone)]
pub struct Collaborators {
    pub sessions: Arc<dyn SessionStore>,
    pub messages: Arc<dyn MessageStore>,
    pub directory: Arc<dyn UserDirectory>,
    pub audit: Arc<dyn AuditSink>,
}

impl Collaborators {
    pub fn postgres(pool: PgPool) -> Self {
        let store = Arc::new(PgStore::new(pool));
        Self {
            sessions: store.clone(),
            messages: store.clone(),
            directory: store.clone(),
            audit: store,
        }
    }

    pub fn memory(store: MemoryStore) -> Self {
        let store = Arc::new(store);
        Self {
            sessions: store.clone(),
            messages: store.clone(),
            directory: store.clone(),
            audit: store,
        }
    }
}

/// Application state shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub hub: ConnectionHub,
    pub chat: ChatService,
    pub assignment: AssignmentEngine,
    pub presence: PresenceService,
    /// `None` when running on in-memory stores
    pub pool: Option<PgPool>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(
        config: Config,
        collaborators: Collaborators,
        presence_store: Arc<dyn PresenceStore>,
        pool: Option<PgPool>,
    ) -> Self {
        let hub = ConnectionHub::new();
        let router = MessageRouter::new(hub.clone());

        let chat = ChatService::new(
            collaborators.sessions.clone(),
            collaborators.messages,
            collaborators.audit.clone(),
            router.clone(),
        );
        let assignment = AssignmentEngine::new(
            collaborators.sessions,
            collaborators.directory.clone(),
            collaborators.audit,
            router,
        );
        let presence = PresenceService::new(presence_store, collaborators.directory);

        Self {
            hub,
            chat,
            assignment,
            presence,
            pool,
            config: Arc::new(config),
        }
    }
}

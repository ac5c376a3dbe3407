//! Error types for the live-chat core

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Chat session not found")]
    SessionNotFound,

    #[error("Cannot send message to closed session")]
    SessionClosed,

    #[error("Session is already closed")]
    AlreadyClosed,

    #[error("Agent not found")]
    AgentNotFound,

    #[error("User is not an agent")]
    NotAnAgent,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ChatError {
    /// Domain failures are the caller's fault; everything else is a collaborator failure
    pub fn is_domain(&self) -> bool {
        !matches!(self, Self::Storage(_) | Self::Internal(_))
    }
}

impl From<sqlx::Error> for ChatError {
    fn from(err: sqlx::Error) -> Self {
        ChatError::Storage(err.to_string())
    }
}

/// Result type alias for chat core operations
pub type ChatResult<T> = Result<T, ChatError>;

//! Livechat API Library
//!
//! This crate contains the real-time chat core and the API server
//! components around it.

pub mod audit_constants;
pub mod chat;
pub mod config;
pub mod error;
pub mod presence;
pub mod routes;
pub mod state;
pub mod store;
pub mod websocket;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use state::{AppState, Collaborators};

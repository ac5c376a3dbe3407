//! WebSocket support for live chat
//!
//! Provides the real-time channel between customers, agents and the chat core:
//! - Session membership (who is joined to which conversation)
//! - Message fanout to every joined connection
//! - Typing indicators and participant counts
//!
//! # Architecture
//!
//! - **Connection**: one open socket and the participant it joined as
//! - **Registry**: session membership bookkeeping
//! - **Hub**: connection table + registry behind one lock, send/broadcast
//! - **Handler**: Axum route handler and inbound frame dispatch
//! - **Events**: typed inbound frames and outbound events

pub mod connection;
pub mod events;
pub mod handler;
pub mod hub;
pub mod registry;

pub use connection::{ConnectionInfo, Participant};
pub use events::{ClientFrame, FrameError, ServerEvent};
pub use handler::{ws_handler, FrameDispatcher};
pub use hub::{ConnectionHub, HubError, HubStats, JoinOutcome};
pub use registry::SessionRegistry;

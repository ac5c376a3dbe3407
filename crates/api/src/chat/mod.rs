//! Chat core
//!
//! - **lifecycle**: the `waiting -> active -> closed` transition function
//! - **router**: fanout of persisted messages and session changes
//! - **assignment**: manual/automatic agent assignment and closing
//! - **service**: the message sending path and session reads

pub mod assignment;
pub mod lifecycle;
pub mod router;
pub mod service;

use uuid::Uuid;

use crate::store::AuditSink;

pub use assignment::{AssignmentEngine, AssignmentStrategy, FirstAvailable};
pub use lifecycle::SessionEvent;
pub use router::MessageRouter;
pub use service::{ChatService, OutgoingMessage};

/// Append to the audit trail without failing the triggering operation
pub(crate) async fn record_audit(
    audit: &dyn AuditSink,
    session_id: Uuid,
    action: &str,
    details: &str,
    actor_id: Option<Uuid>,
) {
    if let Err(e) = audit.append(session_id, action, details, actor_id).await {
        tracing::warn!(
            error = %e,
            session_id = %session_id,
            action = action,
            "Failed to write chat audit entry"
        );
    }
}

//! Chat session state machine
//!
//! `waiting --(auto assign | first agent message)--> active --(close)--> closed`
//!
//! `closed` is terminal. Manual assignment sets the agent but never moves the
//! status by itself.

use livechat_shared::{ChatError, ChatResult, ParticipantKind, SessionStatus};

/// Something that happened to a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    ManualAssign,
    AutoAssign,
    /// A message authored by the given participant kind
    Message(ParticipantKind),
    Close,
}

/// Compute the status a session moves to when `event` happens
///
/// `Ok(None)` means the event is allowed and leaves the status unchanged.
pub fn apply(current: SessionStatus, event: SessionEvent) -> ChatResult<Option<SessionStatus>> {
    use SessionEvent::*;
    use SessionStatus::*;

    match (current, event) {
        (Closed, Message(_)) => Err(ChatError::SessionClosed),
        (Closed, _) => Err(ChatError::AlreadyClosed),

        (Waiting, AutoAssign) | (Waiting, Message(ParticipantKind::Agent)) => Ok(Some(Active)),
        (_, Close) => Ok(Some(Closed)),

        (Waiting, _) | (Active, _) => Ok(None),
    }
}

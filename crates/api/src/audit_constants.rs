//! Chat audit trail constants
//! Prevents magic strings and keeps the `chat_logs.action` column consistent
//!
//! Every state change the chat core makes to a session is appended to that
//! session's audit trail using one of these action values.

/// Actions recorded in a session's audit trail
pub mod chat_action {
    /// First agent message moved a waiting session to active
    pub const RESPONSE: &str = "response";

    /// Agent assigned through the manual/admin path
    pub const ASSIGNED: &str = "assigned";

    /// Agent picked by the auto-assignment strategy
    pub const AUTO_ASSIGNED: &str = "auto_assigned";

    /// Session closed
    pub const CLOSED: &str = "closed";
}

/// Human-readable details stored alongside an action
pub mod chat_details {
    pub const AGENT_RESPONDED: &str = "Agent responded to chat";

    pub fn assigned(agent_name: &str) -> String {
        format!("Chat assigned to agent {agent_name}")
    }

    pub fn auto_assigned(agent_name: &str) -> String {
        format!("Chat automatically assigned to agent {agent_name}")
    }

    pub fn closed(reason: &str) -> String {
        if reason.trim().is_empty() {
            "Chat closed".to_string()
        } else {
            format!("Chat closed: {reason}")
        }
    }
}

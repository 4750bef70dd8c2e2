//! Streaming session state management

use std::time::Instant;

/// Session state machine
///
/// Represents the current state of a streaming session. State transitions
/// are validated so every writer goes through the same table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SessionState {
    /// Session is healthy and accepting frames
    Idle,

    /// A reconnect attempt is in flight; frames are dropped
    Reconnecting {
        /// When the attempt started
        since: Instant,
    },

    /// Session failed permanently and cannot be restarted
    Aborted,
}

impl SessionState {
    /// Check if this state transition is valid
    pub fn can_transition_to(&self, target: &SessionState) -> bool {
        use SessionState::*;

        match (self, target) {
            // From Idle
            (Idle, Idle) => true,
            (Idle, Reconnecting { .. }) => true,
            (Idle, Aborted) => true, // session close or reconnect ceiling

            // From Reconnecting
            (Reconnecting { .. }, Idle) => true,
            (Reconnecting { .. }, Aborted) => true,
            // single-flight: a second attempt cannot start while one runs
            (Reconnecting { .. }, Reconnecting { .. }) => false,

            // From Aborted - no transitions allowed
            (Aborted, _) => false,
        }
    }

    /// Get a human-readable description of this state
    pub fn description(&self) -> &'static str {
        match self {
            SessionState::Idle => "Idle",
            SessionState::Reconnecting { .. } => "Reconnecting",
            SessionState::Aborted => "Aborted",
        }
    }

    /// Check if the session is accepting and forwarding frames
    pub fn is_idle(&self) -> bool {
        matches!(self, SessionState::Idle)
    }

    /// Check if a reconnect attempt is in flight
    pub fn is_reconnecting(&self) -> bool {
        matches!(self, SessionState::Reconnecting { .. })
    }

    /// Check if the session has failed permanently
    pub fn is_aborted(&self) -> bool {
        matches!(self, SessionState::Aborted)
    }

    /// Get the duration the current reconnect attempt has been running
    pub fn reconnecting_duration(&self) -> Option<std::time::Duration> {
        if let SessionState::Reconnecting { since } = self {
            Some(since.elapsed())
        } else {
            None
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

//! Error types for EVMAuth core
//!
//! The taxonomy distinguishes:
//! - local validation failures (rejected before any write is attempted)
//! - ledger-side outcomes (not found, authoritative rejection)
//! - transport failures and undecodable records
//!
//! Read failures are always typed; callers never receive a placeholder record.

use crate::state_machine::AgentEvent;
use crate::types::AgentStatus;
use std::fmt;

/// Kind of ledger record an error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    /// Agent record
    Agent,
    /// Payment record
    Payment,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKind::Agent => f.write_str("agent"),
            RecordKind::Payment => f.write_str("payment"),
        }
    }
}

/// Main core error type
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    /// No account or session is bound
    #[error("wallet not connected")]
    NotConnected,

    /// Malformed address, non-positive amount, empty name
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Ledger tuple carried an out-of-range enum code or an impossible field
    #[error("malformed ledger record: {0}")]
    MalformedRecord(String),

    /// Id has no corresponding record
    #[error("{kind} {id} not found")]
    NotFound {
        /// Record kind that was looked up
        kind: RecordKind,
        /// Requested id
        id: String,
    },

    /// Transport or connectivity failure
    #[error("ledger unavailable: {0}")]
    Unavailable(String),

    /// Authoritative rejection, message preserved from its source
    #[error("rejected: {0}")]
    Rejected(String),

    /// Lifecycle edge that does not exist
    #[error("state machine error: {0}")]
    StateMachine(#[from] StateMachineError),

    /// Stopped waiting for a confirmation; the submitted operation is untouched
    #[error("confirmation not observed within {waited_ms}ms")]
    Timeout {
        /// How long the caller waited
        waited_ms: u64,
    },
}

impl CoreError {
    /// Build an `InvalidInput` error
    #[inline]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Build a `MalformedRecord` error
    #[inline]
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedRecord(message.into())
    }

    /// Build a `NotFound` error
    #[inline]
    pub fn not_found(kind: RecordKind, id: impl fmt::Display) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Stable snake_case discriminant, used on the wire
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotConnected => "not_connected",
            Self::InvalidInput(_) => "invalid_input",
            Self::MalformedRecord(_) => "malformed_record",
            Self::NotFound { .. } => "not_found",
            Self::Unavailable(_) => "unavailable",
            Self::Rejected(_) => "rejected",
            Self::StateMachine(_) => "illegal_transition",
            Self::Timeout { .. } => "timeout",
        }
    }

    /// Whether repeating the same read may succeed.
    ///
    /// Writes are never retried implicitly regardless of this flag.
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout { .. })
    }
}

/// Lifecycle state machine errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum StateMachineError {
    /// The agent table has no edge for this event
    #[error("agent cannot {event} while {from}")]
    IllegalTransition {
        /// State the agent was in
        from: AgentStatus,
        /// Event that was applied
        event: AgentEvent,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_display_names_kind_and_id() {
        let err = CoreError::not_found(RecordKind::Agent, 9999);
        assert_eq!(err.to_string(), "agent 9999 not found");
        assert_eq!(err.kind(), "not_found");
    }

    #[test]
    fn only_transport_failures_are_retryable() {
        assert!(CoreError::Unavailable("timeout".into()).is_retryable());
        assert!(CoreError::Timeout { waited_ms: 10 }.is_retryable());
        assert!(!CoreError::Rejected("Exceeds daily limit".into()).is_retryable());
        assert!(!CoreError::malformed("bad status").is_retryable());
    }

    #[test]
    fn rejected_preserves_message() {
        let err = CoreError::Rejected("execution reverted: Agent not active".into());
        assert!(err.to_string().ends_with("execution reverted: Agent not active"));
    }

    #[test]
    fn illegal_transition_display() {
        let err = StateMachineError::IllegalTransition {
            from: AgentStatus::Inactive,
            event: AgentEvent::Confirm,
        };
        assert_eq!(err.to_string(), "agent cannot confirm while inactive");
    }
}

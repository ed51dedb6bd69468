//! Lifecycle transitions shared by both adapters

use crate::error::StateMachineError;
use crate::types::{AgentStatus, PaymentStatus};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Events that move an agent through its lifecycle.
///
/// Confirmation is supplied by the driving adapter: a receipt in live mode,
/// an elapsed delay in simulation. The table itself holds no timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentEvent {
    /// Creation (or an explicit activation) was confirmed
    Confirm,
    /// Owner switched the agent off
    Deactivate,
}

impl fmt::Display for AgentEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentEvent::Confirm => f.write_str("confirm"),
            AgentEvent::Deactivate => f.write_str("deactivate"),
        }
    }
}

/// Events that resolve a pending payment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentEvent {
    /// Funds moved
    ConfirmSuccess,
    /// Rejected by the chain or by validation
    ConfirmFailure,
}

/// Outcome of applying an event to a state with a no-op rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition<S> {
    /// The state changed
    Applied {
        /// State before the event
        from: S,
        /// State after the event
        to: S,
    },
    /// Terminal state; the event was dropped
    Ignored {
        /// Unchanged state
        state: S,
    },
}

impl<S: Copy> Transition<S> {
    /// State after the event
    pub fn state(&self) -> S {
        match *self {
            Transition::Applied { to, .. } => to,
            Transition::Ignored { state } => state,
        }
    }

    /// Whether the state changed
    pub fn is_applied(&self) -> bool {
        matches!(self, Transition::Applied { .. })
    }
}

/// Outgoing agent edges.
///
/// `Inactive` has none today. Reactivation would be one more row here; nothing
/// else in the table assumes the state is final.
pub fn allowed_agent_transitions(from: AgentStatus) -> Vec<(AgentEvent, AgentStatus)> {
    use AgentStatus::*;
    match from {
        Pending => vec![(AgentEvent::Confirm, Active)],
        Active => vec![(AgentEvent::Deactivate, Inactive)],
        Inactive => vec![],
    }
}

/// Validates and applies an agent event.
pub fn transition_agent(
    from: AgentStatus,
    event: AgentEvent,
) -> Result<AgentStatus, StateMachineError> {
    allowed_agent_transitions(from)
        .into_iter()
        .find(|(e, _)| *e == event)
        .map(|(_, to)| to)
        .ok_or(StateMachineError::IllegalTransition { from, event })
}

/// Applies a payment confirmation. Terminal states ignore every event.
pub fn transition_payment(from: PaymentStatus, event: PaymentEvent) -> Transition<PaymentStatus> {
    use PaymentStatus::*;
    match (from, event) {
        (Pending, PaymentEvent::ConfirmSuccess) => Transition::Applied { from, to: Settled },
        (Pending, PaymentEvent::ConfirmFailure) => Transition::Applied { from, to: Failed },
        (Settled | Failed, _) => Transition::Ignored { state: from },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_happy_path() {
        let active = transition_agent(AgentStatus::Pending, AgentEvent::Confirm).unwrap();
        assert_eq!(active, AgentStatus::Active);
        let inactive = transition_agent(active, AgentEvent::Deactivate).unwrap();
        assert_eq!(inactive, AgentStatus::Inactive);
    }

    #[test]
    fn agent_rejects_missing_edges() {
        for (from, event) in [
            (AgentStatus::Pending, AgentEvent::Deactivate),
            (AgentStatus::Active, AgentEvent::Confirm),
            (AgentStatus::Inactive, AgentEvent::Confirm),
            (AgentStatus::Inactive, AgentEvent::Deactivate),
        ] {
            assert_eq!(
                transition_agent(from, event),
                Err(StateMachineError::IllegalTransition { from, event })
            );
        }
    }

    #[test]
    fn payment_resolves_once() {
        let settled = transition_payment(PaymentStatus::Pending, PaymentEvent::ConfirmSuccess);
        assert_eq!(
            settled,
            Transition::Applied {
                from: PaymentStatus::Pending,
                to: PaymentStatus::Settled
            }
        );

        let again = transition_payment(settled.state(), PaymentEvent::ConfirmFailure);
        assert!(!again.is_applied());
        assert_eq!(again.state(), PaymentStatus::Settled);
    }

    #[test]
    fn failed_is_terminal() {
        let failed = transition_payment(PaymentStatus::Pending, PaymentEvent::ConfirmFailure);
        assert_eq!(failed.state(), PaymentStatus::Failed);
        for event in [PaymentEvent::ConfirmSuccess, PaymentEvent::ConfirmFailure] {
            assert_eq!(
                transition_payment(PaymentStatus::Failed, event),
                Transition::Ignored {
                    state: PaymentStatus::Failed
                }
            );
        }
    }
}

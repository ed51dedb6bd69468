use evmauth_core::state_machine::{
    allowed_agent_transitions, transition_agent, transition_payment,
};
use evmauth_core::{AgentEvent, AgentStatus, PaymentEvent, PaymentStatus};
use proptest::prelude::*;

#[test]
fn test_inactive_has_no_outgoing_edges() {
    assert!(allowed_agent_transitions(AgentStatus::Inactive).is_empty());
}

proptest! {
    #[test]
    fn prop_agent_transitions_are_subset_of_allowed(
        from in prop_oneof![
            Just(AgentStatus::Pending),
            Just(AgentStatus::Active),
            Just(AgentStatus::Inactive),
        ],
        event in prop_oneof![Just(AgentEvent::Confirm), Just(AgentEvent::Deactivate)],
    ) {
        let allowed = allowed_agent_transitions(from);
        match transition_agent(from, event) {
            Ok(to) => prop_assert!(allowed.contains(&(event, to))),
            Err(_) => prop_assert!(allowed.iter().all(|(e, _)| *e != event)),
        }
    }

    #[test]
    fn prop_payment_changes_status_at_most_once(
        events in proptest::collection::vec(
            prop_oneof![Just(PaymentEvent::ConfirmSuccess), Just(PaymentEvent::ConfirmFailure)],
            1..10,
        ),
    ) {
        let mut status = PaymentStatus::Pending;
        let mut applied = 0;
        for event in &events {
            let t = transition_payment(status, *event);
            if t.is_applied() {
                applied += 1;
            }
            status = t.state();
        }
        prop_assert_eq!(applied, 1);
        let expected = match events[0] {
            PaymentEvent::ConfirmSuccess => PaymentStatus::Settled,
            PaymentEvent::ConfirmFailure => PaymentStatus::Failed,
        };
        prop_assert_eq!(status, expected);
    }
}

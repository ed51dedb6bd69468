//! Per-session record store
//!
//! The store is the authority in simulation mode:
//! - Agents keyed by id in creation order
//! - A bounded payment history, oldest dropped first
//! - Resolutions of submitted operations, observed by `await_confirmation`
//! - A broadcast channel carrying every [`LedgerEvent`]
//!
//! Once closed, every mutation is refused, including those fired by timers.

use alloy_primitives::Address;
use chrono::{DateTime, Utc};
use evmauth_core::{
    budget, Agent, AgentEvent, AgentId, AgentStatus, Amount, ConfirmationOutcome, CoreError, Did,
    LedgerEvent, NewAgent, OperationKind, Payment, PaymentEvent, PaymentId, PaymentRequest,
    PaymentStatus, RecordKind, RecordRef,
};
use indexmap::IndexMap;
use parking_lot::{RwLock, RwLockWriteGuard};
use std::collections::{HashMap, VecDeque};
use tokio::sync::{broadcast, Notify};
use tracing::debug;

const EVENT_CAPACITY: usize = 256;

/// How an operation resolved, with the events it produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Confirmed, or failed with a reason
    pub outcome: ConfirmationOutcome,
    /// Events reported with the confirmation
    pub events: Vec<LedgerEvent>,
}

impl Resolution {
    fn confirmed(events: Vec<LedgerEvent>) -> Self {
        Self {
            outcome: ConfirmationOutcome::Confirmed,
            events,
        }
    }
}

type OperationKey = (OperationKind, RecordRef);

struct StoreState {
    agents: IndexMap<AgentId, Agent>,
    payments: VecDeque<Payment>,
    next_agent: u64,
    next_payment: u64,
    history_limit: usize,
    resolutions: HashMap<OperationKey, Resolution>,
    closed: bool,
}

impl StoreState {
    fn contains(&self, record: RecordRef) -> bool {
        match record {
            RecordRef::Agent { id } => self.agents.contains_key(&id),
            RecordRef::Payment { id } => self.payments.iter().any(|p| p.id == id),
        }
    }

    fn owned_agent(&mut self, owner: Address, id: AgentId) -> Result<&mut Agent, CoreError> {
        let agent = self
            .agents
            .get_mut(&id)
            .ok_or_else(|| CoreError::not_found(RecordKind::Agent, id))?;
        if agent.owner != owner {
            return Err(CoreError::Rejected("Not agent owner".to_string()));
        }
        Ok(agent)
    }

    fn push_payment(&mut self, payment: Payment) {
        self.payments.push_back(payment);
        while self.payments.len() > self.history_limit {
            let Some(evicted) = self.payments.pop_front() else {
                break;
            };
            self.resolutions
                .remove(&(OperationKind::AuthorizePayment, RecordRef::Payment { id: evicted.id }));
            debug!(payment = %evicted.id, status = %evicted.status, "payment dropped from history");
        }
    }
}

fn created_event(agent: &Agent) -> LedgerEvent {
    LedgerEvent::AgentCreated {
        agent_id: agent.id,
        owner: agent.owner,
        name: agent.name.clone(),
        agent_type: agent.agent_type,
        max_daily_spend: agent.max_daily_spend,
    }
}

/// Records of one simulation session
pub struct SessionStore {
    state: RwLock<StoreState>,
    events: broadcast::Sender<LedgerEvent>,
    resolved: Notify,
}

impl SessionStore {
    /// Empty store keeping at most `history_limit` payments
    #[must_use]
    pub fn new(history_limit: usize) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: RwLock::new(StoreState {
                agents: IndexMap::new(),
                payments: VecDeque::new(),
                next_agent: 0,
                next_payment: 0,
                history_limit: history_limit.max(1),
                resolutions: HashMap::new(),
                closed: false,
            }),
            events,
            resolved: Notify::new(),
        }
    }

    /// Receive every event emitted after this call
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.events.subscribe()
    }

    /// Snapshot of one agent
    #[must_use]
    pub fn agent(&self, id: AgentId) -> Option<Agent> {
        self.state.read().agents.get(&id).cloned()
    }

    /// Snapshot of one retained payment
    #[must_use]
    pub fn payment(&self, id: PaymentId) -> Option<Payment> {
        self.state.read().payments.iter().find(|p| p.id == id).cloned()
    }

    /// Ids of `owner`'s agents in creation order
    #[must_use]
    pub fn agent_ids(&self, owner: Address) -> Vec<AgentId> {
        self.state
            .read()
            .agents
            .values()
            .filter(|a| a.owner == owner)
            .map(|a| a.id)
            .collect()
    }

    /// Ids of `owner`'s active agents in creation order
    #[must_use]
    pub fn active_agent_ids(&self, owner: Address) -> Vec<AgentId> {
        self.state
            .read()
            .agents
            .values()
            .filter(|a| a.owner == owner && a.is_selectable())
            .map(|a| a.id)
            .collect()
    }

    /// Ids of retained payments originated by `owner`'s agents, oldest first
    #[must_use]
    pub fn payment_ids(&self, owner: Address) -> Vec<PaymentId> {
        let state = self.state.read();
        state
            .payments
            .iter()
            .filter(|p| state.agents.get(&p.agent_id).is_some_and(|a| a.owner == owner))
            .map(|p| p.id)
            .collect()
    }

    /// Retained payment count
    #[must_use]
    pub fn payment_count(&self) -> usize {
        self.state.read().payments.len()
    }

    /// Whether the session has ended
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.read().closed
    }

    /// Refuse every further mutation and wake all waiters
    pub fn close(&self) {
        self.state.write().closed = true;
        self.resolved.notify_waiters();
    }

    fn open(&self) -> Result<RwLockWriteGuard<'_, StoreState>, CoreError> {
        let state = self.state.write();
        if state.closed {
            return Err(CoreError::Unavailable("simulation session closed".to_string()));
        }
        Ok(state)
    }

    fn emit(&self, events: &[LedgerEvent]) {
        for event in events {
            // No subscribers is fine
            let _ = self.events.send(event.clone());
        }
    }

    fn resolve(&self, state: &mut StoreState, key: OperationKey, resolution: Resolution) {
        state.resolutions.insert(key, resolution);
        self.resolved.notify_waiters();
    }

    /// Materialize a pending agent owned by `owner`
    pub(crate) fn insert_agent(
        &self,
        owner: Address,
        request: &NewAgent,
        now: DateTime<Utc>,
    ) -> Result<AgentId, CoreError> {
        let mut state = self.open()?;
        state.next_agent += 1;
        let id = AgentId(state.next_agent);
        let agent = Agent {
            id,
            name: request.name.clone(),
            agent_type: request.agent_type,
            did: Did::for_account(owner),
            max_daily_spend: request.max_daily_spend,
            daily_spent: Amount::ZERO,
            last_reset: now,
            status: AgentStatus::Pending,
            owner,
            created_at: now,
        };
        self.emit(&[created_event(&agent)]);
        state.agents.insert(id, agent);
        Ok(id)
    }

    /// Install a fully formed agent, keeping its status and id
    pub(crate) fn seed_agent(&self, agent: Agent) {
        let mut state = self.state.write();
        state.next_agent = state.next_agent.max(agent.id.0);
        state.agents.insert(agent.id, agent);
    }

    /// Install a fully formed payment, keeping its status and id
    pub(crate) fn seed_payment(&self, payment: Payment) {
        let mut state = self.state.write();
        state.next_payment = state.next_payment.max(payment.id.0);
        state.push_payment(payment);
    }

    /// Fire the `confirm` edge of a pending agent; no-op otherwise
    pub(crate) fn confirm_agent(&self, id: AgentId) -> bool {
        let Ok(mut guard) = self.open() else {
            return false;
        };
        let state = &mut *guard;
        let Some(agent) = state.agents.get_mut(&id) else {
            return false;
        };
        if agent.status != AgentStatus::Pending || agent.apply(AgentEvent::Confirm).is_err() {
            return false;
        }
        let events = vec![
            created_event(agent),
            LedgerEvent::AgentStatusUpdated {
                agent_id: id,
                new_status: AgentStatus::Active,
            },
        ];
        self.emit(&events[1..]);
        let key = (OperationKind::CreateAgent, RecordRef::Agent { id });
        self.resolve(state, key, Resolution::confirmed(events));
        true
    }

    /// Apply an owner-requested lifecycle event immediately
    pub(crate) fn transition_agent(
        &self,
        owner: Address,
        id: AgentId,
        event: AgentEvent,
    ) -> Result<AgentStatus, CoreError> {
        let mut guard = self.open()?;
        let state = &mut *guard;
        let agent = state.owned_agent(owner, id)?;
        let from = agent.status;
        let next = agent.apply(event)?;
        let status_event = LedgerEvent::AgentStatusUpdated {
            agent_id: id,
            new_status: next,
        };
        let created = created_event(agent);
        self.emit(std::slice::from_ref(&status_event));

        let kind = match event {
            AgentEvent::Confirm => OperationKind::ActivateAgent,
            AgentEvent::Deactivate => OperationKind::DeactivateAgent,
        };
        let record = RecordRef::Agent { id };
        if from == AgentStatus::Pending {
            // Early activation settles the creation as well
            let create_key = (OperationKind::CreateAgent, record);
            if !state.resolutions.contains_key(&create_key) {
                let events = vec![created, status_event.clone()];
                state.resolutions.insert(create_key, Resolution::confirmed(events));
            }
        }
        self.resolve(state, (kind, record), Resolution::confirmed(vec![status_event]));
        Ok(next)
    }

    pub(crate) fn update_max_daily_spend(
        &self,
        owner: Address,
        id: AgentId,
        new_max: Amount,
    ) -> Result<(), CoreError> {
        let mut guard = self.open()?;
        let state = &mut *guard;
        state.owned_agent(owner, id)?.max_daily_spend = new_max;
        let key = (OperationKind::UpdateMaxDailySpend, RecordRef::Agent { id });
        self.resolve(state, key, Resolution::confirmed(Vec::new()));
        Ok(())
    }

    /// Book a pending payment against the agent's window
    ///
    /// # Errors
    /// `Rejected` when the budget rule refuses it; nothing is booked.
    pub(crate) fn authorize(
        &self,
        owner: Address,
        request: &PaymentRequest,
        now: DateTime<Utc>,
    ) -> Result<PaymentId, CoreError> {
        let mut guard = self.open()?;
        let state = &mut *guard;
        let agent = state.owned_agent(owner, request.agent_id)?;
        budget::record_spend(agent, request.amount, now)?;
        let agent_name = agent.name.clone();

        state.next_payment += 1;
        let id = PaymentId(state.next_payment);
        state.push_payment(Payment {
            id,
            agent_id: request.agent_id,
            agent_name,
            recipient: request.recipient,
            amount: request.amount,
            status: PaymentStatus::Pending,
            timestamp: now,
            memo: request.memo.clone(),
        });
        self.emit(&[LedgerEvent::PaymentAuthorized {
            payment_id: id,
            agent_id: request.agent_id,
            recipient: request.recipient,
            amount: request.amount,
        }]);
        Ok(id)
    }

    /// Resolve a pending payment; failure refunds its spend
    ///
    /// Returns the new status, or `None` when nothing changed.
    pub(crate) fn resolve_payment(
        &self,
        id: PaymentId,
        settles: bool,
        now: DateTime<Utc>,
    ) -> Option<PaymentStatus> {
        let mut guard = self.open().ok()?;
        let state = &mut *guard;
        let payment = state.payments.iter_mut().find(|p| p.id == id)?;
        let event = if settles {
            PaymentEvent::ConfirmSuccess
        } else {
            PaymentEvent::ConfirmFailure
        };
        if !payment.apply(event).is_applied() {
            return None;
        }
        let payment = payment.clone();

        let authorized = LedgerEvent::PaymentAuthorized {
            payment_id: id,
            agent_id: payment.agent_id,
            recipient: payment.recipient,
            amount: payment.amount,
        };
        let resolution = if settles {
            let settled = LedgerEvent::PaymentSettled {
                payment_id: id,
                agent_id: payment.agent_id,
                recipient: payment.recipient,
                amount: payment.amount,
            };
            self.emit(std::slice::from_ref(&settled));
            Resolution::confirmed(vec![authorized, settled])
        } else {
            if let Some(agent) = state.agents.get_mut(&payment.agent_id) {
                budget::refund(agent, payment.amount, payment.timestamp, now);
            }
            Resolution {
                outcome: ConfirmationOutcome::Failed {
                    reason: "settlement failed".to_string(),
                },
                events: vec![authorized],
            }
        };
        let key = (OperationKind::AuthorizePayment, RecordRef::Payment { id });
        self.resolve(state, key, resolution);
        Some(payment.status)
    }

    /// Wait until the operation `(kind, record)` resolves
    ///
    /// # Errors
    /// `NotFound` when the record no longer exists and never resolved;
    /// `Unavailable` once the session is closed.
    pub async fn wait_for(&self, kind: OperationKind, record: RecordRef) -> Result<Resolution, CoreError> {
        loop {
            let notified = self.resolved.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let state = self.state.read();
                if let Some(resolution) = state.resolutions.get(&(kind, record)) {
                    return Ok(resolution.clone());
                }
                if state.closed {
                    return Err(CoreError::Unavailable("simulation session closed".to_string()));
                }
                if !state.contains(record) {
                    return Err(match record {
                        RecordRef::Agent { id } => CoreError::not_found(RecordKind::Agent, id),
                        RecordRef::Payment { id } => CoreError::not_found(RecordKind::Payment, id),
                    });
                }
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evmauth_core::AgentType;
    use evmauth_test_utils::{agent_fixture, amount, at, owner, recipient, EPOCH};

    fn request(agent_id: AgentId, value: &str) -> PaymentRequest {
        PaymentRequest {
            agent_id,
            recipient: recipient(),
            amount: amount(value),
            memo: None,
        }
    }

    #[test]
    fn test_history_drops_oldest_first() {
        let store = SessionStore::new(2);
        store.seed_agent(agent_fixture(1, "Alpha Trader", "1", "0", AgentStatus::Active));
        let now = at(EPOCH + 10);
        let ids: Vec<_> = ["0.01", "0.02", "0.03"]
            .iter()
            .map(|v| store.authorize(owner(), &request(AgentId(1), v), now).unwrap())
            .collect();

        assert_eq!(store.payment_count(), 2);
        assert!(store.payment(ids[0]).is_none());
        assert_eq!(store.payment_ids(owner()), vec![ids[1], ids[2]]);
    }

    #[test]
    fn test_authorize_is_strict() {
        let store = SessionStore::new(20);
        store.seed_agent(agent_fixture(1, "Alpha Trader", "0.5", "0.45", AgentStatus::Active));
        let now = at(EPOCH + 10);

        let err = store.authorize(owner(), &request(AgentId(1), "0.10"), now).unwrap_err();
        assert_eq!(err.kind(), "rejected");
        assert!(store.authorize(owner(), &request(AgentId(1), "0.05"), now).is_ok());
        assert_eq!(store.agent(AgentId(1)).unwrap().daily_spent, amount("0.5"));
    }

    #[test]
    fn test_payment_name_is_captured_at_authorization() {
        let store = SessionStore::new(20);
        store.seed_agent(agent_fixture(1, "Alpha Trader", "1", "0", AgentStatus::Active));
        let id = store.authorize(owner(), &request(AgentId(1), "0.01"), at(EPOCH)).unwrap();
        store.state.write().agents[0].name = "Renamed".to_string();
        assert_eq!(store.payment(id).unwrap().agent_name, "Alpha Trader");
    }

    #[test]
    fn test_failed_payment_refunds_window() {
        let store = SessionStore::new(20);
        store.seed_agent(agent_fixture(1, "Alpha Trader", "0.5", "0", AgentStatus::Active));
        let now = at(EPOCH + 10);
        let id = store.authorize(owner(), &request(AgentId(1), "0.2"), now).unwrap();

        assert_eq!(store.resolve_payment(id, false, now), Some(PaymentStatus::Failed));
        assert_eq!(store.agent(AgentId(1)).unwrap().daily_spent, Amount::ZERO);
        assert_eq!(store.resolve_payment(id, true, now), None);
        assert_eq!(store.payment(id).unwrap().status, PaymentStatus::Failed);
    }

    #[test]
    fn test_confirm_fires_only_from_pending() {
        let store = SessionStore::new(20);
        let id = store
            .insert_agent(
                owner(),
                &NewAgent {
                    name: "Content Bot".into(),
                    agent_type: AgentType::Content,
                    max_daily_spend: amount("0.1"),
                },
                at(EPOCH),
            )
            .unwrap();

        assert!(store.confirm_agent(id));
        assert!(!store.confirm_agent(id));
        assert_eq!(store.agent(id).unwrap().status, AgentStatus::Active);
    }

    #[test]
    fn test_closed_store_refuses_mutation() {
        let store = SessionStore::new(20);
        store.seed_agent(agent_fixture(1, "Alpha Trader", "1", "0", AgentStatus::Pending));
        store.close();

        assert!(!store.confirm_agent(AgentId(1)));
        let err = store
            .transition_agent(owner(), AgentId(1), AgentEvent::Confirm)
            .unwrap_err();
        assert_eq!(err.kind(), "unavailable");
        assert_eq!(store.agent(AgentId(1)).unwrap().status, AgentStatus::Pending);
    }
}

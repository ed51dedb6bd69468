//! Simulated [`AgentLedger`]
//!
//! Confirmation is elapsed time: a created agent is confirmed after
//! `agent_confirm_delay`, a payment resolves after `payment_confirm_delay`.
//! Each delay is its own timer tied to one record. The session is the budget
//! authority, so the rule is enforced strictly here.

use crate::config::SimulationConfig;
use crate::store::SessionStore;
use crate::synth;
use crate::timers::TimerGroup;
use alloy_primitives::Address;
use async_trait::async_trait;
use chrono::Utc;
use evmauth_core::{
    budget, Agent, AgentEvent, AgentId, AgentLedger, Amount, BackendMode, Confirmation, CoreError,
    LedgerEvent, NewAgent, OperationHandle, OperationKind, OperationRef, Payment, PaymentId,
    PaymentRequest, RecordKind, RecordRef,
};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, instrument};

struct Session {
    config: SimulationConfig,
    store: Arc<SessionStore>,
    timers: TimerGroup,
    rng: Mutex<StdRng>,
}

impl Session {
    fn schedule_agent_confirm(&self, id: AgentId) {
        let store = Arc::clone(&self.store);
        self.timers.schedule(self.config.agent_confirm_delay, move || {
            if store.confirm_agent(id) {
                info!(agent = %id, "agent confirmed");
            }
        });
    }

    /// Decide the outcome now so one seed yields one history
    fn schedule_payment_confirm(&self, id: PaymentId) {
        let settles = self.rng.lock().random::<f64>() >= self.config.failure_rate;
        let store = Arc::clone(&self.store);
        self.timers.schedule(self.config.payment_confirm_delay, move || {
            if let Some(status) = store.resolve_payment(id, settles, Utc::now()) {
                info!(payment = %id, %status, "payment resolved");
            }
        });
    }

    fn synthesize(&self) -> Option<PaymentId> {
        let owner = self.config.owner;
        let active = self.store.active_agent_ids(owner);
        let request = synth::plan_payment(&mut *self.rng.lock(), &active)?;
        match self.store.authorize(owner, &request, Utc::now()) {
            Ok(id) => {
                debug!(payment = %id, agent = %request.agent_id, amount = %request.amount, "synthesized payment");
                self.schedule_payment_confirm(id);
                Some(id)
            }
            Err(e) => {
                debug!(agent = %request.agent_id, amount = %request.amount, error = %e, "synthesized payment skipped");
                None
            }
        }
    }

    fn start_synthesis(self: &Arc<Self>, period: Duration) {
        let session: Weak<Self> = Arc::downgrade(self);
        self.timers.every(period, move || match session.upgrade() {
            Some(session) => {
                session.synthesize();
                true
            }
            None => false,
        });
    }

    fn shutdown(&self) {
        self.store.close();
        self.timers.cancel_all();
    }
}

/// In-memory ledger for one session
pub struct SimulationAdapter {
    session: Arc<Session>,
}

impl SimulationAdapter {
    /// Open a session, installing demo data and the synthesis loop as configured
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    /// `InvalidInput` when the configuration is out of range.
    pub fn start(config: SimulationConfig) -> Result<Self, CoreError> {
        config.validate()?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let store = Arc::new(SessionStore::new(config.history_limit));
        if config.seed_demo_data {
            synth::install_demo_data(&store, config.owner, Utc::now());
        }
        let session = Arc::new(Session {
            config,
            store,
            timers: TimerGroup::new(),
            rng: Mutex::new(rng),
        });
        if let Some(period) = session.config.synthesis_interval {
            session.start_synthesis(period);
        }
        info!(
            owner = %session.config.owner,
            demo = session.config.seed_demo_data,
            failure_rate = session.config.failure_rate,
            "simulation session started"
        );
        Ok(Self { session })
    }

    /// Settings the session started with
    #[must_use]
    pub fn config(&self) -> &SimulationConfig {
        &self.session.config
    }

    /// Records of this session
    #[must_use]
    pub fn store(&self) -> &Arc<SessionStore> {
        &self.session.store
    }

    /// Events emitted from now on
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.session.store.subscribe()
    }

    /// Synthesize one background payment immediately
    pub fn synthesize_payment(&self) -> Option<PaymentId> {
        self.session.synthesize()
    }

    /// End the session; no timer fires afterwards
    pub fn shutdown(&self) {
        if !self.session.timers.is_cancelled() {
            info!("simulation session closed");
        }
        self.session.shutdown();
    }

    fn owner(&self) -> Address {
        self.session.config.owner
    }
}

impl Drop for SimulationAdapter {
    fn drop(&mut self) {
        self.session.shutdown();
    }
}

#[async_trait]
impl AgentLedger for SimulationAdapter {
    fn mode(&self) -> BackendMode {
        BackendMode::Simulation
    }

    fn account(&self) -> Option<Address> {
        Some(self.owner())
    }

    async fn list_user_agent_ids(&self, owner: Address) -> Result<Vec<AgentId>, CoreError> {
        Ok(self.store().agent_ids(owner))
    }

    async fn get_agent(&self, id: AgentId) -> Result<Agent, CoreError> {
        self.store()
            .agent(id)
            .ok_or_else(|| CoreError::not_found(RecordKind::Agent, id))
    }

    async fn list_user_payment_ids(&self, owner: Address) -> Result<Vec<PaymentId>, CoreError> {
        Ok(self.store().payment_ids(owner))
    }

    async fn get_payment(&self, id: PaymentId) -> Result<Payment, CoreError> {
        self.store()
            .payment(id)
            .ok_or_else(|| CoreError::not_found(RecordKind::Payment, id))
    }

    async fn remaining_daily_budget(&self, id: AgentId) -> Result<Amount, CoreError> {
        let agent = self.get_agent(id).await?;
        Ok(budget::remaining_budget(&agent, Utc::now()))
    }

    #[instrument(level = "info", skip(self, request), fields(name = %request.name))]
    async fn create_agent(&self, request: NewAgent) -> Result<OperationHandle, CoreError> {
        let name = request.name.trim();
        if name.is_empty() {
            return Err(CoreError::invalid_input("agent name must not be empty"));
        }
        let request = NewAgent {
            name: name.to_string(),
            ..request
        };
        let id = self.store().insert_agent(self.owner(), &request, Utc::now())?;
        self.session.schedule_agent_confirm(id);
        info!(agent = %id, "agent created, pending confirmation");
        Ok(OperationHandle::simulated(
            OperationKind::CreateAgent,
            RecordRef::Agent { id },
        ))
    }

    #[instrument(level = "info", skip(self))]
    async fn activate_agent(&self, id: AgentId) -> Result<OperationHandle, CoreError> {
        self.store().transition_agent(self.owner(), id, AgentEvent::Confirm)?;
        Ok(OperationHandle::simulated(
            OperationKind::ActivateAgent,
            RecordRef::Agent { id },
        ))
    }

    #[instrument(level = "info", skip(self))]
    async fn deactivate_agent(&self, id: AgentId) -> Result<OperationHandle, CoreError> {
        self.store().transition_agent(self.owner(), id, AgentEvent::Deactivate)?;
        Ok(OperationHandle::simulated(
            OperationKind::DeactivateAgent,
            RecordRef::Agent { id },
        ))
    }

    #[instrument(level = "info", skip(self))]
    async fn update_max_daily_spend(
        &self,
        id: AgentId,
        new_max: Amount,
    ) -> Result<OperationHandle, CoreError> {
        self.store().update_max_daily_spend(self.owner(), id, new_max)?;
        Ok(OperationHandle::simulated(
            OperationKind::UpdateMaxDailySpend,
            RecordRef::Agent { id },
        ))
    }

    #[instrument(level = "info", skip(self, request), fields(agent = %request.agent_id, amount = %request.amount))]
    async fn authorize_payment(&self, request: PaymentRequest) -> Result<OperationHandle, CoreError> {
        if request.amount.is_zero() {
            return Err(CoreError::invalid_input("amount must be greater than zero"));
        }
        let id = self.store().authorize(self.owner(), &request, Utc::now())?;
        self.session.schedule_payment_confirm(id);
        info!(payment = %id, "payment authorized, pending settlement");
        Ok(OperationHandle::simulated(
            OperationKind::AuthorizePayment,
            RecordRef::Payment { id },
        ))
    }

    async fn await_confirmation(
        &self,
        handle: &OperationHandle,
        timeout: Duration,
    ) -> Result<Confirmation, CoreError> {
        let OperationRef::Simulated { record } = handle.reference else {
            return Err(CoreError::invalid_input(
                "transaction handles are not served by a simulation session",
            ));
        };
        let resolution = tokio::time::timeout(timeout, self.store().wait_for(handle.kind, record))
            .await
            .map_err(|_| CoreError::Timeout {
                waited_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            })??;
        Ok(Confirmation {
            operation: handle.clone(),
            outcome: resolution.outcome,
            events: resolution.events,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evmauth_core::{AgentStatus, AgentType, ConfirmationOutcome, PaymentStatus};
    use evmauth_test_utils::{amount, recipient};
    use pretty_assertions::assert_eq;

    fn quiet() -> SimulationConfig {
        SimulationConfig::default().with_synthesis_interval(None).with_seed(1)
    }

    fn new_agent(name: &str, max: &str) -> NewAgent {
        NewAgent {
            name: name.into(),
            agent_type: AgentType::Trading,
            max_daily_spend: amount(max),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_agent_confirms_after_delay() {
        let sim = SimulationAdapter::start(quiet()).unwrap();
        let handle = sim.create_agent(new_agent("Alpha Trader", "0.5")).await.unwrap();
        let OperationRef::Simulated { record: RecordRef::Agent { id } } = handle.reference else {
            panic!("unexpected handle {handle:?}");
        };
        assert_eq!(sim.get_agent(id).await.unwrap().status, AgentStatus::Pending);

        tokio::time::sleep(Duration::from_millis(2_900)).await;
        assert_eq!(sim.get_agent(id).await.unwrap().status, AgentStatus::Pending);

        let confirmation = sim
            .await_confirmation(&handle, Duration::from_secs(1))
            .await
            .unwrap();
        assert!(confirmation.is_confirmed());
        assert_eq!(sim.get_agent(id).await.unwrap().status, AgentStatus::Active);
    }

    #[tokio::test(start_paused = true)]
    async fn test_early_activation_preempts_timer() {
        let sim = SimulationAdapter::start(quiet()).unwrap();
        let mut events = sim.subscribe();
        let handle = sim.create_agent(new_agent("Alpha Trader", "0.5")).await.unwrap();
        let id = AgentId(1);

        sim.activate_agent(id).await.unwrap();
        let confirmation = sim.await_confirmation(&handle, Duration::ZERO).await;
        assert!(confirmation.unwrap().is_confirmed());

        tokio::time::sleep(Duration::from_secs(10)).await;
        let mut status_updates = 0;
        while let Ok(event) = events.try_recv() {
            if matches!(event, LedgerEvent::AgentStatusUpdated { .. }) {
                status_updates += 1;
            }
        }
        assert_eq!(status_updates, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_illegal_lifecycle_edges_are_errors() {
        let sim = SimulationAdapter::start(quiet()).unwrap();
        sim.create_agent(new_agent("Alpha Trader", "0.5")).await.unwrap();

        let err = sim.deactivate_agent(AgentId(1)).await.unwrap_err();
        assert_eq!(err.kind(), "illegal_transition");

        sim.activate_agent(AgentId(1)).await.unwrap();
        sim.deactivate_agent(AgentId(1)).await.unwrap();
        let err = sim.activate_agent(AgentId(1)).await.unwrap_err();
        assert_eq!(err.kind(), "illegal_transition");
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_injection_drives_failed_state() {
        let sim = SimulationAdapter::start(quiet().with_failure_rate(1.0).with_demo_data(true)).unwrap();
        let handle = sim
            .authorize_payment(PaymentRequest {
                agent_id: AgentId(3),
                recipient: recipient(),
                amount: amount("0.04"),
                memo: None,
            })
            .await
            .unwrap();
        let before = sim.remaining_daily_budget(AgentId(3)).await.unwrap();
        assert_eq!(before, amount("0.06"));

        let confirmation = sim
            .await_confirmation(&handle, Duration::from_secs(10))
            .await
            .unwrap();
        assert!(matches!(confirmation.outcome, ConfirmationOutcome::Failed { .. }));
        assert_eq!(sim.get_payment(PaymentId(4)).await.unwrap().status, PaymentStatus::Failed);
        assert_eq!(sim.remaining_daily_budget(AgentId(3)).await.unwrap(), amount("0.1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_amount_is_invalid_input() {
        let sim = SimulationAdapter::start(quiet().with_demo_data(true)).unwrap();
        let err = sim
            .authorize_payment(PaymentRequest {
                agent_id: AgentId(1),
                recipient: recipient(),
                amount: Amount::ZERO,
                memo: None,
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_input");
    }

    #[tokio::test(start_paused = true)]
    async fn test_transaction_handles_are_refused() {
        let sim = SimulationAdapter::start(quiet()).unwrap();
        let handle = OperationHandle::transaction(OperationKind::CreateAgent, Default::default());
        let err = sim
            .await_confirmation(&handle, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_input");
    }
}

//! Query facade over either ledger backend
//!
//! [`AgentService`] is the single entry point for the HTTP surface and the
//! CLI. It keeps a read-through cache of agent records, invalidated after
//! every mutation and every observed confirmation, and never reports a
//! state the ledger has not confirmed.
//!
//! Listings and dashboards always re-query the ledger and refill the cache,
//! since confirm timers, mined receipts and synthesized payments change
//! records without going through the facade.

use crate::config::CacheConfig;
use alloy_primitives::Address;
use evmauth_core::{
    budget, Agent, AgentId, AgentLedger, Amount, BackendMode, Confirmation, CoreError,
    DashboardStats, LedgerEvent, NewAgent, OperationHandle, OperationRef, Payment, PaymentId,
    PaymentRequest, RecordRef,
};
use futures::future::try_join_all;
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, instrument, warn};

/// What the facade does with the local budget rule before submitting a payment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetPolicy {
    /// Log a warning and submit anyway; the ledger decides
    #[default]
    Advisory,
    /// Refuse locally
    Strict,
}

/// Everything a dashboard shows for one owner
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dashboard {
    /// Owner's agents in id order
    pub agents: Vec<Agent>,
    /// Most recent first
    pub payments: Vec<Payment>,
    /// Aggregates over the two lists
    pub stats: DashboardStats,
}

/// Cached facade over an [`AgentLedger`] that applies the budget policy
#[derive(Clone)]
pub struct AgentService {
    ledger: Arc<dyn AgentLedger>,
    agents: Cache<AgentId, Agent>,
    policy: BudgetPolicy,
}

impl AgentService {
    /// Facade over `ledger` with an empty agent cache
    #[must_use]
    pub fn new(ledger: Arc<dyn AgentLedger>, cache: CacheConfig, policy: BudgetPolicy) -> Self {
        Self {
            ledger,
            agents: Cache::builder()
                .max_capacity(cache.capacity)
                .time_to_live(cache.ttl())
                .build(),
            policy,
        }
    }

    /// Drop cached agents as the backend reports changes to them.
    ///
    /// The follower task ends when the feed closes. Must be called from
    /// within a tokio runtime.
    #[must_use]
    pub fn with_event_feed(self, mut events: broadcast::Receiver<LedgerEvent>) -> Self {
        let agents = self.agents.clone();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => agents.invalidate(&changed_agent(&event)).await,
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(skipped, "event feed lagged, dropping cached agents");
                        agents.invalidate_all();
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
        self
    }

    /// Backend behind the facade
    #[inline]
    #[must_use]
    pub fn ledger(&self) -> &Arc<dyn AgentLedger> {
        &self.ledger
    }

    /// Backend mode
    #[inline]
    #[must_use]
    pub fn mode(&self) -> BackendMode {
        self.ledger.mode()
    }

    /// Pre-submission budget policy
    #[inline]
    #[must_use]
    pub fn policy(&self) -> BudgetPolicy {
        self.policy
    }

    /// Account bound to the backend, if any
    #[must_use]
    pub fn account(&self) -> Option<Address> {
        self.ledger.account()
    }

    /// Agent by id, served from the cache when fresh
    ///
    /// # Errors
    /// The ledger's typed read failure; nothing is cached on error.
    pub async fn agent(&self, id: AgentId) -> Result<Agent, CoreError> {
        let ledger = Arc::clone(&self.ledger);
        self.agents
            .try_get_with(id, async move { ledger.get_agent(id).await })
            .await
            .map_err(|e| (*e).clone())
    }

    /// Re-query one agent and replace its cache entry
    async fn refresh_agent(&self, id: AgentId) -> Result<Agent, CoreError> {
        let agent = self.ledger.get_agent(id).await?;
        self.agents.insert(id, agent.clone()).await;
        Ok(agent)
    }

    /// # Errors
    /// The ledger's typed read failure.
    pub async fn payment(&self, id: PaymentId) -> Result<Payment, CoreError> {
        self.ledger.get_payment(id).await
    }

    /// `owner`'s agents in creation order, read from the ledger
    ///
    /// # Errors
    /// The first failing read; no partial list is returned.
    #[instrument(level = "debug", skip(self))]
    pub async fn list_agents(&self, owner: Address) -> Result<Vec<Agent>, CoreError> {
        let ids = self.ledger.list_user_agent_ids(owner).await?;
        try_join_all(ids.into_iter().map(|id| self.refresh_agent(id))).await
    }

    /// `owner`'s payments, most recent first
    ///
    /// # Errors
    /// The first failing read; no partial list is returned.
    #[instrument(level = "debug", skip(self))]
    pub async fn list_payments(&self, owner: Address) -> Result<Vec<Payment>, CoreError> {
        let ids = self.ledger.list_user_payment_ids(owner).await?;
        try_join_all(ids.into_iter().rev().map(|id| self.ledger.get_payment(id))).await
    }

    /// Records plus statistics reduced from exactly those records
    ///
    /// # Errors
    /// The first failing read.
    pub async fn dashboard(&self, owner: Address) -> Result<Dashboard, CoreError> {
        let (agents, payments) =
            futures::try_join!(self.list_agents(owner), self.list_payments(owner))?;
        let stats = DashboardStats::from_records(&agents, &payments);
        Ok(Dashboard {
            agents,
            payments,
            stats,
        })
    }

    /// # Errors
    /// The ledger's typed read failure.
    pub async fn remaining_budget(&self, id: AgentId) -> Result<Amount, CoreError> {
        self.ledger.remaining_daily_budget(id).await
    }

    /// # Errors
    /// `InvalidInput` for an empty name; otherwise the backend's failure.
    pub async fn create_agent(&self, request: NewAgent) -> Result<OperationHandle, CoreError> {
        if request.name.trim().is_empty() {
            return Err(CoreError::invalid_input("agent name must not be empty"));
        }
        let handle = self.ledger.create_agent(request).await?;
        info!(kind = ?handle.kind, "agent creation submitted");
        Ok(handle)
    }

    /// # Errors
    /// The backend's failure, message preserved.
    pub async fn activate_agent(&self, id: AgentId) -> Result<OperationHandle, CoreError> {
        let result = self.ledger.activate_agent(id).await;
        self.agents.invalidate(&id).await;
        result
    }

    /// # Errors
    /// The backend's failure, message preserved.
    pub async fn deactivate_agent(&self, id: AgentId) -> Result<OperationHandle, CoreError> {
        let result = self.ledger.deactivate_agent(id).await;
        self.agents.invalidate(&id).await;
        result
    }

    /// # Errors
    /// The backend's failure, message preserved.
    pub async fn update_max_daily_spend(
        &self,
        id: AgentId,
        new_max: Amount,
    ) -> Result<OperationHandle, CoreError> {
        let result = self.ledger.update_max_daily_spend(id, new_max).await;
        self.agents.invalidate(&id).await;
        result
    }

    /// Evaluate the budget rule under the configured policy, then submit
    ///
    /// # Errors
    /// `InvalidInput` for a zero amount, `Rejected` under [`BudgetPolicy::Strict`]
    /// when the rule refuses, otherwise the backend's failure.
    #[instrument(level = "info", skip(self, request), fields(agent = %request.agent_id, amount = %request.amount))]
    pub async fn authorize_payment(
        &self,
        request: PaymentRequest,
    ) -> Result<OperationHandle, CoreError> {
        if request.amount.is_zero() {
            return Err(CoreError::invalid_input("amount must be greater than zero"));
        }
        let agent_id = request.agent_id;
        self.agents.invalidate(&agent_id).await;
        let agent = self.agent(agent_id).await?;
        if let Err(violation) = budget::check_authorization(&agent, request.amount, chrono::Utc::now()) {
            match self.policy {
                BudgetPolicy::Strict => return Err(violation.into()),
                BudgetPolicy::Advisory => {
                    warn!(%violation, "budget rule refuses payment, submitting for the ledger to decide");
                }
            }
        }
        let result = self.ledger.authorize_payment(request).await;
        self.agents.invalidate(&agent_id).await;
        result
    }

    /// Wait for `handle` and drop whatever it may have changed from the cache
    ///
    /// # Errors
    /// `Timeout` when the wait elapses; the operation itself is untouched.
    pub async fn await_confirmation(
        &self,
        handle: &OperationHandle,
        timeout: Duration,
    ) -> Result<Confirmation, CoreError> {
        let confirmation = self.ledger.await_confirmation(handle, timeout).await?;
        match handle.reference {
            OperationRef::Simulated {
                record: RecordRef::Agent { id },
            } => self.agents.invalidate(&id).await,
            _ => self.agents.invalidate_all(),
        }
        debug!(kind = ?handle.kind, confirmed = confirmation.is_confirmed(), "confirmation observed");
        Ok(confirmation)
    }
}

/// Agent whose record an event changes; payments move the spend window
fn changed_agent(event: &LedgerEvent) -> AgentId {
    match event {
        LedgerEvent::AgentCreated { agent_id, .. }
        | LedgerEvent::AgentStatusUpdated { agent_id, .. }
        | LedgerEvent::PaymentAuthorized { agent_id, .. }
        | LedgerEvent::PaymentSettled { agent_id, .. } => *agent_id,
    }
}

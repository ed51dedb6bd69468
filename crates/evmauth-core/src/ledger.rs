//! Backend seam shared by the live and simulated adapters
//!
//! Both adapters produce the same records, drive the same state machine and
//! report the same events. Writes return an [`OperationHandle`] immediately;
//! confirmation is observed separately through
//! [`AgentLedger::await_confirmation`].

use crate::amount::Amount;
use crate::error::CoreError;
use crate::types::{Agent, AgentId, AgentStatus, AgentType, Payment, PaymentId};
use alloy_primitives::{Address, B256};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Which adapter is serving the records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendMode {
    /// Contract on a live chain
    Live,
    /// In-memory session with local timers
    Simulation,
}

/// Owner intent for a new agent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAgent {
    /// Non-empty display name
    pub name: String,
    /// Specialization
    pub agent_type: AgentType,
    /// Spend cap per accounting window
    pub max_daily_spend: Amount,
}

/// Payment to authorize on behalf of an agent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRequest {
    /// Originating agent
    pub agent_id: AgentId,
    /// Destination account
    pub recipient: Address,
    /// Positive amount, attached as value
    pub amount: Amount,
    /// Optional annotation
    pub memo: Option<String>,
}

/// Kind of submitted write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// `createAgent`
    CreateAgent,
    /// `activateAgent`
    ActivateAgent,
    /// `deactivateAgent`
    DeactivateAgent,
    /// `updateMaxDailySpend`
    UpdateMaxDailySpend,
    /// `authorizePayment`
    AuthorizePayment,
}

/// Record targeted by a simulated operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecordRef {
    /// An agent record
    Agent {
        /// Agent id
        id: AgentId,
    },
    /// A payment record
    Payment {
        /// Payment id
        id: PaymentId,
    },
}

/// What a handle points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "via", rename_all = "snake_case")]
pub enum OperationRef {
    /// Submitted transaction
    Transaction {
        /// Transaction hash
        hash: B256,
    },
    /// Record in a simulation session
    Simulated {
        /// Record the write targets
        record: RecordRef,
    },
}

/// Submitted, not yet confirmed, write
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationHandle {
    /// Which write was submitted
    pub kind: OperationKind,
    /// Where to look for its confirmation
    pub reference: OperationRef,
    /// Local submission time
    pub submitted_at: DateTime<Utc>,
}

impl OperationHandle {
    /// Handle for a submitted transaction
    #[must_use]
    pub fn transaction(kind: OperationKind, hash: B256) -> Self {
        Self {
            kind,
            reference: OperationRef::Transaction { hash },
            submitted_at: Utc::now(),
        }
    }

    /// Handle for a simulated record
    #[must_use]
    pub fn simulated(kind: OperationKind, record: RecordRef) -> Self {
        Self {
            kind,
            reference: OperationRef::Simulated { record },
            submitted_at: Utc::now(),
        }
    }
}

/// Contract events, decoded from receipts or emitted by the simulation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum LedgerEvent {
    #[serde(rename_all = "camelCase")]
    /// A new agent was recorded as pending
    AgentCreated {
        /// New agent
        agent_id: AgentId,
        /// Controlling account
        owner: Address,
        /// Display name
        name: String,
        /// Agent kind
        agent_type: AgentType,
        /// Initial daily cap
        max_daily_spend: Amount,
    },
    #[serde(rename_all = "camelCase")]
    /// An agent moved along its lifecycle
    AgentStatusUpdated {
        /// Agent that changed
        agent_id: AgentId,
        /// Status after the change
        new_status: AgentStatus,
    },
    #[serde(rename_all = "camelCase")]
    /// A payment was booked against an agent's budget
    PaymentAuthorized {
        /// New payment
        payment_id: PaymentId,
        /// Originating agent
        agent_id: AgentId,
        /// Destination account
        recipient: Address,
        /// Value moved
        amount: Amount,
    },
    #[serde(rename_all = "camelCase")]
    /// Funds reached the recipient
    PaymentSettled {
        /// Settled payment
        payment_id: PaymentId,
        /// Originating agent
        agent_id: AgentId,
        /// Destination account
        recipient: Address,
        /// Value moved
        amount: Amount,
    },
}

/// How a submitted operation resolved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ConfirmationOutcome {
    /// The write took effect
    Confirmed,
    /// The write was mined or resolved without effect
    Failed {
        /// Ledger or simulation explanation
        reason: String,
    },
}

/// Observed confirmation of one operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Confirmation {
    /// Operation that resolved
    pub operation: OperationHandle,
    /// How it resolved
    #[serde(flatten)]
    pub outcome: ConfirmationOutcome,
    /// Events the operation emitted, in order
    pub events: Vec<LedgerEvent>,
}

impl Confirmation {
    /// Whether the write took effect
    #[inline]
    #[must_use]
    pub fn is_confirmed(&self) -> bool {
        matches!(self.outcome, ConfirmationOutcome::Confirmed)
    }
}

/// Read and write operations over the authoritative agent/payment store.
///
/// Id listings preserve ledger (creation) order; implementations never reorder.
#[async_trait]
pub trait AgentLedger: Send + Sync {
    /// Which adapter this is
    fn mode(&self) -> BackendMode;

    /// Account writes are issued from, if one is bound
    fn account(&self) -> Option<Address>;

    /// Agent ids owned by `owner`, creation order
    async fn list_user_agent_ids(&self, owner: Address) -> Result<Vec<AgentId>, CoreError>;

    /// One agent record
    async fn get_agent(&self, id: AgentId) -> Result<Agent, CoreError>;

    /// Payment ids authorized by `owner`, creation order
    async fn list_user_payment_ids(&self, owner: Address) -> Result<Vec<PaymentId>, CoreError>;

    /// One payment record
    async fn get_payment(&self, id: PaymentId) -> Result<Payment, CoreError>;

    /// Budget left in the agent's current accounting window
    async fn remaining_daily_budget(&self, id: AgentId) -> Result<Amount, CoreError>;

    /// Submit a new agent for `account()`
    async fn create_agent(&self, request: NewAgent) -> Result<OperationHandle, CoreError>;

    /// Submit the `confirm` edge for a pending agent
    async fn activate_agent(&self, id: AgentId) -> Result<OperationHandle, CoreError>;

    /// Submit the `deactivate` edge
    async fn deactivate_agent(&self, id: AgentId) -> Result<OperationHandle, CoreError>;

    /// Submit a new daily cap
    async fn update_max_daily_spend(
        &self,
        id: AgentId,
        new_max: Amount,
    ) -> Result<OperationHandle, CoreError>;

    /// Submit a payment; the ledger has the last word on the budget
    async fn authorize_payment(&self, request: PaymentRequest) -> Result<OperationHandle, CoreError>;

    /// Wait until `handle` resolves.
    ///
    /// # Errors
    /// `Timeout` once `timeout` elapses; the operation itself is unaffected.
    async fn await_confirmation(
        &self,
        handle: &OperationHandle,
        timeout: Duration,
    ) -> Result<Confirmation, CoreError>;
}

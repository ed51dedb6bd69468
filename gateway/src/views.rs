//! Wire shapes served to the rendering layer

use crate::service::Dashboard;
use chrono::{DateTime, Utc};
use evmauth_core::{
    Agent, AgentId, AgentStatus, AgentType, Amount, DashboardStats, Did, OperationHandle, Payment,
    PaymentId, PaymentStatus,
};
use serde::{Deserialize, Serialize};

/// `GET /agent/{id}` body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentView {
    /// Decimal id
    pub id: AgentId,
    /// Display name
    pub name: String,
    /// Agent category
    #[serde(rename = "type")]
    pub agent_type: AgentType,
    /// Owner DID
    pub did: Did,
    /// Daily budget in tokens
    pub max_daily_spend: Amount,
    /// Lifecycle state
    pub status: AgentStatus,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl From<Agent> for AgentView {
    fn from(agent: Agent) -> Self {
        Self {
            id: agent.id,
            name: agent.name,
            agent_type: agent.agent_type,
            did: agent.did,
            max_daily_spend: agent.max_daily_spend,
            status: agent.status,
            created_at: agent.created_at,
        }
    }
}

/// `GET /payment/{id}` body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentView {
    /// Decimal id
    pub id: PaymentId,
    /// Name of the paying agent
    pub agent_name: String,
    /// Checksummed
    pub recipient: String,
    /// Value in tokens
    pub amount: Amount,
    /// Settlement state
    pub status: PaymentStatus,
    /// Authorization time
    pub timestamp: DateTime<Utc>,
    /// Free-text note
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
}

impl From<Payment> for PaymentView {
    fn from(payment: Payment) -> Self {
        Self {
            id: payment.id,
            agent_name: payment.agent_name,
            recipient: payment.recipient.to_checksum(None),
            amount: payment.amount,
            status: payment.status,
            timestamp: payment.timestamp,
            memo: payment.memo,
        }
    }
}

/// `GET /owners/{owner}/dashboard` body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardView {
    /// Owner's agents in id order
    pub agents: Vec<AgentView>,
    /// Owner's payments, most recent first
    pub payments: Vec<PaymentView>,
    /// Aggregates over both lists
    pub stats: DashboardStats,
}

impl From<Dashboard> for DashboardView {
    fn from(dashboard: Dashboard) -> Self {
        Self {
            agents: dashboard.agents.into_iter().map(AgentView::from).collect(),
            payments: dashboard.payments.into_iter().map(PaymentView::from).collect(),
            stats: dashboard.stats,
        }
    }
}

/// `202 Accepted` body for every mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmittedView {
    /// Always `submitted`
    pub status: String,
    /// Handle to poll for confirmation
    pub operation: OperationHandle,
}

impl From<OperationHandle> for SubmittedView {
    fn from(operation: OperationHandle) -> Self {
        Self {
            status: "submitted".to_string(),
            operation,
        }
    }
}

/// `POST /agents` body
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAgentBody {
    /// Display name
    pub name: String,
    /// Agent category
    #[serde(rename = "type")]
    pub agent_type: AgentType,
    /// Decimal token amount
    pub max_daily_spend: String,
}

/// `POST /agent/{id}/max-daily-spend` body
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMaxBody {
    /// New decimal token amount
    pub max_daily_spend: String,
}

/// `POST /payments` body
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizePaymentBody {
    /// Decimal agent id
    pub agent_id: String,
    /// Hex address
    pub recipient: String,
    /// Decimal token amount
    pub amount: String,
    /// Optional note stored with the payment
    #[serde(default)]
    pub memo: Option<String>,
}

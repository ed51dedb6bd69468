//! Dashboard aggregates
//!
//! Pure reductions over the current record collections, recomputed on every
//! read.

use crate::amount::Amount;
use crate::types::{Agent, AgentStatus, Payment, PaymentStatus};
use serde::{Deserialize, Serialize};

/// Derived dashboard statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    /// Agents currently `active`
    pub active_agents: usize,
    /// Sum of settled payment amounts
    pub total_volume: Amount,
    /// All payments, any status
    pub total_payments: usize,
    /// Payments awaiting confirmation
    pub pending_payments: usize,
}

impl DashboardStats {
    /// Reduce the given records
    #[must_use]
    pub fn from_records(agents: &[Agent], payments: &[Payment]) -> Self {
        Self {
            active_agents: agents
                .iter()
                .filter(|a| a.status == AgentStatus::Active)
                .count(),
            total_volume: payments
                .iter()
                .filter(|p| p.status == PaymentStatus::Settled)
                .map(|p| p.amount)
                .sum(),
            total_payments: payments.len(),
            pending_payments: payments
                .iter()
                .filter(|p| p.status == PaymentStatus::Pending)
                .count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AgentId, AgentType, Did, PaymentId};
    use alloy_primitives::Address;
    use chrono::Utc;

    fn payment(id: u64, amount: &str, status: PaymentStatus) -> Payment {
        Payment {
            id: PaymentId(id),
            agent_id: AgentId(1),
            agent_name: "Alpha Trader".into(),
            recipient: Address::ZERO,
            amount: Amount::parse_decimal(amount).unwrap(),
            status,
            timestamp: Utc::now(),
            memo: None,
        }
    }

    fn agent(id: u64, status: AgentStatus) -> Agent {
        let now = Utc::now();
        Agent {
            id: AgentId(id),
            name: format!("agent-{id}"),
            agent_type: AgentType::Analytics,
            did: Did::for_account(Address::ZERO),
            max_daily_spend: Amount::parse_decimal("1").unwrap(),
            daily_spent: Amount::ZERO,
            last_reset: now,
            status,
            owner: Address::ZERO,
            created_at: now,
        }
    }

    #[test]
    fn stats_count_only_matching_records() {
        let agents = vec![
            agent(1, AgentStatus::Active),
            agent(2, AgentStatus::Pending),
            agent(3, AgentStatus::Active),
            agent(4, AgentStatus::Inactive),
        ];
        let payments = vec![
            payment(1, "0.05", PaymentStatus::Settled),
            payment(2, "0.02", PaymentStatus::Settled),
            payment(3, "0.5", PaymentStatus::Failed),
            payment(4, "0.08", PaymentStatus::Pending),
        ];

        let stats = DashboardStats::from_records(&agents, &payments);
        assert_eq!(stats.active_agents, 2);
        assert_eq!(stats.total_volume.to_string(), "0.07");
        assert_eq!(stats.total_payments, 4);
        assert_eq!(stats.pending_payments, 1);
    }

    #[test]
    fn empty_collections_reduce_to_zero() {
        assert_eq!(DashboardStats::from_records(&[], &[]), DashboardStats::default());
    }
}

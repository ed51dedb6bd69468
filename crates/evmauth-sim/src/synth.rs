//! Background activity and demo data
//!
//! Synthesized payments emulate agents spending on their own. They go through
//! the same budget path as owner-authorized payments.

use crate::store::SessionStore;
use alloy_primitives::{address, Address, U256};
use chrono::{DateTime, Duration, Utc};
use evmauth_core::{
    Agent, AgentId, AgentStatus, AgentType, Amount, Did, Payment, PaymentId, PaymentRequest,
    PaymentStatus,
};
use rand::seq::IndexedRandom;
use rand::Rng;

/// Memos attached to about half of the synthesized payments
pub const MEMOS: [&str; 6] = [
    "Trade execution fee",
    "Data analysis service",
    "Content generation",
    "Yield optimization",
    "Liquidity provision",
    "Gas fee reimbursement",
];

/// Smallest synthesized amount, in units of 0.0001
const MIN_TEN_THOUSANDTHS: u64 = 100;
/// Exclusive upper bound, in units of 0.0001
const MAX_TEN_THOUSANDTHS: u64 = 1_100;
/// Wei per 0.0001
const TEN_THOUSANDTH: u64 = 100_000_000_000_000;

/// Amount in [0.01, 0.11) with four decimals
pub fn random_amount<R: Rng + ?Sized>(rng: &mut R) -> Amount {
    let units = rng.random_range(MIN_TEN_THOUSANDTHS..MAX_TEN_THOUSANDTHS);
    Amount::from_wei(U256::from(units) * U256::from(TEN_THOUSANDTH))
}

/// Uniformly random 20-byte address
pub fn random_recipient<R: Rng + ?Sized>(rng: &mut R) -> Address {
    Address::from(rng.random::<[u8; 20]>())
}

/// One of [`MEMOS`] half of the time
pub fn random_memo<R: Rng + ?Sized>(rng: &mut R) -> Option<String> {
    if rng.random_bool(0.5) {
        MEMOS.choose(rng).map(|m| (*m).to_string())
    } else {
        None
    }
}

/// Draw a payment for one of `active` agents, `None` when there is none
pub fn plan_payment<R: Rng + ?Sized>(rng: &mut R, active: &[AgentId]) -> Option<PaymentRequest> {
    let agent_id = *active.choose(rng)?;
    Some(PaymentRequest {
        agent_id,
        recipient: random_recipient(rng),
        amount: random_amount(rng),
        memo: random_memo(rng),
    })
}

fn thousandths(n: u64) -> Amount {
    Amount::from_wei(U256::from(n) * U256::from(1_000_000_000_000_000u64))
}

/// Install the demo agents and their settled history for `owner`
pub(crate) fn install_demo_data(store: &SessionStore, owner: Address, now: DateTime<Utc>) {
    let window_start = now - Duration::hours(4);
    let agents = [
        (1, "Alpha Trader", AgentType::Trading, 500, 130, 5),
        (2, "Market Analyzer", AgentType::Analytics, 200, 20, 3),
        (3, "Content Bot", AgentType::Content, 100, 0, 1),
    ];
    for (id, name, agent_type, max, spent, age_days) in agents {
        store.seed_agent(Agent {
            id: AgentId(id),
            name: name.to_string(),
            agent_type,
            did: Did::for_account(owner),
            max_daily_spend: thousandths(max),
            daily_spent: thousandths(spent),
            last_reset: window_start,
            status: AgentStatus::Active,
            owner,
            created_at: now - Duration::days(age_days),
        });
    }

    let payments = [
        (1, 1, "Alpha Trader", address!("9f3e5d7c2a4b8e1f6c9d3a5b7e2c4f8a1b6d9e30"), 80, 3, None),
        (
            2,
            2,
            "Market Analyzer",
            address!("8e7c3a9f1b5d2e4c8f3a6b9d5e2c7f4a8b1d3e60"),
            20,
            2,
            Some("Data analysis service"),
        ),
        (
            3,
            1,
            "Alpha Trader",
            address!("1a2b3c4d5e6f7a8b9c0d1e2f3a4b5c6d7e8f9a00"),
            50,
            1,
            Some("Trade execution fee"),
        ),
    ];
    for (id, agent, agent_name, recipient, value, hours_ago, memo) in payments {
        store.seed_payment(Payment {
            id: PaymentId(id),
            agent_id: AgentId(agent),
            agent_name: agent_name.to_string(),
            recipient,
            amount: thousandths(value),
            status: PaymentStatus::Settled,
            timestamp: now - Duration::hours(hours_ago),
            memo: memo.map(str::to_string),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_amounts_stay_in_range_with_four_decimals() {
        let mut rng = StdRng::seed_from_u64(7);
        let low = thousandths(10);
        let high = thousandths(110);
        for _ in 0..500 {
            let amount = random_amount(&mut rng);
            assert!(amount >= low && amount < high, "{amount}");
            let text = amount.to_string();
            let decimals = text.split('.').nth(1).map_or(0, str::len);
            assert!(decimals <= 4, "{text}");
        }
    }

    #[test]
    fn test_plan_needs_an_active_agent() {
        let mut rng = StdRng::seed_from_u64(7);
        assert!(plan_payment(&mut rng, &[]).is_none());
        let request = plan_payment(&mut rng, &[AgentId(2)]).unwrap();
        assert_eq!(request.agent_id, AgentId(2));
    }

    #[test]
    fn test_memos_come_from_the_fixed_list() {
        let mut rng = StdRng::seed_from_u64(11);
        let memos: Vec<_> = (0..200).filter_map(|_| random_memo(&mut rng)).collect();
        assert!(!memos.is_empty() && memos.len() < 200);
        assert!(memos.iter().all(|m| MEMOS.contains(&m.as_str())));
    }

    #[test]
    fn test_demo_data_matches_history() {
        let store = SessionStore::new(20);
        let owner = crate::DEMO_OWNER;
        install_demo_data(&store, owner, Utc::now());

        assert_eq!(store.agent_ids(owner), vec![AgentId(1), AgentId(2), AgentId(3)]);
        assert_eq!(store.active_agent_ids(owner).len(), 3);
        let latest = store.payment(PaymentId(3)).unwrap();
        assert_eq!(latest.amount.to_string(), "0.05");
        assert_eq!(latest.memo.as_deref(), Some("Trade execution fee"));
        assert!(store.payment(PaymentId(1)).unwrap().memo.is_none());
    }
}

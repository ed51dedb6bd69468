//! Testing utilities for the EVMAuth workspace
//!
//! Shared fixtures plus [`ContractEmulator`], an in-memory stand-in for the
//! agent contract that enforces eligibility and budget the way the ledger
//! does.


mod emulator;

pub use emulator::ContractEmulator;

use alloy_primitives::Address;
use chrono::{DateTime, Utc};
use evmauth_core::{
    parse_address, Agent, AgentId, AgentStatus, AgentType, Amount, Did, Payment, PaymentId,
    PaymentStatus,
};

/// 2023-11-14T22:13:20Z
pub const EPOCH: i64 = 1_700_000_000;

/// UTC instant `secs` after the Unix epoch
pub fn at(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap()
}

/// Decimal token amount, panics on bad input
pub fn amount(raw: &str) -> Amount {
    Amount::parse_decimal(raw).unwrap()
}

/// Owner of every fixture agent
pub fn owner() -> Address {
    parse_address("0x742d35cc6634c0532925a3b844bc9e7595f0beb0").unwrap()
}

/// An owner with no fixture agents
pub fn other_owner() -> Address {
    parse_address("0x53d284357ec70ce289d6d64134dfac8e511c8a3d").unwrap()
}

/// Default payment recipient
pub fn recipient() -> Address {
    parse_address("0xdeaddeaddeaddeaddeaddeaddeaddeaddeaddead").unwrap()
}

/// Address the emulator is deployed at
pub fn contract_address() -> Address {
    parse_address("0x1111111111111111111111111111111111111111").unwrap()
}

/// Agent owned by [`owner`], created and last reset at [`EPOCH`]
pub fn agent_fixture(id: u64, name: &str, max: &str, spent: &str, status: AgentStatus) -> Agent {
    Agent {
        id: AgentId(id),
        name: name.to_string(),
        agent_type: AgentType::Trading,
        did: Did::for_account(owner()),
        max_daily_spend: amount(max),
        daily_spent: amount(spent),
        last_reset: at(EPOCH),
        status,
        owner: owner(),
        created_at: at(EPOCH),
    }
}

/// Payment from `agent` to [`recipient`] without a memo
pub fn payment_fixture(id: u64, agent: &Agent, value: &str, status: PaymentStatus) -> Payment {
    Payment {
        id: PaymentId(id),
        agent_id: agent.id,
        agent_name: agent.name.clone(),
        recipient: recipient(),
        amount: amount(value),
        status,
        timestamp: at(EPOCH),
        memo: None,
    }
}

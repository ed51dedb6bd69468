//! EVMAuth Core - agent and payment domain layer
//!
//! Owns the rules every backend shares:
//! - Agent and Payment records and their fixed wire codes
//! - The daily budget rule (24h accounting windows)
//! - The lifecycle state machine for agents and payments
//! - The [`AgentLedger`] seam implemented by the chain and simulation adapters
//!
//! # Example
//!
//! ```rust
//! use evmauth_core::{budget, Amount};
//! # use evmauth_core::{Agent, AgentId, AgentStatus, AgentType, Did};
//! # use alloy_primitives::Address;
//! # let now = chrono::Utc::now();
//! # let agent = Agent {
//! #     id: AgentId(1), name: "Alpha Trader".into(), agent_type: AgentType::Trading,
//! #     did: Did::for_account(Address::ZERO), max_daily_spend: "0.5".parse().unwrap(),
//! #     daily_spent: "0.45".parse().unwrap(), last_reset: now, status: AgentStatus::Active,
//! #     owner: Address::ZERO, created_at: now,
//! # };
//! let ten_cents: Amount = "0.10".parse().unwrap();
//! assert!(!budget::can_authorize(&agent, ten_cents, now));
//! ```

#![warn(unreachable_pub)]

pub mod amount;
pub mod budget;
pub mod error;
pub mod ledger;
pub mod state_machine;
pub mod stats;
pub mod types;

pub use amount::{Amount, NATIVE_DECIMALS, NATIVE_SYMBOL};
pub use budget::BudgetViolation;
pub use error::{CoreError, RecordKind, StateMachineError};
pub use ledger::{
    AgentLedger, BackendMode, Confirmation, ConfirmationOutcome, LedgerEvent, NewAgent,
    OperationHandle, OperationKind, OperationRef, PaymentRequest, RecordRef,
};
pub use state_machine::{AgentEvent, PaymentEvent, Transition};
pub use stats::DashboardStats;
pub use types::{
    parse_address, timestamp_from_ledger, timestamp_to_ledger, Agent, AgentId, AgentStatus,
    AgentType, Did, Payment, PaymentId, PaymentStatus,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

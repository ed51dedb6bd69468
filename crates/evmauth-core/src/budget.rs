//! Daily spend accounting
//!
//! An agent's accounting window starts at `last_reset` and lasts 24 hours.
//! Once a window has elapsed the stored `daily_spent` is logically zero even if
//! the ledger has not been touched to reset it. Rolling a window forward keeps
//! boundaries aligned to the original `last_reset`.

use crate::amount::Amount;
use crate::error::CoreError;
use crate::types::{Agent, AgentStatus};
use chrono::{DateTime, Duration, Utc};

/// Length of one accounting window in seconds
pub const WINDOW_SECS: i64 = 24 * 60 * 60;

/// Why a payment is not admissible
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BudgetViolation {
    /// Only active agents may originate payments
    #[error("agent is {status}, not active")]
    AgentNotActive {
        /// Current status
        status: AgentStatus,
    },

    /// Zero-value payments are not allowed
    #[error("amount must be greater than zero")]
    NonPositiveAmount,

    /// Requested more than the window has left
    #[error("amount {requested} exceeds remaining daily budget {remaining}")]
    ExceedsDailyLimit {
        /// Requested amount
        requested: Amount,
        /// Budget left in the current window
        remaining: Amount,
    },
}

impl From<BudgetViolation> for CoreError {
    fn from(value: BudgetViolation) -> Self {
        CoreError::Rejected(value.to_string())
    }
}

fn elapsed_secs(agent: &Agent, now: DateTime<Utc>) -> i64 {
    now.timestamp() - agent.last_reset.timestamp()
}

/// Whether the window starting at `last_reset` has elapsed
#[inline]
#[must_use]
pub fn window_expired(agent: &Agent, now: DateTime<Utc>) -> bool {
    elapsed_secs(agent, now) >= WINDOW_SECS
}

/// Spend that counts against the cap at `now`
#[must_use]
pub fn effective_spent(agent: &Agent, now: DateTime<Utc>) -> Amount {
    if window_expired(agent, now) {
        Amount::ZERO
    } else {
        agent.daily_spent
    }
}

/// `max(0, max_daily_spend - effective_spent)`
#[must_use]
pub fn remaining_budget(agent: &Agent, now: DateTime<Utc>) -> Amount {
    agent
        .max_daily_spend
        .saturating_sub(effective_spent(agent, now))
}

/// Checks every admission condition, naming the first that fails.
///
/// # Errors
/// The violated condition.
pub fn check_authorization(
    agent: &Agent,
    amount: Amount,
    now: DateTime<Utc>,
) -> Result<(), BudgetViolation> {
    if agent.status != AgentStatus::Active {
        return Err(BudgetViolation::AgentNotActive {
            status: agent.status,
        });
    }
    if amount.is_zero() {
        return Err(BudgetViolation::NonPositiveAmount);
    }
    let remaining = remaining_budget(agent, now);
    if amount > remaining {
        return Err(BudgetViolation::ExceedsDailyLimit {
            requested: amount,
            remaining,
        });
    }
    Ok(())
}

/// True iff the agent is active, the amount is positive and fits the window
#[inline]
#[must_use]
pub fn can_authorize(agent: &Agent, amount: Amount, now: DateTime<Utc>) -> bool {
    check_authorization(agent, amount, now).is_ok()
}

/// Start of the window containing `now`, aligned to `last_reset`
#[must_use]
pub fn current_window_start(agent: &Agent, now: DateTime<Utc>) -> DateTime<Utc> {
    let elapsed = elapsed_secs(agent, now);
    if elapsed < WINDOW_SECS {
        return agent.last_reset;
    }
    let periods = elapsed / WINDOW_SECS;
    agent.last_reset + Duration::seconds(periods * WINDOW_SECS)
}

/// Advance `last_reset` and zero `daily_spent` if the window has rolled over
pub fn roll_window(agent: &mut Agent, now: DateTime<Utc>) {
    let start = current_window_start(agent, now);
    if start != agent.last_reset {
        agent.last_reset = start;
        agent.daily_spent = Amount::ZERO;
    }
}

/// Admit and book a payment against the agent's window.
///
/// Used where this layer is the authority (simulation). Returns the budget
/// left afterwards.
///
/// # Errors
/// The violated condition; the agent is left untouched.
pub fn record_spend(
    agent: &mut Agent,
    amount: Amount,
    now: DateTime<Utc>,
) -> Result<Amount, BudgetViolation> {
    check_authorization(agent, amount, now)?;
    roll_window(agent, now);
    agent.daily_spent = agent.daily_spent.saturating_add(amount);
    Ok(remaining_budget(agent, now))
}

/// Return spend booked at `authorized_at` if that window is still current
pub fn refund(agent: &mut Agent, amount: Amount, authorized_at: DateTime<Utc>, now: DateTime<Utc>) {
    roll_window(agent, now);
    if authorized_at >= agent.last_reset {
        agent.daily_spent = agent.daily_spent.saturating_sub(amount);
    }
}

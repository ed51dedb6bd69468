//! Core types for EVMAuth
//!
//! Defines the records the ledger owns:
//! - Agents with their spend cap and accounting window
//! - Payments authorized on behalf of an agent
//! - The fixed wire codes of every enumeration
//!
//! Wire codes are decoded exhaustively. A code outside its range is a
//! `MalformedRecord`, never a default variant.

use crate::amount::{narrow_u64, Amount};
use crate::error::{CoreError, StateMachineError};
use crate::state_machine::{self, AgentEvent, PaymentEvent, Transition};
use alloy_primitives::{Address, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Ledger-assigned agent identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AgentId(pub u64);

impl AgentId {
    /// Narrow a ledger integer into an agent id
    ///
    /// # Errors
    /// `MalformedRecord` if the integer does not fit.
    pub fn from_ledger(raw: U256) -> Result<Self, CoreError> {
        narrow_u64(raw)
            .map(Self)
            .ok_or_else(|| CoreError::malformed(format!("agent id {raw} out of range")))
    }

    /// Ledger integer form
    #[inline]
    #[must_use]
    pub fn to_ledger(self) -> U256 {
        U256::from(self.0)
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AgentId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .map(Self)
            .map_err(|_| CoreError::invalid_input(format!("invalid agent id {s:?}")))
    }
}

/// Ledger-assigned payment identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PaymentId(pub u64);

impl PaymentId {
    /// Narrow a ledger integer into a payment id
    ///
    /// # Errors
    /// `MalformedRecord` if the integer does not fit.
    pub fn from_ledger(raw: U256) -> Result<Self, CoreError> {
        narrow_u64(raw)
            .map(Self)
            .ok_or_else(|| CoreError::malformed(format!("payment id {raw} out of range")))
    }

    /// Ledger integer form
    #[inline]
    #[must_use]
    pub fn to_ledger(self) -> U256 {
        U256::from(self.0)
    }
}

impl fmt::Display for PaymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PaymentId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .map(Self)
            .map_err(|_| CoreError::invalid_input(format!("invalid payment id {s:?}")))
    }
}

macro_rules! string_serde {
    ($ty:ty) => {
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                raw.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

string_serde!(AgentId);
string_serde!(PaymentId);

/// Agent specialization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentType {
    /// Trading bot
    Trading,
    /// Analytics
    Analytics,
    /// Content creator
    Content,
    /// DeFi automation
    Defi,
}

impl AgentType {
    /// Every variant in wire-code order
    pub const ALL: [AgentType; 4] = [
        AgentType::Trading,
        AgentType::Analytics,
        AgentType::Content,
        AgentType::Defi,
    ];

    /// Wire code
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            AgentType::Trading => 0,
            AgentType::Analytics => 1,
            AgentType::Content => 2,
            AgentType::Defi => 3,
        }
    }

    /// Decode a wire code
    ///
    /// # Errors
    /// `MalformedRecord` for any code outside 0..=3.
    pub fn from_code(code: U256) -> Result<Self, CoreError> {
        match narrow_u64(code) {
            Some(0) => Ok(AgentType::Trading),
            Some(1) => Ok(AgentType::Analytics),
            Some(2) => Ok(AgentType::Content),
            Some(3) => Ok(AgentType::Defi),
            _ => Err(CoreError::malformed(format!("unknown agent type code {code}"))),
        }
    }

    /// Lowercase identifier
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            AgentType::Trading => "trading",
            AgentType::Analytics => "analytics",
            AgentType::Content => "content",
            AgentType::Defi => "defi",
        }
    }

    /// Human-readable label
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            AgentType::Trading => "Trading Bot",
            AgentType::Analytics => "Analytics",
            AgentType::Content => "Content Creator",
            AgentType::Defi => "DeFi Automation",
        }
    }
}

impl fmt::Display for AgentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AgentType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| CoreError::invalid_input(format!("unknown agent type {s:?}")))
    }
}

/// Agent lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    /// Creation recorded, not yet confirmed
    Pending,
    /// May originate payments
    Active,
    /// Deactivated by the owner
    Inactive,
}

impl AgentStatus {
    /// Every variant in wire-code order
    pub const ALL: [AgentStatus; 3] = [AgentStatus::Pending, AgentStatus::Active, AgentStatus::Inactive];

    /// Wire code
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            AgentStatus::Pending => 0,
            AgentStatus::Active => 1,
            AgentStatus::Inactive => 2,
        }
    }

    /// Decode a wire code
    ///
    /// # Errors
    /// `MalformedRecord` for any code outside 0..=2.
    pub fn from_code(code: U256) -> Result<Self, CoreError> {
        match narrow_u64(code) {
            Some(0) => Ok(AgentStatus::Pending),
            Some(1) => Ok(AgentStatus::Active),
            Some(2) => Ok(AgentStatus::Inactive),
            _ => Err(CoreError::malformed(format!("unknown agent status code {code}"))),
        }
    }

    /// Lowercase identifier
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            AgentStatus::Pending => "pending",
            AgentStatus::Active => "active",
            AgentStatus::Inactive => "inactive",
        }
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payment settlement status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    /// Authorized, awaiting confirmation
    Pending,
    /// Funds moved
    Settled,
    /// Rejected on confirmation
    Failed,
}

impl PaymentStatus {
    /// Every variant in wire-code order
    pub const ALL: [PaymentStatus; 3] = [PaymentStatus::Pending, PaymentStatus::Settled, PaymentStatus::Failed];

    /// Wire code
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            PaymentStatus::Pending => 0,
            PaymentStatus::Settled => 1,
            PaymentStatus::Failed => 2,
        }
    }

    /// Decode a wire code
    ///
    /// # Errors
    /// `MalformedRecord` for any code outside 0..=2.
    pub fn from_code(code: U256) -> Result<Self, CoreError> {
        match narrow_u64(code) {
            Some(0) => Ok(PaymentStatus::Pending),
            Some(1) => Ok(PaymentStatus::Settled),
            Some(2) => Ok(PaymentStatus::Failed),
            _ => Err(CoreError::malformed(format!("unknown payment status code {code}"))),
        }
    }

    /// Lowercase identifier
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Settled => "settled",
            PaymentStatus::Failed => "failed",
        }
    }

    /// Settled and failed accept no further transitions
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decentralized identifier tying an agent to its owning account
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Did(String);

impl Did {
    /// `did:ethr:<checksummed address>`
    #[must_use]
    pub fn for_account(account: Address) -> Self {
        Self(format!("did:ethr:{}", account.to_checksum(None)))
    }

    /// Wrap a DID read back from the ledger
    #[inline]
    #[must_use]
    pub fn from_ledger(raw: String) -> Self {
        Self(raw)
    }

    /// String form
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Agent record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    /// Ledger id
    pub id: AgentId,
    /// Display name, non-empty
    pub name: String,
    /// Specialization
    #[serde(rename = "type")]
    pub agent_type: AgentType,
    /// Immutable decentralized identifier
    pub did: Did,
    /// Spend cap per accounting window
    pub max_daily_spend: Amount,
    /// Spent within the window starting at `last_reset`
    pub daily_spent: Amount,
    /// Start of the current accounting window
    pub last_reset: DateTime<Utc>,
    /// Lifecycle status
    pub status: AgentStatus,
    /// Controlling account
    pub owner: Address,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl Agent {
    /// Whether this agent may originate a new payment
    #[inline]
    #[must_use]
    pub fn is_selectable(&self) -> bool {
        self.status == AgentStatus::Active
    }

    /// Apply a lifecycle event in place
    ///
    /// # Errors
    /// `IllegalTransition` when the table has no such edge; status is unchanged.
    pub fn apply(&mut self, event: AgentEvent) -> Result<AgentStatus, StateMachineError> {
        let next = state_machine::transition_agent(self.status, event)?;
        self.status = next;
        Ok(next)
    }
}

/// Payment record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    /// Ledger id
    pub id: PaymentId,
    /// Originating agent
    pub agent_id: AgentId,
    /// Agent name captured at authorization time
    pub agent_name: String,
    /// Destination account
    pub recipient: Address,
    /// Positive amount
    pub amount: Amount,
    /// Settlement status
    pub status: PaymentStatus,
    /// Authorization time
    pub timestamp: DateTime<Utc>,
    /// Optional annotation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
}

impl Payment {
    /// Apply a confirmation event in place; terminal states ignore it
    pub fn apply(&mut self, event: PaymentEvent) -> Transition<PaymentStatus> {
        let transition = state_machine::transition_payment(self.status, event);
        self.status = transition.state();
        transition
    }
}

/// Parse a 0x-prefixed, 40-hex-character account address (case-insensitive)
///
/// # Errors
/// `InvalidInput` for anything else.
pub fn parse_address(raw: &str) -> Result<Address, CoreError> {
    let trimmed = raw.trim();
    let hex = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .ok_or_else(|| CoreError::invalid_input(format!("address must be 0x-prefixed, got {raw:?}")))?;
    if hex.len() != 40 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(CoreError::invalid_input(format!(
            "address must be 40 hex characters, got {raw:?}"
        )));
    }
    Address::from_str(&hex.to_ascii_lowercase())
        .map_err(|e| CoreError::invalid_input(format!("invalid address {raw:?}: {e}")))
}

/// Convert ledger seconds into a UTC instant
///
/// # Errors
/// `MalformedRecord` when the value is not a representable instant.
pub fn timestamp_from_ledger(secs: U256) -> Result<DateTime<Utc>, CoreError> {
    narrow_u64(secs)
        .and_then(|s| i64::try_from(s).ok())
        .and_then(|s| DateTime::from_timestamp(s, 0))
        .ok_or_else(|| CoreError::malformed(format!("timestamp {secs} out of range")))
}

/// Convert a UTC instant into ledger seconds, clamping pre-epoch instants to zero
#[must_use]
pub fn timestamp_to_ledger(instant: DateTime<Utc>) -> U256 {
    U256::from(u64::try_from(instant.timestamp()).unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn enum_codes_round_trip() {
        for t in AgentType::ALL {
            assert_eq!(AgentType::from_code(U256::from(t.code())).unwrap(), t);
        }
        for s in AgentStatus::ALL {
            assert_eq!(AgentStatus::from_code(U256::from(s.code())).unwrap(), s);
        }
        for s in PaymentStatus::ALL {
            assert_eq!(PaymentStatus::from_code(U256::from(s.code())).unwrap(), s);
        }
    }

    #[test]
    fn out_of_range_codes_are_malformed() {
        assert!(matches!(
            AgentType::from_code(U256::from(4u8)),
            Err(CoreError::MalformedRecord(_))
        ));
        assert!(matches!(
            AgentStatus::from_code(U256::from(3u8)),
            Err(CoreError::MalformedRecord(_))
        ));
        assert!(matches!(
            PaymentStatus::from_code(U256::MAX),
            Err(CoreError::MalformedRecord(_))
        ));
    }

    #[test]
    fn did_uses_checksummed_account() {
        let owner = parse_address("0x742d35cc6634c0532925a3b844bc9e7595f0beb0").unwrap();
        let did = Did::for_account(owner);
        assert_eq!(did.as_str(), format!("did:ethr:{}", owner.to_checksum(None)));
        assert!(did.as_str().starts_with("did:ethr:0x"));
    }

    #[test]
    fn address_parsing_is_case_insensitive() {
        let lower = parse_address("0xdeadbeefdeadbeefdeadbeefdeadbeefdeadbeef").unwrap();
        let upper = parse_address("0XDEADBEEFDEADBEEFDEADBEEFDEADBEEFDEADBEEF").unwrap();
        assert_eq!(lower, upper);
    }

    #[test]
    fn address_parsing_rejects_bad_input() {
        for raw in ["", "0x1234", "deadbeefdeadbeefdeadbeefdeadbeefdeadbeef", "0xzzadbeefdeadbeefdeadbeefdeadbeefdeadbeef"] {
            assert!(matches!(parse_address(raw), Err(CoreError::InvalidInput(_))), "{raw}");
        }
    }

    #[test]
    fn agent_type_parses_from_wire_string() {
        assert_eq!("defi".parse::<AgentType>().unwrap(), AgentType::Defi);
        assert_eq!("Trading".parse::<AgentType>().unwrap(), AgentType::Trading);
        assert!("robot".parse::<AgentType>().is_err());
    }

    #[test]
    fn ids_serialize_as_strings() {
        let json = serde_json::to_string(&AgentId(7)).unwrap();
        assert_eq!(json, "\"7\"");
        let back: PaymentId = serde_json::from_str("\"42\"").unwrap();
        assert_eq!(back, PaymentId(42));
    }

    #[test]
    fn ledger_timestamps_convert() {
        let t = timestamp_from_ledger(U256::from(1_700_000_000u64)).unwrap();
        assert_eq!(t.to_rfc3339(), "2023-11-14T22:13:20+00:00");
        assert_eq!(timestamp_to_ledger(t), U256::from(1_700_000_000u64));
        assert!(timestamp_from_ledger(U256::MAX).is_err());
    }
}

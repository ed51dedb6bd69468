//! Agent contract descriptor and call encoding
//!
//! Function selectors are derived once from their canonical signatures. Record
//! tuples are decoded by position; field names in the contract are never
//! consulted.

use crate::abi::{self, ParamType, Token};
use alloy_primitives::{Address, U256};
use evmauth_core::{
    timestamp_from_ledger, Agent, AgentId, AgentStatus, AgentType, Amount, CoreError, Did,
    Payment, PaymentId, PaymentStatus,
};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Supported networks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Network {
    /// BNB Smart Chain
    BscMainnet,
    /// BNB Smart Chain testnet
    #[default]
    BscTestnet,
}

impl Network {
    /// EIP-155 chain id
    #[must_use]
    pub fn chain_id(self) -> u64 {
        match self {
            Network::BscMainnet => 56,
            Network::BscTestnet => 97,
        }
    }

    /// Public RPC endpoint used when none is configured
    #[must_use]
    pub fn default_rpc_url(self) -> &'static str {
        match self {
            Network::BscMainnet => "https://bsc-dataseed.binance.org",
            Network::BscTestnet => "https://data-seed-prebsc-1-s1.binance.org:8545",
        }
    }

    /// Select by chain id
    #[must_use]
    pub fn from_chain_id(id: u64) -> Option<Self> {
        match id {
            56 => Some(Network::BscMainnet),
            97 => Some(Network::BscTestnet),
            _ => None,
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Network::BscMainnet => f.write_str("bsc-mainnet"),
            Network::BscTestnet => f.write_str("bsc-testnet"),
        }
    }
}

/// Where the agent contract lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractDescriptor {
    /// Contract address
    pub address: Address,
    /// Chain it is deployed on
    pub network: Network,
}

impl ContractDescriptor {
    /// Descriptor for the contract at `address` on `network`
    #[must_use]
    pub fn new(address: Address, network: Network) -> Self {
        Self { address, network }
    }
}

/// `createAgent` signature
pub const CREATE_AGENT: &str = "createAgent(string,uint8,string,uint256)";
/// `activateAgent` signature
pub const ACTIVATE_AGENT: &str = "activateAgent(uint256)";
/// `deactivateAgent` signature
pub const DEACTIVATE_AGENT: &str = "deactivateAgent(uint256)";
/// `authorizePayment` signature; payable
pub const AUTHORIZE_PAYMENT: &str = "authorizePayment(uint256,address,string)";
/// `updateMaxDailySpend` signature
pub const UPDATE_MAX_DAILY_SPEND: &str = "updateMaxDailySpend(uint256,uint256)";
/// `getAgent` signature
pub const GET_AGENT: &str = "getAgent(uint256)";
/// `getUserAgents` signature
pub const GET_USER_AGENTS: &str = "getUserAgents(address)";
/// `getPayment` signature
pub const GET_PAYMENT: &str = "getPayment(uint256)";
/// `getUserPayments` signature
pub const GET_USER_PAYMENTS: &str = "getUserPayments(address)";
/// `getRemainingDailyBudget` signature
pub const GET_REMAINING_DAILY_BUDGET: &str = "getRemainingDailyBudget(uint256)";

/// Four-byte selectors, keyed by the signatures above
pub struct Selectors {
    /// [`CREATE_AGENT`]
    pub create_agent: [u8; 4],
    /// [`ACTIVATE_AGENT`]
    pub activate_agent: [u8; 4],
    /// [`DEACTIVATE_AGENT`]
    pub deactivate_agent: [u8; 4],
    /// [`AUTHORIZE_PAYMENT`]
    pub authorize_payment: [u8; 4],
    /// [`UPDATE_MAX_DAILY_SPEND`]
    pub update_max_daily_spend: [u8; 4],
    /// [`GET_AGENT`]
    pub get_agent: [u8; 4],
    /// [`GET_USER_AGENTS`]
    pub get_user_agents: [u8; 4],
    /// [`GET_PAYMENT`]
    pub get_payment: [u8; 4],
    /// [`GET_USER_PAYMENTS`]
    pub get_user_payments: [u8; 4],
    /// [`GET_REMAINING_DAILY_BUDGET`]
    pub get_remaining_daily_budget: [u8; 4],
}

/// Selectors of every function the adapter calls
pub static SELECTORS: Lazy<Selectors> = Lazy::new(|| Selectors {
    create_agent: abi::selector(CREATE_AGENT),
    activate_agent: abi::selector(ACTIVATE_AGENT),
    deactivate_agent: abi::selector(DEACTIVATE_AGENT),
    authorize_payment: abi::selector(AUTHORIZE_PAYMENT),
    update_max_daily_spend: abi::selector(UPDATE_MAX_DAILY_SPEND),
    get_agent: abi::selector(GET_AGENT),
    get_user_agents: abi::selector(GET_USER_AGENTS),
    get_payment: abi::selector(GET_PAYMENT),
    get_user_payments: abi::selector(GET_USER_PAYMENTS),
    get_remaining_daily_budget: abi::selector(GET_REMAINING_DAILY_BUDGET),
});

/// `(name, agentType, did, maxDailySpend, status, owner, createdAt, dailySpent, lastResetTimestamp)`
#[must_use]
pub fn agent_tuple_type() -> ParamType {
    ParamType::Tuple(vec![
        ParamType::String,
        ParamType::Uint,
        ParamType::String,
        ParamType::Uint,
        ParamType::Uint,
        ParamType::Address,
        ParamType::Uint,
        ParamType::Uint,
        ParamType::Uint,
    ])
}

/// `(agentId, recipient, amount, status, timestamp, memo)`
#[must_use]
pub fn payment_tuple_type() -> ParamType {
    ParamType::Tuple(vec![
        ParamType::Uint,
        ParamType::Address,
        ParamType::Uint,
        ParamType::Uint,
        ParamType::Uint,
        ParamType::String,
    ])
}

/// Calldata builders, one per contract function
pub mod calls {
    use super::*;

    /// `createAgent(name, typeCode, did, maxWei)`
    #[must_use]
    pub fn create_agent(name: &str, agent_type: AgentType, did: &Did, max: Amount) -> Vec<u8> {
        abi::encode_call(
            SELECTORS.create_agent,
            &[
                Token::String(name.to_string()),
                Token::Uint(U256::from(agent_type.code())),
                Token::String(did.as_str().to_string()),
                Token::Uint(max.wei()),
            ],
        )
    }

    /// `activateAgent(id)`
    #[must_use]
    pub fn activate_agent(id: AgentId) -> Vec<u8> {
        abi::encode_call(SELECTORS.activate_agent, &[Token::Uint(id.to_ledger())])
    }

    /// `deactivateAgent(id)`
    #[must_use]
    pub fn deactivate_agent(id: AgentId) -> Vec<u8> {
        abi::encode_call(SELECTORS.deactivate_agent, &[Token::Uint(id.to_ledger())])
    }

    /// The amount travels as the transaction value, not as an argument
    #[must_use]
    pub fn authorize_payment(id: AgentId, recipient: Address, memo: Option<&str>) -> Vec<u8> {
        abi::encode_call(
            SELECTORS.authorize_payment,
            &[
                Token::Uint(id.to_ledger()),
                Token::Address(recipient),
                Token::String(memo.unwrap_or_default().to_string()),
            ],
        )
    }

    /// `updateMaxDailySpend(id, newMaxWei)`
    #[must_use]
    pub fn update_max_daily_spend(id: AgentId, new_max: Amount) -> Vec<u8> {
        abi::encode_call(
            SELECTORS.update_max_daily_spend,
            &[Token::Uint(id.to_ledger()), Token::Uint(new_max.wei())],
        )
    }

    /// `getAgent(id)`
    #[must_use]
    pub fn get_agent(id: AgentId) -> Vec<u8> {
        abi::encode_call(SELECTORS.get_agent, &[Token::Uint(id.to_ledger())])
    }

    /// `getUserAgents(owner)`
    #[must_use]
    pub fn get_user_agents(owner: Address) -> Vec<u8> {
        abi::encode_call(SELECTORS.get_user_agents, &[Token::Address(owner)])
    }

    /// `getPayment(id)`
    #[must_use]
    pub fn get_payment(id: PaymentId) -> Vec<u8> {
        abi::encode_call(SELECTORS.get_payment, &[Token::Uint(id.to_ledger())])
    }

    /// `getUserPayments(owner)`
    #[must_use]
    pub fn get_user_payments(owner: Address) -> Vec<u8> {
        abi::encode_call(SELECTORS.get_user_payments, &[Token::Address(owner)])
    }

    /// `getRemainingDailyBudget(id)`
    #[must_use]
    pub fn get_remaining_daily_budget(id: AgentId) -> Vec<u8> {
        abi::encode_call(SELECTORS.get_remaining_daily_budget, &[Token::Uint(id.to_ledger())])
    }
}

fn take<const N: usize>(fields: Vec<Token>, what: &str) -> Result<[Token; N], CoreError> {
    let found = fields.len();
    <[Token; N]>::try_from(fields).map_err(|_| {
        CoreError::malformed(format!("{what} tuple has {found} fields, expected {N}"))
    })
}

/// Decode a `getAgent` return value.
///
/// A tuple whose owner is the zero address is an unset slot and decodes to
/// `NotFound`.
///
/// # Errors
/// `MalformedRecord` for ABI failures and out-of-range codes; `NotFound` as above.
pub fn decode_agent(id: AgentId, data: &[u8]) -> Result<Agent, CoreError> {
    let fields = abi::decode_single(agent_tuple_type(), data)?.into_tuple()?;
    let [name, agent_type, did, max_daily_spend, status, owner, created_at, daily_spent, last_reset] =
        take::<9>(fields, "agent")?;

    let owner = owner.into_address()?;
    if owner == Address::ZERO {
        return Err(CoreError::not_found(evmauth_core::RecordKind::Agent, id));
    }

    Ok(Agent {
        id,
        name: name.into_string()?,
        agent_type: AgentType::from_code(agent_type.into_uint()?)?,
        did: Did::from_ledger(did.into_string()?),
        max_daily_spend: Amount::from_wei(max_daily_spend.into_uint()?),
        status: AgentStatus::from_code(status.into_uint()?)?,
        owner,
        created_at: timestamp_from_ledger(created_at.into_uint()?)?,
        daily_spent: Amount::from_wei(daily_spent.into_uint()?),
        last_reset: timestamp_from_ledger(last_reset.into_uint()?)?,
    })
}

/// Fields of a `getPayment` tuple before the agent name is joined in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentTuple {
    /// Originating agent
    pub agent_id: AgentId,
    /// Destination account
    pub recipient: Address,
    /// Value moved
    pub amount: Amount,
    /// Decoded status code
    pub status: PaymentStatus,
    /// Authorization time, seconds since the epoch
    pub timestamp: U256,
    /// `None` when the ledger stored an empty string
    pub memo: Option<String>,
}

impl PaymentTuple {
    /// Attach the agent's display name
    ///
    /// # Errors
    /// `MalformedRecord` when the timestamp is not representable.
    pub fn into_payment(self, id: PaymentId, agent_name: String) -> Result<Payment, CoreError> {
        Ok(Payment {
            id,
            agent_id: self.agent_id,
            agent_name,
            recipient: self.recipient,
            amount: self.amount,
            status: self.status,
            timestamp: timestamp_from_ledger(self.timestamp)?,
            memo: self.memo,
        })
    }
}

/// Decode a `getPayment` return value.
///
/// An empty memo decodes to `None`. A tuple with a zero recipient and zero
/// timestamp is an unset slot and decodes to `NotFound`.
///
/// # Errors
/// `MalformedRecord` for ABI failures and out-of-range codes; `NotFound` as above.
pub fn decode_payment(id: PaymentId, data: &[u8]) -> Result<PaymentTuple, CoreError> {
    let fields = abi::decode_single(payment_tuple_type(), data)?.into_tuple()?;
    let [agent_id, recipient, amount, status, timestamp, memo] = take::<6>(fields, "payment")?;

    let recipient = recipient.into_address()?;
    let timestamp = timestamp.into_uint()?;
    if recipient == Address::ZERO && timestamp.is_zero() {
        return Err(CoreError::not_found(evmauth_core::RecordKind::Payment, id));
    }

    let memo = memo.into_string()?;
    Ok(PaymentTuple {
        agent_id: AgentId::from_ledger(agent_id.into_uint()?)?,
        recipient,
        amount: Amount::from_wei(amount.into_uint()?),
        status: PaymentStatus::from_code(status.into_uint()?)?,
        timestamp,
        memo: (!memo.is_empty()).then_some(memo),
    })
}

/// Decode a `uint256[]` id listing, order preserved
///
/// # Errors
/// `MalformedRecord` for ABI failures or ids wider than 64 bits.
pub fn decode_id_list<T>(
    data: &[u8],
    narrow: impl Fn(U256) -> Result<T, CoreError>,
) -> Result<Vec<T>, CoreError> {
    abi::decode_single(ParamType::UintArray, data)?
        .into_uint_array()?
        .into_iter()
        .map(narrow)
        .collect()
}

/// Decode a single `uint256` amount
///
/// # Errors
/// `MalformedRecord` for ABI failures.
pub fn decode_amount(data: &[u8]) -> Result<Amount, CoreError> {
    Ok(Amount::from_wei(
        abi::decode_single(ParamType::Uint, data)?.into_uint()?,
    ))
}

/// Encoders for contract return values, mirroring the decoders above
pub mod returns {
    use super::*;
    use evmauth_core::timestamp_to_ledger;

    /// `getAgent` return data for `agent`
    #[must_use]
    pub fn agent(agent: &Agent) -> Vec<u8> {
        abi::encode(&[Token::Tuple(vec![
            Token::String(agent.name.clone()),
            Token::Uint(U256::from(agent.agent_type.code())),
            Token::String(agent.did.as_str().to_string()),
            Token::Uint(agent.max_daily_spend.wei()),
            Token::Uint(U256::from(agent.status.code())),
            Token::Address(agent.owner),
            Token::Uint(timestamp_to_ledger(agent.created_at)),
            Token::Uint(agent.daily_spent.wei()),
            Token::Uint(timestamp_to_ledger(agent.last_reset)),
        ])])
    }

    /// `getPayment` return data for `payment`
    #[must_use]
    pub fn payment(payment: &Payment) -> Vec<u8> {
        abi::encode(&[Token::Tuple(vec![
            Token::Uint(payment.agent_id.to_ledger()),
            Token::Address(payment.recipient),
            Token::Uint(payment.amount.wei()),
            Token::Uint(U256::from(payment.status.code())),
            Token::Uint(timestamp_to_ledger(payment.timestamp)),
            Token::String(payment.memo.clone().unwrap_or_default()),
        ])])
    }

    /// `uint256[]` return data
    #[must_use]
    pub fn ids(ids: impl IntoIterator<Item = U256>) -> Vec<u8> {
        abi::encode(&[Token::UintArray(ids.into_iter().collect())])
    }

    /// Single `uint256` return data
    #[must_use]
    pub fn uint(value: U256) -> Vec<u8> {
        abi::encode(&[Token::Uint(value)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evmauth_core::parse_address;
    use pretty_assertions::assert_eq;

    fn payment_words(status: u8, memo: &str) -> Vec<u8> {
        abi::encode(&[Token::Tuple(vec![
            Token::Uint(U256::from(7u8)),
            Token::Address(Address::repeat_byte(0xde)),
            Token::Uint(U256::from(50_000_000_000_000_000u64)),
            Token::Uint(U256::from(status)),
            Token::Uint(U256::from(1_700_000_000u64)),
            Token::String(memo.into()),
        ])])
    }

    #[test]
    fn selectors_match_known_values() {
        // keccak256("getAgent(uint256)")[..4]
        assert_eq!(hex::encode(SELECTORS.get_agent), "2de5aaf7");
        assert_eq!(calls::activate_agent(AgentId(1)).len(), 4 + 32);
    }

    #[test]
    fn decode_payment_scenario() {
        let tuple = decode_payment(PaymentId(3), &payment_words(1, "")).unwrap();
        assert_eq!(tuple.agent_id, AgentId(7));
        assert_eq!(tuple.amount.to_string(), "0.05");
        assert_eq!(tuple.status, PaymentStatus::Settled);
        assert_eq!(tuple.memo, None);

        let payment = tuple.into_payment(PaymentId(3), "Alpha Trader".into()).unwrap();
        assert_eq!(payment.timestamp.to_rfc3339(), "2023-11-14T22:13:20+00:00");
    }

    #[test]
    fn out_of_range_payment_status_is_malformed() {
        let err = decode_payment(PaymentId(3), &payment_words(3, "x")).unwrap_err();
        assert_eq!(err.kind(), "malformed_record");
    }

    #[test]
    fn unset_payment_slot_is_not_found() {
        let empty = abi::encode(&[Token::Tuple(vec![
            Token::Uint(U256::ZERO),
            Token::Address(Address::ZERO),
            Token::Uint(U256::ZERO),
            Token::Uint(U256::ZERO),
            Token::Uint(U256::ZERO),
            Token::String(String::new()),
        ])]);
        assert_eq!(decode_payment(PaymentId(9), &empty).unwrap_err().kind(), "not_found");
    }

    #[test]
    fn agent_tuple_round_trips_for_every_code() {
        let owner = parse_address("0x742d35cc6634c0532925a3b844bc9e7595f0beb0").unwrap();
        let at = timestamp_from_ledger(U256::from(1_700_000_000u64)).unwrap();
        for agent_type in AgentType::ALL {
            for status in AgentStatus::ALL {
                let agent = Agent {
                    id: AgentId(4),
                    name: "Content Bot".into(),
                    agent_type,
                    did: Did::for_account(owner),
                    max_daily_spend: "0.1".parse().unwrap(),
                    daily_spent: "0.02".parse().unwrap(),
                    last_reset: at,
                    status,
                    owner,
                    created_at: at,
                };
                assert_eq!(decode_agent(AgentId(4), &returns::agent(&agent)).unwrap(), agent);
            }
        }
    }

    #[test]
    fn zero_owner_agent_is_not_found() {
        let at = timestamp_from_ledger(U256::ZERO).unwrap();
        let blank = Agent {
            id: AgentId(9999),
            name: String::new(),
            agent_type: AgentType::Trading,
            did: Did::from_ledger(String::new()),
            max_daily_spend: Amount::ZERO,
            daily_spent: Amount::ZERO,
            last_reset: at,
            status: AgentStatus::Pending,
            owner: Address::ZERO,
            created_at: at,
        };
        let err = decode_agent(AgentId(9999), &returns::agent(&blank)).unwrap_err();
        assert_eq!(err, CoreError::not_found(evmauth_core::RecordKind::Agent, 9999));
    }

    #[test]
    fn id_listing_preserves_order() {
        let data = returns::ids([U256::from(5u8), U256::from(2u8), U256::from(9u8)]);
        let ids = decode_id_list(&data, AgentId::from_ledger).unwrap();
        assert_eq!(ids, vec![AgentId(5), AgentId(2), AgentId(9)]);
    }

    #[test]
    fn network_selection() {
        assert_eq!(Network::BscMainnet.chain_id(), 56);
        assert_eq!(Network::from_chain_id(97), Some(Network::BscTestnet));
        assert_eq!(Network::from_chain_id(1), None);
        assert_eq!(Network::BscMainnet.to_string(), "bsc-mainnet");
    }
}

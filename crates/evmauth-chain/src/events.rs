//! Contract event logs
//!
//! topic0 is `keccak256` of the event signature; indexed fields follow in
//! topic order and the remaining fields are ABI-encoded in `data`.

use crate::abi::{self, ParamType, Token};
use crate::client::Log;
use alloy_primitives::{keccak256, Address, B256, U256};
use evmauth_core::{
    AgentId, AgentStatus, AgentType, Amount, CoreError, LedgerEvent, PaymentId,
};
use once_cell::sync::Lazy;

/// `AgentCreated` signature; id and owner are indexed
pub const AGENT_CREATED: &str = "AgentCreated(uint256,address,string,uint8,uint256)";
/// `AgentStatusUpdated` signature; id is indexed
pub const AGENT_STATUS_UPDATED: &str = "AgentStatusUpdated(uint256,uint8)";
/// `PaymentAuthorized` signature; payment id, agent id and recipient are indexed
pub const PAYMENT_AUTHORIZED: &str = "PaymentAuthorized(uint256,uint256,address,uint256)";
/// `PaymentSettled` signature; payment id, agent id and recipient are indexed
pub const PAYMENT_SETTLED: &str = "PaymentSettled(uint256,uint256,address,uint256)";

/// topic0 of [`AGENT_CREATED`]
pub static AGENT_CREATED_TOPIC: Lazy<B256> = Lazy::new(|| keccak256(AGENT_CREATED));
/// topic0 of [`AGENT_STATUS_UPDATED`]
pub static AGENT_STATUS_UPDATED_TOPIC: Lazy<B256> = Lazy::new(|| keccak256(AGENT_STATUS_UPDATED));
/// topic0 of [`PAYMENT_AUTHORIZED`]
pub static PAYMENT_AUTHORIZED_TOPIC: Lazy<B256> = Lazy::new(|| keccak256(PAYMENT_AUTHORIZED));
/// topic0 of [`PAYMENT_SETTLED`]
pub static PAYMENT_SETTLED_TOPIC: Lazy<B256> = Lazy::new(|| keccak256(PAYMENT_SETTLED));

fn topic(log: &Log, index: usize) -> Result<B256, CoreError> {
    log.topics.get(index).copied().ok_or_else(|| {
        CoreError::malformed(format!(
            "log has {} topics, expected at least {}",
            log.topics.len(),
            index + 1
        ))
    })
}

fn topic_uint(log: &Log, index: usize) -> Result<U256, CoreError> {
    Ok(U256::from_be_bytes(topic(log, index)?.0))
}

fn topic_address(log: &Log, index: usize) -> Result<Address, CoreError> {
    Ok(Address::from_word(topic(log, index)?))
}

fn payment_fields(log: &Log) -> Result<(PaymentId, AgentId, Address, Amount), CoreError> {
    let amount = abi::decode_single(ParamType::Uint, &log.data)?.into_uint()?;
    Ok((
        PaymentId::from_ledger(topic_uint(log, 1)?)?,
        AgentId::from_ledger(topic_uint(log, 2)?)?,
        topic_address(log, 3)?,
        Amount::from_wei(amount),
    ))
}

/// Decode one log. Logs whose topic0 is not a contract event yield `None`.
///
/// # Errors
/// `MalformedRecord` when a recognized event carries bad fields.
pub fn decode_log(log: &Log) -> Result<Option<LedgerEvent>, CoreError> {
    let Some(signature) = log.topics.first() else {
        return Ok(None);
    };

    let event = if *signature == *AGENT_CREATED_TOPIC {
        let fields = abi::decode(
            &[ParamType::String, ParamType::Uint, ParamType::Uint],
            &log.data,
        )?;
        let [name, agent_type, max] = <[Token; 3]>::try_from(fields)
            .map_err(|_| CoreError::malformed("AgentCreated data arity"))?;
        LedgerEvent::AgentCreated {
            agent_id: AgentId::from_ledger(topic_uint(log, 1)?)?,
            owner: topic_address(log, 2)?,
            name: name.into_string()?,
            agent_type: AgentType::from_code(agent_type.into_uint()?)?,
            max_daily_spend: Amount::from_wei(max.into_uint()?),
        }
    } else if *signature == *AGENT_STATUS_UPDATED_TOPIC {
        let status = abi::decode_single(ParamType::Uint, &log.data)?.into_uint()?;
        LedgerEvent::AgentStatusUpdated {
            agent_id: AgentId::from_ledger(topic_uint(log, 1)?)?,
            new_status: AgentStatus::from_code(status)?,
        }
    } else if *signature == *PAYMENT_AUTHORIZED_TOPIC {
        let (payment_id, agent_id, recipient, amount) = payment_fields(log)?;
        LedgerEvent::PaymentAuthorized {
            payment_id,
            agent_id,
            recipient,
            amount,
        }
    } else if *signature == *PAYMENT_SETTLED_TOPIC {
        let (payment_id, agent_id, recipient, amount) = payment_fields(log)?;
        LedgerEvent::PaymentSettled {
            payment_id,
            agent_id,
            recipient,
            amount,
        }
    } else {
        return Ok(None);
    };
    Ok(Some(event))
}

/// Decode every contract event in `logs` emitted by `contract`, in log order
///
/// # Errors
/// The first malformed contract event.
pub fn decode_logs(contract: Address, logs: &[Log]) -> Result<Vec<LedgerEvent>, CoreError> {
    let mut out = Vec::new();
    for log in logs.iter().filter(|l| l.address == contract) {
        if let Some(event) = decode_log(log)? {
            out.push(event);
        }
    }
    Ok(out)
}

fn uint_topic(value: U256) -> B256 {
    B256::from(value.to_be_bytes::<32>())
}

/// Log the contract would emit for `event`
#[must_use]
pub fn encode_log(contract: Address, event: &LedgerEvent) -> Log {
    let (topics, data) = match event {
        LedgerEvent::AgentCreated {
            agent_id,
            owner,
            name,
            agent_type,
            max_daily_spend,
        } => (
            vec![
                *AGENT_CREATED_TOPIC,
                uint_topic(agent_id.to_ledger()),
                owner.into_word(),
            ],
            abi::encode(&[
                Token::String(name.clone()),
                Token::Uint(U256::from(agent_type.code())),
                Token::Uint(max_daily_spend.wei()),
            ]),
        ),
        LedgerEvent::AgentStatusUpdated {
            agent_id,
            new_status,
        } => (
            vec![*AGENT_STATUS_UPDATED_TOPIC, uint_topic(agent_id.to_ledger())],
            abi::encode(&[Token::Uint(U256::from(new_status.code()))]),
        ),
        LedgerEvent::PaymentAuthorized {
            payment_id,
            agent_id,
            recipient,
            amount,
        }
        | LedgerEvent::PaymentSettled {
            payment_id,
            agent_id,
            recipient,
            amount,
        } => {
            let signature = if matches!(event, LedgerEvent::PaymentAuthorized { .. }) {
                *PAYMENT_AUTHORIZED_TOPIC
            } else {
                *PAYMENT_SETTLED_TOPIC
            };
            (
                vec![
                    signature,
                    uint_topic(payment_id.to_ledger()),
                    uint_topic(agent_id.to_ledger()),
                    recipient.into_word(),
                ],
                abi::encode(&[Token::Uint(amount.wei())]),
            )
        }
    };
    Log {
        address: contract,
        topics,
        data,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn topics_match_event_signatures() {
        assert_eq!(
            hex::encode(AGENT_CREATED_TOPIC.as_slice()),
            "9162f30586503ad3bb4b6396b723a81249afb21adf8a4c473aab1931d9c5236e"
        );
        assert_eq!(
            hex::encode(PAYMENT_SETTLED_TOPIC.as_slice()),
            "35b0a6a9a1fd3ecf321f022a8791647e8010e6b664eae2f00db7b29a620aeed6"
        );
    }

    #[test]
    fn decodes_agent_created() {
        let contract = Address::repeat_byte(0x11);
        let event = LedgerEvent::AgentCreated {
            agent_id: AgentId(1),
            owner: Address::repeat_byte(0xab),
            name: "Alpha Trader".into(),
            agent_type: AgentType::Trading,
            max_daily_spend: "0.5".parse().unwrap(),
        };
        let log = encode_log(contract, &event);
        assert_eq!(log.topics.len(), 3);
        assert_eq!(decode_log(&log).unwrap(), Some(event));
    }

    #[test]
    fn payment_indexed_fields_come_from_topics() {
        let event = LedgerEvent::PaymentAuthorized {
            payment_id: PaymentId(12),
            agent_id: AgentId(3),
            recipient: Address::repeat_byte(0xde),
            amount: "0.05".parse().unwrap(),
        };
        let log = encode_log(Address::ZERO, &event);
        assert_eq!(log.data.len(), 32);
        assert_eq!(decode_log(&log).unwrap(), Some(event));
    }

    #[test]
    fn foreign_logs_are_skipped() {
        let contract = Address::repeat_byte(0x11);
        let transfer = Log {
            address: contract,
            topics: vec![keccak256("Transfer(address,address,uint256)")],
            data: vec![],
        };
        let status = encode_log(
            Address::repeat_byte(0x22),
            &LedgerEvent::AgentStatusUpdated {
                agent_id: AgentId(1),
                new_status: AgentStatus::Active,
            },
        );
        assert!(decode_logs(contract, &[transfer, status]).unwrap().is_empty());
    }

    #[test]
    fn bad_status_code_in_event_is_malformed() {
        let mut log = encode_log(
            Address::ZERO,
            &LedgerEvent::AgentStatusUpdated {
                agent_id: AgentId(1),
                new_status: AgentStatus::Active,
            },
        );
        log.data = abi::encode(&[Token::Uint(U256::from(7u8))]);
        assert_eq!(decode_log(&log).unwrap_err().kind(), "malformed_record");
    }
}

use alloy_primitives::{keccak256, Address, B256, U256};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use evmauth_chain::abi::{self, ParamType, Token};
use evmauth_chain::contract::{returns, SELECTORS};
use evmauth_chain::events::encode_log;
use evmauth_chain::{LedgerClient, LedgerError, TransactionReceipt, TransactionRequest};
use evmauth_core::budget::{self, BudgetViolation};
use evmauth_core::{
    Agent, AgentId, AgentStatus, AgentType, Amount, Did, LedgerEvent, Payment, PaymentId,
    PaymentStatus,
};
use parking_lot::Mutex;
use std::collections::HashMap;

#[derive(Default)]
struct State {
    agents: Vec<Agent>,
    payments: Vec<Payment>,
    user_agents: HashMap<Address, Vec<AgentId>>,
    user_payments: HashMap<Address, Vec<PaymentId>>,
    receipts: HashMap<B256, TransactionReceipt>,
    held: Vec<B256>,
    call_overrides: HashMap<Vec<u8>, Vec<u8>>,
    tx_count: u64,
}

/// In-memory agent contract implementing [`LedgerClient`]
///
/// Writes execute immediately; their receipts become visible at once unless
/// held with [`ContractEmulator::hold_receipts`]. Payments settle inside the
/// authorizing transaction, as the contract transfers funds synchronously.
pub struct ContractEmulator {
    address: Address,
    account: Mutex<Option<Address>>,
    now: Mutex<DateTime<Utc>>,
    offline: Mutex<bool>,
    holding: Mutex<bool>,
    state: Mutex<State>,
}

fn revert(reason: &str) -> LedgerError {
    LedgerError::Reverted(reason.to_string())
}

fn arg_error(e: abi::AbiError) -> LedgerError {
    LedgerError::Rpc {
        code: -32602,
        message: format!("invalid call data: {e}"),
    }
}

fn narrow(value: U256) -> Result<u64, LedgerError> {
    evmauth_core::amount::narrow_u64(value).ok_or_else(|| revert("Agent does not exist"))
}

impl ContractEmulator {
    /// Empty contract at `address`, signing as `account`, clock at `now`
    pub fn new(address: Address, account: Option<Address>, now: DateTime<Utc>) -> Self {
        Self {
            address,
            account: Mutex::new(account),
            now: Mutex::new(now),
            offline: Mutex::new(false),
            holding: Mutex::new(false),
            state: Mutex::new(State::default()),
        }
    }

    /// Deployed address
    pub fn address(&self) -> Address {
        self.address
    }

    /// Current block time
    pub fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }

    /// Move block time forward by `secs`
    pub fn advance(&self, secs: i64) {
        *self.now.lock() += Duration::seconds(secs);
    }

    /// Swap the signing account, `None` disconnects
    pub fn set_account(&self, account: Option<Address>) {
        *self.account.lock() = account;
    }

    /// Fail every call with a transport error
    pub fn set_offline(&self, offline: bool) {
        *self.offline.lock() = offline;
    }

    /// Keep new receipts unmined until [`Self::mine`]
    pub fn hold_receipts(&self, hold: bool) {
        *self.holding.lock() = hold;
    }

    /// Release every held receipt
    pub fn mine(&self) {
        let mut state = self.state.lock();
        state.held.clear();
    }

    /// Answer `data` with `response` instead of executing it
    pub fn override_call(&self, data: Vec<u8>, response: Vec<u8>) {
        self.state.lock().call_overrides.insert(data, response);
    }

    /// Insert an agent directly; its id is reassigned to the next slot
    pub fn put_agent(&self, mut agent: Agent) -> AgentId {
        let mut state = self.state.lock();
        let id = AgentId(state.agents.len() as u64 + 1);
        agent.id = id;
        state.user_agents.entry(agent.owner).or_default().push(id);
        state.agents.push(agent);
        id
    }

    /// Stored agent record
    pub fn agent(&self, id: AgentId) -> Option<Agent> {
        let state = self.state.lock();
        Self::slot(id.0).and_then(|i| state.agents.get(i)).cloned()
    }

    /// Stored payment record
    pub fn payment(&self, id: PaymentId) -> Option<Payment> {
        let state = self.state.lock();
        Self::slot(id.0).and_then(|i| state.payments.get(i)).cloned()
    }

    fn slot(id: u64) -> Option<usize> {
        id.checked_sub(1).and_then(|i| usize::try_from(i).ok())
    }

    fn check_online(&self) -> Result<(), LedgerError> {
        if *self.offline.lock() {
            Err(LedgerError::Transport("connection refused".to_string()))
        } else {
            Ok(())
        }
    }

    fn execute_read(&self, data: &[u8]) -> Result<Vec<u8>, LedgerError> {
        let state = self.state.lock();
        if let Some(response) = state.call_overrides.get(data) {
            return Ok(response.clone());
        }
        let (selector, args) = split(data)?;
        let uint_arg = || -> Result<u64, LedgerError> {
            narrow(abi::decode_single(ParamType::Uint, args).and_then(Token::into_uint).map_err(arg_error)?)
        };
        let address_arg = || -> Result<Address, LedgerError> {
            abi::decode_single(ParamType::Address, args)
                .and_then(Token::into_address)
                .map_err(arg_error)
        };

        if selector == SELECTORS.get_agent {
            let agent = Self::slot(uint_arg()?)
                .and_then(|i| state.agents.get(i))
                .ok_or_else(|| revert("Agent does not exist"))?;
            Ok(returns::agent(agent))
        } else if selector == SELECTORS.get_payment {
            let payment = Self::slot(uint_arg()?)
                .and_then(|i| state.payments.get(i))
                .ok_or_else(|| revert("Payment does not exist"))?;
            Ok(returns::payment(payment))
        } else if selector == SELECTORS.get_user_agents {
            let ids = state.user_agents.get(&address_arg()?).cloned().unwrap_or_default();
            Ok(returns::ids(ids.into_iter().map(AgentId::to_ledger)))
        } else if selector == SELECTORS.get_user_payments {
            let ids = state.user_payments.get(&address_arg()?).cloned().unwrap_or_default();
            Ok(returns::ids(ids.into_iter().map(PaymentId::to_ledger)))
        } else if selector == SELECTORS.get_remaining_daily_budget {
            let agent = Self::slot(uint_arg()?)
                .and_then(|i| state.agents.get(i))
                .ok_or_else(|| revert("Agent does not exist"))?;
            Ok(returns::uint(budget::remaining_budget(agent, self.now()).wei()))
        } else {
            Err(revert("unknown function selector"))
        }
    }

    fn execute_write(
        &self,
        from: Address,
        request: &TransactionRequest,
    ) -> Result<Vec<LedgerEvent>, LedgerError> {
        let now = self.now();
        let mut state = self.state.lock();
        let (selector, args) = split(&request.data)?;

        if selector == SELECTORS.create_agent {
            let [name, agent_type, did, max] = take::<4>(abi::decode(
                &[ParamType::String, ParamType::Uint, ParamType::String, ParamType::Uint],
                args,
            ))?;
            let name = name.into_string().map_err(arg_error)?;
            if name.is_empty() {
                return Err(revert("Name cannot be empty"));
            }
            let agent_type = AgentType::from_code(agent_type.into_uint().map_err(arg_error)?)
                .map_err(|_| revert("Invalid agent type"))?;
            let max = Amount::from_wei(max.into_uint().map_err(arg_error)?);
            let id = AgentId(state.agents.len() as u64 + 1);
            state.agents.push(Agent {
                id,
                name: name.clone(),
                agent_type,
                did: Did::from_ledger(did.into_string().map_err(arg_error)?),
                max_daily_spend: max,
                daily_spent: Amount::ZERO,
                last_reset: now,
                status: AgentStatus::Pending,
                owner: from,
                created_at: now,
            });
            state.user_agents.entry(from).or_default().push(id);
            return Ok(vec![LedgerEvent::AgentCreated {
                agent_id: id,
                owner: from,
                name,
                agent_type,
                max_daily_spend: max,
            }]);
        }

        if selector == SELECTORS.authorize_payment {
            let [agent_id, recipient, memo] = take::<3>(abi::decode(
                &[ParamType::Uint, ParamType::Address, ParamType::String],
                args,
            ))?;
            let agent_id = AgentId(narrow(agent_id.into_uint().map_err(arg_error)?)?);
            let recipient = recipient.into_address().map_err(arg_error)?;
            let memo = memo.into_string().map_err(arg_error)?;
            let amount = Amount::from_wei(request.value);

            let slot = Self::slot(agent_id.0)
                .filter(|i| *i < state.agents.len())
                .ok_or_else(|| revert("Agent does not exist"))?;
            let agent = &mut state.agents[slot];
            if agent.owner != from {
                return Err(revert("Not agent owner"));
            }
            budget::record_spend(agent, amount, now).map_err(|v| match v {
                BudgetViolation::AgentNotActive { .. } => revert("Agent not active"),
                BudgetViolation::NonPositiveAmount => revert("Amount must be greater than 0"),
                BudgetViolation::ExceedsDailyLimit { .. } => revert("Exceeds daily limit"),
            })?;
            let agent_name = agent.name.clone();

            let payment_id = PaymentId(state.payments.len() as u64 + 1);
            state.payments.push(Payment {
                id: payment_id,
                agent_id,
                agent_name,
                recipient,
                amount,
                status: PaymentStatus::Settled,
                timestamp: now,
                memo: (!memo.is_empty()).then_some(memo),
            });
            state.user_payments.entry(from).or_default().push(payment_id);
            return Ok(vec![
                LedgerEvent::PaymentAuthorized {
                    payment_id,
                    agent_id,
                    recipient,
                    amount,
                },
                LedgerEvent::PaymentSettled {
                    payment_id,
                    agent_id,
                    recipient,
                    amount,
                },
            ]);
        }

        let target = |state: &State, raw: &Token| -> Result<usize, LedgerError> {
            let id = narrow(raw.clone().into_uint().map_err(arg_error)?)?;
            let slot = Self::slot(id)
                .filter(|i| *i < state.agents.len())
                .ok_or_else(|| revert("Agent does not exist"))?;
            if state.agents[slot].owner != from {
                return Err(revert("Not agent owner"));
            }
            Ok(slot)
        };

        if selector == SELECTORS.activate_agent || selector == SELECTORS.deactivate_agent {
            let [id] = take::<1>(abi::decode(&[ParamType::Uint], args))?;
            let slot = target(&*state, &id)?;
            let agent = &mut state.agents[slot];
            let (required, next) = if selector == SELECTORS.activate_agent {
                (AgentStatus::Pending, AgentStatus::Active)
            } else {
                (AgentStatus::Active, AgentStatus::Inactive)
            };
            if agent.status != required {
                return Err(revert("Invalid status transition"));
            }
            agent.status = next;
            return Ok(vec![LedgerEvent::AgentStatusUpdated {
                agent_id: agent.id,
                new_status: next,
            }]);
        }

        if selector == SELECTORS.update_max_daily_spend {
            let [id, max] = take::<2>(abi::decode(&[ParamType::Uint, ParamType::Uint], args))?;
            let slot = target(&*state, &id)?;
            state.agents[slot].max_daily_spend =
                Amount::from_wei(max.into_uint().map_err(arg_error)?);
            return Ok(Vec::new());
        }

        Err(revert("unknown function selector"))
    }
}

fn split(data: &[u8]) -> Result<([u8; 4], &[u8]), LedgerError> {
    if data.len() < 4 {
        return Err(revert("missing function selector"));
    }
    let (selector, args) = data.split_at(4);
    let mut out = [0u8; 4];
    out.copy_from_slice(selector);
    Ok((out, args))
}

fn take<const N: usize>(decoded: Result<Vec<Token>, abi::AbiError>) -> Result<[Token; N], LedgerError> {
    let tokens = decoded.map_err(arg_error)?;
    <[Token; N]>::try_from(tokens).map_err(|_| LedgerError::Rpc {
        code: -32602,
        message: "wrong argument count".to_string(),
    })
}

#[async_trait]
impl LedgerClient for ContractEmulator {
    fn account(&self) -> Option<Address> {
        *self.account.lock()
    }

    async fn call(&self, to: Address, data: Vec<u8>) -> Result<Vec<u8>, LedgerError> {
        self.check_online()?;
        if to != self.address {
            return Ok(Vec::new());
        }
        self.execute_read(&data)
    }

    async fn send_transaction(&self, request: TransactionRequest) -> Result<B256, LedgerError> {
        self.check_online()?;
        let from = self.account().ok_or(LedgerError::NoAccount)?;
        let events = self.execute_write(from, &request)?;

        let mut state = self.state.lock();
        state.tx_count += 1;
        let hash = keccak256(state.tx_count.to_be_bytes());
        state.receipts.insert(
            hash,
            TransactionReceipt {
                transaction_hash: hash,
                status: true,
                logs: events.iter().map(|e| encode_log(self.address, e)).collect(),
            },
        );
        if *self.holding.lock() {
            state.held.push(hash);
        }
        Ok(hash)
    }

    async fn transaction_receipt(
        &self,
        hash: B256,
    ) -> Result<Option<TransactionReceipt>, LedgerError> {
        self.check_online()?;
        let state = self.state.lock();
        if state.held.contains(&hash) {
            return Ok(None);
        }
        Ok(state.receipts.get(&hash).cloned())
    }
}

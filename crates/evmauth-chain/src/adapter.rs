//! Chain-backed [`AgentLedger`]
//!
//! The contract is the authority for budget and eligibility. This adapter
//! validates only what must be rejected before a write is attempted (empty
//! names, zero amounts, missing account) and reports the ledger's outcome
//! unaltered.

use crate::client::{LedgerClient, LedgerError, TransactionRequest};
use crate::contract::{self, calls, ContractDescriptor};
use crate::events;
use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use chrono::Utc;
use evmauth_core::{
    budget, Agent, AgentId, AgentLedger, Amount, BackendMode, Confirmation, ConfirmationOutcome,
    CoreError, Did, NewAgent, OperationHandle, OperationKind, OperationRef, Payment, PaymentId,
    PaymentRequest, RecordKind,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Default interval between receipt polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1_500);

/// Adapter over a live contract
pub struct ChainAdapter<C: ?Sized> {
    client: Arc<C>,
    contract: ContractDescriptor,
    poll_interval: Duration,
}

impl<C: LedgerClient + ?Sized + 'static> ChainAdapter<C> {
    /// Adapter calling `contract` through `client`
    #[must_use]
    pub fn new(client: Arc<C>, contract: ContractDescriptor) -> Self {
        Self {
            client,
            contract,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Set the receipt polling interval
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Contract this adapter targets
    #[must_use]
    pub fn contract(&self) -> &ContractDescriptor {
        &self.contract
    }

    async fn read(&self, data: Vec<u8>) -> Result<Vec<u8>, LedgerError> {
        self.client.call(self.contract.address, data).await
    }

    fn require_account(&self) -> Result<Address, CoreError> {
        self.client.account().ok_or(CoreError::NotConnected)
    }

    #[instrument(level = "info", skip(self, data), fields(contract = %self.contract.address))]
    async fn submit(
        &self,
        kind: OperationKind,
        data: Vec<u8>,
        value: U256,
    ) -> Result<OperationHandle, CoreError> {
        self.require_account()?;
        let hash = self
            .client
            .send_transaction(TransactionRequest {
                to: self.contract.address,
                data,
                value,
            })
            .await
            .map_err(|e| {
                warn!(?kind, error = %e, "ledger rejected write");
                e.into_write_error()
            })?;
        info!(?kind, tx = %hash, "write submitted");
        Ok(OperationHandle::transaction(kind, hash))
    }

    async fn poll_receipt(&self, hash: B256, handle: &OperationHandle) -> Result<Confirmation, CoreError> {
        let mut ticker = tokio::time::interval(self.poll_interval);
        loop {
            ticker.tick().await;
            match self.client.transaction_receipt(hash).await {
                Ok(Some(receipt)) => {
                    let events = events::decode_logs(self.contract.address, &receipt.logs)?;
                    let outcome = if receipt.status {
                        ConfirmationOutcome::Confirmed
                    } else {
                        ConfirmationOutcome::Failed {
                            reason: "transaction reverted".to_string(),
                        }
                    };
                    info!(tx = %hash, ?outcome, events = events.len(), "receipt observed");
                    return Ok(Confirmation {
                        operation: handle.clone(),
                        outcome,
                        events,
                    });
                }
                Ok(None) => debug!(tx = %hash, "receipt not yet available"),
                Err(LedgerError::Transport(msg)) => {
                    warn!(tx = %hash, error = %msg, "receipt poll failed, retrying");
                }
                Err(other) => return Err(other.into_read_error()),
            }
        }
    }

    /// Fetch a payment with its agent's current name joined in.
    ///
    /// A payment whose agent cannot be found is reported as `MalformedRecord`.
    async fn load_payment(&self, id: PaymentId) -> Result<Payment, CoreError> {
        let data = self
            .read(calls::get_payment(id))
            .await
            .map_err(|e| e.into_record_error(RecordKind::Payment, id))?;
        let tuple = contract::decode_payment(id, &data)?;
        let agent = match self.get_agent(tuple.agent_id).await {
            Ok(agent) => agent,
            Err(CoreError::NotFound { .. }) => {
                return Err(CoreError::malformed(format!(
                    "payment {id} references missing agent {}",
                    tuple.agent_id
                )))
            }
            Err(other) => return Err(other),
        };
        tuple.into_payment(id, agent.name)
    }
}

#[async_trait]
impl<C: LedgerClient + ?Sized + 'static> AgentLedger for ChainAdapter<C> {
    fn mode(&self) -> BackendMode {
        BackendMode::Live
    }

    fn account(&self) -> Option<Address> {
        self.client.account()
    }

    #[instrument(level = "debug", skip(self))]
    async fn list_user_agent_ids(&self, owner: Address) -> Result<Vec<AgentId>, CoreError> {
        let data = self
            .read(calls::get_user_agents(owner))
            .await
            .map_err(LedgerError::into_read_error)?;
        contract::decode_id_list(&data, AgentId::from_ledger)
    }

    #[instrument(level = "debug", skip(self))]
    async fn get_agent(&self, id: AgentId) -> Result<Agent, CoreError> {
        let data = self
            .read(calls::get_agent(id))
            .await
            .map_err(|e| e.into_record_error(RecordKind::Agent, id))?;
        contract::decode_agent(id, &data)
    }

    #[instrument(level = "debug", skip(self))]
    async fn list_user_payment_ids(&self, owner: Address) -> Result<Vec<PaymentId>, CoreError> {
        let data = self
            .read(calls::get_user_payments(owner))
            .await
            .map_err(LedgerError::into_read_error)?;
        contract::decode_id_list(&data, PaymentId::from_ledger)
    }

    #[instrument(level = "debug", skip(self))]
    async fn get_payment(&self, id: PaymentId) -> Result<Payment, CoreError> {
        self.load_payment(id).await
    }

    #[instrument(level = "debug", skip(self))]
    async fn remaining_daily_budget(&self, id: AgentId) -> Result<Amount, CoreError> {
        let data = self
            .read(calls::get_remaining_daily_budget(id))
            .await
            .map_err(|e| e.into_record_error(RecordKind::Agent, id))?;
        let on_chain = contract::decode_amount(&data)?;

        let agent = self.get_agent(id).await?;
        let local = budget::remaining_budget(&agent, Utc::now());
        if local != on_chain {
            warn!(%id, %on_chain, %local, "remaining budget differs from local rule");
        }
        Ok(on_chain)
    }

    async fn create_agent(&self, request: NewAgent) -> Result<OperationHandle, CoreError> {
        let name = request.name.trim();
        if name.is_empty() {
            return Err(CoreError::invalid_input("agent name must not be empty"));
        }
        let account = self.require_account()?;
        let did = Did::for_account(account);
        self.submit(
            OperationKind::CreateAgent,
            calls::create_agent(name, request.agent_type, &did, request.max_daily_spend),
            U256::ZERO,
        )
        .await
    }

    async fn activate_agent(&self, id: AgentId) -> Result<OperationHandle, CoreError> {
        self.submit(OperationKind::ActivateAgent, calls::activate_agent(id), U256::ZERO)
            .await
    }

    async fn deactivate_agent(&self, id: AgentId) -> Result<OperationHandle, CoreError> {
        self.submit(
            OperationKind::DeactivateAgent,
            calls::deactivate_agent(id),
            U256::ZERO,
        )
        .await
    }

    async fn update_max_daily_spend(
        &self,
        id: AgentId,
        new_max: Amount,
    ) -> Result<OperationHandle, CoreError> {
        self.submit(
            OperationKind::UpdateMaxDailySpend,
            calls::update_max_daily_spend(id, new_max),
            U256::ZERO,
        )
        .await
    }

    async fn authorize_payment(&self, request: PaymentRequest) -> Result<OperationHandle, CoreError> {
        if request.amount.is_zero() {
            return Err(CoreError::invalid_input("amount must be greater than zero"));
        }
        self.submit(
            OperationKind::AuthorizePayment,
            calls::authorize_payment(request.agent_id, request.recipient, request.memo.as_deref()),
            request.amount.wei(),
        )
        .await
    }

    async fn await_confirmation(
        &self,
        handle: &OperationHandle,
        timeout: Duration,
    ) -> Result<Confirmation, CoreError> {
        let OperationRef::Transaction { hash } = handle.reference else {
            return Err(CoreError::invalid_input(
                "handle does not reference a transaction",
            ));
        };
        tokio::time::timeout(timeout, self.poll_receipt(hash, handle))
            .await
            .map_err(|_| CoreError::Timeout {
                waited_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            })?
    }
}

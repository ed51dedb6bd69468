//! External blockchain client seam
//!
//! Signing, nonce management and transport belong to whatever implements
//! [`LedgerClient`]; the adapter only builds calldata and interprets results.

use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use evmauth_core::{CoreError, RecordKind};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Failures reported by a ledger client
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// Could not reach the endpoint or read its response
    #[error("transport error: {0}")]
    Transport(String),

    /// Endpoint answered with a JSON-RPC error object
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// The contract reverted; the reason is the decoded revert string when present
    #[error("execution reverted: {0}")]
    Reverted(String),

    /// No sending account is bound to the client
    #[error("no account bound")]
    NoAccount,
}

impl LedgerError {
    /// Map a failure on a read path
    #[must_use]
    pub fn into_read_error(self) -> CoreError {
        match self {
            LedgerError::NoAccount => CoreError::NotConnected,
            other => CoreError::Unavailable(other.to_string()),
        }
    }

    /// Map a failure reading one record; a revert means the id has no record
    #[must_use]
    pub fn into_record_error(self, kind: RecordKind, id: impl fmt::Display) -> CoreError {
        match self {
            LedgerError::Reverted(_) => CoreError::not_found(kind, id),
            other => other.into_read_error(),
        }
    }

    /// Map a failure on a write path, preserving the ledger's message
    #[must_use]
    pub fn into_write_error(self) -> CoreError {
        match self {
            LedgerError::Transport(msg) => CoreError::Unavailable(msg),
            LedgerError::Rpc { message, .. } => CoreError::Rejected(message),
            LedgerError::Reverted(reason) => CoreError::Rejected(reason),
            LedgerError::NoAccount => CoreError::NotConnected,
        }
    }
}

/// Contract write to submit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRequest {
    /// Contract called
    pub to: Address,
    /// Calldata
    pub data: Vec<u8>,
    /// Attached native value in wei
    pub value: U256,
}

/// One emitted log entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Log {
    /// Emitting contract
    pub address: Address,
    /// Event signature hash followed by indexed fields
    pub topics: Vec<B256>,
    /// ABI-encoded non-indexed fields
    pub data: Vec<u8>,
}

/// Mined transaction outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionReceipt {
    /// Hash of the mined transaction
    pub transaction_hash: B256,
    /// `true` when execution succeeded
    pub status: bool,
    /// Logs in emission order
    pub logs: Vec<Log>,
}

/// Client for the chain holding the agent contract
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Account writes are sent from
    fn account(&self) -> Option<Address>;

    /// Read-only call against the latest block
    async fn call(&self, to: Address, data: Vec<u8>) -> Result<Vec<u8>, LedgerError>;

    /// Submit a write; returns its transaction hash
    async fn send_transaction(&self, request: TransactionRequest) -> Result<B256, LedgerError>;

    /// Receipt for `hash`, `None` until mined
    async fn transaction_receipt(&self, hash: B256)
        -> Result<Option<TransactionReceipt>, LedgerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_errors_keep_the_ledger_message() {
        let err = LedgerError::Reverted("Exceeds daily limit".into()).into_write_error();
        assert_eq!(err, CoreError::Rejected("Exceeds daily limit".into()));

        let err = LedgerError::Rpc {
            code: -32000,
            message: "insufficient funds for gas * price + value".into(),
        }
        .into_write_error();
        assert_eq!(
            err,
            CoreError::Rejected("insufficient funds for gas * price + value".into())
        );
    }

    #[test]
    fn transport_is_unavailable_on_both_paths() {
        let err = LedgerError::Transport("connection refused".into());
        assert_eq!(err.clone().into_read_error().kind(), "unavailable");
        assert_eq!(err.into_write_error().kind(), "unavailable");
        assert_eq!(LedgerError::NoAccount.into_write_error(), CoreError::NotConnected);
    }

    #[test]
    fn reverted_record_read_is_not_found() {
        let err = LedgerError::Reverted("Agent does not exist".into())
            .into_record_error(RecordKind::Agent, 9999);
        assert_eq!(err.to_string(), "agent 9999 not found");

        let err = LedgerError::Rpc { code: -32005, message: "rate limited".into() }
            .into_record_error(RecordKind::Payment, 1);
        assert_eq!(err.kind(), "unavailable");
    }
}

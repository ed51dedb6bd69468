//! JSON-RPC ledger client
//!
//! Talks to a node (or wallet bridge) that holds the sending account's key;
//! writes go through `eth_sendTransaction`, so no key material passes through
//! this process.

use crate::abi;
use crate::client::{LedgerClient, LedgerError, Log, TransactionReceipt, TransactionRequest};
use alloy_primitives::{Address, B256};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, instrument};

/// EIP-1474 code some nodes use for reverts carrying data
const EXECUTION_REVERTED: i64 = 3;

/// HTTP JSON-RPC client bound to one endpoint
pub struct RpcLedgerClient {
    http: reqwest::Client,
    url: String,
    account: Option<Address>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for RpcLedgerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcLedgerClient")
            .field("url", &self.url)
            .field("account", &self.account)
            .finish_non_exhaustive()
    }
}

impl RpcLedgerClient {
    /// Build a client for `url`.
    ///
    /// # Errors
    /// `Transport` if the HTTP client cannot be constructed.
    pub fn new(
        url: impl Into<String>,
        account: Option<Address>,
        request_timeout: Duration,
    ) -> Result<Self, LedgerError> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| LedgerError::Transport(format!("failed to build http client: {e}")))?;
        Ok(Self {
            http,
            url: url.into(),
            account,
            next_id: AtomicU64::new(1),
        })
    }

    /// Endpoint this client posts to
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    #[instrument(level = "debug", skip(self, params), fields(url = %self.url))]
    async fn rpc_call(&self, method: &str, params: Value) -> Result<Value, LedgerError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": id,
        });

        let response = self
            .http
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| LedgerError::Transport(format!("{method} request failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(LedgerError::Transport(format!(
                "{method} returned http status {status}"
            )));
        }
        let value: Value = response
            .json()
            .await
            .map_err(|e| LedgerError::Transport(format!("failed to parse {method} response: {e}")))?;

        if let Some(error) = value.get("error") {
            return Err(rpc_error(error));
        }
        debug!(method, "rpc call succeeded");
        Ok(value.get("result").cloned().unwrap_or(Value::Null))
    }
}

#[derive(Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

fn rpc_error(error: &Value) -> LedgerError {
    let Ok(parsed) = serde_json::from_value::<RpcErrorObject>(error.clone()) else {
        return LedgerError::Rpc {
            code: 0,
            message: error.to_string(),
        };
    };

    let reason = parsed
        .data
        .as_ref()
        .and_then(Value::as_str)
        .and_then(|raw| parse_hex_bytes(raw, "revert data").ok())
        .and_then(|bytes| abi::decode_revert_reason(&bytes));

    let message = parsed.message.trim();
    if parsed.code == EXECUTION_REVERTED || message.starts_with("execution reverted") {
        let fallback = message
            .strip_prefix("execution reverted")
            .map(|rest| rest.trim_start_matches(':').trim())
            .filter(|rest| !rest.is_empty())
            .unwrap_or(message);
        return LedgerError::Reverted(reason.unwrap_or_else(|| fallback.to_string()));
    }
    LedgerError::Rpc {
        code: parsed.code,
        message: parsed.message,
    }
}

/// Decode a `0x`-prefixed hex blob
///
/// # Errors
/// `Transport` naming `field` when the blob is not valid hex.
pub fn parse_hex_bytes(raw: &str, field: &str) -> Result<Vec<u8>, LedgerError> {
    let trimmed = raw.trim();
    let without_prefix = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .ok_or_else(|| LedgerError::Transport(format!("{field} must be 0x-prefixed hex")))?;
    hex::decode(without_prefix)
        .map_err(|e| LedgerError::Transport(format!("{field} is not valid hex: {e}")))
}

fn hex_blob(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcLog {
    address: Address,
    #[serde(default)]
    topics: Vec<B256>,
    data: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    transaction_hash: B256,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    logs: Vec<RpcLog>,
}

fn into_receipt(raw: RpcReceipt) -> Result<TransactionReceipt, LedgerError> {
    let logs = raw
        .logs
        .into_iter()
        .map(|log| {
            Ok(Log {
                address: log.address,
                topics: log.topics,
                data: parse_hex_bytes(&log.data, "log data")?,
            })
        })
        .collect::<Result<Vec<_>, LedgerError>>()?;
    Ok(TransactionReceipt {
        transaction_hash: raw.transaction_hash,
        status: raw.status.as_deref().map_or(true, |s| s == "0x1"),
        logs,
    })
}

#[async_trait]
impl LedgerClient for RpcLedgerClient {
    fn account(&self) -> Option<Address> {
        self.account
    }

    async fn call(&self, to: Address, data: Vec<u8>) -> Result<Vec<u8>, LedgerError> {
        let result = self
            .rpc_call("eth_call", json!([{"to": to, "data": hex_blob(&data)}, "latest"]))
            .await?;
        let raw = result
            .as_str()
            .ok_or_else(|| LedgerError::Transport("eth_call result was missing".to_string()))?;
        parse_hex_bytes(raw, "eth_call result")
    }

    async fn send_transaction(&self, request: TransactionRequest) -> Result<B256, LedgerError> {
        let from = self.account.ok_or(LedgerError::NoAccount)?;
        let result = self
            .rpc_call(
                "eth_sendTransaction",
                json!([{
                    "from": from,
                    "to": request.to,
                    "data": hex_blob(&request.data),
                    "value": format!("0x{:x}", request.value),
                }]),
            )
            .await?;
        serde_json::from_value(result).map_err(|e| {
            LedgerError::Transport(format!("eth_sendTransaction result was not a hash: {e}"))
        })
    }

    async fn transaction_receipt(
        &self,
        hash: B256,
    ) -> Result<Option<TransactionReceipt>, LedgerError> {
        let result = self
            .rpc_call("eth_getTransactionReceipt", json!([hash]))
            .await?;
        if result.is_null() {
            return Ok(None);
        }
        let raw: RpcReceipt = serde_json::from_value(result).map_err(|e| {
            LedgerError::Transport(format!("failed to parse transaction receipt: {e}"))
        })?;
        into_receipt(raw).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn revert_with_data_uses_decoded_reason() {
        let data = hex_blob(&abi::encode_revert_reason("Agent not active"));
        let err = rpc_error(&json!({
            "code": 3,
            "message": "execution reverted: Agent not active",
            "data": data,
        }));
        assert_eq!(err, LedgerError::Reverted("Agent not active".into()));
    }

    #[test]
    fn revert_without_data_strips_prefix() {
        let err = rpc_error(&json!({
            "code": -32000,
            "message": "execution reverted: Exceeds daily limit",
        }));
        assert_eq!(err, LedgerError::Reverted("Exceeds daily limit".into()));
    }

    #[test]
    fn other_errors_stay_rpc_errors() {
        let err = rpc_error(&json!({"code": -32601, "message": "method not found"}));
        assert_eq!(
            err,
            LedgerError::Rpc {
                code: -32601,
                message: "method not found".into()
            }
        );
    }

    #[test]
    fn receipt_parsing() {
        let raw: RpcReceipt = serde_json::from_value(json!({
            "transactionHash": format!("0x{}", "ab".repeat(32)),
            "status": "0x0",
            "logs": [{
                "address": "0x1111111111111111111111111111111111111111",
                "topics": [format!("0x{}", "00".repeat(32))],
                "data": "0x0001"
            }]
        }))
        .unwrap();
        let receipt = into_receipt(raw).unwrap();
        assert!(!receipt.status);
        assert_eq!(receipt.logs[0].data, vec![0, 1]);
    }

    #[test]
    fn hex_parsing_requires_prefix() {
        assert!(parse_hex_bytes("abcd", "x").is_err());
        assert_eq!(parse_hex_bytes("0xABCD", "x").unwrap(), vec![0xab, 0xcd]);
    }

    #[tokio::test]
    async fn send_requires_account() {
        let client =
            RpcLedgerClient::new("http://127.0.0.1:1", None, Duration::from_millis(50)).unwrap();
        let err = client
            .send_transaction(TransactionRequest {
                to: Address::ZERO,
                data: vec![],
                value: alloy_primitives::U256::ZERO,
            })
            .await
            .unwrap_err();
        assert_eq!(err, LedgerError::NoAccount);
    }
}

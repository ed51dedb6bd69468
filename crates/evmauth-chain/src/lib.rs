//! EVMAuth Chain - live ledger adapter
//!
//! Translates domain intents into contract calls and contract results into
//! domain records:
//! - A bounds-checked ABI codec for the contract's argument and return types
//! - Function selectors, calldata builders and positional tuple decoders
//! - Event-log decoding into [`evmauth_core::LedgerEvent`]
//! - The [`LedgerClient`] seam and a JSON-RPC implementation of it
//!
//! # Example
//!
//! ```rust,ignore
//! use evmauth_chain::{ChainAdapter, ContractDescriptor, Network, RpcLedgerClient};
//! use std::sync::Arc;
//!
//! let client = RpcLedgerClient::new(Network::BscTestnet.default_rpc_url(), None, timeout)?;
//! let ledger = ChainAdapter::new(Arc::new(client), ContractDescriptor::new(address, Network::BscTestnet));
//! let agent = ledger.get_agent(AgentId(1)).await?;
//! ```

#![warn(unreachable_pub)]

pub mod abi;
pub mod adapter;
pub mod client;
pub mod contract;
pub mod events;
pub mod rpc;

pub use abi::AbiError;
pub use adapter::{ChainAdapter, DEFAULT_POLL_INTERVAL};
pub use client::{LedgerClient, LedgerError, Log, TransactionReceipt, TransactionRequest};
pub use contract::{ContractDescriptor, Network};
pub use rpc::RpcLedgerClient;

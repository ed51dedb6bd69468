//! EVMAuth Gateway - query facade and HTTP surface
//!
//! Puts one ledger backend behind a single entry point:
//! - [`AgentService`]: listings, dashboard statistics and mutations over
//!   either the live chain or a simulation session
//! - [`http::router`]: the axum routes consumed by the rendering layer
//! - [`GatewayConfig`]: TOML configuration with validation
//! - [`telemetry::init`]: `tracing` subscriber setup

#![warn(unreachable_pub)]

pub mod backend;
pub mod config;
pub mod error;
pub mod http;
pub mod service;
pub mod telemetry;
pub mod views;

pub use config::{CacheConfig, ChainConfig, GatewayConfig, LogFormat};
pub use error::GatewayError;
pub use service::{AgentService, BudgetPolicy, Dashboard};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

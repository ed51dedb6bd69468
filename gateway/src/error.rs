//! Gateway startup errors

use evmauth_core::CoreError;
use std::path::PathBuf;

/// Startup and configuration failures
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Config file could not be read
    #[error("failed to read config {path}: {source}")]
    ReadConfig {
        /// File that was requested
        path: PathBuf,
        /// Underlying I/O failure
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for [`crate::GatewayConfig`]
    #[error("failed to parse config: {0}")]
    ParseConfig(#[from] toml::de::Error),

    /// A setting is out of range or unknown
    #[error("invalid configuration: {0}")]
    Invalid(String),

    /// Tracing subscriber could not be installed
    #[error("failed to initialize logging: {0}")]
    Telemetry(String),

    /// Backend failed to start
    #[error(transparent)]
    Ledger(#[from] CoreError),
}

impl GatewayError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }

    /// Whether the failure comes from the configuration rather than the ledger
    #[must_use]
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ReadConfig { .. } | Self::ParseConfig(_) | Self::Invalid(_)
        )
    }
}

//! Gateway configuration
//!
//! Loaded from an optional TOML file; the binary layers CLI flags and
//! environment variables on top. Library code only ever receives the
//! resulting values.
//!
//! ```toml
//! bind = "127.0.0.1:8080"
//! mode = "live"
//! budget_policy = "advisory"
//!
//! [chain]
//! network = "bsc-testnet"
//! contract_address = "0x5FbDB2315678afecb367f032d93F642f64180aa3"
//!
//! [simulation]
//! seed_demo_data = true
//! ```

use crate::error::GatewayError;
use crate::service::BudgetPolicy;
use alloy_primitives::Address;
use evmauth_chain::{ContractDescriptor, Network};
use evmauth_core::BackendMode;
use evmauth_sim::SimulationConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

impl FromStr for LogFormat {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(GatewayError::invalid(format!("unknown log format '{other}'"))),
        }
    }
}

/// Parse `live` or `simulation`
///
/// # Errors
/// `Invalid` for anything else.
pub fn parse_mode(raw: &str) -> Result<BackendMode, GatewayError> {
    match raw {
        "live" => Ok(BackendMode::Live),
        "simulation" => Ok(BackendMode::Simulation),
        other => Err(GatewayError::invalid(format!("unknown mode '{other}'"))),
    }
}

/// Agent read-through cache settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum cached agents
    pub capacity: u64,
    /// Seconds before a cached agent is refetched
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 1_024,
            ttl_secs: 30,
        }
    }
}

impl CacheConfig {
    /// [`CacheConfig::ttl_secs`] as a duration
    #[inline]
    #[must_use]
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Live ledger settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    /// Target network
    pub network: Network,
    /// Overrides the network's public endpoint
    pub rpc_url: Option<String>,
    /// Deployed agent contract
    pub contract_address: Address,
    /// Account the node signs for; reads work without one
    pub account: Option<Address>,
    /// Receipt polling interval
    pub confirmation_poll_ms: u64,
    /// Per-request RPC timeout
    pub request_timeout_ms: u64,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            network: Network::default(),
            rpc_url: None,
            contract_address: Address::ZERO,
            account: None,
            confirmation_poll_ms: 1_500,
            request_timeout_ms: 10_000,
        }
    }
}

impl ChainConfig {
    /// Configured endpoint, or the network default
    #[must_use]
    pub fn endpoint(&self) -> &str {
        self.rpc_url
            .as_deref()
            .unwrap_or_else(|| self.network.default_rpc_url())
    }

    /// Contract address bound to its network
    #[must_use]
    pub fn descriptor(&self) -> ContractDescriptor {
        ContractDescriptor::new(self.contract_address, self.network)
    }

    /// Receipt polling interval as a duration
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.confirmation_poll_ms)
    }

    /// RPC timeout as a duration
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Top-level gateway configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// HTTP listen address
    pub bind: SocketAddr,
    /// Ledger backend to run against
    pub mode: BackendMode,
    /// Log output format
    pub log_format: LogFormat,
    /// How pre-submission budget checks are enforced
    pub budget_policy: BudgetPolicy,
    /// Agent cache settings
    pub cache: CacheConfig,
    /// Live backend settings
    pub chain: ChainConfig,
    /// Simulation backend settings
    pub simulation: SimulationConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8080)),
            mode: BackendMode::Simulation,
            log_format: LogFormat::default(),
            budget_policy: BudgetPolicy::default(),
            cache: CacheConfig::default(),
            chain: ChainConfig::default(),
            simulation: SimulationConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Load from `path`, or defaults when absent, then validate
    ///
    /// # Errors
    /// Unreadable file, malformed TOML or failed validation.
    pub fn load(path: Option<&Path>) -> Result<Self, GatewayError> {
        let config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|source| GatewayError::ReadConfig {
                    path: path.to_path_buf(),
                    source,
                })?;
                Self::from_toml_str(&raw)?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse without validating
    ///
    /// # Errors
    /// Malformed TOML.
    pub fn from_toml_str(raw: &str) -> Result<Self, GatewayError> {
        Ok(toml::from_str(raw)?)
    }

    /// # Errors
    /// `Invalid` naming the first offending setting.
    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.mode == BackendMode::Live && self.chain.contract_address == Address::ZERO {
            return Err(GatewayError::invalid(
                "live mode requires chain.contract_address",
            ));
        }
        if self.cache.capacity == 0 {
            return Err(GatewayError::invalid("cache.capacity must be at least 1"));
        }
        if self.chain.confirmation_poll_ms == 0 {
            return Err(GatewayError::invalid("chain.confirmation_poll_ms must be positive"));
        }
        self.simulation
            .validate()
            .map_err(|e| GatewayError::invalid(format!("simulation: {e}")))
    }
}

impl fmt::Display for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mode {
            BackendMode::Live => write!(
                f,
                "live on {} ({}) contract {}",
                self.chain.network,
                self.chain.endpoint(),
                self.chain.contract_address
            ),
            BackendMode::Simulation => write!(f, "simulation for {}", self.simulation.owner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid_simulation() {
        let config = GatewayConfig::load(None).unwrap();
        assert_eq!(config.mode, BackendMode::Simulation);
        assert_eq!(config.budget_policy, BudgetPolicy::Advisory);
        assert_eq!(config.chain.endpoint(), Network::BscTestnet.default_rpc_url());
    }

    #[test]
    fn test_loads_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
bind = "0.0.0.0:9000"
mode = "live"
log_format = "json"
budget_policy = "strict"

[chain]
network = "bsc-mainnet"
contract_address = "0x1111111111111111111111111111111111111111"
confirmation_poll_ms = 500

[simulation]
payment_confirm_ms = 1000
history_limit = 5
"#
        )
        .unwrap();

        let config = GatewayConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.bind, "0.0.0.0:9000".parse().unwrap());
        assert_eq!(config.mode, BackendMode::Live);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.budget_policy, BudgetPolicy::Strict);
        assert_eq!(config.chain.network.chain_id(), 56);
        assert_eq!(config.chain.poll_interval(), Duration::from_millis(500));
        assert_eq!(config.simulation.payment_confirm_delay, Duration::from_secs(1));
        assert_eq!(config.simulation.agent_confirm_delay, Duration::from_secs(3));
        assert_eq!(config.simulation.history_limit, 5);
    }

    #[test]
    fn test_live_mode_requires_contract() {
        let err = GatewayConfig::from_toml_str("mode = \"live\"")
            .unwrap()
            .validate()
            .unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_rejects_bad_failure_rate() {
        let config = GatewayConfig::from_toml_str("[simulation]\nfailure_rate = 2.0").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = GatewayConfig::load(Some(&dir.path().join("absent.toml"))).unwrap_err();
        assert!(matches!(err, GatewayError::ReadConfig { .. }));
    }

    #[test]
    fn test_cli_values_parse() {
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!(parse_mode("live").unwrap(), BackendMode::Live);
        assert!(parse_mode("mainnet").is_err());
    }
}

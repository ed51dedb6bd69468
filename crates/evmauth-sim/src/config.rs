//! Simulation session configuration

use alloy_primitives::{address, Address};
use evmauth_core::CoreError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Account that owns the demo session when none is configured
pub const DEMO_OWNER: Address = address!("742d35cc6634c0532925a3b844bc9e7595f0beb0");

/// Settings for one simulation session
///
/// Delays are expressed in milliseconds when deserialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Account bound to the session
    pub owner: Address,
    /// Delay before a created agent is confirmed
    #[serde(rename = "agent_confirm_ms", with = "millis")]
    pub agent_confirm_delay: Duration,
    /// Delay before a payment is resolved
    #[serde(rename = "payment_confirm_ms", with = "millis")]
    pub payment_confirm_delay: Duration,
    /// Cadence of background payment synthesis, `None` disables it
    #[serde(rename = "synthesis_interval_ms", with = "optional_millis")]
    pub synthesis_interval: Option<Duration>,
    /// Most recent payments retained
    pub history_limit: usize,
    /// Probability in [0, 1] that a payment confirmation fails
    pub failure_rate: f64,
    /// RNG seed; entropy when absent
    pub seed: Option<u64>,
    /// Install demo agents and payments on start
    pub seed_demo_data: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            owner: DEMO_OWNER,
            agent_confirm_delay: Duration::from_secs(3),
            payment_confirm_delay: Duration::from_secs(5),
            synthesis_interval: Some(Duration::from_secs(10)),
            history_limit: 20,
            failure_rate: 0.0,
            seed: None,
            seed_demo_data: false,
        }
    }
}

impl SimulationConfig {
    /// Account the session acts for
    #[must_use]
    pub fn with_owner(mut self, owner: Address) -> Self {
        self.owner = owner;
        self
    }

    /// Delays before agent and payment confirmations fire
    #[must_use]
    pub fn with_confirm_delays(mut self, agent: Duration, payment: Duration) -> Self {
        self.agent_confirm_delay = agent;
        self.payment_confirm_delay = payment;
        self
    }

    /// Background payment cadence; `None` disables synthesis
    #[must_use]
    pub fn with_synthesis_interval(mut self, interval: Option<Duration>) -> Self {
        self.synthesis_interval = interval;
        self
    }

    /// Payments retained before the oldest are dropped
    #[must_use]
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    /// Probability in [0, 1] that a payment confirmation fails
    #[must_use]
    pub fn with_failure_rate(mut self, rate: f64) -> Self {
        self.failure_rate = rate;
        self
    }

    /// Fix the RNG seed
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Install the demo agents and payments at start
    #[must_use]
    pub fn with_demo_data(mut self, enabled: bool) -> Self {
        self.seed_demo_data = enabled;
        self
    }

    /// Check ranges
    ///
    /// # Errors
    /// `InvalidInput` naming the offending field.
    pub fn validate(&self) -> Result<(), CoreError> {
        if !(0.0..=1.0).contains(&self.failure_rate) {
            return Err(CoreError::invalid_input(format!(
                "failure_rate must lie in [0, 1], got {}",
                self.failure_rate
            )));
        }
        if self.history_limit == 0 {
            return Err(CoreError::invalid_input("history_limit must be at least 1"));
        }
        if self.synthesis_interval == Some(Duration::ZERO) {
            return Err(CoreError::invalid_input("synthesis_interval must be positive"));
        }
        Ok(())
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub(super) fn serialize<S: Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

mod optional_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    #[allow(clippy::ref_option)]
    pub(super) fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
            None => s.serialize_none(),
        }
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(d).map(|ms| ms.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_demo_timings() {
        let config = SimulationConfig::default();
        assert_eq!(config.agent_confirm_delay, Duration::from_secs(3));
        assert_eq!(config.payment_confirm_delay, Duration::from_secs(5));
        assert_eq!(config.synthesis_interval, Some(Duration::from_secs(10)));
        assert_eq!(config.history_limit, 20);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_out_of_range() {
        assert!(SimulationConfig::default().with_failure_rate(1.5).validate().is_err());
        assert!(SimulationConfig::default().with_failure_rate(f64::NAN).validate().is_err());
        assert!(SimulationConfig::default().with_history_limit(0).validate().is_err());
        assert!(SimulationConfig::default().with_failure_rate(1.0).validate().is_ok());
    }
}

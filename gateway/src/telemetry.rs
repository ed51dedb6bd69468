//! Logging setup

use crate::config::LogFormat;
use crate::error::GatewayError;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `default_directive` when set.
///
/// # Errors
/// `Telemetry` if a subscriber is already installed or the directive is malformed.
pub fn init(format: LogFormat, default_directive: &str) -> Result<(), GatewayError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_directive)
            .map_err(|e| GatewayError::Telemetry(e.to_string()))?,
    };
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let installed = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.map_err(|e| GatewayError::Telemetry(e.to_string()))
}

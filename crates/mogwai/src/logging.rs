//! Tracing setup

use mogwai_core::{ConfigError, LoggingConfig};
use tracing_subscriber::EnvFilter;

/// Install a global fmt subscriber for the given logging configuration.
///
/// `RUST_LOG` takes precedence over the configured level. Returns `Ok(false)`
/// when a global subscriber was already installed.
pub fn init_tracing(config: &LoggingConfig) -> Result<bool, ConfigError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level).map_err(|_| ConfigError::InvalidValue {
            key: "LOG_LEVEL".to_string(),
            value: config.level.clone(),
        })?,
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_file(config.include_location)
        .with_line_number(config.include_location);

    let installed = if config.json_format {
        builder.json().try_init().is_ok()
    } else {
        builder.try_init().is_ok()
    };

    Ok(installed)
}

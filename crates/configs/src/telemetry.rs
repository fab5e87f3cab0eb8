//! Log subscriber setup.

use tracing_subscriber::EnvFilter;

use crate::{ConfigError, LogSettings};

/// Installs the global `tracing` subscriber. `RUST_LOG` takes precedence
/// over the configured filter. Fails if a subscriber is already installed.
pub fn init(settings: &LogSettings) -> Result<(), ConfigError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&settings.filter).map_err(|e| ConfigError::Invalid {
            key: "log.filter",
            reason: e.to_string(),
        })?,
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let installed = if settings.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| ConfigError::Telemetry(e.to_string()))
}

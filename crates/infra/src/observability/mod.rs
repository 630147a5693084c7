//! Tracing initialisation
//!
//! Installs the global `tracing` subscriber: an `fmt` layer (plain or JSON)
//! behind an `EnvFilter`. `RUST_LOG` overrides the configured level.

use caresync_domain::{CareSyncError, LoggingConfig, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber.
///
/// Returns `Ok(false)` without changing anything when a subscriber is
/// already installed.
pub fn init_tracing(config: &LoggingConfig) -> Result<bool> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| CareSyncError::Config(format!("invalid log level '{}': {e}", config.level)))?;

    let installed = if config.json {
        tracing_subscriber::registry().with(filter).with(fmt::layer().json()).try_init()
    } else {
        tracing_subscriber::registry().with(filter).with(fmt::layer()).try_init()
    };

    match installed {
        Ok(()) => {
            tracing::debug!(level = %config.level, json = config.json, "tracing initialised");
            Ok(true)
        }
        Err(_) => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_initialisation_is_a_noop() {
        let config = LoggingConfig::default();

        init_tracing(&config).expect("first call succeeds");
        let installed = init_tracing(&config).expect("second call succeeds");

        assert!(!installed);
    }
}

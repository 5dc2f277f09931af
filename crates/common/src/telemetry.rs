//! Tracing subscriber setup

use crate::config::ObservabilityConfig;
use crate::errors::{AppError, Result};
use tracing_subscriber::EnvFilter;

/// Install the global fmt subscriber.
///
/// `RUST_LOG` wins over `log_level` when set. Fails if a global subscriber
/// is already installed.
pub fn init_tracing(config: &ObservabilityConfig) -> Result<()> {
    let filter = build_filter(config)?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let installed = if config.json_logging {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    installed.map_err(|e| AppError::Configuration {
        message: format!("Failed to install tracing subscriber: {}", e),
    })?;

    tracing::info!(service = %config.service_name, "Tracing initialized");
    Ok(())
}

fn build_filter(config: &ObservabilityConfig) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    EnvFilter::try_new(&config.log_level).map_err(|e| AppError::Configuration {
        message: format!("Invalid log level '{}': {}", config.log_level, e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_accepts_directives() {
        let config = ObservabilityConfig {
            log_level: "pgvt_search=debug,sqlx=warn".to_string(),
            ..ObservabilityConfig::default()
        };
        assert!(EnvFilter::try_new(&config.log_level).is_ok());
    }

    #[test]
    fn test_second_install_fails() {
        let config = ObservabilityConfig::default();
        assert!(init_tracing(&config).is_ok());

        let err = init_tracing(&config).unwrap_err();
        assert!(matches!(err, AppError::Configuration { .. }));
    }
}

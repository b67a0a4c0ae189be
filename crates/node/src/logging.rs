//! Tracing subscriber setup.

use anyhow::{anyhow, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};
use tsscore_config::LoggingConfig;

/// Filter from `RUST_LOG` if set, else the configured level.
pub fn env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.to_lowercase()))
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let env_filter = env_filter(config);

    let installed = match config.format.to_lowercase().as_str() {
        "json" => tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .try_init(),
        "compact" => tracing_subscriber::registry()
            .with(fmt::layer().compact())
            .with(env_filter)
            .try_init(),
        _ => tracing_subscriber::registry()
            .with(fmt::layer().with_target(true))
            .with(env_filter)
            .try_init(),
    };
    installed.map_err(|e| anyhow!("failed to install tracing subscriber: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_once() {
        let config = LoggingConfig {
            level: "debug".into(),
            format: "json".into(),
        };
        assert!(init_tracing(&config).is_ok());
        assert!(init_tracing(&config).is_err());
    }
}

//! Logging setup
//!
//! `RUST_LOG` takes precedence over the configured level.

use lumen_core::{LumenError, LumenResult};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::LogConfig;

/// Install the global subscriber. Fails if one is already installed.
pub fn init(config: &LogConfig) -> LumenResult<()> {
    let filter = filter(config)?;
    let registry = tracing_subscriber::registry().with(filter);

    let result = if config.json {
        registry
            .with(fmt::layer().json().with_target(true).with_current_span(true))
            .try_init()
    } else {
        registry.with(fmt::layer().with_target(true)).try_init()
    };
    result.map_err(|e| LumenError::InvalidConfig(format!("logging: {}", e)))
}

fn filter(config: &LogConfig) -> LumenResult<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&config.level)
            .map_err(|e| LumenError::InvalidConfig(format!("log level '{}': {}", config.level, e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_from_level() {
        let config = LogConfig {
            level: "lumen_runtime=debug,warn".into(),
            json: false,
        };
        assert!(filter(&config).is_ok());
    }
}

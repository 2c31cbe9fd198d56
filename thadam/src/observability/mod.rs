//! Logging setup and per-job summary events.

mod summary;

pub use summary::JobSummary;

use crate::config::LoggingConfig;
use serde::{Deserialize, Serialize};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::EnvFilter;

/// Output format of the fmt layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable multi-field lines.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

/// Installs the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over the configured filter.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn try_init_tracing(config: &LoggingConfig) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.filter.as_str()));
    let registry = tracing_subscriber::registry().with(filter);

    match config.format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).try_init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
    }
}

/// Installs the global tracing subscriber, ignoring a second install.
pub fn init_tracing(config: &LoggingConfig) {
    if let Err(err) = try_init_tracing(config) {
        tracing::debug!(error = %err, "Tracing subscriber already installed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parses() {
        #[derive(Deserialize)]
        struct Wrapper {
            format: LogFormat,
        }
        let parsed: Wrapper = toml::from_str(r#"format = "json""#).unwrap();
        assert_eq!(parsed.format, LogFormat::Json);
        assert_eq!(LogFormat::default(), LogFormat::Pretty);
    }

    #[test]
    fn test_init_twice_is_harmless() {
        let config = LoggingConfig::default();
        init_tracing(&config);
        init_tracing(&config);
        assert!(try_init_tracing(&config).is_err());
    }
}

//! Structured logging setup.
//!
//! Components emit through dedicated log targets so deployments can filter
//! per concern:
//!
//! | Target | Description |
//! |--------|-------------|
//! | `vantage::workflow` | Stage transitions, retries, resume/cancel |
//! | `vantage::scoring` | Layer/factor/pattern/action computation |
//! | `vantage::simulation` | Monte Carlo runs |
//! | `vantage::cache` | Tier hits, degradations, invalidation |
//!
//! ```bash
//! # Debug only the workflow, warn for the rest
//! RUST_LOG=warn,vantage::workflow=debug
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{Layer, Registry};

/// Log output format.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable with colors (development)
    #[default]
    Pretty,
    /// Single-line, no colors
    Compact,
    /// Structured JSON (log shipping)
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Console output format.
    pub format: LogFormat,

    /// Default filter directive when RUST_LOG is unset.
    /// Default: "info"
    pub default_directive: String,

    /// When set, additionally write daily-rolling compact logs to this
    /// directory.
    pub log_dir: Option<PathBuf>,
}

impl LoggingConfig {
    fn directive(&self) -> &str {
        if self.default_directive.is_empty() {
            "info"
        } else {
            &self.default_directive
        }
    }
}

/// Initialize the global subscriber.
///
/// Returns the non-blocking writer guard when file logging is enabled;
/// hold it for the process lifetime or buffered lines are lost on exit.
/// Calling twice (e.g. across tests) is harmless: the second init is a no-op.
pub fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.directive()));

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();
    layers.push(filter.boxed());

    layers.push(match config.format {
        LogFormat::Pretty => fmt::layer().pretty().boxed(),
        LogFormat::Compact => fmt::layer().compact().boxed(),
        LogFormat::Json => fmt::layer().json().boxed(),
    });

    let guard = match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "vantage-engine.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            layers.push(
                fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .compact()
                    .boxed(),
            );
            Some(guard)
        }
        None => None,
    };

    let _ = tracing_subscriber::registry().with(layers).try_init();
    guard
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LoggingConfig::default();
        assert_eq!(config.format, LogFormat::Pretty);
        assert_eq!(config.directive(), "info");
        assert!(config.log_dir.is_none());
    }

    #[test]
    fn test_init_is_idempotent() {
        let config = LoggingConfig {
            format: LogFormat::Compact,
            ..Default::default()
        };
        assert!(init_logging(&config).is_none());
        // Second init must not panic.
        assert!(init_logging(&config).is_none());
    }
}

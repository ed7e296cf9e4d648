//! Structured logging foundation.
//!
//! Dual-mode logging on stderr: human-readable console output for
//! interactive use, JSON lines for agent-driven workflows. stdout is
//! reserved for command payloads. `LOG_LEVEL` (or the standard
//! `RUST_LOG` filter syntax) selects verbosity.

use std::io::IsTerminal;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable console lines.
    Console,
    /// Machine-parseable JSON lines.
    Json,
}

/// Logging configuration resolved from flags and environment.
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub format: LogFormat,
    /// EnvFilter directive, e.g. `info` or `ax_core=debug`.
    pub filter: String,
}

impl LogConfig {
    /// Resolve from the `LOG_LEVEL` env var and verbosity flags.
    pub fn from_env(verbosity: u8) -> Self {
        let filter = std::env::var("LOG_LEVEL").ok().unwrap_or_else(|| {
            match verbosity {
                0 => "warn",
                1 => "info",
                2 => "debug",
                _ => "trace",
            }
            .to_string()
        });
        let format = if std::io::stderr().is_terminal() {
            LogFormat::Console
        } else {
            LogFormat::Json
        };
        LogConfig { format, filter }
    }
}

/// Install the global subscriber. Safe to call once per process;
/// later calls are ignored.
pub fn init_logging(config: &LogConfig) {
    let filter = EnvFilter::try_new(&config.filter)
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    let result = match config.format {
        LogFormat::Console => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
    };
    // A second init (tests, embedding) is not an error worth surfacing.
    let _ = result;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_maps_to_filters() {
        // LOG_LEVEL may leak from the environment; only exercise the
        // flag path when it is absent.
        if std::env::var("LOG_LEVEL").is_err() {
            assert_eq!(LogConfig::from_env(0).filter, "warn");
            assert_eq!(LogConfig::from_env(2).filter, "debug");
        }
    }

    #[test]
    fn init_twice_is_harmless() {
        let config = LogConfig {
            format: LogFormat::Console,
            filter: "warn".into(),
        };
        init_logging(&config);
        init_logging(&config);
    }
}

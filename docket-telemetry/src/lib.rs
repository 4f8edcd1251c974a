//! Logging setup shared by the docket binaries.
//!
//! Libraries in the workspace only emit `tracing` events; binaries call
//! [`init_telemetry`] once at startup to install a subscriber. The filter is
//! read from `RUST_LOG` and defaults to `info`.
//!
//! ```rust,ignore
//! docket_telemetry::init_telemetry(docket_telemetry::TelemetryFormat::Json)?;
//! tracing::info!(chunk_count = 120, "index built");
//! ```

mod capture;

use std::str::FromStr;

use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

pub use capture::{CapturedEvent, CapturedEvents, EventCapture};

/// Errors raised while installing the subscriber.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The `RUST_LOG` directive could not be parsed.
    #[error("Invalid log filter: {0}")]
    Filter(String),

    /// A global subscriber is already installed.
    #[error("Telemetry already initialized: {0}")]
    AlreadyInitialized(String),

    /// An unknown output format was requested.
    #[error("Unknown log format '{0}' (expected 'pretty' or 'json')")]
    UnknownFormat(String),
}

/// Output format of the installed subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TelemetryFormat {
    /// Human-readable lines on stderr.
    #[default]
    Pretty,
    /// One JSON object per event on stderr.
    Json,
}

impl FromStr for TelemetryFormat {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(TelemetryError::UnknownFormat(other.to_string())),
        }
    }
}

/// Build the filter from `RUST_LOG`, falling back to `default_directive`.
pub fn env_filter(default_directive: &str) -> Result<EnvFilter, TelemetryError> {
    match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(directives) if !directives.trim().is_empty() => {
            EnvFilter::try_new(directives).map_err(|e| TelemetryError::Filter(e.to_string()))
        }
        _ => EnvFilter::try_new(default_directive).map_err(|e| TelemetryError::Filter(e.to_string())),
    }
}

/// Install the global subscriber with an `info` default filter.
pub fn init_telemetry(format: TelemetryFormat) -> Result<(), TelemetryError> {
    init_with_filter(format, env_filter("info")?)
}

/// Install the global subscriber with an explicit filter.
pub fn init_with_filter(format: TelemetryFormat, filter: EnvFilter) -> Result<(), TelemetryError> {
    let registry = tracing_subscriber::registry().with(filter);
    let result = match format {
        TelemetryFormat::Pretty => {
            registry.with(fmt::layer().with_writer(std::io::stderr).with_target(false)).try_init()
        }
        TelemetryFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr).with_current_span(true))
            .try_init(),
    };
    result.map_err(|e| TelemetryError::AlreadyInitialized(e.to_string()))
}

//! # thingsync-telemetry
//!
//! Structured logging for the server. One `fmt` layer, JSON or human
//! readable, written to stdout or appended to a log file, filtered by an
//! [`EnvFilter`] built from the configured level and per-module overrides.
//! `RUST_LOG` replaces the configured filter when set.

#![deny(unsafe_code)]

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use tracing::Level;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::{Layered, SubscriberExt};
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Failure to set up logging.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("failed to open log file {path}: {source}")]
    LogFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid log level '{0}'")]
    InvalidLevel(String),
    #[error("a global subscriber is already installed")]
    AlreadyInitialized,
}

/// Configuration for the logging subsystem.
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Default level for every target.
    pub log_level: Level,
    /// Per-module overrides, e.g. `("thingsync_server::hub", DEBUG)`.
    pub module_levels: Vec<(String, Level)>,
    /// JSON lines instead of human-readable output.
    pub json: bool,
    /// Append to this file instead of writing to stdout.
    pub log_file: Option<PathBuf>,
    /// Let `RUST_LOG` replace the configured filter.
    pub env_override: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Level::INFO,
            module_levels: Vec::new(),
            json: false,
            log_file: None,
            env_override: true,
        }
    }
}

impl TelemetryConfig {
    /// Config with the given level name (`trace` .. `error`).
    pub fn with_level(level: &str) -> Result<Self, TelemetryError> {
        Ok(Self {
            log_level: parse_level(level)?,
            ..Self::default()
        })
    }

    /// Filter directives, e.g. `info,thingsync_server=debug`.
    pub fn directives(&self) -> String {
        let mut out = self.log_level.as_str().to_ascii_lowercase();
        for (module, level) in &self.module_levels {
            out.push(',');
            out.push_str(module);
            out.push('=');
            out.push_str(&level.as_str().to_ascii_lowercase());
        }
        out
    }
}

/// Parse a level name case-insensitively.
pub fn parse_level(level: &str) -> Result<Level, TelemetryError> {
    level
        .trim()
        .parse()
        .map_err(|_| TelemetryError::InvalidLevel(level.to_string()))
}

/// The subscriber type produced by [`build_subscriber`].
pub type ThingsyncSubscriber = Layered<Box<dyn Layer<Registry> + Send + Sync>, Registry>;

/// Build the subscriber without installing it.
pub fn build_subscriber(config: &TelemetryConfig) -> Result<ThingsyncSubscriber, TelemetryError> {
    let directives = config.directives();
    let filter = if config.env_override {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&directives))
    } else {
        EnvFilter::new(&directives)
    };

    let (writer, ansi) = match &config.log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|source| TelemetryError::LogFile {
                    path: path.clone(),
                    source,
                })?;
            (BoxMakeWriter::new(Mutex::new(file)), false)
        }
        None => (BoxMakeWriter::new(std::io::stdout), true),
    };

    let layer = if config.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(true)
            .with_writer(writer)
            .with_filter(filter)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_ansi(ansi)
            .with_writer(writer)
            .with_filter(filter)
            .boxed()
    };

    Ok(tracing_subscriber::registry().with(layer))
}

/// Install the global subscriber. Call once at startup.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let subscriber = build_subscriber(config)?;
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|_| TelemetryError::AlreadyInitialized)
}

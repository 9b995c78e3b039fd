//! thingsync server binary.
//!
//! Loads settings (file, then `THINGSYNC_*` env vars, then flags), sets up
//! logging, opens the item store and serves until Ctrl-C.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use thingsync_server::ServerConfig;
use thingsync_settings::{Settings, StoreBackend, StoreSettings, load_settings_from_path};
use thingsync_store::{DurableStore, ItemStore, MemoryStore, SqliteBackend, seed_if_new};
use thingsync_telemetry::{TelemetryConfig, init_telemetry};
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "thingsync", about = "Real-time shared list of things over WebSockets")]
struct Cli {
    /// Settings file (JSON). Missing file means defaults.
    #[arg(long, default_value = "thingsync.json")]
    config: PathBuf,

    /// Address to bind, overriding settings.
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on, overriding settings.
    #[arg(long)]
    port: Option<u16>,

    /// Append logs to this file instead of stdout.
    #[arg(long)]
    log: Option<PathBuf>,

    /// Log level (`trace`, `debug`, `info`, `warn`, `error`).
    #[arg(long)]
    log_level: Option<String>,

    /// Emit JSON log lines.
    #[arg(long, default_value_t = false)]
    json_logs: bool,
}

impl Cli {
    fn apply(&self, settings: &mut Settings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(file) = &self.log {
            settings.logging.file = Some(file.clone());
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        if self.json_logs {
            settings.logging.json = true;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = load_settings_from_path(&cli.config)
        .with_context(|| format!("failed to load settings from {}", cli.config.display()))?;
    cli.apply(&mut settings);

    let telemetry = TelemetryConfig {
        json: settings.logging.json,
        log_file: settings.logging.file.clone(),
        ..TelemetryConfig::with_level(&settings.logging.level)?
    };
    init_telemetry(&telemetry)?;

    let store = open_store(&settings.store)?;
    let seeded = seed_if_new(store.as_ref(), &settings.store.seed)
        .context("failed to seed the item store")?;
    if seeded > 0 {
        info!(count = seeded, "seeded new store");
    }

    let config = ServerConfig::from(&settings);
    let handle = thingsync_server::start(config, store)
        .await
        .context("failed to start server")?;
    info!(port = handle.port(), "thingsync ready");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;

    info!("shutting down");
    handle.shutdown().await;
    Ok(())
}

fn open_store(settings: &StoreSettings) -> Result<Arc<dyn ItemStore>> {
    match settings.backend {
        StoreBackend::Memory => {
            info!(capacity = settings.capacity, "using in-memory store");
            Ok(Arc::new(MemoryStore::with_capacity(settings.capacity)))
        }
        StoreBackend::Sqlite => {
            let path = &settings.sqlite_path;
            let backend = SqliteBackend::open(path)
                .with_context(|| format!("failed to open database {}", path.display()))?;
            info!(path = %path.display(), "using sqlite store");
            Ok(Arc::new(DurableStore::new(backend)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_settings() {
        let cli = Cli::parse_from([
            "thingsync",
            "--port",
            "8080",
            "--host",
            "127.0.0.1",
            "--log",
            "/tmp/thingsync.log",
            "--log-level",
            "debug",
            "--json-logs",
        ]);
        let mut settings = Settings::default();
        cli.apply(&mut settings);
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.logging.level, "debug");
        assert_eq!(
            settings.logging.file.as_deref(),
            Some(std::path::Path::new("/tmp/thingsync.log"))
        );
        assert!(settings.logging.json);
    }

    #[test]
    fn absent_flags_keep_settings() {
        let cli = Cli::parse_from(["thingsync"]);
        let mut settings = Settings::default();
        cli.apply(&mut settings);
        assert_eq!(settings.server.port, 9001);
        assert!(!settings.logging.json);
        assert_eq!(cli.config, PathBuf::from("thingsync.json"));
    }

    #[test]
    fn memory_store_is_default() {
        let store = open_store(&StoreSettings::default()).unwrap();
        assert!(store.list().unwrap().is_empty());
    }
}

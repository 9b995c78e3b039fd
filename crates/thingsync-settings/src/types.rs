//! Settings sections.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings object.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub server: ServerSettings,
    pub store: StoreSettings,
    pub session: SessionSettings,
    pub hub: HubSettings,
    pub logging: LoggingSettings,
}

impl Settings {
    /// Reject values the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.store.capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "store.capacity must be at least 1".into(),
            ));
        }
        if self.server.max_send_queue < 2 {
            return Err(SettingsError::InvalidValue(
                "server.maxSendQueue must hold at least the two handshake frames".into(),
            ));
        }
        if self.server.heartbeat_interval_secs == 0 {
            return Err(SettingsError::InvalidValue(
                "server.heartbeatIntervalSecs must be at least 1".into(),
            ));
        }
        if self.server.heartbeat_timeout_secs < self.server.heartbeat_interval_secs {
            return Err(SettingsError::InvalidValue(
                "server.heartbeatTimeoutSecs must not be shorter than the interval".into(),
            ));
        }
        if self.session.cookie.name.is_empty() {
            return Err(SettingsError::InvalidValue(
                "session.cookie.name must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// Network and per-connection transport settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// HTTP/WebSocket port (`0` picks a free port).
    pub port: u16,
    /// Outbound frames buffered per connection before sends are dropped.
    pub max_send_queue: usize,
    /// Interval between server pings.
    pub heartbeat_interval_secs: u64,
    /// Silence after which a client is disconnected.
    pub heartbeat_timeout_secs: u64,
    /// Largest accepted inbound frame, in bytes.
    pub max_message_size: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 9001,
            max_send_queue: 256,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
            max_message_size: 64 * 1024,
        }
    }
}

/// Which item store implementation backs the hub.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Fixed slot table in process memory.
    #[default]
    Memory,
    /// SQLite file via the row backend.
    Sqlite,
}

/// Item store settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreSettings {
    pub backend: StoreBackend,
    /// Slot count of the in-memory store.
    pub capacity: usize,
    /// Database file for the `sqlite` backend.
    pub sqlite_path: PathBuf,
    /// Names created at startup when the store is empty.
    pub seed: Vec<String>,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            capacity: 25,
            sqlite_path: PathBuf::from("thingsync.db"),
            seed: vec![
                "Bass-o-matic".to_string(),
                "Swill".to_string(),
                "Jam Hawkers".to_string(),
            ],
        }
    }
}

/// Session issuance settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionSettings {
    /// Lifetime of a new session; also the cookie max-age.
    pub lifetime_secs: u64,
    pub cookie: CookieSettings,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            lifetime_secs: 14 * 24 * 60 * 60,
            cookie: CookieSettings::default(),
        }
    }
}

/// Attributes of the session cookie.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CookieSettings {
    pub name: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    pub secure: bool,
    pub http_only: bool,
}

impl Default for CookieSettings {
    fn default() -> Self {
        Self {
            name: "sessionid".to_string(),
            path: "/".to_string(),
            domain: None,
            secure: false,
            http_only: true,
        }
    }
}

/// Hub behavior toggles.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HubSettings {
    /// Send a `things/error` frame back to the originator of a rejected
    /// mutation. Off by default: rejected mutations are only logged.
    pub reply_errors: bool,
}

/// Log output settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default level filter (`RUST_LOG` wins when set).
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
    /// Append logs to this file instead of stdout.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

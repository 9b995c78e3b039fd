//! Server configuration.

use std::time::Duration;

use thingsync_settings::{CookieSettings, Settings};

/// Runtime configuration for the HTTP/WebSocket server.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Outbound frames buffered per connection.
    pub max_send_queue: usize,
    pub heartbeat_interval: Duration,
    /// Close a connection after this long without any inbound frame.
    pub heartbeat_timeout: Duration,
    /// Max inbound WebSocket message size in bytes.
    pub max_message_size: usize,
    pub session_lifetime: Duration,
    pub cookie: CookieSettings,
    /// Reply `things/error` to the sender of a rejected request.
    pub reply_errors: bool,
    /// How long shutdown waits for the server task.
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_send_queue: 256,
            heartbeat_interval: Duration::from_secs(30),
            heartbeat_timeout: Duration::from_secs(90),
            max_message_size: 64 * 1024,
            session_lifetime: Duration::from_secs(14 * 24 * 60 * 60),
            cookie: CookieSettings::default(),
            reply_errors: false,
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}

impl From<&Settings> for ServerConfig {
    fn from(settings: &Settings) -> Self {
        let server = &settings.server;
        Self {
            host: server.host.clone(),
            port: server.port,
            max_send_queue: server.max_send_queue,
            heartbeat_interval: Duration::from_secs(server.heartbeat_interval_secs),
            heartbeat_timeout: Duration::from_secs(server.heartbeat_timeout_secs),
            max_message_size: server.max_message_size,
            session_lifetime: Duration::from_secs(settings.session.lifetime_secs),
            cookie: settings.session.cookie.clone(),
            reply_errors: settings.hub.reply_errors,
            ..Self::default()
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

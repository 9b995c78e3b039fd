//! # thingsync-server
//!
//! Axum HTTP + `WebSocket` server for the shared list.
//!
//! - `GET /session`: issue (or reuse) the session cookie
//! - `GET /events`: `WebSocket` feed; the hub broadcasts every item change
//!   and every join/leave to all connected clients
//! - `GET /health`: liveness and counters
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod connection;
pub mod error;
pub mod health;
pub mod hub;
pub mod server;
pub mod session;
pub mod shutdown;

pub use config::ServerConfig;
pub use connection::{Connection, ConnectionState};
pub use error::HubError;
pub use hub::{Delivery, Hub};
pub use server::{AppState, ServerHandle, build_router, start};
pub use shutdown::ShutdownCoordinator;

//! # thingsync-store
//!
//! Shared state behind the hub:
//!
//! - [`items`]: the [`ItemStore`] trait and the fixed-slot [`MemoryStore`]
//! - [`durable`]: [`DurableStore`] over any [`RowBackend`]
//! - [`sqlite`]: the SQLite row backend
//! - [`sessions`]: opaque session keys mapped to users
//! - [`users`]: anonymous user identities

#![deny(unsafe_code)]

pub mod durable;
pub mod error;
pub mod items;
pub mod sessions;
pub mod sqlite;
pub mod users;

pub use durable::{BackendError, DurableStore, ItemRow, RowBackend, RowFields, RowFilter};
pub use error::StoreError;
pub use items::{ItemStore, MemoryStore, seed_if_new};
pub use sessions::{Session, SessionRegistry, random_key};
pub use sqlite::SqliteBackend;
pub use users::UserRegistry;

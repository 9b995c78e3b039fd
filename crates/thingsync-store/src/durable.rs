//! Item store over a narrow row-persistence interface.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use thingsync_core::{Item, ItemCandidate};
use tracing::{instrument, warn};

use crate::error::StoreError;
use crate::items::{ItemStore, required_id, validated_name};

/// Failure reported by a [`RowBackend`].
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct BackendError(String);

impl BackendError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Columns of a new row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ItemRow {
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Columns to overwrite; `None` leaves a column as it is.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RowFields {
    pub name: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Which rows [`RowBackend::select`] returns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RowFilter {
    /// Rows without a deletion time.
    Live,
    /// The single row with this key, deleted or not.
    Key(i64),
    /// Every row, deleted or not.
    All,
}

/// Minimal persistence the durable store needs.
///
/// Keys are assigned by the backend on insert and are never reused.
/// `select` returns rows ordered by key.
pub trait RowBackend: Send {
    fn insert(&mut self, row: &ItemRow) -> Result<i64, BackendError>;
    fn update(&mut self, key: i64, fields: &RowFields) -> Result<(), BackendError>;
    fn select(&mut self, filter: RowFilter) -> Result<Vec<Item>, BackendError>;
}

/// [`ItemStore`] backed by a [`RowBackend`]. One lock serializes every call.
pub struct DurableStore<B> {
    backend: Mutex<B>,
}

impl<B: RowBackend> DurableStore<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend: Mutex::new(backend),
        }
    }

    fn live_row(backend: &mut B, id: i64) -> Result<Item, StoreError> {
        backend
            .select(RowFilter::Key(id))?
            .into_iter()
            .find(|item| item.id == id && !item.is_deleted())
            .ok_or(StoreError::NotFound(id))
    }
}

impl<B: RowBackend> ItemStore for DurableStore<B> {
    fn list(&self) -> Result<Vec<Item>, StoreError> {
        self.backend.lock().select(RowFilter::Live).map_err(|e| {
            warn!(error = %e, "listing items failed");
            e.into()
        })
    }

    #[instrument(skip(self), fields(name = ?candidate.name))]
    fn create(&self, candidate: &ItemCandidate) -> Result<Item, StoreError> {
        let row = ItemRow {
            name: validated_name(candidate)?,
            created_at: Utc::now(),
        };
        let id = self.backend.lock().insert(&row)?;
        Ok(Item {
            id,
            name: row.name,
            created_at: row.created_at,
            updated_at: None,
            deleted_at: None,
        })
    }

    #[instrument(skip(self), fields(item_id = ?candidate.id))]
    fn update(&self, candidate: &ItemCandidate) -> Result<Item, StoreError> {
        let id = required_id(candidate)?;
        let mut backend = self.backend.lock();
        let mut item = Self::live_row(&mut backend, id)?;
        let name = validated_name(candidate)?;
        let now = Utc::now();
        backend.update(
            id,
            &RowFields {
                name: Some(name.clone()),
                updated_at: Some(now),
                ..RowFields::default()
            },
        )?;
        item.name = name;
        item.updated_at = Some(now);
        Ok(item)
    }

    #[instrument(skip(self), fields(item_id = ?candidate.id))]
    fn delete(&self, candidate: &ItemCandidate) -> Result<Item, StoreError> {
        let id = required_id(candidate)?;
        let mut backend = self.backend.lock();
        let mut item = Self::live_row(&mut backend, id)?;
        let now = Utc::now();
        backend.update(
            id,
            &RowFields {
                deleted_at: Some(now),
                ..RowFields::default()
            },
        )?;
        item.deleted_at = Some(now);
        Ok(item)
    }

    fn is_pristine(&self) -> Result<bool, StoreError> {
        Ok(self.backend.lock().select(RowFilter::All)?.is_empty())
    }
}

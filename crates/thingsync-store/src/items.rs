//! Item storage.
//!
//! Every store validates and HTML-escapes names, assigns ids that are never
//! reused, and soft-deletes: a deleted item keeps its id and drops out of
//! [`ItemStore::list`].

use chrono::Utc;
use parking_lot::RwLock;
use thingsync_core::{Item, ItemCandidate, sanitize_name};
use tracing::{debug, instrument};

use crate::error::StoreError;

/// Concurrency-safe CRUD over items.
///
/// Mutations are atomic with respect to each other. `list` observes a
/// consistent snapshot and never includes soft-deleted items.
pub trait ItemStore: Send + Sync {
    /// Live items ordered by id.
    fn list(&self) -> Result<Vec<Item>, StoreError>;

    /// Store a new item from `candidate.name`.
    fn create(&self, candidate: &ItemCandidate) -> Result<Item, StoreError>;

    /// Rename the live item `candidate.id` to `candidate.name`.
    fn update(&self, candidate: &ItemCandidate) -> Result<Item, StoreError>;

    /// Soft-delete the live item `candidate.id`.
    fn delete(&self, candidate: &ItemCandidate) -> Result<Item, StoreError>;

    /// True when no item, live or deleted, has ever been stored.
    fn is_pristine(&self) -> Result<bool, StoreError>;
}

pub(crate) fn required_id(candidate: &ItemCandidate) -> Result<i64, StoreError> {
    candidate
        .id
        .ok_or_else(|| StoreError::Validation("an id is required".into()))
}

pub(crate) fn validated_name(candidate: &ItemCandidate) -> Result<String, StoreError> {
    Ok(sanitize_name(candidate.name.as_deref().unwrap_or_default())?)
}

/// In-process store with a fixed number of slots.
///
/// Slot `n` holds the item with id `n + 1`. A soft-deleted item keeps its
/// slot, so ids are never reused and the table can fill up.
pub struct MemoryStore {
    slots: RwLock<Vec<Option<Item>>>,
}

impl MemoryStore {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: RwLock::new(vec![None; capacity]),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.read().len()
    }

    fn slot_index(slots: &[Option<Item>], id: i64) -> Result<usize, StoreError> {
        let index = usize::try_from(id)
            .ok()
            .and_then(|id| id.checked_sub(1))
            .filter(|index| *index < slots.len())
            .ok_or(StoreError::NotFound(id))?;
        match &slots[index] {
            Some(item) if !item.is_deleted() => Ok(index),
            _ => Err(StoreError::NotFound(id)),
        }
    }
}

impl ItemStore for MemoryStore {
    fn list(&self) -> Result<Vec<Item>, StoreError> {
        let slots = self.slots.read();
        Ok(slots
            .iter()
            .flatten()
            .filter(|item| !item.is_deleted())
            .cloned()
            .collect())
    }

    #[instrument(skip(self), fields(name = ?candidate.name))]
    fn create(&self, candidate: &ItemCandidate) -> Result<Item, StoreError> {
        let name = validated_name(candidate)?;

        let mut slots = self.slots.write();
        let capacity = slots.len();
        let index = slots
            .iter()
            .position(Option::is_none)
            .ok_or(StoreError::CapacityExceeded { capacity })?;
        let id = i64::try_from(index + 1)
            .map_err(|_| StoreError::CapacityExceeded { capacity })?;

        let item = Item {
            id,
            name,
            created_at: Utc::now(),
            updated_at: None,
            deleted_at: None,
        };
        slots[index] = Some(item.clone());
        debug!(item_id = id, "item created");
        Ok(item)
    }

    #[instrument(skip(self), fields(item_id = ?candidate.id))]
    fn update(&self, candidate: &ItemCandidate) -> Result<Item, StoreError> {
        let id = required_id(candidate)?;

        let mut slots = self.slots.write();
        let index = Self::slot_index(&slots, id)?;
        let name = validated_name(candidate)?;
        let Some(item) = slots[index].as_mut() else {
            return Err(StoreError::NotFound(id));
        };
        item.name = name;
        item.updated_at = Some(Utc::now());
        Ok(item.clone())
    }

    #[instrument(skip(self), fields(item_id = ?candidate.id))]
    fn delete(&self, candidate: &ItemCandidate) -> Result<Item, StoreError> {
        let id = required_id(candidate)?;

        let mut slots = self.slots.write();
        let index = Self::slot_index(&slots, id)?;
        let Some(item) = slots[index].as_mut() else {
            return Err(StoreError::NotFound(id));
        };
        item.deleted_at = Some(Utc::now());
        Ok(item.clone())
    }

    fn is_pristine(&self) -> Result<bool, StoreError> {
        Ok(self.slots.read().iter().all(Option::is_none))
    }
}

/// Create one item per name when the store has never held an item.
///
/// A store whose items were all deleted is left empty. Returns how many
/// items were created.
pub fn seed_if_new(store: &dyn ItemStore, names: &[String]) -> Result<usize, StoreError> {
    if !store.is_pristine()? {
        return Ok(0);
    }
    for name in names {
        let _ = store.create(&ItemCandidate::named(name.as_str()))?;
    }
    Ok(names.len())
}

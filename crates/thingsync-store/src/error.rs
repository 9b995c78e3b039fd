use thingsync_core::NameError;

use crate::durable::BackendError;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("thing {0} does not exist")]
    NotFound(i64),

    #[error("only {capacity} items can be stored")]
    CapacityExceeded { capacity: usize },

    #[error("storage backend unavailable: {0}")]
    BackendUnavailable(String),
}

impl StoreError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::NotFound(_) => "not_found",
            Self::CapacityExceeded { .. } => "capacity_exceeded",
            Self::BackendUnavailable(_) => "backend_unavailable",
        }
    }
}

impl From<NameError> for StoreError {
    fn from(e: NameError) -> Self {
        StoreError::Validation(e.to_string())
    }
}

impl From<BackendError> for StoreError {
    fn from(e: BackendError) -> Self {
        StoreError::BackendUnavailable(e.to_string())
    }
}

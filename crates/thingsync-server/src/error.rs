use thingsync_core::ProtocolError;
use thingsync_store::StoreError;

/// Why an inbound message produced no broadcast.
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl HubError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Store(e) => e.kind(),
            Self::Protocol(e) => e.kind(),
        }
    }
}

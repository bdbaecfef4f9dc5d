use thiserror::Error;

use crate::store::StoreError;

/// Errors that abort processing of a single item.
///
/// Recoverable conditions (missing fields, bad magnets, duplicates) are
/// reported as an `IngestOutcome` instead.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

/// Why `enqueue` refused an item. The item is handed back.
#[derive(Debug, Error)]
pub enum EnqueueError<T> {
    #[error("Queue is full")]
    Full(T),

    #[error("Queue is shut down")]
    Closed(T),
}

impl<T> EnqueueError<T> {
    pub fn into_inner(self) -> T {
        match self {
            EnqueueError::Full(item) | EnqueueError::Closed(item) => item,
        }
    }
}

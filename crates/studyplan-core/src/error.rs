use thiserror::Error;

use crate::task::TaskId;

/// Failures surfaced by the task store and lifecycle operations.
///
/// Malformed persisted data has no variant: loading always
/// recovers to an empty store instead of failing.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("task not found: {0}")]
    NotFound(TaskId),

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("invalid value for {field}: {value:?}")]
    InvalidField { field: &'static str, value: String },

    /// The in-memory mutation already happened; the store is ahead of disk
    /// until [`crate::datastore::TaskStore::persist`] succeeds.
    #[error("failed to persist {key}")]
    Persist {
        key: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

pub type StoreResult<T> = Result<T, StoreError>;

use thiserror::Error;

use crate::record::{RecordId, RecordStatus};

pub type Result<T> = std::result::Result<T, HistoryError>;

/// Errors raised by the history core and the record store.
///
/// Only `Transport` and `MalformedResponse` can come out of a page fetch; the
/// pagination controller logs those and leaves its counters untouched so the
/// next poll tick or scroll event retries naturally.
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("record {0} not found")]
    NotFound(RecordId),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("record {id}: status cannot change from {from} to {to}")]
    InvalidTransition {
        id: RecordId,
        from: RecordStatus,
        to: RecordStatus,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl HistoryError {
    /// True for failures a later fetch may recover from on its own.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            HistoryError::Transport(_) | HistoryError::MalformedResponse(_) | HistoryError::Io(_)
        )
    }
}

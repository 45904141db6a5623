//! Error types for the store layer.

use thiserror::Error;
use worldmodel_types::WorldModelError;

/// Structural type errors raised while converting a wire object into a record.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("pose covariance must have 36 entries, found {found}")]
    CovarianceLength { found: usize },
    #[error("{field} must be finite")]
    NonFinite { field: &'static str },
}

/// Errors that can arise from store and backend operations.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Record serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Persistence backend unavailable: {0}")]
    Unavailable(String),
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
}

impl From<StoreError> for WorldModelError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Codec(e) => WorldModelError::Codec(e.to_string()),
            other => WorldModelError::Persistence(other.to_string()),
        }
    }
}

use thiserror::Error;
use worldmodel_types::WorldModelError;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("World model error: {0}")]
    Store(#[from] WorldModelError),
    #[error("Malformed map payload: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("No listeners for map topic {0}")]
    NoListeners(String),
}

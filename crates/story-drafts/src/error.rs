use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("failed to encode draft content: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("draft save task did not complete: {0}")]
    Task(String),

    #[error("no async runtime is available to schedule a save")]
    NoRuntime,
}

pub type StoreResult<T> = Result<T, StoreError>;

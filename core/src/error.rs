use thiserror::Error;

#[derive(Error, Debug)]
pub enum SegError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    #[error("Invalid snapshot: {reason}")]
    InvalidSnapshot { reason: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SegError {
    pub fn config(reason: impl Into<String>) -> Self {
        SegError::Configuration { reason: reason.into() }
    }
}

pub type SegResult<T> = Result<T, SegError>;

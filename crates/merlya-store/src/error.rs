//! Error types for the conversation store.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("conversation '{0}' not found")]
    NotFound(String),

    #[error("import data missing 'conversation' field")]
    MissingConversationField,

    #[error("sqlite error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

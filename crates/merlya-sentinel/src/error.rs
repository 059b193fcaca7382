//! Error types for the Sentinel monitoring agent.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SentinelError {
    #[error("cannot start sentinel with zero registered checks")]
    NoChecksRegistered,

    #[error("check '{0}' is not registered")]
    CheckNotFound(String),

    #[error("check '{0}' is already registered")]
    CheckAlreadyExists(String),

    #[error("alert '{0}' not found")]
    AlertNotFound(String),

    #[error("check execution failed: {0}")]
    CheckExecutionFailed(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, SentinelError>;

//! Error types for the CI adapter layer, grounded in
//! `athena_ai/ci/clients/base.py::CIClientError`.

use thiserror::Error;

/// Mirrors `CIClientError`: the original attaches `operation`, `exit_code`,
/// and `stderr` to every raised client error so callers can distinguish a
/// timeout from a nonzero exit from a "command not found".
#[derive(Error, Debug, Clone)]
#[error("ci client error in '{operation}': {message}")]
pub struct CIClientError {
    pub message: String,
    pub operation: String,
    pub exit_code: Option<i32>,
    pub stderr: Option<String>,
}

impl CIClientError {
    pub fn new(message: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            operation: operation.into(),
            exit_code: None,
            stderr: None,
        }
    }

    pub fn with_exit(mut self, exit_code: i32, stderr: impl Into<String>) -> Self {
        self.exit_code = Some(exit_code);
        self.stderr = Some(stderr.into());
        self
    }
}

#[derive(Error, Debug)]
pub enum CIError {
    #[error(transparent)]
    Client(#[from] CIClientError),

    #[error("no platform registered under '{0}'")]
    PlatformNotFound(String),

    #[error("platform '{0}' is already registered, overwriting")]
    PlatformAlreadyRegistered(String),

    #[error("no available client for platform '{0}'; ensure its CLI tool is installed or configure an alternative")]
    NoAvailableClient(String),

    #[error("no CI platform detected for this project")]
    NoPlatformDetected,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CIError>;

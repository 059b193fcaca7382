//! Error types for connectivity planning, the connection pool, and the
//! on-demand scanner.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SshError {
    #[error("circuit breaker open for host '{host}': {reason}")]
    CircuitBreakerOpen { host: String, reason: String },

    #[error("host key policy rejected '{host}': {reason}")]
    HostKeyRejected { host: String, reason: String },

    #[error("ssh authentication failed for {user}@{host}: {source}")]
    Authentication {
        user: String,
        host: String,
        #[source]
        source: ssh2::Error,
    },

    #[error("ssh transport error: {0}")]
    Transport(#[from] ssh2::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("timeout after {0}s")]
    Timeout(u64),

    #[error("no known_hosts file available and auto-add is disabled")]
    UnknownHostsUnavailable,

    #[error("no authentication method succeeded for {user}@{host}")]
    NoAuthMethodAvailable { user: String, host: String },
}

pub type Result<T> = std::result::Result<T, SshError>;

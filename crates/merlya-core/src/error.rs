//! Error types for the resilience, credential, classifier, planner and
//! skill subsystems.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("circuit breaker '{0}' is open")]
    CircuitBreakerOpen(String),

    #[error("operation exhausted {attempts} attempt(s): {source}")]
    RetryExhausted {
        attempts: u32,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("invalid regex '{pattern}' in skill '{skill}': {source}")]
    InvalidIntentPattern {
        skill: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("skill '{0}' not found")]
    SkillNotFound(String),

    #[error("skill config invalid: {0}")]
    InvalidSkillConfig(String),

    #[error("planner received malformed JSON: {0}")]
    MalformedPlan(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;

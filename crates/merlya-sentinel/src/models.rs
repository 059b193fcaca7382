//! Data model for health checks, results, and alerts, grounded in
//! `athena_ai/agents/sentinel.py` and `athena_ai/agents/sentinel_service/alerts.py`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckType {
    Ping,
    Port,
    Http,
    Custom,
}

/// Type-specific parameters for a [`HealthCheck`]. Only the fields
/// relevant to `check_type` are populated; the rest stay at their default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckParameters {
    pub port: Option<u16>,
    pub url: Option<String>,
    pub expected_status: Option<u16>,
    pub command: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    pub name: String,
    pub target: String,
    pub check_type: CheckType,
    pub parameters: CheckParameters,
    pub interval_seconds: u64,
    pub timeout_seconds: u64,
    pub threshold_failures: u32,
    pub enabled: bool,
}

impl HealthCheck {
    pub fn new(name: impl Into<String>, target: impl Into<String>, check_type: CheckType) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            check_type,
            parameters: CheckParameters::default(),
            interval_seconds: 60,
            timeout_seconds: 10,
            threshold_failures: 3,
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    pub check_name: String,
    pub success: bool,
    pub response_time_ms: u64,
    pub timestamp: DateTime<Utc>,
    pub error: Option<String>,
    pub details: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

impl AlertSeverity {
    /// Severity at exactly `1x`/`2x`/`3x` the check's failure threshold,
    /// capping at `Critical` for anything past `3x`.
    pub fn from_failure_count(count: u32, threshold: u32) -> Self {
        if count >= threshold.saturating_mul(3) {
            AlertSeverity::Critical
        } else if count >= threshold.saturating_mul(2) {
            AlertSeverity::Warning
        } else {
            AlertSeverity::Info
        }
    }

    pub fn incident_priority(self) -> &'static str {
        match self {
            AlertSeverity::Critical => "P1",
            AlertSeverity::Warning => "P2",
            AlertSeverity::Info => "P3",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub check_name: String,
    pub target: String,
    pub severity: AlertSeverity,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub consecutive_failures: u32,
    pub acknowledged: bool,
    pub incident_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SentinelStatus {
    Stopped,
    Running,
    Paused,
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_escalates_at_threshold_multiples() {
        assert_eq!(AlertSeverity::from_failure_count(3, 3), AlertSeverity::Info);
        assert_eq!(AlertSeverity::from_failure_count(6, 3), AlertSeverity::Warning);
        assert_eq!(AlertSeverity::from_failure_count(9, 3), AlertSeverity::Critical);
        assert_eq!(AlertSeverity::from_failure_count(100, 3), AlertSeverity::Critical);
    }

    #[test]
    fn incident_priority_maps_severity() {
        assert_eq!(AlertSeverity::Critical.incident_priority(), "P1");
        assert_eq!(AlertSeverity::Warning.incident_priority(), "P2");
        assert_eq!(AlertSeverity::Info.incident_priority(), "P3");
    }
}

//! Skill configuration and result types, grounded in `merlya/skills/models.py`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkillStatus {
    Pending,
    Running,
    Success,
    /// Some hosts succeeded, some failed.
    Partial,
    Failed,
    Timeout,
    Cancelled,
}

impl SkillStatus {
    fn emoji(&self) -> &'static str {
        match self {
            SkillStatus::Success => "\u{2705}",
            SkillStatus::Partial => "\u{26a0}\u{fe0f}",
            SkillStatus::Failed => "\u{274c}",
            SkillStatus::Timeout => "\u{23f1}\u{fe0f}",
            SkillStatus::Cancelled => "\u{1f6ab}",
            SkillStatus::Running => "\u{1f504}",
            SkillStatus::Pending => "\u{23f3}",
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            SkillStatus::Pending => "pending",
            SkillStatus::Running => "running",
            SkillStatus::Success => "success",
            SkillStatus::Partial => "partial",
            SkillStatus::Failed => "failed",
            SkillStatus::Timeout => "timeout",
            SkillStatus::Cancelled => "cancelled",
        }
    }
}

fn default_require_confirmation_for() -> Vec<String> {
    vec![
        "restart".to_string(),
        "kill".to_string(),
        "delete".to_string(),
        "stop".to_string(),
    ]
}

fn default_version() -> String {
    "1.0".to_string()
}

fn default_max_hosts() -> u32 {
    5
}

fn default_timeout_seconds() -> u32 {
    120
}

/// Reusable, YAML-defined workflow that runs on one or more hosts. Mirrors
/// the fields of a `SkillConfig` pydantic model one-to-one; `max_hosts` and
/// `timeout_seconds` bounds (1..=100, 10..=600) are enforced by the loader
/// rather than by the type itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillConfig {
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub intent_patterns: Vec<String>,

    #[serde(default)]
    pub input_schema: Option<String>,
    #[serde(default)]
    pub output_schema: Option<String>,

    #[serde(default)]
    pub tools_allowed: Vec<String>,

    #[serde(default = "default_max_hosts")]
    pub max_hosts: u32,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u32,

    #[serde(default = "default_require_confirmation_for")]
    pub require_confirmation_for: Vec<String>,

    #[serde(default)]
    pub system_prompt: Option<String>,

    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub builtin: bool,

    #[serde(default)]
    pub source_path: Option<String>,
}

impl SkillConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !(1..=100).contains(&self.max_hosts) {
            return Err(format!("max_hosts must be 1..=100, got {}", self.max_hosts));
        }
        if !(10..=600).contains(&self.timeout_seconds) {
            return Err(format!(
                "timeout_seconds must be 10..=600, got {}",
                self.timeout_seconds
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostResult {
    pub host: String,
    pub success: bool,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub tool_calls: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillResult {
    pub skill_name: String,
    pub execution_id: String,
    pub status: SkillStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub host_results: Vec<HostResult>,
    #[serde(default)]
    pub total_hosts: u32,
    #[serde(default)]
    pub succeeded_hosts: u32,
    #[serde(default)]
    pub failed_hosts: u32,
    #[serde(default)]
    pub summary: Option<String>,
}

impl SkillResult {
    pub fn success_rate(&self) -> f64 {
        if self.total_hosts == 0 {
            return 0.0;
        }
        (self.succeeded_hosts as f64 / self.total_hosts as f64) * 100.0
    }

    pub fn is_success(&self) -> bool {
        self.status == SkillStatus::Success
    }

    pub fn is_partial(&self) -> bool {
        self.status == SkillStatus::Partial
    }

    pub fn to_summary(&self) -> String {
        if let Some(summary) = &self.summary {
            return summary.clone();
        }

        format!(
            "{} {}: {} ({}/{} hosts, {:.0}%)",
            self.status.emoji(),
            self.skill_name,
            self.status.as_str(),
            self.succeeded_hosts,
            self.total_hosts,
            self.success_rate()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(status: SkillStatus, succeeded: u32, total: u32) -> SkillResult {
        SkillResult {
            skill_name: "disk_audit".to_string(),
            execution_id: "abc123".to_string(),
            status,
            started_at: Utc::now(),
            completed_at: Some(Utc::now()),
            duration_ms: 120,
            host_results: vec![],
            total_hosts: total,
            succeeded_hosts: succeeded,
            failed_hosts: total - succeeded,
            summary: None,
        }
    }

    #[test]
    fn success_rate_and_summary_emoji() {
        let r = result(SkillStatus::Partial, 3, 4);
        assert_eq!(r.success_rate(), 75.0);
        assert!(r.is_partial());
        assert!(!r.is_success());
        assert!(r.to_summary().contains("3/4 hosts"));
    }

    #[test]
    fn zero_hosts_has_zero_success_rate() {
        let r = result(SkillStatus::Failed, 0, 0);
        assert_eq!(r.success_rate(), 0.0);
    }

    #[test]
    fn validate_rejects_out_of_range_bounds() {
        let mut config = sample_config();
        config.max_hosts = 0;
        assert!(config.validate().is_err());

        config.max_hosts = 5;
        config.timeout_seconds = 5;
        assert!(config.validate().is_err());
    }

    fn sample_config() -> SkillConfig {
        SkillConfig {
            name: "disk_audit".to_string(),
            version: default_version(),
            description: String::new(),
            intent_patterns: vec![],
            input_schema: None,
            output_schema: None,
            tools_allowed: vec![],
            max_hosts: default_max_hosts(),
            timeout_seconds: default_timeout_seconds(),
            require_confirmation_for: default_require_confirmation_for(),
            system_prompt: None,
            author: None,
            tags: vec![],
            builtin: false,
            source_path: None,
        }
    }
}

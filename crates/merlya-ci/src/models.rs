//! Unified CI data model, grounded field-for-field in
//! `athena_ai/ci/models.py` and the `RunStatus`/`CIPlatformType` enums of
//! `athena_ai/ci/protocols.py`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The platform family a [`Run`] or adapter belongs to. Only GitHub is
/// fully wired up; the rest exist so detection and registry lookups have
/// somewhere to point once an adapter is added.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CIPlatformType {
    GitHub,
    GitLab,
    Jenkins,
    CircleCi,
    Azure,
    Bitbucket,
    Travis,
    Custom,
}

impl std::fmt::Display for CIPlatformType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CIPlatformType::GitHub => "github",
            CIPlatformType::GitLab => "gitlab",
            CIPlatformType::Jenkins => "jenkins",
            CIPlatformType::CircleCi => "circleci",
            CIPlatformType::Azure => "azure",
            CIPlatformType::Bitbucket => "bitbucket",
            CIPlatformType::Travis => "travis",
            CIPlatformType::Custom => "custom",
        };
        write!(f, "{s}")
    }
}

/// Normalized run/job/step status, spanning the vocabularies of every
/// platform in [`CIPlatformType`]. Construct from a platform's native
/// string with [`RunStatus::from_github`] / [`RunStatus::from_gitlab`] /
/// [`RunStatus::from_jenkins`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Queued,
    Running,
    Success,
    Failure,
    Cancelled,
    Skipped,
    TimedOut,
    Unknown,
}

impl RunStatus {
    /// Maps `gh run list/view`'s combined `status`/`conclusion` vocabulary.
    pub fn from_github(status: &str, conclusion: Option<&str>) -> Self {
        if let Some(conclusion) = conclusion {
            return match conclusion {
                "success" => RunStatus::Success,
                "failure" | "startup_failure" => RunStatus::Failure,
                "cancelled" => RunStatus::Cancelled,
                "skipped" | "neutral" => RunStatus::Skipped,
                "timed_out" => RunStatus::TimedOut,
                _ => RunStatus::Unknown,
            };
        }
        match status {
            "queued" => RunStatus::Queued,
            "in_progress" => RunStatus::Running,
            "completed" => RunStatus::Success,
            "waiting" | "requested" | "pending" => RunStatus::Pending,
            _ => RunStatus::Unknown,
        }
    }

    /// Maps GitLab's pipeline/job `status` field.
    pub fn from_gitlab(status: &str) -> Self {
        match status {
            "created" | "waiting_for_resource" | "preparing" => RunStatus::Pending,
            "pending" => RunStatus::Queued,
            "running" => RunStatus::Running,
            "success" => RunStatus::Success,
            "failed" => RunStatus::Failure,
            "canceled" | "cancelled" => RunStatus::Cancelled,
            "skipped" | "manual" => RunStatus::Skipped,
            _ => RunStatus::Unknown,
        }
    }

    /// Maps Jenkins' build `result`/`building` fields.
    pub fn from_jenkins(result: Option<&str>, building: bool) -> Self {
        if building {
            return RunStatus::Running;
        }
        match result {
            Some("SUCCESS") => RunStatus::Success,
            Some("FAILURE") => RunStatus::Failure,
            Some("ABORTED") => RunStatus::Cancelled,
            Some("NOT_BUILT") => RunStatus::Skipped,
            Some("UNSTABLE") => RunStatus::Failure,
            None => RunStatus::Pending,
            _ => RunStatus::Unknown,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Pending | RunStatus::Queued | RunStatus::Running)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub name: String,
    pub status: RunStatus,
    pub number: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub log: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub name: String,
    pub status: RunStatus,
    pub steps: Vec<Step>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub url: Option<String>,
}

impl Job {
    pub fn is_failed(&self) -> bool {
        matches!(self.status, RunStatus::Failure | RunStatus::TimedOut)
    }

    pub fn failed_steps(&self) -> Vec<&Step> {
        self.steps
            .iter()
            .filter(|s| matches!(s.status, RunStatus::Failure | RunStatus::TimedOut))
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: String,
    pub name: String,
    pub path: Option<String>,
    pub state: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: String,
    pub platform: CIPlatformType,
    pub workflow_name: String,
    pub status: RunStatus,
    pub branch: String,
    pub commit_sha: String,
    pub event: Option<String>,
    pub url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub jobs: Vec<Job>,
}

impl Run {
    pub fn is_failed(&self) -> bool {
        matches!(self.status, RunStatus::Failure | RunStatus::TimedOut)
    }

    pub fn is_running(&self) -> bool {
        matches!(self.status, RunStatus::Pending | RunStatus::Queued | RunStatus::Running)
    }

    pub fn failed_jobs(&self) -> Vec<&Job> {
        self.jobs.iter().filter(|j| j.is_failed()).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunLogs {
    pub run_id: String,
    pub full_log: String,
    pub job_logs: Vec<(String, String)>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionReport {
    pub platform: CIPlatformType,
    pub authenticated: bool,
    pub account: Option<String>,
    pub can_trigger_workflows: bool,
    pub can_view_secrets: bool,
    pub can_view_variables: bool,
    pub missing_scopes: Vec<String>,
}

/// The 14 canonical CI failure categories, ported from
/// `athena_ai/ci/models.py::CIErrorType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CIErrorType {
    CompilationError,
    TestFailure,
    DependencyError,
    LintError,
    TypeError,
    TimeoutError,
    PermissionError,
    ConfigurationError,
    NetworkError,
    FlakyTest,
    ResourceExhaustion,
    SecurityVulnerability,
    InfrastructureError,
    Unknown,
}

impl std::fmt::Display for CIErrorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CIErrorType::CompilationError => "compilation_error",
            CIErrorType::TestFailure => "test_failure",
            CIErrorType::DependencyError => "dependency_error",
            CIErrorType::LintError => "lint_error",
            CIErrorType::TypeError => "type_error",
            CIErrorType::TimeoutError => "timeout_error",
            CIErrorType::PermissionError => "permission_error",
            CIErrorType::ConfigurationError => "configuration_error",
            CIErrorType::NetworkError => "network_error",
            CIErrorType::FlakyTest => "flaky_test",
            CIErrorType::ResourceExhaustion => "resource_exhaustion",
            CIErrorType::SecurityVulnerability => "security_vulnerability",
            CIErrorType::InfrastructureError => "infrastructure_error",
            CIErrorType::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureAnalysis {
    pub run_id: String,
    pub error_type: CIErrorType,
    pub confidence: f32,
    pub failed_jobs: Vec<String>,
    pub summary: String,
    pub suggestions: Vec<String>,
    pub extracted_errors: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectedPlatform {
    pub platform: CIPlatformType,
    pub confidence: f32,
    pub source: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn github_conclusion_takes_priority_over_status() {
        assert_eq!(RunStatus::from_github("completed", Some("failure")), RunStatus::Failure);
        assert_eq!(RunStatus::from_github("in_progress", None), RunStatus::Running);
    }

    #[test]
    fn gitlab_status_mapping() {
        assert_eq!(RunStatus::from_gitlab("success"), RunStatus::Success);
        assert_eq!(RunStatus::from_gitlab("bogus"), RunStatus::Unknown);
    }

    #[test]
    fn jenkins_building_overrides_result() {
        assert_eq!(RunStatus::from_jenkins(Some("SUCCESS"), true), RunStatus::Running);
        assert_eq!(RunStatus::from_jenkins(Some("FAILURE"), false), RunStatus::Failure);
    }

    #[test]
    fn run_failed_jobs_filters_correctly() {
        let run = Run {
            id: "1".into(),
            platform: CIPlatformType::GitHub,
            workflow_name: "ci".into(),
            status: RunStatus::Failure,
            branch: "main".into(),
            commit_sha: "abc".into(),
            event: None,
            url: None,
            created_at: Utc::now(),
            updated_at: None,
            jobs: vec![
                Job {
                    id: "a".into(),
                    name: "build".into(),
                    status: RunStatus::Success,
                    steps: vec![],
                    started_at: None,
                    completed_at: None,
                    url: None,
                },
                Job {
                    id: "b".into(),
                    name: "test".into(),
                    status: RunStatus::Failure,
                    steps: vec![],
                    started_at: None,
                    completed_at: None,
                    url: None,
                },
            ],
        };
        assert!(run.is_failed());
        assert_eq!(run.failed_jobs().len(), 1);
        assert_eq!(run.failed_jobs()[0].name, "test");
    }
}

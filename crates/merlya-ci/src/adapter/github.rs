//! GitHub adapter, grounded in `athena_ai/ci/adapters/github.py::GitHubCIAdapter`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::adapter::{AdapterCore, CIPlatform};
use crate::client::cli::CLIClient;
use crate::client::CIOperation;
use crate::config::CIConfig;
use crate::error::{CIClientError, Result};
use crate::models::{CIPlatformType, Job, PermissionReport, Run, RunLogs, RunStatus, Step, Workflow};

/// Markers the original scans log text for when extracting error lines,
/// ported verbatim from `GitHubCIAdapter._extract_errors`.
const ERROR_MARKERS: &[&str] = &["error:", "Error:", "ERROR:", "FAILED", "failed:", "##[error]", "fatal:", "panicked at"];

pub struct GitHubAdapter {
    config: CIConfig,
    core: AdapterCore,
}

impl GitHubAdapter {
    pub fn new(config: CIConfig) -> Self {
        let repo_slug = config.repo_slug();
        let core = AdapterCore::new(vec![Box::new(CLIClient::new(CIPlatformType::GitHub, repo_slug))]);
        Self { config, core }
    }

    async fn exec(&self, operation: CIOperation, params: &[(&str, &str)]) -> Result<Value> {
        self.core.execute("github", operation, params).await
    }

    fn parse_step(value: &Value) -> Step {
        Step {
            name: value["name"].as_str().unwrap_or_default().to_string(),
            status: RunStatus::from_github(
                value["status"].as_str().unwrap_or_default(),
                value["conclusion"].as_str(),
            ),
            number: value["number"].as_u64().unwrap_or_default() as u32,
            started_at: parse_timestamp(value["startedAt"].as_str()),
            completed_at: parse_timestamp(value["completedAt"].as_str()),
            log: None,
        }
    }

    fn parse_job(value: &Value) -> Job {
        let steps = value["steps"].as_array().map(|a| a.iter().map(Self::parse_step).collect()).unwrap_or_default();
        Job {
            id: value["databaseId"].as_u64().map(|n| n.to_string()).unwrap_or_else(|| value["id"].as_str().unwrap_or_default().to_string()),
            name: value["name"].as_str().unwrap_or_default().to_string(),
            status: RunStatus::from_github(value["status"].as_str().unwrap_or_default(), value["conclusion"].as_str()),
            steps,
            started_at: parse_timestamp(value["startedAt"].as_str()),
            completed_at: parse_timestamp(value["completedAt"].as_str()),
            url: value["url"].as_str().map(str::to_string),
        }
    }

    fn parse_run(value: &Value) -> Run {
        let jobs = value["jobs"].as_array().map(|a| a.iter().map(Self::parse_job).collect()).unwrap_or_default();
        Run {
            id: value["databaseId"].as_u64().map(|n| n.to_string()).unwrap_or_default(),
            platform: CIPlatformType::GitHub,
            workflow_name: value["name"].as_str().unwrap_or_default().to_string(),
            status: RunStatus::from_github(value["status"].as_str().unwrap_or_default(), value["conclusion"].as_str()),
            branch: value["headBranch"].as_str().unwrap_or_default().to_string(),
            commit_sha: value["headSha"].as_str().unwrap_or_default().to_string(),
            event: value["event"].as_str().map(str::to_string),
            url: value["url"].as_str().map(str::to_string),
            created_at: parse_timestamp(value["createdAt"].as_str()).unwrap_or_else(Utc::now),
            updated_at: parse_timestamp(value["updatedAt"].as_str()),
            jobs,
        }
    }

    /// Partitions a combined failed-job log into `(job_name, log_text)`
    /// pairs. `gh run view --log-failed` tab-prefixes every line with its
    /// job and step name, so this groups lines by job the same way
    /// `GitHubCIAdapter._parse_job_logs` does.
    fn parse_job_logs(raw: &str) -> Vec<(String, String)> {
        let mut grouped: Vec<(String, String)> = Vec::new();
        for line in raw.lines() {
            let Some((job_name, rest)) = line.split_once('\t') else {
                continue;
            };
            match grouped.last_mut() {
                Some((name, buf)) if name == job_name => {
                    buf.push('\n');
                    buf.push_str(rest);
                }
                _ => grouped.push((job_name.to_string(), rest.to_string())),
            }
        }
        grouped
    }

    fn extract_errors(log: &str) -> Vec<String> {
        log.lines()
            .filter(|line| ERROR_MARKERS.iter().any(|m| line.contains(m)))
            .map(|line| {
                let trimmed = line.trim();
                if trimmed.len() > 500 {
                    trimmed[..500].to_string()
                } else {
                    trimmed.to_string()
                }
            })
            .filter(|line| line.len() > 10)
            .collect()
    }
}

fn parse_timestamp(value: Option<&str>) -> Option<DateTime<Utc>> {
    value.and_then(|s| DateTime::parse_from_rfc3339(s).ok()).map(|dt| dt.with_timezone(&Utc))
}

#[async_trait]
impl CIPlatform for GitHubAdapter {
    fn config(&self) -> &CIConfig {
        &self.config
    }

    async fn is_authenticated(&self) -> bool {
        match self.exec(CIOperation::AuthStatus, &[]).await {
            Ok(value) => value["authenticated"].as_bool().unwrap_or(false),
            Err(_) => false,
        }
    }

    async fn list_workflows(&self) -> Result<Vec<Workflow>> {
        let value = self.exec(CIOperation::ListWorkflows, &[]).await?;
        let workflows = value
            .as_array()
            .ok_or_else(|| CIClientError::new("expected array from workflow list", "list_workflows"))?
            .iter()
            .map(|w| Workflow {
                id: w["id"].as_u64().map(|n| n.to_string()).unwrap_or_default(),
                name: w["name"].as_str().unwrap_or_default().to_string(),
                path: w["path"].as_str().map(str::to_string),
                state: w["state"].as_str().map(str::to_string),
            })
            .collect();
        Ok(workflows)
    }

    async fn list_runs(&self, branch: Option<&str>, limit: u32) -> Result<Vec<Run>> {
        let limit_str = limit.to_string();
        let value = match branch {
            Some(branch) => self.exec(CIOperation::ListRunsFiltered, &[("branch", branch), ("limit", &limit_str)]).await?,
            None => self.exec(CIOperation::ListRuns, &[("limit", &limit_str)]).await?,
        };
        let runs = value
            .as_array()
            .ok_or_else(|| CIClientError::new("expected array from run list", "list_runs"))?
            .iter()
            .map(Self::parse_run)
            .collect();
        Ok(runs)
    }

    async fn get_run(&self, run_id: &str) -> Result<Run> {
        let value = self.exec(CIOperation::GetRun, &[("run_id", run_id)]).await?;
        Ok(Self::parse_run(&value))
    }

    async fn get_run_logs(&self, run_id: &str, failed_only: bool) -> Result<RunLogs> {
        let op = if failed_only { CIOperation::GetRunLogs } else { CIOperation::GetRunLogsFull };
        let value = self.exec(op, &[("run_id", run_id)]).await?;
        let raw = value.as_str().unwrap_or_default().to_string();
        let job_logs = Self::parse_job_logs(&raw);
        Ok(RunLogs {
            run_id: run_id.to_string(),
            full_log: raw,
            job_logs,
        })
    }

    async fn trigger_workflow(&self, workflow_id: &str, branch: &str, inputs: Option<&str>) -> Result<()> {
        match inputs {
            Some(inputs) => {
                self.exec(CIOperation::TriggerWorkflowInputs, &[("workflow_id", workflow_id), ("branch", branch), ("inputs", inputs)])
                    .await?;
            }
            None => {
                self.exec(CIOperation::TriggerWorkflow, &[("workflow_id", workflow_id), ("branch", branch)]).await?;
            }
        }
        Ok(())
    }

    async fn cancel_run(&self, run_id: &str) -> Result<()> {
        self.exec(CIOperation::CancelRun, &[("run_id", run_id)]).await?;
        Ok(())
    }

    async fn retry_run(&self, run_id: &str, failed_only: bool) -> Result<()> {
        let op = if failed_only { CIOperation::RetryRunFailed } else { CIOperation::RetryRun };
        self.exec(op, &[("run_id", run_id)]).await?;
        Ok(())
    }

    async fn check_permissions(&self) -> Result<PermissionReport> {
        let auth = self.exec(CIOperation::AuthStatus, &[]).await?;
        let authenticated = auth["authenticated"].as_bool().unwrap_or(false);
        let account = auth["account"].as_str().map(str::to_string);

        let can_view_secrets = self.exec(CIOperation::ListSecrets, &[]).await.is_ok();
        let can_view_variables = self.exec(CIOperation::ListVariables, &[]).await.is_ok();

        Ok(PermissionReport {
            platform: CIPlatformType::GitHub,
            authenticated,
            account,
            can_trigger_workflows: authenticated,
            can_view_secrets,
            can_view_variables,
            missing_scopes: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_errors_filters_markers_and_short_lines() {
        let log = "building...\nerror: cannot find value `x`\nok\nFAILED at step 3\ntiny";
        let errors = GitHubAdapter::extract_errors(log);
        assert_eq!(errors.len(), 2);
        assert!(errors[0].contains("cannot find value"));
    }

    #[test]
    fn parse_job_logs_groups_by_job_name() {
        let raw = "build\tcompiling crate foo\nbuild\tcompiling crate bar\ntest\trunning suite";
        let grouped = GitHubAdapter::parse_job_logs(raw);
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[0].0, "build");
        assert!(grouped[0].1.contains("foo"));
        assert!(grouped[0].1.contains("bar"));
        assert_eq!(grouped[1].0, "test");
    }

    #[test]
    fn parse_run_reads_github_json_shape() {
        let value = serde_json::json!({
            "databaseId": 42,
            "name": "ci",
            "status": "completed",
            "conclusion": "failure",
            "headBranch": "main",
            "headSha": "abc123",
            "event": "push",
            "url": "https://github.com/acme/widgets/actions/runs/42",
            "createdAt": "2026-01-01T00:00:00Z",
            "jobs": []
        });
        let run = GitHubAdapter::parse_run(&value);
        assert_eq!(run.id, "42");
        assert!(run.is_failed());
        assert_eq!(run.branch, "main");
    }
}

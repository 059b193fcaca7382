//! Skill executor, grounded in `merlya/skills/executor.py`.
//!
//! Runs a skill across hosts with bounded concurrency, per-host timeouts,
//! and tool filtering, then aggregates per-host outcomes into one
//! [`SkillResult`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Semaphore;

use super::models::{HostResult, SkillConfig, SkillResult, SkillStatus};

const DEFAULT_MAX_CONCURRENT: usize = 5;

/// Runs the skill's actual work on a single host. Production callers wire
/// this to the subagent/tool-call machinery; tests and the default executor
/// construction use a simple simulated runner.
#[async_trait::async_trait]
pub trait HostRunner: Send + Sync {
    async fn run(&self, skill: &SkillConfig, host: &str, task: &str) -> Result<String, String>;
}

/// Placeholder runner matching the original's `_simulate_execution`: no
/// real subagent wiring yet, just an acknowledgement string.
pub struct SimulatedRunner;

#[async_trait::async_trait]
impl HostRunner for SimulatedRunner {
    async fn run(&self, skill: &SkillConfig, host: &str, task: &str) -> Result<String, String> {
        tokio::time::sleep(Duration::from_millis(100)).await;
        let truncated: String = task.chars().take(50).collect();
        Ok(format!("[{}] Executed on {host}: {truncated}...", skill.name))
    }
}

pub struct SkillExecutor {
    runner: Arc<dyn HostRunner>,
    max_concurrent: usize,
}

impl SkillExecutor {
    pub fn new(runner: Arc<dyn HostRunner>, max_concurrent: Option<usize>) -> Self {
        tracing::debug!("skill executor initialized");
        Self {
            runner,
            max_concurrent: max_concurrent.unwrap_or(DEFAULT_MAX_CONCURRENT),
        }
    }

    pub fn with_simulated_runner() -> Self {
        Self::new(Arc::new(SimulatedRunner), None)
    }

    /// Executes `skill` against `hosts`, enforcing the skill's own
    /// `max_hosts` cap (truncating and logging if exceeded), running at most
    /// `min(max_concurrent, skill.max_hosts)` hosts at once, and collecting
    /// each host's outcome even if its future panics or times out.
    pub async fn execute(&self, skill: &SkillConfig, hosts: &[String], task: &str) -> SkillResult {
        let execution_id = uuid::Uuid::new_v4().to_string()[..8].to_string();
        let started_at = Utc::now();

        tracing::info!(
            skill = %skill.name,
            hosts = hosts.len(),
            execution_id = %execution_id,
            "executing skill"
        );

        let effective_hosts: Vec<String> = if hosts.len() > skill.max_hosts as usize {
            tracing::warn!(
                requested = hosts.len(),
                skill_max = skill.max_hosts,
                "limiting hosts to skill max"
            );
            hosts[..skill.max_hosts as usize].to_vec()
        } else {
            hosts.to_vec()
        };

        let semaphore = Arc::new(Semaphore::new(
            self.max_concurrent.min(skill.max_hosts as usize).max(1),
        ));

        let mut handles = Vec::with_capacity(effective_hosts.len());
        for host in &effective_hosts {
            let semaphore = semaphore.clone();
            let runner = self.runner.clone();
            let skill = skill.clone();
            let task = task.to_string();
            let host = host.clone();

            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire().await.expect("semaphore closed");
                execute_single(&*runner, &skill, &host, &task).await
            }));
        }

        let mut host_results = Vec::with_capacity(handles.len());
        for (host, handle) in effective_hosts.iter().zip(handles) {
            match handle.await {
                Ok(result) => host_results.push(result),
                Err(join_err) => host_results.push(HostResult {
                    host: host.clone(),
                    success: false,
                    output: None,
                    error: Some(join_err.to_string()),
                    duration_ms: 0,
                    tool_calls: 0,
                }),
            }
        }

        let completed_at = Utc::now();
        let duration_ms = (completed_at - started_at).num_milliseconds().max(0) as u64;

        let succeeded = host_results.iter().filter(|r| r.success).count() as u32;
        let failed = host_results.len() as u32 - succeeded;

        let status = if failed == 0 {
            SkillStatus::Success
        } else if succeeded == 0 {
            SkillStatus::Failed
        } else {
            SkillStatus::Partial
        };

        let result = SkillResult {
            skill_name: skill.name.clone(),
            execution_id,
            status,
            started_at,
            completed_at: Some(completed_at),
            duration_ms,
            total_hosts: host_results.len() as u32,
            succeeded_hosts: succeeded,
            failed_hosts: failed,
            host_results,
            summary: None,
        };

        tracing::info!(skill = %skill.name, summary = %result.to_summary(), "skill completed");
        result
    }

    /// Fast-path failure, used when host-count policy validation rejects
    /// the request before any host is touched.
    pub fn create_failed_result(skill: &SkillConfig, error: &str) -> SkillResult {
        let now = Utc::now();
        SkillResult {
            skill_name: skill.name.clone(),
            execution_id: uuid::Uuid::new_v4().to_string()[..8].to_string(),
            status: SkillStatus::Failed,
            started_at: now,
            completed_at: Some(now),
            duration_ms: 0,
            host_results: vec![],
            total_hosts: 0,
            succeeded_hosts: 0,
            failed_hosts: 0,
            summary: Some(format!("Execution failed: {error}")),
        }
    }

    /// True if `operation` is confirmed or needs no confirmation at all.
    /// `confirm` is only invoked when the skill's `require_confirmation_for`
    /// list matches; its absence is treated as "not confirmed" rather than
    /// "confirmed", matching the original's fail-closed default.
    pub async fn check_confirmation<F, Fut>(skill: &SkillConfig, operation: &str, confirm: Option<F>) -> bool
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = bool>,
    {
        let op_lower = operation.to_lowercase();
        let needs_confirmation = skill
            .require_confirmation_for
            .iter()
            .any(|prefix| op_lower.starts_with(prefix.as_str()));

        if !needs_confirmation {
            return true;
        }

        match confirm {
            Some(callback) => callback(format!("Confirm {operation}?")).await,
            None => {
                tracing::warn!(operation, "operation requires confirmation but no callback provided");
                false
            }
        }
    }

    pub fn filter_tools(skill: &SkillConfig, available_tools: &[String]) -> Vec<String> {
        if skill.tools_allowed.is_empty() {
            return available_tools.to_vec();
        }
        let allowed: std::collections::HashSet<&str> =
            skill.tools_allowed.iter().map(String::as_str).collect();
        available_tools
            .iter()
            .filter(|t| allowed.contains(t.as_str()))
            .cloned()
            .collect()
    }
}

async fn execute_single(runner: &dyn HostRunner, skill: &SkillConfig, host: &str, task: &str) -> HostResult {
    let start = std::time::Instant::now();
    let timeout = Duration::from_secs(skill.timeout_seconds as u64);

    match tokio::time::timeout(timeout, runner.run(skill, host, task)).await {
        Ok(Ok(output)) => HostResult {
            host: host.to_string(),
            success: true,
            output: Some(output),
            error: None,
            duration_ms: start.elapsed().as_millis() as u64,
            tool_calls: 1,
        },
        Ok(Err(error)) => {
            tracing::error!(host, error, "error executing skill on host");
            HostResult {
                host: host.to_string(),
                success: false,
                output: None,
                error: Some(error),
                duration_ms: start.elapsed().as_millis() as u64,
                tool_calls: 0,
            }
        }
        Err(_elapsed) => {
            tracing::warn!(host, timeout_s = skill.timeout_seconds, "timeout executing skill on host");
            HostResult {
                host: host.to_string(),
                success: false,
                output: None,
                error: Some(format!("Timeout after {}s", skill.timeout_seconds)),
                duration_ms: start.elapsed().as_millis() as u64,
                tool_calls: 0,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn skill(max_hosts: u32, timeout_seconds: u32) -> SkillConfig {
        SkillConfig {
            name: "disk_audit".to_string(),
            version: "1.0".to_string(),
            description: String::new(),
            intent_patterns: vec![],
            input_schema: None,
            output_schema: None,
            tools_allowed: vec![],
            max_hosts,
            timeout_seconds,
            require_confirmation_for: vec!["restart".to_string()],
            system_prompt: None,
            author: None,
            tags: vec![],
            builtin: false,
            source_path: None,
        }
    }

    #[tokio::test]
    async fn execute_reports_success_when_all_hosts_succeed() {
        let executor = SkillExecutor::with_simulated_runner();
        let skill = skill(5, 120);
        let hosts = vec!["web-01".to_string(), "web-02".to_string()];

        let result = executor.execute(&skill, &hosts, "check disk usage").await;
        assert_eq!(result.status, SkillStatus::Success);
        assert_eq!(result.succeeded_hosts, 2);
        assert_eq!(result.failed_hosts, 0);
    }

    struct FlakyRunner;

    #[async_trait::async_trait]
    impl HostRunner for FlakyRunner {
        async fn run(&self, _skill: &SkillConfig, host: &str, _task: &str) -> Result<String, String> {
            if host == "web-02" {
                Err("connection refused".to_string())
            } else {
                Ok("ok".to_string())
            }
        }
    }

    #[tokio::test]
    async fn execute_reports_partial_when_some_hosts_fail() {
        let executor = SkillExecutor::new(Arc::new(FlakyRunner), None);
        let skill = skill(5, 120);
        let hosts = vec!["web-01".to_string(), "web-02".to_string()];

        let result = executor.execute(&skill, &hosts, "check disk usage").await;
        assert_eq!(result.status, SkillStatus::Partial);
        assert_eq!(result.succeeded_hosts, 1);
        assert_eq!(result.failed_hosts, 1);
    }

    #[tokio::test]
    async fn execute_truncates_hosts_past_skill_max() {
        let executor = SkillExecutor::with_simulated_runner();
        let skill = skill(1, 120);
        let hosts = vec!["web-01".to_string(), "web-02".to_string(), "web-03".to_string()];

        let result = executor.execute(&skill, &hosts, "check disk usage").await;
        assert_eq!(result.total_hosts, 1);
    }

    #[test]
    fn filter_tools_passes_through_when_unrestricted() {
        let skill = skill(5, 120);
        let available = vec!["ssh_execute".to_string(), "read_file".to_string()];
        assert_eq!(SkillExecutor::filter_tools(&skill, &available), available);
    }

    #[test]
    fn filter_tools_restricts_to_allowed_list() {
        let mut skill = skill(5, 120);
        skill.tools_allowed = vec!["ssh_execute".to_string()];
        let available = vec!["ssh_execute".to_string(), "read_file".to_string()];
        assert_eq!(
            SkillExecutor::filter_tools(&skill, &available),
            vec!["ssh_execute".to_string()]
        );
    }

    #[tokio::test]
    async fn check_confirmation_skips_non_destructive_operations() {
        let skill = skill(5, 120);
        let confirmed = SkillExecutor::check_confirmation::<fn(String) -> std::future::Ready<bool>, _>(
            &skill, "read", None,
        )
        .await;
        assert!(confirmed);
    }

    #[tokio::test]
    async fn check_confirmation_fails_closed_without_callback() {
        let skill = skill(5, 120);
        let confirmed = SkillExecutor::check_confirmation::<fn(String) -> std::future::Ready<bool>, _>(
            &skill, "restart nginx", None,
        )
        .await;
        assert!(!confirmed);
    }
}

//! Platform detection, grounded in `athena_ai/ci/manager.py::CIPlatformManager`.

use std::path::Path;
use std::process::Stdio;
use std::sync::OnceLock;

use regex::Regex;
use tokio::process::Command;

use crate::config::CIConfig;
use crate::error::{CIError, Result};
use crate::models::{CIPlatformType, DetectedPlatform};
use crate::registry::ci_registry;

/// Config files whose presence signals a platform, ported from
/// `CIPlatformManager.CONFIG_PATTERNS`.
const CONFIG_PATTERNS: &[(&str, CIPlatformType)] = &[
    (".github/workflows", CIPlatformType::GitHub),
    (".gitlab-ci.yml", CIPlatformType::GitLab),
    ("Jenkinsfile", CIPlatformType::Jenkins),
    (".circleci/config.yml", CIPlatformType::CircleCi),
    ("azure-pipelines.yml", CIPlatformType::Azure),
    ("bitbucket-pipelines.yml", CIPlatformType::Bitbucket),
    (".travis.yml", CIPlatformType::Travis),
];

/// CLI tools whose presence on `PATH` signals a platform, ported from
/// `CIPlatformManager.CLI_TOOLS`.
const CLI_TOOLS: &[(&str, CIPlatformType)] = &[("gh", CIPlatformType::GitHub), ("glab", CIPlatformType::GitLab)];

/// Environment variables set by CI runners themselves, ported from
/// `CIPlatformManager.ENV_VARS`.
const ENV_VARS: &[(&str, CIPlatformType)] = &[
    ("GITHUB_ACTIONS", CIPlatformType::GitHub),
    ("GITLAB_CI", CIPlatformType::GitLab),
    ("JENKINS_URL", CIPlatformType::Jenkins),
    ("CIRCLECI", CIPlatformType::CircleCi),
    ("TF_BUILD", CIPlatformType::Azure),
    ("BITBUCKET_BUILD_NUMBER", CIPlatformType::Bitbucket),
    ("TRAVIS", CIPlatformType::Travis),
];

fn ssh_remote_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"git@([\w.-]+):([\w.-]+)/([\w.-]+?)(?:\.git)?$").unwrap())
}

fn https_remote_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"https?://([\w.-]+)/([\w.-]+)/([\w.-]+?)(?:\.git)?$").unwrap())
}

fn platform_for_host(host: &str) -> CIPlatformType {
    if host.contains("gitlab") {
        CIPlatformType::GitLab
    } else if host.contains("bitbucket") {
        CIPlatformType::Bitbucket
    } else {
        CIPlatformType::GitHub
    }
}

struct Detection {
    platform: CIPlatformType,
    confidence: f32,
    source: &'static str,
}

fn add_detection(detections: &mut Vec<Detection>, platform: CIPlatformType, confidence: f32, source: &'static str) {
    if let Some(existing) = detections.iter_mut().find(|d| d.platform == platform) {
        if confidence > existing.confidence {
            existing.confidence = confidence;
            existing.source = source;
        }
        return;
    }
    detections.push(Detection { platform, confidence, source });
}

fn detect_from_configs(project_path: &Path, detections: &mut Vec<Detection>) {
    for (pattern, platform) in CONFIG_PATTERNS {
        if project_path.join(pattern).exists() {
            add_detection(detections, *platform, 0.9, "config");
        }
    }
}

async fn detect_from_git_remote(project_path: &Path, detections: &mut Vec<Detection>) {
    let output = Command::new("git")
        .arg("-C")
        .arg(project_path)
        .args(["remote", "get-url", "origin"])
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .output()
        .await;

    let Ok(output) = output else { return };
    if !output.status.success() {
        return;
    }
    let url = String::from_utf8_lossy(&output.stdout).trim().to_string();

    if let Some(caps) = ssh_remote_regex().captures(&url) {
        let host = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        add_detection(detections, platform_for_host(host), 0.95, "git_remote");
    } else if let Some(caps) = https_remote_regex().captures(&url) {
        let host = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        add_detection(detections, platform_for_host(host), 0.95, "git_remote");
    }
}

fn detect_from_env(detections: &mut Vec<Detection>) {
    for (var, platform) in ENV_VARS {
        if std::env::var(var).is_ok() {
            add_detection(detections, *platform, 1.0, "env");
        }
    }
}

async fn detect_from_cli(detections: &mut Vec<Detection>) {
    for (binary, platform) in CLI_TOOLS {
        let available = Command::new("which")
            .arg(binary)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false);
        if available {
            add_detection(detections, *platform, 0.6, "cli");
        }
    }
}

/// Parses `owner/repo` from an SSH or HTTPS git remote URL.
fn parse_repo_url(url: &str) -> Option<(String, String)> {
    if let Some(caps) = ssh_remote_regex().captures(url) {
        return Some((caps[2].to_string(), caps[3].to_string()));
    }
    if let Some(caps) = https_remote_regex().captures(url) {
        return Some((caps[2].to_string(), caps[3].to_string()));
    }
    None
}

pub struct CIPlatformManager {
    project_path: std::path::PathBuf,
}

impl CIPlatformManager {
    pub fn new(project_path: impl Into<std::path::PathBuf>) -> Self {
        Self {
            project_path: project_path.into(),
        }
    }

    /// Runs all four detection sources and merges by highest confidence,
    /// returning results sorted descending, matching `detect_platforms`.
    pub async fn detect_platforms(&self) -> Vec<DetectedPlatform> {
        let mut detections = Vec::new();
        detect_from_configs(&self.project_path, &mut detections);
        detect_from_git_remote(&self.project_path, &mut detections).await;
        detect_from_env(&mut detections);
        detect_from_cli(&mut detections).await;

        let mut results: Vec<DetectedPlatform> = detections
            .into_iter()
            .map(|d| DetectedPlatform {
                platform: d.platform,
                confidence: d.confidence,
                source: d.source.to_string(),
            })
            .collect();
        results.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap_or(std::cmp::Ordering::Equal));
        results
    }

    pub async fn get_best_platform(&self) -> Result<Box<dyn crate::adapter::CIPlatform>> {
        let detected = self.detect_platforms().await;
        let best = detected.first().ok_or(CIError::NoPlatformDetected)?;
        self.get_platform(best.platform).await
    }

    pub async fn get_platform(&self, platform: CIPlatformType) -> Result<Box<dyn crate::adapter::CIPlatform>> {
        let config = self.build_config(platform).await?;
        let adapter = ci_registry().get(config)?;
        Ok(Box::new(AdapterHandle(adapter)))
    }

    async fn build_config(&self, platform: CIPlatformType) -> Result<CIConfig> {
        match platform {
            CIPlatformType::GitHub | CIPlatformType::GitLab | CIPlatformType::Bitbucket => {
                let output = Command::new("git")
                    .arg("-C")
                    .arg(&self.project_path)
                    .args(["remote", "get-url", "origin"])
                    .stdout(Stdio::piped())
                    .stderr(Stdio::null())
                    .output()
                    .await
                    .ok();
                let url = output
                    .filter(|o| o.status.success())
                    .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string())
                    .unwrap_or_default();
                let (owner, repo) = parse_repo_url(&url).unwrap_or_default();
                Ok(CIConfig::for_github(owner, repo))
            }
            CIPlatformType::Jenkins => Ok(CIConfig::for_jenkins(std::env::var("JENKINS_URL").unwrap_or_default())),
            CIPlatformType::CircleCi => {
                let output = Command::new("git")
                    .arg("-C")
                    .arg(&self.project_path)
                    .args(["remote", "get-url", "origin"])
                    .output()
                    .await
                    .ok();
                let url = output.map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string()).unwrap_or_default();
                let (owner, repo) = parse_repo_url(&url).unwrap_or_default();
                Ok(CIConfig::for_circleci(owner, repo))
            }
            _ => Err(CIError::PlatformNotFound(platform.to_string())),
        }
    }
}

/// `Box<dyn CIPlatform>` can't be produced from `Arc<dyn CIPlatform>`
/// directly, so wrap the cached `Arc` and forward every trait method.
struct AdapterHandle(std::sync::Arc<dyn crate::adapter::CIPlatform>);

#[async_trait::async_trait]
impl crate::adapter::CIPlatform for AdapterHandle {
    fn config(&self) -> &CIConfig {
        self.0.config()
    }
    async fn is_authenticated(&self) -> bool {
        self.0.is_authenticated().await
    }
    async fn list_workflows(&self) -> Result<Vec<crate::models::Workflow>> {
        self.0.list_workflows().await
    }
    async fn list_runs(&self, branch: Option<&str>, limit: u32) -> Result<Vec<crate::models::Run>> {
        self.0.list_runs(branch, limit).await
    }
    async fn get_run(&self, run_id: &str) -> Result<crate::models::Run> {
        self.0.get_run(run_id).await
    }
    async fn get_run_logs(&self, run_id: &str, failed_only: bool) -> Result<crate::models::RunLogs> {
        self.0.get_run_logs(run_id, failed_only).await
    }
    async fn trigger_workflow(&self, workflow_id: &str, branch: &str, inputs: Option<&str>) -> Result<()> {
        self.0.trigger_workflow(workflow_id, branch, inputs).await
    }
    async fn cancel_run(&self, run_id: &str) -> Result<()> {
        self.0.cancel_run(run_id).await
    }
    async fn retry_run(&self, run_id: &str, failed_only: bool) -> Result<()> {
        self.0.retry_run(run_id, failed_only).await
    }
    async fn check_permissions(&self) -> Result<crate::models::PermissionReport> {
        self.0.check_permissions().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ssh_remote_url() {
        let (owner, repo) = parse_repo_url("git@github.com:acme/widgets.git").unwrap();
        assert_eq!(owner, "acme");
        assert_eq!(repo, "widgets");
    }

    #[test]
    fn parses_https_remote_url() {
        let (owner, repo) = parse_repo_url("https://github.com/acme/widgets").unwrap();
        assert_eq!(owner, "acme");
        assert_eq!(repo, "widgets");
    }

    #[test]
    fn detect_from_configs_finds_github_workflows_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".github/workflows")).unwrap();
        let mut detections = Vec::new();
        detect_from_configs(dir.path(), &mut detections);
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].platform, CIPlatformType::GitHub);
    }

    #[test]
    fn add_detection_keeps_highest_confidence() {
        let mut detections = Vec::new();
        add_detection(&mut detections, CIPlatformType::GitHub, 0.6, "cli");
        add_detection(&mut detections, CIPlatformType::GitHub, 0.9, "config");
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].confidence, 0.9);
    }
}

//! Per-platform adapter configuration, grounded in the `CIConfig`
//! construction logic of `athena_ai/ci/manager.py::_build_config`.

use crate::models::CIPlatformType;

#[derive(Debug, Clone, Default)]
pub struct CIConfig {
    pub platform: Option<CIPlatformType>,
    /// Client strategies to try, in order, when resolving the active
    /// client for an adapter (e.g. `["cli", "mcp"]`).
    pub preferred_clients: Vec<String>,
    pub repo_owner: Option<String>,
    pub repo_name: Option<String>,
    pub project_path: Option<String>,
    pub api_base_url: Option<String>,
}

impl CIConfig {
    pub fn for_github(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            platform: Some(CIPlatformType::GitHub),
            preferred_clients: vec!["cli".to_string(), "mcp".to_string()],
            repo_owner: Some(owner.into()),
            repo_name: Some(repo.into()),
            project_path: None,
            api_base_url: None,
        }
    }

    pub fn for_gitlab(project_path: impl Into<String>) -> Self {
        Self {
            platform: Some(CIPlatformType::GitLab),
            preferred_clients: vec!["cli".to_string()],
            repo_owner: None,
            repo_name: None,
            project_path: Some(project_path.into()),
            api_base_url: None,
        }
    }

    pub fn for_jenkins(api_base_url: impl Into<String>) -> Self {
        Self {
            platform: Some(CIPlatformType::Jenkins),
            preferred_clients: vec!["api".to_string()],
            repo_owner: None,
            repo_name: None,
            project_path: None,
            api_base_url: Some(api_base_url.into()),
        }
    }

    pub fn for_circleci(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            platform: Some(CIPlatformType::CircleCi),
            preferred_clients: vec!["api".to_string()],
            repo_owner: Some(owner.into()),
            repo_name: Some(repo.into()),
            project_path: None,
            api_base_url: None,
        }
    }

    /// `owner/repo` for GitHub-shaped platforms, falling back to `project_path`.
    pub fn repo_slug(&self) -> Option<String> {
        match (&self.repo_owner, &self.repo_name) {
            (Some(owner), Some(repo)) => Some(format!("{owner}/{repo}")),
            _ => self.project_path.clone(),
        }
    }
}

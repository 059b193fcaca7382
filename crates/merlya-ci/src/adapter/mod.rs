//! Platform adapter layer, grounded in `athena_ai/ci/adapters/base.py::BaseCIAdapter`.
//!
//! Python's `BaseCIAdapter` is an abstract base class that subclasses
//! extend; Rust has no implementation inheritance, so the same shape is
//! composed instead: [`AdapterCore`] holds the registered client
//! strategies and caches the first available one, and a concrete adapter
//! (e.g. [`github::GitHubAdapter`]) embeds an `AdapterCore` and implements
//! [`CIPlatform`] in terms of it.

pub mod github;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::client::{CIClient, CIOperation};
use crate::config::CIConfig;
use crate::error::{CIError, Result};
use crate::models::{FailureAnalysis, PermissionReport, Run, RunLogs, Workflow};

/// The operation surface every platform adapter exposes, grounded in
/// `athena_ai/ci/protocols.py::CIPlatformProtocol`.
#[async_trait]
pub trait CIPlatform: Send + Sync {
    fn config(&self) -> &CIConfig;

    async fn is_authenticated(&self) -> bool;
    async fn list_workflows(&self) -> Result<Vec<Workflow>>;
    async fn list_runs(&self, branch: Option<&str>, limit: u32) -> Result<Vec<Run>>;
    async fn get_run(&self, run_id: &str) -> Result<Run>;
    async fn get_run_logs(&self, run_id: &str, failed_only: bool) -> Result<RunLogs>;
    async fn trigger_workflow(&self, workflow_id: &str, branch: &str, inputs: Option<&str>) -> Result<()>;
    async fn cancel_run(&self, run_id: &str) -> Result<()>;
    async fn retry_run(&self, run_id: &str, failed_only: bool) -> Result<()>;
    async fn check_permissions(&self) -> Result<PermissionReport>;

    /// Default analysis: fetches the run and its logs, then hands off to
    /// the classifier. Adapters may override for platform-specific
    /// extraction, but none currently need to.
    async fn analyze_failure(&self, run_id: &str) -> Result<FailureAnalysis> {
        let run = self.get_run(run_id).await?;
        let logs = self.get_run_logs(run_id, true).await?;
        Ok(crate::classifier::analyze(&run, &logs))
    }
}

/// Holds the client strategies registered for one adapter instance and
/// memoizes which one is active, mirroring `BaseCIAdapter._active_client`.
pub struct AdapterCore {
    clients: Vec<Box<dyn CIClient>>,
    active: Mutex<Option<usize>>,
}

impl AdapterCore {
    pub fn new(clients: Vec<Box<dyn CIClient>>) -> Self {
        Self {
            clients,
            active: Mutex::new(None),
        }
    }

    pub fn register_client(&mut self, client: Box<dyn CIClient>) {
        self.clients.push(client);
        *self.active.lock() = None;
    }

    /// Walks the registered clients in order and caches the first one
    /// that reports available, matching `get_active_client`'s
    /// first-match-wins semantics over `preferred_clients`.
    async fn active_index(&self) -> Option<usize> {
        if let Some(idx) = *self.active.lock() {
            return Some(idx);
        }
        for (idx, client) in self.clients.iter().enumerate() {
            if client.is_available().await {
                *self.active.lock() = Some(idx);
                return Some(idx);
            }
        }
        None
    }

    pub async fn is_available(&self) -> bool {
        self.active_index().await.is_some()
    }

    pub async fn execute(&self, platform_name: &str, operation: CIOperation, params: &[(&str, &str)]) -> Result<serde_json::Value> {
        let idx = self
            .active_index()
            .await
            .ok_or_else(|| CIError::NoAvailableClient(platform_name.to_string()))?;
        self.clients[idx].execute(operation, params).await
    }
}

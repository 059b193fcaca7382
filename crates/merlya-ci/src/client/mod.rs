//! Client strategies for talking to a CI platform's tooling, grounded in
//! `athena_ai/ci/clients/base.py::BaseCIClient`.
//!
//! A platform adapter composes over one or more [`CIClient`] strategies
//! (CLI subprocess, MCP, ...) and picks the first one that reports
//! [`CIClient::is_available`], mirroring `BaseCIAdapter.get_active_client`.

pub mod cli;
pub mod mcp;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// One invocable CI operation, keyed the same way across every client
/// strategy so an adapter can dispatch without knowing which strategy
/// backs it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CIOperation {
    AuthStatus,
    ListWorkflows,
    GetWorkflow,
    ListRuns,
    ListRunsFiltered,
    GetRun,
    GetRunLogs,
    GetRunLogsFull,
    GetRunJobs,
    TriggerWorkflow,
    TriggerWorkflowInputs,
    CancelRun,
    RetryRun,
    RetryRunFailed,
    ListSecrets,
    ListVariables,
}

#[async_trait]
pub trait CIClient: Send + Sync {
    fn name(&self) -> &'static str;

    /// Cheap, cacheable availability check (e.g. `which gh`).
    async fn is_available(&self) -> bool;

    /// Executes `operation` with named `params`, returning parsed JSON on
    /// success or the raw string wrapped as `Value::String` when the
    /// output isn't JSON.
    async fn execute(&self, operation: CIOperation, params: &[(&str, &str)]) -> Result<Value>;
}

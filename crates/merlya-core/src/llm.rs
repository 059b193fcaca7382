//! LLM router contract (Module P).
//!
//! Deliberately a shim: no provider implementation lives here. Callers
//! (the planner, skill executor synthesis, Sentinel triage) depend on this
//! trait object rather than any concrete model client, so swapping or
//! multiplexing providers never touches their code.

use async_trait::async_trait;

/// Task-specific model/routing hint, mirroring the `task=` keyword argument
/// threaded through `llm_router.generate(...)` call sites in the original
/// system (`task="planning"`, etc.) so a concrete router can pick a
/// cheaper/faster model per call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    Correction,
    Planning,
    Synthesis,
    Triage,
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("llm provider error: {0}")]
    Provider(String),
}

pub type Result<T> = std::result::Result<T, LlmError>;

#[async_trait]
pub trait LlmRouter: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        task: Task,
    ) -> Result<String>;
}

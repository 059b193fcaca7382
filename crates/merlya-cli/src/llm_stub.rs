//! No-op [`LlmRouter`], standing in for the provider client the LLM shim
//! (Module P) deliberately leaves unimplemented.
//!
//! Wiring this rather than an `Option<Box<dyn LlmRouter>>` at call sites
//! keeps the planner's own fallback-on-error contract doing the work:
//! [`merlya_core::planner::generate_plan`] already degrades to a fixed
//! three-step plan whenever the router errors, so a host shell with no
//! provider configured still produces a usable (if generic) plan.

use async_trait::async_trait;
use merlya_core::llm::{LlmError, LlmRouter, Task, Result as LlmResult};

pub struct NullLlmRouter;

#[async_trait]
impl LlmRouter for NullLlmRouter {
    async fn generate(&self, _prompt: &str, _system_prompt: Option<&str>, _task: Task) -> LlmResult<String> {
        Err(LlmError::Provider("no LLM provider configured".to_string()))
    }
}

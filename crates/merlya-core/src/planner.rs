//! Adaptive plan generator, grounded in `athena_ai/agents/adaptive_planner.py`.
//!
//! Unlike the keyword-driven classifier, this module asks the LLM to
//! decompose an arbitrary request into a JSON step list. A malformed or
//! missing LLM response never blocks execution: [`generate_plan`] falls
//! back to a fixed three-step plan instead of propagating the failure.

use serde::{Deserialize, Serialize};

use crate::classifier::RequestComplexity;
use crate::llm::{LlmRouter, Task};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanStep {
    pub id: u32,
    pub description: String,
    #[serde(default)]
    pub dependencies: Vec<u32>,
    #[serde(default)]
    pub parallelizable: bool,
    #[serde(default = "default_estimated_tokens")]
    pub estimated_tokens: u32,
}

fn default_estimated_tokens() -> u32 {
    1000
}

#[derive(Debug, Deserialize)]
struct PlanResponse {
    steps: Vec<PlanStep>,
}

/// Generates an execution plan for `request` via `llm`, validating and
/// repairing whatever comes back; falls back to a fixed plan if the LLM call
/// or the JSON parse fails.
pub async fn generate_plan(
    llm: &dyn LlmRouter,
    request: &str,
    complexity: RequestComplexity,
    max_steps: usize,
    context_summary: &str,
) -> Vec<PlanStep> {
    tracing::info!(request, "generating adaptive plan");

    let prompt = build_planning_prompt(request, complexity, max_steps, context_summary);

    let response = match llm
        .generate(
            &prompt,
            Some(
                "You are an expert DevOps/SRE planner. Generate ONLY valid JSON responses \
                 without any markdown formatting or explanations.",
            ),
            Task::Planning,
        )
        .await
    {
        Ok(response) => response,
        Err(err) => {
            tracing::error!(error = %err, "llm call failed, falling back to heuristic plan");
            return fallback_plan(request);
        }
    };

    match parse_plan_response(&response) {
        Ok(steps) => {
            let steps = validate_plan(steps, max_steps);
            tracing::info!(step_count = steps.len(), "generated plan");
            steps
        }
        Err(err) => {
            tracing::error!(error = %err, "plan generation failed");
            fallback_plan(request)
        }
    }
}

fn build_planning_prompt(
    request: &str,
    complexity: RequestComplexity,
    max_steps: usize,
    context_summary: &str,
) -> String {
    let step_target = match complexity {
        RequestComplexity::Simple => 3,
        RequestComplexity::Moderate => 5,
        RequestComplexity::Complex => 8,
    };
    let complexity_label = match complexity {
        RequestComplexity::Simple => "simple",
        RequestComplexity::Moderate => "moderate",
        RequestComplexity::Complex => "complex",
    };
    let context_line = if context_summary.is_empty() {
        String::new()
    } else {
        format!("CONTEXT: {context_summary}\n")
    };

    format!(
        "You are an expert DevOps/SRE planner. Your task is to decompose a user request \
         into a structured execution plan.\n\n\
         USER REQUEST: \"{request}\"\n\n\
         COMPLEXITY: {complexity_label}\n\
         MAX STEPS: {max_steps}\n\n\
         {context_line}\
         INSTRUCTIONS:\n\
         1. Break the request into {step_target} logical steps\n\
         2. Each step should be clear, actionable, independent or minimally dependent, \
            achievable in under 30 seconds, and verifiable\n\
         3. Steps should roughly follow: verify prerequisites, gather information, execute \
            main actions, analyze results, synthesize findings\n\
         4. Mark steps that can run in parallel and note dependencies between steps\n\n\
         RESPOND WITH VALID JSON ONLY (no markdown, no explanation), shaped as:\n\
         {{\"steps\": [{{\"id\": 1, \"description\": \"...\", \"dependencies\": [], \
         \"parallelizable\": false, \"estimated_tokens\": 500}}]}}"
    )
}

fn parse_plan_response(response: &str) -> Result<Vec<PlanStep>, serde_json::Error> {
    let json_str = extract_json_block(response);
    match serde_json::from_str::<PlanResponse>(json_str) {
        Ok(parsed) => Ok(parsed.steps),
        Err(object_err) => {
            // Accept a bare `[{...}]` array shape too, not just `{"steps": [...]}`.
            serde_json::from_str::<Vec<PlanStep>>(json_str).map_err(|_| object_err)
        }
    }
}

fn extract_json_block(response: &str) -> &str {
    if let Some(start) = response.find("```json") {
        let after = start + "```json".len();
        if let Some(end) = response[after..].find("```") {
            return response[after..after + end].trim();
        }
    }
    if let Some(start) = response.find("```") {
        let after = start + "```".len();
        if let Some(end) = response[after..].find("```") {
            return response[after..after + end].trim();
        }
    }
    response.trim()
}

fn validate_plan(mut steps: Vec<PlanStep>, max_steps: usize) -> Vec<PlanStep> {
    if steps.len() > max_steps {
        tracing::warn!(len = steps.len(), max_steps, "plan exceeds max steps, trimming");
        steps.truncate(max_steps);
    }

    for (i, step) in steps.iter_mut().enumerate() {
        let sequential_id = (i + 1) as u32;
        if step.id != sequential_id {
            step.id = sequential_id;
        }
        if step.description.trim().is_empty() {
            step.description = format!("Step {sequential_id}");
        }
        step.dependencies.retain(|&d| d < step.id);
    }

    steps
}

/// Fixed three-step plan used whenever LLM-driven planning is unavailable.
fn fallback_plan(request: &str) -> Vec<PlanStep> {
    tracing::info!("using fallback plan");

    let truncated: String = request.chars().take(60).collect();

    vec![
        PlanStep {
            id: 1,
            description: "Gather necessary information and context".to_string(),
            dependencies: vec![],
            parallelizable: false,
            estimated_tokens: 800,
        },
        PlanStep {
            id: 2,
            description: format!("Execute: {truncated}"),
            dependencies: vec![1],
            parallelizable: false,
            estimated_tokens: 1500,
        },
        PlanStep {
            id: 3,
            description: "Synthesize results and provide summary".to_string(),
            dependencies: vec![2],
            parallelizable: false,
            estimated_tokens: 1000,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingLlm;

    #[async_trait::async_trait]
    impl LlmRouter for FailingLlm {
        async fn generate(
            &self,
            _prompt: &str,
            _system_prompt: Option<&str>,
            _task: Task,
        ) -> crate::llm::Result<String> {
            Err(crate::llm::LlmError::Provider("unavailable".to_string()))
        }
    }

    struct MalformedLlm;

    #[async_trait::async_trait]
    impl LlmRouter for MalformedLlm {
        async fn generate(
            &self,
            _prompt: &str,
            _system_prompt: Option<&str>,
            _task: Task,
        ) -> crate::llm::Result<String> {
            Ok("not json at all".to_string())
        }
    }

    #[tokio::test]
    async fn llm_failure_falls_back_to_three_step_plan() {
        let steps = generate_plan(
            &FailingLlm,
            "restart nginx on web01",
            RequestComplexity::Simple,
            10,
            "",
        )
        .await;

        assert_eq!(steps.len(), 3);
        assert!(steps[1].description.starts_with("Execute: "));
        assert!(steps[1].description.contains("restart nginx on web01"));
    }

    #[tokio::test]
    async fn malformed_json_falls_back_to_three_step_plan() {
        let steps = generate_plan(
            &MalformedLlm,
            "a very long request that should be truncated to sixty characters exactly for the fallback description field",
            RequestComplexity::Complex,
            10,
            "",
        )
        .await;

        assert_eq!(steps.len(), 3);
        assert_eq!(steps[0].id, 1);
        assert_eq!(steps[1].dependencies, vec![1]);
        assert_eq!(steps[2].dependencies, vec![2]);
        assert!(steps[1].description.starts_with("Execute: "));
    }

    #[test]
    fn validate_plan_renumbers_and_trims_invalid_dependencies() {
        let steps = vec![
            PlanStep {
                id: 5,
                description: "first".to_string(),
                dependencies: vec![9],
                parallelizable: false,
                estimated_tokens: 500,
            },
            PlanStep {
                id: 5,
                description: String::new(),
                dependencies: vec![1],
                parallelizable: true,
                estimated_tokens: 500,
            },
        ];
        let validated = validate_plan(steps, 10);
        assert_eq!(validated[0].id, 1);
        assert!(validated[0].dependencies.is_empty());
        assert_eq!(validated[1].id, 2);
        assert_eq!(validated[1].description, "Step 2");
        assert_eq!(validated[1].dependencies, vec![1]);
    }
}

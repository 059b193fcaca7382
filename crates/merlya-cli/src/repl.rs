//! The interactive loop: read a line, route it to a slash-command, an
//! `@mcp` reference, or free-text classification/planning.

use std::sync::Arc;

use merlya_core::mcp::parse_mcp_reference;
use merlya_core::planner::generate_plan;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::commands;
use crate::state::AppState;

const PROMPT: &str = "merlya> ";
const MAX_PLAN_STEPS: usize = 6;
const CONTEXT_MESSAGES: usize = 6;

pub async fn run(state: Arc<AppState>) -> anyhow::Result<()> {
    println!("Merlya shell. Type /help for commands, /exit to quit.");

    let stdin = tokio::io::stdin();
    let mut lines = BufReader::new(stdin).lines();

    loop {
        print!("{PROMPT}");
        use std::io::Write;
        std::io::stdout().flush().ok();

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if line.starts_with('/') {
            if commands::dispatch(line, &state).await {
                break;
            }
            continue;
        }

        if let Some((server, remaining)) = parse_mcp_reference(line) {
            handle_mcp_reference(&server, &remaining, &state).await;
            continue;
        }

        handle_request(line, &state).await;
    }

    state.persist_conversation().await?;
    Ok(())
}

async fn handle_mcp_reference(server: &str, remaining: &str, state: &Arc<AppState>) {
    match state.mcp.get_server(server) {
        Some(config) => {
            println!(
                "routing to MCP server '{server}' ({} {}): {remaining}",
                config.command,
                config.args.join(" ")
            );
            println!("(MCP execution is contract-only in this build; no stdio session was started.)");
        }
        None => println!("unknown MCP server '{server}' — configure it first (no /mcp command surfaces this yet)"),
    }
}

async fn handle_request(request: &str, state: &Arc<AppState>) {
    let classification = state.classifier.classify(request);
    tracing::debug!(
        complexity = ?classification.complexity,
        strategy = ?classification.strategy,
        "classified request"
    );

    if classification.needs_reformulation {
        println!("this request looks underspecified.");
        if let Some(suggestion) = &classification.suggested_prompt {
            println!("did you mean: {suggestion}");
        }
    }

    let matches = state.skills.match_intent(request);
    if let Some((skill, confidence)) = matches.first() {
        if *confidence >= 0.5 {
            println!(
                "matched skill '{}' (confidence {:.0}%) — run it with: /skill run {} <hosts> [task]",
                skill.name,
                confidence * 100.0,
                skill.name
            );
        }
    }

    let context_summary = {
        let conversation = state.conversation.lock().await;
        conversation
            .messages
            .iter()
            .rev()
            .take(CONTEXT_MESSAGES)
            .map(|m| format!("{}: {}", m.role, m.content))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let plan = generate_plan(&state.llm, request, classification.complexity, MAX_PLAN_STEPS, &context_summary).await;
    println!("plan:");
    for step in &plan {
        let parallel = if step.parallelizable { " [parallel]" } else { "" };
        println!("  {}. {}{parallel}", step.id, step.description);
    }

    {
        let mut conversation = state.conversation.lock().await;
        conversation.add_message("user", request);
        conversation.add_message(
            "assistant",
            format!("proposed a {}-step plan", plan.len()),
        );
    }

    if let Err(err) = state.persist_conversation().await {
        tracing::warn!(error = %err, "failed to persist conversation");
    }
}

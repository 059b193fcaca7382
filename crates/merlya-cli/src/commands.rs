//! Slash-command dispatch: `/skill`, `/credentials`, `/metrics`, `/help`.
//!
//! Each handler takes the already-split argument words (the leading
//! `/command` token stripped) and prints its own output directly — this
//! mirrors a REPL's turn-taking rather than returning a value the caller
//! would have to render.

use std::sync::Arc;

use dialoguer::Password;
use merlya_core::credentials::VariableKind;
use merlya_core::skills::models::SkillConfig;

use crate::state::AppState;

fn user_skill_loader(state: &Arc<AppState>) -> merlya_core::skills::SkillLoader<'static> {
    let builtin_dir = state.skills_dir.parent().map(|p| p.join("builtin_skills")).unwrap_or_else(|| state.skills_dir.clone());
    merlya_core::skills::SkillLoader::new(state.skills, builtin_dir, Some(state.skills_dir.clone()))
}

pub async fn dispatch(line: &str, state: &Arc<AppState>) -> bool {
    let trimmed = line.trim();
    let mut parts = trimmed.splitn(2, char::is_whitespace);
    let command = parts.next().unwrap_or("");
    let rest = parts.next().unwrap_or("").trim();

    match command {
        "/exit" | "/quit" => return true,
        "/help" => print_help(),
        "/skill" => handle_skill(rest, state).await,
        "/credentials" => handle_credentials(rest, state),
        "/metrics" => handle_metrics(state),
        other => println!("unknown command '{other}' — try /help"),
    }
    false
}

fn print_help() {
    println!("Slash commands:");
    println!("  /skill {{list|show|create|template|reload|run}} ...");
    println!("  /credentials set KEY VALUE");
    println!("  /credentials set-secret KEY");
    println!("  /metrics");
    println!("  /help, /exit");
    println!("Prefix a request with @mcp <server> to route it through an MCP server.");
}

async fn handle_skill(rest: &str, state: &Arc<AppState>) {
    let mut words = rest.splitn(2, char::is_whitespace);
    let subcommand = words.next().unwrap_or("");
    let arg = words.next().unwrap_or("").trim();

    match subcommand {
        "list" => {
            let skills = state.skills.get_all();
            if skills.is_empty() {
                println!("no skills registered");
                return;
            }
            for skill in skills {
                let origin = if skill.builtin { "builtin" } else { "user" };
                println!("  {:<20} [{origin}] {}", skill.name, skill.description);
            }
        }
        "show" => {
            if arg.is_empty() {
                println!("usage: /skill show NAME");
                return;
            }
            match state.skills.get(arg) {
                Some(skill) => match serde_yaml::to_string(&skill) {
                    Ok(yaml) => println!("{yaml}"),
                    Err(err) => println!("failed to render skill: {err}"),
                },
                None => println!("no such skill '{arg}'"),
            }
        }
        "template" => print_skill_template(),
        "create" => handle_skill_create(arg, state),
        "reload" => {
            let loader = user_skill_loader(state);
            let loaded = loader.load_all();
            println!("reloaded {loaded} skill(s) from {}", state.skills_dir.display());
        }
        "run" => handle_skill_run(arg, state).await,
        "" => println!("usage: /skill {{list|show|create|template|reload|run}}"),
        other => println!("unknown /skill subcommand '{other}'"),
    }
}

fn print_skill_template() {
    println!(
        "{}",
        r#"name: example_skill
version: "1.0"
description: "One-line description"
intent_patterns:
  - "example.*pattern"
tools_allowed:
  - ssh_execute
max_hosts: 5
timeout_seconds: 120
tags:
  - example
"#
    );
}

/// `/skill create NAME` writes a fresh template to the user skills
/// directory under that name, for the user to edit and `/skill reload`.
fn handle_skill_create(name: &str, state: &Arc<AppState>) {
    if name.is_empty() {
        println!("usage: /skill create NAME");
        return;
    }
    let mut skill = SkillConfig {
        name: name.to_string(),
        version: "1.0".to_string(),
        description: "One-line description".to_string(),
        intent_patterns: vec![],
        input_schema: None,
        output_schema: None,
        tools_allowed: vec![],
        max_hosts: 5,
        timeout_seconds: 120,
        require_confirmation_for: vec![],
        system_prompt: None,
        author: None,
        tags: vec![],
        builtin: false,
        source_path: None,
    };

    let loader = user_skill_loader(state);
    match loader.save_user_skill(&mut skill) {
        Ok(path) => {
            loader.load_file(&path, false);
            println!("created {} — edit it, then /skill reload", path.display());
        }
        Err(err) => println!("failed to create skill: {err}"),
    }
}

async fn handle_skill_run(rest: &str, state: &Arc<AppState>) {
    let mut words = rest.split_whitespace();
    let Some(name) = words.next() else {
        println!("usage: /skill run NAME host1,host2,... [task]");
        return;
    };
    let Some(hosts_arg) = words.next() else {
        println!("usage: /skill run NAME host1,host2,... [task]");
        return;
    };
    let task: String = words.collect::<Vec<_>>().join(" ");

    let Some(skill) = state.skills.get(name) else {
        println!("no such skill '{name}'");
        return;
    };

    let hosts: Vec<String> = hosts_arg.split(',').map(|h| h.trim().to_string()).filter(|h| !h.is_empty()).collect();
    let result = state.executor.execute(&skill, &hosts, &task).await;
    println!("{}", result.to_summary());
    for host_result in &result.host_results {
        let mark = if host_result.success { "ok" } else { "fail" };
        println!(
            "  [{mark}] {} ({}ms){}",
            host_result.host,
            host_result.duration_ms,
            host_result.output.as_deref().map(|o| format!(": {o}")).unwrap_or_default()
        );
    }
}

fn handle_credentials(rest: &str, state: &Arc<AppState>) {
    let mut words = rest.splitn(3, char::is_whitespace);
    let subcommand = words.next().unwrap_or("");

    match subcommand {
        "set" => {
            let key = words.next().unwrap_or("");
            let value = words.next().unwrap_or("");
            if key.is_empty() || value.is_empty() {
                println!("usage: /credentials set KEY VALUE");
                return;
            }
            state.credentials.set(key, value, VariableKind::Config);
            println!("set @{key}");
        }
        "set-secret" => {
            let key = words.next().unwrap_or("").trim();
            if key.is_empty() {
                println!("usage: /credentials set-secret KEY");
                return;
            }
            match Password::new().with_prompt(format!("value for @{key}")).interact() {
                Ok(value) => {
                    state.credentials.set(key, value, VariableKind::Secret);
                    println!("set secret @{key}");
                }
                Err(err) => println!("failed to read secret: {err}"),
            }
        }
        "list" => {
            for variable in state.credentials.list() {
                let shown = match variable.kind {
                    VariableKind::Secret => "****",
                    _ => variable.value.as_str(),
                };
                println!("  @{:<20} {shown}", variable.key);
            }
        }
        "delete" => {
            let key = words.next().unwrap_or("").trim();
            if state.credentials.delete(key) {
                println!("deleted @{key}");
            } else {
                println!("no such variable '@{key}'");
            }
        }
        _ => println!("usage: /credentials {{set KEY VALUE|set-secret KEY|list|delete KEY}}"),
    }
}

fn handle_metrics(state: &Arc<AppState>) {
    let counters = state.metrics.counters_snapshot();
    let histograms = state.metrics.histograms_snapshot();
    let gauges = state.metrics.gauges_snapshot();

    if counters.is_empty() && histograms.is_empty() && gauges.is_empty() {
        println!("no metrics recorded yet");
        return;
    }

    if !counters.is_empty() {
        println!("Counters");
        println!("  {:<32} {:>12}", "name", "value");
        for (name, value) in &counters {
            println!("  {name:<32} {value:>12}");
        }
    }

    if !histograms.is_empty() {
        println!("Histograms");
        println!("  {:<32} {:>8} {:>10} {:>10} {:>10}", "name", "count", "min", "avg", "max");
        for (name, stats) in &histograms {
            println!(
                "  {name:<32} {:>8} {:>10.3} {:>10.3} {:>10.3}",
                stats.count, stats.min, stats.avg, stats.max
            );
        }
    }

    if !gauges.is_empty() {
        println!("Gauges");
        println!("  {:<32} {:>12}", "name", "value");
        for (name, value) in &gauges {
            println!("  {name:<32} {value:>12.3}");
        }
    }
}

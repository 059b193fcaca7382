//! Check execution for the four built-in [`CheckType`] variants, grounded
//! in `athena_ai/agents/sentinel_service/checks.py`'s check functions.

use std::net::ToSocketAddrs;
use std::process::Stdio;
use std::time::{Duration, Instant};

use chrono::Utc;

use crate::models::{CheckParameters, CheckResult, CheckType, HealthCheck};

/// Runs a single [`HealthCheck`] and produces its [`CheckResult`].
/// Each check type's own `timeout_seconds` bounds it via the caller's
/// `tokio::time::timeout` wrapper, not internally — matching the
/// scheduling loop's "each check runs under its own timeout" contract.
pub struct CheckExecutor;

impl CheckExecutor {
    pub async fn run(check: &HealthCheck) -> CheckResult {
        let start = Instant::now();
        let outcome = match check.check_type {
            CheckType::Ping => Self::ping(&check.target).await,
            CheckType::Port => Self::port(&check.target, &check.parameters).await,
            CheckType::Http => Self::http(&check.parameters).await,
            CheckType::Custom => Self::custom(&check.parameters).await,
        };

        let response_time_ms = start.elapsed().as_millis() as u64;
        match outcome {
            Ok(details) => CheckResult {
                check_name: check.name.clone(),
                success: true,
                response_time_ms,
                timestamp: Utc::now(),
                error: None,
                details,
            },
            Err(error) => CheckResult {
                check_name: check.name.clone(),
                success: false,
                response_time_ms,
                timestamp: Utc::now(),
                error: Some(error),
                details: None,
            },
        }
    }

    /// Shells out to the system `ping` binary rather than opening a raw
    /// ICMP socket, so this works unprivileged on every platform.
    async fn ping(target: &str) -> Result<Option<serde_json::Value>, String> {
        let target = target.to_string();
        let output = tokio::process::Command::new("ping")
            .arg("-c")
            .arg("1")
            .arg("-W")
            .arg("2")
            .arg(&target)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .output()
            .await
            .map_err(|e| format!("failed to spawn ping: {e}"))?;

        if output.status.success() {
            Ok(None)
        } else {
            Err(format!("ping failed for {target}"))
        }
    }

    async fn port(target: &str, params: &CheckParameters) -> Result<Option<serde_json::Value>, String> {
        let port = params.port.ok_or_else(|| "port check requires 'port' parameter".to_string())?;
        let addr = format!("{target}:{port}");
        tokio::task::spawn_blocking(move || {
            let Ok(mut addrs) = addr.to_socket_addrs() else {
                return Err(format!("could not resolve {addr}"));
            };
            let Some(sockaddr) = addrs.next() else {
                return Err(format!("no address for {addr}"));
            };
            std::net::TcpStream::connect_timeout(&sockaddr, Duration::from_secs(2))
                .map(|_| None)
                .map_err(|e| e.to_string())
        })
        .await
        .map_err(|e| e.to_string())?
    }

    async fn http(params: &CheckParameters) -> Result<Option<serde_json::Value>, String> {
        let url = params.url.as_deref().ok_or_else(|| "http check requires 'url' parameter".to_string())?;
        let expected = params.expected_status.unwrap_or(200);

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| e.to_string())?;

        let response = client.get(url).send().await.map_err(|e| e.to_string())?;
        let status = response.status().as_u16();

        if status == expected {
            Ok(Some(serde_json::json!({ "status": status })))
        } else {
            Err(format!("expected status {expected}, got {status}"))
        }
    }

    /// Runs an arbitrary shell-less command (argv split on whitespace) and
    /// treats a zero exit code as success.
    async fn custom(params: &CheckParameters) -> Result<Option<serde_json::Value>, String> {
        let command = params.command.as_deref().ok_or_else(|| "custom check requires 'command' parameter".to_string())?;
        let mut parts = command.split_whitespace();
        let program = parts.next().ok_or_else(|| "empty command".to_string())?;

        let output = tokio::process::Command::new(program)
            .args(parts)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| format!("failed to spawn '{program}': {e}"))?;

        if output.status.success() {
            Ok(Some(serde_json::json!({
                "stdout": String::from_utf8_lossy(&output.stdout),
            })))
        } else {
            Err(String::from_utf8_lossy(&output.stderr).to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::HealthCheck;

    #[tokio::test]
    async fn port_check_succeeds_against_local_listener() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(tokio::spawn(async move {
            let _ = listener.accept();
        }));

        let mut check = HealthCheck::new("local", "127.0.0.1", CheckType::Port);
        check.parameters.port = Some(port);

        let result = CheckExecutor::run(&check).await;
        assert!(result.success);
    }

    #[tokio::test]
    async fn port_check_fails_against_closed_port() {
        let mut check = HealthCheck::new("closed", "127.0.0.1", CheckType::Port);
        check.parameters.port = Some(1);

        let result = CheckExecutor::run(&check).await;
        assert!(!result.success);
    }

    #[tokio::test]
    async fn custom_check_reports_exit_code_failure() {
        let mut check = HealthCheck::new("custom", "n/a", CheckType::Custom);
        check.parameters.command = Some("false".to_string());

        let result = CheckExecutor::run(&check).await;
        assert!(!result.success);
    }

    #[tokio::test]
    async fn custom_check_reports_exit_code_success() {
        let mut check = HealthCheck::new("custom", "n/a", CheckType::Custom);
        check.parameters.command = Some("true".to_string());

        let result = CheckExecutor::run(&check).await;
        assert!(result.success);
    }
}

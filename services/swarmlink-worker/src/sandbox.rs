//! Script sandbox
//!
//! Runs an assigned script through `sh` with the job input in
//! `SWARMLINK_INPUT`, captures stdout/stderr, and kills the process at the
//! deadline. Stdout that parses as JSON becomes the structured output;
//! anything else is returned as a string.

use chrono::Utc;
use serde_json::Value;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use swarmlink_protocol::ResultStatus;
use swarmlink_types::{JobErrorDetail, JobRunMetrics};

/// Outcome of one sandbox execution, ready to become a JOB_RESULT
#[derive(Debug)]
pub struct SandboxOutcome {
    pub status: ResultStatus,
    pub output: Option<Value>,
    pub logs: Vec<String>,
    pub error: Option<JobErrorDetail>,
    pub metrics: JobRunMetrics,
}

impl SandboxOutcome {
    fn finish(
        started_ms: i64,
        status: ResultStatus,
        output: Option<Value>,
        logs: Vec<String>,
        error: Option<JobErrorDetail>,
    ) -> Self {
        let ended_ms = Utc::now().timestamp_millis();
        Self {
            status,
            output,
            logs,
            error,
            metrics: JobRunMetrics {
                start_time: started_ms,
                end_time: ended_ms,
                duration_ms: (ended_ms - started_ms).max(0) as u64,
            },
        }
    }
}

/// Execute one assignment
pub async fn execute(
    script: Option<&str>,
    tool_call: Option<&Value>,
    input: &Value,
    timeout_ms: u64,
) -> SandboxOutcome {
    let started_ms = Utc::now().timestamp_millis();

    if let Some(script) = script {
        return run_script(script, input, timeout_ms, started_ms).await;
    }

    if let Some(tool_call) = tool_call {
        // This worker ships no tool runtime; advertise capabilities
        // accordingly
        let tool = tool_call
            .get("tool")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        return SandboxOutcome::finish(
            started_ms,
            ResultStatus::Error,
            None,
            vec![],
            Some(JobErrorDetail {
                code: "TOOL_NOT_IMPLEMENTED".to_string(),
                message: format!("tool {tool} is not implemented on this worker"),
                stack: None,
            }),
        );
    }

    // No script, no tool: echo the input so bare dispatches round-trip
    SandboxOutcome::finish(
        started_ms,
        ResultStatus::Success,
        Some(input.clone()),
        vec!["no script attached, echoing input".to_string()],
        None,
    )
}

async fn run_script(
    script: &str,
    input: &Value,
    timeout_ms: u64,
    started_ms: i64,
) -> SandboxOutcome {
    let child = Command::new("sh")
        .arg("-c")
        .arg(script)
        .env("SWARMLINK_INPUT", input.to_string())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn();

    let child = match child {
        Ok(child) => child,
        Err(e) => {
            return SandboxOutcome::finish(
                started_ms,
                ResultStatus::Error,
                None,
                vec![],
                Some(JobErrorDetail {
                    code: "SPAWN_FAILED".to_string(),
                    message: e.to_string(),
                    stack: None,
                }),
            );
        }
    };

    let waited = tokio::time::timeout(
        Duration::from_millis(timeout_ms),
        child.wait_with_output(),
    )
    .await;

    match waited {
        Err(_elapsed) => SandboxOutcome::finish(
            started_ms,
            ResultStatus::Timeout,
            None,
            vec![],
            Some(JobErrorDetail {
                code: "SCRIPT_TIMEOUT".to_string(),
                message: format!("script exceeded {timeout_ms}ms"),
                stack: None,
            }),
        ),
        Ok(Err(e)) => SandboxOutcome::finish(
            started_ms,
            ResultStatus::Error,
            None,
            vec![],
            Some(JobErrorDetail {
                code: "WAIT_FAILED".to_string(),
                message: e.to_string(),
                stack: None,
            }),
        ),
        Ok(Ok(output)) => {
            let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let mut logs = Vec::new();
            if !stderr.is_empty() {
                logs.extend(stderr.lines().map(str::to_string));
            }

            if !output.status.success() {
                return SandboxOutcome::finish(
                    started_ms,
                    ResultStatus::Error,
                    None,
                    logs,
                    Some(JobErrorDetail {
                        code: "SCRIPT_FAILED".to_string(),
                        message: format!(
                            "exit status {}",
                            output.status.code().unwrap_or(-1)
                        ),
                        stack: (!stderr.is_empty()).then(|| stderr.clone()),
                    }),
                );
            }

            let parsed = serde_json::from_str::<Value>(&stdout)
                .unwrap_or(Value::String(stdout));
            SandboxOutcome::finish(started_ms, ResultStatus::Success, Some(parsed), logs, None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn script_stdout_json_becomes_structured_output() {
        let outcome = execute(
            Some(r#"echo '{"answer": 42}'"#),
            None,
            &json!({}),
            5_000,
        )
        .await;
        assert_eq!(outcome.status, ResultStatus::Success);
        assert_eq!(outcome.output.unwrap()["answer"], 42);
    }

    #[tokio::test]
    async fn script_plain_stdout_becomes_string_output() {
        let outcome = execute(Some("echo hello"), None, &json!({}), 5_000).await;
        assert_eq!(outcome.status, ResultStatus::Success);
        assert_eq!(outcome.output.unwrap(), json!("hello"));
    }

    #[tokio::test]
    async fn script_receives_input_env() {
        let outcome = execute(
            Some(r#"printf '%s' "$SWARMLINK_INPUT""#),
            None,
            &json!({"city": "Tokyo"}),
            5_000,
        )
        .await;
        assert_eq!(outcome.status, ResultStatus::Success);
        assert_eq!(outcome.output.unwrap()["city"], "Tokyo");
    }

    #[tokio::test]
    async fn failing_script_reports_error_with_stderr() {
        let outcome = execute(
            Some("echo oops >&2; exit 3"),
            None,
            &json!({}),
            5_000,
        )
        .await;
        assert_eq!(outcome.status, ResultStatus::Error);
        let error = outcome.error.unwrap();
        assert_eq!(error.code, "SCRIPT_FAILED");
        assert!(outcome.logs.contains(&"oops".to_string()));
    }

    #[tokio::test]
    async fn slow_script_is_killed_at_deadline() {
        let started = std::time::Instant::now();
        let outcome = execute(Some("sleep 10"), None, &json!({}), 100).await;
        assert_eq!(outcome.status, ResultStatus::Timeout);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn bare_assignment_echoes_input() {
        let input = json!({"task": "ping"});
        let outcome = execute(None, None, &input, 1_000).await;
        assert_eq!(outcome.status, ResultStatus::Success);
        assert_eq!(outcome.output.unwrap(), input);
    }

    #[tokio::test]
    async fn tool_call_without_runtime_is_an_error() {
        let outcome = execute(
            None,
            Some(&json!({"tool": "webSearch", "params": {}})),
            &json!(null),
            1_000,
        )
        .await;
        assert_eq!(outcome.status, ResultStatus::Error);
        assert_eq!(outcome.error.unwrap().code, "TOOL_NOT_IMPLEMENTED");
    }
}

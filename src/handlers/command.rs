// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::process::Command;

use crate::errors::HandlerError;
use crate::events::{Event, EventContext};
use crate::traits::EventHandler;

#[derive(Debug, Deserialize)]
struct CommandRequest {
    program: String,
    #[serde(default)]
    args: Vec<String>,
    stdin: Option<String>,
}

/// Runs an external program.
///
/// Payload: `{"program": str, "args": [str], "stdin": str?}`.
/// Result: `{"status": i32, "stdout": str, "stderr": str}`. A non-zero exit
/// status is a handler failure carrying the captured stderr.
#[derive(Debug, Default)]
pub struct CommandHandler;

#[async_trait]
impl EventHandler for CommandHandler {
    async fn handle(&self, event: &Event, ctx: &EventContext) -> Result<Value, HandlerError> {
        let request: CommandRequest = serde_json::from_value(event.payload().clone())
            .map_err(|e| HandlerError::invalid_payload(e.to_string()))?;

        let mut command = Command::new(&request.program);
        command.args(&request.args);
        let output = ctx
            .run_command(command, request.stdin.as_deref().map(str::as_bytes))
            .await?;

        let status = output.status.code().unwrap_or(-1);
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            return Err(HandlerError::failed(format!(
                "'{}' exited with {}: {}",
                request.program,
                output.status,
                stderr.trim()
            )));
        }

        Ok(json!({
            "status": status,
            "stdout": stdout,
            "stderr": stderr,
        }))
    }

    fn name(&self) -> &'static str {
        "command"
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::events::ExecutionMode;

    fn event(payload: Value) -> Event {
        Event::new("command", ExecutionMode::Command, payload)
    }

    #[tokio::test]
    async fn test_captures_stdout_of_successful_command() {
        let ctx = EventContext::new("test");
        let out = CommandHandler
            .handle(&event(json!({"program": "cat", "stdin": "piped text"})), &ctx)
            .await
            .unwrap();

        assert_eq!(out["status"], json!(0));
        assert_eq!(out["stdout"], json!("piped text"));
        assert!(ctx.in_flight_processes().is_empty());
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_a_failure() {
        let ctx = EventContext::new("test");
        let err = CommandHandler
            .handle(&event(json!({"program": "sh", "args": ["-c", "echo boom >&2; exit 3"]})), &ctx)
            .await
            .unwrap_err();

        let message = err.to_string();
        assert!(message.contains("boom"), "{}", message);
    }

    #[tokio::test]
    async fn test_missing_program_is_invalid_payload() {
        let ctx = EventContext::new("test");
        let err = CommandHandler
            .handle(&event(json!({"args": ["x"]})), &ctx)
            .await
            .unwrap_err();

        assert!(matches!(err, HandlerError::InvalidPayload(_)));
    }
}

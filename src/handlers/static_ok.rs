// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::errors::HandlerError;
use crate::events::{Event, EventContext};
use crate::traits::EventHandler;

/// Always succeeds with `{"ok": true}`.
#[derive(Debug, Default)]
pub struct StaticOkHandler;

#[async_trait]
impl EventHandler for StaticOkHandler {
    async fn handle(&self, _event: &Event, _ctx: &EventContext) -> Result<Value, HandlerError> {
        Ok(json!({ "ok": true }))
    }

    fn name(&self) -> &'static str {
        "ok"
    }
}

/// Succeeds with `{"ok": true, "pid": <pid>, "scope": <scope>}`, identifying
/// the process and scope that ran it.
#[derive(Debug, Default)]
pub struct WhoAmIHandler;

#[async_trait]
impl EventHandler for WhoAmIHandler {
    async fn handle(&self, _event: &Event, ctx: &EventContext) -> Result<Value, HandlerError> {
        Ok(json!({
            "ok": true,
            "pid": std::process::id(),
            "scope": ctx.scope(),
        }))
    }

    fn name(&self) -> &'static str {
        "whoami"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ExecutionMode;

    #[tokio::test]
    async fn test_whoami_reports_this_process() {
        let event = Event::new("whoami", ExecutionMode::Thread, Value::Null);
        let out = WhoAmIHandler
            .handle(&event, &EventContext::new("dispatch-0"))
            .await
            .unwrap();

        assert_eq!(out["pid"], json!(std::process::id()));
        assert_eq!(out["scope"], json!("dispatch-0"));
        assert_eq!(out["ok"], json!(true));
    }
}

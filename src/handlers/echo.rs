// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::HandlerError;
use crate::events::{Event, EventContext};
use crate::traits::EventHandler;

/// Returns the event payload unchanged.
#[derive(Debug, Default)]
pub struct EchoHandler;

#[async_trait]
impl EventHandler for EchoHandler {
    async fn handle(&self, event: &Event, _ctx: &EventContext) -> Result<Value, HandlerError> {
        Ok(event.payload().clone())
    }

    fn name(&self) -> &'static str {
        "echo"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ExecutionMode;
    use serde_json::json;

    #[tokio::test]
    async fn test_echo_returns_payload() {
        let event = Event::new("echo", ExecutionMode::Sync, json!({"a": [1, 2]}));
        let out = EchoHandler.handle(&event, &EventContext::new("test")).await.unwrap();
        assert_eq!(out, json!({"a": [1, 2]}));
    }
}

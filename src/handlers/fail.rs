// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::HandlerError;
use crate::events::{Event, EventContext};
use crate::traits::EventHandler;

/// Always fails, with `{"message": str}` as the error text when given.
#[derive(Debug, Default)]
pub struct FailHandler;

#[async_trait]
impl EventHandler for FailHandler {
    async fn handle(&self, event: &Event, _ctx: &EventContext) -> Result<Value, HandlerError> {
        let message = event
            .payload()
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("requested failure");
        Err(HandlerError::failed(message))
    }

    fn name(&self) -> &'static str {
        "fail"
    }
}

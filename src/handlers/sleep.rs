// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::{Duration, Instant};

use crate::errors::HandlerError;
use crate::events::{Event, EventContext};
use crate::traits::EventHandler;

/// Sleeps for `{"seconds": f64}` and reports how long it slept.
///
/// Stops early with [`HandlerError::Cancelled`] when the attempt is cancelled.
#[derive(Debug, Default)]
pub struct SleepHandler;

impl SleepHandler {
    fn requested(payload: &Value) -> Result<Duration, HandlerError> {
        let seconds = payload
            .get("seconds")
            .and_then(Value::as_f64)
            .ok_or_else(|| HandlerError::invalid_payload("expected {\"seconds\": <number>}"))?;
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(HandlerError::invalid_payload(format!(
                "seconds must be a non-negative number, got {}",
                seconds
            )));
        }
        Ok(Duration::from_secs_f64(seconds))
    }
}

#[async_trait]
impl EventHandler for SleepHandler {
    async fn handle(&self, event: &Event, ctx: &EventContext) -> Result<Value, HandlerError> {
        let duration = Self::requested(event.payload())?;
        let started = Instant::now();

        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = ctx.cancellation().cancelled() => return Err(HandlerError::Cancelled),
        }

        Ok(json!({ "slept_ms": started.elapsed().as_millis() as u64 }))
    }

    fn name(&self) -> &'static str {
        "sleep"
    }
}

// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::HandlerError;
use crate::events::{Event, EventContext};

/// Application logic that processes one event.
///
/// Handlers are cached per execution scope (one instance per event type per
/// dispatch worker or corelet process) and are never shared across scopes, so
/// implementations need no internal locking for per-instance state.
///
/// Handlers that may run long should select on `ctx.cancellation()` so a
/// deadline can stop them; handlers that cannot cooperate belong in corelet
/// mode, where a deadline terminates the whole worker process.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &Event, ctx: &EventContext) -> Result<Value, HandlerError>;

    fn name(&self) -> &'static str;
}

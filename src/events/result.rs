// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;

use super::event::{Event, EventId};

/// Classification of a failed result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The handler returned an error.
    Handler,
    /// The attempt exceeded its deadline.
    Timeout,
    /// A pipe broke, a frame was undecodable, or the worker died mid-task.
    Transport,
    /// The event type (or its handler location) could not be resolved.
    Registration,
    /// No worker was available, or the engine discarded the event on shutdown.
    Unavailable,
    /// The handler panicked.
    Panicked,
    /// The event can never succeed as submitted: its payload is malformed, or
    /// it or its result is too large to carry over a corelet pipe.
    Rejected,
}

impl FailureKind {
    /// Whether another attempt may succeed where this one failed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FailureKind::Handler | FailureKind::Timeout | FailureKind::Transport | FailureKind::Panicked
        )
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::Handler => "handler",
            FailureKind::Timeout => "timeout",
            FailureKind::Transport => "transport",
            FailureKind::Registration => "registration",
            FailureKind::Unavailable => "unavailable",
            FailureKind::Panicked => "panicked",
            FailureKind::Rejected => "rejected",
        };
        f.write_str(name)
    }
}

/// Terminal outcome of an event. Produced exactly once per event; when an
/// event is retried the last attempt wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventResult {
    pub event_id: EventId,
    pub event_type: String,
    pub success: bool,
    #[serde(with = "super::json_text")]
    pub payload: Value,
    pub error: Option<String>,
    pub failure: Option<FailureKind>,
    pub attempts: u32,
    pub duration_ms: u64,
}

impl EventResult {
    pub fn success(event: &Event, payload: Value) -> Self {
        Self {
            event_id: event.id(),
            event_type: event.event_type().to_string(),
            success: true,
            payload,
            error: None,
            failure: None,
            attempts: event.attempt(),
            duration_ms: 0,
        }
    }

    pub fn failure(event: &Event, kind: FailureKind, error: impl Into<String>) -> Self {
        Self {
            event_id: event.id(),
            event_type: event.event_type().to_string(),
            success: false,
            payload: Value::Null,
            error: Some(error.into()),
            failure: Some(kind),
            attempts: event.attempt(),
            duration_ms: 0,
        }
    }

    /// A failure that cannot be tied to any event, e.g. an undecodable frame.
    pub fn unattributed(kind: FailureKind, error: impl Into<String>) -> Self {
        Self {
            event_id: EventId::nil(),
            event_type: String::new(),
            success: false,
            payload: Value::Null,
            error: Some(error.into()),
            failure: Some(kind),
            attempts: 0,
            duration_ms: 0,
        }
    }

    /// Turn this result into a failure of `kind`, keeping its identity and timing.
    pub fn into_failure(mut self, kind: FailureKind, error: impl Into<String>) -> Self {
        self.success = false;
        self.payload = Value::Null;
        self.error = Some(error.into());
        self.failure = Some(kind);
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration_ms = duration.as_millis() as u64;
        self
    }

    pub(crate) fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn is_timeout(&self) -> bool {
        self.failure == Some(FailureKind::Timeout)
    }

    pub fn is_retryable(&self) -> bool {
        !self.success && self.failure.map_or(false, |kind| kind.is_retryable())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ExecutionMode;
    use serde_json::json;

    #[test]
    fn results_carry_the_event_identity_and_attempt() {
        let mut event = Event::new("thumb", ExecutionMode::Thread, json!({}));
        event.begin_attempt(2);

        let ok = EventResult::success(&event, json!({"ok": true}));
        assert!(ok.success);
        assert_eq!(ok.event_id, event.id());
        assert_eq!(ok.attempts, 2);
        assert!(!ok.is_retryable());

        let timeout = EventResult::failure(&event, FailureKind::Timeout, "too slow");
        assert!(timeout.is_timeout());
        assert!(timeout.is_retryable());
        assert_eq!(timeout.error.as_deref(), Some("too slow"));
    }

    #[test]
    fn registration_unavailable_and_rejected_failures_are_final() {
        assert!(!FailureKind::Registration.is_retryable());
        assert!(!FailureKind::Unavailable.is_retryable());
        assert!(!FailureKind::Rejected.is_retryable());
        assert!(FailureKind::Panicked.is_retryable());
    }

    #[test]
    fn unattributed_results_use_the_nil_id() {
        let result = EventResult::unattributed(FailureKind::Transport, "bad frame");
        assert!(result.event_id.is_nil());
        assert_eq!(result.failure, Some(FailureKind::Transport));
    }
}

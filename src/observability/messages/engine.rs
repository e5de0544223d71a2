// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for engine lifecycle and event dispatch.
//!
//! This module contains message types for logging events related to:
//! * Engine start and shutdown
//! * Event publication and rejection
//! * Dispatch attempts, retries and terminal results

use std::fmt::{Display, Formatter};
use std::time::Duration;
use tracing::Span;

use crate::events::{EventId, ExecutionMode, FailureKind};
use crate::observability::messages::StructuredLog;

/// Engine started its dispatch workers.
///
/// # Log Level
/// `info!` - Important operational event
pub struct EngineStarted {
    pub worker_threads: usize,
    pub queue_capacity: usize,
    pub pool_size: usize,
}

impl Display for EngineStarted {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Event engine started: {} dispatch workers, queue_capacity={}, corelet pool_size={}",
            self.worker_threads, self.queue_capacity, self.pool_size
        )
    }
}

impl StructuredLog for EngineStarted {
    fn log(&self) {
        tracing::info!(
            worker_threads = self.worker_threads,
            queue_capacity = self.queue_capacity,
            pool_size = self.pool_size,
            "{}", self
        );
    }
}

/// Engine shutdown requested.
///
/// # Log Level
/// `info!` - Important operational event
pub struct EngineShutdown {
    pub immediately: bool,
    pub outstanding: usize,
}

impl Display for EngineShutdown {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        let how = if self.immediately { "immediate" } else { "graceful" };
        write!(
            f,
            "Event engine {} shutdown with {} outstanding events",
            how, self.outstanding
        )
    }
}

impl StructuredLog for EngineShutdown {
    fn log(&self) {
        tracing::info!(
            immediately = self.immediately,
            outstanding = self.outstanding,
            "{}", self
        );
    }
}

/// Event accepted by `publish`.
///
/// # Log Level
/// `debug!` - Per-event detail
pub struct EventPublished<'a> {
    pub event_id: EventId,
    pub event_type: &'a str,
    pub mode: ExecutionMode,
}

impl Display for EventPublished<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Event {} of type '{}' published in {} mode",
            self.event_id, self.event_type, self.mode
        )
    }
}

impl StructuredLog for EventPublished<'_> {
    fn log(&self) {
        tracing::debug!(
            event_id = %self.event_id,
            event_type = self.event_type,
            mode = %self.mode,
            "{}", self
        );
    }
}

/// Event refused by `publish` before anything was enqueued.
///
/// # Log Level
/// `warn!` - Caller error
pub struct EventRejected<'a> {
    pub event_type: &'a str,
    pub error: &'a dyn std::error::Error,
}

impl Display for EventRejected<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Event of type '{}' rejected: {}", self.event_type, self.error)
    }
}

impl StructuredLog for EventRejected<'_> {
    fn log(&self) {
        tracing::warn!(event_type = self.event_type, error = %self.error, "{}", self);
    }
}

/// A dispatch attempt is about to run.
///
/// # Log Level
/// `debug!` - Per-attempt detail
pub struct AttemptStarted<'a> {
    pub event_id: EventId,
    pub event_type: &'a str,
    pub mode: ExecutionMode,
    pub attempt: u32,
    pub budget: u32,
    pub timeout: Duration,
}

impl Display for AttemptStarted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Attempt {}/{} for event {} ('{}', {} mode, deadline {:?})",
            self.attempt, self.budget, self.event_id, self.event_type, self.mode, self.timeout
        )
    }
}

impl StructuredLog for AttemptStarted<'_> {
    fn log(&self) {
        tracing::debug!(
            event_id = %self.event_id,
            event_type = self.event_type,
            mode = %self.mode,
            attempt = self.attempt,
            budget = self.budget,
            timeout_ms = self.timeout.as_millis() as u64,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "attempt",
            span_name = name,
            event_id = %self.event_id,
            event_type = self.event_type,
            attempt = self.attempt,
        )
    }
}

/// A dispatch attempt failed and will be retried.
///
/// # Log Level
/// `warn!` - Recoverable failure
pub struct AttemptFailed<'a> {
    pub event_id: EventId,
    pub event_type: &'a str,
    pub attempt: u32,
    pub budget: u32,
    pub kind: FailureKind,
    pub error: &'a str,
}

impl Display for AttemptFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Attempt {}/{} for event {} ('{}') failed ({}): {}; retrying",
            self.attempt, self.budget, self.event_id, self.event_type, self.kind, self.error
        )
    }
}

impl StructuredLog for AttemptFailed<'_> {
    fn log(&self) {
        tracing::warn!(
            event_id = %self.event_id,
            event_type = self.event_type,
            attempt = self.attempt,
            budget = self.budget,
            kind = %self.kind,
            error = self.error,
            "{}", self
        );
    }
}

/// An event reached its terminal result.
///
/// # Log Level
/// `info!` on success, `warn!` on failure
pub struct EventCompleted<'a> {
    pub event_id: EventId,
    pub event_type: &'a str,
    pub success: bool,
    pub attempts: u32,
    pub duration: Duration,
}

impl Display for EventCompleted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        let outcome = if self.success { "succeeded" } else { "failed" };
        write!(
            f,
            "Event {} ('{}') {} after {} attempt(s) in {:?}",
            self.event_id, self.event_type, outcome, self.attempts, self.duration
        )
    }
}

impl StructuredLog for EventCompleted<'_> {
    fn log(&self) {
        if self.success {
            tracing::info!(
                event_id = %self.event_id,
                event_type = self.event_type,
                attempts = self.attempts,
                duration_ms = self.duration.as_millis() as u64,
                "{}", self
            );
        } else {
            tracing::warn!(
                event_id = %self.event_id,
                event_type = self.event_type,
                attempts = self.attempts,
                duration_ms = self.duration.as_millis() as u64,
                "{}", self
            );
        }
    }
}

/// A queued event was dropped by an immediate shutdown.
///
/// # Log Level
/// `warn!` - Work was discarded
pub struct EventDiscarded<'a> {
    pub event_id: EventId,
    pub event_type: &'a str,
}

impl Display for EventDiscarded<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Event {} ('{}') discarded by immediate shutdown",
            self.event_id, self.event_type
        )
    }
}

impl StructuredLog for EventDiscarded<'_> {
    fn log(&self) {
        tracing::warn!(event_id = %self.event_id, event_type = self.event_type, "{}", self);
    }
}

/// A dispatch worker left its loop.
///
/// # Log Level
/// `debug!` - Lifecycle detail
pub struct DispatchWorkerStopped {
    pub worker_index: usize,
    pub processed: u64,
}

impl Display for DispatchWorkerStopped {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Dispatch worker {} stopped after {} events",
            self.worker_index, self.processed
        )
    }
}

impl StructuredLog for DispatchWorkerStopped {
    fn log(&self) {
        tracing::debug!(
            worker_index = self.worker_index,
            processed = self.processed,
            "{}", self
        );
    }
}

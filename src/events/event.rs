// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! The event value object and its identity, execution mode and handler location.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

use crate::errors::EventError;

/// Event type used as the shutdown sentinel on corelet pipes.
pub const SHUTDOWN_EVENT_TYPE: &str = "__shutdown__";

/// Priority carried by the shutdown sentinel. Negative priorities are reserved
/// for control events.
pub const SHUTDOWN_PRIORITY: i32 = -100;

/// Unique identity of an event, preserved across every retry of that event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(Uuid);

impl EventId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The all-zero id, used for results that cannot be attributed to an event.
    pub fn nil() -> Self {
        Self(Uuid::nil())
    }

    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EventId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Where and how an event runs.
///
/// # Variants
/// * `Sync` - inline, in the publishing caller's task
/// * `Thread` - on one of the engine's dispatch workers
/// * `Corelet` - inside an isolated worker process from the corelet pool
/// * `Command` - on a dispatch worker, driving external OS processes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    Sync,
    Thread,
    Corelet,
    Command,
}

impl ExecutionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionMode::Sync => "sync",
            ExecutionMode::Thread => "thread",
            ExecutionMode::Corelet => "corelet",
            ExecutionMode::Command => "command",
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionMode {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sync" => Ok(ExecutionMode::Sync),
            "thread" => Ok(ExecutionMode::Thread),
            "corelet" => Ok(ExecutionMode::Corelet),
            "command" => Ok(ExecutionMode::Command),
            _ => Err(EventError::InvalidMode(s.to_string())),
        }
    }
}

/// Stable identifier of a handler implementation.
///
/// Every process registers the same handlers at startup, so a corelet worker
/// that has never seen an event type can still resolve its handler by looking
/// up this location in its own registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HandlerLocation {
    pub module_path: String,
    pub class_name: String,
}

impl HandlerLocation {
    pub fn new(module_path: impl Into<String>, class_name: impl Into<String>) -> Self {
        Self {
            module_path: module_path.into(),
            class_name: class_name.into(),
        }
    }

    /// Registry key, `module_path::ClassName`.
    pub fn key(&self) -> String {
        if self.module_path.is_empty() {
            self.class_name.clone()
        } else {
            format!("{}::{}", self.module_path, self.class_name)
        }
    }
}

impl fmt::Display for HandlerLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// One unit of work submitted to the engine.
///
/// An event is created by a caller, retried in place (same id, attempt counter
/// incremented) up to its retry budget, and discarded once a terminal
/// [`EventResult`](crate::events::EventResult) exists.
///
/// # Example
/// ```
/// use serde_json::json;
/// use the_corelet::events::{Event, ExecutionMode};
///
/// let event = Event::try_new("resize_image", "corelet", json!({"width": 640}))
///     .unwrap()
///     .with_max_retries(3);
///
/// assert_eq!(event.mode(), ExecutionMode::Corelet);
/// assert_eq!(event.attempt_budget(), 3);
/// assert!(Event::try_new("resize_image", "fiber", json!(null)).is_err());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    id: EventId,
    event_type: String,
    mode: ExecutionMode,
    #[serde(with = "super::json_text")]
    payload: Value,
    priority: i32,
    timeout: Option<Duration>,
    max_retries: u32,
    attempt: u32,
    handler_location: Option<HandlerLocation>,
}

impl Event {
    /// Create an event with a typed execution mode.
    pub fn new(event_type: impl Into<String>, mode: ExecutionMode, payload: Value) -> Self {
        Self {
            id: EventId::new(),
            event_type: event_type.into(),
            mode,
            payload,
            priority: 0,
            timeout: None,
            max_retries: 1,
            attempt: 0,
            handler_location: None,
        }
    }

    /// Create an event from a mode name, failing unless the mode is one of
    /// `sync`, `thread`, `corelet` or `command`.
    pub fn try_new(
        event_type: impl Into<String>,
        mode: &str,
        payload: Value,
    ) -> Result<Self, EventError> {
        let event_type = event_type.into();
        if event_type.trim().is_empty() {
            return Err(EventError::EmptyEventType);
        }
        let mode = mode.parse::<ExecutionMode>()?;
        Ok(Self::new(event_type, mode, payload))
    }

    /// The sentinel that tells a corelet worker to exit its loop.
    pub fn shutdown() -> Self {
        Self::new(SHUTDOWN_EVENT_TYPE, ExecutionMode::Corelet, Value::Null)
            .with_priority(SHUTDOWN_PRIORITY)
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_timeout_secs(self, seconds: u64) -> Self {
        self.with_timeout(Duration::from_secs(seconds))
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_handler_location(mut self, location: HandlerLocation) -> Self {
        self.handler_location = Some(location);
        self
    }

    pub fn id(&self) -> EventId {
        self.id
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// Explicit per-event timeout; the engine default applies when unset.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Total number of attempts this event may consume (never less than one).
    pub fn attempt_budget(&self) -> u32 {
        self.max_retries.max(1)
    }

    /// The 1-based attempt currently running, or 0 before the first attempt.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn handler_location(&self) -> Option<&HandlerLocation> {
        self.handler_location.as_ref()
    }

    pub fn is_shutdown(&self) -> bool {
        self.event_type == SHUTDOWN_EVENT_TYPE
    }

    pub fn is_control(&self) -> bool {
        self.priority < 0
    }

    pub(crate) fn begin_attempt(&mut self, attempt: u32) {
        self.attempt = attempt;
    }
}

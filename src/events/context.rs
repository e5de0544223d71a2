// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Per-dispatch execution context.
//!
//! A context is created once per execution scope (a dispatch worker, the
//! publishing caller, or a corelet process) and cloned into every attempt that
//! runs in that scope. Clones share the scope's handler cache and native
//! resource bookkeeping; each attempt gets its own cancellation token.

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::process::{Output, Stdio};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::errors::{HandlerError, RegistrationError};
use crate::traits::EventHandler;

#[derive(Clone)]
pub struct EventContext {
    scope: Arc<ScopeState>,
    cancellation: CancellationToken,
}

struct ScopeState {
    label: String,
    handlers: Mutex<HashMap<String, Arc<dyn EventHandler>>>,
    processes: Mutex<HashSet<u32>>,
    shutdown: CancellationToken,
}

impl EventContext {
    pub fn new(label: impl Into<String>) -> Self {
        Self::with_shutdown(label, CancellationToken::new())
    }

    /// Create a scope whose attempts are all cancelled when `shutdown` fires.
    pub fn with_shutdown(label: impl Into<String>, shutdown: CancellationToken) -> Self {
        let cancellation = shutdown.child_token();
        Self {
            scope: Arc::new(ScopeState {
                label: label.into(),
                handlers: Mutex::new(HashMap::new()),
                processes: Mutex::new(HashSet::new()),
                shutdown,
            }),
            cancellation,
        }
    }

    /// Label of the executing scope, e.g. `dispatch-2` or `corelet-4711`.
    pub fn scope(&self) -> &str {
        &self.scope.label
    }

    /// Token cancelled when the current attempt's deadline expires or the
    /// engine shuts down immediately. Long-running handlers should select on it.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.scope.shutdown.is_cancelled()
    }

    /// Same scope, fresh cancellation token.
    pub fn for_attempt(&self) -> Self {
        Self {
            scope: Arc::clone(&self.scope),
            cancellation: self.scope.shutdown.child_token(),
        }
    }

    /// Return the scope's cached handler for `event_type`, creating and
    /// caching it on first use.
    pub fn handler_or_insert_with<F>(
        &self,
        event_type: &str,
        create: F,
    ) -> Result<Arc<dyn EventHandler>, RegistrationError>
    where
        F: FnOnce() -> Result<Arc<dyn EventHandler>, RegistrationError>,
    {
        let mut handlers = self.scope.handlers.lock();
        if let Some(handler) = handlers.get(event_type) {
            return Ok(Arc::clone(handler));
        }
        let handler = create()?;
        handlers.insert(event_type.to_string(), Arc::clone(&handler));
        Ok(handler)
    }

    pub fn cached_handler_count(&self) -> usize {
        self.scope.handlers.lock().len()
    }

    /// Pids of OS processes started through [`run_command`](Self::run_command)
    /// that have not exited yet.
    pub fn in_flight_processes(&self) -> Vec<u32> {
        let mut pids: Vec<u32> = self.scope.processes.lock().iter().copied().collect();
        pids.sort_unstable();
        pids
    }

    /// Run an external command to completion, tracking its pid while it runs.
    ///
    /// The child is killed if the attempt is cancelled or the returned future
    /// is dropped.
    pub async fn run_command(
        &self,
        mut command: Command,
        stdin: Option<&[u8]>,
    ) -> Result<Output, HandlerError> {
        command
            .kill_on_drop(true)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() });

        let mut child = command.spawn()?;
        let _guard = child.id().map(|pid| ProcessGuard::track(&self.scope, pid));

        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(input).await?;
        }

        tokio::select! {
            output = child.wait_with_output() => Ok(output?),
            _ = self.cancellation.cancelled() => Err(HandlerError::Cancelled),
        }
    }
}

impl fmt::Debug for EventContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventContext")
            .field("scope", &self.scope.label)
            .field("cached_handlers", &self.cached_handler_count())
            .field("in_flight_processes", &self.in_flight_processes())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

struct ProcessGuard {
    scope: Arc<ScopeState>,
    pid: u32,
}

impl ProcessGuard {
    fn track(scope: &Arc<ScopeState>, pid: u32) -> Self {
        scope.processes.lock().insert(pid);
        Self {
            scope: Arc::clone(scope),
            pid,
        }
    }
}

impl Drop for ProcessGuard {
    fn drop(&mut self) {
        self.scope.processes.lock().remove(&self.pid);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Event;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Nop;

    #[async_trait]
    impl EventHandler for Nop {
        async fn handle(&self, _event: &Event, _ctx: &EventContext) -> Result<Value, HandlerError> {
            Ok(json!(null))
        }

        fn name(&self) -> &'static str {
            "nop"
        }
    }

    #[test]
    fn handler_cache_constructs_once_per_type() {
        let ctx = EventContext::new("dispatch-0");
        let constructed = AtomicUsize::new(0);
        let create = || {
            constructed.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(Nop) as Arc<dyn EventHandler>)
        };

        ctx.handler_or_insert_with("nop", create).unwrap();
        ctx.for_attempt().handler_or_insert_with("nop", create).unwrap();
        ctx.handler_or_insert_with("other", create).unwrap();

        assert_eq!(constructed.load(Ordering::SeqCst), 2);
        assert_eq!(ctx.cached_handler_count(), 2);
    }

    #[test]
    fn creation_errors_are_not_cached() {
        let ctx = EventContext::new("dispatch-0");
        let err = ctx
            .handler_or_insert_with("ghost", || {
                Err(RegistrationError::UnknownEventType("ghost".into()))
            })
            .err()
            .unwrap();
        assert_eq!(err, RegistrationError::UnknownEventType("ghost".into()));
        assert_eq!(ctx.cached_handler_count(), 0);
    }

    #[test]
    fn shutdown_cancels_every_attempt_in_scope() {
        let shutdown = CancellationToken::new();
        let ctx = EventContext::with_shutdown("dispatch-1", shutdown.clone());
        let attempt = ctx.for_attempt();
        assert!(!attempt.is_cancelled());

        shutdown.cancel();
        assert!(attempt.is_cancelled());
        assert!(ctx.is_shutting_down());
    }

    #[test]
    fn attempt_tokens_are_independent() {
        let ctx = EventContext::new("dispatch-0");
        let first = ctx.for_attempt();
        let second = ctx.for_attempt();
        first.cancellation().cancel();
        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn run_command_collects_output_and_untracks_the_child() {
        let ctx = EventContext::new("dispatch-0");
        let mut command = Command::new("cat");
        command.arg("-");

        let output = ctx.run_command(command, Some(b"piped through")).await.unwrap();

        assert!(output.status.success());
        assert_eq!(String::from_utf8_lossy(&output.stdout), "piped through");
        assert!(ctx.in_flight_processes().is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn cancelled_command_is_killed() {
        let ctx = EventContext::new("dispatch-0").for_attempt();
        let mut command = Command::new("sleep");
        command.arg("30");

        let canceller = ctx.cancellation().clone();
        let watcher = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            assert_eq!(watcher.in_flight_processes().len(), 1);
            canceller.cancel();
        });

        let started = std::time::Instant::now();
        let err = ctx.run_command(command, None).await.unwrap_err();

        assert!(matches!(err, HandlerError::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(ctx.in_flight_processes().is_empty());
    }
}

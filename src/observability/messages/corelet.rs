// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for corelet pool orchestration and the worker process loop.
//!
//! This module contains message types for logging events related to:
//! * Worker spawning, death, replacement and termination
//! * Task dispatch and result collection
//! * The worker-side event loop (startup, idle exit, pipe failures)

use std::fmt::{Display, Formatter};
use std::path::Path;
use std::time::Duration;

use crate::observability::messages::StructuredLog;

/// Corelet pool created its workers and supervisors.
///
/// # Log Level
/// `info!` - Important operational event
pub struct PoolStarted<'a> {
    pub pool_size: usize,
    pub program: &'a Path,
}

impl Display for PoolStarted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Corelet pool started with {} workers running '{}'",
            self.pool_size,
            self.program.display()
        )
    }
}

impl StructuredLog for PoolStarted<'_> {
    fn log(&self) {
        tracing::info!(
            pool_size = self.pool_size,
            program = %self.program.display(),
            "{}", self
        );
    }
}

/// A worker process was launched.
///
/// # Log Level
/// `info!` - Important operational event
pub struct WorkerSpawned {
    pub worker_id: usize,
    pub pid: Option<u32>,
}

impl Display for WorkerSpawned {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self.pid {
            Some(pid) => write!(f, "Corelet worker {} spawned (pid {})", self.worker_id, pid),
            None => write!(f, "Corelet worker {} spawned", self.worker_id),
        }
    }
}

impl StructuredLog for WorkerSpawned {
    fn log(&self) {
        tracing::info!(worker_id = self.worker_id, pid = ?self.pid, "{}", self);
    }
}

/// The health monitor found a dead worker.
///
/// # Log Level
/// `warn!` - Worker loss
pub struct WorkerDied<'a> {
    pub worker_id: usize,
    pub pid: Option<u32>,
    pub status: &'a str,
    pub orphaned_tasks: usize,
}

impl Display for WorkerDied<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Corelet worker {} died ({}); {} in-flight task(s) rejected",
            self.worker_id, self.status, self.orphaned_tasks
        )
    }
}

impl StructuredLog for WorkerDied<'_> {
    fn log(&self) {
        tracing::warn!(
            worker_id = self.worker_id,
            pid = ?self.pid,
            status = self.status,
            orphaned_tasks = self.orphaned_tasks,
            "{}", self
        );
    }
}

/// A dead worker was replaced.
///
/// # Log Level
/// `info!` - Recovery event
pub struct WorkerReplaced {
    pub old_worker_id: usize,
    pub new_worker_id: usize,
    pub restarts: u64,
}

impl Display for WorkerReplaced {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Corelet worker {} replaced by worker {} (restart #{})",
            self.old_worker_id, self.new_worker_id, self.restarts
        )
    }
}

impl StructuredLog for WorkerReplaced {
    fn log(&self) {
        tracing::info!(
            old_worker_id = self.old_worker_id,
            new_worker_id = self.new_worker_id,
            restarts = self.restarts,
            "{}", self
        );
    }
}

/// A replacement worker could not be started.
///
/// # Log Level
/// `error!` - Pool is running below capacity
pub struct WorkerRespawnFailed<'a> {
    pub old_worker_id: usize,
    pub error: &'a dyn std::error::Error,
}

impl Display for WorkerRespawnFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Failed to replace corelet worker {}: {}",
            self.old_worker_id, self.error
        )
    }
}

impl StructuredLog for WorkerRespawnFailed<'_> {
    fn log(&self) {
        tracing::error!(old_worker_id = self.old_worker_id, error = %self.error, "{}", self);
    }
}

/// A task was written to a worker's task pipe.
///
/// # Log Level
/// `debug!` - Per-task detail
pub struct TaskDispatched<'a> {
    pub task_id: u64,
    pub worker_id: usize,
    pub event_type: &'a str,
    pub active_tasks: usize,
}

impl Display for TaskDispatched<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Task {} ('{}') dispatched to corelet worker {} ({} active)",
            self.task_id, self.event_type, self.worker_id, self.active_tasks
        )
    }
}

impl StructuredLog for TaskDispatched<'_> {
    fn log(&self) {
        tracing::debug!(
            task_id = self.task_id,
            worker_id = self.worker_id,
            event_type = self.event_type,
            active_tasks = self.active_tasks,
            "{}", self
        );
    }
}

/// A worker was killed because its task outlived the deadline.
///
/// # Log Level
/// `warn!` - Forced termination
pub struct TaskTerminated {
    pub task_id: u64,
    pub worker_id: usize,
}

impl Display for TaskTerminated {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Corelet worker {} terminated: task {} exceeded its deadline",
            self.worker_id, self.task_id
        )
    }
}

impl StructuredLog for TaskTerminated {
    fn log(&self) {
        tracing::warn!(task_id = self.task_id, worker_id = self.worker_id, "{}", self);
    }
}

/// A result arrived with no pending entry waiting for it.
///
/// # Log Level
/// `warn!` - Dropped result
pub struct ResultOrphaned {
    pub task_id: u64,
    pub worker_id: usize,
}

impl Display for ResultOrphaned {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Dropping result for task {} from corelet worker {}: no pending entry",
            self.task_id, self.worker_id
        )
    }
}

impl StructuredLog for ResultOrphaned {
    fn log(&self) {
        tracing::warn!(task_id = self.task_id, worker_id = self.worker_id, "{}", self);
    }
}

/// Pool shutdown finished.
///
/// # Log Level
/// `info!` - Important operational event
pub struct PoolShutdownCompleted {
    pub exited: usize,
    pub killed: usize,
    pub rejected_tasks: usize,
}

impl Display for PoolShutdownCompleted {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Corelet pool shut down: {} worker(s) exited, {} killed, {} pending task(s) rejected",
            self.exited, self.killed, self.rejected_tasks
        )
    }
}

impl StructuredLog for PoolShutdownCompleted {
    fn log(&self) {
        tracing::info!(
            exited = self.exited,
            killed = self.killed,
            rejected_tasks = self.rejected_tasks,
            "{}", self
        );
    }
}

/// Worker process entered its event loop.
///
/// # Log Level
/// `info!` - Important operational event
pub struct WorkerLoopStarted {
    pub pid: u32,
    pub idle_timeout: Duration,
    pub poll_interval: Duration,
}

impl Display for WorkerLoopStarted {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Corelet {} ready: idle_timeout={:?}, poll_interval={:?}",
            self.pid, self.idle_timeout, self.poll_interval
        )
    }
}

impl StructuredLog for WorkerLoopStarted {
    fn log(&self) {
        tracing::info!(
            pid = self.pid,
            idle_timeout_ms = self.idle_timeout.as_millis() as u64,
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "{}", self
        );
    }
}

/// Worker left its loop.
///
/// # Log Level
/// `info!` - Important operational event
pub struct WorkerLoopExited<'a> {
    pub pid: u32,
    pub reason: &'a str,
    pub handled: u64,
}

impl Display for WorkerLoopExited<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Corelet {} exiting ({}) after {} event(s)",
            self.pid, self.reason, self.handled
        )
    }
}

impl StructuredLog for WorkerLoopExited<'_> {
    fn log(&self) {
        tracing::info!(pid = self.pid, reason = self.reason, handled = self.handled, "{}", self);
    }
}

/// Worker received a frame it could not decode.
///
/// # Log Level
/// `warn!` - Frame dropped, worker keeps running
pub struct WorkerFrameRejected<'a> {
    pub pid: u32,
    pub error: &'a dyn std::error::Error,
}

impl Display for WorkerFrameRejected<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Corelet {} rejected an undecodable frame: {}", self.pid, self.error)
    }
}

impl StructuredLog for WorkerFrameRejected<'_> {
    fn log(&self) {
        tracing::warn!(pid = self.pid, error = %self.error, "{}", self);
    }
}

/// A handler's result could not be framed; a failure is sent in its place.
///
/// # Log Level
/// `warn!` - The task fails, worker keeps running
pub struct ResultUndeliverable<'a> {
    pub pid: u32,
    pub task_id: u64,
    pub error: &'a dyn std::error::Error,
}

impl Display for ResultUndeliverable<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Corelet {} could not send the result of task {}: {}",
            self.pid, self.task_id, self.error
        )
    }
}

impl StructuredLog for ResultUndeliverable<'_> {
    fn log(&self) {
        tracing::warn!(pid = self.pid, task_id = self.task_id, error = %self.error, "{}", self);
    }
}

/// Worker's pipe broke; the worker is ending.
///
/// # Log Level
/// `error!` - Fatal to this worker
pub struct WorkerPipeBroken<'a> {
    pub pid: u32,
    pub error: &'a dyn std::error::Error,
}

impl Display for WorkerPipeBroken<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Corelet {} pipe broken: {}", self.pid, self.error)
    }
}

impl StructuredLog for WorkerPipeBroken<'_> {
    fn log(&self) {
        tracing::error!(pid = self.pid, error = %self.error, "{}", self);
    }
}

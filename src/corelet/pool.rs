// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Bounded pool of corelet worker processes.
//!
//! The pool owns every [`WorkerInfo`] and the pending-result table. Two
//! supervisor tasks run alongside the workers:
//!
//! * the **collector** receives result frames from every worker's reader task
//!   and resolves the matching pending entry;
//! * the **health monitor** wakes every `health_check_interval`, removes dead
//!   workers, rejects their in-flight tasks and starts replacements until the
//!   pool is back at `pool_size`.
//!
//! Both supervisors hold only a weak reference to the pool and stop when it
//! shuts down or is dropped.
//!
//! Lock order is `workers` before `pending`.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::wire::{self, ResultEnvelope, TaskEnvelope, CONTROL_TASK_ID};
use super::worker_info::{WorkerFrame, WorkerInfo};
use crate::config::CoreletConfig;
use crate::errors::CoreletError;
use crate::events::{Event, EventResult};
use crate::observability::messages::corelet::{
    PoolShutdownCompleted, PoolStarted, ResultOrphaned, TaskDispatched, TaskTerminated,
    WorkerDied, WorkerReplaced, WorkerRespawnFailed, WorkerSpawned,
};
use crate::observability::messages::StructuredLog;

type ResultSender = oneshot::Sender<Result<EventResult, CoreletError>>;

struct PendingEntry {
    worker_id: usize,
    sender: ResultSender,
}

/// Handle to a submitted task's eventual result.
#[derive(Debug)]
pub struct PendingTask {
    task_id: u64,
    worker_id: usize,
    receiver: oneshot::Receiver<Result<EventResult, CoreletError>>,
}

impl PendingTask {
    pub fn task_id(&self) -> u64 {
        self.task_id
    }

    pub fn worker_id(&self) -> usize {
        self.worker_id
    }

    /// Wait for the worker's result. Resolves to [`CoreletError::WorkerLost`]
    /// if the worker dies, is terminated, or the pool shuts down first.
    pub async fn wait(self) -> Result<EventResult, CoreletError> {
        match self.receiver.await {
            Ok(outcome) => outcome,
            Err(_) => Err(CoreletError::WorkerLost {
                worker_id: self.worker_id,
                task_id: self.task_id,
            }),
        }
    }
}

/// How the workers left when the pool shut down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ShutdownReport {
    /// Workers that exited on their own after the shutdown sentinel.
    pub exited: usize,
    /// Workers still running when the grace period ran out.
    pub killed: usize,
    pub rejected_tasks: usize,
}

/// Point-in-time view of one worker.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerSnapshot {
    pub worker_id: usize,
    pub pid: Option<u32>,
    pub active_tasks: usize,
    pub completed_tasks: u64,
    pub age_ms: u64,
    pub idle_ms: u64,
}

pub struct CoreletPool {
    config: CoreletConfig,
    workers: Mutex<Vec<WorkerInfo>>,
    pending: Mutex<HashMap<u64, PendingEntry>>,
    next_task_id: AtomicU64,
    next_worker_id: AtomicUsize,
    restarts: AtomicU64,
    completed: AtomicU64,
    frames: mpsc::UnboundedSender<WorkerFrame>,
    supervisors: Mutex<Vec<JoinHandle<()>>>,
    cancel: CancellationToken,
    stopped: AtomicBool,
}

impl CoreletPool {
    /// Start `config.pool_size` workers plus the collector and health monitor.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(config: CoreletConfig) -> Result<Arc<Self>, CoreletError> {
        let program = config.program_path().map_err(CoreletError::Spawn)?;
        let (frames, frame_rx) = mpsc::unbounded_channel();
        let pool = Arc::new(Self {
            config,
            workers: Mutex::new(Vec::new()),
            pending: Mutex::new(HashMap::new()),
            next_task_id: AtomicU64::new(CONTROL_TASK_ID + 1),
            next_worker_id: AtomicUsize::new(1),
            restarts: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            frames,
            supervisors: Mutex::new(Vec::new()),
            cancel: CancellationToken::new(),
            stopped: AtomicBool::new(false),
        });

        for _ in 0..pool.config.pool_size {
            pool.spawn_worker()?;
        }

        let collector = tokio::spawn(collect_results(
            Arc::downgrade(&pool),
            frame_rx,
            pool.cancel.clone(),
        ));
        let monitor = tokio::spawn(monitor_health(
            Arc::downgrade(&pool),
            pool.config.health_check_interval(),
            pool.cancel.clone(),
        ));
        pool.supervisors.lock().extend([collector, monitor]);

        PoolStarted {
            pool_size: pool.config.pool_size,
            program: &program,
        }
        .log();
        Ok(pool)
    }

    /// Launch a worker and add it to the registry. A worker launched after
    /// shutdown began is killed instead of registered.
    fn spawn_worker(&self) -> Result<usize, CoreletError> {
        let worker_id = self.next_worker_id.fetch_add(1, Ordering::SeqCst);
        let mut worker = WorkerInfo::spawn(worker_id, &self.config, self.frames.clone())?;
        let pid = worker.pid();
        {
            let mut workers = self.workers.lock();
            if self.stopped.load(Ordering::SeqCst) {
                worker.retire();
                return Err(CoreletError::PoolStopped);
            }
            workers.push(worker);
        }
        WorkerSpawned { worker_id, pid }.log();
        Ok(worker_id)
    }

    /// Dispatch `event` to the least-loaded live worker.
    ///
    /// Ties go to the earliest worker in the registry. Fails immediately with
    /// [`CoreletError::NoLiveWorker`] when no worker is alive, and with
    /// [`CoreletError::FrameTooLarge`] or [`CoreletError::Codec`] when the
    /// event cannot be framed; no worker is touched in either case.
    ///
    /// The frame is written by a background task, so dropping the returned
    /// handle never leaves a partial frame in a worker's pipe. A failed write
    /// retires the worker and resolves the handle with the error.
    pub fn submit_task(self: &Arc<Self>, event: Event) -> Result<PendingTask, CoreletError> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(CoreletError::PoolStopped);
        }

        let task_id = self.next_task_id.fetch_add(1, Ordering::SeqCst);
        let event_type = event.event_type().to_string();
        let frame = wire::encode_frame(&TaskEnvelope { task_id, event })?;
        let (sender, receiver) = oneshot::channel();
        let (worker_id, pipe) = {
            let mut workers = self.workers.lock();
            let worker = workers
                .iter_mut()
                .filter_map(|worker| worker.is_alive().then_some(worker))
                .min_by_key(|worker| worker.active_tasks())
                .ok_or(CoreletError::NoLiveWorker)?;
            worker.begin_task(task_id);
            let worker_id = worker.worker_id();
            self.pending
                .lock()
                .insert(task_id, PendingEntry { worker_id, sender });

            TaskDispatched {
                task_id,
                worker_id,
                event_type: &event_type,
                active_tasks: worker.active_tasks(),
            }
            .log();
            (worker_id, worker.task_pipe())
        };

        let pool = Arc::downgrade(self);
        tokio::spawn(async move {
            let written = {
                let mut pipe = pipe.lock().await;
                wire::write_encoded(&mut *pipe, &frame).await
            };
            if let (Err(error), Some(pool)) = (written, pool.upgrade()) {
                pool.withdraw_task(worker_id, task_id, error);
            }
        });

        Ok(PendingTask {
            task_id,
            worker_id,
            receiver,
        })
    }

    /// The task pipe broke while `task_id` was being written: the worker is
    /// unusable, so retire it and hand `error` to the task's waiter.
    fn withdraw_task(&self, worker_id: usize, task_id: u64, error: CoreletError) {
        let entry = {
            let mut workers = self.workers.lock();
            if let Some(worker) = workers.iter_mut().find(|w| w.worker_id() == worker_id) {
                worker.abandon_task(task_id);
                worker.retire();
            }
            self.pending.lock().remove(&task_id)
        };
        if let Some(entry) = entry {
            let _ = entry.sender.send(Err(error));
        }
    }

    /// Kill the worker running `task_id` and reject every task it held.
    ///
    /// Returns `false`, doing nothing, when the task is no longer running.
    pub fn terminate_task(&self, task_id: u64) -> bool {
        let (worker_id, orphans) = {
            let mut workers = self.workers.lock();
            match workers.iter_mut().find(|w| w.has_task(task_id)) {
                Some(worker) => {
                    worker.retire();
                    (worker.worker_id(), worker.take_in_flight())
                }
                None => return false,
            }
        };
        TaskTerminated { task_id, worker_id }.log();
        self.reject_tasks(worker_id, orphans);
        true
    }

    fn resolve(&self, worker_id: usize, envelope: ResultEnvelope) {
        let ResultEnvelope { task_id, result } = envelope;
        if task_id == CONTROL_TASK_ID {
            if !result.success {
                tracing::warn!(
                    worker_id,
                    error = result.error.as_deref().unwrap_or_default(),
                    "Corelet worker reported an unattributed failure"
                );
            }
            return;
        }

        let entry = {
            let mut workers = self.workers.lock();
            if let Some(worker) = workers.iter_mut().find(|w| w.worker_id() == worker_id) {
                if worker.finish_task(task_id) {
                    self.completed.fetch_add(1, Ordering::Relaxed);
                }
            }
            self.pending.lock().remove(&task_id)
        };

        match entry {
            Some(entry) => {
                let _ = entry.sender.send(Ok(result));
            }
            None => ResultOrphaned { task_id, worker_id }.log(),
        }
    }

    fn handle_pipe_closed(&self, worker_id: usize) {
        let orphans = {
            let mut workers = self.workers.lock();
            match workers.iter_mut().find(|w| w.worker_id() == worker_id) {
                Some(worker) => {
                    worker.retire();
                    worker.take_in_flight()
                }
                None => return,
            }
        };
        self.reject_tasks(worker_id, orphans);
    }

    fn reject_tasks(&self, worker_id: usize, task_ids: Vec<u64>) -> usize {
        let mut pending = self.pending.lock();
        let mut rejected = 0;
        for task_id in task_ids {
            if let Some(entry) = pending.remove(&task_id) {
                let _ = entry
                    .sender
                    .send(Err(CoreletError::WorkerLost { worker_id, task_id }));
                rejected += 1;
            }
        }
        rejected
    }

    /// Remove dead workers, reject their tasks and top the pool back up.
    fn check_health(&self) {
        if self.stopped.load(Ordering::SeqCst) {
            return;
        }

        let mut dead = {
            let mut workers = self.workers.lock();
            let mut dead = Vec::new();
            let mut index = 0;
            while index < workers.len() {
                if workers[index].is_alive() {
                    index += 1;
                } else {
                    dead.push(workers.remove(index));
                }
            }
            dead
        };

        let mut replaced = Vec::with_capacity(dead.len());
        for worker in dead.iter_mut() {
            let orphans = worker.take_in_flight();
            let orphaned_tasks = self.reject_tasks(worker.worker_id(), orphans);
            WorkerDied {
                worker_id: worker.worker_id(),
                pid: worker.pid(),
                status: &worker.exit_description(),
                orphaned_tasks,
            }
            .log();
            replaced.push(worker.worker_id());
        }
        drop(dead);

        let deficit = self.config.pool_size.saturating_sub(self.workers.lock().len());
        for slot in 0..deficit {
            let old_worker_id = replaced.get(slot).copied().unwrap_or_default();
            match self.spawn_worker() {
                Ok(new_worker_id) => {
                    let restarts = self.restarts.fetch_add(1, Ordering::SeqCst) + 1;
                    WorkerReplaced {
                        old_worker_id,
                        new_worker_id,
                        restarts,
                    }
                    .log();
                }
                Err(CoreletError::PoolStopped) => break,
                Err(error) => {
                    WorkerRespawnFailed {
                        old_worker_id,
                        error: &error,
                    }
                    .log();
                    break;
                }
            }
        }
    }

    /// Stop the pool: send every worker the shutdown sentinel, wait up to
    /// `shutdown_grace` for them to exit, kill the rest, then reject whatever
    /// is still pending. Idempotent; later calls report nothing.
    pub async fn shutdown(&self) -> ShutdownReport {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return ShutdownReport::default();
        }

        let mut workers = std::mem::take(&mut *self.workers.lock());
        let grace = self.config.shutdown_grace();
        let deadline = Instant::now() + grace;

        // A worker whose pipe is full never sees the sentinel; it is killed below.
        if let Ok(sentinel) = wire::encode_frame(&TaskEnvelope {
            task_id: CONTROL_TASK_ID,
            event: Event::shutdown(),
        }) {
            for worker in workers.iter() {
                let pipe = worker.task_pipe();
                let remaining = deadline.saturating_duration_since(Instant::now());
                let _ = tokio::time::timeout(remaining, async {
                    let mut pipe = pipe.lock().await;
                    wire::write_encoded(&mut *pipe, &sentinel).await
                })
                .await;
            }
        }
        let (mut exited, mut killed) = (0, 0);
        for worker in workers.iter_mut() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match tokio::time::timeout(remaining, worker.wait()).await {
                Ok(_) => exited += 1,
                Err(_) => {
                    let _ = worker.kill().await;
                    killed += 1;
                }
            }
        }
        for worker in workers.iter_mut() {
            worker.finish_reader(grace).await;
        }
        drop(workers);

        self.cancel.cancel();
        let supervisors = std::mem::take(&mut *self.supervisors.lock());
        for supervisor in supervisors {
            let _ = supervisor.await;
        }

        let rejected_tasks = {
            let mut pending = self.pending.lock();
            let rejected = pending.len();
            for (task_id, entry) in pending.drain() {
                let _ = entry.sender.send(Err(CoreletError::WorkerLost {
                    worker_id: entry.worker_id,
                    task_id,
                }));
            }
            rejected
        };

        PoolShutdownCompleted {
            exited,
            killed,
            rejected_tasks,
        }
        .log();
        ShutdownReport {
            exited,
            killed,
            rejected_tasks,
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn pool_size(&self) -> usize {
        self.config.pool_size
    }

    pub fn live_workers(&self) -> usize {
        self.workers
            .lock()
            .iter_mut()
            .filter_map(|worker| worker.is_alive().then_some(()))
            .count()
    }

    pub fn pending_tasks(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn restarts(&self) -> u64 {
        self.restarts.load(Ordering::SeqCst)
    }

    pub fn completed_tasks(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    /// Pids of live workers in registry order.
    pub fn worker_pids(&self) -> Vec<u32> {
        self.workers
            .lock()
            .iter_mut()
            .filter_map(|worker| if worker.is_alive() { worker.pid() } else { None })
            .collect()
    }

    pub fn snapshot(&self) -> Vec<WorkerSnapshot> {
        self.workers
            .lock()
            .iter()
            .map(|worker| WorkerSnapshot {
                worker_id: worker.worker_id(),
                pid: worker.pid(),
                active_tasks: worker.active_tasks(),
                completed_tasks: worker.completed_tasks(),
                age_ms: worker.age().as_millis() as u64,
                idle_ms: worker.idle_for().as_millis() as u64,
            })
            .collect()
    }
}

impl Drop for CoreletPool {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for CoreletPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreletPool")
            .field("pool_size", &self.config.pool_size)
            .field("workers", &self.workers.lock().len())
            .field("pending", &self.pending_tasks())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

async fn collect_results(
    pool: Weak<CoreletPool>,
    mut frames: mpsc::UnboundedReceiver<WorkerFrame>,
    cancel: CancellationToken,
) {
    loop {
        let frame = tokio::select! {
            biased;
            frame = frames.recv() => frame,
            _ = cancel.cancelled() => None,
        };
        let Some(frame) = frame else { break };
        let Some(pool) = pool.upgrade() else { break };
        match frame {
            WorkerFrame::Result {
                worker_id,
                envelope,
            } => pool.resolve(worker_id, envelope),
            WorkerFrame::Closed { worker_id } => pool.handle_pipe_closed(worker_id),
        }
    }
}

async fn monitor_health(pool: Weak<CoreletPool>, interval: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        let Some(pool) = pool.upgrade() else { break };
        pool.check_health();
    }
}

// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! One corelet worker process as seen from the pool.

use std::collections::HashSet;
use std::io;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::BufReader;
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::JoinHandle;

use super::wire::{self, ResultEnvelope};
use super::worker::{IDLE_TIMEOUT_ENV, POLL_INTERVAL_ENV, WORKER_ENV};
use crate::config::CoreletConfig;
use crate::errors::CoreletError;
use crate::observability::messages::corelet::WorkerFrameRejected;
use crate::observability::messages::StructuredLog;

/// Traffic from a worker's result pipe to the pool's collector.
#[derive(Debug)]
pub(crate) enum WorkerFrame {
    Result {
        worker_id: usize,
        envelope: ResultEnvelope,
    },
    Closed {
        worker_id: usize,
    },
}

pub(crate) type TaskPipe = Arc<AsyncMutex<ChildStdin>>;

/// Process handle, pipes and load counters for one worker.
///
/// `active_tasks` always equals the number of task ids in `in_flight`; a task
/// id enters exactly once on dispatch and leaves exactly once on completion,
/// termination or worker death.
pub struct WorkerInfo {
    worker_id: usize,
    pid: Option<u32>,
    child: Child,
    task_pipe: TaskPipe,
    reader: JoinHandle<()>,
    in_flight: HashSet<u64>,
    completed_tasks: u64,
    created_at: Instant,
    last_activity: Instant,
    retired: bool,
    exit_status: Option<ExitStatus>,
}

impl WorkerInfo {
    /// Launch a worker process and start forwarding its result pipe into `frames`.
    pub(crate) fn spawn(
        worker_id: usize,
        config: &CoreletConfig,
        frames: mpsc::UnboundedSender<WorkerFrame>,
    ) -> Result<Self, CoreletError> {
        let program = config.program_path().map_err(CoreletError::Spawn)?;
        let mut command = Command::new(program);
        command
            .args(&config.args)
            .env(WORKER_ENV, "1")
            .env(IDLE_TIMEOUT_ENV, config.idle_timeout_secs.to_string())
            .env(POLL_INTERVAL_ENV, config.poll_interval_ms.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(CoreletError::Spawn)?;
        let stdin = child.stdin.take().ok_or_else(|| missing_pipe("stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| missing_pipe("stdout"))?;
        let pid = child.id();
        let reader = tokio::spawn(forward_results(worker_id, pid, stdout, frames));
        let now = Instant::now();

        Ok(Self {
            worker_id,
            pid,
            child,
            task_pipe: Arc::new(AsyncMutex::new(stdin)),
            reader,
            in_flight: HashSet::new(),
            completed_tasks: 0,
            created_at: now,
            last_activity: now,
            retired: false,
            exit_status: None,
        })
    }

    pub fn worker_id(&self) -> usize {
        self.worker_id
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn active_tasks(&self) -> usize {
        self.in_flight.len()
    }

    pub fn completed_tasks(&self) -> u64 {
        self.completed_tasks
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    pub fn idle_for(&self) -> Duration {
        self.last_activity.elapsed()
    }

    /// Whether the process is running and the worker has not been retired.
    /// Reaps the process if it has exited.
    pub fn is_alive(&mut self) -> bool {
        if self.exit_status.is_none() {
            match self.child.try_wait() {
                Ok(Some(status)) => self.exit_status = Some(status),
                Ok(None) => {}
                Err(_) => return false,
            }
        }
        !self.retired && self.exit_status.is_none()
    }

    /// Human-readable reason the worker is no longer alive.
    pub fn exit_description(&self) -> String {
        match (self.exit_status, self.retired) {
            (Some(status), _) => status.to_string(),
            (None, true) => "terminated by pool".to_string(),
            (None, false) => "status unknown".to_string(),
        }
    }

    pub(crate) fn task_pipe(&self) -> TaskPipe {
        Arc::clone(&self.task_pipe)
    }

    pub(crate) fn has_task(&self, task_id: u64) -> bool {
        self.in_flight.contains(&task_id)
    }

    pub(crate) fn begin_task(&mut self, task_id: u64) {
        self.in_flight.insert(task_id);
        self.last_activity = Instant::now();
    }

    /// Returns `false` when the task was not running here.
    pub(crate) fn finish_task(&mut self, task_id: u64) -> bool {
        if !self.in_flight.remove(&task_id) {
            return false;
        }
        self.completed_tasks += 1;
        self.last_activity = Instant::now();
        true
    }

    /// Drop a task without counting it as completed.
    pub(crate) fn abandon_task(&mut self, task_id: u64) {
        self.in_flight.remove(&task_id);
    }

    pub(crate) fn take_in_flight(&mut self) -> Vec<u64> {
        let mut tasks: Vec<u64> = self.in_flight.drain().collect();
        tasks.sort_unstable();
        tasks
    }

    /// Send SIGKILL (or the platform equivalent) and stop selecting this worker.
    pub(crate) fn retire(&mut self) {
        self.retired = true;
        let _ = self.child.start_kill();
    }

    pub(crate) async fn wait(&mut self) -> io::Result<ExitStatus> {
        let status = self.child.wait().await?;
        self.exit_status = Some(status);
        Ok(status)
    }

    pub(crate) async fn kill(&mut self) -> io::Result<()> {
        self.retired = true;
        self.child.kill().await
    }

    /// Wait for the result pipe to drain after the process has exited.
    pub(crate) async fn finish_reader(&mut self, limit: Duration) {
        if tokio::time::timeout(limit, &mut self.reader).await.is_err() {
            self.reader.abort();
        }
    }
}

impl std::fmt::Debug for WorkerInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerInfo")
            .field("worker_id", &self.worker_id)
            .field("pid", &self.pid)
            .field("active_tasks", &self.active_tasks())
            .field("completed_tasks", &self.completed_tasks)
            .field("retired", &self.retired)
            .finish()
    }
}

fn missing_pipe(name: &str) -> CoreletError {
    CoreletError::Spawn(io::Error::new(
        io::ErrorKind::BrokenPipe,
        format!("worker {} was not captured", name),
    ))
}

async fn forward_results(
    worker_id: usize,
    pid: Option<u32>,
    stdout: ChildStdout,
    frames: mpsc::UnboundedSender<WorkerFrame>,
) {
    let mut reader = BufReader::new(stdout);
    loop {
        match wire::read_frame::<_, ResultEnvelope>(&mut reader).await {
            Ok(Some(envelope)) => {
                if frames.send(WorkerFrame::Result { worker_id, envelope }).is_err() {
                    return;
                }
            }
            Ok(None) => break,
            Err(error) if error.is_fatal_to_worker() => break,
            Err(error) => {
                WorkerFrameRejected {
                    pid: pid.unwrap_or_default(),
                    error: &error,
                }
                .log();
            }
        }
    }
    let _ = frames.send(WorkerFrame::Closed { worker_id });
}

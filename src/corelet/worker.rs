// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! The corelet worker process loop.
//!
//! A worker is this crate's host executable relaunched by the pool with
//! [`WORKER_ENV`] set. It reads [`TaskEnvelope`]s from stdin, runs each event
//! on a handler resolved from its own [`EventFactory`], and writes a
//! [`ResultEnvelope`] per task to stdout. Tasks run one at a time.

use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncWrite, BufReader, BufWriter};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::wire::{self, ResultEnvelope, TaskEnvelope, CONTROL_TASK_ID};
use crate::config::consts::{DEFAULT_IDLE_TIMEOUT_SECS, DEFAULT_POLL_INTERVAL_MS};
use crate::engine::dispatch::{panic_message, spawn_handler};
use crate::errors::{CoreletError, RegistrationError};
use crate::events::{Event, EventContext, EventFactory, EventResult, FailureKind};
use crate::observability::messages::corelet::{
    ResultUndeliverable, WorkerFrameRejected, WorkerLoopExited, WorkerLoopStarted,
    WorkerPipeBroken,
};
use crate::observability::messages::StructuredLog;
use crate::traits::EventHandler;

/// Set to `1` in the environment of every process the pool launches.
pub const WORKER_ENV: &str = "THE_CORELET_WORKER";
pub const IDLE_TIMEOUT_ENV: &str = "THE_CORELET_IDLE_TIMEOUT_SECS";
pub const POLL_INTERVAL_ENV: &str = "THE_CORELET_POLL_INTERVAL_MS";

const FRAME_BACKLOG: usize = 16;

/// Whether this process was launched as a corelet worker.
pub fn is_worker_process() -> bool {
    std::env::var(WORKER_ENV).map_or(false, |value| value == "1")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSettings {
    /// Exit after this long without receiving a task.
    pub idle_timeout: Duration,
    /// Bound on each wait for input, so idleness and shutdown are noticed.
    pub poll_interval: Duration,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        }
    }
}

impl WorkerSettings {
    /// Settings passed down by the pool, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let read = |name: &str| std::env::var(name).ok().and_then(|v| v.parse::<u64>().ok());
        Self {
            idle_timeout: read(IDLE_TIMEOUT_ENV)
                .map(Duration::from_secs)
                .unwrap_or(defaults.idle_timeout),
            poll_interval: read(POLL_INTERVAL_ENV)
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
        }
    }
}

type FrameSender = mpsc::Sender<Result<TaskEnvelope, CoreletError>>;
type FrameReceiver = mpsc::Receiver<Result<TaskEnvelope, CoreletError>>;

/// Run the worker loop on stdin/stdout if this process is a corelet worker.
///
/// Call early in `main`, after registering handlers and before doing anything
/// that writes to stdout. Returns `Ok(false)` immediately in a normal process,
/// or `Ok(true)` once the worker loop has finished. Stdin is read on a
/// detached thread, so returning from `main` afterwards ends the process even
/// though that thread may still be blocked in a read.
pub async fn run_if_worker(factory: Arc<EventFactory>) -> Result<bool, CoreletError> {
    if !is_worker_process() {
        return Ok(false);
    }

    lower_priority();
    let shutdown = CancellationToken::new();
    install_signal_handlers(shutdown.clone());

    let (frame_tx, frames) = mpsc::channel(FRAME_BACKLOG);
    spawn_stdin_reader(frame_tx)?;
    serve(
        factory,
        WorkerSettings::from_env(),
        shutdown,
        frames,
        tokio::io::stdout(),
    )
    .await?;
    Ok(true)
}

/// The worker loop over an arbitrary pipe pair. Returns the number of events handled.
///
/// Cancelling `shutdown` lets the current task finish, then exits.
pub async fn run_worker<R, W>(
    factory: Arc<EventFactory>,
    settings: WorkerSettings,
    shutdown: CancellationToken,
    input: R,
    output: W,
) -> Result<u64, CoreletError>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin,
{
    // read_frame is not cancel-safe, so frames are read on their own task.
    let (frame_tx, frames) = mpsc::channel(FRAME_BACKLOG);
    let reader = tokio::spawn(read_tasks(input, frame_tx));
    let outcome = serve(factory, settings, shutdown, frames, output).await;
    reader.abort();
    outcome
}

async fn serve<W>(
    factory: Arc<EventFactory>,
    settings: WorkerSettings,
    shutdown: CancellationToken,
    mut frames: FrameReceiver,
    output: W,
) -> Result<u64, CoreletError>
where
    W: AsyncWrite + Unpin,
{
    let pid = std::process::id();
    let started = WorkerLoopStarted {
        pid,
        idle_timeout: settings.idle_timeout,
        poll_interval: settings.poll_interval,
    };
    started.log();

    let ctx = EventContext::new(format!("corelet-{}", pid));
    let mut output = BufWriter::new(output);

    let mut handled = 0u64;
    let mut last_task = Instant::now();
    let outcome = loop {
        let polled = tokio::select! {
            _ = shutdown.cancelled() => None,
            polled = tokio::time::timeout(settings.poll_interval, frames.recv()) => Some(polled),
        };
        let frame = match polled {
            None => break Ok("signal"),
            Some(Err(_)) => {
                if last_task.elapsed() >= settings.idle_timeout {
                    break Ok("idle");
                }
                continue;
            }
            Some(Ok(None)) => break Ok("input closed"),
            Some(Ok(Some(frame))) => frame,
        };
        last_task = Instant::now();

        let reply = match frame {
            Ok(TaskEnvelope { task_id, event }) if event.is_shutdown() => {
                let result = EventResult::success(&event, json!({ "shutdown": true }));
                if let Err(error) = send_reply(&mut output, task_id, result, pid).await {
                    break Err(error);
                }
                break Ok("shutdown requested");
            }
            Ok(TaskEnvelope { task_id, event }) => {
                let result = handle_task(&factory, &ctx, &event).await;
                handled += 1;
                (task_id, result)
            }
            Err(error) => {
                WorkerFrameRejected { pid, error: &error }.log();
                let result = EventResult::unattributed(FailureKind::Transport, error.to_string());
                (CONTROL_TASK_ID, result)
            }
        };

        if let Err(error) = send_reply(&mut output, reply.0, reply.1, pid).await {
            break Err(error);
        }
        if shutdown.is_cancelled() {
            break Ok("signal");
        }
    };

    let reason = match &outcome {
        Ok(reason) => *reason,
        Err(_) => "pipe broken",
    };
    WorkerLoopExited {
        pid,
        reason,
        handled,
    }
    .log();
    outcome.map(|_| handled)
}

/// Write one result frame. A result too large to frame is replaced by a
/// `Rejected` failure for the same task; only a broken pipe is an error.
async fn send_reply<W>(
    output: &mut W,
    task_id: u64,
    result: EventResult,
    pid: u32,
) -> Result<(), CoreletError>
where
    W: AsyncWrite + Unpin,
{
    let envelope = ResultEnvelope { task_id, result };
    let frame = match wire::encode_frame(&envelope) {
        Ok(frame) => frame,
        Err(error) if error.is_event_level() => {
            ResultUndeliverable {
                pid,
                task_id,
                error: &error,
            }
            .log();
            let message = format!("result could not be sent: {}", error);
            let result = envelope.result.into_failure(FailureKind::Rejected, message);
            wire::encode_frame(&ResultEnvelope { task_id, result })?
        }
        Err(error) => return Err(error),
    };
    wire::write_encoded(output, &frame).await.map_err(|error| {
        WorkerPipeBroken { pid, error: &error }.log();
        error
    })
}

async fn read_tasks<R>(input: R, frames: FrameSender)
where
    R: AsyncRead + Unpin,
{
    let mut input = BufReader::new(input);
    loop {
        let sent = match wire::read_frame::<_, TaskEnvelope>(&mut input).await {
            Ok(None) => false,
            Ok(Some(envelope)) => frames.send(Ok(envelope)).await.is_ok(),
            Err(error) => {
                let fatal = error.is_fatal_to_worker();
                frames.send(Err(error)).await.is_ok() && !fatal
            }
        };
        if !sent {
            break;
        }
    }
}

/// Read task frames from stdin on a dedicated thread. A blocked stdin read
/// cannot be interrupted, and the thread is never joined.
fn spawn_stdin_reader(frames: FrameSender) -> Result<(), CoreletError> {
    std::thread::Builder::new()
        .name("corelet-stdin".to_string())
        .spawn(move || {
            let mut input = std::io::BufReader::new(std::io::stdin().lock());
            loop {
                let sent = match wire::read_frame_blocking::<_, TaskEnvelope>(&mut input) {
                    Ok(None) => false,
                    Ok(Some(envelope)) => frames.blocking_send(Ok(envelope)).is_ok(),
                    Err(error) => {
                        let fatal = error.is_fatal_to_worker();
                        frames.blocking_send(Err(error)).is_ok() && !fatal
                    }
                };
                if !sent {
                    break;
                }
            }
        })?;
    Ok(())
}

/// Run one event to completion. Handler failures and panics become failed
/// results; they never end the loop.
async fn handle_task(factory: &EventFactory, ctx: &EventContext, event: &Event) -> EventResult {
    let started = Instant::now();
    let handler = match resolve_handler(factory, ctx, event) {
        Ok(handler) => handler,
        Err(error) => {
            return EventResult::failure(event, FailureKind::Registration, error.to_string())
                .with_duration(started.elapsed())
        }
    };

    let result = match spawn_handler(handler, event.clone(), ctx.for_attempt()).await {
        Ok(Ok(payload)) => EventResult::success(event, payload),
        Ok(Err(error)) => EventResult::failure(event, error.failure_kind(), error.to_string()),
        Err(join_error) => {
            EventResult::failure(event, FailureKind::Panicked, panic_message(join_error))
        }
    };
    result.with_duration(started.elapsed())
}

/// Cached handler for the event's type; on a miss, the factory entry for the
/// type, or failing that the entry at the event's handler location, which is
/// then aliased to the type for later lookups.
fn resolve_handler(
    factory: &EventFactory,
    ctx: &EventContext,
    event: &Event,
) -> Result<Arc<dyn EventHandler>, RegistrationError> {
    let event_type = event.event_type();
    ctx.handler_or_insert_with(event_type, || match factory.create_handler(event_type) {
        Err(RegistrationError::UnknownEventType(_)) => {
            let location = event
                .handler_location()
                .ok_or_else(|| RegistrationError::UnknownEventType(event_type.to_string()))?;
            factory.register_alias(event_type, location)?;
            factory.create_handler(event_type)
        }
        other => other,
    })
}

#[cfg(unix)]
fn lower_priority() {
    use crate::config::consts::CORELET_NICE_LEVEL;

    // SAFETY: setpriority takes plain integers and touches no Rust-owned memory.
    let rc = unsafe { libc::setpriority(libc::PRIO_PROCESS as _, 0, CORELET_NICE_LEVEL) };
    if rc != 0 {
        tracing::debug!(
            error = %std::io::Error::last_os_error(),
            "Could not lower corelet scheduling priority"
        );
    }
}

#[cfg(not(unix))]
fn lower_priority() {}

fn install_signal_handlers(shutdown: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut terminate) => {
                    tokio::select! {
                        _ = terminate.recv() => {}
                        _ = tokio::signal::ctrl_c() => {}
                    }
                }
                Err(_) => {
                    let _ = tokio::signal::ctrl_c().await;
                }
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
        }
        shutdown.cancel();
    });
}

// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! The dispatch loop and the per-attempt execution paths.
//!
//! A fixed number of dispatch workers share one bounded ingress channel. Each
//! worker owns an [`EventContext`] scope, so handlers are constructed at most
//! once per event type per worker. For every event the worker runs attempts
//! until one succeeds, the failure is not retryable, the attempt budget is
//! spent, or the engine is shutting down:
//!
//! * `sync`, `thread` and `command` attempts run the handler on a tokio task
//!   under a [`Watchdog`](super::deadline::Watchdog); a timeout cancels the
//!   attempt token and aborts the task.
//! * `corelet` attempts are submitted to the [`CoreletPool`]; the deadline
//!   covers the pipe write as well as the worker's run, and a timeout
//!   terminates the worker process running the task.

use serde_json::Value;
use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::deadline::{run_with_deadline, DeadlineOutcome};
use super::results::ResultStore;
use crate::corelet::CoreletPool;
use crate::errors::{CoreletError, HandlerError};
use crate::events::{Event, EventContext, EventFactory, EventResult, ExecutionMode, FailureKind};
use crate::observability::messages::engine::{
    AttemptFailed, AttemptStarted, DispatchWorkerStopped, EventCompleted, EventDiscarded,
};
use crate::observability::messages::StructuredLog;
use crate::traits::EventHandler;

pub(crate) type SharedReceiver = Arc<AsyncMutex<mpsc::Receiver<Event>>>;

/// Run `handler` on its own task so a panic is contained to the attempt.
pub(crate) fn spawn_handler(
    handler: Arc<dyn EventHandler>,
    event: Event,
    ctx: EventContext,
) -> JoinHandle<Result<Value, HandlerError>> {
    tokio::spawn(async move { handler.handle(&event, &ctx).await })
}

pub(crate) fn panic_message(error: JoinError) -> String {
    if !error.is_panic() {
        return "handler task was aborted".to_string();
    }
    let payload: Box<dyn Any + Send> = error.into_panic();
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string());
    format!("handler panicked: {}", detail)
}

/// Everything an attempt needs, shared by all dispatch workers and the
/// publishing caller.
pub(crate) struct Dispatcher {
    factory: Arc<EventFactory>,
    pool: Option<Arc<CoreletPool>>,
    results: Arc<ResultStore>,
    default_timeout: Duration,
}

impl Dispatcher {
    pub(crate) fn new(
        factory: Arc<EventFactory>,
        pool: Option<Arc<CoreletPool>>,
        results: Arc<ResultStore>,
        default_timeout: Duration,
    ) -> Self {
        Self {
            factory,
            pool,
            results,
            default_timeout,
        }
    }

    pub(crate) fn results(&self) -> &ResultStore {
        &self.results
    }

    /// Run `event` to its terminal result, retrying within its attempt budget.
    pub(crate) async fn execute(&self, ctx: &EventContext, mut event: Event) -> EventResult {
        let budget = event.attempt_budget();
        let timeout = event.timeout().unwrap_or(self.default_timeout);
        let started = Instant::now();
        let mut attempt = 1;

        loop {
            event.begin_attempt(attempt);
            let announce = AttemptStarted {
                event_id: event.id(),
                event_type: event.event_type(),
                mode: event.mode(),
                attempt,
                budget,
                timeout,
            };
            announce.log();
            let span = announce.span("attempt");
            let result = self.attempt(ctx, &event, timeout).instrument(span).await;

            let finished = result.success
                || !result.is_retryable()
                || attempt >= budget
                || ctx.is_shutting_down();
            if finished {
                let result = result.with_attempts(attempt).with_duration(started.elapsed());
                EventCompleted {
                    event_id: result.event_id,
                    event_type: &result.event_type,
                    success: result.success,
                    attempts: attempt,
                    duration: started.elapsed(),
                }
                .log();
                return result;
            }

            AttemptFailed {
                event_id: event.id(),
                event_type: event.event_type(),
                attempt,
                budget,
                kind: result.failure.unwrap_or(FailureKind::Handler),
                error: result.error.as_deref().unwrap_or_default(),
            }
            .log();
            attempt += 1;
        }
    }

    async fn attempt(&self, ctx: &EventContext, event: &Event, timeout: Duration) -> EventResult {
        match (event.mode(), &self.pool) {
            (ExecutionMode::Corelet, Some(pool)) => run_on_corelet(pool, ctx, event, timeout).await,
            (ExecutionMode::Corelet, None) => EventResult::failure(
                event,
                FailureKind::Unavailable,
                "no corelet pool is configured",
            ),
            _ => self.run_in_process(ctx, event, timeout).await,
        }
    }

    async fn run_in_process(&self, ctx: &EventContext, event: &Event, timeout: Duration) -> EventResult {
        let handler = match ctx.handler_or_insert_with(event.event_type(), || {
            self.factory.create_handler(event.event_type())
        }) {
            Ok(handler) => handler,
            Err(error) => {
                return EventResult::failure(event, FailureKind::Registration, error.to_string())
            }
        };

        let attempt_ctx = ctx.for_attempt();
        let token = attempt_ctx.cancellation().clone();
        let mut task = spawn_handler(handler, event.clone(), attempt_ctx);

        match run_with_deadline(timeout, &token, &mut task).await {
            DeadlineOutcome::Completed(Ok(Ok(payload))) => EventResult::success(event, payload),
            DeadlineOutcome::Completed(Ok(Err(HandlerError::Cancelled))) if ctx.is_shutting_down() => {
                cancelled_by_shutdown(event)
            }
            DeadlineOutcome::Completed(Ok(Err(HandlerError::Cancelled))) => timed_out(event, timeout),
            DeadlineOutcome::Completed(Ok(Err(error))) => {
                EventResult::failure(event, error.failure_kind(), error.to_string())
            }
            DeadlineOutcome::Completed(Err(join_error)) => {
                EventResult::failure(event, FailureKind::Panicked, panic_message(join_error))
            }
            DeadlineOutcome::TimedOut => {
                task.abort();
                timed_out(event, timeout)
            }
            DeadlineOutcome::Cancelled => {
                task.abort();
                cancelled_by_shutdown(event)
            }
        }
    }
}

async fn run_on_corelet(
    pool: &Arc<CoreletPool>,
    ctx: &EventContext,
    event: &Event,
    timeout: Duration,
) -> EventResult {
    let pending = match pool.submit_task(event.clone()) {
        Ok(pending) => pending,
        Err(error) => return corelet_failure(event, &error),
    };
    let task_id = pending.task_id();
    let token = ctx.for_attempt().cancellation().clone();

    match run_with_deadline(timeout, &token, pending.wait()).await {
        DeadlineOutcome::Completed(Ok(result)) => result,
        DeadlineOutcome::Completed(Err(error)) => corelet_failure(event, &error),
        DeadlineOutcome::TimedOut => {
            pool.terminate_task(task_id);
            timed_out(event, timeout)
        }
        DeadlineOutcome::Cancelled => cancelled_by_shutdown(event),
    }
}

fn corelet_failure(event: &Event, error: &CoreletError) -> EventResult {
    let kind = match error {
        error if error.is_event_level() => FailureKind::Rejected,
        CoreletError::NoLiveWorker | CoreletError::PoolStopped | CoreletError::Spawn(_) => {
            FailureKind::Unavailable
        }
        _ => FailureKind::Transport,
    };
    EventResult::failure(event, kind, error.to_string())
}

fn timed_out(event: &Event, timeout: Duration) -> EventResult {
    EventResult::failure(
        event,
        FailureKind::Timeout,
        format!("deadline of {:?} exceeded", timeout),
    )
}

fn cancelled_by_shutdown(event: &Event) -> EventResult {
    EventResult::failure(event, FailureKind::Unavailable, "cancelled by engine shutdown")
}

pub(crate) fn discarded(event: &Event) -> EventResult {
    EventDiscarded {
        event_id: event.id(),
        event_type: event.event_type(),
    }
    .log();
    EventResult::failure(event, FailureKind::Unavailable, "discarded by engine shutdown")
}

/// Start `count` dispatch workers on the shared ingress channel.
pub(crate) fn spawn_dispatch_workers(
    dispatcher: Arc<Dispatcher>,
    receiver: SharedReceiver,
    count: usize,
    shutdown: CancellationToken,
) -> Vec<JoinHandle<()>> {
    (0..count)
        .map(|index| {
            tokio::spawn(dispatch_worker(
                index,
                Arc::clone(&dispatcher),
                Arc::clone(&receiver),
                shutdown.clone(),
            ))
        })
        .collect()
}

async fn dispatch_worker(
    index: usize,
    dispatcher: Arc<Dispatcher>,
    receiver: SharedReceiver,
    shutdown: CancellationToken,
) {
    let ctx = EventContext::with_shutdown(format!("dispatch-{}", index), shutdown.clone());
    let mut processed = 0u64;

    loop {
        let next = {
            let mut receiver = receiver.lock().await;
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => None,
                event = receiver.recv() => event,
            }
        };
        let Some(event) = next else { break };

        let result = if shutdown.is_cancelled() {
            discarded(&event)
        } else {
            dispatcher.execute(&ctx, event).await
        };
        dispatcher.results().complete(result);
        processed += 1;
    }

    DispatchWorkerStopped {
        worker_index: index,
        processed,
    }
    .log();
}

// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! The public face of the engine: submission, registration and monitoring.

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::dispatch::{discarded, spawn_dispatch_workers, Dispatcher, SharedReceiver};
use super::results::{ResultFilter, ResultStore};
use crate::config::{validate_config, EngineConfig};
use crate::corelet::CoreletPool;
use crate::errors::{EngineError, RegistrationError};
use crate::events::{Event, EventContext, EventFactory, EventId, EventResult, ExecutionMode, HandlerMeta};
use crate::observability::messages::engine::{
    EngineShutdown, EngineStarted, EventPublished, EventRejected,
};
use crate::observability::messages::StructuredLog;
use crate::traits::EventHandler;

/// Monitoring view of the corelet side of the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CoreletMetrics {
    pub active_corelets: usize,
    pub worker_threads: usize,
    pub max_corelets: usize,
    pub restarts: u64,
    pub completed_tasks: u64,
    pub pending_tasks: usize,
}

/// Event execution engine.
///
/// Owns the dispatch workers, the ingress channel, the result store and, when
/// `corelet.pool_size > 0`, a [`CoreletPool`]. Construct one per application
/// and share it by reference or `Arc`.
///
/// ```no_run
/// use std::sync::Arc;
/// use serde_json::json;
/// use the_corelet::config::EngineConfig;
/// use the_corelet::engine::{EventEngine, ResultFilter};
/// use the_corelet::events::{Event, EventFactory, ExecutionMode};
/// use the_corelet::handlers::register_builtin_handlers;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let factory = Arc::new(EventFactory::new());
/// register_builtin_handlers(&factory)?;
///
/// let engine = EventEngine::start(EngineConfig::default(), factory).await?;
/// let id = engine
///     .publish(Event::new("echo", ExecutionMode::Thread, json!({"hello": "world"})))
///     .await?;
///
/// engine.join().await;
/// let results = engine.get_results(&[id], ResultFilter::SuccessOnly);
/// assert_eq!(results[0].payload, json!({"hello": "world"}));
/// engine.shutdown(false).await;
/// # Ok(())
/// # }
/// ```
pub struct EventEngine {
    config: EngineConfig,
    factory: Arc<EventFactory>,
    dispatcher: Arc<Dispatcher>,
    results: Arc<ResultStore>,
    pool: Option<Arc<CoreletPool>>,
    sender: Mutex<Option<mpsc::Sender<Event>>>,
    receiver: SharedReceiver,
    workers: Mutex<Vec<JoinHandle<()>>>,
    caller: EventContext,
    cancel: CancellationToken,
    stopped: AtomicBool,
}

impl EventEngine {
    /// Validate `config`, start the dispatch workers and, if configured, the
    /// corelet pool.
    pub async fn start(config: EngineConfig, factory: Arc<EventFactory>) -> Result<Self, EngineError> {
        validate_config(&config)?;

        let pool = if config.corelet.enabled() {
            Some(CoreletPool::start(config.corelet.clone())?)
        } else {
            None
        };

        let results = Arc::new(ResultStore::default());
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&factory),
            pool.clone(),
            Arc::clone(&results),
            config.engine.default_timeout(),
        ));

        let shutdown = CancellationToken::new();
        let (sender, receiver) = mpsc::channel(config.engine.queue_capacity);
        let receiver: SharedReceiver = Arc::new(AsyncMutex::new(receiver));
        let workers = spawn_dispatch_workers(
            Arc::clone(&dispatcher),
            Arc::clone(&receiver),
            config.engine.worker_threads,
            shutdown.clone(),
        );

        EngineStarted {
            worker_threads: config.engine.worker_threads,
            queue_capacity: config.engine.queue_capacity,
            pool_size: config.corelet.pool_size,
        }
        .log();

        Ok(Self {
            caller: EventContext::with_shutdown("caller", shutdown.clone()),
            config,
            factory,
            dispatcher,
            results,
            pool,
            sender: Mutex::new(Some(sender)),
            receiver,
            workers: Mutex::new(workers),
            cancel: shutdown,
            stopped: AtomicBool::new(false),
        })
    }

    /// Submit an event and return its id.
    ///
    /// Registration problems are reported here and nothing is enqueued.
    /// `sync` events run to completion before this returns; every other mode
    /// is queued, waiting for queue capacity if the channel is full.
    pub async fn publish(&self, event: Event) -> Result<EventId, EngineError> {
        let event_type = event.event_type().to_string();
        match self.admit(event) {
            Ok(event) => self.enqueue(event).await,
            Err(error) => {
                EventRejected {
                    event_type: &event_type,
                    error: &error,
                }
                .log();
                Err(error)
            }
        }
    }

    fn admit(&self, event: Event) -> Result<Event, EngineError> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(EngineError::ShutDown);
        }
        if event.is_control() {
            return Err(EngineError::ReservedPriority(event.priority()));
        }
        let meta = self.factory.get_handler_meta(event.event_type())?;
        if event.mode() != ExecutionMode::Corelet {
            return Ok(event);
        }
        if self.pool.is_none() {
            return Err(EngineError::CoreletsDisabled(event.event_type().to_string()));
        }
        Ok(match event.handler_location() {
            Some(_) => event,
            None => event.with_handler_location(meta.location()),
        })
    }

    async fn enqueue(&self, event: Event) -> Result<EventId, EngineError> {
        let id = event.id();
        EventPublished {
            event_id: id,
            event_type: event.event_type(),
            mode: event.mode(),
        }
        .log();
        self.results.track(id);

        if event.mode() == ExecutionMode::Sync {
            let result = self.dispatcher.execute(&self.caller, event).await;
            self.results.complete(result);
            return Ok(id);
        }

        let sender = self.sender.lock().clone();
        let Some(sender) = sender else {
            self.results.forget(id);
            return Err(EngineError::ShutDown);
        };
        if sender.send(event).await.is_err() {
            self.results.forget(id);
            return Err(EngineError::ShutDown);
        }
        Ok(id)
    }

    /// Terminal results for `ids`, in request order. Unknown or unfinished
    /// ids are skipped.
    pub fn get_results(&self, ids: &[EventId], filter: ResultFilter) -> Vec<EventResult> {
        self.results.get(ids, filter)
    }

    /// Like [`get_results`](Self::get_results), but the returned results are
    /// evicted from the engine. Long-lived engines should collect results this
    /// way; the engine otherwise keeps every terminal result.
    pub fn take_results(&self, ids: &[EventId], filter: ResultFilter) -> Vec<EventResult> {
        self.results.take(ids, filter)
    }

    /// Results held by the engine and not yet taken.
    pub fn retained_results(&self) -> usize {
        self.results.finished()
    }

    /// Wait until every published event has a terminal result.
    pub async fn join(&self) {
        self.results.wait_idle().await;
    }

    /// Like [`join`](Self::join), bounded by `timeout`. Returns `false` if
    /// work was still outstanding when the timeout elapsed.
    pub async fn wait_for_completion(&self, timeout: Option<Duration>) -> bool {
        match timeout {
            Some(limit) => tokio::time::timeout(limit, self.join()).await.is_ok(),
            None => {
                self.join().await;
                true
            }
        }
    }

    /// Stop accepting events and wind down.
    ///
    /// A graceful shutdown lets the dispatch workers drain the queue. An
    /// immediate one cancels running attempts and records every queued event
    /// as an `Unavailable` failure. The corelet pool is stopped last. Calling
    /// this more than once is harmless.
    pub async fn shutdown(&self, immediately: bool) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        EngineShutdown {
            immediately,
            outstanding: self.results.outstanding(),
        }
        .log();

        if immediately {
            self.cancel.cancel();
        }
        drop(self.sender.lock().take());

        let workers = std::mem::take(&mut *self.workers.lock());
        for worker in workers {
            let _ = worker.await;
        }

        {
            let mut receiver = self.receiver.lock().await;
            receiver.close();
            while let Ok(event) = receiver.try_recv() {
                self.results.complete(discarded(&event));
            }
        }

        if let Some(pool) = &self.pool {
            pool.shutdown().await;
        }
        self.cancel.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn register_event_type<H>(&self, event_type: &str) -> Result<HandlerMeta, RegistrationError>
    where
        H: EventHandler + Default + 'static,
    {
        self.factory.register_event_type::<H>(event_type)
    }

    pub fn is_handler_available(&self, event_type: &str) -> bool {
        self.factory.is_handler_available(event_type)
    }

    pub fn get_handler_meta(&self, event_type: &str) -> Result<HandlerMeta, RegistrationError> {
        self.factory.get_handler_meta(event_type)
    }

    pub fn factory(&self) -> &Arc<EventFactory> {
        &self.factory
    }

    pub fn corelet_pool(&self) -> Option<&Arc<CoreletPool>> {
        self.pool.as_ref()
    }

    pub fn get_corelet_count(&self) -> usize {
        self.pool.as_ref().map_or(0, |pool| pool.live_workers())
    }

    pub fn get_corelet_metrics(&self) -> CoreletMetrics {
        let worker_threads = self.config.engine.worker_threads;
        match &self.pool {
            Some(pool) => CoreletMetrics {
                active_corelets: pool.live_workers(),
                worker_threads,
                max_corelets: pool.pool_size(),
                restarts: pool.restarts(),
                completed_tasks: pool.completed_tasks(),
                pending_tasks: pool.pending_tasks(),
            },
            None => CoreletMetrics {
                worker_threads,
                ..CoreletMetrics::default()
            },
        }
    }

    /// Events published but not yet finished.
    pub fn pending_count(&self) -> usize {
        self.results.outstanding()
    }
}

impl Drop for EventEngine {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for EventEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEngine")
            .field("worker_threads", &self.config.engine.worker_threads)
            .field("pending", &self.pending_count())
            .field("pool", &self.pool)
            .field("stopped", &self.is_shut_down())
            .finish()
    }
}

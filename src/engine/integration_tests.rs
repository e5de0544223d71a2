// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! In-process engine scenarios using real handlers. Scenarios that need
//! corelet worker processes live in the crate's `tests/` directory.

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use crate::config::EngineConfig;
    use crate::engine::{EventEngine, ResultFilter};
    use crate::errors::{EngineError, HandlerError, RegistrationError};
    use crate::events::{Event, EventContext, EventFactory, ExecutionMode, FailureKind};
    use crate::handlers::register_builtin_handlers;
    use crate::traits::EventHandler;

    struct CountingFailure {
        calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl EventHandler for CountingFailure {
        async fn handle(&self, _event: &Event, _ctx: &EventContext) -> Result<Value, HandlerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(HandlerError::failed("always"))
        }

        fn name(&self) -> &'static str {
            "counting_failure"
        }
    }

    /// Fails until the event's own attempt counter reaches `{"succeed_on": n}`.
    #[derive(Default)]
    struct SucceedsOnAttempt;

    #[async_trait]
    impl EventHandler for SucceedsOnAttempt {
        async fn handle(&self, event: &Event, _ctx: &EventContext) -> Result<Value, HandlerError> {
            let target = event.payload()["succeed_on"].as_u64().unwrap_or(1) as u32;
            if event.attempt() >= target {
                Ok(json!({ "attempt": event.attempt() }))
            } else {
                Err(HandlerError::failed(format!("attempt {} too early", event.attempt())))
            }
        }

        fn name(&self) -> &'static str {
            "succeeds_on_attempt"
        }
    }

    #[derive(Default)]
    struct Explodes;

    #[async_trait]
    impl EventHandler for Explodes {
        async fn handle(&self, _event: &Event, _ctx: &EventContext) -> Result<Value, HandlerError> {
            panic!("kaboom");
        }

        fn name(&self) -> &'static str {
            "explodes"
        }
    }

    /// Sleeps without looking at its cancellation token.
    #[derive(Default)]
    struct Oblivious;

    #[async_trait]
    impl EventHandler for Oblivious {
        async fn handle(&self, event: &Event, _ctx: &EventContext) -> Result<Value, HandlerError> {
            let secs = event.payload()["seconds"].as_u64().unwrap_or(10);
            tokio::time::sleep(Duration::from_secs(secs)).await;
            Ok(json!("woke"))
        }

        fn name(&self) -> &'static str {
            "oblivious"
        }
    }

    fn config(worker_threads: usize) -> EngineConfig {
        let mut config = EngineConfig::default();
        config.engine.worker_threads = worker_threads;
        config.engine.default_timeout_secs = 5;
        config
    }

    async fn engine_with(worker_threads: usize) -> (EventEngine, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        let shared = Arc::clone(&calls);
        let factory = Arc::new(EventFactory::new());
        register_builtin_handlers(&factory).unwrap();
        factory
            .register_event_type_with("counting_failure", move || CountingFailure {
                calls: Arc::clone(&shared),
            })
            .unwrap();
        factory
            .register_event_type::<SucceedsOnAttempt>("succeeds_on_attempt")
            .unwrap();
        factory.register_event_type::<Explodes>("explodes").unwrap();
        factory.register_event_type::<Oblivious>("oblivious").unwrap();

        let engine = EventEngine::start(config(worker_threads), factory).await.unwrap();
        (engine, calls)
    }

    #[tokio::test]
    async fn test_always_failing_handler_gets_exactly_k_attempts() {
        let (engine, calls) = engine_with(2).await;

        let id = engine
            .publish(Event::new("counting_failure", ExecutionMode::Thread, json!(null)).with_max_retries(3))
            .await
            .unwrap();
        engine.join().await;

        let results = engine.get_results(&[id], ResultFilter::All);
        assert_eq!(results.len(), 1);
        assert!(!results[0].success);
        assert_eq!(results[0].attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        engine.shutdown(false).await;
    }

    #[tokio::test]
    async fn test_success_on_attempt_j_uses_exactly_j_attempts() {
        let (engine, _) = engine_with(2).await;

        let mut ids = Vec::new();
        for j in 1..=4u32 {
            let event = Event::new("succeeds_on_attempt", ExecutionMode::Thread, json!({ "succeed_on": j }))
                .with_max_retries(4);
            ids.push(engine.publish(event).await.unwrap());
        }
        engine.join().await;

        let results = engine.get_results(&ids, ResultFilter::All);
        assert_eq!(results.len(), 4);
        for (j, result) in (1..=4u32).zip(results.iter()) {
            assert!(result.success, "event needing {} attempts failed", j);
            assert_eq!(result.attempts, j);
            assert_eq!(result.payload, json!({ "attempt": j }));
        }
        engine.shutdown(false).await;
    }

    #[tokio::test]
    async fn test_thread_mode_timeout_returns_in_about_a_second() {
        let (engine, _) = engine_with(1).await;

        let started = Instant::now();
        let id = engine
            .publish(Event::new("sleep", ExecutionMode::Thread, json!({"seconds": 10})).with_timeout_secs(1))
            .await
            .unwrap();
        engine.join().await;
        let elapsed = started.elapsed();

        let result = &engine.get_results(&[id], ResultFilter::ErrorsOnly)[0];
        assert!(result.is_timeout());
        assert!(elapsed >= Duration::from_millis(900), "{:?}", elapsed);
        assert!(elapsed < Duration::from_secs(3), "{:?}", elapsed);
        engine.shutdown(false).await;
    }

    #[tokio::test]
    async fn test_uncooperative_handler_times_out_too() {
        let (engine, _) = engine_with(1).await;

        let started = Instant::now();
        let id = engine
            .publish(
                Event::new("oblivious", ExecutionMode::Thread, json!({"seconds": 10}))
                    .with_timeout(Duration::from_millis(200)),
            )
            .await
            .unwrap();
        assert!(engine.wait_for_completion(Some(Duration::from_secs(3))).await);

        assert!(engine.get_results(&[id], ResultFilter::All)[0].is_timeout());
        assert!(started.elapsed() < Duration::from_secs(3));
        engine.shutdown(false).await;
    }

    #[tokio::test]
    async fn test_unregistered_type_is_rejected_synchronously() {
        let (engine, _) = engine_with(1).await;

        let err = engine
            .publish(Event::new("no_such_type", ExecutionMode::Thread, json!(null)))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            EngineError::Registration(RegistrationError::UnknownEventType(ref t)) if t == "no_such_type"
        ));
        assert_eq!(engine.pending_count(), 0);
        engine.shutdown(false).await;
    }

    #[tokio::test]
    async fn test_reserved_priority_and_disabled_corelets_are_rejected() {
        let (engine, _) = engine_with(1).await;

        let err = engine
            .publish(Event::new("echo", ExecutionMode::Thread, json!(null)).with_priority(-1))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::ReservedPriority(-1)));

        let err = engine
            .publish(Event::new("echo", ExecutionMode::Corelet, json!(null)))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::CoreletsDisabled(_)));
        assert_eq!(engine.pending_count(), 0);
        engine.shutdown(false).await;
    }

    #[tokio::test]
    async fn test_sync_event_is_finished_when_publish_returns() {
        let (engine, _) = engine_with(1).await;

        let id = engine
            .publish(Event::new("echo", ExecutionMode::Sync, json!({"inline": true})))
            .await
            .unwrap();

        assert_eq!(engine.pending_count(), 0);
        let results = engine.get_results(&[id], ResultFilter::SuccessOnly);
        assert_eq!(results[0].payload, json!({"inline": true}));
        assert_eq!(results[0].attempts, 1);
        engine.shutdown(false).await;
    }

    #[tokio::test]
    async fn test_filters_separate_successes_from_failures() {
        let (engine, _) = engine_with(3).await;

        let ok = engine.publish(Event::new("ok", ExecutionMode::Thread, json!(null))).await.unwrap();
        let bad = engine
            .publish(Event::new("fail", ExecutionMode::Thread, json!({"message": "nope"})))
            .await
            .unwrap();
        let panicked = engine
            .publish(Event::new("explodes", ExecutionMode::Thread, json!(null)))
            .await
            .unwrap();
        engine.join().await;

        let ids = [ok, bad, panicked];
        let successes = engine.get_results(&ids, ResultFilter::SuccessOnly);
        assert_eq!(successes.len(), 1);
        assert_eq!(successes[0].payload, json!({"ok": true}));

        let errors = engine.get_results(&ids, ResultFilter::ErrorsOnly);
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].failure, Some(FailureKind::Handler));
        assert_eq!(errors[0].error.as_deref(), Some("Handler failed: nope"));
        assert_eq!(errors[1].failure, Some(FailureKind::Panicked));
        assert!(errors[1].error.as_deref().unwrap().contains("kaboom"));
        engine.shutdown(false).await;
    }

    #[tokio::test]
    async fn test_taken_results_are_evicted() {
        let (engine, _) = engine_with(2).await;

        let mut ids = Vec::new();
        for n in 0..4 {
            ids.push(engine.publish(Event::new("echo", ExecutionMode::Thread, json!(n))).await.unwrap());
        }
        engine.join().await;
        assert_eq!(engine.retained_results(), 4);

        let taken = engine.take_results(&ids[..3], ResultFilter::All);
        assert_eq!(taken.len(), 3);
        assert_eq!(taken[2].payload, json!(2));
        assert_eq!(engine.retained_results(), 1);
        assert!(engine.get_results(&ids[..3], ResultFilter::All).is_empty());
        assert_eq!(engine.get_results(&ids, ResultFilter::All).len(), 1);
        engine.shutdown(false).await;
    }

    #[tokio::test]
    async fn test_handlers_are_cached_per_dispatch_worker() {
        let (engine, _) = engine_with(1).await;

        let mut ids = Vec::new();
        for _ in 0..5 {
            ids.push(engine.publish(Event::new("whoami", ExecutionMode::Thread, json!(null))).await.unwrap());
        }
        engine.join().await;

        let results = engine.get_results(&ids, ResultFilter::SuccessOnly);
        assert_eq!(results.len(), 5);
        assert!(results.iter().all(|r| r.payload["scope"] == json!("dispatch-0")));
        engine.shutdown(false).await;
    }

    #[tokio::test]
    async fn test_immediate_shutdown_discards_queued_events() {
        let (engine, _) = engine_with(1).await;

        let running = engine
            .publish(Event::new("sleep", ExecutionMode::Thread, json!({"seconds": 10})))
            .await
            .unwrap();
        let mut queued = Vec::new();
        for _ in 0..3 {
            queued.push(engine.publish(Event::new("ok", ExecutionMode::Thread, json!(null))).await.unwrap());
        }
        tokio::time::sleep(Duration::from_millis(100)).await;

        let started = Instant::now();
        engine.shutdown(true).await;
        assert!(started.elapsed() < Duration::from_secs(3));
        assert!(engine.wait_for_completion(Some(Duration::from_secs(1))).await);

        let running = &engine.get_results(&[running], ResultFilter::All)[0];
        assert_eq!(running.failure, Some(FailureKind::Unavailable));
        let discarded = engine.get_results(&queued, ResultFilter::ErrorsOnly);
        assert_eq!(discarded.len(), 3);
        assert!(discarded.iter().all(|r| r.failure == Some(FailureKind::Unavailable)));

        let err = engine
            .publish(Event::new("ok", ExecutionMode::Thread, json!(null)))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::ShutDown));
        engine.shutdown(true).await;
    }

    #[tokio::test]
    async fn test_graceful_shutdown_drains_the_queue() {
        let (engine, _) = engine_with(2).await;

        let mut ids = Vec::new();
        for i in 0..10 {
            ids.push(engine.publish(Event::new("echo", ExecutionMode::Thread, json!(i))).await.unwrap());
        }
        engine.shutdown(false).await;

        let results = engine.get_results(&ids, ResultFilter::SuccessOnly);
        assert_eq!(results.len(), 10);
        assert_eq!(engine.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_metrics_without_pool_report_dispatch_threads_only() {
        let (engine, _) = engine_with(3).await;

        let metrics = engine.get_corelet_metrics();
        assert_eq!(metrics.worker_threads, 3);
        assert_eq!(metrics.active_corelets, 0);
        assert_eq!(metrics.max_corelets, 0);
        assert_eq!(engine.get_corelet_count(), 0);
        assert!(engine.is_handler_available("sleep"));
        assert_eq!(engine.get_handler_meta("sleep").unwrap().class_name, "SleepHandler");
        engine.shutdown(false).await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_mode_runs_external_process() {
        let (engine, _) = engine_with(1).await;

        let id = engine
            .publish(Event::new(
                "command",
                ExecutionMode::Command,
                json!({"program": "sh", "args": ["-c", "printf hi"]}),
            ))
            .await
            .unwrap();
        engine.join().await;

        let result = &engine.get_results(&[id], ResultFilter::SuccessOnly)[0];
        assert_eq!(result.payload["stdout"], json!("hi"));
        engine.shutdown(false).await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_timeout_kills_the_child() {
        let (engine, _) = engine_with(1).await;

        let started = Instant::now();
        let id = engine
            .publish(
                Event::new("command", ExecutionMode::Command, json!({"program": "sleep", "args": ["10"]}))
                    .with_timeout(Duration::from_millis(300)),
            )
            .await
            .unwrap();
        engine.join().await;

        assert!(engine.get_results(&[id], ResultFilter::All)[0].is_timeout());
        assert!(started.elapsed() < Duration::from_secs(3));
        engine.shutdown(false).await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_corelet_deadline_covers_a_blocked_task_pipe() {
        let mut config = config(1);
        config.corelet.pool_size = 1;
        config.corelet.program = Some("sleep".into());
        config.corelet.args = vec!["30".to_string()];
        config.corelet.shutdown_grace_ms = 200;
        let factory = Arc::new(EventFactory::new());
        register_builtin_handlers(&factory).unwrap();
        let engine = EventEngine::start(config, factory).await.unwrap();

        // Far more than a pipe buffer, sent to a worker that never reads.
        let payload = json!({ "blob": "x".repeat(4 * 1024 * 1024) });
        let started = Instant::now();
        let id = engine
            .publish(
                Event::new("echo", ExecutionMode::Corelet, payload)
                    .with_timeout(Duration::from_millis(300)),
            )
            .await
            .unwrap();
        assert!(engine.wait_for_completion(Some(Duration::from_secs(3))).await);

        assert!(engine.get_results(&[id], ResultFilter::All)[0].is_timeout());
        assert!(started.elapsed() < Duration::from_secs(3));
        engine.shutdown(false).await;
    }
}

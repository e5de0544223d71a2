// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Per-attempt deadline enforcement.
//!
//! A [`Watchdog`] is armed before an attempt starts and disarmed as soon as the
//! attempt finishes. When it fires it runs its expiry action exactly once;
//! for in-process attempts that action cancels the attempt's
//! [`CancellationToken`], which the dispatch loop and cooperative handlers
//! select on. A watchdog that fires after the attempt already finished has
//! nothing left to interrupt and is harmless.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// One-shot timer that runs an action when a deadline passes.
#[derive(Debug)]
pub struct Watchdog {
    fired: Arc<AtomicBool>,
    timer: JoinHandle<()>,
}

impl Watchdog {
    /// Arm a watchdog that calls `on_expire` once `timeout` has elapsed.
    pub fn arm<F>(timeout: Duration, on_expire: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        let timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            flag.store(true, Ordering::SeqCst);
            on_expire();
        });
        Self { fired, timer }
    }

    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// Stop the timer. Returns `true` when the deadline had not been reached.
    pub fn disarm(self) -> bool {
        self.timer.abort();
        !self.has_fired()
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.timer.abort();
    }
}

/// How a deadline-guarded future ended.
#[derive(Debug, PartialEq, Eq)]
pub enum DeadlineOutcome<T> {
    /// The future finished first.
    Completed(T),
    /// The watchdog fired first.
    TimedOut,
    /// `token` was cancelled by something other than the watchdog.
    Cancelled,
}

/// Drive `future` until it completes, `timeout` elapses, or `token` is
/// cancelled from outside.
///
/// The watchdog cancels `token` when it fires, so anything else observing the
/// token (a handler selecting on its context) sees the timeout too. The
/// future is dropped when the deadline wins.
pub async fn run_with_deadline<F, T>(
    timeout: Duration,
    token: &CancellationToken,
    future: F,
) -> DeadlineOutcome<T>
where
    F: Future<Output = T>,
{
    let expire = token.clone();
    let watchdog = Watchdog::arm(timeout, move || expire.cancel());

    tokio::select! {
        biased;
        output = future => {
            watchdog.disarm();
            DeadlineOutcome::Completed(output)
        }
        _ = token.cancelled() => {
            if watchdog.disarm() {
                DeadlineOutcome::Cancelled
            } else {
                DeadlineOutcome::TimedOut
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    #[tokio::test]
    async fn test_fast_future_completes_before_deadline() {
        let token = CancellationToken::new();
        let outcome = run_with_deadline(Duration::from_secs(5), &token, async { 7 }).await;

        assert_eq!(outcome, DeadlineOutcome::Completed(7));
        assert!(!token.is_cancelled());
    }

    #[tokio::test]
    async fn test_slow_future_times_out_and_cancels_token() {
        let token = CancellationToken::new();
        let started = Instant::now();
        let outcome = run_with_deadline(
            Duration::from_millis(50),
            &token,
            tokio::time::sleep(Duration::from_secs(10)),
        )
        .await;

        assert_eq!(outcome, DeadlineOutcome::TimedOut);
        assert!(token.is_cancelled());
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_external_cancellation_is_not_a_timeout() {
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let outcome = run_with_deadline(
            Duration::from_secs(10),
            &token,
            tokio::time::sleep(Duration::from_secs(10)),
        )
        .await;

        assert_eq!(outcome, DeadlineOutcome::Cancelled);
    }

    #[tokio::test]
    async fn test_disarmed_watchdog_never_fires() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let watchdog = Watchdog::arm(Duration::from_millis(30), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(watchdog.disarm());
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_late_fire_is_a_noop_for_finished_work() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let watchdog = Watchdog::arm(Duration::from_millis(10), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(watchdog.has_fired());
        assert!(!watchdog.disarm());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}

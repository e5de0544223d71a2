// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Outstanding-event bookkeeping and terminal results.

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use tokio::sync::Notify;

use crate::events::{EventId, EventResult};

/// Which results [`EventEngine::get_results`](super::EventEngine::get_results) returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResultFilter {
    #[default]
    All,
    SuccessOnly,
    ErrorsOnly,
}

impl ResultFilter {
    pub fn admits(&self, result: &EventResult) -> bool {
        match self {
            ResultFilter::All => true,
            ResultFilter::SuccessOnly => result.success,
            ResultFilter::ErrorsOnly => !result.success,
        }
    }
}

#[derive(Default)]
struct StoreState {
    outstanding: HashSet<EventId>,
    results: HashMap<EventId, EventResult>,
}

/// Events that have been accepted but not finished, plus the final result of
/// every finished event.
#[derive(Default)]
pub(crate) struct ResultStore {
    state: Mutex<StoreState>,
    idle: Notify,
}

impl ResultStore {
    pub(crate) fn track(&self, id: EventId) {
        self.state.lock().outstanding.insert(id);
    }

    /// Stop tracking an event that was never enqueued.
    pub(crate) fn forget(&self, id: EventId) {
        let now_idle = {
            let mut state = self.state.lock();
            state.outstanding.remove(&id);
            state.outstanding.is_empty()
        };
        if now_idle {
            self.idle.notify_waiters();
        }
    }

    /// Record the terminal result. A later result for the same event replaces
    /// the earlier one.
    pub(crate) fn complete(&self, result: EventResult) {
        let now_idle = {
            let mut state = self.state.lock();
            state.outstanding.remove(&result.event_id);
            state.results.insert(result.event_id, result);
            state.outstanding.is_empty()
        };
        if now_idle {
            self.idle.notify_waiters();
        }
    }

    /// Results for `ids` in request order; unknown and unfinished ids are skipped.
    pub(crate) fn get(&self, ids: &[EventId], filter: ResultFilter) -> Vec<EventResult> {
        let state = self.state.lock();
        ids.iter()
            .filter_map(|id| state.results.get(id))
            .filter(|result| filter.admits(result))
            .cloned()
            .collect()
    }

    /// Like [`get`](Self::get), but the returned results are removed from the
    /// store. Results the filter excludes stay behind.
    pub(crate) fn take(&self, ids: &[EventId], filter: ResultFilter) -> Vec<EventResult> {
        let mut state = self.state.lock();
        let mut taken = Vec::new();
        for id in ids {
            if state.results.get(id).map_or(false, |result| filter.admits(result)) {
                taken.extend(state.results.remove(id));
            }
        }
        taken
    }

    pub(crate) fn outstanding(&self) -> usize {
        self.state.lock().outstanding.len()
    }

    pub(crate) fn finished(&self) -> usize {
        self.state.lock().results.len()
    }

    /// Wait until no event is outstanding.
    pub(crate) async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.outstanding() == 0 {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{Event, ExecutionMode, FailureKind};
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn event() -> Event {
        Event::new("sample", ExecutionMode::Thread, json!(null))
    }

    #[test]
    fn test_filters_split_successes_and_errors() {
        let store = ResultStore::default();
        let ok = event();
        let bad = event();
        store.track(ok.id());
        store.track(bad.id());
        store.complete(EventResult::success(&ok, json!(1)));
        store.complete(EventResult::failure(&bad, FailureKind::Handler, "nope"));

        let ids = [ok.id(), bad.id(), EventId::new()];
        assert_eq!(store.get(&ids, ResultFilter::All).len(), 2);

        let successes = store.get(&ids, ResultFilter::SuccessOnly);
        assert_eq!(successes.len(), 1);
        assert_eq!(successes[0].event_id, ok.id());

        let errors = store.get(&ids, ResultFilter::ErrorsOnly);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].error.as_deref(), Some("nope"));
    }

    #[test]
    fn test_take_evicts_only_what_it_returns() {
        let store = ResultStore::default();
        let ok = event();
        let bad = event();
        store.track(ok.id());
        store.track(bad.id());
        store.complete(EventResult::success(&ok, json!(1)));
        store.complete(EventResult::failure(&bad, FailureKind::Handler, "nope"));
        let ids = [ok.id(), bad.id()];

        let errors = store.take(&ids, ResultFilter::ErrorsOnly);
        assert_eq!(errors.len(), 1);
        assert_eq!(store.finished(), 1);
        assert!(store.get(&ids, ResultFilter::ErrorsOnly).is_empty());

        let rest = store.take(&ids, ResultFilter::All);
        assert_eq!(rest[0].event_id, ok.id());
        assert_eq!(store.finished(), 0);
        assert!(store.take(&ids, ResultFilter::All).is_empty());
    }

    #[test]
    fn test_forget_clears_outstanding_without_a_result() {
        let store = ResultStore::default();
        let e = event();
        store.track(e.id());
        store.forget(e.id());

        assert_eq!(store.outstanding(), 0);
        assert_eq!(store.finished(), 0);
    }

    #[tokio::test]
    async fn test_wait_idle_returns_once_last_event_completes() {
        let store = Arc::new(ResultStore::default());
        let e = event();
        store.track(e.id());

        let completer = Arc::clone(&store);
        let pending = e.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            completer.complete(EventResult::success(&pending, json!(null)));
        });

        tokio::time::timeout(Duration::from_secs(2), store.wait_idle())
            .await
            .expect("store should become idle");
        assert_eq!(store.outstanding(), 0);
    }

    #[tokio::test]
    async fn test_wait_idle_on_empty_store_returns_immediately() {
        let store = ResultStore::default();
        tokio::time::timeout(Duration::from_millis(100), store.wait_idle())
            .await
            .expect("empty store is idle");
    }
}

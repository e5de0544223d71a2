// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod deadline;
pub(crate) mod dispatch;
pub mod event_engine;
mod results;
#[cfg(test)]
pub mod integration_tests;

pub use deadline::{run_with_deadline, DeadlineOutcome, Watchdog};
pub use event_engine::{CoreletMetrics, EventEngine};
pub use results::ResultFilter;

// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Process-isolated event execution.
//!
//! * [`CoreletPool`] - owns the worker processes, dispatches tasks to the
//!   least-loaded worker, collects results and replaces dead workers.
//! * [`run_if_worker`] - entry point a host binary calls so that the same
//!   executable can serve as a worker when the pool relaunches it.
//! * [`wire`] - the length-prefixed frames exchanged over the pipes.

pub mod pool;
pub mod wire;
pub mod worker;
mod worker_info;

pub use pool::{CoreletPool, PendingTask, ShutdownReport, WorkerSnapshot};
pub use worker::{is_worker_process, run_if_worker, run_worker, WorkerSettings, WORKER_ENV};
pub use worker_info::WorkerInfo;

// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

/// Default number of dispatch workers pulling from the ingress queue
pub const DEFAULT_WORKER_THREADS: usize = 4;
/// Default ingress queue capacity; publishers wait once it is full
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;
/// Default per-attempt deadline when an event carries no timeout of its own
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default corelet pool size (0 disables corelet mode)
pub const DEFAULT_POOL_SIZE: usize = 0;
/// Upper bound on the corelet pool size - resource limit
pub const MAX_POOL_SIZE: usize = 64;
/// Upper bound on dispatch workers
pub const MAX_WORKER_THREADS: usize = 1024;
/// A corelet with no work for this long exits on its own
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 300;
/// Interval between health monitor scans
pub const DEFAULT_HEALTH_CHECK_INTERVAL_MS: u64 = 500;
/// Bounded wait a corelet uses when polling its task pipe
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;
/// How long shutdown waits for corelets to exit before killing them
pub const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 2_000;
/// Nice value corelet workers apply to themselves
pub const CORELET_NICE_LEVEL: i32 = 10;

/// Default tracing filter directive
pub const DEFAULT_LOG_FILTER: &str = "info";

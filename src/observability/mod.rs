// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Observability module for structured logging and tracing.
//!
//! Log lines are produced from message structs rather than inline format
//! strings. Each message implements `Display` for its human-readable text and
//! [`StructuredLog`](messages::StructuredLog) to emit it at the right level
//! with its fields attached.
//!
//! # Usage
//!
//! ```rust
//! use the_corelet::observability::messages::StructuredLog;
//! use the_corelet::observability::messages::corelet::WorkerSpawned;
//!
//! WorkerSpawned { worker_id: 3, pid: Some(4242) }.log();
//! ```
//!
//! All output goes to stderr: a corelet worker's stdout is its result pipe.

pub mod messages;

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Install the global tracing subscriber.
///
/// `RUST_LOG` overrides the configured filter. Safe to call more than once;
/// later calls are no-ops.
pub fn init_tracing(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.filter));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    let _ = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

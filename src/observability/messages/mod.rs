// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Centralized message types for structured logging.
//!
//! Messages are organized by subsystem:
//!
//! * `engine` - publishing, dispatch attempts, retries and engine lifecycle
//! * `corelet` - worker pool orchestration and the worker process loop
//!
//! # Usage Pattern
//!
//! ```rust
//! use the_corelet::observability::messages::StructuredLog;
//! use the_corelet::observability::messages::engine::EngineStarted;
//!
//! let msg = EngineStarted {
//!     worker_threads: 4,
//!     queue_capacity: 1024,
//!     pool_size: 2,
//! };
//!
//! msg.log();
//! assert!(msg.to_string().contains("4 dispatch workers"));
//! ```

pub mod corelet;
pub mod engine;

use tracing::Span;

/// A message that knows its own log level and structured fields.
pub trait StructuredLog: std::fmt::Display {
    /// Emit the message as a tracing event.
    fn log(&self);

    /// A span carrying the message's fields, for instrumenting the work it
    /// describes. Messages that never open a span keep the default.
    fn span(&self, _name: &str) -> Span {
        Span::none()
    }
}

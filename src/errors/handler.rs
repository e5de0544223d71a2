// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use thiserror::Error;

use crate::events::FailureKind;

/// Errors returned by application handler code.
///
/// A handler error never takes down the dispatch worker or the corelet process
/// that ran the handler; it is folded into a failed
/// [`EventResult`](crate::events::EventResult). Every variant except
/// `InvalidPayload` counts against the event's retry budget.
#[derive(Error, Debug)]
pub enum HandlerError {
    /// The handler ran and reported a failure.
    #[error("Handler failed: {0}")]
    Failed(String),

    /// The event payload did not have the shape the handler expects.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// The handler observed its cancellation token and stopped early.
    #[error("Handler cancelled")]
    Cancelled,

    /// I/O error raised while the handler was running.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HandlerError {
    pub fn failed(message: impl Into<String>) -> Self {
        HandlerError::Failed(message.into())
    }

    pub fn invalid_payload(message: impl Into<String>) -> Self {
        HandlerError::InvalidPayload(message.into())
    }

    /// Classification of an attempt that failed with this error. A payload the
    /// handler cannot read will not become readable on the next attempt.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            HandlerError::InvalidPayload(_) => FailureKind::Rejected,
            _ => FailureKind::Handler,
        }
    }
}

// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use thiserror::Error;

/// Errors raised while constructing an [`Event`](crate::events::Event).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventError {
    /// The execution mode string is not one of the recognized modes.
    #[error("Invalid execution mode '{0}': expected one of sync, thread, corelet, command")]
    InvalidMode(String),

    /// The event type name was empty.
    #[error("Event type must not be empty")]
    EmptyEventType,
}

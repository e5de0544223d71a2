// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Errors for handler registration and handler instantiation.

use std::error::Error;
use std::fmt;

/// Errors raised by the [`EventFactory`](crate::events::EventFactory).
///
/// Registration errors are always surfaced synchronously to the caller that
/// triggered them, either at registration time or at submission time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    /// No handler is registered for the event type.
    UnknownEventType(String),

    /// No handler is registered under the given location key.
    UnknownLocation(String),

    /// The event type name was empty.
    EmptyTypeName,

    /// The event type name is reserved for control events.
    ReservedType(String),
}

impl fmt::Display for RegistrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistrationError::UnknownEventType(event_type) => {
                write!(f, "No handler registered for event type '{}'", event_type)
            }
            RegistrationError::UnknownLocation(location) => {
                write!(f, "No handler registered at location '{}'", location)
            }
            RegistrationError::EmptyTypeName => write!(f, "Event type name must not be empty"),
            RegistrationError::ReservedType(event_type) => {
                write!(f, "Event type '{}' is reserved for control events", event_type)
            }
        }
    }
}

impl Error for RegistrationError {}

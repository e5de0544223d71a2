// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use thiserror::Error;

use super::{ConfigError, CoreletError, EventError, RegistrationError};

/// Errors surfaced synchronously by the [`EventEngine`](crate::engine::EventEngine) API.
///
/// Handler failures and timeouts are never reported here; they are recorded
/// as failed results and retrieved through `get_results`.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Registration(#[from] RegistrationError),

    #[error(transparent)]
    Event(#[from] EventError),

    #[error(transparent)]
    Corelet(#[from] CoreletError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Negative priorities belong to control events such as shutdown.
    #[error("Priority {0} is reserved for control events")]
    ReservedPriority(i32),

    #[error("Event type '{0}' requested corelet mode but no corelet pool is configured")]
    CoreletsDisabled(String),

    #[error("Engine has been shut down")]
    ShutDown,
}

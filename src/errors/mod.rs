// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

mod config;
mod corelet;
mod engine;
mod event;
mod handler;
mod registration;

pub use config::ConfigError;
pub use corelet::CoreletError;
pub use engine::EngineError;
pub use event::EventError;
pub use handler::HandlerError;
pub use registration::RegistrationError;

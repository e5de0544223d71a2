// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod config;        // config loading + validation
pub mod corelet;       // worker processes, pool, wire format
pub mod engine;        // dispatch loop, deadlines, public engine API
pub mod errors;        // error handling
pub mod events;        // events, results, context, handler registry
pub mod handlers;      // built-in handlers
pub mod observability;
pub mod traits;        // handler abstraction

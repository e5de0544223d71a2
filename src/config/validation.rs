// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Validation of engine configuration.
//!
//! All problems are collected before reporting so a single run surfaces every
//! bad value in the file.

use crate::config::consts::{MAX_POOL_SIZE, MAX_WORKER_THREADS};
use crate::config::EngineConfig;
use crate::errors::ConfigError;

pub fn validate_config(cfg: &EngineConfig) -> Result<(), ConfigError> {
    let mut problems = Vec::new();

    if cfg.engine.worker_threads == 0 {
        problems.push("engine.worker_threads must be at least 1".to_string());
    }
    if cfg.engine.worker_threads > MAX_WORKER_THREADS {
        problems.push(format!(
            "engine.worker_threads must not exceed {}",
            MAX_WORKER_THREADS
        ));
    }
    if cfg.engine.queue_capacity == 0 {
        problems.push("engine.queue_capacity must be at least 1".to_string());
    }
    if cfg.engine.default_timeout_secs == 0 {
        problems.push("engine.default_timeout_secs must be at least 1".to_string());
    }
    if cfg.corelet.pool_size > MAX_POOL_SIZE {
        problems.push(format!(
            "corelet.pool_size {} exceeds the maximum of {}",
            cfg.corelet.pool_size, MAX_POOL_SIZE
        ));
    }
    if cfg.corelet.enabled() {
        if cfg.corelet.health_check_interval_ms == 0 {
            problems.push("corelet.health_check_interval_ms must be at least 1".to_string());
        }
        if cfg.corelet.poll_interval_ms == 0 {
            problems.push("corelet.poll_interval_ms must be at least 1".to_string());
        }
        if cfg.corelet.idle_timeout_secs == 0 {
            problems.push("corelet.idle_timeout_secs must be at least 1".to_string());
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::Validation(problems.join("; ")))
    }
}

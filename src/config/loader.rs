// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use serde::Deserialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::consts::*;
use crate::config::validate_config;
use crate::errors::ConfigError;

/// Complete configuration for the event engine.
///
/// Every section is optional; missing sections and fields fall back to the
/// defaults in [`consts`](crate::config::consts).
///
/// # Fields
/// * `engine` - Dispatch loop sizing and the default deadline
/// * `corelet` - Worker process pool settings
/// * `logging` - Tracing output settings
///
/// # Example
/// ```yaml
/// engine:
///   worker_threads: 4
///   queue_capacity: 1024
///   default_timeout_secs: 30
/// corelet:
///   pool_size: 2
///   idle_timeout_secs: 300
///   health_check_interval_ms: 500
/// logging:
///   filter: "the_corelet=debug"
///   json: true
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub engine: DispatchConfig,
    pub corelet: CoreletConfig,
    pub logging: LoggingConfig,
}

/// Dispatch loop settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub worker_threads: usize,
    pub queue_capacity: usize,
    pub default_timeout_secs: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            worker_threads: DEFAULT_WORKER_THREADS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            default_timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl DispatchConfig {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }
}

/// Corelet pool settings.
///
/// # Fields
/// * `pool_size` - Number of worker processes; 0 disables corelet mode
/// * `program` - Executable launched as a worker (defaults to the current executable)
/// * `args` - Extra arguments passed to the worker executable
/// * `idle_timeout_secs` - Workers exit after this long without an event
/// * `health_check_interval_ms` - Interval between liveness scans
/// * `poll_interval_ms` - Bounded wait a worker uses on its task pipe
/// * `shutdown_grace_ms` - Grace period before workers are killed on shutdown
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CoreletConfig {
    pub pool_size: usize,
    pub program: Option<PathBuf>,
    pub args: Vec<String>,
    pub idle_timeout_secs: u64,
    pub health_check_interval_ms: u64,
    pub poll_interval_ms: u64,
    pub shutdown_grace_ms: u64,
}

impl Default for CoreletConfig {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            program: None,
            args: Vec::new(),
            idle_timeout_secs: DEFAULT_IDLE_TIMEOUT_SECS,
            health_check_interval_ms: DEFAULT_HEALTH_CHECK_INTERVAL_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            shutdown_grace_ms: DEFAULT_SHUTDOWN_GRACE_MS,
        }
    }
}

impl CoreletConfig {
    pub fn enabled(&self) -> bool {
        self.pool_size > 0
    }

    /// The worker executable, falling back to the running executable.
    pub fn program_path(&self) -> io::Result<PathBuf> {
        match &self.program {
            Some(program) => Ok(program.clone()),
            None => std::env::current_exe(),
        }
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_millis(self.health_check_interval_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

/// Tracing output settings. `RUST_LOG` takes precedence over `filter`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub filter: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_LOG_FILTER.to_string(),
            json: false,
        }
    }
}

/// Load a config from a YAML or TOML file, chosen by extension.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<EngineConfig, ConfigError> {
    let path = path.as_ref();
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();

    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;

    match extension.as_str() {
        "yaml" | "yml" => Ok(serde_yaml::from_str(&content)?),
        "toml" => Ok(toml::from_str(&content)?),
        other => Err(ConfigError::UnsupportedFormat(other.to_string())),
    }
}

/// Load a config file and reject values the engine cannot run with.
pub fn load_and_validate_config<P: AsRef<Path>>(path: P) -> Result<EngineConfig, ConfigError> {
    let cfg = load_config(path)?;
    validate_config(&cfg)?;
    Ok(cfg)
}

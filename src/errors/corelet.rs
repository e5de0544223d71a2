// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Error types for the corelet pool and the corelet worker process.
//!
//! Transport errors (broken pipes, undecodable frames) are fatal to the single
//! worker involved and never to the pool as a whole.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreletError {
    /// Every worker in the pool is dead or the pool is empty.
    #[error("No live corelet worker available")]
    NoLiveWorker,

    /// The worker running the task died, was terminated, or closed its pipe.
    #[error("Corelet worker {worker_id} was lost before task {task_id} completed")]
    WorkerLost { worker_id: usize, task_id: u64 },

    /// The worker process could not be launched.
    #[error("Failed to spawn corelet worker: {0}")]
    Spawn(std::io::Error),

    /// Reading or writing a pipe failed.
    #[error("Pipe I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A frame could not be encoded or decoded.
    #[error("Wire codec error: {0}")]
    Codec(#[from] bincode::Error),

    /// A frame exceeded the maximum frame size.
    #[error("Frame of {0} bytes exceeds the maximum frame size")]
    FrameTooLarge(usize),

    /// The pool no longer accepts work.
    #[error("Corelet pool has been shut down")]
    PoolStopped,
}

impl CoreletError {
    /// Whether a read error leaves the pipe unusable. Write-side encoding
    /// failures never reach a pipe; see [`is_event_level`](Self::is_event_level).
    pub fn is_fatal_to_worker(&self) -> bool {
        matches!(
            self,
            CoreletError::Io(_) | CoreletError::FrameTooLarge(_) | CoreletError::PoolStopped
        )
    }

    /// Whether the event itself could not be framed. The worker and its pipe
    /// are unaffected and retrying cannot help.
    pub fn is_event_level(&self) -> bool {
        matches!(self, CoreletError::FrameTooLarge(_) | CoreletError::Codec(_))
    }
}

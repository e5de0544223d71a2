// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Length-prefixed bincode framing for the corelet task and result pipes.
//!
//! Each frame is a 4-byte big-endian body length followed by the bincode
//! body. The format is private to this crate: both ends of a pipe are always
//! the same build.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::errors::CoreletError;
use crate::events::{Event, EventResult};

pub const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// Task id reserved for control traffic and unattributed failures.
pub const CONTROL_TASK_ID: u64 = 0;

/// Pool → worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEnvelope {
    pub task_id: u64,
    pub event: Event,
}

/// Worker → pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultEnvelope {
    pub task_id: u64,
    pub result: EventResult,
}

/// Encode `value` as a complete frame, length prefix included.
///
/// Oversized or unencodable values fail here, before any pipe is touched.
pub fn encode_frame<T: Serialize>(value: &T) -> Result<Vec<u8>, CoreletError> {
    let body = bincode::serialize(value)?;
    if body.len() > MAX_FRAME_BYTES {
        return Err(CoreletError::FrameTooLarge(body.len()));
    }
    let mut frame = Vec::with_capacity(4 + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Write a frame produced by [`encode_frame`]. Any error here is an I/O error.
pub async fn write_encoded<W>(writer: &mut W, frame: &[u8]) -> Result<(), CoreletError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(frame).await?;
    writer.flush().await?;
    Ok(())
}

pub async fn write_frame<W, T>(writer: &mut W, value: &T) -> Result<(), CoreletError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let frame = encode_frame(value)?;
    write_encoded(writer, &frame).await
}

/// Read one frame. `Ok(None)` means the peer closed the pipe between frames.
///
/// A body that fails to decode is reported as [`CoreletError::Codec`] with
/// the stream still positioned at the next frame. Not cancel-safe.
pub async fn read_frame<R, T>(reader: &mut R) -> Result<Option<T>, CoreletError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let len = match reader.read_u32().await {
        Ok(len) => len as usize,
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if len > MAX_FRAME_BYTES {
        return Err(CoreletError::FrameTooLarge(len));
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(Some(bincode::deserialize(&body)?))
}

/// Blocking counterpart of [`read_frame`] for readers driven from a plain thread.
pub fn read_frame_blocking<R, T>(reader: &mut R) -> Result<Option<T>, CoreletError>
where
    R: std::io::Read,
    T: DeserializeOwned,
{
    let mut prefix = [0u8; 4];
    match reader.read_exact(&mut prefix) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let len = u32::from_be_bytes(prefix) as usize;
    if len > MAX_FRAME_BYTES {
        return Err(CoreletError::FrameTooLarge(len));
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body)?;
    Ok(Some(bincode::deserialize(&body)?))
}

//! Framed IPC protocol between the pool and its worker processes.
//!
//! Each message is a 4-byte big-endian length prefix followed by a
//! MessagePack payload. One task is outstanding per worker at a time, so the
//! protocol needs no multiplexing; the `id` field only guards against a
//! stale reply after a timeout/respawn cycle.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{DocpulpError, Result};

/// Upper bound on a single frame. Requests carry raw image bytes and the
/// facade already caps bodies at 50 MiB.
pub const MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;

/// Pool → worker messages.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub enum WorkerRequest {
    /// Recognize one image.
    Task { id: u64, image: Vec<u8> },
    /// Drain and exit.
    Shutdown,
}

/// Worker → pool messages.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub enum WorkerReply {
    /// Sent once after startup, after the eager engine initialization
    /// attempt. `engine_ready = false` means the worker will answer every
    /// task with an empty string.
    Ready { pid: u32, engine_ready: bool },
    /// Result for `Task { id, .. }`. `text` is empty on any failure.
    Done { id: u64, text: String },
}

fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>> {
    rmp_serde::to_vec(message).map_err(|e| DocpulpError::serialization(format!("encode frame: {e}")))
}

fn decode<T: DeserializeOwned>(payload: &[u8]) -> Result<T> {
    rmp_serde::from_slice(payload).map_err(|e| DocpulpError::serialization(format!("decode frame: {e}")))
}

fn check_len(len: usize) -> Result<()> {
    if len > MAX_FRAME_BYTES {
        return Err(DocpulpError::serialization(format!(
            "frame of {len} bytes exceeds the {MAX_FRAME_BYTES} byte cap"
        )));
    }
    Ok(())
}

/// Write one frame to a blocking writer (worker side).
pub fn write_frame<T: Serialize>(writer: &mut impl Write, message: &T) -> Result<()> {
    let payload = encode(message)?;
    check_len(payload.len())?;
    writer.write_all(&(payload.len() as u32).to_be_bytes())?;
    writer.write_all(&payload)?;
    writer.flush()?;
    Ok(())
}

/// Read one frame from a blocking reader (worker side). Returns `None` on a
/// clean EOF before the length prefix.
pub fn read_frame<T: DeserializeOwned>(reader: &mut impl Read) -> Result<Option<T>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let len = u32::from_be_bytes(len_buf) as usize;
    check_len(len)?;
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload)?;
    decode(&payload).map(Some)
}

/// Write one frame to an async writer (pool side).
pub async fn write_frame_async<T, W>(writer: &mut W, message: &T) -> Result<()>
where
    T: Serialize,
    W: AsyncWrite + Unpin,
{
    let payload = encode(message)?;
    check_len(payload.len())?;
    writer.write_all(&(payload.len() as u32).to_be_bytes()).await?;
    writer.write_all(&payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame from an async reader (pool side).
pub async fn read_frame_async<T, R>(reader: &mut R) -> Result<T>
where
    T: DeserializeOwned,
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf) as usize;
    check_len(len)?;
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    decode(&payload)
}

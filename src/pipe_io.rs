// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Async Pipe I/O: cancellable read/write/peek over a named pipe, each
//! bounded by the configured I/O timeout except for peek, which waits
//! indefinitely for the next message to arrive.

use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::windows::named_pipe::NamedPipeServer;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::errors::{Result, ServiceError};

/// Reads exactly `buf.len()` bytes, honoring `cancel` and the I/O timeout.
/// A cancellation wakes this with a zero-length read rather than an error,
/// matching the "treat a cancel-wake during SERVE as quiet shutdown" rule.
pub async fn read_exact(
    pipe: &mut NamedPipeServer,
    buf: &mut [u8],
    io_timeout: Duration,
    cancel: &CancellationToken,
) -> Result<usize> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Ok(0),
        res = timeout(io_timeout, pipe.read_exact(buf)) => match res {
            Ok(Ok(n)) => Ok(n),
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(0),
            Ok(Err(e)) => Err(ServiceError::Io(e)),
            Err(_) => Err(ServiceError::Other("read timed out".into())),
        },
    }
}

/// Writes the entire buffer, honoring `cancel` and the I/O timeout.
pub async fn write_all(
    pipe: &mut NamedPipeServer,
    buf: &[u8],
    io_timeout: Duration,
    cancel: &CancellationToken,
) -> Result<()> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ServiceError::Other("write cancelled".into())),
        res = timeout(io_timeout, pipe.write_all(buf)) => match res {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(ServiceError::Io(e)),
            Err(_) => Err(ServiceError::Other("write timed out".into())),
        },
    }
}

/// Blocks until the pipe has data ready, without consuming any of it. Used
/// by the session loop to learn that a request has arrived before
/// committing to a header read.
pub async fn wait_readable(pipe: &NamedPipeServer, cancel: &CancellationToken) -> Result<()> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Ok(()),
        res = pipe.readable() => res.map_err(ServiceError::Io),
    }
}

/// Reads a full request frame: the fixed-size header, then `header.size`
/// bytes of body (zero for headerless requests such as `SERVE`'s pings).
pub async fn read_frame(
    pipe: &mut NamedPipeServer,
    header_len: usize,
    body_len: usize,
    io_timeout: Duration,
    cancel: &CancellationToken,
) -> Result<Option<(BytesMut, BytesMut)>> {
    let mut header = BytesMut::zeroed(header_len);
    let n = read_exact(pipe, &mut header, io_timeout, cancel).await?;
    if n == 0 {
        return Ok(None);
    }
    let mut body = BytesMut::zeroed(body_len);
    if body_len > 0 {
        let n = read_exact(pipe, &mut body, io_timeout, cancel).await?;
        if n == 0 {
            return Ok(None);
        }
    }
    Ok(Some((header, body)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn wait_readable_returns_immediately_when_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let pipe = tokio::net::windows::named_pipe::ServerOptions::new()
            .create(r"\\.\pipe\pnh-test-wait-readable")
            .expect("create pipe for test");
        let result = wait_readable(&pipe, &cancel).await;
        assert!(result.is_ok());
    }
}

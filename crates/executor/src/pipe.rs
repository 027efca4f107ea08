//! In-process byte pipe connecting one runner to its drainer.
//!
//! ```text
//!   child stdout ──▶ ProcessRunner ──▶ PipeWriter ══▶ PipeReader ──▶ PipeDrainer
//!                                       (bounded buffer)
//! ```
//!
//! The buffer is bounded like an OS pipe: once it is full, writes suspend
//! until the reader drains it. Dropping (or shutting down) the writer is the
//! only way the reader ever sees end-of-stream.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};

/// Write end of a pipe. Owned by the process runner.
#[derive(Debug)]
pub struct PipeWriter {
    inner: DuplexStream,
}

/// Read end of a pipe. Owned exclusively by the paired drainer.
#[derive(Debug)]
pub struct PipeReader {
    inner: DuplexStream,
}

/// Creates a connected pipe holding at most `capacity` unread bytes.
pub fn pipe(capacity: usize) -> (PipeWriter, PipeReader) {
    let (write, read) = tokio::io::duplex(capacity.max(1));
    (PipeWriter { inner: write }, PipeReader { inner: read })
}

impl AsyncWrite for PipeWriter {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

impl AsyncRead for PipeReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

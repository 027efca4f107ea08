//! Pipe drainer: reads one item's pipe to end-of-stream and seals its record.

use std::io;

use fanout::{ExecutionError, OutputRecord, Timestamp, WorkItem};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::collector::RecordSink;
use crate::runner::RunOutcome;

const CHUNK_SIZE: usize = 8192;

/// Everything read from a stream, plus the error that stopped reading early.
#[derive(Debug)]
pub struct Drained {
    pub bytes: Vec<u8>,
    pub error: Option<io::Error>,
}

/// Reads `reader` until end-of-stream.
///
/// On a read error, the bytes received so far are kept and the error is
/// returned alongside them.
pub async fn drain_to_end<R>(mut reader: R) -> Drained
where
    R: AsyncRead + Unpin,
{
    let mut bytes = Vec::new();
    let mut chunk = [0u8; CHUNK_SIZE];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => return Drained { bytes, error: None },
            Ok(n) => bytes.extend_from_slice(&chunk[..n]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                return Drained {
                    bytes,
                    error: Some(e),
                }
            }
        }
    }
}

/// The drain half of one work item.
///
/// Spawned before its runner and never gated by the execution pool.
pub(crate) struct DrainTask<R> {
    pub(crate) index: usize,
    pub(crate) item: WorkItem,
    pub(crate) reader: R,
    pub(crate) outcome: oneshot::Receiver<RunOutcome>,
    pub(crate) sink: RecordSink,
}

impl<R> DrainTask<R>
where
    R: AsyncRead + Unpin,
{
    pub(crate) async fn run(self) {
        let Self {
            index,
            item,
            reader,
            outcome,
            sink,
        } = self;

        let drained = drain_to_end(reader).await;

        // The runner closes the write end before reporting, so by the time we
        // see end-of-stream the outcome is already sent (or the runner died).
        let outcome = outcome.await.unwrap_or_else(|_| {
            RunOutcome::failed(ExecutionError::TaskAborted {
                reason: "runner ended without reporting an outcome".to_string(),
            })
        });

        let read_error = drained.error.map(|e| {
            warn!(error = %e, bytes = drained.bytes.len(), "pipe read failed");
            ExecutionError::ReadFailed {
                reason: e.to_string(),
            }
        });

        let record = OutputRecord {
            index,
            item,
            stdout: drained.bytes,
            stderr: outcome.stderr,
            exit_code: outcome.exit_code,
            error: read_error.or(outcome.error),
            started_at: outcome.started_at,
            finished_at: Timestamp::now(),
        };
        debug!(
            bytes = record.stdout.len(),
            ok = record.is_success(),
            "item drained"
        );
        sink.publish(record).await;
    }
}

//! Bounded dispatcher: one runner/drainer pair per work item.
//!
//! ```text
//!               ┌─ drain pool (unbounded) ──────────────────────────────┐
//!   item 0 ──▶ pipe ──▶ DrainTask ─────────────────────▶ RecordSink ──┐ │
//!   item 1 ──▶ pipe ──▶ DrainTask ─────────────────────▶ RecordSink ──┤ │
//!               └───────────────────────────────────────────────────────┘
//!               ┌─ execute pool (K permits) ────────────────────────────┐
//!   item 0 ──▶ ProcessRunner ── acquire ─▶ spawn ─▶ wait ─▶ release   │
//!   item 1 ──▶ ProcessRunner ── acquire ─▶ spawn ─▶ wait ─▶ release   │
//!               └───────────────────────────────────────────────────────┘
//!                                                                RecordStream
//! ```
//!
//! Pipes and drainers are created for every item up front; only process
//! execution waits on the [`ExecutionPool`]. A drainer is always running
//! before its runner can block on a full pipe.

use std::sync::Arc;
use std::time::Instant;

use fanout::{
    CommandBuilder, DispatchError, DispatchId, DispatchReport, DispatchSummary, ExecutionError,
    OutputRecord, Timestamp, WorkItem, WorkItemSource,
};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info, info_span, warn, Instrument, Span};

use crate::collector::{record_channel, RecordSink, RecordStream};
use crate::config::DispatchConfig;
use crate::drainer::DrainTask;
use crate::pipe::pipe;
use crate::pool::ExecutionPool;
use crate::runner::{saturating_millis, ProcessRunner};

/// Runs every work item's command, at most K at a time, and collects output.
#[derive(Clone)]
pub struct Dispatcher {
    config: DispatchConfig,
    builder: Arc<dyn CommandBuilder>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    pub fn new(config: DispatchConfig, builder: impl CommandBuilder + 'static) -> Self {
        Self {
            config,
            builder: Arc::new(builder),
        }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Fetches items from `source`, then behaves like [`Dispatcher::dispatch`].
    pub async fn dispatch_from(
        &self,
        source: &dyn WorkItemSource,
    ) -> Result<DispatchReport, DispatchError> {
        let items = source.work_items().await?;
        info!(source = %source.describe(), items = items.len(), "work items loaded");
        self.dispatch(items).await
    }

    /// Runs all items and returns once every runner and drainer has finished.
    ///
    /// Records are in completion order.
    pub async fn dispatch(&self, items: Vec<WorkItem>) -> Result<DispatchReport, DispatchError> {
        let (stream, handle) = self.start(items)?;
        let (records, summary) = tokio::join!(stream.collect_all(), handle.wait());
        Ok(DispatchReport { records, summary })
    }

    /// Launches every item and returns immediately.
    ///
    /// Records can be read from the returned stream while the dispatch runs.
    /// The stream ends once [`DispatchHandle::wait`] has returned, so consume
    /// it concurrently with the wait (e.g. `tokio::join!`). Dropping the
    /// handle cancels the dispatch and kills any running processes.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(
        &self,
        items: Vec<WorkItem>,
    ) -> Result<(RecordStream, DispatchHandle), DispatchError> {
        if items.is_empty() {
            return Err(DispatchError::NoWorkItems);
        }

        let started = Instant::now();
        let id = DispatchId::new_random();
        let total = items.len();
        let limit = self.config.limit;
        let span = info_span!("dispatch", dispatch_id = %id, items = total, limit = %limit);
        info!(parent: &span, "dispatch started");

        let pool = ExecutionPool::new(limit);
        let runner = ProcessRunner::new(
            pool.clone(),
            self.config.stderr,
            self.config.process_timeout,
        );
        let (sink, stream) = record_channel(total);
        let mut completions = CompletionSet::with_capacity(total);

        for (index, item) in items.into_iter().enumerate() {
            let spec = self.builder.build(&item);
            let item_span = info_span!(
                parent: &span,
                "item",
                index,
                work_item = %item,
                program = %spec.program()
            );

            let (writer, reader) = pipe(self.config.pipe_capacity);
            let (outcome_tx, outcome_rx) = oneshot::channel();

            let drainer = tokio::spawn(
                DrainTask {
                    index,
                    item: item.clone(),
                    reader,
                    outcome: outcome_rx,
                    sink: sink.clone(),
                }
                .run()
                .instrument(item_span.clone()),
            );

            let runner = runner.clone();
            let runner = tokio::spawn(
                async move {
                    let outcome = runner.run(&spec, writer).await;
                    // The drainer only goes away if it panicked; nothing to report to.
                    let _ = outcome_tx.send(outcome);
                }
                .instrument(item_span),
            );

            completions.push(ItemCompletion {
                index,
                item,
                runner,
                drainer,
            });
        }

        Ok((
            stream,
            DispatchHandle {
                id,
                total,
                started,
                pool,
                sink,
                completions,
                span,
            },
        ))
    }
}

/// Per-item completion signals for a running dispatch.
struct ItemCompletion {
    index: usize,
    item: WorkItem,
    runner: JoinHandle<()>,
    drainer: JoinHandle<()>,
}

/// Every item's pair of completion signals.
///
/// Satisfied only when both halves of every item have finished. Dropping it
/// aborts whatever is still running.
struct CompletionSet {
    items: Vec<ItemCompletion>,
}

impl CompletionSet {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
        }
    }

    fn push(&mut self, completion: ItemCompletion) {
        self.items.push(completion);
    }

    /// Waits for both halves of every item.
    ///
    /// A drainer that died without publishing gets a substitute record so the
    /// collector still sees exactly one record per item.
    async fn wait_all(&mut self, sink: &RecordSink) {
        for completion in &mut self.items {
            if let Err(e) = (&mut completion.runner).await {
                error!(index = completion.index, error = %e, "runner task failed");
            }
            if let Err(e) = (&mut completion.drainer).await {
                error!(index = completion.index, error = %e, "drainer task failed");
                sink.publish(OutputRecord {
                    index: completion.index,
                    item: completion.item.clone(),
                    stdout: Vec::new(),
                    stderr: None,
                    exit_code: None,
                    error: Some(ExecutionError::TaskAborted {
                        reason: e.to_string(),
                    }),
                    started_at: None,
                    finished_at: Timestamp::now(),
                })
                .await;
            }
        }
    }
}

impl Drop for CompletionSet {
    fn drop(&mut self) {
        for completion in &self.items {
            completion.runner.abort();
            completion.drainer.abort();
        }
    }
}

/// Handle to a dispatch started with [`Dispatcher::start`].
pub struct DispatchHandle {
    id: DispatchId,
    total: usize,
    started: Instant,
    pool: ExecutionPool,
    sink: RecordSink,
    completions: CompletionSet,
    span: Span,
}

impl DispatchHandle {
    pub fn id(&self) -> DispatchId {
        self.id
    }

    /// Waits until every item has completed and returns the summary.
    pub async fn wait(mut self) -> DispatchSummary {
        let span = self.span.clone();
        async {
            self.completions.wait_all(&self.sink).await;
            let tally = self.sink.tally();

            let summary = DispatchSummary {
                dispatch_id: self.id,
                total: self.total,
                failed: tally.failed(),
                total_bytes: tally.bytes(),
                limit: self.pool.limit(),
                peak_concurrency: self.pool.peak(),
                elapsed: self.started.elapsed(),
            };
            if tally.published() != self.total {
                warn!(
                    published = tally.published(),
                    total = self.total,
                    "record count does not match work-item count"
                );
            }
            info!(
                failed = summary.failed,
                bytes = summary.total_bytes,
                peak = summary.peak_concurrency,
                elapsed_ms = saturating_millis(summary.elapsed),
                "dispatch complete"
            );
            summary
        }
        .instrument(span)
        .await
        // `self` drops here, releasing the last sink so the record stream ends.
    }
}

//! Fanout execution infrastructure.
//!
//! Runs one subprocess per [`fanout::WorkItem`], at most K at a time, and
//! collects each subprocess's complete stdout without ever deadlocking on a
//! full pipe.
//!
//! ## The protocol
//!
//! For every item the [`Dispatcher`] creates a bounded [`pipe`], spawns a
//! drainer on the read end, and spawns a [`ProcessRunner`] on the write end.
//! The runner waits for a permit from the [`ExecutionPool`], starts the
//! process, forwards its stdout into the pipe, waits for exit, releases the
//! permit, and closes the pipe. The drainer reads until end-of-stream and
//! publishes one [`fanout::OutputRecord`] through the [`RecordSink`].
//!
//! A subprocess's output is never read only after the subprocess has been
//! awaited: the drainer is already running when the runner starts waiting.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Process spawning, pipes, and the tokio runtime live
//! here. The [`fanout`] crate sees only `WorkItem`, `CommandSpec`, and
//! `OutputRecord`.

pub mod collector;
pub mod config;
pub mod dispatcher;
pub mod drainer;
pub mod pipe;
pub mod pool;
pub mod runner;
pub mod sources;

pub use collector::{record_channel, RecordSink, RecordStream};
pub use config::{DispatchConfig, StderrMode, DEFAULT_PIPE_CAPACITY};
pub use dispatcher::{DispatchHandle, Dispatcher};
pub use drainer::{drain_to_end, Drained};
pub use pipe::{pipe, PipeReader, PipeWriter};
pub use pool::{ExecutionPermit, ExecutionPool};
pub use runner::{ProcessRunner, RunOutcome};
pub use sources::{GitCommitSource, LineInput, LineSource};

//! Shared value types for the fanout domain.
//!
//! Unlike the newtype identifiers in [`crate::identifiers`], these types carry
//! meaningful values with invariants (the concurrency limit is non-zero, a
//! command always names a program) and flow between the dispatcher, the
//! per-item runner and drainer, and the caller.

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{DispatchError, DispatchId, ExecutionError, WorkItem};

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// Executable name plus ordered argument list for one subprocess.
///
/// Produced from a [`WorkItem`] by a [`crate::CommandBuilder`] and never
/// modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    program: String,
    args: Vec<String>,
    current_dir: Option<PathBuf>,
}

impl CommandSpec {
    /// Creates a [`CommandSpec`] with no arguments.
    ///
    /// Returns `None` if `program` is empty.
    pub fn new(program: impl Into<String>) -> Option<Self> {
        let program = program.into();
        if program.is_empty() {
            None
        } else {
            Some(Self {
                program,
                args: Vec::new(),
                current_dir: None,
            })
        }
    }

    /// Caller guarantees `program` is non-empty.
    pub(crate) fn from_parts(program: String) -> Self {
        debug_assert!(!program.is_empty());
        Self {
            program,
            args: Vec::new(),
            current_dir: None,
        }
    }

    /// Appends one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments in order.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets the working directory the process is started in.
    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    pub fn working_dir(&self) -> Option<&PathBuf> {
        self.current_dir.as_ref()
    }
}

impl std::fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Concurrency limit
// ---------------------------------------------------------------------------

/// Maximum number of processes allowed to execute at the same time.
///
/// Bounds the *execute* side only. Draining is never limited: every item's
/// drainer runs as soon as its pipe exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConcurrencyLimit(NonZeroUsize);

impl ConcurrencyLimit {
    /// Limit used when none is configured.
    pub const DEFAULT: Self = match NonZeroUsize::new(10) {
        Some(n) => Self(n),
        None => unreachable!(),
    };

    /// Creates a limit, rejecting zero.
    pub fn new(value: usize) -> Result<Self, DispatchError> {
        NonZeroUsize::new(value)
            .map(Self)
            .ok_or(DispatchError::InvalidConcurrencyLimit { value })
    }

    /// Returns the limit as a plain integer (always at least 1).
    pub fn get(self) -> usize {
        self.0.get()
    }
}

impl Default for ConcurrencyLimit {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TryFrom<usize> for ConcurrencyLimit {
    type Error = DispatchError;

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl std::fmt::Display for ConcurrencyLimit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Output records
// ---------------------------------------------------------------------------

/// The result of one work item.
///
/// Built by the item's drainer once its pipe reached end-of-stream and the
/// paired runner reported how the process ended, then handed to the collector
/// exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputRecord {
    /// Position of the item in the submitted work-item list.
    pub index: usize,

    /// The work item this record belongs to.
    pub item: WorkItem,

    /// Every byte the process wrote to stdout, in order.
    ///
    /// On a read failure this holds the bytes received before the failure.
    pub stdout: Vec<u8>,

    /// Captured stderr, when stderr capture is enabled.
    pub stderr: Option<Vec<u8>>,

    /// Exit code, if the process ran and exited normally.
    pub exit_code: Option<i32>,

    /// Why the item did not complete cleanly, if it didn't.
    pub error: Option<ExecutionError>,

    /// When the item's process was started (after the permit was acquired).
    ///
    /// `None` if the process never started.
    pub started_at: Option<Timestamp>,

    /// When the drainer observed end-of-stream and the record was sealed.
    pub finished_at: Timestamp,
}

impl OutputRecord {
    /// Returns `true` if the item completed without an execution error.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Number of stdout bytes collected.
    pub fn len(&self) -> usize {
        self.stdout.len()
    }

    /// Returns `true` if no stdout bytes were collected.
    pub fn is_empty(&self) -> bool {
        self.stdout.is_empty()
    }

    /// Stdout decoded as UTF-8, replacing invalid sequences.
    pub fn stdout_lossy(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.stdout)
    }
}

// ---------------------------------------------------------------------------
// Dispatch results
// ---------------------------------------------------------------------------

/// Aggregate figures for one completed dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchSummary {
    /// Identifier recorded on the dispatch span.
    pub dispatch_id: DispatchId,

    /// Number of work items submitted.
    pub total: usize,

    /// Number of records carrying an execution error.
    pub failed: usize,

    /// Sum of stdout bytes over all records.
    pub total_bytes: u64,

    /// Configured concurrency limit.
    pub limit: ConcurrencyLimit,

    /// Highest number of processes observed executing at the same time.
    pub peak_concurrency: usize,

    /// Wall-clock duration of the dispatch.
    pub elapsed: Duration,
}

impl DispatchSummary {
    /// Number of records without an execution error.
    pub fn succeeded(&self) -> usize {
        self.total - self.failed
    }
}

/// Every record of a completed dispatch plus its summary.
#[derive(Debug, Clone)]
pub struct DispatchReport {
    /// Records in the order their drainers finished.
    pub records: Vec<OutputRecord>,

    /// Aggregate figures.
    pub summary: DispatchSummary,
}

impl DispatchReport {
    /// Reorders the records by submission index.
    pub fn sort_by_submission(&mut self) {
        self.records.sort_by_key(|r| r.index);
    }

    /// Returns `true` if every record completed without an execution error.
    pub fn all_succeeded(&self) -> bool {
        self.summary.failed == 0
    }

    /// Records that carry an execution error.
    pub fn failures(&self) -> impl Iterator<Item = &OutputRecord> {
        self.records.iter().filter(|r| !r.is_success())
    }
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A UTC wall-clock timestamp.
///
/// Wraps [`chrono::DateTime<Utc>`] so callers never depend on `chrono` types
/// directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Returns the current UTC time as a [`Timestamp`].
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Returns the underlying [`DateTime<Utc>`].
    pub fn as_datetime(self) -> DateTime<Utc> {
        self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

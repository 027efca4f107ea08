//! Error types for the fanout domain.
//!
//! Two layers are kept deliberately separate:
//!
//! - [`ExecutionError`] is *per item*. It is stored on the item's
//!   [`crate::OutputRecord`] and never aborts the rest of a dispatch.
//! - [`DispatchError`] is *per dispatch*. It is returned instead of any records
//!   when the dispatch as a whole cannot start (bad limit, nothing to do, the
//!   work-item source failed).

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Per-item errors
// ---------------------------------------------------------------------------

/// Why a single work item did not complete cleanly.
///
/// Output collected before the failure is still carried on the record; this
/// type only explains what went wrong.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutionError {
    /// The process could not be started (e.g. executable not found).
    #[error("failed to start '{program}': {reason}")]
    SpawnFailed {
        /// Program that was being started.
        program: String,
        /// Operating-system error message.
        reason: String,
    },

    /// The process ran but terminated with a failure status.
    ///
    /// `code` is `None` when the process was terminated by a signal.
    #[error("'{program}' exited with {}", describe_exit(.code, .signal))]
    NonZeroExit {
        /// Program that exited.
        program: String,
        /// Exit code, if the process exited normally.
        code: Option<i32>,
        /// Terminating signal number, if any (Unix only).
        signal: Option<i32>,
    },

    /// Reading the item's pipe failed before end-of-stream.
    #[error("failed to read output: {reason}")]
    ReadFailed {
        /// I/O error message.
        reason: String,
    },

    /// Copying the process's stdout into the item's pipe failed.
    #[error("failed to forward output of '{program}': {reason}")]
    ForwardFailed {
        /// Program whose output was being forwarded.
        program: String,
        /// I/O error message.
        reason: String,
    },

    /// Waiting for the process to exit failed.
    #[error("failed to wait for '{program}': {reason}")]
    WaitFailed {
        /// Program being waited on.
        program: String,
        /// I/O error message.
        reason: String,
    },

    /// The process exceeded the configured per-process timeout and was killed.
    #[error("'{program}' timed out after {after_ms}ms")]
    TimedOut {
        /// Program that was killed.
        program: String,
        /// Configured timeout in milliseconds.
        after_ms: u64,
    },

    /// The runner or drainer task for this item panicked or was cancelled.
    #[error("item task aborted: {reason}")]
    TaskAborted {
        /// Description of the join failure.
        reason: String,
    },
}

impl ExecutionError {
    /// Returns `true` if the process never started.
    pub fn is_spawn_failure(&self) -> bool {
        matches!(self, Self::SpawnFailed { .. })
    }

    /// Returns the exit code for [`ExecutionError::NonZeroExit`].
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::NonZeroExit { code, .. } => *code,
            _ => None,
        }
    }
}

fn describe_exit(code: &Option<i32>, signal: &Option<i32>) -> String {
    match (code, signal) {
        (Some(code), _) => format!("status {code}"),
        (None, Some(signal)) => format!("signal {signal}"),
        (None, None) => "unknown status".to_string(),
    }
}

// ---------------------------------------------------------------------------
// Work-item source errors
// ---------------------------------------------------------------------------

/// Failure of a [`crate::WorkItemSource`] to produce its items.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Reading the underlying input (file, stdin) failed.
    #[error("failed to read work items from {origin}: {source}")]
    Io {
        /// Human-readable description of where items were read from.
        origin: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The helper command that lists work items failed.
    #[error("'{command}' failed: {message}")]
    Command {
        /// Command line that was run.
        command: String,
        /// Exit status or captured stderr.
        message: String,
    },
}

// ---------------------------------------------------------------------------
// Dispatch-level errors
// ---------------------------------------------------------------------------

/// Conditions that prevent a dispatch from running at all.
///
/// These are reported instead of a record set, never mixed into it.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The concurrency limit must be a positive integer.
    #[error("invalid concurrency limit {value}: must be at least 1")]
    InvalidConcurrencyLimit {
        /// The rejected value.
        value: usize,
    },

    /// There were no work items to dispatch.
    #[error("no work items to dispatch")]
    NoWorkItems,

    /// The work-item source could not produce its items.
    #[error("work-item source failed: {0}")]
    Source(#[from] SourceError),
}

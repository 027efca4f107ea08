//! Dispatch configuration.

use std::process::Stdio;
use std::time::Duration;

use fanout::ConcurrencyLimit;
use serde::{Deserialize, Serialize};

/// Default in-process pipe buffer, matching the common Linux pipe capacity.
pub const DEFAULT_PIPE_CAPACITY: usize = 64 * 1024;

/// What happens to a subprocess's stderr.
///
/// A piped stderr that nobody reads can deadlock a process exactly like an
/// undrained stdout, so `Capture` always drains it concurrently with stdout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StderrMode {
    /// Connect stderr to the null device.
    Discard,
    /// Collect stderr and attach it to the item's record.
    #[default]
    Capture,
    /// Share the parent process's stderr.
    Inherit,
}

impl StderrMode {
    pub(crate) fn stdio(self) -> Stdio {
        match self {
            Self::Discard => Stdio::null(),
            Self::Capture => Stdio::piped(),
            Self::Inherit => Stdio::inherit(),
        }
    }
}

/// Settings for one [`crate::Dispatcher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Maximum number of processes executing at once.
    pub limit: ConcurrencyLimit,

    /// Stderr handling for every process.
    pub stderr: StderrMode,

    /// Buffer size of each item's pipe, in bytes. Values below 1 are raised to 1.
    pub pipe_capacity: usize,

    /// Kill a process that has not exited after this long.
    ///
    /// `None` waits indefinitely; a hung process then holds its permit and
    /// keeps the dispatch from completing.
    pub process_timeout: Option<Duration>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            limit: ConcurrencyLimit::default(),
            stderr: StderrMode::default(),
            pipe_capacity: DEFAULT_PIPE_CAPACITY,
            process_timeout: None,
        }
    }
}

impl DispatchConfig {
    pub fn with_limit(mut self, limit: ConcurrencyLimit) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_stderr(mut self, stderr: StderrMode) -> Self {
        self.stderr = stderr;
        self
    }

    pub fn with_pipe_capacity(mut self, bytes: usize) -> Self {
        self.pipe_capacity = bytes;
        self
    }

    pub fn with_process_timeout(mut self, timeout: Duration) -> Self {
        self.process_timeout = Some(timeout);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DispatchConfig::default();
        assert_eq!(config.limit.get(), 10);
        assert_eq!(config.stderr, StderrMode::Capture);
        assert_eq!(config.pipe_capacity, 64 * 1024);
        assert!(config.process_timeout.is_none());
    }

    #[test]
    fn test_builder_methods_override_defaults() {
        let config = DispatchConfig::default()
            .with_limit(ConcurrencyLimit::new(2).unwrap())
            .with_stderr(StderrMode::Discard)
            .with_pipe_capacity(512)
            .with_process_timeout(Duration::from_secs(3));
        assert_eq!(config.limit.get(), 2);
        assert_eq!(config.stderr, StderrMode::Discard);
        assert_eq!(config.pipe_capacity, 512);
        assert_eq!(config.process_timeout, Some(Duration::from_secs(3)));
    }
}

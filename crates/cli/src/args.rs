//! Command-line arguments.
//!
//! Every shared flag can also be set through a `FANOUT_*` environment
//! variable; the flag wins when both are present.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use executor::{DispatchConfig, StderrMode, DEFAULT_PIPE_CAPACITY};
use fanout::ConcurrencyLimit;

#[derive(Debug, Parser)]
#[command(name = "fanout")]
#[command(about = "Run one subprocess per work item, at most K at a time, and collect their output")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Mode,

    #[command(flatten)]
    pub dispatch: DispatchArgs,

    #[command(flatten)]
    pub logging: LoggingArgs,
}

#[derive(Debug, Subcommand)]
pub enum Mode {
    /// Collect `git ls-tree -r` for every commit in a repository
    GitTrees {
        /// Repository to inspect (defaults to the current directory)
        #[arg(long)]
        repo: Option<PathBuf>,
    },

    /// Run a command template once per input line
    ///
    /// `{}` in any argument is replaced by the work item; without a `{}` the
    /// item is appended as the last argument.
    Run {
        /// File with one work item per line; `-` reads stdin
        #[arg(long, default_value = "-")]
        items: String,

        /// Program followed by its arguments
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StderrArg {
    /// Send stderr to the null device
    Discard,
    /// Attach stderr to each record
    Capture,
    /// Pass stderr through to this process's stderr
    Inherit,
}

impl From<StderrArg> for StderrMode {
    fn from(value: StderrArg) -> Self {
        match value {
            StderrArg::Discard => StderrMode::Discard,
            StderrArg::Capture => StderrMode::Capture,
            StderrArg::Inherit => StderrMode::Inherit,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// One line per item plus a summary
    Text,
    /// JSON array of records
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Args)]
pub struct DispatchArgs {
    /// Maximum number of processes running at the same time
    #[arg(long, short = 'k', global = true, env = "FANOUT_LIMIT", default_value_t = ConcurrencyLimit::DEFAULT.get())]
    pub limit: usize,

    /// What to do with each process's stderr
    #[arg(long, global = true, value_enum, env = "FANOUT_STDERR", default_value = "capture")]
    pub stderr: StderrArg,

    /// Kill processes still running after this many seconds
    #[arg(long, global = true, env = "FANOUT_TIMEOUT_SECS")]
    pub timeout_secs: Option<u64>,

    /// Per-item pipe buffer in bytes
    #[arg(long, global = true, env = "FANOUT_PIPE_CAPACITY", default_value_t = DEFAULT_PIPE_CAPACITY)]
    pub pipe_capacity: usize,

    /// Result format on stdout
    #[arg(long, global = true, value_enum, env = "FANOUT_OUTPUT", default_value = "text")]
    pub output: OutputFormat,

    /// Also print the output of the first successful item
    #[arg(long, global = true)]
    pub print_sample: bool,
}

#[derive(Debug, Args)]
pub struct LoggingArgs {
    /// Log filter (e.g. `info`, `executor=debug`); `RUST_LOG` takes precedence
    #[arg(long, global = true, env = "FANOUT_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log line format on stderr
    #[arg(long, global = true, value_enum, env = "FANOUT_LOG_FORMAT", default_value = "pretty")]
    pub log_format: LogFormat,
}

impl DispatchArgs {
    /// Validates the flags and builds the executor configuration.
    pub fn to_config(&self) -> anyhow::Result<DispatchConfig> {
        let limit = ConcurrencyLimit::new(self.limit).context("invalid --limit")?;
        let mut config = DispatchConfig::default()
            .with_limit(limit)
            .with_stderr(self.stderr.into())
            .with_pipe_capacity(self.pipe_capacity);
        if let Some(secs) = self.timeout_secs {
            config = config.with_process_timeout(Duration::from_secs(secs));
        }
        Ok(config)
    }
}

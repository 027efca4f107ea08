//! Tracing subscriber wiring.
//!
//! Logs always go to stderr so that stdout carries only dispatch results.

use anyhow::Context;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::args::{LogFormat, LoggingArgs};

/// Builds the filter: `RUST_LOG` when set, otherwise `--log-level`.
pub fn env_filter(args: &LoggingArgs) -> anyhow::Result<EnvFilter> {
    match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(directives) if !directives.trim().is_empty() => {
            EnvFilter::try_new(&directives).context("invalid RUST_LOG")
        }
        _ => EnvFilter::try_new(&args.log_level).context("invalid --log-level"),
    }
}

/// Installs the global subscriber. Call once, before the first span.
pub fn init(args: &LoggingArgs) -> anyhow::Result<()> {
    let filter = env_filter(args)?;
    let registry = tracing_subscriber::registry().with(filter);

    match args.log_format {
        LogFormat::Pretty => registry
            .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
            .try_init(),
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_current_span(true),
            )
            .try_init(),
    }
    .context("failed to install tracing subscriber")
}

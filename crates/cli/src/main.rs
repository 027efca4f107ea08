//! Fanout CLI entry point.
//!
//! This binary is the composition root. Responsibilities:
//!
//! 1. **Parse configuration**: read flags and their `FANOUT_*` environment
//!    fallbacks, and validate them into an [`executor::DispatchConfig`].
//! 2. **Wire observability**: install a `tracing-subscriber` registry writing
//!    text or JSON lines to stderr. Spans and events from every crate in the
//!    workspace flow through it.
//! 3. **Select mode**: pair a [`fanout::WorkItemSource`] with a
//!    [`fanout::CommandBuilder`]:
//!    - `git-trees`: every commit from `git log --all`, each listed with
//!      `git ls-tree -r`.
//!    - `run`: items read line by line from a file or stdin, each substituted
//!      into a [`fanout::CommandTemplate`].
//! 4. **Dispatch and report**: run the dispatch, print records in submission
//!    order, and map the outcome to the process exit code.
//!
//! ## Exit codes
//!
//! | Code | Meaning                                         |
//! |------|-------------------------------------------------|
//! | 0    | every item succeeded                            |
//! | 1    | at least one item failed                        |
//! | 2    | invalid configuration or dispatch-level failure |

mod args;
mod logging;
mod output;

use std::io::Write;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use executor::{Dispatcher, GitCommitSource, LineSource};
use fanout::{CommandTemplate, DispatchReport, GitLsTree, WorkItemSource};
use tracing::{error, info};

use crate::args::{Cli, Mode};

const EXIT_SUCCESS: u8 = 0;
const EXIT_ITEM_FAILED: u8 = 1;
const EXIT_DISPATCH_FAILED: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = logging::init(&cli.logging) {
        eprintln!("fanout: {e:#}");
        return ExitCode::from(EXIT_DISPATCH_FAILED);
    }

    let result = run(cli).await;
    match &result {
        Ok(report) if !report.all_succeeded() => {
            info!(failed = report.summary.failed, "some items failed");
        }
        Ok(_) => {}
        Err(e) => {
            error!(error = %format!("{e:#}"), "dispatch failed");
            eprintln!("fanout: {e:#}");
        }
    }
    ExitCode::from(exit_status(&result))
}

/// Maps the outcome of [`run`] to the process exit status.
fn exit_status(result: &anyhow::Result<DispatchReport>) -> u8 {
    match result {
        Ok(report) if report.all_succeeded() => EXIT_SUCCESS,
        Ok(_) => EXIT_ITEM_FAILED,
        Err(_) => EXIT_DISPATCH_FAILED,
    }
}

async fn run(cli: Cli) -> anyhow::Result<DispatchReport> {
    let config = cli.dispatch.to_config()?;

    let (source, dispatcher): (Box<dyn WorkItemSource>, Dispatcher) = match cli.command {
        Mode::GitTrees { repo } => match repo {
            Some(repo) => (
                Box::new(GitCommitSource::in_repo(&repo)),
                Dispatcher::new(config, GitLsTree::in_repo(repo)),
            ),
            None => (
                Box::new(GitCommitSource::new()),
                Dispatcher::new(config, GitLsTree::new()),
            ),
        },
        Mode::Run { items, command } => {
            let source = if items == "-" {
                LineSource::stdin()
            } else {
                LineSource::file(items)
            };
            let (program, args) = command
                .split_first()
                .context("run needs a program to execute")?;
            let template = CommandTemplate::new(program.clone(), args.to_vec())
                .context("program name must not be empty")?;
            (Box::new(source), Dispatcher::new(config, template))
        }
    };

    info!(
        source = %source.describe(),
        limit = %dispatcher.config().limit,
        "starting fanout"
    );

    let mut report = dispatcher
        .dispatch_from(source.as_ref())
        .await
        .context("dispatch failed")?;
    report.sort_by_submission();

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    output::render(&mut out, &report, cli.dispatch.output, cli.dispatch.print_sample)
        .context("failed to write results")?;
    out.flush().context("failed to write results")?;

    Ok(report)
}

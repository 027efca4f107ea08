//! Built-in [`WorkItemSource`] implementations that need I/O.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use fanout::{SourceError, WorkItem, WorkItemSource};
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::debug;

/// Every commit reachable from any ref: `git log --all --pretty=%H`.
#[derive(Debug, Clone, Default)]
pub struct GitCommitSource {
    repo: Option<PathBuf>,
}

impl GitCommitSource {
    /// Lists commits of the repository containing the current directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Lists commits of the repository at `repo`.
    pub fn in_repo(repo: impl Into<PathBuf>) -> Self {
        Self {
            repo: Some(repo.into()),
        }
    }

    fn command_line(&self) -> String {
        match &self.repo {
            Some(repo) => format!("git -C {} log --all --pretty=%H", repo.display()),
            None => "git log --all --pretty=%H".to_string(),
        }
    }
}

#[async_trait]
impl WorkItemSource for GitCommitSource {
    async fn work_items(&self) -> Result<Vec<WorkItem>, SourceError> {
        let mut cmd = Command::new("git");
        if let Some(repo) = &self.repo {
            cmd.arg("-C").arg(repo);
        }
        cmd.args(["log", "--all", "--pretty=%H"])
            .stdin(Stdio::null())
            .kill_on_drop(true);

        // `output` drains stdout and stderr concurrently before waiting.
        let output = cmd.output().await.map_err(|e| SourceError::Command {
            command: self.command_line(),
            message: e.to_string(),
        })?;

        if !output.status.success() {
            return Err(SourceError::Command {
                command: self.command_line(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let items = parse_lines(&String::from_utf8_lossy(&output.stdout));
        debug!(commits = items.len(), "listed commits");
        Ok(items)
    }

    fn describe(&self) -> String {
        self.command_line()
    }
}

/// Where a [`LineSource`] reads from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineInput {
    Stdin,
    File(PathBuf),
}

/// Newline-separated work items, one per non-blank line.
#[derive(Debug, Clone)]
pub struct LineSource {
    input: LineInput,
}

impl LineSource {
    pub fn new(input: LineInput) -> Self {
        Self { input }
    }

    pub fn stdin() -> Self {
        Self::new(LineInput::Stdin)
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::new(LineInput::File(path.into()))
    }
}

#[async_trait]
impl WorkItemSource for LineSource {
    async fn work_items(&self) -> Result<Vec<WorkItem>, SourceError> {
        let text = match &self.input {
            LineInput::Stdin => {
                let mut text = String::new();
                tokio::io::stdin()
                    .read_to_string(&mut text)
                    .await
                    .map_err(|source| SourceError::Io {
                        origin: self.describe(),
                        source,
                    })?;
                text
            }
            LineInput::File(path) => {
                tokio::fs::read_to_string(path)
                    .await
                    .map_err(|source| SourceError::Io {
                        origin: self.describe(),
                        source,
                    })?
            }
        };
        Ok(parse_lines(&text))
    }

    fn describe(&self) -> String {
        match &self.input {
            LineInput::Stdin => "stdin".to_string(),
            LineInput::File(path) => path.display().to_string(),
        }
    }
}

/// One item per line; surrounding whitespace trimmed, blank lines skipped.
fn parse_lines(text: &str) -> Vec<WorkItem> {
    text.lines().filter_map(|l| WorkItem::new(l.trim())).collect()
}

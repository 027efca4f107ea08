//! Built-in [`CommandBuilder`] implementations.

use std::path::PathBuf;

use crate::{CommandBuilder, CommandSpec, WorkItem};

/// Placeholder replaced by the work item in [`CommandTemplate`] arguments.
pub const ITEM_PLACEHOLDER: &str = "{}";

/// A fixed program and argument list with the work item substituted in.
///
/// Every occurrence of `{}` in an argument is replaced by the work item. If
/// no argument contains the placeholder, the item is appended as the last
/// argument (the same convention as `xargs`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    program: String,
    args: Vec<String>,
}

impl CommandTemplate {
    /// Creates a template, returning `None` if `program` is empty.
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Option<Self> {
        let program = program.into();
        if program.is_empty() {
            return None;
        }
        Some(Self { program, args })
    }

    fn has_placeholder(&self) -> bool {
        self.args.iter().any(|a| a.contains(ITEM_PLACEHOLDER))
    }
}

impl CommandBuilder for CommandTemplate {
    fn build(&self, item: &WorkItem) -> CommandSpec {
        let spec = CommandSpec::from_parts(self.program.clone());
        if self.has_placeholder() {
            spec.args(
                self.args
                    .iter()
                    .map(|a| a.replace(ITEM_PLACEHOLDER, item.as_str())),
            )
        } else {
            spec.args(self.args.iter().cloned()).arg(item.as_str())
        }
    }
}

/// Lists every file in a commit's tree: `git ls-tree -r <commit>`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GitLsTree {
    repo: Option<PathBuf>,
}

impl GitLsTree {
    /// Runs against the repository containing the current directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs against the repository at `repo` (passed as `git -C <repo>`).
    pub fn in_repo(repo: impl Into<PathBuf>) -> Self {
        Self {
            repo: Some(repo.into()),
        }
    }
}

impl CommandBuilder for GitLsTree {
    fn build(&self, item: &WorkItem) -> CommandSpec {
        let spec = CommandSpec::from_parts("git".to_string());
        let spec = match &self.repo {
            Some(repo) => spec.arg("-C").arg(repo.to_string_lossy()),
            None => spec,
        };
        spec.args(["ls-tree", "-r"]).arg(item.as_str())
    }
}

//! Port traits for the dispatcher's external collaborators.
//!
//! The executor needs two things from the outside world: an ordered list of
//! work items and a way to turn each one into a command line. Neither is
//! interpreted by the executor; both are supplied through these traits.

use async_trait::async_trait;

use crate::{CommandSpec, SourceError, WorkItem};

/// Produces the ordered work-item list for one dispatch.
///
/// Only the length and iteration order of the result matter to the
/// dispatcher; where the items come from is the implementation's business.
#[async_trait]
pub trait WorkItemSource: Send + Sync {
    /// Returns every work item, in submission order.
    async fn work_items(&self) -> Result<Vec<WorkItem>, SourceError>;

    /// Short human-readable description, used in log fields.
    fn describe(&self) -> String;
}

/// Maps a work item to the command that processes it.
///
/// Must be pure: the same item always yields the same command. Any closure
/// `Fn(&WorkItem) -> CommandSpec` implements this trait.
pub trait CommandBuilder: Send + Sync {
    fn build(&self, item: &WorkItem) -> CommandSpec;
}

impl<F> CommandBuilder for F
where
    F: Fn(&WorkItem) -> CommandSpec + Send + Sync,
{
    fn build(&self, item: &WorkItem) -> CommandSpec {
        self(item)
    }
}

/// An in-memory work-item list.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    items: Vec<WorkItem>,
}

impl StaticSource {
    pub fn new(items: Vec<WorkItem>) -> Self {
        Self { items }
    }
}

#[async_trait]
impl WorkItemSource for StaticSource {
    async fn work_items(&self) -> Result<Vec<WorkItem>, SourceError> {
        Ok(self.items.clone())
    }

    fn describe(&self) -> String {
        format!("{} static items", self.items.len())
    }
}

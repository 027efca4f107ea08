//! Core domain for fanout.
//!
//! fanout runs one external subprocess per work item, at most K at a time,
//! and collects every byte each subprocess writes to stdout. This crate holds
//! the domain concepts shared by the executor and its callers: identifiers,
//! value types, error types, and the port traits through which work items and
//! command lines are supplied.
//!
//! ## Architectural Layer
//!
//! **Domain + port definitions.** This crate has no I/O dependencies.
//! It defines *what* is run; the `executor` crate defines *how*.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`WorkItem`, `DispatchId`) |
//! | [`types`] | Value types (`CommandSpec`, `ConcurrencyLimit`, `OutputRecord`, etc.) |
//! | [`errors`] | Per-item and per-dispatch error types |
//! | [`ports`] | `WorkItemSource` and `CommandBuilder` traits |
//! | [`builders`] | Built-in command builders (`CommandTemplate`, `GitLsTree`) |

pub mod builders;
pub mod errors;
pub mod identifiers;
pub mod ports;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use builders::{CommandTemplate, GitLsTree, ITEM_PLACEHOLDER};
pub use errors::{DispatchError, ExecutionError, SourceError};
pub use identifiers::{DispatchId, WorkItem};
pub use ports::{CommandBuilder, StaticSource, WorkItemSource};
pub use types::{
    CommandSpec, ConcurrencyLimit, DispatchReport, DispatchSummary, OutputRecord, Timestamp,
};

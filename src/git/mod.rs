//! The repository metadata engine
//!
//! Everything here is a stateless transform over one repository's on-disk
//! state, reached through subprocess calls to the `git` CLI:
//! - [`GitRunner`] - bounded-concurrency subcommand execution
//! - [`RepoSession`] - explicit per-repository handle
//! - [`branches`] - branch enumeration (basic/full fidelity)
//! - [`graph`] - lane-assigned commit history
//! - [`tree`] - merge tree of completed work
//! - [`mailmap`] - identity resolution and alias suggestions
//! - [`stats`] - bucketed contributor statistics
//! - [`pr`] - pull request listing via `gh`

pub mod branches;
pub mod graph;
pub mod mailmap;
pub mod pr;
pub mod runner;
pub mod session;
pub mod stats;
pub mod tree;

pub use mailmap::{AuthorIdentity, Mailmap, MailmapEntry};
pub use runner::GitRunner;
pub use session::RepoSession;

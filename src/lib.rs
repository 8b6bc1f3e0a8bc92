//! Gitscope - a repository metadata and history-graph engine
//!
//! Turns raw git history (read by invoking the `git` CLI as a subprocess)
//! into structured entities for a branch-browsing UI: branch listings with
//! ahead/behind counts, a lane-assigned commit graph, a merge tree of
//! completed work, and bucketed contributor statistics with mailmap-based
//! identity resolution.
//!
//! # Design
//!
//! Every operation is a stateless transform of an explicit [`RepoSession`]
//! plus the repository's on-disk state, so calls are idempotent and safely
//! retryable. Subprocess count dominates wall-clock time, so each read has
//! a fast path with a fixed number of calls and, where needed, a slow
//! refinement path whose per-item calls run through a bounded runner and
//! accept cancellation.
//!
//! # Modules
//!
//! - [`git`] - the engine: runner, session, branches, graph, tree,
//!   mailmap, stats, PRs
//! - [`config`] - layered configuration via figment
//! - [`error`] - error types

pub mod config;
pub mod error;
pub mod git;

pub use config::Config;
pub use error::{Error, Result};
pub use git::{GitRunner, RepoSession};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

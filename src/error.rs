//! Error types for gitscope
//!
//! Uses `thiserror` for ergonomic error definitions with automatic `Display` and `Error` impls.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Top-level error type for gitscope
#[derive(Error, Debug)]
pub enum Error {
    #[error("Git error: {0}")]
    Vcs(#[from] VcsError),

    #[error("Mailmap error: {0}")]
    Mailmap(#[from] MailmapError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The caller cancelled a long-running aggregation. In-flight subprocess
    /// calls may have completed but their results were discarded.
    #[error("Operation cancelled")]
    Cancelled,
}

/// Errors from running git subcommands and parsing their output
#[derive(Error, Debug)]
pub enum VcsError {
    #[error("Not a git repository: {0}")]
    NotARepository(PathBuf),

    #[error("Git command failed: {command} (exit code {exit_code:?}) - {stderr}")]
    CommandFailed {
        command: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("Git command timed out after {0:?}")]
    Timeout(Duration),

    /// Unexpected output shape. Always fatal for the call that hit it,
    /// since downstream parsing cannot safely guess structure.
    #[error("Malformed git output while parsing {context}: {line:?}")]
    MalformedOutput { context: String, line: String },

    /// A per-item (per-branch, per-commit) refinement failed. Callers
    /// degrade that item's optional fields instead of aborting the batch.
    #[error("Metadata for {item} unavailable: {source}")]
    PartialMetadata {
        item: String,
        #[source]
        source: Box<VcsError>,
    },

    #[error("Git is not installed or not in PATH")]
    NotInstalled,

    #[error("Semaphore acquire failed")]
    SemaphoreError,
}

impl VcsError {
    /// Shorthand for a [`VcsError::MalformedOutput`] with an owned context.
    pub fn malformed(context: &str, line: &str) -> Self {
        VcsError::MalformedOutput {
            context: context.to_string(),
            line: line.to_string(),
        }
    }

    /// Wrap this error as a per-item metadata failure for `item`.
    pub fn for_item(self, item: &str) -> Self {
        VcsError::PartialMetadata {
            item: item.to_string(),
            source: Box::new(self),
        }
    }
}

/// Mailmap store errors
#[derive(Error, Debug)]
pub enum MailmapError {
    #[error("Failed to read mailmap at {path}: {reason}")]
    ReadFailed { path: PathBuf, reason: String },

    #[error("Failed to write mailmap at {path}: {reason}")]
    WriteFailed { path: PathBuf, reason: String },

    #[error("Invalid mailmap line {line_number}: {line:?}")]
    InvalidLine { line_number: usize, line: String },
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("Failed to save configuration: {0}")]
    SaveFailed(String),

    #[error("Failed to create config directory: {0}")]
    DirectoryCreationFailed(PathBuf),
}

/// Result type alias using our error type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = VcsError::NotARepository(PathBuf::from("/tmp/foo"));
        assert!(err.to_string().contains("/tmp/foo"));

        let err = VcsError::CommandFailed {
            command: "git rev-parse HEAD".to_string(),
            exit_code: Some(128),
            stderr: "fatal: bad revision".to_string(),
        };
        assert!(err.to_string().contains("128"));
        assert!(err.to_string().contains("bad revision"));

        let err = VcsError::Timeout(Duration::from_secs(10));
        assert!(err.to_string().contains("timed out"));
    }

    #[test]
    fn test_error_conversion() {
        let vcs_err = VcsError::NotInstalled;
        let _top_err: Error = vcs_err.into();

        let mailmap_err = MailmapError::InvalidLine {
            line_number: 3,
            line: "<<<".to_string(),
        };
        let _top_err: Error = mailmap_err.into();
    }

    #[test]
    fn test_partial_metadata_wraps_cause() {
        let cause = VcsError::Timeout(Duration::from_secs(5));
        let err = cause.for_item("feature/x");
        let msg = err.to_string();
        assert!(msg.contains("feature/x"));
        assert!(msg.contains("timed out"));
    }

    #[test]
    fn test_malformed_shorthand() {
        let err = VcsError::malformed("for-each-ref", "garbage line");
        assert!(err.to_string().contains("for-each-ref"));
        assert!(err.to_string().contains("garbage line"));
    }
}

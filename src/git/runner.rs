//! Async git command runner with semaphore-controlled concurrency
//!
//! Provides non-blocking git subcommand execution with:
//! - Semaphore to limit concurrent subprocesses (default: 6)
//! - Per-call timeout handling
//! - Typed failures instead of panics for nonzero exits
//!
//! Git serializes some operations on an internal lock, so every per-item
//! fan-out (branch metadata, per-commit stats) must go through one shared
//! runner rather than spawning unbounded subprocesses.

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::process::Command;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{debug, instrument, warn};

use crate::error::VcsError;

/// Default maximum concurrent git subprocesses
pub const DEFAULT_MAX_CONCURRENT: usize = 6;

/// Default per-call timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Async git command runner
///
/// Uses a semaphore to bound concurrent git subprocesses, preventing lock
/// contention inside git and fork/exec storms on large repositories.
#[derive(Clone)]
pub struct GitRunner {
    /// Semaphore for concurrency control
    semaphore: Arc<Semaphore>,
    /// Per-call timeout
    timeout: Duration,
    /// Maximum permits, kept for callers sizing ordered fan-outs
    max_concurrent: usize,
}

impl GitRunner {
    /// Create a new runner with default settings
    pub fn new() -> Self {
        Self::with_max_concurrent(DEFAULT_MAX_CONCURRENT)
    }

    /// Create a runner with a custom concurrency limit
    pub fn with_max_concurrent(max_concurrent: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            timeout: DEFAULT_TIMEOUT,
            max_concurrent,
        }
    }

    /// Set the per-call timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Maximum number of concurrent subprocesses this runner allows
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Check if git is installed and accessible
    pub async fn check_installed(&self) -> Result<(), VcsError> {
        let output = Command::new("git")
            .arg("--version")
            .output()
            .await
            .map_err(|_| VcsError::NotInstalled)?;

        if output.status.success() {
            let version = String::from_utf8_lossy(&output.stdout);
            debug!("git version: {}", version.trim());
            Ok(())
        } else {
            Err(VcsError::NotInstalled)
        }
    }

    /// Execute a git subcommand in `cwd` and return its stdout.
    ///
    /// Nonzero exit is a [`VcsError::CommandFailed`], never a panic.
    /// `fatal: not a git repository` in stderr maps to
    /// [`VcsError::NotARepository`] so callers can fail fast.
    #[instrument(skip(self, cwd), fields(args = ?args))]
    pub async fn run(&self, cwd: &Path, args: &[&str]) -> Result<String, VcsError> {
        // Acquire semaphore permit
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| VcsError::SemaphoreError)?;

        let mut cmd = Command::new("git");
        cmd.current_dir(cwd)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // A timed-out call drops the output future; the child must not
            // outlive it.
            .kill_on_drop(true);

        let result = timeout(self.timeout, cmd.output()).await;

        match result {
            Ok(Ok(output)) => {
                if output.status.success() {
                    Ok(String::from_utf8_lossy(&output.stdout).to_string())
                } else {
                    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
                    if stderr.contains("not a git repository") {
                        return Err(VcsError::NotARepository(cwd.to_path_buf()));
                    }
                    Err(VcsError::CommandFailed {
                        command: format!("git {}", args.join(" ")),
                        exit_code: output.status.code(),
                        stderr,
                    })
                }
            }
            Ok(Err(e)) => {
                warn!("git command failed to spawn: {}", e);
                Err(VcsError::CommandFailed {
                    command: format!("git {}", args.join(" ")),
                    exit_code: None,
                    stderr: e.to_string(),
                })
            }
            Err(_) => Err(VcsError::Timeout(self.timeout)),
        }
    }
}

impl Default for GitRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_runner_creation() {
        let runner = GitRunner::new();
        assert_eq!(runner.timeout, DEFAULT_TIMEOUT);
        assert_eq!(runner.max_concurrent(), DEFAULT_MAX_CONCURRENT);
    }

    #[tokio::test]
    async fn test_runner_with_custom_settings() {
        let runner = GitRunner::with_max_concurrent(8).with_timeout(Duration::from_secs(30));

        assert_eq!(runner.timeout, Duration::from_secs(30));
        assert_eq!(runner.max_concurrent(), 8);
    }

    #[tokio::test]
    async fn test_run_times_out() {
        // An immediate deadline always elapses before the subprocess can
        // report back; the call must surface a typed timeout and reap the
        // child rather than hang.
        let runner = GitRunner::new().with_timeout(Duration::from_millis(0));
        let tmp = std::env::temp_dir();

        match runner.run(&tmp, &["--version"]).await {
            Err(VcsError::Timeout(_)) => {}
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_run_outside_repository() {
        let runner = GitRunner::new();
        let tmp = std::env::temp_dir();

        // `git rev-parse` outside any repository must produce a typed error,
        // not a panic. Tolerate NotARepository or CommandFailed depending on
        // whether temp_dir happens to sit under a repository.
        match runner.run(&tmp, &["rev-parse", "--is-inside-work-tree"]).await {
            Ok(_) => {}
            Err(VcsError::NotARepository(_)) | Err(VcsError::CommandFailed { .. }) => {}
            Err(e) => panic!("unexpected error: {}", e),
        }
    }
}

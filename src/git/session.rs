//! Repository session handle
//!
//! Every read operation takes an explicit [`RepoSession`] instead of any
//! process-global "current repository" state. A session is cheap to clone
//! and holds no handles beyond the path and the shared runner, so each
//! operation stays a pure function of its inputs plus on-disk repo state.

use std::path::{Path, PathBuf};

use tracing::{debug, instrument};

use super::GitRunner;
use crate::error::{Result, VcsError};

/// Handle to one repository plus the runner used for all its subcommands
#[derive(Clone)]
pub struct RepoSession {
    /// Working directory of the repository
    path: PathBuf,
    /// Shared command runner
    runner: GitRunner,
}

impl RepoSession {
    /// Open a session, verifying that `path` is inside a git work tree.
    ///
    /// This is the one fatal check: no repository means no data for any
    /// downstream operation.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub async fn open(path: impl AsRef<Path>, runner: GitRunner) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let out = runner
            .run(&path, &["rev-parse", "--is-inside-work-tree"])
            .await
            .map_err(|e| match e {
                VcsError::CommandFailed { .. } => VcsError::NotARepository(path.clone()),
                other => other,
            })?;

        if out.trim() != "true" {
            return Err(VcsError::NotARepository(path).into());
        }

        debug!("Opened repository session at {:?}", path);

        Ok(Self { path, runner })
    }

    /// Repository working directory
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The shared command runner
    pub fn runner(&self) -> &GitRunner {
        &self.runner
    }

    /// Run a git subcommand in this repository
    pub async fn run(&self, args: &[&str]) -> std::result::Result<String, VcsError> {
        self.runner.run(&self.path, args).await
    }

    /// Get the current branch name, or `None` on detached HEAD.
    ///
    /// Detached HEAD is an ordinary state for this engine, not an error;
    /// it simply means no branch is `current` in a listing. An unborn
    /// branch (fresh `git init`, no commits yet) still has a name and is
    /// reported as current.
    pub async fn current_branch(&self) -> Result<Option<String>> {
        match self.run(&["symbolic-ref", "--short", "-q", "HEAD"]).await {
            Ok(out) => {
                let name = out.trim();
                if name.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(name.to_string()))
                }
            }
            // Detached HEAD: HEAD is not a symbolic ref
            Err(VcsError::CommandFailed { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Detect the main branch: `origin/HEAD` symref, then `main`, then
    /// `master`, falling back to the current branch.
    pub async fn main_branch(&self) -> Result<String> {
        if let Ok(out) = self
            .run(&["symbolic-ref", "--short", "refs/remotes/origin/HEAD"])
            .await
        {
            // Output like "origin/main"
            if let Some(name) = out.trim().strip_prefix("origin/") {
                if !name.is_empty() {
                    return Ok(name.to_string());
                }
            }
        }

        for candidate in ["main", "master"] {
            let refname = format!("refs/heads/{}", candidate);
            if self.run(&["show-ref", "--verify", "--quiet", &refname]).await.is_ok() {
                return Ok(candidate.to_string());
            }
        }

        match self.current_branch().await? {
            Some(name) => Ok(name),
            None => Err(VcsError::malformed("main branch detection", "detached HEAD with no main/master").into()),
        }
    }

    /// Repository name (directory name)
    pub fn repo_name(&self) -> String {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string()
    }
}

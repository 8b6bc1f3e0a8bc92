//! Pull request listing via the `gh` CLI
//!
//! Consumed only by UI/CLI composition, never by the graph or stats logic.
//! All failures are silently swallowed - missing `gh`, auth errors, network
//! issues, or repos without a GitHub remote simply result in an empty list.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::debug;

/// One pull request as reported by `gh pr list`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequest {
    pub number: u64,
    pub title: String,
    /// Branch the PR was opened from
    pub head_ref_name: String,
    pub url: String,
    pub state: String,
}

/// Returns `true` if the `gh` CLI is installed and runnable.
///
/// Called once at startup to avoid repeated fork/exec per refresh.
pub async fn is_gh_available() -> bool {
    match Command::new("gh").arg("--version").output().await {
        Ok(output) => {
            let ok = output.status.success();
            debug!("gh --version: available={}", ok);
            ok
        }
        Err(e) => {
            debug!("gh not available: {}", e);
            false
        }
    }
}

/// List open pull requests for the repo at `repo_path`.
///
/// Returns an empty list on any failure (gh missing, not authed, network
/// error, not a GitHub repo).
pub async fn list_pull_requests(repo_path: &Path) -> Vec<PullRequest> {
    let output = match Command::new("gh")
        .args([
            "pr",
            "list",
            "--state",
            "open",
            "--json",
            "number,title,headRefName,url,state",
            "--limit",
            "100",
        ])
        .current_dir(repo_path)
        .output()
        .await
    {
        Ok(output) => output,
        Err(e) => {
            debug!("gh pr list failed to spawn: {}", e);
            return Vec::new();
        }
    };

    if !output.status.success() {
        debug!(
            "gh pr list failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        return Vec::new();
    }

    let json = String::from_utf8_lossy(&output.stdout);
    parse_pr_list(&json)
}

/// Parse the JSON array returned by `gh pr list --json`.
fn parse_pr_list(json: &str) -> Vec<PullRequest> {
    match serde_json::from_str::<Vec<PullRequest>>(json.trim()) {
        Ok(prs) => prs,
        Err(e) => {
            debug!("Could not parse gh pr list output: {}", e);
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pr_list_valid() {
        let json = r#"[
          {"number":42,"title":"Fix login","headRefName":"fix/login-bug","url":"https://github.com/o/r/pull/42","state":"OPEN"},
          {"number":43,"title":"Add docs","headRefName":"docs/setup","url":"https://github.com/o/r/pull/43","state":"OPEN"}
        ]"#;
        let prs = parse_pr_list(json);
        assert_eq!(prs.len(), 2);
        assert_eq!(prs[0].number, 42);
        assert_eq!(prs[0].head_ref_name, "fix/login-bug");
        assert_eq!(prs[1].title, "Add docs");
    }

    #[test]
    fn test_parse_pr_list_empty_array() {
        assert!(parse_pr_list("[]").is_empty());
    }

    #[test]
    fn test_parse_pr_list_garbage() {
        assert!(parse_pr_list("not json at all").is_empty());
        assert!(parse_pr_list("").is_empty());
    }
}

//! Commit history retrieval and lane-assigned graph layout
//!
//! Retrieves a topologically-ordered commit window in a single `git log`
//! call, optionally enriches each commit with diff stats (one bounded
//! subprocess call per commit), and assigns visual lanes so a renderer can
//! draw the graph without recomputing topology.
//!
//! Lane assignment is deterministic: identical input commit lists always
//! produce identical lane and color indices.

use chrono::{DateTime, FixedOffset};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use super::RepoSession;
use super::branches::parse_iso_date;
use crate::error::{Error, Result, VcsError};

/// Field separator used in the log record format (ASCII unit separator)
const FIELD_SEP: char = '\u{1f}';

/// One-line-per-commit record: hash, parents, author name/email, author
/// date, subject.
pub(crate) const LOG_FORMAT: &str = "--format=%H%x1f%P%x1f%an%x1f%ae%x1f%aI%x1f%s";

/// Per-commit diff stats
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitStats {
    pub additions: usize,
    pub deletions: usize,
    pub files_changed: usize,
}

/// One commit as read from history
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Commit {
    pub hash: String,
    /// Parent hashes in order; first parent is the mainline parent
    pub parents: Vec<String>,
    pub author_name: String,
    pub author_email: String,
    pub date: DateTime<FixedOffset>,
    pub message: String,
    /// Omitted when the caller skips stats for performance, or when the
    /// per-commit stat call failed for this commit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<CommitStats>,
}

/// A commit plus its layout assignment
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphCommit {
    #[serde(flatten)]
    pub commit: Commit,
    /// Visual column index
    pub lane: usize,
    /// Branch-color key; commits on one lane chain share a color
    pub color: usize,
}

/// Parse the `git log` record stream into commits.
pub(crate) fn parse_history(out: &str) -> std::result::Result<Vec<Commit>, VcsError> {
    let mut commits = Vec::new();

    for line in out.lines().filter(|l| !l.is_empty()) {
        let fields: Vec<&str> = line.split(FIELD_SEP).collect();
        if fields.len() != 6 {
            return Err(VcsError::malformed("log record", line));
        }

        let date = parse_iso_date(fields[4])
            .ok_or_else(|| VcsError::malformed("log record date", line))?;

        commits.push(Commit {
            hash: fields[0].to_string(),
            parents: fields[1].split_whitespace().map(String::from).collect(),
            author_name: fields[2].to_string(),
            author_email: fields[3].to_string(),
            date,
            message: fields[5].to_string(),
            stats: None,
        });
    }

    Ok(commits)
}

/// Parse a `--shortstat` summary line like
/// `2 files changed, 9 insertions(+), 6 deletions(-)`.
///
/// Insertions-only and deletions-only summaries omit the other clause;
/// missing clauses count as zero. An absent summary (empty diff) parses as
/// all zeros.
pub(crate) fn parse_shortstat(output: &str) -> CommitStats {
    let mut files_changed = 0;
    let mut additions = 0;
    let mut deletions = 0;

    for line in output.lines() {
        if line.contains("changed") {
            for part in line.split(',') {
                let part = part.trim();
                if part.contains("file") {
                    if let Some(num) = part.split_whitespace().next() {
                        files_changed = num.parse().unwrap_or(0);
                    }
                } else if part.contains("insertion") {
                    if let Some(num) = part.split_whitespace().next() {
                        additions = num.parse().unwrap_or(0);
                    }
                } else if part.contains("deletion") {
                    if let Some(num) = part.split_whitespace().next() {
                        deletions = num.parse().unwrap_or(0);
                    }
                }
            }
            break;
        }
    }

    CommitStats {
        additions,
        deletions,
        files_changed,
    }
}

/// An active lane waiting for a specific commit to appear
struct LaneSlot {
    waiting_for: String,
    color: usize,
}

fn first_free(lanes: &mut Vec<Option<LaneSlot>>) -> usize {
    match lanes.iter().position(Option::is_none) {
        Some(i) => i,
        None => {
            lanes.push(None);
            lanes.len() - 1
        }
    }
}

/// Assign lanes to a newest-first commit list.
///
/// Each active lane holds the hash it is waiting for. A commit lands on the
/// first lane waiting for it (or a freshly allocated lane at the first free
/// index), the lane advances to the commit's first parent, and every
/// additional parent spawns a lane appended after the existing ones unless
/// some lane already waits for that parent. Sibling lanes waiting for the
/// placed commit close, and closed slots are reused, which bounds the lane
/// count to the graph's actual branching width.
pub fn assign_lanes(commits: &[Commit]) -> Vec<GraphCommit> {
    let mut lanes: Vec<Option<LaneSlot>> = Vec::new();
    let mut next_color = 0usize;
    let mut out = Vec::with_capacity(commits.len());

    for commit in commits {
        let found = lanes
            .iter()
            .position(|s| s.as_ref().is_some_and(|s| s.waiting_for == commit.hash));

        let (lane, color) = match found {
            Some(i) => {
                let color = lanes[i].as_ref().map(|s| s.color).unwrap_or(0);
                (i, color)
            }
            None => {
                let color = next_color;
                next_color += 1;
                let i = first_free(&mut lanes);
                lanes[i] = Some(LaneSlot {
                    waiting_for: commit.hash.clone(),
                    color,
                });
                (i, color)
            }
        };

        // A fork point: other lanes waiting for this commit join it here.
        for (i, slot) in lanes.iter_mut().enumerate() {
            if i != lane && slot.as_ref().is_some_and(|s| s.waiting_for == commit.hash) {
                *slot = None;
            }
        }

        // Advance along the first parent; root commits close their lane.
        match commit.parents.first() {
            Some(parent) => {
                lanes[lane] = Some(LaneSlot {
                    waiting_for: parent.clone(),
                    color,
                });
            }
            None => lanes[lane] = None,
        }

        // Extra parents of a merge spawn lanes after the existing ones.
        for parent in commit.parents.iter().skip(1) {
            let already_waited = lanes
                .iter()
                .any(|s| s.as_ref().is_some_and(|s| s.waiting_for == *parent));
            if !already_waited {
                let color = next_color;
                next_color += 1;
                lanes.push(Some(LaneSlot {
                    waiting_for: parent.clone(),
                    color,
                }));
            }
        }

        // Compact trailing closed lanes.
        while lanes.last().is_some_and(Option::is_none) {
            lanes.pop();
        }

        out.push(GraphCommit {
            commit: commit.clone(),
            lane,
            color,
        });
    }

    out
}

/// Retrieve the lane-assigned commit graph for `reference`.
///
/// One `git log` call for the window; with `skip_stats` false, one
/// additional bounded call per commit for diff stats. A failed stat call
/// degrades that commit's `stats` to `None`; the initial log call failing
/// is fatal.
#[instrument(skip(session, cancel), fields(repo = %session.repo_name()))]
pub async fn history(
    session: &RepoSession,
    reference: &str,
    limit: usize,
    skip_stats: bool,
    cancel: &CancellationToken,
) -> Result<Vec<GraphCommit>> {
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }

    let limit_arg = limit.to_string();
    let out = session
        .run(&[
            "log",
            "--topo-order",
            "--max-count",
            &limit_arg,
            LOG_FORMAT,
            reference,
            "--",
        ])
        .await?;

    let mut commits = parse_history(&out)?;
    debug!("Read {} commits from {}", commits.len(), reference);

    if !skip_stats {
        let width = session.runner().max_concurrent();
        let enrich = stream::iter(commits.into_iter().map(|c| attach_stats(session, c)))
            .buffered(width)
            .collect::<Vec<Commit>>();

        commits = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            enriched = enrich => enriched,
        };
    }

    Ok(assign_lanes(&commits))
}

/// Attach diff stats to one commit; failures degrade to `stats: None`.
async fn attach_stats(session: &RepoSession, mut commit: Commit) -> Commit {
    match session
        .run(&["show", "--shortstat", "--format=", &commit.hash])
        .await
    {
        Ok(out) => commit.stats = Some(parse_shortstat(&out)),
        Err(e) => debug!("{}", e.for_item(&commit.hash)),
    }
    commit
}

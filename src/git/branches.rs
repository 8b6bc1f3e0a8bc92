//! Branch enumeration in two fidelity levels
//!
//! - [`list_basic`] - names, merged flags and ref metadata from a fixed
//!   number of subprocess calls, independent of branch count. Fast path,
//!   used for first paint.
//! - [`list_full`] - per-branch ahead/behind counts, commit counts and
//!   first/last commit dates. O(branches) subprocess calls through the
//!   bounded runner; per-branch failures degrade that branch's optional
//!   fields instead of aborting the batch.
//!
//! Full results are a superset of basic results, in the same order, so a
//! caller can render the basic listing and merge the refinement in later.

use std::collections::HashSet;

use chrono::{DateTime, FixedOffset};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use super::RepoSession;
use crate::error::{Error, Result, VcsError};

/// Field separator used in ref enumeration formats (ASCII unit separator)
const FIELD_SEP: char = '\u{1f}';

/// Ref enumeration format: full refname, short name, tip hash, HEAD marker,
/// upstream short name.
const REF_FORMAT: &str = "--format=%(refname)%1f%(refname:short)%1f%(objectname)%1f%(HEAD)%1f%(upstream:short)";

/// One local or remote branch
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Branch {
    pub name: String,
    pub is_remote: bool,
    /// Local branch with no upstream tracking ref
    pub is_local_only: bool,
    pub is_merged: bool,
    pub is_current: bool,
    pub commit_hash: String,
    /// Upstream tracking branch, if any. Absent upstream is a different
    /// answer from zero ahead/behind, so this stays separate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_commit_date: Option<DateTime<FixedOffset>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_commit_date: Option<DateTime<FixedOffset>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ahead_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub behind_count: Option<usize>,
}

/// Parsed `for-each-ref` record
struct RefRecord {
    refname: String,
    short: String,
    hash: String,
    is_current: bool,
    upstream: Option<String>,
}

/// Parse one `for-each-ref` line into a [`RefRecord`].
fn parse_ref_record(line: &str) -> std::result::Result<RefRecord, VcsError> {
    let fields: Vec<&str> = line.split(FIELD_SEP).collect();
    if fields.len() != 5 {
        return Err(VcsError::malformed("for-each-ref", line));
    }

    let refname = fields[0].to_string();
    if !refname.starts_with("refs/") {
        return Err(VcsError::malformed("for-each-ref", line));
    }

    Ok(RefRecord {
        refname,
        short: fields[1].to_string(),
        hash: fields[2].to_string(),
        is_current: fields[3] == "*",
        upstream: if fields[4].is_empty() {
            None
        } else {
            Some(fields[4].to_string())
        },
    })
}

/// Parse `rev-list --left-right --count a...b` output into (behind, ahead).
fn parse_ahead_behind(out: &str) -> std::result::Result<(usize, usize), VcsError> {
    let trimmed = out.trim();
    let mut parts = trimmed.split_whitespace();
    let (Some(left), Some(right), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(VcsError::malformed("rev-list --left-right --count", out));
    };

    let behind = left
        .parse::<usize>()
        .map_err(|_| VcsError::malformed("rev-list --left-right --count", out))?;
    let ahead = right
        .parse::<usize>()
        .map_err(|_| VcsError::malformed("rev-list --left-right --count", out))?;

    Ok((behind, ahead))
}

/// List branches at basic fidelity.
///
/// Issues a fixed number of subprocess calls regardless of branch count:
/// one ref enumeration over `refs/heads` + `refs/remotes` and one merged
/// listing relative to the main branch. Either call failing is fatal for
/// the whole request.
#[instrument(skip(session), fields(repo = %session.repo_name()))]
pub async fn list_basic(session: &RepoSession) -> Result<Vec<Branch>> {
    let refs_out = session
        .run(&["for-each-ref", REF_FORMAT, "refs/heads", "refs/remotes"])
        .await?;

    // A repository with an unborn HEAD has no refs at all; that is an
    // empty listing, not an error.
    if refs_out.lines().all(|l| l.trim().is_empty()) {
        debug!("No refs to enumerate");
        return Ok(Vec::new());
    }

    let main = session.main_branch().await?;

    let merged_out = session
        .run(&["branch", "-a", "--merged", &main, "--format=%(refname:short)"])
        .await?;
    let merged: HashSet<&str> = merged_out
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    let mut branches = Vec::new();
    for line in refs_out.lines().filter(|l| !l.is_empty()) {
        let rec = parse_ref_record(line)?;
        let is_remote = rec.refname.starts_with("refs/remotes/");

        // Skip symbolic aliases like refs/remotes/origin/HEAD
        if is_remote && rec.refname.ends_with("/HEAD") {
            continue;
        }

        branches.push(Branch {
            is_local_only: !is_remote && rec.upstream.is_none(),
            is_merged: merged.contains(rec.short.as_str()),
            name: rec.short,
            is_remote,
            is_current: rec.is_current,
            commit_hash: rec.hash,
            upstream: rec.upstream,
            last_commit_date: None,
            first_commit_date: None,
            commit_count: None,
            ahead_count: None,
            behind_count: None,
        });
    }

    debug!("Enumerated {} branches ({} merged refs)", branches.len(), merged.len());

    Ok(branches)
}

/// List branches at full fidelity.
///
/// Runs [`list_basic`], then refines every branch with ahead/behind counts
/// against the main branch, commit count and first/last commit dates. This
/// is the slow path: O(branches) subprocess calls, bounded by the runner's
/// semaphore, with output order matching the basic listing.
#[instrument(skip(session, cancel), fields(repo = %session.repo_name()))]
pub async fn list_full(session: &RepoSession, cancel: &CancellationToken) -> Result<Vec<Branch>> {
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }

    let main = session.main_branch().await?;
    let basic = list_basic(session).await?;

    let width = session.runner().max_concurrent();
    let refine = stream::iter(basic.into_iter().map(|b| enrich(session, &main, b)))
        .buffered(width)
        .collect::<Vec<Branch>>();

    tokio::select! {
        _ = cancel.cancelled() => Err(Error::Cancelled),
        branches = refine => Ok(branches),
    }
}

/// Refine one branch with full metadata. Infallible by contract: any
/// per-branch failure leaves the affected optional fields unset.
async fn enrich(session: &RepoSession, main: &str, mut branch: Branch) -> Branch {
    let name = branch.name.clone();

    // Main compared against itself is meaningless; leave counts unset.
    if name != main {
        let range = format!("{}...{}", main, name);
        match session
            .run(&["rev-list", "--left-right", "--count", &range])
            .await
            .and_then(|out| parse_ahead_behind(&out))
        {
            Ok((behind, ahead)) => {
                branch.behind_count = Some(behind);
                branch.ahead_count = Some(ahead);
            }
            Err(e) => debug!("{}", e.for_item(&name)),
        }
    }

    match session.run(&["rev-list", "--count", &name, "--"]).await {
        Ok(out) => branch.commit_count = out.trim().parse::<usize>().ok(),
        Err(e) => debug!("{}", e.for_item(&name)),
    }

    match session.run(&["log", "-1", "--format=%cI", &name, "--"]).await {
        Ok(out) => branch.last_commit_date = parse_iso_date(out.trim()),
        Err(e) => debug!("{}", e.for_item(&name)),
    }

    match session
        .run(&["log", "--reverse", "--format=%cI", &name, "--"])
        .await
    {
        Ok(out) => {
            branch.first_commit_date = out.lines().next().and_then(|l| parse_iso_date(l.trim()));
        }
        Err(e) => debug!("{}", e.for_item(&name)),
    }

    branch
}

/// Parse an ISO-8601 date as printed by `%cI`/`%aI`. Returns `None` on any
/// deviation; dates are optional fields on the records they land in.
pub(crate) fn parse_iso_date(s: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(s).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const US: char = '\u{1f}';

    #[test]
    fn test_parse_ref_record_local() {
        let line = format!(
            "refs/heads/feature/x{US}feature/x{US}abc123{US}*{US}origin/feature/x"
        );
        let rec = parse_ref_record(&line).unwrap();
        assert_eq!(rec.refname, "refs/heads/feature/x");
        assert_eq!(rec.short, "feature/x");
        assert_eq!(rec.hash, "abc123");
        assert!(rec.is_current);
        assert_eq!(rec.upstream.as_deref(), Some("origin/feature/x"));
    }

    #[test]
    fn test_parse_ref_record_no_upstream() {
        let line = format!("refs/heads/wip{US}wip{US}def456{US}{US}");
        let rec = parse_ref_record(&line).unwrap();
        assert!(!rec.is_current);
        assert!(rec.upstream.is_none());
    }

    #[test]
    fn test_parse_ref_record_malformed() {
        assert!(parse_ref_record("garbage").is_err());
        assert!(parse_ref_record(&format!("a{US}b{US}c")).is_err());
        // Right field count but not a ref
        let line = format!("nonsense{US}x{US}h{US}{US}");
        assert!(parse_ref_record(&line).is_err());
    }

    #[test]
    fn test_parse_ahead_behind() {
        assert_eq!(parse_ahead_behind("3\t7\n").unwrap(), (3, 7));
        assert_eq!(parse_ahead_behind("0\t0").unwrap(), (0, 0));
    }

    #[test]
    fn test_parse_ahead_behind_malformed() {
        assert!(parse_ahead_behind("").is_err());
        assert!(parse_ahead_behind("12").is_err());
        assert!(parse_ahead_behind("a\tb").is_err());
        assert!(parse_ahead_behind("1\t2\t3").is_err());
    }

    #[test]
    fn test_parse_iso_date() {
        let d = parse_iso_date("2024-03-01T12:30:00+01:00").unwrap();
        assert_eq!(d.timezone().local_minus_utc(), 3600);
        assert!(parse_iso_date("not a date").is_none());
        assert!(parse_iso_date("").is_none());
    }
}

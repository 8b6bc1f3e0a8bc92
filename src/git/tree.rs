//! Merge tree: one node per branch merged into the main line
//!
//! Walks merge commits on the main branch (first-parent, newest first) and
//! derives a "unit of completed work" per merge: recovered branch name,
//! diff stats against the first parent, and pure classification into a
//! branch type, a size tier and a badge set. Branch-name recovery is
//! best-effort: a live ref pointing at the second parent wins, then the
//! conventional merge-message forms, then a synthetic name.

use std::sync::LazyLock;

use chrono::{DateTime, FixedOffset, Utc};
use futures::stream::{self, StreamExt};
use regex::Regex;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use super::RepoSession;
use super::graph::{Commit, LOG_FORMAT, parse_history, parse_shortstat};
use crate::error::{Error, Result};

/// Size tier breakpoints over total changed lines. Tunable policy; must
/// stay monotonic and total.
pub const TIER_XS_MAX: usize = 25;
pub const TIER_SM_MAX: usize = 100;
pub const TIER_MD_MAX: usize = 500;
pub const TIER_LG_MAX: usize = 2000;

/// Age breakpoints in days for the ancient/fresh badges
const ANCIENT_DAYS: i64 = 180;
const FRESH_DAYS: i64 = 2;

/// Merge-message forms, tried in order
static PULL_REQUEST_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Merge pull request #(\d+) from [^/\s]+/(\S+)").unwrap());
static MERGE_BRANCH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Merge branch '([^']+)'").unwrap());
static REMOTE_BRANCH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Merge remote-tracking branch '(?:origin/)?([^']+)'").unwrap()
});

/// Category a merged branch belongs to, derived from its name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BranchType {
    Feature,
    Fix,
    Chore,
    Refactor,
    Docs,
    Test,
    Release,
    Unknown,
}

/// Ordered prefix rule table; first matching rule wins
const BRANCH_TYPE_RULES: &[(&str, BranchType)] = &[
    ("feature/", BranchType::Feature),
    ("fix/", BranchType::Fix),
    ("bugfix/", BranchType::Fix),
    ("chore/", BranchType::Chore),
    ("refactor/", BranchType::Refactor),
    ("docs/", BranchType::Docs),
    ("test/", BranchType::Test),
    ("release/", BranchType::Release),
];

/// Classify a branch name against the ordered prefix rules.
pub fn classify_branch_type(name: &str) -> BranchType {
    for (prefix, branch_type) in BRANCH_TYPE_RULES {
        if name.starts_with(prefix) {
            return *branch_type;
        }
    }
    BranchType::Unknown
}

/// Coarse size bucket for a merged change
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SizeTier {
    Xs,
    Sm,
    Md,
    Lg,
    Xl,
}

/// Map total changed lines onto a [`SizeTier`]. Monotonic by construction.
pub fn size_tier(total_lines: usize) -> SizeTier {
    if total_lines < TIER_XS_MAX {
        SizeTier::Xs
    } else if total_lines < TIER_SM_MAX {
        SizeTier::Sm
    } else if total_lines < TIER_MD_MAX {
        SizeTier::Md
    } else if total_lines < TIER_LG_MAX {
        SizeTier::Lg
    } else {
        SizeTier::Xl
    }
}

/// Diff stats for one merged branch
#[derive(Debug, Clone, Copy, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStats {
    pub additions: usize,
    pub deletions: usize,
    pub files_changed: usize,
    pub files_added: usize,
    pub files_removed: usize,
    /// Commits brought in by the merged branch (first parent .. second parent)
    pub commit_count: usize,
    pub days_since_merge: i64,
}

/// Independent boolean predicates over a node's stats
#[derive(Debug, Clone, Copy, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Badges {
    pub massive: bool,
    pub destructive: bool,
    pub additive: bool,
    pub multi_file: bool,
    pub surgical: bool,
    pub ancient: bool,
    pub fresh: bool,
}

/// Compute the badge set for a node's stats.
pub fn compute_badges(stats: &NodeStats) -> Badges {
    let total = stats.additions + stats.deletions;
    Badges {
        massive: total >= TIER_LG_MAX,
        destructive: stats.deletions > stats.additions * 2,
        additive: stats.additions > stats.deletions * 5,
        multi_file: stats.files_changed > 10,
        surgical: stats.files_changed <= 2 && total < TIER_SM_MAX,
        ancient: stats.days_since_merge > ANCIENT_DAYS,
        fresh: stats.days_since_merge < FRESH_DAYS,
    }
}

/// One branch that was merged into the main line
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TechTreeNode {
    pub branch_name: String,
    pub merge_commit_hash: String,
    /// Tip of the merged branch before the merge (second parent)
    pub commit_hash: String,
    pub author: String,
    pub author_email: String,
    pub merge_date: DateTime<FixedOffset>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pr_number: Option<u64>,
    pub stats: NodeStats,
    pub size_tier: SizeTier,
    pub branch_type: BranchType,
    pub badges: Badges,
}

/// Min/max ranges across all nodes, for downstream normalization
#[derive(Debug, Clone, Copy, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsEnvelope {
    pub min_loc: usize,
    pub max_loc: usize,
    pub min_files: usize,
    pub max_files: usize,
    pub min_age_days: i64,
    pub max_age_days: i64,
}

/// The derived merge tree for one repository
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeTree {
    pub master_branch: String,
    pub nodes: Vec<TechTreeNode>,
    pub stats: StatsEnvelope,
}

/// Pure min/max reduction over the node set.
pub fn envelope(nodes: &[TechTreeNode]) -> StatsEnvelope {
    let mut env = StatsEnvelope::default();
    let mut first = true;

    for node in nodes {
        let loc = node.stats.additions + node.stats.deletions;
        let files = node.stats.files_changed;
        let age = node.stats.days_since_merge;

        if first {
            env = StatsEnvelope {
                min_loc: loc,
                max_loc: loc,
                min_files: files,
                max_files: files,
                min_age_days: age,
                max_age_days: age,
            };
            first = false;
        } else {
            env.min_loc = env.min_loc.min(loc);
            env.max_loc = env.max_loc.max(loc);
            env.min_files = env.min_files.min(files);
            env.max_files = env.max_files.max(files);
            env.min_age_days = env.min_age_days.min(age);
            env.max_age_days = env.max_age_days.max(age);
        }
    }

    env
}

/// Recover the merged-in branch name (and PR number, when present) from a
/// merge commit message. Returns `None` for unconventional messages.
pub(crate) fn branch_from_message(message: &str) -> Option<(String, Option<u64>)> {
    if let Some(caps) = PULL_REQUEST_RE.captures(message) {
        let number = caps.get(1).and_then(|m| m.as_str().parse::<u64>().ok());
        return Some((caps[2].to_string(), number));
    }
    if let Some(caps) = MERGE_BRANCH_RE.captures(message) {
        return Some((caps[1].to_string(), None));
    }
    if let Some(caps) = REMOTE_BRANCH_RE.captures(message) {
        return Some((caps[1].to_string(), None));
    }
    None
}

/// Parse `diff --name-status` output into (files added, files removed).
pub(crate) fn parse_name_status(out: &str) -> (usize, usize) {
    let mut added = 0;
    let mut removed = 0;
    for line in out.lines() {
        match line.chars().next() {
            Some('A') => added += 1,
            Some('D') => removed += 1,
            _ => {}
        }
    }
    (added, removed)
}

/// Build the merge tree for the main branch, up to `limit` merges.
///
/// The merge enumeration call is fatal on failure; per-merge stat calls
/// degrade that node to zeroed stats.
#[instrument(skip(session, cancel), fields(repo = %session.repo_name()))]
pub async fn build(
    session: &RepoSession,
    limit: usize,
    cancel: &CancellationToken,
) -> Result<MergeTree> {
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }

    let main = session.main_branch().await?;
    let limit_arg = limit.to_string();

    let out = session
        .run(&[
            "log",
            &main,
            "--first-parent",
            "--merges",
            "--max-count",
            &limit_arg,
            LOG_FORMAT,
            "--",
        ])
        .await?;

    let merges = parse_history(&out)?;
    debug!("Found {} merge commits on {}", merges.len(), main);

    let now = Utc::now().fixed_offset();
    let width = session.runner().max_concurrent();
    let work = stream::iter(
        merges
            .into_iter()
            .map(|m| build_node(session, &main, m, now)),
    )
    .buffered(width)
    .collect::<Vec<TechTreeNode>>();

    let nodes = tokio::select! {
        _ = cancel.cancelled() => return Err(Error::Cancelled),
        nodes = work => nodes,
    };

    let stats = envelope(&nodes);

    Ok(MergeTree {
        master_branch: main,
        nodes,
        stats,
    })
}

/// Derive one node from a merge commit. Infallible by contract; stat
/// failures leave zeroed stats on the node.
async fn build_node(
    session: &RepoSession,
    main: &str,
    merge: Commit,
    now: DateTime<FixedOffset>,
) -> TechTreeNode {
    let second_parent = merge.parents.get(1).cloned().unwrap_or_default();

    let (branch_name, pr_number) = recover_branch_name(session, main, &merge).await;

    let mut stats = NodeStats {
        days_since_merge: (now - merge.date).num_days(),
        ..NodeStats::default()
    };

    if let Some(first_parent) = merge.parents.first() {
        match session
            .run(&["diff", "--shortstat", first_parent, &merge.hash])
            .await
        {
            Ok(out) => {
                let diff = parse_shortstat(&out);
                stats.additions = diff.additions;
                stats.deletions = diff.deletions;
                stats.files_changed = diff.files_changed;
            }
            Err(e) => warn!("{}", e.for_item(&merge.hash)),
        }

        match session
            .run(&["diff", "--name-status", first_parent, &merge.hash])
            .await
        {
            Ok(out) => {
                let (added, removed) = parse_name_status(&out);
                stats.files_added = added;
                stats.files_removed = removed;
            }
            Err(e) => warn!("{}", e.for_item(&merge.hash)),
        }

        // Count the branch's own commits, not the merge commit itself.
        if !second_parent.is_empty() {
            let range = format!("{}..{}", first_parent, second_parent);
            match session.run(&["rev-list", "--count", &range]).await {
                Ok(out) => stats.commit_count = out.trim().parse().unwrap_or(0),
                Err(e) => warn!("{}", e.for_item(&merge.hash)),
            }
        }
    }

    let total = stats.additions + stats.deletions;

    TechTreeNode {
        branch_type: classify_branch_type(&branch_name),
        size_tier: size_tier(total),
        badges: compute_badges(&stats),
        branch_name,
        merge_commit_hash: merge.hash,
        commit_hash: second_parent,
        author: merge.author_name,
        author_email: merge.author_email,
        merge_date: merge.date,
        message: merge.message,
        pr_number,
        stats,
    }
}

/// Resolve the merged branch's name: live ref at the second parent, then
/// message heuristics, then a synthetic `unknown-<short-hash>` name.
async fn recover_branch_name(
    session: &RepoSession,
    main: &str,
    merge: &Commit,
) -> (String, Option<u64>) {
    if let Some(second_parent) = merge.parents.get(1) {
        if let Ok(out) = session
            .run(&[
                "branch",
                "--points-at",
                second_parent,
                "--format=%(refname:short)",
            ])
            .await
        {
            if let Some(name) = out
                .lines()
                .map(str::trim)
                .find(|l| !l.is_empty() && *l != main)
            {
                // A live ref may coexist with a PR-style message; keep the
                // PR number when the message carries one.
                let pr = branch_from_message(&merge.message).and_then(|(_, pr)| pr);
                return (name.to_string(), pr);
            }
        }
    }

    if let Some((name, pr)) = branch_from_message(&merge.message) {
        return (name, pr);
    }

    let short = &merge.hash[..merge.hash.len().min(7)];
    (format!("unknown-{}", short), None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn stats(additions: usize, deletions: usize, files: usize, days: i64) -> NodeStats {
        NodeStats {
            additions,
            deletions,
            files_changed: files,
            files_added: 0,
            files_removed: 0,
            commit_count: 1,
            days_since_merge: days,
        }
    }

    #[test]
    fn test_classify_branch_type() {
        assert_eq!(classify_branch_type("feature/login"), BranchType::Feature);
        assert_eq!(classify_branch_type("fix/login-bug"), BranchType::Fix);
        assert_eq!(classify_branch_type("bugfix/crash"), BranchType::Fix);
        assert_eq!(classify_branch_type("chore/deps"), BranchType::Chore);
        assert_eq!(classify_branch_type("refactor/api"), BranchType::Refactor);
        assert_eq!(classify_branch_type("docs/readme"), BranchType::Docs);
        assert_eq!(classify_branch_type("test/e2e"), BranchType::Test);
        assert_eq!(classify_branch_type("release/1.2"), BranchType::Release);
        assert_eq!(classify_branch_type("whatever"), BranchType::Unknown);
    }

    #[test]
    fn test_size_tiers() {
        assert_eq!(size_tier(0), SizeTier::Xs);
        assert_eq!(size_tier(TIER_XS_MAX), SizeTier::Sm);
        assert_eq!(size_tier(TIER_SM_MAX), SizeTier::Md);
        assert_eq!(size_tier(TIER_MD_MAX), SizeTier::Lg);
        assert_eq!(size_tier(TIER_LG_MAX), SizeTier::Xl);
        assert_eq!(size_tier(1_000_000), SizeTier::Xl);
    }

    #[test]
    fn test_fix_merge_scenario() {
        // +12/-3 across 2 files, merged a day ago
        let s = stats(12, 3, 2, 1);
        assert_eq!(size_tier(s.additions + s.deletions), SizeTier::Xs);

        let badges = compute_badges(&s);
        assert!(badges.fresh);
        assert!(badges.surgical);
        assert!(!badges.massive);
        assert!(!badges.destructive);
        assert!(!badges.additive);
        assert!(!badges.multi_file);
        assert!(!badges.ancient);
    }

    #[test]
    fn test_badges_destructive_and_additive() {
        let destructive = compute_badges(&stats(5, 50, 4, 10));
        assert!(destructive.destructive);
        assert!(!destructive.additive);

        let additive = compute_badges(&stats(100, 3, 4, 10));
        assert!(additive.additive);
        assert!(!additive.destructive);
    }

    #[test]
    fn test_badges_age() {
        assert!(compute_badges(&stats(1, 1, 1, 400)).ancient);
        assert!(!compute_badges(&stats(1, 1, 1, 400)).fresh);
        assert!(compute_badges(&stats(1, 1, 1, 0)).fresh);
    }

    #[test]
    fn test_branch_from_message() {
        let (name, pr) = branch_from_message("Merge pull request #42 from org/feature/login").unwrap();
        assert_eq!(name, "feature/login");
        assert_eq!(pr, Some(42));

        let (name, pr) = branch_from_message("Merge branch 'fix/login-bug'").unwrap();
        assert_eq!(name, "fix/login-bug");
        assert_eq!(pr, None);

        let (name, _) =
            branch_from_message("Merge remote-tracking branch 'origin/chore/deps'").unwrap();
        assert_eq!(name, "chore/deps");

        assert!(branch_from_message("Rewrite everything").is_none());
    }

    #[test]
    fn test_parse_name_status() {
        let out = "A\tsrc/new.rs\nM\tsrc/lib.rs\nD\told.rs\nA\tassets/logo.svg\n";
        assert_eq!(parse_name_status(out), (2, 1));
        assert_eq!(parse_name_status(""), (0, 0));
    }

    #[test]
    fn test_envelope() {
        let mk = |additions, files, days| TechTreeNode {
            branch_name: "b".to_string(),
            merge_commit_hash: "m".to_string(),
            commit_hash: "c".to_string(),
            author: "a".to_string(),
            author_email: "a@x".to_string(),
            merge_date: DateTime::parse_from_rfc3339("2024-01-01T00:00:00+00:00").unwrap(),
            message: String::new(),
            pr_number: None,
            stats: stats(additions, 0, files, days),
            size_tier: size_tier(additions),
            branch_type: BranchType::Unknown,
            badges: Badges::default(),
        };

        let nodes = vec![mk(10, 1, 5), mk(500, 12, 1), mk(50, 3, 100)];
        let env = envelope(&nodes);
        assert_eq!(env.min_loc, 10);
        assert_eq!(env.max_loc, 500);
        assert_eq!(env.min_files, 1);
        assert_eq!(env.max_files, 12);
        assert_eq!(env.min_age_days, 1);
        assert_eq!(env.max_age_days, 100);

        let empty = envelope(&[]);
        assert_eq!(empty.max_loc, 0);
    }

    proptest! {
        /// Size tier never decreases as the line count grows.
        #[test]
        fn prop_size_tier_monotonic(a in 0usize..10_000, b in 0usize..10_000) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(size_tier(lo) <= size_tier(hi));
        }
    }
}

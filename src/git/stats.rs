//! Bucketed contributor statistics
//!
//! Resolves every commit author through the mailmap, buckets commit
//! timestamps into day / ISO-week / month series, and returns the top
//! contributors by total commit count. The report's date range always
//! spans the full input window so truncated series can still be aligned
//! against each other by a caller comparing contributors.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Datelike, Days, FixedOffset, NaiveDate};
use serde::Serialize;
use tracing::{debug, instrument};

use super::{Mailmap, RepoSession};
use crate::error::{Result, VcsError};

/// Field separator used in the author record format (ASCII unit separator)
const FIELD_SEP: char = '\u{1f}';

/// Author record format: name, email, author date
const AUTHOR_FORMAT: &str = "--format=%an%x1f%ae%x1f%aI";

/// Time-series bucket granularity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BucketSize {
    Day,
    Week,
    Month,
}

impl BucketSize {
    /// Map a date onto the start of its bucket: the calendar day itself,
    /// the Monday of its ISO week, or the first of its month.
    pub fn bucket_start(&self, date: NaiveDate) -> NaiveDate {
        match self {
            BucketSize::Day => date,
            BucketSize::Week => {
                let back = date.weekday().num_days_from_monday() as u64;
                date.checked_sub_days(Days::new(back)).unwrap_or(date)
            }
            BucketSize::Month => date.with_day(1).unwrap_or(date),
        }
    }
}

/// One (bucket start, commit count) point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeBucket {
    pub start: NaiveDate,
    pub count: usize,
}

/// Aggregated activity for one resolved identity
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContributorStats {
    pub author: String,
    pub email: String,
    pub total_commits: usize,
    /// Ascending by bucket start; counts sum to `total_commits`
    pub time_series: Vec<TimeBucket>,
}

/// The full contributor report for one window
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContributorReport {
    pub contributors: Vec<ContributorStats>,
    /// Earliest commit date in the whole input window, independent of
    /// `top_n` truncation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    pub bucket_size: BucketSize,
}

/// Raw author record as read from history
#[derive(Debug, Clone)]
pub struct AuthorRecord {
    pub name: String,
    pub email: String,
    pub date: DateTime<FixedOffset>,
}

/// Parse the author record stream.
pub(crate) fn parse_authors(out: &str) -> std::result::Result<Vec<AuthorRecord>, VcsError> {
    let mut records = Vec::new();
    for line in out.lines().filter(|l| !l.is_empty()) {
        let fields: Vec<&str> = line.split(FIELD_SEP).collect();
        if fields.len() != 3 {
            return Err(VcsError::malformed("author record", line));
        }
        let date = super::branches::parse_iso_date(fields[2])
            .ok_or_else(|| VcsError::malformed("author record date", line))?;
        records.push(AuthorRecord {
            name: fields[0].to_string(),
            email: fields[1].to_string(),
            date,
        });
    }
    Ok(records)
}

/// Aggregate author records into per-identity bucketed series.
///
/// Pure: a fixed record list, mailmap and bucket size always produce the
/// same report. Truncation by `top_n` removes whole contributors only.
pub fn aggregate(
    records: &[AuthorRecord],
    mailmap: &Mailmap,
    top_n: Option<usize>,
    bucket_size: BucketSize,
) -> ContributorReport {
    let mut by_identity: HashMap<(String, String), BTreeMap<NaiveDate, usize>> = HashMap::new();
    let mut start_date: Option<NaiveDate> = None;
    let mut end_date: Option<NaiveDate> = None;

    for record in records {
        let identity = mailmap.resolve(&record.name, &record.email);
        let day = record.date.date_naive();

        start_date = Some(start_date.map_or(day, |d| d.min(day)));
        end_date = Some(end_date.map_or(day, |d| d.max(day)));

        let bucket = bucket_size.bucket_start(day);
        *by_identity.entry(identity).or_default().entry(bucket).or_insert(0) += 1;
    }

    let mut contributors: Vec<ContributorStats> = by_identity
        .into_iter()
        .map(|((name, email), series)| {
            let total_commits = series.values().sum();
            ContributorStats {
                author: name,
                email,
                total_commits,
                time_series: series
                    .into_iter()
                    .map(|(start, count)| TimeBucket { start, count })
                    .collect(),
            }
        })
        .collect();

    // Total descending, then name ascending for a deterministic order.
    contributors.sort_by(|a, b| {
        b.total_commits
            .cmp(&a.total_commits)
            .then_with(|| a.author.cmp(&b.author))
    });

    if let Some(n) = top_n {
        contributors.truncate(n);
    }

    ContributorReport {
        contributors,
        start_date,
        end_date,
        bucket_size,
    }
}

/// Fetch author data for the whole history in one subprocess call and
/// aggregate it. The mailmap is read from the repository.
#[instrument(skip(session), fields(repo = %session.repo_name()))]
pub async fn collect(
    session: &RepoSession,
    top_n: Option<usize>,
    bucket_size: BucketSize,
) -> Result<ContributorReport> {
    let out = session.run(&["log", AUTHOR_FORMAT]).await?;
    let records = parse_authors(&out)?;
    let mailmap = Mailmap::load(session.path()).await?;

    debug!("Aggregating {} commits", records.len());

    Ok(aggregate(&records, &mailmap, top_n, bucket_size))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn record(name: &str, email: &str, date: &str) -> AuthorRecord {
        AuthorRecord {
            name: name.to_string(),
            email: email.to_string(),
            date: DateTime::parse_from_rfc3339(date).unwrap(),
        }
    }

    fn day(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn test_bucket_start_day() {
        assert_eq!(BucketSize::Day.bucket_start(day("2024-03-14")), day("2024-03-14"));
    }

    #[test]
    fn test_bucket_start_week() {
        // 2024-03-14 is a Thursday; its ISO week starts Monday 2024-03-11
        assert_eq!(BucketSize::Week.bucket_start(day("2024-03-14")), day("2024-03-11"));
        // A Monday maps to itself
        assert_eq!(BucketSize::Week.bucket_start(day("2024-03-11")), day("2024-03-11"));
        // Sunday belongs to the week that started the previous Monday
        assert_eq!(BucketSize::Week.bucket_start(day("2024-03-17")), day("2024-03-11"));
    }

    #[test]
    fn test_bucket_start_month() {
        assert_eq!(BucketSize::Month.bucket_start(day("2024-03-14")), day("2024-03-01"));
    }

    #[test]
    fn test_parse_authors() {
        let us = '\u{1f}';
        let out = format!("Jane{us}jane@x.com{us}2024-03-01T10:00:00+00:00\n");
        let records = parse_authors(&out).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "Jane");

        assert!(parse_authors("malformed\n").is_err());
    }

    #[test]
    fn test_aggregate_series_sums_to_total() {
        let records = vec![
            record("Jane", "jane@x.com", "2024-03-01T10:00:00+00:00"),
            record("Jane", "jane@x.com", "2024-03-01T12:00:00+00:00"),
            record("Jane", "jane@x.com", "2024-03-02T09:00:00+00:00"),
            record("Bob", "bob@x.com", "2024-03-02T09:00:00+00:00"),
        ];

        let report = aggregate(&records, &Mailmap::default(), None, BucketSize::Day);
        assert_eq!(report.contributors.len(), 2);

        for contributor in &report.contributors {
            let series_sum: usize = contributor.time_series.iter().map(|b| b.count).sum();
            assert_eq!(series_sum, contributor.total_commits);
        }

        assert_eq!(report.contributors[0].author, "Jane");
        assert_eq!(report.contributors[0].total_commits, 3);
        assert_eq!(report.start_date, Some(day("2024-03-01")));
        assert_eq!(report.end_date, Some(day("2024-03-02")));
    }

    #[test]
    fn test_aggregate_resolves_aliases() {
        let mailmap = Mailmap::parse("J. Doe <j@x.com> John Doe <john@x.com>\n").unwrap();
        let records = vec![
            record("J. Doe", "j@x.com", "2024-03-01T10:00:00+00:00"),
            record("John Doe", "john@x.com", "2024-03-02T10:00:00+00:00"),
        ];

        let report = aggregate(&records, &mailmap, None, BucketSize::Day);
        assert_eq!(report.contributors.len(), 1);
        assert_eq!(report.contributors[0].author, "J. Doe");
        assert_eq!(report.contributors[0].total_commits, 2);
    }

    #[test]
    fn test_aggregate_top_n_keeps_whole_contributors_and_range() {
        let records = vec![
            record("A", "a@x.com", "2024-01-01T00:00:00+00:00"),
            record("A", "a@x.com", "2024-01-02T00:00:00+00:00"),
            record("B", "b@x.com", "2024-02-01T00:00:00+00:00"),
            record("C", "c@x.com", "2024-03-01T00:00:00+00:00"),
        ];

        let report = aggregate(&records, &Mailmap::default(), Some(1), BucketSize::Month);
        assert_eq!(report.contributors.len(), 1);
        assert_eq!(report.contributors[0].author, "A");
        assert_eq!(report.contributors[0].total_commits, 2);

        // Range covers the whole input window despite truncation.
        assert_eq!(report.start_date, Some(day("2024-01-01")));
        assert_eq!(report.end_date, Some(day("2024-03-01")));
    }

    #[test]
    fn test_aggregate_deterministic_tiebreak() {
        let records = vec![
            record("Zed", "z@x.com", "2024-01-01T00:00:00+00:00"),
            record("Amy", "a@x.com", "2024-01-01T00:00:00+00:00"),
        ];
        let report = aggregate(&records, &Mailmap::default(), None, BucketSize::Day);
        assert_eq!(report.contributors[0].author, "Amy");
        assert_eq!(report.contributors[1].author, "Zed");
    }

    #[test]
    fn test_aggregate_empty() {
        let report = aggregate(&[], &Mailmap::default(), None, BucketSize::Week);
        assert!(report.contributors.is_empty());
        assert!(report.start_date.is_none());
        assert!(report.end_date.is_none());
    }
}

//! Pull request analytics.
//!
//! Every function here is pure: it takes the fetched collections (and, for
//! anything involving open-PR age, the reference time `now`) and returns
//! freshly built aggregates. Empty input yields zero-valued aggregates.

use crate::types::{Created, DateRange, Identity, OpenPR, PullRequest};
use chrono::{DateTime, Datelike, Duration, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use std::collections::BTreeMap;

const MILLIS_PER_HOUR: f64 = 3_600_000.0;

/// Close-time statistics across all pull requests.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PRMetrics {
    /// Mean hours from creation to close over closed pull requests.
    pub average_time_to_close: f64,
    /// Maximum hours from creation to close over closed pull requests.
    pub longest_time_to_close: f64,
    #[serde(rename = "totalPRs")]
    pub total_prs: usize,
    #[serde(rename = "closedPRs")]
    pub closed_prs: usize,
}

/// Close-time statistics for a single author.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserMetrics {
    pub display_name: String,
    pub unique_name: String,
    #[serde(rename = "totalPRs")]
    pub total_prs: usize,
    #[serde(rename = "closedPRs")]
    pub closed_prs: usize,
    pub average_time_to_close: f64,
    pub longest_time_to_close: f64,
}

/// One weekly bucket of closed pull requests.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSeriesData {
    /// The Sunday starting the week (YYYY-MM-DD).
    pub date: String,
    pub average_close_time: f64,
    pub pr_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenPRMetrics {
    #[serde(rename = "totalOpenPRs")]
    pub total_open_prs: usize,
    /// Mean age in hours.
    pub average_age: f64,
    /// Age in hours of the oldest open pull request.
    #[serde(rename = "oldestPR")]
    pub oldest_pr: f64,
    #[serde(rename = "draftPRs")]
    pub draft_prs: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOpenPRCount {
    pub display_name: String,
    pub unique_name: String,
    #[serde(rename = "openPRCount")]
    pub open_pr_count: usize,
    pub average_age: f64,
}

/// Vote tallies for one reviewer across every open pull request.
///
/// Votes outside the five known codes only count towards `review_count`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewerMetrics {
    pub display_name: String,
    pub unique_name: String,
    pub review_count: usize,
    pub pending_reviews: usize,
    pub approved_reviews: usize,
    pub rejected_reviews: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenPRAnalytics {
    pub metrics: OpenPRMetrics,
    pub user_counts: Vec<UserOpenPRCount>,
    pub reviewer_metrics: Vec<ReviewerMetrics>,
    /// Open pull requests, oldest first.
    #[serde(rename = "openPRs")]
    pub open_prs: Vec<OpenPR>,
}

/// Everything the dashboard renders for one date window.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsData {
    pub overall_metrics: PRMetrics,
    pub user_metrics: Vec<UserMetrics>,
    pub time_series_data: Vec<TimeSeriesData>,
    #[serde(rename = "openPRAnalytics")]
    pub open_pr_analytics: OpenPRAnalytics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_range: Option<DateRange>,
}

fn hours_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_milliseconds() as f64 / MILLIS_PER_HOUR
}

/// Returns `(mean, max)`, or zeros for an empty slice.
fn mean_and_max(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let sum: f64 = values.iter().sum();
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    (sum / values.len() as f64, max)
}

fn mean(values: &[f64]) -> f64 {
    mean_and_max(values).0
}

/// Groups records by the author's unique name, keeping discovery order.
/// The first display name seen for a key wins.
fn group_by_author<'a, T>(
    records: &'a [T],
    author: impl Fn(&'a T) -> &'a Identity,
) -> IndexMap<&'a str, (&'a Identity, Vec<&'a T>)> {
    let mut groups: IndexMap<&str, (&Identity, Vec<&T>)> = IndexMap::new();
    for record in records {
        let identity = author(record);
        groups
            .entry(identity.unique_name.as_str())
            .or_insert_with(|| (identity, Vec::new()))
            .1
            .push(record);
    }
    groups
}

/// Hours between creation and close, or `None` while the pull request is open.
pub fn time_to_close(pr: &PullRequest) -> Option<f64> {
    pr.closed_date
        .map(|closed| hours_between(pr.creation_date, closed))
}

pub fn overall_metrics(prs: &[PullRequest]) -> PRMetrics {
    let close_times: Vec<f64> = prs.iter().filter_map(time_to_close).collect();
    let (average_time_to_close, longest_time_to_close) = mean_and_max(&close_times);

    PRMetrics {
        average_time_to_close,
        longest_time_to_close,
        total_prs: prs.len(),
        closed_prs: close_times.len(),
    }
}

/// Per-author close-time metrics, most prolific authors first.
pub fn user_metrics(prs: &[PullRequest]) -> Vec<UserMetrics> {
    let mut users: Vec<UserMetrics> = group_by_author(prs, |pr| &pr.created_by)
        .into_values()
        .map(|(identity, authored)| {
            let close_times: Vec<f64> = authored.iter().filter_map(|pr| time_to_close(pr)).collect();
            let (average_time_to_close, longest_time_to_close) = mean_and_max(&close_times);

            UserMetrics {
                display_name: identity.display_name.clone(),
                unique_name: identity.unique_name.clone(),
                total_prs: authored.len(),
                closed_prs: close_times.len(),
                average_time_to_close,
                longest_time_to_close,
            }
        })
        .collect();

    users.sort_by(|a, b| b.total_prs.cmp(&a.total_prs));
    users
}

/// The Sunday on or before `at`, as a calendar date in UTC.
fn week_start(at: DateTime<Utc>) -> String {
    let day = at.date_naive();
    let sunday = day - Duration::days(i64::from(day.weekday().num_days_from_sunday()));
    sunday.format("%Y-%m-%d").to_string()
}

/// Weekly mean close time, bucketed by the week the pull request closed in.
pub fn time_series_data(prs: &[PullRequest]) -> Vec<TimeSeriesData> {
    let mut weeks: BTreeMap<String, (f64, usize)> = BTreeMap::new();

    for pr in prs {
        let (Some(closed), Some(hours)) = (pr.closed_date, time_to_close(pr)) else {
            continue;
        };
        let bucket = weeks.entry(week_start(closed)).or_insert((0.0, 0));
        bucket.0 += hours;
        bucket.1 += 1;
    }

    weeks
        .into_iter()
        .map(|(date, (total, count))| TimeSeriesData {
            date,
            average_close_time: total / count as f64,
            pr_count: count,
        })
        .collect()
}

/// Hours the pull request has been open as of `now`.
pub fn open_pr_age(pr: &OpenPR, now: DateTime<Utc>) -> f64 {
    hours_between(pr.creation_date, now)
}

pub fn open_pr_metrics(open_prs: &[OpenPR], now: DateTime<Utc>) -> OpenPRMetrics {
    let ages: Vec<f64> = open_prs.iter().map(|pr| open_pr_age(pr, now)).collect();
    let (average_age, oldest_pr) = mean_and_max(&ages);

    OpenPRMetrics {
        total_open_prs: open_prs.len(),
        average_age,
        oldest_pr,
        draft_prs: open_prs.iter().filter(|pr| pr.is_draft).count(),
    }
}

pub fn user_open_pr_counts(open_prs: &[OpenPR], now: DateTime<Utc>) -> Vec<UserOpenPRCount> {
    let mut users: Vec<UserOpenPRCount> = group_by_author(open_prs, |pr| &pr.created_by)
        .into_values()
        .map(|(identity, authored)| {
            let ages: Vec<f64> = authored.iter().map(|pr| open_pr_age(pr, now)).collect();

            UserOpenPRCount {
                display_name: identity.display_name.clone(),
                unique_name: identity.unique_name.clone(),
                open_pr_count: authored.len(),
                average_age: mean(&ages),
            }
        })
        .collect();

    users.sort_by(|a, b| b.open_pr_count.cmp(&a.open_pr_count));
    users
}

pub fn reviewer_metrics(open_prs: &[OpenPR]) -> Vec<ReviewerMetrics> {
    let mut reviewers: IndexMap<&str, ReviewerMetrics> = IndexMap::new();

    for reviewer in open_prs.iter().flat_map(|pr| &pr.reviewers) {
        let entry = reviewers
            .entry(reviewer.unique_name.as_str())
            .or_insert_with(|| ReviewerMetrics {
                display_name: reviewer.display_name.clone(),
                unique_name: reviewer.unique_name.clone(),
                review_count: 0,
                pending_reviews: 0,
                approved_reviews: 0,
                rejected_reviews: 0,
            });

        let status = reviewer.status();
        entry.review_count += 1;
        if status.is_pending() {
            entry.pending_reviews += 1;
        } else if status.is_approved() {
            entry.approved_reviews += 1;
        } else if status.is_rejected() {
            entry.rejected_reviews += 1;
        }
    }

    let mut reviewers: Vec<ReviewerMetrics> = reviewers.into_values().collect();
    reviewers.sort_by(|a, b| b.review_count.cmp(&a.review_count));
    reviewers
}

pub fn open_pr_analytics(open_prs: &[OpenPR], now: DateTime<Utc>) -> OpenPRAnalytics {
    let mut oldest_first = open_prs.to_vec();
    oldest_first.sort_by(|a, b| open_pr_age(b, now).total_cmp(&open_pr_age(a, now)));

    OpenPRAnalytics {
        metrics: open_pr_metrics(open_prs, now),
        user_counts: user_open_pr_counts(open_prs, now),
        reviewer_metrics: reviewer_metrics(open_prs),
        open_prs: oldest_first,
    }
}

/// Keeps records created inside `range` (both ends inclusive); no range keeps everything.
pub fn filter_by_date_range<T: Created + Clone>(records: &[T], range: Option<&DateRange>) -> Vec<T> {
    match range {
        None => records.to_vec(),
        Some(range) => records
            .iter()
            .filter(|record| range.contains(record.creation_date()))
            .cloned()
            .collect(),
    }
}

/// Computes the full dashboard payload, aging open pull requests against the current time.
pub fn compute_analytics(
    prs: &[PullRequest],
    open_prs: &[OpenPR],
    range: Option<DateRange>,
) -> AnalyticsData {
    compute_analytics_at(prs, open_prs, range, Utc::now())
}

/// Same as [`compute_analytics`] with an explicit reference time.
pub fn compute_analytics_at(
    prs: &[PullRequest],
    open_prs: &[OpenPR],
    range: Option<DateRange>,
    now: DateTime<Utc>,
) -> AnalyticsData {
    let prs = filter_by_date_range(prs, range.as_ref());
    let open_prs = filter_by_date_range(open_prs, range.as_ref());

    AnalyticsData {
        overall_metrics: overall_metrics(&prs),
        user_metrics: user_metrics(&prs),
        time_series_data: time_series_data(&prs),
        open_pr_analytics: open_pr_analytics(&open_prs, now),
        date_range: range,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::types::Reviewer;
    use chrono::{TimeZone, Weekday};

    pub(crate) fn identity(unique_name: &str, display_name: &str) -> Identity {
        Identity {
            display_name: display_name.to_string(),
            unique_name: unique_name.to_string(),
        }
    }

    pub(crate) fn pr(
        id: u64,
        author: &str,
        created: DateTime<Utc>,
        closed: Option<DateTime<Utc>>,
    ) -> PullRequest {
        PullRequest {
            pull_request_id: id,
            title: format!("PR {}", id),
            description: String::new(),
            created_by: identity(author, author),
            creation_date: created,
            closed_date: closed,
            status: if closed.is_some() { "completed" } else { "active" }.to_string(),
            is_draft: false,
            repository: None,
            source_ref_name: None,
        }
    }

    pub(crate) fn reviewer(unique_name: &str, vote: i32) -> Reviewer {
        Reviewer {
            display_name: unique_name.to_uppercase(),
            unique_name: unique_name.to_string(),
            vote,
        }
    }

    pub(crate) fn open_pr(
        id: u64,
        author: &str,
        created: DateTime<Utc>,
        reviewers: Vec<Reviewer>,
    ) -> OpenPR {
        OpenPR {
            pull_request_id: id,
            title: format!("Open PR {}", id),
            description: String::new(),
            created_by: identity(author, author),
            creation_date: created,
            status: "active".to_string(),
            is_draft: false,
            url: format!("https://dev.azure.com/org/proj/_git/repo/pullrequest/{}", id),
            reviewers,
        }
    }

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_time_to_close() {
        let created = Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap();
        let closed = Utc.with_ymd_and_hms(2024, 1, 1, 9, 30, 0).unwrap();

        assert_eq!(time_to_close(&pr(1, "a", created, Some(closed))), Some(1.5));
        assert_eq!(time_to_close(&pr(2, "a", created, None)), None);
    }

    #[test]
    fn test_overall_metrics_empty() {
        let metrics = overall_metrics(&[]);

        assert_eq!(
            metrics,
            PRMetrics {
                average_time_to_close: 0.0,
                longest_time_to_close: 0.0,
                total_prs: 0,
                closed_prs: 0,
            }
        );
    }

    #[test]
    fn test_overall_metrics_skips_open_prs() {
        let prs = vec![
            pr(1, "a", day(1), Some(day(2))),
            pr(2, "a", day(1), Some(day(4))),
            pr(3, "b", day(1), None),
        ];

        let metrics = overall_metrics(&prs);
        assert_eq!(metrics.total_prs, 3);
        assert_eq!(metrics.closed_prs, 2);
        assert_eq!(metrics.average_time_to_close, 48.0);
        assert_eq!(metrics.longest_time_to_close, 72.0);
    }

    #[test]
    fn test_user_metrics_groups_by_unique_name() {
        let mut first = pr(1, "ada@example.com", day(1), Some(day(2)));
        first.created_by.display_name = "Ada".to_string();
        let mut second = pr(2, "ada@example.com", day(3), None);
        second.created_by.display_name = "Ada Lovelace".to_string();

        let users = user_metrics(&[first, second]);
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].display_name, "Ada");
        assert_eq!(users[0].total_prs, 2);
        assert_eq!(users[0].closed_prs, 1);
        assert_eq!(users[0].average_time_to_close, 24.0);
        assert_eq!(users[0].longest_time_to_close, 24.0);
    }

    #[test]
    fn test_user_metrics_ordering_is_stable_on_ties() {
        let prs = vec![
            pr(1, "carol", day(1), None),
            pr(2, "bob", day(1), None),
            pr(3, "bob", day(1), None),
            pr(4, "alice", day(1), None),
        ];

        let names: Vec<String> = user_metrics(&prs)
            .into_iter()
            .map(|u| u.unique_name)
            .collect();
        assert_eq!(names, vec!["bob", "carol", "alice"]);
    }

    #[test]
    fn test_time_series_buckets_by_sunday() {
        // 2024-01-10 is a Wednesday, 2024-01-07 the Sunday before it.
        let wednesday = Utc.with_ymd_and_hms(2024, 1, 10, 15, 0, 0).unwrap();
        let sunday = Utc.with_ymd_and_hms(2024, 1, 14, 1, 0, 0).unwrap();
        let prs = vec![
            pr(1, "a", wednesday - Duration::hours(10), Some(wednesday)),
            pr(2, "a", wednesday - Duration::hours(20), Some(wednesday)),
            pr(3, "a", sunday - Duration::hours(4), Some(sunday)),
            pr(4, "a", day(1), None),
        ];

        let series = time_series_data(&prs);
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].date, "2024-01-07");
        assert_eq!(series[0].pr_count, 2);
        assert_eq!(series[0].average_close_time, 15.0);
        assert_eq!(series[1].date, "2024-01-14");
        assert_eq!(series[1].pr_count, 1);

        for point in &series {
            let date = chrono::NaiveDate::parse_from_str(&point.date, "%Y-%m-%d").unwrap();
            assert_eq!(date.weekday(), Weekday::Sun);
        }
    }

    #[test]
    fn test_time_series_sorted_ascending() {
        let prs = vec![
            pr(1, "a", day(20), Some(day(22))),
            pr(2, "a", day(1), Some(day(2))),
        ];

        let dates: Vec<String> = time_series_data(&prs).into_iter().map(|p| p.date).collect();
        assert_eq!(dates, vec!["2023-12-31", "2024-01-21"]);
    }

    #[test]
    fn test_reviewer_metrics_tallies_votes() {
        let open = vec![
            open_pr(1, "a", day(1), vec![reviewer("rev", 5), reviewer("other", -5)]),
            open_pr(2, "a", day(2), vec![reviewer("rev", -10)]),
            open_pr(3, "a", day(3), vec![reviewer("rev", 0)]),
        ];

        let metrics = reviewer_metrics(&open);
        assert_eq!(metrics.len(), 2);

        let rev = &metrics[0];
        assert_eq!(rev.unique_name, "rev");
        assert_eq!(rev.review_count, 3);
        assert_eq!(rev.approved_reviews, 1);
        assert_eq!(rev.rejected_reviews, 1);
        assert_eq!(rev.pending_reviews, 1);

        let other = &metrics[1];
        assert_eq!(other.review_count, 1);
        assert_eq!(other.pending_reviews, 1);
        assert_eq!(other.approved_reviews, 0);
    }

    #[test]
    fn test_reviewer_metrics_unknown_vote_only_counts_as_review() {
        let open = vec![open_pr(1, "a", day(1), vec![reviewer("rev", 7)])];

        let metrics = reviewer_metrics(&open);
        assert_eq!(metrics[0].review_count, 1);
        assert_eq!(
            metrics[0].pending_reviews + metrics[0].approved_reviews + metrics[0].rejected_reviews,
            0
        );
    }

    #[test]
    fn test_open_pr_metrics_and_user_counts() {
        let now = day(11);
        let mut draft = open_pr(3, "bob", day(10), vec![]);
        draft.is_draft = true;
        let open = vec![
            open_pr(1, "alice", day(1), vec![]),
            open_pr(2, "bob", day(9), vec![]),
            draft,
        ];

        let metrics = open_pr_metrics(&open, now);
        assert_eq!(metrics.total_open_prs, 3);
        assert_eq!(metrics.draft_prs, 1);
        assert_eq!(metrics.oldest_pr, 240.0);
        assert_eq!(metrics.average_age, (240.0 + 48.0 + 24.0) / 3.0);

        let counts = user_open_pr_counts(&open, now);
        assert_eq!(counts[0].unique_name, "bob");
        assert_eq!(counts[0].open_pr_count, 2);
        assert_eq!(counts[0].average_age, 36.0);
        assert_eq!(counts[1].unique_name, "alice");
    }

    #[test]
    fn test_open_pr_analytics_sorts_oldest_first_without_touching_input() {
        let now = day(20);
        let open = vec![
            open_pr(1, "a", day(10), vec![]),
            open_pr(2, "a", day(2), vec![]),
            open_pr(3, "a", day(15), vec![]),
        ];

        let analytics = open_pr_analytics(&open, now);
        let ids: Vec<u64> = analytics.open_prs.iter().map(|pr| pr.pull_request_id).collect();
        assert_eq!(ids, vec![2, 1, 3]);
        assert_eq!(open[0].pull_request_id, 1);
    }

    #[test]
    fn test_open_pr_analytics_empty() {
        let analytics = open_pr_analytics(&[], day(1));

        assert_eq!(analytics.metrics.total_open_prs, 0);
        assert_eq!(analytics.metrics.average_age, 0.0);
        assert_eq!(analytics.metrics.oldest_pr, 0.0);
        assert!(analytics.user_counts.is_empty());
        assert!(analytics.reviewer_metrics.is_empty());
        assert!(analytics.open_prs.is_empty());
    }

    #[test]
    fn test_filter_by_date_range_is_inclusive() {
        let prs = vec![
            pr(1, "a", day(1), None),
            pr(2, "a", day(5), None),
            pr(3, "a", day(10), None),
            pr(4, "a", day(11), None),
        ];
        let range = DateRange::new(day(5), day(10)).unwrap();

        let kept: Vec<u64> = filter_by_date_range(&prs, Some(&range))
            .iter()
            .map(|pr| pr.pull_request_id)
            .collect();
        assert_eq!(kept, vec![2, 3]);
        assert_eq!(filter_by_date_range(&prs, None).len(), 4);
    }

    #[test]
    fn test_compute_analytics_filters_both_collections() {
        let prs = vec![
            pr(1, "a", day(1), Some(day(2))),
            pr(2, "b", day(8), Some(day(9))),
        ];
        let open = vec![
            open_pr(10, "a", day(1), vec![reviewer("r", 10)]),
            open_pr(11, "b", day(8), vec![]),
        ];
        let range = DateRange::new(day(5), day(15)).unwrap();

        let analytics = compute_analytics_at(&prs, &open, Some(range), day(20));
        assert_eq!(analytics.overall_metrics.total_prs, 1);
        assert_eq!(analytics.user_metrics[0].unique_name, "b");
        assert_eq!(analytics.time_series_data.len(), 1);
        assert_eq!(analytics.open_pr_analytics.metrics.total_open_prs, 1);
        assert!(analytics.open_pr_analytics.reviewer_metrics.is_empty());
        assert_eq!(analytics.date_range, Some(range));
    }

    #[test]
    fn test_compute_analytics_closed_side_is_idempotent() {
        let prs = vec![
            pr(1, "a", day(1), Some(day(2))),
            pr(2, "b", day(3), Some(day(7))),
            pr(3, "a", day(4), None),
        ];
        let open = vec![open_pr(4, "a", day(4), vec![])];

        let first = compute_analytics(&prs, &open, None);
        let second = compute_analytics(&prs, &open, None);
        assert_eq!(first.overall_metrics, second.overall_metrics);
        assert_eq!(first.user_metrics, second.user_metrics);
        assert_eq!(first.time_series_data, second.time_series_data);
        assert_eq!(first.date_range, None);
    }

    #[test]
    fn test_analytics_serializes_dashboard_field_names() {
        let analytics = compute_analytics_at(&[], &[], None, day(1));
        let json = serde_json::to_value(&analytics).unwrap();

        assert_eq!(json["overallMetrics"]["averageTimeToClose"], 0.0);
        assert_eq!(json["overallMetrics"]["totalPRs"], 0);
        assert_eq!(json["openPRAnalytics"]["metrics"]["oldestPR"], 0.0);
        assert_eq!(json["openPRAnalytics"]["metrics"]["totalOpenPRs"], 0);
        assert!(json["openPRAnalytics"]["openPRs"].is_array());
        assert!(json.get("dateRange").is_none());
    }
}

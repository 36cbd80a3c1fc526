//! Search and sort for the dashboard tables.
//!
//! Each function returns a new vector; the input rows are left untouched.

use crate::metrics::{open_pr_age, ReviewerMetrics, UserMetrics};
use crate::types::OpenPR;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::cmp::Ordering;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
pub enum UserSortField {
    #[serde(rename = "displayName")]
    DisplayName,
    #[default]
    #[serde(rename = "totalPRs")]
    TotalPrs,
    #[serde(rename = "closedPRs")]
    ClosedPrs,
    #[serde(rename = "averageTimeToClose")]
    AverageTimeToClose,
    #[serde(rename = "longestTimeToClose")]
    LongestTimeToClose,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReviewerSortField {
    DisplayName,
    #[default]
    ReviewCount,
    PendingReviews,
    ApprovedReviews,
    RejectedReviews,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OpenPRSortField {
    Title,
    CreatedBy,
    #[default]
    Age,
    /// Drafts sort before published pull requests.
    Status,
    Reviewers,
}

/// Restricts the open PR table to drafts, non-drafts, or both.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DraftFilter {
    #[default]
    All,
    Draft,
    Active,
}

impl DraftFilter {
    fn accepts(self, pr: &OpenPR) -> bool {
        match self {
            Self::All => true,
            Self::Draft => pr.is_draft,
            Self::Active => !pr.is_draft,
        }
    }
}

/// Case-insensitive substring match against any of `fields`. An empty term matches all.
fn matches_search(term: &str, fields: &[&str]) -> bool {
    let term = term.trim().to_lowercase();
    term.is_empty() || fields.iter().any(|field| field.to_lowercase().contains(&term))
}

fn compare_text(a: &str, b: &str) -> Ordering {
    a.to_lowercase().cmp(&b.to_lowercase())
}

fn sorted<T: Clone>(
    rows: &[T],
    direction: SortDirection,
    compare: impl Fn(&T, &T) -> Ordering,
) -> Vec<T> {
    let mut rows = rows.to_vec();
    rows.sort_by(|a, b| match direction {
        SortDirection::Asc => compare(a, b),
        SortDirection::Desc => compare(b, a),
    });
    rows
}

pub fn search_users(users: &[UserMetrics], term: &str) -> Vec<UserMetrics> {
    users
        .iter()
        .filter(|user| matches_search(term, &[user.display_name.as_str(), user.unique_name.as_str()]))
        .cloned()
        .collect()
}

pub fn sort_users(
    users: &[UserMetrics],
    field: UserSortField,
    direction: SortDirection,
) -> Vec<UserMetrics> {
    sorted(users, direction, |a, b| match field {
        UserSortField::DisplayName => compare_text(&a.display_name, &b.display_name),
        UserSortField::TotalPrs => a.total_prs.cmp(&b.total_prs),
        UserSortField::ClosedPrs => a.closed_prs.cmp(&b.closed_prs),
        UserSortField::AverageTimeToClose => {
            a.average_time_to_close.total_cmp(&b.average_time_to_close)
        }
        UserSortField::LongestTimeToClose => {
            a.longest_time_to_close.total_cmp(&b.longest_time_to_close)
        }
    })
}

pub fn search_reviewers(reviewers: &[ReviewerMetrics], term: &str) -> Vec<ReviewerMetrics> {
    reviewers
        .iter()
        .filter(|reviewer| {
            matches_search(
                term,
                &[reviewer.display_name.as_str(), reviewer.unique_name.as_str()],
            )
        })
        .cloned()
        .collect()
}

pub fn sort_reviewers(
    reviewers: &[ReviewerMetrics],
    field: ReviewerSortField,
    direction: SortDirection,
) -> Vec<ReviewerMetrics> {
    sorted(reviewers, direction, |a, b| match field {
        ReviewerSortField::DisplayName => compare_text(&a.display_name, &b.display_name),
        ReviewerSortField::ReviewCount => a.review_count.cmp(&b.review_count),
        ReviewerSortField::PendingReviews => a.pending_reviews.cmp(&b.pending_reviews),
        ReviewerSortField::ApprovedReviews => a.approved_reviews.cmp(&b.approved_reviews),
        ReviewerSortField::RejectedReviews => a.rejected_reviews.cmp(&b.rejected_reviews),
    })
}

/// Filters open pull requests by title or author display name, and by draft state.
pub fn search_open_prs(open_prs: &[OpenPR], term: &str, drafts: DraftFilter) -> Vec<OpenPR> {
    open_prs
        .iter()
        .filter(|pr| drafts.accepts(pr))
        .filter(|pr| matches_search(term, &[pr.title.as_str(), pr.created_by.display_name.as_str()]))
        .cloned()
        .collect()
}

pub fn sort_open_prs(
    open_prs: &[OpenPR],
    field: OpenPRSortField,
    direction: SortDirection,
    now: DateTime<Utc>,
) -> Vec<OpenPR> {
    sorted(open_prs, direction, |a, b| match field {
        OpenPRSortField::Title => compare_text(&a.title, &b.title),
        OpenPRSortField::CreatedBy => {
            compare_text(&a.created_by.display_name, &b.created_by.display_name)
        }
        OpenPRSortField::Age => open_pr_age(a, now).total_cmp(&open_pr_age(b, now)),
        OpenPRSortField::Status => b.is_draft.cmp(&a.is_draft),
        OpenPRSortField::Reviewers => a.reviewers.len().cmp(&b.reviewers.len()),
    })
}

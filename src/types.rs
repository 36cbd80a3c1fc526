//! Records exchanged between the Azure DevOps adapter and the analytics engine.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Connection details for one Azure DevOps project.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub organization: String,
    pub project: String,
    pub personal_access_token: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("organization", &self.organization)
            .field("project", &self.project)
            .field("personal_access_token", &"<redacted>")
            .finish()
    }
}

/// An Azure DevOps identity as it appears on pull requests and reviewer lists.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub display_name: String,
    /// Stable key used for grouping (usually the account e-mail).
    pub unique_name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// A pull request from the closed-and-open universe.
///
/// A record without `closed_date` counts as still open for time-to-close math.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequest {
    pub pull_request_id: u64,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub created_by: Identity,
    pub creation_date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_date: Option<DateTime<Utc>>,
    pub status: String,
    #[serde(default)]
    pub is_draft: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<RepositoryRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_ref_name: Option<String>,
}

/// An active pull request enriched with its reviewers and a browsable URL.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenPR {
    pub pull_request_id: u64,
    pub title: String,
    pub description: String,
    pub created_by: Identity,
    pub creation_date: DateTime<Utc>,
    pub status: String,
    pub is_draft: bool,
    pub url: String,
    pub reviewers: Vec<Reviewer>,
}

/// Serialized with its vote classification alongside the raw code.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", into = "ReviewerView")]
pub struct Reviewer {
    pub display_name: String,
    pub unique_name: String,
    pub vote: i32,
}

impl Reviewer {
    pub fn status(&self) -> VoteStatus {
        VoteStatus::from_code(self.vote)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReviewerView {
    display_name: String,
    unique_name: String,
    vote: i32,
    status: VoteStatus,
    status_label: &'static str,
}

impl From<Reviewer> for ReviewerView {
    fn from(reviewer: Reviewer) -> Self {
        let status = reviewer.status();
        Self {
            display_name: reviewer.display_name,
            unique_name: reviewer.unique_name,
            vote: reviewer.vote,
            status,
            status_label: status.label(),
        }
    }
}

/// Classification of an Azure DevOps reviewer vote code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum VoteStatus {
    Approved,
    ApprovedWithSuggestions,
    NoVote,
    WaitingForAuthor,
    Rejected,
    Unknown(i32),
}

impl VoteStatus {
    pub fn from_code(vote: i32) -> Self {
        match vote {
            10 => Self::Approved,
            5 => Self::ApprovedWithSuggestions,
            0 => Self::NoVote,
            -5 => Self::WaitingForAuthor,
            -10 => Self::Rejected,
            other => Self::Unknown(other),
        }
    }

    pub fn is_approved(self) -> bool {
        matches!(self, Self::Approved | Self::ApprovedWithSuggestions)
    }

    pub fn is_pending(self) -> bool {
        matches!(self, Self::NoVote | Self::WaitingForAuthor)
    }

    pub fn is_rejected(self) -> bool {
        matches!(self, Self::Rejected)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Approved => "Approved",
            Self::ApprovedWithSuggestions => "Approved with suggestions",
            Self::NoVote => "No vote",
            Self::WaitingForAuthor => "Waiting for author",
            Self::Rejected => "Rejected",
            Self::Unknown(_) => "Unknown",
        }
    }
}

/// Inclusive creation-date window used to restrict which records are analysed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRange {
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

impl DateRange {
    /// Builds a range, refusing one whose start lies after its end.
    pub fn new(start_date: DateTime<Utc>, end_date: DateTime<Utc>) -> Option<Self> {
        (start_date <= end_date).then_some(Self {
            start_date,
            end_date,
        })
    }

    /// The trailing `days`-long window ending at `now`.
    pub fn last_days(days: i64, now: DateTime<Utc>) -> Self {
        Self {
            start_date: now - Duration::days(days.max(0)),
            end_date: now,
        }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start_date && at <= self.end_date
    }
}

/// Anything that carries a creation timestamp and can be filtered by [`DateRange`].
pub trait Created {
    fn creation_date(&self) -> DateTime<Utc>;
}

impl Created for PullRequest {
    fn creation_date(&self) -> DateTime<Utc> {
        self.creation_date
    }
}

impl Created for OpenPR {
    fn creation_date(&self) -> DateTime<Utc> {
        self.creation_date
    }
}

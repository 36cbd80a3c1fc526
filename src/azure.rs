//! Azure DevOps REST client.
//!
//! Fetches the two pull request collections the dashboard works from: every
//! pull request in the project, and the active ones enriched with their
//! reviewer votes and a browsable URL.

use crate::config::AppConfig;
use crate::error::{AdoError, OPEN_PULL_REQUESTS_FETCH_MESSAGE, PULL_REQUESTS_FETCH_MESSAGE};
use crate::types::{Credentials, DateRange, OpenPR, PullRequest, Reviewer};
use futures::stream::{self, StreamExt};
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;

/// Repository segment used in PR links when no repository name can be resolved.
pub const DEFAULT_REPOSITORY_NAME: &str = "default";

/// Pages of the bulk query kept in flight at once.
const PAGE_CONCURRENCY_LIMIT: usize = 4;

/// Query values for the pull request `searchCriteria.status` filter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusFilter {
    All,
    Active,
}

impl StatusFilter {
    fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Active => "active",
        }
    }
}

#[derive(Deserialize)]
struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    value: Vec<T>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct RawReviewer {
    display_name: Option<String>,
    unique_name: Option<String>,
    id: Option<String>,
    vote: Option<i32>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

impl From<RawReviewer> for Reviewer {
    fn from(raw: RawReviewer) -> Self {
        let unique_name = non_empty(raw.unique_name);
        Self {
            display_name: non_empty(raw.display_name)
                .or_else(|| unique_name.clone())
                .unwrap_or_else(|| "Unknown".to_string()),
            unique_name: unique_name
                .or_else(|| non_empty(raw.id))
                .unwrap_or_else(|| "unknown".to_string()),
            vote: raw.vote.unwrap_or(0),
        }
    }
}

/// Resolves the repository name for a pull request link.
///
/// Prefers the explicit repository name, then the third segment of the source
/// branch ref (`refs/heads/<segment>/...`), then [`DEFAULT_REPOSITORY_NAME`].
pub fn repository_name(pr: &PullRequest) -> &str {
    pr.repository
        .as_ref()
        .and_then(|repo| repo.name.as_deref())
        .filter(|name| !name.is_empty())
        .or_else(|| {
            pr.source_ref_name
                .as_deref()
                .and_then(|source| source.split('/').nth(2))
                .filter(|segment| !segment.is_empty())
        })
        .unwrap_or(DEFAULT_REPOSITORY_NAME)
}

/// Builds the web URL of a pull request:
/// `{base}/{organization}/{project}/_git/{repository}/pullrequest/{id}`.
pub fn pull_request_url(base: &Url, credentials: &Credentials, pr: &PullRequest) -> String {
    let id = pr.pull_request_id.to_string();
    let mut url = base.clone();
    if let Ok(mut segments) = url.path_segments_mut() {
        segments.pop_if_empty().extend([
            credentials.organization.as_str(),
            credentials.project.as_str(),
            "_git",
            repository_name(pr),
            "pullrequest",
            id.as_str(),
        ]);
    }
    url.to_string()
}

/// Attaches reviewers and the web URL to an active pull request.
fn into_open_pr(pr: PullRequest, url: String, reviewers: Vec<Reviewer>) -> OpenPR {
    OpenPR {
        pull_request_id: pr.pull_request_id,
        title: pr.title,
        description: pr.description,
        created_by: pr.created_by,
        creation_date: pr.creation_date,
        status: pr.status,
        is_draft: pr.is_draft,
        url,
        reviewers,
    }
}

/// A client bound to one organization and project.
///
/// Built once per dashboard session and shared by reference between fetches.
#[derive(Clone)]
pub struct AzureDevOpsClient {
    http: Client,
    base: Url,
    credentials: Credentials,
    api_version: String,
    page_size: u32,
    max_pages: u32,
    reviewer_concurrency_limit: usize,
}

impl AzureDevOpsClient {
    pub fn new(credentials: Credentials, config: &AppConfig) -> Result<Self, AdoError> {
        let http = Client::builder()
            .timeout(config.request_timeout())
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(AdoError::Client)?;

        let base = Url::parse(&config.ado_base_url)
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| AdoError::InvalidBaseUrl(config.ado_base_url.clone()))?;

        Ok(Self {
            http,
            base,
            credentials,
            api_version: config.ado_api_version.clone(),
            page_size: config.page_size.max(1),
            max_pages: config.max_api_pages.max(1),
            reviewer_concurrency_limit: config.reviewer_concurrency_limit.max(1),
        })
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// `{base}/{organization}/{project}/_apis/{segments...}`
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty()
                .extend([
                    self.credentials.organization.as_str(),
                    self.credentials.project.as_str(),
                    "_apis",
                ])
                .extend(segments);
        }
        url
    }

    fn get(&self, url: Url) -> reqwest::RequestBuilder {
        self.http
            .get(url)
            .basic_auth("", Some(&self.credentials.personal_access_token))
            .query(&[("api-version", self.api_version.as_str())])
    }

    /// Fetches every pull request regardless of status.
    pub async fn fetch_all_pull_requests(
        &self,
        range: Option<&DateRange>,
    ) -> Result<Vec<PullRequest>, AdoError> {
        let prs = self
            .query_pull_requests(StatusFilter::All, range)
            .await
            .map_err(|source| {
                tracing::error!(
                    organization = %self.credentials.organization,
                    project = %self.credentials.project,
                    "Error fetching pull requests: {}",
                    source
                );
                AdoError::Fetch {
                    message: PULL_REQUESTS_FETCH_MESSAGE,
                    source: source.into(),
                }
            })?;

        tracing::debug!(count = prs.len(), "Fetched pull requests");
        Ok(prs)
    }

    /// Fetches active pull requests and looks up the reviewers of each one.
    ///
    /// A failed reviewer lookup leaves that pull request with no reviewers; it
    /// never fails the whole call. Output order follows the query order.
    pub async fn fetch_open_pull_requests(
        &self,
        range: Option<&DateRange>,
    ) -> Result<Vec<OpenPR>, AdoError> {
        let prs = self
            .query_pull_requests(StatusFilter::Active, range)
            .await
            .map_err(|source| {
                tracing::error!(
                    organization = %self.credentials.organization,
                    project = %self.credentials.project,
                    "Error fetching open pull requests: {}",
                    source
                );
                AdoError::Fetch {
                    message: OPEN_PULL_REQUESTS_FETCH_MESSAGE,
                    source: source.into(),
                }
            })?;

        let open_prs: Vec<OpenPR> = stream::iter(prs)
            .map(|pr| async move {
                let reviewers = match self.fetch_reviewers(&pr).await {
                    Ok(reviewers) => reviewers,
                    Err(e) => {
                        tracing::warn!(
                            pull_request_id = pr.pull_request_id,
                            "Failed to fetch reviewers: {:#}",
                            anyhow::Error::from(e)
                        );
                        Vec::new()
                    }
                };
                let url = pull_request_url(&self.base, &self.credentials, &pr);
                into_open_pr(pr, url, reviewers)
            })
            .buffered(self.reviewer_concurrency_limit)
            .collect()
            .await;

        tracing::debug!(count = open_prs.len(), "Fetched open pull requests");
        Ok(open_prs)
    }

    /// Issues a cheap authenticated request; `false` on any failure.
    pub async fn test_connection(&self) -> bool {
        let response = self.get(self.endpoint(&["git", "repositories"])).send().await;

        match response {
            // A rejected token is answered with a 203 and an HTML sign-in page.
            Ok(response)
                if response.status().is_success()
                    && response.status() != StatusCode::NON_AUTHORITATIVE_INFORMATION =>
            {
                true
            }
            Ok(response) => {
                tracing::error!(status = %response.status(), "Connection test failed");
                false
            }
            Err(e) => {
                tracing::error!("Connection test failed: {}", e);
                false
            }
        }
    }

    async fn fetch_reviewers(&self, pr: &PullRequest) -> Result<Vec<Reviewer>, AdoError> {
        let id = pr.pull_request_id.to_string();
        let url = match pr.repository.as_ref().and_then(|repo| repo.id.as_deref()) {
            Some(repository_id) => self.endpoint(&[
                "git",
                "repositories",
                repository_id,
                "pullRequests",
                id.as_str(),
                "reviewers",
            ]),
            None => self.endpoint(&["git", "pullrequests", id.as_str(), "reviewers"]),
        };

        let fetch = async {
            self.get(url)
                .send()
                .await?
                .error_for_status()?
                .json::<ListResponse<RawReviewer>>()
                .await
        };

        let reviewers = fetch.await.map_err(|source| AdoError::Reviewers {
            pull_request_id: pr.pull_request_id,
            source,
        })?;

        Ok(reviewers.value.into_iter().map(Reviewer::from).collect())
    }

    /// Pages through `/git/pullrequests` until a short page or the page limit.
    async fn query_pull_requests(
        &self,
        status: StatusFilter,
        range: Option<&DateRange>,
    ) -> Result<Vec<PullRequest>, reqwest::Error> {
        let mut prs = Vec::new();
        let mut hit_page_limit = true;

        let mut page_stream = stream::iter(0..self.max_pages)
            .map(|page| self.fetch_page(status, range, page * self.page_size))
            .buffered(PAGE_CONCURRENCY_LIMIT);

        while let Some(result) = page_stream.next().await {
            let (records, raw_count) = result?;
            prs.extend(records);

            if raw_count < self.page_size as usize {
                hit_page_limit = false;
                break;
            }
        }

        if hit_page_limit {
            tracing::warn!(
                "Hit max_api_pages ({}) for {}/{} before the last page. Data may be incomplete.",
                self.max_pages,
                self.credentials.organization,
                self.credentials.project
            );
        }

        Ok(prs)
    }

    /// Fetches one page, returning the decoded records and the raw record count.
    ///
    /// Records that do not decode (for example, missing an author) are skipped.
    async fn fetch_page(
        &self,
        status: StatusFilter,
        range: Option<&DateRange>,
        skip: u32,
    ) -> Result<(Vec<PullRequest>, usize), reqwest::Error> {
        let mut query = vec![
            ("searchCriteria.status", status.as_str().to_string()),
            ("$top", self.page_size.to_string()),
            ("$skip", skip.to_string()),
        ];
        if let Some(range) = range {
            query.push(("searchCriteria.queryTimeRangeType", "created".to_string()));
            query.push(("searchCriteria.minTime", range.start_date.to_rfc3339()));
            query.push(("searchCriteria.maxTime", range.end_date.to_rfc3339()));
        }

        let page = self
            .get(self.endpoint(&["git", "pullrequests"]))
            .query(&query)
            .send()
            .await?
            .error_for_status()?
            .json::<ListResponse<serde_json::Value>>()
            .await?;

        let raw_count = page.value.len();
        let records = page
            .value
            .into_iter()
            .filter_map(|raw| match serde_json::from_value::<PullRequest>(raw) {
                Ok(pr) => Some(pr),
                Err(e) => {
                    tracing::warn!("Skipping malformed pull request record: {}", e);
                    None
                }
            })
            .collect();

        Ok((records, raw_count))
    }
}

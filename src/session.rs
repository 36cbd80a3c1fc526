//! Dashboard sessions.
//!
//! A session owns the Azure DevOps client built from the user's credentials
//! and the raw pull request snapshot fetched with it. Analytics are never
//! stored; they are recomputed from the snapshot on every request.

use crate::azure::AzureDevOpsClient;
use crate::config::AppConfig;
use crate::error::AdoError;
use crate::metrics::{self, AnalyticsData};
use crate::types::{Credentials, DateRange, OpenPR, PullRequest};
use chrono::{DateTime, Utc};
use moka::future::Cache;
use moka::ops::compute::{CompResult, Op};
use std::sync::Arc;
use uuid::Uuid;

/// Raw data fetched for one dashboard session.
pub struct DashboardSession {
    client: Arc<AzureDevOpsClient>,
    pub pull_requests: Vec<PullRequest>,
    pub open_pull_requests: Vec<OpenPR>,
    pub fetched_at: DateTime<Utc>,
    /// Server-side creation filter the snapshot was fetched with, if any.
    pub fetch_range: Option<DateRange>,
}

impl DashboardSession {
    /// Fetches both pull request collections concurrently.
    pub async fn load(
        client: Arc<AzureDevOpsClient>,
        range: Option<DateRange>,
    ) -> Result<Self, AdoError> {
        let (pull_requests, open_pull_requests) = tokio::try_join!(
            client.fetch_all_pull_requests(range.as_ref()),
            client.fetch_open_pull_requests(range.as_ref()),
        )?;

        Ok(Self {
            client,
            pull_requests,
            open_pull_requests,
            fetched_at: Utc::now(),
            fetch_range: range,
        })
    }

    pub fn analytics(&self, range: Option<DateRange>) -> AnalyticsData {
        metrics::compute_analytics(&self.pull_requests, &self.open_pull_requests, range)
    }

    pub fn organization(&self) -> &str {
        &self.client.credentials().organization
    }

    pub fn project(&self) -> &str {
        &self.client.credentials().project
    }
}

/// In-memory session registry with idle expiry.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Cache<Uuid, Arc<DashboardSession>>,
    config: AppConfig,
}

impl SessionStore {
    pub fn new(config: &AppConfig) -> Self {
        let sessions = Cache::builder()
            .max_capacity(config.session_max_capacity)
            .time_to_idle(config.session_ttl())
            .build();

        Self {
            sessions,
            config: config.clone(),
        }
    }

    /// Validates the credentials, fetches the initial snapshot and registers a session.
    pub async fn open(
        &self,
        credentials: Credentials,
    ) -> Result<(Uuid, Arc<DashboardSession>), AdoError> {
        let client = Arc::new(AzureDevOpsClient::new(credentials, &self.config)?);

        if !client.test_connection().await {
            return Err(AdoError::Authentication);
        }

        let session = Arc::new(DashboardSession::load(client, None).await?);
        let id = Uuid::new_v4();
        self.sessions.insert(id, session.clone()).await;

        tracing::info!(
            session_id = %id,
            organization = session.organization(),
            project = session.project(),
            "Opened dashboard session"
        );
        Ok((id, session))
    }

    pub async fn get(&self, id: &Uuid) -> Option<Arc<DashboardSession>> {
        self.sessions.get(id).await
    }

    /// Refetches a session's snapshot, optionally narrowed server-side to `range`.
    ///
    /// Returns `Ok(None)` for an unknown session, including one closed or
    /// expired while the refetch was running. On failure the previous snapshot
    /// stays in place.
    pub async fn refresh(
        &self,
        id: &Uuid,
        range: Option<DateRange>,
    ) -> Result<Option<Arc<DashboardSession>>, AdoError> {
        let Some(current) = self.sessions.get(id).await else {
            return Ok(None);
        };

        let session = Arc::new(DashboardSession::load(current.client.clone(), range).await?);

        // Only replace a session that is still registered.
        let replacement = session.clone();
        let result = self
            .sessions
            .entry(*id)
            .and_compute_with(|entry| async move {
                match entry {
                    Some(_) => Op::Put(replacement),
                    None => Op::Nop,
                }
            })
            .await;

        match result {
            CompResult::ReplacedWith(_) => {
                tracing::info!(session_id = %id, "Refreshed dashboard session");
                Ok(Some(session))
            }
            _ => {
                tracing::debug!(session_id = %id, "Session closed during refresh");
                Ok(None)
            }
        }
    }

    /// Drops a session. Returns whether it existed.
    pub async fn close(&self, id: &Uuid) -> bool {
        self.sessions.remove(id).await.is_some()
    }
}

pub mod azure;
pub mod config;
pub mod error;
pub mod metrics;
pub mod session;
pub mod table;
pub mod types;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use config::AppConfig;
use error::ApiError;
use metrics::{AnalyticsData, ReviewerMetrics, UserMetrics};
use serde::{Deserialize, Serialize};
use session::{DashboardSession, SessionStore};
use std::sync::Arc;
use table::{DraftFilter, OpenPRSortField, ReviewerSortField, SortDirection, UserSortField};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use types::{Credentials, DateRange, OpenPR};
use uuid::Uuid;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
}

/// Shared application state accessible to all request handlers.
pub struct AppState {
    /// Open dashboard sessions.
    pub sessions: SessionStore,
    /// Application configuration loaded from environment variables.
    pub config: AppConfig,
}

impl AppState {
    pub fn new(config: AppConfig) -> anyhow::Result<Self> {
        anyhow::ensure!(
            reqwest::Url::parse(&config.ado_base_url).is_ok(),
            "ADO_BASE_URL is not a valid URL: {}",
            config.ado_base_url
        );
        let sessions = SessionStore::new(&config);
        Ok(Self { sessions, config })
    }
}

pub fn create_app(state: Arc<AppState>) -> Router {
    let index = format!("{}/index.html", state.config.static_dir);
    let serve_dir =
        ServeDir::new(&state.config.static_dir).not_found_service(ServeFile::new(index));

    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/sessions", post(open_session))
        .route("/api/sessions/{id}", delete(close_session))
        .route("/api/sessions/{id}/analytics", get(get_analytics))
        .route("/api/sessions/{id}/refresh", post(refresh_session))
        .route("/api/sessions/{id}/tables/users", get(get_users_table))
        .route("/api/sessions/{id}/tables/reviewers", get(get_reviewers_table))
        .route("/api/sessions/{id}/tables/open-prs", get(get_open_prs_table))
        .fallback_service(serve_dir)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Either an explicit `startDate`/`endDate` pair or a trailing `days` preset.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeQuery {
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub days: Option<i64>,
}

impl RangeQuery {
    fn range(&self) -> Result<Option<DateRange>, ApiError> {
        match (self.start_date, self.end_date, self.days) {
            (None, None, None) => Ok(None),
            (None, None, Some(days)) if days > 0 => {
                Ok(Some(DateRange::last_days(days, Utc::now())))
            }
            (None, None, Some(_)) => Err(ApiError::BadRequest(
                "days must be a positive number".to_string(),
            )),
            (Some(start), Some(end), None) => {
                DateRange::new(start, end).map(Some).ok_or_else(|| {
                    ApiError::BadRequest("startDate must not be after endDate".to_string())
                })
            }
            (_, _, Some(_)) => Err(ApiError::BadRequest(
                "days cannot be combined with startDate or endDate".to_string(),
            )),
            _ => Err(ApiError::BadRequest(
                "startDate and endDate must be given together".to_string(),
            )),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct UsersTableQuery {
    #[serde(default)]
    pub search: String,
    #[serde(default)]
    pub sort: UserSortField,
    #[serde(default)]
    pub direction: SortDirection,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReviewersTableQuery {
    #[serde(default)]
    pub search: String,
    #[serde(default)]
    pub sort: ReviewerSortField,
    #[serde(default)]
    pub direction: SortDirection,
}

#[derive(Debug, Default, Deserialize)]
pub struct OpenPRsTableQuery {
    #[serde(default)]
    pub search: String,
    #[serde(default)]
    pub sort: OpenPRSortField,
    #[serde(default)]
    pub direction: SortDirection,
    #[serde(default)]
    pub status: DraftFilter,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub session_id: Uuid,
    pub organization: String,
    pub project: String,
    pub fetched_at: DateTime<Utc>,
    /// Creation window the snapshot was narrowed to upstream, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fetch_range: Option<DateRange>,
    pub analytics: AnalyticsData,
}

impl SessionResponse {
    fn new(session_id: Uuid, session: &DashboardSession, range: Option<DateRange>) -> Self {
        Self {
            session_id,
            organization: session.organization().to_string(),
            project: session.project().to_string(),
            fetched_at: session.fetched_at,
            fetch_range: session.fetch_range,
            analytics: session.analytics(range),
        }
    }
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: "ado-pr-analytics",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn find_session(state: &AppState, id: &Uuid) -> Result<Arc<DashboardSession>, ApiError> {
    state
        .sessions
        .get(id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("Session {} not found", id)))
}

pub async fn open_session(
    State(state): State<Arc<AppState>>,
    Json(credentials): Json<Credentials>,
) -> Result<(StatusCode, Json<SessionResponse>), ApiError> {
    if [
        &credentials.organization,
        &credentials.project,
        &credentials.personal_access_token,
    ]
    .iter()
    .any(|field| field.trim().is_empty())
    {
        return Err(ApiError::BadRequest(
            "organization, project and personalAccessToken are required".to_string(),
        ));
    }

    let (id, session) = state.sessions.open(credentials).await?;
    Ok((
        StatusCode::CREATED,
        Json(SessionResponse::new(id, &session, None)),
    ))
}

pub async fn close_session(
    Path(id): Path<Uuid>,
    State(state): State<Arc<AppState>>,
) -> Result<StatusCode, ApiError> {
    if state.sessions.close(&id).await {
        tracing::info!(session_id = %id, "Closed dashboard session");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("Session {} not found", id)))
    }
}

pub async fn get_analytics(
    Path(id): Path<Uuid>,
    Query(query): Query<RangeQuery>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<AnalyticsData>, ApiError> {
    let range = query.range()?;
    let session = find_session(&state, &id).await?;
    tracing::debug!(session_id = %id, ?range, "Returning analytics");
    Ok(Json(session.analytics(range)))
}

pub async fn refresh_session(
    Path(id): Path<Uuid>,
    Query(query): Query<RangeQuery>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<SessionResponse>, ApiError> {
    let range = query.range()?;
    let session = state
        .sessions
        .refresh(&id, range)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Session {} not found", id)))?;

    Ok(Json(SessionResponse::new(id, &session, range)))
}

pub async fn get_users_table(
    Path(id): Path<Uuid>,
    Query(range): Query<RangeQuery>,
    Query(query): Query<UsersTableQuery>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<UserMetrics>>, ApiError> {
    let range = range.range()?;
    let session = find_session(&state, &id).await?;
    let rows = session.analytics(range).user_metrics;

    let rows = table::search_users(&rows, &query.search);
    Ok(Json(table::sort_users(&rows, query.sort, query.direction)))
}

pub async fn get_reviewers_table(
    Path(id): Path<Uuid>,
    Query(range): Query<RangeQuery>,
    Query(query): Query<ReviewersTableQuery>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ReviewerMetrics>>, ApiError> {
    let range = range.range()?;
    let session = find_session(&state, &id).await?;
    let rows = session.analytics(range).open_pr_analytics.reviewer_metrics;

    let rows = table::search_reviewers(&rows, &query.search);
    Ok(Json(table::sort_reviewers(&rows, query.sort, query.direction)))
}

pub async fn get_open_prs_table(
    Path(id): Path<Uuid>,
    Query(range): Query<RangeQuery>,
    Query(query): Query<OpenPRsTableQuery>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<OpenPR>>, ApiError> {
    let range = range.range()?;
    let session = find_session(&state, &id).await?;
    let rows = metrics::filter_by_date_range(&session.open_pull_requests, range.as_ref());

    let rows = table::search_open_prs(&rows, &query.search, query.status);
    Ok(Json(table::sort_open_prs(
        &rows,
        query.sort,
        query.direction,
        Utc::now(),
    )))
}

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

pub const PULL_REQUESTS_FETCH_MESSAGE: &str =
    "Failed to fetch pull requests. Please check your credentials and try again.";
pub const OPEN_PULL_REQUESTS_FETCH_MESSAGE: &str =
    "Failed to fetch open pull requests. Please check your credentials and try again.";
pub const AUTHENTICATION_MESSAGE: &str =
    "Failed to connect to Azure DevOps. Please check your organization, project, and personal access token.";

/// Failures raised while talking to Azure DevOps.
#[derive(Debug, Error)]
pub enum AdoError {
    /// The credentials were rejected by the connection probe.
    #[error("{msg}", msg = AUTHENTICATION_MESSAGE)]
    Authentication,

    /// A bulk pull request query failed. `message` is safe to show to users.
    #[error("{message}")]
    Fetch {
        message: &'static str,
        #[source]
        source: anyhow::Error,
    },

    /// Reviewer lookup for a single pull request failed.
    #[error("failed to fetch reviewers for pull request {pull_request_id}")]
    Reviewers {
        pull_request_id: u64,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("invalid Azure DevOps base URL: {0}")]
    InvalidBaseUrl(String),
}

/// Errors returned by the HTTP handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Upstream(String),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized(_) => "AUTHENTICATION_FAILED",
            Self::NotFound(_) => "NOT_FOUND",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Upstream(_) => "FETCH_FAILED",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<AdoError> for ApiError {
    fn from(err: AdoError) -> Self {
        match err {
            AdoError::Authentication => Self::Unauthorized(AUTHENTICATION_MESSAGE.to_string()),
            AdoError::Fetch { message, source } => {
                // Already reported at error level by the client.
                tracing::debug!("{}: {:#}", message, source);
                Self::Upstream(message.to_string())
            }
            other => {
                tracing::error!("Unexpected Azure DevOps error: {}", other);
                Self::Internal("Internal Server Error".to_string())
            }
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.code(),
                message: self.to_string(),
            },
        };
        (self.status(), Json(body)).into_response()
    }
}

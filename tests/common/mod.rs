//! In-process stand-in for the Azure DevOps REST API.

#![allow(dead_code)]

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const ORGANIZATION: &str = "contoso";
pub const PROJECT: &str = "web";
pub const GOOD_TOKEN: &str = "pat";
/// `Basic base64(":pat")`
const GOOD_AUTHORIZATION: &str = "Basic OnBhdA==";

/// Pull request whose reviewer lookup always fails.
pub const BROKEN_REVIEWERS_PR: u64 = 99;

/// Pull request whose reviewer lookup answers last, after this delay.
pub const SLOW_REVIEWERS_PR: u64 = 3;
pub const SLOW_REVIEWERS_DELAY: Duration = Duration::from_millis(300);

#[derive(Clone, Default)]
pub struct FakeAdo {
    /// Query strings received by the pull request listing endpoint.
    pub list_queries: Arc<Mutex<Vec<HashMap<String, String>>>>,
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value == GOOD_AUTHORIZATION)
}

pub fn all_pull_requests() -> Vec<Value> {
    vec![
        json!({
            "pullRequestId": 1,
            "title": "Add login page",
            "createdBy": { "displayName": "Ada", "uniqueName": "ada@contoso.com" },
            "creationDate": "2024-01-01T00:00:00Z",
            "closedDate": "2024-01-02T00:00:00Z",
            "status": "completed",
            "isDraft": false,
            "repository": { "id": "r1", "name": "core" }
        }),
        json!({
            "pullRequestId": 2,
            "title": "Fix session timeout",
            "description": "Bumps the idle timeout",
            "createdBy": { "displayName": "Ada L.", "uniqueName": "ada@contoso.com" },
            "creationDate": "2024-01-01T00:00:00Z",
            "closedDate": "2024-01-04T00:00:00Z",
            "status": "abandoned",
            "isDraft": false,
            "repository": { "id": "r1", "name": "core" }
        }),
        json!({
            "pullRequestId": 3,
            "title": "Refactor reviewers",
            "createdBy": { "displayName": "Bob", "uniqueName": "bob@contoso.com" },
            "creationDate": "2024-01-01T00:00:00Z",
            "status": "active",
            "isDraft": true,
            "repository": { "id": "r1", "name": "core" }
        }),
        json!({
            "pullRequestId": 4,
            "title": "Record without an author",
            "creationDate": "2024-01-01T00:00:00Z",
            "status": "completed"
        }),
    ]
}

pub fn active_pull_requests() -> Vec<Value> {
    vec![
        all_pull_requests()[2].clone(),
        json!({
            "pullRequestId": BROKEN_REVIEWERS_PR,
            "title": "Hotfix banner",
            "createdBy": { "displayName": "Carol", "uniqueName": "carol@contoso.com" },
            "creationDate": "2024-01-03T00:00:00Z",
            "status": "active",
            "isDraft": false,
            "sourceRefName": "refs/heads/web/banner"
        }),
    ]
}

async fn list_repositories(headers: HeaderMap) -> Response {
    if authorized(&headers) {
        Json(json!({ "value": [{ "id": "r1", "name": "core" }], "count": 1 })).into_response()
    } else {
        // Azure DevOps answers a bad PAT with a sign-in page.
        (StatusCode::NON_AUTHORITATIVE_INFORMATION, "<html>Sign in</html>").into_response()
    }
}

async fn list_pull_requests(
    State(fake): State<FakeAdo>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    fake.list_queries.lock().unwrap().push(query.clone());

    let records = match query.get("searchCriteria.status").map(String::as_str) {
        Some("active") => active_pull_requests(),
        _ => all_pull_requests(),
    };
    let skip: usize = query.get("$skip").and_then(|v| v.parse().ok()).unwrap_or(0);
    let top: usize = query.get("$top").and_then(|v| v.parse().ok()).unwrap_or(1000);

    let page: Vec<Value> = records.into_iter().skip(skip).take(top).collect();
    Json(json!({ "count": page.len(), "value": page })).into_response()
}

async fn reviewers_for(id: u64) -> Response {
    match id {
        SLOW_REVIEWERS_PR => {
            tokio::time::sleep(SLOW_REVIEWERS_DELAY).await;
            Json(json!({
                "value": [
                    { "displayName": "Carol", "uniqueName": "carol@contoso.com", "vote": 5 },
                    { "displayName": "Dave", "uniqueName": "dave@contoso.com", "vote": -5 }
                ]
            }))
            .into_response()
        }
        BROKEN_REVIEWERS_PR => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        _ => Json(json!({ "value": [] })).into_response(),
    }
}

async fn repository_reviewers(
    Path((_org, _project, _repository, id)): Path<(String, String, String, u64)>,
) -> Response {
    reviewers_for(id).await
}

async fn project_reviewers(Path((_org, _project, id)): Path<(String, String, u64)>) -> Response {
    reviewers_for(id).await
}

/// Starts the fake service on an ephemeral port and returns its base URL.
pub async fn spawn_fake_ado() -> (String, FakeAdo) {
    let fake = FakeAdo::default();
    let app = Router::new()
        .route("/{org}/{project}/_apis/git/repositories", get(list_repositories))
        .route("/{org}/{project}/_apis/git/pullrequests", get(list_pull_requests))
        .route(
            "/{org}/{project}/_apis/git/repositories/{repository}/pullRequests/{id}/reviewers",
            get(repository_reviewers),
        )
        .route(
            "/{org}/{project}/_apis/git/pullrequests/{id}/reviewers",
            get(project_reviewers),
        )
        .with_state(fake.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}", addr), fake)
}

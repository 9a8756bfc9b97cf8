use axum::body::Bytes;
use axum::extract::{Multipart, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;

use super::AppState;
use crate::core::errors::FlowError;
use crate::core::models::{ListKind, RunOptions};
use crate::store::lists::{self, AppendOutcome};
use crate::utils::fs::atomic_write;

/// Plain-text error body with a status code.
#[derive(Debug)]
pub struct ApiError(StatusCode, String);

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self(StatusCode::BAD_REQUEST, message.into())
    }

    fn internal(message: impl Into<String>) -> Self {
        Self(StatusCode::INTERNAL_SERVER_ERROR, message.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, self.1).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub running: bool,
    pub status: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UrlRequest {
    pub list_type: String,
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct UrlResponse {
    pub status: &'static str,
    pub message: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(rename = "type")]
    pub list_type: Option<String>,
}

pub async fn alive() -> &'static str {
    "bounty flow server is alive\n"
}

/// The body is optional; anything that is not a valid options object runs
/// with defaults.
pub async fn run_flow(State(state): State<Arc<AppState>>, body: Bytes) -> ApiResult<Json<serde_json::Value>> {
    let options: RunOptions = serde_json::from_slice(&body).unwrap_or_default();
    match state.controller.start_run(options) {
        Ok(()) => Ok(Json(json!({ "status": "started" }))),
        Err(err @ FlowError::AlreadyRunning) => Err(ApiError(StatusCode::CONFLICT, err.to_string())),
        Err(err @ FlowError::Cancelled) => Err(ApiError(StatusCode::SERVICE_UNAVAILABLE, err.to_string())),
        Err(err) => Err(ApiError::internal(err.to_string())),
    }
}

pub async fn status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let run = state.controller.status();
    Json(StatusResponse {
        running: run.running,
        status: run.status,
    })
}

pub async fn steps(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({ "steps": state.controller.steps() }))
}

pub async fn logs(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({ "logs": state.controller.logs() }))
}

pub async fn list_entries(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let list_type = query
        .list_type
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("type query parameter required"))?;
    let path = list_path(&state, &list_type)?;
    let entries = lists::read_lines(&path)
        .map_err(|e| ApiError::internal(e.to_string()))?
        .unwrap_or_default();
    Ok(Json(json!({ "entries": entries })))
}

pub async fn append_url(
    State(state): State<Arc<AppState>>,
    Json(request): Json<UrlRequest>,
) -> ApiResult<Json<UrlResponse>> {
    if request.list_type.trim().is_empty() || request.url.trim().is_empty() {
        return Err(ApiError::bad_request("list_type and url are required"));
    }
    let path = list_path(&state, &request.list_type)?;

    let outcome = lists::append_unique(&path, &request.url).map_err(|e| ApiError::internal(e.to_string()))?;
    let message = match outcome {
        AppendOutcome::Appended => {
            tracing::info!("Appended {} to {}", request.url.trim(), request.list_type);
            "Entry appended"
        }
        AppendOutcome::Exists => "Entry already exists",
    };
    Ok(Json(UrlResponse {
        status: outcome.as_str(),
        message,
    }))
}

pub async fn upload_list(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> ApiResult<Json<serde_json::Value>> {
    let mut list_type = None;
    let mut content = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(e.to_string()))?
    {
        match field.name() {
            Some("list_type") => {
                list_type = Some(field.text().await.map_err(|e| ApiError::bad_request(e.to_string()))?);
            }
            Some("file") => {
                content = Some(field.bytes().await.map_err(|e| ApiError::bad_request(e.to_string()))?);
            }
            _ => {}
        }
    }

    let list_type = list_type
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("list_type is required"))?;
    let content = content.ok_or_else(|| ApiError::bad_request("file is required"))?;
    let path = list_path(&state, &list_type)?;

    atomic_write(&path, &content).map_err(|e| ApiError::internal(format!("{:#}", e)))?;
    tracing::info!("Uploaded {} bytes to {:?}", content.len(), path);
    Ok(Json(json!({ "status": "uploaded" })))
}

fn list_path(state: &AppState, list_type: &str) -> ApiResult<PathBuf> {
    let kind: ListKind = list_type
        .parse()
        .map_err(|e: FlowError| ApiError::bad_request(e.to_string()))?;
    let path = state.lists.path(kind);
    if path.as_os_str().is_empty() {
        return Err(ApiError::bad_request(format!("{} list is not configured", kind.as_str())));
    }
    Ok(path.to_path_buf())
}

//! HTTP transport over the job engine.
//!
//! Submission answers `202 Accepted` with the job id; clients then poll
//! `GET /api/jobs/{id}` until a terminal status. Errors use one body shape:
//! `{"error": "<kind>", "message": "<text>"}`.

use std::net::SocketAddr;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::aggregate::AggregatedView;
use crate::engine::{CancelOutcome, JobEngine};
use crate::error::{AggregateError, EngineError};
use crate::scheduler::{JobFilter, JobKind, JobSnapshot, JobStatus};

pub const DEFAULT_PAGE_SIZE: usize = 100;
pub const MAX_PAGE_SIZE: usize = 1_000;

#[derive(Clone)]
pub struct ApiState {
    pub engine: JobEngine,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitJobRequest {
    pub kind: String,
    pub payload: serde_json::Value,
    pub owner_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitJobResponse {
    pub job_id: Uuid,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ListJobsQuery {
    pub owner_id: Option<String>,
    pub status: Option<String>,
    pub kind: Option<String>,
    pub page_size: Option<usize>,
    pub page_token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListJobsResponse {
    pub jobs: Vec<JobSnapshot>,
    /// Opaque cursor for the next page; absent on the last page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CancelJobResponse {
    pub job_id: Uuid,
    pub outcome: CancelOutcome,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ContributionRequest {
    pub judge_role: String,
    pub weight: f64,
    pub score: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ContributionResponse {
    pub contribution_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

/// Error returned by route handlers.
#[derive(Debug)]
pub enum ApiError {
    Engine(EngineError),
    BadRequest(String),
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        ApiError::Engine(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            ApiError::Engine(e) => match e {
                EngineError::UnknownKind(_) => (StatusCode::BAD_REQUEST, "unknown_kind"),
                EngineError::InvalidPayload(_) => (StatusCode::BAD_REQUEST, "invalid_payload"),
                EngineError::CapacityExceeded { .. } => {
                    (StatusCode::SERVICE_UNAVAILABLE, "capacity_exceeded")
                }
                EngineError::Draining => (StatusCode::SERVICE_UNAVAILABLE, "draining"),
                EngineError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
                EngineError::AlreadyFinished { .. } => (StatusCode::CONFLICT, "already_finished"),
                EngineError::Aggregate(AggregateError::NoWeightedInput(_)) => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "no_weighted_input")
                }
                EngineError::Aggregate(AggregateError::KeyNotFound(_)) => {
                    (StatusCode::NOT_FOUND, "aggregation_key_not_found")
                }
                EngineError::Aggregate(AggregateError::InvalidContribution(_)) => {
                    (StatusCode::BAD_REQUEST, "invalid_contribution")
                }
                EngineError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = self.parts();
        let message = match self {
            ApiError::Engine(e) => e.to_string(),
            ApiError::BadRequest(message) => message,
        };
        if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), error, message = %message, "Request failed");
        }
        (
            status,
            Json(ErrorBody {
                error: error.to_string(),
                message,
            }),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

fn parse_job_id(raw: &str) -> ApiResult<Uuid> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid job id: {}", raw)))
}

pub fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/jobs", get(list_jobs_handler).post(submit_job_handler))
        .route("/api/jobs/{id}", get(job_status_handler))
        .route("/api/jobs/{id}/cancel", post(cancel_job_handler))
        .route("/api/panels/{key}", get(panel_handler))
        .route("/api/panels/{key}/contributions", post(contribution_handler))
        .route("/api/panels/{key}/finalize", post(finalize_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Serve the API until `shutdown` is cancelled, then stop accepting requests.
pub async fn run_api(
    addr: SocketAddr,
    engine: JobEngine,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let app = router(ApiState { engine });

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(addr = %addr, error = %e, "Failed to bind API server");
            return Err(e);
        }
    };
    tracing::info!(addr = %addr, "API server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

async fn health_handler(State(state): State<ApiState>) -> impl IntoResponse {
    Json(state.engine.stats().await)
}

async fn submit_job_handler(
    State(state): State<ApiState>,
    request: Result<Json<SubmitJobRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<SubmitJobResponse>)> {
    let Json(request) = request?;
    let job_id = state
        .engine
        .submit_named(&request.kind, request.payload, &request.owner_id)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(SubmitJobResponse { job_id })))
}

async fn list_jobs_handler(
    State(state): State<ApiState>,
    query: Result<Query<ListJobsQuery>, QueryRejection>,
) -> ApiResult<Json<ListJobsResponse>> {
    let Query(query) = query?;
    let status = query
        .status
        .as_deref()
        .map(str::parse::<JobStatus>)
        .transpose()
        .map_err(ApiError::BadRequest)?;
    let kind = query
        .kind
        .as_deref()
        .map(str::parse::<JobKind>)
        .transpose()
        .map_err(ApiError::BadRequest)?;
    let offset = match query.page_token.as_deref() {
        None | Some("") => 0,
        Some(token) => token
            .parse::<usize>()
            .map_err(|_| ApiError::BadRequest(format!("invalid page_token: {}", token)))?,
    };
    let page_size = query
        .page_size
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);

    let filter = JobFilter {
        owner_id: query.owner_id,
        status,
        kind,
    };
    let all = state.engine.list_jobs(&filter).await;
    let total = all.len();
    let jobs: Vec<JobSnapshot> = all.into_iter().skip(offset).take(page_size).collect();
    let next = offset + jobs.len();
    let next_page_token = (next < total).then(|| next.to_string());

    Ok(Json(ListJobsResponse {
        jobs,
        next_page_token,
    }))
}

async fn job_status_handler(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResult<Json<JobSnapshot>> {
    let job_id = parse_job_id(&id)?;
    Ok(Json(state.engine.get_status(job_id).await?))
}

async fn cancel_job_handler(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResult<Json<CancelJobResponse>> {
    let job_id = parse_job_id(&id)?;
    let outcome = state.engine.cancel(job_id).await?;
    Ok(Json(CancelJobResponse { job_id, outcome }))
}

async fn contribution_handler(
    State(state): State<ApiState>,
    Path(key): Path<String>,
    request: Result<Json<ContributionRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<ContributionResponse>)> {
    let Json(request) = request?;
    let contribution_id = state
        .engine
        .submit_contribution(&key, &request.judge_role, request.weight, request.score)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(ContributionResponse { contribution_id }),
    ))
}

async fn panel_handler(
    State(state): State<ApiState>,
    Path(key): Path<String>,
) -> ApiResult<Json<AggregatedView>> {
    Ok(Json(state.engine.get_aggregated(&key).await?))
}

async fn finalize_handler(
    State(state): State<ApiState>,
    Path(key): Path<String>,
) -> ApiResult<Json<AggregatedView>> {
    Ok(Json(state.engine.finalize_panel(&key).await?))
}

//! Route handlers for the media-dl REST API.

use std::convert::Infallible;

use axum::{
    Json,
    body::Body,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{
        IntoResponse, Redirect, Response,
        sse::{Event as SseEvent, KeepAlive, Sse},
    },
};
use serde::{Deserialize, Serialize};
use tokio_stream::{StreamExt, wrappers::BroadcastStream};
use tokio_util::io::ReaderStream;
use utoipa::ToSchema;

use super::AppState;
use crate::error::{ApiError, Error};
use crate::types::{ArtifactRef, JobId, JobOptions, JobProgress, MediaMetadata};

/// Request body carrying a media source URL
#[derive(Debug, Deserialize, ToSchema)]
pub struct ProbeRequest {
    /// The media source URL to inspect
    pub url: String,
}

/// Request body for submitting a download job
#[derive(Debug, Deserialize, ToSchema)]
pub struct StartJobRequest {
    /// The media source URL to download
    pub url: String,

    /// Download options (format, audio extraction, quality)
    #[serde(flatten)]
    pub options: JobOptions,
}

/// Response body for a submitted job
#[derive(Debug, Serialize, ToSchema)]
pub struct StartJobResponse {
    /// Identifier for polling progress and fetching the artifact
    pub job_id: JobId,
}

/// POST /media/probe - Resolve metadata for a media source
#[utoipa::path(
    post,
    path = "/api/v1/media/probe",
    tag = "media",
    request_body = ProbeRequest,
    responses(
        (status = 200, description = "Resolved media metadata", body = MediaMetadata),
        (status = 400, description = "Invalid URL", body = ApiError),
        (status = 502, description = "Upstream tool failed", body = ApiError),
        (status = 504, description = "Upstream tool timed out", body = ApiError)
    )
)]
pub async fn probe_media(
    State(state): State<AppState>,
    Json(request): Json<ProbeRequest>,
) -> Result<Json<MediaMetadata>, Error> {
    let metadata = state.downloader.probe_media(&request.url).await?;
    Ok(Json(metadata))
}

/// POST /media/jobs - Submit a download job
#[utoipa::path(
    post,
    path = "/api/v1/media/jobs",
    tag = "media",
    request_body = StartJobRequest,
    responses(
        (status = 202, description = "Job admitted", body = StartJobResponse),
        (status = 400, description = "Invalid URL", body = ApiError),
        (status = 429, description = "Concurrency ceiling reached", body = ApiError),
        (status = 503, description = "Shutting down", body = ApiError)
    )
)]
pub async fn start_job(
    State(state): State<AppState>,
    Json(request): Json<StartJobRequest>,
) -> Result<impl IntoResponse, Error> {
    let job_id = state
        .downloader
        .start_job(&request.url, request.options)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(StartJobResponse { job_id })))
}

/// GET /media/jobs - List all known jobs
#[utoipa::path(
    get,
    path = "/api/v1/media/jobs",
    tag = "media",
    responses(
        (status = 200, description = "Progress views for all jobs", body = Vec<JobProgress>)
    )
)]
pub async fn list_jobs(State(state): State<AppState>) -> Json<Vec<JobProgress>> {
    Json(state.downloader.list_jobs().await)
}

/// GET /media/jobs/{id} - Query job progress
#[utoipa::path(
    get,
    path = "/api/v1/media/jobs/{id}",
    tag = "media",
    params(
        ("id" = String, Path, description = "Job ID")
    ),
    responses(
        (status = 200, description = "Job progress", body = JobProgress),
        (status = 404, description = "Unknown job id", body = ApiError)
    )
)]
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<JobProgress>, Error> {
    let progress = state.downloader.get_progress(&JobId::from(id)).await?;
    Ok(Json(progress))
}

/// GET /media/jobs/{id}/file - Fetch the artifact of a completed job
///
/// Streams the local file, or redirects when the job completed with a direct
/// remote location.
#[utoipa::path(
    get,
    path = "/api/v1/media/jobs/{id}/file",
    tag = "media",
    params(
        ("id" = String, Path, description = "Job ID")
    ),
    responses(
        (status = 200, description = "Artifact file stream", content_type = "application/octet-stream"),
        (status = 307, description = "Redirect to the direct remote location"),
        (status = 404, description = "Unknown job id", body = ApiError),
        (status = 409, description = "Job not completed yet", body = ApiError),
        (status = 410, description = "Artifact reclaimed or unreadable", body = ApiError)
    )
)]
pub async fn serve_artifact(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, Error> {
    let info = state.downloader.get_artifact(&JobId::from(id)).await?;

    match info.artifact {
        ArtifactRef::Direct { url, .. } => Ok(Redirect::temporary(&url).into_response()),
        ArtifactRef::Local {
            path,
            size,
            content_type,
            display_name,
        } => {
            let file = tokio::fs::File::open(&path).await.map_err(|e| {
                Error::ArtifactIntegrity {
                    path: path.clone(),
                    reason: format!("failed to open artifact: {e}"),
                }
            })?;

            let body = Body::from_stream(ReaderStream::new(file));
            let headers = [
                (header::CONTENT_TYPE, content_type),
                (header::CONTENT_LENGTH, size.to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{display_name}\""),
                ),
            ];
            Ok((headers, body).into_response())
        }
    }
}

/// GET /health - Health check
#[utoipa::path(
    get,
    path = "/api/v1/health",
    tag = "system",
    responses(
        (status = 200, description = "Service is healthy")
    )
)]
pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// GET /openapi.json - OpenAPI specification
#[utoipa::path(
    get,
    path = "/api/v1/openapi.json",
    tag = "system",
    responses(
        (status = 200, description = "OpenAPI 3.1 specification document")
    )
)]
pub async fn openapi_spec() -> Json<utoipa::openapi::OpenApi> {
    use utoipa::OpenApi;

    Json(super::ApiDoc::openapi())
}

/// GET /events - Server-sent events stream
#[utoipa::path(
    get,
    path = "/api/v1/events",
    tag = "system",
    responses(
        (status = 200, description = "Server-sent events stream (text/event-stream)", content_type = "text/event-stream"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn event_stream(
    State(state): State<AppState>,
) -> Sse<impl tokio_stream::Stream<Item = Result<SseEvent, Infallible>>> {
    let receiver = state.downloader.subscribe();
    let stream = BroadcastStream::new(receiver);

    let sse_stream = stream.filter_map(|result| match result {
        Ok(event) => match serde_json::to_string(&event) {
            Ok(json_data) => {
                let event_type = match &event {
                    crate::types::Event::Queued { .. } => "queued",
                    crate::types::Event::Processing { .. } => "processing",
                    crate::types::Event::Progress { .. } => "progress",
                    crate::types::Event::Completed { .. } => "completed",
                    crate::types::Event::Failed { .. } => "failed",
                    crate::types::Event::ArtifactReclaimed { .. } => "artifact_reclaimed",
                    crate::types::Event::Shutdown => "shutdown",
                };

                Some(Ok(SseEvent::default().event(event_type).data(json_data)))
            }
            Err(e) => {
                tracing::warn!("Failed to serialize event to JSON: {}", e);
                None
            }
        },
        Err(tokio_stream::wrappers::errors::BroadcastStreamRecvError::Lagged(skipped)) => {
            tracing::warn!("SSE client lagged, skipped {} events", skipped);
            Some(Ok(SseEvent::default().event("error").data(format!(
                r#"{{"error":"lagged","skipped":{}}}"#,
                skipped
            ))))
        }
    });

    Sse::new(sse_stream).keep_alive(KeepAlive::default())
}

/// POST /shutdown - Graceful shutdown
#[utoipa::path(
    post,
    path = "/api/v1/shutdown",
    tag = "system",
    responses(
        (status = 202, description = "Shutdown initiated")
    )
)]
pub async fn shutdown(State(state): State<AppState>) -> impl IntoResponse {
    let downloader = state.downloader.clone();
    tokio::spawn(async move {
        if let Err(e) = downloader.shutdown().await {
            tracing::error!(error = %e, "Shutdown sequence reported an error");
        }
    });

    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "status": "shutting_down" })),
    )
}

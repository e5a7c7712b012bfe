//! OpenAPI documentation and schema generation
//!
//! This module defines the OpenAPI specification for the media-dl REST API
//! using utoipa for compile-time spec generation.

use utoipa::OpenApi;

/// OpenAPI documentation for the media-dl REST API
///
/// The spec can be accessed via:
/// - `/api/v1/openapi.json` - JSON format OpenAPI specification
/// - `/swagger-ui` - Interactive Swagger UI documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "media-dl REST API",
        version = "0.2.0",
        description = "REST API for submitting media download jobs, polling their progress, and fetching artifacts",
        license(
            name = "MIT OR Apache-2.0"
        )
    ),
    servers(
        (url = "http://localhost:8750", description = "Local development server")
    ),
    paths(
        crate::api::routes::probe_media,
        crate::api::routes::start_job,
        crate::api::routes::list_jobs,
        crate::api::routes::get_job,
        crate::api::routes::serve_artifact,
        crate::api::routes::health_check,
        crate::api::routes::openapi_spec,
        crate::api::routes::event_stream,
        crate::api::routes::shutdown,
    ),
    components(
        schemas(
            crate::api::routes::ProbeRequest,
            crate::api::routes::StartJobRequest,
            crate::api::routes::StartJobResponse,
            crate::error::ApiError,
            crate::error::ErrorDetail,
            crate::types::ArtifactInfo,
            crate::types::ArtifactRef,
            crate::types::JobId,
            crate::types::JobOptions,
            crate::types::JobProgress,
            crate::types::JobStatus,
            crate::types::MediaFormat,
            crate::types::MediaMetadata,
        )
    ),
    tags(
        (name = "media", description = "Media probing, job submission, and artifact retrieval"),
        (name = "system", description = "Health, events, and lifecycle")
    )
)]
pub struct ApiDoc;

//! OpenAPI documentation and schema generation
//!
//! This module defines the OpenAPI specification for the checkpoint-stream
//! REST API using utoipa for compile-time spec generation.

use utoipa::OpenApi;

/// OpenAPI documentation for the checkpoint-stream REST API
///
/// The spec can be accessed via:
/// - `/openapi.json` - JSON format OpenAPI specification
/// - `/swagger-ui` - Interactive Swagger UI documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "checkpoint-stream REST API",
        version = "0.1.0",
        description = "Streams stored training checkpoints to clients as tar+gzip or zip archives",
        license(
            name = "MIT OR Apache-2.0"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development server")
    ),
    paths(
        // Checkpoints
        crate::api::routes::get_checkpoint_tgz,
        crate::api::routes::get_checkpoint_zip,

        // System
        crate::api::routes::health_check,
        crate::api::routes::openapi_spec,
    ),
    components(schemas(
        crate::types::ArchiveFormat,

        // Error types from error.rs
        crate::error::ApiError,
        crate::error::ErrorDetail,
    )),
    tags(
        (name = "checkpoints", description = "Checkpoint downloads - Stream checkpoint contents as an archive"),
        (name = "system", description = "System endpoints - Health checks, OpenAPI spec"),
    )
)]
pub struct ApiDoc;

//! REST API server module
//!
//! Exposes checkpoint archive downloads over HTTP together with a health
//! check and the OpenAPI document.

use crate::{CheckpointArchiver, Config, Result};
use axum::{Router, http::HeaderValue, routing::get};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod error_response;
pub mod openapi;
pub mod routes;
pub mod state;

pub use openapi::ApiDoc;
pub use state::AppState;

/// Create the API router with all route definitions
///
/// # Routes
///
/// ## Checkpoints
/// - `GET /checkpoints/:checkpoint_uuid/tgz` - Checkpoint as tar+gzip
/// - `GET /checkpoints/:checkpoint_uuid/zip` - Checkpoint as zip
///
/// ## System
/// - `GET /health` - Health check
/// - `GET /openapi.json` - OpenAPI specification
/// - `GET /swagger-ui` - Interactive Swagger UI documentation (if enabled)
pub fn create_router(archiver: Arc<CheckpointArchiver>, config: Arc<Config>) -> Router {
    let state = AppState::new(archiver, config.clone());

    let router = Router::new()
        // Checkpoints
        .route(
            "/checkpoints/:checkpoint_uuid/tgz",
            get(routes::get_checkpoint_tgz),
        )
        .route(
            "/checkpoints/:checkpoint_uuid/zip",
            get(routes::get_checkpoint_zip),
        )
        // System
        .route("/health", get(routes::health_check))
        .route("/openapi.json", get(routes::openapi_spec));

    // Swagger UI reuses the /openapi.json document
    let router = if config.api.swagger_ui {
        router.merge(SwaggerUi::new("/swagger-ui").url("/openapi.json", ApiDoc::openapi()))
    } else {
        router
    };

    let router = router.with_state(state).layer(TraceLayer::new_for_http());

    if config.api.cors_enabled {
        let cors = build_cors_layer(&config.api.cors_origins);
        router.layer(cors)
    } else {
        router
    }
}

/// Build a CORS layer based on configured origins
///
/// "*" (or an empty list) allows any origin; otherwise only the listed
/// origins that parse as header values are allowed.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allow_any = origins.iter().any(|o| o == "*");

    if allow_any || origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let allowed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(allowed))
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

/// Start the API server on the configured bind address.
///
/// Runs until the server stops, either due to an error or shutdown of the
/// runtime.
///
/// # Example
///
/// ```no_run
/// use checkpoint_stream::{CheckpointArchiver, Config, Database, MemoryObjectStore};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Arc::new(Config::default());
/// let db = Database::new(&config.persistence.database_path).await?;
/// let archiver = Arc::new(CheckpointArchiver::new(
///     Arc::new(db),
///     Arc::new(MemoryObjectStore::new("us-east-1")),
///     config.clone(),
/// ));
///
/// // Start API server (blocks until shutdown)
/// checkpoint_stream::api::start_api_server(archiver, config).await?;
/// # Ok(())
/// # }
/// ```
pub async fn start_api_server(archiver: Arc<CheckpointArchiver>, config: Arc<Config>) -> Result<()> {
    serve_with_shutdown(archiver, config, std::future::pending()).await
}

/// Start the API server and stop accepting connections once `shutdown` completes.
///
/// Requests already in flight are drained before this returns.
pub async fn serve_with_shutdown<F>(
    archiver: Arc<CheckpointArchiver>,
    config: Arc<Config>,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let bind_address = config.api.bind_address;

    tracing::info!(
        address = %bind_address,
        "Starting API server"
    );

    let app = create_router(archiver, config);

    let listener = TcpListener::bind(bind_address)
        .await
        .map_err(crate::error::Error::Io)?;

    tracing::info!(
        address = %listener.local_addr().map_err(crate::error::Error::Io)?,
        "API server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| crate::error::Error::ApiServerError(e.to_string()))?;

    tracing::info!("API server stopped");
    Ok(())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

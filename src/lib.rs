//! # checkpoint-stream
//!
//! Streams training checkpoints held in an object store to HTTP clients as a
//! single tar+gzip or zip archive, without staging anything on local disk.
//!
//! ## How it works
//!
//! - **Resolve** - the checkpoint id is looked up in the metadata store to find
//!   the storage backend the checkpoint was written to
//! - **List** - objects under the checkpoint's prefix are listed page by page
//! - **Download** - each object is fetched in ranged parts and written, in
//!   order, into the archive entry declared for it
//! - **Encode** - the archive bytes flow straight into the response body
//!
//! ## Quick Start
//!
//! ```no_run
//! use checkpoint_stream::{AwsSessionFactory, CheckpointArchiver, Config, Database};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Arc::new(Config::default());
//!     let db = Database::new(&config.persistence.database_path).await?;
//!     let sessions = AwsSessionFactory::new(&config.storage);
//!     let archiver = CheckpointArchiver::new(Arc::new(db), Arc::new(sessions), config);
//!
//!     let id = uuid::Uuid::parse_str("7a3b6a0e-5d6c-4f7e-9f1a-2b3c4d5e6f70")?;
//!     let file = tokio::fs::File::create("checkpoint.tar.gz").await?;
//!     archiver
//!         .stream_checkpoint("application/gzip", id, file, CancellationToken::new())
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// REST API module
pub mod api;
/// Archive writers (tar+gzip, zip)
pub mod archive;
/// Configuration types
pub mod config;
/// Database persistence layer
pub mod db;
/// Checkpoint downloaders
pub mod downloader;
/// Error types
pub mod error;
/// Checkpoint metadata lookup
pub mod metadata;
/// Request pipeline
pub mod pipeline;
/// Object storage clients
pub mod storage;
/// Core types
pub mod types;

// Re-export commonly used types
pub use archive::{ArchivePipeline, ArchiveWriter, build_writer_pipeline};
pub use config::Config;
pub use db::Database;
pub use downloader::{CheckpointDownloader, new_downloader};
pub use error::{
    ApiError, DatabaseError, Error, ErrorAccumulator, ErrorDetail, Result, StorageError,
    ToHttpStatus,
};
pub use metadata::CheckpointMetadata;
pub use pipeline::CheckpointArchiver;
pub use storage::{
    AwsSessionFactory, CheckpointStorageConfig, MemoryObjectStore, ObjectStore, SessionFactory,
};
pub use types::{ArchiveFormat, MIME_APPLICATION_GZIP, MIME_APPLICATION_ZIP};

/// Run the API server until a termination signal arrives.
///
/// In-flight requests are allowed to finish before returning.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use checkpoint_stream::{AwsSessionFactory, CheckpointArchiver, Config, Database, run_with_shutdown};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = Arc::new(Config::default());
///     let db = Database::new(&config.persistence.database_path).await?;
///     let sessions = AwsSessionFactory::new(&config.storage);
///     let archiver = Arc::new(CheckpointArchiver::new(Arc::new(db), Arc::new(sessions), config.clone()));
///
///     run_with_shutdown(archiver, config).await?;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(
    archiver: std::sync::Arc<CheckpointArchiver>,
    config: std::sync::Arc<Config>,
) -> Result<()> {
    api::serve_with_shutdown(archiver, config, wait_for_signal()).await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}

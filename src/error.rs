//! Error types for checkpoint-stream
//!
//! This module provides error handling for the library, including:
//! - Domain-specific error types (Storage, Database, archive framing)
//! - HTTP status code mapping for API integration
//! - Structured error responses with machine-readable error codes
//! - The append-only [`ErrorAccumulator`] used while streaming a checkpoint

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

/// Result type alias for checkpoint-stream operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for checkpoint-stream
///
/// Variants fall into four groups: input validation (rejected before any
/// backend contact), resolution (rejected before any byte is streamed),
/// transfer (raised mid-stream) and teardown (raised while finalizing the
/// archive).
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "storage.part_size")
        key: Option<String>,
    },

    /// The checkpoint identifier is not a valid UUID
    #[error("unable to parse checkpoint UUID {id}: {reason}")]
    InvalidCheckpointId {
        /// The identifier as received
        id: String,
        /// Why parsing failed
        reason: String,
    },

    /// The requested archive content type is not supported
    #[error("MIME type must be application/gzip or application/zip but got {0}")]
    UnsupportedFormat(String),

    /// No checkpoint with this identifier exists
    #[error("checkpoint {0} does not exist")]
    CheckpointNotFound(Uuid),

    /// The checkpoint lives on a storage backend this path cannot read
    #[error(
        "checkpoint download is only supported on S3, but the checkpoint's storage type is {kind}"
    )]
    UnsupportedBackend {
        /// The backend kind found in the checkpoint's configuration
        kind: String,
    },

    /// The experiment configuration could not be read or parsed
    #[error("{0}")]
    Metadata(String),

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Object store request failed
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// An archive header could not be written
    #[error("failed to write archive header for {path}: {source}")]
    Archive {
        /// Archive-relative path of the entry
        path: String,
        /// Underlying write error
        #[source]
        source: std::io::Error,
    },

    /// One or more errors were collected while streaming a checkpoint
    #[error("one or more errors encountered during checkpoint download: {0}")]
    Incomplete(ErrorAccumulator),

    /// The request was cancelled (client went away)
    #[error("checkpoint download cancelled")]
    Cancelled,

    /// The request ran past its configured deadline
    #[error("checkpoint download exceeded its deadline of {0:?}")]
    Timeout(Duration),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// API server error
    #[error("API server error: {0}")]
    ApiServerError(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),
}

/// Object store errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// Bucket region discovery failed
    #[error("unable to resolve region of bucket {bucket}: {reason}")]
    Region {
        /// Bucket whose region was requested
        bucket: String,
        /// The reason the lookup failed
        reason: String,
    },

    /// A session for the given region could not be built
    #[error("unable to open storage session in region {region}: {reason}")]
    Session {
        /// Region the session was scoped to
        region: String,
        /// The reason the session could not be opened
        reason: String,
    },

    /// A listing page could not be fetched
    #[error("failed to list objects under s3://{bucket}/{prefix}: {reason}")]
    List {
        /// Bucket being listed
        bucket: String,
        /// Key prefix being listed
        prefix: String,
        /// The reason the listing failed
        reason: String,
    },

    /// An object (or a range of it) could not be fetched
    #[error("failed to download s3://{bucket}/{key}: {reason}")]
    Get {
        /// Bucket of the object
        bucket: String,
        /// Key of the object
        key: String,
        /// The reason the download failed
        reason: String,
    },

    /// Downloaded bytes could not be written into the archive
    #[error("failed to write s3://{bucket}/{key} into archive: {source}")]
    Write {
        /// Bucket of the object
        bucket: String,
        /// Key of the object
        key: String,
        /// Underlying write error
        #[source]
        source: std::io::Error,
    },

    /// The transfer produced a different number of bytes than the listing announced
    #[error("s3://{bucket}/{key} transferred {actual} bytes but the listing reported {expected}")]
    SizeMismatch {
        /// Bucket of the object
        bucket: String,
        /// Key of the object
        key: String,
        /// Size reported by the listing
        expected: u64,
        /// Bytes actually written
        actual: u64,
    },
}

/// Append-only collection of errors encountered while streaming a checkpoint
///
/// Errors are never discarded once pushed. Display renders every collected
/// error on its own line.
#[derive(Debug, Default)]
pub struct ErrorAccumulator {
    errors: Vec<Error>,
}

impl ErrorAccumulator {
    /// Create an empty accumulator
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an error
    pub fn push(&mut self, error: impl Into<Error>) {
        self.errors.push(error.into());
    }

    /// Whether no error has been recorded
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Number of recorded errors
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Recorded errors in the order they were pushed
    pub fn errors(&self) -> &[Error] {
        &self.errors
    }

    /// `Ok(())` when empty, otherwise [`Error::Incomplete`] carrying every error
    pub fn into_result(self) -> Result<()> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(Error::Incomplete(self))
        }
    }
}

impl fmt::Display for ErrorAccumulator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let noun = if self.errors.len() == 1 {
            "error"
        } else {
            "errors"
        };
        write!(f, "{} {} occurred:", self.errors.len(), noun)?;
        for error in &self.errors {
            write!(f, "\n\t* {}", error)?;
        }
        Ok(())
    }
}

/// API error response format
///
/// This structure is returned by API endpoints when an error occurs.
///
/// # Example JSON Response
///
/// ```json
/// {
///   "error": {
///     "code": "checkpoint_not_found",
///     "message": "checkpoint 7d4c0b9e-8f0e-4bb5-9d5c-3f39f3a5f4a1 does not exist",
///     "details": {
///       "checkpoint_id": "7d4c0b9e-8f0e-4bb5-9d5c-3f39f3a5f4a1"
///     }
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// The error details
    pub error: ErrorDetail,
}

/// Detailed error information for API responses
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "checkpoint_not_found")
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Optional additional context about the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with code and message
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    /// Create an "internal server error"
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new("internal_error", message)
    }
}

/// Convert errors to HTTP status codes for API responses
pub trait ToHttpStatus {
    /// Get the HTTP status code for this error
    fn status_code(&self) -> u16;

    /// Get the machine-readable error code
    fn error_code(&self) -> &str;
}

impl ToHttpStatus for Error {
    fn status_code(&self) -> u16 {
        match self {
            // 400 Bad Request - rejected before any backend work
            Error::Config { .. } => 400,
            Error::InvalidCheckpointId { .. } => 400,
            Error::UnsupportedFormat(_) => 400,

            // 404 Not Found
            Error::CheckpointNotFound(_) => 404,

            // 501 Not Implemented - backend recognized but not readable here
            Error::UnsupportedBackend { .. } => 501,

            // 500 Internal Server Error - metadata, transfer and teardown failures
            Error::Metadata(_) => 500,
            Error::Database(_) => 500,
            Error::Sqlx(_) => 500,
            Error::Storage(_) => 500,
            Error::Archive { .. } => 500,
            Error::Incomplete(_) => 500,
            Error::Cancelled => 500,
            Error::Timeout(_) => 500,
            Error::Io(_) => 500,
            Error::Serialization(_) => 500,
            Error::ApiServerError(_) => 500,
            Error::Other(_) => 500,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::Config { .. } => "config_error",
            Error::InvalidCheckpointId { .. } => "invalid_checkpoint_id",
            Error::UnsupportedFormat(_) => "unsupported_format",
            Error::CheckpointNotFound(_) => "checkpoint_not_found",
            Error::UnsupportedBackend { .. } => "unsupported_backend",
            Error::Metadata(_) => "metadata_error",
            Error::Database(_) => "database_error",
            Error::Sqlx(_) => "database_error",
            Error::Storage(e) => match e {
                StorageError::Region { .. } => "region_lookup_failed",
                StorageError::Session { .. } => "session_failed",
                StorageError::List { .. } => "list_failed",
                StorageError::Get { .. } => "object_download_failed",
                StorageError::Write { .. } => "archive_write_failed",
                StorageError::SizeMismatch { .. } => "size_mismatch",
            },
            Error::Archive { .. } => "archive_header_failed",
            Error::Incomplete(_) => "download_incomplete",
            Error::Cancelled => "cancelled",
            Error::Timeout(_) => "timeout",
            Error::Io(_) => "io_error",
            Error::Serialization(_) => "serialization_error",
            Error::ApiServerError(_) => "api_server_error",
            Error::Other(_) => "internal_error",
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        let code = error.error_code().to_string();
        let message = error.to_string();

        let details = match &error {
            Error::InvalidCheckpointId { id, .. } => Some(serde_json::json!({
                "checkpoint_id": id,
            })),
            Error::CheckpointNotFound(id) => Some(serde_json::json!({
                "checkpoint_id": id,
            })),
            Error::UnsupportedFormat(mime_type) => Some(serde_json::json!({
                "mime_type": mime_type,
            })),
            Error::UnsupportedBackend { kind } => Some(serde_json::json!({
                "storage_type": kind,
            })),
            Error::Incomplete(errors) => Some(serde_json::json!({
                "errors": errors
                    .errors()
                    .iter()
                    .map(|e| e.to_string())
                    .collect::<Vec<_>>(),
            })),
            _ => None,
        };

        ApiError {
            error: ErrorDetail {
                code,
                message,
                details,
            },
        }
    }
}

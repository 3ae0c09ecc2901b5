//! Checkpoint archive handlers.
//!
//! The archive is produced by a spawned pipeline task writing into an
//! in-process pipe. The response head is only committed once the first byte
//! is available, so failures that happen before any output (unknown
//! checkpoint, unsupported backend, a listing that fails on the first page)
//! still reach the client as a structured error.

use crate::api::AppState;
use crate::error::{Error, Result};
use crate::types::{ArchiveFormat, MIME_APPLICATION_GZIP, MIME_APPLICATION_ZIP};
use axum::{
    body::{Body, Bytes},
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use futures::{StreamExt, stream};
use std::io;
use tokio::io::DuplexStream;
use tokio::task::JoinHandle;
use tokio_util::io::ReaderStream;
use tokio_util::sync::{CancellationToken, DropGuard};
use uuid::Uuid;

/// Capacity of the pipe between the pipeline task and the response body
const PIPE_CAPACITY: usize = 64 * 1024;

/// GET /checkpoints/:checkpoint_uuid/tgz - Checkpoint as a gzipped tarball
#[utoipa::path(
    get,
    path = "/checkpoints/{checkpoint_uuid}/tgz",
    tag = "checkpoints",
    params(
        ("checkpoint_uuid" = String, Path, description = "Checkpoint UUID")
    ),
    responses(
        (status = 200, description = "Checkpoint contents as tar+gzip", content_type = "application/gzip"),
        (status = 400, description = "Invalid checkpoint UUID", body = crate::error::ApiError),
        (status = 404, description = "Checkpoint not found", body = crate::error::ApiError),
        (status = 501, description = "Storage backend not supported", body = crate::error::ApiError),
        (status = 500, description = "Metadata or download failure", body = crate::error::ApiError)
    )
)]
pub async fn get_checkpoint_tgz(
    State(state): State<AppState>,
    Path(checkpoint_uuid): Path<String>,
) -> Result<Response> {
    stream_checkpoint(state, &checkpoint_uuid, MIME_APPLICATION_GZIP).await
}

/// GET /checkpoints/:checkpoint_uuid/zip - Checkpoint as a zip archive
#[utoipa::path(
    get,
    path = "/checkpoints/{checkpoint_uuid}/zip",
    tag = "checkpoints",
    params(
        ("checkpoint_uuid" = String, Path, description = "Checkpoint UUID")
    ),
    responses(
        (status = 200, description = "Checkpoint contents as zip", content_type = "application/zip"),
        (status = 400, description = "Invalid checkpoint UUID", body = crate::error::ApiError),
        (status = 404, description = "Checkpoint not found", body = crate::error::ApiError),
        (status = 501, description = "Storage backend not supported", body = crate::error::ApiError),
        (status = 500, description = "Metadata or download failure", body = crate::error::ApiError)
    )
)]
pub async fn get_checkpoint_zip(
    State(state): State<AppState>,
    Path(checkpoint_uuid): Path<String>,
) -> Result<Response> {
    stream_checkpoint(state, &checkpoint_uuid, MIME_APPLICATION_ZIP).await
}

async fn stream_checkpoint(state: AppState, checkpoint_uuid: &str, mime_type: &'static str) -> Result<Response> {
    let id = Uuid::parse_str(checkpoint_uuid).map_err(|e| Error::InvalidCheckpointId {
        id: checkpoint_uuid.to_string(),
        reason: e.to_string(),
    })?;
    let format = ArchiveFormat::from_mime_type(mime_type)
        .ok_or_else(|| Error::UnsupportedFormat(mime_type.to_string()))?;

    let (writer, reader) = tokio::io::duplex(PIPE_CAPACITY);
    let cancel = CancellationToken::new();
    let archiver = state.archiver.clone();
    let task_cancel = cancel.clone();
    let task = tokio::spawn(async move {
        archiver
            .stream_checkpoint(mime_type, id, writer, task_cancel)
            .await
    });

    // Dropping the body (client gone) cancels the pipeline from here on
    let guard = cancel.drop_guard();
    let mut body = ReaderStream::new(reader);

    let (first, task) = match body.next().await {
        Some(Ok(chunk)) => (chunk, Some(task)),
        Some(Err(e)) => return Err(Error::Io(e)),
        None => {
            // Pipeline ended without output; report its outcome directly
            join_pipeline(task).await?;
            (Bytes::new(), None)
        }
    };

    let rest = stream::unfold(
        BodyState {
            reader: body,
            task,
            _cancel: guard,
        },
        next_body_chunk,
    );
    let stream = stream::iter([Ok::<_, io::Error>(first)]).chain(rest);

    tracing::debug!(checkpoint_id = %id, %format, "committing archive response");

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, mime_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}.{}\"", id, format.extension()),
            ),
        ],
        Body::from_stream(stream),
    )
        .into_response())
}

struct BodyState {
    reader: ReaderStream<DuplexStream>,
    task: Option<JoinHandle<Result<()>>>,
    _cancel: DropGuard,
}

/// Yield pipe output, then the pipeline's failure (if any) as a body error
async fn next_body_chunk(mut state: BodyState) -> Option<(io::Result<Bytes>, BodyState)> {
    match state.reader.next().await {
        Some(item) => Some((item, state)),
        None => {
            let task = state.task.take()?;
            match join_pipeline(task).await {
                Ok(()) => None,
                Err(e) => Some((Err(io::Error::other(e.to_string())), state)),
            }
        }
    }
}

async fn join_pipeline(task: JoinHandle<Result<()>>) -> Result<()> {
    match task.await {
        Ok(result) => result,
        Err(e) => Err(Error::Other(format!("checkpoint pipeline task failed: {}", e))),
    }
}

//! Database layer for checkpoint-stream
//!
//! Handles SQLite persistence for checkpoint metadata.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`] - Database lifecycle, schema migrations
//! - [`checkpoints`] - Checkpoint to experiment config records

use sqlx::{FromRow, sqlite::SqlitePool};
use uuid::Uuid;

mod checkpoints;
mod migrations;

/// New checkpoint record to be inserted into the database
#[derive(Debug, Clone)]
pub struct NewCheckpoint {
    /// Checkpoint identifier
    pub uuid: Uuid,
    /// Legacy experiment configuration the checkpoint was written under
    pub experiment_config: serde_json::Value,
}

/// Checkpoint record from database
#[derive(Debug, Clone, FromRow)]
pub struct CheckpointRow {
    /// Checkpoint identifier (hyphenated UUID)
    pub uuid: String,
    /// Experiment configuration as JSON text
    pub experiment_config: String,
    /// Unix timestamp when the record was created
    pub created_at: i64,
}

/// Database handle for checkpoint-stream
pub struct Database {
    pool: SqlitePool,
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

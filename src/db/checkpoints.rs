//! Checkpoint metadata records.

use crate::error::DatabaseError;
use crate::metadata::CheckpointMetadata;
use crate::{Error, Result};
use async_trait::async_trait;
use uuid::Uuid;

use super::{CheckpointRow, Database, NewCheckpoint};

impl Database {
    /// Insert or replace a checkpoint record
    pub async fn insert_checkpoint(&self, checkpoint: &NewCheckpoint) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let config = serde_json::to_string(&checkpoint.experiment_config)?;

        sqlx::query(
            r#"
            INSERT INTO checkpoints (uuid, experiment_config, created_at)
            VALUES (?, ?, ?)
            ON CONFLICT(uuid) DO UPDATE SET experiment_config = excluded.experiment_config
            "#,
        )
        .bind(checkpoint.uuid.to_string())
        .bind(config)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to insert checkpoint: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Get a checkpoint record
    ///
    /// Returns None if no checkpoint with this id is recorded.
    pub async fn get_checkpoint(&self, id: Uuid) -> Result<Option<CheckpointRow>> {
        let row = sqlx::query_as::<_, CheckpointRow>(
            "SELECT uuid, experiment_config, created_at FROM checkpoints WHERE uuid = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get checkpoint: {}",
                e
            )))
        })?;

        Ok(row)
    }

    /// Delete a checkpoint record
    ///
    /// Returns whether a record was removed.
    pub async fn delete_checkpoint(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM checkpoints WHERE uuid = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to delete checkpoint: {}",
                    e
                )))
            })?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl CheckpointMetadata for Database {
    async fn experiment_config(&self, checkpoint_id: Uuid) -> Result<Option<serde_json::Value>> {
        match self.get_checkpoint(checkpoint_id).await? {
            Some(row) => Ok(Some(serde_json::from_str(&row.experiment_config)?)),
            None => Ok(None),
        }
    }
}

//! Checkpoint metadata boundary
//!
//! Maps a checkpoint id to the experiment configuration that produced it,
//! and from there to the storage backend holding the checkpoint's files.

use crate::error::{Error, Result};
use crate::storage::CheckpointStorageConfig;
use async_trait::async_trait;
use serde::Deserialize;
use uuid::Uuid;

/// Source of experiment configurations keyed by checkpoint
#[async_trait]
pub trait CheckpointMetadata: Send + Sync {
    /// Experiment config JSON for the checkpoint, or `None` if it doesn't exist
    async fn experiment_config(&self, checkpoint_id: Uuid) -> Result<Option<serde_json::Value>>;
}

/// The part of a legacy experiment config the archiver reads
#[derive(Debug, Deserialize)]
pub struct LegacyExperimentConfig {
    /// Where the experiment's checkpoints are stored
    pub checkpoint_storage: CheckpointStorageConfig,
}

/// Resolve where a checkpoint's files live
///
/// A missing checkpoint is [`Error::CheckpointNotFound`]; a lookup failure or
/// a config without a usable `checkpoint_storage` section is [`Error::Metadata`].
pub async fn checkpoint_storage_config(
    metadata: &dyn CheckpointMetadata,
    checkpoint_id: Uuid,
) -> Result<CheckpointStorageConfig> {
    let config = match metadata.experiment_config(checkpoint_id).await {
        Ok(Some(config)) => config,
        Ok(None) => return Err(Error::CheckpointNotFound(checkpoint_id)),
        Err(e) => {
            return Err(Error::Metadata(format!(
                "unable to retrieve experiment config for checkpoint {}: {}",
                checkpoint_id, e
            )));
        }
    };

    let legacy: LegacyExperimentConfig = serde_json::from_value(config).map_err(|e| {
        Error::Metadata(format!(
            "unable to parse experiment config for checkpoint {}: {}",
            checkpoint_id, e
        ))
    })?;
    Ok(legacy.checkpoint_storage)
}

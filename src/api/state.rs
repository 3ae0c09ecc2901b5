//! Application state for the API server

use crate::{CheckpointArchiver, Config};
use std::sync::Arc;

/// Shared application state accessible to all route handlers
///
/// Cloned per request; both fields are cheap `Arc` clones.
#[derive(Clone)]
pub struct AppState {
    /// Streams checkpoints as archives
    pub archiver: Arc<CheckpointArchiver>,

    /// Configuration (read-only)
    pub config: Arc<Config>,
}

impl AppState {
    /// Create a new AppState
    pub fn new(archiver: Arc<CheckpointArchiver>, config: Arc<Config>) -> Self {
        Self { archiver, config }
    }
}

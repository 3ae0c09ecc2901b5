//! Route handlers for the REST API
//!
//! Handlers are organized by domain:
//! - [`checkpoints`] - Checkpoint archive downloads
//! - [`system`] - Health, OpenAPI

mod checkpoints;
mod system;

// Re-export all handlers so `routes::function_name` works
pub use checkpoints::*;
pub use system::*;

//! Client-side engine embedded by the LinguaFlow web UI.
//!
//! Provides:
//! - Debounced batch persistence for drag-and-drop exercise ordering
//! - HTTP client for the hosted backend (lessons, exercises, progress)
//! - Streaming client for the AI evaluation proxy
//! - Configuration loading

pub mod api;
pub mod config;
pub mod evaluation;
pub mod reorder;

pub use api::{ApiClient, ApiError, OrderStore};
pub use config::ClientConfig;
pub use evaluation::{supersedes_local, EvaluationClient};
pub use reorder::{ReorderCallbacks, ReorderManager};

//! Error types for the MindChat routing domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum.
//!
//! Only [`RoutingError::CatalogMisconfigured`] (surfaced at startup as
//! [`CatalogError::Misconfigured`]) is meant to stop the application. Every
//! other condition is absorbed by the routing pipeline, which falls back to
//! the default prompt fragment.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EmbeddingError {
    /// The model could not be loaded. Permanent for the process lifetime.
    #[error("Embedding model unavailable: {0}")]
    Unavailable(String),

    /// The model is loaded but failed on this particular input.
    #[error("Embedding inference failed: {0}")]
    Inference(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RoutingError {
    #[error("Topic routing unavailable: {0}")]
    Unavailable(String),

    #[error("Vector dimension mismatch: index expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid query vector: {0}")]
    InvalidVector(String),

    #[error("Prompt catalog misconfigured: {0}")]
    CatalogMisconfigured(String),

    #[error("Routing result for turn {turn} superseded by turn {latest}")]
    Superseded { turn: u64, latest: u64 },
}

impl From<EmbeddingError> for RoutingError {
    fn from(err: EmbeddingError) -> Self {
        RoutingError::Unavailable(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Failed to read catalog at {path}: {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("Failed to parse catalog at {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("Prompt catalog misconfigured: {0}")]
    Misconfigured(String),
}

impl From<CatalogError> for RoutingError {
    fn from(err: CatalogError) -> Self {
        RoutingError::CatalogMisconfigured(err.to_string())
    }
}

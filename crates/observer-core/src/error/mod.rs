//! Error types for the correlation engine.
//!
//! All engine operations return [`CorrelationError`]. Variants map to the
//! failure domains the pipeline distinguishes: source fetch errors feed the
//! adaptive scheduler's backoff, embedding errors skip the item without
//! aborting the batch, and channel errors surface shutdown races. The
//! pipeline never aborts on a single-item failure; the only fatal startup
//! errors live in the application crate (storage open, event bus bind).

use thiserror::Error;

/// Primary error type for engine operations.
#[derive(Debug, Error)]
pub enum CorrelationError {
    /// A source's `fetch()` failed. Transient network errors and permanent
    /// remote errors both land here; the scheduler decides retry behavior
    /// from the source's consecutive-error count.
    #[error("source '{source_name}' fetch failed: {message}")]
    SourceFetch { source_name: String, message: String },

    /// The embedder returned an error or an empty vector for an item.
    #[error("embedding failed: {message}")]
    Embedding { message: String },

    /// An embedding's dimensionality does not match the index's first-seen
    /// dimension. The offending item is skipped, not rejected.
    #[error("embedding dimension mismatch: index has {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The reranker exhausted its retry schedule.
    #[error("rerank failed after {attempts} attempts: {message}")]
    Rerank { attempts: u32, message: String },

    /// The work pool rejected a submission (shutting down or queue full).
    #[error("work pool rejected submission: {message}")]
    PoolRejected { message: String },

    /// A pipeline stage's input channel is closed; the engine is stopping.
    #[error("engine is shutting down")]
    ShuttingDown,

    /// Item failed validation before entering the pipeline.
    #[error("invalid item: {message}")]
    InvalidItem { message: String },

    /// A best-effort persistence write failed. Logged and ignored by the
    /// housekeeper; data stays in memory.
    #[error("storage error: {message}")]
    Storage { message: String },

    #[error("serialization error: {message}")]
    Serialization { message: String },

    #[error("http error: {message}")]
    Http { message: String },
}

impl From<serde_json::Error> for CorrelationError {
    fn from(err: serde_json::Error) -> Self {
        CorrelationError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for CorrelationError {
    fn from(err: reqwest::Error) -> Self {
        CorrelationError::Http {
            message: err.to_string(),
        }
    }
}

/// Convenience alias used throughout the engine.
pub type Result<T> = std::result::Result<T, CorrelationError>;

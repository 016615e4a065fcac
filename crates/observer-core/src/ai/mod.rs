//! Contracts for the optional model-backed collaborators.
//!
//! The engine never talks to a model directly; it goes through these seams so
//! tests can substitute deterministic implementations and deployments can
//! pick local or remote backends.

mod http_embedder;
mod reranker;

pub use http_embedder::HttpEmbedder;
pub use reranker::{HttpReranker, RerankResult, Reranker};

use async_trait::async_trait;

use crate::error::Result;

/// Text embedding backend.
///
/// Vectors must keep a stable dimensionality across calls; the first vector
/// an index observes pins its dimension. `embed` returning `Ok(None)` means
/// the backend declined (e.g. empty input) without it being an error.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Option<Vec<f32>>>;

    /// Embed many texts in one backend call. The output aligns with the
    /// input; individual failures yield `None` at that position.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Option<Vec<f32>>>>;

    /// Whether the backend is usable right now. Callers skip embedding work
    /// entirely when this is false.
    fn available(&self) -> bool;
}

//! Semantic duplicate detection over title embeddings.
//!
//! Runs out of band, after the inline SimHash pass: items whose titles share
//! no trigrams can still describe the same story, and cosine similarity over
//! embeddings catches those. The nearest-neighbor backend sits behind
//! [`VectorIndex`] so an FFI-backed ANN library can replace the in-crate
//! flat scan; the panic boundary around index calls is part of that
//! contract, and a misbehaving backend downgrades the in-flight item to
//! "not a duplicate" instead of poisoning the pipeline.

use std::collections::HashSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::warn;

use super::{DedupOutcome, GroupStore};
use crate::ai::Embedder;
use crate::error::{CorrelationError, Result};

/// Nearest-neighbor search over item vectors, keyed by item id.
///
/// `search` returns up to `k` (id, distance) pairs, nearest first, where
/// distance is `1 - cosine` in [0, 2].
pub trait VectorIndex: Send + Sync {
    fn add(&mut self, id: String, vector: Vec<f32>);
    fn search(&self, vector: &[f32], k: usize) -> Vec<(String, f32)>;
    fn len(&self) -> usize;
}

/// Exact flat scan. O(n) per query, fast enough at the pool sizes this
/// engine caps at.
#[derive(Default)]
pub struct FlatVectorIndex {
    entries: Vec<(String, Vec<f32>)>,
}

fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 2.0;
    }
    1.0 - dot / (norm_a.sqrt() * norm_b.sqrt())
}

impl VectorIndex for FlatVectorIndex {
    fn add(&mut self, id: String, vector: Vec<f32>) {
        self.entries.push((id, vector));
    }

    fn search(&self, vector: &[f32], k: usize) -> Vec<(String, f32)> {
        let mut scored: Vec<(String, f32)> = self
            .entries
            .iter()
            .map(|(id, v)| (id.clone(), cosine_distance(vector, v)))
            .collect();
        scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        scored
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

#[derive(Debug, Clone)]
pub struct EmbeddingDedupConfig {
    /// Similarity (`1 - distance/2`) at or above which two items duplicate.
    pub threshold: f64,
    /// Nearest neighbors examined per lookup.
    pub top_k: usize,
    /// Titles are truncated to this many characters before embedding.
    pub max_title_chars: usize,
}

impl Default for EmbeddingDedupConfig {
    fn default() -> Self {
        Self {
            threshold: 0.85,
            top_k: 5,
            max_title_chars: 200,
        }
    }
}

struct EmbeddingInner {
    index: Box<dyn VectorIndex>,
    indexed: HashSet<String>,
    /// Pinned at the first vector; later mismatches are skipped.
    dimensions: Option<usize>,
}

/// The semantic layer of the dedup cascade.
pub struct EmbeddingDedupIndex {
    embedder: Arc<dyn Embedder>,
    inner: RwLock<EmbeddingInner>,
    groups: Arc<GroupStore>,
    config: EmbeddingDedupConfig,
}

impl EmbeddingDedupIndex {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        groups: Arc<GroupStore>,
        config: EmbeddingDedupConfig,
    ) -> Self {
        Self::with_index(embedder, groups, config, Box::<FlatVectorIndex>::default())
    }

    pub fn with_index(
        embedder: Arc<dyn Embedder>,
        groups: Arc<GroupStore>,
        config: EmbeddingDedupConfig,
        index: Box<dyn VectorIndex>,
    ) -> Self {
        Self {
            embedder,
            inner: RwLock::new(EmbeddingInner {
                index,
                indexed: HashSet::new(),
                dimensions: None,
            }),
            groups,
            config,
        }
    }

    /// Embed the item's title and fold it into the best-matching group if one
    /// clears the similarity threshold. The vector is added to the index
    /// either way.
    pub async fn index_item(&self, item_id: &str, title: &str) -> Result<DedupOutcome> {
        {
            let inner = self.inner.read().await;
            if inner.indexed.contains(item_id) {
                drop(inner);
                return Ok(self.current_outcome(item_id).await);
            }
        }

        let truncated: String = title.chars().take(self.config.max_title_chars).collect();
        let vector = self
            .embedder
            .embed(&truncated)
            .await?
            .filter(|v| !v.is_empty())
            .ok_or_else(|| CorrelationError::Embedding {
                message: format!("empty embedding for item {item_id}"),
            })?;

        self.insert_vector(item_id, vector).await
    }

    /// Batch variant: one backend call for all titles, then sequential
    /// insertion. Items whose embedding failed are skipped, not fatal.
    pub async fn index_batch(&self, items: &[(String, String)]) -> Vec<(String, DedupOutcome)> {
        let titles: Vec<String> = items
            .iter()
            .map(|(_, title)| title.chars().take(self.config.max_title_chars).collect())
            .collect();
        let vectors = match self.embedder.embed_batch(&titles).await {
            Ok(vectors) => vectors,
            Err(err) => {
                warn!(%err, "batch embedding failed");
                return Vec::new();
            }
        };

        let mut outcomes = Vec::new();
        for ((item_id, _), vector) in items.iter().zip(vectors) {
            let Some(vector) = vector.filter(|v| !v.is_empty()) else {
                continue;
            };
            match self.insert_vector(item_id, vector).await {
                Ok(outcome) => outcomes.push((item_id.clone(), outcome)),
                Err(err) => warn!(item = %item_id, %err, "skipping item in embedding batch"),
            }
        }
        outcomes
    }

    async fn insert_vector(&self, item_id: &str, vector: Vec<f32>) -> Result<DedupOutcome> {
        let mut inner = self.inner.write().await;

        if inner.indexed.contains(item_id) {
            drop(inner);
            return Ok(self.current_outcome(item_id).await);
        }

        match inner.dimensions {
            None => inner.dimensions = Some(vector.len()),
            Some(expected) if expected != vector.len() => {
                warn!(
                    item = %item_id,
                    expected,
                    actual = vector.len(),
                    "embedding dimension mismatch, skipping item"
                );
                return Err(CorrelationError::DimensionMismatch {
                    expected,
                    actual: vector.len(),
                });
            }
            Some(_) => {}
        }

        // The ANN backend may be FFI; a panic inside must not take the
        // pipeline down. On recovery the item is treated as unique and the
        // index keeps whatever state the backend left behind.
        let top_k = self.config.top_k;
        let search_result = catch_unwind(AssertUnwindSafe(|| {
            inner.index.search(&vector, top_k)
        }));
        let neighbors = match search_result {
            Ok(neighbors) => neighbors,
            Err(_) => {
                warn!(item = %item_id, "vector index panicked during search, treating item as unique");
                Vec::new()
            }
        };

        let target = neighbors
            .into_iter()
            .map(|(id, distance)| (id, 1.0 - f64::from(distance) / 2.0))
            .filter(|(_, similarity)| *similarity >= self.config.threshold)
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

        let add_result = catch_unwind(AssertUnwindSafe(|| {
            inner.index.add(item_id.to_string(), vector)
        }));
        if add_result.is_err() {
            warn!(item = %item_id, "vector index panicked during add");
        }
        inner.indexed.insert(item_id.to_string());

        match target {
            Some((target_id, _)) => {
                let (group_id, group_size) = self.groups.bind(item_id, &target_id).await;
                let primary_id = group_id.clone();
                Ok(DedupOutcome::Duplicate {
                    group_id,
                    primary_id,
                    group_size,
                })
            }
            None => Ok(DedupOutcome::Unique),
        }
    }

    async fn current_outcome(&self, item_id: &str) -> DedupOutcome {
        if self.groups.is_primary(item_id).await {
            DedupOutcome::Unique
        } else {
            let duplicates = self.groups.duplicates_of(item_id).await;
            let primary_id = duplicates.first().cloned().unwrap_or_else(|| item_id.to_string());
            DedupOutcome::Duplicate {
                group_id: primary_id.clone(),
                primary_id,
                group_size: self.groups.group_size(item_id).await,
            }
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.index.len()
    }

    pub async fn dimensions(&self) -> Option<usize> {
        self.inner.read().await.dimensions
    }
}

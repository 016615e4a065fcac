//! Deterministic test doubles shared by unit and integration tests.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;

use crate::ai::Embedder;
use crate::error::Result;
use crate::models::{Item, SourceType};
use crate::sources::{Source, SourceError};

/// Embedder returning canned vectors by exact text match.
///
/// Texts with no registered vector embed to `None`, which exercises the
/// "embedding failed, skip item" paths.
pub struct MockEmbedder {
    dimensions: usize,
    vectors: HashMap<String, Vec<f32>>,
}

impl MockEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            vectors: HashMap::new(),
        }
    }

    pub fn set(&mut self, text: impl Into<String>, vector: Vec<f32>) {
        self.vectors.insert(text.into(), vector);
    }

    /// Register a unit vector along `axis`, convenient for building items
    /// that are exactly orthogonal or parallel.
    pub fn set_axis(&mut self, text: impl Into<String>, axis: usize) {
        let mut vector = vec![0.0; self.dimensions];
        if axis < self.dimensions {
            vector[axis] = 1.0;
        }
        self.vectors.insert(text.into(), vector);
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, text: &str) -> Result<Option<Vec<f32>>> {
        Ok(self.vectors.get(text).cloned())
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Option<Vec<f32>>>> {
        Ok(texts.iter().map(|t| self.vectors.get(t).cloned()).collect())
    }

    fn available(&self) -> bool {
        true
    }
}

/// Builds fully populated items with distinct ids and URLs.
pub fn make_item(id: &str, title: &str) -> Item {
    Item {
        id: id.to_string(),
        source_type: SourceType::Rss,
        source_name: "fixture".to_string(),
        title: title.to_string(),
        summary: String::new(),
        content: String::new(),
        url: format!("https://example.com/{id}"),
        author: String::new(),
        published: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        fetched: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        read: false,
        saved: false,
        embedding: None,
    }
}

/// Source that hands out pre-canned batches in order, then empty batches.
pub struct StaticSource {
    name: String,
    source_type: SourceType,
    batches: Mutex<Vec<Vec<Item>>>,
    fetch_count: AtomicUsize,
}

impl StaticSource {
    pub fn new(name: impl Into<String>, source_type: SourceType, batches: Vec<Vec<Item>>) -> Self {
        Self {
            name: name.into(),
            source_type,
            batches: Mutex::new(batches),
            fetch_count: AtomicUsize::new(0),
        }
    }

    pub fn fetch_count(&self) -> usize {
        self.fetch_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Source for StaticSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn source_type(&self) -> SourceType {
        self.source_type
    }

    async fn fetch(&self) -> std::result::Result<Vec<Item>, SourceError> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);
        let mut batches = self.batches.lock().await;
        if batches.is_empty() {
            Ok(Vec::new())
        } else {
            Ok(batches.remove(0))
        }
    }
}

/// Source that always fails; used for health/backoff tests.
pub struct FailingSource {
    name: String,
}

impl FailingSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Source for FailingSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn source_type(&self) -> SourceType {
        SourceType::Rss
    }

    async fn fetch(&self) -> std::result::Result<Vec<Item>, SourceError> {
        Err(SourceError::transient("always down"))
    }
}

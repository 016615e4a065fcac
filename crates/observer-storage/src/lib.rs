//! # Observer Storage
//!
//! The engine's narrow persistence collaborator: an item table with URL
//! uniqueness, per-item embedding blobs, and entity link tables, backed by
//! SQLite via `sqlx`. Failure to open storage at startup is fatal to the
//! application; every later write is best-effort and the engine keeps its
//! in-memory state authoritative.

pub mod blob;
mod sqlite;

pub use sqlite::SqliteStorage;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use thiserror::Error;

use observer_core::models::Item;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Stored blob bytes do not form a whole number of little-endian floats.
    #[error("malformed embedding blob: {message}")]
    MalformedBlob { message: String },
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Everything the application and engine need from persistence. Item
/// uniqueness is enforced by URL; duplicate inserts are ignored, not errors.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Insert items, skipping URL conflicts. Returns how many were new.
    async fn save_items(&self, items: &[Item]) -> Result<usize>;

    /// Most recent items, newest first. `include_read` keeps already-read
    /// items in the result.
    async fn get_items(&self, limit: usize, include_read: bool) -> Result<Vec<Item>>;

    async fn get_items_since(&self, since: DateTime<Utc>) -> Result<Vec<Item>>;

    async fn mark_read(&self, id: &str) -> Result<()>;

    async fn mark_saved(&self, id: &str, saved: bool) -> Result<()>;

    async fn save_embedding(&self, id: &str, vector: &[f32]) -> Result<()>;

    async fn get_embedding(&self, id: &str) -> Result<Option<Vec<f32>>>;

    /// Items without a stored embedding, oldest first, for backfill batches.
    async fn items_needing_embedding(&self, limit: usize) -> Result<Vec<Item>>;

    /// Stored embeddings for the requested ids; absent ids are omitted.
    async fn embeddings_for(&self, ids: &[String]) -> Result<HashMap<String, Vec<f32>>>;
}

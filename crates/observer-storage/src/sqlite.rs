//! SQLite implementation of the storage contract.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

use observer_core::engine::EntitySink;
use observer_core::entities::Extraction;
use observer_core::error::CorrelationError;
use observer_core::models::{Item, SourceType};

use crate::blob::{decode_embedding, encode_embedding};
use crate::{Result, Storage, StorageError};

pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Open (or create) the database file and run migrations. An error here
    /// is fatal to the application by contract.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;
        let storage = Self { pool };
        storage.migrate().await?;
        info!(path = %path.as_ref().display(), "storage opened");
        Ok(storage)
    }

    /// In-memory database for tests. A single connection keeps the shared
    /// memory alive.
    pub async fn open_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let storage = Self { pool };
        storage.migrate().await?;
        Ok(storage)
    }

    /// Migrations are additive only: base tables via `IF NOT EXISTS`, later
    /// columns via a guarded `ALTER TABLE`. Running them again is a no-op.
    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS items (
                id           TEXT PRIMARY KEY,
                source_type  TEXT NOT NULL,
                source_name  TEXT NOT NULL,
                title        TEXT NOT NULL,
                summary      TEXT NOT NULL DEFAULT '',
                content      TEXT NOT NULL DEFAULT '',
                url          TEXT NOT NULL UNIQUE,
                author       TEXT NOT NULL DEFAULT '',
                published_at TEXT NOT NULL,
                fetched_at   TEXT NOT NULL,
                read         INTEGER NOT NULL DEFAULT 0,
                saved        INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS entities (
                id         TEXT PRIMARY KEY,
                name       TEXT NOT NULL,
                type       TEXT NOT NULL,
                first_seen TEXT NOT NULL,
                last_seen  TEXT NOT NULL,
                mentions   INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS item_entities (
                item_id   TEXT NOT NULL,
                entity_id TEXT NOT NULL,
                context   TEXT NOT NULL DEFAULT '',
                salience  REAL NOT NULL DEFAULT 0,
                PRIMARY KEY (item_id, entity_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Embedding support arrived after the base schema.
        self.ensure_column("items", "embedding", "BLOB").await?;

        Ok(())
    }

    async fn ensure_column(&self, table: &str, column: &str, ddl_type: &str) -> Result<()> {
        let exists: Option<i64> = sqlx::query_scalar(
            "SELECT 1 FROM pragma_table_info(?1) WHERE name = ?2",
        )
        .bind(table)
        .bind(column)
        .fetch_optional(&self.pool)
        .await?;
        if exists.is_none() {
            let statement = format!("ALTER TABLE {table} ADD COLUMN {column} {ddl_type}");
            sqlx::query(&statement).execute(&self.pool).await?;
            debug!(table, column, "added column");
        }
        Ok(())
    }

    fn row_to_item(row: &SqliteRow) -> Result<Item> {
        let source_type: String = row.try_get("source_type")?;
        let published_at: DateTime<Utc> = row.try_get("published_at")?;
        let fetched_at: DateTime<Utc> = row.try_get("fetched_at")?;
        let embedding: Option<Vec<u8>> = row.try_get("embedding")?;
        let embedding = match embedding {
            Some(bytes) if !bytes.is_empty() => Some(decode_embedding(&bytes)?),
            _ => None,
        };
        Ok(Item {
            id: row.try_get("id")?,
            source_type: source_type.parse().unwrap_or(SourceType::Aggregator),
            source_name: row.try_get("source_name")?,
            title: row.try_get("title")?,
            summary: row.try_get("summary")?,
            content: row.try_get("content")?,
            url: row.try_get("url")?,
            author: row.try_get("author")?,
            published: published_at,
            fetched: fetched_at,
            read: row.try_get("read")?,
            saved: row.try_get("saved")?,
            embedding,
        })
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn save_items(&self, items: &[Item]) -> Result<usize> {
        let mut new_count = 0usize;
        for item in items {
            let result = sqlx::query(
                r#"
                INSERT OR IGNORE INTO items
                    (id, source_type, source_name, title, summary, content,
                     url, author, published_at, fetched_at, read, saved, embedding)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
                "#,
            )
            .bind(&item.id)
            .bind(item.source_type.to_string())
            .bind(&item.source_name)
            .bind(&item.title)
            .bind(&item.summary)
            .bind(&item.content)
            .bind(&item.url)
            .bind(&item.author)
            .bind(item.published)
            .bind(item.fetched)
            .bind(item.read)
            .bind(item.saved)
            .bind(item.embedding.as_deref().map(encode_embedding))
            .execute(&self.pool)
            .await?;
            new_count += result.rows_affected() as usize;
        }
        Ok(new_count)
    }

    async fn get_items(&self, limit: usize, include_read: bool) -> Result<Vec<Item>> {
        let rows = if include_read {
            sqlx::query("SELECT * FROM items ORDER BY published_at DESC LIMIT ?1")
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await?
        } else {
            sqlx::query(
                "SELECT * FROM items WHERE read = 0 ORDER BY published_at DESC LIMIT ?1",
            )
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?
        };
        rows.iter().map(Self::row_to_item).collect()
    }

    async fn get_items_since(&self, since: DateTime<Utc>) -> Result<Vec<Item>> {
        let rows = sqlx::query(
            "SELECT * FROM items WHERE fetched_at >= ?1 ORDER BY published_at DESC",
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_item).collect()
    }

    async fn mark_read(&self, id: &str) -> Result<()> {
        sqlx::query("UPDATE items SET read = 1 WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_saved(&self, id: &str, saved: bool) -> Result<()> {
        sqlx::query("UPDATE items SET saved = ?1 WHERE id = ?2")
            .bind(saved)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn save_embedding(&self, id: &str, vector: &[f32]) -> Result<()> {
        sqlx::query("UPDATE items SET embedding = ?1 WHERE id = ?2")
            .bind(encode_embedding(vector))
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_embedding(&self, id: &str) -> Result<Option<Vec<f32>>> {
        let bytes: Option<Option<Vec<u8>>> =
            sqlx::query_scalar("SELECT embedding FROM items WHERE id = ?1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        match bytes.flatten() {
            Some(bytes) if !bytes.is_empty() => Ok(Some(decode_embedding(&bytes)?)),
            _ => Ok(None),
        }
    }

    async fn items_needing_embedding(&self, limit: usize) -> Result<Vec<Item>> {
        let rows = sqlx::query(
            "SELECT * FROM items WHERE embedding IS NULL ORDER BY fetched_at ASC LIMIT ?1",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_item).collect()
    }

    async fn embeddings_for(&self, ids: &[String]) -> Result<HashMap<String, Vec<f32>>> {
        let mut out = HashMap::with_capacity(ids.len());
        for id in ids {
            if let Some(vector) = self.get_embedding(id).await? {
                out.insert(id.clone(), vector);
            }
        }
        Ok(out)
    }
}

/// The engine's housekeeper hands extraction batches here; errors are
/// reported but never retried.
#[async_trait]
impl EntitySink for SqliteStorage {
    async fn persist_entities(
        &self,
        batch: &[(String, Extraction)],
    ) -> observer_core::error::Result<usize> {
        let map_err = |err: sqlx::Error| CorrelationError::Storage {
            message: err.to_string(),
        };

        let now = Utc::now();
        let mut written = 0usize;
        for (item_id, extraction) in batch {
            for extracted in &extraction.entities {
                sqlx::query(
                    r#"
                    INSERT INTO entities (id, name, type, first_seen, last_seen, mentions)
                    VALUES (?1, ?2, ?3, ?4, ?4, 1)
                    ON CONFLICT(id) DO UPDATE SET
                        last_seen = excluded.last_seen,
                        mentions = mentions + 1
                    "#,
                )
                .bind(&extracted.entity.id)
                .bind(&extracted.entity.name)
                .bind(extracted.entity.entity_type.to_string())
                .bind(now)
                .execute(&self.pool)
                .await
                .map_err(map_err)?;

                let result = sqlx::query(
                    r#"
                    INSERT OR IGNORE INTO item_entities (item_id, entity_id, context, salience)
                    VALUES (?1, ?2, ?3, ?4)
                    "#,
                )
                .bind(item_id)
                .bind(&extracted.entity.id)
                .bind(&extracted.context)
                .bind(extracted.entity.salience)
                .execute(&self.pool)
                .await
                .map_err(map_err)?;
                written += result.rows_affected() as usize;
            }
        }
        Ok(written)
    }
}

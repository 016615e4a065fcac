//! Storage round-trip and migration tests against a real SQLite file.

use chrono::{Duration, TimeZone, Utc};
use tempfile::TempDir;

use observer_core::engine::EntitySink;
use observer_core::entities::EntityExtractor;
use observer_core::models::{Item, SourceType};
use observer_storage::{SqliteStorage, Storage};

fn item(id: &str, url: &str, title: &str) -> Item {
    Item {
        id: id.to_string(),
        source_type: SourceType::HackerNews,
        source_name: "Hacker News".to_string(),
        title: title.to_string(),
        summary: "a summary".to_string(),
        content: String::new(),
        url: url.to_string(),
        author: "someone".to_string(),
        published: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        fetched: Utc.timestamp_opt(1_700_000_100, 0).unwrap(),
        read: false,
        saved: false,
        embedding: None,
    }
}

#[tokio::test]
async fn save_and_fetch_round_trip() {
    let dir = TempDir::new().unwrap();
    let storage = SqliteStorage::open(dir.path().join("observer.db")).await.unwrap();

    let items = vec![
        item("a", "https://ex.com/a", "First story"),
        item("b", "https://ex.com/b", "Second story"),
    ];
    let new_count = storage.save_items(&items).await.unwrap();
    assert_eq!(new_count, 2);

    let fetched = storage.get_items(10, true).await.unwrap();
    assert_eq!(fetched.len(), 2);
    let first = fetched.iter().find(|i| i.id == "a").unwrap();
    assert_eq!(first.title, "First story");
    assert_eq!(first.source_type, SourceType::HackerNews);
    assert_eq!(first.published, Utc.timestamp_opt(1_700_000_000, 0).unwrap());
    assert!(!first.read);
}

#[tokio::test]
async fn url_uniqueness_skips_duplicates() {
    let storage = SqliteStorage::open_in_memory().await.unwrap();

    let first = storage
        .save_items(&[item("a", "https://ex.com/same", "Original")])
        .await
        .unwrap();
    assert_eq!(first, 1);

    // Different id, same URL: ignored and excluded from new_count.
    let second = storage
        .save_items(&[item("a2", "https://ex.com/same", "Copy")])
        .await
        .unwrap();
    assert_eq!(second, 0);

    let all = storage.get_items(10, true).await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].title, "Original");
}

#[tokio::test]
async fn read_and_saved_flags() {
    let storage = SqliteStorage::open_in_memory().await.unwrap();
    storage
        .save_items(&[
            item("a", "https://ex.com/a", "One"),
            item("b", "https://ex.com/b", "Two"),
        ])
        .await
        .unwrap();

    storage.mark_read("a").await.unwrap();
    storage.mark_saved("b", true).await.unwrap();

    let unread = storage.get_items(10, false).await.unwrap();
    assert_eq!(unread.len(), 1);
    assert_eq!(unread[0].id, "b");
    assert!(unread[0].saved);

    storage.mark_saved("b", false).await.unwrap();
    let unread = storage.get_items(10, false).await.unwrap();
    assert!(!unread[0].saved);
}

#[tokio::test]
async fn items_since_filters_by_fetch_time() {
    let storage = SqliteStorage::open_in_memory().await.unwrap();
    let mut old = item("old", "https://ex.com/old", "Old");
    old.fetched = Utc.timestamp_opt(1_600_000_000, 0).unwrap();
    storage
        .save_items(&[old, item("new", "https://ex.com/new", "New")])
        .await
        .unwrap();

    let cutoff = Utc.timestamp_opt(1_650_000_000, 0).unwrap();
    let recent = storage.get_items_since(cutoff).await.unwrap();
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].id, "new");
}

#[tokio::test]
async fn embedding_blob_round_trips_bitwise() {
    let storage = SqliteStorage::open_in_memory().await.unwrap();
    storage
        .save_items(&[item("a", "https://ex.com/a", "With vector")])
        .await
        .unwrap();

    let vector = vec![
        1.0f32,
        -2.5,
        f32::NAN,
        f32::INFINITY,
        f32::NEG_INFINITY,
        f32::MIN_POSITIVE / 2.0,
    ];
    storage.save_embedding("a", &vector).await.unwrap();

    let loaded = storage.get_embedding("a").await.unwrap().unwrap();
    assert_eq!(loaded.len(), vector.len());
    for (a, b) in vector.iter().zip(&loaded) {
        assert_eq!(a.to_bits(), b.to_bits());
    }
}

#[tokio::test]
async fn backfill_queue_lists_unembedded_oldest_first() {
    let storage = SqliteStorage::open_in_memory().await.unwrap();
    let mut early = item("early", "https://ex.com/early", "Early");
    early.fetched = Utc.timestamp_opt(1_600_000_000, 0).unwrap();
    storage
        .save_items(&[item("late", "https://ex.com/late", "Late"), early])
        .await
        .unwrap();
    storage.save_embedding("late", &[1.0, 2.0]).await.unwrap();

    let pending = storage.items_needing_embedding(10).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, "early");

    storage.save_embedding("early", &[0.5]).await.unwrap();
    assert!(storage.items_needing_embedding(10).await.unwrap().is_empty());

    let map = storage
        .embeddings_for(&["early".to_string(), "late".to_string(), "ghost".to_string()])
        .await
        .unwrap();
    assert_eq!(map.len(), 2);
    assert_eq!(map["late"], vec![1.0, 2.0]);
}

#[tokio::test]
async fn migrations_are_idempotent() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("observer.db");
    {
        let storage = SqliteStorage::open(&path).await.unwrap();
        storage
            .save_items(&[item("a", "https://ex.com/a", "Survivor")])
            .await
            .unwrap();
    }
    // Re-opening re-runs every migration against existing tables.
    let storage = SqliteStorage::open(&path).await.unwrap();
    let all = storage.get_items(10, true).await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].id, "a");
}

#[tokio::test]
async fn entity_sink_persists_links() {
    let storage = SqliteStorage::open_in_memory().await.unwrap();
    storage
        .save_items(&[item("a", "https://ex.com/a", "US and China trade tensions")])
        .await
        .unwrap();

    let extraction = EntityExtractor::new().extract("US and China trade tensions", "");
    let written = storage
        .persist_entities(&[("a".to_string(), extraction.clone())])
        .await
        .unwrap();
    assert_eq!(written, 2);

    // Writing the same links again is a no-op for item_entities but bumps
    // entity mention counts.
    let written = storage
        .persist_entities(&[("a".to_string(), extraction)])
        .await
        .unwrap();
    assert_eq!(written, 0);
}

#[tokio::test]
async fn since_window_is_inclusive_of_boundary() {
    let storage = SqliteStorage::open_in_memory().await.unwrap();
    let mut exact = item("exact", "https://ex.com/exact", "Boundary");
    let cutoff = Utc.timestamp_opt(1_650_000_000, 0).unwrap();
    exact.fetched = cutoff;
    storage.save_items(&[exact]).await.unwrap();

    assert_eq!(storage.get_items_since(cutoff).await.unwrap().len(), 1);
    assert_eq!(
        storage
            .get_items_since(cutoff + Duration::seconds(1))
            .await
            .unwrap()
            .len(),
        0
    );
}

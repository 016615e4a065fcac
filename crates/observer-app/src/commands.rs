//! Subcommand implementations.

use std::env;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use observer_core::aggregator::ItemFilter;
use observer_core::ai::{Embedder, HttpEmbedder};
use observer_core::engine::{CorrelationEngine, CorrelationEvent, EngineConfig};
use observer_core::models::Item;
use observer_core::queue::{FetchScheduler, QueueConfig};
use observer_sources::{http_client, HackerNewsSource, JsonFeedSource, UsgsSource};
use observer_storage::{SqliteStorage, Storage};

use crate::config::AppConfig;

type CommandError = Box<dyn std::error::Error + Send + Sync>;
type CommandResult = Result<(), CommandError>;

fn embedder_from_env() -> Option<Arc<dyn Embedder>> {
    let endpoint = env::var("OBSERVER_EMBED_URL").ok()?;
    let model = env::var("OBSERVER_EMBED_MODEL").unwrap_or_else(|_| "all-minilm".to_string());
    match HttpEmbedder::new(endpoint, model) {
        Ok(embedder) => Some(Arc::new(embedder)),
        Err(err) => {
            warn!(%err, "embedder misconfigured, continuing without semantic dedup");
            None
        }
    }
}

/// Run the pipeline until ctrl-c.
pub async fn run(config: AppConfig) -> CommandResult {
    // Storage failing to open is the one fatal startup error.
    let storage = Arc::new(SqliteStorage::open(&config.database_path).await?);

    let engine = Arc::new(CorrelationEngine::new(
        EngineConfig::default(),
        ItemFilter::new(),
        embedder_from_env(),
        Some(storage.clone()),
    ));

    let cancel = CancellationToken::new();

    // Fetched batches are persisted best-effort, then handed to the engine's
    // aggregate pool.
    let (batches_tx, mut batches_rx) = mpsc::channel::<Vec<Item>>(64);
    let intake = engine.intake_sender();
    let persist_storage = storage.clone();
    let persist_task = tokio::spawn(async move {
        while let Some(batch) = batches_rx.recv().await {
            match persist_storage.save_items(&batch).await {
                Ok(new_count) => {
                    if new_count > 0 {
                        info!(new_count, "persisted new items");
                    }
                }
                Err(err) => warn!(%err, "item persist failed, keeping items in memory"),
            }
            if intake.try_send(batch).is_err() {
                warn!("engine intake full, dropping batch");
            }
        }
    });

    let scheduler = Arc::new(FetchScheduler::new(
        batches_tx,
        config.max_concurrent_fetches,
        QueueConfig::default(),
        cancel.clone(),
    ));

    let client = http_client()?;
    scheduler
        .register(
            Arc::new(HackerNewsSource::new(client.clone(), config.hn_max_stories)),
            config.base_poll_interval,
        )
        .await;
    scheduler
        .register(
            Arc::new(UsgsSource::new(client.clone(), config.usgs_min_magnitude)),
            config.base_poll_interval,
        )
        .await;
    for (name, url) in &config.json_feeds {
        scheduler
            .register(
                Arc::new(JsonFeedSource::new(client.clone(), name.clone(), url.clone(), 100)),
                config.base_poll_interval,
            )
            .await;
    }

    let scheduler_task = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move { scheduler.run().await })
    };

    // Surface the event stream in the logs; a real UI would subscribe here.
    let mut events = engine.events().await.ok_or("event stream already taken")?;
    let events_task = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                CorrelationEvent::VelocitySpike {
                    cluster_id,
                    window,
                    rate,
                } => info!(%cluster_id, %window, rate, "velocity spike"),
                CorrelationEvent::DisagreementFound {
                    cluster_id,
                    item_id,
                    description,
                } => info!(%cluster_id, %item_id, description, "sources disagree"),
                other => tracing::debug!(?other, "pipeline event"),
            }
        }
    });

    info!("observer running; ctrl-c to stop");
    tokio::signal::ctrl_c().await?;
    info!("shutting down");

    cancel.cancel();
    scheduler_task.await?;
    engine.stop().await;
    persist_task.abort();
    events_task.await?;
    Ok(())
}

/// Embed items missing vectors, batch by batch, resuming from DB state.
pub async fn backfill(config: AppConfig, batch_override: Option<usize>) -> CommandResult {
    let storage = SqliteStorage::open(&config.database_path).await?;
    let Some(embedder) = embedder_from_env() else {
        return Err("set OBSERVER_EMBED_URL to run a backfill".into());
    };
    let batch_size = batch_override.unwrap_or(config.backfill_batch).max(1);

    let mut total = 0usize;
    loop {
        let pending = storage.items_needing_embedding(batch_size).await?;
        if pending.is_empty() {
            break;
        }

        let titles: Vec<String> = pending.iter().map(|i| i.title.clone()).collect();
        let vectors = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!(total, "backfill interrupted; safe to resume");
                return Ok(());
            }
            result = embedder.embed_batch(&titles) => result?,
        };

        for (item, vector) in pending.iter().zip(vectors) {
            match vector {
                Some(vector) => {
                    storage.save_embedding(&item.id, &vector).await?;
                    total += 1;
                }
                None => warn!(item = %item.id, "embedder returned nothing, skipping"),
            }
        }
        info!(total, batch = pending.len(), "backfill progress");

        if pending.len() < batch_size {
            break;
        }
    }
    info!(total, "backfill complete");
    Ok(())
}

/// Replay the stored corpus through a fresh engine and print its stats.
pub async fn stats(config: AppConfig) -> CommandResult {
    let storage = SqliteStorage::open(&config.database_path).await?;
    let items = storage.get_items(1_000_000, true).await?;
    let count = items.len();

    let engine = CorrelationEngine::new(EngineConfig::default(), ItemFilter::new(), None, None);
    engine.process_items(items);

    // Wait for the pipeline to settle.
    for _ in 0..600 {
        let stats = engine.stats().await;
        if stats.items_processed + stats.items_dropped >= count as u64 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let stats = engine.stats().await;
    let output = serde_json::json!({
        "stored_items": count,
        "items_processed": stats.items_processed,
        "duplicates_found": stats.duplicates_found,
        "dedup_groups": stats.dedup_groups,
        "clusters": stats.clusters,
        "cached_extractions": stats.cached_extractions,
        "items_dropped": stats.items_dropped,
        "events_dropped": stats.events_dropped,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);

    engine.stop().await;
    Ok(())
}

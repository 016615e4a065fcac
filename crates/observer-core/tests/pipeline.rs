//! Cross-component pipeline properties: backpressure, concurrency safety,
//! shutdown, and the out-of-band semantic dedup path.

use std::sync::Arc;
use std::time::Duration;

use observer_core::aggregator::ItemFilter;
use observer_core::engine::{CorrelationEngine, CorrelationEvent, EngineConfig};
use observer_core::models::SourceType;
use observer_core::queue::{FetchScheduler, QueueConfig};
use observer_core::models::SourceHealth;
use observer_core::testing::{make_item, FailingSource, MockEmbedder, StaticSource};
use tokio_util::sync::CancellationToken;

async fn settle(engine: &CorrelationEngine, processed: u64) {
    for _ in 0..300 {
        if engine.stats().await.items_processed >= processed {
            tokio::time::sleep(Duration::from_millis(50)).await;
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// A subscriber that never reads must not slow ingestion; the bounded event
/// channel drops instead.
#[tokio::test]
async fn stalled_subscriber_never_blocks_ingestion() {
    let config = EngineConfig {
        events_buffer: 8,
        ..EngineConfig::default()
    };
    let engine = CorrelationEngine::new(config, ItemFilter::new(), None, None);
    // Take the receiver and never read from it.
    let _stalled = engine.events().await.unwrap();

    let total = 200u64;
    for i in 0..total {
        // Distinct enough titles that most are unique.
        engine.process_item(make_item(
            &format!("s{i}"),
            &format!("Completely unrelated headline number {i} about topic {i}"),
        ));
    }
    settle(&engine, total).await;

    let stats = engine.stats().await;
    assert_eq!(stats.items_processed, total, "every accepted item was processed");
    assert!(stats.events_dropped > 0, "the stalled subscriber lost events");

    engine.stop().await;
}

/// Concurrent producers cannot corrupt the indices: every processed item has
/// a consistent group view, and counters add up.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_producers_keep_indices_consistent() {
    let engine = Arc::new(CorrelationEngine::new(
        EngineConfig::default(),
        ItemFilter::new(),
        None,
        None,
    ));

    // Word-distinct topics keep unrelated titles far apart in trigram space.
    const TOPICS: [&str; 13] = [
        "argon", "boron", "cobalt", "dysprosium", "erbium", "fermium", "gallium",
        "helium", "iridium", "krypton", "lithium", "mercury", "neodymium",
    ];

    let producers = 8;
    let per_producer = 25u64;
    let mut handles = Vec::new();
    for p in 0..producers {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            for i in 0..per_producer {
                // Half the titles repeat across producers to force duplicate
                // races.
                let title = if i % 2 == 0 {
                    format!("Shared breaking story about {}", TOPICS[(i / 2) as usize])
                } else {
                    format!("Producer {p} exclusive report on {} supplies", TOPICS[(i / 2) as usize])
                };
                engine.process_item(make_item(&format!("p{p}-i{i}"), &title));
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let expected = producers as u64 * per_producer;
    settle(&engine, expected).await;

    let stats = engine.stats().await;
    assert_eq!(
        stats.items_processed + stats.items_dropped,
        expected,
        "every submission was either processed or dropped"
    );

    // Each shared title formed exactly one group whose primary is unique.
    for i in (0..per_producer).step_by(2) {
        let ids: Vec<String> = (0..producers).map(|p| format!("p{p}-i{i}")).collect();
        let mut primaries = 0;
        for id in &ids {
            if engine.is_primary_in_group(id).await {
                primaries += 1;
            }
        }
        // All producers raced the same title; exactly one primary may exist
        // per group (dropped items never enter any index).
        let group_size = {
            let mut max = 0;
            for id in &ids {
                let duplicates = engine.duplicates(id).await;
                max = max.max(duplicates.len() + 1);
            }
            max
        };
        assert!(
            primaries >= 1,
            "title {i}: at least one primary among {ids:?}"
        );
        assert!(
            group_size <= ids.len(),
            "title {i}: group cannot exceed the submissions"
        );
    }

    engine.stop().await;
}

/// Stop drains, is idempotent, and rejects new input afterwards.
#[tokio::test]
async fn stop_drains_and_is_idempotent() {
    let engine = CorrelationEngine::new(EngineConfig::default(), ItemFilter::new(), None, None);
    for i in 0..20 {
        engine.process_item(make_item(&format!("d{i}"), &format!("Draining story {i}")));
    }

    engine.stop().await;
    engine.stop().await;

    assert!(!engine.process_item(make_item("late", "Too late")));
    // Buffered items were drained, not lost.
    let stats = engine.stats().await;
    assert_eq!(stats.items_processed + stats.items_dropped, 20);
}

/// After stop, the event channel closes so subscribers terminate.
#[tokio::test]
async fn event_channel_closes_after_stop() {
    let engine = CorrelationEngine::new(EngineConfig::default(), ItemFilter::new(), None, None);
    let mut events = engine.events().await.unwrap();
    engine.stop().await;

    // Drain whatever was buffered; the channel must then report closed.
    loop {
        match tokio::time::timeout(Duration::from_secs(1), events.recv()).await {
            Ok(Some(_)) => continue,
            Ok(None) => break,
            Err(_) => panic!("event channel did not close after stop"),
        }
    }
}

/// Rephrased stories that share no trigrams still collapse through the
/// embedding layer.
#[tokio::test]
async fn semantic_dedup_collapses_rephrased_stories() {
    let mut embedder = MockEmbedder::new(4);
    embedder.set(
        "Boeing 737 MAX grounded indefinitely by FAA",
        vec![1.0, 0.0, 0.0, 0.0],
    );
    embedder.set(
        "FAA extends 737 MAX flight ban with no end date",
        vec![0.98, 0.05, 0.0, 0.0],
    );
    embedder.set("Cheese prices climb in Normandy", vec![0.0, 1.0, 0.0, 0.0]);

    let engine = CorrelationEngine::new(
        EngineConfig::default(),
        ItemFilter::new(),
        Some(Arc::new(embedder)),
        None,
    );
    let mut events = engine.events().await.unwrap();

    engine.process_item(make_item("m1", "Boeing 737 MAX grounded indefinitely by FAA"));
    settle(&engine, 1).await;
    engine.process_item(make_item("m2", "FAA extends 737 MAX flight ban with no end date"));
    settle(&engine, 2).await;
    engine.process_item(make_item("m3", "Cheese prices climb in Normandy"));
    settle(&engine, 3).await;

    // m2 is not a near-duplicate of m1 by title, but its embedding is.
    let mut saw_semantic_duplicate = false;
    while let Ok(Some(event)) =
        tokio::time::timeout(Duration::from_millis(500), events.recv()).await
    {
        if let CorrelationEvent::DuplicateFound {
            item_id,
            primary_id,
            ..
        } = event
        {
            assert_eq!(item_id, "m2");
            assert_eq!(primary_id, "m1");
            saw_semantic_duplicate = true;
        }
    }
    assert!(saw_semantic_duplicate);

    assert_eq!(engine.duplicate_count("m1").await, 1);
    assert!(!engine.is_primary_in_group("m2").await);
    assert!(engine.is_primary_in_group("m3").await, "orthogonal vector stays unique");

    engine.stop().await;
}

/// The fetch scheduler drives sources into the engine end to end.
#[tokio::test]
async fn scheduler_feeds_engine_through_aggregator() {
    let engine = CorrelationEngine::new(EngineConfig::default(), ItemFilter::new(), None, None);
    let cancel = CancellationToken::new();
    let scheduler = Arc::new(FetchScheduler::new(
        engine.intake_sender(),
        10,
        QueueConfig::default(),
        cancel.clone(),
    ));

    let source = Arc::new(StaticSource::new(
        "static-feed",
        SourceType::Rss,
        vec![vec![
            make_item("f1", "US and China resume trade talks"),
            make_item("f2", "Germany and France back fiscal pact"),
        ]],
    ));
    scheduler
        .register(source.clone(), Duration::from_secs(60))
        .await;

    let runner = scheduler.clone();
    let run = tokio::spawn(async move { runner.run().await });

    settle(&engine, 2).await;
    let stats = engine.stats().await;
    assert_eq!(stats.items_processed, 2);
    assert_eq!(stats.pool_size, 2, "items landed in the aggregate pool");
    assert!(source.fetch_count() >= 1);

    let health = scheduler.source_health().await;
    assert!(health.contains_key("static-feed"));

    // The queues remain sampleable after the engine consumed the batch.
    let mut sampler = observer_core::sampler::RecencyMerge { max_per_source: None };
    let sampled = scheduler.sample(&mut sampler, 10).await;
    assert_eq!(sampled.len(), 2);

    cancel.cancel();
    run.await.unwrap();
    engine.stop().await;
}

/// Pool overflow through the ingest path evicts oldest items and keeps the
/// counters and pool size consistent.
#[tokio::test]
async fn intake_path_respects_pool_cap() {
    let config = EngineConfig {
        pool_cap: 5,
        ..EngineConfig::default()
    };
    let engine = CorrelationEngine::new(config, ItemFilter::new(), None, None);

    let batch: Vec<_> = (0..7i64)
        .map(|i| {
            let mut item = make_item(&format!("cap{i}"), &format!("Distinct capped headline {i}"));
            item.published = chrono::Utc::now() - chrono::Duration::minutes(60 - i);
            item
        })
        .collect();
    engine
        .intake_sender()
        .try_send(batch)
        .expect("intake accepts the batch");

    settle(&engine, 5).await;
    let stats = engine.stats().await;
    assert_eq!(stats.pool_size, 5);
    assert_eq!(stats.pool_counters.evicted, 2);
    assert_eq!(stats.pool_counters.total, 7);

    engine.stop().await;
}

/// A hot cluster reads as spiking through the engine's trend query.
#[tokio::test]
async fn cluster_trend_reflects_arrival_rate() {
    let engine = CorrelationEngine::new(EngineConfig::default(), ItemFilter::new(), None, None);

    let phases = ["opens", "continues", "expands", "deepens", "concludes", "reviewed"];
    for (i, phase) in phases.iter().enumerate() {
        engine.process_item(make_item(
            &format!("t{i}"),
            &format!("Fed and ECB rate coordination {phase}"),
        ));
    }
    // Wait for all six to land in the cluster.
    for _ in 0..300 {
        let clusters = engine.active_clusters(1).await;
        if clusters.first().map(|c| c.size) == Some(6) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let clusters = engine.active_clusters(1).await;
    let cluster = clusters.first().expect("one active cluster");
    assert_eq!(
        engine.cluster_trend(&cluster.id).await,
        observer_core::models::Trend::Spiking,
        "six arrivals inside the hour"
    );
    assert!(!engine.sparkline(&cluster.id, 4).await.is_empty());

    engine.stop().await;
}

/// A source that keeps failing degrades to warning and then failing health
/// without disturbing ingestion from healthy sources.
#[tokio::test]
async fn failing_source_degrades_health_only() {
    let engine = CorrelationEngine::new(EngineConfig::default(), ItemFilter::new(), None, None);
    let cancel = CancellationToken::new();
    let scheduler = Arc::new(FetchScheduler::new(
        engine.intake_sender(),
        10,
        QueueConfig::default(),
        cancel.clone(),
    ));

    scheduler
        .register(Arc::new(FailingSource::new("broken-feed")), Duration::from_secs(60))
        .await;
    scheduler
        .register(
            Arc::new(StaticSource::new(
                "healthy-feed",
                SourceType::Rss,
                vec![vec![make_item("h1", "A perfectly ordinary story")]],
            )),
            Duration::from_secs(60),
        )
        .await;

    let runner = scheduler.clone();
    let run = tokio::spawn(async move { runner.run().await });

    settle(&engine, 1).await;
    let health = scheduler.source_health().await;
    assert_eq!(health.get("broken-feed"), Some(&SourceHealth::Warning));
    assert_eq!(health.get("healthy-feed"), Some(&SourceHealth::Healthy));
    assert_eq!(engine.stats().await.items_processed, 1, "healthy source unaffected");

    cancel.cancel();
    run.await.unwrap();
    engine.stop().await;
}

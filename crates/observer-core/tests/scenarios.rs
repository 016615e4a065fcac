//! End-to-end scenarios over the public engine surface.

use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use std::time::Duration;

use observer_core::aggregator::{Aggregator, ItemFilter};
use observer_core::engine::{CorrelationEngine, EngineConfig};
use observer_core::models::{Item, SourceType};
use observer_core::testing::make_item;
use observer_core::velocity::{SpikeWindow, VelocityTracker};

fn wire_item(id: &str, source: &str, url: &str, title: &str) -> Item {
    let mut item = make_item(id, title);
    item.source_name = source.to_string();
    item.source_type = SourceType::Rss;
    item.url = url.to_string();
    item
}

async fn settle(engine: &CorrelationEngine, processed: u64) {
    for _ in 0..200 {
        if engine.stats().await.items_processed >= processed {
            // One more beat for pool work to land.
            tokio::time::sleep(Duration::from_millis(50)).await;
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Three outlets carry the same wire story with cosmetic title differences.
#[tokio::test]
async fn scenario_near_duplicate_wire_stories() {
    let engine = CorrelationEngine::new(EngineConfig::default(), ItemFilter::new(), None, None);

    let items = vec![
        wire_item(
            "wire-1",
            "Newswire A",
            "https://a.example.com/boeing",
            "Boeing 737 MAX grounded indefinitely by FAA",
        ),
        wire_item(
            "wire-2",
            "Newswire B",
            "https://b.example.com/faa-boeing",
            "boeing 737 max grounded indefinitely by faa",
        ),
        wire_item(
            "wire-3",
            "Newswire C",
            "https://c.example.com/737-grounding",
            "Boeing 737 MAX grounded indefinitely by FAA.",
        ),
    ];
    for item in items.clone() {
        assert!(engine.process_item(item));
    }
    settle(&engine, 3).await;

    assert_eq!(engine.duplicate_count("wire-1").await, 2);
    assert!(engine.is_primary_in_group("wire-1").await);
    assert!(!engine.is_primary_in_group("wire-2").await);
    assert!(!engine.is_primary_in_group("wire-3").await);

    let mut duplicates = engine.duplicates("wire-1").await;
    duplicates.sort();
    assert_eq!(duplicates, vec!["wire-2".to_string(), "wire-3".to_string()]);

    let primaries = engine.primary_items(&items).await;
    assert_eq!(primaries.len(), 1);
    assert_eq!(primaries[0].id, "wire-1");

    engine.stop().await;
}

/// Two items share a URL; the second is blocked at the pool regardless of
/// its title.
#[tokio::test]
async fn scenario_url_dedup_with_title_difference() {
    let aggregator = Aggregator::new(100, ItemFilter::new());

    let first = wire_item("u1", "A", "https://ex.com/a", "One headline");
    let report = aggregator.merge_items(vec![first]).await;
    assert_eq!(report.added, 1);

    let second = wire_item("u2", "B", "https://ex.com/a", "A different headline");
    let report = aggregator.merge_items(vec![second]).await;
    assert_eq!(report.added, 0);
    assert_eq!(report.blocked, 1);

    assert_eq!(aggregator.len().await, 1);
    assert_eq!(aggregator.counters().await.blocked, 1);
}

/// Countries and a cashtag come out of a single headline.
#[tokio::test]
async fn scenario_entity_extraction() {
    let engine = CorrelationEngine::new(EngineConfig::default(), ItemFilter::new(), None, None);

    engine.process_item(make_item("e1", "US and China trade tensions; $AAPL falls"));
    settle(&engine, 1).await;

    let extraction = engine.item_entities("e1").await.expect("entities cached");
    let ids: Vec<&str> = extraction
        .entities
        .iter()
        .map(|e| e.entity.id.as_str())
        .collect();
    assert!(ids.contains(&"country:united_states"), "{ids:?}");
    assert!(ids.contains(&"country:china"), "{ids:?}");
    assert!(ids.contains(&"ticker:AAPL"), "{ids:?}");

    let aapl = extraction
        .entities
        .iter()
        .find(|e| e.entity.id == "ticker:AAPL")
        .unwrap();
    assert_eq!(aapl.entity.salience, 0.9);

    engine.stop().await;
}

/// Items sharing half their entities join one story; disjoint items found
/// their own.
#[tokio::test]
async fn scenario_cluster_assignment_by_overlap() {
    let engine = CorrelationEngine::new(EngineConfig::default(), ItemFilter::new(), None, None);

    engine.process_item(make_item("c1", "US and China tariffs rattle $AAPL suppliers"));
    settle(&engine, 1).await;
    engine.process_item(make_item("c2", "US and China schedule emergency summit"));
    settle(&engine, 2).await;
    engine.process_item(make_item("c3", "Germany and France strike energy deal"));
    settle(&engine, 3).await;

    let cluster_one = engine.cluster_info("c1").await.expect("c1 clustered");
    let cluster_two = engine.cluster_info("c2").await.expect("c2 clustered");
    assert_eq!(
        cluster_one.id, cluster_two.id,
        "overlap 2 of 2 entities joins the cluster"
    );
    assert_eq!(cluster_two.size, 2);

    let cluster_three = engine.cluster_info("c3").await.expect("c3 clustered");
    assert_ne!(cluster_three.id, cluster_one.id);
    assert_eq!(cluster_three.size, 1);
    assert!(engine.is_cluster_primary("c1").await);
    assert!(!engine.is_cluster_primary("c2").await);

    engine.stop().await;
}

/// A day of one-per-hour baseline, then a burst: the spike names the 15m
/// window because its items/hour rate is the hottest.
#[tokio::test]
async fn scenario_velocity_spike_on_burst() {
    let tracker = VelocityTracker::new();
    let start = Utc.timestamp_opt(1_700_000_000, 0).unwrap();

    for hour in 0..24 {
        let spike = tracker
            .record_at("story", 1, start + ChronoDuration::hours(hour))
            .await;
        assert!(spike.is_none(), "baseline hour {hour} must not spike");
    }

    let burst = start + ChronoDuration::hours(24);
    let mut spike = None;
    for i in 0..10 {
        spike = tracker
            .record_at("story", 3, burst + ChronoDuration::seconds(i * 80))
            .await;
    }

    let spike = spike.expect("burst crosses the spike threshold");
    assert_eq!(spike.cluster_id, "story");
    assert_eq!(spike.window, SpikeWindow::FifteenMinutes);
    assert_eq!(spike.window.to_string(), "15m");
}

/// With cap 10 and 12 inserts, the two oldest go and the newest survive.
#[tokio::test]
async fn scenario_cap_eviction_preserves_newest() {
    let aggregator = Aggregator::new(10, ItemFilter::new());
    let base = Utc.timestamp_opt(1_700_000_000, 0).unwrap();

    let items: Vec<Item> = (1..=12)
        .map(|i| {
            let mut item = wire_item(
                &format!("n{i:02}"),
                "feed",
                &format!("https://ex.com/{i}"),
                &format!("headline {i}"),
            );
            item.published = base + ChronoDuration::minutes(i);
            item.fetched = item.published;
            item
        })
        .collect();

    let report = aggregator.merge_items(items).await;
    assert_eq!(report.added, 12);
    assert_eq!(report.evicted, 2);
    assert_eq!(aggregator.len().await, 10);
    assert_eq!(aggregator.counters().await.evicted, 2);

    let remaining = aggregator.items().await;
    let ids: Vec<&str> = remaining.iter().map(|i| i.id.as_str()).collect();
    assert!(!ids.contains(&"n01"));
    assert!(!ids.contains(&"n02"));
    assert!(ids.contains(&"n11"));
    assert!(ids.contains(&"n12"));
}

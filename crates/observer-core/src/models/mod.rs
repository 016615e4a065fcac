//! Data models for the correlation engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of feed a source belongs to. Used for routing and per-type metrics;
/// the fetch capability itself lives behind the [`crate::sources::Source`] trait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceType {
    Rss,
    HackerNews,
    Reddit,
    Usgs,
    Bluesky,
    Polymarket,
    Manifold,
    Aggregator,
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceType::Rss => write!(f, "rss"),
            SourceType::HackerNews => write!(f, "hackernews"),
            SourceType::Reddit => write!(f, "reddit"),
            SourceType::Usgs => write!(f, "usgs"),
            SourceType::Bluesky => write!(f, "bluesky"),
            SourceType::Polymarket => write!(f, "polymarket"),
            SourceType::Manifold => write!(f, "manifold"),
            SourceType::Aggregator => write!(f, "aggregator"),
        }
    }
}

impl std::str::FromStr for SourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rss" => Ok(SourceType::Rss),
            "hackernews" => Ok(SourceType::HackerNews),
            "reddit" => Ok(SourceType::Reddit),
            "usgs" => Ok(SourceType::Usgs),
            "bluesky" => Ok(SourceType::Bluesky),
            "polymarket" => Ok(SourceType::Polymarket),
            "manifold" => Ok(SourceType::Manifold),
            "aggregator" => Ok(SourceType::Aggregator),
            other => Err(format!("unknown source type: {other}")),
        }
    }
}

/// Health of a source derived from its consecutive-error count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceHealth {
    Healthy,
    Warning,
    Failing,
}

impl SourceHealth {
    /// 0 errors is healthy, 1-2 is a warning, 3+ is failing.
    pub fn from_consecutive_errors(errors: u32) -> Self {
        match errors {
            0 => SourceHealth::Healthy,
            1..=2 => SourceHealth::Warning,
            _ => SourceHealth::Failing,
        }
    }
}

/// The atomic unit flowing through the pipeline.
///
/// Items arrive fully populated from sources: the id is stable (sources that
/// cannot mint one derive it from the URL via [`stable_item_id`]), `published`
/// falls back to the fetch time, and empty titles are discarded upstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub source_type: SourceType,
    pub source_name: String,
    pub title: String,
    pub summary: String,
    pub content: String,
    pub url: String,
    pub author: String,
    /// Timestamp reported by the source, falling back to `fetched`.
    pub published: DateTime<Utc>,
    /// When the engine ingested the item.
    pub fetched: DateTime<Utc>,
    pub read: bool,
    pub saved: bool,
    /// Attached lazily by the embedding stage; fixed dimensionality per process.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl Item {
    /// Effective ordering timestamp: published when the source supplied one,
    /// otherwise the fetch time.
    pub fn effective_timestamp(&self) -> DateTime<Utc> {
        if self.published.timestamp() > 0 {
            self.published
        } else {
            self.fetched
        }
    }
}

/// Derives a stable item id from a URL for sources that do not supply one.
///
/// FNV-1a over the URL bytes; the same URL always yields the same id across
/// runs and platforms.
pub fn stable_item_id(url: &str) -> String {
    const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;
    let mut hash = FNV_OFFSET;
    for byte in url.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    format!("{hash:016x}")
}

/// Kind of entity the extractor recognized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Ticker,
    Country,
    Region,
    Bloc,
    Source,
    Claim,
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityType::Ticker => write!(f, "ticker"),
            EntityType::Country => write!(f, "country"),
            EntityType::Region => write!(f, "region"),
            EntityType::Bloc => write!(f, "bloc"),
            EntityType::Source => write!(f, "source"),
            EntityType::Claim => write!(f, "claim"),
        }
    }
}

/// A normalized entity. The id is `"{type}:{normalized}"`, e.g. `ticker:AAPL`
/// or `country:united_states`, so equal entities from different items collide.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub name: String,
    pub entity_type: EntityType,
    /// Extraction confidence in [0, 1].
    pub salience: f64,
}

impl Entity {
    pub fn new(entity_type: EntityType, normalized: &str, name: &str, salience: f64) -> Self {
        Self {
            id: format!("{entity_type}:{normalized}"),
            name: name.to_string(),
            entity_type,
            salience,
        }
    }
}

/// Link between an item and an entity, keyed uniquely by the pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemEntity {
    pub item_id: String,
    pub entity_id: String,
    /// Snippet of the title/summary around the match.
    pub context: String,
    pub salience: f64,
}

/// A story cluster: a growing group of items about the same event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cluster {
    /// Id of the first item that created the cluster.
    pub id: String,
    /// The canonical, user-visible item. Fixed for the cluster's lifetime.
    pub primary_id: String,
    /// Member item ids in arrival order; `item_ids[0] == primary_id`.
    pub item_ids: Vec<String>,
    /// Title taken from the primary item.
    pub title: String,
    pub size: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Cluster {
    pub fn new(item: &Item, now: DateTime<Utc>) -> Self {
        Self {
            id: item.id.clone(),
            primary_id: item.id.clone(),
            item_ids: vec![item.id.clone()],
            title: item.title.clone(),
            size: 1,
            created_at: now,
            updated_at: now,
        }
    }

    /// A cluster is stale once it has gone unchanged for longer than the
    /// staleness window; stale clusters are skipped as match candidates but
    /// retained for queries.
    pub fn is_stale(&self, now: DateTime<Utc>, max_idle: chrono::Duration) -> bool {
        now - self.updated_at > max_idle
    }
}

/// Per-cluster velocity trend bucket for UI display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Spiking,
    Steady,
    Fading,
}

impl Trend {
    /// `>5 → spiking`, `>1 → steady`, else fading.
    pub fn from_rate(rate_per_hour: f64) -> Self {
        if rate_per_hour > 5.0 {
            Trend::Spiking
        } else if rate_per_hour > 1.0 {
            Trend::Steady
        } else {
            Trend::Fading
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_item() -> Item {
        Item {
            id: "item-1".to_string(),
            source_type: SourceType::HackerNews,
            source_name: "Hacker News".to_string(),
            title: "Sample title".to_string(),
            summary: String::new(),
            content: String::new(),
            url: "https://example.com/a".to_string(),
            author: String::new(),
            published: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            fetched: Utc.timestamp_opt(1_700_000_100, 0).unwrap(),
            read: false,
            saved: false,
            embedding: None,
        }
    }

    #[test]
    fn test_stable_item_id_is_deterministic() {
        let a = stable_item_id("https://example.com/story");
        let b = stable_item_id("https://example.com/story");
        let c = stable_item_id("https://example.com/other");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn test_effective_timestamp_prefers_published() {
        let item = sample_item();
        assert_eq!(item.effective_timestamp(), item.published);

        let mut unpublished = sample_item();
        unpublished.published = Utc.timestamp_opt(0, 0).unwrap();
        assert_eq!(unpublished.effective_timestamp(), unpublished.fetched);
    }

    #[test]
    fn test_entity_id_format() {
        let entity = Entity::new(EntityType::Ticker, "AAPL", "$AAPL", 0.9);
        assert_eq!(entity.id, "ticker:AAPL");

        let country = Entity::new(EntityType::Country, "united_states", "United States", 0.7);
        assert_eq!(country.id, "country:united_states");
    }

    #[test]
    fn test_source_health_thresholds() {
        assert_eq!(SourceHealth::from_consecutive_errors(0), SourceHealth::Healthy);
        assert_eq!(SourceHealth::from_consecutive_errors(1), SourceHealth::Warning);
        assert_eq!(SourceHealth::from_consecutive_errors(2), SourceHealth::Warning);
        assert_eq!(SourceHealth::from_consecutive_errors(3), SourceHealth::Failing);
        assert_eq!(SourceHealth::from_consecutive_errors(10), SourceHealth::Failing);
    }

    #[test]
    fn test_trend_buckets() {
        assert_eq!(Trend::from_rate(6.0), Trend::Spiking);
        assert_eq!(Trend::from_rate(3.0), Trend::Steady);
        assert_eq!(Trend::from_rate(0.5), Trend::Fading);
    }

    #[test]
    fn test_cluster_staleness() {
        let item = sample_item();
        let created = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let cluster = Cluster::new(&item, created);
        assert_eq!(cluster.size, 1);
        assert_eq!(cluster.primary_id, "item-1");

        let idle = chrono::Duration::hours(48);
        assert!(!cluster.is_stale(created + chrono::Duration::hours(47), idle));
        assert!(cluster.is_stale(created + chrono::Duration::hours(49), idle));
    }
}

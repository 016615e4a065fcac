//! Environment-driven configuration.

use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// SQLite database path.
    pub database_path: String,
    /// Max stories resolved per Hacker News fetch.
    pub hn_max_stories: usize,
    /// Minimum quake magnitude worth an item.
    pub usgs_min_magnitude: f64,
    /// Extra JSON feeds as `name=url` pairs, comma separated.
    pub json_feeds: Vec<(String, String)>,
    /// Base poll interval per source.
    pub base_poll_interval: Duration,
    /// Concurrent fetch cap across all sources.
    pub max_concurrent_fetches: usize,
    /// Batch size for embedding backfill.
    pub backfill_batch: usize,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> Self {
        let json_feeds = env::var("OBSERVER_JSON_FEEDS")
            .unwrap_or_default()
            .split(',')
            .filter_map(|pair| {
                let (name, url) = pair.split_once('=')?;
                let (name, url) = (name.trim(), url.trim());
                if name.is_empty() || url.is_empty() {
                    return None;
                }
                Some((name.to_string(), url.to_string()))
            })
            .collect();

        Self {
            database_path: env::var("OBSERVER_DB").unwrap_or_else(|_| "observer.db".to_string()),
            hn_max_stories: env_or("OBSERVER_HN_MAX_STORIES", 64),
            usgs_min_magnitude: env_or("OBSERVER_USGS_MIN_MAG", 2.5),
            json_feeds,
            base_poll_interval: Duration::from_secs(env_or("OBSERVER_POLL_INTERVAL_SECS", 300)),
            max_concurrent_fetches: env_or("OBSERVER_MAX_CONCURRENT_FETCHES", 10),
            backfill_batch: env_or("OBSERVER_BACKFILL_BATCH", 50),
        }
    }
}

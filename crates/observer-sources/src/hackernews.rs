//! Hacker News top stories via the Firebase JSON API.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use tracing::warn;

use observer_core::models::{Item, SourceType};
use observer_core::sources::{Source, SourceError};

const TOP_STORIES_URL: &str = "https://hacker-news.firebaseio.com/v0/topstories.json";
const ITEM_URL: &str = "https://hacker-news.firebaseio.com/v0/item";

#[derive(Deserialize)]
struct HnItem {
    id: i64,
    title: Option<String>,
    url: Option<String>,
    by: Option<String>,
    time: Option<i64>,
    text: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

pub struct HackerNewsSource {
    client: reqwest::Client,
    /// How many of the top story ids to resolve per fetch.
    max_stories: usize,
}

impl HackerNewsSource {
    pub fn new(client: reqwest::Client, max_stories: usize) -> Self {
        Self {
            client,
            max_stories,
        }
    }

    async fn fetch_story(&self, story_id: i64) -> Result<Option<Item>, SourceError> {
        let response = self
            .client
            .get(format!("{ITEM_URL}/{story_id}.json"))
            .send()
            .await?;
        let item: Option<HnItem> = response
            .json()
            .await
            .map_err(|err| SourceError::parse(err.to_string()))?;
        let Some(item) = item else {
            return Ok(None);
        };
        if item.kind.as_deref() != Some("story") {
            return Ok(None);
        }
        let Some(title) = item.title.filter(|t| !t.trim().is_empty()) else {
            return Ok(None);
        };

        let now = Utc::now();
        let published = item
            .time
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .unwrap_or(now);
        let url = item
            .url
            .unwrap_or_else(|| format!("https://news.ycombinator.com/item?id={}", item.id));

        Ok(Some(Item {
            id: format!("hn-{}", item.id),
            source_type: SourceType::HackerNews,
            source_name: "Hacker News".to_string(),
            title,
            summary: item.text.unwrap_or_default(),
            content: String::new(),
            url,
            author: item.by.unwrap_or_default(),
            published,
            fetched: now,
            read: false,
            saved: false,
            embedding: None,
        }))
    }
}

#[async_trait]
impl Source for HackerNewsSource {
    fn name(&self) -> &str {
        "hacker-news"
    }

    fn source_type(&self) -> SourceType {
        SourceType::HackerNews
    }

    async fn fetch(&self) -> Result<Vec<Item>, SourceError> {
        let response = self.client.get(TOP_STORIES_URL).send().await?;
        let ids: Vec<i64> = response
            .json()
            .await
            .map_err(|err| SourceError::parse(err.to_string()))?;

        // Resolve stories concurrently; one bad story must not fail the
        // batch.
        let items: Vec<Item> = stream::iter(ids.into_iter().take(self.max_stories))
            .map(|story_id| async move {
                self.fetch_story(story_id)
                    .await
                    .map_err(|err| {
                        warn!(story_id, %err, "skipping story");
                        err
                    })
                    .ok()
                    .flatten()
            })
            .buffer_unordered(8)
            .filter_map(|item| async move { item })
            .collect()
            .await;
        Ok(items)
    }
}

//! Generic JSON Feed (v1/v1.1) adapter.
//!
//! Covers the many small outlets that publish a `feed.json`; anything more
//! exotic gets its own plugin.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use observer_core::models::{stable_item_id, Item, SourceType};
use observer_core::sources::{Source, SourceError};

#[derive(Deserialize)]
struct JsonFeed {
    title: Option<String>,
    items: Vec<JsonFeedItem>,
}

#[derive(Deserialize)]
struct JsonFeedItem {
    id: Option<String>,
    url: Option<String>,
    title: Option<String>,
    content_text: Option<String>,
    content_html: Option<String>,
    summary: Option<String>,
    date_published: Option<String>,
    authors: Option<Vec<JsonFeedAuthor>>,
    author: Option<JsonFeedAuthor>,
}

#[derive(Deserialize)]
struct JsonFeedAuthor {
    name: Option<String>,
}

pub struct JsonFeedSource {
    client: reqwest::Client,
    name: String,
    feed_url: String,
    max_items: usize,
}

impl JsonFeedSource {
    pub fn new(
        client: reqwest::Client,
        name: impl Into<String>,
        feed_url: impl Into<String>,
        max_items: usize,
    ) -> Self {
        Self {
            client,
            name: name.into(),
            feed_url: feed_url.into(),
            max_items,
        }
    }
}

#[async_trait]
impl Source for JsonFeedSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn source_type(&self) -> SourceType {
        SourceType::Rss
    }

    async fn fetch(&self) -> Result<Vec<Item>, SourceError> {
        let response = self.client.get(&self.feed_url).send().await?;
        let feed: JsonFeed = response
            .json()
            .await
            .map_err(|err| SourceError::parse(err.to_string()))?;

        let source_name = feed.title.unwrap_or_else(|| self.name.clone());
        let now = Utc::now();

        let items = feed
            .items
            .into_iter()
            .take(self.max_items)
            .filter_map(|entry| {
                let title = entry.title.filter(|t| !t.trim().is_empty())?;
                let url = entry.url?;
                let id = entry
                    .id
                    .filter(|id| !id.is_empty())
                    .unwrap_or_else(|| stable_item_id(&url));
                let published = entry
                    .date_published
                    .as_deref()
                    .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or(now);
                let author = entry
                    .authors
                    .and_then(|mut authors| authors.drain(..).next())
                    .or(entry.author)
                    .and_then(|a| a.name)
                    .unwrap_or_default();
                Some(Item {
                    id: format!("{}-{id}", self.name),
                    source_type: SourceType::Rss,
                    source_name: source_name.clone(),
                    title,
                    summary: entry.summary.or(entry.content_text).unwrap_or_default(),
                    content: entry.content_html.unwrap_or_default(),
                    url,
                    author,
                    published,
                    fetched: now,
                    read: false,
                    saved: false,
                    embedding: None,
                })
            })
            .collect();
        Ok(items)
    }
}

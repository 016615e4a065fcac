//! USGS earthquake feed (GeoJSON summary format).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use observer_core::models::{Item, SourceType};
use observer_core::sources::{Source, SourceError};

const FEED_URL: &str =
    "https://earthquake.usgs.gov/earthquakes/feed/v1.0/summary/all_hour.geojson";

#[derive(Deserialize)]
struct GeoJsonFeed {
    features: Vec<Feature>,
}

#[derive(Deserialize)]
struct Feature {
    id: String,
    properties: Properties,
}

#[derive(Deserialize)]
struct Properties {
    mag: Option<f64>,
    place: Option<String>,
    /// Milliseconds since the epoch.
    time: Option<i64>,
    url: Option<String>,
    title: Option<String>,
}

pub struct UsgsSource {
    client: reqwest::Client,
    /// Quakes below this magnitude are ignored.
    min_magnitude: f64,
}

impl UsgsSource {
    pub fn new(client: reqwest::Client, min_magnitude: f64) -> Self {
        Self {
            client,
            min_magnitude,
        }
    }
}

#[async_trait]
impl Source for UsgsSource {
    fn name(&self) -> &str {
        "usgs-earthquakes"
    }

    fn source_type(&self) -> SourceType {
        SourceType::Usgs
    }

    async fn fetch(&self) -> Result<Vec<Item>, SourceError> {
        let response = self.client.get(FEED_URL).send().await?;
        let feed: GeoJsonFeed = response
            .json()
            .await
            .map_err(|err| SourceError::parse(err.to_string()))?;

        let now = Utc::now();
        let items = feed
            .features
            .into_iter()
            .filter(|f| f.properties.mag.unwrap_or(0.0) >= self.min_magnitude)
            .filter_map(|feature| {
                let title = feature.properties.title.or_else(|| {
                    match (feature.properties.mag, feature.properties.place.as_ref()) {
                        (Some(mag), Some(place)) => Some(format!("M{mag:.1} - {place}")),
                        _ => None,
                    }
                })?;
                let published = feature
                    .properties
                    .time
                    .and_then(DateTime::from_timestamp_millis)
                    .unwrap_or(now);
                let url = feature.properties.url.unwrap_or_else(|| {
                    format!("https://earthquake.usgs.gov/earthquakes/eventpage/{}", feature.id)
                });
                Some(Item {
                    id: format!("usgs-{}", feature.id),
                    source_type: SourceType::Usgs,
                    source_name: "USGS Earthquakes".to_string(),
                    title,
                    summary: feature.properties.place.unwrap_or_default(),
                    content: String::new(),
                    url,
                    author: String::new(),
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

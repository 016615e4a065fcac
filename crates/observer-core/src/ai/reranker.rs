//! Reranker contract and the HTTP-backed client.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{CorrelationError, Result};

/// Relevance score for one input document.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RerankResult {
    /// Index into the input document slice.
    pub index: usize,
    /// Relevance in [0, 1]; failed or missing entries score 0.
    pub score: f64,
}

/// Scores documents against a query.
///
/// The returned vector has exactly the input length, in corresponding order.
#[async_trait]
pub trait Reranker: Send + Sync {
    async fn rerank(&self, query: &str, docs: &[String]) -> Result<Vec<RerankResult>>;
}

const MAX_RETRIES: u32 = 3;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Client for a JSON rerank API.
///
/// Retry policy: 429 waits out `Retry-After` (or one second when absent);
/// 5xx retries up to three times with 1 s / 2 s / 4 s backoff; 4xx other
/// than 429 fails immediately.
pub struct HttpReranker {
    client: reqwest::Client,
    endpoint: String,
    model: String,
}

#[derive(Serialize)]
struct RerankRequest<'a> {
    model: &'a str,
    query: &'a str,
    documents: &'a [String],
}

#[derive(Deserialize)]
struct RerankResponse {
    results: Vec<RerankResponseEntry>,
}

#[derive(Deserialize)]
struct RerankResponseEntry {
    index: usize,
    relevance_score: f64,
}

impl HttpReranker {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            model: model.into(),
        })
    }

    async fn call_once(&self, query: &str, docs: &[String]) -> Result<reqwest::Response> {
        let request = RerankRequest {
            model: &self.model,
            query,
            documents: docs,
        };
        Ok(self.client.post(&self.endpoint).json(&request).send().await?)
    }
}

fn retry_after_secs(response: &reqwest::Response) -> u64 {
    response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(1)
}

#[async_trait]
impl Reranker for HttpReranker {
    async fn rerank(&self, query: &str, docs: &[String]) -> Result<Vec<RerankResult>> {
        if docs.is_empty() {
            return Ok(Vec::new());
        }

        let mut attempt = 0u32;
        let response = loop {
            attempt += 1;
            let response = self.call_once(query, docs).await?;
            let status = response.status();

            if status.is_success() {
                break response;
            }
            if status.as_u16() == 429 && attempt <= MAX_RETRIES {
                let wait = retry_after_secs(&response);
                debug!(wait, attempt, "reranker rate limited, honoring Retry-After");
                tokio::time::sleep(Duration::from_secs(wait)).await;
                continue;
            }
            if status.is_server_error() && attempt <= MAX_RETRIES {
                let wait = Duration::from_secs(1 << (attempt - 1));
                debug!(?wait, attempt, status = status.as_u16(), "reranker 5xx, backing off");
                tokio::time::sleep(wait).await;
                continue;
            }
            return Err(CorrelationError::Rerank {
                attempts: attempt,
                message: format!("status {status}"),
            });
        };

        let parsed: RerankResponse = response.json().await?;

        // Missing or out-of-range entries score zero; output always aligns
        // with the input.
        let mut scores = vec![0.0f64; docs.len()];
        for entry in parsed.results {
            if entry.index < scores.len() {
                scores[entry.index] = entry.relevance_score.clamp(0.0, 1.0);
            } else {
                warn!(index = entry.index, len = docs.len(), "reranker returned out-of-range index");
            }
        }
        Ok(scores
            .into_iter()
            .enumerate()
            .map(|(index, score)| RerankResult { index, score })
            .collect())
    }
}

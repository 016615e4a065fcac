//! # Observer Sources
//!
//! Concrete implementations of the engine's [`Source`] contract. Each
//! plugin bounds its HTTP calls with a timeout, fully populates every item
//! before returning (ids, timestamps, titles), and maps transport and
//! payload failures into [`SourceError`] so the scheduler can apply its
//! backoff policy.

mod hackernews;
mod jsonfeed;
mod usgs;

pub use hackernews::HackerNewsSource;
pub use jsonfeed::JsonFeedSource;
pub use usgs::UsgsSource;

use std::time::Duration;

pub use observer_core::sources::{Source, SourceError};

pub(crate) const FETCH_TIMEOUT: Duration = Duration::from_secs(30);
pub(crate) const USER_AGENT: &str = concat!("observer/", env!("CARGO_PKG_VERSION"));

/// Shared HTTP client with the fetch timeout applied. Reuse one client per
/// process; reqwest pools connections internally.
pub fn http_client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(FETCH_TIMEOUT)
        .user_agent(USER_AGENT)
        .build()
}

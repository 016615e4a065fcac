//! Source abstraction.
//!
//! A source is an opaque handle that can report its name and type and produce
//! a finite batch of fully populated items on demand. The engine never looks
//! inside: HTTP, parsing, and per-format quirks belong to the implementations
//! (see the `observer-sources` crate). Implementations must bound `fetch`
//! with their own timeout; they fail by returning an error, never by blocking
//! indefinitely.

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{Item, SourceType};

/// Error returned by a source's `fetch()`.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Connection failures, timeouts, 5xx responses. Retried via the
    /// scheduler's adaptive backoff.
    #[error("transient error: {message}")]
    Transient { message: String },

    /// 401/403/404 and similar. Not retried; counts toward auto-disable.
    #[error("permanent error ({status}): {message}")]
    Permanent { status: u16, message: String },

    /// The remote payload could not be decoded. The source stays healthy if
    /// the next fetch succeeds.
    #[error("parse error: {message}")]
    Parse { message: String },
}

impl SourceError {
    pub fn transient(message: impl Into<String>) -> Self {
        SourceError::Transient {
            message: message.into(),
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        SourceError::Parse {
            message: message.into(),
        }
    }

    /// Permanent errors skip retry and count toward source auto-disable.
    pub fn is_permanent(&self) -> bool {
        matches!(self, SourceError::Permanent { .. })
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) if matches!(status.as_u16(), 401 | 403 | 404) => SourceError::Permanent {
                status: status.as_u16(),
                message: err.to_string(),
            },
            _ => SourceError::Transient {
                message: err.to_string(),
            },
        }
    }
}

/// The only way fetchers are registered with the engine.
///
/// Contract: items must be fully populated before return — ids assigned
/// (derive from the URL when the source has none), timestamps resolved, and
/// titles non-empty or the aggregator will discard them.
#[async_trait]
pub trait Source: Send + Sync {
    /// Stable human-readable name, unique among registered sources.
    fn name(&self) -> &str;

    fn source_type(&self) -> SourceType;

    /// Produce one batch of items. Must time out rather than hang.
    async fn fetch(&self) -> Result<Vec<Item>, SourceError>;
}

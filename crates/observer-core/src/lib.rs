//! # Observer Core
//!
//! Real-time multi-source news correlation engine. Items fetched from
//! heterogeneous feeds flow through a staged, channel-driven pipeline:
//!
//! ```text
//! fetcher -> per-source queue -> sampler -> aggregator -> dedup cascade
//!        -> entity extractor -> cluster engine -> velocity tracker
//!        -> event bus -> UI queries
//! ```
//!
//! Every cross-stage send is non-blocking (drop-on-full), so a stalled
//! downstream degrades throughput without ever wedging ingestion. The
//! [`engine::CorrelationEngine`] wires the stages together and exposes the
//! query and event surface UI code consumes.
//!
//! ## Modules
//!
//! - [`sources`]: the opaque fetch contract sources implement
//! - [`queue`]: per-source queues with adaptive poll scheduling
//! - [`sampler`]: fairness strategies for pulling items across queues
//! - [`aggregator`]: the capped, URL-deduplicated global pool
//! - [`pool`]: the shared async work pool with progress and events
//! - [`dedup`]: SimHash near-dup and embedding-based semantic dedup
//! - [`entities`]: regex/dictionary entity and claim extraction
//! - [`cluster`]: incremental story clustering by entity overlap
//! - [`velocity`]: sliding-window rates and spike detection
//! - [`engine`]: the orchestrator and typed event bus
//! - [`ai`]: embedder and reranker contracts

pub mod aggregator;
pub mod ai;
pub mod cluster;
pub mod dedup;
pub mod engine;
pub mod entities;
pub mod error;
pub mod models;
pub mod pool;
pub mod queue;
pub mod sampler;
pub mod sources;
pub mod testing;
pub mod velocity;

pub use engine::{CorrelationEngine, CorrelationEvent, EngineConfig, EngineStats};
pub use error::{CorrelationError, Result};
pub use models::{Cluster, Entity, Item, SourceType};
pub use sources::{Source, SourceError};

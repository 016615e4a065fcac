//! The global deduplicated item pool.
//!
//! Every fetched item passes through [`Aggregator::merge_items`], which
//! dedupes on full URL, consults the filter policy, and evicts the oldest
//! items (by effective timestamp) once the pool exceeds its cap. External
//! readers always receive copies; the live pool never escapes the mutex.

mod filter;

pub use filter::ItemFilter;

use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::debug;

use crate::models::Item;

pub const DEFAULT_POOL_CAP: usize = 10_000;

/// Outcome of one merge call. `added_items` carries the accepted items so
/// the caller can forward them down the pipeline without re-reading the
/// pool; `evicted_ids` lets it scrub per-item index state for evictees.
#[derive(Debug, Clone, Default)]
pub struct MergeReport {
    pub added: usize,
    pub blocked: usize,
    pub evicted: usize,
    pub added_items: Vec<Item>,
    pub evicted_ids: Vec<String>,
}

/// Monotonic pool counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolCounters {
    pub total: u64,
    pub blocked: u64,
    pub evicted: u64,
}

#[derive(Default)]
struct PoolInner {
    items: Vec<Item>,
    url_index: HashMap<String, usize>,
    counters: PoolCounters,
}

/// Process-wide capped item pool, deduplicated on URL at insert time.
pub struct Aggregator {
    inner: Mutex<PoolInner>,
    filter: ItemFilter,
    cap: usize,
}

impl Aggregator {
    pub fn new(cap: usize, filter: ItemFilter) -> Self {
        Self {
            inner: Mutex::new(PoolInner::default()),
            filter,
            cap: cap.max(1),
        }
    }

    /// Merge a batch into the pool. Items with known URLs or matching the
    /// filter are counted as blocked; overflow evicts the oldest items by
    /// effective timestamp, ties broken by ascending id.
    pub async fn merge_items(&self, batch: Vec<Item>) -> MergeReport {
        let mut inner = self.inner.lock().await;
        let mut report = MergeReport::default();

        for item in batch {
            if inner.url_index.contains_key(&item.url) {
                report.blocked += 1;
                inner.counters.blocked += 1;
                continue;
            }
            if self.filter.blocks(&item) {
                report.blocked += 1;
                inner.counters.blocked += 1;
                continue;
            }
            let position = inner.items.len();
            inner.url_index.insert(item.url.clone(), position);
            inner.items.push(item.clone());
            report.added += 1;
            report.added_items.push(item);
            inner.counters.total += 1;
        }

        if inner.items.len() > self.cap {
            let overflow = inner.items.len() - self.cap;
            report.evicted_ids = self.evict_overflow(&mut inner, overflow);
            report.evicted = report.evicted_ids.len();
            inner.counters.evicted += report.evicted as u64;
            debug!(evicted = report.evicted, "pool overflow eviction");
        }

        report
    }

    /// Remove the `overflow` oldest items, rebuild the URL index, and return
    /// the evicted item ids.
    fn evict_overflow(&self, inner: &mut PoolInner, overflow: usize) -> Vec<String> {
        let mut order: Vec<usize> = (0..inner.items.len()).collect();
        order.sort_by(|&a, &b| {
            let ia = &inner.items[a];
            let ib = &inner.items[b];
            ia.effective_timestamp()
                .cmp(&ib.effective_timestamp())
                .then_with(|| ia.id.cmp(&ib.id))
        });
        let doomed: std::collections::HashSet<usize> = order.into_iter().take(overflow).collect();

        let mut kept = Vec::with_capacity(inner.items.len() - doomed.len());
        let mut evicted_ids = Vec::with_capacity(doomed.len());
        for (idx, item) in inner.items.drain(..).enumerate() {
            if doomed.contains(&idx) {
                evicted_ids.push(item.id);
            } else {
                kept.push(item);
            }
        }
        inner.items = kept;
        inner.url_index = inner
            .items
            .iter()
            .enumerate()
            .map(|(i, item)| (item.url.clone(), i))
            .collect();
        evicted_ids
    }

    /// Copy of the current pool contents.
    pub async fn items(&self) -> Vec<Item> {
        self.inner.lock().await.items.clone()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.items.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.items.is_empty()
    }

    pub async fn contains_url(&self, url: &str) -> bool {
        self.inner.lock().await.url_index.contains_key(url)
    }

    pub async fn counters(&self) -> PoolCounters {
        self.inner.lock().await.counters
    }
}

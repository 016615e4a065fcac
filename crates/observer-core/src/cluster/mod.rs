//! Incremental story clustering.
//!
//! Each arriving item either joins the existing cluster sharing the most
//! entities with it or founds a new one. Matching is pure entity overlap:
//! near-duplicate titles have already been collapsed by the dedup cascade by
//! the time an item reaches clustering, so title similarity would mostly
//! re-count the same evidence. A cluster untouched for the staleness window
//! stops attracting new items but stays queryable.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

use crate::models::{Cluster, Item};

#[derive(Debug, Clone)]
pub struct ClusterConfig {
    /// Clusters idle longer than this are skipped as match candidates.
    pub stale_after: ChronoDuration,
    /// Minimum entity count for an unmatched item to found a cluster.
    pub min_entities_for_new: usize,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            stale_after: ChronoDuration::hours(48),
            min_entities_for_new: 2,
        }
    }
}

/// Result of assigning one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterAssignment {
    pub cluster_id: String,
    /// True when this item founded the cluster.
    pub created: bool,
    pub size: usize,
}

#[derive(Default)]
struct ClusterInner {
    clusters: HashMap<String, Cluster>,
    item_to_cluster: HashMap<String, String>,
    /// entity id -> clusters containing an item with that entity.
    entity_index: HashMap<String, Vec<String>>,
}

/// In-memory incremental cluster engine.
pub struct ClusterEngine {
    inner: RwLock<ClusterInner>,
    config: ClusterConfig,
}

impl ClusterEngine {
    pub fn new(config: ClusterConfig) -> Self {
        Self {
            inner: RwLock::new(ClusterInner::default()),
            config,
        }
    }

    /// Assign `item` given its extracted entity ids. Returns `None` when the
    /// item matched nothing and carried too little signal to found a cluster.
    pub async fn assign(&self, item: &Item, entity_ids: &[String]) -> Option<ClusterAssignment> {
        let now = Utc::now();
        let mut inner = self.inner.write().await;

        if let Some(existing) = inner.item_to_cluster.get(&item.id) {
            let size = inner.clusters.get(existing).map_or(1, |c| c.size);
            return Some(ClusterAssignment {
                cluster_id: existing.clone(),
                created: false,
                size,
            });
        }

        // Count entity overlap per candidate cluster.
        let mut overlap: HashMap<String, usize> = HashMap::new();
        for entity_id in entity_ids {
            if let Some(cluster_ids) = inner.entity_index.get(entity_id) {
                for cluster_id in cluster_ids {
                    *overlap.entry(cluster_id.clone()).or_insert(0) += 1;
                }
            }
        }

        let threshold = (entity_ids.len() / 2).max(1);
        let best = overlap
            .into_iter()
            .filter(|(_, count)| *count >= threshold)
            .filter(|(cluster_id, _)| {
                inner
                    .clusters
                    .get(cluster_id)
                    .is_some_and(|c| !c.is_stale(now, self.config.stale_after))
            })
            // Highest overlap wins; ties break on cluster id so repeated runs
            // agree.
            .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(&a.0)));

        match best {
            Some((cluster_id, count)) => {
                let size = Self::join(&mut inner, &cluster_id, item, entity_ids, now);
                debug!(item = %item.id, cluster = %cluster_id, overlap = count, "item joined cluster");
                Some(ClusterAssignment {
                    cluster_id,
                    created: false,
                    size,
                })
            }
            None => {
                if entity_ids.len() < self.config.min_entities_for_new {
                    return None;
                }
                let cluster = Cluster::new(item, now);
                let cluster_id = cluster.id.clone();
                inner.clusters.insert(cluster_id.clone(), cluster);
                inner
                    .item_to_cluster
                    .insert(item.id.clone(), cluster_id.clone());
                for entity_id in entity_ids {
                    let clusters = inner.entity_index.entry(entity_id.clone()).or_default();
                    if !clusters.contains(&cluster_id) {
                        clusters.push(cluster_id.clone());
                    }
                }
                debug!(item = %item.id, cluster = %cluster_id, "new cluster created");
                Some(ClusterAssignment {
                    cluster_id,
                    created: true,
                    size: 1,
                })
            }
        }
    }

    fn join(
        inner: &mut ClusterInner,
        cluster_id: &str,
        item: &Item,
        entity_ids: &[String],
        now: DateTime<Utc>,
    ) -> usize {
        let size = match inner.clusters.get_mut(cluster_id) {
            Some(cluster) => {
                cluster.item_ids.push(item.id.clone());
                cluster.size = cluster.item_ids.len();
                cluster.updated_at = now;
                cluster.size
            }
            None => return 1,
        };
        inner
            .item_to_cluster
            .insert(item.id.clone(), cluster_id.to_string());
        for entity_id in entity_ids {
            let clusters = inner.entity_index.entry(entity_id.clone()).or_default();
            if !clusters.iter().any(|c| c == cluster_id) {
                clusters.push(cluster_id.to_string());
            }
        }
        size
    }

    /// The cluster containing `item_id`, if any.
    pub async fn cluster_for(&self, item_id: &str) -> Option<Cluster> {
        let inner = self.inner.read().await;
        let cluster_id = inner.item_to_cluster.get(item_id)?;
        inner.clusters.get(cluster_id).cloned()
    }

    pub async fn get(&self, cluster_id: &str) -> Option<Cluster> {
        self.inner.read().await.clusters.get(cluster_id).cloned()
    }

    pub async fn all_clusters(&self) -> Vec<Cluster> {
        let mut clusters: Vec<Cluster> = self.inner.read().await.clusters.values().cloned().collect();
        clusters.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        clusters
    }

    /// Whether `item_id` founded (and fronts) its cluster. Unclustered items
    /// count as primary.
    pub async fn is_primary(&self, item_id: &str) -> bool {
        let inner = self.inner.read().await;
        match inner.item_to_cluster.get(item_id) {
            None => true,
            Some(cluster_id) => inner
                .clusters
                .get(cluster_id)
                .is_some_and(|c| c.primary_id == item_id),
        }
    }

    /// Clusters with at least two members, ordered by `rate_of` descending.
    pub async fn active_clusters(&self, limit: usize, rate_of: impl Fn(&str) -> f64) -> Vec<Cluster> {
        let inner = self.inner.read().await;
        let mut active: Vec<(f64, &Cluster)> = inner
            .clusters
            .values()
            .filter(|c| c.size >= 2)
            .map(|c| (rate_of(&c.id), c))
            .collect();
        active.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.1.id.cmp(&b.1.id))
        });
        active.into_iter().take(limit).map(|(_, c)| c.clone()).collect()
    }

    pub async fn cluster_count(&self) -> usize {
        self.inner.read().await.clusters.len()
    }

    /// Drop clusters idle for longer than `retention` and scrub them from
    /// the indices. Returns removed cluster ids (the velocity tracker prunes
    /// its histories with them).
    pub async fn prune(&self, retention: ChronoDuration) -> Vec<String> {
        let now = Utc::now();
        let mut inner = self.inner.write().await;
        let doomed: Vec<String> = inner
            .clusters
            .values()
            .filter(|c| now - c.updated_at > retention)
            .map(|c| c.id.clone())
            .collect();
        for cluster_id in &doomed {
            if let Some(cluster) = inner.clusters.remove(cluster_id) {
                for item_id in &cluster.item_ids {
                    inner.item_to_cluster.remove(item_id);
                }
            }
        }
        if !doomed.is_empty() {
            for clusters in inner.entity_index.values_mut() {
                clusters.retain(|id| !doomed.contains(id));
            }
            inner.entity_index.retain(|_, clusters| !clusters.is_empty());
            debug!(removed = doomed.len(), "pruned idle clusters");
        }
        doomed
    }
}

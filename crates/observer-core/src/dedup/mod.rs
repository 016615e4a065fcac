//! Multi-stage duplicate detection.
//!
//! Three layers run in order of cost: exact URL dedup lives in the
//! aggregator, near-duplicate titles are caught inline by the SimHash/LSH
//! index ([`simhash`]), and semantically equivalent stories are folded out
//! of band by the embedding index ([`embedding`]). The two title/semantic
//! layers share one [`GroupStore`] so an item ends up in at most one
//! duplicate group with a single primary.

pub mod embedding;
pub mod simhash;

pub use embedding::{EmbeddingDedupIndex, EmbeddingDedupConfig, FlatVectorIndex, VectorIndex};
pub use simhash::{hamming_distance, simhash64, SimHashIndex};

use std::collections::HashMap;
use tokio::sync::RwLock;

/// Result of pushing one item through a dedup layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DedupOutcome {
    /// First sighting; the item was registered as its own potential primary.
    Unique,
    /// The item matched an existing one and was folded into its group.
    Duplicate {
        group_id: String,
        primary_id: String,
        group_size: usize,
    },
}

impl DedupOutcome {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, DedupOutcome::Duplicate { .. })
    }
}

#[derive(Default)]
struct GroupInner {
    /// group id (= first member id) -> ordered member ids.
    groups: HashMap<String, Vec<String>>,
    /// item id -> group id, for O(1) reverse lookup.
    item_to_group: HashMap<String, String>,
}

/// Duplicate-group bookkeeping shared by the title and embedding layers.
///
/// Invariants: a group's id equals its first member (the primary); every
/// indexed item belongs to at most one group; `item_to_group` always agrees
/// with the member lists.
#[derive(Default)]
pub struct GroupStore {
    inner: RwLock<GroupInner>,
}

impl GroupStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold `duplicate_id` into `target_id`'s group, creating the group with
    /// the target as primary if the target had none. Returns the group id
    /// and resulting size.
    ///
    /// If the duplicate already belongs to a group (the other layer got there
    /// first), that membership wins and is returned unchanged.
    pub async fn bind(&self, duplicate_id: &str, target_id: &str) -> (String, usize) {
        let mut inner = self.inner.write().await;

        if let Some(existing) = inner.item_to_group.get(duplicate_id).cloned() {
            let size = inner.groups.get(&existing).map_or(1, Vec::len);
            return (existing, size);
        }

        let group_id = match inner.item_to_group.get(target_id).cloned() {
            Some(group_id) => group_id,
            None => {
                inner
                    .groups
                    .insert(target_id.to_string(), vec![target_id.to_string()]);
                inner
                    .item_to_group
                    .insert(target_id.to_string(), target_id.to_string());
                target_id.to_string()
            }
        };

        inner
            .item_to_group
            .insert(duplicate_id.to_string(), group_id.clone());
        let members = inner.groups.entry(group_id.clone()).or_default();
        members.push(duplicate_id.to_string());
        let size = members.len();
        (group_id, size)
    }

    /// An item is primary iff it has no group or sits first in its group.
    pub async fn is_primary(&self, item_id: &str) -> bool {
        let inner = self.inner.read().await;
        match inner.item_to_group.get(item_id) {
            None => true,
            Some(group_id) => inner
                .groups
                .get(group_id)
                .and_then(|members| members.first())
                .is_some_and(|first| first == item_id),
        }
    }

    /// Other members of `item_id`'s group, primary first, excluding the item
    /// itself. Empty when the item is ungrouped.
    pub async fn duplicates_of(&self, item_id: &str) -> Vec<String> {
        let inner = self.inner.read().await;
        let Some(group_id) = inner.item_to_group.get(item_id) else {
            return Vec::new();
        };
        inner
            .groups
            .get(group_id)
            .map(|members| {
                members
                    .iter()
                    .filter(|member| member.as_str() != item_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Size of the item's group; 1 for ungrouped items.
    pub async fn group_size(&self, item_id: &str) -> usize {
        let inner = self.inner.read().await;
        inner
            .item_to_group
            .get(item_id)
            .and_then(|group_id| inner.groups.get(group_id))
            .map_or(1, Vec::len)
    }

    pub async fn group_count(&self) -> usize {
        self.inner.read().await.groups.len()
    }
}

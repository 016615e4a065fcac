//! Near-duplicate title detection via SimHash fingerprints and LSH buckets.
//!
//! The fingerprint is built from the title's character trigrams after
//! lowercasing and stripping non-alphanumerics: each trigram is run through a
//! stable polynomial rolling hash and sets one of 64 lanes. Two titles that
//! share most trigrams therefore share most bits, and a Hamming distance of
//! at most [`MAX_HAMMING_DISTANCE`] declares a near-duplicate. The top 16
//! bits of the fingerprint key an LSH bucket so candidate lookup stays O(1)
//! per item; the whole check runs inline on the ingest path and is expected
//! to finish well under a millisecond.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{DedupOutcome, GroupStore};

/// Hamming threshold for declaring two titles near-duplicates
/// (3/64 differing bits is roughly 95% bit similarity).
pub const MAX_HAMMING_DISTANCE: u32 = 3;

const TRIGRAM_WIDTH: usize = 3;
/// Multiplier for the per-trigram polynomial hash. Stability matters:
/// fingerprints are compared across items and runs.
const HASH_BASE: u64 = 1_099_511_628_211;

/// 64-bit title fingerprint.
pub fn simhash64(title: &str) -> u64 {
    let normalized: Vec<char> = title
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect();

    if normalized.is_empty() {
        return 0;
    }
    if normalized.len() < TRIGRAM_WIDTH {
        let mut hash = 0u64;
        for &c in &normalized {
            hash = hash.wrapping_mul(HASH_BASE).wrapping_add(c as u64);
        }
        return 1u64 << (hash % 64);
    }

    let mut fingerprint = 0u64;
    for trigram in normalized.windows(TRIGRAM_WIDTH) {
        let mut hash = 0u64;
        for &c in trigram {
            hash = hash.wrapping_mul(HASH_BASE).wrapping_add(c as u64);
        }
        fingerprint |= 1u64 << (hash % 64);
    }
    fingerprint
}

/// Number of differing bits between two fingerprints.
pub fn hamming_distance(a: u64, b: u64) -> u32 {
    (a ^ b).count_ones()
}

fn bucket_key(fingerprint: u64) -> u16 {
    (fingerprint >> 48) as u16
}

struct SimHashInner {
    /// item id -> fingerprint.
    hashes: HashMap<String, u64>,
    /// LSH bucket (top 16 fingerprint bits) -> item ids.
    buckets: HashMap<u16, Vec<String>>,
}

/// Inline near-duplicate index.
pub struct SimHashIndex {
    inner: RwLock<SimHashInner>,
    groups: Arc<GroupStore>,
}

impl SimHashIndex {
    pub fn new(groups: Arc<GroupStore>) -> Self {
        Self {
            inner: RwLock::new(SimHashInner {
                hashes: HashMap::new(),
                buckets: HashMap::new(),
            }),
            groups,
        }
    }

    /// Check `title` against the index and either fold the item into the
    /// best-matching group or register it as unique.
    ///
    /// The write lock spans the whole search-and-add window so two similar
    /// items inserted concurrently cannot both register as unique.
    pub async fn check_and_insert(&self, item_id: &str, title: &str) -> DedupOutcome {
        let fingerprint = simhash64(title);
        let mut inner = self.inner.write().await;

        if inner.hashes.contains_key(item_id) {
            return self.current_outcome(item_id).await;
        }

        let key = bucket_key(fingerprint);
        let candidate = inner.buckets.get(&key).and_then(|ids| {
            ids.iter()
                .filter_map(|id| {
                    let hash = inner.hashes.get(id)?;
                    let distance = hamming_distance(*hash, fingerprint);
                    (distance <= MAX_HAMMING_DISTANCE).then(|| (id.clone(), distance))
                })
                .min_by_key(|(_, distance)| *distance)
        });

        inner.hashes.insert(item_id.to_string(), fingerprint);
        inner.buckets.entry(key).or_default().push(item_id.to_string());

        match candidate {
            Some((target_id, _)) => {
                let (group_id, group_size) = self.groups.bind(item_id, &target_id).await;
                let primary_id = group_id.clone();
                DedupOutcome::Duplicate {
                    group_id,
                    primary_id,
                    group_size,
                }
            }
            None => DedupOutcome::Unique,
        }
    }

    async fn current_outcome(&self, item_id: &str) -> DedupOutcome {
        if self.groups.is_primary(item_id).await {
            DedupOutcome::Unique
        } else {
            let group_size = self.groups.group_size(item_id).await;
            let duplicates = self.groups.duplicates_of(item_id).await;
            let primary_id = duplicates.first().cloned().unwrap_or_else(|| item_id.to_string());
            DedupOutcome::Duplicate {
                group_id: primary_id.clone(),
                primary_id,
                group_size,
            }
        }
    }

    /// Remove an item's fingerprint from the index (e.g. after pool
    /// eviction). Group membership is left intact for queries.
    pub async fn remove(&self, item_id: &str) {
        let mut inner = self.inner.write().await;
        if let Some(fingerprint) = inner.hashes.remove(item_id) {
            let key = bucket_key(fingerprint);
            if let Some(ids) = inner.buckets.get_mut(&key) {
                ids.retain(|id| id != item_id);
                if ids.is_empty() {
                    inner.buckets.remove(&key);
                }
            }
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.hashes.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.hashes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simhash_is_stable() {
        let title = "Boeing 737 MAX grounded indefinitely by FAA";
        assert_eq!(simhash64(title), simhash64(title));
    }

    #[test]
    fn test_simhash_ignores_case_and_punctuation() {
        assert_eq!(
            simhash64("FAA Grounds Boeing!"),
            simhash64("faa grounds boeing")
        );
    }

    #[test]
    fn test_similar_titles_are_close() {
        // Appending one character adds exactly one trigram, so the distance
        // is bounded by one bit.
        let a = simhash64("Boeing 737 MAX grounded indefinitely by FAA");
        let b = simhash64("Boeing 737 MAX grounded indefinitely by FAA 2");
        assert!(
            hamming_distance(a, b) <= MAX_HAMMING_DISTANCE,
            "distance = {}",
            hamming_distance(a, b)
        );
    }

    #[test]
    fn test_unrelated_titles_are_far() {
        let a = simhash64("Boeing 737 MAX grounded indefinitely by FAA");
        let b = simhash64("Quarterly earnings beat expectations at retailer");
        assert!(hamming_distance(a, b) > MAX_HAMMING_DISTANCE);
    }

    #[test]
    fn test_short_and_empty_titles() {
        assert_eq!(simhash64(""), 0);
        assert_eq!(simhash64("!!"), 0);
        let short = simhash64("ab");
        assert_eq!(short.count_ones(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_grouping() {
        let groups = Arc::new(GroupStore::new());
        let index = SimHashIndex::new(groups.clone());

        let first = index
            .check_and_insert("1", "Boeing 737 MAX grounded indefinitely by FAA")
            .await;
        assert_eq!(first, DedupOutcome::Unique);

        // Syndicated copy of the same headline: casing and punctuation
        // differ, normalized trigrams do not.
        let second = index
            .check_and_insert("2", "boeing 737 max grounded indefinitely by faa!")
            .await;
        match second {
            DedupOutcome::Duplicate {
                group_id,
                primary_id,
                group_size,
            } => {
                assert_eq!(group_id, "1");
                assert_eq!(primary_id, "1");
                assert_eq!(group_size, 2);
            }
            other => panic!("expected duplicate, got {other:?}"),
        }

        assert!(groups.is_primary("1").await);
        assert!(!groups.is_primary("2").await);
    }

    #[tokio::test]
    async fn test_group_membership_is_order_independent() {
        let titles = [
            "Boeing 737 MAX grounded indefinitely by FAA",
            "Boeing 737 MAX grounded indefinitely by FAA!",
            "Boeing 737 MAX grounded indefinitely by FAA 2",
        ];

        // All pairwise within threshold: the final group contains every item
        // regardless of insertion order; the primary is the first inserted.
        for order in [[0, 1, 2], [2, 0, 1], [1, 2, 0]] {
            let groups = Arc::new(GroupStore::new());
            let index = SimHashIndex::new(groups.clone());
            for idx in order {
                index
                    .check_and_insert(&format!("item-{idx}"), titles[idx])
                    .await;
            }
            let first = format!("item-{}", order[0]);
            assert!(groups.is_primary(&first).await, "order {order:?}");
            assert_eq!(groups.group_size(&first).await, 3, "order {order:?}");
        }
    }

    #[tokio::test]
    async fn test_reinsert_returns_current_group() {
        let groups = Arc::new(GroupStore::new());
        let index = SimHashIndex::new(groups);
        index.check_and_insert("1", "Some unique headline here").await;
        let again = index.check_and_insert("1", "Some unique headline here").await;
        assert_eq!(again, DedupOutcome::Unique);
        assert_eq!(index.len().await, 1);
    }

    #[tokio::test]
    async fn test_remove_allows_fresh_registration() {
        let groups = Arc::new(GroupStore::new());
        let index = SimHashIndex::new(groups);
        index.check_and_insert("1", "A headline about markets").await;
        index.remove("1").await;
        assert!(index.is_empty().await);
    }
}

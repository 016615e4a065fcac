//! Sampling strategies over the per-source queues.
//!
//! A sampler pulls an ordered list of up to `n` items across all source
//! queues under some fairness policy. Every strategy except deficit
//! round-robin is a pure function of (queues, n); DRR retains its per-source
//! deficit across calls so long-run emission counts stay proportional to
//! weight. Where a policy is silent on ordering, ties keep the queue's own
//! internal (newest-first) order.

use chrono::{Duration as ChronoDuration, Utc};
use std::collections::HashMap;

use crate::models::Item;
use crate::queue::SourceQueue;

/// A strategy object consumed by the aggregator/UI to pull items.
pub trait Sampler: Send {
    fn sample(&mut self, queues: &[&SourceQueue], n: usize) -> Vec<Item>;
}

/// Visit queues in order, taking one item from each in turn.
pub struct RoundRobin {
    /// Per-source cap on emitted items, when set.
    pub max_per_source: Option<usize>,
}

impl Sampler for RoundRobin {
    fn sample(&mut self, queues: &[&SourceQueue], n: usize) -> Vec<Item> {
        let mut cursors: Vec<_> = queues.iter().map(|q| q.items()).collect();
        let mut taken = vec![0usize; queues.len()];
        let mut out = Vec::with_capacity(n);
        let mut exhausted = 0;
        while out.len() < n && exhausted < queues.len() {
            exhausted = 0;
            for (i, cursor) in cursors.iter_mut().enumerate() {
                if out.len() >= n {
                    break;
                }
                if let Some(cap) = self.max_per_source {
                    if taken[i] >= cap {
                        exhausted += 1;
                        continue;
                    }
                }
                match cursor.next() {
                    Some(item) => {
                        taken[i] += 1;
                        out.push(item.clone());
                    }
                    None => exhausted += 1,
                }
            }
        }
        out
    }
}

/// Each queue accrues credit proportional to its weight normalized by the
/// average weight; a queue emits while its credit is at least 1.0.
pub struct WeightedRoundRobin {
    /// Source name -> weight. Missing sources default to 1.0.
    pub weights: HashMap<String, f64>,
}

impl WeightedRoundRobin {
    fn weight_of(&self, name: &str) -> f64 {
        self.weights.get(name).copied().unwrap_or(1.0).max(0.0)
    }
}

impl Sampler for WeightedRoundRobin {
    fn sample(&mut self, queues: &[&SourceQueue], n: usize) -> Vec<Item> {
        if queues.is_empty() {
            return Vec::new();
        }
        let total: f64 = queues.iter().map(|q| self.weight_of(&q.source_name)).sum();
        let avg = total / queues.len() as f64;
        if avg <= 0.0 {
            return Vec::new();
        }

        let mut cursors: Vec<_> = queues.iter().map(|q| q.items()).collect();
        let mut credit = vec![0.0f64; queues.len()];
        let mut done = vec![false; queues.len()];
        let mut out = Vec::with_capacity(n);

        while out.len() < n && done.iter().any(|d| !d) {
            for (i, queue) in queues.iter().enumerate() {
                if done[i] {
                    continue;
                }
                credit[i] += self.weight_of(&queue.source_name) / avg;
                while credit[i] >= 1.0 && out.len() < n {
                    match cursors[i].next() {
                        Some(item) => {
                            credit[i] -= 1.0;
                            out.push(item.clone());
                        }
                        None => {
                            done[i] = true;
                            break;
                        }
                    }
                }
                if out.len() >= n {
                    break;
                }
            }
        }
        out
    }
}

/// Deficit round-robin with strict long-run fairness: each round adds
/// `quantum x weight` to every source's deficit, and each emission drains
/// one unit. Deficit carries over between `sample` calls.
pub struct DeficitRoundRobin {
    pub quantum: f64,
    pub weights: HashMap<String, f64>,
    deficits: HashMap<String, f64>,
}

impl DeficitRoundRobin {
    pub fn new(quantum: f64, weights: HashMap<String, f64>) -> Self {
        Self {
            quantum,
            weights,
            deficits: HashMap::new(),
        }
    }

    fn weight_of(&self, name: &str) -> f64 {
        self.weights.get(name).copied().unwrap_or(1.0).max(0.0)
    }
}

impl Sampler for DeficitRoundRobin {
    fn sample(&mut self, queues: &[&SourceQueue], n: usize) -> Vec<Item> {
        let mut cursors: Vec<_> = queues.iter().map(|q| q.items()).collect();
        let mut done = vec![false; queues.len()];
        let mut out = Vec::with_capacity(n);

        while out.len() < n && done.iter().any(|d| !d) {
            for (i, queue) in queues.iter().enumerate() {
                if done[i] {
                    continue;
                }
                let add = self.quantum * self.weight_of(&queue.source_name);
                let deficit = self.deficits.entry(queue.source_name.clone()).or_insert(0.0);
                *deficit += add;
                while *deficit >= 1.0 && out.len() < n {
                    match cursors[i].next() {
                        Some(item) => {
                            *deficit -= 1.0;
                            out.push(item.clone());
                        }
                        None => {
                            done[i] = true;
                            // An empty queue keeps no claim on future rounds.
                            *deficit = 0.0;
                            break;
                        }
                    }
                }
                if out.len() >= n {
                    break;
                }
            }
        }
        out
    }
}

/// Flatten all queues and return the globally most recent items.
pub struct RecencyMerge {
    /// The throttled variant: cap items per source in the output.
    pub max_per_source: Option<usize>,
}

impl Sampler for RecencyMerge {
    fn sample(&mut self, queues: &[&SourceQueue], n: usize) -> Vec<Item> {
        let mut all: Vec<&Item> = queues.iter().flat_map(|q| q.items()).collect();
        all.sort_by(|a, b| b.published.cmp(&a.published));

        let mut per_source: HashMap<&str, usize> = HashMap::new();
        let mut out = Vec::with_capacity(n);
        for item in all {
            if out.len() >= n {
                break;
            }
            if let Some(cap) = self.max_per_source {
                let count = per_source.entry(item.source_name.as_str()).or_insert(0);
                if *count >= cap {
                    continue;
                }
                *count += 1;
            }
            out.push(item.clone());
        }
        out
    }
}

/// Take up to a per-source quota from the recency window, then order all
/// taken items by recency. An optional cooldown enforces a minimum number of
/// items between two appearances of the same source; deferred items are
/// appended after the main pass.
pub struct FairRecent {
    pub window: ChronoDuration,
    pub per_source_quota: usize,
    pub cooldown: usize,
}

impl Default for FairRecent {
    fn default() -> Self {
        Self {
            window: ChronoDuration::hours(24),
            per_source_quota: 5,
            cooldown: 0,
        }
    }
}

impl Sampler for FairRecent {
    fn sample(&mut self, queues: &[&SourceQueue], n: usize) -> Vec<Item> {
        let cutoff = Utc::now() - self.window;
        let mut candidates: Vec<&Item> = Vec::new();
        for queue in queues {
            candidates.extend(
                queue
                    .items()
                    .filter(|item| item.effective_timestamp() >= cutoff)
                    .take(self.per_source_quota),
            );
        }
        candidates.sort_by(|a, b| b.published.cmp(&a.published));

        if self.cooldown == 0 {
            return candidates.into_iter().take(n).cloned().collect();
        }

        let mut out: Vec<Item> = Vec::with_capacity(n);
        let mut deferred: Vec<&Item> = Vec::new();
        let mut last_pos: HashMap<&str, usize> = HashMap::new();
        for item in candidates {
            if out.len() >= n {
                break;
            }
            match last_pos.get(item.source_name.as_str()) {
                Some(&pos) if out.len() - pos <= self.cooldown => deferred.push(item),
                _ => {
                    last_pos.insert(item.source_name.as_str(), out.len());
                    out.push(item.clone());
                }
            }
        }
        for item in deferred {
            if out.len() >= n {
                break;
            }
            out.push(item.clone());
        }
        out
    }
}

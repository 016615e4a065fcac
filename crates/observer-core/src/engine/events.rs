//! Typed event stream emitted by the engine.
//!
//! One closed enum instead of a marker-trait bus: subscribers match on the
//! variant and get every number they need to update a view without querying
//! back into the engine. Events for a single item arrive in causal order
//! (duplicate-or-entities, then cluster, then spike); events for distinct
//! items interleave freely.

use serde::{Deserialize, Serialize};

use crate::velocity::SpikeWindow;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CorrelationEvent {
    /// The item duplicates an already-known one and was folded away.
    DuplicateFound {
        item_id: String,
        primary_id: String,
        group_id: String,
        group_size: usize,
    },
    /// Entity extraction finished for an item that survived dedup.
    EntitiesExtracted {
        item_id: String,
        entity_count: usize,
        is_aggregating: bool,
    },
    /// The item joined or founded a story cluster.
    ClusterUpdated {
        cluster_id: String,
        item_id: String,
        size: usize,
        created: bool,
    },
    /// Sources inside one cluster assert conflicting claims.
    DisagreementFound {
        cluster_id: String,
        item_id: String,
        description: String,
    },
    /// A `process_items` batch finished entering the pipeline.
    BatchComplete { submitted: usize, dropped: usize },
    /// A cluster's arrival rate cleared the spike condition.
    VelocitySpike {
        cluster_id: String,
        window: SpikeWindow,
        rate: f64,
    },
}

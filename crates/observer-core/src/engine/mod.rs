//! Engine orchestrator.
//!
//! [`CorrelationEngine`] owns every pipeline component and runs three
//! long-lived tasks:
//!
//! 1. an ingest task that merges fetched batches into the aggregate pool and
//!    forwards accepted items to the coordinator,
//! 2. the pipeline coordinator, which runs inline SimHash dedup, fans entity
//!    extraction and semantic dedup out to the work pool, and folds results
//!    into the cluster and velocity layers,
//! 3. a five-minute housekeeper that persists entity links best-effort and
//!    prunes idle clusters.
//!
//! Every cross-stage send is non-blocking: a full downstream drops the
//! message and bumps a counter, so a stalled consumer degrades throughput
//! but can never wedge ingestion. `stop()` cancels, drains, stops the work
//! pool, and closes the event stream last; calling it twice is safe.

mod events;

pub use events::CorrelationEvent;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::aggregator::{Aggregator, ItemFilter, PoolCounters, DEFAULT_POOL_CAP};
use crate::ai::Embedder;
use crate::cluster::{ClusterConfig, ClusterEngine};
use crate::dedup::{
    DedupOutcome, EmbeddingDedupConfig, EmbeddingDedupIndex, GroupStore, SimHashIndex,
};
use crate::entities::{ClaimKind, EntityExtractor, Extraction};
use crate::models::{Cluster, Item};
use crate::pool::{PoolStats, WorkPool, DEFAULT_QUEUE_CAP, DEFAULT_WORKERS};
use crate::velocity::VelocityTracker;

/// Best-effort sink the housekeeper writes entity links to.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EntitySink: Send + Sync {
    /// Persist a batch of (item id, extraction) pairs, returning how many
    /// links were written. Failures are logged by the caller and never
    /// retried; the in-memory cache remains authoritative.
    async fn persist_entities(
        &self,
        batch: &[(String, Extraction)],
    ) -> crate::error::Result<usize>;
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Aggregate pool cap (items).
    pub pool_cap: usize,
    /// Buffer of the items channel feeding the coordinator.
    pub items_buffer: usize,
    /// Buffer of the outbound event channel.
    pub events_buffer: usize,
    /// Work pool worker count.
    pub workers: usize,
    /// Work pool pending-queue cap.
    pub work_queue_cap: usize,
    pub housekeeping_interval: Duration,
    /// Clusters idle beyond this are dropped entirely by the housekeeper.
    pub cluster_retention: ChronoDuration,
    pub cluster: ClusterConfig,
    pub embedding: EmbeddingDedupConfig,
    /// Run the claim pass and emit disagreement events.
    pub detect_claims: bool,
    /// Entries kept in the recent-activity ring.
    pub activity_ring: usize,
    /// Entity mentions retained for `top_entities`.
    pub mention_cap: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pool_cap: DEFAULT_POOL_CAP,
            items_buffer: 1024,
            events_buffer: 256,
            workers: num_cpus::get().clamp(DEFAULT_WORKERS, 8),
            work_queue_cap: DEFAULT_QUEUE_CAP,
            housekeeping_interval: Duration::from_secs(5 * 60),
            cluster_retention: ChronoDuration::days(7),
            cluster: ClusterConfig::default(),
            embedding: EmbeddingDedupConfig::default(),
            detect_claims: false,
            activity_ring: 100,
            mention_cap: 10_000,
        }
    }
}

/// One line of the recent-activity feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub ts: DateTime<Utc>,
    pub message: String,
}

/// Numbers the engine exposes for the stats surface.
#[derive(Debug, Clone)]
pub struct EngineStats {
    pub items_processed: u64,
    pub duplicates_found: u64,
    pub items_dropped: u64,
    pub events_dropped: u64,
    pub pool_size: usize,
    pub pool_counters: PoolCounters,
    pub dedup_groups: usize,
    pub clusters: usize,
    pub tracked_velocity: usize,
    pub cached_extractions: usize,
    pub work: PoolStats,
}

#[derive(Default)]
struct EngineCounters {
    items_processed: AtomicU64,
    duplicates_found: AtomicU64,
    items_dropped: AtomicU64,
}

/// Outbound event channel with non-blocking sends and a drop counter.
struct EventBus {
    tx: std::sync::Mutex<Option<mpsc::Sender<CorrelationEvent>>>,
    dropped: AtomicU64,
}

impl EventBus {
    fn new(tx: mpsc::Sender<CorrelationEvent>) -> Self {
        Self {
            tx: std::sync::Mutex::new(Some(tx)),
            dropped: AtomicU64::new(0),
        }
    }

    fn emit(&self, event: CorrelationEvent) {
        let Ok(guard) = self.tx.lock() else { return };
        let Some(tx) = guard.as_ref() else { return };
        if let Err(mpsc::error::TrySendError::Full(event)) = tx.try_send(event) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            debug!(?event, "event channel full, dropping");
        }
    }

    /// Closing drops the sender so the subscriber's `recv` returns `None`.
    fn close(&self) {
        if let Ok(mut guard) = self.tx.lock() {
            guard.take();
        }
    }
}

struct PipelineShared {
    groups: Arc<GroupStore>,
    simhash: SimHashIndex,
    embedding: Option<EmbeddingDedupIndex>,
    extractor: EntityExtractor,
    clusters: ClusterEngine,
    velocity: VelocityTracker,
    pool: WorkPool,
    entity_cache: DashMap<String, Extraction>,
    item_sources: DashMap<String, String>,
    /// (ts, entity id, display name); bounded by `mention_cap`.
    mentions: Mutex<VecDeque<(DateTime<Utc>, String, String)>>,
    activity: Mutex<VecDeque<ActivityEntry>>,
    /// Extractions awaiting the next best-effort persist sweep.
    dirty: Mutex<Vec<(String, Extraction)>>,
    sink: Option<Arc<dyn EntitySink>>,
    events: EventBus,
    entities_tx: mpsc::Sender<(Item, Extraction)>,
    counters: EngineCounters,
    config: EngineConfig,
    cancel: CancellationToken,
}

impl PipelineShared {
    async fn push_activity(&self, message: String) {
        let mut activity = self.activity.lock().await;
        if activity.len() >= self.config.activity_ring {
            activity.pop_front();
        }
        activity.push_back(ActivityEntry {
            ts: Utc::now(),
            message,
        });
    }

    /// Distinct source names across a cluster's members, best effort from
    /// the item-source map.
    async fn distinct_sources(&self, cluster: &Cluster) -> usize {
        let sources: HashSet<String> = cluster
            .item_ids
            .iter()
            .filter_map(|id| self.item_sources.get(id).map(|s| s.value().clone()))
            .collect();
        sources.len().max(1)
    }
}

/// The ingestion + correlation engine.
pub struct CorrelationEngine {
    shared: Arc<PipelineShared>,
    aggregator: Arc<Aggregator>,
    items_tx: mpsc::Sender<Item>,
    intake_tx: mpsc::Sender<Vec<Item>>,
    events_rx: Mutex<Option<mpsc::Receiver<CorrelationEvent>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    stopped: AtomicBool,
    cancel: CancellationToken,
}

impl CorrelationEngine {
    pub fn new(
        config: EngineConfig,
        filter: ItemFilter,
        embedder: Option<Arc<dyn Embedder>>,
        sink: Option<Arc<dyn EntitySink>>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let groups = Arc::new(GroupStore::new());
        let (events_tx, events_rx) = mpsc::channel(config.events_buffer);
        let (items_tx, items_rx) = mpsc::channel::<Item>(config.items_buffer);
        let (intake_tx, intake_rx) = mpsc::channel::<Vec<Item>>(64);
        let (entities_tx, entities_rx) = mpsc::channel::<(Item, Extraction)>(config.items_buffer);

        let embedding = embedder.map(|e| {
            EmbeddingDedupIndex::new(e, groups.clone(), config.embedding.clone())
        });
        let extractor = if config.detect_claims {
            EntityExtractor::with_claims()
        } else {
            EntityExtractor::new()
        };

        let shared = Arc::new(PipelineShared {
            groups: groups.clone(),
            simhash: SimHashIndex::new(groups),
            embedding,
            extractor,
            clusters: ClusterEngine::new(config.cluster.clone()),
            velocity: VelocityTracker::new(),
            pool: WorkPool::new(config.workers, config.work_queue_cap),
            entity_cache: DashMap::new(),
            item_sources: DashMap::new(),
            mentions: Mutex::new(VecDeque::new()),
            activity: Mutex::new(VecDeque::new()),
            dirty: Mutex::new(Vec::new()),
            sink,
            events: EventBus::new(events_tx),
            entities_tx,
            counters: EngineCounters::default(),
            config,
            cancel: cancel.clone(),
        });

        let aggregator = Arc::new(Aggregator::new(shared.config.pool_cap, filter));

        let mut tasks = Vec::new();
        tasks.push(tokio::spawn(ingest_loop(
            shared.clone(),
            aggregator.clone(),
            intake_rx,
            items_tx.clone(),
        )));
        tasks.push(tokio::spawn(coordinator_loop(
            shared.clone(),
            items_rx,
            entities_rx,
        )));
        tasks.push(tokio::spawn(housekeeper_loop(shared.clone())));

        Self {
            shared,
            aggregator,
            items_tx,
            intake_tx,
            events_rx: Mutex::new(Some(events_rx)),
            tasks: Mutex::new(tasks),
            stopped: AtomicBool::new(false),
            cancel,
        }
    }

    /// Sender the fetch scheduler pushes raw batches into.
    pub fn intake_sender(&self) -> mpsc::Sender<Vec<Item>> {
        self.intake_tx.clone()
    }

    /// Feed one item straight into the pipeline (bypassing the aggregate
    /// pool). Non-blocking; returns false when the input channel is full or
    /// the engine is stopping.
    pub fn process_item(&self, item: Item) -> bool {
        if self.stopped.load(Ordering::SeqCst) {
            return false;
        }
        match self.items_tx.try_send(item) {
            Ok(()) => true,
            Err(err) => {
                self.shared
                    .counters
                    .items_dropped
                    .fetch_add(1, Ordering::Relaxed);
                debug!(%err, "items channel full, dropping item");
                false
            }
        }
    }

    /// Feed a batch; returns how many items were accepted and emits a
    /// `BatchComplete` event.
    pub fn process_items(&self, items: Vec<Item>) -> usize {
        let total = items.len();
        let mut accepted = 0usize;
        for item in items {
            if self.process_item(item) {
                accepted += 1;
            }
        }
        self.shared.events.emit(CorrelationEvent::BatchComplete {
            submitted: accepted,
            dropped: total - accepted,
        });
        accepted
    }

    /// Take the engine's event stream. Single consumer; subsequent calls
    /// return `None`.
    pub async fn events(&self) -> Option<mpsc::Receiver<CorrelationEvent>> {
        self.events_rx.lock().await.take()
    }

    // --- query surface -----------------------------------------------------

    /// Number of hidden duplicates behind `item_id`.
    pub async fn duplicate_count(&self, item_id: &str) -> usize {
        self.shared.groups.group_size(item_id).await.saturating_sub(1)
    }

    pub async fn is_primary_in_group(&self, item_id: &str) -> bool {
        self.shared.groups.is_primary(item_id).await
    }

    pub async fn duplicates(&self, item_id: &str) -> Vec<String> {
        self.shared.groups.duplicates_of(item_id).await
    }

    /// Primary-only view of a batch of items (what the UI lists by default).
    pub async fn primary_items(&self, items: &[Item]) -> Vec<Item> {
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            if self.shared.groups.is_primary(&item.id).await {
                out.push(item.clone());
            }
        }
        out
    }

    pub async fn item_entities(&self, item_id: &str) -> Option<Extraction> {
        self.shared.entity_cache.get(item_id).map(|e| e.value().clone())
    }

    pub async fn cluster_info(&self, item_id: &str) -> Option<Cluster> {
        self.shared.clusters.cluster_for(item_id).await
    }

    pub async fn is_cluster_primary(&self, item_id: &str) -> bool {
        self.shared.clusters.is_primary(item_id).await
    }

    pub async fn sparkline(&self, cluster_id: &str, points: usize) -> Vec<f64> {
        self.shared.velocity.sparkline(cluster_id, points).await
    }

    /// UI trend bucket for a cluster, from its current 1 h rate.
    pub async fn cluster_trend(&self, cluster_id: &str) -> crate::models::Trend {
        self.shared.velocity.trend(cluster_id).await
    }

    /// Clusters with at least two members, hottest first.
    pub async fn active_clusters(&self, limit: usize) -> Vec<Cluster> {
        let rates = self.shared.velocity.current_rates().await;
        self.shared
            .clusters
            .active_clusters(limit, |id| rates.get(id).copied().unwrap_or(0.0))
            .await
    }

    /// Most-mentioned entities since `since`, as (entity id, display name,
    /// mention count).
    pub async fn top_entities(
        &self,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Vec<(String, String, usize)> {
        let mentions = self.shared.mentions.lock().await;
        let mut counts: HashMap<&str, (usize, &str)> = HashMap::new();
        for (ts, entity_id, name) in mentions.iter() {
            if *ts >= since {
                let entry = counts.entry(entity_id.as_str()).or_insert((0, name.as_str()));
                entry.0 += 1;
            }
        }
        let mut out: Vec<(String, String, usize)> = counts
            .into_iter()
            .map(|(id, (count, name))| (id.to_string(), name.to_string(), count))
            .collect();
        out.sort_by(|a, b| b.2.cmp(&a.2).then_with(|| a.0.cmp(&b.0)));
        out.truncate(limit);
        out
    }

    pub async fn recent_activity(&self, n: usize) -> Vec<ActivityEntry> {
        let activity = self.shared.activity.lock().await;
        activity.iter().rev().take(n).cloned().collect()
    }

    pub async fn stats(&self) -> EngineStats {
        let work = self.shared.pool.snapshot().await.stats;
        EngineStats {
            items_processed: self.shared.counters.items_processed.load(Ordering::Relaxed),
            duplicates_found: self.shared.counters.duplicates_found.load(Ordering::Relaxed),
            items_dropped: self.shared.counters.items_dropped.load(Ordering::Relaxed),
            events_dropped: self.shared.events.dropped.load(Ordering::Relaxed),
            pool_size: self.aggregator.len().await,
            pool_counters: self.aggregator.counters().await,
            dedup_groups: self.shared.groups.group_count().await,
            clusters: self.shared.clusters.cluster_count().await,
            tracked_velocity: self.shared.velocity.tracked_clusters().await,
            cached_extractions: self.shared.entity_cache.len(),
            work,
        }
    }

    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    /// Shut down: cancel tasks, drain the pipeline, stop the work pool, and
    /// close the event stream last. Safe to call more than once.
    pub async fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("correlation engine stopping");
        self.cancel.cancel();

        let handles: Vec<JoinHandle<()>> = {
            let mut tasks = self.tasks.lock().await;
            tasks.drain(..).collect()
        };
        for handle in handles {
            if let Err(err) = handle.await {
                warn!(%err, "engine task panicked");
            }
        }

        self.shared.pool.stop().await;
        self.shared.events.close();
        info!("correlation engine stopped");
    }
}

async fn ingest_loop(
    shared: Arc<PipelineShared>,
    aggregator: Arc<Aggregator>,
    mut intake_rx: mpsc::Receiver<Vec<Item>>,
    items_tx: mpsc::Sender<Item>,
) {
    loop {
        let batch = tokio::select! {
            _ = shared.cancel.cancelled() => break,
            batch = intake_rx.recv() => match batch {
                Some(batch) => batch,
                None => break,
            },
        };

        let report = aggregator.merge_items(batch).await;
        // Evicted items leave the near-dup index so its memory tracks the
        // pool; their group memberships stay queryable.
        for evicted_id in &report.evicted_ids {
            shared.simhash.remove(evicted_id).await;
            shared.item_sources.remove(evicted_id);
        }
        let mut dropped = 0usize;
        let mut submitted = 0usize;
        for item in report.added_items {
            // An item evicted within the same merge never reaches the
            // pipeline.
            if report.evicted_ids.contains(&item.id) {
                continue;
            }
            match items_tx.try_send(item) {
                Ok(()) => submitted += 1,
                Err(_) => {
                    dropped += 1;
                    shared.counters.items_dropped.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
        if dropped > 0 {
            debug!(dropped, "coordinator input full, dropping ingested items");
        }
        shared.events.emit(CorrelationEvent::BatchComplete { submitted, dropped });
    }
    debug!("ingest task stopped");
}

async fn coordinator_loop(
    shared: Arc<PipelineShared>,
    mut items_rx: mpsc::Receiver<Item>,
    mut entities_rx: mpsc::Receiver<(Item, Extraction)>,
) {
    loop {
        tokio::select! {
            biased;
            _ = shared.cancel.cancelled() => break,
            Some(item) = items_rx.recv() => handle_item(&shared, item).await,
            Some((item, extraction)) = entities_rx.recv() => {
                handle_extraction(&shared, item, extraction).await;
            }
            else => break,
        }
    }

    // Drain what is already buffered so accepted items are not lost on
    // shutdown; new sends are rejected by the engine by now.
    while let Ok(item) = items_rx.try_recv() {
        handle_item(&shared, item).await;
    }
    while let Ok((item, extraction)) = entities_rx.try_recv() {
        handle_extraction(&shared, item, extraction).await;
    }
    debug!("pipeline coordinator stopped");
}

/// Stage one: inline near-duplicate detection, then extraction fan-out.
async fn handle_item(shared: &Arc<PipelineShared>, item: Item) {
    shared.counters.items_processed.fetch_add(1, Ordering::Relaxed);
    shared
        .item_sources
        .insert(item.id.clone(), item.source_name.clone());

    let outcome = shared.simhash.check_and_insert(&item.id, &item.title).await;
    if let DedupOutcome::Duplicate {
        group_id,
        primary_id,
        group_size,
    } = outcome
    {
        shared.counters.duplicates_found.fetch_add(1, Ordering::Relaxed);
        shared
            .push_activity(format!("duplicate: '{}' -> {}", item.title, primary_id))
            .await;
        shared.events.emit(CorrelationEvent::DuplicateFound {
            item_id: item.id,
            primary_id,
            group_id,
            group_size,
        });
        return;
    }

    // Unique so far: entity extraction runs on the work pool, results come
    // back over the entities channel.
    let pool_shared = shared.clone();
    let description = format!("extract entities: {}", item.title);
    let submit = shared
        .pool
        .submit(
            "extract",
            description,
            "pipeline",
            0,
            Box::new(move |_handle| {
                Box::pin(async move {
                    let extraction = pool_shared
                        .extractor
                        .extract(&item.title, &item.summary);
                    let found = extraction.entities.len();
                    if pool_shared.entities_tx.try_send((item, extraction)).is_err() {
                        return Err("entity results channel full".to_string());
                    }
                    Ok(format!("{found} entities"))
                })
            }),
        )
        .await;
    if let Err(err) = submit {
        debug!(%err, "extraction submission rejected");
    }
}

/// Stage two: cache entities, cluster, track velocity, emit events.
async fn handle_extraction(shared: &Arc<PipelineShared>, item: Item, extraction: Extraction) {
    let entity_ids = extraction.entity_ids();

    shared
        .entity_cache
        .insert(item.id.clone(), extraction.clone());
    {
        let mut dirty = shared.dirty.lock().await;
        dirty.push((item.id.clone(), extraction.clone()));
    }
    {
        let now = Utc::now();
        let mut mentions = shared.mentions.lock().await;
        for extracted in &extraction.entities {
            if mentions.len() >= shared.config.mention_cap {
                mentions.pop_front();
            }
            mentions.push_back((now, extracted.entity.id.clone(), extracted.entity.name.clone()));
        }
    }

    shared.events.emit(CorrelationEvent::EntitiesExtracted {
        item_id: item.id.clone(),
        entity_count: entity_ids.len(),
        is_aggregating: extraction.is_aggregating,
    });

    if let Some(assignment) = shared.clusters.assign(&item, &entity_ids).await {
        if assignment.created {
            shared
                .push_activity(format!("new cluster: {}", item.title))
                .await;
        }
        shared.events.emit(CorrelationEvent::ClusterUpdated {
            cluster_id: assignment.cluster_id.clone(),
            item_id: item.id.clone(),
            size: assignment.size,
            created: assignment.created,
        });

        if shared.config.detect_claims
            && assignment.size >= 2
            && extraction.claims.iter().any(|c| c.kind == ClaimKind::Denial)
        {
            shared.events.emit(CorrelationEvent::DisagreementFound {
                cluster_id: assignment.cluster_id.clone(),
                item_id: item.id.clone(),
                description: "denial against existing cluster claims".to_string(),
            });
        }

        let sources = match shared.clusters.get(&assignment.cluster_id).await {
            Some(cluster) => shared.distinct_sources(&cluster).await,
            None => 1,
        };
        if let Some(spike) = shared
            .velocity
            .record(&assignment.cluster_id, sources)
            .await
        {
            shared
                .push_activity(format!(
                    "velocity spike: cluster {} at {:.1}/h ({})",
                    spike.cluster_id, spike.rate, spike.window
                ))
                .await;
            shared.events.emit(CorrelationEvent::VelocitySpike {
                cluster_id: spike.cluster_id,
                window: spike.window,
                rate: spike.rate,
            });
        }
    }

    // Semantic dedup runs out of band; a late duplicate verdict still emits
    // so the UI can fold the item away.
    if shared.embedding.is_some() {
        let pool_shared = shared.clone();
        let item_id = item.id.clone();
        let title = item.title.clone();
        let submit = shared
            .pool
            .submit(
                "embed",
                format!("semantic dedup: {title}"),
                "pipeline",
                0,
                Box::new(move |_handle| {
                    Box::pin(async move {
                        let Some(index) = pool_shared.embedding.as_ref() else {
                            return Ok("embedding disabled".to_string());
                        };
                        match index.index_item(&item_id, &title).await {
                            Ok(DedupOutcome::Duplicate {
                                group_id,
                                primary_id,
                                group_size,
                            }) => {
                                pool_shared
                                    .counters
                                    .duplicates_found
                                    .fetch_add(1, Ordering::Relaxed);
                                pool_shared.events.emit(CorrelationEvent::DuplicateFound {
                                    item_id: item_id.clone(),
                                    primary_id,
                                    group_id,
                                    group_size,
                                });
                                Ok("semantic duplicate".to_string())
                            }
                            Ok(DedupOutcome::Unique) => Ok("unique".to_string()),
                            // Skips (no embedding, dimension drift) are
                            // routine, not failures.
                            Err(err) => Ok(format!("skipped: {err}")),
                        }
                    })
                }),
            )
            .await;
        if let Err(err) = submit {
            debug!(%err, "embedding submission rejected");
        }
    }
}

async fn housekeeper_loop(shared: Arc<PipelineShared>) {
    let mut ticker = tokio::time::interval(shared.config.housekeeping_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick fires immediately; skip it.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shared.cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        if let Some(sink) = &shared.sink {
            let batch: Vec<(String, Extraction)> = {
                let mut dirty = shared.dirty.lock().await;
                std::mem::take(&mut *dirty)
            };
            if !batch.is_empty() {
                match sink.persist_entities(&batch).await {
                    Ok(written) => debug!(written, "persisted entity links"),
                    Err(err) => warn!(%err, "entity persist failed, continuing"),
                }
            }
        }

        let removed = shared.clusters.prune(shared.config.cluster_retention).await;
        if !removed.is_empty() {
            shared.velocity.prune(&removed).await;
        }
    }
    debug!("housekeeper stopped");
}

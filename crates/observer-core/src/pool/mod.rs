//! Generic async work pool.
//!
//! All slow operations (fetch batches, embedding, offline extraction,
//! analysis) are submitted here rather than spawned ad hoc, so the rest of
//! the system gets one place to observe progress, history, and backpressure.
//!
//! A fixed set of workers consumes a bounded pending queue ordered by
//! priority (ties FIFO). Every state transition emits a [`WorkEvent`] to
//! subscribers over bounded channels; a subscriber that falls behind loses
//! events rather than slowing the pool. The last 100 terminal items are
//! retained in a ring for inspection. `stop()` closes intake, signals
//! cancellation to in-flight closures, and waits for workers to drain.

use chrono::{DateTime, Utc};
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{CorrelationError, Result};

pub const DEFAULT_WORKERS: usize = 4;
pub const DEFAULT_QUEUE_CAP: usize = 1024;
const COMPLETED_RING_CAP: usize = 100;
const SUBSCRIBER_BUFFER: usize = 256;

/// Lifecycle of a work item. Transitions only move forward:
/// pending -> active -> (complete | failed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkStatus {
    Pending,
    Active,
    Complete,
    Failed,
}

/// One unit of tracked work.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct WorkItem {
    pub id: Uuid,
    /// Short machine-readable kind, e.g. "fetch", "embed_batch".
    pub kind: String,
    pub status: WorkStatus,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Completion fraction in [0, 1].
    pub progress: f64,
    pub progress_msg: String,
    pub result: Option<String>,
    pub error: Option<String>,
    /// Which subsystem submitted the work.
    pub source: String,
    pub priority: i32,
}

/// What changed about a work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkChange {
    Created,
    Started,
    Progress,
    Completed,
    Failed,
}

/// Event emitted on every work item transition.
#[derive(Debug, Clone)]
pub struct WorkEvent {
    pub item: WorkItem,
    pub change: WorkChange,
}

/// Point-in-time view of the pool.
#[derive(Debug, Clone)]
pub struct PoolSnapshot {
    pub pending: Vec<WorkItem>,
    pub active: HashMap<Uuid, WorkItem>,
    pub completed: Vec<WorkItem>,
    pub stats: PoolStats,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PoolStats {
    pub total_created: u64,
    pub total_completed: u64,
    pub total_failed: u64,
    pub events_dropped: u64,
    pub workers_active: usize,
    pub workers_total: usize,
}

pub type WorkOutput = std::result::Result<String, String>;
pub type WorkFuture = Pin<Box<dyn Future<Output = WorkOutput> + Send>>;
/// The closure form accepted by [`WorkPool::submit`]. The handle lets the
/// work publish progress and observe cancellation.
pub type WorkFn = Box<dyn FnOnce(WorkHandle) -> WorkFuture + Send>;

/// Handed to each running closure for progress reporting and cancellation.
#[derive(Clone)]
pub struct WorkHandle {
    id: Uuid,
    shared: Arc<PoolShared>,
}

impl WorkHandle {
    /// Publish a progress update; clamped to [0, 1].
    pub async fn progress(&self, fraction: f64, message: impl Into<String>) {
        let event = {
            let mut state = self.shared.state.lock().await;
            let Some(item) = state.active.get_mut(&self.id) else {
                return;
            };
            item.progress = fraction.clamp(0.0, 1.0);
            item.progress_msg = message.into();
            Some(WorkEvent {
                item: item.clone(),
                change: WorkChange::Progress,
            })
        };
        if let Some(event) = event {
            self.shared.publish(event).await;
        }
    }

    /// True once the pool is shutting down; long closures should poll this.
    pub fn is_cancelled(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }

    /// Resolves when the pool shuts down; usable in `select!`.
    pub async fn cancelled(&self) {
        self.shared.cancel.cancelled().await
    }
}

struct QueuedWork {
    item: WorkItem,
    seq: u64,
    work: WorkFn,
}

impl PartialEq for QueuedWork {
    fn eq(&self, other: &Self) -> bool {
        self.item.priority == other.item.priority && self.seq == other.seq
    }
}
impl Eq for QueuedWork {}
impl PartialOrd for QueuedWork {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for QueuedWork {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Max-heap: higher priority first, then lower sequence (FIFO).
        self.item
            .priority
            .cmp(&other.item.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct PoolState {
    pending: BinaryHeap<QueuedWork>,
    active: HashMap<Uuid, WorkItem>,
    completed: VecDeque<WorkItem>,
    subscribers: Vec<mpsc::Sender<WorkEvent>>,
    stats: PoolStats,
    next_seq: u64,
    accepting: bool,
}

struct PoolShared {
    state: Mutex<PoolState>,
    work_ready: Notify,
    cancel: CancellationToken,
    queue_cap: usize,
}

impl PoolShared {
    /// Publish outside the state lock so a slow subscriber never extends the
    /// critical section. Full subscriber channels drop the event; closed
    /// subscribers are pruned.
    async fn publish(&self, event: WorkEvent) {
        let senders: Vec<mpsc::Sender<WorkEvent>> = {
            let state = self.state.lock().await;
            state.subscribers.clone()
        };
        let mut dropped = 0u64;
        let mut closed = false;
        for sender in &senders {
            match sender.try_send(event.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => dropped += 1,
                Err(mpsc::error::TrySendError::Closed(_)) => closed = true,
            }
        }
        if dropped > 0 || closed {
            let mut state = self.state.lock().await;
            state.stats.events_dropped += dropped;
            if closed {
                state.subscribers.retain(|s| !s.is_closed());
            }
        }
    }
}

/// The executor. Cheap to clone via `Arc` internally; hold it in an `Arc`
/// where multiple subsystems submit.
pub struct WorkPool {
    shared: Arc<PoolShared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkPool {
    pub fn new(workers: usize, queue_cap: usize) -> Self {
        let shared = Arc::new(PoolShared {
            state: Mutex::new(PoolState {
                pending: BinaryHeap::new(),
                active: HashMap::new(),
                completed: VecDeque::with_capacity(COMPLETED_RING_CAP),
                subscribers: Vec::new(),
                stats: PoolStats {
                    workers_total: workers,
                    ..PoolStats::default()
                },
                next_seq: 0,
                accepting: true,
            }),
            work_ready: Notify::new(),
            cancel: CancellationToken::new(),
            queue_cap,
        });

        let handles = (0..workers.max(1))
            .map(|worker_idx| {
                let shared = shared.clone();
                tokio::spawn(async move { worker_loop(worker_idx, shared).await })
            })
            .collect();

        Self {
            shared,
            workers: Mutex::new(handles),
        }
    }

    /// Submit a closure. Returns the work item id, or an error when the pool
    /// is stopping or the pending queue is full.
    pub async fn submit(
        &self,
        kind: impl Into<String>,
        description: impl Into<String>,
        source: impl Into<String>,
        priority: i32,
        work: WorkFn,
    ) -> Result<Uuid> {
        let item = WorkItem {
            id: Uuid::new_v4(),
            kind: kind.into(),
            status: WorkStatus::Pending,
            description: description.into(),
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            progress: 0.0,
            progress_msg: String::new(),
            result: None,
            error: None,
            source: source.into(),
            priority,
        };
        let id = item.id;

        let event = {
            let mut state = self.shared.state.lock().await;
            if !state.accepting {
                return Err(CorrelationError::PoolRejected {
                    message: "pool is stopping".to_string(),
                });
            }
            if state.pending.len() >= self.shared.queue_cap {
                return Err(CorrelationError::PoolRejected {
                    message: format!("pending queue full ({})", self.shared.queue_cap),
                });
            }
            let seq = state.next_seq;
            state.next_seq += 1;
            state.stats.total_created += 1;
            state.pending.push(QueuedWork {
                item: item.clone(),
                seq,
                work,
            });
            WorkEvent {
                item,
                change: WorkChange::Created,
            }
        };

        self.shared.publish(event).await;
        self.shared.work_ready.notify_one();
        Ok(id)
    }

    /// Subscribe to work events over a bounded channel. Fall behind and the
    /// pool drops your events, never the other way around.
    pub async fn subscribe(&self) -> mpsc::Receiver<WorkEvent> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        self.shared.state.lock().await.subscribers.push(tx);
        rx
    }

    /// Consistent point-in-time view of the pool.
    pub async fn snapshot(&self) -> PoolSnapshot {
        let state = self.shared.state.lock().await;
        let mut pending: Vec<WorkItem> = state.pending.iter().map(|q| q.item.clone()).collect();
        pending.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.created_at.cmp(&b.created_at)));
        PoolSnapshot {
            pending,
            active: state.active.clone(),
            completed: state.completed.iter().cloned().collect(),
            stats: PoolStats {
                workers_active: state.active.len(),
                ..state.stats
            },
        }
    }

    /// Stop accepting work, cancel in-flight closures, and wait for workers
    /// to terminate. Idempotent: later calls return immediately.
    pub async fn stop(&self) {
        {
            let mut state = self.shared.state.lock().await;
            state.accepting = false;
        }
        self.shared.cancel.cancel();
        self.shared.work_ready.notify_waiters();

        let handles: Vec<JoinHandle<()>> = {
            let mut workers = self.workers.lock().await;
            workers.drain(..).collect()
        };
        for handle in handles {
            if let Err(err) = handle.await {
                warn!(%err, "work pool worker panicked");
            }
        }
    }
}

async fn worker_loop(worker_idx: usize, shared: Arc<PoolShared>) {
    debug!(worker = worker_idx, "work pool worker started");
    loop {
        // Pending work queued before shutdown is abandoned; only in-flight
        // closures get to finish.
        if shared.cancel.is_cancelled() {
            break;
        }
        let queued = {
            let mut state = shared.state.lock().await;
            state.pending.pop()
        };

        let Some(mut queued) = queued else {
            if shared.cancel.is_cancelled() {
                break;
            }
            tokio::select! {
                _ = shared.cancel.cancelled() => continue,
                _ = shared.work_ready.notified() => continue,
            }
        };

        queued.item.status = WorkStatus::Active;
        queued.item.started_at = Some(Utc::now());
        let started_event = {
            let mut state = shared.state.lock().await;
            state.active.insert(queued.item.id, queued.item.clone());
            WorkEvent {
                item: queued.item.clone(),
                change: WorkChange::Started,
            }
        };
        shared.publish(started_event).await;

        let handle = WorkHandle {
            id: queued.item.id,
            shared: shared.clone(),
        };
        let output = (queued.work)(handle).await;

        let terminal_event = {
            let mut state = shared.state.lock().await;
            let mut item = state
                .active
                .remove(&queued.item.id)
                .unwrap_or(queued.item);
            item.finished_at = Some(Utc::now());
            let change = match output {
                Ok(result) => {
                    item.status = WorkStatus::Complete;
                    item.progress = 1.0;
                    item.result = Some(result);
                    state.stats.total_completed += 1;
                    WorkChange::Completed
                }
                Err(error) => {
                    item.status = WorkStatus::Failed;
                    item.error = Some(error);
                    state.stats.total_failed += 1;
                    WorkChange::Failed
                }
            };
            if state.completed.len() >= COMPLETED_RING_CAP {
                state.completed.pop_front();
            }
            state.completed.push_back(item.clone());
            WorkEvent { item, change }
        };
        shared.publish(terminal_event).await;
    }
    debug!(worker = worker_idx, "work pool worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn ok_work(result: &str) -> WorkFn {
        let result = result.to_string();
        Box::new(move |_handle| Box::pin(async move { Ok(result) }))
    }

    #[tokio::test]
    async fn test_submit_and_complete() {
        let pool = WorkPool::new(2, 16);
        let mut events = pool.subscribe().await;

        let id = pool
            .submit("test", "simple job", "tests", 0, ok_work("done"))
            .await
            .unwrap();

        let mut changes = Vec::new();
        while changes.len() < 3 {
            let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
                .await
                .expect("event within deadline")
                .expect("channel open");
            assert_eq!(event.item.id, id);
            changes.push(event.change);
        }
        assert_eq!(
            changes,
            vec![WorkChange::Created, WorkChange::Started, WorkChange::Completed]
        );

        let snapshot = pool.snapshot().await;
        assert_eq!(snapshot.stats.total_created, 1);
        assert_eq!(snapshot.stats.total_completed, 1);
        assert_eq!(snapshot.completed.len(), 1);
        assert_eq!(snapshot.completed[0].result.as_deref(), Some("done"));
        assert_eq!(snapshot.completed[0].progress, 1.0);

        pool.stop().await;
    }

    #[tokio::test]
    async fn test_failed_work_records_error() {
        let pool = WorkPool::new(1, 16);
        pool.submit(
            "test",
            "failing job",
            "tests",
            0,
            Box::new(|_h| Box::pin(async { Err("boom".to_string()) })),
        )
        .await
        .unwrap();

        // Wait until the terminal state lands in the ring.
        for _ in 0..50 {
            if pool.snapshot().await.stats.total_failed == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let snapshot = pool.snapshot().await;
        assert_eq!(snapshot.stats.total_failed, 1);
        assert_eq!(snapshot.completed[0].status, WorkStatus::Failed);
        assert_eq!(snapshot.completed[0].error.as_deref(), Some("boom"));
        pool.stop().await;
    }

    #[tokio::test]
    async fn test_priority_order_with_fifo_ties() {
        // Single worker blocked on a gate so submissions queue up.
        let pool = WorkPool::new(1, 64);
        let gate = Arc::new(Notify::new());
        let order = Arc::new(Mutex::new(Vec::new()));

        let blocker_gate = gate.clone();
        pool.submit(
            "test",
            "blocker",
            "tests",
            100,
            Box::new(move |_h| {
                Box::pin(async move {
                    blocker_gate.notified().await;
                    Ok(String::new())
                })
            }),
        )
        .await
        .unwrap();
        // Give the worker a beat to pick up the blocker.
        tokio::time::sleep(Duration::from_millis(50)).await;

        for (label, priority) in [("low-1", 0), ("high", 5), ("low-2", 0)] {
            let order = order.clone();
            pool.submit(
                "test",
                label,
                "tests",
                priority,
                Box::new(move |_h| {
                    Box::pin(async move {
                        order.lock().await.push(label.to_string());
                        Ok(String::new())
                    })
                }),
            )
            .await
            .unwrap();
        }

        gate.notify_one();
        for _ in 0..100 {
            if pool.snapshot().await.stats.total_completed == 4 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let order = order.lock().await.clone();
        assert_eq!(order, vec!["high", "low-1", "low-2"]);
        pool.stop().await;
    }

    #[tokio::test]
    async fn test_progress_events() {
        let pool = WorkPool::new(1, 16);
        let mut events = pool.subscribe().await;

        pool.submit(
            "test",
            "progressive",
            "tests",
            0,
            Box::new(|handle| {
                Box::pin(async move {
                    handle.progress(0.5, "halfway").await;
                    Ok("done".to_string())
                })
            }),
        )
        .await
        .unwrap();

        let mut saw_progress = false;
        for _ in 0..4 {
            let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
                .await
                .expect("event within deadline")
                .expect("channel open");
            if event.change == WorkChange::Progress {
                assert_eq!(event.item.progress, 0.5);
                assert_eq!(event.item.progress_msg, "halfway");
                saw_progress = true;
            }
        }
        assert!(saw_progress);
        pool.stop().await;
    }

    #[tokio::test]
    async fn test_stalled_subscriber_never_blocks_pool() {
        let pool = WorkPool::new(2, 512);
        // Subscribe and never read.
        let _stalled = pool.subscribe().await;

        let counter = Arc::new(AtomicUsize::new(0));
        for i in 0..200 {
            let counter = counter.clone();
            pool.submit(
                "test",
                format!("job {i}"),
                "tests",
                0,
                Box::new(move |_h| {
                    Box::pin(async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok(String::new())
                    })
                }),
            )
            .await
            .unwrap();
        }

        for _ in 0..200 {
            if counter.load(Ordering::SeqCst) == 200 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(counter.load(Ordering::SeqCst), 200);
        let snapshot = pool.snapshot().await;
        assert!(snapshot.stats.events_dropped > 0, "stalled subscriber dropped events");
        pool.stop().await;
    }

    #[tokio::test]
    async fn test_completed_ring_is_bounded() {
        let pool = WorkPool::new(4, 512);
        for i in 0..150 {
            pool.submit("test", format!("job {i}"), "tests", 0, ok_work("ok"))
                .await
                .unwrap();
        }
        for _ in 0..200 {
            if pool.snapshot().await.stats.total_completed == 150 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let snapshot = pool.snapshot().await;
        assert_eq!(snapshot.stats.total_completed, 150);
        assert_eq!(snapshot.completed.len(), COMPLETED_RING_CAP);
        pool.stop().await;
    }

    #[tokio::test]
    async fn test_stop_is_idempotent_and_rejects_new_work() {
        let pool = WorkPool::new(2, 16);
        pool.stop().await;
        pool.stop().await;

        let result = pool.submit("test", "late", "tests", 0, ok_work("x")).await;
        assert!(matches!(result, Err(CorrelationError::PoolRejected { .. })));
    }

    #[tokio::test]
    async fn test_stop_waits_for_active_work() {
        let pool = WorkPool::new(1, 16);
        let finished = Arc::new(AtomicUsize::new(0));

        let flag = finished.clone();
        pool.submit(
            "test",
            "cancellable",
            "tests",
            0,
            Box::new(move |handle| {
                Box::pin(async move {
                    handle.cancelled().await;
                    flag.store(1, Ordering::SeqCst);
                    Ok(String::new())
                })
            }),
        )
        .await
        .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        pool.stop().await;
        // stop() only returns after the closure observed cancellation and
        // terminated.
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }
}

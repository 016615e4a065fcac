//! Per-source queues and the adaptive fetch scheduler.
//!
//! Each registered source gets its own [`SourceQueue`] holding its recent
//! items in soft newest-first order. The queue also carries the source's poll
//! state: the adaptive interval tightens by 0.7x whenever a fetch produced new
//! items and relaxes by 1.5x when it came back empty, clamped to
//! [`QueueConfig::min_interval`, `QueueConfig::max_interval`]. Consecutive
//! fetch errors push the next poll out quadratically, capped at 30 minutes.
//!
//! [`FetchScheduler`] drives the queues: a single loop finds due sources,
//! fans fetches out under a concurrency cap, and forwards new items to the
//! engine's intake channel.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::models::{Item, SourceHealth, SourceType};
use crate::sources::Source;

/// Tunables shared by every source queue.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Floor for the adaptive interval.
    pub min_interval: Duration,
    /// Ceiling for the adaptive interval.
    pub max_interval: Duration,
    /// Items older than this are removed on the periodic sweep.
    pub max_age: ChronoDuration,
    /// Cap on quadratic error backoff.
    pub max_backoff: Duration,
    /// Consecutive errors after which a source is disabled until it is
    /// explicitly re-enabled. 0 disables the mechanism.
    pub disable_after_errors: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_secs(30),
            max_interval: Duration::from_secs(15 * 60),
            max_age: ChronoDuration::hours(48),
            max_backoff: Duration::from_secs(30 * 60),
            disable_after_errors: 10,
        }
    }
}

/// One source's recent items plus its adaptive poll state.
#[derive(Debug)]
pub struct SourceQueue {
    pub source_name: String,
    pub source_type: SourceType,
    items: VecDeque<Item>,
    seen_ids: HashSet<String>,
    pub last_polled: Option<DateTime<Utc>>,
    pub current_interval: Duration,
    pub consecutive_errors: u32,
    pub last_new_count: usize,
    /// Error backoff gate; polls are suppressed until this passes.
    backoff_until: Option<DateTime<Utc>>,
    in_flight: bool,
    disabled: bool,
    config: QueueConfig,
}

impl SourceQueue {
    pub fn new(
        source_name: impl Into<String>,
        source_type: SourceType,
        base_interval: Duration,
        config: QueueConfig,
    ) -> Self {
        let interval = base_interval.clamp(config.min_interval, config.max_interval);
        Self {
            source_name: source_name.into(),
            source_type,
            items: VecDeque::new(),
            seen_ids: HashSet::new(),
            last_polled: None,
            current_interval: interval,
            consecutive_errors: 0,
            last_new_count: 0,
            backoff_until: None,
            in_flight: false,
            disabled: false,
            config,
        }
    }

    /// True when the source is due: never polled, or the adaptive interval
    /// has elapsed, the error backoff has passed, the source is not
    /// disabled, and no fetch is in flight.
    pub fn should_poll(&self, now: DateTime<Utc>) -> bool {
        if self.in_flight || self.disabled {
            return false;
        }
        if let Some(until) = self.backoff_until {
            if now < until {
                return false;
            }
        }
        match self.last_polled {
            None => true,
            Some(last) => {
                now - last >= ChronoDuration::from_std(self.current_interval).unwrap_or_default()
            }
        }
    }

    pub fn mark_in_flight(&mut self) {
        self.in_flight = true;
    }

    /// Record a successful fetch: de-dupe against the queue by id, prepend
    /// the new items, and adapt the interval from how many were new.
    /// Returns the newly inserted items in source order.
    pub fn record_fetch(&mut self, batch: Vec<Item>, now: DateTime<Utc>) -> Vec<Item> {
        self.in_flight = false;
        self.last_polled = Some(now);
        self.consecutive_errors = 0;
        self.backoff_until = None;

        let mut new_items = Vec::new();
        // Prepend in reverse so the batch's own order is preserved at the front.
        for item in batch.into_iter().rev() {
            if self.seen_ids.contains(&item.id) {
                continue;
            }
            self.seen_ids.insert(item.id.clone());
            self.items.push_front(item.clone());
            new_items.push(item);
        }
        new_items.reverse();
        self.last_new_count = new_items.len();

        self.current_interval = if self.last_new_count > 0 {
            mul_duration(self.current_interval, 0.7).max(self.config.min_interval)
        } else {
            mul_duration(self.current_interval, 1.5).min(self.config.max_interval)
        };

        new_items
    }

    /// Record a failed fetch: bump the consecutive-error counter, push the
    /// next attempt out by min(consec^2 minutes, max_backoff), and disable
    /// the source once it has failed often enough.
    pub fn record_error(&mut self, now: DateTime<Utc>) {
        self.in_flight = false;
        self.last_polled = Some(now);
        self.consecutive_errors += 1;
        let penalty = Duration::from_secs(60u64.saturating_mul(u64::from(self.consecutive_errors).saturating_pow(2)))
            .min(self.config.max_backoff);
        self.backoff_until =
            Some(now + ChronoDuration::from_std(penalty).unwrap_or(ChronoDuration::minutes(30)));
        if self.config.disable_after_errors > 0
            && self.consecutive_errors >= self.config.disable_after_errors
        {
            self.disabled = true;
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Re-enable a disabled source and clear its error state so the next
    /// scheduler pass may poll it again.
    pub fn reenable(&mut self) {
        self.disabled = false;
        self.consecutive_errors = 0;
        self.backoff_until = None;
    }

    /// Drop items older than the configured max age. Returns how many went.
    pub fn prune(&mut self, now: DateTime<Utc>) -> usize {
        let cutoff = now - self.config.max_age;
        let before = self.items.len();
        self.items.retain(|item| {
            let keep = item.effective_timestamp() >= cutoff;
            if !keep {
                self.seen_ids.remove(&item.id);
            }
            keep
        });
        before - self.items.len()
    }

    pub fn health(&self) -> SourceHealth {
        SourceHealth::from_consecutive_errors(self.consecutive_errors)
    }

    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

fn mul_duration(d: Duration, factor: f64) -> Duration {
    Duration::from_secs_f64(d.as_secs_f64() * factor)
}

/// Registered source plus its queue, owned by the scheduler.
struct Registration {
    source: Arc<dyn Source>,
    queue: SourceQueue,
}

/// Polls registered sources on their adaptive schedules and forwards new
/// items into the engine intake.
pub struct FetchScheduler {
    registrations: Arc<RwLock<HashMap<String, Registration>>>,
    /// Bounds how many fetches run at once across all sources.
    fetch_permits: Arc<Semaphore>,
    intake: mpsc::Sender<Vec<Item>>,
    config: QueueConfig,
    cancel: CancellationToken,
}

/// How often the scheduler scans for due sources.
const SCHEDULER_TICK: Duration = Duration::from_secs(1);
/// How often queues are swept for expired items.
const PRUNE_EVERY: u32 = 300;

impl FetchScheduler {
    pub fn new(
        intake: mpsc::Sender<Vec<Item>>,
        max_concurrent_fetches: usize,
        config: QueueConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            registrations: Arc::new(RwLock::new(HashMap::new())),
            fetch_permits: Arc::new(Semaphore::new(max_concurrent_fetches)),
            intake,
            config,
            cancel,
        }
    }

    /// Register a source with its base poll interval. Re-registering a name
    /// replaces the source handle but keeps the existing queue state.
    pub async fn register(&self, source: Arc<dyn Source>, base_interval: Duration) {
        let mut registrations = self.registrations.write().await;
        let name = source.name().to_string();
        match registrations.get_mut(&name) {
            Some(existing) => {
                existing.source = source;
            }
            None => {
                let queue = SourceQueue::new(
                    name.clone(),
                    source.source_type(),
                    base_interval,
                    self.config.clone(),
                );
                registrations.insert(name.clone(), Registration { source, queue });
            }
        }
        info!(source = %name, "source registered");
    }

    /// Re-enable a source that was auto-disabled after repeated failures.
    /// Returns false for unknown names.
    pub async fn reenable(&self, name: &str) -> bool {
        let mut registrations = self.registrations.write().await;
        match registrations.get_mut(name) {
            Some(registration) => {
                registration.queue.reenable();
                info!(source = %name, "source re-enabled");
                true
            }
            None => false,
        }
    }

    /// Health of every source that has been polled at least once.
    pub async fn source_health(&self) -> HashMap<String, SourceHealth> {
        let registrations = self.registrations.read().await;
        registrations
            .values()
            .filter(|r| r.queue.last_polled.is_some())
            .map(|r| (r.queue.source_name.clone(), r.queue.health()))
            .collect()
    }

    /// Run a closure against the current queue set, e.g. for sampling.
    pub async fn with_queues<T>(&self, f: impl FnOnce(Vec<&SourceQueue>) -> T) -> T {
        let registrations = self.registrations.read().await;
        let mut queues: Vec<&SourceQueue> = registrations.values().map(|r| &r.queue).collect();
        queues.sort_by(|a, b| a.source_name.cmp(&b.source_name));
        f(queues)
    }

    /// Pull up to `n` items across all queues under the given fairness
    /// strategy. Queues are visited in registration-name order.
    pub async fn sample(&self, sampler: &mut dyn crate::sampler::Sampler, n: usize) -> Vec<Item> {
        self.with_queues(|queues| sampler.sample(&queues, n)).await
    }

    /// Main loop. Returns when the cancellation token fires.
    pub async fn run(&self) {
        let mut ticker = tokio::time::interval(SCHEDULER_TICK);
        let mut ticks: u32 = 0;
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    debug!("fetch scheduler stopping");
                    return;
                }
                _ = ticker.tick() => {}
            }

            ticks = ticks.wrapping_add(1);
            if ticks % PRUNE_EVERY == 0 {
                self.prune_all().await;
            }
            self.poll_due_sources().await;
        }
    }

    async fn prune_all(&self) {
        let now = Utc::now();
        let mut registrations = self.registrations.write().await;
        for registration in registrations.values_mut() {
            let removed = registration.queue.prune(now);
            if removed > 0 {
                debug!(
                    source = %registration.queue.source_name,
                    removed, "pruned expired items"
                );
            }
        }
    }

    async fn poll_due_sources(&self) {
        let now = Utc::now();
        let due: Vec<(String, Arc<dyn Source>)> = {
            let mut registrations = self.registrations.write().await;
            registrations
                .values_mut()
                .filter(|r| r.queue.should_poll(now))
                .map(|r| {
                    r.queue.mark_in_flight();
                    (r.queue.source_name.clone(), r.source.clone())
                })
                .collect()
        };

        for (name, source) in due {
            let permit = match self.fetch_permits.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return,
            };
            let registrations = self.registrations.clone();
            let intake = self.intake.clone();
            let cancel = self.cancel.clone().cancelled_owned();
            tokio::spawn(async move {
                let _permit = permit;
                let outcome = tokio::select! {
                    _ = cancel => return,
                    result = source.fetch() => result,
                };
                let now = Utc::now();
                let mut registrations = registrations.write().await;
                let Some(registration) = registrations.get_mut(&name) else {
                    return;
                };
                match outcome {
                    Ok(batch) => {
                        let new_items = registration.queue.record_fetch(batch, now);
                        debug!(
                            source = %name,
                            new = new_items.len(),
                            interval_secs = registration.queue.current_interval.as_secs(),
                            "fetch complete"
                        );
                        if !new_items.is_empty() {
                            // Non-blocking by design: a wedged engine must not
                            // stall the scheduler.
                            if let Err(err) = intake.try_send(new_items) {
                                debug!(source = %name, %err, "intake full, dropping batch");
                            }
                        }
                    }
                    Err(err) => {
                        registration.queue.record_error(now);
                        warn!(
                            source = %name,
                            consecutive = registration.queue.consecutive_errors,
                            %err,
                            "fetch failed"
                        );
                    }
                }
            });
        }
    }
}

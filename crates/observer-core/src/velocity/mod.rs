//! Per-cluster velocity tracking and spike detection.
//!
//! Every item recorded into a cluster takes a snapshot. Rates are arrival
//! counts over sliding 15 m / 1 h / 6 h windows normalized to items/hour,
//! so the three windows are comparable. Each window's baseline is the
//! expected arrival count judged from the older interval
//! `[now - 24 h, now - window)`, floored at a default of 1.0 so thin history
//! cannot make a quiet cluster look hot. A window is elevated when its
//! arrival count exceeds twice its baseline; two of three elevated windows
//! raise a spike naming the window with the highest items/hour rate.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use tokio::sync::RwLock;

use crate::models::Trend;

/// Ring capacity: 24 hours of history at 5-minute spacing.
pub const RING_CAPACITY: usize = 288;

const SPIKE_FACTOR: f64 = 2.0;

fn baseline_span() -> ChronoDuration {
    ChronoDuration::hours(24)
}

/// The sliding windows rates are computed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpikeWindow {
    FifteenMinutes,
    OneHour,
    SixHours,
}

impl SpikeWindow {
    pub fn duration(self) -> ChronoDuration {
        match self {
            SpikeWindow::FifteenMinutes => ChronoDuration::minutes(15),
            SpikeWindow::OneHour => ChronoDuration::hours(1),
            SpikeWindow::SixHours => ChronoDuration::hours(6),
        }
    }

    pub fn hours(self) -> f64 {
        match self {
            SpikeWindow::FifteenMinutes => 0.25,
            SpikeWindow::OneHour => 1.0,
            SpikeWindow::SixHours => 6.0,
        }
    }
}

impl fmt::Display for SpikeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpikeWindow::FifteenMinutes => write!(f, "15m"),
            SpikeWindow::OneHour => write!(f, "1h"),
            SpikeWindow::SixHours => write!(f, "6h"),
        }
    }
}

const WINDOWS: [SpikeWindow; 3] = [
    SpikeWindow::FifteenMinutes,
    SpikeWindow::OneHour,
    SpikeWindow::SixHours,
];

/// One point of per-cluster history. Rates are items/hour.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VelocitySnapshot {
    pub ts: DateTime<Utc>,
    pub rate_15m: f64,
    pub rate_1h: f64,
    pub rate_6h: f64,
    /// Distinct sources contributing to the cluster at snapshot time.
    pub sources: usize,
}

/// Raised when a cluster's arrival rate clears the spike condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VelocitySpike {
    pub cluster_id: String,
    pub window: SpikeWindow,
    /// Items/hour over the reported window.
    pub rate: f64,
}

struct ClusterHistory {
    snapshots: VecDeque<VelocitySnapshot>,
}

impl ClusterHistory {
    fn new() -> Self {
        Self {
            snapshots: VecDeque::with_capacity(RING_CAPACITY),
        }
    }

    fn push(&mut self, snapshot: VelocitySnapshot) {
        if self.snapshots.len() == RING_CAPACITY {
            self.snapshots.pop_front();
        }
        self.snapshots.push_back(snapshot);
    }

    fn count_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> usize {
        self.snapshots
            .iter()
            .filter(|s| s.ts >= from && s.ts < to)
            .count()
    }

    /// Arrivals inside `(now - window, now]`.
    fn count_in_window(&self, now: DateTime<Utc>, window: SpikeWindow) -> usize {
        self.snapshots
            .iter()
            .filter(|s| s.ts > now - window.duration())
            .count()
    }

    /// Items/hour inside `(now - window, now]`.
    fn rate(&self, now: DateTime<Utc>, window: SpikeWindow) -> f64 {
        self.count_in_window(now, window) as f64 / window.hours()
    }

    /// Expected arrivals per `window` judged from the older interval
    /// `[now - 24 h, now - window)`, floored at the 1.0 default.
    ///
    /// The floor matters: sampling happens at arrival instants, so a slow
    /// cluster always has one arrival in any window (the arrival itself) even
    /// though its expected count is near zero. Without the floor every quiet
    /// cluster would look elevated on the short windows.
    fn baseline_count(&self, now: DateTime<Utc>, window: SpikeWindow) -> f64 {
        let span = baseline_span();
        let from = now - span;
        let to = now - window.duration();
        let count = self.count_between(from, to);
        let hours = (span - window.duration()).num_seconds() as f64 / 3600.0;
        (count as f64 / hours * window.hours()).max(1.0)
    }
}

/// Tracks velocity for every cluster the engine has seen.
pub struct VelocityTracker {
    histories: RwLock<HashMap<String, ClusterHistory>>,
}

impl Default for VelocityTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl VelocityTracker {
    pub fn new() -> Self {
        Self {
            histories: RwLock::new(HashMap::new()),
        }
    }

    /// Record one arrival into `cluster_id` and evaluate the spike
    /// condition. `sources` is the cluster's current distinct-source count.
    pub async fn record(&self, cluster_id: &str, sources: usize) -> Option<VelocitySpike> {
        self.record_at(cluster_id, sources, Utc::now()).await
    }

    /// Timestamp-explicit variant; tests replay hours of history with it.
    pub async fn record_at(
        &self,
        cluster_id: &str,
        sources: usize,
        now: DateTime<Utc>,
    ) -> Option<VelocitySpike> {
        let mut histories = self.histories.write().await;
        let history = histories
            .entry(cluster_id.to_string())
            .or_insert_with(ClusterHistory::new);

        // The new arrival counts toward its own windows.
        history.push(VelocitySnapshot {
            ts: now,
            rate_15m: 0.0,
            rate_1h: 0.0,
            rate_6h: 0.0,
            sources,
        });

        let rates: Vec<f64> = WINDOWS.iter().map(|w| history.rate(now, *w)).collect();
        if let Some(last) = history.snapshots.back_mut() {
            last.rate_15m = rates[0];
            last.rate_1h = rates[1];
            last.rate_6h = rates[2];
        }

        let elevated: Vec<(SpikeWindow, f64)> = WINDOWS
            .iter()
            .zip(&rates)
            .filter(|(w, _)| {
                let count = history.count_in_window(now, **w) as f64;
                count > SPIKE_FACTOR * history.baseline_count(now, **w)
            })
            .map(|(w, rate)| (*w, *rate))
            .collect();

        if elevated.len() < 2 {
            return None;
        }
        elevated
            .into_iter()
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(window, rate)| VelocitySpike {
                cluster_id: cluster_id.to_string(),
                window,
                rate,
            })
    }

    /// Current 1 h rate; 0 for unknown clusters. Used to order the active
    /// cluster list.
    pub async fn current_rate(&self, cluster_id: &str) -> f64 {
        let histories = self.histories.read().await;
        histories
            .get(cluster_id)
            .map_or(0.0, |h| h.rate(Utc::now(), SpikeWindow::OneHour))
    }

    /// One consistent snapshot of every tracked cluster's 1 h rate.
    pub async fn current_rates(&self) -> HashMap<String, f64> {
        let now = Utc::now();
        let histories = self.histories.read().await;
        histories
            .iter()
            .map(|(id, h)| (id.clone(), h.rate(now, SpikeWindow::OneHour)))
            .collect()
    }

    pub async fn trend(&self, cluster_id: &str) -> Trend {
        Trend::from_rate(self.current_rate(cluster_id).await)
    }

    /// The last `points` snapshots' 1 h rates, normalized to [0, 1] by their
    /// own maximum. Empty history yields an empty sparkline.
    pub async fn sparkline(&self, cluster_id: &str, points: usize) -> Vec<f64> {
        let histories = self.histories.read().await;
        let Some(history) = histories.get(cluster_id) else {
            return Vec::new();
        };
        let rates: Vec<f64> = history
            .snapshots
            .iter()
            .rev()
            .take(points)
            .rev()
            .map(|s| s.rate_1h)
            .collect();
        let max = rates.iter().cloned().fold(0.0f64, f64::max);
        if max <= 0.0 {
            return vec![0.0; rates.len()];
        }
        rates.into_iter().map(|r| r / max).collect()
    }

    pub async fn snapshots(&self, cluster_id: &str) -> Vec<VelocitySnapshot> {
        let histories = self.histories.read().await;
        histories
            .get(cluster_id)
            .map(|h| h.snapshots.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Drop histories for clusters that no longer exist.
    pub async fn prune(&self, cluster_ids: &[String]) {
        if cluster_ids.is_empty() {
            return;
        }
        let mut histories = self.histories.write().await;
        for cluster_id in cluster_ids {
            histories.remove(cluster_id);
        }
    }

    pub async fn tracked_clusters(&self) -> usize {
        self.histories.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    #[tokio::test]
    async fn test_steady_rate_does_not_spike() {
        let tracker = VelocityTracker::new();
        let start = t0();
        // One item per hour for 24 hours.
        for hour in 0..24 {
            let spike = tracker
                .record_at("c", 1, start + ChronoDuration::hours(hour))
                .await;
            assert!(spike.is_none(), "hour {hour} spiked");
        }
    }

    #[tokio::test]
    async fn test_burst_after_baseline_spikes_on_hottest_window() {
        let tracker = VelocityTracker::new();
        let start = t0();
        for hour in 0..24 {
            tracker
                .record_at("c", 1, start + ChronoDuration::hours(hour))
                .await;
        }

        // Burst: 10 items inside 12 minutes.
        let burst_start = start + ChronoDuration::hours(24);
        let mut spike = None;
        for i in 0..10 {
            spike = tracker
                .record_at("c", 3, burst_start + ChronoDuration::seconds(i * 80))
                .await;
        }

        let spike = spike.expect("burst must raise a spike");
        assert_eq!(spike.cluster_id, "c");
        // 40/h over 15 minutes beats 10/h over the hour: the short window is
        // the hottest and gets reported.
        assert_eq!(spike.window, SpikeWindow::FifteenMinutes);
        assert_eq!(spike.window.to_string(), "15m");
        assert!(spike.rate > 20.0, "rate = {}", spike.rate);
    }

    #[tokio::test]
    async fn test_spike_requires_two_of_three_windows() {
        let tracker = VelocityTracker::new();
        let start = t0();
        // Dense history in the 6h window only: every 10 minutes for 6 hours,
        // then quiet. The 6h window alone being busy must not spike.
        for i in 0..36 {
            tracker
                .record_at("c", 1, start + ChronoDuration::minutes(i * 10))
                .await;
        }
        // A single straggler two hours later: 15m and 1h rates are tiny.
        let spike = tracker
            .record_at("c", 1, start + ChronoDuration::hours(8))
            .await;
        assert!(spike.is_none());
    }

    #[tokio::test]
    async fn test_first_items_do_not_spike_against_default_baseline() {
        let tracker = VelocityTracker::new();
        let start = t0();
        // A brand-new cluster getting 2 quick items: rates small, baseline
        // defaults to 1.0/h.
        let s1 = tracker.record_at("c", 1, start).await;
        let s2 = tracker
            .record_at("c", 2, start + ChronoDuration::minutes(1))
            .await;
        assert!(s1.is_none());
        // Two arrivals in every window, each baseline floored at 1.0:
        // 2 > 2.0 fails everywhere.
        assert!(s2.is_none());
    }

    #[tokio::test]
    async fn test_ring_capacity_overwrites_oldest() {
        let tracker = VelocityTracker::new();
        let start = t0();
        for i in 0..(RING_CAPACITY + 50) {
            tracker
                .record_at("c", 1, start + ChronoDuration::seconds(i as i64))
                .await;
        }
        let snapshots = tracker.snapshots("c").await;
        assert_eq!(snapshots.len(), RING_CAPACITY);
        // The oldest snapshots are gone.
        assert_eq!(snapshots[0].ts, start + ChronoDuration::seconds(50));
    }

    #[tokio::test]
    async fn test_sparkline_normalized_to_own_max() {
        let tracker = VelocityTracker::new();
        let start = t0();
        for i in 0..5 {
            tracker
                .record_at("c", 1, start + ChronoDuration::minutes(i * 10))
                .await;
        }
        let sparkline = tracker.sparkline("c", 3).await;
        assert_eq!(sparkline.len(), 3);
        assert!((sparkline.last().unwrap() - 1.0).abs() < 1e-9, "last point is the max");
        assert!(sparkline.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[tokio::test]
    async fn test_sparkline_unknown_cluster_empty() {
        let tracker = VelocityTracker::new();
        assert!(tracker.sparkline("nope", 10).await.is_empty());
    }

    #[tokio::test]
    async fn test_prune_removes_history() {
        let tracker = VelocityTracker::new();
        tracker.record_at("c", 1, t0()).await;
        assert_eq!(tracker.tracked_clusters().await, 1);
        tracker.prune(&["c".to_string()]).await;
        assert_eq!(tracker.tracked_clusters().await, 0);
    }
}

//! Liveness classification
//!
//! A vehicle is offline when `now - last_updated > threshold` (strictly greater, so a
//! vehicle exactly at the threshold is still online). A `last_updated` of 0 means the
//! vehicle never reported. Every consumer shares one `LivenessPolicy`, which bundles the
//! threshold with the clock it is measured against.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Source of wall-clock time in epoch millis.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Clock that only moves when told to.
#[derive(Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(now_ms: i64) -> Self {
        Self {
            now: AtomicI64::new(now_ms),
        }
    }

    pub fn set(&self, now_ms: i64) {
        self.now.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.as_millis() as i64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Liveness {
    Online,
    Offline,
}

impl Liveness {
    pub fn as_str(&self) -> &'static str {
        match self {
            Liveness::Online => "online",
            Liveness::Offline => "offline",
        }
    }
}

/// `true` when the gap between `now_ms` and `last_updated_ms` exceeds `threshold_ms`.
pub fn is_offline(last_updated_ms: i64, now_ms: i64, threshold_ms: i64) -> bool {
    now_ms.saturating_sub(last_updated_ms) > threshold_ms
}

#[derive(Clone)]
pub struct LivenessPolicy {
    threshold: Duration,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for LivenessPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LivenessPolicy")
            .field("threshold", &self.threshold)
            .finish()
    }
}

impl LivenessPolicy {
    pub fn new(threshold: Duration, clock: Arc<dyn Clock>) -> Self {
        Self { threshold, clock }
    }

    /// Policy measured against the system clock.
    pub fn system(threshold: Duration) -> Self {
        Self::new(threshold, Arc::new(SystemClock))
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    pub fn threshold_ms(&self) -> i64 {
        self.threshold.as_millis() as i64
    }

    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    pub fn classify_at(&self, last_updated_ms: i64, now_ms: i64) -> Liveness {
        if is_offline(last_updated_ms, now_ms, self.threshold_ms()) {
            Liveness::Offline
        } else {
            Liveness::Online
        }
    }

    pub fn classify(&self, last_updated_ms: i64) -> Liveness {
        self.classify_at(last_updated_ms, self.now_ms())
    }
}

/// A vehicle whose classification changed between two evaluations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LivenessChange {
    pub truck_id: String,
    pub from: Option<Liveness>,
    pub to: Liveness,
}

#[derive(Debug, Clone)]
struct Entry {
    last_updated_ms: i64,
    state: Option<Liveness>,
}

/// Last-seen timestamps per vehicle plus the classification from the previous evaluation.
#[derive(Debug, Clone)]
pub struct LivenessTracker {
    policy: LivenessPolicy,
    entries: HashMap<String, Entry>,
}

impl LivenessTracker {
    pub fn new(policy: LivenessPolicy) -> Self {
        Self {
            policy,
            entries: HashMap::new(),
        }
    }

    pub fn policy(&self) -> &LivenessPolicy {
        &self.policy
    }

    /// Start tracking a vehicle that has not reported yet.
    pub fn watch(&mut self, truck_id: &str) {
        self.entries.entry(truck_id.to_string()).or_insert(Entry {
            last_updated_ms: 0,
            state: None,
        });
    }

    /// Record a report. Older timestamps never move the heartbeat backwards.
    pub fn record(&mut self, truck_id: &str, last_updated_ms: i64) {
        let entry = self.entries.entry(truck_id.to_string()).or_insert(Entry {
            last_updated_ms: 0,
            state: None,
        });
        if last_updated_ms > entry.last_updated_ms {
            entry.last_updated_ms = last_updated_ms;
        }
    }

    /// Re-classify every vehicle at `now_ms` and return the ones that changed.
    pub fn evaluate_at(&mut self, now_ms: i64) -> Vec<LivenessChange> {
        let mut changes = Vec::new();
        for (truck_id, entry) in self.entries.iter_mut() {
            let next = self.policy.classify_at(entry.last_updated_ms, now_ms);
            if entry.state != Some(next) {
                match next {
                    Liveness::Offline => warn!(
                        "Liveness: {} went offline (last update {} ms ago, threshold {} ms)",
                        truck_id,
                        now_ms.saturating_sub(entry.last_updated_ms),
                        self.policy.threshold_ms()
                    ),
                    Liveness::Online => info!("Liveness: {} is online", truck_id),
                }
                changes.push(LivenessChange {
                    truck_id: truck_id.clone(),
                    from: entry.state,
                    to: next,
                });
                entry.state = Some(next);
            }
        }
        changes.sort_by(|a, b| a.truck_id.cmp(&b.truck_id));
        changes
    }

    pub fn evaluate(&mut self) -> Vec<LivenessChange> {
        let now = self.policy.now_ms();
        self.evaluate_at(now)
    }

    /// Classification as of the last evaluation.
    pub fn state(&self, truck_id: &str) -> Option<Liveness> {
        self.entries.get(truck_id).and_then(|e| e.state)
    }

    pub fn last_updated_ms(&self, truck_id: &str) -> Option<i64> {
        self.entries.get(truck_id).map(|e| e.last_updated_ms)
    }

    /// Tracked vehicle ids, sorted.
    pub fn truck_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.entries.keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy_with(clock: Arc<ManualClock>) -> LivenessPolicy {
        LivenessPolicy::new(Duration::from_millis(20_000), clock)
    }

    #[test]
    fn test_threshold_boundary_is_online() {
        assert!(!is_offline(0, 20_000, 20_000));
        assert!(is_offline(0, 20_001, 20_000));
        assert!(!is_offline(10_000, 5_000, 20_000));
    }

    #[test]
    fn test_never_seen_vehicle_goes_offline_after_threshold() {
        let clock = Arc::new(ManualClock::new(19_000));
        let policy = policy_with(clock.clone());
        assert_eq!(policy.classify(0), Liveness::Online);
        clock.set(21_000);
        assert_eq!(policy.classify(0), Liveness::Offline);
    }

    #[test]
    fn test_tracker_reports_transitions_once() {
        let clock = Arc::new(ManualClock::new(1_000));
        let mut tracker = LivenessTracker::new(policy_with(clock.clone()));
        tracker.record("GJ-01-LIVE", 1_000);

        let first = tracker.evaluate();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].to, Liveness::Online);
        assert!(tracker.evaluate().is_empty());

        clock.advance(Duration::from_millis(25_000));
        let changes = tracker.evaluate();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].from, Some(Liveness::Online));
        assert_eq!(changes[0].to, Liveness::Offline);
        assert_eq!(tracker.state("GJ-01-LIVE"), Some(Liveness::Offline));

        tracker.record("GJ-01-LIVE", clock.now_ms());
        let back = tracker.evaluate();
        assert_eq!(back[0].to, Liveness::Online);
    }

    #[test]
    fn test_record_ignores_older_timestamps() {
        let clock = Arc::new(ManualClock::new(0));
        let mut tracker = LivenessTracker::new(policy_with(clock));
        tracker.record("A", 5_000);
        tracker.record("A", 3_000);
        assert_eq!(tracker.last_updated_ms("A"), Some(5_000));
    }

    #[test]
    fn test_watched_vehicle_starts_unseen() {
        let clock = Arc::new(ManualClock::new(30_000));
        let mut tracker = LivenessTracker::new(policy_with(clock));
        tracker.watch("MH-12-9988");
        let changes = tracker.evaluate();
        assert_eq!(changes[0].to, Liveness::Offline);
        assert_eq!(changes[0].from, None);
    }
}

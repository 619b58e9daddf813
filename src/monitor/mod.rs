//! Fleet monitor
//!
//! Owns the liveness tracker and the notification center. Snapshots and timer ticks feed it;
//! it returns the alerts raised by each event so the caller can dispatch them.
//!
//! `run_watch` is the long-running loop: snapshot fetches and liveness polls on two
//! intervals, stopped through a cancellation token.

use crate::alerts::channels::{AlertChannel, EmailJsChannel, LogChannel};
use crate::alerts::delivery::{persist_dead_letters, DeliveryQueue, RetryPolicy};
use crate::alerts::dispatcher::AlertDispatcher;
use crate::alerts::rules::{connection_alert, evaluate_vehicle, AlertContext, SensorThresholds};
use crate::alerts::{Notification, NotificationCenter};
use crate::config::{Config, Settings};
use crate::liveness::{Clock, Liveness, LivenessPolicy, LivenessTracker, SystemClock};
use crate::store::StateStore;
use crate::telemetry::source::SnapshotSource;
use crate::telemetry::{Snapshot, VehicleTelemetry};
use anyhow::Result;
use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VehicleStatus {
    pub truck_id: String,
    pub liveness: Liveness,
    pub last_updated_ms: i64,
    /// Milliseconds since the last report; `None` if it never reported.
    pub age_ms: Option<i64>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub shock: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FleetStatus {
    pub generated_at: DateTime<Utc>,
    pub vehicles: Vec<VehicleStatus>,
    pub online: usize,
    pub offline: usize,
}

pub struct FleetMonitor {
    tracker: LivenessTracker,
    thresholds: SensorThresholds,
    tracked: BTreeSet<String>,
    center: NotificationCenter,
    latest: HashMap<String, VehicleTelemetry>,
}

impl FleetMonitor {
    /// An empty `tracked` list means every vehicle in the collection.
    pub fn new(policy: LivenessPolicy, thresholds: SensorThresholds, tracked: Vec<String>) -> Self {
        let mut tracker = LivenessTracker::new(policy);
        for id in &tracked {
            tracker.watch(id);
        }
        Self {
            tracker,
            thresholds,
            tracked: tracked.into_iter().collect(),
            center: NotificationCenter::new(),
            latest: HashMap::new(),
        }
    }

    pub fn from_settings(settings: &Settings, clock: Arc<dyn Clock>) -> Self {
        let policy = LivenessPolicy::new(Duration::from_millis(settings.liveness.threshold_ms), clock);
        Self::new(
            policy,
            settings.thresholds.clone(),
            settings.tracked_vehicles.clone(),
        )
    }

    pub fn is_tracked(&self, truck_id: &str) -> bool {
        self.tracked.is_empty() || self.tracked.contains(truck_id)
    }

    fn now(&self) -> (i64, DateTime<Utc>) {
        let now_ms = self.tracker.policy().now_ms();
        let now = Utc
            .timestamp_millis_opt(now_ms)
            .single()
            .unwrap_or_else(Utc::now);
        (now_ms, now)
    }

    /// Record a snapshot and evaluate every tracked vehicle in it. Tracked vehicles missing
    /// from the snapshot only raise a connection alert when they go offline.
    pub fn on_snapshot(&mut self, snapshot: &Snapshot) -> Vec<Notification> {
        let mut present: BTreeSet<String> = BTreeSet::new();
        for vehicle in &snapshot.vehicles {
            if !self.is_tracked(&vehicle.truck_id) {
                continue;
            }
            self.tracker.record(&vehicle.truck_id, vehicle.last_updated_ms);
            self.latest.insert(vehicle.truck_id.clone(), vehicle.clone());
            present.insert(vehicle.truck_id.clone());
        }

        let (now_ms, now) = self.now();
        let changes = self.tracker.evaluate_at(now_ms);

        let mut alerts = Vec::new();
        for truck_id in &present {
            let Some(vehicle) = self.latest.get(truck_id) else {
                continue;
            };
            let liveness = self
                .tracker
                .state(truck_id)
                .unwrap_or_else(|| self.tracker.policy().classify_at(vehicle.last_updated_ms, now_ms));
            let context = AlertContext {
                vehicle,
                liveness,
                now,
            };
            alerts.extend(evaluate_vehicle(&self.thresholds, &context));
        }
        for change in changes {
            if change.to == Liveness::Offline && !present.contains(&change.truck_id) {
                alerts.push(connection_alert(&change.truck_id, now));
            }
        }

        debug!(
            "Monitor: snapshot with {} vehicles ({} tracked) raised {} alert(s)",
            snapshot.vehicles.len(),
            present.len(),
            alerts.len()
        );
        self.center.merge(alerts.clone());
        alerts
    }

    /// Re-evaluate liveness without new data. Vehicles that just went offline raise a
    /// connection alert.
    pub fn on_tick(&mut self) -> Vec<Notification> {
        let (now_ms, now) = self.now();
        let alerts: Vec<Notification> = self
            .tracker
            .evaluate_at(now_ms)
            .into_iter()
            .filter(|c| c.to == Liveness::Offline)
            .map(|c| connection_alert(&c.truck_id, now))
            .collect();
        if !alerts.is_empty() {
            self.center.merge(alerts.clone());
        }
        alerts
    }

    pub fn fleet_status(&self) -> FleetStatus {
        let (now_ms, now) = self.now();
        let policy = self.tracker.policy();
        let vehicles: Vec<VehicleStatus> = self
            .tracker
            .truck_ids()
            .into_iter()
            .map(|truck_id| {
                let last = self.tracker.last_updated_ms(&truck_id).unwrap_or(0);
                let latest = self.latest.get(&truck_id);
                VehicleStatus {
                    liveness: policy.classify_at(last, now_ms),
                    last_updated_ms: last,
                    age_ms: (last > 0).then(|| now_ms.saturating_sub(last)),
                    temperature: latest.and_then(|v| v.temperature),
                    humidity: latest.and_then(|v| v.humidity),
                    shock: latest.and_then(|v| v.shock),
                    truck_id,
                }
            })
            .collect();
        let online = vehicles.iter().filter(|v| v.liveness == Liveness::Online).count();
        FleetStatus {
            generated_at: now,
            offline: vehicles.len() - online,
            online,
            vehicles,
        }
    }

    pub fn center(&self) -> &NotificationCenter {
        &self.center
    }

    pub fn center_mut(&mut self) -> &mut NotificationCenter {
        &mut self.center
    }
}

/// Log channel always, e-mail when enabled.
pub fn build_channels(settings: &Settings) -> Vec<Box<dyn AlertChannel>> {
    let mut channels: Vec<Box<dyn AlertChannel>> = vec![Box::new(LogChannel::new())];
    if settings.email.enabled {
        let email = EmailJsChannel::from_settings(&settings.email);
        if !email.is_configured() {
            warn!("Monitor: e-mail alerts enabled but EmailJS keys are missing; they will be skipped");
        }
        channels.push(Box::new(email));
    }
    channels
}

pub fn build_dispatcher(settings: &Settings) -> AlertDispatcher {
    let queue = DeliveryQueue::start(
        build_channels(settings),
        RetryPolicy::from(&settings.delivery),
        settings.delivery.queue_capacity,
    );
    AlertDispatcher::new(
        StateStore::load(Config::state_file_path()),
        queue,
        settings.email.default_recipient.clone(),
    )
}

fn dispatch(dispatcher: &mut AlertDispatcher, alerts: &[Notification]) {
    if alerts.is_empty() && dispatcher.pending_len() == 0 {
        return;
    }
    if let Err(e) = dispatcher.dispatch(alerts) {
        warn!("Monitor: failed to dispatch alerts: {:#}", e);
    }
}

fn finish(mut dispatcher: AlertDispatcher) {
    let dead = dispatcher.shutdown();
    if !dead.is_empty() {
        warn!("Monitor: {} alert(s) could not be delivered", dead.len());
        if let Err(e) = persist_dead_letters(&Config::dead_letter_file_path(), &dead) {
            warn!("Monitor: {:#}", e);
        }
    }
}

/// Fetch one snapshot, evaluate and dispatch it, then drain the delivery queue.
pub async fn run_once(settings: &Settings) -> Result<FleetMonitor> {
    let mut source = SnapshotSource::from_settings(&settings.source)?;
    let mut monitor = FleetMonitor::from_settings(settings, Arc::new(SystemClock));
    let mut dispatcher = build_dispatcher(settings);
    let snapshot = source.snapshot_now().await?;
    let alerts = monitor.on_snapshot(&snapshot);
    dispatch(&mut dispatcher, &alerts);
    finish(dispatcher);
    Ok(monitor)
}

/// Run until `cancel` fires. Fetch errors are logged and the liveness poll keeps running,
/// so vehicles go offline instead of staying stale.
pub async fn run_watch(settings: &Settings, cancel: CancellationToken) -> Result<()> {
    let mut source = SnapshotSource::from_settings(&settings.source)?;
    let mut monitor = FleetMonitor::from_settings(settings, Arc::new(SystemClock));
    let mut dispatcher = build_dispatcher(settings);

    info!(
        "Monitor: watching (threshold {} ms, poll {} ms, fetch {} ms)",
        settings.liveness.threshold_ms, settings.liveness.poll_interval_ms, settings.source.fetch_interval_ms
    );
    watch_loop(
        &mut source,
        &mut monitor,
        &mut dispatcher,
        Duration::from_millis(settings.source.fetch_interval_ms),
        Duration::from_millis(settings.liveness.poll_interval_ms),
        cancel,
    )
    .await;

    let status = monitor.fleet_status();
    info!(
        "Monitor: final status {} online, {} offline, {} notification(s)",
        status.online,
        status.offline,
        monitor.center().len()
    );
    finish(dispatcher);
    Ok(())
}

/// Snapshot fetches every `fetch_every`, liveness polls every `poll_every`, until cancelled.
pub async fn watch_loop(
    source: &mut SnapshotSource,
    monitor: &mut FleetMonitor,
    dispatcher: &mut AlertDispatcher,
    fetch_every: Duration,
    poll_every: Duration,
    cancel: CancellationToken,
) {
    let mut fetch = tokio::time::interval(fetch_every.max(Duration::from_millis(1)));
    fetch.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut poll = tokio::time::interval(poll_every.max(Duration::from_millis(1)));
    poll.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Monitor: stopping");
                break;
            }
            _ = fetch.tick() => {
                match source.next_snapshot().await {
                    Ok(Some(snapshot)) => {
                        let alerts = monitor.on_snapshot(&snapshot);
                        dispatch(dispatcher, &alerts);
                    }
                    Ok(None) => {}
                    Err(e) => warn!("Monitor: snapshot fetch failed: {:#}", e),
                }
            }
            _ = poll.tick() => {
                let alerts = monitor.on_tick();
                dispatch(dispatcher, &alerts);
            }
        }
    }
}

//! Poll coordinator
//!
//! Owns the authoritative in-memory vehicle map and drives the
//! fetch-normalize-store cycle: `Idle -> Fetching -> {Success, Failure} ->
//! Idle`, repeating on a timer. Each successful cycle builds a complete new
//! snapshot and swaps it in, so concurrent readers always observe a
//! consistent state. Failures advance a capped exponential backoff; an
//! upstream throttle hint overrides the computed delay.
//!
//! `run_once` drives exactly one cycle and is the unit tests build on; the
//! timer loop in [`PollCoordinator::start`] is a thin wrapper around it.

use crate::backoff::Backoff;
use crate::client::VehicleSource;
use crate::config::PollerConfig;
use crate::history::HistoryStore;
use crate::normalize::Normalizer;
use crate::publish::VehicleSink;
use crate::types::{HistoryPoint, Result, Timestamp, TrackerError, VehicleState};
use crate::zones::ZoneDirectory;
use chrono::Utc;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Immutable view of all vehicles, replaced wholesale each cycle
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    /// When the snapshot was taken
    pub taken_at: Timestamp,
    /// Current state per vehicle id
    pub vehicles: HashMap<String, VehicleState>,
}

impl Snapshot {
    fn empty(now: Timestamp) -> Self {
        Self {
            taken_at: now,
            vehicles: HashMap::new(),
        }
    }
}

/// Diagnostic summary of the poll loop
#[derive(Debug, Clone, Default, Serialize)]
pub struct PollHealth {
    /// When the last cycle finished, successful or not
    pub last_poll: Option<Timestamp>,
    /// When the last successful cycle finished
    pub last_success: Option<Timestamp>,
    /// Error text from the most recent failure, cleared on success
    pub last_error: Option<String>,
    /// Failed cycles since the last success
    pub consecutive_failures: u32,
    /// Total cycles attempted
    pub cycles: u64,
    /// Records dropped as malformed in the last successful cycle
    pub skipped_last_cycle: usize,
    /// Records dropped as malformed since startup
    pub skipped_total: u64,
}

/// Result of one poll cycle
#[derive(Debug)]
pub enum PollOutcome {
    /// Cycle fetched and stored a new snapshot
    Success { vehicles: usize, skipped: usize },
    /// Cycle failed; backoff advanced
    Failure { error: TrackerError },
    /// A previous fetch was still in flight; nothing was done
    Skipped,
}

/// Drives the fetch-normalize-store cycle against a [`VehicleSource`]
pub struct PollCoordinator {
    source: Arc<dyn VehicleSource>,
    sink: Arc<dyn VehicleSink>,
    config: PollerConfig,
    normalizer: Normalizer,
    snapshot: RwLock<Arc<Snapshot>>,
    histories: Mutex<HistoryStore>,
    zones: Mutex<ZoneDirectory>,
    backoff: Mutex<Backoff>,
    health: Mutex<PollHealth>,
    not_before: Mutex<Option<Timestamp>>,
    seen: Mutex<HashSet<String>>,
    in_flight: AtomicBool,
    started_at: Timestamp,
}

impl PollCoordinator {
    /// Create a coordinator; fails fast on invalid configuration.
    pub fn new(
        source: Arc<dyn VehicleSource>,
        sink: Arc<dyn VehicleSink>,
        config: PollerConfig,
    ) -> Result<Arc<Self>> {
        config.validate()?;
        let now = Utc::now();
        let backoff = Backoff::new(
            config.poll_interval(),
            config.backoff_max(),
            config.backoff_reset_successes,
        );
        Ok(Arc::new(Self {
            source,
            sink,
            normalizer: Normalizer::new(&config),
            snapshot: RwLock::new(Arc::new(Snapshot::empty(now))),
            histories: Mutex::new(HistoryStore::new(config.history_retention_minutes)),
            zones: Mutex::new(ZoneDirectory::new(config.zone_cache_ttl())),
            backoff: Mutex::new(backoff),
            health: Mutex::new(PollHealth::default()),
            not_before: Mutex::new(None),
            seen: Mutex::new(HashSet::new()),
            in_flight: AtomicBool::new(false),
            started_at: now,
            config,
        }))
    }

    /// Current snapshot; cheap to clone, never partially updated
    pub fn snapshot(&self) -> Arc<Snapshot> {
        read_lock(&self.snapshot).clone()
    }

    /// Current state of one vehicle
    pub fn vehicle(&self, vehicle_id: &str) -> Option<VehicleState> {
        self.snapshot().vehicles.get(vehicle_id).cloned()
    }

    /// Retained history of one vehicle, oldest first; `None` if never seen
    pub fn history(&self, vehicle_id: &str) -> Option<Vec<HistoryPoint>> {
        lock(&self.histories).points(vehicle_id)
    }

    /// Diagnostic summary of the loop
    pub fn health(&self) -> PollHealth {
        lock(&self.health).clone()
    }

    /// When this coordinator was created
    pub fn started_at(&self) -> Timestamp {
        self.started_at
    }

    /// The configuration the coordinator runs with
    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    /// Delay until the next cycle should start
    pub fn current_delay(&self) -> Duration {
        self.delay_from(Utc::now())
    }

    fn delay_from(&self, now: Timestamp) -> Duration {
        if let Some(at) = *lock(&self.not_before) {
            if at > now {
                if let Ok(delay) = (at - now).to_std() {
                    return delay;
                }
            }
        }
        lock(&self.backoff).delay()
    }

    /// Drive exactly one poll cycle.
    ///
    /// Returns [`PollOutcome::Skipped`] without touching the network when a
    /// previous fetch is still in flight - cycles never overlap, even when a
    /// fetch outlasts the poll interval.
    pub async fn run_once(&self) -> PollOutcome {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            log::debug!("previous fetch still in flight; skipping this cycle");
            return PollOutcome::Skipped;
        }
        let outcome = self.cycle().await;
        self.in_flight.store(false, Ordering::SeqCst);
        outcome
    }

    async fn cycle(&self) -> PollOutcome {
        log::debug!("poll cycle started");
        let fetch = self.source.fetch_vehicles(self.config.minutes_window);
        let fetched = match tokio::time::timeout(self.config.fetch_timeout(), fetch).await {
            Ok(result) => result,
            Err(_) => Err(TrackerError::Network(format!(
                "fetch exceeded the {}s timeout",
                self.config.fetch_timeout_secs
            ))),
        };

        let now = Utc::now();
        match fetched {
            Ok(records) => {
                let batch = self.normalizer.normalize_batch(&records, now);
                let mut vehicles = batch.vehicles;
                self.resolve_zones(&mut vehicles, now).await;
                self.store_success(vehicles, batch.skipped, now)
            }
            Err(error) => self.record_failure(error, now),
        }
    }

    /// Fill in zone display names, refreshing the directory when stale.
    ///
    /// A failed refresh keeps the stale mapping and never fails the cycle.
    async fn resolve_zones(&self, vehicles: &mut [VehicleState], now: Timestamp) {
        let needs_zones = vehicles.iter().any(|v| !v.zone_ids.is_empty());
        if !needs_zones {
            return;
        }

        if !lock(&self.zones).is_fresh(now) {
            let fetch = self.source.fetch_zones();
            match tokio::time::timeout(self.config.fetch_timeout(), fetch).await {
                Ok(Ok(zones)) => lock(&self.zones).update(zones, now),
                Ok(Err(error)) => {
                    log::warn!("zone refresh failed, keeping stale names: {error}");
                }
                Err(_) => log::warn!("zone refresh timed out, keeping stale names"),
            }
        }

        let directory = lock(&self.zones);
        for vehicle in vehicles.iter_mut() {
            if vehicle.zone_ids.is_empty() {
                continue;
            }
            vehicle.zone_names = directory.names_for(&vehicle.zone_ids);
            vehicle.zone_state = directory.state_for(&vehicle.zone_ids);
        }
    }

    fn store_success(
        &self,
        vehicles: Vec<VehicleState>,
        skipped: usize,
        now: Timestamp,
    ) -> PollOutcome {
        {
            let mut histories = lock(&self.histories);
            for vehicle in &vehicles {
                histories.record(&vehicle.id, vehicle.history_point());
            }
            histories.prune_all(now);
        }

        let map: HashMap<String, VehicleState> = vehicles
            .into_iter()
            .map(|vehicle| (vehicle.id.clone(), vehicle))
            .collect();
        let count = map.len();
        let snapshot = Arc::new(Snapshot {
            taken_at: now,
            vehicles: map,
        });
        *write_lock(&self.snapshot) = Arc::clone(&snapshot);

        // First-sight registration happens at most once per identifier.
        let new_ids: Vec<String> = {
            let mut seen = lock(&self.seen);
            snapshot
                .vehicles
                .keys()
                .filter(|id| seen.insert((*id).clone()))
                .cloned()
                .collect()
        };
        for (id, vehicle) in &snapshot.vehicles {
            if new_ids.iter().any(|new_id| new_id == id) {
                log::info!("registering new vehicle {} ({})", vehicle.name, id);
                self.sink.vehicle_registered(vehicle);
            } else {
                self.sink.vehicle_updated(vehicle);
            }
        }

        lock(&self.backoff).on_success();
        *lock(&self.not_before) = None;
        {
            let mut health = lock(&self.health);
            health.last_poll = Some(now);
            health.last_success = Some(now);
            health.last_error = None;
            health.consecutive_failures = 0;
            health.cycles += 1;
            health.skipped_last_cycle = skipped;
            health.skipped_total += skipped as u64;
        }

        log::info!("poll cycle complete: {count} vehicles, {skipped} skipped");
        PollOutcome::Success {
            vehicles: count,
            skipped,
        }
    }

    fn record_failure(&self, error: TrackerError, now: Timestamp) -> PollOutcome {
        lock(&self.backoff).on_failure();

        *lock(&self.not_before) = match &error {
            TrackerError::Throttled {
                retry_after: Some(hint),
            } => chrono::Duration::from_std(*hint)
                .ok()
                .map(|hint| now + hint),
            _ => None,
        };

        {
            let mut health = lock(&self.health);
            health.last_poll = Some(now);
            health.last_error = Some(error.to_string());
            health.consecutive_failures += 1;
            health.cycles += 1;
        }

        log::warn!(
            "poll cycle failed: {error}; next attempt in {}s",
            self.delay_from(now).as_secs()
        );
        PollOutcome::Failure { error }
    }

    /// Spawn the timer loop. One cycle runs immediately, then the loop
    /// sleeps for [`PollCoordinator::current_delay`] between cycles.
    pub fn start(self: &Arc<Self>) -> PollerHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let coordinator = Arc::clone(self);
        let task = tokio::spawn(async move {
            log::info!(
                "poller started: {}s base interval, {}min history",
                coordinator.config.poll_interval_secs,
                coordinator.config.history_retention_minutes
            );
            loop {
                coordinator.run_once().await;
                let delay = coordinator.current_delay();
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = shutdown_rx.changed() => {
                        log::debug!("poller shutdown signal received");
                        break;
                    }
                }
            }
        });
        PollerHandle { shutdown_tx, task }
    }
}

/// Handle to a running poll loop
pub struct PollerHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl PollerHandle {
    /// Stop the loop. An in-flight cycle may finish within the grace
    /// period; after that the task is abandoned.
    pub async fn stop(mut self, grace: Duration) {
        let _ = self.shutdown_tx.send(true);
        if tokio::time::timeout(grace, &mut self.task).await.is_err() {
            log::warn!("poller did not stop within the grace period; aborting");
            self.task.abort();
        }
        log::info!("poller stopped");
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read_lock<T>(rwlock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    rwlock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write_lock<T>(rwlock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    rwlock.write().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Zone;
    use crate::publish::NullSink;
    use async_trait::async_trait;
    use serde_json::{json, Map, Value};
    use std::collections::VecDeque;

    /// Scripted source: hands out queued responses, then repeats the last
    struct StubSource {
        responses: Mutex<VecDeque<Result<Vec<Map<String, Value>>>>>,
        zones: Vec<Zone>,
        zone_calls: std::sync::atomic::AtomicUsize,
    }

    impl StubSource {
        fn new(responses: Vec<Result<Vec<Map<String, Value>>>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                zones: Vec::new(),
                zone_calls: std::sync::atomic::AtomicUsize::new(0),
            })
        }

        fn with_zones(mut responses: Vec<Result<Vec<Map<String, Value>>>>, zones: Vec<Zone>) -> Arc<Self> {
            let source = Self {
                responses: Mutex::new(responses.drain(..).collect()),
                zones,
                zone_calls: std::sync::atomic::AtomicUsize::new(0),
            };
            Arc::new(source)
        }
    }

    #[async_trait]
    impl VehicleSource for StubSource {
        async fn fetch_vehicles(&self, _window_minutes: u32) -> Result<Vec<Map<String, Value>>> {
            lock(&self.responses)
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()))
        }

        async fn fetch_zones(&self) -> Result<Vec<Zone>> {
            self.zone_calls
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(self.zones.clone())
        }
    }

    fn record(value: Value) -> Map<String, Value> {
        value.as_object().expect("record must be an object").clone()
    }

    fn config() -> PollerConfig {
        PollerConfig::new()
            .with_poll_interval_secs(30)
            .with_fetch_timeout_secs(5)
    }

    fn coordinator(source: Arc<StubSource>) -> Arc<PollCoordinator> {
        PollCoordinator::new(source, Arc::new(NullSink), config()).expect("valid config")
    }

    #[tokio::test]
    async fn test_successful_cycle_swaps_snapshot() {
        let source = StubSource::new(vec![Ok(vec![record(json!({
            "id": "v1", "lat": 1.0, "lng": 2.0, "epoch": 1_700_000_000
        }))])]);
        let coordinator = coordinator(source);

        let outcome = coordinator.run_once().await;
        assert!(matches!(
            outcome,
            PollOutcome::Success {
                vehicles: 1,
                skipped: 0
            }
        ));

        let vehicle = coordinator.vehicle("v1").expect("v1 should be tracked");
        assert_eq!(vehicle.latitude, 1.0);
        assert_eq!(vehicle.longitude, 2.0);
        assert_eq!(vehicle.last_update.timestamp(), 1_700_000_000);

        let health = coordinator.health();
        assert_eq!(health.cycles, 1);
        assert_eq!(health.consecutive_failures, 0);
        assert!(health.last_error.is_none());
    }

    #[tokio::test]
    async fn test_failure_advances_backoff_and_success_resets() {
        let source = StubSource::new(vec![
            Err(TrackerError::Network("connection refused".into())),
            Err(TrackerError::Network("connection refused".into())),
            Ok(vec![record(json!({"id": "v1", "lat": 1.0, "lng": 2.0}))]),
        ]);
        let coordinator = coordinator(source);
        let base = Duration::from_secs(30);

        assert_eq!(coordinator.current_delay(), base);

        coordinator.run_once().await;
        assert_eq!(coordinator.current_delay(), base * 2);
        coordinator.run_once().await;
        assert_eq!(coordinator.current_delay(), base * 4);
        assert_eq!(coordinator.health().consecutive_failures, 2);

        coordinator.run_once().await;
        assert_eq!(coordinator.current_delay(), base);
        assert_eq!(coordinator.health().consecutive_failures, 0);
    }

    #[tokio::test]
    async fn test_throttle_hint_overrides_delay() {
        let source = StubSource::new(vec![Err(TrackerError::Throttled {
            retry_after: Some(Duration::from_secs(120)),
        })]);
        let coordinator = coordinator(source);

        coordinator.run_once().await;
        let delay = coordinator.current_delay();
        assert!(delay > Duration::from_secs(115) && delay <= Duration::from_secs(120));
    }

    #[tokio::test]
    async fn test_failed_cycle_keeps_previous_snapshot() {
        let source = StubSource::new(vec![
            Ok(vec![record(json!({"id": "v1", "lat": 1.0, "lng": 2.0}))]),
            Err(TrackerError::Upstream {
                status: 500,
                detail: "boom".into(),
            }),
        ]);
        let coordinator = coordinator(source);

        coordinator.run_once().await;
        coordinator.run_once().await;

        // Stale data stays visible; the failure only shows up in health.
        assert!(coordinator.vehicle("v1").is_some());
        let health = coordinator.health();
        assert_eq!(health.consecutive_failures, 1);
        assert!(health.last_error.as_deref().is_some_and(|e| e.contains("500")));
    }

    #[tokio::test]
    async fn test_registration_fires_once_per_vehicle() {
        struct CountingSink {
            registered: std::sync::atomic::AtomicUsize,
            updated: std::sync::atomic::AtomicUsize,
        }
        impl VehicleSink for CountingSink {
            fn vehicle_registered(&self, _vehicle: &VehicleState) {
                self.registered
                    .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            }
            fn vehicle_updated(&self, _vehicle: &VehicleState) {
                self.updated
                    .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            }
        }

        let rec = record(json!({"id": "v1", "lat": 1.0, "lng": 2.0}));
        let source = StubSource::new(vec![
            Ok(vec![rec.clone()]),
            Ok(vec![rec.clone()]),
            Ok(vec![rec]),
        ]);
        let sink = Arc::new(CountingSink {
            registered: std::sync::atomic::AtomicUsize::new(0),
            updated: std::sync::atomic::AtomicUsize::new(0),
        });
        let coordinator =
            PollCoordinator::new(source, sink.clone(), config()).expect("valid config");

        for _ in 0..3 {
            coordinator.run_once().await;
        }

        assert_eq!(sink.registered.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(sink.updated.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_zone_names_resolved_and_cached() {
        let rec = record(json!({"id": "v1", "lat": 1.0, "lng": 2.0, "zone": "Z1,Z2"}));
        let source = StubSource::with_zones(
            vec![Ok(vec![rec.clone()]), Ok(vec![rec])],
            vec![
                Zone {
                    id: "Z1".into(),
                    name: "Depot".into(),
                },
                Zone {
                    id: "Z2".into(),
                    name: "Mine".into(),
                },
            ],
        );
        let coordinator = coordinator(source.clone());

        coordinator.run_once().await;
        let vehicle = coordinator.vehicle("v1").expect("tracked");
        assert_eq!(vehicle.zone_state.as_deref(), Some("Depot, Mine"));
        assert_eq!(vehicle.zone_names, vec!["Depot", "Mine"]);

        // Second cycle within the TTL must not refetch the directory.
        coordinator.run_once().await;
        assert_eq!(
            source.zone_calls.load(std::sync::atomic::Ordering::SeqCst),
            1
        );
    }

    #[tokio::test]
    async fn test_history_accumulates_across_cycles() {
        let source = StubSource::new(vec![
            Ok(vec![record(json!({"id": "v1", "lat": 1.0, "lng": 2.0, "epoch": 1_700_000_000}))]),
            Ok(vec![record(json!({"id": "v1", "lat": 1.1, "lng": 2.1, "epoch": 1_700_000_030}))]),
        ]);
        let coordinator = coordinator(source);

        coordinator.run_once().await;
        coordinator.run_once().await;

        let points = coordinator.history("v1").expect("history exists");
        assert_eq!(points.len(), 2);
        assert!(points[0].timestamp < points[1].timestamp);
        assert_eq!(coordinator.history("unknown"), None);
    }

    #[tokio::test]
    async fn test_skipped_records_surface_in_health() {
        let source = StubSource::new(vec![Ok(vec![
            record(json!({"id": "v1", "lat": 1.0, "lng": 2.0})),
            record(json!({"id": "v2"})),
            record(json!({"id": "v3", "lat": "x", "lng": 2.0})),
        ])]);
        let coordinator = coordinator(source);

        let outcome = coordinator.run_once().await;
        assert!(matches!(
            outcome,
            PollOutcome::Success {
                vehicles: 1,
                skipped: 2
            }
        ));
        let health = coordinator.health();
        assert_eq!(health.skipped_last_cycle, 2);
        assert_eq!(health.skipped_total, 2);
    }
}

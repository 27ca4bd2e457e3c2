//! Bounded position history
//!
//! Each vehicle keeps the last N minutes of positions in memory. Points are
//! appended per poll cycle and evicted once they age past the retention
//! window. Nothing survives a process restart.

use crate::types::{HistoryPoint, Timestamp};
use std::collections::{HashMap, VecDeque};

/// Bounded, append-only position history for one vehicle
#[derive(Debug, Clone)]
pub struct HistoryRing {
    window: chrono::Duration,
    points: VecDeque<HistoryPoint>,
}

impl HistoryRing {
    /// Create a ring retaining points within `window` of the newest point
    pub fn new(window: chrono::Duration) -> Self {
        Self {
            window,
            points: VecDeque::new(),
        }
    }

    /// Append a point and evict everything older than the retention window.
    ///
    /// Eviction is measured against the newest point's timestamp, so the ring
    /// behaves deterministically regardless of wall-clock skew. A zero (or
    /// negative) window retains nothing.
    pub fn record(&mut self, point: HistoryPoint) {
        if self.window <= chrono::Duration::zero() {
            self.points.clear();
            return;
        }
        let cutoff = point.timestamp - self.window;
        self.points.push_back(point);
        self.evict_older_than(cutoff);
    }

    /// Evict points older than the window relative to an explicit clock
    pub fn prune(&mut self, now: Timestamp) {
        self.evict_older_than(now - self.window);
    }

    fn evict_older_than(&mut self, cutoff: Timestamp) {
        while self
            .points
            .front()
            .is_some_and(|point| point.timestamp < cutoff)
        {
            self.points.pop_front();
        }
    }

    /// Retained points, oldest first
    pub fn history(&self) -> impl Iterator<Item = &HistoryPoint> {
        self.points.iter()
    }

    /// Most recent retained point
    pub fn latest(&self) -> Option<&HistoryPoint> {
        self.points.back()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Per-vehicle history rings, keyed by stable identifier
#[derive(Debug)]
pub struct HistoryStore {
    window: chrono::Duration,
    rings: HashMap<String, HistoryRing>,
}

impl HistoryStore {
    /// Create a store whose rings retain `retention_minutes` of positions
    pub fn new(retention_minutes: u32) -> Self {
        Self {
            window: chrono::Duration::minutes(i64::from(retention_minutes)),
            rings: HashMap::new(),
        }
    }

    /// Append a point to the vehicle's ring, creating the ring on first sight
    pub fn record(&mut self, vehicle_id: &str, point: HistoryPoint) {
        self.rings
            .entry(vehicle_id.to_owned())
            .or_insert_with(|| HistoryRing::new(self.window))
            .record(point);
    }

    /// Evict aged points from every ring
    pub fn prune_all(&mut self, now: Timestamp) {
        for ring in self.rings.values_mut() {
            ring.prune(now);
        }
    }

    /// The ring for a vehicle, if it has ever been recorded
    pub fn ring(&self, vehicle_id: &str) -> Option<&HistoryRing> {
        self.rings.get(vehicle_id)
    }

    /// Owned copy of a vehicle's retained points, oldest first
    pub fn points(&self, vehicle_id: &str) -> Option<Vec<HistoryPoint>> {
        self.rings
            .get(vehicle_id)
            .map(|ring| ring.history().cloned().collect())
    }

    pub fn len(&self) -> usize {
        self.rings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rings.is_empty()
    }
}

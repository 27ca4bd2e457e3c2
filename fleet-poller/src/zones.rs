//! Zone directory
//!
//! The vendor reports zone membership as a comma-separated list of zone ids
//! on each vehicle record; display names come from a separate endpoint. The
//! directory caches the id-to-name mapping with a TTL so the zone endpoint is
//! hit at most once per cache window, and keeps serving stale names when a
//! refresh fails.

use crate::client::Zone;
use crate::types::Timestamp;
use std::collections::HashMap;

/// Cached zone id-to-name mapping
#[derive(Debug, Clone)]
pub struct ZoneDirectory {
    ttl: chrono::Duration,
    refreshed_at: Option<Timestamp>,
    names: HashMap<String, String>,
}

impl ZoneDirectory {
    pub fn new(ttl: chrono::Duration) -> Self {
        Self {
            ttl,
            refreshed_at: None,
            names: HashMap::new(),
        }
    }

    /// True while the cached mapping is within its TTL
    pub fn is_fresh(&self, now: Timestamp) -> bool {
        self.refreshed_at
            .is_some_and(|refreshed| now - refreshed < self.ttl)
    }

    /// Replace the cached mapping
    pub fn update(&mut self, zones: Vec<Zone>, now: Timestamp) {
        log::debug!("zone directory refreshed with {} zones", zones.len());
        self.names = zones.into_iter().map(|zone| (zone.id, zone.name)).collect();
        self.refreshed_at = Some(now);
    }

    /// Display names for the given ids; unknown ids fall back to the raw id
    pub fn names_for(&self, ids: &[String]) -> Vec<String> {
        ids.iter()
            .map(|id| self.names.get(id).cloned().unwrap_or_else(|| id.clone()))
            .collect()
    }

    /// Joined display string for the given ids, e.g. "Depot, Mine"
    pub fn state_for(&self, ids: &[String]) -> Option<String> {
        if ids.is_empty() {
            None
        } else {
            Some(self.names_for(ids).join(", "))
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

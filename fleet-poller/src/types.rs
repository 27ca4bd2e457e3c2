//! Core types for the fleet poller library
//!
//! This module defines the records the poller emits after normalizing the
//! upstream payload, plus the error taxonomy that drives the backoff policy.
//! Vehicle state is plain data - nothing here depends on any host platform.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

/// Timestamp type used throughout the poller
pub type Timestamp = DateTime<Utc>;

/// Result type for poller operations
pub type Result<T> = std::result::Result<T, TrackerError>;

/// Errors that can occur while polling the vendor API
#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    /// Timeout or connection failure reaching the vendor
    #[error("network error: {0}")]
    Network(String),

    /// Vendor answered with a non-success status code
    #[error("upstream returned status {status}: {detail}")]
    Upstream { status: u16, detail: String },

    /// Vendor asked us to slow down (HTTP 429)
    #[error("upstream throttled the request")]
    Throttled {
        /// Wait hint decoded from Retry-After / x-ms-retry-after-ms, if any
        retry_after: Option<Duration>,
    },

    /// Top-level payload could not be parsed or had no vehicle list
    #[error("malformed payload: {0}")]
    Payload(String),

    /// A single vehicle record was unusable (never fails a whole batch)
    #[error("malformed record: {0}")]
    Record(String),

    /// Invalid configuration, reported before polling starts
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl TrackerError {
    /// True for failures that should advance the backoff state
    pub fn triggers_backoff(&self) -> bool {
        matches!(
            self,
            TrackerError::Network(_)
                | TrackerError::Upstream { .. }
                | TrackerError::Throttled { .. }
                | TrackerError::Payload(_)
        )
    }
}

/// Normalized state of a single tracked vehicle
///
/// One instance per vehicle per poll cycle. The identifier is stable across
/// cycles: either upstream-supplied or deterministically derived, so the same
/// raw inputs always map to the same vehicle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VehicleState {
    /// Stable per-vehicle identifier (primary key across polls)
    pub id: String,
    /// Display name reported by the vendor (synthesized when absent)
    pub name: String,
    /// Latitude in decimal degrees
    pub latitude: f64,
    /// Longitude in decimal degrees
    pub longitude: f64,
    /// GPS accuracy in meters, when reported
    pub gps_accuracy: Option<f64>,
    /// Speed in km/h, when reported
    pub speed_kmh: Option<f64>,
    /// Heading in degrees, when reported
    pub heading: Option<f64>,
    /// Internal battery level, when reported
    pub battery_level: Option<f64>,
    /// Supply voltage, when reported
    pub voltage: Option<f64>,
    /// Odometer reading in km, when reported
    pub odometer_km: Option<f64>,
    /// Accessory (ignition) counter, when reported
    pub acc_counter: Option<f64>,
    /// Geofence zone ids the vehicle is currently inside
    pub zone_ids: Vec<String>,
    /// Display names for `zone_ids` (unresolved ids fall back to the raw id)
    pub zone_names: Vec<String>,
    /// Joined zone display string, e.g. "Depot, Mine"
    pub zone_state: Option<String>,
    /// Human-readable time since last vehicle communication
    pub comms_delta: Option<String>,
    /// Timestamp of the reading (timezone-aware, UTC)
    pub last_update: Timestamp,
}

impl VehicleState {
    /// Project this state onto a history point
    pub fn history_point(&self) -> HistoryPoint {
        HistoryPoint {
            timestamp: self.last_update,
            latitude: self.latitude,
            longitude: self.longitude,
            speed_kmh: self.speed_kmh,
            heading: self.heading,
        }
    }
}

/// One retained position sample for a vehicle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryPoint {
    /// When the position was recorded
    pub timestamp: Timestamp,
    /// Latitude in decimal degrees
    pub latitude: f64,
    /// Longitude in decimal degrees
    pub longitude: f64,
    /// Speed in km/h, when reported
    pub speed_kmh: Option<f64>,
    /// Heading in degrees, when reported
    pub heading: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_backoff_classification() {
        assert!(TrackerError::Network("timeout".into()).triggers_backoff());
        assert!(TrackerError::Upstream {
            status: 500,
            detail: "boom".into()
        }
        .triggers_backoff());
        assert!(TrackerError::Throttled { retry_after: None }.triggers_backoff());
        assert!(TrackerError::Payload("not json".into()).triggers_backoff());
        assert!(!TrackerError::Record("bad lat".into()).triggers_backoff());
        assert!(!TrackerError::Config("missing key".into()).triggers_backoff());
    }

    #[test]
    fn test_history_point_projection() {
        let now = Utc::now();
        let state = VehicleState {
            id: "v1".into(),
            name: "Ute".into(),
            latitude: -33.86,
            longitude: 151.21,
            gps_accuracy: None,
            speed_kmh: Some(62.0),
            heading: Some(180.0),
            battery_level: None,
            voltage: None,
            odometer_km: None,
            acc_counter: None,
            zone_ids: vec![],
            zone_names: vec![],
            zone_state: None,
            comms_delta: None,
            last_update: now,
        };
        let point = state.history_point();
        assert_eq!(point.timestamp, now);
        assert_eq!(point.latitude, -33.86);
        assert_eq!(point.speed_kmh, Some(62.0));
    }
}

//! Payload normalization
//!
//! Maps raw upstream vehicle records onto [`VehicleState`]. The feed is
//! defensive territory: fields appear under several names, coordinates may be
//! numbers or numeric strings, and timestamps arrive as epoch values or ISO
//! strings. A malformed record never fails the batch - it is dropped and
//! counted, and processing continues.

use crate::config::PollerConfig;
use crate::fields;
use crate::identity::IdentityResolver;
use crate::types::{Timestamp, VehicleState};
use crate::util;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::{Map, Value};

/// Epoch values at or above this are treated as milliseconds
const EPOCH_MILLIS_THRESHOLD: f64 = 1_000_000_000_000.0;

/// Result of normalizing one fetched batch
#[derive(Debug, Clone)]
pub struct NormalizedBatch {
    /// Successfully normalized vehicles, in upstream order
    pub vehicles: Vec<VehicleState>,
    /// Number of records dropped as malformed
    pub skipped: usize,
}

/// Normalizes raw upstream records into vehicle state
pub struct Normalizer {
    identity: IdentityResolver,
}

impl Normalizer {
    /// Create a normalizer from the poller configuration
    pub fn new(config: &PollerConfig) -> Self {
        Self {
            identity: IdentityResolver::from_config(config),
        }
    }

    /// Normalize a whole fetched batch.
    ///
    /// Records missing a usable identifier or coordinates are dropped; the
    /// skip counter increments by exactly the number dropped.
    pub fn normalize_batch(
        &self,
        records: &[Map<String, Value>],
        now: Timestamp,
    ) -> NormalizedBatch {
        let mut vehicles = Vec::with_capacity(records.len());
        let mut skipped = 0usize;

        for record in records {
            match self.normalize_record(record, now) {
                Some(vehicle) => vehicles.push(vehicle),
                None => skipped += 1,
            }
        }

        if skipped > 0 {
            log::debug!("normalized batch: {} vehicles, {} skipped", vehicles.len(), skipped);
        }
        NormalizedBatch { vehicles, skipped }
    }

    /// Normalize a single record; `None` means the record was dropped.
    pub fn normalize_record(
        &self,
        record: &Map<String, Value>,
        now: Timestamp,
    ) -> Option<VehicleState> {
        let id = match self.identity.resolve(record) {
            Some(id) => id,
            None => {
                log::warn!("skipping record without a usable identifier");
                return None;
            }
        };

        let latitude = match lookup_f64(record, fields::LATITUDE) {
            Some(lat) => lat,
            None => {
                log::debug!("skipping record {id}: missing or non-numeric latitude");
                return None;
            }
        };
        let longitude = match lookup_f64(record, fields::LONGITUDE) {
            Some(lon) => lon,
            None => {
                log::debug!("skipping record {id}: missing or non-numeric longitude");
                return None;
            }
        };

        let name = lookup_string(record, fields::NAME).unwrap_or_else(|| format!("Vehicle {id}"));
        let last_update = lookup(record, fields::TIMESTAMP)
            .map(|value| parse_timestamp(value, now))
            .unwrap_or(now);
        let zone_ids = lookup_string(record, fields::ZONE)
            .map(|raw| split_zone_list(&raw))
            .unwrap_or_default();
        let comms_delta = lookup(record, fields::COMMS_DELTA).and_then(util::format_comms_delta);

        Some(VehicleState {
            id,
            name,
            latitude,
            longitude,
            gps_accuracy: lookup_f64(record, fields::ACCURACY),
            speed_kmh: lookup_f64(record, fields::SPEED),
            heading: lookup_f64(record, fields::HEADING),
            battery_level: lookup_f64(record, fields::BATTERY),
            voltage: lookup_f64(record, fields::VOLTAGE),
            odometer_km: lookup_f64(record, fields::ODOMETER),
            acc_counter: lookup_f64(record, fields::ACC_COUNTER),
            zone_ids,
            zone_names: Vec::new(),
            zone_state: None,
            comms_delta,
            last_update,
        })
    }
}

/// First candidate key present with a non-null value
fn lookup<'a>(record: &'a Map<String, Value>, candidates: &[&str]) -> Option<&'a Value> {
    candidates
        .iter()
        .filter_map(|key| record.get(*key))
        .find(|value| !value.is_null())
}

/// Best-effort float: numbers directly, numeric strings parsed
fn lookup_f64(record: &Map<String, Value>, candidates: &[&str]) -> Option<f64> {
    match lookup(record, candidates)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Best-effort string: non-empty strings, numbers stringified
fn lookup_string(record: &Map<String, Value>, candidates: &[&str]) -> Option<String> {
    match lookup(record, candidates)? {
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_owned())
            }
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Split the upstream comma-separated zone field into ids
fn split_zone_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Coerce an upstream timestamp value to a timezone-aware UTC timestamp.
///
/// Accepts epoch seconds (or milliseconds, decided by magnitude), RFC 3339
/// strings, and a couple of common naive formats assumed to be UTC. Anything
/// else falls back to `fallback`.
pub(crate) fn parse_timestamp(value: &Value, fallback: Timestamp) -> Timestamp {
    match value {
        Value::Number(n) => n.as_f64().and_then(epoch_to_timestamp).unwrap_or(fallback),
        Value::String(s) => parse_timestamp_str(s.trim()).unwrap_or_else(|| {
            log::debug!("falling back to batch time for timestamp value {s:?}");
            fallback
        }),
        _ => fallback,
    }
}

fn parse_timestamp_str(raw: &str) -> Option<Timestamp> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(epoch) = raw.parse::<f64>() {
        return epoch_to_timestamp(epoch);
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    None
}

fn epoch_to_timestamp(epoch: f64) -> Option<Timestamp> {
    if !epoch.is_finite() || epoch < 0.0 {
        return None;
    }
    let millis = if epoch >= EPOCH_MILLIS_THRESHOLD {
        epoch
    } else {
        epoch * 1000.0
    };
    DateTime::from_timestamp_millis(millis as i64)
}

//! Upstream field mapping tables
//!
//! The vendor payload is loosely typed and renames fields between feed
//! versions. Every logical attribute therefore has an ordered candidate list,
//! tried first to last. Keeping the mapping as data (rather than scattered
//! conditionals) makes the tolerated shapes auditable in one place.

/// Identifier candidates, in preference order
pub(crate) const IDENTITY: &[&str] = &[
    "id",
    "vehicle_id",
    "uuid",
    "vin",
    "imei",
    "deviceId",
    "device_id",
];

pub(crate) const NAME: &[&str] = &["name", "label", "display_name"];

pub(crate) const LATITUDE: &[&str] = &["latitude", "lat"];
pub(crate) const LONGITUDE: &[&str] = &["longitude", "lng", "lon"];

pub(crate) const SPEED: &[&str] = &["speed", "speed_kmh"];
pub(crate) const HEADING: &[&str] = &["heading", "course"];
pub(crate) const ACCURACY: &[&str] = &["accuracy", "gps_accuracy"];
pub(crate) const BATTERY: &[&str] = &["battery", "battery_level"];
pub(crate) const VOLTAGE: &[&str] = &["volts", "voltage"];
pub(crate) const ODOMETER: &[&str] = &["odometer", "odo_km"];
pub(crate) const ACC_COUNTER: &[&str] = &["acc_counter", "acc"];
pub(crate) const ZONE: &[&str] = &["zone", "zones"];
pub(crate) const COMMS_DELTA: &[&str] = &["comms_delta", "seconds_since_comms"];

/// Timestamp candidates; values may be epoch numbers or ISO strings
pub(crate) const TIMESTAMP: &[&str] = &["recorded_at", "timestamp", "time", "updated_at", "epoch"];

/// True when a key carries position- or time-dependent data.
///
/// The identity hash fallback must only consume fields that stay constant
/// while the vehicle moves, so everything listed in the per-reading tables
/// above is excluded.
pub(crate) fn is_volatile(key: &str) -> bool {
    const VOLATILE: &[&[&str]] = &[
        LATITUDE,
        LONGITUDE,
        SPEED,
        HEADING,
        ACCURACY,
        BATTERY,
        VOLTAGE,
        ODOMETER,
        ACC_COUNTER,
        ZONE,
        COMMS_DELTA,
        TIMESTAMP,
    ];
    VOLATILE.iter().any(|table| table.contains(&key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volatile_classification() {
        assert!(is_volatile("lat"));
        assert!(is_volatile("epoch"));
        assert!(is_volatile("zone"));
        assert!(!is_volatile("vin"));
        assert!(!is_volatile("name"));
        assert!(!is_volatile("fleet_code"));
    }
}

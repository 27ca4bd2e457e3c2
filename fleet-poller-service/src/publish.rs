//! Log-based entity publisher
//!
//! Stands in for a host automation platform: new vehicles are announced as
//! log lines instead of registered entities. The coordinator guarantees the
//! registration callback fires once per identifier, so the announcement
//! doubles as a "new resource" notification.

use fleet_poller::{VehicleSink, VehicleState};

pub struct LogPublisher;

impl VehicleSink for LogPublisher {
    fn vehicle_registered(&self, vehicle: &VehicleState) {
        log::info!(
            "new vehicle: {} ({}) at ({:.5}, {:.5})",
            vehicle.name,
            vehicle.id,
            vehicle.latitude,
            vehicle.longitude
        );
    }

    fn vehicle_updated(&self, vehicle: &VehicleState) {
        log::debug!(
            "vehicle {} at ({:.5}, {:.5}) speed {:?} zone {:?}",
            vehicle.id,
            vehicle.latitude,
            vehicle.longitude,
            vehicle.speed_kmh,
            vehicle.zone_state
        );
    }
}

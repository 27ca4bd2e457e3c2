//! Entity publish seam
//!
//! The coordinator announces vehicles through this trait instead of knowing
//! anything about a host platform's device model. Only plain data records
//! cross the seam. Registration is driven by the coordinator's first-sight
//! set, so `vehicle_registered` fires exactly once per identifier for the
//! process lifetime regardless of how many cycles see the vehicle.

use crate::types::VehicleState;

/// Consumer of vehicle announcements
pub trait VehicleSink: Send + Sync {
    /// Called once per vehicle identifier, on first sight
    fn vehicle_registered(&self, vehicle: &VehicleState);

    /// Called for every vehicle on every successful cycle after registration
    fn vehicle_updated(&self, _vehicle: &VehicleState) {}
}

/// Sink that ignores all announcements; useful for embedding and tests
pub struct NullSink;

impl VehicleSink for NullSink {
    fn vehicle_registered(&self, _vehicle: &VehicleState) {}
}

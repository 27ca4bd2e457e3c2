//! Fleet Poller Library
//!
//! A polling integration layer over a single vendor vehicle-telemetry API.
//! The library fetches the latest vehicle positions on a timer, normalizes the
//! loosely-typed upstream payload into stable records, keeps a bounded
//! position history per vehicle, and exposes the current state as an
//! immutable snapshot.
//!
//! # Architecture
//!
//! The crate is intentionally thin and focused on the poll cycle:
//! - Fetches one vehicle-list payload per cycle through the [`VehicleSource`]
//!   trait (HTTP implementation: [`TelemetryClient`])
//! - Assigns every record a stable identifier, hashing deterministically when
//!   the upstream supplies none
//! - Drops malformed records without failing the batch and counts them
//! - Applies capped exponential backoff after failed cycles
//! - Swaps in a complete new snapshot per cycle so readers never observe
//!   partial updates
//!
//! The library does NOT:
//! - Load configuration files or parse CLI arguments
//! - Serve HTTP endpoints
//! - Persist anything across process restarts
//!
//! All operational concerns live in the service binary (fleet-poller-service).
//!
//! # Example Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use fleet_poller::{NullSink, PollCoordinator, PollerConfig, TelemetryClient};
//!
//! # async fn run() -> fleet_poller::Result<()> {
//! let config = PollerConfig::new()
//!     .with_poll_interval_secs(30)
//!     .with_history_retention_minutes(120);
//!
//! let client = TelemetryClient::new(
//!     "https://api.example-telemetry.com/api.php",
//!     "my-api-key",
//!     None,
//!     config.fetch_timeout(),
//! )?;
//!
//! let coordinator = PollCoordinator::new(Arc::new(client), Arc::new(NullSink), config)?;
//! let outcome = coordinator.run_once().await;
//! println!("cycle finished: {:?}", outcome);
//! # Ok(())
//! # }
//! ```

// Public modules
pub mod backoff;
pub mod client;
pub mod config;
pub mod history;
pub mod normalize;
pub mod poller;
pub mod publish;
pub mod types;
pub mod util;
pub mod zones;

// Re-export main types for convenience
pub use backoff::Backoff;
pub use client::{TelemetryClient, VehicleSource, Zone};
pub use config::PollerConfig;
pub use history::{HistoryRing, HistoryStore};
pub use normalize::{NormalizedBatch, Normalizer};
pub use poller::{PollCoordinator, PollHealth, PollOutcome, PollerHandle, Snapshot};
pub use publish::{NullSink, VehicleSink};
pub use types::{HistoryPoint, Result, Timestamp, TrackerError, VehicleState};

// Internal modules (not exposed in public API)
mod fields;
mod identity;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

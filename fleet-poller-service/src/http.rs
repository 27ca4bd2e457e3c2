//! Read API
//!
//! Small axum router over the coordinator's snapshot. Handlers only clone
//! immutable data out of the current snapshot - no lock is held across an
//! await point and a poll cycle can never block a reader.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use fleet_poller::{HistoryPoint, PollCoordinator, VehicleState};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

pub type AppState = Arc<PollCoordinator>;

/// Build the read API router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/status", get(status_handler))
        .route("/vehicles", get(vehicles_handler))
        .route("/vehicles/:id", get(vehicle_handler))
        .route("/vehicles/:id/history", get(history_handler))
        .with_state(state)
}

/// Health and last-poll summary
#[derive(Debug, Serialize)]
struct StatusResponse {
    started_at: fleet_poller::Timestamp,
    last_poll: Option<fleet_poller::Timestamp>,
    last_success: Option<fleet_poller::Timestamp>,
    last_error: Option<String>,
    consecutive_failures: u32,
    cycles: u64,
    skipped_last_cycle: usize,
    skipped_total: u64,
    vehicles_tracked: usize,
    poll_interval_secs: u64,
    current_delay_secs: u64,
    history_retention_minutes: u32,
}

async fn status_handler(State(coordinator): State<AppState>) -> Json<StatusResponse> {
    let health = coordinator.health();
    let snapshot = coordinator.snapshot();
    let config = coordinator.config();
    Json(StatusResponse {
        started_at: coordinator.started_at(),
        last_poll: health.last_poll,
        last_success: health.last_success,
        last_error: health.last_error,
        consecutive_failures: health.consecutive_failures,
        cycles: health.cycles,
        skipped_last_cycle: health.skipped_last_cycle,
        skipped_total: health.skipped_total,
        vehicles_tracked: snapshot.vehicles.len(),
        poll_interval_secs: config.poll_interval_secs,
        current_delay_secs: coordinator.current_delay().as_secs(),
        history_retention_minutes: config.history_retention_minutes,
    })
}

async fn vehicles_handler(State(coordinator): State<AppState>) -> Json<Vec<VehicleState>> {
    let snapshot = coordinator.snapshot();
    let mut vehicles: Vec<VehicleState> = snapshot.vehicles.values().cloned().collect();
    vehicles.sort_by(|a, b| a.id.cmp(&b.id));
    Json(vehicles)
}

async fn vehicle_handler(
    State(coordinator): State<AppState>,
    Path(id): Path<String>,
) -> Response {
    match coordinator.vehicle(&id) {
        Some(vehicle) => Json(vehicle).into_response(),
        None => not_found(&id),
    }
}

async fn history_handler(
    State(coordinator): State<AppState>,
    Path(id): Path<String>,
) -> Response {
    match coordinator.history(&id) {
        Some(points) => Json::<Vec<HistoryPoint>>(points).into_response(),
        None => not_found(&id),
    }
}

fn not_found(id: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({"error": format!("unknown vehicle: {id}")})),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use fleet_poller::{NullSink, PollerConfig, Result, VehicleSource, Zone};
    use serde_json::{Map, Value};

    struct FixtureSource;

    #[async_trait]
    impl VehicleSource for FixtureSource {
        async fn fetch_vehicles(&self, _window_minutes: u32) -> Result<Vec<Map<String, Value>>> {
            let record = json!({
                "id": "v1",
                "name": "Ute",
                "lat": 1.0,
                "lng": 2.0,
                "speed": 42.0,
                "epoch": 1_700_000_000
            });
            Ok(vec![record.as_object().expect("object").clone()])
        }

        async fn fetch_zones(&self) -> Result<Vec<Zone>> {
            Ok(Vec::new())
        }
    }

    /// Prime a coordinator with one cycle and serve it on an ephemeral port
    async fn spawn_server() -> String {
        let config = PollerConfig::new()
            .with_poll_interval_secs(30)
            .with_fetch_timeout_secs(5);
        let coordinator =
            PollCoordinator::new(Arc::new(FixtureSource), Arc::new(NullSink), config)
                .expect("valid config");
        coordinator.run_once().await;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind ephemeral port");
        let addr = listener.local_addr().expect("local addr");
        let app = router(coordinator);
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve");
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_status_endpoint_reports_health() {
        let base = spawn_server().await;
        let body: Value = reqwest::get(format!("{base}/status"))
            .await
            .expect("request")
            .json()
            .await
            .expect("json body");

        assert_eq!(body["cycles"], json!(1));
        assert_eq!(body["vehicles_tracked"], json!(1));
        assert_eq!(body["consecutive_failures"], json!(0));
        assert!(body["last_error"].is_null());
        assert!(body["last_success"].is_string());
    }

    #[tokio::test]
    async fn test_vehicles_endpoints_serve_snapshot() {
        let base = spawn_server().await;

        let all: Value = reqwest::get(format!("{base}/vehicles"))
            .await
            .expect("request")
            .json()
            .await
            .expect("json body");
        assert_eq!(all.as_array().map(Vec::len), Some(1));

        let one: Value = reqwest::get(format!("{base}/vehicles/v1"))
            .await
            .expect("request")
            .json()
            .await
            .expect("json body");
        assert_eq!(one["id"], json!("v1"));
        assert_eq!(one["name"], json!("Ute"));
        assert_eq!(one["latitude"], json!(1.0));
        assert_eq!(one["speed_kmh"], json!(42.0));
    }

    #[tokio::test]
    async fn test_unknown_vehicle_is_404() {
        let base = spawn_server().await;

        let response = reqwest::get(format!("{base}/vehicles/nope"))
            .await
            .expect("request");
        assert_eq!(response.status().as_u16(), 404);

        let response = reqwest::get(format!("{base}/vehicles/nope/history"))
            .await
            .expect("request");
        assert_eq!(response.status().as_u16(), 404);
    }

    #[tokio::test]
    async fn test_history_endpoint_returns_ordered_points() {
        let base = spawn_server().await;

        let points: Value = reqwest::get(format!("{base}/vehicles/v1/history"))
            .await
            .expect("request")
            .json()
            .await
            .expect("json body");
        let points = points.as_array().expect("array body");
        assert_eq!(points.len(), 1);
        assert_eq!(points[0]["latitude"], json!(1.0));
        assert_eq!(points[0]["longitude"], json!(2.0));
    }
}

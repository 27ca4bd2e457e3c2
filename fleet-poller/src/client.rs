//! Vendor API client
//!
//! One HTTP GET per poll cycle against the vendor endpoint, with fixed query
//! parameters (module/action selector, API key, minutes window). The response
//! shape varies between feed versions, so extraction is defensive: the
//! vehicle list is located under one of several container keys and may be an
//! array or an object keyed by vehicle id.
//!
//! The [`VehicleSource`] trait is the seam the coordinator polls through;
//! tests substitute stub sources and never touch the network.

use crate::fields;
use crate::types::{Result, Timestamp, TrackerError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use serde_json::{Map, Value};
use std::time::Duration;

/// Container keys that may hold the vehicle list
const CONTAINER_FIELDS: &[&str] = &["aaData", "data", "vehicles", "results"];

/// Longest upstream body excerpt carried in error details
const BODY_EXCERPT_LEN: usize = 200;

/// A geofence zone known to the vendor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Zone {
    pub id: String,
    pub name: String,
}

/// Source of raw vehicle records, polled once per cycle.
///
/// The coordinator depends only on this trait so single cycles can be driven
/// deterministically with stub sources in tests.
#[async_trait]
pub trait VehicleSource: Send + Sync {
    /// Fetch the latest raw vehicle records for the given minutes window
    async fn fetch_vehicles(&self, window_minutes: u32) -> Result<Vec<Map<String, Value>>>;

    /// Fetch the zone directory (id and display name per zone)
    async fn fetch_zones(&self) -> Result<Vec<Zone>>;
}

/// HTTP client for the vendor telemetry API
pub struct TelemetryClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    user_key: Option<String>,
}

impl TelemetryClient {
    /// Create a client with a bounded request timeout.
    ///
    /// The timeout is mandatory and should stay below the poll interval so a
    /// hung request can never stall the coordinator.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        user_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| TrackerError::Network(err.to_string()))?;
        let api_key = api_key.into();
        let base_url: String = base_url.into();
        let base_url = base_url.trim_end_matches('/').to_owned();
        log::debug!(
            "telemetry client ready for {} (key {})",
            base_url,
            redact(&api_key)
        );
        Ok(Self {
            http,
            base_url,
            api_key,
            user_key,
        })
    }

    async fn get_json(&self, mut query: Vec<(&'static str, String)>) -> Result<Value> {
        query.push(("key", self.api_key.clone()));
        if let Some(user_key) = &self.user_key {
            query.push(("user", user_key.clone()));
        }

        let response = self
            .http
            .get(&self.base_url)
            .query(&query)
            .send()
            .await
            .map_err(classify_send_error)?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = parse_retry_after(response.headers(), Utc::now());
            log::debug!("upstream throttled the request, retry hint {retry_after:?}");
            return Err(TrackerError::Throttled { retry_after });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TrackerError::Upstream {
                status: status.as_u16(),
                detail: excerpt(&body),
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|err| TrackerError::Payload(err.without_url().to_string()))
    }
}

#[async_trait]
impl VehicleSource for TelemetryClient {
    async fn fetch_vehicles(&self, window_minutes: u32) -> Result<Vec<Map<String, Value>>> {
        let query = vec![
            ("module", "vehicles".to_owned()),
            ("action", "positions".to_owned()),
            ("minutes", window_minutes.to_string()),
        ];
        let payload = self.get_json(query).await?;
        extract_vehicle_records(&payload)
    }

    async fn fetch_zones(&self) -> Result<Vec<Zone>> {
        let query = vec![
            ("module", "zones".to_owned()),
            ("action", "list".to_owned()),
        ];
        let payload = self.get_json(query).await?;
        Ok(extract_zones(&payload))
    }
}

fn classify_send_error(err: reqwest::Error) -> TrackerError {
    if err.is_timeout() {
        TrackerError::Network("request timed out".into())
    } else {
        // without_url keeps credentials in query strings out of error text
        TrackerError::Network(err.without_url().to_string())
    }
}

fn excerpt(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.len() <= BODY_EXCERPT_LEN {
        trimmed.to_owned()
    } else {
        let cut = trimmed
            .char_indices()
            .take_while(|(index, _)| *index < BODY_EXCERPT_LEN)
            .last()
            .map_or(0, |(index, c)| index + c.len_utf8());
        format!("{}...", &trimmed[..cut])
    }
}

/// Locate and extract the vehicle list from a top-level payload.
///
/// Accepts a bare array, or an object with the list under one of the known
/// container keys. A container object keyed by vehicle id is flattened, with
/// the key injected as `id` when the record carries no identity field of its
/// own. Non-object entries are dropped with a log line.
pub fn extract_vehicle_records(payload: &Value) -> Result<Vec<Map<String, Value>>> {
    match payload {
        Value::Array(items) => Ok(collect_records(items)),
        Value::Object(map) => {
            for field in CONTAINER_FIELDS {
                match map.get(*field) {
                    Some(Value::Array(items)) => return Ok(collect_records(items)),
                    Some(Value::Object(by_id)) => {
                        let records = by_id
                            .iter()
                            .filter_map(|(key, value)| {
                                let mut record = value.as_object()?.clone();
                                if !fields::IDENTITY
                                    .iter()
                                    .any(|field| record.contains_key(*field))
                                {
                                    record.insert("id".to_owned(), Value::String(key.clone()));
                                }
                                Some(record)
                            })
                            .collect();
                        return Ok(records);
                    }
                    _ => continue,
                }
            }
            Err(TrackerError::Payload(
                "no vehicle list container in payload".into(),
            ))
        }
        _ => Err(TrackerError::Payload(
            "unexpected top-level payload shape".into(),
        )),
    }
}

fn collect_records(items: &[Value]) -> Vec<Map<String, Value>> {
    let mut records = Vec::with_capacity(items.len());
    for item in items {
        match item.as_object() {
            Some(record) => records.push(record.clone()),
            None => log::debug!("dropping non-object entry in vehicle list"),
        }
    }
    records
}

/// Extract zones from the vendor's feature-collection response
fn extract_zones(payload: &Value) -> Vec<Zone> {
    let Some(features) = payload.get("features").and_then(Value::as_array) else {
        log::debug!("zone payload had no features list");
        return Vec::new();
    };
    features
        .iter()
        .filter_map(|feature| {
            let id = match feature.get("id") {
                Some(Value::String(s)) if !s.is_empty() => s.clone(),
                Some(Value::Number(n)) => n.to_string(),
                _ => return None,
            };
            let name = feature
                .get("properties")
                .and_then(|props| props.get("name"))
                .and_then(Value::as_str)
                .map(str::to_owned)
                .unwrap_or_else(|| id.clone());
            Some(Zone { id, name })
        })
        .collect()
}

/// Decode a throttle wait hint from response headers.
///
/// Understands `Retry-After` as delta-seconds or an HTTP-date, plus the
/// millisecond variant `x-ms-retry-after-ms`. Dates already in the past
/// yield no hint.
pub fn parse_retry_after(headers: &HeaderMap, now: Timestamp) -> Option<Duration> {
    if let Some(millis) = headers
        .get("x-ms-retry-after-ms")
        .and_then(|value| value.to_str().ok())
        .and_then(|raw| raw.trim().parse::<u64>().ok())
    {
        return Some(Duration::from_millis(millis));
    }

    let raw = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    if let Ok(seconds) = raw.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    let when = DateTime::parse_from_rfc2822(raw).ok()?;
    (when.with_timezone(&Utc) - now).to_std().ok()
}

/// Mask a secret for logging: short values disappear entirely, longer ones
/// keep only their first and last two characters.
pub fn redact(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.is_empty() {
        return String::new();
    }
    if chars.len() <= 4 {
        return "***".to_string();
    }
    let head: String = chars[..2].iter().collect();
    let tail: String = chars[chars.len() - 2..].iter().collect();
    format!("{head}***{tail}")
}

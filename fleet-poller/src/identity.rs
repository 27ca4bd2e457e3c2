//! Stable vehicle identity resolution
//!
//! The upstream feed does not guarantee a stable per-vehicle ID field. This
//! module tries an ordered list of candidate fields and, when all are absent,
//! derives a deterministic identifier by hashing the record's stable fields
//! together with the configured account id. The guarantee: same raw record +
//! same configuration produces the same identifier on every call, across
//! process restarts.

use crate::config::PollerConfig;
use crate::fields;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Length of the hashed fallback identifier, in hex characters
const HASH_ID_LEN: usize = 12;

/// Resolves stable identifiers for raw vehicle records
#[derive(Debug, Clone)]
pub(crate) struct IdentityResolver {
    custom_field: Option<String>,
    account_id: Option<String>,
}

impl IdentityResolver {
    pub(crate) fn from_config(config: &PollerConfig) -> Self {
        let custom_field = config
            .identity_field
            .as_deref()
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(str::to_owned);
        Self {
            custom_field,
            account_id: config.account_id.clone(),
        }
    }

    /// Derive the stable identifier for one raw record.
    ///
    /// Tries the configured custom field, then the built-in candidates in
    /// order, and finally the deterministic hash fallback. Returns `None`
    /// only when the record has no stable fields and no account id is
    /// configured.
    pub(crate) fn resolve(&self, record: &Map<String, Value>) -> Option<String> {
        if let Some(field) = &self.custom_field {
            if let Some(value) = scalar_string(record.get(field.as_str())) {
                return Some(value);
            }
        }
        for field in fields::IDENTITY {
            if let Some(value) = scalar_string(record.get(*field)) {
                return Some(value);
            }
        }
        self.hashed_fallback(record)
    }

    /// Deterministic hash over the record's stable fields plus the account id.
    ///
    /// Position, speed and other per-reading values are excluded so the hash
    /// does not drift as the vehicle moves.
    fn hashed_fallback(&self, record: &Map<String, Value>) -> Option<String> {
        let mut parts: Vec<String> = record
            .iter()
            .filter(|(key, _)| !fields::is_volatile(key))
            .filter_map(|(key, value)| {
                scalar_string(Some(value)).map(|v| format!("{key}={v}"))
            })
            .collect();
        parts.sort();

        if parts.is_empty() && self.account_id.is_none() {
            return None;
        }

        log::warn!(
            "record has no identity field; falling back to hashed identifier ({} stable fields)",
            parts.len()
        );

        let mut input = self.account_id.clone().unwrap_or_default();
        for part in &parts {
            input.push(':');
            input.push_str(part);
        }
        Some(hash_hex(&input))
    }
}

/// SHA-256 digest truncated to a fixed-length lowercase hex string
fn hash_hex(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    let mut out = String::with_capacity(HASH_ID_LEN);
    for byte in digest.iter().take(HASH_ID_LEN / 2) {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// Stringify a scalar JSON value; empty strings and containers yield `None`
fn scalar_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_owned())
            }
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Map<String, Value> {
        value.as_object().expect("test record must be an object").clone()
    }

    fn resolver(custom_field: Option<&str>, account_id: Option<&str>) -> IdentityResolver {
        let mut config = PollerConfig::new();
        config.identity_field = custom_field.map(str::to_owned);
        config.account_id = account_id.map(str::to_owned);
        IdentityResolver::from_config(&config)
    }

    #[test]
    fn test_prefers_first_candidate_field() {
        let resolver = resolver(None, None);
        let rec = record(json!({"id": "v1", "uuid": "u1", "vin": "WDB123"}));
        assert_eq!(resolver.resolve(&rec), Some("v1".to_string()));
    }

    #[test]
    fn test_custom_field_wins_over_builtins() {
        let resolver = resolver(Some("fleet_code"), None);
        let rec = record(json!({"id": "v1", "fleet_code": "FC-9"}));
        assert_eq!(resolver.resolve(&rec), Some("FC-9".to_string()));
    }

    #[test]
    fn test_numeric_identifier_is_stringified() {
        let resolver = resolver(None, None);
        let rec = record(json!({"imei": 351234567890123u64}));
        assert_eq!(resolver.resolve(&rec), Some("351234567890123".to_string()));
    }

    #[test]
    fn test_empty_string_candidate_is_skipped() {
        let resolver = resolver(None, None);
        let rec = record(json!({"id": "  ", "vin": "WDB123"}));
        assert_eq!(resolver.resolve(&rec), Some("WDB123".to_string()));
    }

    #[test]
    fn test_hash_fallback_is_deterministic() {
        let resolver = resolver(None, Some("acct1"));
        let rec = record(json!({"name": "Ute", "lat": 1.0, "lng": 2.0}));
        let first = resolver.resolve(&rec).expect("should hash");
        let second = resolver.resolve(&rec).expect("should hash");
        assert_eq!(first, second);
        assert_eq!(first.len(), HASH_ID_LEN);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_hash_ignores_volatile_fields() {
        let resolver = resolver(None, Some("acct1"));
        let parked = record(json!({"name": "Ute", "lat": 1.0, "lng": 2.0, "speed": 0.0}));
        let moving = record(json!({"name": "Ute", "lat": 5.0, "lng": 6.0, "speed": 80.0}));
        assert_eq!(resolver.resolve(&parked), resolver.resolve(&moving));
    }

    #[test]
    fn test_hash_differs_per_account() {
        let rec = record(json!({"name": "Ute"}));
        let a = resolver(None, Some("acct1")).resolve(&rec);
        let b = resolver(None, Some("acct2")).resolve(&rec);
        assert_ne!(a, b);
    }

    #[test]
    fn test_no_stable_fields_and_no_account_yields_none() {
        let resolver = resolver(None, None);
        let rec = record(json!({"lat": 1.0, "lng": 2.0, "speed": 10.0}));
        assert_eq!(resolver.resolve(&rec), None);
    }

    #[test]
    fn test_account_alone_is_enough_to_hash() {
        let resolver = resolver(None, Some("acct1"));
        let rec = record(json!({"lat": 1.0, "lng": 2.0}));
        assert!(resolver.resolve(&rec).is_some());
    }
}

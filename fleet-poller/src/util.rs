//! Small shared helpers

use serde_json::Value;

const DURATION_UNITS: &[(&str, u64)] = &[
    ("year", 365 * 24 * 3600),
    ("month", 30 * 24 * 3600),
    ("day", 24 * 3600),
    ("hour", 3600),
    ("minute", 60),
    ("second", 1),
];

/// Format an upstream seconds-since-last-comms value for display.
///
/// The raw value counts from the previous reading, so one second is shaved
/// off (floored at zero) before formatting. Accepts numbers or numeric
/// strings; anything else yields `None`.
pub fn format_comms_delta(raw: &Value) -> Option<String> {
    let seconds = match raw {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if !seconds.is_finite() {
        return None;
    }
    let adjusted = ((seconds as i64) - 1).max(0) as u64;
    Some(format_duration(adjusted))
}

/// Render a duration in seconds as at most two unit components.
pub fn format_duration(total_seconds: u64) -> String {
    for (index, (unit, unit_seconds)) in DURATION_UNITS.iter().enumerate() {
        if total_seconds < *unit_seconds && *unit != "second" {
            continue;
        }
        let value = total_seconds / unit_seconds;
        let remainder = total_seconds % unit_seconds;
        let mut out = format!("{value} {}", pluralize(unit, value));
        if let Some(secondary) = next_component(remainder, &DURATION_UNITS[index + 1..]) {
            out.push(' ');
            out.push_str(&secondary);
        }
        return out;
    }
    "0 seconds".to_string()
}

fn next_component(remainder: u64, units: &[(&str, u64)]) -> Option<String> {
    for (unit, unit_seconds) in units {
        let value = remainder / unit_seconds;
        if value > 0 {
            return Some(format!("{value} {}", pluralize(unit, value)));
        }
    }
    None
}

fn pluralize(unit: &str, value: u64) -> String {
    if value == 1 {
        unit.to_string()
    } else {
        format!("{unit}s")
    }
}

/// Publish payloads
///
/// Alert and position strings are wire contracts consumed by the cloud side
/// and are rendered with fixed precision via `format!`. Informational
/// detection events are plain JSON objects built with `json!`.
use serde_json::{json, Value};

use crate::detection::{AlertEvent, DetectionSignal};
use crate::gps::FixSnapshot;

/// `{"alert":..,"g":..,"lat":..,"lon":..,"alt":..,"sats":..}` or the no-fix form
pub fn alert_payload(alert: &AlertEvent) -> String {
    match &alert.fix {
        Some(fix) => format!(
            "{{\"alert\":\"{}\",\"g\":{:.1},\"lat\":{:.6},\"lon\":{:.6},\"alt\":{:.1},\"sats\":{}}}",
            alert.kind.as_str(),
            alert.peak_g,
            fix.latitude,
            fix.longitude,
            fix.altitude_m.unwrap_or(0.0),
            fix.satellites
        ),
        None => format!(
            "{{\"alert\":\"{}\",\"g\":{:.1},\"gps\":false}}",
            alert.kind.as_str(),
            alert.peak_g
        ),
    }
}

/// Periodic position report for `gps/position`
pub fn position_payload(fix: Option<&FixSnapshot>) -> String {
    match fix {
        Some(fix) => format!(
            "{{\"fix\":true,\"lat\":{:.6},\"lon\":{:.6},\"alt_m\":{},\"hdop\":{},\"spd_kmph\":{},\"sats\":{}}}",
            fix.latitude,
            fix.longitude,
            number_or_null(fix.altitude_m, 1),
            number_or_null(fix.hdop, 1),
            number_or_null(fix.speed_kmph, 1),
            fix.satellites
        ),
        None => "{\"fix\":false}".to_string(),
    }
}

/// Location + battery report for `safeneck/location`
///
/// Without a fix the last coordinates are unknown and reported as zero.
pub fn legacy_location_payload(fix: Option<&FixSnapshot>, battery_pct: f32) -> String {
    let (lat, lon, spd, ts) = match fix {
        Some(fix) => (
            fix.latitude,
            fix.longitude,
            fix.speed_kmph.unwrap_or(0.0),
            fix.utc_unix_secs.unwrap_or(0),
        ),
        None => (0.0, 0.0, 0.0, 0),
    };
    format!(
        "{{\"lat\":{:.6},\"lon\":{:.6},\"spd\":{:.1},\"fix\":{},\"bat\":{:.1},\"ts\":{}}}",
        lat,
        lon,
        spd,
        fix.is_some(),
        battery_pct,
        ts
    )
}

/// Alert event for `safeneck/fall`, sent next to the primary alert in legacy mode
pub fn legacy_alert_payload(alert: &AlertEvent, battery_pct: f32) -> String {
    let (lat, lon, ts) = match &alert.fix {
        Some(fix) => (fix.latitude, fix.longitude, fix.utc_unix_secs.unwrap_or(0)),
        None => (0.0, 0.0, 0),
    };
    format!(
        "{{\"lat\":{:.6},\"lon\":{:.6},\"bat\":{:.1},\"type\":\"{}\",\"ts\":{}}}",
        lat,
        lon,
        battery_pct,
        alert.kind.as_str(),
        ts
    )
}

/// JSON body for an informational detection signal
///
/// Only impact and freefall entries are published; other signals are
/// log-only and yield None.
pub fn signal_payload(signal: &DetectionSignal, impact_threshold_g: f32) -> Option<Value> {
    match *signal {
        DetectionSignal::ImpactDetected { g } => Some(json!({
            "event": "impact_detected",
            "g": round_to(g, 2),
            "threshold": round_to(impact_threshold_g, 1),
        })),
        DetectionSignal::FreefallDetected { g, sustained_ms } => Some(json!({
            "event": "freefall_detected",
            "g": round_to(g, 2),
            "duration_ms": sustained_ms,
        })),
        _ => None,
    }
}

fn number_or_null(value: Option<f64>, decimals: usize) -> String {
    match value {
        Some(v) if v.is_finite() => format!("{:.*}", decimals, v),
        _ => "null".to_string(),
    }
}

/// f32 -> f64 without the binary noise (3.2f32 would print as 3.200000047...)
fn round_to(value: f32, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value as f64 * scale).round() / scale
}

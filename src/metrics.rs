//! Per-row display metrics: duration, pace and weather.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Shown when pace cannot be computed.
pub const PACE_PLACEHOLDER: &str = "--:--";

/// Everything a workout list row displays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowMetrics {
    pub workout_id: Uuid,
    pub city_name: String,
    pub distance_miles: f64,
    /// Seconds
    pub duration_secs: f64,
    pub formatted_duration: String,
    /// `M:SS` per mile, or the placeholder
    pub pace: String,
    pub weather_temp: Option<String>,
    pub weather_symbol: Option<String>,
    pub average_speed_mph: Option<f64>,
}

/// `H:MM:SS` when at least an hour, `MM:SS` otherwise.
pub fn format_duration(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds as u64
    } else {
        0
    };
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{:02}:{:02}", minutes, secs)
    }
}

/// Minutes per mile. `None` without a positive distance.
pub fn average_pace(duration_secs: f64, distance_miles: f64) -> Option<f64> {
    if distance_miles > 0.0 && duration_secs.is_finite() {
        Some((duration_secs / 60.0) / distance_miles)
    } else {
        None
    }
}

/// `M:SS` for a pace in minutes per mile.
pub fn format_pace(pace: Option<f64>) -> String {
    match pace {
        Some(p) if p.is_finite() && p >= 0.0 => {
            let whole_minutes = p.trunc();
            let seconds = ((p - whole_minutes) * 60.0) as u64;
            format!("{}:{:02}", whole_minutes as u64, seconds)
        }
        _ => PACE_PLACEHOLDER.to_string(),
    }
}

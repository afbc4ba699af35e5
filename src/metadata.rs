//! Watch-recorded workout metadata.
//!
//! Companion watch apps write final values (distance, weather, ...) into the
//! workout's metadata. Numbers may arrive as JSON numbers or numeric strings.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const KEY_FINAL_DISTANCE: &str = "finalDistance";
pub const KEY_FINAL_DURATION: &str = "finalDuration";
pub const KEY_AVERAGE_SPEED: &str = "averageSpeed";
pub const KEY_WEATHER_CITY: &str = "weatherCity";
pub const KEY_WEATHER_TEMP: &str = "weatherTemp";
pub const KEY_WEATHER_SYMBOL: &str = "weatherSymbol";
pub const KEY_WIND_SPEED: &str = "windSpeed";
pub const KEY_WIND_DIRECTION: &str = "windDirection";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WatchMetadata {
    /// Miles
    pub final_distance: Option<f64>,
    /// Seconds
    pub final_duration: Option<f64>,
    /// mph
    pub average_speed: Option<f64>,
    pub weather_city: Option<String>,
    pub weather_temp: Option<String>,
    pub weather_symbol: Option<String>,
    pub wind_speed: Option<String>,
    pub wind_direction: Option<String>,
}

impl WatchMetadata {
    /// Parse metadata. Returns `None` for an empty map.
    pub fn parse(map: &Map<String, Value>) -> Option<Self> {
        if map.is_empty() {
            return None;
        }
        Some(Self {
            final_distance: parse_f64(map, KEY_FINAL_DISTANCE),
            final_duration: parse_f64(map, KEY_FINAL_DURATION),
            average_speed: parse_f64(map, KEY_AVERAGE_SPEED),
            weather_city: parse_string(map, KEY_WEATHER_CITY),
            weather_temp: parse_string(map, KEY_WEATHER_TEMP),
            weather_symbol: parse_string(map, KEY_WEATHER_SYMBOL),
            wind_speed: parse_string(map, KEY_WIND_SPEED),
            wind_direction: parse_string(map, KEY_WIND_DIRECTION),
        })
    }

    /// Non-empty city name recorded with the weather snapshot.
    pub fn city(&self) -> Option<&str> {
        self.weather_city.as_deref().filter(|c| !c.is_empty())
    }
}

fn parse_f64(map: &Map<String, Value>, key: &str) -> Option<f64> {
    match map.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn parse_string(map: &Map<String, Value>, key: &str) -> Option<String> {
    map.get(key)?.as_str().map(str::to_string)
}

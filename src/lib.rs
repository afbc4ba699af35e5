//! # Route Metrics
//!
//! Per-workout route metrics for a workout-route browser.
//!
//! This library provides:
//! - Speed-filtered route cleaning (drops post-workout vehicle travel)
//! - Haversine route distance in miles
//! - Memoized per-workout distance, coordinates and city name
//! - Paged workout loading over an abstract health/activity data store
//!
//! Stores and geocoders are traits ([`WorkoutStore`], [`RouteSource`],
//! [`Geocoder`]); the crate ships an [`InMemoryStore`] and a
//! [`StaticGeocoder`] for embedding and tests.
//!
//! ## Quick Start
//!
//! ```rust
//! use route_metrics::{Coordinate, FilterConfig, RouteSample, RouteSegment, route_distance_miles};
//! use chrono::Utc;
//!
//! let segment = RouteSegment::new(vec![
//!     RouteSample::new(Coordinate::new(51.5074, -0.1278), 3.0, Utc::now()),
//!     RouteSample::new(Coordinate::new(51.5080, -0.1290), 3.1, Utc::now()),
//!     RouteSample::new(Coordinate::new(51.5090, -0.1300), 2.9, Utc::now()),
//! ]);
//!
//! let miles = route_distance_miles(&[segment], &FilterConfig::default());
//! assert!(miles > 0.0);
//! ```

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// Unified error handling
pub mod error;
pub use error::{Result, RouteMetricsError};

// Geographic utilities (haversine, unit conversions)
pub mod geo_utils;

// Speed-based outlier rejection
pub mod speed_filter;
pub use speed_filter::{filter_segment, SpeedFilter};

// Unbounded memoization cache
pub mod memo_cache;
pub use memo_cache::{MemoCache, MemoStats};

// Watch-recorded workout metadata
pub mod metadata;
pub use metadata::WatchMetadata;

// Store and geocoder seams plus in-memory implementations
pub mod source;
pub use source::{Geocoder, InMemoryStore, RouteSource, StaticGeocoder, WorkoutStore};

// Memoizing route metrics aggregator
pub mod aggregator;
pub use aggregator::{RouteAggregator, UNKNOWN_CITY};

// Feed configuration
pub mod config;
pub use config::FeedConfig;

// Duration and pace formatting
pub mod metrics;
pub use metrics::{average_pace, format_duration, format_pace, RowMetrics};

// Paged workout loading
pub mod feed;
pub use feed::{FeedError, FeedEvent, FeedState, WorkoutFeed};

/// Initialize logging for Android.
#[cfg(target_os = "android")]
pub fn init_logging() {
    use android_logger::Config;
    use log::LevelFilter;

    android_logger::init_once(
        Config::default()
            .with_max_level(LevelFilter::Debug)
            .with_tag("RouteMetricsRust"),
    );
}

#[cfg(not(target_os = "android"))]
pub fn init_logging() {
    // No-op on non-Android platforms; the host installs its own logger
}

// ============================================================================
// Core Types
// ============================================================================

/// A geographic coordinate in degrees.
///
/// # Example
/// ```
/// use route_metrics::Coordinate;
/// let point = Coordinate::new(51.5074, -0.1278); // London
/// assert!(point.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }

    /// Both components non-zero. Stores report (0, 0) for missing fixes.
    pub fn is_located(&self) -> bool {
        self.latitude != 0.0 && self.longitude != 0.0
    }
}

/// One raw reading from the wearable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RouteSample {
    pub coordinate: Coordinate,
    /// Instantaneous speed in m/s. Negative means unknown.
    pub speed: f64,
    pub timestamp: DateTime<Utc>,
}

impl RouteSample {
    pub fn new(coordinate: Coordinate, speed: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            coordinate,
            speed,
            timestamp,
        }
    }
}

/// One continuous recording interval of a workout.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteSegment {
    pub samples: Vec<RouteSample>,
}

impl RouteSegment {
    pub fn new(samples: Vec<RouteSample>) -> Self {
        Self { samples }
    }

    pub fn coordinates(&self) -> Vec<Coordinate> {
        self.samples.iter().map(|s| s.coordinate).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Store-side reference to a segment whose samples are fetched lazily.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SegmentHandle {
    pub id: Uuid,
    pub workout_id: Uuid,
}

/// A workout as recorded by the data store. Read-only here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkoutRecord {
    pub id: Uuid,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Recorded duration in seconds
    pub duration_secs: f64,
    /// Free-form key/value metadata written by the wearable
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl WorkoutRecord {
    pub fn new(id: Uuid, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        let duration_secs = (end - start).num_milliseconds().max(0) as f64 / 1000.0;
        Self {
            id,
            start,
            end,
            duration_secs,
            metadata: serde_json::Map::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Map<String, serde_json::Value>) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Closed date range used for workout queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// The `days` days up to `now`.
    pub fn trailing_days(now: DateTime<Utc>, days: u32) -> Self {
        Self {
            start: now - Duration::days(i64::from(days)),
            end: now,
        }
    }

    /// Workout lies entirely inside the range.
    pub fn contains_workout(&self, workout: &WorkoutRecord) -> bool {
        workout.start >= self.start && workout.end <= self.end
    }
}

/// Speed filter settings. Changing these requires clearing the aggregator
/// caches, which are keyed by workout id only.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Drop a segment's tail from the first over-limit sample on.
    /// Default: true
    pub use_speed_filter: bool,

    /// Speed limit in mph.
    /// Default: 20.0
    pub speed_limit_mph: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            use_speed_filter: true,
            speed_limit_mph: 20.0,
        }
    }
}

/// Snapshot of what the aggregator has derived for one workout.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DerivedMetrics {
    pub distance_miles: Option<f64>,
    pub coordinates: Option<Vec<Coordinate>>,
    pub city_name: Option<String>,
}

// ============================================================================
// Core Functions
// ============================================================================

/// Filter each segment and sum its haversine legs, in miles.
///
/// Legs never span two segments.
pub fn route_distance_miles(segments: &[RouteSegment], config: &FilterConfig) -> f64 {
    segments
        .iter()
        .map(|segment| {
            let kept = filter_segment(&segment.samples, config);
            let coords: Vec<Coordinate> = kept.iter().map(|s| s.coordinate).collect();
            geo_utils::polyline_length_miles(&coords)
        })
        .sum()
}

/// Filtered coordinates concatenated across segments.
pub fn route_coordinates(segments: &[RouteSegment], config: &FilterConfig) -> Vec<Coordinate> {
    segments
        .iter()
        .flat_map(|segment| filter_segment(&segment.samples, config))
        .map(|s| s.coordinate)
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn equator_segment(lngs: &[f64], speed: f64) -> RouteSegment {
        RouteSegment::new(
            lngs.iter()
                .enumerate()
                .map(|(i, &lng)| {
                    RouteSample::new(
                        Coordinate::new(0.0, lng),
                        speed,
                        Utc.timestamp_opt(1_700_000_000 + i as i64, 0).unwrap(),
                    )
                })
                .collect(),
        )
    }

    #[test]
    fn test_coordinate_validation() {
        assert!(Coordinate::new(51.5074, -0.1278).is_valid());
        assert!(!Coordinate::new(91.0, 0.0).is_valid());
        assert!(!Coordinate::new(0.0, 181.0).is_valid());
        assert!(!Coordinate::new(f64::NAN, 0.0).is_valid());
        assert!(!Coordinate::new(0.0, 12.0).is_located());
    }

    #[test]
    fn test_equator_distance_with_unknown_speeds() {
        let segment = equator_segment(&[0.0, 1.0, 2.0], -1.0);
        let miles = route_distance_miles(&[segment.clone()], &FilterConfig::default());
        assert!((miles - 138.3).abs() < 0.5, "got {miles}");
        assert_eq!(
            route_coordinates(&[segment], &FilterConfig::default()).len(),
            3
        );
    }

    #[test]
    fn test_distance_is_additive_across_segments() {
        let whole = equator_segment(&[0.0, 0.01, 0.02, 0.03], 2.0);
        let first = equator_segment(&[0.0, 0.01], 2.0);
        let second = equator_segment(&[0.01, 0.02, 0.03], 2.0);
        let cfg = FilterConfig::default();

        let one = route_distance_miles(&[whole], &cfg);
        let two = route_distance_miles(&[first, second], &cfg);
        assert!((one - two).abs() < 1e-6);
    }

    #[test]
    fn test_empty_input_is_zero() {
        assert_eq!(route_distance_miles(&[], &FilterConfig::default()), 0.0);
        assert!(route_coordinates(&[RouteSegment::default()], &FilterConfig::default()).is_empty());
    }

    #[test]
    fn test_workout_duration_from_range() {
        let start = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let end = start + Duration::seconds(1800);
        let w = WorkoutRecord::new(Uuid::new_v4(), start, end);
        assert_eq!(w.duration_secs, 1800.0);

        let range = DateRange::trailing_days(end, 14);
        assert!(range.contains_workout(&w));
        assert!(!DateRange::new(start + Duration::seconds(1), end).contains_workout(&w));
    }
}

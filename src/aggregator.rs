//! # Route Aggregator
//!
//! Turns a workout's raw segment streams into a total distance, a cleaned
//! coordinate list and a city name, memoizing each per workout id.
//!
//! ## Cache contract
//!
//! Keys are workout ids only, not `(id, FilterConfig)`. Whoever owns the
//! filter settings must call [`RouteAggregator::clear_caches`] when they
//! change. Memoization is best effort: two concurrent calls for the same id
//! may both compute. Values are stored only after a computation finished, so a
//! dropped (cancelled) future never leaves a partial entry behind.

use std::sync::{Arc, Mutex, MutexGuard};

use futures::StreamExt;
use log::{debug, warn};
use uuid::Uuid;

use crate::geo_utils::polyline_length_miles;
use crate::memo_cache::{MemoCache, MemoStats};
use crate::source::{Geocoder, RouteSource};
use crate::speed_filter::SpeedFilter;
use crate::{Coordinate, DerivedMetrics, FilterConfig, SegmentHandle, WatchMetadata, WorkoutRecord};

/// City name used whenever no locality can be determined.
pub const UNKNOWN_CITY: &str = "Unknown City";

#[derive(Debug, Default)]
struct MetricCaches {
    distance: MemoCache<Uuid, f64>,
    coordinates: MemoCache<Uuid, Vec<Coordinate>>,
    city: MemoCache<Uuid, String>,
    metadata: MemoCache<Uuid, Option<WatchMetadata>>,
}

/// Cache occupancy, for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregatorStats {
    pub distance: MemoStats,
    pub coordinates: MemoStats,
    pub city: MemoStats,
    pub metadata: MemoStats,
}

/// Memoizing per-workout route metrics.
pub struct RouteAggregator {
    caches: Mutex<MetricCaches>,
    geocoder: Arc<dyn Geocoder>,
}

impl RouteAggregator {
    pub fn new(geocoder: Arc<dyn Geocoder>) -> Self {
        Self {
            caches: Mutex::new(MetricCaches::default()),
            geocoder,
        }
    }

    // Never held across an await.
    fn caches(&self) -> MutexGuard<'_, MetricCaches> {
        self.caches.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Total filtered route distance in miles.
    ///
    /// Returns the cached value when present, without consulting `source` or
    /// `filter`. Failures while reading the route count as missing data.
    pub async fn compute_distance(
        &self,
        workout_id: Uuid,
        source: &dyn RouteSource,
        filter: &FilterConfig,
    ) -> f64 {
        if let Some(miles) = self.caches().distance.get(&workout_id) {
            return miles;
        }

        let segments = self.filtered_segments(workout_id, source, filter).await;
        let miles = segments
            .iter()
            .map(|coords| polyline_length_miles(coords))
            .sum::<f64>()
            .max(0.0);

        self.store_route(workout_id, miles, segments);
        miles
    }

    /// Filtered coordinates concatenated across segments.
    ///
    /// `None` means no segment produced a coordinate; that result is not
    /// cached so a later call can still load the route.
    pub async fn compute_coordinates(
        &self,
        workout_id: Uuid,
        source: &dyn RouteSource,
        filter: &FilterConfig,
    ) -> Option<Vec<Coordinate>> {
        if let Some(coords) = self.caches().coordinates.get(&workout_id) {
            return Some(coords);
        }

        let segments = self.filtered_segments(workout_id, source, filter).await;
        let miles = segments.iter().map(|c| polyline_length_miles(c)).sum::<f64>();
        let coords: Vec<Coordinate> = segments.iter().flatten().copied().collect();

        self.store_route(workout_id, miles, segments);
        if coords.is_empty() {
            None
        } else {
            Some(coords)
        }
    }

    /// Reverse-geocoded locality for a workout's first coordinate.
    ///
    /// Falls back to [`UNKNOWN_CITY`] when there is no coordinate or the
    /// geocoder fails. Fallbacks are cached like any other answer.
    pub async fn compute_city_name(
        &self,
        workout_id: Uuid,
        first_coordinate: Option<Coordinate>,
    ) -> String {
        if let Some(city) = self.caches().city.get(&workout_id) {
            return city;
        }

        let city = match first_coordinate {
            None => UNKNOWN_CITY.to_string(),
            Some(coordinate) => match self.geocoder.reverse_geocode(coordinate).await {
                Ok(Some(locality)) if !locality.is_empty() => locality,
                Ok(_) => {
                    debug!(
                        "[RouteAggregator] No locality for workout {}",
                        workout_id
                    );
                    UNKNOWN_CITY.to_string()
                }
                Err(e) => {
                    warn!(
                        "[RouteAggregator] Reverse geocode failed for {}: {}",
                        workout_id, e
                    );
                    UNKNOWN_CITY.to_string()
                }
            },
        };

        self.caches().city.insert(workout_id, city.clone());
        city
    }

    /// Parsed watch metadata, memoized per workout.
    pub fn metadata(&self, workout: &WorkoutRecord) -> Option<WatchMetadata> {
        self.caches()
            .metadata
            .get_or_compute(workout.id, || WatchMetadata::parse(&workout.metadata))
    }

    /// Distance preferring the watch-recorded final distance.
    pub async fn workout_distance(
        &self,
        workout: &WorkoutRecord,
        source: &dyn RouteSource,
        filter: &FilterConfig,
    ) -> f64 {
        if let Some(miles) = self.caches().distance.get(&workout.id) {
            return miles;
        }
        if let Some(miles) = self
            .metadata(workout)
            .and_then(|m| m.final_distance)
            .filter(|d| d.is_finite() && *d >= 0.0)
        {
            self.caches().distance.insert(workout.id, miles);
            return miles;
        }
        self.compute_distance(workout.id, source, filter).await
    }

    /// City name preferring the watch-recorded weather city, otherwise the
    /// locality of the first valid coordinate of the route.
    pub async fn workout_city_name(
        &self,
        workout: &WorkoutRecord,
        source: &dyn RouteSource,
    ) -> String {
        if let Some(city) = self.metadata(workout).as_ref().and_then(|m| m.city()) {
            let city = city.to_string();
            self.caches().city.insert(workout.id, city.clone());
            return city;
        }
        if let Some(city) = self.caches().city.get(&workout.id) {
            return city;
        }

        let first = self.first_coordinate(workout.id, source).await;
        self.compute_city_name(workout.id, first).await
    }

    /// Whatever is cached for a workout.
    pub fn cached_metrics(&self, workout_id: Uuid) -> DerivedMetrics {
        let mut caches = self.caches();
        DerivedMetrics {
            distance_miles: caches.distance.get(&workout_id),
            coordinates: caches.coordinates.get(&workout_id),
            city_name: caches.city.get(&workout_id),
        }
    }

    /// Drop every memoized value in one step.
    pub fn clear_caches(&self) {
        let mut caches = self.caches();
        caches.distance.clear();
        caches.coordinates.clear();
        caches.city.clear();
        caches.metadata.clear();
        debug!("[RouteAggregator] Caches cleared");
    }

    pub fn stats(&self) -> AggregatorStats {
        let caches = self.caches();
        AggregatorStats {
            distance: caches.distance.stats(),
            coordinates: caches.coordinates.stats(),
            city: caches.city.stats(),
            metadata: caches.metadata.stats(),
        }
    }

    /// Fill whichever of distance/coordinates is still missing. Existing
    /// entries stay untouched until the next `clear_caches`.
    fn store_route(&self, workout_id: Uuid, miles: f64, segments: Vec<Vec<Coordinate>>) {
        let coords: Vec<Coordinate> = segments.into_iter().flatten().collect();
        let mut caches = self.caches();
        if !caches.distance.contains(&workout_id) {
            caches.distance.insert(workout_id, miles);
        }
        if !coords.is_empty() && !caches.coordinates.contains(&workout_id) {
            caches.coordinates.insert(workout_id, coords);
        }
    }

    /// Retained coordinates per segment, in segment order.
    async fn filtered_segments(
        &self,
        workout_id: Uuid,
        source: &dyn RouteSource,
        filter: &FilterConfig,
    ) -> Vec<Vec<Coordinate>> {
        let handles = match source.route_segments(workout_id).await {
            Ok(handles) => handles,
            Err(e) => {
                warn!("[RouteAggregator] {}", e);
                return Vec::new();
            }
        };

        let mut segments = Vec::with_capacity(handles.len());
        for handle in handles {
            if let Some(coords) = read_segment(source, handle, filter).await {
                segments.push(coords);
            }
        }
        debug!(
            "[RouteAggregator] Workout {}: {} segments, {} retained points",
            workout_id,
            segments.len(),
            segments.iter().map(Vec::len).sum::<usize>()
        );
        segments
    }

    async fn first_coordinate(
        &self,
        workout_id: Uuid,
        source: &dyn RouteSource,
    ) -> Option<Coordinate> {
        if let Some(first) = self
            .caches()
            .coordinates
            .get(&workout_id)
            .and_then(|c| c.first().copied())
        {
            return Some(first);
        }

        let handles = source.route_segments(workout_id).await.ok()?;
        for handle in handles {
            let mut batches = source.segment_samples(handle);
            while let Some(batch) = batches.next().await {
                match batch {
                    Ok(samples) => {
                        if let Some(s) = samples.iter().find(|s| s.coordinate.is_valid()) {
                            return Some(s.coordinate);
                        }
                    }
                    Err(e) => {
                        warn!("[RouteAggregator] {}", e);
                        break;
                    }
                }
            }
        }
        None
    }
}

/// Stream one segment through the speed filter.
///
/// The stream is drained even after the filter stops. A stream error drops
/// the whole segment.
async fn read_segment(
    source: &dyn RouteSource,
    handle: SegmentHandle,
    filter: &FilterConfig,
) -> Option<Vec<Coordinate>> {
    let mut speed_filter = SpeedFilter::new(filter);
    let mut kept = Vec::new();
    let mut batches = source.segment_samples(handle);

    while let Some(batch) = batches.next().await {
        match batch {
            Ok(samples) => kept.extend(
                samples
                    .iter()
                    .filter(|s| speed_filter.accept(s))
                    .map(|s| s.coordinate),
            ),
            Err(e) => {
                warn!("[RouteAggregator] Dropping segment {}: {}", handle.id, e);
                return None;
            }
        }
    }

    if speed_filter.is_stopped() {
        debug!(
            "[RouteAggregator] Segment {} truncated after {} points",
            handle.id,
            kept.len()
        );
    }
    Some(kept)
}

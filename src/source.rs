//! Seams to the health/activity data store and the reverse geocoder.
//!
//! The traits are object safe and return boxed futures/streams so an
//! aggregator can hold `Arc<dyn RouteSource>` and be shared across tasks.
//! [`InMemoryStore`] and [`StaticGeocoder`] are process-local implementations
//! with call counters and injectable failures.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};

use futures::future::{BoxFuture, FutureExt};
use futures::stream::{self, BoxStream, StreamExt};
use log::debug;
use uuid::Uuid;

use crate::{
    Coordinate, DateRange, Result, RouteMetricsError, RouteSample, RouteSegment, SegmentHandle,
    WorkoutRecord,
};

/// Paged access to workout records.
pub trait WorkoutStore: Send + Sync {
    /// Request read access. Denial is [`RouteMetricsError::AuthorizationDenied`].
    fn authorize(&self) -> BoxFuture<'_, Result<()>>;

    /// Workouts strictly inside `range`, most recent first.
    fn fetch_workouts(
        &self,
        range: DateRange,
        limit: usize,
        offset: usize,
    ) -> BoxFuture<'_, Result<Vec<WorkoutRecord>>>;
}

/// Route data of a workout.
pub trait RouteSource: Send + Sync {
    /// Recorded segments of a workout, in recording order.
    fn route_segments(&self, workout_id: Uuid) -> BoxFuture<'_, Result<Vec<SegmentHandle>>>;

    /// Sample batches of a segment in arrival order. The stream ending is the
    /// "done" signal.
    fn segment_samples(&self, segment: SegmentHandle) -> BoxStream<'_, Result<Vec<RouteSample>>>;
}

/// Best-effort reverse geocoding.
pub trait Geocoder: Send + Sync {
    /// Locality name for a coordinate, `None` if the service has none.
    fn reverse_geocode(&self, coordinate: Coordinate) -> BoxFuture<'_, Result<Option<String>>>;
}

// ============================================================================
// In-memory store
// ============================================================================

#[derive(Debug, Default)]
struct StoreData {
    workouts: Vec<WorkoutRecord>,
    routes: HashMap<Uuid, Vec<(SegmentHandle, RouteSegment)>>,
    failing_segments: HashSet<Uuid>,
    failing_routes: HashSet<Uuid>,
    query_failure: Option<String>,
    authorized: bool,
}

/// Process-local workout store.
#[derive(Debug)]
pub struct InMemoryStore {
    data: Mutex<StoreData>,
    batch_size: usize,
    workout_queries: AtomicU32,
    segment_queries: AtomicU32,
    sample_streams: AtomicU32,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::with_batch_size(64)
    }

    /// Store that delivers samples `batch_size` at a time.
    pub fn with_batch_size(batch_size: usize) -> Self {
        Self {
            data: Mutex::new(StoreData {
                authorized: true,
                ..StoreData::default()
            }),
            batch_size: batch_size.max(1),
            workout_queries: AtomicU32::new(0),
            segment_queries: AtomicU32::new(0),
            sample_streams: AtomicU32::new(0),
        }
    }

    fn data(&self) -> MutexGuard<'_, StoreData> {
        self.data.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Add a workout with its route segments; returns the segment handles.
    pub fn add_workout(
        &self,
        workout: WorkoutRecord,
        segments: Vec<RouteSegment>,
    ) -> Vec<SegmentHandle> {
        let workout_id = workout.id;
        let entries: Vec<(SegmentHandle, RouteSegment)> = segments
            .into_iter()
            .map(|segment| {
                (
                    SegmentHandle {
                        id: Uuid::new_v4(),
                        workout_id,
                    },
                    segment,
                )
            })
            .collect();
        let handles = entries.iter().map(|(h, _)| *h).collect();

        let mut data = self.data();
        data.workouts.retain(|w| w.id != workout_id);
        data.workouts.push(workout);
        data.routes.insert(workout_id, entries);
        handles
    }

    pub fn set_authorized(&self, authorized: bool) {
        self.data().authorized = authorized;
    }

    /// Make every workout query fail with `message` (`None` to recover).
    pub fn set_query_failure(&self, message: Option<&str>) {
        self.data().query_failure = message.map(str::to_string);
    }

    /// Make a segment's sample stream fail after its first batch.
    pub fn fail_segment(&self, segment_id: Uuid) {
        self.data().failing_segments.insert(segment_id);
    }

    /// Make listing a workout's segments fail.
    pub fn fail_route_query(&self, workout_id: Uuid) {
        self.data().failing_routes.insert(workout_id);
    }

    pub fn workout_queries(&self) -> u32 {
        self.workout_queries.load(Ordering::Relaxed)
    }

    pub fn segment_queries(&self) -> u32 {
        self.segment_queries.load(Ordering::Relaxed)
    }

    pub fn sample_streams(&self) -> u32 {
        self.sample_streams.load(Ordering::Relaxed)
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkoutStore for InMemoryStore {
    fn authorize(&self) -> BoxFuture<'_, Result<()>> {
        let result = if self.data().authorized {
            Ok(())
        } else {
            Err(RouteMetricsError::AuthorizationDenied {
                message: "read access to workouts was declined".to_string(),
            })
        };
        async move {
            tokio::task::yield_now().await;
            result
        }
        .boxed()
    }

    fn fetch_workouts(
        &self,
        range: DateRange,
        limit: usize,
        offset: usize,
    ) -> BoxFuture<'_, Result<Vec<WorkoutRecord>>> {
        self.workout_queries.fetch_add(1, Ordering::Relaxed);
        let result = {
            let data = self.data();
            match &data.query_failure {
                Some(message) => Err(RouteMetricsError::store(message.clone())),
                None => {
                    let mut matching: Vec<WorkoutRecord> = data
                        .workouts
                        .iter()
                        .filter(|w| range.contains_workout(w))
                        .cloned()
                        .collect();
                    matching.sort_by(|a, b| b.start.cmp(&a.start));
                    Ok(matching.into_iter().skip(offset).take(limit).collect())
                }
            }
        };
        async move {
            tokio::task::yield_now().await;
            result
        }
        .boxed()
    }
}

impl RouteSource for InMemoryStore {
    fn route_segments(&self, workout_id: Uuid) -> BoxFuture<'_, Result<Vec<SegmentHandle>>> {
        self.segment_queries.fetch_add(1, Ordering::Relaxed);
        let result = {
            let data = self.data();
            if data.failing_routes.contains(&workout_id) {
                Err(RouteMetricsError::RouteQuery {
                    workout_id,
                    message: "route query failed".to_string(),
                })
            } else {
                Ok(data
                    .routes
                    .get(&workout_id)
                    .map(|entries| entries.iter().map(|(h, _)| *h).collect())
                    .unwrap_or_default())
            }
        };
        async move {
            tokio::task::yield_now().await;
            result
        }
        .boxed()
    }

    fn segment_samples(&self, segment: SegmentHandle) -> BoxStream<'_, Result<Vec<RouteSample>>> {
        self.sample_streams.fetch_add(1, Ordering::Relaxed);
        let data = self.data();
        let samples = data
            .routes
            .get(&segment.workout_id)
            .and_then(|entries| entries.iter().find(|(h, _)| h.id == segment.id))
            .map(|(_, s)| s.samples.clone())
            .unwrap_or_default();

        let mut batches: Vec<Result<Vec<RouteSample>>> = samples
            .chunks(self.batch_size)
            .map(|chunk| Ok(chunk.to_vec()))
            .collect();

        if data.failing_segments.contains(&segment.id) {
            batches.truncate(1);
            batches.push(Err(RouteMetricsError::SegmentFetch {
                segment_id: segment.id,
                message: "sample query failed".to_string(),
            }));
        }
        debug!(
            "[InMemoryStore] Streaming {} samples for segment {} in {} batches",
            samples.len(),
            segment.id,
            batches.len()
        );

        stream::iter(batches)
            .then(|batch| async move {
                tokio::task::yield_now().await;
                batch
            })
            .boxed()
    }
}

// ============================================================================
// Static geocoder
// ============================================================================

/// Geocoder with a fixed answer.
#[derive(Debug)]
pub struct StaticGeocoder {
    answer: Result<Option<String>>,
    calls: AtomicU32,
}

impl StaticGeocoder {
    pub fn locality(name: &str) -> Self {
        Self::with_answer(Ok(Some(name.to_string())))
    }

    pub fn no_locality() -> Self {
        Self::with_answer(Ok(None))
    }

    pub fn failing(message: &str) -> Self {
        Self::with_answer(Err(RouteMetricsError::Geocoding {
            message: message.to_string(),
        }))
    }

    fn with_answer(answer: Result<Option<String>>) -> Self {
        Self {
            answer,
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::Relaxed)
    }
}

impl Geocoder for StaticGeocoder {
    fn reverse_geocode(&self, _coordinate: Coordinate) -> BoxFuture<'_, Result<Option<String>>> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let answer = self.answer.clone();
        async move {
            tokio::task::yield_now().await;
            answer
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn workout_at(offset_hours: i64) -> WorkoutRecord {
        let start = Utc.timestamp_opt(1_700_000_000, 0).unwrap() + Duration::hours(offset_hours);
        WorkoutRecord::new(Uuid::new_v4(), start, start + Duration::minutes(30))
    }

    fn segment(n: usize) -> RouteSegment {
        RouteSegment::new(
            (0..n)
                .map(|i| {
                    RouteSample::new(
                        Coordinate::new(37.0, -76.0 + i as f64 * 0.0001),
                        2.5,
                        Utc.timestamp_opt(1_700_000_000 + i as i64, 0).unwrap(),
                    )
                })
                .collect(),
        )
    }

    fn wide_range() -> DateRange {
        DateRange::new(
            Utc.timestamp_opt(1_600_000_000, 0).unwrap(),
            Utc.timestamp_opt(1_800_000_000, 0).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_workouts_are_most_recent_first_and_paged() {
        let store = InMemoryStore::new();
        let ids: Vec<Uuid> = (0..5)
            .map(|h| {
                let w = workout_at(h);
                let id = w.id;
                store.add_workout(w, vec![]);
                id
            })
            .collect();

        let page0 = store.fetch_workouts(wide_range(), 2, 0).await.unwrap();
        let page2 = store.fetch_workouts(wide_range(), 2, 4).await.unwrap();

        assert_eq!(page0.iter().map(|w| w.id).collect::<Vec<_>>(), vec![ids[4], ids[3]]);
        assert_eq!(page2.iter().map(|w| w.id).collect::<Vec<_>>(), vec![ids[0]]);
        assert_eq!(store.workout_queries(), 2);
    }

    #[tokio::test]
    async fn test_samples_arrive_in_batches() {
        let store = InMemoryStore::with_batch_size(3);
        let w = workout_at(0);
        let handles = store.add_workout(w, vec![segment(7)]);

        let batches: Vec<_> = store.segment_samples(handles[0]).collect().await;
        let sizes: Vec<usize> = batches.iter().map(|b| b.as_ref().unwrap().len()).collect();
        assert_eq!(sizes, vec![3, 3, 1]);
    }

    #[tokio::test]
    async fn test_failing_segment_errors_after_first_batch() {
        let store = InMemoryStore::with_batch_size(2);
        let handles = store.add_workout(workout_at(0), vec![segment(6)]);
        store.fail_segment(handles[0].id);

        let batches: Vec<_> = store.segment_samples(handles[0]).collect().await;
        assert_eq!(batches.len(), 2);
        assert!(batches[0].is_ok());
        assert!(matches!(
            batches[1],
            Err(RouteMetricsError::SegmentFetch { .. })
        ));
    }

    #[tokio::test]
    async fn test_authorization_and_query_failures() {
        let store = InMemoryStore::new();
        store.set_authorized(false);
        assert!(matches!(
            store.authorize().await,
            Err(RouteMetricsError::AuthorizationDenied { .. })
        ));

        store.set_query_failure(Some("offline"));
        assert_eq!(
            store.fetch_workouts(wide_range(), 10, 0).await,
            Err(RouteMetricsError::store("offline"))
        );
    }

    #[tokio::test]
    async fn test_static_geocoder_counts_calls() {
        let geocoder = StaticGeocoder::locality("Norfolk");
        let name = geocoder
            .reverse_geocode(Coordinate::new(36.85, -76.28))
            .await
            .unwrap();
        assert_eq!(name.as_deref(), Some("Norfolk"));
        assert_eq!(geocoder.calls(), 1);
    }
}

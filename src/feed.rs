//! # Workout Feed
//!
//! Paged loading of workouts for a list view. A page load authorizes, pulls a
//! page of records from the store, drops workouts without a located route and
//! optionally drops short ones. Results travel back to presentation state as
//! [`FeedEvent`]s over a channel; [`FeedState::apply`] folds them in.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use futures::StreamExt;
use log::{debug, info, warn};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::aggregator::RouteAggregator;
use crate::metrics::{average_pace, format_duration, format_pace, RowMetrics};
use crate::source::{RouteSource, WorkoutStore};
use crate::{DateRange, FeedConfig, FilterConfig, Result, RouteMetricsError, WorkoutRecord};

/// Page load failure.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FeedError {
    /// Another page load has not finished yet
    #[error("a page load is already in progress")]
    Busy,
    #[error(transparent)]
    Metrics(#[from] RouteMetricsError),
}

/// Outcome of a background page load.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    PageLoaded {
        page: usize,
        workouts: Vec<WorkoutRecord>,
    },
    PageFailed {
        page: usize,
        error: FeedError,
    },
}

/// Presentation-side list state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedState {
    pub workouts: Vec<WorkoutRecord>,
    pub is_loading: bool,
    pub last_error: Option<String>,
}

impl FeedState {
    pub fn begin_load(&mut self) {
        self.is_loading = true;
    }

    /// Page 0 replaces the list, later pages append. Failures keep the rows
    /// already loaded.
    pub fn apply(&mut self, event: FeedEvent) {
        match event {
            FeedEvent::PageLoaded { page: 0, workouts } => {
                self.workouts = workouts;
                self.last_error = None;
            }
            FeedEvent::PageLoaded { workouts, .. } => {
                self.workouts.extend(workouts);
                self.last_error = None;
            }
            FeedEvent::PageFailed { error, .. } => {
                self.last_error = Some(error.to_string());
            }
        }
        self.is_loading = false;
    }
}

/// Clears the in-progress flag, also when the load future is dropped.
struct LoadGuard<'a>(&'a AtomicBool);

impl Drop for LoadGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Paged workout loading with per-workout metrics.
pub struct WorkoutFeed {
    store: Arc<dyn WorkoutStore>,
    routes: Arc<dyn RouteSource>,
    aggregator: Arc<RouteAggregator>,
    config: Mutex<FeedConfig>,
    loading: AtomicBool,
}

impl WorkoutFeed {
    pub fn new(
        store: Arc<dyn WorkoutStore>,
        routes: Arc<dyn RouteSource>,
        aggregator: Arc<RouteAggregator>,
        config: FeedConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store,
            routes,
            aggregator,
            config: Mutex::new(config),
            loading: AtomicBool::new(false),
        })
    }

    fn config_guard(&self) -> MutexGuard<'_, FeedConfig> {
        self.config.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn config(&self) -> FeedConfig {
        self.config_guard().clone()
    }

    pub fn aggregator(&self) -> &Arc<RouteAggregator> {
        &self.aggregator
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::Acquire)
    }

    /// The configured lookback window ending at `now`.
    pub fn default_range(&self, now: DateTime<Utc>) -> DateRange {
        DateRange::trailing_days(now, self.config_guard().lookback_days)
    }

    /// Replace the speed filter. Clears all derived metrics if it changed.
    pub fn set_filter_config(&self, filter: FilterConfig) -> bool {
        let changed = {
            let mut config = self.config_guard();
            if config.filter == filter {
                false
            } else {
                config.filter = filter;
                true
            }
        };
        if changed {
            info!(
                "[WorkoutFeed] Speed filter changed (enabled={}, limit={} mph), clearing caches",
                filter.use_speed_filter, filter.speed_limit_mph
            );
            self.aggregator.clear_caches();
        }
        changed
    }

    /// Replace the short-route cutoff. Clears all derived metrics if it changed.
    pub fn set_short_route_filter(&self, enabled: bool, min_miles: f64) -> Result<bool> {
        if !min_miles.is_finite() || min_miles < 0.0 {
            return Err(RouteMetricsError::config(
                "short_route_min_miles must be a non-negative number",
            ));
        }
        let changed = {
            let mut config = self.config_guard();
            let changed = config.short_route_filter != enabled
                || config.short_route_min_miles != min_miles;
            config.short_route_filter = enabled;
            config.short_route_min_miles = min_miles;
            changed
        };
        if changed {
            self.aggregator.clear_caches();
        }
        Ok(changed)
    }

    /// Page size for subsequent loads, clamped to the valid range.
    pub fn set_page_size(&self, page_size: usize) {
        self.config_guard().page_size = FeedConfig::clamped_page_size(page_size);
    }

    /// Load one page of workouts.
    ///
    /// Only one load runs at a time; a concurrent call gets [`FeedError::Busy`].
    pub async fn load_page(
        &self,
        page: usize,
        range: DateRange,
    ) -> std::result::Result<Vec<WorkoutRecord>, FeedError> {
        if self
            .loading
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(FeedError::Busy);
        }
        let _guard = LoadGuard(&self.loading);

        let config = self.config();
        self.store.authorize().await?;

        let offset = page.saturating_mul(config.page_size);
        let fetched = self
            .store
            .fetch_workouts(range, config.page_size, offset)
            .await?;
        debug!(
            "[WorkoutFeed] Page {}: {} workouts from store (offset {})",
            page,
            fetched.len(),
            offset
        );

        let mut workouts = Vec::with_capacity(fetched.len());
        for workout in fetched {
            if !self.has_located_sample(workout.id).await {
                continue;
            }
            if config.short_route_filter {
                let miles = self
                    .aggregator
                    .workout_distance(&workout, self.routes.as_ref(), &config.filter)
                    .await;
                if miles < config.short_route_min_miles {
                    continue;
                }
            }
            workouts.push(workout);
        }

        info!("[WorkoutFeed] Page {} loaded: {} workouts", page, workouts.len());
        Ok(workouts)
    }

    /// Run [`WorkoutFeed::load_page`] on a task and report the outcome on `tx`.
    pub fn spawn_page_load(
        self: &Arc<Self>,
        page: usize,
        range: DateRange,
        tx: mpsc::Sender<FeedEvent>,
    ) -> JoinHandle<()> {
        let feed = Arc::clone(self);
        tokio::spawn(async move {
            let event = match feed.load_page(page, range).await {
                Ok(workouts) => FeedEvent::PageLoaded { page, workouts },
                Err(error) => {
                    warn!("[WorkoutFeed] Failed to load page {}: {}", page, error);
                    FeedEvent::PageFailed { page, error }
                }
            };
            if tx.send(event).await.is_err() {
                debug!("[WorkoutFeed] Receiver dropped before page {} arrived", page);
            }
        })
    }

    /// Display metrics for one row. Never fails; missing data becomes defaults.
    pub async fn row_metrics(&self, workout: &WorkoutRecord) -> RowMetrics {
        let filter = self.config_guard().filter;
        let routes = self.routes.as_ref();

        let city_name = self.aggregator.workout_city_name(workout, routes).await;
        let distance_miles = self
            .aggregator
            .workout_distance(workout, routes, &filter)
            .await;
        let meta = self.aggregator.metadata(workout).unwrap_or_default();

        let duration_secs = meta
            .final_duration
            .filter(|d| d.is_finite() && *d > 0.0)
            .unwrap_or(workout.duration_secs);

        RowMetrics {
            workout_id: workout.id,
            city_name,
            distance_miles,
            duration_secs,
            formatted_duration: format_duration(duration_secs),
            pace: format_pace(average_pace(duration_secs, distance_miles)),
            weather_temp: meta.weather_temp,
            weather_symbol: meta.weather_symbol,
            average_speed_mph: meta.average_speed,
        }
    }

    /// Any raw sample with both coordinates non-zero. Read errors count as no.
    async fn has_located_sample(&self, workout_id: Uuid) -> bool {
        let handles = match self.routes.route_segments(workout_id).await {
            Ok(handles) => handles,
            Err(e) => {
                warn!("[WorkoutFeed] {}", e);
                return false;
            }
        };
        for handle in handles {
            let mut batches = self.routes.segment_samples(handle);
            while let Some(batch) = batches.next().await {
                match batch {
                    Ok(samples) if samples.iter().any(|s| s.coordinate.is_located()) => {
                        return true;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("[WorkoutFeed] {}", e);
                        break;
                    }
                }
            }
        }
        false
    }
}

//! Feed configuration.

use serde::{Deserialize, Serialize};

use crate::{FilterConfig, Result, RouteMetricsError};

pub const MIN_PAGE_SIZE: usize = 1;
pub const MAX_PAGE_SIZE: usize = 100;

/// Configuration for paged workout loading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Workouts requested per page.
    /// Default: 40 (valid range 1..=100)
    pub page_size: usize,

    /// Length of the default date window ending now.
    /// Default: 14 days
    pub lookback_days: u32,

    /// Hide workouts shorter than `short_route_min_miles`.
    /// Default: true
    pub short_route_filter: bool,

    /// Cutoff for the short-route filter, in miles.
    /// Default: 0.1
    pub short_route_min_miles: f64,

    /// Speed filter applied to route samples.
    pub filter: FilterConfig,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            page_size: 40,
            lookback_days: 14,
            short_route_filter: true,
            short_route_min_miles: 0.1,
            filter: FilterConfig::default(),
        }
    }
}

impl FeedConfig {
    /// Parse and validate a JSON config. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: FeedConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&self.page_size) {
            return Err(RouteMetricsError::config(format!(
                "page_size {} outside {}..={}",
                self.page_size, MIN_PAGE_SIZE, MAX_PAGE_SIZE
            )));
        }
        if !self.short_route_min_miles.is_finite() || self.short_route_min_miles < 0.0 {
            return Err(RouteMetricsError::config(
                "short_route_min_miles must be a non-negative number",
            ));
        }
        if !self.filter.speed_limit_mph.is_finite() || self.filter.speed_limit_mph <= 0.0 {
            return Err(RouteMetricsError::config(
                "speed_limit_mph must be a positive number",
            ));
        }
        Ok(())
    }

    /// Clamp a requested page size into the valid range.
    pub fn clamped_page_size(requested: usize) -> usize {
        requested.clamp(MIN_PAGE_SIZE, MAX_PAGE_SIZE)
    }
}

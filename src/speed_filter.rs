//! Speed-based outlier rejection for streamed route samples.
//!
//! Wearables sometimes keep recording after a workout ends, typically while the
//! athlete drives home. The filter treats the first sample whose speed is over
//! the configured limit as the start of vehicle travel and drops the rest of
//! that segment. Samples with a negative speed (sensor reports "unknown") are
//! always in bounds.

use crate::geo_utils::mps_to_mph;
use crate::{FilterConfig, RouteSample};

/// Number of consecutive over-limit samples that truncates a segment.
pub const MAX_CONSECUTIVE_EXCEEDS: u32 = 1;

/// Streaming filter state for a single segment.
///
/// Feed samples in arrival order with [`SpeedFilter::accept`]. Once stopped,
/// every later sample is rejected; callers keep draining their source so it can
/// signal completion.
#[derive(Debug, Clone)]
pub struct SpeedFilter {
    enabled: bool,
    speed_limit_mph: f64,
    consecutive_exceeds: u32,
    stopped: bool,
}

impl SpeedFilter {
    pub fn new(config: &FilterConfig) -> Self {
        Self {
            enabled: config.use_speed_filter,
            speed_limit_mph: config.speed_limit_mph,
            consecutive_exceeds: 0,
            stopped: false,
        }
    }

    /// Returns true if the sample should be retained.
    pub fn accept(&mut self, sample: &RouteSample) -> bool {
        if !self.enabled {
            return true;
        }
        if self.stopped {
            return false;
        }

        let speed_mph = mps_to_mph(sample.speed);
        if sample.speed < 0.0 || speed_mph <= self.speed_limit_mph {
            self.consecutive_exceeds = 0;
            return true;
        }

        self.consecutive_exceeds += 1;
        if self.consecutive_exceeds >= MAX_CONSECUTIVE_EXCEEDS {
            self.stopped = true;
        }
        false
    }

    /// Whether the segment has been truncated.
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }
}

/// Filter a complete segment, preserving sample order.
pub fn filter_segment(samples: &[RouteSample], config: &FilterConfig) -> Vec<RouteSample> {
    let mut filter = SpeedFilter::new(config);
    samples
        .iter()
        .filter(|s| filter.accept(s))
        .copied()
        .collect()
}

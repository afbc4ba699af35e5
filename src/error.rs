//! Unified error handling for the route-metrics library.
//!
//! Only page loads propagate errors to callers. Per-workout derivations
//! convert these into defaults (see [`crate::aggregator`]).

use thiserror::Error;
use uuid::Uuid;

/// Unified error type for route-metrics operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RouteMetricsError {
    /// The user declined read access to the data store
    #[error("Authorization denied: {message}")]
    AuthorizationDenied { message: String },
    /// Paged workout query failed (paging, auth or transport)
    #[error("Workout query failed: {message}")]
    StoreQuery { message: String },
    /// Listing the route segments of a workout failed
    #[error("Route query for workout '{workout_id}' failed: {message}")]
    RouteQuery { workout_id: Uuid, message: String },
    /// A segment's sample stream reported an error
    #[error("Sample stream for segment '{segment_id}' failed: {message}")]
    SegmentFetch { segment_id: Uuid, message: String },
    /// Reverse geocoding failed
    #[error("Reverse geocoding failed: {message}")]
    Geocoding { message: String },
    /// Configuration error
    #[error("Configuration error: {message}")]
    ConfigError { message: String },
}

impl RouteMetricsError {
    pub fn store(message: impl Into<String>) -> Self {
        RouteMetricsError::StoreQuery {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        RouteMetricsError::ConfigError {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for RouteMetricsError {
    fn from(e: serde_json::Error) -> Self {
        RouteMetricsError::ConfigError {
            message: e.to_string(),
        }
    }
}

/// Result type alias for route-metrics operations.
pub type Result<T> = std::result::Result<T, RouteMetricsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let id = Uuid::nil();
        let err = RouteMetricsError::SegmentFetch {
            segment_id: id,
            message: "stream closed".to_string(),
        };
        assert!(err.to_string().contains(&id.to_string()));
        assert!(err.to_string().contains("stream closed"));

        let err = RouteMetricsError::store("offline");
        assert_eq!(err.to_string(), "Workout query failed: offline");
    }

    #[test]
    fn test_json_error_is_config_error() {
        let err: RouteMetricsError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, RouteMetricsError::ConfigError { .. }));
    }
}

//! Geographic utilities: great-circle distance and unit conversions.

use geo::{Distance, Haversine, Point};

use crate::Coordinate;

/// Meters in one statute mile.
pub const METERS_PER_MILE: f64 = 1609.344;

/// Meters/second to miles/hour.
pub const MPS_TO_MPH: f64 = 2.23694;

/// Haversine distance between two coordinates in meters.
pub fn haversine_distance(p1: &Coordinate, p2: &Coordinate) -> f64 {
    let point1 = Point::new(p1.longitude, p1.latitude);
    let point2 = Point::new(p2.longitude, p2.latitude);
    Haversine::distance(point1, point2)
}

/// Convert meters to miles.
#[inline]
pub fn meters_to_miles(meters: f64) -> f64 {
    meters / METERS_PER_MILE
}

/// Convert a sensor speed in m/s to mph.
#[inline]
pub fn mps_to_mph(speed: f64) -> f64 {
    speed * MPS_TO_MPH
}

/// Sum of consecutive haversine legs along a path, in miles.
///
/// Returns 0 for paths with fewer than two points.
pub fn polyline_length_miles(points: &[Coordinate]) -> f64 {
    let meters: f64 = points
        .windows(2)
        .map(|w| haversine_distance(&w[0], &w[1]))
        .sum();
    meters_to_miles(meters)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_haversine_one_degree_at_equator() {
        let a = Coordinate::new(0.0, 0.0);
        let b = Coordinate::new(0.0, 1.0);
        let miles = meters_to_miles(haversine_distance(&a, &b));
        assert!((miles - 69.1).abs() < 0.2, "got {miles}");
    }

    #[test]
    fn test_polyline_length_short_inputs() {
        assert_eq!(polyline_length_miles(&[]), 0.0);
        assert_eq!(polyline_length_miles(&[Coordinate::new(51.5, -0.12)]), 0.0);
    }

    #[test]
    fn test_mps_to_mph() {
        assert!((mps_to_mph(10.0) - 22.3694).abs() < 1e-9);
    }
}

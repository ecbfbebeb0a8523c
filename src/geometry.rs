//! In-process geometry helpers.
//!
//! `polygon_area` is the source of truth for validation gating (minimum room
//! area). The generated `calculate-area` AutoLISP procedure mirrors it for
//! display inside AutoCAD; the two agree on simple polygons and may diverge on
//! self-intersecting input.

use crate::drawing::Point;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error, PartialEq)]
pub enum GeometryError {
    #[error("Unsupported unit conversion: {from} to {to}")]
    UnsupportedUnits { from: String, to: String },
}

/// Polygon area by the shoelace formula. Fewer than 3 points yield `0.0`.
pub fn polygon_area(points: &[Point]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let n = points.len();
    let mut twice_area = 0.0;
    for i in 0..n {
        let j = (i + 1) % n;
        twice_area += points[i].x * points[j].y;
        twice_area -= points[j].x * points[i].y;
    }
    twice_area.abs() / 2.0
}

pub fn distance(a: &Point, b: &Point) -> f64 {
    ((b.x - a.x).powi(2) + (b.y - a.y).powi(2) + (b.z - a.z).powi(2)).sqrt()
}

/// All coordinates are finite numbers.
pub fn is_valid_point(point: &Point) -> bool {
    point.to_list().iter().all(|c| c.is_finite())
}

/// At least 3 valid points; polygons with more than 3 vertices must enclose
/// a positive area.
pub fn validate_room_points(points: &[Point]) -> bool {
    if points.len() < 3 {
        error!("Room must have at least 3 points");
        return false;
    }
    if !points.iter().all(is_valid_point) {
        error!("All room points must be valid");
        return false;
    }
    if points.len() > 3 && polygon_area(points) <= 0.0 {
        error!("Room points do not form a valid polygon");
        return false;
    }
    true
}

fn inches_per_unit(unit: &str) -> Option<f64> {
    match unit {
        "mm" => Some(0.0393701),
        "cm" => Some(0.393701),
        "inches" => Some(1.0),
        "feet" => Some(12.0),
        "meters" => Some(39.3701),
        _ => None,
    }
}

/// Convert a length between `mm`, `cm`, `inches`, `feet` and `meters`.
pub fn convert_units(value: f64, from_unit: &str, to_unit: &str) -> Result<f64, GeometryError> {
    match (inches_per_unit(from_unit), inches_per_unit(to_unit)) {
        (Some(from), Some(to)) => Ok(value * from / to),
        _ => Err(GeometryError::UnsupportedUnits {
            from: from_unit.to_string(),
            to: to_unit.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn rectangle() -> Vec<Point> {
        vec![
            Point::new(0.0, 0.0),
            Point::new(100.0, 0.0),
            Point::new(100.0, 80.0),
            Point::new(0.0, 80.0),
        ]
    }

    #[test]
    fn rectangle_area() {
        assert_eq!(polygon_area(&rectangle()), 8000.0);
    }

    #[test]
    fn triangle_area() {
        let points = [Point::new(0.0, 0.0), Point::new(10.0, 0.0), Point::new(5.0, 8.0)];
        assert_eq!(polygon_area(&points), 40.0);
    }

    #[test]
    fn degenerate_inputs_have_no_area() {
        assert_eq!(polygon_area(&[]), 0.0);
        assert_eq!(polygon_area(&[Point::new(0.0, 0.0), Point::new(1.0, 1.0)]), 0.0);
    }

    #[test]
    fn circle_approximation() {
        let points: Vec<Point> = (0..100)
            .map(|i| {
                let angle = 2.0 * std::f64::consts::PI * i as f64 / 100.0;
                Point::new(50.0 * angle.cos(), 50.0 * angle.sin())
            })
            .collect();
        assert!((polygon_area(&points) - 7854.0).abs() < 100.0);
    }

    #[test]
    fn unit_conversion() {
        assert_eq!(convert_units(1.0, "feet", "inches").unwrap(), 12.0);
        assert_eq!(convert_units(24.0, "inches", "feet").unwrap(), 2.0);
        let meters = convert_units(1.0, "meters", "inches").unwrap();
        assert!((meters - 39.3701).abs() < 0.01);
        assert!(convert_units(1.0, "furlongs", "inches").is_err());
    }

    #[test]
    fn distance_is_euclidean() {
        assert_eq!(distance(&Point::new(0.0, 0.0), &Point::new(3.0, 4.0)), 5.0);
    }

    #[test]
    fn room_point_validation() {
        assert!(validate_room_points(&rectangle()));
        assert!(!validate_room_points(&rectangle()[..2]));
        let mut bad = rectangle();
        bad[1].x = f64::NAN;
        assert!(!validate_room_points(&bad));
        let collinear = [
            Point::new(0.0, 0.0),
            Point::new(1.0, 0.0),
            Point::new(2.0, 0.0),
            Point::new(3.0, 0.0),
        ];
        assert!(!validate_room_points(&collinear));
    }

    /// Star-shaped polygon around the origin: strictly increasing angles with
    /// positive radii never self-intersect.
    fn simple_polygon() -> impl Strategy<Value = Vec<Point>> {
        prop::collection::vec(1.0f64..100.0, 3..24).prop_map(|radii| {
            let n = radii.len();
            radii
                .into_iter()
                .enumerate()
                .map(|(i, r)| {
                    let angle = 2.0 * std::f64::consts::PI * i as f64 / n as f64;
                    Point::new(r * angle.cos(), r * angle.sin())
                })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn area_invariant_under_rotation(points in simple_polygon(), shift in 0usize..24) {
            let area = polygon_area(&points);
            let mut rotated = points.clone();
            rotated.rotate_left(shift % points.len());
            prop_assert!((polygon_area(&rotated) - area).abs() <= 1e-9 * area.max(1.0));
        }

        #[test]
        fn area_invariant_under_reversal(points in simple_polygon()) {
            let area = polygon_area(&points);
            let mut reversed = points.clone();
            reversed.reverse();
            prop_assert!((polygon_area(&reversed) - area).abs() <= 1e-9 * area.max(1.0));
        }
    }
}

//! Spherical (web) Mercator projection.
//!
//! Longitude passes through unchanged; latitude maps through [`lat_to_y`].
//! All tree bounding boxes and distance arithmetic operate in this projected
//! space, so the internal metric does not represent meters.

use crate::coords::{Coord, FloatCoord, COORDINATE_PRECISION};

const DEGREE_TO_RAD: f64 = std::f64::consts::PI / 180.;
const RAD_TO_DEGREE: f64 = 1. / DEGREE_TO_RAD;

/// Project a geographic latitude (degrees) to Mercator y (degrees).
///
/// Uses the sinh-free formulation y = R/2 * ln((1 + sin φ) / (1 - sin φ)).
/// Clamped to ±180 so poles cannot produce infinities downstream.
pub fn lat_to_y(latitude: f64) -> f64 {
    let f = (DEGREE_TO_RAD * latitude).sin();
    let y = RAD_TO_DEGREE * 0.5 * ((1. + f) / (1. - f)).ln();
    y.clamp(-180., 180.)
}

/// Inverse of [`lat_to_y`].
pub fn y_to_lat(y: f64) -> f64 {
    let clamped_y = y.clamp(-180., 180.);
    let normalized_lat = RAD_TO_DEGREE * 2. * (clamped_y * DEGREE_TO_RAD).exp().atan();
    normalized_lat - 90.
}

/// Project a fixed-point geographic coordinate into floating Mercator space.
pub fn from_wgs84(wgs84: Coord) -> FloatCoord {
    FloatCoord {
        lon: wgs84.lon_degrees(),
        lat: lat_to_y(wgs84.lat_degrees()),
    }
}

/// Project a fixed-point geographic coordinate into fixed-point Mercator
/// space. Rounds the projected latitude back to fixed precision.
pub fn from_wgs84_fixed(wgs84: Coord) -> Coord {
    Coord::from(from_wgs84(wgs84))
}

/// [`lat_to_y`] on a fixed-point latitude, staying fixed-point.
pub fn lat_to_y_fixed(lat: i32) -> i32 {
    (lat_to_y(lat as f64 / COORDINATE_PRECISION) * COORDINATE_PRECISION).round() as i32
}

#[test]
fn equator_is_fixed_point() {
    assert_eq!(lat_to_y(0.), 0.);
    assert!(y_to_lat(0.).abs() < 1e-12);
}

#[test]
fn projection_round_trips() {
    for &lat in &[-60., -45., -1.5, 0.25, 30., 72.] {
        let y = lat_to_y(lat);
        assert!((y_to_lat(y) - lat).abs() < 1e-9, "lat {lat} -> y {y}");
    }
}

#[test]
fn poles_are_clamped() {
    assert_eq!(lat_to_y(90.), 180.);
    assert_eq!(lat_to_y(-90.), -180.);
}

#[test]
fn longitude_passes_through() {
    let projected = from_wgs84(Coord::from_degrees(13.4, 52.5));
    assert_eq!(projected.lon, 13.4);
    assert!(projected.lat > 52.5);
}

//! Fixed-point coordinates and the planar distance primitives shared by the
//! packers and the query engine.
//!
//! Geographic and projected positions use the same [`Coord`] representation
//! (degrees, or Mercator-projected degrees, times [`COORDINATE_PRECISION`]).
//! The two spaces are never mixed in a single comparison; which one a value
//! lives in is determined by where it came from.

/// Fixed-point scale: 1 degree == 1_000_000 units.
pub const COORDINATE_PRECISION: f64 = 1e6;

/// A fixed-point (longitude, latitude) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(C)]
pub struct Coord {
    pub lon: i32,
    pub lat: i32,
}

impl Coord {
    pub fn new(lon: i32, lat: i32) -> Coord {
        Coord { lon, lat }
    }

    /// Build from floating degrees, rounding to fixed-point.
    pub fn from_degrees(lon: f64, lat: f64) -> Coord {
        Coord {
            lon: (lon * COORDINATE_PRECISION).round() as i32,
            lat: (lat * COORDINATE_PRECISION).round() as i32,
        }
    }

    pub fn lon_degrees(&self) -> f64 {
        self.lon as f64 / COORDINATE_PRECISION
    }

    pub fn lat_degrees(&self) -> f64 {
        self.lat as f64 / COORDINATE_PRECISION
    }
}

/// Floating counterpart of [`Coord`], used for projection and segment math.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FloatCoord {
    pub lon: f64,
    pub lat: f64,
}

impl From<Coord> for FloatCoord {
    fn from(c: Coord) -> FloatCoord {
        FloatCoord {
            lon: c.lon_degrees(),
            lat: c.lat_degrees(),
        }
    }
}

impl From<FloatCoord> for Coord {
    fn from(c: FloatCoord) -> Coord {
        Coord::from_degrees(c.lon, c.lat)
    }
}

/// Midpoint of two fixed-point coordinates.
pub fn centroid(a: Coord, b: Coord) -> Coord {
    Coord {
        lon: ((a.lon as i64 + b.lon as i64) / 2) as i32,
        lat: ((a.lat as i64 + b.lat as i64) / 2) as i32,
    }
}

/// Squared Euclidean distance in fixed-point units squared.
///
/// u64 so that antipodal planet-scale inputs cannot overflow: the largest
/// per-axis delta is below 2^32, its square below 2^63.
pub fn squared_distance(lhs: Coord, rhs: Coord) -> u64 {
    let d_lon = (lhs.lon as i64) - (rhs.lon as i64);
    let d_lat = (lhs.lat as i64) - (rhs.lat as i64);
    (d_lon * d_lon + d_lat * d_lat) as u64
}

/// Foot of the perpendicular from `point` onto the segment `source`-`target`,
/// clamped to the segment. Returns the clamped ratio along the segment and
/// the projected coordinate. A degenerate zero-length segment projects onto
/// `source`.
pub fn project_point_on_segment(
    source: FloatCoord,
    target: FloatCoord,
    point: FloatCoord,
) -> (f64, FloatCoord) {
    let slope_lon = target.lon - source.lon;
    let slope_lat = target.lat - source.lat;
    let rel_lon = point.lon - source.lon;
    let rel_lat = point.lat - source.lat;

    let unnormed_ratio = slope_lon * rel_lon + slope_lat * rel_lat;
    let squared_length = slope_lon * slope_lon + slope_lat * slope_lat;

    if squared_length < f64::EPSILON {
        return (0., source);
    }

    let ratio = (unnormed_ratio / squared_length).clamp(0., 1.);
    (
        ratio,
        FloatCoord {
            lon: source.lon + ratio * slope_lon,
            lat: source.lat + ratio * slope_lat,
        },
    )
}

#[test]
fn centroid_is_midpoint() {
    let a = Coord::from_degrees(0.0, 0.0);
    let b = Coord::from_degrees(1.0, 2.0);
    assert_eq!(centroid(a, b), Coord::from_degrees(0.5, 1.0));
}

#[test]
fn squared_distance_is_symmetric() {
    let a = Coord::new(3_000_000, 4_000_000);
    let b = Coord::new(0, 0);
    assert_eq!(squared_distance(a, b), 25_000_000_000_000);
    assert_eq!(squared_distance(a, b), squared_distance(b, a));
}

#[test]
fn projection_clamps_to_segment() {
    let a = FloatCoord { lon: 0., lat: 0. };
    let b = FloatCoord { lon: 1., lat: 0. };

    let (ratio, foot) = project_point_on_segment(a, b, FloatCoord { lon: 0.25, lat: 1. });
    assert_eq!(ratio, 0.25);
    assert_eq!(foot, FloatCoord { lon: 0.25, lat: 0. });

    let (ratio, foot) = project_point_on_segment(a, b, FloatCoord { lon: 2., lat: 1. });
    assert_eq!(ratio, 1.);
    assert_eq!(foot, b);

    let (ratio, foot) = project_point_on_segment(a, b, FloatCoord { lon: -2., lat: 1. });
    assert_eq!(ratio, 0.);
    assert_eq!(foot, a);
}

#[test]
fn projection_handles_degenerate_segment() {
    let a = FloatCoord { lon: 5., lat: 5. };
    let (ratio, foot) = project_point_on_segment(a, a, FloatCoord { lon: 7., lat: 7. });
    assert_eq!(ratio, 0.);
    assert_eq!(foot, a);
}

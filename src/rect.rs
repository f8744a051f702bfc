//! Axis-aligned bounding boxes over fixed-point coordinates.

use crate::coords::Coord;

/// Fixed-point axis-aligned rectangle. The default value is empty: the
/// extrema are sentinels chosen so that any `extend` produces a valid box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct Rect {
    pub min_lon: i32,
    pub max_lon: i32,
    pub min_lat: i32,
    pub max_lat: i32,
}

impl Default for Rect {
    fn default() -> Rect {
        Rect {
            min_lon: i32::MAX,
            max_lon: i32::MIN,
            min_lat: i32::MAX,
            max_lat: i32::MIN,
        }
    }
}

impl Rect {
    pub fn new(min_lon: i32, max_lon: i32, min_lat: i32, max_lat: i32) -> Rect {
        Rect {
            min_lon,
            max_lon,
            min_lat,
            max_lat,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.min_lon <= self.max_lon && self.min_lat <= self.max_lat
    }

    /// Grow to cover a point.
    pub fn extend(&mut self, coord: Coord) {
        self.min_lon = self.min_lon.min(coord.lon);
        self.max_lon = self.max_lon.max(coord.lon);
        self.min_lat = self.min_lat.min(coord.lat);
        self.max_lat = self.max_lat.max(coord.lat);
    }

    /// Grow to cover another rectangle.
    pub fn merge(&mut self, other: &Rect) {
        self.min_lon = self.min_lon.min(other.min_lon);
        self.max_lon = self.max_lon.max(other.max_lon);
        self.min_lat = self.min_lat.min(other.min_lat);
        self.max_lat = self.max_lat.max(other.max_lat);
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        if self.max_lon < other.min_lon {
            return false;
        }
        if self.max_lat < other.min_lat {
            return false;
        }
        if self.min_lon > other.max_lon {
            return false;
        }
        if self.min_lat > other.max_lat {
            return false;
        }
        true
    }

    pub fn contains(&self, coord: Coord) -> bool {
        (self.min_lon..=self.max_lon).contains(&coord.lon)
            && (self.min_lat..=self.max_lat).contains(&coord.lat)
    }

    pub fn centroid(&self) -> Coord {
        Coord {
            lon: ((self.min_lon as i64 + self.max_lon as i64) / 2) as i32,
            lat: ((self.min_lat as i64 + self.max_lat as i64) / 2) as i32,
        }
    }

    /// Squared distance from a point to the nearest edge or corner of the
    /// rectangle, in fixed-point units squared. Zero if the point is inside.
    pub fn min_squared_dist(&self, coord: Coord) -> u64 {
        let d_lon = if coord.lon < self.min_lon {
            (self.min_lon as i64) - (coord.lon as i64)
        } else if coord.lon > self.max_lon {
            (coord.lon as i64) - (self.max_lon as i64)
        } else {
            0
        };
        let d_lat = if coord.lat < self.min_lat {
            (self.min_lat as i64) - (coord.lat as i64)
        } else if coord.lat > self.max_lat {
            (coord.lat as i64) - (self.max_lat as i64)
        } else {
            0
        };
        (d_lon * d_lon + d_lat * d_lat) as u64
    }
}

#[test]
fn extend_makes_empty_rect_valid() {
    let mut r = Rect::default();
    assert!(!r.is_valid());
    r.extend(Coord::new(5, -3));
    assert!(r.is_valid());
    assert_eq!(r, Rect::new(5, 5, -3, -3));
}

#[test]
fn merge_is_union() {
    let mut r = Rect::new(0, 1, 0, 1);
    r.merge(&Rect::new(-2, 0, 3, 4));
    assert_eq!(r, Rect::new(-2, 1, 0, 4));
}

#[test]
fn intersects_touching_boxes() {
    let a = Rect::new(0, 10, 0, 10);
    assert!(a.intersects(&Rect::new(10, 20, 10, 20)));
    assert!(a.intersects(&Rect::new(2, 3, 2, 3)));
    assert!(!a.intersects(&Rect::new(11, 20, 0, 10)));
    assert!(!a.intersects(&Rect::new(0, 10, -5, -1)));
}

#[test]
fn min_squared_dist_cases() {
    let r = Rect::new(0, 10, 0, 10);
    // inside
    assert_eq!(r.min_squared_dist(Coord::new(5, 5)), 0);
    // nearest point is an edge
    assert_eq!(r.min_squared_dist(Coord::new(5, 13)), 9);
    assert_eq!(r.min_squared_dist(Coord::new(-4, 5)), 16);
    // nearest point is a corner
    assert_eq!(r.min_squared_dist(Coord::new(13, 14)), 25);
}

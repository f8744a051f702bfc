//! Bulk-loaded, disk-backed R-tree for nearest-edge queries on a static
//! road network.
//!
//! The index stores undirected geometry edges keyed by their endpoint
//! coordinates in a caller-owned table. It is built once with one of three
//! packing strategies (Hilbert curve, STR, or OMT), persisted as a
//! memory-mappable leaf file plus a compact node file, and then serves two
//! queries: all edges intersecting a geographic window, and the k nearest
//! edges to a point, ranked by squared Euclidean distance in a spherical
//! Mercator projection. The structure is immutable after build; a rebuild
//! writes new files.
//!
//! ## Building an index
//!
//! ```no_run
//! use roadtree::{build, Coord, Edge, PackingMethod, SegmentId};
//! use std::path::Path;
//!
//! # fn main() -> roadtree::Result<()> {
//! let coords = vec![
//!     Coord::from_degrees(13.3888, 52.5170),
//!     Coord::from_degrees(13.3976, 52.5206),
//! ];
//! let edges = vec![Edge::new(0, 1, SegmentId::new(1, true), SegmentId::new(2, true))];
//! build(
//!     &edges,
//!     &coords,
//!     Path::new("network.ramIndex"),
//!     Path::new("network.fileIndex"),
//!     PackingMethod::Omt,
//! )?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Querying
//!
//! ```no_run
//! use roadtree::{Coord, RoadTree};
//! use std::path::Path;
//!
//! # fn main() -> roadtree::Result<()> {
//! # let coords: Vec<Coord> = vec![];
//! let tree = RoadTree::open(
//!     Path::new("network.ramIndex"),
//!     Path::new("network.fileIndex"),
//!     &coords,
//! )?;
//! for edge in tree.nearest(Coord::from_degrees(13.39, 52.52), 5) {
//!     println!("segment {}", edge.forward_segment_id.id());
//! }
//! # Ok(())
//! # }
//! ```

mod coords;
mod error;
mod hilbert;
mod index;
mod mercator;
mod packer;
mod rect;
mod tree;

pub use coords::{
    centroid, project_point_on_segment, squared_distance, Coord, FloatCoord, COORDINATE_PRECISION,
};
pub use error::{Error, Result};
pub use hilbert::hilbert_code;
pub use index::{CandidateSegment, RoadTree};
pub use mercator::{from_wgs84, from_wgs84_fixed, lat_to_y, y_to_lat};
pub use packer::{build, PackingMethod};
pub use rect::Rect;
pub use tree::{
    Edge, LeafNode, SegmentId, TreeIndex, TreeNode, BRANCHING_FACTOR, LEAF_CAPACITY,
    LEAF_PAGE_SIZE,
};

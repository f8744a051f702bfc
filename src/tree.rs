//! On-disk node types.
//!
//! Every struct here is `#[repr(C)]` with a pinned little-endian layout:
//! leaf pages are written to and memory-mapped from the leaf file byte for
//! byte, and tree nodes round-trip through the node file the same way. The
//! `const` asserts at the bottom keep the layout honest.

use crate::coords::Coord;
use crate::rect::Rect;
use std::mem::size_of;

/// Maximum children per internal node.
pub const BRANCHING_FACTOR: usize = 128;

/// On-disk size of one leaf page. Must be a power of two; leaves are mapped
/// directly out of the file, so each page is also aligned to this size.
pub const LEAF_PAGE_SIZE: usize = 4096;

/// Edges per leaf page, derived so that a leaf fills its page exactly.
pub const LEAF_CAPACITY: usize =
    (LEAF_PAGE_SIZE - size_of::<u32>() - size_of::<Rect>()) / size_of::<Edge>();

const LEAF_PADDING: usize =
    LEAF_PAGE_SIZE - size_of::<u32>() - size_of::<Rect>() - LEAF_CAPACITY * size_of::<Edge>();

/// A directed-segment id with an enabled flag packed into the high bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(transparent)]
pub struct SegmentId(u32);

impl SegmentId {
    const ENABLED_BIT: u32 = 1 << 31;

    pub fn new(id: u32, enabled: bool) -> SegmentId {
        debug_assert!(id & Self::ENABLED_BIT == 0, "segment id exceeds 31 bits");
        SegmentId(id | if enabled { Self::ENABLED_BIT } else { 0 })
    }

    pub fn id(&self) -> u32 {
        self.0 & !Self::ENABLED_BIT
    }

    pub fn enabled(&self) -> bool {
        self.0 & Self::ENABLED_BIT != 0
    }

    /// AND the enabled flag with `keep`; the id is untouched.
    pub fn mask_enabled(&mut self, keep: bool) {
        if !keep {
            self.0 &= !Self::ENABLED_BIT;
        }
    }
}

/// An undirected road-network segment: two indices into the caller's
/// coordinate table plus the forward/reverse segment ids it stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(C)]
pub struct Edge {
    pub u: u32,
    pub v: u32,
    pub forward_segment_id: SegmentId,
    pub reverse_segment_id: SegmentId,
}

impl Edge {
    pub fn new(u: u32, v: u32, forward_segment_id: SegmentId, reverse_segment_id: SegmentId) -> Edge {
        Edge {
            u,
            v,
            forward_segment_id,
            reverse_segment_id,
        }
    }
}

/// Reference to either an internal node or a leaf page: a 31-bit index with
/// the is-leaf flag in the high bit. The bit position is part of the on-disk
/// format, shared by writer and reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(transparent)]
pub struct TreeIndex(u32);

impl TreeIndex {
    const LEAF_BIT: u32 = 1 << 31;

    /// The root node: index 0 of the node array.
    pub const ROOT: TreeIndex = TreeIndex(0);

    pub fn new(index: usize, is_leaf: bool) -> TreeIndex {
        debug_assert!(index < Self::LEAF_BIT as usize, "tree index exceeds 31 bits");
        TreeIndex(index as u32 | if is_leaf { Self::LEAF_BIT } else { 0 })
    }

    pub fn index(&self) -> usize {
        (self.0 & !Self::LEAF_BIT) as usize
    }

    pub fn is_leaf(&self) -> bool {
        self.0 & Self::LEAF_BIT != 0
    }
}

/// Internal node: child count, covering rectangle in projected space, and a
/// fixed child table. Stored in a flat array with the root at index 0 and
/// children always at strictly greater indices.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct TreeNode {
    pub child_count: u32,
    pub mbr: Rect,
    pub children: [TreeIndex; BRANCHING_FACTOR],
}

impl Default for TreeNode {
    fn default() -> TreeNode {
        TreeNode {
            child_count: 0,
            mbr: Rect::default(),
            children: [TreeIndex::default(); BRANCHING_FACTOR],
        }
    }
}

impl TreeNode {
    pub fn children(&self) -> &[TreeIndex] {
        &self.children[..self.child_count as usize]
    }

    pub fn push_child(&mut self, child: TreeIndex) {
        debug_assert!((self.child_count as usize) < BRANCHING_FACTOR);
        self.children[self.child_count as usize] = child;
        self.child_count += 1;
    }
}

/// One leaf page: edge count, covering rectangle of the projected edge
/// endpoints, and the edge table. Fills its on-disk page exactly; the
/// explicit tail padding keeps every written byte initialized, which is what
/// makes builds byte-for-byte reproducible.
#[derive(Clone, Copy)]
#[repr(C, align(4096))]
pub struct LeafNode {
    pub object_count: u32,
    pub mbr: Rect,
    pub objects: [Edge; LEAF_CAPACITY],
    _padding: [u8; LEAF_PADDING],
}

impl Default for LeafNode {
    fn default() -> LeafNode {
        LeafNode {
            object_count: 0,
            mbr: Rect::default(),
            objects: [Edge::default(); LEAF_CAPACITY],
            _padding: [0; LEAF_PADDING],
        }
    }
}

impl LeafNode {
    pub fn edges(&self) -> &[Edge] {
        &self.objects[..self.object_count as usize]
    }
}

/// Midpoint of an edge's endpoints, looked up in the coordinate table.
pub(crate) fn edge_centroid(edge: &Edge, coords: &[Coord]) -> Coord {
    crate::coords::centroid(coords[edge.u as usize], coords[edge.v as usize])
}

const _: () = assert!(LEAF_PAGE_SIZE.is_power_of_two());
const _: () = assert!(size_of::<Edge>() == 16);
const _: () = assert!(size_of::<Rect>() == 16);
const _: () = assert!(size_of::<TreeNode>() == 532);
const _: () = assert!(size_of::<LeafNode>() == LEAF_PAGE_SIZE);
const _: () = assert!(std::mem::align_of::<LeafNode>() == LEAF_PAGE_SIZE);

#[test]
fn tree_index_round_trips_both_flags() {
    let node = TreeIndex::new(1234, false);
    assert_eq!(node.index(), 1234);
    assert!(!node.is_leaf());

    let leaf = TreeIndex::new((1 << 31) - 1, true);
    assert_eq!(leaf.index(), (1 << 31) - 1);
    assert!(leaf.is_leaf());
}

#[test]
fn segment_id_masking_only_clears() {
    let mut id = SegmentId::new(77, true);
    id.mask_enabled(true);
    assert!(id.enabled());
    id.mask_enabled(false);
    assert!(!id.enabled());
    assert_eq!(id.id(), 77);
    // masking a disabled id with true must not re-enable it
    id.mask_enabled(true);
    assert!(!id.enabled());
}

#[test]
fn leaf_capacity_exceeds_branching_factor() {
    // The OMT packer emits one leaf per recursion range of up to
    // BRANCHING_FACTOR edges, so a leaf page must be able to hold that many.
    assert!(LEAF_CAPACITY >= BRANCHING_FACTOR);
}

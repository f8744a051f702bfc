//! The loaded index: node array in memory, leaf pages memory-mapped, and the
//! two query algorithms over them.

use crate::coords::{project_point_on_segment, squared_distance, Coord, FloatCoord};
use crate::error::{Error, Result};
use crate::mercator;
use crate::rect::Rect;
use crate::tree::{Edge, LeafNode, TreeIndex, TreeNode, BRANCHING_FACTOR, LEAF_PAGE_SIZE};
use byteorder::{LittleEndian, ReadBytesExt};
use log::debug;
use memmap2::Mmap;
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, VecDeque};
use std::fs::File;
use std::io::{BufReader, Read};
use std::mem::{align_of, size_of};
use std::path::Path;

/// One edge paired with the projected point on it closest to the query.
/// What the nearest-neighbor filter and terminator see.
#[derive(Debug, Clone, Copy)]
pub struct CandidateSegment {
    pub fixed_projected_coordinate: Coord,
    pub data: Edge,
}

// Priority-queue entry: a tree node (or leaf page) with a lower bound on the
// distance to anything inside it, or a concrete segment with its exact
// projected distance. The mixing is sound because a page's lower bound never
// exceeds the distance to any segment stored in it.
enum Candidate {
    TreeRef(TreeIndex),
    SegmentHit {
        leaf: TreeIndex,
        segment_index: u32,
        projected: Coord,
    },
}

struct QueryCandidate {
    squared_min_dist: u64,
    candidate: Candidate,
}

impl PartialEq for QueryCandidate {
    fn eq(&self, other: &Self) -> bool {
        self.squared_min_dist == other.squared_min_dist
    }
}

impl Eq for QueryCandidate {}

impl PartialOrd for QueryCandidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueryCandidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.squared_min_dist.cmp(&other.squared_min_dist)
    }
}

/// A read-only road-network edge index, bulk-loaded by [`crate::build`].
///
/// The internal node array is read into memory; leaf pages stay on disk and
/// are memory-mapped. The coordinate table is borrowed from the caller and
/// must outlive the index. Queries never mutate, so one loaded index can
/// serve any number of concurrent readers.
#[derive(Debug)]
pub struct RoadTree<'a> {
    search_tree: Vec<TreeNode>,
    coords: &'a [Coord],
    leaves_region: Mmap,
    leaf_count: usize,
}

impl<'a> RoadTree<'a> {
    /// Load the node file and map the leaf file.
    ///
    /// Fails if either file is structurally inconsistent: truncated node
    /// array, leaf file not a whole number of pages, a mapping that is not
    /// page-aligned, or child references outside the loaded arrays.
    pub fn open(node_path: &Path, leaf_path: &Path, coords: &'a [Coord]) -> Result<RoadTree<'a>> {
        let search_tree = read_node_file(node_path)?;

        let leaf_file = File::open(leaf_path)?;
        let leaf_file_size = leaf_file.metadata()?.len() as usize;
        if leaf_file_size == 0 {
            return Err(Error::Format(format!("leaf file {leaf_path:?} is empty")));
        }
        if leaf_file_size % LEAF_PAGE_SIZE != 0 {
            return Err(Error::Format(format!(
                "leaf file {:?} holds {} bytes, not a multiple of the {} byte page size",
                leaf_path, leaf_file_size, LEAF_PAGE_SIZE
            )));
        }
        let leaves_region = unsafe { Mmap::map(&leaf_file)? };
        // Leaves are used in place; an unaligned mapping would make that
        // undefined behavior, so refuse it rather than copy.
        if leaves_region.as_ptr() as usize % align_of::<LeafNode>() != 0 {
            return Err(Error::Format(format!(
                "leaf file {leaf_path:?} mapping is not aligned to the page size"
            )));
        }
        let leaf_count = leaves_region.len() / LEAF_PAGE_SIZE;

        let tree = RoadTree {
            search_tree,
            coords,
            leaves_region,
            leaf_count,
        };
        tree.validate_children()?;
        debug!(
            "opened index with {} tree nodes and {} leaf nodes",
            tree.search_tree.len(),
            tree.leaf_count
        );
        Ok(tree)
    }

    fn validate_children(&self) -> Result<()> {
        for (index, node) in self.search_tree.iter().enumerate() {
            if node.child_count as usize > BRANCHING_FACTOR {
                return Err(Error::Format(format!(
                    "tree node {} declares {} children, more than the branching factor",
                    index, node.child_count
                )));
            }
            for child in node.children() {
                let in_range = if child.is_leaf() {
                    child.index() < self.leaf_count
                } else {
                    child.index() > index && child.index() < self.search_tree.len()
                };
                if !in_range {
                    return Err(Error::Format(format!(
                        "tree node {} references a child outside the index",
                        index
                    )));
                }
            }
        }
        Ok(())
    }

    /// Leaf pages, borrowed straight from the mapping.
    pub fn leaves(&self) -> &[LeafNode] {
        unsafe {
            std::slice::from_raw_parts(
                self.leaves_region.as_ptr() as *const LeafNode,
                self.leaf_count,
            )
        }
    }

    /// Internal nodes in topological order, root first.
    pub fn nodes(&self) -> &[TreeNode] {
        &self.search_tree
    }

    pub fn leaf_count(&self) -> usize {
        self.leaf_count
    }

    pub fn node_count(&self) -> usize {
        self.search_tree.len()
    }

    /// Covering rectangle of the whole network, in projected space.
    pub fn extent(&self) -> Rect {
        self.search_tree[0].mbr
    }

    fn child_mbr(&self, child: TreeIndex) -> Rect {
        if child.is_leaf() {
            self.leaves()[child.index()].mbr
        } else {
            self.search_tree[child.index()].mbr
        }
    }

    /// All edges whose geographic endpoint bounding box intersects
    /// `search_rect` (given in unprojected geographic coordinates).
    ///
    /// Node mbrs are stored in projected space, so the tree descent tests
    /// against the latitude-projected rectangle; the per-edge test at the
    /// leaves goes back to geographic space, recomputing each edge's bbox
    /// from the coordinate table.
    pub fn search_in_box(&self, search_rect: Rect) -> Vec<Edge> {
        let projected_rect = Rect::new(
            search_rect.min_lon,
            search_rect.max_lon,
            mercator::lat_to_y_fixed(search_rect.min_lat),
            mercator::lat_to_y_fixed(search_rect.max_lat),
        );
        let mut results = Vec::new();

        let mut traversal_queue = VecDeque::new();
        traversal_queue.push_back(TreeIndex::ROOT);

        while let Some(current) = traversal_queue.pop_front() {
            if current.is_leaf() {
                for edge in self.leaves()[current.index()].edges() {
                    let u = self.coords[edge.u as usize];
                    let v = self.coords[edge.v as usize];
                    let bbox = Rect::new(
                        u.lon.min(v.lon),
                        u.lon.max(v.lon),
                        u.lat.min(v.lat),
                        u.lat.max(v.lat),
                    );
                    if bbox.intersects(&search_rect) {
                        results.push(*edge);
                    }
                }
            } else {
                for &child in self.search_tree[current.index()].children() {
                    if self.child_mbr(child).intersects(&projected_rect) {
                        traversal_queue.push_back(child);
                    }
                }
            }
        }
        results
    }

    /// The `max_results` nearest edges to `input_coordinate`, closest first.
    pub fn nearest(&self, input_coordinate: Coord, max_results: usize) -> Vec<Edge> {
        self.nearest_with(
            input_coordinate,
            |_| (true, true),
            |num_results, _| num_results >= max_results,
        )
    }

    /// Best-first nearest-edge search with caller-supplied behavior.
    ///
    /// Edges come out in non-decreasing squared projected distance. For each
    /// candidate, `terminate(results_so_far, candidate)` is consulted first;
    /// returning true ends the search *without* admitting the candidate.
    /// Then `filter` decides whether the edge is used in the forward and/or
    /// reverse direction; both false discards it, anything else is ANDed
    /// into the edge's enabled flags and the edge is appended.
    pub fn nearest_with(
        &self,
        input_coordinate: Coord,
        mut filter: impl FnMut(&CandidateSegment) -> (bool, bool),
        mut terminate: impl FnMut(usize, &CandidateSegment) -> bool,
    ) -> Vec<Edge> {
        let mut results = Vec::new();
        let projected_coordinate = mercator::from_wgs84(input_coordinate);
        let fixed_projected_coordinate = Coord::from(projected_coordinate);

        let mut traversal_queue = BinaryHeap::new();
        traversal_queue.push(Reverse(QueryCandidate {
            squared_min_dist: 0,
            candidate: Candidate::TreeRef(TreeIndex::ROOT),
        }));

        while let Some(Reverse(current)) = traversal_queue.pop() {
            match current.candidate {
                Candidate::TreeRef(tree_index) if tree_index.is_leaf() => {
                    self.explore_leaf_node(
                        tree_index,
                        fixed_projected_coordinate,
                        projected_coordinate,
                        &mut traversal_queue,
                    );
                }
                Candidate::TreeRef(tree_index) => {
                    self.explore_tree_node(
                        tree_index,
                        fixed_projected_coordinate,
                        &mut traversal_queue,
                    );
                }
                Candidate::SegmentHit {
                    leaf,
                    segment_index,
                    projected,
                } => {
                    let mut edge_data = self.leaves()[leaf.index()].objects[segment_index as usize];
                    let current_candidate = CandidateSegment {
                        fixed_projected_coordinate: projected,
                        data: edge_data,
                    };

                    // Checked before admission so a restrictive filter can
                    // still drain to an empty result instead of looping.
                    if terminate(results.len(), &current_candidate) {
                        break;
                    }

                    let (use_forward, use_reverse) = filter(&current_candidate);
                    if !use_forward && !use_reverse {
                        continue;
                    }
                    edge_data.forward_segment_id.mask_enabled(use_forward);
                    edge_data.reverse_segment_id.mask_enabled(use_reverse);
                    results.push(edge_data);
                }
            }
        }

        results
    }

    fn explore_leaf_node(
        &self,
        leaf_id: TreeIndex,
        fixed_projected_coordinate: Coord,
        projected_coordinate: FloatCoord,
        traversal_queue: &mut BinaryHeap<Reverse<QueryCandidate>>,
    ) {
        for (i, edge) in self.leaves()[leaf_id.index()].edges().iter().enumerate() {
            let projected_u = mercator::from_wgs84(self.coords[edge.u as usize]);
            let projected_v = mercator::from_wgs84(self.coords[edge.v as usize]);
            let (_, projected_nearest) =
                project_point_on_segment(projected_u, projected_v, projected_coordinate);
            let projected = Coord::from(projected_nearest);
            traversal_queue.push(Reverse(QueryCandidate {
                squared_min_dist: squared_distance(fixed_projected_coordinate, projected),
                candidate: Candidate::SegmentHit {
                    leaf: leaf_id,
                    segment_index: i as u32,
                    projected,
                },
            }));
        }
    }

    fn explore_tree_node(
        &self,
        parent_id: TreeIndex,
        fixed_projected_coordinate: Coord,
        traversal_queue: &mut BinaryHeap<Reverse<QueryCandidate>>,
    ) {
        for &child in self.search_tree[parent_id.index()].children() {
            traversal_queue.push(Reverse(QueryCandidate {
                squared_min_dist: self
                    .child_mbr(child)
                    .min_squared_dist(fixed_projected_coordinate),
                candidate: Candidate::TreeRef(child),
            }));
        }
    }
}

/// Node file layout: u64 node count, then the raw node array.
fn read_node_file(node_path: &Path) -> Result<Vec<TreeNode>> {
    let node_file = File::open(node_path)?;
    let file_size = node_file.metadata()?.len();
    let mut reader = BufReader::new(node_file);

    let node_count = reader.read_u64::<LittleEndian>()? as usize;
    if node_count == 0 {
        return Err(Error::Format(format!(
            "node file {node_path:?} declares zero nodes"
        )));
    }
    let expected_size = size_of::<u64>() as u64 + (node_count as u64) * size_of::<TreeNode>() as u64;
    if file_size != expected_size {
        return Err(Error::Format(format!(
            "node file {node_path:?} holds {file_size} bytes but its count header implies {expected_size}"
        )));
    }

    let mut search_tree: Vec<TreeNode> = Vec::with_capacity(node_count);
    let buf = unsafe {
        std::slice::from_raw_parts_mut(
            search_tree.as_mut_ptr() as *mut u8,
            node_count * size_of::<TreeNode>(),
        )
    };
    reader.read_exact(buf)?;
    unsafe {
        search_tree.set_len(node_count);
    }
    Ok(search_tree)
}

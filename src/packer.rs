//! Bulk construction of the on-disk index.
//!
//! All three packing strategies produce the same two artifacts: a leaf file
//! of page-sized [`LeafNode`] records in final on-disk order, and a node file
//! holding the internal [`TreeNode`] array in topological order, root first.
//! They differ only in how they arrange edges into leaves and leaves into
//! nodes:
//!
//! - **Hilbert** sorts edges along a space-filling curve and packs runs
//!   (Kamel-Faloutsos).
//! - **STR** sort-tile-recursively slices by centroid longitude, then
//!   latitude, at every level (Leutenegger et al.).
//! - **OMT** recurses top-down, minimizing leaf overlap (Lee-Lee), which
//!   tends to suit road-network geometry best.

use crate::coords::{Coord, COORDINATE_PRECISION};
use crate::error::{Error, Result};
use crate::hilbert::hilbert_code;
use crate::mercator;
use crate::rect::Rect;
use crate::tree::{
    edge_centroid, Edge, LeafNode, TreeIndex, TreeNode, BRANCHING_FACTOR, LEAF_CAPACITY,
};
use byteorder::{LittleEndian, WriteBytesExt};
use log::{debug, info};
use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::mem::size_of;
use std::path::Path;

/// Bulk-load strategy. The on-disk format is identical for all three; only
/// the arrangement of edges differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackingMethod {
    Hilbert,
    Str,
    Omt,
}

/// Build the index files for `edges` over the caller's coordinate table.
///
/// Writes the leaf file and the node file; open the result with
/// [`crate::RoadTree::open`]. Every edge endpoint must be a valid index into
/// `coords`, and the edge set must be non-empty.
pub fn build(
    edges: &[Edge],
    coords: &[Coord],
    node_path: &Path,
    leaf_path: &Path,
    method: PackingMethod,
) -> Result<()> {
    if edges.is_empty() {
        return Err(Error::InvalidInput("cannot build an empty tree".to_string()));
    }
    for (i, edge) in edges.iter().enumerate() {
        if edge.u as usize >= coords.len() || edge.v as usize >= coords.len() {
            return Err(Error::InvalidInput(format!(
                "edge {} references an endpoint outside the coordinate table ({} entries)",
                i,
                coords.len()
            )));
        }
    }

    let search_tree = match method {
        PackingMethod::Hilbert => pack_with_hilbert(edges, coords, leaf_path)?,
        PackingMethod::Str => pack_with_str(edges, coords, leaf_path)?,
        PackingMethod::Omt => pack_with_omt(edges, coords, leaf_path)?,
    };
    write_node_file(&search_tree, node_path)
}

// Packed Hilbert-R-tree construction (Kamel-Faloutsos).
fn pack_with_hilbert(edges: &[Edge], coords: &[Coord], leaf_path: &Path) -> Result<Vec<TreeNode>> {
    info!("packing {} edges with the Hilbert method", edges.len());

    let mut keyed: Vec<(u64, u32)> = edges
        .iter()
        .enumerate()
        .map(|(index, edge)| {
            // Hilbert key of the centroid, with latitude re-projected so the
            // curve runs over the same space the bounding boxes live in.
            let mut c = edge_centroid(edge, coords);
            c.lat = (COORDINATE_PRECISION * mercator::lat_to_y(c.lat_degrees())) as i32;
            (hilbert_code(c), index as u32)
        })
        .collect();
    keyed.sort_by_key(|&(code, _)| code);

    let sorted: Vec<Edge> = keyed.iter().map(|&(_, i)| edges[i as usize]).collect();
    let leaf_mbrs = write_leaves(&sorted, coords, leaf_path)?;
    let first_level = pack_leaf_level(&leaf_mbrs);
    Ok(pack_upper_levels(first_level, |_| {}))
}

// Sort-Tile-Recursive construction (Leutenegger-Edgington-Lopez).
fn pack_with_str(edges: &[Edge], coords: &[Coord], leaf_path: &Path) -> Result<Vec<TreeNode>> {
    info!("packing {} edges with the STR method", edges.len());

    let mut sorted = edges.to_vec();
    sorted.sort_by_key(|edge| edge_centroid(edge, coords).lon);
    let slab = LEAF_CAPACITY * ceil_sqrt(sorted.len().div_ceil(LEAF_CAPACITY));
    debug!("STR leaf slab size is {} edges", slab);
    for chunk in sorted.chunks_mut(slab) {
        chunk.sort_by_key(|edge| edge_centroid(edge, coords).lat);
    }

    let leaf_mbrs = write_leaves(&sorted, coords, leaf_path)?;
    let first_level = pack_leaf_level(&leaf_mbrs);
    Ok(pack_upper_levels(first_level, |level| {
        level.sort_by_key(|node| node.mbr.centroid().lon);
        let slab = BRANCHING_FACTOR * ceil_sqrt(level.len().div_ceil(BRANCHING_FACTOR));
        for chunk in level.chunks_mut(slab) {
            chunk.sort_by_key(|node| node.mbr.centroid().lat);
        }
    }))
}

// Overlap-Minimizing Top-down construction (Lee-Lee). Breadth-first over
// half-open edge ranges; each dequeued range either becomes one leaf or an
// internal node whose sub-ranges are re-enqueued.
fn pack_with_omt(edges: &[Edge], coords: &[Coord], leaf_path: &Path) -> Result<Vec<TreeNode>> {
    info!("packing {} edges with the OMT method", edges.len());

    struct OmtRange {
        parent: usize,
        left: usize,
        right: usize,
        height: u32,
    }

    let mut work = edges.to_vec();
    let n = work.len();
    let mut leaf_file = BufWriter::new(File::create(leaf_path)?);
    let mut leaf_mbrs: Vec<Rect> = Vec::new();
    // Breadth-first emission keeps the node array topologically ordered with
    // the root already at index 0; no reversal pass is needed.
    let mut search_tree: Vec<TreeNode> = vec![TreeNode::default()];
    let mut queue: VecDeque<OmtRange> = VecDeque::new();

    if n <= BRANCHING_FACTOR {
        emit_leaf(&work, coords, &mut leaf_file, &mut leaf_mbrs, &mut search_tree[0])?;
    } else {
        // The root level uses a reduced fan-out so all other levels pack full.
        let height = subtree_height(n);
        let root_fanout = n.div_ceil(BRANCHING_FACTOR.pow(height - 1));
        debug!("OMT tree height {} with root fan-out {}", height, root_fanout);
        partition_range(&mut work, 0, n, root_fanout, coords, |left, right| {
            queue.push_back(OmtRange {
                parent: 0,
                left,
                right,
                height: height - 1,
            });
        });
    }

    while let Some(range) = queue.pop_front() {
        if range.right - range.left <= BRANCHING_FACTOR {
            emit_leaf(
                &work[range.left..range.right],
                coords,
                &mut leaf_file,
                &mut leaf_mbrs,
                &mut search_tree[range.parent],
            )?;
            continue;
        }

        let slot = search_tree.len();
        search_tree.push(TreeNode::default());
        search_tree[range.parent].push_child(TreeIndex::new(slot, false));
        partition_range(
            &mut work,
            range.left,
            range.right,
            BRANCHING_FACTOR,
            coords,
            |left, right| {
                queue.push_back(OmtRange {
                    parent: slot,
                    left,
                    right,
                    height: range.height - 1,
                });
            },
        );
    }
    leaf_file.flush()?;

    // Reverse iteration over the breadth-first order: children sit at higher
    // indices than their parents, so every child mbr is final before its
    // parent's union is taken. The root at index 0 goes last.
    for i in (0..search_tree.len()).rev() {
        let node = search_tree[i];
        let mut mbr = Rect::default();
        for child in node.children() {
            if child.is_leaf() {
                mbr.merge(&leaf_mbrs[child.index()]);
            } else {
                mbr.merge(&search_tree[child.index()].mbr);
            }
        }
        search_tree[i].mbr = mbr;
    }

    debug!(
        "OMT produced {} leaf nodes and {} tree nodes",
        leaf_mbrs.len(),
        search_tree.len()
    );
    Ok(search_tree)
}

/// Smallest height h >= 1 with BRANCHING_FACTOR^h >= n.
fn subtree_height(n: usize) -> u32 {
    let mut height = 1;
    let mut capacity = BRANCHING_FACTOR;
    while capacity < n {
        capacity *= BRANCHING_FACTOR;
        height += 1;
    }
    height
}

/// OMT slicing of `work[left..right)` into up to `fanout` sub-ranges: sort by
/// centroid longitude, cut into vertical slabs, sort each slab by centroid
/// latitude, and hand each run of the target subtree size to `enqueue`.
fn partition_range(
    work: &mut [Edge],
    left: usize,
    right: usize,
    fanout: usize,
    coords: &[Coord],
    mut enqueue: impl FnMut(usize, usize),
) {
    let size = right - left;
    let subtree_size = size.div_ceil(fanout);
    let slab = subtree_size * ceil_sqrt(fanout);

    work[left..right].sort_by_key(|edge| edge_centroid(edge, coords).lon);
    let mut i = left;
    while i < right {
        let slab_end = (i + slab).min(right);
        work[i..slab_end].sort_by_key(|edge| edge_centroid(edge, coords).lat);
        let mut j = i;
        while j < slab_end {
            let group_end = (j + subtree_size).min(slab_end);
            enqueue(j, group_end);
            j = group_end;
        }
        i = slab_end;
    }
}

fn ceil_sqrt(n: usize) -> usize {
    let mut root = (n as f64).sqrt().ceil() as usize;
    while root * root < n {
        root += 1;
    }
    root.max(1)
}

/// Write one leaf per run of up to [`LEAF_CAPACITY`] edges, in input order.
/// Returns the projected mbr of each written leaf; the position in the
/// returned vector is the leaf's on-disk slot, i.e. its [`TreeIndex`] value.
fn write_leaves(sorted: &[Edge], coords: &[Coord], leaf_path: &Path) -> Result<Vec<Rect>> {
    let mut leaf_file = BufWriter::new(File::create(leaf_path)?);
    let mut mbrs = Vec::with_capacity(sorted.len().div_ceil(LEAF_CAPACITY));
    for chunk in sorted.chunks(LEAF_CAPACITY) {
        let leaf = fill_leaf(chunk, coords);
        write_leaf(&mut leaf_file, &leaf)?;
        mbrs.push(leaf.mbr);
    }
    leaf_file.flush()?;
    debug!("wrote {} leaf nodes", mbrs.len());
    Ok(mbrs)
}

fn fill_leaf(chunk: &[Edge], coords: &[Coord]) -> LeafNode {
    debug_assert!(chunk.len() <= LEAF_CAPACITY);
    let mut leaf = LeafNode::default();
    leaf.object_count = chunk.len() as u32;
    for (i, edge) in chunk.iter().enumerate() {
        leaf.objects[i] = *edge;
        leaf.mbr
            .extend(mercator::from_wgs84_fixed(coords[edge.u as usize]));
        leaf.mbr
            .extend(mercator::from_wgs84_fixed(coords[edge.v as usize]));
    }
    leaf
}

fn emit_leaf(
    chunk: &[Edge],
    coords: &[Coord],
    leaf_file: &mut BufWriter<File>,
    leaf_mbrs: &mut Vec<Rect>,
    parent: &mut TreeNode,
) -> Result<()> {
    let leaf = fill_leaf(chunk, coords);
    write_leaf(leaf_file, &leaf)?;
    parent.push_child(TreeIndex::new(leaf_mbrs.len(), true));
    leaf_mbrs.push(leaf.mbr);
    Ok(())
}

fn write_leaf(out: &mut impl Write, leaf: &LeafNode) -> Result<()> {
    let bytes = unsafe {
        std::slice::from_raw_parts(leaf as *const LeafNode as *const u8, size_of::<LeafNode>())
    };
    out.write_all(bytes)?;
    Ok(())
}

/// First internal level: each node takes a run of up to [`BRANCHING_FACTOR`]
/// consecutive leaves, in on-disk leaf order.
fn pack_leaf_level(leaf_mbrs: &[Rect]) -> Vec<TreeNode> {
    let mut level = Vec::with_capacity(leaf_mbrs.len().div_ceil(BRANCHING_FACTOR));
    for (chunk_index, chunk) in leaf_mbrs.chunks(BRANCHING_FACTOR).enumerate() {
        let mut node = TreeNode::default();
        for (i, mbr) in chunk.iter().enumerate() {
            node.push_child(TreeIndex::new(chunk_index * BRANCHING_FACTOR + i, true));
            node.mbr.merge(mbr);
        }
        level.push(node);
    }
    level
}

/// Pack levels of internal nodes until a single root remains, then reverse
/// the emission order so the root lands at index 0 and parents precede their
/// children. `arrange` may reorder a level before it is grouped (STR); the
/// Hilbert packer passes a no-op.
fn pack_upper_levels(
    first_level: Vec<TreeNode>,
    mut arrange: impl FnMut(&mut Vec<TreeNode>),
) -> Vec<TreeNode> {
    let mut search_tree: Vec<TreeNode> = Vec::new();
    let mut level = first_level;
    while level.len() > 1 {
        arrange(&mut level);
        let mut next_level = Vec::with_capacity(level.len().div_ceil(BRANCHING_FACTOR));
        for chunk in level.chunks(BRANCHING_FACTOR) {
            let mut parent = TreeNode::default();
            for child in chunk {
                parent.push_child(TreeIndex::new(search_tree.len(), false));
                parent.mbr.merge(&child.mbr);
                search_tree.push(*child);
            }
            next_level.push(parent);
        }
        level = next_level;
    }
    // the single remaining node is the root; stored last, it becomes index 0
    // after the reversal below
    search_tree.extend(level);

    search_tree.reverse();
    let size = search_tree.len();
    for node in &mut search_tree {
        let child_count = node.child_count as usize;
        for child in &mut node.children[..child_count] {
            if !child.is_leaf() {
                *child = TreeIndex::new(size - 1 - child.index(), false);
            }
        }
    }
    search_tree
}

/// Node file layout: u64 node count, then the raw node array, root first.
fn write_node_file(search_tree: &[TreeNode], node_path: &Path) -> Result<()> {
    if search_tree.is_empty() {
        return Err(Error::Invariant("search tree has no nodes"));
    }
    let mut node_file = BufWriter::new(File::create(node_path)?);
    node_file.write_u64::<LittleEndian>(search_tree.len() as u64)?;
    let bytes = unsafe {
        std::slice::from_raw_parts(
            search_tree.as_ptr() as *const u8,
            search_tree.len() * size_of::<TreeNode>(),
        )
    };
    node_file.write_all(bytes)?;
    node_file.flush()?;
    info!("wrote {} tree nodes", search_tree.len());
    Ok(())
}

#[test]
fn ceil_sqrt_rounds_up() {
    assert_eq!(ceil_sqrt(1), 1);
    assert_eq!(ceil_sqrt(2), 2);
    assert_eq!(ceil_sqrt(4), 2);
    assert_eq!(ceil_sqrt(5), 3);
    assert_eq!(ceil_sqrt(16), 4);
    assert_eq!(ceil_sqrt(17), 5);
}

#[test]
fn subtree_height_covers_input() {
    assert_eq!(subtree_height(1), 1);
    assert_eq!(subtree_height(BRANCHING_FACTOR), 1);
    assert_eq!(subtree_height(BRANCHING_FACTOR + 1), 2);
    assert_eq!(subtree_height(BRANCHING_FACTOR * BRANCHING_FACTOR), 2);
    assert_eq!(subtree_height(BRANCHING_FACTOR * BRANCHING_FACTOR + 1), 3);
}

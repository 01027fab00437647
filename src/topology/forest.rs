//! Forest of faces: the macro topology of the domain.
//!
//! The domain is a graph of quadrilateral faces joined along edges with
//! explicit relative orientations. Each face owns four corner nodes in the
//! canonical order `[SW, SE, NW, NE]`, four edges derived from those corners,
//! and a local refinement tree mapping [`LogicalLocation`]s to block ids.
//!
//! Nodes and faces live in flat arenas indexed by [`NodeId`] / [`FaceId`];
//! a node keeps a sorted list of the faces it participates in, which is the
//! only back-reference needed to answer "which faces share this vertex?".
//!
//! Neighbor discovery works in two layers. Inside one face, neighbors are
//! found by location arithmetic on the tree. When a query steps over a face
//! edge, [`Forest::find_edge_neighbors`] locates the faces on the other side
//! and the query is rotated into each neighbor's coordinate frame using the
//! edge's relative orientation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::mesh_error::MeshForestError;
use crate::topology::location::LogicalLocation;
use crate::topology::neighbor::{buffer_id, FrameMap, NeighborBlock};
use crate::Real;

/// Handle of a forest vertex.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct NodeId(pub u32);

/// Handle of a forest face.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct FaceId(pub u32);

/// Logical axis of an edge or offset.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum Direction {
    I = 0,
    J = 1,
    K = 2,
}

/// One of the four edges of a face, named by the side it bounds.
///
/// `dir` is the axis the edge *runs along*; `lower` selects which side of the
/// perpendicular axis it sits on. South/North run along I, West/East along J.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct EdgeLoc {
    pub dir: Direction,
    pub lower: bool,
}

impl EdgeLoc {
    pub const SOUTH: EdgeLoc = EdgeLoc {
        dir: Direction::I,
        lower: true,
    };
    pub const NORTH: EdgeLoc = EdgeLoc {
        dir: Direction::I,
        lower: false,
    };
    pub const WEST: EdgeLoc = EdgeLoc {
        dir: Direction::J,
        lower: true,
    };
    pub const EAST: EdgeLoc = EdgeLoc {
        dir: Direction::J,
        lower: false,
    };

    pub const ALL: [EdgeLoc; 4] = [Self::SOUTH, Self::NORTH, Self::WEST, Self::EAST];

    /// Axis the edge runs along.
    #[inline]
    pub fn tangent_axis(&self) -> usize {
        self.dir as usize
    }

    /// Axis perpendicular to the edge (in the face plane).
    #[inline]
    pub fn normal_axis(&self) -> usize {
        1 - self.dir as usize
    }

    /// Sign of the outward direction through this edge along the normal axis.
    #[inline]
    pub fn normal_sign(&self) -> i32 {
        if self.lower {
            -1
        } else {
            1
        }
    }

    /// The edge on side `lower` of `normal_axis`.
    #[inline]
    pub fn on_side(normal_axis: usize, lower: bool) -> Self {
        let dir = if normal_axis == 0 {
            Direction::J
        } else {
            Direction::I
        };
        EdgeLoc { dir, lower }
    }
}

/// An ordered pair of node handles; the order defines the edge's direction.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Edge {
    pub nodes: [NodeId; 2],
}

impl Edge {
    /// +1 if `other` is the same edge traversed in the same direction, −1 if
    /// traversed in the opposite direction, 0 if not the same edge.
    #[inline]
    pub fn relative_orientation(&self, other: &Edge) -> i32 {
        if self.nodes == other.nodes {
            1
        } else if self.nodes[0] == other.nodes[1] && self.nodes[1] == other.nodes[0] {
            -1
        } else {
            0
        }
    }
}

/// A forest vertex: stable id, physical position, and the faces touching it.
#[derive(Clone, Debug)]
pub struct Node {
    pub id: u32,
    pub x: [Real; 2],
    faces: Vec<FaceId>,
}

impl Node {
    /// Faces sharing this vertex, ascending by id.
    #[inline]
    pub fn faces(&self) -> &[FaceId] {
        &self.faces
    }
}

/// Owner and location of one block in a face's refinement tree.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct TreeEntry {
    pub gid: u64,
    pub rank: usize,
}

/// A quadrilateral face: four corner nodes and a local refinement tree.
#[derive(Clone, Debug)]
pub struct Face {
    /// Corners in canonical order `[SW, SE, NW, NE]`.
    nodes: [NodeId; 4],
    /// Refinement tree: the leaf cover of this face, keyed in Morton order.
    tree: BTreeMap<LogicalLocation, TreeEntry>,
}

impl Face {
    #[inline]
    pub fn nodes(&self) -> [NodeId; 4] {
        self.nodes
    }

    /// The edge at `loc`, directed by the canonical corner order.
    pub fn edge(&self, loc: EdgeLoc) -> Edge {
        let [sw, se, nw, ne] = self.nodes;
        let nodes = match loc {
            EdgeLoc::SOUTH => [sw, se],
            EdgeLoc::WEST => [sw, nw],
            EdgeLoc::EAST => [se, ne],
            _ => [nw, ne],
        };
        Edge { nodes }
    }

    /// The refinement tree, keyed by the Morton total order.
    #[inline]
    pub fn tree(&self) -> &BTreeMap<LogicalLocation, TreeEntry> {
        &self.tree
    }
}

/// A cross-face neighbor of an edge.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct EdgeNeighbor {
    pub face: FaceId,
    pub edge: EdgeLoc,
    pub orientation: i32,
}

/// A neighbor query expressed in some face's coordinate frame.
#[derive(Clone, Debug)]
struct FrameQuery {
    face: usize,
    /// The queried location, same level as the querying block.
    target: LogicalLocation,
    /// The querying block's own location mapped into this frame (out of the
    /// tree bounds once a face edge has been crossed).
    my_mapped: LogicalLocation,
    /// Axis map from the querying block's frame into this frame.
    frame: FrameMap,
    /// Product of edge orientations along the path.
    orientation: i32,
}

/// The forest: node and face arenas plus the refinement trees they carry.
#[derive(Clone, Debug)]
pub struct Forest {
    ndim: usize,
    nodes: Vec<Node>,
    faces: Vec<Face>,
}

impl Forest {
    /// An empty forest of dimension 2 or 3. Faces span the I/J plane in
    /// either case; for `ndim == 3` the trees are oct-trees and K-direction
    /// neighbors are resolved inside each tree.
    pub fn new(ndim: usize) -> Self {
        debug_assert!(ndim == 2 || ndim == 3);
        Self {
            ndim,
            nodes: Vec::new(),
            faces: Vec::new(),
        }
    }

    #[inline]
    pub fn ndim(&self) -> usize {
        self.ndim
    }

    #[inline]
    pub fn num_faces(&self) -> usize {
        self.faces.len()
    }

    /// Add a vertex at position `x`.
    pub fn add_node(&mut self, x: [Real; 2]) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            id: id.0,
            x,
            faces: Vec::new(),
        });
        id
    }

    /// Add a face over four distinct corner nodes `[SW, SE, NW, NE]`,
    /// registering it with each corner.
    ///
    /// # Errors
    /// [`MeshForestError::UnknownId`] for a node handle not in this forest,
    /// [`MeshForestError::DegenerateFace`] for repeated corners.
    pub fn add_face(&mut self, corners: [NodeId; 4]) -> Result<FaceId, MeshForestError> {
        for c in corners {
            if c.0 as usize >= self.nodes.len() {
                return Err(MeshForestError::UnknownId {
                    kind: "node",
                    id: c.0,
                });
            }
        }
        for i in 0..4 {
            for j in (i + 1)..4 {
                if corners[i] == corners[j] {
                    return Err(MeshForestError::DegenerateFace);
                }
            }
        }
        let id = FaceId(self.faces.len() as u32);
        self.faces.push(Face {
            nodes: corners,
            tree: BTreeMap::new(),
        });
        for c in corners {
            let list = &mut self.nodes[c.0 as usize].faces;
            if let Err(pos) = list.binary_search(&id) {
                list.insert(pos, id);
            }
        }
        Ok(id)
    }

    /// # Panics
    /// Panics if `id` was not created by this forest.
    #[inline]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    /// # Panics
    /// Panics if `id` was not created by this forest.
    #[inline]
    pub fn face(&self, id: FaceId) -> &Face {
        &self.faces[id.0 as usize]
    }

    /// Register a block at `loc` in the tree of face `f`.
    ///
    /// # Errors
    /// [`MeshForestError::LocationOutOfTree`] if `loc` is outside the unit
    /// tree; [`MeshForestError::OverlappingTreeKeys`] if the slot is taken.
    pub fn add_block(
        &mut self,
        f: FaceId,
        loc: LogicalLocation,
        gid: u64,
        rank: usize,
    ) -> Result<(), MeshForestError> {
        if f.0 as usize >= self.faces.len() {
            return Err(MeshForestError::UnknownId { kind: "face", id: f.0 });
        }
        if !loc.is_in_tree() {
            return Err(MeshForestError::LocationOutOfTree { loc });
        }
        let tree = &mut self.faces[f.0 as usize].tree;
        if tree.contains_key(&loc) {
            return Err(MeshForestError::OverlappingTreeKeys { anc: loc, desc: loc });
        }
        tree.insert(loc, TreeEntry { gid, rank });
        Ok(())
    }

    /// All blocks of the forest: `(face, location, entry)` in face order then
    /// Morton order.
    pub fn blocks(&self) -> impl Iterator<Item = (FaceId, &LogicalLocation, &TreeEntry)> {
        self.faces.iter().enumerate().flat_map(|(fi, face)| {
            face.tree
                .iter()
                .map(move |(loc, e)| (FaceId(fi as u32), loc, e))
        })
    }

    /// Locate a block by global id.
    pub fn find_block(&self, gid: u64) -> Option<(FaceId, LogicalLocation)> {
        self.blocks()
            .find(|(_, _, e)| e.gid == gid)
            .map(|(f, loc, _)| (f, *loc))
    }

    /// Faces sharing the edge at `edge_loc` of `face`, with the relative
    /// orientation of their matching edge.
    ///
    /// Candidates are the union of the face sets of the edge's two endpoints
    /// minus `face` itself; a candidate contributes once per edge of its own
    /// that matches. More than two faces may share one edge (non-manifold
    /// junctions); the result is sorted by face id and is order-independent.
    pub fn find_edge_neighbors(&self, face: FaceId, edge_loc: EdgeLoc) -> Vec<EdgeNeighbor> {
        let edge = self.face(face).edge(edge_loc);
        let mut candidates: Vec<FaceId> = Vec::new();
        for nid in edge.nodes {
            for &f in self.node(nid).faces() {
                if f != face {
                    if let Err(pos) = candidates.binary_search(&f) {
                        candidates.insert(pos, f);
                    }
                }
            }
        }
        let mut out = Vec::new();
        for cand in candidates {
            for loc in EdgeLoc::ALL {
                let orientation = edge.relative_orientation(&self.face(cand).edge(loc));
                if orientation != 0 {
                    out.push(EdgeNeighbor {
                        face: cand,
                        edge: loc,
                        orientation,
                    });
                }
            }
        }
        out
    }

    /// True iff no other face shares the edge at `edge_loc`.
    pub fn edge_is_boundary(&self, face: FaceId, edge_loc: EdgeLoc) -> bool {
        self.find_edge_neighbors(face, edge_loc).is_empty()
    }

    /// Check the per-face tree invariants: no ancestor-descendant overlap,
    /// complete sibling sets, and a complete tiling of each non-empty face.
    ///
    /// # Errors
    /// The first violated invariant, as a `Topology` error.
    pub fn validate(&self) -> Result<(), MeshForestError> {
        let bits = if self.ndim == 3 { 3 } else { 2 };
        for (fi, face) in self.faces.iter().enumerate() {
            for loc in face.tree.keys() {
                let mut up = loc.parent();
                while let Some(anc) = up {
                    if face.tree.contains_key(&anc) {
                        return Err(MeshForestError::OverlappingTreeKeys {
                            anc,
                            desc: *loc,
                        });
                    }
                    up = anc.parent();
                }
                if let Some(parent) = loc.parent() {
                    // a sibling may itself be refined away, but its region
                    // must be occupied: refinement always splits a cell into
                    // its full child set
                    let o3s: &[i64] = if self.ndim == 3 { &[0, 1] } else { &[0] };
                    for o1 in 0..=1 {
                        for o2 in 0..=1 {
                            for &o3 in o3s {
                                let sib = parent.child(o1, o2, o3);
                                if !face.tree.keys().any(|k| sib.contains(k)) {
                                    return Err(MeshForestError::IncompleteSiblings {
                                        loc: *loc,
                                    });
                                }
                            }
                        }
                    }
                }
            }
            if !face.tree.is_empty() {
                let lmax = face
                    .tree
                    .keys()
                    .map(|l| l.level())
                    .max()
                    .expect("non-empty tree");
                let covered: u128 = face
                    .tree
                    .keys()
                    .map(|l| 1u128 << (bits * (lmax - l.level())))
                    .sum();
                if covered != 1u128 << (bits * lmax) {
                    return Err(MeshForestError::IncompleteTreeCover { face: fi as u32 });
                }
            }
        }
        Ok(())
    }

    /// Enumerate every neighbor of the block at `loc` in face `f`: one
    /// [`NeighborBlock`] per occupied `(ox1,ox2,ox3,fi1,fi2)` slot, sorted by
    /// `buf_id`.
    ///
    /// # Errors
    /// `Topology` errors for malformed trees or for level jumps across edges
    /// whose frame map is not the identity (see DESIGN notes).
    pub fn block_neighbors(
        &self,
        f: FaceId,
        loc: &LogicalLocation,
    ) -> Result<Vec<NeighborBlock>, MeshForestError> {
        let ox3_range: &[i32] = if self.ndim == 3 { &[-1, 0, 1] } else { &[0] };
        let mut out = Vec::new();
        for ox1 in -1..=1 {
            for ox2 in -1..=1 {
                for &ox3 in ox3_range {
                    if ox1 == 0 && ox2 == 0 && ox3 == 0 {
                        continue;
                    }
                    for q in self.frame_queries(f, loc, [ox1, ox2, ox3]) {
                        self.resolve_in_face(&q, [ox1, ox2, ox3], &mut out)?;
                    }
                }
            }
        }
        // A coarse neighbor reached through an edge or corner offset
        // duplicates the face exchange with the same block: the face windows
        // already cover the corner region (parity extension on the set side,
        // cnghost overhang on the load side). Emitting both would create a
        // receive slot no sender fills.
        let nonzero = |nb: &NeighborBlock| nb.offsets().iter().filter(|&&o| o != 0).count();
        let mut keep = vec![true; out.len()];
        for i in 0..out.len() {
            if out[i].level >= loc.level() {
                continue;
            }
            for j in 0..out.len() {
                if i != j
                    && out[j].gid == out[i].gid
                    && out[j].level == out[i].level
                    && nonzero(&out[j]) < nonzero(&out[i])
                    && (0..3).all(|a| {
                        out[j].offsets()[a] == 0 || out[j].offsets()[a] == out[i].offsets()[a]
                    })
                {
                    keep[i] = false;
                    break;
                }
            }
        }
        let mut iter = keep.iter();
        out.retain(|_| *iter.next().expect("keep mask sized to out"));
        out.sort_by_key(|nb| (nb.buf_id, nb.gid));
        Ok(out)
    }

    /// Express the query `loc + ox` in the frame of every face that can hold
    /// it, crossing face edges as needed. Queries that leave the forest
    /// (domain boundary) are dropped.
    fn frame_queries(&self, f: FaceId, loc: &LogicalLocation, ox: [i32; 3]) -> Vec<FrameQuery> {
        let n = loc.side();
        let target = loc.offset(ox[0], ox[1], ox[2]);
        // K never crosses between faces
        if !(0..n).contains(&target.lx3()) {
            return Vec::new();
        }
        let mut queries = vec![FrameQuery {
            face: f.0 as usize,
            target,
            my_mapped: *loc,
            frame: FrameMap::identity(),
            orientation: 1,
        }];
        // at most two crossings in the face plane
        for _ in 0..2 {
            let mut next = Vec::new();
            for q in queries {
                let out1 = !(0..n).contains(&q.target.lx1());
                let out2 = !(0..n).contains(&q.target.lx2());
                if !out1 && !out2 {
                    next.push(q);
                    continue;
                }
                let axis = if out1 { 0 } else { 1 };
                let eloc = EdgeLoc::on_side(axis, q.target.lx(axis) < 0);
                for en in self.find_edge_neighbors(FaceId(q.face as u32), eloc) {
                    let step = edge_frame_map(eloc, en.edge, en.orientation);
                    next.push(FrameQuery {
                        face: en.face.0 as usize,
                        target: cross_edge(&q.target, eloc, en.edge, en.orientation),
                        my_mapped: cross_edge(&q.my_mapped, eloc, en.edge, en.orientation),
                        frame: q.frame.then(&step),
                        orientation: q.orientation * en.orientation,
                    });
                }
            }
            queries = next;
        }
        queries.retain(|q| {
            (0..n).contains(&q.target.lx1()) && (0..n).contains(&q.target.lx2())
        });
        queries
    }

    /// Resolve one framed query against the face's tree, appending a
    /// descriptor per same-level, coarser, or finer neighbor found.
    fn resolve_in_face(
        &self,
        q: &FrameQuery,
        ox: [i32; 3],
        out: &mut Vec<NeighborBlock>,
    ) -> Result<(), MeshForestError> {
        let face = &self.faces[q.face];
        let rev = q.frame.map_direction([-ox[0], -ox[1], -ox[2]]);

        if let Some(entry) = face.tree.get(&q.target) {
            out.push(NeighborBlock {
                gid: entry.gid,
                rank: entry.rank,
                level: q.target.level(),
                ox1: ox[0],
                ox2: ox[1],
                ox3: ox[2],
                fi1: 0,
                fi2: 0,
                buf_id: buffer_id(ox[0], ox[1], ox[2], 0, 0),
                target_id: buffer_id(rev[0], rev[1], rev[2], 0, 0),
                orientation: q.orientation,
                frame: q.frame,
            });
            return Ok(());
        }

        if let Some(parent) = q.target.parent() {
            if let Some(entry) = face.tree.get(&parent) {
                if !q.frame.is_identity() {
                    return Err(MeshForestError::ReversedEdgeLevelJump { face: q.face as u32 });
                }
                let (cfi1, cfi2) = fine_indices(rev, |d| (q.my_mapped.lx(d) & 1) as i32);
                out.push(NeighborBlock {
                    gid: entry.gid,
                    rank: entry.rank,
                    level: parent.level(),
                    ox1: ox[0],
                    ox2: ox[1],
                    ox3: ox[2],
                    fi1: 0,
                    fi2: 0,
                    buf_id: buffer_id(ox[0], ox[1], ox[2], 0, 0),
                    target_id: buffer_id(rev[0], rev[1], rev[2], cfi1, cfi2),
                    orientation: q.orientation,
                    frame: q.frame,
                });
                return Ok(());
            }
        }

        // finer neighbors: the children of the target adjacent to us
        let o3s: &[i64] = if self.ndim == 3 { &[0, 1] } else { &[0] };
        for o1 in 0..=1i64 {
            for o2 in 0..=1i64 {
                for &o3 in o3s {
                    let bits = [o1, o2, o3];
                    // only the half facing us along constrained axes
                    let facing = (0..3).all(|d| {
                        rev[d] == 0 || bits[d] == if rev[d] > 0 { 1 } else { 0 }
                    });
                    if !facing {
                        continue;
                    }
                    let child = q.target.child(o1, o2, o3);
                    if let Some(entry) = face.tree.get(&child) {
                        if !q.frame.is_identity() {
                            return Err(MeshForestError::ReversedEdgeLevelJump {
                                face: q.face as u32,
                            });
                        }
                        let (fi1, fi2) = fine_indices(
                            [ox[0], ox[1], ox[2]],
                            |d| bits[d] as i32,
                        );
                        out.push(NeighborBlock {
                            gid: entry.gid,
                            rank: entry.rank,
                            level: child.level(),
                            ox1: ox[0],
                            ox2: ox[1],
                            ox3: ox[2],
                            fi1,
                            fi2,
                            buf_id: buffer_id(ox[0], ox[1], ox[2], fi1, fi2),
                            target_id: buffer_id(rev[0], rev[1], rev[2], 0, 0),
                            orientation: q.orientation,
                            frame: q.frame,
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

impl crate::debug_invariants::DebugInvariants for Forest {
    fn debug_assert_invariants(&self) {
        crate::debug_invariants!(self.validate(), "Forest");
    }

    fn validate_invariants(&self) -> Result<(), MeshForestError> {
        self.validate()
    }
}

/// Map a location through a face edge into the neighboring face's frame.
///
/// Works for any coordinate, inside or outside the tree: the normal-axis
/// distance beyond the crossed edge becomes the depth inside the neighbor,
/// and the tangential coordinate is carried over or reversed per the edge
/// orientation. K is untouched.
fn cross_edge(loc: &LogicalLocation, e: EdgeLoc, e2: EdgeLoc, orientation: i32) -> LogicalLocation {
    let n = loc.side();
    let u = loc.lx(e.normal_axis());
    let t = loc.lx(e.tangent_axis());
    let d = if e.lower { -1 - u } else { u - n };
    let mut c = [0i64, 0, loc.lx3()];
    c[e2.normal_axis()] = if e2.lower { d } else { n - 1 - d };
    c[e2.tangent_axis()] = if orientation == 1 { t } else { n - 1 - t };
    LogicalLocation::new(loc.level(), c[0], c[1], c[2])
}

/// Axis map across a face edge: tangent onto tangent with the edge
/// orientation sign, outward normal onto inward normal.
fn edge_frame_map(e: EdgeLoc, e2: EdgeLoc, orientation: i32) -> FrameMap {
    let mut perm = [0usize, 1, 2];
    let mut sign = [1i8; 3];
    perm[e.normal_axis()] = e2.normal_axis();
    sign[e.normal_axis()] = (-e2.normal_sign() * e.normal_sign()) as i8;
    perm[e.tangent_axis()] = e2.tangent_axis();
    sign[e.tangent_axis()] = orientation as i8;
    FrameMap { perm, sign }
}

/// Fine-neighbor index assignment: `fi1` and `fi2` are the child bits along
/// the free axes (those with zero offset), in ascending axis order.
fn fine_indices(ox: [i32; 3], bit: impl Fn(usize) -> i32) -> (i32, i32) {
    let mut fis = [0i32; 2];
    let mut slot = 0;
    for d in 0..3 {
        if ox[d] == 0 && slot < 2 {
            fis[slot] = bit(d);
            slot += 1;
        }
    }
    (fis[0], fis[1])
}

#[cfg(test)]
mod layout_tests {
    //! Compile-time assertion that the arena handles stay word-sized.
    use super::*;
    use static_assertions::assert_eq_size;

    assert_eq_size!(NodeId, u32);
    assert_eq_size!(FaceId, u32);
}

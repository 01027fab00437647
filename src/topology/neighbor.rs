//! Neighbor descriptors: which block sits on the other side of a face, edge,
//! or corner, and how its index frame relates to ours.
//!
//! A [`NeighborBlock`] is emitted once per occupied `(ox1,ox2,ox3,fi1,fi2)`
//! slot. `buf_id` is a deterministic function of those five integers, so both
//! endpoints of an exchange derive matching buffer keys without
//! communicating; `target_id` is the `buf_id` the neighbor computes for the
//! reverse direction and therefore keys the slot in the neighbor's receive
//! map that our payload lands in.

use serde::{Deserialize, Serialize};

/// Deterministic buffer slot for a neighbor descriptor.
///
/// The offsets select one of 27 face/edge/corner directions, the fine indices
/// one of up to four finer neighbors sharing that direction. Same-level and
/// coarser neighbors use `fi1 = fi2 = 0`.
#[inline]
pub fn buffer_id(ox1: i32, ox2: i32, ox3: i32, fi1: i32, fi2: i32) -> i32 {
    debug_assert!((-1..=1).contains(&ox1) && (-1..=1).contains(&ox2) && (-1..=1).contains(&ox3));
    debug_assert!((0..=1).contains(&fi1) && (0..=1).contains(&fi2));
    (((ox1 + 1) * 3 + (ox2 + 1)) * 3 + (ox3 + 1)) * 4 + fi1 * 2 + fi2
}

/// Affine axis map between two blocks' index frames.
///
/// `perm[d]` is the neighbor-frame axis that our axis `d` maps onto and
/// `sign[d]` whether the direction along it is preserved (+1) or reversed
/// (−1). In-tree neighbors always use the identity map; cross-face neighbors
/// pick up permutations and reversals from the edge orientations walked to
/// reach them.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct FrameMap {
    pub perm: [usize; 3],
    pub sign: [i8; 3],
}

impl FrameMap {
    /// The identity map (same axes, same directions).
    #[inline]
    pub const fn identity() -> Self {
        Self {
            perm: [0, 1, 2],
            sign: [1, 1, 1],
        }
    }

    #[inline]
    pub fn is_identity(&self) -> bool {
        *self == Self::identity()
    }

    /// Map a direction vector from our frame into the neighbor frame.
    pub fn map_direction(&self, ox: [i32; 3]) -> [i32; 3] {
        let mut out = [0i32; 3];
        for d in 0..3 {
            out[self.perm[d]] = ox[d] * self.sign[d] as i32;
        }
        out
    }

    /// Compose: `self` maps frame A→B, `next` maps B→C; result maps A→C.
    pub fn then(&self, next: &FrameMap) -> FrameMap {
        let mut perm = [0usize; 3];
        let mut sign = [0i8; 3];
        for d in 0..3 {
            perm[d] = next.perm[self.perm[d]];
            sign[d] = self.sign[d] * next.sign[self.perm[d]];
        }
        FrameMap { perm, sign }
    }
}

impl Default for FrameMap {
    fn default() -> Self {
        Self::identity()
    }
}

/// Descriptor of one logical neighbor of a block.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct NeighborBlock {
    /// Global id of the neighboring block.
    pub gid: u64,
    /// Rank that owns the neighboring block.
    pub rank: usize,
    /// Refinement level of the neighboring block.
    pub level: u32,
    /// Offset of the neighbor relative to this block, our frame.
    pub ox1: i32,
    pub ox2: i32,
    pub ox3: i32,
    /// Which of multiple finer neighbors this descriptor selects; zero for
    /// same-level and coarser neighbors.
    pub fi1: i32,
    pub fi2: i32,
    /// Send-buffer slot on our side.
    pub buf_id: i32,
    /// `buf_id` the neighbor derives for the reverse direction; keys the
    /// neighbor's receive slot our payload is delivered into.
    pub target_id: i32,
    /// Relative orientation of the shared edge: +1 preserved, −1 reversed.
    /// Always +1 for in-tree neighbors.
    pub orientation: i32,
    /// Full axis map from our frame into the neighbor's frame.
    pub frame: FrameMap,
}

impl NeighborBlock {
    #[inline]
    pub fn offsets(&self) -> [i32; 3] {
        [self.ox1, self.ox2, self.ox3]
    }

    /// True iff the neighbor lives on this rank.
    #[inline]
    pub fn is_local(&self, my_rank: usize) -> bool {
        self.rank == my_rank
    }
}

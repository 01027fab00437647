//! `LogicalLocation`: a strong identifier for a block within one refinement
//! tree.
//!
//! A location is the tuple `(level, lx1, lx2, lx3)` with `0 <= lxd < 2^level`
//! inside a tree. A location at level `L` has exactly one parent at `L - 1`
//! (coordinate right-shift) and eight children at `L + 1` (shift plus offset
//! bit). The Morton number obtained by bit-interleaving the coordinates
//! provides the total order used both for sorting tree keys and for hashing.
//!
//! Two locations at the same level are identical iff their coordinates are
//! equal; the `Ord` impl refines that into a total order across levels by
//! comparing Morton numbers promoted to [`MAX_LEVEL`], coarser first on ties.

use serde::{Deserialize, Serialize};

/// Deepest representable refinement level: 3 * 42 = 126 interleaved bits fit
/// in the `u128` Morton key.
pub const MAX_LEVEL: u32 = 42;

/// Position of a block inside a face's refinement tree.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct LogicalLocation {
    level: u32,
    lx1: i64,
    lx2: i64,
    lx3: i64,
}

impl LogicalLocation {
    /// Root of a tree: level 0, all coordinates zero.
    #[inline]
    pub const fn root() -> Self {
        Self {
            level: 0,
            lx1: 0,
            lx2: 0,
            lx3: 0,
        }
    }

    /// Build a location from raw coordinates. Coordinates are not required to
    /// lie inside the tree (neighbor arithmetic steps outside on purpose);
    /// use [`is_in_tree`](Self::is_in_tree) to test containment.
    #[inline]
    pub const fn new(level: u32, lx1: i64, lx2: i64, lx3: i64) -> Self {
        Self {
            level,
            lx1,
            lx2,
            lx3,
        }
    }

    #[inline]
    pub const fn level(&self) -> u32 {
        self.level
    }

    #[inline]
    pub const fn lx1(&self) -> i64 {
        self.lx1
    }

    #[inline]
    pub const fn lx2(&self) -> i64 {
        self.lx2
    }

    #[inline]
    pub const fn lx3(&self) -> i64 {
        self.lx3
    }

    /// Coordinate along axis `d` (0-based).
    #[inline]
    pub fn lx(&self, d: usize) -> i64 {
        match d {
            0 => self.lx1,
            1 => self.lx2,
            _ => self.lx3,
        }
    }

    /// Number of blocks per axis at this level.
    #[inline]
    pub fn side(&self) -> i64 {
        1i64 << self.level
    }

    /// True iff every coordinate lies in `[0, 2^level)`.
    #[inline]
    pub fn is_in_tree(&self) -> bool {
        let n = self.side();
        (0..n).contains(&self.lx1) && (0..n).contains(&self.lx2) && (0..n).contains(&self.lx3)
    }

    /// The unique parent one level coarser. Returns `None` at the root.
    #[inline]
    pub fn parent(&self) -> Option<Self> {
        if self.level == 0 {
            return None;
        }
        Some(Self {
            level: self.level - 1,
            lx1: self.lx1 >> 1,
            lx2: self.lx2 >> 1,
            lx3: self.lx3 >> 1,
        })
    }

    /// The child one level finer selected by the offset bits `o1,o2,o3`,
    /// each 0 (lower half) or 1 (upper half).
    #[inline]
    pub fn child(&self, o1: i64, o2: i64, o3: i64) -> Self {
        debug_assert!((0..=1).contains(&o1) && (0..=1).contains(&o2) && (0..=1).contains(&o3));
        Self {
            level: self.level + 1,
            lx1: (self.lx1 << 1) + o1,
            lx2: (self.lx2 << 1) + o2,
            lx3: (self.lx3 << 1) + o3,
        }
    }

    /// The same-level location displaced by one block per non-zero offset.
    #[inline]
    pub fn offset(&self, ox1: i32, ox2: i32, ox3: i32) -> Self {
        Self {
            level: self.level,
            lx1: self.lx1 + ox1 as i64,
            lx2: self.lx2 + ox2 as i64,
            lx3: self.lx3 + ox3 as i64,
        }
    }

    /// True iff `other` is this location or one of its descendants:
    /// `other.level >= level` and every coordinate of `other`, shifted down to
    /// this level, matches.
    #[inline]
    pub fn contains(&self, other: &Self) -> bool {
        if other.level < self.level {
            return false;
        }
        let shift = other.level - self.level;
        other.lx1 >> shift == self.lx1
            && other.lx2 >> shift == self.lx2
            && other.lx3 >> shift == self.lx3
    }

    /// Morton number: the low `level` bits of each coordinate interleaved,
    /// `lx1` in the least-significant slot of each triple.
    pub fn morton(&self) -> u128 {
        debug_assert!(self.level <= MAX_LEVEL);
        let mut out = 0u128;
        for b in 0..self.level {
            out |= (((self.lx1 >> b) & 1) as u128) << (3 * b);
            out |= (((self.lx2 >> b) & 1) as u128) << (3 * b + 1);
            out |= (((self.lx3 >> b) & 1) as u128) << (3 * b + 2);
        }
        out
    }

    /// Morton number promoted to [`MAX_LEVEL`], so keys from different levels
    /// share one ordering axis.
    #[inline]
    fn morton_finest(&self) -> u128 {
        self.morton() << (3 * (MAX_LEVEL - self.level))
    }
}

impl Ord for LogicalLocation {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // coordinate tie-break keeps the order total for out-of-tree
        // coordinates, whose truncated Morton keys can coincide
        self.morton_finest()
            .cmp(&other.morton_finest())
            .then(self.level.cmp(&other.level))
            .then((self.lx3, self.lx2, self.lx1).cmp(&(other.lx3, other.lx2, other.lx1)))
    }
}

impl PartialOrd for LogicalLocation {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

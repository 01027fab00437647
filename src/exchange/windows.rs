//! Index-window calculator for boundary loads and sets.
//!
//! Each routine produces one inclusive `[s, e]` per axis. Senders compute
//! load windows, receivers compute set windows, independently, from the
//! shared `(ox, fi, level, lx, cellbounds)` inputs; the two must agree
//! bit-exactly or the exchange is undefined, so these rules are kept
//! branch-for-branch stable. Any disagreement surfaces as an out-of-bounds
//! window and is fatal upstream, never clipped.

use crate::mesh::bounds::{IndexRange, IndexShape};
use crate::topology::neighbor::NeighborBlock;

/// Load window on the sender for a same-level neighbor (also used for the
/// coarse buffer when the neighbor is coarser): the `g` interior cells
/// nearest the boundary, or the whole interior when `ox == 0`.
pub fn load_same(ox: i32, bounds: IndexRange, g: i32) -> IndexRange {
    if ox == 0 {
        bounds
    } else if ox > 0 {
        IndexRange::new(bounds.e - g + 1, bounds.e)
    } else {
        IndexRange::new(bounds.s, bounds.s + g - 1)
    }
}

/// Set window on the receiver for a same-level neighbor: the ghost strip
/// just outside the boundary faced by `ox`.
pub fn set_same(ox: i32, bounds: IndexRange, g: i32) -> IndexRange {
    if ox == 0 {
        bounds
    } else if ox > 0 {
        IndexRange::new(bounds.e + 1, bounds.e + g)
    } else {
        IndexRange::new(bounds.s - g, bounds.s - 1)
    }
}

/// Set window on the receiver (into its coarse buffer) for data arriving
/// from a coarser neighbor. On tangential axes the window is the coarse
/// interior extended by `cng` on the side selected by the parity of this
/// block's logical coordinate.
pub fn set_from_coarser(
    ox: i32,
    bounds: IndexRange,
    lx: i64,
    cng: i32,
    include_dim: bool,
) -> IndexRange {
    if ox == 0 {
        let mut r = bounds;
        if include_dim {
            if lx & 1 == 0 {
                r.e += cng;
            } else {
                r.s -= cng;
            }
        }
        r
    } else if ox > 0 {
        IndexRange::new(bounds.e + 1, bounds.e + cng)
    } else {
        IndexRange::new(bounds.s - cng, bounds.s - 1)
    }
}

/// Which fine index selects the half interval along a tangential axis.
///
/// Axis 0 always consults `fi1`. Axis 1 consults `fi1` when axis 0 is
/// offset, else `fi2`. Axis 2 consults `fi1` when both lower axes are
/// offset, else `fi2`.
#[inline]
fn fine_selector(nb: &NeighborBlock, axis: usize) -> i32 {
    match axis {
        0 => nb.fi1,
        1 => {
            if nb.ox1 != 0 {
                nb.fi1
            } else {
                nb.fi2
            }
        }
        _ => {
            if nb.ox1 != 0 && nb.ox2 != 0 {
                nb.fi1
            } else {
                nb.fi2
            }
        }
    }
}

/// Set windows on a coarser receiver for data arriving from a finer
/// neighbor: ghost strips on offset axes, half the interior (selected by the
/// fine indices) on tangential axes.
pub fn set_from_finer(nb: &NeighborBlock, cellbounds: &IndexShape, g: i32) -> [IndexRange; 3] {
    let mut out = [IndexRange::default(); 3];
    for axis in 0..3 {
        let bounds = cellbounds.interior(axis);
        let ox = nb.offsets()[axis];
        if ox == 0 {
            let mut r = bounds;
            if cellbounds.nx(axis) > 1 {
                if fine_selector(nb, axis) == 1 {
                    r.s += cellbounds.nx(axis) / 2;
                } else {
                    r.e -= cellbounds.nx(axis) / 2;
                }
            }
            out[axis] = r;
        } else if ox > 0 {
            out[axis] = IndexRange::new(bounds.e + 1, bounds.e + g);
        } else {
            out[axis] = IndexRange::new(bounds.s - g, bounds.s - 1);
        }
    }
    out
}

/// Load windows on a coarser sender for a finer neighbor: `cnghost` interior
/// cells on offset axes; on tangential axes, the half interval facing the
/// fine neighbor widened by `cnghost` (the fine side prolongates after Set,
/// so its coarse ghosts need the overhang).
pub fn load_to_finer(nb: &NeighborBlock, cellbounds: &IndexShape, cnghost: i32) -> [IndexRange; 3] {
    let cn = cnghost - 1;
    let mut out = [IndexRange::default(); 3];
    for axis in 0..3 {
        let bounds = cellbounds.interior(axis);
        let ox = nb.offsets()[axis];
        let s = if ox > 0 { bounds.e - cn } else { bounds.s };
        let e = if ox < 0 { bounds.s + cn } else { bounds.e };
        let mut r = IndexRange::new(s, e);
        if ox == 0 && cellbounds.nx(axis) > 1 {
            let trim = cellbounds.nx(axis) / 2 - cnghost;
            if fine_selector(nb, axis) == 1 {
                r.s += trim;
            } else {
                r.e -= trim;
            }
        }
        out[axis] = r;
    }
    out
}

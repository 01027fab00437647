//! Property tests for the index-window calculator.

use mesh_forest::exchange::windows::{
    load_same, load_to_finer, set_from_coarser, set_from_finer, set_same,
};
use mesh_forest::prelude::*;
use proptest::prelude::*;

fn nb(ox1: i32, ox2: i32, ox3: i32, fi1: i32, fi2: i32) -> NeighborBlock {
    NeighborBlock {
        gid: 1,
        rank: 0,
        level: 0,
        ox1,
        ox2,
        ox3,
        fi1,
        fi2,
        buf_id: buffer_id(ox1, ox2, ox3, fi1, fi2),
        target_id: buffer_id(-ox1, -ox2, -ox3, 0, 0),
        orientation: 1,
        frame: FrameMap::identity(),
    }
}

proptest! {
    /// Same-level load on one side covers exactly as many cells as the
    /// mirrored set on the other, for any offset, extent, and ghost width.
    #[test]
    fn same_level_windows_are_symmetric(
        ox in -1..=1i32,
        nx in prop::sample::select(vec![2i32, 4, 8, 16, 32]),
        g in 1..=4i32,
    ) {
        prop_assume!(g <= nx);
        let shape = IndexShape::new([nx, nx, 1], g);
        let b = shape.interior(0);
        let load = load_same(ox, b, g);
        let set = set_same(-ox, b, g);
        prop_assert_eq!(load.len(), set.len());
        // both stay inside the entire extent
        let ent = shape.entire(0);
        prop_assert!(load.s >= ent.s && load.e <= ent.e);
        prop_assert!(set.s >= ent.s && set.e <= ent.e);
    }

    /// Coarse-to-fine: the coarse sender's load window matches the fine
    /// receiver's coarse-buffer set window cell-for-cell, for every fine
    /// index and parity.
    #[test]
    fn coarse_to_fine_windows_are_symmetric(
        ox1 in -1..=1i32,
        ox2 in -1..=1i32,
        fi1 in 0..=1i32,
        nx in prop::sample::select(vec![4i32, 8, 16]),
        g in 1..=2i32,
    ) {
        prop_assume!(ox1 != 0 || ox2 != 0);
        prop_assume!(2 * g <= nx);
        let shape = IndexShape::new([nx, nx, 1], g);
        let cshape = shape.coarsen();
        let cng = g;
        let sender = nb(ox1, ox2, 0, fi1, 0);
        let load = load_to_finer(&sender, &shape, cng);
        // the fine receiver's offsets are the negation; the tangential
        // parity matches the fine index the coarse side selected
        let parity = |ox: i32, fi: i32| if ox != 0 { 0 } else { fi as i64 };
        let set0 = set_from_coarser(-ox1, cshape.interior(0), parity(ox1, fi1), cng, true);
        let set1 = set_from_coarser(-ox2, cshape.interior(1), parity(ox2, fi1), cng, true);
        if ox1 != 0 {
            prop_assert_eq!(load[0].len(), set0.len());
        }
        if ox2 != 0 {
            prop_assert_eq!(load[1].len(), set1.len());
        }
        // tangential axes match when the selector drives both sides
        if ox1 != 0 && ox2 == 0 {
            prop_assert_eq!(load[1].len(), set1.len());
        }
        if ox2 != 0 && ox1 == 0 {
            prop_assert_eq!(load[0].len(), set0.len());
        }
    }

    /// Fine-to-coarse: the fine sender's coarse-buffer load matches the
    /// coarse receiver's half-interval set window.
    #[test]
    fn fine_to_coarse_windows_are_symmetric(
        ox1 in -1..=1i32,
        ox2 in -1..=1i32,
        fi1 in 0..=1i32,
        nx in prop::sample::select(vec![4i32, 8, 16]),
        g in 1..=2i32,
    ) {
        prop_assume!(ox1 != 0 || ox2 != 0);
        prop_assume!(2 * g <= nx);
        let shape = IndexShape::new([nx, nx, 1], g);
        let cshape = shape.coarsen();
        // coarse receiver's descriptor of the fine sender
        let receiver = nb(ox1, ox2, 0, fi1, 0);
        let set = set_from_finer(&receiver, &shape, g);
        // fine sender loads its coarse buffer with the same-level rules and
        // reversed offsets
        let load0 = load_same(-ox1, cshape.interior(0), g);
        let load1 = load_same(-ox2, cshape.interior(1), g);
        prop_assert_eq!(set[0].len(), load0.len());
        prop_assert_eq!(set[1].len(), load1.len());
    }

    /// Windows never leave the entire index space.
    #[test]
    fn set_windows_stay_in_bounds(
        ox in -1..=1i32,
        lx in 0..=7i64,
        nx in prop::sample::select(vec![4i32, 8, 16]),
        g in 1..=2i32,
    ) {
        prop_assume!(2 * g <= nx);
        let shape = IndexShape::new([nx, nx, 1], g);
        let cshape = shape.coarsen();
        let ent = shape.entire(0);
        let cent = cshape.entire(0);
        let s = set_same(ox, shape.interior(0), g);
        prop_assert!(s.s >= ent.s && s.e <= ent.e);
        let c = set_from_coarser(ox, cshape.interior(0), lx, g, true);
        prop_assert!(c.s >= cent.s && c.e <= cent.e);
    }
}

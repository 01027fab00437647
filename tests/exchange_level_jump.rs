//! Exchange across a refinement jump: a coarse face next to a refined face.

mod util;

use mesh_forest::exchange::boundary_info::{build_send_cache, build_set_cache};
use mesh_forest::prelude::*;
use util::*;

/// Face A holds one level-0 block (gid 0); face B, east of A, holds four
/// level-1 blocks (gid 1 + lx2*2 + lx1).
fn l_shape() -> (Forest, FaceId, FaceId) {
    let mut forest = Forest::new(2);
    let n0 = forest.add_node([0.0, 0.0]);
    let n1 = forest.add_node([1.0, 0.0]);
    let n2 = forest.add_node([0.0, 1.0]);
    let n3 = forest.add_node([1.0, 1.0]);
    let n4 = forest.add_node([2.0, 0.0]);
    let n5 = forest.add_node([2.0, 1.0]);
    let fa = forest.add_face([n0, n1, n2, n3]).unwrap();
    let fb = forest.add_face([n1, n4, n3, n5]).unwrap();
    forest.add_block(fa, LogicalLocation::root(), 0, 0).unwrap();
    for lx2 in 0..2i64 {
        for lx1 in 0..2i64 {
            forest
                .add_block(
                    fb,
                    LogicalLocation::new(1, lx1, lx2, 0),
                    (1 + lx2 * 2 + lx1) as u64,
                    0,
                )
                .unwrap();
        }
    }
    (forest, fa, fb)
}

#[test]
fn load_and_set_windows_agree_across_the_jump() {
    let (forest, _, _) = l_shape();
    let mut md = standard_mesh_data(&forest, 0, [4, 4, 1], 2).unwrap();
    let entries = md.exchange_entries(false);
    let alloc = md.collect_alloc_status(&entries);
    let send = build_send_cache(&mut md, &entries, alloc.clone()).unwrap();
    let set = build_set_cache(&mut md, &entries, alloc).unwrap();

    // for every entry, find the mirror entry on the neighbor and compare
    // byte counts (the windows are equal under the frame map)
    for row in &send.entries {
        let block = md.block(row.key.block);
        let nb = &block.neighbors()[row.key.nb];
        let peer = md.find_block(nb.gid).expect("all blocks local");
        let mirror = set
            .entries
            .iter()
            .find(|r| {
                r.key.block == peer
                    && r.key.var == row.key.var
                    && md.block(peer).neighbors()[r.key.nb].buf_id == nb.target_id
                    && md.block(peer).neighbors()[r.key.nb].gid == block.gid()
            })
            .expect("every send entry has a matching set entry");
        assert_eq!(row.buf_len, mirror.buf_len, "asymmetric windows");
    }
    // and the counts line up entry-for-entry both ways
    assert_eq!(send.entries.len(), set.entries.len());
}

#[test]
fn coarse_ramp_lands_in_fine_coarse_buffers() {
    let (forest, _, _) = l_shape();
    let mut md = standard_mesh_data(&forest, 0, [4, 4, 1], 2).unwrap();
    let a = md.find_block(0).unwrap();
    fill_interior(&mut md, a, 0, |i, j| (i + j) as Real);
    let ctx = ExchangeContext::serial();
    exchange_local(&mut md, &ctx).unwrap();

    // block gid 1 = (1;0,0), the lower fine block on A's east face. Its
    // coarse buffer's west ghost columns hold A's two easternmost columns.
    let b0 = md.find_block(1).unwrap();
    let coarse = md.block(b0).var(0).coarse().unwrap().clone();
    let cshape = *md.block(b0).c_cellbounds();
    let cint1 = cshape.interior(1);
    // even parity: the tangential window is [cs, ce + cng]
    for cj in cint1.s..=(cint1.e + md.block(b0).cnghost()) {
        let joff = cj - cint1.s; // A's interior j offset
        // A's easternmost columns carry f = 2 + joff and 3 + joff
        assert_eq!(coarse[[0, 0, cj as usize, 0]], (2 + joff) as Real);
        assert_eq!(coarse[[0, 0, cj as usize, 1]], (3 + joff) as Real);
    }

    // after prolongation the fine west ghosts hold the injected values
    prolongate_boundaries(&mut md).unwrap();
    let fine = md.block(b0).var(0).data().unwrap();
    let shape = *md.block(b0).cellbounds();
    let int1 = shape.interior(1);
    for j in int1.iter() {
        let cj = (cint1.s + (j - int1.s) / 2) as usize;
        let expect = coarse[[0, 0, cj, 1]];
        assert_eq!(fine[[0, 0, j as usize, 0]], expect);
        assert_eq!(fine[[0, 0, j as usize, 1]], expect);
    }
}

#[test]
fn fine_averages_land_in_coarse_ghosts() {
    let (forest, _, _) = l_shape();
    let mut md = standard_mesh_data(&forest, 0, [4, 4, 1], 2).unwrap();
    let b_lo = md.find_block(1).unwrap(); // (1;0,0)
    let b_hi = md.find_block(3).unwrap(); // (1;0,1)
    fill_interior(&mut md, b_lo, 0, |_, _| 10.0);
    fill_interior(&mut md, b_hi, 0, |_, _| 20.0);
    let ctx = ExchangeContext::serial();
    exchange_local(&mut md, &ctx).unwrap();

    // A's east ghosts: rows facing (1;0,0) average to 10, rows facing
    // (1;0,1) to 20 (cell-average restriction of constants)
    let a = md.find_block(0).unwrap();
    let strip = ghost_strip(&md, a, 0, 1);
    assert_eq!(strip[0], vec![10.0, 10.0]);
    assert_eq!(strip[1], vec![10.0, 10.0]);
    assert_eq!(strip[2], vec![20.0, 20.0]);
    assert_eq!(strip[3], vec![20.0, 20.0]);
}

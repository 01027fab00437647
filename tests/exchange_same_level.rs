//! Same-level ghost exchange over a periodic row of four blocks.

mod util;

use mesh_forest::prelude::*;
use util::*;

fn setup() -> (MeshData, ExchangeContext) {
    let (forest, _) = row_forest(&[0, 0, 0, 0], true);
    let mut md = standard_mesh_data(&forest, 0, [4, 4, 1], 2).unwrap();
    // block 0 interior = 1, everything else 0
    fill_interior(&mut md, 0, 0, |_, _| 1.0);
    (md, ExchangeContext::serial())
}

#[test]
fn periodic_row_of_four_moves_one_column_of_ones() {
    let (mut md, ctx) = setup();
    exchange_local(&mut md, &ctx).unwrap();

    // block 1 faces block 0 on its west side
    for row in ghost_strip(&md, 1, 0, -1) {
        assert_eq!(row, vec![1.0, 1.0]);
    }
    // block 3 faces block 0 on its east side (periodic wrap)
    for row in ghost_strip(&md, 3, 0, 1) {
        assert_eq!(row, vec![1.0, 1.0]);
    }
    // block 2 sees only zeros
    for row in ghost_strip(&md, 2, 0, 1) {
        assert_eq!(row, vec![0.0, 0.0]);
    }
    for row in ghost_strip(&md, 2, 0, -1) {
        assert_eq!(row, vec![0.0, 0.0]);
    }
    // block 0's own ghosts picked up its neighbors' zeros
    for row in ghost_strip(&md, 0, 0, 1) {
        assert_eq!(row, vec![0.0, 0.0]);
    }
}

#[test]
fn exchange_twice_is_idempotent() {
    let (mut md, ctx) = setup();
    exchange_local(&mut md, &ctx).unwrap();
    let snapshot: Vec<_> = (0..4)
        .map(|b| md.block(b).var(0).data().unwrap().clone())
        .collect();
    exchange_local(&mut md, &ctx).unwrap();
    for b in 0..4 {
        assert_eq!(md.block(b).var(0).data().unwrap(), &snapshot[b]);
    }
}

#[test]
fn buffer_cache_is_reused_under_stable_allocation() {
    let (mut md, ctx) = setup();
    exchange_local(&mut md, &ctx).unwrap();
    let entries = md.exchange_entries(false);
    let alloc = md.collect_alloc_status(&entries);
    // rebuilding the caches under the same allocation bits is byte-identical
    let send_a =
        mesh_forest::exchange::boundary_info::build_send_cache(&mut md, &entries, alloc.clone())
            .unwrap();
    let send_b =
        mesh_forest::exchange::boundary_info::build_send_cache(&mut md, &entries, alloc).unwrap();
    assert_eq!(send_a, send_b);
}

#[test]
fn task_list_drives_the_exchange() {
    let (md, ctx) = setup();
    struct State {
        md: MeshData,
        ctx: ExchangeContext,
        comm: NoComm,
        xs: ExchangeState<NoComm>,
    }
    let mut state = State {
        md,
        ctx,
        comm: NoComm,
        xs: ExchangeState::new(),
    };
    let mut list = TaskList::<State>::new();
    let recv_start = list
        .add_task(&[], |s: &mut State| {
            start_receiving(&mut s.md, &s.ctx, &s.comm, &mut s.xs)
        })
        .unwrap();
    let send = list
        .add_task(&[recv_start], |s: &mut State| {
            send_boundary_buffers(&mut s.md, &s.ctx, &s.comm, &mut s.xs)
        })
        .unwrap();
    let recv = list
        .add_task(&[send], |s: &mut State| {
            receive_boundary_buffers(&mut s.md, &s.ctx, &mut s.xs)
        })
        .unwrap();
    list.add_task(&[recv], |s: &mut State| set_boundaries(&mut s.md, &s.ctx))
        .unwrap();
    list.run(&mut state).unwrap();

    for row in ghost_strip(&state.md, 1, 0, -1) {
        assert_eq!(row, vec![1.0, 1.0]);
    }
}

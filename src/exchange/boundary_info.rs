//! BoundaryInfo rows and the memoized buffer caches.
//!
//! A cache row carries everything a pack or set kernel needs for one
//! `(block, variable, neighbor)` entry: the index windows, component count,
//! the allocation bit recorded at build time, and whether the source is the
//! restricted coarse buffer. Rows are built by walking the canonical entry
//! iterator, so the b-th row always describes the b-th entry of every other
//! phase.

use crate::mesh::bounds::{IndexRange, IndexShape};
use crate::mesh::mesh_data::{EntryKey, MeshData};
use crate::mesh_error::MeshForestError;
use crate::exchange::windows;

/// Precomputed exchange data for one `(block, variable, neighbor)` entry.
#[derive(Clone, Debug, PartialEq)]
pub struct BoundaryInfo {
    pub key: EntryKey,
    /// Inclusive `[s, e]` per axis (i, j, k).
    pub windows: [IndexRange; 3],
    /// Component count of the variable.
    pub nv: usize,
    /// Allocation bit at cache build; re-checked against the live variable.
    pub allocated: bool,
    /// Pack from the restricted coarse buffer instead of the data array.
    pub restriction: bool,
    /// Set into the coarse buffer (data arrived from a coarser neighbor).
    pub coarse_dest: bool,
    /// `Nv*Nk*Nj*Ni + 1`: payload plus the trailing tag element.
    pub buf_len: usize,
}

impl BoundaryInfo {
    /// Window extents `(Ni, Nj, Nk)`.
    #[inline]
    pub fn extents(&self) -> [usize; 3] {
        [
            self.windows[0].len() as usize,
            self.windows[1].len() as usize,
            self.windows[2].len() as usize,
        ]
    }
}

/// A memoized flat cache of [`BoundaryInfo`] rows plus the allocation bits it
/// was built under.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BufferCache {
    pub entries: Vec<BoundaryInfo>,
    pub alloc_status: Vec<bool>,
}

impl BufferCache {
    /// True iff `alloc_status` no longer matches this cache.
    #[inline]
    pub fn is_stale(&self, alloc_status: &[bool]) -> bool {
        self.alloc_status != alloc_status
    }
}

fn check_window(
    windows: &[IndexRange; 3],
    shape: &IndexShape,
) -> Result<(), MeshForestError> {
    for axis in 0..3 {
        let w = windows[axis];
        let ext = shape.dim(axis);
        if w.is_empty() || w.s < 0 || w.e >= ext {
            return Err(MeshForestError::IndexWindow {
                axis,
                s: w.s,
                e: w.e,
                extent: ext,
            });
        }
    }
    Ok(())
}

/// Build the send-side cache: load windows per entry, send buffers sized to
/// their windows.
///
/// # Errors
/// `IndexWindow` if a window leaves the array extents, `AllocStatusMismatch`
/// if a live allocation bit disagrees with `alloc_status`.
pub fn build_send_cache(
    md: &mut MeshData,
    entries: &[EntryKey],
    alloc_status: Vec<bool>,
) -> Result<BufferCache, MeshForestError> {
    debug_assert_eq!(entries.len(), alloc_status.len());
    let mut rows = Vec::with_capacity(entries.len());
    for (b, &key) in entries.iter().enumerate() {
        let block = md.block(key.block);
        let nb = block.neighbors()[key.nb].clone();
        let my_level = block.level();
        let g = block.nghost();
        let cellbounds = *block.cellbounds();
        let c_cellbounds = *block.c_cellbounds();

        let (windows, restriction, shape) = if nb.level == my_level {
            let w = [
                windows::load_same(nb.ox1, cellbounds.interior(0), g),
                windows::load_same(nb.ox2, cellbounds.interior(1), g),
                windows::load_same(nb.ox3, cellbounds.interior(2), g),
            ];
            (w, false, cellbounds)
        } else if nb.level < my_level {
            // neighbor is coarser: restrict first, then load the coarse
            // buffer with the same-level rules
            let w = [
                windows::load_same(nb.ox1, c_cellbounds.interior(0), g),
                windows::load_same(nb.ox2, c_cellbounds.interior(1), g),
                windows::load_same(nb.ox3, c_cellbounds.interior(2), g),
            ];
            (w, true, c_cellbounds)
        } else {
            let w = windows::load_to_finer(&nb, &cellbounds, block.cnghost());
            (w, false, cellbounds)
        };
        check_window(&windows, &shape)?;

        let var = md.block(key.block).var(key.var);
        if var.is_allocated() != alloc_status[b] {
            return Err(MeshForestError::AllocStatusMismatch {
                entry: b,
                cached: alloc_status[b],
                observed: var.is_allocated(),
            });
        }
        let nv = var.nv();
        let extents = [
            windows[0].len() as usize,
            windows[1].len() as usize,
            windows[2].len() as usize,
        ];
        let buf_len = nv * extents[0] * extents[1] * extents[2] + 1;
        md.block_mut(key.block)
            .var_mut(key.var)
            .bd
            .ensure_send(nb.buf_id, buf_len);

        rows.push(BoundaryInfo {
            key,
            windows,
            nv,
            allocated: alloc_status[b],
            restriction,
            coarse_dest: false,
            buf_len,
        });
    }
    Ok(BufferCache {
        entries: rows,
        alloc_status,
    })
}

/// Build the set-side cache: set windows per entry, receive buffers sized to
/// their windows.
///
/// # Errors
/// As [`build_send_cache`].
pub fn build_set_cache(
    md: &mut MeshData,
    entries: &[EntryKey],
    alloc_status: Vec<bool>,
) -> Result<BufferCache, MeshForestError> {
    debug_assert_eq!(entries.len(), alloc_status.len());
    let mut rows = Vec::with_capacity(entries.len());
    for (b, &key) in entries.iter().enumerate() {
        let block = md.block(key.block);
        let nb = block.neighbors()[key.nb].clone();
        let my_level = block.level();
        let g = block.nghost();
        let cellbounds = *block.cellbounds();
        let c_cellbounds = *block.c_cellbounds();
        let loc = *block.loc();

        let (windows, coarse_dest, shape) = if nb.level == my_level {
            let w = [
                windows::set_same(nb.ox1, cellbounds.interior(0), g),
                windows::set_same(nb.ox2, cellbounds.interior(1), g),
                windows::set_same(nb.ox3, cellbounds.interior(2), g),
            ];
            (w, false, cellbounds)
        } else if nb.level < my_level {
            // data from a coarser neighbor lands in the coarse buffer and is
            // prolongated after Set
            let cng = block.cnghost();
            let w = [
                windows::set_from_coarser(
                    nb.ox1,
                    c_cellbounds.interior(0),
                    loc.lx1(),
                    cng,
                    cellbounds.nx(0) > 1,
                ),
                windows::set_from_coarser(
                    nb.ox2,
                    c_cellbounds.interior(1),
                    loc.lx2(),
                    cng,
                    cellbounds.nx(1) > 1,
                ),
                windows::set_from_coarser(
                    nb.ox3,
                    c_cellbounds.interior(2),
                    loc.lx3(),
                    cng,
                    cellbounds.nx(2) > 1,
                ),
            ];
            (w, true, c_cellbounds)
        } else {
            let w = windows::set_from_finer(&nb, &cellbounds, g);
            (w, false, cellbounds)
        };
        check_window(&windows, &shape)?;

        let var = md.block(key.block).var(key.var);
        if var.is_allocated() != alloc_status[b] {
            return Err(MeshForestError::AllocStatusMismatch {
                entry: b,
                cached: alloc_status[b],
                observed: var.is_allocated(),
            });
        }
        let nv = var.nv();
        let extents = [
            windows[0].len() as usize,
            windows[1].len() as usize,
            windows[2].len() as usize,
        ];
        let buf_len = nv * extents[0] * extents[1] * extents[2] + 1;
        md.block_mut(key.block)
            .var_mut(key.var)
            .bd
            .ensure_recv(nb.buf_id, buf_len);

        rows.push(BoundaryInfo {
            key,
            windows,
            nv,
            allocated: alloc_status[b],
            restriction: false,
            coarse_dest,
            buf_len,
        });
    }
    Ok(BufferCache {
        entries: rows,
        alloc_status,
    })
}

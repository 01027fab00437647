//! MeshData: the set of blocks one rank drives through an exchange, plus the
//! memoized buffer caches.
//!
//! Every exchange phase walks the same canonical entry order produced by
//! [`MeshData::exchange_entries`]: block, then variable in declaration order
//! (only those with `FillGhost`), then neighbor in ascending `buf_id`. The
//! caches are invalidated whenever the vector of per-entry allocation bits
//! changes; the index windows themselves depend only on topology.

use crate::exchange::boundary_info::BufferCache;
use crate::mesh::block::MeshBlock;
use crate::mesh::variable::{Metadata, SendStatus};
use crate::mesh_error::MeshForestError;
use crate::topology::cache::InvalidateCache;
use crate::topology::forest::Forest;

/// Index triple of one exchange entry: `(block, variable, neighbor)`, all
/// positional within this MeshData.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct EntryKey {
    pub block: usize,
    pub var: usize,
    pub nb: usize,
}

/// Blocks of one rank plus the exchange caches.
#[derive(Clone, Debug, Default)]
pub struct MeshData {
    blocks: Vec<MeshBlock>,
    pub(crate) send_cache: Option<BufferCache>,
    pub(crate) set_cache: Option<BufferCache>,
}

impl MeshData {
    pub fn new(blocks: Vec<MeshBlock>) -> Self {
        Self {
            blocks,
            send_cache: None,
            set_cache: None,
        }
    }

    /// Build the blocks this rank owns from a validated forest, resolving
    /// every block's neighbor list. Fields are registered afterwards by the
    /// caller (declaration order must match across ranks).
    ///
    /// # Errors
    /// Topology errors from forest validation or neighbor resolution.
    pub fn from_forest(
        forest: &Forest,
        my_rank: usize,
        nx: [i32; 3],
        nghost: i32,
    ) -> Result<Self, MeshForestError> {
        forest.validate()?;
        let mut blocks = Vec::new();
        for (face, loc, entry) in forest.blocks() {
            if entry.rank != my_rank {
                continue;
            }
            let mut block = MeshBlock::new(entry.gid, entry.rank, face, *loc, nx, nghost);
            block.set_neighbors(forest.block_neighbors(face, loc)?);
            blocks.push(block);
        }
        Ok(Self::new(blocks))
    }

    #[inline]
    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    #[inline]
    pub fn blocks(&self) -> &[MeshBlock] {
        &self.blocks
    }

    #[inline]
    pub fn blocks_mut(&mut self) -> &mut [MeshBlock] {
        &mut self.blocks
    }

    #[inline]
    pub fn block(&self, i: usize) -> &MeshBlock {
        &self.blocks[i]
    }

    #[inline]
    pub fn block_mut(&mut self, i: usize) -> &mut MeshBlock {
        &mut self.blocks[i]
    }

    /// Positional index of the local block with global id `gid`.
    pub fn find_block(&self, gid: u64) -> Option<usize> {
        self.blocks.iter().position(|b| b.gid() == gid)
    }

    /// The canonical exchange entry order. Every phase (cache build, pack,
    /// notify, receive poll, set) consumes this one iterator so the phases
    /// can never disagree on entry positions.
    pub fn exchange_entries(&self, skip_completed_sends: bool) -> Vec<EntryKey> {
        let mut out = Vec::new();
        for (bi, block) in self.blocks.iter().enumerate() {
            for (vi, var) in block.vars().iter().enumerate() {
                if !var.is_set(Metadata::FILL_GHOST) {
                    continue;
                }
                for (ni, nb) in block.neighbors().iter().enumerate() {
                    if skip_completed_sends
                        && var.bd.sflag.get(&nb.buf_id) == Some(&SendStatus::Completed)
                    {
                        continue;
                    }
                    out.push(EntryKey {
                        block: bi,
                        var: vi,
                        nb: ni,
                    });
                }
            }
        }
        out
    }

    /// Per-entry allocation bits in canonical order; the cache staleness key.
    pub fn collect_alloc_status(&self, entries: &[EntryKey]) -> Vec<bool> {
        entries
            .iter()
            .map(|e| self.blocks[e.block].var(e.var).is_allocated())
            .collect()
    }

    /// Slot of `var` among the FillGhost variables of `block`, the
    /// `var_slot` that enters the MPI tag on both endpoints.
    pub fn fill_ghost_slot(&self, block: usize, var: usize) -> usize {
        self.blocks[block]
            .vars()
            .iter()
            .take(var)
            .filter(|v| v.is_set(Metadata::FILL_GHOST))
            .count()
    }
}

impl InvalidateCache for MeshData {
    fn invalidate_cache(&mut self) {
        self.send_cache = None;
        self.set_cache = None;
    }
}

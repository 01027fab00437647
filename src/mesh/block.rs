//! MeshBlock: one logically-rectangular patch of cells and its neighbors.

use crate::mesh::bounds::IndexShape;
use crate::mesh_error::MeshForestError;
use crate::mesh::variable::{Metadata, Variable};
use crate::topology::forest::FaceId;
use crate::topology::location::LogicalLocation;
use crate::topology::neighbor::NeighborBlock;
use crate::Real;

/// A concrete mesh block: location in the forest, cell index shapes, the
/// variables it holds, and descriptors of every logical neighbor.
#[derive(Clone, Debug)]
pub struct MeshBlock {
    gid: u64,
    rank: usize,
    face: FaceId,
    loc: LogicalLocation,
    cellbounds: IndexShape,
    c_cellbounds: IndexShape,
    nghost: i32,
    /// Ghost width of the coarse buffer. Kept equal to `nghost` so the
    /// load and set window widths across refinement levels agree.
    cnghost: i32,
    vars: Vec<Variable>,
    neighbors: Vec<NeighborBlock>,
}

impl MeshBlock {
    pub fn new(
        gid: u64,
        rank: usize,
        face: FaceId,
        loc: LogicalLocation,
        nx: [i32; 3],
        nghost: i32,
    ) -> Self {
        let cellbounds = IndexShape::new(nx, nghost);
        let c_cellbounds = cellbounds.coarsen();
        Self {
            gid,
            rank,
            face,
            loc,
            cellbounds,
            c_cellbounds,
            nghost,
            cnghost: nghost,
            vars: Vec::new(),
            neighbors: Vec::new(),
        }
    }

    #[inline]
    pub fn gid(&self) -> u64 {
        self.gid
    }

    #[inline]
    pub fn rank(&self) -> usize {
        self.rank
    }

    #[inline]
    pub fn face(&self) -> FaceId {
        self.face
    }

    #[inline]
    pub fn loc(&self) -> &LogicalLocation {
        &self.loc
    }

    #[inline]
    pub fn level(&self) -> u32 {
        self.loc.level()
    }

    #[inline]
    pub fn cellbounds(&self) -> &IndexShape {
        &self.cellbounds
    }

    #[inline]
    pub fn c_cellbounds(&self) -> &IndexShape {
        &self.c_cellbounds
    }

    #[inline]
    pub fn nghost(&self) -> i32 {
        self.nghost
    }

    #[inline]
    pub fn cnghost(&self) -> i32 {
        self.cnghost
    }

    /// Register a field on this block. Declaration order is the iteration
    /// order of every exchange phase, so it must match across ranks.
    pub fn add_field(
        &mut self,
        name: impl Into<String>,
        metadata: Metadata,
        nv: usize,
        fill_default: Real,
    ) -> usize {
        self.vars.push(Variable::new(
            name,
            metadata,
            nv,
            self.cellbounds,
            self.c_cellbounds,
            fill_default,
        ));
        self.vars.len() - 1
    }

    #[inline]
    pub fn vars(&self) -> &[Variable] {
        &self.vars
    }

    #[inline]
    pub fn var(&self, i: usize) -> &Variable {
        &self.vars[i]
    }

    #[inline]
    pub fn var_mut(&mut self, i: usize) -> &mut Variable {
        &mut self.vars[i]
    }

    pub fn var_index(&self, name: &str) -> Option<usize> {
        self.vars.iter().position(|v| v.name() == name)
    }

    /// Install the neighbor list, sorted by buffer slot.
    pub fn set_neighbors(&mut self, mut neighbors: Vec<NeighborBlock>) {
        neighbors.sort_by_key(|nb| (nb.buf_id, nb.gid));
        self.neighbors = neighbors;
    }

    #[inline]
    pub fn neighbors(&self) -> &[NeighborBlock] {
        &self.neighbors
    }

    /// Allocate a sparse variable by label, filling with its default.
    ///
    /// # Errors
    /// [`MeshForestError::UnknownVariable`] if no variable carries `label`.
    pub fn allocate_sparse(&mut self, label: &str) -> Result<(), MeshForestError> {
        let i = self
            .var_index(label)
            .ok_or_else(|| MeshForestError::UnknownVariable(label.to_string()))?;
        self.vars[i].allocate();
        Ok(())
    }

    /// Deallocate a sparse variable by label. Dense variables are left alone.
    ///
    /// # Errors
    /// [`MeshForestError::UnknownVariable`] if no variable carries `label`.
    pub fn deallocate_sparse(&mut self, label: &str) -> Result<(), MeshForestError> {
        let i = self
            .var_index(label)
            .ok_or_else(|| MeshForestError::UnknownVariable(label.to_string()))?;
        if self.vars[i].is_set(Metadata::SPARSE) {
            self.vars[i].deallocate();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::neighbor::{buffer_id, FrameMap};

    fn block() -> MeshBlock {
        MeshBlock::new(
            0,
            0,
            FaceId(0),
            LogicalLocation::root(),
            [4, 4, 1],
            2,
        )
    }

    #[test]
    fn shapes_are_derived() {
        let b = block();
        assert_eq!(b.cellbounds().nx(0), 4);
        assert_eq!(b.c_cellbounds().nx(0), 2);
        assert_eq!(b.cnghost(), b.nghost());
    }

    #[test]
    fn neighbors_sorted_by_slot() {
        let mut b = block();
        let mk = |ox1: i32, gid: u64| NeighborBlock {
            gid,
            rank: 0,
            level: 0,
            ox1,
            ox2: 0,
            ox3: 0,
            fi1: 0,
            fi2: 0,
            buf_id: buffer_id(ox1, 0, 0, 0, 0),
            target_id: buffer_id(-ox1, 0, 0, 0, 0),
            orientation: 1,
            frame: FrameMap::identity(),
        };
        b.set_neighbors(vec![mk(1, 2), mk(-1, 1)]);
        let ids: Vec<_> = b.neighbors().iter().map(|nb| nb.buf_id).collect();
        assert!(ids.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn sparse_allocation_by_label() {
        let mut b = block();
        b.add_field("s", Metadata::FILL_GHOST | Metadata::SPARSE, 1, 0.0);
        assert!(!b.var(0).is_allocated());
        b.allocate_sparse("s").unwrap();
        assert!(b.var(0).is_allocated());
        b.deallocate_sparse("s").unwrap();
        assert!(!b.var(0).is_allocated());
        assert!(b.allocate_sparse("nope").is_err());
    }
}

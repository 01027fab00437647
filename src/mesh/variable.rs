//! Cell-centered variables: metadata flags, optionally-allocated data arrays,
//! and the per-neighbor boundary buffers with their state machines.

use std::collections::HashMap;

use ndarray::Array4;
use serde::{Deserialize, Serialize};

use crate::mesh::bounds::IndexShape;
use crate::Real;

/// Variable metadata flag set.
///
/// Flags combine with `|`; membership is tested with
/// [`has`](Metadata::has).
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
pub struct Metadata {
    bits: u32,
}

impl Metadata {
    /// Ghost cells of this variable participate in boundary exchange.
    pub const FILL_GHOST: Metadata = Metadata { bits: 1 };
    /// The variable carries face flux storage.
    pub const WITH_FLUXES: Metadata = Metadata { bits: 1 << 1 };
    /// The variable may be unallocated on some blocks.
    pub const SPARSE: Metadata = Metadata { bits: 1 << 2 };
    /// The variable is part of the independent state vector.
    pub const INDEPENDENT: Metadata = Metadata { bits: 1 << 3 };

    #[inline]
    pub const fn empty() -> Self {
        Metadata { bits: 0 }
    }

    #[inline]
    pub const fn has(&self, flag: Metadata) -> bool {
        self.bits & flag.bits == flag.bits
    }
}

impl std::ops::BitOr for Metadata {
    type Output = Metadata;
    #[inline]
    fn bitor(self, rhs: Metadata) -> Metadata {
        Metadata {
            bits: self.bits | rhs.bits,
        }
    }
}

/// Send-side buffer state, tracked per (block, variable, neighbor).
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub enum SendStatus {
    #[default]
    Uninitialized,
    Pending,
    Filled,
    Completed,
}

/// Receive-side buffer state.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub enum RecvStatus {
    #[default]
    Pending,
    Arrived,
    Completed,
}

/// Boundary buffers of one variable, keyed by buffer slot.
///
/// `send` is keyed by our descriptor's `buf_id`; `recv` likewise, which is
/// where the neighbor's `target_id` points. A local-rank sender writes the
/// peer's `recv` entry directly after the pack fence.
#[derive(Clone, Debug, Default)]
pub struct BoundaryData {
    pub send: HashMap<i32, Vec<Real>>,
    pub recv: HashMap<i32, Vec<Real>>,
    pub sflag: HashMap<i32, SendStatus>,
    pub rflag: HashMap<i32, RecvStatus>,
}

impl BoundaryData {
    /// Ensure a send slot of `len` reals exists; zero-length slots grow.
    pub fn ensure_send(&mut self, buf_id: i32, len: usize) -> &mut Vec<Real> {
        let buf = self.send.entry(buf_id).or_default();
        if buf.len() != len {
            buf.resize(len, 0.0);
        }
        buf
    }

    /// Ensure a receive slot of `len` reals exists.
    pub fn ensure_recv(&mut self, buf_id: i32, len: usize) -> &mut Vec<Real> {
        let buf = self.recv.entry(buf_id).or_default();
        if buf.len() != len {
            buf.resize(len, 0.0);
        }
        buf
    }
}

/// A cell-centered variable on one block.
///
/// Sparse variables start unallocated; [`allocate`](Variable::allocate) fills
/// the data (and the coarse buffer, when refinement levels are in play) with
/// the fill default. Dense variables are allocated at construction.
#[derive(Clone, Debug)]
pub struct Variable {
    name: String,
    metadata: Metadata,
    nv: usize,
    fill_default: Real,
    shape: IndexShape,
    c_shape: IndexShape,
    data: Option<Array4<Real>>,
    coarse: Option<Array4<Real>>,
    /// Consecutive all-zero sweeps observed, for the deallocation rule.
    zero_sweeps: u32,
    pub bd: BoundaryData,
}

impl Variable {
    pub fn new(
        name: impl Into<String>,
        metadata: Metadata,
        nv: usize,
        shape: IndexShape,
        c_shape: IndexShape,
        fill_default: Real,
    ) -> Self {
        let mut var = Self {
            name: name.into(),
            metadata,
            nv,
            fill_default,
            shape,
            c_shape,
            data: None,
            coarse: None,
            zero_sweeps: 0,
            bd: BoundaryData::default(),
        };
        if !metadata.has(Metadata::SPARSE) {
            var.allocate();
        }
        var
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn metadata(&self) -> Metadata {
        self.metadata
    }

    #[inline]
    pub fn is_set(&self, flag: Metadata) -> bool {
        self.metadata.has(flag)
    }

    /// Number of components (the `v` extent of the data array).
    #[inline]
    pub fn nv(&self) -> usize {
        self.nv
    }

    #[inline]
    pub fn fill_default(&self) -> Real {
        self.fill_default
    }

    #[inline]
    pub fn is_allocated(&self) -> bool {
        self.data.is_some()
    }

    /// Allocate data (and coarse buffer) filled with the fill default.
    /// Idempotent.
    pub fn allocate(&mut self) {
        if self.data.is_some() {
            return;
        }
        let nv = self.nv;
        let dims = |s: &IndexShape| {
            (
                nv,
                s.dim(2) as usize,
                s.dim(1) as usize,
                s.dim(0) as usize,
            )
        };
        self.data = Some(Array4::from_elem(dims(&self.shape), self.fill_default));
        self.coarse = Some(Array4::from_elem(dims(&self.c_shape), self.fill_default));
        self.zero_sweeps = 0;
    }

    /// Drop the data arrays. Buffers and flags stay; the exchange layer
    /// rebuilds its caches from the changed allocation status.
    pub fn deallocate(&mut self) {
        self.data = None;
        self.coarse = None;
        self.zero_sweeps = 0;
    }

    #[inline]
    pub fn data(&self) -> Option<&Array4<Real>> {
        self.data.as_ref()
    }

    #[inline]
    pub fn data_mut(&mut self) -> Option<&mut Array4<Real>> {
        self.data.as_mut()
    }

    #[inline]
    pub fn coarse(&self) -> Option<&Array4<Real>> {
        self.coarse.as_ref()
    }

    #[inline]
    pub fn coarse_mut(&mut self) -> Option<&mut Array4<Real>> {
        self.coarse.as_mut()
    }

    #[inline]
    pub fn shape(&self) -> &IndexShape {
        &self.shape
    }

    #[inline]
    pub fn c_shape(&self) -> &IndexShape {
        &self.c_shape
    }

    /// Split borrows for the pack kernel: read data and coarse, write buffers.
    pub fn split_pack(
        &mut self,
    ) -> (
        Option<&Array4<Real>>,
        Option<&Array4<Real>>,
        &mut BoundaryData,
    ) {
        (self.data.as_ref(), self.coarse.as_ref(), &mut self.bd)
    }

    /// Split borrows for restriction: read data, write the coarse buffer.
    pub fn split_restrict(&mut self) -> (Option<&Array4<Real>>, Option<&mut Array4<Real>>) {
        (self.data.as_ref(), self.coarse.as_mut())
    }

    /// Split borrows for the set kernel: write data or coarse, read buffers.
    pub fn split_set(
        &mut self,
    ) -> (
        Option<&mut Array4<Real>>,
        Option<&mut Array4<Real>>,
        &BoundaryData,
    ) {
        (self.data.as_mut(), self.coarse.as_mut(), &self.bd)
    }

    /// True iff every value (interior and ghost) is at or below `threshold`
    /// in magnitude. Unallocated variables are vacuously zero.
    pub fn is_all_zero(&self, threshold: Real) -> bool {
        match &self.data {
            None => true,
            Some(data) => data.iter().all(|v| v.abs() <= threshold),
        }
    }

    /// Advance the zero-sweep counter; returns the new count. Resets on any
    /// above-threshold value.
    pub fn note_zero_sweep(&mut self, all_zero: bool) -> u32 {
        if all_zero {
            self.zero_sweeps += 1;
        } else {
            self.zero_sweeps = 0;
        }
        self.zero_sweeps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shapes() -> (IndexShape, IndexShape) {
        let s = IndexShape::new([4, 4, 1], 2);
        (s, s.coarsen())
    }

    #[test]
    fn metadata_flags_combine() {
        let m = Metadata::FILL_GHOST | Metadata::SPARSE;
        assert!(m.has(Metadata::FILL_GHOST));
        assert!(m.has(Metadata::SPARSE));
        assert!(!m.has(Metadata::INDEPENDENT));
        assert!(Metadata::empty().has(Metadata::empty()));
    }

    #[test]
    fn dense_allocated_sparse_not() {
        let (s, cs) = shapes();
        let dense = Variable::new("rho", Metadata::FILL_GHOST, 1, s, cs, 0.0);
        assert!(dense.is_allocated());
        let sparse = Variable::new(
            "s",
            Metadata::FILL_GHOST | Metadata::SPARSE,
            1,
            s,
            cs,
            0.5,
        );
        assert!(!sparse.is_allocated());
    }

    #[test]
    fn allocate_fills_with_default() {
        let (s, cs) = shapes();
        let mut v = Variable::new(
            "s",
            Metadata::FILL_GHOST | Metadata::SPARSE,
            2,
            s,
            cs,
            0.25,
        );
        v.allocate();
        let data = v.data().unwrap();
        assert_eq!(data.dim(), (2, 1, 8, 8));
        assert!(data.iter().all(|&x| x == 0.25));
        assert!(v.coarse().unwrap().iter().all(|&x| x == 0.25));
        // idempotent
        v.data_mut().unwrap()[[0, 0, 0, 0]] = 9.0;
        v.allocate();
        assert_eq!(v.data().unwrap()[[0, 0, 0, 0]], 9.0);
    }

    #[test]
    fn zero_sweep_counter() {
        let (s, cs) = shapes();
        let mut v = Variable::new(
            "s",
            Metadata::FILL_GHOST | Metadata::SPARSE,
            1,
            s,
            cs,
            0.0,
        );
        v.allocate();
        assert!(v.is_all_zero(1e-12));
        assert_eq!(v.note_zero_sweep(true), 1);
        assert_eq!(v.note_zero_sweep(true), 2);
        assert_eq!(v.note_zero_sweep(false), 0);
        v.data_mut().unwrap()[[0, 0, 3, 3]] = 1e-3;
        assert!(!v.is_all_zero(1e-6));
        assert!(v.is_all_zero(1e-2));
    }

    #[test]
    fn boundary_buffers_resize_to_window() {
        let mut bd = BoundaryData::default();
        bd.ensure_send(7, 33);
        assert_eq!(bd.send[&7].len(), 33);
        bd.ensure_send(7, 17);
        assert_eq!(bd.send[&7].len(), 17);
    }
}

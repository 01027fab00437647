//! # mesh-forest
//!
//! mesh-forest is a Rust library for the logical mesh topology and ghost-zone
//! boundary exchange of block-structured AMR codes. The domain is a forest of
//! quad-trees: quadrilateral faces joined along edges with explicit relative
//! orientations, each carrying a refinement tree of logical locations. On top
//! of that topology the crate provides neighbor discovery across faces,
//! edges, and corners at mixed refinement levels, and the full pack / send /
//! receive / set pipeline for ghost cells — including content-driven
//! allocation of sparse variables from the non-zero tag carried by every
//! buffer.
//!
//! ## Features
//! - Forest topology with arbitrary edge orientation and per-face refinement
//!   trees ordered by Morton key
//! - Deterministic neighbor descriptors: both endpoints derive matching
//!   buffer slots and MPI tags without communicating
//! - Sender/receiver index windows computed independently and bit-exactly
//! - Pluggable communication backends (serial, thread mailbox, MPI) and
//!   pluggable restriction/prolongation operators
//! - Sparse variables: allocation on first non-zero arrival, explicit
//!   deallocation sweep
//!
//! ## Usage
//! ```toml
//! [dependencies]
//! mesh-forest = "0.1"
//! # Optional features:
//! # features = ["mpi-support", "rayon"]
//! ```
//!
//! A typical exchange round over one rank's blocks:
//! `start_receiving` → `send_boundary_buffers` → poll
//! `receive_boundary_buffers` until `Complete` → `set_boundaries` →
//! `prolongate_boundaries`.

pub mod communicator;
pub mod config;
pub mod debug_invariants;
pub mod exchange;
pub mod mesh;
pub mod mesh_error;
pub mod task;
pub mod topology;

/// Cell scalar type. The exchange is monomorphized over it.
pub type Real = f64;

/// A convenient prelude importing the most-used types.
pub mod prelude {
    pub use crate::communicator::{exchange_tag, Communicator, NoComm, PollWait, ThreadComm, Wait};
    #[cfg(feature = "mpi-support")]
    pub use crate::communicator::MpiComm;
    pub use crate::config::{ExchangeContext, MeshConfig, ParameterInput, SparseConfig};
    pub use crate::exchange::engine::{
        deallocate_sparse_if_zero, prolongate_boundaries, receive_boundary_buffers,
        send_boundary_buffers, set_boundaries, start_receiving, ExchangeState,
    };
    pub use crate::exchange::refinement::{
        AverageRestriction, ConstantProlongation, ProlongationOp, RestrictionOp,
    };
    pub use crate::exchange::windows;
    pub use crate::mesh::amr::{check_refinement, AmrTag};
    pub use crate::mesh::block::MeshBlock;
    pub use crate::mesh::bounds::{IndexRange, IndexShape};
    pub use crate::mesh::mesh_data::MeshData;
    pub use crate::mesh::variable::{Metadata, RecvStatus, SendStatus, Variable};
    pub use crate::mesh_error::MeshForestError;
    pub use crate::task::{TaskId, TaskList, TaskStatus};
    pub use crate::topology::forest::{EdgeLoc, Face, FaceId, Forest, Node, NodeId};
    pub use crate::topology::location::LogicalLocation;
    pub use crate::topology::neighbor::{buffer_id, FrameMap, NeighborBlock};
    pub use crate::Real;
}

//! MeshForestError: unified error type for mesh-forest public APIs.
//!
//! Every fallible public routine in this crate returns this error type so
//! callers get robust, non-panicking error handling. Exchange failures are
//! fatal by design: there is no partial recovery, the caller is expected to
//! tear down the rank.

use thiserror::Error;

use crate::topology::location::LogicalLocation;

/// Unified error type for mesh-forest operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MeshForestError {
    /// A face was built from fewer than four distinct nodes.
    #[error("Topology error: face corners must be four distinct nodes")]
    DegenerateFace,
    /// A face or node id that is not part of this forest.
    #[error("Topology error: unknown {kind} id {id}")]
    UnknownId { kind: &'static str, id: u32 },
    /// Two locations in one refinement tree overlap (ancestor and descendant
    /// both present).
    #[error("Topology error: tree keys overlap: {anc:?} contains {desc:?}")]
    OverlappingTreeKeys {
        anc: LogicalLocation,
        desc: LogicalLocation,
    },
    /// A refined location is present without its full sibling set.
    #[error("Topology error: incomplete sibling set around {loc:?}")]
    IncompleteSiblings { loc: LogicalLocation },
    /// The keys of a face's tree do not tile the face.
    #[error("Topology error: tree of face {face} does not cover the face")]
    IncompleteTreeCover { face: u32 },
    /// A level jump across a reversed (orientation −1) face edge; the window
    /// rotation for that combination is not defined.
    #[error("Topology error: level jump across reversed edge of face {face}")]
    ReversedEdgeLevelJump { face: u32 },
    /// A logical location outside its tree bounds.
    #[error("Topology error: location {loc:?} outside tree bounds")]
    LocationOutOfTree { loc: LogicalLocation },
    /// A computed exchange window fell outside the variable's extents. This
    /// indicates a sender/receiver window mismatch and must never be clipped.
    #[error("Index error: window [{s},{e}] outside axis {axis} extent {extent}")]
    IndexWindow {
        axis: usize,
        s: i32,
        e: i32,
        extent: i32,
    },
    /// The allocation status observed while filling a cache entry disagrees
    /// with the status recorded at cache build; cache invalidation bug.
    #[error("Allocation mismatch for entry {entry}: cached {cached}, observed {observed}")]
    AllocStatusMismatch {
        entry: usize,
        cached: bool,
        observed: bool,
    },
    /// Sparse allocation requested for a variable that does not exist.
    #[error("Unknown variable `{0}`")]
    UnknownVariable(String),
    /// A receive poll exceeded the configured wall-clock timeout.
    #[error("Receive timeout after {elapsed_secs:.3} s ({arrived}/{expected} buffers arrived)")]
    ReceiveTimeout {
        elapsed_secs: f64,
        arrived: usize,
        expected: usize,
    },
    /// Two distinct receive buffers from one peer derived the same MPI tag.
    #[error("Tag collision: peer {peer}, tag {tag}")]
    TagCollision { peer: usize, tag: u16 },
    /// An arrived message did not match the posted buffer length.
    #[error("Wire size mismatch from rank {peer}: expected {expected} bytes, got {got}")]
    WireSizeMismatch {
        peer: usize,
        expected: usize,
        got: usize,
    },
    /// Communication backend failure.
    #[error("Communication error with rank {peer}: {msg}")]
    Comm { peer: usize, msg: String },
    /// Malformed parameter input text.
    #[error("Input error at line {line}: {msg}")]
    InputParse { line: usize, msg: String },
    /// A parameter was missing or of the wrong type.
    #[error("Input error: {section}/{key}: {msg}")]
    InputValue {
        section: String,
        key: String,
        msg: String,
    },
    /// Mesh extents not divisible by the meshblock extents.
    #[error("meshblock nx{axis}={block} does not divide mesh nx{axis}={mesh}")]
    BlockDoesNotDivideMesh { axis: usize, mesh: i32, block: i32 },
    /// Checkpoint record does not match the receiving variable.
    #[error("Checkpoint mismatch for `{name}` on block {gid}: {msg}")]
    CheckpointMismatch { gid: u64, name: String, msg: String },
    /// A task list dependency on a task id that was never added.
    #[error("Unknown task id {0}")]
    UnknownTask(usize),
}

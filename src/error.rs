use crate::mesh::{CellId, VertexId};
use thiserror::Error;

/// Structural violations of the tissue mesh.
///
/// Every variant is fatal: the simulation driver halts rather than continue
/// with corrupted topology. "No relationship" outcomes are never errors and are
/// returned as `None` or empty collections instead.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum MeshError {
    /// A perimeter needs at least three vertices.
    #[error("Perimeter of cell {cell:?} has {count} vertices, at least 3 required")]
    TooFewVertices { cell: Option<CellId>, count: usize },

    /// The same vertex appears twice in one perimeter.
    #[error("Perimeter of cell {cell:?} lists vertex {vertex} more than once")]
    DuplicateVertex { cell: Option<CellId>, vertex: VertexId },

    /// A perimeter references a vertex id that is not in the arena.
    #[error("Cell {cell:?} references missing vertex {vertex}")]
    MissingVertex { cell: Option<CellId>, vertex: VertexId },

    /// A perimeter whose edges cross or whose area vanished.
    #[error("Perimeter of cell {cell} is not a simple polygon")]
    NonSimplePerimeter { cell: CellId },

    /// Lookup of a cell id that is neither live nor retired.
    #[error("Unknown cell {0}")]
    UnknownCell(CellId),

    /// Cell ids must be unique in the construction payload.
    #[error("Cell {0} defined more than once")]
    DuplicateCell(CellId),

    /// A neighbor link present on one side only.
    #[error("Cell {from} lists {to} as a neighbor but not vice versa")]
    AsymmetricNeighbors { from: CellId, to: CellId },

    /// Both sides list each other but disagree on the shared edge.
    #[error("Cells {a} and {b} disagree on their shared edge ({len_a} vs {len_b})")]
    InconsistentSharedEdge { a: CellId, b: CellId, len_a: f64, len_b: f64 },

    /// A shared edge whose vertices are not in both perimeters.
    #[error("Shared edge ({v0}, {v1}) between cells {a} and {b} is not present in both perimeters")]
    BrokenSharedEdge { a: CellId, b: CellId, v0: VertexId, v1: VertexId },

    /// Linking a cell to itself.
    #[error("Cell {0} cannot neighbor itself")]
    SelfNeighbor(CellId),

    /// Two live vertices occupying the same point.
    #[error("Vertices {a} and {b} are coordinate-equal copies")]
    DuplicatedPoint { a: VertexId, b: VertexId },

    /// Two live cells covering a common patch of the plane.
    #[error("Cells {a} and {b} overlap")]
    OverlappingCells { a: CellId, b: CellId },

    #[error("Cell {cell} has negative concentration {value}")]
    NegativeConcentration { cell: CellId, value: f64 },
}

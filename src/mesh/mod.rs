//! The tissue mesh: vertices, perimeters, cells and the adjacency rules that
//! keep their neighbor maps consistent.

pub mod cell;
pub mod neighbor_helpers;
pub mod perimeter;
pub mod perimeter_helpers;
pub mod tissue;
pub mod vertex;

pub type VertexId = u32;
pub type CellId = u32;

pub use cell::{Cell, SharedEdge, SourceTerm};
pub use neighbor_helpers::{DirectionCode, LrcFix, NeighborContext};
pub use perimeter::{Bounds, Corners, QuadPerimeter};
pub use perimeter_helpers::Overlap;
pub use tissue::{CellSeed, ContactRefresh, MeshPayload, Tissue};
pub use vertex::{Vertex, VertexArena};

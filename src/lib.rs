//! Vertex-based simulation of a growing plant root tissue.
//!
//! Cells are quadrilateral perimeters over a shared vertex arena. Each tick
//! the [`mover::Mover`] advances vertices, the [`circulator::Circulator`]
//! diffuses a tracked substance across the neighbor graph and the
//! [`divider::Divider`] splits qualifying cells, after which a snapshot is
//! handed to the output sinks.

pub mod circulator;
pub mod divider;
pub mod error;
pub mod input;
pub mod mesh;
pub mod mover;
pub mod output;
pub mod simulation;

#[cfg(test)]
mod test_support;

pub use error::MeshError;
pub use simulation::{Simulation, TickReport};

//! Fixtures shared by the unit tests.

use crate::input::rect_grid;
use crate::mesh::{CellSeed, MeshPayload, SourceTerm, VertexId};
use tissue_common::{SimParams, SimulationConfig};

const MINIMAL_CONFIG: &str = r#"
[timing]
total_ticks = 1

[mesh]

[output]
base_filename = "test"
"#;

/// Parameters of a minimal configuration: default mechanics, diffusion and division.
pub fn params() -> SimParams {
    SimulationConfig::from_toml_str(MINIMAL_CONFIG)
        .expect("minimal config parses")
        .get_sim_params()
}

pub fn seed(vertices: Vec<VertexId>, concentration: f64) -> CellSeed {
    CellSeed {
        id: None,
        vertices,
        concentration,
        growing: true,
        root_cap: false,
        source: SourceTerm::default(),
    }
}

/// A `rows` x `columns` grid with its bottom-left corner at the origin.
pub fn grid(rows: u32, columns: u32, width: f64, height: f64, concentration: f64) -> MeshPayload {
    rect_grid(rows, columns, width, height, (0.0, 0.0), concentration)
}

use serde::{Deserialize, Serialize};
use crate::labels::{CellType, DevZone};

/// One live cell as seen by the output collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellRecord {
    pub id: u32,
    pub concentration: f64,
    /// Perimeter vertex ids in counter-clockwise order.
    pub vertex_ids: Vec<u32>,
    /// Number of divisions in this cell's lineage.
    pub division_count: u32,
    pub area: f64,
    pub apical_memlen: f64,
    pub basal_memlen: f64,
    pub left_memlen: f64,
    pub right_memlen: f64,
    pub dev_zone: DevZone,
    pub cell_type: CellType,
    pub root_cap: bool,
    pub parent: Option<u32>,
    /// Neighbor ids with their shared contact length (um).
    pub neighbors: Vec<(u32, f64)>,
}

/// One live vertex.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VertexRecord {
    pub id: u32,
    pub x: f64,
    pub y: f64,
}

/// A read-only view of the tissue handed to output after a tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Tick after which the snapshot was taken (0 is the initial mesh).
    pub tick: u32,
    /// The simulation time (hours).
    pub time: f64,
    /// Total division events since the start of the run.
    pub division_count: u32,
    pub root_tip_y: f64,
    pub root_midpoint_x: f64,
    /// Total quantity (concentration times area) over all cells.
    pub total_quantity: f64,
    pub cells: Vec<CellRecord>,
    pub vertices: Vec<VertexRecord>,
}

/// Retirement record of a cell that divided.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineageRecord {
    pub cell: u32,
    pub parent: Option<u32>,
    pub children: [u32; 2],
    pub retired_at_tick: u32,
}

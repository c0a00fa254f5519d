use crate::error::MeshError;
use crate::mesh::perimeter::QuadPerimeter;
use crate::mesh::vertex::VertexArena;
use crate::mesh::{CellId, VertexId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tissue_common::Direction;

/// How one cell sees a neighbor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SharedEdge {
    /// Side of this cell the neighbor is on.
    pub direction: Direction,
    /// Length of boundary in contact (um), identical on both sides of the link.
    pub length: f64,
    /// Edge shared by identity, lower id first. `None` for T-junction and
    /// root-cap contacts.
    pub shared_pair: Option<(VertexId, VertexId)>,
}

/// Synthesis and degradation rates of the tracked substance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceTerm {
    #[serde(default)]
    pub k_s: f64,
    #[serde(default)]
    pub k_d: f64,
    #[serde(default)]
    pub w: f64,
}

impl SourceTerm {
    /// Net production per unit area per hour at concentration `c`.
    pub fn rate(&self, c: f64) -> f64 {
        self.k_s * self.w - self.k_d * c
    }
}

/// One cell of the tissue: its perimeter, tracked state and neighbor map.
#[derive(Debug, Clone)]
pub struct Cell {
    id: CellId,
    perimeter: QuadPerimeter,
    concentration: f64,
    initial_area: f64,
    rest_height: f64,
    division_count: u32,
    root_cap: bool,
    growing: bool,
    source: SourceTerm,
    parent: Option<CellId>,
    neighbors: BTreeMap<CellId, SharedEdge>,
}

impl Cell {
    /// Creates a cell whose initial area and rest height are taken from its
    /// current geometry.
    pub fn new(
        id: CellId,
        perimeter: QuadPerimeter,
        concentration: f64,
        arena: &VertexArena,
    ) -> Result<Self, MeshError> {
        let initial_area = perimeter.area(arena)?;
        let rest_height = perimeter.bounds(arena)?.height();
        Ok(Cell {
            id,
            perimeter,
            concentration,
            initial_area,
            rest_height,
            division_count: 0,
            root_cap: false,
            growing: true,
            source: SourceTerm::default(),
            parent: None,
            neighbors: BTreeMap::new(),
        })
    }

    pub fn with_root_cap(mut self, root_cap: bool) -> Self {
        self.root_cap = root_cap;
        self
    }

    pub fn with_growing(mut self, growing: bool) -> Self {
        self.growing = growing;
        self
    }

    pub fn with_source(mut self, source: SourceTerm) -> Self {
        self.source = source;
        self
    }

    pub(crate) fn with_lineage(mut self, parent: CellId, division_count: u32) -> Self {
        self.parent = Some(parent);
        self.division_count = division_count;
        self
    }

    pub(crate) fn with_rest_height(mut self, rest_height: f64) -> Self {
        self.rest_height = rest_height;
        self
    }

    pub fn id(&self) -> CellId {
        self.id
    }

    pub fn perimeter(&self) -> &QuadPerimeter {
        &self.perimeter
    }

    pub fn vertex_ids(&self) -> &[VertexId] {
        self.perimeter.vertex_ids()
    }

    pub fn concentration(&self) -> f64 {
        self.concentration
    }

    pub fn set_concentration(&mut self, concentration: f64) {
        self.concentration = concentration;
    }

    pub fn area(&self, arena: &VertexArena) -> Result<f64, MeshError> {
        self.perimeter.area(arena)
    }

    /// Concentration times area.
    pub fn quantity(&self, arena: &VertexArena) -> Result<f64, MeshError> {
        Ok(self.concentration * self.area(arena)?)
    }

    pub fn initial_area(&self) -> f64 {
        self.initial_area
    }

    /// Target extent along the growth axis, pulled on by the mover.
    pub fn rest_height(&self) -> f64 {
        self.rest_height
    }

    pub fn set_rest_height(&mut self, rest_height: f64) {
        self.rest_height = rest_height;
    }

    pub fn division_count(&self) -> u32 {
        self.division_count
    }

    pub fn is_root_cap(&self) -> bool {
        self.root_cap
    }

    pub fn is_growing(&self) -> bool {
        self.growing
    }

    pub fn source(&self) -> SourceTerm {
        self.source
    }

    pub fn parent(&self) -> Option<CellId> {
        self.parent
    }

    pub fn neighbors(&self) -> &BTreeMap<CellId, SharedEdge> {
        &self.neighbors
    }

    pub fn neighbor(&self, id: CellId) -> Option<&SharedEdge> {
        self.neighbors.get(&id)
    }

    pub fn is_neighbor(&self, id: CellId) -> bool {
        self.neighbors.contains_key(&id)
    }

    /// Neighbor ids on the given side, ascending.
    pub fn neighbors_in(&self, direction: Direction) -> impl Iterator<Item = CellId> + '_ {
        self.neighbors
            .iter()
            .filter(move |(_, e)| e.direction == direction)
            .map(|(&id, _)| id)
    }

    // Neighbor maps are only written through `Tissue`, which keeps both sides in step.
    pub(crate) fn set_neighbor(&mut self, id: CellId, edge: SharedEdge) -> Result<Option<SharedEdge>, MeshError> {
        if id == self.id {
            return Err(MeshError::SelfNeighbor(id));
        }
        Ok(self.neighbors.insert(id, edge))
    }

    pub(crate) fn remove_neighbor(&mut self, id: CellId) -> Option<SharedEdge> {
        self.neighbors.remove(&id)
    }
}

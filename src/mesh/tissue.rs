use crate::error::MeshError;
use crate::mesh::cell::{Cell, SharedEdge, SourceTerm};
use crate::mesh::neighbor_helpers::{fix_lrc_neighbors_after_growth, shared_edge_between, NeighborContext};
use crate::mesh::perimeter::{Bounds, QuadPerimeter};
use crate::mesh::vertex::VertexArena;
use crate::mesh::{CellId, VertexId};
use log::{debug, trace};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tissue_common::vecmath::point_segment_distance;
use tissue_common::{CellType, ContactOverride, DevZone, LineageRecord, TypeBounds, Vec2, ZoneBounds};

/// One cell of the construction payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellSeed {
    /// Explicit id; defaults to the seed's position in the payload.
    #[serde(default)]
    pub id: Option<CellId>,
    /// Perimeter as indices into `MeshPayload::vertices`.
    pub vertices: Vec<VertexId>,
    #[serde(default)]
    pub concentration: f64,
    #[serde(default = "default_growing")]
    pub growing: bool,
    #[serde(default)]
    pub root_cap: bool,
    #[serde(default)]
    pub source: SourceTerm,
}

/// Initial mesh handed over by the input collaborator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeshPayload {
    /// Vertex coordinates; the index is the vertex id.
    pub vertices: Vec<(f64, f64)>,
    pub cells: Vec<CellSeed>,
}

fn default_growing() -> bool {
    true
}

/// Counts of link changes made by [`Tissue::refresh_contacts`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContactRefresh {
    pub added: usize,
    pub removed: usize,
    pub refreshed: usize,
}

type PairLinks = Vec<(CellId, CellId, SharedEdge, SharedEdge)>;

/// The whole mesh: vertex arena, live cells, retired lineage and counters.
#[derive(Debug, Clone)]
pub struct Tissue {
    vertices: VertexArena,
    cells: BTreeMap<CellId, Cell>,
    lineage: BTreeMap<CellId, LineageRecord>,
    next_cell_id: CellId,
    division_count: u32,
    root_midpoint_x: f64,
    overrides: Vec<ContactOverride>,
    eps: f64,
}

impl Tissue {
    /// Builds the mesh from `payload` and derives every neighbor link from geometry.
    pub fn from_payload(
        payload: &MeshPayload,
        root_cap_ids: &[CellId],
        overrides: Vec<ContactOverride>,
        eps: f64,
    ) -> Result<Self, MeshError> {
        let mut vertices = VertexArena::new();
        for &(x, y) in &payload.vertices {
            vertices.insert(x, y);
        }

        let mut cells = BTreeMap::new();
        for (index, seed) in payload.cells.iter().enumerate() {
            let id = seed.id.unwrap_or(index as CellId);
            let perimeter = QuadPerimeter::new(seed.vertices.clone(), &vertices, Some(id))?;
            if !perimeter.is_simple(&vertices, eps)? {
                return Err(MeshError::NonSimplePerimeter { cell: id });
            }
            let cell = Cell::new(id, perimeter, seed.concentration, &vertices)?
                .with_root_cap(seed.root_cap || root_cap_ids.contains(&id))
                .with_growing(seed.growing)
                .with_source(seed.source);
            if cells.insert(id, cell).is_some() {
                return Err(MeshError::DuplicateCell(id));
            }
        }

        check_no_coincident_vertices(&vertices, eps)?;

        let next_cell_id = cells.keys().next_back().map_or(0, |&id| id + 1);
        let root_midpoint_x = vertices.x_range().map_or(0.0, |(lo, hi)| 0.5 * (lo + hi));

        let mut tissue = Tissue {
            vertices,
            cells,
            lineage: BTreeMap::new(),
            next_cell_id,
            division_count: 0,
            root_midpoint_x,
            overrides,
            eps,
        };
        let refresh = tissue.refresh_contacts()?;
        debug!(
            "Tissue built: {} cells, {} vertices, {} neighbor links",
            tissue.cells.len(),
            tissue.vertices.len(),
            refresh.added
        );
        Ok(tissue)
    }

    pub fn vertices(&self) -> &VertexArena {
        &self.vertices
    }

    pub(crate) fn vertices_mut(&mut self) -> &mut VertexArena {
        &mut self.vertices
    }

    /// Live cells in ascending id order.
    pub fn cells(&self) -> impl Iterator<Item = &Cell> {
        self.cells.values()
    }

    pub fn cell_ids(&self) -> Vec<CellId> {
        self.cells.keys().copied().collect()
    }

    pub fn cell(&self, id: CellId) -> Option<&Cell> {
        self.cells.get(&id)
    }

    pub(crate) fn cell_mut(&mut self, id: CellId) -> Option<&mut Cell> {
        self.cells.get_mut(&id)
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Retirement record of a cell that divided.
    pub fn lineage(&self, id: CellId) -> Option<&LineageRecord> {
        self.lineage.get(&id)
    }

    pub fn lineage_records(&self) -> impl Iterator<Item = &LineageRecord> {
        self.lineage.values()
    }

    /// True for live and retired ids alike.
    pub fn is_resolvable(&self, id: CellId) -> bool {
        self.cells.contains_key(&id) || self.lineage.contains_key(&id)
    }

    pub fn division_count(&self) -> u32 {
        self.division_count
    }

    pub fn root_midpoint_x(&self) -> f64 {
        self.root_midpoint_x
    }

    pub fn eps(&self) -> f64 {
        self.eps
    }

    /// Lowest y of the mesh.
    pub fn root_tip_y(&self) -> f64 {
        self.vertices.y_range().map_or(0.0, |(lo, _)| lo)
    }

    pub fn context(&self) -> NeighborContext<'_> {
        NeighborContext {
            arena: &self.vertices,
            root_midpoint_x: self.root_midpoint_x,
            overrides: &self.overrides,
            eps: self.eps,
        }
    }

    pub fn dev_zone(&self, cell: &Cell, bounds: &ZoneBounds) -> Result<DevZone, MeshError> {
        if cell.is_root_cap() {
            return Ok(DevZone::RootTip);
        }
        let mid_y = cell.perimeter().midpoint(&self.vertices)?.y;
        Ok(bounds.zone_at(mid_y - self.root_tip_y()))
    }

    pub fn cell_type(&self, cell: &Cell, bounds: &TypeBounds) -> Result<CellType, MeshError> {
        if cell.is_root_cap() {
            return Ok(CellType::RootCap);
        }
        let mid_x = cell.perimeter().midpoint(&self.vertices)?.x;
        Ok(bounds.type_at((mid_x - self.root_midpoint_x).abs()))
    }

    /// Sum of concentration times area over all live cells.
    pub fn total_quantity(&self) -> Result<f64, MeshError> {
        self.cells.values().map(|c| c.quantity(&self.vertices)).sum()
    }

    /// Live cells referencing each vertex.
    pub fn vertex_users(&self) -> BTreeMap<VertexId, Vec<CellId>> {
        let mut users: BTreeMap<VertexId, Vec<CellId>> = BTreeMap::new();
        for cell in self.cells.values() {
            for &v in cell.vertex_ids() {
                users.entry(v).or_default().push(cell.id());
            }
        }
        users
    }

    /// Links `a` and `b` if their geometry says they border.
    pub fn link(&mut self, a: CellId, b: CellId) -> Result<bool, MeshError> {
        let (ab, ba) = {
            let ca = self.cells.get(&a).ok_or(MeshError::UnknownCell(a))?;
            let cb = self.cells.get(&b).ok_or(MeshError::UnknownCell(b))?;
            let ctx = self.context();
            (shared_edge_between(ca, cb, &ctx)?, shared_edge_between(cb, ca, &ctx)?)
        };
        match (ab, ba) {
            (Some(ab), Some(ba)) => {
                self.insert_link(a, b, ab, ba)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Writes both sides of a link. Length and shared pair are taken from `ab`
    /// so the two descriptors agree exactly.
    pub(crate) fn insert_link(&mut self, a: CellId, b: CellId, ab: SharedEdge, ba: SharedEdge) -> Result<(), MeshError> {
        if a == b {
            return Err(MeshError::SelfNeighbor(a));
        }
        if !self.cells.contains_key(&b) {
            return Err(MeshError::UnknownCell(b));
        }
        let mirrored = SharedEdge { direction: ba.direction, ..ab };
        self.cells.get_mut(&a).ok_or(MeshError::UnknownCell(a))?.set_neighbor(b, ab)?;
        self.cells.get_mut(&b).ok_or(MeshError::UnknownCell(b))?.set_neighbor(a, mirrored)?;
        Ok(())
    }

    /// Drops the link on both sides. Returns whether either side had it.
    pub fn unlink(&mut self, a: CellId, b: CellId) -> bool {
        let left = self.cells.get_mut(&a).and_then(|c| c.remove_neighbor(b)).is_some();
        let right = self.cells.get_mut(&b).and_then(|c| c.remove_neighbor(a)).is_some();
        left || right
    }

    /// Re-derives every neighbor link from current geometry: adds new contacts,
    /// drops vanished ones and refreshes shared-edge lengths. Root-cap links go
    /// through the root-cap rule.
    pub fn refresh_contacts(&mut self) -> Result<ContactRefresh, MeshError> {
        let desired: BTreeMap<(CellId, CellId), (SharedEdge, SharedEdge)> = self
            .desired_links()?
            .into_iter()
            .map(|(a, b, ab, ba)| ((a, b), (ab, ba)))
            .collect();

        let existing: Vec<(CellId, CellId)> = self
            .cells
            .values()
            .flat_map(|c| c.neighbors().keys().map(move |&n| (c.id(), n)))
            .filter(|&(a, b)| a < b)
            .filter(|&(a, b)| match (self.cells.get(&a), self.cells.get(&b)) {
                (Some(ca), Some(cb)) => ca.is_root_cap() == cb.is_root_cap(),
                _ => true,
            })
            .collect();

        let mut refresh = ContactRefresh::default();
        for (a, b) in existing {
            if !desired.contains_key(&(a, b)) {
                self.unlink(a, b);
                refresh.removed += 1;
            }
        }
        for ((a, b), (ab, ba)) in desired {
            let known = self.cells.get(&a).is_some_and(|c| c.is_neighbor(b));
            self.insert_link(a, b, ab, ba)?;
            if known {
                refresh.refreshed += 1;
            } else {
                refresh.added += 1;
            }
        }

        let root_caps: Vec<CellId> = self.cells.values().filter(|c| c.is_root_cap()).map(|c| c.id()).collect();
        for lrc in root_caps {
            let fix = fix_lrc_neighbors_after_growth(self, lrc)?;
            refresh.added += fix.added;
            refresh.removed += fix.removed;
            refresh.refreshed += fix.refreshed;
        }
        trace!("Contact refresh: {:?}", refresh);
        Ok(refresh)
    }

    /// Links every pair that borders, skipping pairs with exactly one root cap.
    fn desired_links(&self) -> Result<PairLinks, MeshError> {
        let ctx = self.context();
        let cells: Vec<&Cell> = self.cells.values().collect();
        let bounds: Vec<Bounds> = cells
            .par_iter()
            .map(|c| c.perimeter().bounds(&self.vertices))
            .collect::<Result<_, _>>()?;
        let eps = self.eps;

        let per_cell: Vec<PairLinks> = (0..cells.len())
            .into_par_iter()
            .map(|i| {
                let mut found = Vec::new();
                for j in (i + 1)..cells.len() {
                    let (a, b) = (cells[i], cells[j]);
                    if a.is_root_cap() != b.is_root_cap() || !bounds[i].touches(&bounds[j], eps) {
                        continue;
                    }
                    if let (Some(ab), Some(ba)) = (shared_edge_between(a, b, &ctx)?, shared_edge_between(b, a, &ctx)?) {
                        found.push((a.id(), b.id(), ab, ba));
                    }
                }
                Ok(found)
            })
            .collect::<Result<_, MeshError>>()?;
        Ok(per_cell.into_iter().flatten().collect())
    }

    pub(crate) fn allocate_cell_id(&mut self) -> CellId {
        let id = self.next_cell_id;
        self.next_cell_id += 1;
        id
    }

    pub(crate) fn insert_cell(&mut self, cell: Cell) -> Result<(), MeshError> {
        let id = cell.id();
        if self.is_resolvable(id) {
            return Err(MeshError::DuplicateCell(id));
        }
        self.cells.insert(id, cell);
        Ok(())
    }

    /// Removes a dividing cell from the live set, unlinking it from every
    /// neighbor, and records its lineage. Returns the retired cell.
    pub(crate) fn retire_cell(&mut self, id: CellId, children: [CellId; 2], tick: u32) -> Result<Cell, MeshError> {
        let cell = self.cells.remove(&id).ok_or(MeshError::UnknownCell(id))?;
        for &n in cell.neighbors().keys() {
            if let Some(neighbor) = self.cells.get_mut(&n) {
                neighbor.remove_neighbor(id);
            }
        }
        self.lineage.insert(
            id,
            LineageRecord {
                cell: id,
                parent: cell.parent(),
                children,
                retired_at_tick: tick,
            },
        );
        self.division_count += 1;
        Ok(cell)
    }

    /// Drops the `candidates` no live perimeter references any more.
    pub(crate) fn remove_orphan_vertices(&mut self, candidates: &[VertexId]) -> Vec<VertexId> {
        let referenced: BTreeSet<VertexId> = self
            .cells
            .values()
            .flat_map(|c| c.vertex_ids().iter().copied())
            .filter(|v| candidates.contains(v))
            .collect();
        self.vertices.remove_orphans(candidates.iter().copied(), &referenced)
    }

    /// Verifies perimeter validity, neighbor symmetry and shared-edge connectivity.
    pub fn check_invariants(&self) -> Result<(), MeshError> {
        for cell in self.cells.values() {
            let id = cell.id();
            QuadPerimeter::validate_ids(cell.vertex_ids(), Some(id))?;
            for &v in cell.vertex_ids() {
                if !self.vertices.contains(v) {
                    return Err(MeshError::MissingVertex { cell: Some(id), vertex: v });
                }
            }
            if !cell.perimeter().is_simple(&self.vertices, self.eps)? {
                return Err(MeshError::NonSimplePerimeter { cell: id });
            }

            for (&n, edge) in cell.neighbors() {
                let other = self.cells.get(&n).ok_or(MeshError::UnknownCell(n))?;
                let back = other
                    .neighbor(id)
                    .ok_or(MeshError::AsymmetricNeighbors { from: id, to: n })?;
                let tol = 1e-9 * edge.length.abs().max(1.0);
                if (edge.length - back.length).abs() > tol || edge.shared_pair != back.shared_pair {
                    return Err(MeshError::InconsistentSharedEdge {
                        a: id,
                        b: n,
                        len_a: edge.length,
                        len_b: back.length,
                    });
                }
                if let Some((v0, v1)) = edge.shared_pair {
                    if !cell.perimeter().has_edge(v0, v1) || !other.perimeter().has_edge(v0, v1) {
                        return Err(MeshError::BrokenSharedEdge { a: id, b: n, v0, v1 });
                    }
                }
            }
        }
        self.check_no_overlap()
    }

    /// Rejects any pair of live cells whose interiors intersect. Cells may
    /// still touch along edges or at vertices.
    pub fn check_no_overlap(&self) -> Result<(), MeshError> {
        let mut boxes: Vec<(CellId, Bounds, Vec<Vec2>)> = self
            .cells
            .values()
            .map(|c| {
                let points = c.perimeter().points(&self.vertices)?;
                Ok((c.id(), Bounds::of(&points), points))
            })
            .collect::<Result<_, MeshError>>()?;
        boxes.sort_by(|a, b| a.1.min_y.total_cmp(&b.1.min_y));

        let eps = self.eps;
        let clash = (0..boxes.len()).into_par_iter().find_map_first(|i| {
            let (a, bounds_a, points_a) = &boxes[i];
            boxes[i + 1..]
                .iter()
                .take_while(|(_, bounds_b, _)| bounds_b.min_y < bounds_a.max_y - eps)
                .filter(|(_, bounds_b, _)| bounds_b.min_x < bounds_a.max_x - eps && bounds_a.min_x < bounds_b.max_x - eps)
                .find(|(_, _, points_b)| polygons_overlap(points_a, points_b, eps))
                .map(|(b, _, _)| (*a.min(b), *a.max(b)))
        });
        match clash {
            Some((a, b)) => Err(MeshError::OverlappingCells { a, b }),
            None => Ok(()),
        }
    }
}

/// True when two simple polygons share interior area: an edge of one
/// properly crosses an edge of the other, or a vertex or the vertex mean of
/// one lies strictly inside the other.
fn polygons_overlap(a: &[Vec2], b: &[Vec2], eps: f64) -> bool {
    let edges = |p: &[Vec2]| -> Vec<(Vec2, Vec2)> { (0..p.len()).map(|i| (p[i], p[(i + 1) % p.len()])).collect() };
    let (edges_a, edges_b) = (edges(a), edges(b));
    for &(p1, p2) in &edges_a {
        for &(q1, q2) in &edges_b {
            if segments_cross(p1, p2, q1, q2, eps) {
                return true;
            }
        }
    }
    let mean = |p: &[Vec2]| p.iter().fold(Vec2::zero(), |acc, &q| acc + q) / p.len() as f64;
    let strictly_inside = |q: Vec2, poly: &[Vec2], poly_edges: &[(Vec2, Vec2)]| {
        point_in_polygon(q, poly) && poly_edges.iter().all(|&(s, t)| point_segment_distance(q, s, t) > eps)
    };
    a.iter().chain(std::iter::once(&mean(a))).any(|&q| strictly_inside(q, b, &edges_b))
        || b.iter().chain(std::iter::once(&mean(b))).any(|&q| strictly_inside(q, a, &edges_a))
}

/// Proper crossing only; touching and collinear segments do not count.
fn segments_cross(p1: Vec2, p2: Vec2, q1: Vec2, q2: Vec2, eps: f64) -> bool {
    let d1 = (p2 - p1).cross(q1 - p1);
    let d2 = (p2 - p1).cross(q2 - p1);
    let d3 = (q2 - q1).cross(p1 - q1);
    let d4 = (q2 - q1).cross(p2 - q1);
    ((d1 > eps && d2 < -eps) || (d1 < -eps && d2 > eps)) && ((d3 > eps && d4 < -eps) || (d3 < -eps && d4 > eps))
}

fn point_in_polygon(p: Vec2, points: &[Vec2]) -> bool {
    let n = points.len();
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (pi, pj) = (points[i], points[j]);
        if (pi.y > p.y) != (pj.y > p.y) && p.x < (pj.x - pi.x) * (p.y - pi.y) / (pj.y - pi.y) + pi.x {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Rejects distinct vertices sitting on the same point.
fn check_no_coincident_vertices(vertices: &VertexArena, eps: f64) -> Result<(), MeshError> {
    let mut sorted: Vec<(f64, f64, VertexId)> = vertices.iter().map(|v| (v.x(), v.y(), v.v_id())).collect();
    sorted.sort_by(|a, b| a.0.total_cmp(&b.0));
    for i in 0..sorted.len() {
        for j in (i + 1)..sorted.len() {
            if sorted[j].0 - sorted[i].0 > eps {
                break;
            }
            if (sorted[j].1 - sorted[i].1).abs() <= eps {
                return Err(MeshError::DuplicatedPoint { a: sorted[i].2, b: sorted[j].2 });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{grid, seed};
    use approx::assert_relative_eq;

    fn build(payload: &MeshPayload) -> Tissue {
        Tissue::from_payload(payload, &[], Vec::new(), 1e-9).unwrap()
    }

    fn square(id: Option<CellId>) -> CellSeed {
        CellSeed { id, ..seed(vec![0, 1, 2, 3], 1.0) }
    }

    #[test]
    fn test_grid_links_edge_neighbors_only() {
        let tissue = build(&grid(2, 2, 10.0, 10.0, 1.0));
        tissue.check_invariants().unwrap();
        let ids = |c: CellId| tissue.cell(c).unwrap().neighbors().keys().copied().collect::<Vec<_>>();
        assert_eq!(ids(0), vec![1, 2]);
        assert_eq!(ids(1), vec![0, 3]);
        assert_eq!(ids(2), vec![0, 3]);
        assert_eq!(ids(3), vec![1, 2]);

        let edge = tissue.cell(0).unwrap().neighbor(1).unwrap();
        assert_relative_eq!(edge.length, 10.0);
        assert_eq!(edge.shared_pair, Some((1, 4)));
        assert_eq!(tissue.vertex_users()[&4], vec![0, 1, 2, 3]);
        assert_relative_eq!(tissue.root_midpoint_x(), 10.0);
    }

    #[test]
    fn test_duplicate_cell_ids_are_rejected() {
        let payload = MeshPayload {
            vertices: vec![(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)],
            cells: vec![square(Some(3)), square(Some(3))],
        };
        let err = Tissue::from_payload(&payload, &[], Vec::new(), 1e-9).unwrap_err();
        assert_eq!(err, MeshError::DuplicateCell(3));
    }

    #[test]
    fn test_coincident_vertices_are_rejected() {
        let payload = MeshPayload {
            vertices: vec![(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0), (0.0, 0.0)],
            cells: vec![square(None)],
        };
        let err = Tissue::from_payload(&payload, &[], Vec::new(), 1e-9).unwrap_err();
        assert_eq!(err, MeshError::DuplicatedPoint { a: 0, b: 4 });
    }

    #[test]
    fn test_self_intersecting_perimeter_is_rejected() {
        let payload = MeshPayload {
            vertices: vec![(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)],
            cells: vec![seed(vec![0, 2, 1, 3], 1.0)],
        };
        let err = Tissue::from_payload(&payload, &[], Vec::new(), 1e-9).unwrap_err();
        assert_eq!(err, MeshError::NonSimplePerimeter { cell: 0 });
    }

    #[test]
    fn test_overlapping_cells_fail_invariant_check() {
        let payload = MeshPayload {
            vertices: vec![
                (0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0),
                (5.0, 5.0), (15.0, 5.0), (15.0, 15.0), (5.0, 15.0),
            ],
            cells: vec![seed(vec![0, 1, 2, 3], 1.0), seed(vec![4, 5, 6, 7], 1.0)],
        };
        let tissue = build(&payload);
        assert_eq!(tissue.check_invariants(), Err(MeshError::OverlappingCells { a: 0, b: 1 }));

        // A cell nested inside another crosses no edge.
        let payload = MeshPayload {
            vertices: vec![
                (0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0),
                (2.0, 2.0), (4.0, 2.0), (4.0, 4.0), (2.0, 4.0),
            ],
            cells: vec![seed(vec![0, 1, 2, 3], 1.0), seed(vec![4, 5, 6, 7], 1.0)],
        };
        assert_eq!(build(&payload).check_no_overlap(), Err(MeshError::OverlappingCells { a: 0, b: 1 }));
    }

    #[test]
    fn test_t_junction_is_not_an_overlap() {
        // Two stacked cells on the right share one tall cell's wall.
        let payload = MeshPayload {
            vertices: vec![
                (0.0, 0.0), (10.0, 0.0), (20.0, 0.0),
                (10.0, 10.0), (20.0, 10.0),
                (0.0, 20.0), (10.0, 20.0), (20.0, 20.0),
            ],
            cells: vec![
                seed(vec![0, 1, 6, 5], 1.0),
                seed(vec![1, 2, 4, 3], 1.0),
                seed(vec![3, 4, 7, 6], 1.0),
            ],
        };
        let tissue = build(&payload);
        tissue.check_invariants().unwrap();
        assert_relative_eq!(tissue.cell(0).unwrap().neighbor(1).unwrap().length, 10.0, epsilon = 1e-9);
    }

    #[test]
    fn test_unlink_then_link_restores_contact() {
        let mut tissue = build(&grid(2, 2, 10.0, 10.0, 1.0));
        assert!(tissue.unlink(0, 1));
        assert!(!tissue.cell(0).unwrap().is_neighbor(1));
        assert!(!tissue.cell(1).unwrap().is_neighbor(0));
        assert!(!tissue.unlink(0, 1));

        assert!(tissue.link(0, 1).unwrap());
        assert!(tissue.cell(1).unwrap().is_neighbor(0));
        // Corner contact only.
        assert!(!tissue.link(0, 3).unwrap());
        assert_eq!(tissue.link(0, 9), Err(MeshError::UnknownCell(9)));
        tissue.check_invariants().unwrap();
    }

    #[test]
    fn test_one_sided_link_fails_invariant_check() {
        let mut tissue = build(&grid(2, 2, 10.0, 10.0, 1.0));
        tissue.cell_mut(0).unwrap().remove_neighbor(1);
        assert_eq!(
            tissue.check_invariants(),
            Err(MeshError::AsymmetricNeighbors { from: 1, to: 0 })
        );
    }

    #[test]
    fn test_refresh_without_movement_changes_nothing() {
        let mut tissue = build(&grid(2, 2, 10.0, 10.0, 1.0));
        let refresh = tissue.refresh_contacts().unwrap();
        assert_eq!(refresh, ContactRefresh { added: 0, removed: 0, refreshed: 4 });
    }

    #[test]
    fn test_separated_cells_are_not_linked() {
        let tissue = build(&MeshPayload {
            vertices: vec![
                (0.0, 0.0),
                (10.0, 0.0),
                (12.0, 0.0),
                (22.0, 0.0),
                (0.0, 10.0),
                (10.0, 10.0),
                (12.0, 10.0),
                (22.0, 10.0),
            ],
            cells: vec![seed(vec![0, 1, 5, 4], 1.0), seed(vec![2, 3, 7, 6], 1.0)],
        });
        assert!(tissue.cell(0).unwrap().neighbors().is_empty());
        assert!(tissue.cell(1).unwrap().neighbors().is_empty());
        assert_relative_eq!(tissue.root_midpoint_x(), 11.0);
    }

    #[test]
    fn test_zone_and_type_follow_midpoint() {
        let tissue = Tissue::from_payload(&grid(3, 1, 10.0, 10.0, 1.0), &[0], Vec::new(), 1e-9).unwrap();
        let zones = ZoneBounds {
            roottip_end: 10.0,
            meristematic_end: 20.0,
            transition_end: 30.0,
            elongation_end: 40.0,
        };
        let types = TypeBounds::default();
        let zone = |id| tissue.dev_zone(tissue.cell(id).unwrap(), &zones).unwrap();
        let kind = |id| tissue.cell_type(tissue.cell(id).unwrap(), &types).unwrap();
        assert_eq!(zone(0), DevZone::RootTip);
        assert_eq!(kind(0), CellType::RootCap);
        assert_eq!(zone(1), DevZone::Meristematic);
        assert_eq!(zone(2), DevZone::Transition);
        assert_eq!(kind(2), CellType::Vasculature);
    }
}

//! Vertex movement under a growth-axis spring model.

use crate::error::MeshError;
use crate::mesh::perimeter::{is_simple_polygon, signed_area};
use crate::mesh::{Cell, CellId, Tissue, VertexId};
use log::{trace, warn};
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use tissue_common::{clamp, SimParams};

/// Smallest share of its current gap that two neighbors on one wall line may
/// keep after a single pass.
const MIN_GAP_FRACTION: f64 = 0.5;

/// What one mover pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MoveReport {
    /// Cells whose rest height grew.
    pub grown: usize,
    /// Vertices whose position changed.
    pub moved: usize,
    /// Vertices whose proposal was cut back to keep the order along their wall line.
    pub constrained: usize,
    /// Times the whole displacement field was halved before it committed.
    pub halvings: u32,
    /// Vertices left in place because every trial broke a perimeter.
    pub rejected: usize,
}

/// Advances vertex positions once per tick.
///
/// Each cell acts as a spring along the growth axis pulling both of its side
/// walls toward a rest height that grows with the cell's developmental zone.
/// Vertices only move along y and the shoot-side row stays fixed, so growth
/// pushes the tip down.
///
/// Neighbors keep their quads across a division, so a vertex may hang on the
/// side wall of a cell that does not list it. Side walls are vertical in
/// column meshes, so every vertex sharing an x sits on one wall line; the
/// pass keeps their order along that line, which keeps hanging vertices on
/// their host wall and the cells tiling the plane.
#[derive(Debug, Clone, Default)]
pub struct Mover {
    shoot_y: Option<f64>,
}

impl Mover {
    /// Fixes the shoot-side row at the current top of the mesh.
    pub fn new(tissue: &Tissue) -> Self {
        Mover { shoot_y: tissue.vertices().y_range().map(|(_, top)| top) }
    }

    pub fn shoot_y(&self) -> Option<f64> {
        self.shoot_y
    }

    /// Vertices on the shoot-side row, looked up against the current arena so
    /// vertices added on that row later are held as well.
    pub fn anchors(&self, tissue: &Tissue) -> BTreeSet<VertexId> {
        let Some(top) = self.shoot_y else {
            return BTreeSet::new();
        };
        let eps = tissue.eps();
        tissue
            .vertices()
            .iter()
            .filter(|v| v.y() >= top - eps)
            .map(|v| v.v_id())
            .collect()
    }

    /// Runs one pass: grow rest heights, accumulate spring forces, order the
    /// proposals along each wall line, then commit them together.
    pub fn step(&self, tissue: &mut Tissue, params: &SimParams) -> Result<MoveReport, MeshError> {
        let mut report = MoveReport::default();
        if !params.mechanics_enabled {
            return Ok(report);
        }

        // --- 1. Grow Rest Heights ---
        report.grown = self.grow_rest_heights(tissue, params)?;

        // --- 2. Accumulate Forces (Parallel) ---
        let forces = self.accumulate_forces(tissue, params)?;

        // --- 3. Propose Displacements ---
        let anchors = self.anchors(tissue);
        let mut proposals: BTreeMap<VertexId, f64> = forces
            .into_iter()
            .filter(|(v, _)| !anchors.contains(v))
            .map(|(v, f)| (v, clamp(params.mobility * f * params.dt, -params.max_step, params.max_step)))
            .collect();

        // --- 4. Keep Wall Order ---
        report.constrained = keep_wall_order(tissue, &mut proposals, &anchors)?;
        let eps = tissue.eps();
        proposals.retain(|_, dy| dy.abs() > eps);

        // --- 5. Commit ---
        match commit_field(tissue, &proposals, params.max_halvings)? {
            Some(halvings) => {
                report.moved = proposals.len();
                report.halvings = halvings;
            }
            None => {
                warn!(
                    "{} vertices kept in place: every trial move broke a perimeter",
                    proposals.len()
                );
                report.rejected = proposals.len();
            }
        }
        trace!("Mover: {:?}", report);
        Ok(report)
    }

    fn grow_rest_heights(&self, tissue: &mut Tissue, params: &SimParams) -> Result<usize, MeshError> {
        let mut updates = Vec::new();
        for cell in tissue.cells().filter(|c| c.is_growing() && !c.is_root_cap()) {
            let zone = tissue.dev_zone(cell, &params.zone_bounds)?;
            let rate = params.growth_rates.rate_for(zone);
            let rest = cell.rest_height();
            let grown = (rest + rate * rest * params.dt).min(params.max_cell_height);
            if grown > rest {
                updates.push((cell.id(), grown));
            }
        }
        let count = updates.len();
        for (id, rest) in updates {
            if let Some(cell) = tissue.cell_mut(id) {
                cell.set_rest_height(rest);
            }
        }
        Ok(count)
    }

    /// Net force on every vertex referenced by a live cell.
    ///
    /// Quads push their top corners up and their bottom corners down, each
    /// wall by its own deficit against the rest height. Other perimeters fall
    /// back to splitting at the mean y.
    fn accumulate_forces(&self, tissue: &Tissue, params: &SimParams) -> Result<BTreeMap<VertexId, f64>, MeshError> {
        let arena = tissue.vertices();
        let cells: Vec<&Cell> = tissue.cells().collect();
        let per_cell: Vec<Vec<(VertexId, f64)>> = cells
            .par_iter()
            .map(|cell| {
                let half_k = 0.5 * params.stiffness;
                let rest = cell.rest_height();
                if let Some(c) = cell.perimeter().corners(arena)? {
                    let left = half_k * (rest - (arena.position(c.top_left)?.y - arena.position(c.bottom_left)?.y));
                    let right = half_k * (rest - (arena.position(c.top_right)?.y - arena.position(c.bottom_right)?.y));
                    return Ok(vec![
                        (c.top_left, left),
                        (c.bottom_left, -left),
                        (c.top_right, right),
                        (c.bottom_right, -right),
                    ]);
                }
                let bounds = cell.perimeter().bounds(arena)?;
                let mid_y = cell.perimeter().midpoint(arena)?.y;
                let pull = half_k * (rest - bounds.height());
                cell.vertex_ids()
                    .iter()
                    .map(|&v| Ok((v, if arena.position(v)?.y > mid_y { pull } else { -pull })))
                    .collect()
            })
            .collect::<Result<_, MeshError>>()?;

        let mut forces: BTreeMap<VertexId, f64> = BTreeMap::new();
        for (v, f) in per_cell.into_iter().flatten() {
            *forces.entry(v).or_insert(0.0) += f;
        }
        Ok(forces)
    }
}

/// Cuts proposals back so vertices sharing an x keep their order along y
/// with at least `MIN_GAP_FRACTION` of each gap. Lines are walked from the
/// top down, so a vertex that would run into the one above is pushed ahead
/// of it instead. Returns how many proposals changed.
fn keep_wall_order(
    tissue: &Tissue,
    proposals: &mut BTreeMap<VertexId, f64>,
    anchors: &BTreeSet<VertexId>,
) -> Result<usize, MeshError> {
    let eps = tissue.eps();
    let users = tissue.vertex_users();
    let mut points: Vec<(VertexId, f64, f64)> = users
        .keys()
        .map(|&v| tissue.vertices().position(v).map(|p| (v, p.x, p.y)))
        .collect::<Result<_, _>>()?;
    points.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.2.total_cmp(&b.2)));

    let mut changed = 0;
    let mut start = 0;
    while start < points.len() {
        let mut end = start + 1;
        while end < points.len() && points[end].1 - points[start].1 <= eps {
            end += 1;
        }
        let mut line = points[start..end].to_vec();
        line.sort_by(|a, b| a.2.total_cmp(&b.2));
        for i in (0..line.len().saturating_sub(1)).rev() {
            let (v, _, y) = line[i];
            let (above, _, y_above) = line[i + 1];
            if anchors.contains(&v) {
                continue;
            }
            let target_above = y_above + proposals.get(&above).copied().unwrap_or(0.0);
            let limit = target_above - MIN_GAP_FRACTION * (y_above - y);
            let dy = proposals.get(&v).copied().unwrap_or(0.0);
            if y + dy > limit {
                proposals.insert(v, limit - y);
                changed += 1;
            }
        }
        start = end;
    }
    Ok(changed)
}

/// Moves every proposed vertex at once, halving the whole field while any
/// touched perimeter would become non-simple or lose its counter-clockwise
/// orientation. A halved field keeps the wall order of the full one.
/// Returns the number of halvings, or `None` when the field was withdrawn.
fn commit_field(
    tissue: &mut Tissue,
    proposals: &BTreeMap<VertexId, f64>,
    max_halvings: u32,
) -> Result<Option<u32>, MeshError> {
    if proposals.is_empty() {
        return Ok(Some(0));
    }
    let users = tissue.vertex_users();
    let touched: BTreeSet<CellId> = proposals
        .keys()
        .filter_map(|v| users.get(v))
        .flatten()
        .copied()
        .collect();
    let origins: Vec<(VertexId, f64, f64)> = proposals
        .iter()
        .map(|(&v, &dy)| tissue.vertices().position(v).map(|p| (v, p.y, dy)))
        .collect::<Result<_, _>>()?;

    let eps = tissue.eps();
    let mut scale = 1.0;
    for attempt in 0..=max_halvings {
        for &(v, y0, dy) in &origins {
            set_y(tissue, v, y0 + scale * dy)?;
        }
        if perimeters_valid(tissue, &touched, eps)? {
            return Ok(Some(attempt));
        }
        scale *= 0.5;
    }
    for &(v, y0, _) in &origins {
        set_y(tissue, v, y0)?;
    }
    Ok(None)
}

fn set_y(tissue: &mut Tissue, v: VertexId, y: f64) -> Result<(), MeshError> {
    let vertex = tissue
        .vertices_mut()
        .get_mut(v)
        .ok_or(MeshError::MissingVertex { cell: None, vertex: v })?;
    vertex.set_y(y);
    Ok(())
}

fn perimeters_valid(tissue: &Tissue, cells: &BTreeSet<CellId>, eps: f64) -> Result<bool, MeshError> {
    for &id in cells {
        let cell = tissue.cell(id).ok_or(MeshError::UnknownCell(id))?;
        let points = cell.perimeter().points(tissue.vertices())?;
        if signed_area(&points) <= eps || !is_simple_polygon(&points, eps) {
            return Ok(false);
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{params, seed};
    use crate::mesh::MeshPayload;
    use approx::assert_relative_eq;
    use tissue_common::vecmath::point_on_segment;

    /// One column of two stacked 10x10 cells.
    fn column() -> Tissue {
        let payload = MeshPayload {
            vertices: vec![(0.0, 0.0), (10.0, 0.0), (0.0, 10.0), (10.0, 10.0), (0.0, 20.0), (10.0, 20.0)],
            cells: vec![seed(vec![0, 1, 3, 2], 1.0), seed(vec![2, 3, 5, 4], 1.0)],
        };
        Tissue::from_payload(&payload, &[], Vec::new(), 1e-9).unwrap()
    }

    /// A tall cell on the left; two stacked cells on the right whose shared
    /// corner (vertex 3) hangs on the tall cell's right wall.
    fn hanging() -> Tissue {
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
        Tissue::from_payload(&payload, &[], Vec::new(), 1e-9).unwrap()
    }

    fn total_area(tissue: &Tissue) -> f64 {
        tissue.cells().map(|c| c.area(tissue.vertices()).unwrap()).sum()
    }

    #[test]
    fn test_top_row_is_anchored() {
        let mut tissue = column();
        let mover = Mover::new(&tissue);
        assert_eq!(mover.shoot_y(), Some(20.0));
        assert_eq!(mover.anchors(&tissue).into_iter().collect::<Vec<_>>(), vec![4, 5]);

        // Anchors are looked up per pass, so a vertex added on the row later is held too.
        let late = tissue.vertices_mut().insert(5.0, 20.0);
        assert_eq!(mover.anchors(&tissue).into_iter().collect::<Vec<_>>(), vec![4, 5, late]);
    }

    #[test]
    fn test_disabled_mover_is_noop() {
        let mut tissue = column();
        let mut params = params();
        params.mechanics_enabled = false;
        let report = Mover::new(&tissue).step(&mut tissue, &params).unwrap();
        assert_eq!(report, MoveReport::default());
        assert_eq!(tissue.vertices().position(0).unwrap().y, 0.0);
    }

    #[test]
    fn test_growth_pushes_tip_down() {
        let mut tissue = column();
        let mut params = params();
        params.growth_rates.roottip = 0.1;
        let mover = Mover::new(&tissue);
        for _ in 0..5 {
            mover.step(&mut tissue, &params).unwrap();
        }
        assert!(tissue.vertices().position(0).unwrap().y < 0.0);
        assert_eq!(tissue.vertices().position(4).unwrap().y, 20.0);
        assert!(tissue.cell(0).unwrap().rest_height() > 10.0);
        // Both walls of the column move together.
        assert_relative_eq!(
            tissue.vertices().position(0).unwrap().y,
            tissue.vertices().position(1).unwrap().y,
            epsilon = 1e-12
        );
        tissue.check_invariants().unwrap();
    }

    #[test]
    fn test_displacement_is_clamped() {
        let mut tissue = column();
        let mut params = params();
        params.stiffness = 1000.0;
        params.max_step = 0.25;
        if let Some(cell) = tissue.cell_mut(0) {
            cell.set_rest_height(50.0);
        }
        Mover::new(&tissue).step(&mut tissue, &params).unwrap();
        assert_relative_eq!(tissue.vertices().position(0).unwrap().y, -0.25);
        assert_relative_eq!(tissue.vertices().position(2).unwrap().y, 10.25);
    }

    #[test]
    fn test_force_follows_corner_role_on_sheared_cell() {
        // The right wall's bottom corner sits above the cell's mid-height and
        // must still be pushed down.
        let payload = MeshPayload {
            vertices: vec![(0.0, 0.0), (10.0, 12.0), (10.0, 22.0), (0.0, 10.0)],
            cells: vec![seed(vec![0, 1, 2, 3], 1.0)],
        };
        let mut tissue = Tissue::from_payload(&payload, &[], Vec::new(), 1e-9).unwrap();
        let mut params = params();
        params.mobility = 1.0;
        if let Some(cell) = tissue.cell_mut(0) {
            cell.set_rest_height(12.0);
        }
        Mover::new(&tissue).step(&mut tissue, &params).unwrap();
        assert_relative_eq!(tissue.vertices().position(1).unwrap().y, 11.0);
        assert_relative_eq!(tissue.vertices().position(0).unwrap().y, -1.0);
        assert_relative_eq!(tissue.vertices().position(3).unwrap().y, 11.0);
    }

    #[test]
    fn test_hanging_vertex_stays_on_host_wall() {
        let mut tissue = hanging();
        let mut params = params();
        params.mobility = 1.0;
        params.max_step = 100.0;
        // The lower right cell wants to triple, which would lift vertex 3
        // past the tall cell's top corner.
        if let Some(cell) = tissue.cell_mut(1) {
            cell.set_rest_height(40.0);
        }
        let report = Mover::new(&tissue).step(&mut tissue, &params).unwrap();
        assert!(report.constrained >= 2);
        assert_eq!(report.halvings, 0);

        let arena = tissue.vertices();
        let hang = arena.position(3).unwrap();
        assert_relative_eq!(hang.y, 15.0);
        assert!(point_on_segment(hang, arena.position(1).unwrap(), arena.position(6).unwrap(), 1e-9));
        assert_relative_eq!(arena.position(1).unwrap().y, -15.0);
        tissue.check_invariants().unwrap();
        // The two strips stay filled: left trapezoid plus right column.
        assert_relative_eq!(total_area(&tissue), 275.0 + 350.0, epsilon = 1e-9);
    }

    #[test]
    fn test_compression_keeps_wall_order() {
        let mut tissue = column();
        let mut params = params();
        params.max_step = 100.0;
        params.mobility = 1.0;
        // Collapsing the lower cell would push vertices 2,3 below 0,1.
        if let Some(cell) = tissue.cell_mut(0) {
            cell.set_rest_height(-50.0);
        }
        let report = Mover::new(&tissue).step(&mut tissue, &params).unwrap();
        assert!(report.constrained > 0);
        tissue.check_invariants().unwrap();
        let arena = tissue.vertices();
        assert!(arena.position(0).unwrap().y < arena.position(2).unwrap().y);
        assert!(arena.position(2).unwrap().y < arena.position(4).unwrap().y);
        for cell in tissue.cells() {
            assert!(cell.area(arena).unwrap() > 0.0);
        }
    }

    #[test]
    fn test_inverting_field_is_halved_or_withdrawn() {
        // No two vertices share an x, so only the perimeter check applies.
        let payload = MeshPayload {
            vertices: vec![(0.0, 0.0), (10.0, 1.0), (11.0, 10.0), (1.0, 9.0)],
            cells: vec![seed(vec![0, 1, 2, 3], 1.0)],
        };
        let mut params = params();
        params.max_step = 100.0;
        params.mobility = 1.0;

        let mut tissue = Tissue::from_payload(&payload, &[], Vec::new(), 1e-9).unwrap();
        if let Some(cell) = tissue.cell_mut(0) {
            cell.set_rest_height(-100.0);
        }
        let report = Mover::new(&tissue).step(&mut tissue, &params).unwrap();
        assert!(report.halvings > 0);
        assert_eq!(report.rejected, 0);
        tissue.check_invariants().unwrap();
        assert!(tissue.cell(0).unwrap().area(tissue.vertices()).unwrap() > 0.0);

        params.max_halvings = 0;
        let mut tissue = Tissue::from_payload(&payload, &[], Vec::new(), 1e-9).unwrap();
        if let Some(cell) = tissue.cell_mut(0) {
            cell.set_rest_height(-100.0);
        }
        let report = Mover::new(&tissue).step(&mut tissue, &params).unwrap();
        assert_eq!(report.rejected, 3);
        assert_eq!(report.moved, 0);
        assert_eq!(tissue.vertices().position(3).unwrap().y, 9.0);
    }
}

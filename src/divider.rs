//! Cell division: picks qualifying cells, splits their perimeters in two and
//! rewires the neighbor graph around the children.

use crate::error::MeshError;
use crate::mesh::neighbor_helpers::{check_if_neighbors_with_new_root_cap_cell, fix_lrc_neighbors_after_growth};
use crate::mesh::perimeter::{is_simple_polygon, signed_area};
use crate::mesh::{Cell, CellId, QuadPerimeter, Tissue, VertexId};
use log::debug;
use rayon::prelude::*;
use std::collections::BTreeSet;
use tissue_common::vecmath::{point_on_segment, segment_line_intersection};
use tissue_common::{DivisionCriterion, SimParams, Vec2};

/// Fraction of an edge's length within which a split point snaps onto a
/// vertex a neighbor already hangs on that edge.
const SNAP_FRACTION: f64 = 0.1;

/// Where the division line crosses one edge of the parent perimeter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitPoint {
    /// Index of the crossed edge: vertex `edge` to vertex `edge + 1`.
    pub edge: usize,
    pub point: Vec2,
    /// A neighbor's vertex reused in place of a new one.
    pub existing: Option<VertexId>,
}

/// A validated split of one cell, ready to be applied.
#[derive(Debug, Clone, PartialEq)]
pub struct DivisionPlan {
    pub parent: CellId,
    /// Ordered by edge index.
    pub cuts: [SplitPoint; 2],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DivisionOutcome {
    /// `children[0]` is the upper (apical) child.
    Divided { parent: CellId, children: [CellId; 2] },
    /// No valid split this tick; the cell is tried again next tick.
    Degenerate,
}

/// What one division pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DivisionReport {
    pub divided: Vec<(CellId, [CellId; 2])>,
    pub degenerate: Vec<CellId>,
}

#[derive(Debug, Clone, Default)]
pub struct Divider;

impl Divider {
    pub fn new() -> Self {
        Divider
    }

    /// Whether `cell` meets the division criterion right now.
    pub fn should_divide(&self, cell: &Cell, tissue: &Tissue, params: &SimParams) -> Result<bool, MeshError> {
        if cell.is_root_cap() && !params.divide_root_cap {
            return Ok(false);
        }
        if let Some(zones) = &params.division_zones {
            if !zones.contains(&tissue.dev_zone(cell, &params.zone_bounds)?) {
                return Ok(false);
            }
        }
        let arena = tissue.vertices();
        Ok(match params.division_criterion {
            DivisionCriterion::AreaRatio(ratio) => cell.area(arena)? >= ratio * cell.initial_area(),
            DivisionCriterion::Quantity(threshold) => cell.quantity(arena)? >= threshold,
        })
    }

    /// Ids of every cell ready to divide, ascending.
    pub fn candidates(&self, tissue: &Tissue, params: &SimParams) -> Result<Vec<CellId>, MeshError> {
        let cells: Vec<&Cell> = tissue.cells().collect();
        let flags: Vec<bool> = cells
            .par_iter()
            .map(|cell| self.should_divide(cell, tissue, params))
            .collect::<Result<_, MeshError>>()?;
        Ok(cells
            .iter()
            .zip(flags)
            .filter(|(_, ready)| *ready)
            .map(|(cell, _)| cell.id())
            .collect())
    }

    /// Divides every candidate once. Candidates are fixed before the first
    /// division, so children are not considered until the next tick.
    pub fn step(&self, tissue: &mut Tissue, params: &SimParams) -> Result<DivisionReport, MeshError> {
        let mut report = DivisionReport::default();
        for id in self.candidates(tissue, params)? {
            match self.divide(tissue, id, params.tick)? {
                DivisionOutcome::Divided { parent, children } => report.divided.push((parent, children)),
                DivisionOutcome::Degenerate => report.degenerate.push(id),
            }
        }
        Ok(report)
    }

    /// Finds the division line of cell `id` and checks both children would be
    /// valid polygons. `None` means the geometry admits no split.
    pub fn plan_split(&self, tissue: &Tissue, id: CellId) -> Result<Option<DivisionPlan>, MeshError> {
        let cell = tissue.cell(id).ok_or(MeshError::UnknownCell(id))?;
        let arena = tissue.vertices();
        let eps = tissue.eps();
        let points = cell.perimeter().points(arena)?;

        let cuts = match membrane_cuts(cell.perimeter(), &points, tissue)? {
            Some(cuts) => cuts,
            None => match diagonal_cuts(&points, eps) {
                Some(cuts) => cuts,
                None => return Ok(None),
            },
        };
        let [(i, pi), (j, pj)] = cuts;
        if pi.distance(pj) <= eps {
            return Ok(None);
        }

        let mut cuts = [
            SplitPoint { edge: i, point: pi, existing: snap_target(tissue, cell, i, pi)? },
            SplitPoint { edge: j, point: pj, existing: snap_target(tissue, cell, j, pj)? },
        ];
        for cut in &mut cuts {
            if let Some(v) = cut.existing {
                cut.point = arena.position(v)?;
            }
        }

        let (upper, lower) = split_ring(&points, cuts[0].point, cuts[0].edge, cuts[1].point, cuts[1].edge);
        for child in [&upper, &lower] {
            if signed_area(child) <= eps || !is_simple_polygon(child, eps) {
                return Ok(None);
            }
        }
        Ok(Some(DivisionPlan { parent: id, cuts }))
    }

    /// Splits cell `id` in two, retiring it into the lineage table.
    pub fn divide(&self, tissue: &mut Tissue, id: CellId, tick: u32) -> Result<DivisionOutcome, MeshError> {
        let Some(plan) = self.plan_split(tissue, id)? else {
            debug!("Cell {} has no valid division line, retrying next tick", id);
            return Ok(DivisionOutcome::Degenerate);
        };

        // --- 1. Materialize Split Vertices ---
        let split_ids = plan.cuts.map(|cut| match cut.existing {
            Some(v) => v,
            None => tissue.vertices_mut().insert(cut.point.x, cut.point.y),
        });

        // --- 2. Build Children ---
        let parent = tissue.cell(id).ok_or(MeshError::UnknownCell(id))?;
        let (ring_a, ring_b) = split_ring(
            parent.vertex_ids(),
            split_ids[0],
            plan.cuts[0].edge,
            split_ids[1],
            plan.cuts[1].edge,
        );
        let arena = tissue.vertices();
        let mid_a = midpoint_y(&ring_a, tissue)?;
        let mid_b = midpoint_y(&ring_b, tissue)?;
        let (upper_ring, lower_ring) = if mid_a >= mid_b { (ring_a, ring_b) } else { (ring_b, ring_a) };

        let parent_height = parent.perimeter().height(arena)?;
        let parent_vertices = parent.vertex_ids().to_vec();
        let former_neighbors: Vec<CellId> = parent.neighbors().keys().copied().collect();
        let (concentration, root_cap, growing, source, rest, generation) = (
            parent.concentration(),
            parent.is_root_cap(),
            parent.is_growing(),
            parent.source(),
            parent.rest_height(),
            parent.division_count() + 1,
        );

        let children_ids = [tissue.allocate_cell_id(), tissue.allocate_cell_id()];
        let mut children = Vec::with_capacity(2);
        for (child_id, ring) in children_ids.into_iter().zip([upper_ring, lower_ring]) {
            let arena = tissue.vertices();
            let perimeter = QuadPerimeter::new(ring, arena, Some(child_id))?;
            let height = perimeter.height(arena)?;
            let child_rest = if parent_height > tissue.eps() { rest * height / parent_height } else { 0.5 * rest };
            let child = Cell::new(child_id, perimeter, concentration, arena)?
                .with_root_cap(root_cap)
                .with_growing(growing)
                .with_source(source)
                .with_lineage(id, generation)
                .with_rest_height(child_rest);
            children.push(child);
        }

        // --- 3. Swap Parent For Children ---
        tissue.retire_cell(id, children_ids, tick)?;
        for child in children {
            tissue.insert_cell(child)?;
        }

        // --- 4. Rewire Neighbors ---
        let [upper, lower] = children_ids;
        if !tissue.link(upper, lower)? {
            debug!("Children {} and {} of cell {} did not link", upper, lower, id);
        }
        for &n in &former_neighbors {
            for child in children_ids {
                tissue.link(child, n)?;
            }
        }

        let touches_root_cap = root_cap
            || former_neighbors
                .iter()
                .any(|&n| tissue.cell(n).is_some_and(|c| c.is_root_cap()));
        if touches_root_cap {
            let root_caps: BTreeSet<CellId> = children_ids
                .iter()
                .chain(former_neighbors.iter())
                .copied()
                .filter(|&c| tissue.cell(c).is_some_and(|c| c.is_root_cap()))
                .collect();
            for lrc in root_caps {
                fix_lrc_neighbors_after_growth(tissue, lrc)?;
            }
        }
        for child in children_ids {
            check_if_neighbors_with_new_root_cap_cell(tissue, child)?;
        }

        // --- 5. Drop Orphans ---
        let removed = tissue.remove_orphan_vertices(&parent_vertices);
        debug!(
            "Cell {} divided into {} (upper) and {} (lower) at tick {}, split vertices {:?}, {} orphans dropped",
            id,
            upper,
            lower,
            tick,
            split_ids,
            removed.len()
        );
        Ok(DivisionOutcome::Divided { parent: id, children: children_ids })
    }
}

/// Cuts through the midpoints of the left and right membranes, for perimeters
/// with corner roles whose side membranes are single edges.
fn membrane_cuts(perimeter: &QuadPerimeter, points: &[Vec2], tissue: &Tissue) -> Result<Option<[(usize, Vec2); 2]>, MeshError> {
    let Some(c) = perimeter.corners(tissue.vertices())? else {
        return Ok(None);
    };
    let (Some(left), Some(right)) = (
        edge_index(perimeter, c.top_left, c.bottom_left),
        edge_index(perimeter, c.top_right, c.bottom_right),
    ) else {
        return Ok(None);
    };
    let n = points.len();
    let at = |i: usize| (i, points[i].midpoint(points[(i + 1) % n]));
    let (first, second) = if left < right { (left, right) } else { (right, left) };
    Ok(Some([at(first), at(second)]))
}

/// Perpendicular bisector of the longest diagonal, crossing exactly two edges
/// away from any vertex.
fn diagonal_cuts(points: &[Vec2], eps: f64) -> Option<[(usize, Vec2); 2]> {
    let n = points.len();
    let mut best: Option<(usize, usize, f64)> = None;
    for i in 0..n {
        for j in (i + 2)..n {
            if i == 0 && j == n - 1 {
                continue;
            }
            let d = points[i].distance(points[j]);
            if best.map_or(true, |(_, _, bd)| d > bd) {
                best = Some((i, j, d));
            }
        }
    }
    let (i, j, _) = best?;
    let mid = points[i].midpoint(points[j]);
    let dir = (points[j] - points[i]).perp();

    let hits: Vec<(usize, Vec2)> = (0..n)
        .filter_map(|k| segment_line_intersection(points[k], points[(k + 1) % n], mid, dir, eps).map(|p| (k, p)))
        .collect();
    if hits.len() != 2 {
        return None;
    }
    for &(k, p) in &hits {
        if p.distance(points[k]) <= eps || p.distance(points[(k + 1) % n]) <= eps {
            return None;
        }
    }
    Some([hits[0], hits[1]])
}

fn edge_index(perimeter: &QuadPerimeter, a: VertexId, b: VertexId) -> Option<usize> {
    let ids = perimeter.vertex_ids();
    let n = ids.len();
    (0..n).find(|&i| {
        let (p, q) = (ids[i], ids[(i + 1) % n]);
        (p == a && q == b) || (p == b && q == a)
    })
}

/// A vertex a neighbor already holds on edge `edge` of `cell`, close enough to
/// `point` to stand in for a new split vertex. The closest wins.
fn snap_target(tissue: &Tissue, cell: &Cell, edge: usize, point: Vec2) -> Result<Option<VertexId>, MeshError> {
    let arena = tissue.vertices();
    let eps = tissue.eps();
    let ids = cell.vertex_ids();
    let (a, b) = (arena.position(ids[edge])?, arena.position(ids[(edge + 1) % ids.len()])?);
    let reach = SNAP_FRACTION * a.distance(b);

    let mut best: Option<(VertexId, f64)> = None;
    for &n in cell.neighbors().keys() {
        let neighbor = tissue.cell(n).ok_or(MeshError::UnknownCell(n))?;
        for &v in neighbor.vertex_ids() {
            if cell.perimeter().contains(v) {
                continue;
            }
            let p = arena.position(v)?;
            if !point_on_segment(p, a, b, eps) {
                continue;
            }
            let d = p.distance(point);
            if d <= reach && best.map_or(true, |(_, bd)| d < bd) {
                best = Some((v, d));
            }
        }
    }
    Ok(best.map(|(v, _)| v))
}

/// Splits a closed ring at points inserted on edges `i < j`. The first ring
/// runs from the cut on `i` forward to the cut on `j`; the second closes the
/// loop. Both keep the parent's orientation.
fn split_ring<T: Copy>(ring: &[T], at_i: T, i: usize, at_j: T, j: usize) -> (Vec<T>, Vec<T>) {
    let mut first = Vec::with_capacity(j - i + 2);
    first.push(at_i);
    first.extend_from_slice(&ring[i + 1..=j]);
    first.push(at_j);

    let mut second = Vec::with_capacity(ring.len() - (j - i) + 2);
    second.push(at_j);
    second.extend_from_slice(&ring[j + 1..]);
    second.extend_from_slice(&ring[..=i]);
    second.push(at_i);
    (first, second)
}

fn midpoint_y(ring: &[VertexId], tissue: &Tissue) -> Result<f64, MeshError> {
    let mut sum = 0.0;
    for &v in ring {
        sum += tissue.vertices().position(v)?.y;
    }
    Ok(sum / ring.len() as f64)
}

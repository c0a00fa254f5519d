//! Cell-level adjacency rules layered on perimeter geometry.
//!
//! The read-only rules take cells plus a [`NeighborContext`]; the few rules
//! that add or drop links take the [`Tissue`] and write both sides of every
//! link they touch. Absence of a relationship is `None` or `false`, never an
//! error.

use crate::error::MeshError;
use crate::mesh::cell::{Cell, SharedEdge};
use crate::mesh::perimeter_helpers::{collinear_contact_len, get_overlap, longest_contact_edge, perimeters_touch};
use crate::mesh::tissue::Tissue;
use crate::mesh::vertex::VertexArena;
use crate::mesh::{CellId, VertexId};
use log::trace;
use rayon::prelude::*;
use tissue_common::{axis_overlap, ContactOverride, Direction};

/// Outcome of classifying where a neighbor sits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectionCode {
    Toward(Direction),
    /// A former root-cap contact that growth has pulled apart.
    NoLongerRootCapNeighbor,
}

/// Everything the adjacency rules need besides the two cells.
#[derive(Debug, Clone, Copy)]
pub struct NeighborContext<'a> {
    pub arena: &'a VertexArena,
    pub root_midpoint_x: f64,
    pub overrides: &'a [ContactOverride],
    pub eps: f64,
}

impl NeighborContext<'_> {
    fn override_for(&self, cell: CellId, neighbor: CellId) -> Option<Direction> {
        self.overrides
            .iter()
            .find(|o| o.cell == cell && o.neighbor == neighbor)
            .map(|o| o.direction)
    }
}

/// Whether `cell` and the lateral root cap cell `lrc` border each other.
///
/// The perimeters must touch, both cells must lie on the same side of the
/// root midline, the cell's lateral membrane must sit on the root cap's
/// medial membrane, and their y ranges must overlap.
pub fn cell_and_lrc_cell_are_neighbors(cell: &Cell, lrc: &Cell, ctx: &NeighborContext) -> Result<bool, MeshError> {
    let arena = ctx.arena;
    if !perimeters_touch(cell.perimeter(), lrc.perimeter(), arena, ctx.eps)? {
        return Ok(false);
    }
    let cell_sides = cell.perimeter().determine_left_right(arena, ctx.root_midpoint_x)?;
    let lrc_sides = lrc.perimeter().determine_left_right(arena, ctx.root_midpoint_x)?;
    if cell_sides != lrc_sides {
        return Ok(false);
    }
    let cb = cell.perimeter().bounds(arena)?;
    let lb = lrc.perimeter().bounds(arena)?;
    let facing = if cell_sides.0 == Direction::Lateral {
        (cb.min_x - lb.max_x).abs() <= ctx.eps
    } else {
        (cb.max_x - lb.min_x).abs() <= ctx.eps
    };
    if !facing {
        return Ok(false);
    }
    Ok(axis_overlap(cb.min_y, cb.max_y, lb.min_y, lb.max_y) > ctx.eps)
}

/// Direction of `neighbor` from `cell` when the two share exactly one vertex.
pub fn get_neighbor_dir_neighbor_shares_one_v_default_geo(
    cell: &Cell,
    neighbor: &Cell,
    ctx: &NeighborContext,
) -> Result<Option<DirectionCode>, MeshError> {
    if let Some(direction) = ctx.override_for(cell.id(), neighbor.id()) {
        return Ok(Some(DirectionCode::Toward(direction)));
    }
    if neighbor.is_root_cap() {
        return Ok(Some(DirectionCode::Toward(Direction::Lateral)));
    }
    if cell.is_root_cap() {
        return Ok(Some(DirectionCode::Toward(Direction::Medial)));
    }
    if let Some(direction) = corner_correspondence(cell, neighbor, ctx)? {
        return Ok(Some(DirectionCode::Toward(direction)));
    }
    contact_membrane(cell, neighbor, ctx)
}

/// Direction of `neighbor` from `cell` when the two share no vertex.
pub fn get_neighbor_dir_neighbor_shares_no_vs_default_geo(
    cell: &Cell,
    neighbor: &Cell,
    ctx: &NeighborContext,
) -> Result<Option<DirectionCode>, MeshError> {
    if let Some(direction) = ctx.override_for(cell.id(), neighbor.id()) {
        return Ok(Some(DirectionCode::Toward(direction)));
    }
    let arena = ctx.arena;
    if neighbor.is_root_cap() {
        let mid_y = cell.perimeter().midpoint(arena)?.y;
        let nb = neighbor.perimeter().bounds(arena)?;
        return Ok(Some(if nb.min_y < mid_y && mid_y < nb.max_y {
            DirectionCode::Toward(Direction::Lateral)
        } else {
            DirectionCode::NoLongerRootCapNeighbor
        }));
    }
    if cell.is_root_cap() {
        let mid_y = neighbor.perimeter().midpoint(arena)?.y;
        let cb = cell.perimeter().bounds(arena)?;
        return Ok(Some(if cb.min_y < mid_y && mid_y < cb.max_y {
            DirectionCode::Toward(Direction::Medial)
        } else {
            DirectionCode::NoLongerRootCapNeighbor
        }));
    }
    contact_membrane(cell, neighbor, ctx)
}

/// Direction of `neighbor` from `cell` when they share the edge `pair`.
pub fn get_neighbor_dir_neighbor_shares_two_vs(
    cell: &Cell,
    pair: (VertexId, VertexId),
    ctx: &NeighborContext,
) -> Result<Option<DirectionCode>, MeshError> {
    let direction = cell.perimeter().membrane_of_edge(pair.0, pair.1, ctx.arena, ctx.root_midpoint_x)?;
    Ok(Some(DirectionCode::Toward(direction)))
}

/// Classifies `neighbor` by how many vertices the two perimeters share.
pub fn find_neighbor_direction(
    cell: &Cell,
    neighbor: &Cell,
    ctx: &NeighborContext,
) -> Result<Option<DirectionCode>, MeshError> {
    let overlap = get_overlap(cell.perimeter(), neighbor.perimeter());
    if let Some(&pair) = overlap.edges.first() {
        get_neighbor_dir_neighbor_shares_two_vs(cell, pair, ctx)
    } else if !overlap.shared.is_empty() {
        get_neighbor_dir_neighbor_shares_one_v_default_geo(cell, neighbor, ctx)
    } else {
        get_neighbor_dir_neighbor_shares_no_vs_default_geo(cell, neighbor, ctx)
    }
}

/// Boundary length two cells have in common.
///
/// A root-cap pair with no geometric contact falls back to the lateral
/// membrane of the cell that is not a root cap.
pub fn contact_length(cell: &Cell, neighbor: &Cell, ctx: &NeighborContext) -> Result<f64, MeshError> {
    let len = collinear_contact_len(cell.perimeter(), neighbor.perimeter(), ctx.arena, ctx.eps)?;
    if len > ctx.eps {
        return Ok(len);
    }
    match (cell.is_root_cap(), neighbor.is_root_cap()) {
        (false, true) => cell.perimeter().memlen(Direction::Lateral, ctx.arena, ctx.root_midpoint_x),
        (true, false) => neighbor.perimeter().memlen(Direction::Lateral, ctx.arena, ctx.root_midpoint_x),
        _ => Ok(0.0),
    }
}

/// The link `cell` should hold to `neighbor`, or `None` if they do not border.
pub fn shared_edge_between(cell: &Cell, neighbor: &Cell, ctx: &NeighborContext) -> Result<Option<SharedEdge>, MeshError> {
    if cell.id() == neighbor.id() {
        return Ok(None);
    }
    let shared_pair = get_overlap(cell.perimeter(), neighbor.perimeter()).shared_pair();
    let direction = match (cell.is_root_cap(), neighbor.is_root_cap()) {
        (false, true) => {
            if !cell_and_lrc_cell_are_neighbors(cell, neighbor, ctx)? {
                return Ok(None);
            }
            Direction::Lateral
        }
        (true, false) => {
            if !cell_and_lrc_cell_are_neighbors(neighbor, cell, ctx)? {
                return Ok(None);
            }
            Direction::Medial
        }
        _ => {
            let len = collinear_contact_len(cell.perimeter(), neighbor.perimeter(), ctx.arena, ctx.eps)?;
            if len <= ctx.eps {
                return Ok(None);
            }
            match find_neighbor_direction(cell, neighbor, ctx)? {
                Some(DirectionCode::Toward(d)) => d,
                _ => return Ok(None),
            }
        }
    };
    let length = contact_length(cell, neighbor, ctx)?;
    Ok(Some(SharedEdge { direction, length, shared_pair }))
}

/// Links `cell` with every root-cap cell it now borders but is not yet linked to.
/// Returns the root caps that were added.
pub fn check_if_neighbors_with_new_root_cap_cell(tissue: &mut Tissue, cell_id: CellId) -> Result<Vec<CellId>, MeshError> {
    let found = {
        let cell = tissue.cell(cell_id).ok_or(MeshError::UnknownCell(cell_id))?;
        if cell.is_root_cap() {
            return Ok(Vec::new());
        }
        let ctx = tissue.context();
        let mut found = Vec::new();
        for lrc in tissue.cells().filter(|c| c.is_root_cap() && !cell.is_neighbor(c.id())) {
            if let (Some(ab), Some(ba)) = (
                shared_edge_between(cell, lrc, &ctx)?,
                shared_edge_between(lrc, cell, &ctx)?,
            ) {
                found.push((lrc.id(), ab, ba));
            }
        }
        found
    };
    let mut added = Vec::with_capacity(found.len());
    for (lrc_id, ab, ba) in found {
        tissue.insert_link(cell_id, lrc_id, ab, ba)?;
        added.push(lrc_id);
    }
    if !added.is_empty() {
        trace!("Cell {} gained root-cap neighbors {:?}", cell_id, added);
    }
    Ok(added)
}

/// Unlinks `cell` from the root cap `lrc` if the root-cap rule no longer holds.
/// Returns whether the link was dropped.
pub fn check_if_no_longer_neighbors_with_root_cap_cell(
    tissue: &mut Tissue,
    cell_id: CellId,
    lrc_id: CellId,
) -> Result<bool, MeshError> {
    let still_neighbors = {
        let cell = tissue.cell(cell_id).ok_or(MeshError::UnknownCell(cell_id))?;
        let lrc = tissue.cell(lrc_id).ok_or(MeshError::UnknownCell(lrc_id))?;
        if !cell.is_neighbor(lrc_id) {
            return Ok(false);
        }
        cell_and_lrc_cell_are_neighbors(cell, lrc, &tissue.context())?
    };
    if still_neighbors {
        return Ok(false);
    }
    tissue.unlink(cell_id, lrc_id);
    trace!("Cell {} is no longer a neighbor of root cap {}", cell_id, lrc_id);
    Ok(true)
}

/// Link changes made while re-deriving a root cap's neighbors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LrcFix {
    pub added: usize,
    pub removed: usize,
    pub refreshed: usize,
}

/// Re-derives the neighbor map of root-cap cell `lrc_id` against every live
/// cell that is not a root cap.
pub fn fix_lrc_neighbors_after_growth(tissue: &mut Tissue, lrc_id: CellId) -> Result<LrcFix, MeshError> {
    let decisions: Vec<(CellId, bool, Option<(SharedEdge, SharedEdge)>)> = {
        let lrc = tissue.cell(lrc_id).ok_or(MeshError::UnknownCell(lrc_id))?;
        if !lrc.is_root_cap() {
            return Ok(LrcFix::default());
        }
        let ctx = tissue.context();
        let others: Vec<&Cell> = tissue.cells().filter(|c| !c.is_root_cap()).collect();
        others
            .par_iter()
            .map(|cell| {
                let linked = cell.is_neighbor(lrc_id);
                let pair = match (shared_edge_between(cell, lrc, &ctx)?, shared_edge_between(lrc, cell, &ctx)?) {
                    (Some(ab), Some(ba)) => Some((ab, ba)),
                    _ => None,
                };
                Ok((cell.id(), linked, pair))
            })
            .collect::<Result<_, MeshError>>()?
    };

    let mut fix = LrcFix::default();
    for (cell_id, linked, pair) in decisions {
        match (linked, pair) {
            (true, None) => {
                tissue.unlink(cell_id, lrc_id);
                fix.removed += 1;
            }
            (false, Some((ab, ba))) => {
                tissue.insert_link(cell_id, lrc_id, ab, ba)?;
                fix.added += 1;
            }
            (true, Some((ab, ba))) => {
                tissue.insert_link(cell_id, lrc_id, ab, ba)?;
                fix.refreshed += 1;
            }
            (false, None) => {}
        }
    }
    Ok(fix)
}

/// Maps the two cells' corner roles onto each other around one shared vertex.
fn corner_correspondence(cell: &Cell, neighbor: &Cell, ctx: &NeighborContext) -> Result<Option<Direction>, MeshError> {
    let arena = ctx.arena;
    let (Some(c), Some(n)) = (cell.perimeter().corners(arena)?, neighbor.perimeter().corners(arena)?) else {
        return Ok(None);
    };
    let (left, right) = cell.perimeter().determine_left_right(arena, ctx.root_midpoint_x)?;
    Ok(if c.top_left == n.top_right || c.bottom_left == n.bottom_right {
        Some(left)
    } else if c.top_right == n.top_left || c.bottom_right == n.bottom_left {
        Some(right)
    } else if c.top_left == n.bottom_left || c.top_right == n.bottom_right {
        Some(Direction::Apical)
    } else if c.bottom_left == n.top_left || c.bottom_right == n.top_right {
        Some(Direction::Basal)
    } else {
        None
    })
}

/// The membrane of `cell` that carries its contact with `neighbor`.
fn contact_membrane(cell: &Cell, neighbor: &Cell, ctx: &NeighborContext) -> Result<Option<DirectionCode>, MeshError> {
    match longest_contact_edge(cell.perimeter(), neighbor.perimeter(), ctx.arena, ctx.eps)? {
        Some((a, b)) => {
            let direction = cell.perimeter().membrane_of_edge(a, b, ctx.arena, ctx.root_midpoint_x)?;
            Ok(Some(DirectionCode::Toward(direction)))
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{CellSeed, MeshPayload, SourceTerm};
    use approx::assert_relative_eq;

    const LEFT_CAP: CellId = 4;
    const RIGHT_CAP: CellId = 5;

    fn quad(vertices: Vec<VertexId>) -> CellSeed {
        CellSeed {
            id: None,
            vertices,
            concentration: 1.0,
            growing: true,
            root_cap: false,
            source: SourceTerm::default(),
        }
    }

    /// Two columns of two 5x10 cells between a tall root-cap cell on each side.
    /// The root midline is x = 10. Vertex 5 hangs on the left cap's membrane.
    fn capped_column() -> Tissue {
        let payload = MeshPayload {
            vertices: vec![
                (0.0, 0.0), (5.0, 0.0), (10.0, 0.0), (15.0, 0.0), (20.0, 0.0),
                (5.0, 10.0), (10.0, 10.0), (15.0, 10.0),
                (0.0, 25.0), (5.0, 20.0), (10.0, 20.0), (15.0, 20.0), (20.0, 20.0),
                (5.0, 25.0),
            ],
            cells: vec![
                quad(vec![1, 2, 6, 5]),
                quad(vec![2, 3, 7, 6]),
                quad(vec![5, 6, 10, 9]),
                quad(vec![6, 7, 11, 10]),
                quad(vec![0, 1, 13, 8]),
                quad(vec![3, 4, 12, 11]),
            ],
        };
        Tissue::from_payload(&payload, &[LEFT_CAP, RIGHT_CAP], Vec::new(), 1e-9).unwrap()
    }

    fn shrink_left_cap(tissue: &mut Tissue, top: f64) {
        for v in [8, 13] {
            tissue.vertices_mut().get_mut(v).unwrap().set_y(top);
        }
    }

    #[test]
    fn test_root_caps_link_to_their_side_only() {
        let tissue = capped_column();
        let ctx = tissue.context();
        let cap = tissue.cell(LEFT_CAP).unwrap();
        assert!(cell_and_lrc_cell_are_neighbors(tissue.cell(0).unwrap(), cap, &ctx).unwrap());
        assert!(cell_and_lrc_cell_are_neighbors(tissue.cell(2).unwrap(), cap, &ctx).unwrap());
        assert!(!cell_and_lrc_cell_are_neighbors(tissue.cell(1).unwrap(), cap, &ctx).unwrap());

        let linked: Vec<CellId> = cap.neighbors().keys().copied().collect();
        assert_eq!(linked, vec![0, 2]);
        assert_eq!(tissue.cell(0).unwrap().neighbor(LEFT_CAP).unwrap().direction, Direction::Lateral);
        assert_eq!(cap.neighbor(0).unwrap().direction, Direction::Medial);
        assert_relative_eq!(cap.neighbor(0).unwrap().length, 10.0);
        assert!(!cap.is_neighbor(RIGHT_CAP));

        let right: Vec<CellId> = tissue.cell(RIGHT_CAP).unwrap().neighbors().keys().copied().collect();
        assert_eq!(right, vec![1, 3]);
        tissue.check_invariants().unwrap();
    }

    #[test]
    fn test_default_geometry_directions() {
        let tissue = capped_column();
        let ctx = tissue.context();
        let (c0, c1, c2, c3) = (
            tissue.cell(0).unwrap(),
            tissue.cell(1).unwrap(),
            tissue.cell(2).unwrap(),
            tissue.cell(3).unwrap(),
        );
        assert_eq!(find_neighbor_direction(c0, c1, &ctx).unwrap(), Some(DirectionCode::Toward(Direction::Medial)));
        assert_eq!(find_neighbor_direction(c1, c0, &ctx).unwrap(), Some(DirectionCode::Toward(Direction::Medial)));
        assert_eq!(find_neighbor_direction(c0, c2, &ctx).unwrap(), Some(DirectionCode::Toward(Direction::Apical)));
        assert_eq!(find_neighbor_direction(c2, c0, &ctx).unwrap(), Some(DirectionCode::Toward(Direction::Basal)));
        // Diagonal cells meet at one vertex with no contact.
        assert_eq!(get_neighbor_dir_neighbor_shares_one_v_default_geo(c0, c3, &ctx).unwrap(), None);
        assert!(shared_edge_between(c0, c3, &ctx).unwrap().is_none());
    }

    #[test]
    fn test_override_wins_over_geometry() {
        let tissue = capped_column();
        let overrides = [ContactOverride { cell: 0, neighbor: 3, direction: Direction::Apical }];
        let ctx = NeighborContext { overrides: &overrides, ..tissue.context() };
        let dir = get_neighbor_dir_neighbor_shares_one_v_default_geo(tissue.cell(0).unwrap(), tissue.cell(3).unwrap(), &ctx)
            .unwrap();
        assert_eq!(dir, Some(DirectionCode::Toward(Direction::Apical)));
    }

    #[test]
    fn test_root_cap_direction_without_shared_vertices() {
        let mut tissue = capped_column();
        {
            let ctx = tissue.context();
            let dir = get_neighbor_dir_neighbor_shares_no_vs_default_geo(
                tissue.cell(2).unwrap(),
                tissue.cell(LEFT_CAP).unwrap(),
                &ctx,
            )
            .unwrap();
            assert_eq!(dir, Some(DirectionCode::Toward(Direction::Lateral)));
        }
        shrink_left_cap(&mut tissue, 8.0);
        let ctx = tissue.context();
        let dir = get_neighbor_dir_neighbor_shares_no_vs_default_geo(
            tissue.cell(2).unwrap(),
            tissue.cell(LEFT_CAP).unwrap(),
            &ctx,
        )
        .unwrap();
        assert_eq!(dir, Some(DirectionCode::NoLongerRootCapNeighbor));
        let back = get_neighbor_dir_neighbor_shares_no_vs_default_geo(
            tissue.cell(LEFT_CAP).unwrap(),
            tissue.cell(2).unwrap(),
            &ctx,
        )
        .unwrap();
        assert_eq!(back, Some(DirectionCode::NoLongerRootCapNeighbor));
    }

    #[test]
    fn test_root_cap_contact_lost_and_regained() {
        let mut tissue = capped_column();
        shrink_left_cap(&mut tissue, 8.0);
        assert!(check_if_no_longer_neighbors_with_root_cap_cell(&mut tissue, 2, LEFT_CAP).unwrap());
        assert!(!tissue.cell(2).unwrap().is_neighbor(LEFT_CAP));
        assert!(!tissue.cell(LEFT_CAP).unwrap().is_neighbor(2));
        // The lower cell still touches the cap.
        assert!(!check_if_no_longer_neighbors_with_root_cap_cell(&mut tissue, 0, LEFT_CAP).unwrap());

        shrink_left_cap(&mut tissue, 25.0);
        assert_eq!(check_if_neighbors_with_new_root_cap_cell(&mut tissue, 2).unwrap(), vec![LEFT_CAP]);
        assert!(tissue.cell(LEFT_CAP).unwrap().is_neighbor(2));
        assert!(check_if_neighbors_with_new_root_cap_cell(&mut tissue, 2).unwrap().is_empty());
        tissue.check_invariants().unwrap();
    }

    #[test]
    fn test_fix_lrc_neighbors_after_growth() {
        let mut tissue = capped_column();
        shrink_left_cap(&mut tissue, 8.0);
        let fix = fix_lrc_neighbors_after_growth(&mut tissue, LEFT_CAP).unwrap();
        assert_eq!(fix, LrcFix { added: 0, removed: 1, refreshed: 1 });
        let edge = tissue.cell(0).unwrap().neighbor(LEFT_CAP).unwrap();
        assert_relative_eq!(edge.length, 8.0);
        assert_relative_eq!(tissue.cell(LEFT_CAP).unwrap().neighbor(0).unwrap().length, 8.0);
        tissue.check_invariants().unwrap();

        // Not a root cap: nothing to fix.
        assert_eq!(fix_lrc_neighbors_after_growth(&mut tissue, 0).unwrap(), LrcFix::default());
    }

    #[test]
    fn test_contact_length_falls_back_to_lateral_membrane() {
        let tissue = capped_column();
        let ctx = tissue.context();
        let far = tissue.cell(1).unwrap();
        let cap = tissue.cell(LEFT_CAP).unwrap();
        // No geometric contact: the non-cap cell's lateral membrane stands in.
        assert_relative_eq!(contact_length(far, cap, &ctx).unwrap(), 10.0);
        assert_relative_eq!(contact_length(cap, far, &ctx).unwrap(), 10.0);
        assert_eq!(contact_length(tissue.cell(0).unwrap(), tissue.cell(3).unwrap(), &ctx).unwrap(), 0.0);
    }
}

//! Pure geometric predicates between two perimeters.
//!
//! Nothing here mutates; every function is safe to call from parallel
//! read-only passes over the mesh.

use crate::error::MeshError;
use crate::mesh::perimeter::QuadPerimeter;
use crate::mesh::vertex::VertexArena;
use crate::mesh::VertexId;
use tissue_common::vecmath::{collinear_overlap, point_on_segment};

/// Vertices two perimeters share by identity, and the edges they share.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overlap {
    /// Shared vertex ids, in the order they appear in the first perimeter.
    pub shared: Vec<VertexId>,
    /// Edges present in both perimeters, oriented as in the first perimeter.
    pub edges: Vec<(VertexId, VertexId)>,
}

impl Overlap {
    pub fn is_empty(&self) -> bool {
        self.shared.is_empty()
    }

    /// The first shared edge with its endpoints in ascending id order.
    pub fn shared_pair(&self) -> Option<(VertexId, VertexId)> {
        self.edges.first().map(|&(a, b)| (a.min(b), a.max(b)))
    }
}

/// Identity overlap of two perimeters. Coordinate-equal but distinct vertices
/// do not count.
pub fn get_overlap(a: &QuadPerimeter, b: &QuadPerimeter) -> Overlap {
    let shared: Vec<VertexId> = a.vertex_ids().iter().copied().filter(|&v| b.contains(v)).collect();
    if shared.len() < 2 {
        return Overlap { shared, edges: Vec::new() };
    }
    let edges = a.edges().filter(|&(p, q)| b.has_edge(p, q)).collect();
    Overlap { shared, edges }
}

/// Euclidean length of the edge(s) shared by identity; zero when none is shared.
pub fn get_default_len_perimeter_in_common(
    a: &QuadPerimeter,
    b: &QuadPerimeter,
    arena: &VertexArena,
) -> Result<f64, MeshError> {
    let overlap = get_overlap(a, b);
    let mut len = 0.0;
    for (p, q) in overlap.edges {
        len += arena.position(p)?.distance(arena.position(q)?);
    }
    Ok(len)
}

/// Length of boundary the two perimeters have in common, counting identity
/// edges and edges that merely lie along each other (T-junctions left by a
/// neighbor's division).
pub fn collinear_contact_len(
    a: &QuadPerimeter,
    b: &QuadPerimeter,
    arena: &VertexArena,
    eps: f64,
) -> Result<f64, MeshError> {
    let pa = a.points(arena)?;
    let pb = b.points(arena)?;
    let (na, nb) = (pa.len(), pb.len());
    let mut len = 0.0;
    for i in 0..na {
        let (a1, a2) = (pa[i], pa[(i + 1) % na]);
        for j in 0..nb {
            len += collinear_overlap(a1, a2, pb[j], pb[(j + 1) % nb], eps);
        }
    }
    Ok(len)
}

/// The edge of `a` carrying the longest collinear contact with `b`, if any.
pub fn longest_contact_edge(
    a: &QuadPerimeter,
    b: &QuadPerimeter,
    arena: &VertexArena,
    eps: f64,
) -> Result<Option<(VertexId, VertexId)>, MeshError> {
    let pb = b.points(arena)?;
    let nb = pb.len();
    let mut best: Option<((VertexId, VertexId), f64)> = None;
    for (p, q) in a.edges() {
        let (a1, a2) = (arena.position(p)?, arena.position(q)?);
        let len: f64 = (0..nb).map(|j| collinear_overlap(a1, a2, pb[j], pb[(j + 1) % nb], eps)).sum();
        if len > eps && best.map_or(true, |(_, l)| len > l) {
            best = Some(((p, q), len));
        }
    }
    Ok(best.map(|(edge, _)| edge))
}

/// True when the perimeters share a vertex by identity or a vertex of one
/// lies on the boundary of the other.
pub fn perimeters_touch(
    a: &QuadPerimeter,
    b: &QuadPerimeter,
    arena: &VertexArena,
    eps: f64,
) -> Result<bool, MeshError> {
    if a.vertex_ids().iter().any(|&v| b.contains(v)) {
        return Ok(true);
    }
    Ok(vertex_on_boundary(a, b, arena, eps)? || vertex_on_boundary(b, a, arena, eps)?)
}

fn vertex_on_boundary(
    from: &QuadPerimeter,
    onto: &QuadPerimeter,
    arena: &VertexArena,
    eps: f64,
) -> Result<bool, MeshError> {
    let points = onto.points(arena)?;
    let n = points.len();
    for &v in from.vertex_ids() {
        let p = arena.position(v)?;
        if (0..n).any(|i| point_on_segment(p, points[i], points[(i + 1) % n], eps)) {
            return Ok(true);
        }
    }
    Ok(false)
}

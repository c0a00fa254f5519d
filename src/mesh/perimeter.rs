use crate::error::MeshError;
use crate::mesh::vertex::VertexArena;
use crate::mesh::{CellId, VertexId};
use std::collections::BTreeSet;
use tissue_common::vecmath::segments_intersect;
use tissue_common::{Direction, Vec2};

/// Axis-aligned bounds of a perimeter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

impl Bounds {
    pub fn of(points: &[Vec2]) -> Self {
        let mut b = Bounds {
            min_x: f64::INFINITY,
            max_x: f64::NEG_INFINITY,
            min_y: f64::INFINITY,
            max_y: f64::NEG_INFINITY,
        };
        for p in points {
            b.min_x = b.min_x.min(p.x);
            b.max_x = b.max_x.max(p.x);
            b.min_y = b.min_y.min(p.y);
            b.max_y = b.max_y.max(p.y);
        }
        b
    }

    /// True when the boxes overlap or touch within `eps`.
    pub fn touches(&self, other: &Bounds, eps: f64) -> bool {
        self.min_x <= other.max_x + eps
            && other.min_x <= self.max_x + eps
            && self.min_y <= other.max_y + eps
            && other.min_y <= self.max_y + eps
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }
}

/// Corner roles of a four-vertex perimeter.
///
/// The bottom membrane is the counter-clockwise edge pointing most nearly along
/// +x; the remaining corners follow in ring order. Cells whose side walls
/// are sheared vertically keep their roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Corners {
    pub top_left: VertexId,
    pub top_right: VertexId,
    pub bottom_left: VertexId,
    pub bottom_right: VertexId,
}

impl Corners {
    /// Membrane formed by the edge `a`-`b`, if that edge joins two corners.
    /// Left/right membranes are reported as `Lateral`/`Medial` using `sides`.
    pub fn membrane_of_edge(&self, a: VertexId, b: VertexId, sides: (Direction, Direction)) -> Option<Direction> {
        let is = |p: VertexId, q: VertexId| (a == p && b == q) || (a == q && b == p);
        if is(self.top_left, self.top_right) {
            Some(Direction::Apical)
        } else if is(self.bottom_left, self.bottom_right) {
            Some(Direction::Basal)
        } else if is(self.top_left, self.bottom_left) {
            Some(sides.0)
        } else if is(self.top_right, self.bottom_right) {
            Some(sides.1)
        } else {
            None
        }
    }
}

/// The ordered, cyclic boundary of one cell.
///
/// Holds vertex ids only; every geometric query takes the arena explicitly.
/// Construction guarantees at least three distinct vertices in
/// counter-clockwise order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuadPerimeter {
    vertices: Vec<VertexId>,
}

impl QuadPerimeter {
    /// Validates `vertices` against the arena and orients them counter-clockwise.
    pub fn new(mut vertices: Vec<VertexId>, arena: &VertexArena, cell: Option<CellId>) -> Result<Self, MeshError> {
        Self::validate_ids(&vertices, cell)?;
        for &v in &vertices {
            if !arena.contains(v) {
                return Err(MeshError::MissingVertex { cell, vertex: v });
            }
        }
        let points = Self::resolve(&vertices, arena, cell)?;
        if signed_area(&points) < 0.0 {
            vertices.reverse();
        }
        Ok(QuadPerimeter { vertices })
    }

    /// Structural checks that need no coordinates.
    pub fn validate_ids(vertices: &[VertexId], cell: Option<CellId>) -> Result<(), MeshError> {
        if vertices.len() < 3 {
            return Err(MeshError::TooFewVertices { cell, count: vertices.len() });
        }
        let mut seen = BTreeSet::new();
        for &v in vertices {
            if !seen.insert(v) {
                return Err(MeshError::DuplicateVertex { cell, vertex: v });
            }
        }
        Ok(())
    }

    fn resolve(vertices: &[VertexId], arena: &VertexArena, cell: Option<CellId>) -> Result<Vec<Vec2>, MeshError> {
        vertices
            .iter()
            .map(|&v| {
                arena
                    .position(v)
                    .map_err(|_| MeshError::MissingVertex { cell, vertex: v })
            })
            .collect()
    }

    pub fn vertex_ids(&self) -> &[VertexId] {
        &self.vertices
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn contains(&self, v: VertexId) -> bool {
        self.vertices.contains(&v)
    }

    pub fn position_of(&self, v: VertexId) -> Option<usize> {
        self.vertices.iter().position(|&x| x == v)
    }

    /// Edges in order, each as (start, end), wrapping around.
    pub fn edges(&self) -> impl Iterator<Item = (VertexId, VertexId)> + '_ {
        let n = self.vertices.len();
        (0..n).map(move |i| (self.vertices[i], self.vertices[(i + 1) % n]))
    }

    /// True when `a` and `b` are consecutive, in either order.
    pub fn has_edge(&self, a: VertexId, b: VertexId) -> bool {
        self.edges().any(|(p, q)| (p == a && q == b) || (p == b && q == a))
    }

    /// Coordinates of the vertices, in perimeter order.
    pub fn points(&self, arena: &VertexArena) -> Result<Vec<Vec2>, MeshError> {
        Self::resolve(&self.vertices, arena, None)
    }

    pub fn area(&self, arena: &VertexArena) -> Result<f64, MeshError> {
        Ok(signed_area(&self.points(arena)?).abs())
    }

    pub fn perimeter_len(&self, arena: &VertexArena) -> Result<f64, MeshError> {
        Ok(perimeter_len(&self.points(arena)?))
    }

    /// Mean of the vertex coordinates.
    pub fn midpoint(&self, arena: &VertexArena) -> Result<Vec2, MeshError> {
        let points = self.points(arena)?;
        let sum = points.iter().fold(Vec2::zero(), |acc, &p| acc + p);
        Ok(sum / points.len() as f64)
    }

    pub fn bounds(&self, arena: &VertexArena) -> Result<Bounds, MeshError> {
        Ok(Bounds::of(&self.points(arena)?))
    }

    pub fn min_x(&self, arena: &VertexArena) -> Result<f64, MeshError> {
        Ok(self.bounds(arena)?.min_x)
    }

    pub fn max_x(&self, arena: &VertexArena) -> Result<f64, MeshError> {
        Ok(self.bounds(arena)?.max_x)
    }

    pub fn min_y(&self, arena: &VertexArena) -> Result<f64, MeshError> {
        Ok(self.bounds(arena)?.min_y)
    }

    pub fn max_y(&self, arena: &VertexArena) -> Result<f64, MeshError> {
        Ok(self.bounds(arena)?.max_y)
    }

    /// Even-odd test; points on the boundary may go either way.
    pub fn point_inside(&self, p: Vec2, arena: &VertexArena) -> Result<bool, MeshError> {
        let points = self.points(arena)?;
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
        Ok(inside)
    }

    pub fn is_simple(&self, arena: &VertexArena, eps: f64) -> Result<bool, MeshError> {
        Ok(is_simple_polygon(&self.points(arena)?, eps))
    }

    /// Corner roles, for four-vertex perimeters only.
    pub fn corners(&self, arena: &VertexArena) -> Result<Option<Corners>, MeshError> {
        if self.vertices.len() != 4 {
            return Ok(None);
        }
        let points = self.points(arena)?;
        let mut bottom = 0;
        let mut best = (f64::NEG_INFINITY, f64::INFINITY);
        for i in 0..4 {
            let (a, b) = (points[i], points[(i + 1) % 4]);
            let len = a.distance(b);
            if len <= 0.0 {
                continue;
            }
            let heading = (b.x - a.x) / len;
            let mid_y = 0.5 * (a.y + b.y);
            // Ties go to the lower edge.
            if heading > best.0 + 1e-12 || ((heading - best.0).abs() <= 1e-12 && mid_y < best.1) {
                best = (heading, mid_y);
                bottom = i;
            }
        }
        let at = |k: usize| self.vertices[(bottom + k) % 4];
        Ok(Some(Corners {
            bottom_left: at(0),
            bottom_right: at(1),
            top_right: at(2),
            top_left: at(3),
        }))
    }

    fn corner_distance(&self, arena: &VertexArena, pick: impl Fn(&Corners) -> (VertexId, VertexId)) -> Result<Option<f64>, MeshError> {
        match self.corners(arena)? {
            Some(c) => {
                let (a, b) = pick(&c);
                Ok(Some(arena.position(a)?.distance(arena.position(b)?)))
            }
            None => Ok(None),
        }
    }

    /// Length of the top membrane. Perimeters without corner roles sum the
    /// edges whose outward normal points up.
    pub fn apical_memlen(&self, arena: &VertexArena) -> Result<f64, MeshError> {
        match self.corner_distance(arena, |c| (c.top_left, c.top_right))? {
            Some(len) => Ok(len),
            None => self.normal_facing_len(arena, Facing::Up),
        }
    }

    pub fn basal_memlen(&self, arena: &VertexArena) -> Result<f64, MeshError> {
        match self.corner_distance(arena, |c| (c.bottom_left, c.bottom_right))? {
            Some(len) => Ok(len),
            None => self.normal_facing_len(arena, Facing::Down),
        }
    }

    pub fn left_memlen(&self, arena: &VertexArena) -> Result<f64, MeshError> {
        match self.corner_distance(arena, |c| (c.top_left, c.bottom_left))? {
            Some(len) => Ok(len),
            None => self.normal_facing_len(arena, Facing::Left),
        }
    }

    pub fn right_memlen(&self, arena: &VertexArena) -> Result<f64, MeshError> {
        match self.corner_distance(arena, |c| (c.top_right, c.bottom_right))? {
            Some(len) => Ok(len),
            None => self.normal_facing_len(arena, Facing::Right),
        }
    }

    /// Extent along the growth axis.
    pub fn height(&self, arena: &VertexArena) -> Result<f64, MeshError> {
        match self.corners(arena)? {
            Some(c) => Ok(arena.position(c.top_left)?.y - arena.position(c.bottom_left)?.y),
            None => Ok(self.bounds(arena)?.height()),
        }
    }

    /// Roles of the (left, right) membranes relative to the root midline.
    pub fn determine_left_right(&self, arena: &VertexArena, root_midpoint_x: f64) -> Result<(Direction, Direction), MeshError> {
        let mid_x = self.midpoint(arena)?.x;
        Ok(if mid_x < root_midpoint_x {
            (Direction::Lateral, Direction::Medial)
        } else if mid_x == root_midpoint_x {
            (Direction::Lateral, Direction::Lateral)
        } else {
            (Direction::Medial, Direction::Lateral)
        })
    }

    /// Length of the membrane facing `direction`.
    pub fn memlen(&self, direction: Direction, arena: &VertexArena, root_midpoint_x: f64) -> Result<f64, MeshError> {
        match direction {
            Direction::Apical => self.apical_memlen(arena),
            Direction::Basal => self.basal_memlen(arena),
            Direction::Lateral | Direction::Medial => {
                let (left, right) = self.determine_left_right(arena, root_midpoint_x)?;
                let mut len = 0.0;
                if left == direction {
                    len += self.left_memlen(arena)?;
                }
                if right == direction {
                    len += self.right_memlen(arena)?;
                }
                Ok(len)
            }
        }
    }

    /// Fraction of the perimeter taken by the membrane facing `direction`.
    pub fn memfrac(&self, direction: Direction, arena: &VertexArena, root_midpoint_x: f64) -> Result<f64, MeshError> {
        let total = self.perimeter_len(arena)?;
        if total <= 0.0 {
            return Ok(0.0);
        }
        Ok(self.memlen(direction, arena, root_midpoint_x)? / total)
    }

    /// Which membrane the edge `a`-`b` belongs to.
    pub fn membrane_of_edge(
        &self,
        a: VertexId,
        b: VertexId,
        arena: &VertexArena,
        root_midpoint_x: f64,
    ) -> Result<Direction, MeshError> {
        let sides = self.determine_left_right(arena, root_midpoint_x)?;
        if let Some(corners) = self.corners(arena)? {
            if let Some(dir) = corners.membrane_of_edge(a, b, sides) {
                return Ok(dir);
            }
        }
        let facing = edge_facing(arena.position(a)?, arena.position(b)?, self.is_ordered(a, b));
        Ok(match facing {
            Facing::Up => Direction::Apical,
            Facing::Down => Direction::Basal,
            Facing::Left => sides.0,
            Facing::Right => sides.1,
        })
    }

    /// True when `b` directly follows `a` in perimeter order.
    fn is_ordered(&self, a: VertexId, b: VertexId) -> bool {
        self.edges().any(|(p, q)| p == a && q == b)
    }

    fn normal_facing_len(&self, arena: &VertexArena, facing: Facing) -> Result<f64, MeshError> {
        let mut len = 0.0;
        for (a, b) in self.edges() {
            let (pa, pb) = (arena.position(a)?, arena.position(b)?);
            if edge_facing(pa, pb, true) == facing {
                len += pa.distance(pb);
            }
        }
        Ok(len)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Facing {
    Up,
    Down,
    Left,
    Right,
}

/// Dominant direction of the outward normal of a counter-clockwise edge.
fn edge_facing(a: Vec2, b: Vec2, ccw: bool) -> Facing {
    let d = if ccw { b - a } else { a - b };
    // Outward normal of a CCW edge is the tangent rotated -90 degrees.
    let n = Vec2::new(d.y, -d.x);
    if n.y.abs() >= n.x.abs() {
        if n.y >= 0.0 {
            Facing::Up
        } else {
            Facing::Down
        }
    } else if n.x < 0.0 {
        Facing::Left
    } else {
        Facing::Right
    }
}

/// Shoelace area, positive for counter-clockwise order.
pub fn signed_area(points: &[Vec2]) -> f64 {
    let n = points.len();
    let mut acc = 0.0;
    for i in 0..n {
        acc += points[i].cross(points[(i + 1) % n]);
    }
    0.5 * acc
}

pub fn perimeter_len(points: &[Vec2]) -> f64 {
    let n = points.len();
    (0..n).map(|i| points[i].distance(points[(i + 1) % n])).sum()
}

/// No repeated points, non-vanishing area, and no two non-adjacent edges touching.
pub fn is_simple_polygon(points: &[Vec2], eps: f64) -> bool {
    let n = points.len();
    if n < 3 || signed_area(points).abs() <= eps * eps {
        return false;
    }
    for i in 0..n {
        for j in (i + 1)..n {
            if points[i].approx_eq(points[j], eps) {
                return false;
            }
        }
    }
    for i in 0..n {
        let (a1, a2) = (points[i], points[(i + 1) % n]);
        for j in (i + 1)..n {
            // Adjacent edges share an endpoint by construction.
            if j == i + 1 || (i == 0 && j == n - 1) {
                continue;
            }
            let (b1, b2) = (points[j], points[(j + 1) % n]);
            if segments_intersect(a1, a2, b1, b2, eps) {
                return false;
            }
        }
    }
    true
}

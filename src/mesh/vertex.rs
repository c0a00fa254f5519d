use crate::error::MeshError;
use crate::mesh::VertexId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tissue_common::Vec2;

/// A point of the tissue mesh with a stable identity.
///
/// Vertices live in a [`VertexArena`]; perimeters refer to them by id so a
/// vertex shared by several cells is one object, moved once.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    v_id: VertexId,
    x: f64,
    y: f64,
}

impl Vertex {
    pub fn new(v_id: VertexId, x: f64, y: f64) -> Self {
        Vertex { v_id, x, y }
    }

    pub fn v_id(&self) -> VertexId {
        self.v_id
    }

    pub fn x(&self) -> f64 {
        self.x
    }

    pub fn y(&self) -> f64 {
        self.y
    }

    pub fn xy(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }

    pub fn set_x(&mut self, x: f64) {
        self.x = x;
    }

    pub fn set_y(&mut self, y: f64) {
        self.y = y;
    }
}

/// Owner of every live vertex, indexed by stable id.
#[derive(Debug, Clone, Default)]
pub struct VertexArena {
    vertices: BTreeMap<VertexId, Vertex>,
    next_id: VertexId,
}

impl VertexArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a vertex and returns its fresh id. Ids are never reused.
    pub fn insert(&mut self, x: f64, y: f64) -> VertexId {
        let id = self.next_id;
        self.vertices.insert(id, Vertex::new(id, x, y));
        self.next_id += 1;
        id
    }

    pub fn get(&self, id: VertexId) -> Option<&Vertex> {
        self.vertices.get(&id)
    }

    pub fn get_mut(&mut self, id: VertexId) -> Option<&mut Vertex> {
        self.vertices.get_mut(&id)
    }

    pub fn contains(&self, id: VertexId) -> bool {
        self.vertices.contains_key(&id)
    }

    /// Coordinates of `id`, or a missing-vertex error.
    pub fn position(&self, id: VertexId) -> Result<Vec2, MeshError> {
        self.vertices
            .get(&id)
            .map(Vertex::xy)
            .ok_or(MeshError::MissingVertex { cell: None, vertex: id })
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Live vertices in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = &Vertex> {
        self.vertices.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = VertexId> + '_ {
        self.vertices.keys().copied()
    }

    /// Drops every vertex in `candidates` that is not in `referenced`.
    /// Returns the removed ids.
    pub fn remove_orphans(
        &mut self,
        candidates: impl IntoIterator<Item = VertexId>,
        referenced: &BTreeSet<VertexId>,
    ) -> Vec<VertexId> {
        let mut removed = Vec::new();
        for id in candidates {
            if !referenced.contains(&id) && self.vertices.remove(&id).is_some() {
                removed.push(id);
            }
        }
        removed
    }

    /// Range of x over all live vertices.
    pub fn x_range(&self) -> Option<(f64, f64)> {
        self.vertices.values().fold(None, |acc, v| match acc {
            None => Some((v.x, v.x)),
            Some((lo, hi)) => Some((lo.min(v.x), hi.max(v.x))),
        })
    }

    /// Range of y over all live vertices.
    pub fn y_range(&self) -> Option<(f64, f64)> {
        self.vertices.values().fold(None, |acc, v| match acc {
            None => Some((v.y, v.y)),
            Some((lo, hi)) => Some((lo.min(v.y), hi.max(v.y))),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_accessors() {
        let mut v = Vertex::new(7, 1.0, 2.0);
        assert_eq!(v.v_id(), 7);
        assert_eq!(v.xy(), Vec2::new(1.0, 2.0));
        v.set_x(3.0);
        v.set_y(-4.0);
        assert_eq!((v.x(), v.y()), (3.0, -4.0));
    }

    #[test]
    fn test_arena_ids_are_not_reused() {
        let mut arena = VertexArena::new();
        let a = arena.insert(0.0, 0.0);
        let b = arena.insert(1.0, 0.0);
        let referenced: BTreeSet<VertexId> = [a].into_iter().collect();
        assert_eq!(arena.remove_orphans([a, b], &referenced), vec![b]);
        let c = arena.insert(2.0, 0.0);
        assert_ne!(c, b);
        assert!(arena.position(b).is_err());
        assert_eq!(arena.x_range(), Some((0.0, 2.0)));
    }
}

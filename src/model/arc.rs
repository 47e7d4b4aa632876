//! Arcs as seen by the write and traversal paths.

use super::predicator::{ArcDirection, Predicator};
use super::vertex::{VertexHandle, VertexId};
use crate::graph::AccessReason;

/// Neighbor vertex plus the predicator labelling the arc to it.
///
/// The tail is known from context (the owner of the arcvector).
#[derive(Clone)]
pub struct ArcHead {
    pub vertex: VertexHandle,
    pub predicator: Predicator,
}

impl ArcHead {
    pub fn new(vertex: VertexHandle, predicator: Predicator) -> Self {
        Self { vertex, predicator }
    }

    pub fn id(&self) -> VertexId {
        self.vertex.id()
    }
}

impl PartialEq for ArcHead {
    fn eq(&self, other: &Self) -> bool {
        self.vertex.id() == other.vertex.id() && self.predicator == other.predicator
    }
}

impl std::fmt::Debug for ArcHead {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "-[{}]-> {}", self.predicator, self.vertex.identifier())
    }
}

/// A directed arc `tail -[predicator]-> head`.
#[derive(Clone)]
pub struct GraphArc {
    pub tail: VertexHandle,
    pub head: ArcHead,
}

impl PartialEq for GraphArc {
    fn eq(&self, other: &Self) -> bool {
        self.tail.id() == other.tail.id() && self.head == other.head
    }
}

impl GraphArc {
    pub fn new(tail: VertexHandle, head: VertexHandle, predicator: Predicator) -> Self {
        Self { tail, head: ArcHead::new(head, predicator) }
    }

    pub fn predicator(&self) -> Predicator {
        self.head.predicator
    }

    pub fn direction(&self) -> ArcDirection {
        self.head.predicator.direction()
    }

    pub fn is_self_loop(&self) -> bool {
        self.tail.id() == self.head.vertex.id()
    }
}

impl std::fmt::Debug for GraphArc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}) {:?}", self.tail.identifier(), self.head)
    }
}

/// Lock acquisition state of an arc's head during traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HeadLock {
    #[default]
    NotLocked,
    Acquired,
    Failed(AccessReason),
}

/// An arc visited by a traversal, with hop distance and head lock state.
#[derive(Clone)]
pub struct LockableArc {
    pub arc: GraphArc,
    /// Hops from the traversal anchor.
    pub distance: u32,
    pub head_lock: HeadLock,
}

impl LockableArc {
    pub fn new(arc: GraphArc, distance: u32) -> Self {
        Self { arc, distance, head_lock: HeadLock::NotLocked }
    }

    pub fn head(&self) -> &VertexHandle {
        &self.arc.head.vertex
    }

    pub fn tail(&self) -> &VertexHandle {
        &self.arc.tail
    }

    pub fn predicator(&self) -> Predicator {
        self.arc.head.predicator
    }
}

impl std::fmt::Debug for LockableArc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?} @{} {:?}", self.arc, self.distance, self.head_lock)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::model::{Modifier, Relationship, Vertex, VertexAttributes};

    fn vertex(id: u64, name: &str) -> VertexHandle {
        Arc::new(Vertex::new(VertexId(id), name.to_string(), VertexAttributes::default()))
    }

    #[test]
    fn test_arc_equality_by_identity() {
        let rel = Relationship(Relationship::USER_START);
        let (a, b) = (vertex(1, "a"), vertex(2, "b"));
        let arc = GraphArc::new(a.clone(), b.clone(), Predicator::new(rel, Modifier::Integer, 4));

        // A distinct record with the same id compares equal.
        let same = GraphArc::new(vertex(1, "a"), b.clone(), Predicator::new(rel, Modifier::Integer, 4));
        assert_eq!(arc, same);
        assert_ne!(arc, GraphArc::new(b.clone(), a.clone(), Predicator::new(rel, Modifier::Integer, 4)));
        assert_ne!(arc, GraphArc::new(a, b, Predicator::new(rel, Modifier::Integer, 5)));
    }
}

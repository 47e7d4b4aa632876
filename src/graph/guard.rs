//! Scoped vertex locks.
//!
//! A guard releases its lock when dropped. Release errors (a refused
//! commit) are logged from `drop`; call [`WritableVertex::release`] to see
//! them.

use std::ops::Deref;

use tracing::warn;

use super::timing::TimingBudget;
use super::Graph;
use crate::model::{Vertex, VertexHandle};
use crate::{Error, Result};

/// A vertex held under some lock mode.
pub trait LockedVertex: Deref<Target = Vertex> {
    fn handle(&self) -> &VertexHandle;
    fn is_writable(&self) -> bool;
}

/// Vertex locked writable by the current thread.
#[must_use = "the lock is released when the guard is dropped"]
pub struct WritableVertex<'g> {
    graph: &'g Graph,
    vertex: VertexHandle,
    armed: bool,
}

impl<'g> WritableVertex<'g> {
    pub(crate) fn new(graph: &'g Graph, vertex: VertexHandle) -> Self {
        Self { graph, vertex, armed: true }
    }

    pub fn graph(&self) -> &'g Graph {
        self.graph
    }

    /// Release the lock now and report the commit outcome.
    pub fn release(mut self) -> Result<()> {
        self.armed = false;
        self.graph.inner.lock_state().unlock_writable(&self.vertex)
    }

    /// Downgrade to a readonly hold.
    ///
    /// Returns `None` when this guard was a nested writable level; that
    /// level is released and the outer one is unaffected.
    pub fn relax(mut self) -> Result<Option<ReadonlyVertex<'g>>> {
        self.armed = false;
        let relaxed = self.graph.inner.lock_state().relax(&self.vertex)?;
        Ok(relaxed.then(|| ReadonlyVertex::new(self.graph, self.vertex.clone())))
    }
}

impl Deref for WritableVertex<'_> {
    type Target = Vertex;

    fn deref(&self) -> &Vertex {
        &self.vertex
    }
}

impl LockedVertex for WritableVertex<'_> {
    fn handle(&self) -> &VertexHandle {
        &self.vertex
    }

    fn is_writable(&self) -> bool {
        true
    }
}

impl Drop for WritableVertex<'_> {
    fn drop(&mut self) {
        if self.armed {
            if let Err(e) = self.graph.inner.lock_state().unlock_writable(&self.vertex) {
                warn!(vertex = %self.vertex.id(), error = %e, "writable unlock reported an error");
            }
        }
    }
}

impl std::fmt::Debug for WritableVertex<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "WritableVertex({})", self.vertex.identifier())
    }
}

/// Vertex locked readonly by the current thread.
#[must_use = "the lock is released when the guard is dropped"]
pub struct ReadonlyVertex<'g> {
    graph: &'g Graph,
    vertex: VertexHandle,
    armed: bool,
}

impl<'g> ReadonlyVertex<'g> {
    pub(crate) fn new(graph: &'g Graph, vertex: VertexHandle) -> Self {
        Self { graph, vertex, armed: true }
    }

    pub fn release(mut self) -> Result<()> {
        self.armed = false;
        self.graph.inner.lock_state().unlock_readonly(&self.vertex)
    }

    /// Upgrade to writable. This must be the thread's only readonly hold
    /// on the vertex. On failure the readonly hold is kept and returned
    /// with the error.
    pub fn escalate(mut self, timeout_ms: u64) -> std::result::Result<WritableVertex<'g>, (Self, Error)> {
        let mut budget = TimingBudget::from_millis(timeout_ms);
        let escalated = self.graph.inner.lock_state().escalate(&self.vertex, &mut budget);
        if escalated {
            self.armed = false;
            Ok(WritableVertex::new(self.graph, self.vertex.clone()))
        } else {
            let message = format!("cannot escalate {}", self.vertex.identifier());
            Err((self, Error::access(budget.reason(), message)))
        }
    }
}

impl Deref for ReadonlyVertex<'_> {
    type Target = Vertex;

    fn deref(&self) -> &Vertex {
        &self.vertex
    }
}

impl LockedVertex for ReadonlyVertex<'_> {
    fn handle(&self) -> &VertexHandle {
        &self.vertex
    }

    fn is_writable(&self) -> bool {
        false
    }
}

impl Drop for ReadonlyVertex<'_> {
    fn drop(&mut self) {
        if self.armed {
            if let Err(e) = self.graph.inner.lock_state().unlock_readonly(&self.vertex) {
                warn!(vertex = %self.vertex.id(), error = %e, "readonly unlock reported an error");
            }
        }
    }
}

impl std::fmt::Debug for ReadonlyVertex<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ReadonlyVertex({})", self.vertex.identifier())
    }
}

//! Graph state lock.
//!
//! One mutex per graph guards every vertex descriptor, the vertex index
//! and the readonly state. Functions that need it take `&mut StateLock`,
//! which is the proof that the caller holds it. Blocking happens only on
//! the paired condition variable, and every descriptor change that could
//! unblock someone is followed by [`StateLock::notify`].

use std::ops::{Deref, DerefMut};
use std::time::Duration;

use parking_lot::MutexGuard;

use super::descriptor::VertexDescriptor;
use super::readonly::ReadonlyState;
use super::timing::TimingBudget;
use super::GraphInner;
use crate::index::VertexIndex;
use crate::model::VertexId;

/// Longest single condition-variable wait before conditions are re-checked.
const WAIT_SLICE: Duration = Duration::from_millis(5);

#[derive(Default)]
pub(crate) struct GraphState {
    pub index: VertexIndex,
    pub readonly: ReadonlyState,
    /// Vertices currently locked writable, recursion not counted.
    pub n_writable: i64,
}

/// Held graph state lock.
pub(crate) struct StateLock<'g> {
    pub(crate) graph: &'g GraphInner,
    guard: MutexGuard<'g, GraphState>,
}

impl GraphInner {
    pub(crate) fn lock_state(&self) -> StateLock<'_> {
        StateLock { graph: self, guard: self.state.lock() }
    }
}

impl<'g> StateLock<'g> {
    /// Wait for a state change, at most until the budget expires.
    ///
    /// Returns false without waiting if the budget is already spent.
    pub fn wait(&mut self, budget: &TimingBudget) -> bool {
        if budget.is_expired() {
            return false;
        }
        let slice = budget.remaining().min(WAIT_SLICE);
        self.graph.changed.wait_for(&mut self.guard, slice);
        true
    }

    pub fn notify(&self) {
        self.graph.changed.notify_all();
    }

    /// Run `f` with the state lock released.
    pub fn suspend<R>(&mut self, f: impl FnOnce() -> R) -> R {
        MutexGuard::unlocked(&mut self.guard, f)
    }

    pub fn descriptor(&self, id: VertexId) -> Option<&VertexDescriptor> {
        self.guard.index.slot(id).map(|s| &s.descriptor)
    }

    pub fn descriptor_mut(&mut self, id: VertexId) -> Option<&mut VertexDescriptor> {
        self.guard.index.slot_mut(id).map(|s| &mut s.descriptor)
    }
}

impl Deref for StateLock<'_> {
    type Target = GraphState;

    fn deref(&self) -> &GraphState {
        &self.guard
    }
}

impl DerefMut for StateLock<'_> {
    fn deref_mut(&mut self) -> &mut GraphState {
        &mut self.guard
    }
}

//! Graph-wide readonly mode.
//!
//! Entering readonly waits until no vertex is locked writable, then marks
//! the index readonly as well. Nested `set_readonly` calls stack; each
//! needs a matching `clear_readonly`.

use tracing::{debug, warn};

use super::state::StateLock;
use super::timing::{AccessReason, TimingBudget};
use super::Graph;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct ReadonlyState {
    pub readonly: bool,
    /// Entering or leaving readonly.
    pub transition: bool,
    /// Nested `set_readonly` count.
    pub recursion: u32,
    /// Active `disallow_readonly` guards.
    pub disallow: u32,
}

impl StateLock<'_> {
    /// Wait until at most `max` vertices are locked writable.
    pub(crate) fn wait_max_writable(&mut self, max: i64, budget: &TimingBudget) -> bool {
        while self.n_writable > max {
            if !self.wait(budget) {
                return false;
            }
        }
        true
    }
}

impl Graph {
    /// Put the graph into readonly mode.
    ///
    /// Fails if readonly is disallowed (unless `force` or the configured
    /// default forces it) or if writable vertices do not drain in time.
    pub fn set_readonly(&self, timeout_ms: u64, force: bool) -> Result<()> {
        let budget = TimingBudget::from_millis(timeout_ms);
        let mut state = self.inner.lock_state();
        while state.readonly.transition {
            if !state.wait(&budget) {
                return Err(Error::access(AccessReason::ReadonlyPending, "readonly transition in progress"));
            }
        }
        if state.readonly.readonly {
            state.readonly.recursion += 1;
            return Ok(());
        }
        if state.readonly.disallow > 0 {
            if !(force || self.inner.config.readonly_force) {
                return Err(Error::access(AccessReason::Locked, "readonly transition is disallowed"));
            }
            warn!(graph = %self.inner.config.name, disallow = state.readonly.disallow, "forcing readonly transition while disallowed");
        }

        state.readonly.transition = true;
        state.notify();
        if !state.wait_max_writable(0, &budget) {
            state.readonly.transition = false;
            state.notify();
            debug!(graph = %self.inner.config.name, n_writable = state.n_writable, "readonly transition timed out");
            return Err(Error::access(AccessReason::Timeout, "writable vertices did not drain"));
        }
        state.readonly.readonly = true;
        state.readonly.recursion = 1;
        state.index.set_readonly(true);
        state.readonly.transition = false;
        state.notify();
        debug!(graph = %self.inner.config.name, "graph is readonly");
        Ok(())
    }

    /// Undo one `set_readonly`.
    pub fn clear_readonly(&self) {
        let mut state = self.inner.lock_state();
        if !state.readonly.readonly {
            return;
        }
        state.readonly.recursion = state.readonly.recursion.saturating_sub(1);
        if state.readonly.recursion == 0 {
            state.readonly.readonly = false;
            state.index.set_readonly(false);
            debug!(graph = %self.inner.config.name, "graph is writable");
        }
        state.notify();
    }

    pub fn is_readonly(&self) -> bool {
        self.inner.lock_state().readonly.readonly
    }

    /// Block readonly transitions until the matching [`allow_readonly`](Self::allow_readonly).
    pub fn disallow_readonly(&self) {
        self.inner.lock_state().readonly.disallow += 1;
    }

    pub fn allow_readonly(&self) {
        let mut state = self.inner.lock_state();
        state.readonly.disallow = state.readonly.disallow.saturating_sub(1);
    }

    /// Number of vertices currently locked writable.
    pub fn n_writable(&self) -> i64 {
        self.inner.lock_state().n_writable
    }

    /// Wait until at most `max` vertices are locked writable.
    pub fn wait_max_writable(&self, max: i64, timeout_ms: u64) -> bool {
        let budget = TimingBudget::from_millis(timeout_ms);
        self.inner.lock_state().wait_max_writable(max, &budget)
    }
}

//! Vertex lock state machine.
//!
//! Every transition runs under the graph state lock and ends with a
//! notification when it could unblock a waiter. Waiting releases only the
//! state mutex. Lock acquisition itself holds no arcvector guard, but the
//! arc removal paths keep the guard of the arcvector being edited (the
//! tail's outarcs or the head's inarcs) while they wait for the vertex on
//! the other side. The held arcvector is never one that gets yielded:
//! outarcs removal yields only the tail's inarcs, and inarcs removal waits
//! without yielding.
//!
//! A thread that holds vertex A writable and blocks on vertex B yields A's
//! inarcs for the duration of the wait. Another thread removing an arc
//! X→A may then borrow A's inarcs without owning A. The yielded inarcs
//! are reclaimed before the waiting call returns, which is what lets two
//! threads lock the same pair of vertices in opposite order without a
//! global lock order.

use std::time::Duration;

use tracing::{debug, error, trace};

use super::descriptor::{LockMode, ThreadId, VertexContext};
use super::state::StateLock;
use super::timing::{AccessReason, TimingBudget};
use crate::model::{Manifestation, VertexHandle, VertexId};
use crate::{Error, Result};

/// Which commit hook ends a writable hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CommitKind {
    Vertex,
    Inarcs,
}

/// How a head vertex's inarcs were obtained for reverse-arc removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum InarcsAccess {
    /// Head is already writable by this thread.
    Reentrant,
    /// Head is writable by another thread that yielded its inarcs.
    Borrowed,
    /// Head was unlocked and is now writable by this thread.
    Full,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct HeadInarcs {
    pub access: InarcsAccess,
    /// The tail's inarcs were yielded while waiting and still are.
    pub tail_yielded: bool,
}

enum Attempt {
    Granted,
    Reentrant,
    Refused(AccessReason),
    Wait,
}

impl StateLock<'_> {
    // ------------------------------------------------------------------------
    // Writable
    // ------------------------------------------------------------------------

    fn try_lock_writable(&mut self, id: VertexId, tid: ThreadId) -> Attempt {
        let limit = self.graph.config.reentrancy_limit;
        let readonly = self.readonly;
        let Some(d) = self.descriptor_mut(id) else {
            return Attempt::Refused(AccessReason::NoExist);
        };
        match d.lock {
            LockMode::Writable { owner, recursion } if owner == tid => {
                if recursion >= limit {
                    return Attempt::Refused(AccessReason::Semaphore);
                }
                d.lock = LockMode::Writable { owner, recursion: recursion + 1 };
                Attempt::Reentrant
            }
            _ if readonly.readonly => Attempt::Refused(AccessReason::ReadonlyGraph),
            LockMode::Unlocked if !readonly.transition => {
                d.lock = LockMode::Writable { owner: tid, recursion: 1 };
                Attempt::Granted
            }
            _ => Attempt::Wait,
        }
    }

    /// Account for a fresh writable grant and open the commit capture.
    ///
    /// On hook failure the descriptor is put back to `revert`.
    fn open_writable(&mut self, v: &VertexHandle, revert: LockMode, budget: &mut TimingBudget) -> bool {
        self.n_writable += 1;
        match self.graph.hooks.open_operation(v) {
            Ok(()) => {
                if let Some(d) = self.descriptor_mut(v.id()) {
                    d.operation_open = true;
                }
                true
            }
            Err(message) => {
                debug!(vertex = %v.id(), %message, "open operation refused");
                if let Some(d) = self.descriptor_mut(v.id()) {
                    d.lock = revert;
                }
                self.n_writable -= 1;
                self.notify();
                budget.set_reason(AccessReason::CommitFailed);
                false
            }
        }
    }

    fn request_write(&mut self, id: VertexId) {
        if let Some(d) = self.descriptor_mut(id) {
            d.write_requests = d.write_requests.saturating_add(1);
        }
    }

    fn withdraw_write_request(&mut self, id: VertexId) {
        if let Some(d) = self.descriptor_mut(id) {
            d.write_requests = d.write_requests.saturating_sub(1);
        }
    }

    /// Reason for a wait that ran out of budget.
    fn wait_failure(&self, budget: &mut TimingBudget) {
        if self.readonly.transition {
            budget.set_reason(AccessReason::ReadonlyPending);
        } else {
            budget.set_wait_failure();
        }
    }

    /// Lock `v` writable, reentrantly if this thread already owns it.
    pub(crate) fn lock_writable(&mut self, v: &VertexHandle, budget: &mut TimingBudget) -> bool {
        self.lock_writable_yielding(v, None, budget)
    }

    /// Lock `v` writable, yielding the inarcs of `held` (which this thread
    /// owns writable) while waiting.
    pub(crate) fn lock_writable_yielding(
        &mut self,
        v: &VertexHandle,
        held: Option<&VertexHandle>,
        budget: &mut TimingBudget,
    ) -> bool {
        let tid = ThreadId::current();
        let mut requested = false;
        let mut yielded = false;
        let granted = loop {
            match self.try_lock_writable(v.id(), tid) {
                Attempt::Reentrant => break true,
                Attempt::Granted => break self.open_writable(v, LockMode::Unlocked, budget),
                Attempt::Refused(reason) => {
                    budget.set_reason(reason);
                    break false;
                }
                Attempt::Wait => {}
            }
            if !requested {
                self.request_write(v.id());
                requested = true;
            }
            if let Some(h) = held {
                if !yielded {
                    yielded = self.yield_inarcs(h);
                }
            }
            if !self.wait(budget) {
                self.wait_failure(budget);
                trace!(vertex = %v.id(), reason = %budget.reason(), "writable lock not acquired");
                break false;
            }
        };
        if requested {
            self.withdraw_write_request(v.id());
        }
        if let (true, Some(h)) = (yielded, held) {
            self.reclaim_inarcs(h);
        }
        granted
    }

    /// Release one writable level of `v`.
    ///
    /// # Panics
    ///
    /// If this thread does not hold `v` writable.
    pub(crate) fn unlock_writable(&mut self, v: &VertexHandle) -> Result<()> {
        self.release_writable(v, CommitKind::Vertex)
    }

    pub(crate) fn release_writable(&mut self, v: &VertexHandle, kind: CommitKind) -> Result<()> {
        let tid = ThreadId::current();
        let Some(d) = self.descriptor_mut(v.id()) else {
            panic!("writable unlock of unindexed vertex {}", v.id());
        };
        let LockMode::Writable { owner, recursion } = d.lock else {
            panic!("vertex {} is not locked writable", v.id());
        };
        if owner != tid {
            panic!("vertex {} is locked writable by {owner}, not {tid}", v.id());
        }
        if recursion > 1 {
            d.lock = LockMode::Writable { owner, recursion: recursion - 1 };
            return Ok(());
        }
        if d.inarcs.yielded {
            self.reclaim_inarcs(v);
        }
        let committed = self.commit(v, kind);
        if let Some(d) = self.descriptor_mut(v.id()) {
            d.lock = LockMode::Unlocked;
            d.operation_open = false;
            d.context = VertexContext::Active;
        }
        self.n_writable -= 1;
        self.check_isolation(v);
        self.notify();
        committed
    }

    fn commit(&self, v: &VertexHandle, kind: CommitKind) -> Result<()> {
        let hooks = &self.graph.hooks;
        let result = match (v.take_modified(), kind) {
            (false, _) => hooks.close_vertex(v),
            (true, CommitKind::Vertex) => hooks.commit_vertex(v),
            (true, CommitKind::Inarcs) => hooks.commit_inarcs(v),
        };
        result.map_err(|message| {
            error!(vertex = %v.id(), %message, "commit failed");
            Error::Commit(message)
        })
    }

    /// Unindex an unlocked Virtual vertex that no arc names any more.
    ///
    /// A vertex with arcs but no arc references has corrupt refcounts:
    /// fatal in debug builds, corrected and logged otherwise.
    pub(crate) fn check_isolation(&mut self, v: &VertexHandle) {
        let Some(d) = self.descriptor(v.id()) else {
            return;
        };
        if d.is_locked() || v.arc_refs() != 0 {
            return;
        }
        let manifestation = d.manifestation;
        let degree = v.degree();
        if degree != 0 {
            if cfg!(debug_assertions) {
                panic!("vertex {} has degree {degree} but no arc references", v.id());
            }
            error!(vertex = %v.id(), degree, "CRITICAL vertex has arcs but no arc references");
            v.correct_arc_refs(degree);
            return;
        }
        if matches!(manifestation, Manifestation::Virtual | Manifestation::Null) {
            self.index.remove(v.id());
            trace!(vertex = %v.id(), "isolated virtual vertex unindexed");
        }
    }

    // ------------------------------------------------------------------------
    // Readonly
    // ------------------------------------------------------------------------

    fn try_lock_readonly(&mut self, id: VertexId, tid: ThreadId) -> Attempt {
        let reentrancy = self.graph.config.reentrancy_limit;
        let readers_limit = self.graph.config.readers_limit;
        let Some(d) = self.descriptor_mut(id) else {
            return Attempt::Refused(AccessReason::NoExist);
        };
        match d.lock {
            LockMode::Writable { owner, recursion } if owner == tid => {
                if recursion >= reentrancy {
                    return Attempt::Refused(AccessReason::Semaphore);
                }
                d.lock = LockMode::Writable { owner, recursion: recursion + 1 };
                Attempt::Reentrant
            }
            LockMode::Writable { .. } => Attempt::Wait,
            LockMode::Unlocked => {
                d.lock = LockMode::Readonly { readers: 1 };
                Attempt::Granted
            }
            LockMode::Readonly { readers } if readers >= readers_limit => Attempt::Refused(AccessReason::Semaphore),
            LockMode::Readonly { readers } => {
                d.lock = LockMode::Readonly { readers: readers + 1 };
                Attempt::Granted
            }
        }
    }

    /// Lock `v` readonly. Under this thread's own writable lock this only
    /// adds a recursion level.
    pub(crate) fn lock_readonly(&mut self, v: &VertexHandle, budget: &mut TimingBudget) -> bool {
        let tid = ThreadId::current();
        loop {
            match self.try_lock_readonly(v.id(), tid) {
                Attempt::Granted | Attempt::Reentrant => return true,
                Attempt::Refused(reason) => {
                    budget.set_reason(reason);
                    return false;
                }
                Attempt::Wait => {}
            }
            if !self.wait(budget) {
                budget.set_wait_failure();
                trace!(vertex = %v.id(), reason = %budget.reason(), "readonly lock not acquired");
                return false;
            }
        }
    }

    /// # Panics
    ///
    /// If `v` is neither readonly nor writable by this thread.
    pub(crate) fn unlock_readonly(&mut self, v: &VertexHandle) -> Result<()> {
        let tid = ThreadId::current();
        let Some(d) = self.descriptor_mut(v.id()) else {
            panic!("readonly unlock of unindexed vertex {}", v.id());
        };
        match d.lock {
            LockMode::Readonly { readers: 1 } => {
                d.lock = LockMode::Unlocked;
                self.check_isolation(v);
                self.notify();
            }
            LockMode::Readonly { readers } => d.lock = LockMode::Readonly { readers: readers - 1 },
            LockMode::Writable { owner, .. } if owner == tid => return self.unlock_writable(v),
            mode => panic!("readonly unlock of vertex {} in mode {mode:?}", v.id()),
        }
        Ok(())
    }

    /// Turn this thread's single readonly hold into a writable lock.
    ///
    /// The caller must hold exactly one readonly reference.
    pub(crate) fn escalate(&mut self, v: &VertexHandle, budget: &mut TimingBudget) -> bool {
        let tid = ThreadId::current();
        let mut requested = false;
        let granted = loop {
            if self.readonly.readonly {
                budget.set_reason(AccessReason::ReadonlyGraph);
                break false;
            }
            let Some(d) = self.descriptor_mut(v.id()) else {
                budget.set_reason(AccessReason::NoExist);
                break false;
            };
            match d.lock {
                LockMode::Writable { owner, .. } if owner == tid => break true,
                LockMode::Readonly { readers: 1 } => {
                    d.lock = LockMode::Writable { owner: tid, recursion: 1 };
                    break self.open_writable(v, LockMode::Readonly { readers: 1 }, budget);
                }
                LockMode::Readonly { .. } => {}
                mode => panic!("escalate of vertex {} in mode {mode:?}", v.id()),
            }
            if !requested {
                self.request_write(v.id());
                requested = true;
            }
            if !self.wait(budget) {
                self.wait_failure(budget);
                break false;
            }
        };
        if requested {
            self.withdraw_write_request(v.id());
        }
        granted
    }

    /// Turn this thread's writable lock into a single readonly hold.
    ///
    /// With recursion above one this only releases a level and returns
    /// `false`.
    pub(crate) fn relax(&mut self, v: &VertexHandle) -> Result<bool> {
        let tid = ThreadId::current();
        let Some(d) = self.descriptor_mut(v.id()) else {
            panic!("relax of unindexed vertex {}", v.id());
        };
        let LockMode::Writable { owner, recursion } = d.lock else {
            panic!("relax of vertex {} not locked writable", v.id());
        };
        if owner != tid {
            panic!("relax of vertex {} owned by {owner}", v.id());
        }
        if recursion > 1 {
            d.lock = LockMode::Writable { owner, recursion: recursion - 1 };
            return Ok(false);
        }
        if d.inarcs.yielded {
            self.reclaim_inarcs(v);
        }
        let committed = self.commit(v, CommitKind::Vertex);
        if let Some(d) = self.descriptor_mut(v.id()) {
            d.lock = LockMode::Readonly { readers: 1 };
            d.operation_open = false;
            d.context = VertexContext::Active;
        }
        self.n_writable -= 1;
        self.notify();
        committed.map(|()| true)
    }

    // ------------------------------------------------------------------------
    // Inarcs yield / borrow
    // ------------------------------------------------------------------------

    /// Lend the inarcs of `v` while this thread waits elsewhere.
    ///
    /// Returns `false` if they were already yielded.
    ///
    /// # Panics
    ///
    /// If this thread does not hold `v` writable.
    pub(crate) fn yield_inarcs(&mut self, v: &VertexHandle) -> bool {
        let tid = ThreadId::current();
        let Some(d) = self.descriptor_mut(v.id()) else {
            panic!("yield of unindexed vertex {}", v.id());
        };
        if !d.is_writable_by(tid) {
            panic!("yield of inarcs of {} without the writable lock", v.id());
        }
        if d.inarcs.yielded {
            return false;
        }
        d.inarcs.yielded = true;
        self.notify();
        true
    }

    /// Take back yielded inarcs, waiting for a borrower to return them.
    pub(crate) fn reclaim_inarcs(&mut self, v: &VertexHandle) {
        let forever = TimingBudget::infinite();
        loop {
            let Some(d) = self.descriptor_mut(v.id()) else {
                return;
            };
            if !d.inarcs.is_busy() {
                d.inarcs.yielded = false;
                return;
            }
            self.wait(&forever);
        }
    }

    /// Yield the inarcs of `v`, pause with the state lock released, reclaim.
    pub(crate) fn yield_and_wait(&mut self, v: &VertexHandle, pause: Duration) {
        let yielded = self.descriptor(v.id()).is_some_and(|d| d.is_writable_by(ThreadId::current())) && self.yield_inarcs(v);
        self.suspend(|| std::thread::sleep(pause));
        if yielded {
            self.reclaim_inarcs(v);
        }
    }

    /// Obtain write access to the inarcs of `head` on behalf of `tail`.
    ///
    /// Borrows yielded inarcs from another owner, or locks `head` writable.
    /// While waiting, the inarcs of `tail` are yielded if this thread owns
    /// it writable; they stay yielded until the caller has released the
    /// head access, then the caller reclaims them.
    pub(crate) fn lock_head_inarcs(
        &mut self,
        tail: &VertexHandle,
        head: &VertexHandle,
        budget: &mut TimingBudget,
    ) -> Option<HeadInarcs> {
        if head.id() == tail.id() {
            self.reclaim_inarcs(tail);
            return Some(HeadInarcs { access: InarcsAccess::Reentrant, tail_yielded: false });
        }
        let tid = ThreadId::current();
        let owns_tail = self.descriptor(tail.id()).is_some_and(|d| d.is_writable_by(tid));
        let mut requested = false;
        let mut yielded = false;
        let access = loop {
            let readonly = self.readonly;
            let Some(d) = self.descriptor_mut(head.id()) else {
                budget.set_reason(AccessReason::NoExist);
                break None;
            };
            match d.lock {
                LockMode::Writable { owner, .. } if owner == tid => break Some(InarcsAccess::Reentrant),
                LockMode::Writable { .. } if d.inarcs_borrowable() => {
                    d.inarcs.borrower = Some(tid);
                    break Some(InarcsAccess::Borrowed);
                }
                LockMode::Unlocked if readonly.readonly => {
                    budget.set_reason(AccessReason::ReadonlyGraph);
                    break None;
                }
                LockMode::Unlocked if !readonly.transition => {
                    d.lock = LockMode::Writable { owner: tid, recursion: 1 };
                    if self.open_writable(head, LockMode::Unlocked, budget) {
                        break Some(InarcsAccess::Full);
                    }
                    break None;
                }
                _ => {}
            }
            if !requested {
                self.request_write(head.id());
                requested = true;
            }
            if owns_tail && !yielded {
                yielded = self.yield_inarcs(tail);
            }
            if !self.wait(budget) {
                self.wait_failure(budget);
                break None;
            }
        };
        if requested {
            self.withdraw_write_request(head.id());
        }
        match access {
            Some(access) => Some(HeadInarcs { access, tail_yielded: yielded }),
            None => {
                if yielded {
                    self.reclaim_inarcs(tail);
                }
                trace!(tail = %tail.id(), head = %head.id(), reason = %budget.reason(), "head inarcs not acquired");
                None
            }
        }
    }

    /// Give back inarcs access obtained by [`lock_head_inarcs`](Self::lock_head_inarcs).
    pub(crate) fn unlock_head_inarcs(&mut self, head: &VertexHandle, access: InarcsAccess) -> Result<()> {
        match access {
            InarcsAccess::Reentrant => Ok(()),
            InarcsAccess::Borrowed => {
                if let Some(d) = self.descriptor_mut(head.id()) {
                    d.inarcs.borrower = None;
                }
                self.notify();
                Ok(())
            }
            InarcsAccess::Full => self.release_writable(head, CommitKind::Inarcs),
        }
    }
}

//! Bulk and filtered arc deletion.
//!
//! Deletion is count-then-mutate: matches are counted first, the other
//! side of the arcs is asked to disconnect exactly that many, and only
//! when it confirms all of them are the local entries erased. A partial
//! confirmation is a consistency failure; a zero confirmation while the
//! other side is busy is retried within the caller's budget.

use std::time::Duration;

use tracing::{error, trace};

use super::arcvector::{ArcArray, ArcEntry};
use super::framehash::{FrameHash, Visit};
use crate::graph::{AccessReason, TimingBudget};
use crate::model::{match_generic, Predicator, VertexHandle};

/// Callback driven by the delete engine before local entries are erased.
pub trait ArcDisconnect {
    /// Account for `n` arcs naming `named` that match `probe` and are about
    /// to be erased locally: remove their counterparts on the other side
    /// and drop `n` references on `named`.
    ///
    /// Returns the number confirmed (`n` on success), 0 if the other side
    /// could not be reached within `budget`, or -1 on failure.
    fn disconnect(&mut self, named: &VertexHandle, probe: Predicator, n: i64, budget: &mut TimingBudget) -> i64;

    /// Called between delete passes when some arcs were pending.
    fn backoff(&mut self, _budget: &mut TimingBudget) {
        std::thread::sleep(Duration::from_millis(1));
    }
}

/// Disconnect for entries that have no other side: only drops the
/// references held on the named vertex.
#[derive(Debug, Default, Clone, Copy)]
pub struct DecrefEvent;

impl ArcDisconnect for DecrefEvent {
    fn disconnect(&mut self, named: &VertexHandle, _probe: Predicator, n: i64, _budget: &mut TimingBudget) -> i64 {
        named.decref_arcs(n);
        n
    }
}

/// Outcome of asking the other side to disconnect a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Reconciled {
    Done,
    /// Other side busy; retry later.
    Pending,
    Failed,
}

pub(crate) fn disconnect_exact(
    disconnect: &mut dyn ArcDisconnect,
    named: &VertexHandle,
    probe: Predicator,
    n: i64,
    budget: &mut TimingBudget,
) -> Reconciled {
    let confirmed = disconnect.disconnect(named, probe, n, budget);
    if confirmed == n {
        Reconciled::Done
    } else if confirmed == 0 && budget.reason().is_retryable() {
        trace!(vertex = %named.id(), n, reason = %budget.reason(), "disconnect pending");
        Reconciled::Pending
    } else if confirmed <= 0 {
        Reconciled::Failed
    } else {
        error!(
            vertex = %named.id(),
            expected = n,
            confirmed,
            "CRITICAL asymmetric arc removal"
        );
        budget.set_reason(AccessReason::ArcError);
        Reconciled::Failed
    }
}

/// Tallies kept across a delete pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteCount {
    pub deleted: i64,
    /// Matched, but the other side was busy.
    pub pending: i64,
    pub errors: i64,
}

impl DeleteCount {
    fn add(&mut self, other: DeleteCount) {
        self.deleted += other.deleted;
        self.pending += other.pending;
        self.errors += other.errors;
    }

    /// 1/0/-1 style result: deleted count, or -1 on any error.
    pub fn into_sentinel(self) -> i64 {
        if self.errors > 0 { -1 } else { self.deleted }
    }
}

/// Delete predicators matching `probe` from one neighbor's predicator map.
///
/// Erases cells without compacting the map.
pub fn delete_predicators(
    named: &VertexHandle,
    map: &mut FrameHash<u64, Predicator>,
    probe: Predicator,
    disconnect: &mut dyn ArcDisconnect,
    budget: &mut TimingBudget,
) -> DeleteCount {
    let n = map.values().filter(|p| match_generic(probe, **p)).count() as i64;
    if n == 0 {
        return DeleteCount::default();
    }
    match disconnect_exact(disconnect, named, probe, n, budget) {
        Reconciled::Done => {
            let erased = map.visit(|_, p| if match_generic(probe, *p) { Visit::Delete } else { Visit::Keep });
            debug_assert_eq!(erased as i64, n);
            DeleteCount { deleted: n, ..Default::default() }
        }
        Reconciled::Pending => DeleteCount { pending: n, ..Default::default() },
        Reconciled::Failed => DeleteCount { errors: n, ..Default::default() },
    }
}

/// Delete arcs matching `probe` to every neighbor in a multi-arc map.
///
/// Retries pending neighbors after [`ArcDisconnect::backoff`] until the
/// budget runs out. Returns the number deleted, or -1 on error or timeout.
/// The caller down-converts the cell afterwards.
pub fn delete_arcs(
    array: &mut ArcArray,
    probe: Predicator,
    disconnect: &mut dyn ArcDisconnect,
    budget: &mut TimingBudget,
) -> i64 {
    let mut total = 0;
    let result = loop {
        let mut pass = DeleteCount::default();
        array.slots.visit(|_, slot| match &mut slot.entry {
            ArcEntry::Single(p) => {
                if !match_generic(probe, *p) {
                    return Visit::Keep;
                }
                match disconnect_exact(disconnect, &slot.vertex, *p, 1, budget) {
                    Reconciled::Done => {
                        pass.deleted += 1;
                        Visit::Delete
                    }
                    Reconciled::Pending => {
                        pass.pending += 1;
                        Visit::Keep
                    }
                    Reconciled::Failed => {
                        pass.errors += 1;
                        Visit::Keep
                    }
                }
            }
            ArcEntry::Multiple(map) => {
                pass.add(delete_predicators(&slot.vertex, map, probe, disconnect, budget));
                if map.is_empty() { Visit::Delete } else { Visit::Keep }
            }
        });
        array.degree -= pass.deleted;
        total += pass.deleted;

        if pass.errors > 0 {
            break -1;
        }
        if pass.pending == 0 {
            break total;
        }
        if budget.is_expired() {
            budget.set_wait_failure();
            break -1;
        }
        trace!(pending = pass.pending, deleted = total, "delete pass incomplete, backing off");
        budget.clear_reason();
        disconnect.backoff(budget);
    };
    array.normalize();
    array.slots.compact();
    result
}

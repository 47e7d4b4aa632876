//! Removal of arcs whose expiration time has passed.

use tracing::{debug, trace};

use super::connect::ReverseDisconnect;
use super::guard::{LockedVertex, WritableVertex};
use super::timing::TimingBudget;
use super::Graph;
use crate::model::{Predicator, TIME_EXPIRES_NEVER};
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpireOutcome {
    /// Predicators removed, timestamps included.
    pub n_expired: i64,
    /// Earliest remaining expiration, [`TIME_EXPIRES_NEVER`] if none.
    pub next_ts: u32,
}

impl Graph {
    /// Remove every relationship from `tail` whose expiration time is at or
    /// before `now`.
    ///
    /// Each removal is attempted without waiting. A relationship whose head
    /// is busy stays and is rescheduled for `now`.
    pub fn expire_arcs(&self, tail: &WritableVertex<'_>, now: u32) -> Result<ExpireOutcome> {
        let handle = tail.handle();
        let mut due = Vec::new();
        let mut next_ts = TIME_EXPIRES_NEVER;
        for arc in handle.outarcs.read().arcs() {
            if !arc.predicator.is_expiration() {
                continue;
            }
            let ts = arc.predicator.as_u32();
            if ts <= now {
                due.push((arc.vertex, arc.predicator.relationship()));
            } else {
                next_ts = next_ts.min(ts);
            }
        }

        let mut n_expired = 0;
        for (head, rel) in due {
            let mut budget = TimingBudget::zero();
            let mut reverse = ReverseDisconnect::new(self, handle);
            let n = handle.outarcs.write().remove(Some(&head), Predicator::relationship_probe(rel), &mut reverse, &mut budget);
            if n > 0 {
                n_expired += n;
                self.inner.n_arcs_fwd.fetch_sub(n, std::sync::atomic::Ordering::AcqRel);
                handle.mark_modified();
                trace!(tail = %handle.id(), head = %head.id(), %rel, n, "arcs expired");
            } else {
                debug!(tail = %handle.id(), head = %head.id(), reason = %budget.reason(), "expiration deferred");
                next_ts = now;
            }
        }

        handle.attributes_mut().tmx = next_ts;
        if next_ts != TIME_EXPIRES_NEVER {
            self.inner.scheduler.schedule_expiration(handle.id(), next_ts);
        }
        Ok(ExpireOutcome { n_expired, next_ts })
    }
}

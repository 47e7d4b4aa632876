//! Arc write path and reverse-arc coordination.
//!
//! Writing `A -[p]-> B` stores `p` (direction out) in A's outarcs and its
//! reverse (direction in) in B's inarcs, or only bumps B's indegree
//! counter when `p` is forward-only. Both vertices are locked writable by
//! the caller.
//!
//! Removal only needs the tail locked. The delete engine asks a
//! [`ReverseDisconnect`] to remove the reverse entries first; it reaches
//! the head's inarcs by borrowing them from a yielding owner or by locking
//! the head itself.

use std::sync::atomic::Ordering;
use std::time::Duration;

use tracing::{debug, error, trace, warn};

use super::guard::{LockedVertex, WritableVertex};
use super::timing::{AccessReason, TimingBudget};
use super::{now_secs, Graph};
use crate::model::{
    ArcDirection, ArcHead, Manifestation, Modifier, Predicator, VertexHandle, VertexSpec,
};
use crate::storage::{ArcDisconnect, DecrefEvent};
use crate::{Error, Result};

// ============================================================================
// Options and outcomes
// ============================================================================

/// Existence condition checked before an arc is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreateCondition {
    /// Matched against the existing arcs from tail to head.
    pub probe: Predicator,
    /// Write only when nothing matches.
    pub absent: bool,
}

/// Options for [`Graph::create_arc`] and [`Graph::connect`].
#[derive(Debug, Clone, PartialEq)]
pub struct ArcCreate {
    /// Lifespan of an automatically timestamped arc, in seconds.
    pub lifespan_secs: Option<u32>,
    pub condition: Option<CreateCondition>,
    /// Clock override, seconds since the epoch.
    pub now: Option<u32>,
    /// Manifestation of a terminal created by [`Graph::connect`].
    pub terminal: Manifestation,
    pub timeout_ms: Option<u64>,
}

impl Default for ArcCreate {
    fn default() -> Self {
        Self { lifespan_secs: None, condition: None, now: None, terminal: Manifestation::Virtual, timeout_ms: None }
    }
}

impl ArcCreate {
    pub fn with_lifespan(mut self, secs: u32) -> Self {
        self.lifespan_secs = Some(secs);
        self
    }

    /// Write only if an arc matching `probe` already exists.
    pub fn if_exists(mut self, probe: Predicator) -> Self {
        self.condition = Some(CreateCondition { probe, absent: false });
        self
    }

    /// Write only if no arc matching `probe` exists.
    pub fn if_absent(mut self, probe: Predicator) -> Self {
        self.condition = Some(CreateCondition { probe, absent: true });
        self
    }

    pub fn at(mut self, now: u32) -> Self {
        self.now = Some(now);
        self
    }

    pub fn with_terminal(mut self, terminal: Manifestation) -> Self {
        self.terminal = terminal;
        self
    }

    pub fn with_timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = Some(ms);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArcWrite {
    /// `n_added` is 0 when an arc with the same key was updated.
    Written { n_added: i64, stored: Predicator },
    ConditionNotMet,
}

// ============================================================================
// Disconnect callbacks
// ============================================================================

/// Removes the reverse entries in a head's inarcs on behalf of a tail
/// whose outarcs are being deleted.
pub(crate) struct ReverseDisconnect<'a> {
    graph: &'a Graph,
    tail: &'a VertexHandle,
    pause: Duration,
}

impl<'a> ReverseDisconnect<'a> {
    pub(crate) fn new(graph: &'a Graph, tail: &'a VertexHandle) -> Self {
        Self { graph, tail, pause: Duration::from_millis(graph.inner.config.backoff_ms) }
    }
}

impl ArcDisconnect for ReverseDisconnect<'_> {
    fn disconnect(&mut self, named: &VertexHandle, probe: Predicator, n: i64, budget: &mut TimingBudget) -> i64 {
        let inner = &self.graph.inner;
        let tail = self.tail;
        let mut state = inner.lock_state();
        let Some(head) = state.lock_head_inarcs(tail, named, budget) else {
            return 0;
        };
        let (removed, regular) = state.suspend(|| {
            let mut inarcs = named.inarcs.write();
            if inarcs.is_indegree_counter() {
                let taken = inarcs.decrement_indegree_counter(n);
                tail.decref_arcs(taken);
                (taken, false)
            } else {
                (inarcs.remove(Some(tail), probe, &mut DecrefEvent, &mut TimingBudget::zero()), true)
            }
        });
        let confirmed = if removed == n {
            named.decref_arcs(n);
            named.mark_modified();
            if regular {
                inner.n_arcs_rev.fetch_sub(n, Ordering::AcqRel);
            }
            n
        } else {
            error!(
                tail = %tail.id(),
                head = %named.id(),
                expected = n,
                removed,
                "CRITICAL reverse arc count mismatch"
            );
            budget.set_reason(AccessReason::ArcError);
            -1
        };
        if let Err(e) = state.unlock_head_inarcs(named, head.access) {
            warn!(head = %named.id(), error = %e, "inarcs commit failed after reverse removal");
        }
        if head.tail_yielded {
            state.reclaim_inarcs(tail);
        }
        confirmed
    }

    fn backoff(&mut self, _budget: &mut TimingBudget) {
        self.graph.inner.lock_state().yield_and_wait(self.tail, self.pause);
    }
}

/// Removes the forward entries in a tail's outarcs on behalf of a head
/// whose inarcs are being deleted.
///
/// The head's inarcs are physically held while this runs, so they are
/// never yielded here; contention is resolved by timing out and retrying.
struct ForwardDisconnect<'a> {
    graph: &'a Graph,
    head: &'a VertexHandle,
}

impl ArcDisconnect for ForwardDisconnect<'_> {
    fn disconnect(&mut self, named: &VertexHandle, probe: Predicator, n: i64, budget: &mut TimingBudget) -> i64 {
        let inner = &self.graph.inner;
        let head = self.head;
        let mut state = inner.lock_state();
        if !state.lock_writable(named, budget) {
            return 0;
        }
        let removed = state.suspend(|| {
            named.outarcs.write().remove(Some(head), probe, &mut DecrefEvent, &mut TimingBudget::zero())
        });
        let confirmed = if removed == n {
            named.decref_arcs(n);
            named.mark_modified();
            inner.n_arcs_fwd.fetch_sub(n, Ordering::AcqRel);
            n
        } else {
            error!(
                tail = %named.id(),
                head = %head.id(),
                expected = n,
                removed,
                "CRITICAL forward arc count mismatch"
            );
            budget.set_reason(AccessReason::ArcError);
            -1
        };
        if let Err(e) = state.unlock_writable(named) {
            warn!(tail = %named.id(), error = %e, "commit failed after forward removal");
        }
        confirmed
    }
}

// ============================================================================
// Graph arc API
// ============================================================================

impl Graph {
    /// Write `tail -[predicator]-> head`. For a self-loop pass the same
    /// guard twice.
    pub fn create_arc(
        &self,
        tail: &WritableVertex<'_>,
        head: &WritableVertex<'_>,
        predicator: Predicator,
        opts: &ArcCreate,
    ) -> Result<ArcWrite> {
        let (tail, head) = (tail.handle(), head.handle());
        let rel = predicator.relationship();
        if !rel.is_valid() || predicator.is_synthetic() {
            return Err(Error::VertexArc(format!("relationship {rel} cannot be written")));
        }
        if let Some(cond) = &opts.condition {
            let exists = tail.outarcs.read().count_matching(Some(head.id()), cond.probe) > 0;
            if exists == cond.absent {
                trace!(tail = %tail.id(), head = %head.id(), "arc condition not met");
                return Ok(ArcWrite::ConditionNotMet);
            }
        }

        let now = opts.now.unwrap_or_else(now_secs);
        let modifier = predicator.modifier();
        let auto = predicator.is_auto_timestamps();
        if auto && matches!(modifier, Modifier::TimeCreated | Modifier::TimeModified) {
            return Err(Error::VertexArc("manual creation or modification time with automatic timestamps".into()));
        }
        if opts.lifespan_secs.is_some() && modifier == Modifier::TimeExpires {
            return Err(Error::VertexArc("manual expiration time with a lifespan".into()));
        }
        let created_probe = Predicator::key_probe(rel, Modifier::TimeCreated);
        if modifier == Modifier::TimeCreated && tail.outarcs.read().get_arc(head.id(), created_probe).is_some() {
            return Err(Error::VertexArc(format!("arc {rel} to {} already has a creation time", head.identifier())));
        }
        let forward_only = predicator.is_forward_only();
        self.check_head_class(head, forward_only)?;

        let written = self.write_arc(tail, head, predicator)?;
        if auto {
            let stamp = |m: Modifier, ts: u32| {
                let p = Predicator::new(rel, m, ts);
                if forward_only { p.forward_only() } else { p }
            };
            if tail.outarcs.read().get_arc(head.id(), created_probe).is_none() {
                self.write_arc(tail, head, stamp(Modifier::TimeCreated, now))?;
            }
            self.write_arc(tail, head, stamp(Modifier::TimeModified, now))?;
            if let Some(lifespan) = opts.lifespan_secs {
                self.write_arc(tail, head, stamp(Modifier::TimeExpires, now.saturating_add(lifespan)))?;
            }
        }
        tail.attributes_mut().tmm = now;
        Ok(written)
    }

    /// A head receives either forward-only arcs or regular arcs.
    fn check_head_class(&self, head: &VertexHandle, forward_only: bool) -> Result<()> {
        let inarcs = head.inarcs.read();
        if (forward_only && inarcs.has_regular_arcs()) || (!forward_only && inarcs.is_indegree_counter()) {
            return Err(Error::VertexArc(format!(
                "{} cannot mix forward-only and regular inbound arcs",
                head.identifier()
            )));
        }
        Ok(())
    }

    fn write_arc(&self, tail: &VertexHandle, head: &VertexHandle, predicator: Predicator) -> Result<ArcWrite> {
        let stored = predicator.into_stored(ArcDirection::Out);
        let n = tail.outarcs.read().would_add(head.id(), stored);
        let reverse = if stored.is_stored_forward_only() {
            if n > 0 && !head.inarcs.write().increment_indegree_counter(n) {
                return Err(Error::VertexArc(format!("{} holds regular inbound arcs", head.identifier())));
            }
            None
        } else {
            let rev = head.inarcs.write().set_arc(tail, predicator.into_stored(ArcDirection::In));
            if rev.n_added != n {
                error!(
                    tail = %tail.id(),
                    head = %head.id(),
                    forward = n,
                    reverse = rev.n_added,
                    "CRITICAL reverse arc insert mismatch"
                );
                return Err(Error::ArcVector(format!("reverse insert mismatch {} -> {}", tail.id(), head.id())));
            }
            self.inner.n_arcs_rev.fetch_add(n, Ordering::AcqRel);
            Some(rev.stored)
        };
        // Reverse entry, or the artificial reference of a forward-only arc.
        tail.incref_arcs(n);

        let set = tail.outarcs.write().set_arc(head, stored);
        head.incref_arcs(set.n_added);
        self.inner.n_arcs_fwd.fetch_add(set.n_added, Ordering::AcqRel);
        if let Some(rev) = reverse {
            if !Predicator::data_match(rev, set.stored) {
                error!(tail = %tail.id(), head = %head.id(), %rev, fwd = %set.stored, "CRITICAL reverse arc data mismatch");
            }
        }
        tail.mark_modified();
        head.mark_modified();
        if set.stored.is_expiration() {
            self.track_expiration(tail, set.stored.as_u32());
        }
        Ok(ArcWrite::Written { n_added: set.n_added, stored: set.stored })
    }

    /// Lower the tail's earliest expiration and tell the scheduler.
    pub(crate) fn track_expiration(&self, tail: &VertexHandle, tmx: u32) {
        let mut attributes = tail.attributes_mut();
        if tmx < attributes.tmx {
            attributes.tmx = tmx;
            drop(attributes);
            self.inner.scheduler.schedule_expiration(tail.id(), tmx);
        }
    }

    /// Lock both endpoints (creating them as needed) and write the arc.
    pub fn connect(&self, tail: &str, head: &str, predicator: Predicator, opts: &ArcCreate) -> Result<ArcWrite> {
        let timeout = opts.timeout_ms.unwrap_or(self.inner.config.default_timeout_ms);
        if tail == head {
            let v = self.create_vertex(tail, VertexSpec::new())?;
            let w = self.lock_writable(&v, timeout)?;
            self.realize(&v);
            return self.create_arc(&w, &w, predicator, opts);
        }
        let (t, h) = self.acquire_initial_and_terminal_writable(tail, head, opts.terminal, timeout)?;
        self.create_arc(&t, &h, predicator, opts)
    }

    fn realize(&self, v: &VertexHandle) {
        if let Some(d) = self.inner.lock_state().descriptor_mut(v.id()) {
            if d.manifestation == Manifestation::Virtual {
                d.manifestation = Manifestation::Real;
            }
        }
    }

    /// Remove outarcs of `tail` matching `probe`, to `head` or to every
    /// neighbor. Returns the number of arcs removed.
    pub fn remove_arc(
        &self,
        tail: &WritableVertex<'_>,
        head: Option<&VertexHandle>,
        probe: Predicator,
        timeout_ms: u64,
    ) -> Result<i64> {
        let tail = tail.handle();
        let mut budget = TimingBudget::from_millis(timeout_ms);
        let mut reverse = ReverseDisconnect::new(self, tail);
        let n = tail.outarcs.write().remove(head, probe, &mut reverse, &mut budget);
        let n = removal_result(n, &budget, tail)?;
        self.inner.n_arcs_fwd.fetch_sub(n, Ordering::AcqRel);
        Ok(n)
    }

    pub fn remove_outarcs(&self, tail: &WritableVertex<'_>, probe: Predicator, timeout_ms: u64) -> Result<i64> {
        self.remove_arc(tail, None, probe, timeout_ms)
    }

    /// Remove inarcs of `head` matching `probe`, from `tail` or from every
    /// neighbor. Each tail is locked writable while its outarcs change.
    pub fn remove_inarcs(
        &self,
        head: &WritableVertex<'_>,
        tail: Option<&VertexHandle>,
        probe: Predicator,
        timeout_ms: u64,
    ) -> Result<i64> {
        let head = head.handle();
        if head.inarcs.read().is_indegree_counter() {
            return Err(Error::VertexArc(format!(
                "forward-only arcs into {} can only be removed from their tails",
                head.identifier()
            )));
        }
        let mut budget = TimingBudget::from_millis(timeout_ms);
        let mut forward = ForwardDisconnect { graph: self, head };
        let n = head.inarcs.write().remove(tail, probe, &mut forward, &mut budget);
        let n = removal_result(n, &budget, head)?;
        self.inner.n_arcs_rev.fetch_sub(n, Ordering::AcqRel);
        Ok(n)
    }

    /// Remove arcs `tail -> head` matching `probe`, locking only the tail.
    pub fn disconnect(&self, tail: &str, head: &str, probe: Predicator, timeout_ms: u64) -> Result<i64> {
        let (Some(t), Some(h)) = (self.vertex(tail), self.vertex(head)) else {
            return Ok(0);
        };
        let w = self.lock_writable(&t, timeout_ms)?;
        self.remove_arc(&w, Some(&h), probe, timeout_ms)
    }

    /// First arc from `tail` to `head` matching `probe`.
    pub fn get_arc(&self, tail: &impl LockedVertex, head: &VertexHandle, probe: Predicator) -> Option<ArcHead> {
        tail.outarcs.read().get_arc(head.id(), probe)
    }

    /// Stored predicator of the first arc from `tail` to `head` matching `probe`.
    pub fn get_arc_value(&self, tail: &impl LockedVertex, head: &VertexHandle, probe: Predicator) -> Option<Predicator> {
        self.get_arc(tail, head, probe).map(|h| h.predicator)
    }
}

/// Turn a delete-engine sentinel into a result.
fn removal_result(n: i64, budget: &TimingBudget, owner: &VertexHandle) -> Result<i64> {
    let reason = budget.reason();
    if n < 0 {
        debug!(vertex = %owner.id(), %reason, "arc removal failed");
        return Err(match reason {
            AccessReason::None | AccessReason::ArcError => {
                Error::ArcVector(format!("arc removal from {} failed", owner.identifier()))
            }
            reason => Error::access(reason, format!("arc removal from {}", owner.identifier())),
        });
    }
    if n == 0 && reason.is_retryable() {
        return Err(Error::access(reason, format!("arc removal from {} deferred", owner.identifier())));
    }
    if n > 0 {
        owner.mark_modified();
    }
    Ok(n)
}

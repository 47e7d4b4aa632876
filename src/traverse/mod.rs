//! # Neighborhood Traversal
//!
//! Walks the arcvector(s) of a locked anchor vertex, hands every arc to an
//! [`ArcFilter`] and records hits in a collector:
//!
//! - `StopAtFirst`: existence check, ends on the first hit
//! - `Count`: number of matching arcs
//! - `CollectArcs` / `CollectVertices`: matching arcs or their heads,
//!   optionally narrowed by a second collect filter
//!
//! A neighbor connected by several arcs is filtered once per predicator.
//! Heads are locked readonly only when the filter dereferences them, and
//! released once all of that neighbor's arcs have been visited.
//!
//! Direction `Both` runs the bidirectional pass: an outarc counts only when
//! a reverse inarc with the same key to the same neighbor also matches.

mod cull;

use smallvec::SmallVec;
use tracing::{debug, trace};

use crate::filter::{reverse_filter, ArcFilter, ArcFilterMatch, FilterContext};
use crate::graph::{AccessReason, Graph, LockedVertex};
use crate::model::{ArcDirection, GraphArc, LockableArc, Predicator, VertexHandle};
use crate::storage::NeighborArcs;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CollectorMode {
    StopAtFirst,
    Count,
    #[default]
    CollectArcs,
    CollectVertices,
}

/// What to look for around an anchor vertex.
#[derive(Debug, Clone)]
pub struct NeighborhoodProbe {
    pub direction: ArcDirection,
    /// Filter deciding which arcs are traversed.
    pub traversing: Box<dyn ArcFilter>,
    /// Cheaper filter used instead of `traversing` when nothing is
    /// collected.
    pub conditional: Option<Box<dyn ArcFilter>>,
    /// Narrows what is collected from traversed neighbors.
    pub collect: Option<Box<dyn ArcFilter>>,
    pub mode: CollectorMode,
    /// Overrides the graph's default timeout.
    pub timeout_ms: Option<u64>,
}

impl NeighborhoodProbe {
    pub fn new(direction: ArcDirection, traversing: Box<dyn ArcFilter>) -> Self {
        Self {
            direction,
            traversing,
            conditional: None,
            collect: None,
            mode: CollectorMode::default(),
            timeout_ms: None,
        }
    }

    pub fn with_mode(mut self, mode: CollectorMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_conditional(mut self, filter: Box<dyn ArcFilter>) -> Self {
        self.conditional = Some(filter);
        self
    }

    pub fn with_collect(mut self, filter: Box<dyn ArcFilter>) -> Self {
        self.collect = Some(filter);
        self
    }

    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    fn filter_for(&self, mode: CollectorMode) -> &dyn ArcFilter {
        match (mode, &self.conditional) {
            (CollectorMode::StopAtFirst | CollectorMode::Count, Some(c)) => c.as_ref(),
            _ => self.traversing.as_ref(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TraversalResult {
    /// `Hit` when at least one arc matched, `Error` when the walk was cut
    /// short by a lock failure.
    pub neighborhood_match: ArcFilterMatch,
    /// Matching arcs traversed.
    pub count: i64,
    /// First matching arc in `StopAtFirst` mode.
    pub first: Option<GraphArc>,
    pub arcs: Vec<GraphArc>,
    pub vertices: Vec<VertexHandle>,
    /// Why the walk was cut short when `neighborhood_match` is `Error`.
    pub reason: AccessReason,
}

// ============================================================================
// Collector
// ============================================================================

struct Collector<'p> {
    mode: CollectorMode,
    collect: Option<&'p dyn ArcFilter>,
    result: TraversalResult,
    stop: bool,
}

impl<'p> Collector<'p> {
    fn new(mode: CollectorMode, collect: Option<&'p dyn ArcFilter>) -> Self {
        Self { mode, collect, result: TraversalResult::default(), stop: false }
    }

    fn error(&mut self) {
        self.result.neighborhood_match = ArcFilterMatch::Error;
        self.stop = true;
    }

    /// Count a traversed arc.
    fn hit(&mut self, arc: &GraphArc) {
        self.result.count += 1;
        if self.result.neighborhood_match != ArcFilterMatch::Error {
            self.result.neighborhood_match = ArcFilterMatch::Hit;
        }
        if self.mode == CollectorMode::StopAtFirst {
            self.result.first = Some(arc.clone());
            self.stop = true;
        }
    }

    /// Collect from a neighbor after at least one of its arcs was
    /// traversed. With a collect filter every arc to the neighbor is
    /// re-examined, not only the traversed ones.
    fn collect(
        &mut self,
        ctx: &mut FilterContext<'_>,
        larc: &mut LockableArc,
        matched: &[Predicator],
        all: &[Predicator],
    ) {
        if !matches!(self.mode, CollectorMode::CollectArcs | CollectorMode::CollectVertices) {
            return;
        }
        let chosen: SmallVec<[Predicator; 4]> = match self.collect {
            None => matched.iter().copied().collect(),
            Some(cf) => {
                let mut chosen = SmallVec::new();
                for &p in all {
                    larc.arc.head.predicator = p;
                    match cf.filter(ctx, larc) {
                        ArcFilterMatch::Hit => chosen.push(p),
                        ArcFilterMatch::Miss => {}
                        ArcFilterMatch::Error => return self.error(),
                    }
                }
                chosen
            }
        };
        match self.mode {
            CollectorMode::CollectArcs => {
                for p in chosen {
                    self.push_arc(GraphArc::new(larc.tail().clone(), larc.head().clone(), p));
                }
            }
            _ if !chosen.is_empty() => self.result.vertices.push(larc.head().clone()),
            _ => {}
        }
    }

    fn push_arc(&mut self, arc: GraphArc) {
        self.result.arcs.push(arc);
    }
}

// ============================================================================
// Walks
// ============================================================================

/// Visit every arc of `neighbors` with the probe's filter.
fn walk(
    ctx: &mut FilterContext<'_>,
    tail: &VertexHandle,
    neighbors: &[NeighborArcs],
    filter: &dyn ArcFilter,
    out: &mut Collector<'_>,
    distance: u32,
) {
    if let Some(stages) = filter.cull_stages() {
        return cull::walk_culled(ctx, tail, neighbors, &stages, out, distance);
    }
    let synthetic = filter.evaluator().is_some_and(|ev| ev.synthetic_arcs());
    for n in neighbors {
        if out.stop {
            break;
        }
        let mut larc = LockableArc::new(GraphArc::new(tail.clone(), n.vertex.clone(), Predicator::NONE), distance);
        let mut matched: SmallVec<[Predicator; 2]> = SmallVec::new();
        for &p in &n.predicators {
            visit(ctx, filter, &mut larc, p, &mut matched, out);
            if out.stop {
                break;
            }
        }
        if synthetic && matched.is_empty() && !out.stop {
            visit(ctx, filter, &mut larc, Predicator::synthetic(), &mut matched, out);
        }
        if !matched.is_empty() && !out.stop {
            out.collect(ctx, &mut larc, &matched, &n.predicators);
        }
        ctx.release_head(&mut larc);
    }
}

fn visit(
    ctx: &mut FilterContext<'_>,
    filter: &dyn ArcFilter,
    larc: &mut LockableArc,
    p: Predicator,
    matched: &mut SmallVec<[Predicator; 2]>,
    out: &mut Collector<'_>,
) {
    larc.arc.head.predicator = p;
    match filter.filter(ctx, larc) {
        ArcFilterMatch::Hit => {
            matched.push(p);
            out.hit(&larc.arc);
        }
        ArcFilterMatch::Miss => {}
        ArcFilterMatch::Error => out.error(),
    }
}

/// First arc from `tail` to `head` among `candidates` accepted by `filter`.
fn first_arc_to(
    ctx: &mut FilterContext<'_>,
    tail: &VertexHandle,
    head: &VertexHandle,
    candidates: &[Predicator],
    filter: &dyn ArcFilter,
    distance: u32,
) -> (ArcFilterMatch, Option<Predicator>) {
    let mut larc = LockableArc::new(GraphArc::new(tail.clone(), head.clone(), Predicator::NONE), distance);
    let mut outcome = (ArcFilterMatch::Miss, None);
    for &p in candidates {
        larc.arc.head.predicator = p;
        match filter.filter(ctx, &mut larc) {
            ArcFilterMatch::Miss => continue,
            ArcFilterMatch::Hit => outcome = (ArcFilterMatch::Hit, Some(p)),
            ArcFilterMatch::Error => outcome = (ArcFilterMatch::Error, None),
        }
        break;
    }
    ctx.release_head(&mut larc);
    outcome
}

/// Outarcs confirmed by a reverse inarc with the same key.
///
/// Arcs whose forward and reverse data agree collapse into one arc with
/// direction `Both`; otherwise both arcs are collected.
fn bidirectional(
    ctx: &mut FilterContext<'_>,
    anchor: &VertexHandle,
    filter: &dyn ArcFilter,
    out: &mut Collector<'_>,
    distance: u32,
) {
    let neighbors = anchor.outarcs.read().neighbors();
    for n in &neighbors {
        if out.stop {
            break;
        }
        let mut larc = LockableArc::new(GraphArc::new(anchor.clone(), n.vertex.clone(), Predicator::NONE), distance);
        let mut seen_vertex = false;
        for &p in &n.predicators {
            larc.arc.head.predicator = p;
            match filter.filter(ctx, &mut larc) {
                ArcFilterMatch::Miss => continue,
                ArcFilterMatch::Error => {
                    out.error();
                    break;
                }
                ArcFilterMatch::Hit => {}
            }
            let reverse = reverse_filter(filter, p, n.vertex.id());
            let back = anchor.inarcs.read().arcs_to(n.vertex.id());
            let rp = match first_arc_to(ctx, anchor, &n.vertex, &back, &reverse, distance) {
                (ArcFilterMatch::Hit, Some(rp)) => rp,
                (ArcFilterMatch::Error, _) => {
                    out.error();
                    break;
                }
                _ => continue,
            };
            let forward = GraphArc::new(anchor.clone(), n.vertex.clone(), p);
            out.hit(&forward);
            match out.mode {
                CollectorMode::CollectArcs if Predicator::data_match(p, rp) => {
                    out.push_arc(GraphArc::new(anchor.clone(), n.vertex.clone(), p.with_direction(ArcDirection::Both)));
                }
                CollectorMode::CollectArcs => {
                    out.push_arc(forward);
                    out.push_arc(GraphArc::new(anchor.clone(), n.vertex.clone(), rp));
                }
                CollectorMode::CollectVertices if !seen_vertex => {
                    seen_vertex = true;
                    out.result.vertices.push(n.vertex.clone());
                }
                _ => {}
            }
            if out.stop {
                break;
            }
        }
        ctx.release_head(&mut larc);
    }
}

/// Run `probe` around `anchor` in `mode`. The anchor must be locked.
pub(crate) fn run_probe(
    ctx: &mut FilterContext<'_>,
    anchor: &VertexHandle,
    probe: &NeighborhoodProbe,
    mode: CollectorMode,
    distance: u32,
) -> TraversalResult {
    let filter = probe.filter_for(mode);
    let mut out = Collector::new(mode, probe.collect.as_deref());
    match probe.direction {
        ArcDirection::Both => bidirectional(ctx, anchor, filter, &mut out, distance),
        ArcDirection::Out => {
            let neighbors = anchor.outarcs.read().neighbors();
            walk(ctx, anchor, &neighbors, filter, &mut out, distance);
        }
        ArcDirection::In => {
            let neighbors = anchor.inarcs.read().neighbors();
            walk(ctx, anchor, &neighbors, filter, &mut out, distance);
        }
        ArcDirection::Any => {
            let neighbors = anchor.outarcs.read().neighbors();
            walk(ctx, anchor, &neighbors, filter, &mut out, distance);
            if !out.stop {
                let neighbors = anchor.inarcs.read().neighbors();
                walk(ctx, anchor, &neighbors, filter, &mut out, distance);
            }
        }
    }
    trace!(anchor = %anchor.id(), ?mode, count = out.result.count, distance, "neighborhood visited");
    out.result
}

impl Graph {
    /// Run a neighborhood probe around a locked anchor and return whatever
    /// was collected.
    ///
    /// When a head lock needed by the filter could not be acquired within
    /// the probe's timeout, `neighborhood_match` is `Error`, `reason` says
    /// why, and the counts and collections cover only the arcs visited
    /// before the failure.
    pub fn walk_neighborhood(&self, anchor: &impl LockedVertex, probe: &NeighborhoodProbe) -> TraversalResult {
        let timeout = probe.timeout_ms.unwrap_or(self.inner.config.default_timeout_ms);
        let mut ctx = FilterContext::new(self, timeout);
        let mut result = run_probe(&mut ctx, anchor.handle(), probe, probe.mode, 1);
        if result.neighborhood_match.is_error() {
            result.reason = ctx.budget.reason();
            debug!(anchor = %anchor.id(), reason = %result.reason, "neighborhood probe aborted");
        }
        result
    }

    /// Run a neighborhood probe around a locked anchor.
    ///
    /// Fails with an access error when the walk was cut short, discarding
    /// the partial result. Use [`Graph::walk_neighborhood`] to keep it.
    pub fn neighborhood(&self, anchor: &impl LockedVertex, probe: &NeighborhoodProbe) -> Result<TraversalResult> {
        let result = self.walk_neighborhood(anchor, probe);
        if result.neighborhood_match.is_error() {
            return Err(Error::access(
                result.reason,
                format!("neighborhood of {} not fully visited", anchor.identifier()),
            ));
        }
        Ok(result)
    }

    /// First outarc from `tail` to `head` accepted by `filter`.
    pub fn has_arc(
        &self,
        tail: &impl LockedVertex,
        head: &VertexHandle,
        filter: &dyn ArcFilter,
    ) -> Result<Option<GraphArc>> {
        let mut ctx = FilterContext::new(self, self.inner.config.default_timeout_ms);
        let candidates = tail.outarcs.read().arcs_to(head.id());
        match first_arc_to(&mut ctx, tail.handle(), head, &candidates, filter, 1) {
            (ArcFilterMatch::Error, _) => Err(Error::access(
                ctx.budget.reason(),
                format!("arc {} -> {} not evaluated", tail.identifier(), head.identifier()),
            )),
            (_, found) => Ok(found.map(|p| GraphArc::new(tail.handle().clone(), head.clone(), p))),
        }
    }
}

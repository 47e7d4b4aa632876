//! Top-K culling of candidate arcs.
//!
//! The first pass runs only the cheap part of the filter over every arc,
//! without locking heads, and keeps the K best-scoring survivors in a
//! bounded heap. The second pass runs the head-dereferencing part over the
//! survivors in score order.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use tracing::trace;

use super::Collector;
use crate::filter::{ArcFilterMatch, CullOrder, CullStages, FilterContext};
use crate::model::{GraphArc, LockableArc, Predicator, VertexHandle};
use crate::storage::NeighborArcs;

/// Candidate ordered by score, ties broken by visiting order.
struct Scored {
    score: f64,
    seq: usize,
    larc: LockableArc,
}

impl PartialEq for Scored {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Scored {}

impl PartialOrd for Scored {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scored {
    // Earlier candidates rank higher among equal scores.
    fn cmp(&self, other: &Self) -> Ordering {
        self.score.total_cmp(&other.score).then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Bounded heap keeping the K best candidates for one order.
enum TopK {
    /// Min-heap: the weakest survivor is on top and evicted first.
    Max(BinaryHeap<Reverse<Scored>>),
    Min(BinaryHeap<Scored>),
}

impl TopK {
    fn new(order: CullOrder) -> Self {
        match order {
            CullOrder::Max => Self::Max(BinaryHeap::new()),
            CullOrder::Min => Self::Min(BinaryHeap::new()),
        }
    }

    fn offer(&mut self, k: usize, cand: Scored) {
        match self {
            Self::Max(h) => {
                h.push(Reverse(cand));
                if h.len() > k {
                    h.pop();
                }
            }
            Self::Min(h) => {
                // Flip the tie-break so earlier candidates still win.
                let cand = Scored { seq: usize::MAX - cand.seq, ..cand };
                h.push(cand);
                if h.len() > k {
                    h.pop();
                }
            }
        }
    }

    /// Survivors, best first.
    fn into_ranked(self) -> Vec<LockableArc> {
        match self {
            Self::Max(h) => {
                let mut v: Vec<Scored> = h.into_iter().map(|Reverse(s)| s).collect();
                v.sort_by(|a, b| b.cmp(a));
                v.into_iter().map(|s| s.larc).collect()
            }
            Self::Min(h) => h.into_sorted_vec().into_iter().map(|s| s.larc).collect(),
        }
    }
}

pub(super) fn walk_culled(
    ctx: &mut FilterContext<'_>,
    tail: &VertexHandle,
    neighbors: &[NeighborArcs],
    stages: &CullStages,
    out: &mut Collector<'_>,
    distance: u32,
) {
    let mut top = TopK::new(stages.cull.order);
    let mut seq = 0;
    for n in neighbors {
        for &p in &n.predicators {
            let mut larc = LockableArc::new(GraphArc::new(tail.clone(), n.vertex.clone(), p), distance);
            if !stages.pre.filter(ctx, &mut larc).is_hit() {
                continue;
            }
            let score = stages.evaluator.score(&larc);
            top.offer(stages.cull.k, Scored { score, seq, larc });
            seq += 1;
        }
    }
    if stages.cull.k == 0 {
        return;
    }
    let survivors = top.into_ranked();
    trace!(tail = %tail.id(), candidates = seq, survivors = survivors.len(), "cull pass done");

    for mut larc in survivors {
        if out.stop {
            break;
        }
        match stages.post.filter(ctx, &mut larc) {
            ArcFilterMatch::Hit => {
                let p: Predicator = larc.predicator();
                out.hit(&larc.arc);
                if !out.stop {
                    out.collect(ctx, &mut larc, &[p], &[p]);
                }
            }
            ArcFilterMatch::Miss => {}
            ArcFilterMatch::Error => out.error(),
        }
        ctx.release_head(&mut larc);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;

    use crate::filter::{new_arc_filter, CullOrder, Evaluator, FnEvaluator};
    use crate::graph::{ArcCreate, Graph, GraphConfig};
    use crate::model::{ArcDirection, Modifier, Predicator, Relationship};
    use crate::traverse::{CollectorMode, NeighborhoodProbe};

    fn graph() -> Graph {
        let g = Graph::new(GraphConfig::default()).unwrap();
        let rel = Relationship(Relationship::USER_START);
        for (head, w) in [("a", 5), ("b", 9), ("c", 1), ("d", 7), ("e", 8)] {
            g.connect("hub", head, Predicator::new(rel, Modifier::Integer, w), &ArcCreate::default()).unwrap();
        }
        g
    }

    fn culled(g: &Graph, k: usize, order: CullOrder, keep: fn(&str) -> bool) -> Vec<String> {
        let ev: Arc<dyn Evaluator> = Arc::new(
            FnEvaluator::new(move |larc| keep(larc.head().identifier()))
                .with_cull(k, order, |larc| larc.predicator().as_i32() as f64),
        );
        let probe = NeighborhoodProbe::new(ArcDirection::Out, new_arc_filter(None, None, Some(ev)).unwrap());
        let hub = g.vertex("hub").unwrap();
        let ro = g.lock_readonly(&hub, 10).unwrap();
        let result = g.neighborhood(&ro, &probe).unwrap();
        result.arcs.iter().map(|a| a.head.vertex.identifier().to_string()).collect()
    }

    #[test]
    fn test_keeps_highest_scores_in_order() {
        let g = graph();
        assert_eq!(culled(&g, 3, CullOrder::Max, |_| true), vec!["b", "e", "d"]);
    }

    #[test]
    fn test_keeps_lowest_scores() {
        let g = graph();
        assert_eq!(culled(&g, 2, CullOrder::Min, |_| true), vec!["c", "a"]);
    }

    #[test]
    fn test_tied_scores_both_survive() {
        let g = graph();
        let rel = Relationship(Relationship::USER_START);
        g.connect("hub", "f", Predicator::new(rel, Modifier::Integer, 9), &ArcCreate::default()).unwrap();
        let mut top = culled(&g, 2, CullOrder::Max, |_| true);
        top.sort();
        assert_eq!(top, vec!["b", "f"]);
    }

    #[test]
    fn test_post_stage_only_sees_survivors() {
        let g = graph();
        // "b" and "e" survive the cull but fail the second stage.
        assert_eq!(culled(&g, 3, CullOrder::Max, |id| id != "b" && id != "e"), vec!["d"]);
    }

    #[test]
    fn test_zero_k_collects_nothing() {
        let g = graph();
        assert!(culled(&g, 0, CullOrder::Max, |_| true).is_empty());
    }

    #[test]
    fn test_count_mode_counts_survivors() {
        let g = graph();
        let ev: Arc<dyn Evaluator> =
            Arc::new(FnEvaluator::new(|_| true).with_cull(4, CullOrder::Max, |larc| larc.predicator().as_i32() as f64));
        let probe = NeighborhoodProbe::new(ArcDirection::Out, new_arc_filter(None, None, Some(ev)).unwrap())
            .with_mode(CollectorMode::Count);
        let hub = g.vertex("hub").unwrap();
        let ro = g.lock_readonly(&hub, 10).unwrap();
        assert_eq!(g.neighborhood(&ro, &probe).unwrap().count, 4);
    }
}

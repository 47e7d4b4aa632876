//! End-to-end tests for neighborhood traversal.
//!
//! Tests multi-hop vertex probes, bidirectional matching, rejecting
//! condition sets, dynamic predicators, culling and head lock failures.
//!
//! Each test builds a small graph through `connect` and probes it from a
//! readonly-locked anchor.

use std::sync::Arc;

use arcgraph::filter::{CullOrder, DegreeCondition, DegreeKind, IdentifierCondition};
use arcgraph::{
    new_arc_filter, AccessReason, ArcCondition, ArcConditionSet, ArcCreate, ArcDirection, CollectorMode, Evaluator,
    FnEvaluator, Graph, GraphConfig, Modifier, NeighborhoodProbe, Predicator, Relationship, ValueComparison,
    VertexProbe,
};
use pretty_assertions::assert_eq;

struct Rels {
    knows: Relationship,
    likes: Relationship,
    rated: Relationship,
}

/// alice -knows-> bob -knows-> carol
/// alice -knows-> dan
/// alice -likes-> eve
fn social() -> (Graph, Rels) {
    let g = Graph::new(GraphConfig::new("traversal")).unwrap();
    let rels = Rels {
        knows: g.enumerator().encode_relationship("knows").unwrap(),
        likes: g.enumerator().encode_relationship("likes").unwrap(),
        rated: g.enumerator().encode_relationship("rated").unwrap(),
    };
    let opts = ArcCreate::default();
    g.connect("alice", "bob", Predicator::relationship_probe(rels.knows), &opts).unwrap();
    g.connect("bob", "carol", Predicator::relationship_probe(rels.knows), &opts).unwrap();
    g.connect("alice", "dan", Predicator::relationship_probe(rels.knows), &opts).unwrap();
    g.connect("alice", "eve", Predicator::relationship_probe(rels.likes), &opts).unwrap();
    (g, rels)
}

fn out_filter(rel: Relationship, vertex: Option<VertexProbe>) -> NeighborhoodProbe {
    let set = ArcConditionSet::new(ArcDirection::Out).with(ArcCondition::relationship(rel));
    NeighborhoodProbe::new(ArcDirection::Out, new_arc_filter(Some(&set), vertex, None).unwrap())
}

fn heads(g: &Graph, anchor: &str, probe: &NeighborhoodProbe) -> Vec<String> {
    let v = g.vertex(anchor).unwrap();
    let ro = g.lock_readonly(&v, 100).unwrap();
    let mut ids: Vec<String> =
        g.neighborhood(&ro, probe).unwrap().arcs.iter().map(|a| a.head.vertex.identifier().to_string()).collect();
    ids.sort();
    ids
}

// ============================================================================
// 1. Relationship filtering
// ============================================================================

#[test]
fn relationship_condition_selects_arcs() {
    let (g, rels) = social();
    assert_eq!(heads(&g, "alice", &out_filter(rels.knows, None)), vec!["bob", "dan"]);
    assert_eq!(heads(&g, "alice", &out_filter(rels.likes, None)), vec!["eve"]);
    assert!(heads(&g, "carol", &out_filter(rels.knows, None)).is_empty());
}

#[test]
fn rejecting_set_inverts_selection() {
    let (g, rels) = social();
    let set = ArcConditionSet::new(ArcDirection::Out).with(ArcCondition::relationship(rels.knows)).rejecting();
    let probe = NeighborhoodProbe::new(ArcDirection::Out, new_arc_filter(Some(&set), None, None).unwrap());
    assert_eq!(heads(&g, "alice", &probe), vec!["eve"]);
}

// ============================================================================
// 2. Two-hop patterns through a vertex probe
// ============================================================================

#[test]
fn next_hop_probe_requires_onward_arc() {
    let (g, rels) = social();
    let onward = out_filter(rels.knows, None);
    let probe = out_filter(rels.knows, Some(VertexProbe::new().with_next(onward)));
    assert_eq!(heads(&g, "alice", &probe), vec!["bob"]);
}

#[test]
fn head_conditions_filter_neighbors() {
    let (g, rels) = social();
    let leaf = VertexProbe::new().with_degree(DegreeCondition::new(DegreeKind::Outdegree, ValueComparison::Equ, 0));
    assert_eq!(heads(&g, "alice", &out_filter(rels.knows, Some(leaf))), vec!["dan"]);

    let not_dan = VertexProbe::new().with_identifier(IdentifierCondition::exact(["dan"]).negated());
    assert_eq!(heads(&g, "alice", &out_filter(rels.knows, Some(not_dan))), vec!["bob"]);
}

#[test]
fn count_and_stop_at_first_modes() {
    let (g, rels) = social();
    let alice = g.vertex("alice").unwrap();
    let ro = g.lock_readonly(&alice, 100).unwrap();

    let count = g.neighborhood(&ro, &out_filter(rels.knows, None).with_mode(CollectorMode::Count)).unwrap();
    assert_eq!(count.count, 2);
    assert!(count.arcs.is_empty());

    let first = g.neighborhood(&ro, &out_filter(rels.knows, None).with_mode(CollectorMode::StopAtFirst)).unwrap();
    assert!(first.neighborhood_match.is_hit());
    assert_eq!(first.count, 1);
    assert!(first.first.is_some());
}

// ============================================================================
// 3. Bidirectional matching
// ============================================================================

#[test]
fn bidirectional_probe_needs_both_arcs() {
    let (g, rels) = social();
    g.connect("bob", "alice", Predicator::relationship_probe(rels.knows), &ArcCreate::default()).unwrap();

    let set = ArcConditionSet::new(ArcDirection::Both).with(ArcCondition::relationship(rels.knows));
    let probe = NeighborhoodProbe::new(ArcDirection::Both, new_arc_filter(Some(&set), None, None).unwrap())
        .with_mode(CollectorMode::CollectVertices);
    let alice = g.vertex("alice").unwrap();
    let ro = g.lock_readonly(&alice, 100).unwrap();
    let result = g.neighborhood(&ro, &probe).unwrap();
    let ids: Vec<&str> = result.vertices.iter().map(|v| v.identifier()).collect();
    assert_eq!(ids, vec!["bob"]);
    assert_eq!(result.count, 1);
}

// ============================================================================
// 4. Dynamic predicators compare against the arc that led here
// ============================================================================

#[test]
fn dynamic_condition_uses_previous_arc_value() {
    let (g, rels) = social();
    let opts = ArcCreate::default();
    // Rating paths: alice -> film -> critic, each hop rated.
    g.connect("alice", "film1", Predicator::new(rels.rated, Modifier::Integer, 5), &opts).unwrap();
    g.connect("film1", "up", Predicator::new(rels.likes, Modifier::Integer, 7), &opts).unwrap();
    g.connect("alice", "film2", Predicator::new(rels.rated, Modifier::Integer, 10), &opts).unwrap();
    g.connect("film2", "down", Predicator::new(rels.likes, Modifier::Integer, 7), &opts).unwrap();

    // Onward arc value must exceed the value of the arc into the film.
    let rising = ArcConditionSet::new(ArcDirection::Out).with(
        ArcCondition::relationship(rels.likes).with_modifier(Modifier::Integer).with_value(ValueComparison::DynGt, 0),
    );
    let onward = NeighborhoodProbe::new(ArcDirection::Out, new_arc_filter(Some(&rising), None, None).unwrap());
    let probe = out_filter(rels.rated, Some(VertexProbe::new().with_next(onward)));
    assert_eq!(heads(&g, "alice", &probe), vec!["film1"]);
}

// ============================================================================
// 5. Culling keeps the best scored arcs
// ============================================================================

#[test]
fn cull_keeps_top_scores() {
    let (g, rels) = social();
    for (film, stars) in [("f1", 2), ("f2", 9), ("f3", 6), ("f4", 8)] {
        g.connect("critic", film, Predicator::new(rels.rated, Modifier::Integer, stars), &ArcCreate::default())
            .unwrap();
    }
    let ev: Arc<dyn Evaluator> = Arc::new(
        FnEvaluator::new(|larc| larc.head().identifier() != "f2")
            .with_cull(2, CullOrder::Max, |larc| larc.predicator().as_i32() as f64),
    );
    let set = ArcConditionSet::new(ArcDirection::Out).with(ArcCondition::relationship(rels.rated));
    let probe = NeighborhoodProbe::new(ArcDirection::Out, new_arc_filter(Some(&set), None, Some(ev)).unwrap());
    // f2 and f4 survive the cull, then f2 fails the head check.
    assert_eq!(heads(&g, "critic", &probe), vec!["f4"]);
}

// ============================================================================
// 6. A locked head aborts the traversal with an access error
// ============================================================================

#[test]
fn locked_head_times_out() {
    let (g, rels) = social();
    let bob = g.vertex("bob").unwrap();
    let _held = g.lock_writable(&bob, 100).unwrap();

    std::thread::scope(|s| {
        s.spawn(|| {
            let leaf = VertexProbe::new().with_degree(DegreeCondition::new(DegreeKind::Indegree, ValueComparison::Gte, 1));
            let probe = out_filter(rels.knows, Some(leaf)).with_timeout(30);
            let alice = g.vertex("alice").unwrap();
            let ro = g.lock_readonly(&alice, 100).unwrap();
            let err = g.neighborhood(&ro, &probe).unwrap_err();
            assert_eq!(err.access_reason(), Some(AccessReason::Timeout));
        });
    });
}

//! End-to-end tests for vertex locking and graph readonly mode.
//!
//! Tests opposite-order pair acquisition under contention, lock exclusion
//! between readers and writers, and the readonly transition.

use std::sync::Barrier;
use std::time::Duration;

use arcgraph::{AccessReason, ArcCreate, Error, Graph, GraphConfig, Predicator, Relationship, VertexSpec};
use pretty_assertions::assert_eq;

fn graph() -> Graph {
    Graph::new(GraphConfig::new("locking").with_default_timeout_ms(2_000)).unwrap()
}

fn assert_quiescent(g: &Graph, ids: &[&str]) {
    for id in ids {
        let v = g.vertex(id).unwrap();
        let d = g.descriptor(&v).unwrap();
        assert!(!d.is_locked(), "{id} still locked: {d:?}");
        assert_eq!(d.write_requests, 0, "{id} kept a write request");
    }
    assert_eq!(g.n_writable(), 0);
}

// ============================================================================
// 1. Crossed writable locks time out cleanly
// ============================================================================

#[test]
fn crossed_locks_time_out_without_leftovers() {
    let g = graph();
    let a = g.create_vertex("A", VertexSpec::new()).unwrap();
    let b = g.create_vertex("B", VertexSpec::new()).unwrap();
    let both_held = Barrier::new(2);

    std::thread::scope(|s| {
        let t1 = s.spawn(|| {
            let _wa = g.lock_writable(&a, 100).unwrap();
            both_held.wait();
            g.lock_writable(&b, 50).map(|_| ()).map_err(|e| e.access_reason())
        });
        let t2 = s.spawn(|| {
            let _wb = g.lock_writable(&b, 100).unwrap();
            both_held.wait();
            g.lock_writable(&a, 50).map(|_| ()).map_err(|e| e.access_reason())
        });
        let r1 = t1.join().unwrap();
        let r2 = t2.join().unwrap();
        // At least one side must give up; whoever gives up reports a timeout.
        assert!(r1.is_err() || r2.is_err());
        for r in [r1, r2] {
            if let Err(reason) = r {
                assert_eq!(reason, Some(AccessReason::Timeout));
            }
        }
    });
    assert_quiescent(&g, &["A", "B"]);
}

// ============================================================================
// 2. Opposite-order connects make progress
// ============================================================================

#[test]
fn opposite_order_connects_make_progress() {
    let g = graph();
    g.create_vertex("A", VertexSpec::new()).unwrap();
    g.create_vertex("B", VertexSpec::new()).unwrap();
    let rounds = 40u16;

    let written: Vec<i64> = std::thread::scope(|s| {
        let handles: Vec<_> = [("A", "B", 0u16), ("B", "A", 1000u16)]
            .into_iter()
            .map(|(tail, head, base)| {
                let g = &g;
                s.spawn(move || {
                    let mut n = 0;
                    for i in 0..rounds {
                        let rel = Relationship(Relationship::USER_START + base + i);
                        match g.connect(tail, head, Predicator::relationship_probe(rel), &ArcCreate::default()) {
                            Ok(_) => n += 1,
                            Err(e) => assert!(
                                e.access_reason().is_some_and(AccessReason::is_retryable),
                                "unexpected failure: {e}"
                            ),
                        }
                    }
                    n
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert!(written.iter().sum::<i64>() > 0);
    let a = g.vertex("A").unwrap();
    let b = g.vertex("B").unwrap();
    assert_eq!(a.outdegree(), written[0]);
    assert_eq!(b.indegree(), written[0]);
    assert_eq!(b.outdegree(), written[1]);
    assert_eq!(a.indegree(), written[1]);
    assert_quiescent(&g, &["A", "B"]);
}

// ============================================================================
// 3. Readers share, writers exclude
// ============================================================================

#[test]
fn readers_share_and_writer_waits() {
    let g = graph();
    let a = g.create_vertex("A", VertexSpec::new()).unwrap();
    let r1 = g.lock_readonly(&a, 10).unwrap();

    std::thread::scope(|s| {
        s.spawn(|| {
            let r2 = g.lock_readonly(&a, 10).unwrap();
            let err = g.lock_writable(&a, 20).map(|_| ()).unwrap_err();
            assert_eq!(err.access_reason(), Some(AccessReason::Timeout));
            drop(r2);
        });
    });

    let released = std::sync::atomic::AtomicBool::new(false);
    std::thread::scope(|s| {
        s.spawn(|| {
            let w = g.lock_writable(&a, 1_000).unwrap();
            assert!(released.load(std::sync::atomic::Ordering::SeqCst));
            drop(w);
        });
        std::thread::sleep(Duration::from_millis(20));
        released.store(true, std::sync::atomic::Ordering::SeqCst);
        drop(r1);
    });
    assert_quiescent(&g, &["A"]);
}

#[test]
fn zero_timeout_reports_locked() {
    let g = graph();
    let a = g.create_vertex("A", VertexSpec::new()).unwrap();
    let _w = g.lock_writable(&a, 10).unwrap();
    std::thread::scope(|s| {
        s.spawn(|| {
            let err = g.lock_readonly(&a, 0).map(|_| ()).unwrap_err();
            assert_eq!(err.access_reason(), Some(AccessReason::Locked));
        });
    });
}

// ============================================================================
// 4. Graph readonly mode
// ============================================================================

#[test]
fn readonly_graph_refuses_writes_and_allows_reads() {
    let g = graph();
    g.connect("A", "B", Predicator::relationship_probe(Relationship(Relationship::USER_START)), &ArcCreate::default())
        .unwrap();
    g.set_readonly(100, false).unwrap();
    assert!(g.is_readonly());

    let a = g.vertex("A").unwrap();
    let err = g.lock_writable(&a, 10).map(|_| ()).unwrap_err();
    assert_eq!(err.access_reason(), Some(AccessReason::ReadonlyGraph));
    assert!(matches!(g.create_vertex("C", VertexSpec::new()), Err(Error::ReadonlyGraph)));

    let ro = g.lock_readonly(&a, 10).unwrap();
    assert_eq!(ro.outdegree(), 1);
    drop(ro);

    g.clear_readonly();
    assert!(!g.is_readonly());
    g.create_vertex("C", VertexSpec::new()).unwrap();
}

#[test]
fn readonly_transition_waits_for_writers() {
    let g = graph();
    let a = g.create_vertex("A", VertexSpec::new()).unwrap();
    let w = g.lock_writable(&a, 10).unwrap();
    std::thread::scope(|s| {
        s.spawn(|| {
            let err = g.set_readonly(20, false).unwrap_err();
            assert_eq!(err.access_reason(), Some(AccessReason::Timeout));
        });
    });
    assert!(!g.is_readonly());
    drop(w);
    g.set_readonly(100, false).unwrap();
    g.clear_readonly();
}

#[test]
fn disallowed_readonly_needs_force() {
    let g = graph();
    g.disallow_readonly();
    assert!(g.set_readonly(10, false).is_err());
    g.set_readonly(10, true).unwrap();
    g.clear_readonly();
    g.allow_readonly();
    g.set_readonly(10, false).unwrap();
    g.clear_readonly();
}

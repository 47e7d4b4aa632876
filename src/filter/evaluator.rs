//! Pluggable arc and vertex predicates.
//!
//! An [`Evaluator`] stands in for a scripted filter expression. The filter
//! engine only needs to know whether it dereferences the head vertex (and
//! therefore needs it locked), whether it wants a top-K cull, and whether
//! it wants the synthetic fallback arc.

use std::sync::Arc;

use crate::model::{LockableArc, Vertex};

/// Which end of the cull heap survives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CullOrder {
    /// Keep the K highest scores.
    Max,
    /// Keep the K lowest scores.
    Min,
}

/// Bounded top-K requirement declared by an evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cull {
    pub k: usize,
    pub order: CullOrder,
}

pub trait Evaluator: Send + Sync {
    /// Arc predicate. The head is locked when [`Evaluator::head_deref`]
    /// is true.
    fn eval_arc(&self, larc: &LockableArc) -> bool;

    /// Vertex predicate used as a local pre- or post-filter in vertex probes.
    fn eval_vertex(&self, _vertex: &Vertex) -> bool {
        true
    }

    /// Reads head vertex fields.
    fn head_deref(&self) -> bool {
        true
    }

    /// Walks arcs beyond the head.
    fn traversals(&self) -> bool {
        false
    }

    fn cull(&self) -> Option<Cull> {
        None
    }

    /// Cull score of an arc. Only called when [`Evaluator::cull`] is set.
    fn score(&self, _larc: &LockableArc) -> f64 {
        0.0
    }

    /// Also try the synthetic arc against neighbors with no matching arc.
    fn synthetic_arcs(&self) -> bool {
        false
    }
}

type ArcFn = dyn Fn(&LockableArc) -> bool + Send + Sync;
type VertexFn = dyn Fn(&Vertex) -> bool + Send + Sync;
type ScoreFn = dyn Fn(&LockableArc) -> f64 + Send + Sync;

/// Evaluator built from closures.
#[derive(Clone)]
pub struct FnEvaluator {
    arc: Arc<ArcFn>,
    vertex: Option<Arc<VertexFn>>,
    head_deref: bool,
    cull: Option<(Cull, Arc<ScoreFn>)>,
    synthetic: bool,
}

impl FnEvaluator {
    pub fn new(arc: impl Fn(&LockableArc) -> bool + Send + Sync + 'static) -> Self {
        Self { arc: Arc::new(arc), vertex: None, head_deref: true, cull: None, synthetic: false }
    }

    /// Evaluator that never looks at the head vertex.
    pub fn local(arc: impl Fn(&LockableArc) -> bool + Send + Sync + 'static) -> Self {
        Self { head_deref: false, ..Self::new(arc) }
    }

    pub fn with_vertex(mut self, f: impl Fn(&Vertex) -> bool + Send + Sync + 'static) -> Self {
        self.vertex = Some(Arc::new(f));
        self
    }

    pub fn with_cull(
        mut self,
        k: usize,
        order: CullOrder,
        score: impl Fn(&LockableArc) -> f64 + Send + Sync + 'static,
    ) -> Self {
        self.cull = Some((Cull { k, order }, Arc::new(score)));
        self
    }

    pub fn with_synthetic_arcs(mut self) -> Self {
        self.synthetic = true;
        self
    }
}

impl Evaluator for FnEvaluator {
    fn eval_arc(&self, larc: &LockableArc) -> bool {
        (self.arc)(larc)
    }

    fn eval_vertex(&self, vertex: &Vertex) -> bool {
        self.vertex.as_ref().is_none_or(|f| f(vertex))
    }

    fn head_deref(&self) -> bool {
        self.head_deref
    }

    fn cull(&self) -> Option<Cull> {
        self.cull.as_ref().map(|(c, _)| *c)
    }

    fn score(&self, larc: &LockableArc) -> f64 {
        self.cull.as_ref().map_or(0.0, |(_, f)| f(larc))
    }

    fn synthetic_arcs(&self) -> bool {
        self.synthetic
    }
}

impl std::fmt::Debug for FnEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnEvaluator")
            .field("head_deref", &self.head_deref)
            .field("cull", &self.cull.as_ref().map(|(c, _)| c))
            .field("synthetic", &self.synthetic)
            .finish()
    }
}

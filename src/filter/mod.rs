//! # Arc Filters
//!
//! A traversal hands every candidate arc to an [`ArcFilter`]. The factory
//! [`new_arc_filter`] picks the cheapest filter able to answer the
//! condition, so the per-arc cost stays a single matcher call for plain
//! predicator conditions:
//!
//! | Family        | Checks                                                   |
//! |---------------|----------------------------------------------------------|
//! | Pass / Stop   | nothing                                                  |
//! | single-field  | relationship, modifier, value or hamming distance        |
//! | paired-field  | relationship + modifier, either of them + value/hamming  |
//! | Evaluator     | an [`Evaluator`] only                                    |
//! | Generic       | up to two predicators, evaluator and vertex probe        |
//!
//! The overall sign of a condition set is folded into each filter's
//! `positive_match` at construction, so a negated set never needs its own
//! filter type.

pub mod evaluator;
pub mod vertex;

use std::sync::Arc;

use tracing::warn;

pub use evaluator::{Cull, CullOrder, Evaluator, FnEvaluator};
pub use vertex::{
    vertex_condition_match, DegreeCondition, DegreeKind, DegreeProbe, IdentifierCondition, PropertyCondition,
    PropertyValueCondition, SimilarityCondition, TimestampCondition, TimestampField, TypeCondition, VertexProbe,
};

use crate::graph::{Graph, TimingBudget};
use crate::index::EncodeError;
use crate::model::{
    dynamic_predicator_match, match_generic, match_hamming, match_modifier, match_modifier_hamming,
    match_modifier_value, match_relationship, match_relationship_hamming, match_relationship_value, match_specific,
    match_specific_hamming, match_specific_value, match_value, ArcDirection, HeadLock, LockableArc, Modifier,
    Predicator, PredicatorMatchFn, PredicatorValue, Relationship, ValueComparison, VertexId,
};
use crate::{Error, Result};

// ============================================================================
// Match outcome
// ============================================================================

/// Outcome of filtering one arc.
///
/// `Error` means the filter could not decide (a head lock timed out or a
/// nested traversal failed). Callers must check for it before trusting
/// anything collected so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArcFilterMatch {
    #[default]
    Miss,
    Hit,
    Error,
}

impl ArcFilterMatch {
    pub fn is_hit(self) -> bool {
        self == Self::Hit
    }

    pub fn is_error(self) -> bool {
        self == Self::Error
    }

    fn from_bool(hit: bool) -> Self {
        if hit { Self::Hit } else { Self::Miss }
    }
}

/// How two predicator conditions combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Logic {
    /// Only the first predicator is used.
    #[default]
    Single,
    And,
    Or,
    Xor,
}

impl Logic {
    /// Infer the combination from the shape of the two predicators.
    ///
    /// A lower bound of "less than" followed by an upper bound of "greater
    /// than" describes the outside of a range and combines with OR.
    /// Everything else combines with AND.
    pub fn from_predicators(p1: Predicator, p2: Predicator) -> Self {
        if p2 == Predicator::NONE {
            Self::Single
        } else if p1.is_cmp_lt() && p2.is_cmp_gt() {
            Self::Or
        } else {
            Self::And
        }
    }
}

// ============================================================================
// Arc conditions
// ============================================================================

/// One condition on the relationship, modifier and value of an arc.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArcCondition {
    pub relationship: Option<Relationship>,
    pub modifier: Modifier,
    pub vcomp: ValueComparison,
    pub value1: PredicatorValue,
    /// Upper range bound, or the hamming threshold for LSH values.
    pub value2: PredicatorValue,
    pub positive: bool,
}

impl Default for ArcCondition {
    fn default() -> Self {
        Self {
            relationship: None,
            modifier: Modifier::None,
            vcomp: ValueComparison::Any,
            value1: PredicatorValue::ZERO,
            value2: PredicatorValue::ZERO,
            positive: true,
        }
    }
}

impl ArcCondition {
    pub fn relationship(rel: Relationship) -> Self {
        Self { relationship: Some(rel), ..Self::default() }
    }

    pub fn with_modifier(mut self, modifier: Modifier) -> Self {
        self.modifier = modifier;
        self
    }

    pub fn with_value(mut self, vcomp: ValueComparison, value: impl Into<PredicatorValue>) -> Self {
        self.vcomp = vcomp;
        self.value1 = value.into();
        self
    }

    /// Inclusive range, or its complement with [`ValueComparison::NRange`].
    pub fn with_range(
        mut self,
        vcomp: ValueComparison,
        low: impl Into<PredicatorValue>,
        high: impl Into<PredicatorValue>,
    ) -> Self {
        self.vcomp = vcomp;
        self.value1 = low.into();
        self.value2 = high.into();
        self
    }

    pub fn negated(mut self) -> Self {
        self.positive = !self.positive;
        self
    }
}

/// Arc direction, accept/reject sign and conditions of a neighborhood probe.
///
/// Only the first condition is used by the filter.
#[derive(Debug, Clone, PartialEq)]
pub struct ArcConditionSet {
    pub direction: ArcDirection,
    /// False turns the whole set into a reject condition.
    pub accept: bool,
    pub conditions: Vec<ArcCondition>,
}

impl ArcConditionSet {
    pub fn new(direction: ArcDirection) -> Self {
        Self { direction, accept: true, conditions: Vec::new() }
    }

    pub fn with(mut self, condition: ArcCondition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn rejecting(mut self) -> Self {
        self.accept = !self.accept;
        self
    }

    /// The one or two probe predicators encoding the first condition.
    pub fn predicators(&self) -> Result<(Predicator, Predicator)> {
        let dir = self.direction;
        let Some(cond) = self.conditions.first() else {
            return Ok((Predicator::NONE.with_direction(dir), Predicator::NONE));
        };
        if self.conditions.len() > 1 {
            warn!(n = self.conditions.len(), "only the first arc condition is applied");
        }
        let rel = cond.relationship.unwrap_or(Relationship::WILDCARD);
        if !rel.is_wildcard() && !rel.is_valid() {
            return Err(Error::Enumeration(EncodeError::Invalid(format!("relationship {rel}"))));
        }
        let base = Predicator::NONE.with_relationship(rel).with_modifier(cond.modifier).with_direction(dir);

        let (mut p1, p2) = match cond.vcomp {
            vcomp if vcomp.is_basic() => {
                let mut p = base.with_value(cond.value1).with_comparison(vcomp);
                if cond.modifier == Modifier::Lsh {
                    p = p.lsh_threshold(cond.value2.to_bits() as u8);
                }
                (p, Predicator::NONE)
            }
            ValueComparison::Range => (
                base.with_value(cond.value1).with_comparison(ValueComparison::Gte),
                base.with_value(cond.value2).with_comparison(ValueComparison::Lte),
            ),
            ValueComparison::NRange => (
                base.with_value(cond.value1).with_comparison(ValueComparison::Lt),
                base.with_value(cond.value2).with_comparison(ValueComparison::Gt),
            ),
            ValueComparison::DynRange => (
                base.dynamic_delta(ValueComparison::DynGte, cond.value1),
                base.dynamic_delta(ValueComparison::DynLte, cond.value2),
            ),
            ValueComparison::DynRangeRatio => (
                base.dynamic_ratio(ValueComparison::DynGte, cond.value1.as_f64() as f32),
                base.dynamic_ratio(ValueComparison::DynLte, cond.value2.as_f64() as f32),
            ),
            vcomp => (base.dynamic_delta(vcomp, cond.value1), Predicator::NONE),
        };
        if !cond.positive {
            p1 = p1.inverted();
        }
        Ok((p1, p2))
    }
}

// ============================================================================
// Filter context
// ============================================================================

/// Per-traversal state shared by every filter call.
pub struct FilterContext<'g> {
    graph: &'g Graph,
    pub budget: TimingBudget,
    /// Predicator of the arc leading to the current tail. Dynamic value
    /// conditions are resolved against it.
    pub previous: Predicator,
    halted: bool,
}

impl<'g> FilterContext<'g> {
    pub fn new(graph: &'g Graph, timeout_ms: u64) -> Self {
        Self { graph, budget: TimingBudget::from_millis(timeout_ms), previous: Predicator::NONE, halted: false }
    }

    pub fn graph(&self) -> &'g Graph {
        self.graph
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn halt(&mut self) {
        self.halted = true;
    }

    /// Lock the arc head readonly, at most once per arc.
    pub(crate) fn acquire_head(&mut self, larc: &mut LockableArc) -> bool {
        match larc.head_lock {
            HeadLock::Acquired => true,
            HeadLock::Failed(_) => false,
            HeadLock::NotLocked => {
                let head = larc.head().clone();
                if self.graph.inner.lock_state().lock_readonly(&head, &mut self.budget) {
                    larc.head_lock = HeadLock::Acquired;
                    true
                } else {
                    larc.head_lock = HeadLock::Failed(self.budget.reason());
                    self.halted = true;
                    false
                }
            }
        }
    }

    pub(crate) fn release_head(&mut self, larc: &mut LockableArc) {
        if larc.head_lock == HeadLock::Acquired {
            if let Err(e) = self.graph.inner.lock_state().unlock_readonly(larc.head()) {
                warn!(vertex = %larc.head().id(), error = %e, "head unlock reported an error");
            }
        }
        larc.head_lock = HeadLock::NotLocked;
    }
}

// ============================================================================
// Filter trait
// ============================================================================

/// Where a generic filter's evaluator runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluatorPlacement {
    None,
    /// Arc only, head not locked.
    Local,
    /// Head locked first.
    Traversing,
}

/// Which stages of a generic filter are active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenericVariant {
    /// Everything, including a traversing or culling evaluator with a
    /// predicator check or vertex probe.
    Full,
    TraversingEval,
    PredLocalEvalVertex,
    LocalEvalVertex,
    PredVertex,
    Vertex,
    PredLocalEval,
    LocalEval,
    Pred,
}

impl GenericVariant {
    fn select(predicate: bool, evaluator: EvaluatorPlacement, vertex: bool, cull: bool) -> Self {
        use EvaluatorPlacement as E;
        match (predicate, evaluator, vertex) {
            _ if cull => Self::Full,
            (false, E::Traversing, false) => Self::TraversingEval,
            (_, E::Traversing, _) => Self::Full,
            (true, E::Local, true) => Self::PredLocalEvalVertex,
            (false, E::Local, true) => Self::LocalEvalVertex,
            (true, E::None, true) => Self::PredVertex,
            (false, E::None, true) => Self::Vertex,
            (true, E::Local, false) => Self::PredLocalEval,
            (false, E::Local, false) => Self::LocalEval,
            (_, E::None, false) => Self::Pred,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArcFilterType {
    Pass,
    Stop,
    Relationship,
    Modifier,
    Value,
    HamDist,
    Specific,
    RelationshipValue,
    RelationshipHamDist,
    ModifierValue,
    ModifierHamDist,
    SpecificValue,
    SpecificHamDist,
    Evaluator,
    Generic(GenericVariant),
    DirectRecursion,
}

/// The two stages a culling traversal splits a filter into.
pub struct CullStages {
    /// Cheap checks run over every candidate without locking heads.
    pub pre: Box<dyn ArcFilter>,
    /// Head-dereferencing checks run over the survivors only.
    pub post: Box<dyn ArcFilter>,
    pub evaluator: Arc<dyn Evaluator>,
    pub cull: Cull,
}

pub trait ArcFilter: Send + Sync + std::fmt::Debug {
    fn filter_type(&self) -> ArcFilterType;

    fn positive_match(&self) -> bool;

    fn filter(&self, ctx: &mut FilterContext<'_>, larc: &mut LockableArc) -> ArcFilterMatch;

    fn clone_box(&self) -> Box<dyn ArcFilter>;

    /// Predicator conditions, `NONE` where unused.
    fn predicators(&self) -> (Predicator, Predicator) {
        (Predicator::NONE, Predicator::NONE)
    }

    fn evaluator(&self) -> Option<&Arc<dyn Evaluator>> {
        None
    }

    fn cull_stages(&self) -> Option<CullStages> {
        None
    }
}

impl Clone for Box<dyn ArcFilter> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

// ============================================================================
// Fast filters
// ============================================================================

/// Accept or reject everything.
#[derive(Debug, Clone, Copy)]
pub struct WildcardFilter {
    pass: bool,
}

impl WildcardFilter {
    pub fn pass() -> Self {
        Self { pass: true }
    }

    pub fn stop() -> Self {
        Self { pass: false }
    }
}

impl ArcFilter for WildcardFilter {
    fn filter_type(&self) -> ArcFilterType {
        if self.pass { ArcFilterType::Pass } else { ArcFilterType::Stop }
    }

    fn positive_match(&self) -> bool {
        true
    }

    fn filter(&self, _ctx: &mut FilterContext<'_>, _larc: &mut LockableArc) -> ArcFilterMatch {
        ArcFilterMatch::from_bool(self.pass)
    }

    fn clone_box(&self) -> Box<dyn ArcFilter> {
        Box::new(*self)
    }
}

/// Single predicator checked by one specialized matcher.
#[derive(Clone, Copy)]
pub struct PredicatorFilter {
    kind: ArcFilterType,
    probe: Predicator,
    positive: bool,
    matcher: PredicatorMatchFn,
}

impl PredicatorFilter {
    /// Pick the matcher for the fields `probe` sets. A probe with no
    /// relationship, modifier or value is a wildcard and gets `None`.
    fn for_probe(probe: Predicator, positive: bool) -> Option<Self> {
        let lsh = probe.is_lsh();
        let (kind, matcher): (ArcFilterType, PredicatorMatchFn) =
            match (probe.has_relationship(), probe.has_modifier(), probe.has_value()) {
                (true, true, true) if lsh => (ArcFilterType::SpecificHamDist, match_specific_hamming),
                (true, true, true) => (ArcFilterType::SpecificValue, match_specific_value),
                (true, true, false) => (ArcFilterType::Specific, match_specific),
                (true, false, true) if lsh => (ArcFilterType::RelationshipHamDist, match_relationship_hamming),
                (true, false, true) => (ArcFilterType::RelationshipValue, match_relationship_value),
                (true, false, false) => (ArcFilterType::Relationship, match_relationship),
                (false, true, true) if lsh => (ArcFilterType::ModifierHamDist, match_modifier_hamming),
                (false, true, true) => (ArcFilterType::ModifierValue, match_modifier_value),
                (false, true, false) => (ArcFilterType::Modifier, match_modifier),
                (false, false, true) if lsh => (ArcFilterType::HamDist, match_hamming),
                (false, false, true) => (ArcFilterType::Value, match_value),
                (false, false, false) => return None,
            };
        Some(Self { kind, probe, positive, matcher })
    }
}

impl std::fmt::Debug for PredicatorFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PredicatorFilter")
            .field("kind", &self.kind)
            .field("probe", &self.probe)
            .field("positive", &self.positive)
            .finish()
    }
}

impl ArcFilter for PredicatorFilter {
    fn filter_type(&self) -> ArcFilterType {
        self.kind
    }

    fn positive_match(&self) -> bool {
        self.positive
    }

    fn filter(&self, _ctx: &mut FilterContext<'_>, larc: &mut LockableArc) -> ArcFilterMatch {
        ArcFilterMatch::from_bool((self.matcher)(self.probe, larc.predicator()) == self.positive)
    }

    fn clone_box(&self) -> Box<dyn ArcFilter> {
        Box::new(*self)
    }

    fn predicators(&self) -> (Predicator, Predicator) {
        (self.probe, Predicator::NONE)
    }
}

/// Evaluator and nothing else.
#[derive(Clone)]
pub struct EvaluatorFilter {
    evaluator: Arc<dyn Evaluator>,
    positive: bool,
}

impl std::fmt::Debug for EvaluatorFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvaluatorFilter").field("positive", &self.positive).finish_non_exhaustive()
    }
}

impl ArcFilter for EvaluatorFilter {
    fn filter_type(&self) -> ArcFilterType {
        ArcFilterType::Evaluator
    }

    fn positive_match(&self) -> bool {
        self.positive
    }

    fn filter(&self, ctx: &mut FilterContext<'_>, larc: &mut LockableArc) -> ArcFilterMatch {
        if self.evaluator.head_deref() && !ctx.acquire_head(larc) {
            return ArcFilterMatch::Error;
        }
        ArcFilterMatch::from_bool(self.evaluator.eval_arc(larc) == self.positive)
    }

    fn clone_box(&self) -> Box<dyn ArcFilter> {
        Box::new(self.clone())
    }

    fn evaluator(&self) -> Option<&Arc<dyn Evaluator>> {
        Some(&self.evaluator)
    }
}

// ============================================================================
// Generic filter
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Complete,
    /// Stop before anything that needs the head.
    PreCull,
    /// Only the head-dereferencing checks.
    DirectRecursion,
}

#[derive(Clone)]
pub struct GenericArcFilter {
    variant: GenericVariant,
    stage: Stage,
    positive: bool,
    logic: Logic,
    pred1: Predicator,
    pred2: Predicator,
    check_predicate: bool,
    dynamic: bool,
    /// Required head vertex.
    terminal: Option<VertexId>,
    vertex_probe: Option<VertexProbe>,
    evaluator: Option<Arc<dyn Evaluator>>,
    placement: EvaluatorPlacement,
}

impl GenericArcFilter {
    pub fn new(
        pred1: Predicator,
        pred2: Predicator,
        positive: bool,
        vertex_probe: Option<VertexProbe>,
        evaluator: Option<Arc<dyn Evaluator>>,
    ) -> Self {
        let check_predicate = !(pred1.is_full_wildcard() && pred2.is_full_wildcard());
        let placement = match &evaluator {
            None => EvaluatorPlacement::None,
            Some(ev) if ev.head_deref() || ev.traversals() => EvaluatorPlacement::Traversing,
            Some(_) => EvaluatorPlacement::Local,
        };
        let cull = evaluator.as_ref().is_some_and(|ev| ev.cull().is_some());
        Self {
            variant: GenericVariant::select(check_predicate, placement, vertex_probe.is_some(), cull),
            stage: Stage::Complete,
            positive,
            logic: Logic::from_predicators(pred1, pred2),
            pred1,
            pred2,
            check_predicate,
            dynamic: pred1.is_dynamic() || pred2.is_dynamic(),
            terminal: None,
            vertex_probe,
            evaluator,
            placement,
        }
    }

    /// Require the arc head to be `terminal`.
    pub fn with_terminal(mut self, terminal: VertexId) -> Self {
        self.terminal = Some(terminal);
        self
    }

    pub fn variant(&self) -> GenericVariant {
        self.variant
    }

    fn predicate_hit(&self, ctx: &FilterContext<'_>, target: Predicator) -> bool {
        let matches = |p: Predicator| {
            if self.dynamic {
                dynamic_predicator_match(p, ctx.previous, target)
            } else {
                match_generic(p, target)
            }
        };
        match self.logic {
            Logic::Single => matches(self.pred1),
            Logic::And => matches(self.pred1) && matches(self.pred2),
            Logic::Or => matches(self.pred1) || matches(self.pred2),
            Logic::Xor => matches(self.pred1) != matches(self.pred2),
        }
    }

    fn needs_head(&self) -> bool {
        self.placement == EvaluatorPlacement::Traversing || self.vertex_probe.is_some()
    }

    /// Terminal, predicator and local evaluator checks.
    fn filter_arc(&self, ctx: &FilterContext<'_>, larc: &LockableArc) -> bool {
        if let Some(t) = self.terminal {
            if (larc.head().id() == t) != self.positive {
                return false;
            }
        }
        if self.check_predicate {
            let miss = !self.predicate_hit(ctx, larc.predicator());
            if self.positive == miss {
                return false;
            }
        }
        if self.placement == EvaluatorPlacement::Local {
            if let Some(ev) = &self.evaluator {
                if ev.eval_arc(larc) != self.positive {
                    return false;
                }
            }
        }
        true
    }

    /// Traversing evaluator and vertex probe against the locked head.
    fn filter_head(&self, ctx: &mut FilterContext<'_>, larc: &mut LockableArc) -> ArcFilterMatch {
        if let Some(vp) = &self.vertex_probe {
            if self.placement != EvaluatorPlacement::Traversing && vp.is_identifier_only() {
                let hit = vp.match_identifier(larc.head());
                return ArcFilterMatch::from_bool(hit == self.positive);
            }
        }
        if !ctx.acquire_head(larc) {
            return ArcFilterMatch::Error;
        }
        let mut miss = false;
        if self.placement == EvaluatorPlacement::Traversing {
            if let Some(ev) = &self.evaluator {
                miss = !ev.eval_arc(larc);
            }
        }
        if !miss {
            if let Some(vp) = &self.vertex_probe {
                let head = larc.head().clone();
                let saved = std::mem::replace(&mut ctx.previous, larc.predicator());
                let deep = vertex_condition_match(ctx, vp, &head, larc.distance);
                ctx.previous = saved;
                match deep {
                    ArcFilterMatch::Error => return ArcFilterMatch::Error,
                    m => miss = !m.is_hit(),
                }
            }
        }
        ArcFilterMatch::from_bool(self.positive != miss)
    }
}

impl std::fmt::Debug for GenericArcFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenericArcFilter")
            .field("variant", &self.variant)
            .field("stage", &self.stage)
            .field("positive", &self.positive)
            .field("logic", &self.logic)
            .field("pred1", &self.pred1)
            .field("pred2", &self.pred2)
            .field("terminal", &self.terminal)
            .field("vertex_probe", &self.vertex_probe)
            .field("placement", &self.placement)
            .finish()
    }
}

impl ArcFilter for GenericArcFilter {
    fn filter_type(&self) -> ArcFilterType {
        match self.stage {
            Stage::DirectRecursion => ArcFilterType::DirectRecursion,
            _ => ArcFilterType::Generic(self.variant),
        }
    }

    fn positive_match(&self) -> bool {
        self.positive
    }

    fn filter(&self, ctx: &mut FilterContext<'_>, larc: &mut LockableArc) -> ArcFilterMatch {
        if self.stage != Stage::DirectRecursion && !self.filter_arc(ctx, larc) {
            return ArcFilterMatch::Miss;
        }
        if self.stage == Stage::PreCull || !self.needs_head() {
            return ArcFilterMatch::Hit;
        }
        self.filter_head(ctx, larc)
    }

    fn clone_box(&self) -> Box<dyn ArcFilter> {
        Box::new(self.clone())
    }

    fn predicators(&self) -> (Predicator, Predicator) {
        (self.pred1, self.pred2)
    }

    fn evaluator(&self) -> Option<&Arc<dyn Evaluator>> {
        self.evaluator.as_ref()
    }

    fn cull_stages(&self) -> Option<CullStages> {
        let evaluator = self.evaluator.clone()?;
        let cull = evaluator.cull()?;
        let pre = Self { stage: Stage::PreCull, ..self.clone() };
        let post = Self { stage: Stage::DirectRecursion, ..self.clone() };
        Some(CullStages { pre: Box::new(pre), post: Box::new(post), evaluator, cull })
    }
}

/// Filter confirming the reverse of a forward arc: same key, required
/// head, always positive.
pub(crate) fn reverse_filter(forward_filter: &dyn ArcFilter, forward: Predicator, terminal: VertexId) -> GenericArcFilter {
    let (p1, p2) = forward_filter.predicators();
    let (p1, p2) = if forward_filter.positive_match() {
        let p2 = if p2 == Predicator::NONE { p2 } else { p2.merge_inherit_key(forward) };
        (p1.merge_inherit_key(forward), p2)
    } else {
        (Predicator::NONE.merge_inherit_key(forward), Predicator::NONE)
    };
    let p1 = p1.with_ephemeral(crate::model::Ephemeral { neg: false, ..p1.ephemeral() });
    GenericArcFilter::new(p1, p2, true, None, None).with_terminal(terminal)
}

// ============================================================================
// Factory
// ============================================================================

/// Build the cheapest filter for a condition set, vertex probe and
/// evaluator.
///
/// A single non-dynamic, non-bidirectional predicator with no vertex
/// probe and no evaluator gets a fast filter. An evaluator alone on a
/// single-direction probe gets an [`EvaluatorFilter`]. Everything else
/// gets a [`GenericArcFilter`].
pub fn new_arc_filter(
    conditions: Option<&ArcConditionSet>,
    vertex_probe: Option<VertexProbe>,
    evaluator: Option<Arc<dyn Evaluator>>,
) -> Result<Box<dyn ArcFilter>> {
    let (pred1, pred2) = match conditions {
        Some(set) => set.predicators()?,
        None => (Predicator::NONE, Predicator::NONE),
    };
    let accept = conditions.is_none_or(|set| set.accept);
    // Sign of the first condition XNOR sign of the set.
    let positive = pred1.is_positive() == accept;
    let vertex_probe = vertex_probe.filter(|vp| !vp.is_wildcard());

    if vertex_probe.is_none() && pred2 == Predicator::NONE {
        let fast = evaluator.is_none() && !pred1.is_dynamic() && pred1.direction() != ArcDirection::Both;
        if fast {
            let filter: Box<dyn ArcFilter> = match PredicatorFilter::for_probe(pred1, positive) {
                Some(f) => Box::new(f),
                None if positive => Box::new(WildcardFilter::pass()),
                None => Box::new(WildcardFilter::stop()),
            };
            return Ok(filter);
        }
        if let Some(ev) = &evaluator {
            let single = pred1.direction() != ArcDirection::Both;
            if single && pred1.is_full_wildcard() && ev.cull().is_none() {
                return Ok(Box::new(EvaluatorFilter { evaluator: ev.clone(), positive }));
            }
        }
    }
    Ok(Box::new(GenericArcFilter::new(pred1, pred2, positive, vertex_probe, evaluator)))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    use super::*;
    use crate::graph::GraphConfig;
    use crate::model::{GraphArc, VertexSpec};

    fn rel(n: u16) -> Relationship {
        Relationship(Relationship::USER_START + n)
    }

    fn fixture() -> (Graph, LockableArc) {
        let g = Graph::new(GraphConfig::default()).unwrap();
        let a = g.create_vertex("a", VertexSpec::new()).unwrap();
        let b = g.create_vertex("b", VertexSpec::new()).unwrap();
        (g, LockableArc::new(GraphArc::new(a, b, Predicator::NONE), 1))
    }

    fn run(filter: &dyn ArcFilter, g: &Graph, larc: &LockableArc, p: Predicator) -> ArcFilterMatch {
        let mut ctx = FilterContext::new(g, 10);
        let mut larc = larc.clone();
        larc.arc.head.predicator = p.into_stored(ArcDirection::Out);
        let m = filter.filter(&mut ctx, &mut larc);
        ctx.release_head(&mut larc);
        m
    }

    #[test]
    fn test_factory_selects_fast_filters() {
        let cases = [
            (ArcCondition::relationship(rel(1)), ArcFilterType::Relationship),
            (ArcCondition::relationship(rel(1)).with_modifier(Modifier::Integer), ArcFilterType::Specific),
            (
                ArcCondition::relationship(rel(1)).with_modifier(Modifier::Integer).with_value(ValueComparison::Gt, 3),
                ArcFilterType::SpecificValue,
            ),
            (ArcCondition::default().with_modifier(Modifier::Integer), ArcFilterType::Modifier),
            (ArcCondition::default(), ArcFilterType::Pass),
        ];
        for (cond, expected) in cases {
            let set = ArcConditionSet::new(ArcDirection::Out).with(cond);
            let filter = new_arc_filter(Some(&set), None, None).unwrap();
            assert_eq!(filter.filter_type(), expected);
        }
    }

    #[test]
    fn test_negated_set_flips_pass_to_stop() {
        let set = ArcConditionSet::new(ArcDirection::Out).rejecting();
        let filter = new_arc_filter(Some(&set), None, None).unwrap();
        assert_eq!(filter.filter_type(), ArcFilterType::Stop);

        // Double negation accepts again.
        let set = ArcConditionSet::new(ArcDirection::Out).with(ArcCondition::default().negated()).rejecting();
        let filter = new_arc_filter(Some(&set), None, None).unwrap();
        assert_eq!(filter.filter_type(), ArcFilterType::Pass);
    }

    #[test]
    fn test_range_uses_generic_and() {
        let (g, larc) = fixture();
        let cond = ArcCondition::relationship(rel(1)).with_modifier(Modifier::Integer).with_range(
            ValueComparison::Range,
            5,
            10,
        );
        let filter = new_arc_filter(Some(&ArcConditionSet::new(ArcDirection::Out).with(cond)), None, None).unwrap();
        assert_eq!(filter.filter_type(), ArcFilterType::Generic(GenericVariant::Pred));

        let hits: Vec<i32> = [4, 5, 10, 11]
            .into_iter()
            .filter(|v| run(filter.as_ref(), &g, &larc, Predicator::new(rel(1), Modifier::Integer, *v)).is_hit())
            .collect();
        assert_eq!(hits, vec![5, 10]);
    }

    #[test]
    fn test_nrange_infers_or() {
        let (g, larc) = fixture();
        let cond = ArcCondition::relationship(rel(1)).with_modifier(Modifier::Integer).with_range(
            ValueComparison::NRange,
            5,
            10,
        );
        let set = ArcConditionSet::new(ArcDirection::Out).with(cond);
        let (p1, p2) = set.predicators().unwrap();
        assert_eq!(Logic::from_predicators(p1, p2), Logic::Or);

        let filter = new_arc_filter(Some(&set), None, None).unwrap();
        let hits: Vec<i32> = [4, 5, 10, 11]
            .into_iter()
            .filter(|v| run(filter.as_ref(), &g, &larc, Predicator::new(rel(1), Modifier::Integer, *v)).is_hit())
            .collect();
        assert_eq!(hits, vec![4, 11]);
    }

    #[test]
    fn test_negative_condition_rejects_match() {
        let (g, larc) = fixture();
        let set = ArcConditionSet::new(ArcDirection::Out).with(ArcCondition::relationship(rel(1)).negated());
        let filter = new_arc_filter(Some(&set), None, None).unwrap();
        assert!(!filter.positive_match());
        assert_eq!(run(filter.as_ref(), &g, &larc, Predicator::relationship_probe(rel(1))), ArcFilterMatch::Miss);
        assert_eq!(run(filter.as_ref(), &g, &larc, Predicator::relationship_probe(rel(2))), ArcFilterMatch::Hit);
    }

    #[test]
    fn test_invalid_relationship_rejected() {
        let set = ArcConditionSet::new(ArcDirection::Out).with(ArcCondition::relationship(Relationship::INVALID));
        assert!(matches!(new_arc_filter(Some(&set), None, None), Err(Error::Enumeration(_))));
    }

    #[test]
    fn test_evaluator_only_filter() {
        let (g, larc) = fixture();
        let ev: Arc<dyn Evaluator> = Arc::new(FnEvaluator::local(|larc| larc.predicator().relationship() == rel(2)));
        let filter = new_arc_filter(None, None, Some(ev)).unwrap();
        assert_eq!(filter.filter_type(), ArcFilterType::Evaluator);
        assert!(run(filter.as_ref(), &g, &larc, Predicator::relationship_probe(rel(2))).is_hit());
        assert!(!run(filter.as_ref(), &g, &larc, Predicator::relationship_probe(rel(1))).is_hit());
    }

    #[test]
    fn test_generic_variant_selection() {
        let local: Arc<dyn Evaluator> = Arc::new(FnEvaluator::local(|_| true));
        let set = ArcConditionSet::new(ArcDirection::Out).with(ArcCondition::relationship(rel(1)));
        let f = new_arc_filter(Some(&set), None, Some(local.clone())).unwrap();
        assert_eq!(f.filter_type(), ArcFilterType::Generic(GenericVariant::PredLocalEval));

        let vp = VertexProbe::new().with_identifier(IdentifierCondition::exact(["b"]));
        let f = new_arc_filter(Some(&set), Some(vp.clone()), None).unwrap();
        assert_eq!(f.filter_type(), ArcFilterType::Generic(GenericVariant::PredVertex));

        let f = new_arc_filter(None, Some(vp), Some(local)).unwrap();
        assert_eq!(f.filter_type(), ArcFilterType::Generic(GenericVariant::LocalEvalVertex));

        let traversing: Arc<dyn Evaluator> = Arc::new(FnEvaluator::new(|_| true));
        let both = ArcConditionSet::new(ArcDirection::Both);
        let f = new_arc_filter(Some(&both), None, Some(traversing.clone())).unwrap();
        assert_eq!(f.filter_type(), ArcFilterType::Generic(GenericVariant::TraversingEval));
        let out = ArcConditionSet::new(ArcDirection::Out);
        let f = new_arc_filter(Some(&out), None, Some(traversing)).unwrap();
        assert_eq!(f.filter_type(), ArcFilterType::Evaluator);
    }

    #[test]
    fn test_vertex_probe_locks_head_once() {
        let (g, larc) = fixture();
        let vp = VertexProbe::new().with_degree(DegreeCondition::new(DegreeKind::Degree, ValueComparison::Equ, 0));
        let filter = new_arc_filter(None, Some(vp), None).unwrap();
        let mut ctx = FilterContext::new(&g, 10);
        let mut larc = larc.clone();
        assert!(filter.filter(&mut ctx, &mut larc).is_hit());
        assert_eq!(larc.head_lock, HeadLock::Acquired);
        let b = larc.head().clone();
        assert!(g.descriptor(&b).unwrap().is_readonly());
        ctx.release_head(&mut larc);
        assert!(!g.descriptor(&b).unwrap().is_locked());
    }

    #[test]
    fn test_head_lock_failure_is_error() {
        let (g, larc) = fixture();
        let b = larc.head().clone();
        let vp = VertexProbe::new().with_degree(DegreeCondition::new(DegreeKind::Degree, ValueComparison::Equ, 0));
        let filter = new_arc_filter(None, Some(vp), None).unwrap();
        std::thread::scope(|s| {
            let _held = g.lock_writable(&b, 10).unwrap();
            s.spawn(|| {
                let mut ctx = FilterContext::new(&g, 0);
                let mut larc = larc.clone();
                assert_eq!(filter.filter(&mut ctx, &mut larc), ArcFilterMatch::Error);
                assert!(ctx.is_halted());
                assert!(matches!(larc.head_lock, HeadLock::Failed(_)));
            })
            .join()
            .unwrap();
        });
    }

    #[test]
    fn test_reverse_filter_requires_key_and_terminal() {
        let (g, larc) = fixture();
        let forward = WildcardFilter::pass();
        let fwd = Predicator::new(rel(3), Modifier::Integer, 7).into_stored(ArcDirection::Out);
        let reverse = reverse_filter(&forward, fwd, larc.head().id());
        assert!(run(&reverse, &g, &larc, Predicator::new(rel(3), Modifier::Integer, 9)).is_hit());
        assert!(!run(&reverse, &g, &larc, Predicator::new(rel(4), Modifier::Integer, 7)).is_hit());

        let mut elsewhere = larc.clone();
        elsewhere.arc.head.vertex = larc.tail().clone();
        assert!(!run(&reverse, &g, &elsewhere, Predicator::new(rel(3), Modifier::Integer, 7)).is_hit());
    }

    proptest! {
        #[test]
        fn prop_fast_filter_agrees_with_generic(r in 0u16..4, m in prop::sample::select(vec![Modifier::Integer, Modifier::Unsigned]), v in 0u32..50, probe_v in 0u32..50, gt in any::<bool>()) {
            let (g, larc) = fixture();
            let vcomp = if gt { ValueComparison::Gt } else { ValueComparison::Lte };
            let cond = ArcCondition::relationship(rel(1)).with_modifier(m).with_value(vcomp, probe_v);
            let set = ArcConditionSet::new(ArcDirection::Out).with(cond);
            let fast = new_arc_filter(Some(&set), None, None).unwrap();
            let (p1, p2) = set.predicators().unwrap();
            let generic = GenericArcFilter::new(p1, p2, true, None, None);
            let target = Predicator::new(rel(r), m, v);
            prop_assert_eq!(run(fast.as_ref(), &g, &larc, target), run(&generic, &g, &larc, target));
        }
    }
}

//! Vertex probes: conditions on the head of an arc.
//!
//! Checks run cheapest first. Type, degree and identifier read fields
//! that are always valid. The remaining checks read attributes, count
//! arcs or traverse further and need the head locked, which the calling
//! filter has already done.

use std::sync::Arc;

use serde_json::Value;

use super::evaluator::Evaluator;
use super::{ArcFilterMatch, FilterContext};
use crate::model::{Manifestation, ValueComparison, Vertex, VertexHandle};
use crate::traverse::{run_probe, CollectorMode, NeighborhoodProbe};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DegreeKind {
    Degree,
    Indegree,
    Outdegree,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DegreeCondition {
    pub kind: DegreeKind,
    pub vcomp: ValueComparison,
    pub value1: i64,
    pub value2: i64,
}

impl DegreeCondition {
    pub fn new(kind: DegreeKind, vcomp: ValueComparison, value: i64) -> Self {
        Self { kind, vcomp, value1: value, value2: value }
    }

    pub fn range(kind: DegreeKind, low: i64, high: i64) -> Self {
        Self { kind, vcomp: ValueComparison::Range, value1: low, value2: high }
    }

    fn matches(&self, v: &Vertex) -> bool {
        let degree = match self.kind {
            DegreeKind::Degree => v.degree(),
            DegreeKind::Indegree => v.indegree(),
            DegreeKind::Outdegree => v.outdegree(),
        };
        self.vcomp.compare(degree, self.value1, self.value2)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeCondition {
    pub types: Vec<u8>,
    pub negate: bool,
}

impl TypeCondition {
    pub fn any_of(types: impl IntoIterator<Item = u8>) -> Self {
        Self { types: types.into_iter().collect(), negate: false }
    }

    pub fn negated(mut self) -> Self {
        self.negate = !self.negate;
        self
    }

    fn matches(&self, v: &Vertex) -> bool {
        self.types.contains(&v.vertex_type()) != self.negate
    }
}

/// Identifier equal to, or starting with, any of the patterns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifierCondition {
    pub patterns: Vec<String>,
    pub prefix: bool,
    pub negate: bool,
}

impl IdentifierCondition {
    pub fn exact<S: Into<String>>(patterns: impl IntoIterator<Item = S>) -> Self {
        Self { patterns: patterns.into_iter().map(Into::into).collect(), prefix: false, negate: false }
    }

    pub fn prefix<S: Into<String>>(patterns: impl IntoIterator<Item = S>) -> Self {
        Self { prefix: true, ..Self::exact(patterns) }
    }

    pub fn negated(mut self) -> Self {
        self.negate = !self.negate;
        self
    }

    pub fn matches(&self, identifier: &str) -> bool {
        let found = self
            .patterns
            .iter()
            .any(|p| if self.prefix { identifier.starts_with(p.as_str()) } else { identifier == p });
        found != self.negate
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampField {
    Created,
    Modified,
    Expires,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimestampCondition {
    pub field: TimestampField,
    pub vcomp: ValueComparison,
    pub t1: u32,
    pub t2: u32,
}

impl TimestampCondition {
    pub fn new(field: TimestampField, vcomp: ValueComparison, ts: u32) -> Self {
        Self { field, vcomp, t1: ts, t2: ts }
    }

    pub fn between(field: TimestampField, t1: u32, t2: u32) -> Self {
        Self { field, vcomp: ValueComparison::Range, t1, t2 }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SimilarityCondition {
    /// Hamming distance between 64-bit fingerprints at most `max_distance`.
    Fingerprint { fingerprint: u64, max_distance: u32 },
    /// Cosine similarity against the vertex vector at least `min_score`.
    Vector { vector: Vec<f32>, min_score: f32 },
}

impl SimilarityCondition {
    fn matches(&self, fingerprint: u64, vector: Option<&[f32]>) -> bool {
        match self {
            Self::Fingerprint { fingerprint: probe, max_distance } => {
                (probe ^ fingerprint).count_ones() <= *max_distance
            }
            Self::Vector { vector: probe, min_score } => {
                vector.and_then(|v| cosine(probe, v)).is_some_and(|score| score >= *min_score)
            }
        }
    }
}

/// `None` for mismatched lengths or a zero vector.
fn cosine(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }
    let (mut dot, mut na, mut nb) = (0.0f64, 0.0f64, 0.0f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        return None;
    }
    Some((dot / (na.sqrt() * nb.sqrt())) as f32)
}

#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValueCondition {
    Exists,
    Equals(Value),
    Numeric { vcomp: ValueComparison, v1: f64, v2: f64 },
    /// String property starting with the given text.
    Prefix(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PropertyCondition {
    pub key: String,
    pub condition: PropertyValueCondition,
    pub negate: bool,
}

impl PropertyCondition {
    pub fn new(key: impl Into<String>, condition: PropertyValueCondition) -> Self {
        Self { key: key.into(), condition, negate: false }
    }

    pub fn negated(mut self) -> Self {
        self.negate = !self.negate;
        self
    }

    fn matches(&self, properties: &serde_json::Map<String, Value>) -> bool {
        let found = match (properties.get(&self.key), &self.condition) {
            (None, _) => false,
            (Some(_), PropertyValueCondition::Exists) => true,
            (Some(v), PropertyValueCondition::Equals(expected)) => v == expected,
            (Some(v), PropertyValueCondition::Numeric { vcomp, v1, v2 }) => {
                v.as_f64().is_some_and(|x| vcomp.compare(x, *v1, *v2))
            }
            (Some(v), PropertyValueCondition::Prefix(p)) => v.as_str().is_some_and(|s| s.starts_with(p.as_str())),
        };
        found != self.negate
    }
}

/// Count of arcs around the vertex compared against a range.
#[derive(Debug, Clone)]
pub struct DegreeProbe {
    pub neighborhood: NeighborhoodProbe,
    pub vcomp: ValueComparison,
    pub value1: i64,
    pub value2: i64,
}

impl DegreeProbe {
    pub fn new(neighborhood: NeighborhoodProbe, vcomp: ValueComparison, value: i64) -> Self {
        Self { neighborhood, vcomp, value1: value, value2: value }
    }
}

/// Conditions on an arc's head vertex.
#[derive(Clone)]
pub struct VertexProbe {
    /// False inverts the outcome of the whole probe.
    pub positive: bool,
    pub manifestation: Option<Manifestation>,
    pub vertex_type: Option<TypeCondition>,
    pub degree: Vec<DegreeCondition>,
    pub identifier: Option<IdentifierCondition>,
    pub timestamps: Vec<TimestampCondition>,
    pub similarity: Option<SimilarityCondition>,
    pub properties: Vec<PropertyCondition>,
    pub degree_probe: Option<DegreeProbe>,
    /// Vertex evaluator run before the next-hop probe.
    pub pre: Option<Arc<dyn Evaluator>>,
    /// The vertex must have a matching neighborhood of its own.
    pub next: Option<Box<NeighborhoodProbe>>,
    /// Vertex evaluator run after the next-hop probe.
    pub post: Option<Arc<dyn Evaluator>>,
}

impl Default for VertexProbe {
    fn default() -> Self {
        Self {
            positive: true,
            manifestation: None,
            vertex_type: None,
            degree: Vec::new(),
            identifier: None,
            timestamps: Vec::new(),
            similarity: None,
            properties: Vec::new(),
            degree_probe: None,
            pre: None,
            next: None,
            post: None,
        }
    }
}

impl std::fmt::Debug for VertexProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VertexProbe")
            .field("positive", &self.positive)
            .field("manifestation", &self.manifestation)
            .field("vertex_type", &self.vertex_type)
            .field("degree", &self.degree)
            .field("identifier", &self.identifier)
            .field("timestamps", &self.timestamps)
            .field("similarity", &self.similarity)
            .field("properties", &self.properties)
            .field("degree_probe", &self.degree_probe)
            .field("pre", &self.pre.is_some())
            .field("next", &self.next)
            .field("post", &self.post.is_some())
            .finish()
    }
}

impl VertexProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn negated(mut self) -> Self {
        self.positive = !self.positive;
        self
    }

    pub fn with_manifestation(mut self, manifestation: Manifestation) -> Self {
        self.manifestation = Some(manifestation);
        self
    }

    pub fn with_type(mut self, condition: TypeCondition) -> Self {
        self.vertex_type = Some(condition);
        self
    }

    pub fn with_degree(mut self, condition: DegreeCondition) -> Self {
        self.degree.push(condition);
        self
    }

    pub fn with_identifier(mut self, condition: IdentifierCondition) -> Self {
        self.identifier = Some(condition);
        self
    }

    pub fn with_timestamp(mut self, condition: TimestampCondition) -> Self {
        self.timestamps.push(condition);
        self
    }

    pub fn with_similarity(mut self, condition: SimilarityCondition) -> Self {
        self.similarity = Some(condition);
        self
    }

    pub fn with_property(mut self, condition: PropertyCondition) -> Self {
        self.properties.push(condition);
        self
    }

    pub fn with_degree_probe(mut self, probe: DegreeProbe) -> Self {
        self.degree_probe = Some(probe);
        self
    }

    pub fn with_pre(mut self, evaluator: Arc<dyn Evaluator>) -> Self {
        self.pre = Some(evaluator);
        self
    }

    pub fn with_next(mut self, probe: NeighborhoodProbe) -> Self {
        self.next = Some(Box::new(probe));
        self
    }

    pub fn with_post(mut self, evaluator: Arc<dyn Evaluator>) -> Self {
        self.post = Some(evaluator);
        self
    }

    fn has_details(&self) -> bool {
        self.degree_probe.is_some()
            || !self.timestamps.is_empty()
            || self.similarity.is_some()
            || !self.properties.is_empty()
    }

    fn has_recursion(&self) -> bool {
        self.pre.is_some() || self.next.is_some() || self.post.is_some()
    }

    /// Accepts every vertex.
    pub fn is_wildcard(&self) -> bool {
        self.positive
            && self.manifestation.is_none()
            && self.vertex_type.is_none()
            && self.degree.is_empty()
            && self.identifier.is_none()
            && !self.has_details()
            && !self.has_recursion()
    }

    /// Only an identifier condition, answerable without locking the vertex.
    pub fn is_identifier_only(&self) -> bool {
        self.identifier.is_some()
            && self.manifestation.is_none()
            && self.vertex_type.is_none()
            && self.degree.is_empty()
            && !self.has_details()
            && !self.has_recursion()
    }

    /// Identifier condition with the probe's sign applied.
    pub fn match_identifier(&self, v: &Vertex) -> bool {
        self.identifier.as_ref().is_none_or(|c| c.matches(v.identifier())) == self.positive
    }

    fn basic_match(&self, v: &Vertex) -> bool {
        self.vertex_type.as_ref().is_none_or(|c| c.matches(v))
            && self.degree.iter().all(|c| c.matches(v))
            && self.identifier.as_ref().is_none_or(|c| c.matches(v.identifier()))
    }
}

fn detail_match(ctx: &mut FilterContext<'_>, probe: &VertexProbe, v: &VertexHandle, distance: u32) -> ArcFilterMatch {
    if let Some(dp) = &probe.degree_probe {
        let result = run_probe(ctx, v, &dp.neighborhood, CollectorMode::Count, distance + 1);
        if result.neighborhood_match.is_error() {
            return ArcFilterMatch::Error;
        }
        if !dp.vcomp.compare(result.count, dp.value1, dp.value2) {
            return ArcFilterMatch::Miss;
        }
    }
    let attrs = v.attributes();
    for ts in &probe.timestamps {
        let value = match ts.field {
            TimestampField::Created => attrs.tmc,
            TimestampField::Modified => attrs.tmm,
            TimestampField::Expires => attrs.tmx,
        };
        if !ts.vcomp.compare(value, ts.t1, ts.t2) {
            return ArcFilterMatch::Miss;
        }
    }
    if let Some(sim) = &probe.similarity {
        if !sim.matches(attrs.fingerprint, attrs.vector.as_deref()) {
            return ArcFilterMatch::Miss;
        }
    }
    if !probe.properties.iter().all(|p| p.matches(&attrs.properties)) {
        return ArcFilterMatch::Miss;
    }
    ArcFilterMatch::Hit
}

fn recursive_match(
    ctx: &mut FilterContext<'_>,
    probe: &VertexProbe,
    v: &VertexHandle,
    distance: u32,
) -> ArcFilterMatch {
    if probe.pre.as_ref().is_some_and(|ev| !ev.eval_vertex(v)) {
        return ArcFilterMatch::Miss;
    }
    if let Some(next) = &probe.next {
        let result = run_probe(ctx, v, next, CollectorMode::StopAtFirst, distance + 1);
        if result.neighborhood_match != ArcFilterMatch::Hit {
            return result.neighborhood_match;
        }
    }
    if probe.post.as_ref().is_some_and(|ev| !ev.eval_vertex(v)) {
        return ArcFilterMatch::Miss;
    }
    ArcFilterMatch::Hit
}

/// Match `v` against every condition of `probe`, applying its sign.
///
/// `v` must be locked by the caller whenever the probe reads more than
/// the identifier. `distance` is the hop distance of `v` from the
/// traversal anchor. `Error` is returned unchanged regardless of sign.
pub fn vertex_condition_match(
    ctx: &mut FilterContext<'_>,
    probe: &VertexProbe,
    v: &VertexHandle,
    distance: u32,
) -> ArcFilterMatch {
    let raw = 'matched: {
        if let Some(m) = probe.manifestation {
            if ctx.graph().descriptor(v).map(|d| d.manifestation) != Some(m) {
                break 'matched ArcFilterMatch::Miss;
            }
        }
        if !probe.basic_match(v) {
            break 'matched ArcFilterMatch::Miss;
        }
        if probe.has_details() {
            let m = detail_match(ctx, probe, v, distance);
            if m != ArcFilterMatch::Hit {
                break 'matched m;
            }
        }
        if probe.has_recursion() {
            break 'matched recursive_match(ctx, probe, v, distance);
        }
        ArcFilterMatch::Hit
    };
    match raw {
        ArcFilterMatch::Error => ArcFilterMatch::Error,
        m => ArcFilterMatch::from_bool(m.is_hit() == probe.positive),
    }
}

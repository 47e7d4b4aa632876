//! Vertex record shared between the index and every arcvector naming it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::{Deserialize, Serialize};

use super::predicator::TIME_EXPIRES_NEVER;
use crate::storage::{ArcVector, ArcVectorKind};
use crate::{Error, Result};

/// Maximum identifier length in bytes.
pub const MAX_IDENTIFIER_LEN: usize = 255;

/// Opaque vertex identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VertexId(pub u64);

impl std::fmt::Display for VertexId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// How a vertex came into existence.
///
/// `Virtual` vertices exist only as arc endpoints and are unindexed once
/// they become isolated while unlocked. `Real` vertices persist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Manifestation {
    /// Placeholder. As a terminal default it means "must already exist".
    Null,
    #[default]
    Real,
    Virtual,
}

/// Vertex data consulted by vertex probes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VertexAttributes {
    pub vertex_type: u8,
    /// Creation time, seconds since the epoch.
    pub tmc: u32,
    /// Modification time.
    pub tmm: u32,
    /// Earliest arc expiration, `TIME_EXPIRES_NEVER` when none.
    pub tmx: u32,
    /// 64-bit locality-sensitive fingerprint.
    pub fingerprint: u64,
    pub vector: Option<Vec<f32>>,
    pub properties: serde_json::Map<String, serde_json::Value>,
}

impl Default for VertexAttributes {
    fn default() -> Self {
        Self {
            vertex_type: 0,
            tmc: 0,
            tmm: 0,
            tmx: TIME_EXPIRES_NEVER,
            fingerprint: 0,
            vector: None,
            properties: serde_json::Map::new(),
        }
    }
}

/// Shared owning handle to a vertex.
pub type VertexHandle = Arc<Vertex>;

/// A vertex and its two arcvectors.
///
/// Access to the arcvectors is governed by the vertex lock state kept in
/// the graph; the inner `RwLock`s only make the data movement sound.
pub struct Vertex {
    id: VertexId,
    identifier: String,
    pub(crate) outarcs: RwLock<ArcVector>,
    pub(crate) inarcs: RwLock<ArcVector>,
    /// Number of arcvector entries naming this vertex, plus one artificial
    /// reference per forward-only outarc.
    arc_refs: AtomicI64,
    /// Arcs or attributes changed since the last commit.
    modified: AtomicBool,
    attributes: RwLock<VertexAttributes>,
}

impl Vertex {
    pub(crate) fn new(id: VertexId, identifier: String, attributes: VertexAttributes) -> Self {
        Self {
            id,
            identifier,
            outarcs: RwLock::new(ArcVector::NoArcs),
            inarcs: RwLock::new(ArcVector::NoArcs),
            arc_refs: AtomicI64::new(0),
            modified: AtomicBool::new(false),
            attributes: RwLock::new(attributes),
        }
    }

    pub fn id(&self) -> VertexId {
        self.id
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn outdegree(&self) -> i64 {
        self.outarcs.read().degree()
    }

    /// Includes arcs tracked only by an indegree counter.
    pub fn indegree(&self) -> i64 {
        self.inarcs.read().degree()
    }

    pub fn degree(&self) -> i64 {
        self.outdegree() + self.indegree()
    }

    pub fn outarcs_kind(&self) -> ArcVectorKind {
        self.outarcs.read().kind()
    }

    pub fn inarcs_kind(&self) -> ArcVectorKind {
        self.inarcs.read().kind()
    }

    pub fn is_isolated(&self) -> bool {
        self.degree() == 0
    }

    pub fn arc_refs(&self) -> i64 {
        self.arc_refs.load(Ordering::Acquire)
    }

    pub(crate) fn incref_arcs(&self, n: i64) {
        self.arc_refs.fetch_add(n, Ordering::AcqRel);
    }

    /// Returns the remaining count.
    pub(crate) fn decref_arcs(&self, n: i64) -> i64 {
        self.arc_refs.fetch_sub(n, Ordering::AcqRel) - n
    }

    pub(crate) fn correct_arc_refs(&self, refs: i64) {
        self.arc_refs.store(refs, Ordering::Release);
    }

    pub(crate) fn mark_modified(&self) {
        self.modified.store(true, Ordering::Release);
    }

    /// Clear and return the modified flag.
    pub(crate) fn take_modified(&self) -> bool {
        self.modified.swap(false, Ordering::AcqRel)
    }

    pub fn attributes(&self) -> RwLockReadGuard<'_, VertexAttributes> {
        self.attributes.read()
    }

    pub(crate) fn attributes_mut(&self) -> RwLockWriteGuard<'_, VertexAttributes> {
        self.attributes.write()
    }

    pub fn vertex_type(&self) -> u8 {
        self.attributes.read().vertex_type
    }

    /// Drop all arcs without any bookkeeping. Used on graph teardown.
    pub(crate) fn clear_arcs(&self) {
        *self.outarcs.write() = ArcVector::NoArcs;
        *self.inarcs.write() = ArcVector::NoArcs;
    }
}

impl std::fmt::Debug for Vertex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vertex")
            .field("id", &self.id)
            .field("identifier", &self.identifier)
            .field("arc_refs", &self.arc_refs())
            .finish()
    }
}

/// Check a vertex identifier.
pub fn validate_identifier(identifier: &str) -> Result<()> {
    if identifier.is_empty() {
        return Err(Error::InvalidIdentifier("empty identifier".into()));
    }
    if identifier.len() > MAX_IDENTIFIER_LEN {
        return Err(Error::InvalidIdentifier(format!(
            "identifier exceeds {MAX_IDENTIFIER_LEN} bytes"
        )));
    }
    if let Some(c) = identifier.chars().find(|c| c.is_control()) {
        return Err(Error::InvalidIdentifier(format!(
            "identifier contains control character {c:?}"
        )));
    }
    Ok(())
}

/// Parameters for creating a vertex.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VertexSpec {
    /// Vertex type name resolved through the enumerator.
    pub type_name: Option<String>,
    pub manifestation: Manifestation,
    pub attributes: VertexAttributes,
}

impl VertexSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_type(mut self, name: impl Into<String>) -> Self {
        self.type_name = Some(name.into());
        self
    }

    pub fn with_manifestation(mut self, manifestation: Manifestation) -> Self {
        self.manifestation = manifestation;
        self
    }

    pub fn with_fingerprint(mut self, fingerprint: u64) -> Self {
        self.attributes.fingerprint = fingerprint;
        self
    }

    pub fn with_vector(mut self, vector: Vec<f32>) -> Self {
        self.attributes.vector = Some(vector);
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.attributes.properties.insert(key.into(), value.into());
        self
    }
}

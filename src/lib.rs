//! # arcgraph: In-Memory Directed Multigraph Core
//!
//! Vertices hold their outgoing and incoming arcs in adaptive arcvectors.
//! Every arc is labelled with a packed 64-bit predicator (relationship,
//! modifier, value) and mirrored by a reverse entry in the head's inarcs.
//! Concurrent access is coordinated per vertex by a writable/readonly lock
//! state machine under one graph state lock.
//!
//! ## Design Principles
//!
//! 1. **Predicators are values**: one `u64` carries an arc's identity and data
//! 2. **Locks are scoped**: every vertex lock is a guard released on drop
//! 3. **Storage takes no locks**: callers hold the lock, the arcvector moves data
//! 4. **Filters are chosen, not interpreted**: the cheapest matcher for a
//!    condition is picked once, before the walk
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use arcgraph::{
//!     new_arc_filter, ArcCondition, ArcConditionSet, ArcCreate, ArcDirection, Graph, GraphConfig,
//!     Modifier, NeighborhoodProbe, Predicator,
//! };
//!
//! # fn main() -> arcgraph::Result<()> {
//! let graph = Graph::new(GraphConfig::default())?;
//! let rated = graph.enumerator().encode_relationship("rated")?;
//! graph.connect("alice", "film", Predicator::new(rated, Modifier::Integer, 4), &ArcCreate::default())?;
//!
//! let alice = graph.vertex("alice").expect("just created");
//! let held = graph.lock_readonly(&alice, 100)?;
//! let set = ArcConditionSet::new(ArcDirection::Out).with(ArcCondition::relationship(rated));
//! let probe = NeighborhoodProbe::new(ArcDirection::Out, new_arc_filter(Some(&set), None, None)?);
//! let found = graph.neighborhood(&held, &probe)?;
//! assert_eq!(found.arcs.len(), 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Layers
//!
//! | Module     | Role                                                      |
//! |------------|-----------------------------------------------------------|
//! | `model`    | predicators, matching, vertices and arcs                  |
//! | `storage`  | arcvectors, framehash and the delete engine               |
//! | `graph`    | vertex locks, readonly mode, connect/disconnect, expiry   |
//! | `filter`   | arc filters, vertex probes and evaluators                 |
//! | `traverse` | neighborhood walks, bidirectional pass and culling        |
//! | `index`    | vertex index and name enumeration                         |
//! | `tx`       | commit and scheduling hooks                               |

// ============================================================================
// Modules
// ============================================================================

pub mod model;
pub mod storage;
pub mod graph;
pub mod filter;
pub mod traverse;
pub mod index;
pub mod tx;

// ============================================================================
// Re-exports: Model
// ============================================================================

pub use model::{
    ArcDirection, GraphArc, LockableArc, Manifestation, Modifier, Predicator, PredicatorValue, Relationship,
    ValueComparison, Vertex, VertexHandle, VertexId, VertexSpec,
};

// ============================================================================
// Re-exports: Graph
// ============================================================================

pub use graph::{
    AccessReason, ArcCreate, ArcWrite, CreateCondition, ExpireOutcome, Graph, GraphBuilder, GraphConfig,
    LockedVertex, ReadonlyVertex, TimingBudget, WritableVertex,
};

// ============================================================================
// Re-exports: Storage
// ============================================================================

pub use storage::{ArcVector, ArcVectorKind};

// ============================================================================
// Re-exports: Filters and traversal
// ============================================================================

pub use filter::{
    new_arc_filter, ArcCondition, ArcConditionSet, ArcFilter, ArcFilterMatch, ArcFilterType, Evaluator,
    FnEvaluator, VertexProbe,
};
pub use traverse::{CollectorMode, NeighborhoodProbe, TraversalResult};

pub use index::{EncodeError, EnumSpace, Enumerator};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A lock or arc operation was refused.
    #[error("access denied ({reason}): {message}")]
    Access { reason: AccessReason, message: String },

    #[error("arcvector error: {0}")]
    ArcVector(String),

    #[error("vertex arc error: {0}")]
    VertexArc(String),

    #[error("enumeration error: {0}")]
    Enumeration(#[from] EncodeError),

    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("type mismatch: expected {expected}, got {got}")]
    TypeMismatch { expected: String, got: String },

    #[error("graph is readonly")]
    ReadonlyGraph,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("commit failed: {0}")]
    Commit(String),
}

impl Error {
    pub fn access(reason: AccessReason, message: impl Into<String>) -> Self {
        Self::Access { reason, message: message.into() }
    }

    /// The access reason behind a refused operation, if any.
    pub fn access_reason(&self) -> Option<AccessReason> {
        match self {
            Self::Access { reason, .. } => Some(*reason),
            Self::ReadonlyGraph => Some(AccessReason::ReadonlyGraph),
            Self::Commit(_) => Some(AccessReason::CommitFailed),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

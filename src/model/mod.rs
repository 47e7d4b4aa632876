//! # Graph Model
//!
//! The value types every layer shares: the bit-packed [`Predicator`]
//! labelling each arc, the matching functions over predicators, arcs and
//! vertex records.
//!
//! Design rule: nothing in here takes a vertex lock. Functions are pure
//! except for the atomic arc reference count on [`Vertex`].

pub mod predicator;
pub mod matching;
pub mod arc;
pub mod vertex;

pub use predicator::{
    ArcDirection, Ephemeral, EphemeralType, Modifier, ModifierClass, Predicator, PredicatorValue,
    Relationship, ValueComparison, ValueKind, TIME_EXPIRES_NEVER,
};
pub use matching::{
    match_generic, match_hamming, match_modifier, match_modifier_hamming, match_modifier_value,
    match_relationship, match_relationship_hamming, match_relationship_value, match_specific,
    match_specific_hamming, match_specific_value, match_value, dynamic_predicator_match,
    update_value_from_delta, update_value_from_ratio, DynamicTypeMismatch, PredicatorMatchFn,
    FLOAT_EPSILON,
};
pub use arc::{ArcHead, GraphArc, HeadLock, LockableArc};
pub use vertex::{
    validate_identifier, Manifestation, Vertex, VertexAttributes, VertexHandle, VertexId, VertexSpec,
};

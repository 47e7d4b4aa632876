//! # Arc Storage
//!
//! Per-vertex arc containers and the engine that deletes from them.
//!
//! ## Layers
//!
//! | Module | Role |
//! |--------|------|
//! | `framehash` | associative container with bulk visit-and-delete |
//! | `arcvector` | four-state arc cell, insert/lookup/remove dispatch, down-conversion |
//! | `delete` | count-then-mutate bulk deletion, reverse-side reconciliation |
//!
//! Nothing in here takes vertex locks. Callers hold the right lock and
//! hand the engine an [`ArcDisconnect`] that knows how to reach the other
//! side of each arc.

pub mod framehash;
pub mod arcvector;
pub mod delete;

pub use framehash::{FrameHash, Visit};
pub use arcvector::{ArcArray, ArcEntry, ArcSlot, ArcVector, ArcVectorKind, NeighborArcs, SetArc};
pub use delete::{delete_arcs, delete_predicators, ArcDisconnect, DecrefEvent, DeleteCount};

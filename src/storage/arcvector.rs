//! Arcvector: the per-vertex, per-direction arc container.
//!
//! ## Representations
//!
//! | Variant               | Holds                                                  |
//! |-----------------------|--------------------------------------------------------|
//! | `NoArcs`              | nothing                                                |
//! | `IndegreeCounterOnly` | count of forward-only arcs pointing here (inarcs only) |
//! | `Simple`              | one neighbor, one predicator, inline                   |
//! | `Multiple`            | map neighbor → single predicator or key → predicator   |
//!
//! Inserts only promote. Every removal path finishes with
//! [`ArcVector::down_convert`], so a cell never keeps a multi-arc map
//! holding one arc or fewer.

use smallvec::SmallVec;
use tracing::error;

use super::delete::{self, ArcDisconnect, Reconciled};
use super::framehash::{FrameHash, Visit};
use crate::graph::TimingBudget;
use crate::model::{match_generic, ArcHead, Predicator, VertexHandle, VertexId};

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArcVectorKind {
    NoArcs,
    IndegreeCounterOnly,
    Simple,
    Multiple,
}

/// Predicators stored for one neighbor inside a multi-arc map.
#[derive(Debug, Clone)]
pub enum ArcEntry {
    Single(Predicator),
    /// Keyed by [`Predicator::key`].
    Multiple(FrameHash<u64, Predicator>),
}

impl ArcEntry {
    pub fn len(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::Multiple(m) => m.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone)]
pub struct ArcSlot {
    pub vertex: VertexHandle,
    pub entry: ArcEntry,
}

/// Multi-arc map with its degree tracked alongside.
#[derive(Debug, Clone, Default)]
pub struct ArcArray {
    pub(crate) degree: i64,
    pub(crate) slots: FrameHash<VertexId, ArcSlot>,
}

/// All predicators to one neighbor, as handed to traversal.
#[derive(Debug, Clone)]
pub struct NeighborArcs {
    pub vertex: VertexHandle,
    pub predicators: SmallVec<[Predicator; 2]>,
    /// Came from a nested predicator map rather than an inline cell.
    pub multiple: bool,
}

/// Result of [`ArcVector::set_arc`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetArc {
    /// 1 if a new entry was inserted, 0 on overwrite.
    pub n_added: i64,
    /// Predicator now stored.
    pub stored: Predicator,
}

#[derive(Debug, Clone, Default)]
pub enum ArcVector {
    #[default]
    NoArcs,
    IndegreeCounterOnly(i64),
    Simple(ArcHead),
    Multiple(ArcArray),
}

// ============================================================================
// ArcArray
// ============================================================================

impl ArcArray {
    fn from_simple(head: ArcHead) -> Self {
        let mut slots = FrameHash::with_capacity(2);
        let id = head.id();
        slots.insert(id, ArcSlot { vertex: head.vertex, entry: ArcEntry::Single(head.predicator) });
        Self { degree: 1, slots }
    }

    pub fn degree(&self) -> i64 {
        self.degree
    }

    pub fn neighbors(&self) -> usize {
        self.slots.len()
    }

    fn insert(&mut self, head: &VertexHandle, predicator: Predicator) -> SetArc {
        let Some(slot) = self.slots.get_mut(&head.id()) else {
            self.slots.insert(head.id(), ArcSlot { vertex: head.clone(), entry: ArcEntry::Single(predicator) });
            self.degree += 1;
            return SetArc { n_added: 1, stored: predicator };
        };
        let set = match &mut slot.entry {
            ArcEntry::Single(p) if p.key() == predicator.key() => {
                *p = Predicator::update_if_accumulator(*p, predicator);
                SetArc { n_added: 0, stored: *p }
            }
            ArcEntry::Single(p) => {
                let mut map = FrameHash::with_capacity(2);
                map.insert(p.key(), *p);
                map.insert(predicator.key(), predicator);
                slot.entry = ArcEntry::Multiple(map);
                SetArc { n_added: 1, stored: predicator }
            }
            ArcEntry::Multiple(map) => match map.get_mut(&predicator.key()) {
                Some(p) => {
                    *p = Predicator::update_if_accumulator(*p, predicator);
                    SetArc { n_added: 0, stored: *p }
                }
                None => {
                    map.insert(predicator.key(), predicator);
                    SetArc { n_added: 1, stored: predicator }
                }
            },
        };
        self.degree += set.n_added;
        set
    }

    /// Remove arcs to one concrete neighbor.
    fn remove_from(
        &mut self,
        head: &VertexHandle,
        probe: Predicator,
        disconnect: &mut dyn ArcDisconnect,
        budget: &mut TimingBudget,
    ) -> i64 {
        let id = head.id();
        let Some(slot) = self.slots.get_mut(&id) else {
            return 0;
        };
        let n = match &mut slot.entry {
            ArcEntry::Single(p) => {
                if !match_generic(probe, *p) {
                    return 0;
                }
                match delete::disconnect_exact(disconnect, &slot.vertex, *p, 1, budget) {
                    Reconciled::Done => {
                        self.slots.remove(&id);
                        1
                    }
                    Reconciled::Pending => 0,
                    Reconciled::Failed => -1,
                }
            }
            ArcEntry::Multiple(map) => {
                let vertex = slot.vertex.clone();
                let n = if probe.is_full_wildcard() {
                    remove_multiple_arc(&vertex, map, probe, disconnect, budget)
                } else if probe.is_specific() && !probe.has_value() {
                    delete_specific_from_multiple_arc(&vertex, map, probe, disconnect, budget)
                } else {
                    delete::delete_predicators(&vertex, map, probe, disconnect, budget).into_sentinel()
                };
                match map.len() {
                    0 => {
                        self.slots.remove(&id);
                    }
                    1 => normalize_slot(slot),
                    _ => {}
                }
                n
            }
        };
        if n > 0 {
            self.degree -= n;
        }
        n
    }

    /// Collapse single-entry predicator maps and drop empty slots.
    pub(crate) fn normalize(&mut self) {
        self.slots.visit(|_, slot| {
            normalize_slot(slot);
            if slot.entry.is_empty() { Visit::Delete } else { Visit::Keep }
        });
    }

    fn count_entries(&self) -> i64 {
        self.slots.values().map(|s| s.entry.len() as i64).sum()
    }
}

fn normalize_slot(slot: &mut ArcSlot) {
    if let ArcEntry::Multiple(map) = &mut slot.entry {
        if let Some((_, p)) = map.take_single() {
            slot.entry = ArcEntry::Single(p);
        }
    }
}

/// Remove every predicator to `head`.
fn remove_multiple_arc(
    head: &VertexHandle,
    map: &mut FrameHash<u64, Predicator>,
    probe: Predicator,
    disconnect: &mut dyn ArcDisconnect,
    budget: &mut TimingBudget,
) -> i64 {
    let n = map.len() as i64;
    match delete::disconnect_exact(disconnect, head, probe, n, budget) {
        Reconciled::Done => {
            map.visit(|_, _| Visit::Delete);
            n
        }
        Reconciled::Pending => 0,
        Reconciled::Failed => -1,
    }
}

/// Remove exactly one key from a predicator map.
fn delete_specific_from_multiple_arc(
    head: &VertexHandle,
    map: &mut FrameHash<u64, Predicator>,
    probe: Predicator,
    disconnect: &mut dyn ArcDisconnect,
    budget: &mut TimingBudget,
) -> i64 {
    let key = probe.key();
    let Some(stored) = map.get(&key).copied() else {
        return 0;
    };
    match delete::disconnect_exact(disconnect, head, stored, 1, budget) {
        Reconciled::Done => {
            map.remove(&key);
            1
        }
        Reconciled::Pending => 0,
        Reconciled::Failed => -1,
    }
}

// ============================================================================
// ArcVector
// ============================================================================

impl ArcVector {
    pub fn kind(&self) -> ArcVectorKind {
        match self {
            Self::NoArcs => ArcVectorKind::NoArcs,
            Self::IndegreeCounterOnly(_) => ArcVectorKind::IndegreeCounterOnly,
            Self::Simple(_) => ArcVectorKind::Simple,
            Self::Multiple(_) => ArcVectorKind::Multiple,
        }
    }

    pub fn degree(&self) -> i64 {
        match self {
            Self::NoArcs => 0,
            Self::IndegreeCounterOnly(n) => *n,
            Self::Simple(_) => 1,
            Self::Multiple(a) => a.degree,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.degree() == 0
    }

    /// Holds reverse-tracked arcs (as opposed to a forward-only counter).
    pub fn has_regular_arcs(&self) -> bool {
        matches!(self, Self::Simple(_) | Self::Multiple(_))
    }

    pub fn is_indegree_counter(&self) -> bool {
        matches!(self, Self::IndegreeCounterOnly(_))
    }

    // ------------------------------------------------------------------------
    // Indegree counter
    // ------------------------------------------------------------------------

    /// Returns false if the cell holds regular arcs.
    pub fn increment_indegree_counter(&mut self, n: i64) -> bool {
        match self {
            Self::NoArcs => {
                *self = Self::IndegreeCounterOnly(n);
                true
            }
            Self::IndegreeCounterOnly(c) => {
                *c += n;
                true
            }
            _ => false,
        }
    }

    /// Returns the number actually subtracted.
    pub fn decrement_indegree_counter(&mut self, n: i64) -> i64 {
        let Self::IndegreeCounterOnly(c) = self else {
            return 0;
        };
        let taken = n.min(*c);
        *c -= taken;
        if *c == 0 {
            *self = Self::NoArcs;
        }
        taken
    }

    // ------------------------------------------------------------------------
    // Insert and lookup
    // ------------------------------------------------------------------------

    /// Number of entries [`set_arc`](Self::set_arc) would add.
    pub fn would_add(&self, head: VertexId, predicator: Predicator) -> i64 {
        let present = match self {
            Self::NoArcs | Self::IndegreeCounterOnly(_) => false,
            Self::Simple(h) => h.id() == head && h.predicator.key() == predicator.key(),
            Self::Multiple(a) => match a.slots.get(&head).map(|s| &s.entry) {
                None => false,
                Some(ArcEntry::Single(p)) => p.key() == predicator.key(),
                Some(ArcEntry::Multiple(m)) => m.contains_key(&predicator.key()),
            },
        };
        if present { 0 } else { 1 }
    }

    /// Insert or update the arc to `head` keyed by the predicator key.
    ///
    /// # Panics
    ///
    /// On an indegree counter cell; callers check compatibility first.
    pub fn set_arc(&mut self, head: &VertexHandle, predicator: Predicator) -> SetArc {
        match self {
            Self::NoArcs => {
                *self = Self::Simple(ArcHead::new(head.clone(), predicator));
                SetArc { n_added: 1, stored: predicator }
            }
            Self::IndegreeCounterOnly(_) => {
                panic!("set_arc on an indegree counter arcvector");
            }
            Self::Simple(h) if h.id() == head.id() && h.predicator.key() == predicator.key() => {
                h.predicator = Predicator::update_if_accumulator(h.predicator, predicator);
                SetArc { n_added: 0, stored: h.predicator }
            }
            Self::Simple(h) => {
                let mut array = ArcArray::from_simple(h.clone());
                let set = array.insert(head, predicator);
                *self = Self::Multiple(array);
                set
            }
            Self::Multiple(array) => array.insert(head, predicator),
        }
    }

    /// First arc to `head` matching `probe`. Specific probes are looked up
    /// by key inside predicator maps.
    pub fn get_arc(&self, head: VertexId, probe: Predicator) -> Option<ArcHead> {
        match self {
            Self::NoArcs | Self::IndegreeCounterOnly(_) => None,
            Self::Simple(h) => (h.id() == head && match_generic(probe, h.predicator)).then(|| h.clone()),
            Self::Multiple(a) => {
                let slot = a.slots.get(&head)?;
                let found = match &slot.entry {
                    ArcEntry::Single(p) => Some(*p).filter(|p| match_generic(probe, *p)),
                    ArcEntry::Multiple(m) if probe.is_specific() => {
                        m.get(&probe.key()).copied().filter(|p| match_generic(probe, *p))
                    }
                    ArcEntry::Multiple(m) => m.values().copied().find(|p| match_generic(probe, *p)),
                };
                found.map(|p| ArcHead::new(slot.vertex.clone(), p))
            }
        }
    }

    /// All predicators stored for `head`.
    pub fn arcs_to(&self, head: VertexId) -> SmallVec<[Predicator; 4]> {
        match self {
            Self::Simple(h) if h.id() == head => smallvec::smallvec![h.predicator],
            Self::Multiple(a) => match a.slots.get(&head).map(|s| &s.entry) {
                Some(ArcEntry::Single(p)) => smallvec::smallvec![*p],
                Some(ArcEntry::Multiple(m)) => m.values().copied().collect(),
                None => SmallVec::new(),
            },
            _ => SmallVec::new(),
        }
    }

    /// Count arcs matching `probe`, optionally restricted to one neighbor.
    pub fn count_matching(&self, head: Option<VertexId>, probe: Predicator) -> i64 {
        self.neighbors()
            .iter()
            .filter(|n| head.is_none_or(|h| h == n.vertex.id()))
            .map(|n| n.predicators.iter().filter(|p| match_generic(probe, **p)).count() as i64)
            .sum()
    }

    /// Snapshot of every neighbor and its predicators.
    pub fn neighbors(&self) -> Vec<NeighborArcs> {
        match self {
            Self::NoArcs | Self::IndegreeCounterOnly(_) => Vec::new(),
            Self::Simple(h) => vec![NeighborArcs {
                vertex: h.vertex.clone(),
                predicators: smallvec::smallvec![h.predicator],
                multiple: false,
            }],
            Self::Multiple(a) => a
                .slots
                .values()
                .map(|slot| match &slot.entry {
                    ArcEntry::Single(p) => NeighborArcs {
                        vertex: slot.vertex.clone(),
                        predicators: smallvec::smallvec![*p],
                        multiple: false,
                    },
                    ArcEntry::Multiple(m) => NeighborArcs {
                        vertex: slot.vertex.clone(),
                        predicators: m.values().copied().collect(),
                        multiple: true,
                    },
                })
                .collect(),
        }
    }

    /// Every stored arc as an [`ArcHead`].
    pub fn arcs(&self) -> Vec<ArcHead> {
        self.neighbors()
            .into_iter()
            .flat_map(|n| {
                let vertex = n.vertex;
                n.predicators.into_iter().map(move |p| ArcHead::new(vertex.clone(), p))
            })
            .collect()
    }

    // ------------------------------------------------------------------------
    // Removal
    // ------------------------------------------------------------------------

    /// Remove arcs matching `probe`, to `head` or to any neighbor.
    ///
    /// `disconnect` is told about each batch before it is erased and must
    /// confirm exactly that many. Returns the number removed, 0 when nothing
    /// matched or the other side was busy, -1 on timeout or inconsistency
    /// (the reason is left in `budget`).
    pub fn remove(
        &mut self,
        head: Option<&VertexHandle>,
        probe: Predicator,
        disconnect: &mut dyn ArcDisconnect,
        budget: &mut TimingBudget,
    ) -> i64 {
        let n = match self {
            Self::NoArcs | Self::IndegreeCounterOnly(_) => 0,
            Self::Simple(h) => {
                if head.is_some_and(|v| v.id() != h.id()) || !match_generic(probe, h.predicator) {
                    0
                } else {
                    match delete::disconnect_exact(disconnect, &h.vertex, h.predicator, 1, budget) {
                        Reconciled::Done => 1,
                        Reconciled::Pending => 0,
                        Reconciled::Failed => -1,
                    }
                }
            }
            Self::Multiple(array) => match head {
                Some(v) => array.remove_from(v, probe, disconnect, budget),
                None => delete::delete_arcs(array, probe, disconnect, budget),
            },
        };
        if let (1, Self::Simple(_)) = (n, &*self) {
            *self = Self::NoArcs;
        }
        self.down_convert();
        n
    }

    /// Restore the minimal representation.
    ///
    /// # Panics
    ///
    /// If a single-arc map does not hold a single inline predicator, which
    /// means the degree bookkeeping is corrupt.
    pub fn down_convert(&mut self) {
        match self {
            Self::IndegreeCounterOnly(0) => *self = Self::NoArcs,
            Self::Multiple(array) => {
                array.normalize();
                debug_assert_eq!(array.degree, array.count_entries(), "arc array degree drift");
                match array.degree {
                    0 => *self = Self::NoArcs,
                    1 => {
                        let Some((_, slot)) = array.slots.take_single() else {
                            panic!("arc array of degree 1 has {} neighbors", array.slots.len());
                        };
                        let ArcEntry::Single(p) = slot.entry else {
                            panic!("arc array of degree 1 holds a predicator map");
                        };
                        *self = Self::Simple(ArcHead::new(slot.vertex, p));
                    }
                    _ => {}
                }
            }
            _ => {}
        }
    }

    /// Release container capacity left by deletions.
    pub fn compact(&mut self) {
        if let Self::Multiple(array) = self {
            array.slots.compact();
        }
    }

    /// Verify the degree field against the stored entries.
    pub fn check_degree(&self) -> bool {
        match self {
            Self::Multiple(a) => {
                let ok = a.degree == a.count_entries() && a.degree > 1;
                if !ok {
                    error!(degree = a.degree, entries = a.count_entries(), "CRITICAL arc array degree mismatch");
                }
                ok
            }
            _ => true,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Modifier, Relationship, Vertex, VertexAttributes};
    use crate::storage::DecrefEvent;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use std::sync::Arc;

    fn vertex(id: u64) -> VertexHandle {
        Arc::new(Vertex::new(VertexId(id), format!("v{id}"), VertexAttributes::default()))
    }

    fn rel(code: u16) -> Relationship {
        Relationship(0x0200 + code)
    }

    fn pred(code: u16, v: u32) -> Predicator {
        Predicator::new(rel(code), Modifier::Unsigned, v)
    }

    fn remove(av: &mut ArcVector, head: Option<&VertexHandle>, probe: Predicator) -> i64 {
        av.remove(head, probe, &mut DecrefEvent, &mut TimingBudget::zero())
    }

    #[test]
    fn test_first_insert_is_simple() {
        let b = vertex(2);
        let mut av = ArcVector::NoArcs;
        assert_eq!(av.set_arc(&b, pred(1, 0)).n_added, 1);
        assert_eq!(av.kind(), ArcVectorKind::Simple);
        assert_eq!(av.degree(), 1);
    }

    #[test]
    fn test_multiple_keys_same_head() {
        let b = vertex(2);
        b.incref_arcs(3);
        let mut av = ArcVector::NoArcs;
        for code in 1..=3 {
            av.set_arc(&b, pred(code, code as u32));
            if code == 2 {
                assert_eq!(av.kind(), ArcVectorKind::Multiple);
            }
        }
        assert_eq!(av.degree(), 3);

        assert_eq!(remove(&mut av, Some(&b), Predicator::key_probe(rel(2), Modifier::Unsigned)), 1);
        assert_eq!(av.degree(), 2);
        assert_eq!(av.kind(), ArcVectorKind::Multiple);

        assert_eq!(remove(&mut av, Some(&b), Predicator::key_probe(rel(1), Modifier::Unsigned)), 1);
        assert_eq!(av.kind(), ArcVectorKind::Simple);
        let ArcVector::Simple(h) = &av else { unreachable!() };
        assert_eq!(h.predicator.relationship(), rel(3));
        assert_eq!(b.arc_refs(), 1);
    }

    #[test]
    fn test_set_arc_idempotent() {
        let b = vertex(2);
        let mut av = ArcVector::NoArcs;
        let p = pred(1, 9);
        av.set_arc(&b, p);
        assert_eq!(av.set_arc(&b, p).n_added, 0);
        assert_eq!(av.degree(), 1);
        let got = av.get_arc(b.id(), Predicator::key_probe(rel(1), Modifier::Unsigned));
        assert_eq!(got.map(|h| h.predicator), Some(p));
    }

    #[test]
    fn test_overwrite_updates_value() {
        let b = vertex(2);
        let c = vertex(3);
        let mut av = ArcVector::NoArcs;
        av.set_arc(&b, pred(1, 1));
        av.set_arc(&c, pred(1, 1));
        assert_eq!(av.set_arc(&c, pred(1, 5)).n_added, 0);
        assert_eq!(av.get_arc(c.id(), pred(1, 0).with_value_bits(0)).map(|h| h.predicator.as_u32()), Some(5));
        assert_eq!(av.degree(), 2);
    }

    #[test]
    fn test_counter_accumulates() {
        let b = vertex(2);
        let mut av = ArcVector::NoArcs;
        let p = Predicator::new(rel(1), Modifier::Counter, 2u32);
        av.set_arc(&b, p);
        assert_eq!(av.set_arc(&b, p).stored.as_u32(), 4);
    }

    #[test]
    fn test_wildcard_remove_across_neighbors() {
        let (b, c, d) = (vertex(2), vertex(3), vertex(4));
        for v in [&b, &c, &d] {
            v.incref_arcs(2);
        }
        let mut av = ArcVector::NoArcs;
        for v in [&b, &c, &d] {
            av.set_arc(v, pred(1, 0));
            av.set_arc(v, pred(2, 0));
        }
        assert_eq!(av.degree(), 6);
        assert_eq!(remove(&mut av, None, Predicator::relationship_probe(rel(1))), 3);
        assert_eq!(av.degree(), 3);
        assert!(av.check_degree());
        assert_eq!(remove(&mut av, None, Predicator::NONE), 3);
        assert_eq!(av.kind(), ArcVectorKind::NoArcs);
        assert_eq!(b.arc_refs(), 0);
    }

    #[test]
    fn test_value_range_remove() {
        let b = vertex(2);
        b.incref_arcs(4);
        let mut av = ArcVector::NoArcs;
        for (code, v) in [(1, 4), (2, 5), (3, 10), (4, 11)] {
            av.set_arc(&b, pred(code, v));
        }
        let probe = Predicator::NONE
            .with_modifier(Modifier::Unsigned)
            .with_value(10u32)
            .with_comparison(crate::model::ValueComparison::Gte);
        assert_eq!(remove(&mut av, Some(&b), probe), 2);
        assert_eq!(av.degree(), 2);
    }

    #[test]
    fn test_indegree_counter() {
        let mut av = ArcVector::NoArcs;
        assert!(av.increment_indegree_counter(2));
        assert_eq!(av.degree(), 2);
        assert_eq!(av.decrement_indegree_counter(2), 2);
        assert_eq!(av.kind(), ArcVectorKind::NoArcs);
        let mut regular = ArcVector::NoArcs;
        regular.set_arc(&vertex(9), pred(1, 1));
        assert!(!regular.increment_indegree_counter(1));
    }

    #[derive(Debug, Clone)]
    enum Op {
        Set(u64, u16),
        RemoveKey(u64, u16),
        RemoveHead(u64),
        RemoveRel(u16),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (1u64..4, 1u16..4).prop_map(|(h, r)| Op::Set(h, r)),
            (1u64..4, 1u16..4).prop_map(|(h, r)| Op::RemoveKey(h, r)),
            (1u64..4).prop_map(Op::RemoveHead),
            (1u16..4).prop_map(Op::RemoveRel),
        ]
    }

    proptest! {
        #[test]
        fn prop_representation_stays_minimal(ops in proptest::collection::vec(op(), 1..40)) {
            let heads: Vec<VertexHandle> = (0..4).map(vertex).collect();
            let mut av = ArcVector::NoArcs;
            for op in ops {
                match op {
                    Op::Set(h, r) => {
                        let n = av.set_arc(&heads[h as usize], pred(r, 0)).n_added;
                        heads[h as usize].incref_arcs(n);
                    }
                    Op::RemoveKey(h, r) => {
                        remove(&mut av, Some(&heads[h as usize]), Predicator::key_probe(rel(r), Modifier::Unsigned));
                    }
                    Op::RemoveHead(h) => {
                        remove(&mut av, Some(&heads[h as usize]), Predicator::NONE);
                    }
                    Op::RemoveRel(r) => {
                        remove(&mut av, None, Predicator::relationship_probe(rel(r)));
                    }
                }
                prop_assert_eq!(av.degree(), av.arcs().len() as i64);
                if av.kind() == ArcVectorKind::Multiple {
                    prop_assert!(av.degree() > 1);
                }
                let refs: i64 = heads.iter().map(|h| h.arc_refs()).sum();
                prop_assert_eq!(refs, av.degree());
            }
        }
    }
}

//! Vertex index and name enumeration.
//!
//! The [`VertexIndex`] owns the canonical handle of every live vertex
//! together with its lock descriptor; it is only touched under the
//! graph state lock. The [`Enumerator`] maps relationship and vertex type
//! names to the compact codes stored in predicators and vertices.

use hashbrown::HashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::graph::VertexDescriptor;
use crate::model::{Relationship, VertexHandle, VertexId};
use crate::{Error, Result};

// ============================================================================
// Vertex index
// ============================================================================

/// Indexed vertex: canonical handle plus lock state.
pub(crate) struct VertexSlot {
    pub handle: VertexHandle,
    pub descriptor: VertexDescriptor,
}

#[derive(Default)]
pub(crate) struct VertexIndex {
    by_name: HashMap<String, VertexId>,
    slots: HashMap<VertexId, VertexSlot>,
    readonly: bool,
}

impl VertexIndex {
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn lookup(&self, identifier: &str) -> Option<&VertexSlot> {
        self.by_name.get(identifier).and_then(|id| self.slots.get(id))
    }

    pub fn slot(&self, id: VertexId) -> Option<&VertexSlot> {
        self.slots.get(&id)
    }

    pub fn slot_mut(&mut self, id: VertexId) -> Option<&mut VertexSlot> {
        self.slots.get_mut(&id)
    }

    pub fn insert(&mut self, handle: VertexHandle, descriptor: VertexDescriptor) -> Result<()> {
        if self.readonly {
            return Err(Error::ReadonlyGraph);
        }
        self.by_name.insert(handle.identifier().to_string(), handle.id());
        self.slots.insert(handle.id(), VertexSlot { handle, descriptor });
        Ok(())
    }

    pub fn remove(&mut self, id: VertexId) -> Option<VertexSlot> {
        let slot = self.slots.remove(&id)?;
        self.by_name.remove(slot.handle.identifier());
        Some(slot)
    }

    pub fn set_readonly(&mut self, readonly: bool) {
        self.readonly = readonly;
    }

    pub fn is_readonly(&self) -> bool {
        self.readonly
    }

    pub fn handles(&self) -> impl Iterator<Item = &VertexHandle> {
        self.slots.values().map(|s| &s.handle)
    }

    pub fn slots(&self) -> impl Iterator<Item = &VertexSlot> {
        self.slots.values()
    }
}

// ============================================================================
// Enumerator
// ============================================================================

/// Failure to map a name to a code.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum EncodeError {
    #[error("name not found: {0}")]
    NotFound(String),

    #[error("code space exhausted")]
    Exhausted,

    #[error("invalid name: {0}")]
    Invalid(String),
}

/// Which code space a name belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EnumSpace {
    Relationship,
    VertexType,
}

impl EnumSpace {
    fn range(self) -> (u16, u16) {
        match self {
            Self::Relationship => (Relationship::USER_START, Relationship::USER_END),
            Self::VertexType => (0x01, 0xfe),
        }
    }
}

#[derive(Debug, Default)]
struct CodeTable {
    by_name: HashMap<String, u16>,
    by_code: HashMap<u16, String>,
}

/// In-memory name ↔ code tables.
#[derive(Debug, Default)]
pub struct Enumerator {
    relationships: RwLock<CodeTable>,
    types: RwLock<CodeTable>,
}

impl Enumerator {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self, space: EnumSpace) -> &RwLock<CodeTable> {
        match space {
            EnumSpace::Relationship => &self.relationships,
            EnumSpace::VertexType => &self.types,
        }
    }

    fn validate(name: &str) -> std::result::Result<(), EncodeError> {
        if name.is_empty() || name.len() > 255 || name == "*" || name.chars().any(char::is_control) {
            return Err(EncodeError::Invalid(name.to_string()));
        }
        Ok(())
    }

    /// Code for `name`, assigning the next free code if it is new.
    pub fn encode(&self, space: EnumSpace, name: &str) -> std::result::Result<u16, EncodeError> {
        Self::validate(name)?;
        if let Some(code) = self.table(space).read().by_name.get(name) {
            return Ok(*code);
        }
        let mut table = self.table(space).write();
        if let Some(code) = table.by_name.get(name) {
            return Ok(*code);
        }
        let (start, end) = space.range();
        let code = start + table.by_name.len() as u16;
        if code > end {
            return Err(EncodeError::Exhausted);
        }
        table.by_name.insert(name.to_string(), code);
        table.by_code.insert(code, name.to_string());
        Ok(code)
    }

    /// Code for an existing `name`.
    pub fn lookup(&self, space: EnumSpace, name: &str) -> std::result::Result<u16, EncodeError> {
        Self::validate(name)?;
        self.table(space)
            .read()
            .by_name
            .get(name)
            .copied()
            .ok_or_else(|| EncodeError::NotFound(name.to_string()))
    }

    pub fn decode(&self, space: EnumSpace, code: u16) -> Option<String> {
        self.table(space).read().by_code.get(&code).cloned()
    }

    pub fn encode_relationship(&self, name: &str) -> Result<Relationship> {
        Ok(Relationship(self.encode(EnumSpace::Relationship, name)?))
    }

    pub fn lookup_relationship(&self, name: &str) -> Result<Relationship> {
        Ok(Relationship(self.lookup(EnumSpace::Relationship, name)?))
    }

    pub fn encode_vertex_type(&self, name: &str) -> Result<u8> {
        Ok(self.encode(EnumSpace::VertexType, name)? as u8)
    }

    pub fn lookup_vertex_type(&self, name: &str) -> Result<u8> {
        Ok(self.lookup(EnumSpace::VertexType, name)? as u8)
    }

    pub fn len(&self, space: EnumSpace) -> usize {
        self.table(space).read().by_name.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_assigns_sequential_codes() {
        let e = Enumerator::new();
        assert_eq!(e.encode_relationship("knows").unwrap(), Relationship(0x0200));
        assert_eq!(e.encode_relationship("likes").unwrap(), Relationship(0x0201));
        assert_eq!(e.encode_relationship("knows").unwrap(), Relationship(0x0200));
        assert_eq!(e.decode(EnumSpace::Relationship, 0x0201).as_deref(), Some("likes"));
    }

    #[test]
    fn test_lookup_not_found() {
        let e = Enumerator::new();
        assert!(matches!(
            e.lookup_relationship("nope"),
            Err(Error::Enumeration(EncodeError::NotFound(_)))
        ));
        assert!(matches!(
            e.encode_relationship(""),
            Err(Error::Enumeration(EncodeError::Invalid(_)))
        ));
    }

    #[test]
    fn test_type_space_exhausted() {
        let e = Enumerator::new();
        for i in 0..0xfe {
            e.encode_vertex_type(&format!("t{i}")).unwrap();
        }
        assert_eq!(e.len(EnumSpace::VertexType), 0xfe);
        assert_eq!(e.encode(EnumSpace::VertexType, "one-too-many"), Err(EncodeError::Exhausted));
    }
}

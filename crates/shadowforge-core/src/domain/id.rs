//! Identity types for entities, attributes and dependency-graph nodes.

use std::fmt;

/// Stable, unique identity of an entity.
///
/// Ordering on `EntityId` is the deterministic tie-breaker used everywhere
/// two entities would otherwise compare equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EntityId(pub u64);

impl From<u64> for EntityId {
    fn from(id: u64) -> Self {
        EntityId(id)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Index of an attribute in a [`ShadowRegistry`](super::ShadowRegistry).
///
/// Attribute ids are global: two entity types never share one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AttrId(pub(crate) u32);

impl AttrId {
    /// Returns the position of this attribute in the registry.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    #[inline]
    pub(crate) fn from_index(index: usize) -> Self {
        AttrId(index as u32)
    }
}

/// A node of the dependency graph: one attribute of one entity.
///
/// Ordered by entity first, then attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeKey {
    pub entity: EntityId,
    pub attr: AttrId,
}

impl NodeKey {
    #[inline]
    pub fn new(entity: EntityId, attr: AttrId) -> Self {
        Self { entity, attr }
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.entity, self.attr.0)
    }
}

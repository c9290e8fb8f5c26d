//! Attribute and relation descriptors.

use crate::domain::{AttrId, AttributeKind, Cardinality, RemovalPolicy, Value};
use crate::error::{Result, ShadowError};

use super::{ResolvedRule, ShadowRegistry};

/// Describes one attribute of an entity type at runtime.
#[derive(Debug, Clone)]
pub struct AttributeDescriptor {
    pub id: AttrId,
    /// Index of the owning entity type.
    pub entity_type: usize,
    pub name: String,
    /// Position of the value inside an entity record.
    pub slot: usize,
    pub kind: AttributeKind,
    /// Value before the first derivation or when the draft omits it.
    pub default: Value,
    /// Present when this decision attribute points at other entities.
    pub relation: Option<RelationDescriptor>,
    /// Present exactly when `kind` is `Derived`.
    pub rule: Option<ResolvedRule>,
}

impl AttributeDescriptor {
    pub fn is_relation(&self) -> bool {
        self.relation.is_some()
    }
}

/// Resolved relation metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationDescriptor {
    pub target_type: usize,
    pub cardinality: Cardinality,
    pub removal: RemovalPolicy,
    /// Present when the relation maintains an inverse mirror on its targets.
    pub inverse: Option<InverseDescriptor>,
}

impl RelationDescriptor {
    /// The value of this relation when it points nowhere.
    pub fn empty_value(&self) -> Value {
        match self.cardinality {
            Cardinality::One => Value::Null,
            Cardinality::Many => Value::Refs(Vec::new()),
        }
    }
}

/// Inverse mirror metadata for a relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InverseDescriptor {
    /// Decision attribute of the source type ordering the mirror; identity order when absent.
    pub order_key: Option<AttrId>,
}

/// Declaration of a relation attribute.
///
/// # Example
///
/// ```
/// use shadowforge_core::{RelationDef, RemovalPolicy};
///
/// let employee = RelationDef::one("Employee").mirrored_by("departure_time");
/// let predecessors = RelationDef::many("Allocation")
///     .removal(RemovalPolicy::Splice)
///     .mirrored();
/// # let _ = (employee, predecessors);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationDef {
    pub(crate) target_type: String,
    pub(crate) cardinality: Cardinality,
    pub(crate) removal: RemovalPolicy,
    pub(crate) mirror: Option<Option<String>>,
}

impl RelationDef {
    /// A relation holding at most one target.
    pub fn one(target_type: impl Into<String>) -> Self {
        Self::new(target_type, Cardinality::One)
    }

    /// A relation holding a set of targets.
    pub fn many(target_type: impl Into<String>) -> Self {
        Self::new(target_type, Cardinality::Many)
    }

    fn new(target_type: impl Into<String>, cardinality: Cardinality) -> Self {
        Self {
            target_type: target_type.into(),
            cardinality,
            removal: RemovalPolicy::Detach,
            mirror: None,
        }
    }

    pub fn removal(mut self, policy: RemovalPolicy) -> Self {
        self.removal = policy;
        self
    }

    /// Maintains an inverse mirror ordered by source identity.
    pub fn mirrored(mut self) -> Self {
        self.mirror = Some(None);
        self
    }

    /// Maintains an inverse mirror ordered by a decision attribute of the
    /// source, ties broken by source identity.
    pub fn mirrored_by(mut self, order_key: impl Into<String>) -> Self {
        self.mirror = Some(Some(order_key.into()));
        self
    }
}

/// Anything that names an attribute of a given entity type.
pub trait AttrSelector {
    fn select(&self, registry: &ShadowRegistry, entity_type: usize) -> Result<AttrId>;
}

impl AttrSelector for AttrId {
    fn select(&self, registry: &ShadowRegistry, entity_type: usize) -> Result<AttrId> {
        match registry.attributes().get(self.index()) {
            Some(desc) if desc.entity_type == entity_type => Ok(*self),
            _ => Err(ShadowError::UnknownAttribute {
                entity_type: registry.entity_type(entity_type).name.clone(),
                attribute: format!("<{}>", self.index()),
            }),
        }
    }
}

impl AttrSelector for &str {
    fn select(&self, registry: &ShadowRegistry, entity_type: usize) -> Result<AttrId> {
        registry.resolve(entity_type, self)
    }
}

impl AttrSelector for String {
    fn select(&self, registry: &ShadowRegistry, entity_type: usize) -> Result<AttrId> {
        registry.resolve(entity_type, self)
    }
}

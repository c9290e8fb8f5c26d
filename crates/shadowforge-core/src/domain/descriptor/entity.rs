//! Entity type descriptor and its declaration builder.

use crate::domain::{AttrId, Value};

use super::{DerivationRule, RelationDef};

/// Describes an entity type at runtime.
#[derive(Debug, Clone)]
pub struct EntityTypeDescriptor {
    pub name: String,
    pub index: usize,
    /// All attributes, in slot order.
    pub attributes: Vec<AttrId>,
    /// Derived attributes ordered so same-entity reads come first.
    pub derivation_order: Vec<AttrId>,
}

impl EntityTypeDescriptor {
    pub fn attribute_count(&self) -> usize {
        self.attributes.len()
    }
}

#[derive(Debug, Clone)]
pub(crate) enum AttributeDecl {
    Decision,
    Relation(RelationDef),
    Derived(DerivationRule),
}

/// Declares the attributes of one entity type.
///
/// Used through [`RegistryBuilder::entity`](super::RegistryBuilder::entity).
#[derive(Debug, Clone)]
pub struct EntityTypeBuilder {
    pub(crate) name: String,
    pub(crate) attributes: Vec<(String, Value, AttributeDecl)>,
}

impl EntityTypeBuilder {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
        }
    }

    /// Adds a decision attribute with the value it takes when a draft omits it.
    pub fn decision(mut self, name: impl Into<String>, default: impl Into<Value>) -> Self {
        self.attributes
            .push((name.into(), default.into(), AttributeDecl::Decision));
        self
    }

    /// Adds a relation attribute; it starts out pointing nowhere.
    pub fn relation(mut self, name: impl Into<String>, def: RelationDef) -> Self {
        self.attributes
            .push((name.into(), Value::Null, AttributeDecl::Relation(def)));
        self
    }

    /// Adds a derived attribute.
    pub fn derived(
        mut self,
        name: impl Into<String>,
        default: impl Into<Value>,
        rule: DerivationRule,
    ) -> Self {
        self.attributes
            .push((name.into(), default.into(), AttributeDecl::Derived(rule)));
        self
    }
}

//! Runtime metadata: entity types, attributes and derivation rules.
//!
//! The registry is declared once with a by-value builder and validated in
//! [`RegistryBuilder::build`]; afterwards it is immutable and shared behind
//! an `Arc`.

mod attribute;
mod entity;
mod registry;
mod rule;


pub use attribute::{
    AttrSelector, AttributeDescriptor, InverseDescriptor, RelationDef, RelationDescriptor,
};
pub use entity::{EntityTypeBuilder, EntityTypeDescriptor};
pub use registry::{RegistryBuilder, ShadowRegistry};
pub use rule::{DerivationRule, RelatedValues, ResolvedRule, RuleInput, RuleReads, Traversal};

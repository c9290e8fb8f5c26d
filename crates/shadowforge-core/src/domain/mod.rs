//! Domain model for shadow-variable maintenance
//!
//! These types describe the entity graph:
//! - `EntityId`, `AttrId`, `NodeKey`: stable identities
//! - `Value`: attribute values, totally ordered
//! - `ShadowRegistry`: decision attributes, relations and derivation rules per entity type
//! - `EntityDraft`: initial decision values of an entity about to be registered

mod descriptor;
mod draft;
mod id;
mod value;
mod variable;


pub use descriptor::{
    AttrSelector, AttributeDescriptor, DerivationRule, EntityTypeBuilder, EntityTypeDescriptor,
    InverseDescriptor, RegistryBuilder, RelatedValues, RelationDef, RelationDescriptor,
    ResolvedRule, RuleInput, RuleReads, ShadowRegistry, Traversal,
};
pub use draft::EntityDraft;
pub use id::{AttrId, EntityId, NodeKey};
pub use value::Value;
pub use variable::{AttributeKind, Cardinality, RemovalPolicy};

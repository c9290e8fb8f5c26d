//! ShadowForge Core - entity storage and shadow-variable metadata
//!
//! This crate provides the passive half of shadow-variable maintenance:
//! - Identity and value types for entities and their attributes
//! - The derivation-rule registry, validated once at startup
//! - The entity store holding attribute values by stable identity
//! - Inverse mirrors: ordered reverse views of relation attributes
//!
//! Propagation, dependency tracking and edit sessions live in
//! `shadowforge-engine`.

pub mod domain;
pub mod error;
pub mod store;
pub mod supply;

pub use domain::{
    AttrId, AttrSelector, AttributeDescriptor, AttributeKind, Cardinality, DerivationRule,
    EntityDraft, EntityId, EntityTypeBuilder, EntityTypeDescriptor, InverseDescriptor, NodeKey,
    RegistryBuilder, RelatedValues, RelationDef, RelationDescriptor, RemovalPolicy, ResolvedRule,
    RuleInput, RuleReads, ShadowRegistry, Traversal, Value,
};
pub use error::{Result, ShadowError};
pub use store::{EntityRecord, EntityStore};
pub use supply::{InverseMirror, InverseMirrors, InverseView, NeighborChange};

//! Error types for ShadowForge

use thiserror::Error;

use crate::domain::EntityId;

/// Main error type for ShadowForge operations.
///
/// Every variant is raised before the entity store is mutated by the
/// failing call. Propagation itself has no failure mode.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShadowError {
    /// Operation on an identity that is not registered.
    #[error("Unknown entity: {0}")]
    UnknownEntity(EntityId),

    /// Registration of an identity that is already registered.
    #[error("Duplicate entity: {0}")]
    DuplicateEntity(EntityId),

    /// Reference to an entity type the registry does not declare.
    #[error("Unknown entity type: {0}")]
    UnknownEntityType(String),

    /// Reference to an attribute its entity type does not declare.
    #[error("Unknown attribute: {entity_type}.{attribute}")]
    UnknownAttribute {
        entity_type: String,
        attribute: String,
    },

    /// Direct write to a derived attribute.
    #[error("Attribute {entity_type}.{attribute} is derived and cannot be set directly")]
    InvalidAttributeKind {
        entity_type: String,
        attribute: String,
    },

    /// A value whose shape does not fit the attribute (e.g. a relation target of the wrong type).
    #[error("Invalid value for {attribute}: {reason}")]
    InvalidValue { attribute: String, reason: String },

    /// The dependency graph would contain a cycle.
    #[error("Cyclic dependency: {0}")]
    CyclicDependency(String),

    /// `begin_edit` while another edit session is open.
    #[error("An edit session is already active")]
    SessionAlreadyActive,

    /// An edit operation outside of an edit session.
    #[error("No edit session is active")]
    NoActiveSession,

    /// An edit operation on a session aborted by an earlier fatal error.
    #[error("The edit session was aborted")]
    SessionAborted,

    /// Invalid derivation-rule registry definition.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Maintained state disagrees with a from-scratch derivation (assert modes only).
    #[error("Shadow state corrupted: {0}")]
    Corrupted(String),
}

/// Result type alias for ShadowForge operations
pub type Result<T> = std::result::Result<T, ShadowError>;

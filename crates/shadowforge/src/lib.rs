//! ShadowForge - incremental shadow variables in Rust
//!
//! Declare derivation rules once, load your entities, then edit decisions
//! inside sessions. Derived attributes and inverse mirrors stay settled after
//! every call, and each session reports exactly what changed.
//!
//! # Example
//!
//! ```rust
//! use shadowforge::prelude::*;
//!
//! let registry = ShadowRegistry::builder()
//!     .entity("Shift", |t| {
//!         t.decision("hours", 0)
//!             .relation("worker", RelationDef::one("Worker").mirrored())
//!     })
//!     .entity("Worker", |t| {
//!         t.derived(
//!             "total_hours",
//!             0,
//!             DerivationRule::inverse("Shift", "worker", ["hours"])
//!                 .compute(|input| Value::Int(input.related_ints(0).sum())),
//!         )
//!     })
//!     .build()
//!     .unwrap();
//!
//! let drafts = [
//!     EntityDraft::new(1u64, "Worker"),
//!     EntityDraft::new(10u64, "Shift").with("hours", 8).with("worker", EntityId(1)),
//! ];
//! let mut director = ShadowDirector::load(registry, &drafts).unwrap();
//!
//! let ((), changes) = director
//!     .edit(|d| d.set_decision(EntityId(10), "hours", 6).map(|_| ()))
//!     .unwrap();
//!
//! assert_eq!(director.get(EntityId(1), "total_hours").unwrap(), &Value::Int(6));
//! assert_eq!(changes.derived().count(), 1);
//! ```

// Entity model and registry
pub use shadowforge_core::{
    AttrId, AttrSelector, AttributeKind, Cardinality, DerivationRule, EntityDraft, EntityId,
    NodeKey, RegistryBuilder, RelatedValues, RelationDef, RemovalPolicy, RuleInput,
    ShadowRegistry, Traversal, Value,
};

// Errors
pub use shadowforge_core::{Result, ShadowError};

// Passive structures, for read access
pub use shadowforge_core::{EntityStore, InverseMirrors, InverseView};

// Engine
pub use shadowforge_engine::{
    AttributeChange, ChangeList, DependencyGraph, ShadowDirector, ShadowListener, Snapshot,
};

// Configuration
pub use shadowforge_config::{ConfigError, EngineConfig, EnvironmentMode};

/// Installs the colored console subscriber.
///
/// Safe to call multiple times - only the first call has effect.
#[cfg(feature = "console")]
pub fn init_console() {
    shadowforge_console::init();
}

pub mod prelude {
    pub use super::{
        AttributeKind, DerivationRule, EntityDraft, EntityId, RelationDef, RemovalPolicy,
        ShadowRegistry, Value,
    };
    pub use super::{AttributeChange, ChangeList, ShadowDirector, ShadowListener};
    pub use super::{EngineConfig, EnvironmentMode};
    pub use super::{Result, ShadowError};
}

//! Hooks for the external score consumer.
//!
//! A listener observes an edit session from the outside: every decision
//! write and derived commit, entity arrivals and departures, and the final
//! change list. Listeners never mutate the store.

use shadowforge_core::{EntityId, EntityStore, NodeKey, ShadowError, Value};

use crate::director::{AttributeChange, ChangeList};

/// Observer of edit sessions.
///
/// Every method defaults to a no-op, so implementations override only what
/// they consume.
///
/// # Implementation Notes
///
/// - `before_attribute_changed` sees the store before the write; use it to
///   retract the old value from incremental aggregates
/// - `after_attribute_changed` fires once per write, including intermediate
///   values the final change list coalesces away
/// - Derived commits run inside propagation, after every input is settled
pub trait ShadowListener: Send {
    /// Called before `node` is overwritten with `new`.
    fn before_attribute_changed(&mut self, _store: &EntityStore, _node: NodeKey, _new: &Value) {}

    /// Called after `node` was overwritten.
    fn after_attribute_changed(&mut self, _change: &AttributeChange) {}

    /// Called when a decision write was rolled back because it would close
    /// a dependency cycle.
    fn change_rejected(&mut self, _node: NodeKey, _error: &ShadowError) {}

    /// Called once an added entity's derived attributes are settled.
    fn after_entity_added(&mut self, _store: &EntityStore, _entity: EntityId) {}

    /// Called before an entity's relations are cleared for removal.
    fn before_entity_removed(&mut self, _store: &EntityStore, _entity: EntityId) {}

    /// Called when an edit session ends, with its change list.
    fn after_edit(&mut self, _changes: &ChangeList) {}
}

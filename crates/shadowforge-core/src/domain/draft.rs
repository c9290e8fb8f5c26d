//! Entity drafts: what the external mutator hands over when registering an entity.

use super::{EntityId, Value};

/// Initial decision values of an entity about to be registered.
///
/// Attributes left out take their declared default. Derived attributes
/// must not be given; they are computed on registration.
///
/// # Example
///
/// ```
/// use shadowforge_core::{EntityDraft, EntityId, Value};
///
/// let draft = EntityDraft::new(2u64, "Allocation")
///     .with("duration", 3)
///     .with("predecessors", Value::refs([1u64]));
///
/// assert_eq!(draft.id, EntityId(2));
/// assert_eq!(draft.value("duration"), Some(&Value::Int(3)));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct EntityDraft {
    pub id: EntityId,
    pub entity_type: String,
    pub values: Vec<(String, Value)>,
}

impl EntityDraft {
    pub fn new(id: impl Into<EntityId>, entity_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            entity_type: entity_type.into(),
            values: Vec::new(),
        }
    }

    /// Sets an initial decision value; a later call for the same name wins.
    pub fn with(mut self, attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        let attribute = attribute.into();
        let value = value.into();
        match self.values.iter_mut().find(|(name, _)| *name == attribute) {
            Some(slot) => slot.1 = value,
            None => self.values.push((attribute, value)),
        }
        self
    }

    pub fn value(&self, attribute: &str) -> Option<&Value> {
        self.values
            .iter()
            .find(|(name, _)| name == attribute)
            .map(|(_, value)| value)
    }
}

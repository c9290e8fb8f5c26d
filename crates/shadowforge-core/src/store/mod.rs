//! Entity store: attribute values by stable identity.
//!
//! The store is passive. Writes to decision attributes leave a dirty marker
//! behind that the engine collects with [`EntityStore::take_dirty`]; nothing
//! here propagates.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::domain::{
    AttrId, AttrSelector, Cardinality, EntityDraft, EntityId, NodeKey, ShadowRegistry, Value,
};
use crate::error::{Result, ShadowError};


/// Attribute values of one entity, indexed by attribute slot.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityRecord {
    entity_type: usize,
    values: Vec<Value>,
}

impl EntityRecord {
    pub fn entity_type(&self) -> usize {
        self.entity_type
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }
}

/// Owns every registered entity and its attribute values.
#[derive(Debug, Clone)]
pub struct EntityStore {
    registry: Arc<ShadowRegistry>,
    records: BTreeMap<EntityId, EntityRecord>,
    dirty: Vec<NodeKey>,
}

impl EntityStore {
    pub fn new(registry: Arc<ShadowRegistry>) -> Self {
        Self {
            registry,
            records: BTreeMap::new(),
            dirty: Vec::new(),
        }
    }

    pub fn registry(&self) -> &Arc<ShadowRegistry> {
        &self.registry
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, entity: EntityId) -> bool {
        self.records.contains_key(&entity)
    }

    /// Registered identities in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.records.keys().copied()
    }

    pub fn record(&self, entity: EntityId) -> Option<&EntityRecord> {
        self.records.get(&entity)
    }

    /// Returns the entity type index of a registered entity.
    pub fn entity_type(&self, entity: EntityId) -> Result<usize> {
        self.records
            .get(&entity)
            .map(|r| r.entity_type)
            .ok_or(ShadowError::UnknownEntity(entity))
    }

    /// Resolves an attribute selector against the type of `entity`.
    pub fn resolve(&self, entity: EntityId, attr: impl AttrSelector) -> Result<AttrId> {
        let entity_type = self.entity_type(entity)?;
        attr.select(&self.registry, entity_type)
    }

    /// Reads one attribute.
    pub fn get(&self, entity: EntityId, attr: impl AttrSelector) -> Result<&Value> {
        let record = self
            .records
            .get(&entity)
            .ok_or(ShadowError::UnknownEntity(entity))?;
        let id = attr.select(&self.registry, record.entity_type)?;
        Ok(&record.values[self.registry.attribute(id).slot])
    }

    /// Reads a node without validation; `None` when the entity is gone.
    #[inline]
    pub fn peek(&self, node: NodeKey) -> Option<&Value> {
        let record = self.records.get(&node.entity)?;
        record.values.get(self.registry.attribute(node.attr).slot)
    }

    /// Checks that `value` may be written to a decision attribute of `entity`
    /// and returns it in normalized form.
    ///
    /// # Errors
    ///
    /// `UnknownEntity`, `UnknownAttribute` when `attr` belongs to another type,
    /// `InvalidAttributeKind` for derived attributes and `InvalidValue` when a
    /// relation value has the wrong shape or points at a missing or mistyped
    /// entity.
    pub fn validate(&self, entity: EntityId, attr: AttrId, value: Value) -> Result<Value> {
        let entity_type = self.entity_type(entity)?;
        let id = attr.select(&self.registry, entity_type)?;
        self.validate_with(id, value, |target| {
            self.records.get(&target).map(|r| r.entity_type)
        })
    }

    fn validate_with<F>(&self, attr: AttrId, value: Value, type_of: F) -> Result<Value>
    where
        F: Fn(EntityId) -> Option<usize>,
    {
        let desc = self.registry.attribute(attr);
        let invalid = |reason: String| ShadowError::InvalidValue {
            attribute: self.registry.qualified_name(attr),
            reason,
        };

        if desc.kind.is_derived() {
            return Err(ShadowError::InvalidAttributeKind {
                entity_type: self.registry.entity_type(desc.entity_type).name.clone(),
                attribute: desc.name.clone(),
            });
        }

        let Some(relation) = &desc.relation else {
            return match value {
                Value::Ref(_) | Value::Refs(_) => {
                    Err(invalid("references are only allowed on relations".into()))
                }
                other => Ok(other),
            };
        };

        let value = match (relation.cardinality, value) {
            (_, Value::Null) => relation.empty_value(),
            (Cardinality::One, Value::Ref(id)) => Value::Ref(id),
            (Cardinality::Many, Value::Ref(id)) => Value::Refs(vec![id]),
            (Cardinality::Many, Value::Refs(ids)) => Value::refs(ids),
            (Cardinality::One, Value::Refs(ids)) if ids.len() <= 1 => {
                ids.first().copied().map_or(Value::Null, Value::Ref)
            }
            (_, other) => return Err(invalid(format!("{other} is not a valid target"))),
        };

        let target_type = &self.registry.entity_type(relation.target_type).name;
        for &target in value.targets() {
            match type_of(target) {
                Some(t) if t == relation.target_type => {}
                Some(_) => return Err(invalid(format!("{target} is not a {target_type}"))),
                None => return Err(invalid(format!("{target} is not registered"))),
            }
        }
        Ok(value)
    }

    /// Writes a decision attribute and returns the previous value.
    ///
    /// Leaves a dirty marker for the written node. Nothing is written when
    /// validation fails.
    pub fn set(
        &mut self,
        entity: EntityId,
        attr: impl AttrSelector,
        value: impl Into<Value>,
    ) -> Result<Value> {
        let id = self.resolve(entity, attr)?;
        let value = self.validate(entity, id, value.into())?;
        let slot = self.registry.attribute(id).slot;
        let record = self
            .records
            .get_mut(&entity)
            .ok_or(ShadowError::UnknownEntity(entity))?;
        let previous = std::mem::replace(&mut record.values[slot], value);
        self.dirty.push(NodeKey::new(entity, id));
        Ok(previous)
    }

    /// Commits a derived value and returns the one it replaces.
    pub fn write_derived(&mut self, node: NodeKey, value: Value) -> Option<Value> {
        let slot = self.registry.attribute(node.attr).slot;
        let record = self.records.get_mut(&node.entity)?;
        Some(std::mem::replace(&mut record.values[slot], value))
    }

    /// Puts back a value without leaving a dirty marker.
    pub fn restore(&mut self, node: NodeKey, value: Value) {
        let slot = self.registry.attribute(node.attr).slot;
        if let Some(record) = self.records.get_mut(&node.entity) {
            record.values[slot] = value;
        }
    }

    /// Registers one entity. Relation targets must already be registered.
    pub fn register(&mut self, draft: &EntityDraft) -> Result<()> {
        self.register_batch(std::slice::from_ref(draft))
    }

    /// Registers several entities at once; relations may point anywhere
    /// inside the batch.
    ///
    /// Either every draft is registered or none is.
    pub fn register_batch(&mut self, drafts: &[EntityDraft]) -> Result<()> {
        let mut batch: BTreeMap<EntityId, usize> = BTreeMap::new();
        for draft in drafts {
            let entity_type = self.registry.type_index(&draft.entity_type)?;
            if self.records.contains_key(&draft.id)
                || batch.insert(draft.id, entity_type).is_some()
            {
                return Err(ShadowError::DuplicateEntity(draft.id));
            }
        }

        let type_of = |target: EntityId| {
            batch
                .get(&target)
                .copied()
                .or_else(|| self.records.get(&target).map(|r| r.entity_type))
        };

        let mut records = Vec::with_capacity(drafts.len());
        for draft in drafts {
            let entity_type = batch[&draft.id];
            let descriptor = self.registry.entity_type(entity_type);
            let mut values: Vec<Value> = descriptor
                .attributes
                .iter()
                .map(|id| self.registry.attribute(*id).default.clone())
                .collect();
            for (name, value) in &draft.values {
                let id = self.registry.resolve(entity_type, name)?;
                let value = self.validate_with(id, value.clone(), type_of)?;
                values[self.registry.attribute(id).slot] = value;
            }
            records.push((draft.id, EntityRecord { entity_type, values }));
        }

        self.records.extend(records);
        Ok(())
    }

    /// Removes an entity and hands back its record.
    pub fn unregister(&mut self, entity: EntityId) -> Result<EntityRecord> {
        self.dirty.retain(|node| node.entity != entity);
        self.records
            .remove(&entity)
            .ok_or(ShadowError::UnknownEntity(entity))
    }

    /// Drains the nodes written by `set` since the last call.
    pub fn take_dirty(&mut self) -> Vec<NodeKey> {
        std::mem::take(&mut self.dirty)
    }
}

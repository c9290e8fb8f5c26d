//! Change lists handed to the score consumer.

use std::collections::{BTreeSet, HashMap};

use shadowforge_core::{AttrId, AttributeKind, EntityId, NodeKey, Value};

/// One attribute whose value differs from before the edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeChange {
    pub entity: EntityId,
    pub attribute: AttrId,
    pub kind: AttributeKind,
    pub old: Value,
    pub new: Value,
}

impl AttributeChange {
    pub fn node(&self) -> NodeKey {
        NodeKey::new(self.entity, self.attribute)
    }
}

/// Result of an edit session.
///
/// Attribute changes are listed in first-commit order, one entry per
/// attribute, and never include entities added or removed in the session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeList {
    pub changes: Vec<AttributeChange>,
    /// Entities registered during the session, in call order.
    pub added: Vec<EntityId>,
    /// Entities evicted during the session, in call order.
    pub removed: Vec<EntityId>,
    /// True when the session was cut short by an unknown entity.
    pub aborted: bool,
}

impl ChangeList {
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty() && self.added.is_empty() && self.removed.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AttributeChange> {
        self.changes.iter()
    }

    /// The change recorded for one attribute, if any.
    pub fn get(&self, entity: EntityId, attribute: AttrId) -> Option<&AttributeChange> {
        self.changes
            .iter()
            .find(|c| c.entity == entity && c.attribute == attribute)
    }

    /// Returns true if any attribute of `entity` changed.
    pub fn touches(&self, entity: EntityId) -> bool {
        self.changes.iter().any(|c| c.entity == entity)
    }

    /// Derived changes only.
    pub fn derived(&self) -> impl Iterator<Item = &AttributeChange> {
        self.changes.iter().filter(|c| c.kind.is_derived())
    }
}

/// Coalescing record of the writes made during one session.
#[derive(Debug, Default)]
pub(crate) struct ChangeLog {
    entries: Vec<AttributeChange>,
    index: HashMap<NodeKey, usize>,
    added: Vec<EntityId>,
    removed: Vec<EntityId>,
    hidden: BTreeSet<EntityId>,
}

impl ChangeLog {
    /// Records a write, keeping the first old value seen for the node.
    pub(crate) fn record(&mut self, node: NodeKey, kind: AttributeKind, old: &Value, new: &Value) {
        match self.index.get(&node) {
            Some(&i) => self.entries[i].new = new.clone(),
            None => {
                self.index.insert(node, self.entries.len());
                self.entries.push(AttributeChange {
                    entity: node.entity,
                    attribute: node.attr,
                    kind,
                    old: old.clone(),
                    new: new.clone(),
                });
            }
        }
    }

    pub(crate) fn entity_added(&mut self, entity: EntityId) {
        self.hidden.insert(entity);
        self.added.push(entity);
    }

    pub(crate) fn entity_removed(&mut self, entity: EntityId) {
        self.hidden.insert(entity);
        // Added and removed within the same session: never seen outside.
        if let Some(pos) = self.added.iter().position(|e| *e == entity) {
            self.added.remove(pos);
        } else {
            self.removed.push(entity);
        }
    }

    pub(crate) fn finish(self, report_decisions: bool, aborted: bool) -> ChangeList {
        let hidden = self.hidden;
        let changes = self
            .entries
            .into_iter()
            .filter(|c| c.old != c.new)
            .filter(|c| !hidden.contains(&c.entity))
            .filter(|c| report_decisions || c.kind.is_derived())
            .collect();
        ChangeList {
            changes,
            added: self.added,
            removed: self.removed,
            aborted,
        }
    }
}

//! Inverse mirrors of relation attributes.
//!
//! Mirrors answer "which sources point at this target?" in the declared
//! order without scanning the store.
//!
//! - [`InverseMirror`]: the ordered reverse side of one relation
//! - [`InverseMirrors`]: every mirror declared by a registry, keyed by relation
//! - [`NeighborChange`]: reported when an entity's predecessor in a mirror moves

mod inverse;


pub use inverse::{InverseMirror, InverseView, Neighbors};

use std::collections::BTreeMap;

use crate::domain::{AttrId, EntityId, ShadowRegistry, Value};
use crate::error::{Result, ShadowError};
use crate::store::EntityStore;

/// An entity whose predecessor in the mirror of `relation` changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NeighborChange {
    pub relation: AttrId,
    pub entity: EntityId,
}

/// All inverse mirrors declared by a registry.
#[derive(Debug, Clone, Default)]
pub struct InverseMirrors {
    mirrors: BTreeMap<AttrId, InverseMirror>,
}

impl InverseMirrors {
    /// Creates an empty mirror for every mirrored relation.
    pub fn from_registry(registry: &ShadowRegistry) -> Self {
        let mirrors = registry
            .relations()
            .filter_map(|attr| {
                let inverse = attr.relation.as_ref()?.inverse?;
                Some((attr.id, InverseMirror::new(attr.id, inverse.order_key)))
            })
            .collect();
        Self { mirrors }
    }

    pub fn is_mirrored(&self, relation: AttrId) -> bool {
        self.mirrors.contains_key(&relation)
    }

    pub fn get(&self, relation: AttrId) -> Option<&InverseMirror> {
        self.mirrors.get(&relation)
    }

    pub fn iter(&self) -> impl Iterator<Item = &InverseMirror> {
        self.mirrors.values()
    }

    /// Sources of `relation` pointing at `target`, in mirror order.
    ///
    /// Unmirrored relations yield an empty view.
    pub fn inverse_of(&self, target: EntityId, relation: AttrId) -> InverseView<'_> {
        self.mirrors
            .get(&relation)
            .map_or_else(InverseView::empty, |m| m.view(target))
    }

    /// The source right before `source` in the mirror `source` is filed in.
    pub fn previous(&self, relation: AttrId, source: EntityId) -> Option<EntityId> {
        let mirror = self.mirrors.get(&relation)?;
        let target = *mirror.targets_of(source).first()?;
        mirror.previous(target, source)
    }

    /// The source right after `source` in the mirror `source` is filed in.
    pub fn next(&self, relation: AttrId, source: EntityId) -> Option<EntityId> {
        let mirror = self.mirrors.get(&relation)?;
        let target = *mirror.targets_of(source).first()?;
        mirror.next(target, source)
    }

    /// The value `source` is ordered by in the mirror of `relation`;
    /// `Null` for identity-ordered mirrors.
    pub fn order_key_of(&self, store: &EntityStore, relation: AttrId, source: EntityId) -> Value {
        self.mirrors
            .get(&relation)
            .map(|mirror| order_key_value(store, mirror, source))
            .unwrap_or_default()
    }

    /// Moves `source` from the targets in `old` to those in `new`.
    ///
    /// `key` is the value of the mirror's order key on `source`, or `Null`
    /// for identity-ordered mirrors.
    pub fn relink(
        &mut self,
        relation: AttrId,
        source: EntityId,
        old: &Value,
        new: &Value,
        key: &Value,
    ) -> Vec<NeighborChange> {
        let Some(mirror) = self.mirrors.get_mut(&relation) else {
            return Vec::new();
        };
        let mut changed = Vec::new();
        for &target in old.targets() {
            if !new.targets().contains(&target) {
                changed.extend(mirror.remove(target, source));
            }
        }
        for &target in new.targets() {
            if !old.targets().contains(&target) {
                changed.extend(mirror.insert(target, source, key.clone()));
            }
        }
        wrap(relation, changed)
    }

    /// Repositions `source` in every mirror ordered by `key_attr`.
    pub fn rekey(
        &mut self,
        registry: &ShadowRegistry,
        key_attr: AttrId,
        source: EntityId,
        key: &Value,
    ) -> Vec<NeighborChange> {
        let mut changed = Vec::new();
        for &relation in registry.keyed_relations(key_attr) {
            if let Some(mirror) = self.mirrors.get_mut(&relation) {
                changed.extend(wrap(relation, mirror.rekey(source, key.clone())));
            }
        }
        changed
    }

    /// Drops every mirror of `target`. Its sources must already point elsewhere.
    pub fn forget(&mut self, target: EntityId) {
        for mirror in self.mirrors.values_mut() {
            mirror.forget_target(target);
        }
    }

    /// Rebuilds every mirror from the relation values in `store`.
    pub fn rebuild(&mut self, store: &EntityStore) {
        let registry = store.registry().clone();
        for mirror in self.mirrors.values_mut() {
            mirror.clear();
        }
        for entity in store.ids() {
            let Ok(entity_type) = store.entity_type(entity) else {
                continue;
            };
            for relation in registry.relations_of(entity_type) {
                let Some(mirror) = self.mirrors.get_mut(&relation) else {
                    continue;
                };
                let key = order_key_value(store, mirror, entity);
                let targets = store.get(entity, relation).map(|v| v.targets().to_vec());
                for target in targets.unwrap_or_default() {
                    mirror.insert(target, entity, key.clone());
                }
            }
        }
    }

    /// Checks every mirror against the relation values in `store`: each
    /// source filed under each target it points at, nothing else, ordered
    /// by the current key.
    pub fn verify(&self, store: &EntityStore) -> Result<()> {
        let registry = store.registry();
        for mirror in self.mirrors.values() {
            let relation = mirror.relation();
            let name = || registry.qualified_name(relation);
            let mut filed = 0usize;

            for (target, view) in mirror.targets() {
                let mut last: Option<(&Value, EntityId)> = None;
                for (key, source) in view.entries() {
                    filed += 1;
                    let points = store
                        .get(source, relation)
                        .map(|v| v.targets().contains(&target))
                        .unwrap_or(false);
                    if !points {
                        return Err(ShadowError::Corrupted(format!(
                            "mirror of {} files {} under {} but it does not point there",
                            name(),
                            source,
                            target
                        )));
                    }
                    if *key != order_key_value(store, mirror, source) {
                        return Err(ShadowError::Corrupted(format!(
                            "mirror of {} files {} under a stale key {}",
                            name(),
                            source,
                            key
                        )));
                    }
                    if last.is_some_and(|prev| prev >= (key, source)) {
                        return Err(ShadowError::Corrupted(format!(
                            "mirror of {} under {} is out of order at {}",
                            name(),
                            target,
                            source
                        )));
                    }
                    last = Some((key, source));
                }
            }

            let expected: usize = store
                .ids()
                .filter_map(|entity| store.get(entity, relation).ok())
                .map(|v| v.targets().len())
                .sum();
            if filed != expected {
                return Err(ShadowError::Corrupted(format!(
                    "mirror of {} holds {} entries, relations hold {}",
                    name(),
                    filed,
                    expected
                )));
            }
        }
        Ok(())
    }
}

fn order_key_value(store: &EntityStore, mirror: &InverseMirror, source: EntityId) -> Value {
    mirror
        .order_key()
        .and_then(|key| store.get(source, key).ok().cloned())
        .unwrap_or_default()
}

fn wrap(relation: AttrId, entities: impl IntoIterator<Item = EntityId>) -> Vec<NeighborChange> {
    entities
        .into_iter()
        .map(|entity| NeighborChange { relation, entity })
        .collect()
}

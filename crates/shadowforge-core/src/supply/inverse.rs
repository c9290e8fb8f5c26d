//! Ordered inverse mirror of one relation.
//!
//! # Layout
//!
//! - **Per target**: a `BTreeSet` of `(key, source)` entries, so insertion,
//!   removal and neighbour lookup are O(log n)
//! - **Per source**: the key it is filed under and the targets it is filed in
//! - **Identity only**: stores `EntityId`s, never entity values

use std::collections::{BTreeSet, HashMap};
use std::ops::Bound::{Excluded, Unbounded};

use smallvec::SmallVec;

use crate::domain::{AttrId, EntityId, Value};

/// Entities whose predecessor in a mirror changed.
pub type Neighbors = SmallVec<[EntityId; 3]>;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct MirrorEntry {
    key: Value,
    entity: EntityId,
}

#[derive(Debug, Clone)]
struct SourceState {
    key: Value,
    targets: SmallVec<[EntityId; 2]>,
}

/// The reverse side of one relation: for every target, the sources pointing
/// at it, ordered by the order key and then by identity.
///
/// # Example
///
/// ```
/// use shadowforge_core::{EntityId, InverseMirror, ShadowRegistry, RelationDef, Value};
///
/// let registry = ShadowRegistry::builder()
///     .entity("Employee", |t| t)
///     .entity("Shift", |t| {
///         t.decision("start", 0)
///             .relation("employee", RelationDef::one("Employee").mirrored_by("start"))
///     })
///     .build()
///     .unwrap();
/// let employee = registry.attr("Shift", "employee").unwrap();
/// let start = registry.attr("Shift", "start").unwrap();
///
/// let mut mirror = InverseMirror::new(employee, Some(start));
/// let ann = EntityId(1);
/// mirror.insert(ann, EntityId(11), Value::Int(14));
/// mirror.insert(ann, EntityId(10), Value::Int(6));
///
/// assert_eq!(mirror.view(ann).to_vec(), vec![EntityId(10), EntityId(11)]);
/// assert_eq!(mirror.previous(ann, EntityId(11)), Some(EntityId(10)));
/// ```
#[derive(Debug, Clone)]
pub struct InverseMirror {
    relation: AttrId,
    order_key: Option<AttrId>,
    by_target: HashMap<EntityId, BTreeSet<MirrorEntry>>,
    sources: HashMap<EntityId, SourceState>,
}

impl InverseMirror {
    pub fn new(relation: AttrId, order_key: Option<AttrId>) -> Self {
        Self {
            relation,
            order_key,
            by_target: HashMap::new(),
            sources: HashMap::new(),
        }
    }

    pub fn relation(&self) -> AttrId {
        self.relation
    }

    /// The source attribute ordering this mirror; identity order when `None`.
    pub fn order_key(&self) -> Option<AttrId> {
        self.order_key
    }

    /// Read-only ordered view of the sources pointing at `target`.
    #[inline]
    pub fn view(&self, target: EntityId) -> InverseView<'_> {
        InverseView {
            entries: self.by_target.get(&target),
            sources: Some(&self.sources),
        }
    }

    /// The key `source` is currently filed under.
    pub fn key_of(&self, source: EntityId) -> Option<&Value> {
        self.sources.get(&source).map(|s| &s.key)
    }

    /// Targets `source` is currently filed in.
    pub fn targets_of(&self, source: EntityId) -> &[EntityId] {
        self.sources
            .get(&source)
            .map(|s| s.targets.as_slice())
            .unwrap_or(&[])
    }

    /// The source right before `source` in the mirror of `target`.
    pub fn previous(&self, target: EntityId, source: EntityId) -> Option<EntityId> {
        let entry = self.entry(source)?;
        self.by_target
            .get(&target)?
            .range(..entry)
            .next_back()
            .map(|e| e.entity)
    }

    /// The source right after `source` in the mirror of `target`.
    pub fn next(&self, target: EntityId, source: EntityId) -> Option<EntityId> {
        let entry = self.entry(source)?;
        Self::successor(self.by_target.get(&target)?, &entry)
    }

    /// Number of targets with at least one source.
    pub fn target_count(&self) -> usize {
        self.by_target.len()
    }

    fn entry(&self, source: EntityId) -> Option<MirrorEntry> {
        self.sources.get(&source).map(|s| MirrorEntry {
            key: s.key.clone(),
            entity: source,
        })
    }

    fn successor(set: &BTreeSet<MirrorEntry>, entry: &MirrorEntry) -> Option<EntityId> {
        set.range((Excluded(entry), Unbounded))
            .next()
            .map(|e| e.entity)
    }

    /// Files `source` under `target`.
    ///
    /// A source filed in several targets keeps one key; the latest wins.
    /// Returns the entities whose predecessor changed.
    pub fn insert(&mut self, target: EntityId, source: EntityId, key: Value) -> Neighbors {
        let mut changed = Neighbors::new();
        if self.sources.get(&source).is_some_and(|s| s.key != key) {
            changed.extend(self.rekey(source, key.clone()));
        }
        let state = self.sources.entry(source).or_insert_with(|| SourceState {
            key: key.clone(),
            targets: SmallVec::new(),
        });
        if state.targets.contains(&target) {
            return changed;
        }
        state.targets.push(target);

        let entry = MirrorEntry {
            key,
            entity: source,
        };
        let set = self.by_target.entry(target).or_default();
        if let Some(next) = Self::successor(set, &entry) {
            changed.push(next);
        }
        set.insert(entry);
        changed.push(source);
        changed
    }

    /// Takes `source` out of the mirror of `target`.
    ///
    /// Returns the entities whose predecessor changed.
    pub fn remove(&mut self, target: EntityId, source: EntityId) -> Neighbors {
        let mut changed = Neighbors::new();
        let Some(entry) = self.entry(source) else {
            return changed;
        };
        let Some(set) = self.by_target.get_mut(&target) else {
            return changed;
        };
        if !set.remove(&entry) {
            return changed;
        }
        if let Some(next) = Self::successor(set, &entry) {
            changed.push(next);
        }
        if set.is_empty() {
            self.by_target.remove(&target);
        }
        if let Some(state) = self.sources.get_mut(&source) {
            state.targets.retain(|t| *t != target);
            if state.targets.is_empty() {
                self.sources.remove(&source);
            }
        }
        changed
    }

    /// Moves `source` to its position under a new key in every target it is
    /// filed in.
    ///
    /// Returns the entities whose predecessor changed.
    pub fn rekey(&mut self, source: EntityId, key: Value) -> Neighbors {
        let mut changed = Neighbors::new();
        let Some(state) = self.sources.get_mut(&source) else {
            return changed;
        };
        if state.key == key {
            return changed;
        }
        let old = MirrorEntry {
            key: std::mem::replace(&mut state.key, key.clone()),
            entity: source,
        };
        let new = MirrorEntry {
            key,
            entity: source,
        };
        for target in state.targets.clone() {
            let Some(set) = self.by_target.get_mut(&target) else {
                continue;
            };
            set.remove(&old);
            if let Some(next) = Self::successor(set, &old) {
                changed.push(next);
            }
            if let Some(next) = Self::successor(set, &new) {
                changed.push(next);
            }
            set.insert(new.clone());
        }
        changed.push(source);
        changed.sort_unstable();
        changed.dedup();
        changed
    }

    /// Drops the mirror of `target`, returning the sources it held.
    pub fn forget_target(&mut self, target: EntityId) -> Vec<EntityId> {
        let Some(set) = self.by_target.remove(&target) else {
            return Vec::new();
        };
        let sources: Vec<EntityId> = set.into_iter().map(|e| e.entity).collect();
        for source in &sources {
            if let Some(state) = self.sources.get_mut(source) {
                state.targets.retain(|t| *t != target);
                if state.targets.is_empty() {
                    self.sources.remove(source);
                }
            }
        }
        sources
    }

    pub(crate) fn clear(&mut self) {
        self.by_target.clear();
        self.sources.clear();
    }

    pub(crate) fn targets(&self) -> impl Iterator<Item = (EntityId, InverseView<'_>)> {
        self.by_target
            .iter()
            .map(|(t, entries)| {
                let view = InverseView {
                    entries: Some(entries),
                    sources: Some(&self.sources),
                };
                (*t, view)
            })
    }
}

/// Read-only ordered sequence of the sources pointing at one target.
#[derive(Debug, Clone, Copy)]
pub struct InverseView<'a> {
    entries: Option<&'a BTreeSet<MirrorEntry>>,
    sources: Option<&'a HashMap<EntityId, SourceState>>,
}

impl<'a> InverseView<'a> {
    /// A view with no sources.
    pub fn empty() -> Self {
        Self {
            entries: None,
            sources: None,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.map_or(0, BTreeSet::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sources in mirror order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = EntityId> + 'a {
        self.entries.into_iter().flatten().map(|e| e.entity)
    }

    /// Sources with the key they are filed under, in mirror order.
    pub fn entries(&self) -> impl Iterator<Item = (&'a Value, EntityId)> + 'a {
        self.entries
            .into_iter()
            .flatten()
            .map(|e| (&e.key, e.entity))
    }

    pub fn first(&self) -> Option<EntityId> {
        self.entries?.first().map(|e| e.entity)
    }

    pub fn last(&self) -> Option<EntityId> {
        self.entries?.last().map(|e| e.entity)
    }

    /// Looks `source` up under the key it is filed with, in O(log n).
    pub fn contains(&self, source: EntityId) -> bool {
        let (Some(entries), Some(sources)) = (self.entries, self.sources) else {
            return false;
        };
        sources.get(&source).is_some_and(|state| {
            entries.contains(&MirrorEntry {
                key: state.key.clone(),
                entity: source,
            })
        })
    }

    pub fn to_vec(&self) -> Vec<EntityId> {
        self.iter().collect()
    }
}

//! Entity-level dependency graph.
//!
//! Attribute-level edges come from the registry's static dependent tables.
//! They are combined here with the relation values in force (reverse
//! adjacency) and the inverse mirrors (membership and neighbours) to reach
//! concrete `(entity, attribute)` nodes.
//!
//! Every derived node carries a height strictly greater than the heights of
//! its inputs, so `(height, NodeKey)` is a topological order. Heights are
//! assigned once per entity and raised when a structural edge is inserted;
//! they are never lowered.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use shadowforge_core::{
    AttrId, EntityId, EntityStore, InverseMirrors, NodeKey, Result, ShadowError, ShadowRegistry,
    Traversal, Value,
};


/// Heights and reverse adjacency of the entity graph.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    registry: Arc<ShadowRegistry>,
    heights: HashMap<NodeKey, u32>,
    // Upper bound on every height ever assigned.
    ceiling: u32,
    incoming: HashMap<(AttrId, EntityId), BTreeSet<EntityId>>,
}

impl DependencyGraph {
    pub fn new(registry: Arc<ShadowRegistry>) -> Self {
        Self {
            registry,
            heights: HashMap::new(),
            ceiling: 0,
            incoming: HashMap::new(),
        }
    }

    /// Number of derived nodes with an assigned height.
    pub fn node_count(&self) -> usize {
        self.heights.len()
    }

    /// Height of a derived node; decision nodes have none.
    #[inline]
    pub fn height(&self, node: NodeKey) -> Option<u32> {
        self.heights.get(&node).copied()
    }

    /// Entities whose `relation` currently holds `target`, in identity order.
    pub fn incoming(
        &self,
        relation: AttrId,
        target: EntityId,
    ) -> impl Iterator<Item = EntityId> + '_ {
        self.incoming
            .get(&(relation, target))
            .into_iter()
            .flatten()
            .copied()
    }

    /// Rebuilds the reverse adjacency from the relation values in `store`.
    pub fn rebuild_incoming(&mut self, store: &EntityStore) {
        self.incoming.clear();
        for entity in store.ids() {
            self.link(store, entity);
        }
    }

    /// Adds the relation edges of one entity to the reverse adjacency.
    pub fn link(&mut self, store: &EntityStore, entity: EntityId) {
        let Ok(entity_type) = store.entity_type(entity) else {
            return;
        };
        for relation in self.registry.relations_of(entity_type) {
            let Some(value) = store.peek(NodeKey::new(entity, relation)) else {
                continue;
            };
            for &target in value.targets() {
                self.incoming
                    .entry((relation, target))
                    .or_default()
                    .insert(entity);
            }
        }
    }

    /// Updates the reverse adjacency after `source`'s `relation` changed.
    pub fn on_edge_changed(
        &mut self,
        relation: AttrId,
        source: EntityId,
        old: &Value,
        new: &Value,
    ) {
        for &target in old.targets() {
            if new.targets().contains(&target) {
                continue;
            }
            if let Some(sources) = self.incoming.get_mut(&(relation, target)) {
                sources.remove(&source);
                if sources.is_empty() {
                    self.incoming.remove(&(relation, target));
                }
            }
        }
        for &target in new.targets() {
            if !old.targets().contains(&target) {
                self.incoming
                    .entry((relation, target))
                    .or_default()
                    .insert(source);
            }
        }
    }

    /// Drops the nodes of an entity whose own relations are already cleared,
    /// along with any edges still pointing at it.
    ///
    /// Touches only the entity's derived nodes and the relations targeting
    /// `entity_type`.
    pub fn forget(&mut self, entity: EntityId, entity_type: usize) {
        let registry = &self.registry;
        for &attr in &registry.entity_type(entity_type).derivation_order {
            self.heights.remove(&NodeKey::new(entity, attr));
        }
        for &relation in registry.relations_targeting(entity_type) {
            self.incoming.remove(&(relation, entity));
        }
    }

    /// Derived nodes read by the rule of `node`.
    pub fn inputs(
        &self,
        store: &EntityStore,
        mirrors: &InverseMirrors,
        node: NodeKey,
    ) -> Vec<NodeKey> {
        let Some(rule) = &self.registry.attribute(node.attr).rule else {
            return Vec::new();
        };
        let mut inputs: Vec<NodeKey> = rule
            .own_reads
            .iter()
            .map(|attr| NodeKey::new(node.entity, *attr))
            .collect();
        let mut remote = |entity: EntityId| {
            inputs.extend(rule.remote_reads.iter().map(|a| NodeKey::new(entity, *a)));
        };
        match rule.traversal {
            Traversal::Local => {}
            Traversal::Forward(relation) => {
                if let Some(value) = store.peek(NodeKey::new(node.entity, relation)) {
                    value.targets().iter().copied().for_each(&mut remote);
                }
            }
            Traversal::Inverse(relation) => {
                mirrors
                    .inverse_of(node.entity, relation)
                    .iter()
                    .for_each(&mut remote);
            }
            Traversal::Previous(relation) => {
                mirrors.previous(relation, node.entity).into_iter().for_each(&mut remote);
            }
        }
        inputs.retain(|input| self.registry.attribute(input.attr).kind.is_derived());
        inputs
    }

    /// Derived nodes reading `node` directly under the current structure.
    pub fn direct_dependents(
        &self,
        store: &EntityStore,
        mirrors: &InverseMirrors,
        node: NodeKey,
    ) -> Vec<NodeKey> {
        let registry = &self.registry;
        let entity = node.entity;
        let mut dependents: Vec<NodeKey> = registry
            .own_dependents(node.attr)
            .iter()
            .map(|d| NodeKey::new(entity, *d))
            .collect();

        for &(relation, derived) in registry.forward_dependents(node.attr) {
            dependents.extend(
                self.incoming(relation, entity)
                    .map(|source| NodeKey::new(source, derived)),
            );
        }

        for &(relation, derived) in registry.inverse_dependents(node.attr) {
            if let Some(value) = store.peek(NodeKey::new(entity, relation)) {
                dependents.extend(
                    value
                        .targets()
                        .iter()
                        .map(|target| NodeKey::new(*target, derived)),
                );
            }
        }

        for &(relation, derived) in registry.previous_dependents(node.attr) {
            if let Some(next) = mirrors.next(relation, entity) {
                dependents.push(NodeKey::new(next, derived));
            }
        }

        dependents
    }

    /// Every derived node transitively downstream of `node`, in topological
    /// order with identity as tie-break.
    pub fn affected_by(
        &self,
        store: &EntityStore,
        mirrors: &InverseMirrors,
        node: NodeKey,
    ) -> Vec<NodeKey> {
        let mut seen: HashSet<NodeKey> = HashSet::new();
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            for dependent in self.direct_dependents(store, mirrors, current) {
                if store.contains(dependent.entity) && seen.insert(dependent) {
                    stack.push(dependent);
                }
            }
        }
        let mut affected: Vec<NodeKey> = seen.into_iter().collect();
        affected.sort_unstable_by_key(|n| (self.height(*n).unwrap_or(0), *n));
        affected
    }

    /// Every derived node in topological order.
    pub fn ordered_nodes(&self) -> Vec<NodeKey> {
        let mut nodes: Vec<(u32, NodeKey)> = self.heights.iter().map(|(n, h)| (*h, *n)).collect();
        nodes.sort_unstable();
        nodes.into_iter().map(|(_, n)| n).collect()
    }

    /// Assigns heights to the derived nodes of `entities` that have none.
    ///
    /// Nodes of other entities keep their height; raising them for edges
    /// towards the new nodes is [`restore_order`](Self::restore_order)'s job.
    pub fn assign_heights(
        &mut self,
        store: &EntityStore,
        mirrors: &InverseMirrors,
        entities: impl IntoIterator<Item = EntityId>,
    ) -> Result<()> {
        let mut in_progress: HashSet<NodeKey> = HashSet::new();
        for entity in entities {
            let entity_type = store.entity_type(entity)?;
            let order = self.registry.entity_type(entity_type).derivation_order.clone();
            for attr in order {
                let root = NodeKey::new(entity, attr);
                if self.heights.contains_key(&root) {
                    continue;
                }
                in_progress.insert(root);
                let mut stack = vec![(root, self.inputs(store, mirrors, root), 0usize)];
                while let Some((node, inputs, next)) = stack.last_mut() {
                    if let Some(&input) = inputs.get(*next) {
                        *next += 1;
                        if self.heights.contains_key(&input) || !store.contains(input.entity) {
                            continue;
                        }
                        if !in_progress.insert(input) {
                            return Err(self.cycle_error(input, *node));
                        }
                        let nested = self.inputs(store, mirrors, input);
                        stack.push((input, nested, 0));
                    } else {
                        let height = 1 + inputs
                            .iter()
                            .filter_map(|i| self.heights.get(i))
                            .max()
                            .copied()
                            .unwrap_or(0);
                        let node = *node;
                        self.set_height(node, height);
                        in_progress.remove(&node);
                        stack.pop();
                    }
                }
            }
        }
        Ok(())
    }

    /// Re-establishes the height invariant after structural edges into
    /// `sources` were inserted.
    ///
    /// # Errors
    ///
    /// `CyclicDependency` when an inserted edge closes a cycle; every height
    /// raised by this call is reverted first.
    pub fn restore_order(
        &mut self,
        store: &EntityStore,
        mirrors: &InverseMirrors,
        sources: &[NodeKey],
    ) -> Result<()> {
        // No acyclic raise lifts a node more than the node count above the ceiling.
        let limit = self.ceiling + self.heights.len() as u32 + 1;
        let mut journal: Vec<(NodeKey, u32)> = Vec::new();

        for &source in sources {
            let Some(current) = self.height(source) else {
                continue;
            };
            let required = self.required_height(store, mirrors, source);
            if required <= current {
                continue;
            }
            journal.push((source, current));
            self.set_height(source, required);

            let mut stack = vec![source];
            while let Some(node) = stack.pop() {
                let height = self.height(node).unwrap_or(0);
                let dependents = self.direct_dependents(store, mirrors, node);
                for dependent in dependents {
                    let Some(old) = self.height(dependent) else {
                        continue;
                    };
                    if old > height {
                        continue;
                    }
                    if dependent == source || height + 1 > limit {
                        let error = self.cycle_error(dependent, node);
                        for (node, height) in journal.into_iter().rev() {
                            self.heights.insert(node, height);
                        }
                        return Err(error);
                    }
                    journal.push((dependent, old));
                    self.set_height(dependent, height + 1);
                    stack.push(dependent);
                }
            }
        }
        Ok(())
    }

    fn set_height(&mut self, node: NodeKey, height: u32) {
        self.ceiling = self.ceiling.max(height);
        self.heights.insert(node, height);
    }

    fn required_height(&self, store: &EntityStore, mirrors: &InverseMirrors, node: NodeKey) -> u32 {
        1 + self
            .inputs(store, mirrors, node)
            .iter()
            .filter_map(|i| self.heights.get(i))
            .max()
            .copied()
            .unwrap_or(0)
    }

    fn cycle_error(&self, from: NodeKey, to: NodeKey) -> ShadowError {
        ShadowError::CyclicDependency(format!(
            "{} of {} and {} of {} read each other",
            self.registry.qualified_name(from.attr),
            from.entity,
            self.registry.qualified_name(to.attr),
            to.entity
        ))
    }
}

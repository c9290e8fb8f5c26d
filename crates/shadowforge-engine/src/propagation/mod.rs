//! Fixed-point propagation of derived values.
//!
//! Dirty nodes are queued by `(height, NodeKey)`. Popping in that order
//! means every input of a node is settled before the node is recomputed,
//! so each node is evaluated at most once per run and the commit order is
//! independent of the order nodes were marked in.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};

use smallvec::SmallVec;
use tracing::trace;

use shadowforge_core::{
    AttrId, EntityId, EntityStore, InverseMirrors, NodeKey, RelatedValues, RuleInput, Traversal,
    Value,
};

use crate::graph::DependencyGraph;


/// Receives every derived value the propagator commits.
pub trait CommitObserver {
    /// Called before `new` replaces the current value of `node`.
    fn before_commit(&mut self, _store: &EntityStore, _node: NodeKey, _new: &Value) {}

    /// Called after `node` changed from `old` to `new`.
    fn committed(&mut self, node: NodeKey, old: &Value, new: &Value);
}

/// Observer that ignores every commit.
impl CommitObserver for () {
    fn committed(&mut self, _node: NodeKey, _old: &Value, _new: &Value) {}
}

/// Work queue and pending set of one propagation pass.
#[derive(Debug, Clone)]
pub struct Propagator {
    queue: BinaryHeap<Reverse<(u32, NodeKey)>>,
    pending: HashSet<NodeKey>,
    trace_commits: bool,
}

impl Default for Propagator {
    fn default() -> Self {
        Self::with_capacity(0, false)
    }
}

impl Propagator {
    pub fn with_capacity(capacity: usize, trace_commits: bool) -> Self {
        Self {
            queue: BinaryHeap::with_capacity(capacity),
            pending: HashSet::with_capacity(capacity),
            trace_commits,
        }
    }

    /// Number of nodes waiting to be recomputed.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn is_idle(&self) -> bool {
        self.pending.is_empty()
    }

    /// Queues a derived node; decision nodes and nodes already queued are ignored.
    pub fn mark(&mut self, graph: &DependencyGraph, node: NodeKey) {
        let Some(height) = graph.height(node) else {
            return;
        };
        if self.pending.insert(node) {
            self.queue.push(Reverse((height, node)));
        }
    }

    /// Queues every derived node reading `node` directly.
    pub fn mark_dependents(
        &mut self,
        graph: &DependencyGraph,
        store: &EntityStore,
        mirrors: &InverseMirrors,
        node: NodeKey,
    ) {
        for dependent in graph.direct_dependents(store, mirrors, node) {
            self.mark(graph, dependent);
        }
    }

    /// Drops queued nodes of an entity about to be evicted.
    pub fn discard(&mut self, entity: EntityId) {
        if self.pending.iter().any(|n| n.entity == entity) {
            self.pending.retain(|n| n.entity != entity);
            self.queue.retain(|Reverse((_, n))| n.entity != entity);
        }
    }

    /// Recomputes queued nodes until the queue is empty.
    ///
    /// Returns the number of committed changes.
    pub fn run<O: CommitObserver>(
        &mut self,
        graph: &DependencyGraph,
        store: &mut EntityStore,
        mirrors: &InverseMirrors,
        observer: &mut O,
    ) -> usize {
        let mut commits = 0;
        while let Some(Reverse((_, node))) = self.queue.pop() {
            self.pending.remove(&node);
            let Some(current) = store.peek(node) else {
                continue;
            };
            let new = derive_value(store, mirrors, node);
            if *current == new {
                continue;
            }

            observer.before_commit(store, node, &new);
            let Some(old) = store.write_derived(node, new.clone()) else {
                continue;
            };
            if self.trace_commits {
                trace!(
                    event = "commit",
                    node = %node,
                    attribute = %store.registry().qualified_name(node.attr),
                    old = %old,
                    new = %new,
                );
            }
            observer.committed(node, &old, &new);
            commits += 1;

            for dependent in graph.direct_dependents(store, mirrors, node) {
                self.mark(graph, dependent);
            }
        }
        commits
    }
}

/// Evaluates the rule of a derived node against the current state.
///
/// Returns the stored value unchanged for decision nodes.
pub fn derive_value(store: &EntityStore, mirrors: &InverseMirrors, node: NodeKey) -> Value {
    let registry = store.registry();
    let Some(rule) = &registry.attribute(node.attr).rule else {
        return store.peek(node).cloned().unwrap_or_default();
    };

    let own: SmallVec<[Value; 4]> = rule
        .own_reads
        .iter()
        .map(|attr| read(store, node.entity, *attr))
        .collect();

    let related_of = |entity: EntityId| RelatedValues {
        entity,
        values: rule
            .remote_reads
            .iter()
            .map(|attr| read(store, entity, *attr))
            .collect(),
    };

    let related: Vec<RelatedValues> = match rule.traversal {
        Traversal::Local => Vec::new(),
        Traversal::Forward(relation) => store
            .peek(NodeKey::new(node.entity, relation))
            .map(|value| value.targets().iter().copied().map(related_of).collect())
            .unwrap_or_default(),
        Traversal::Inverse(relation) => mirrors
            .inverse_of(node.entity, relation)
            .iter()
            .map(related_of)
            .collect(),
        Traversal::Previous(relation) => mirrors
            .previous(relation, node.entity)
            .map(related_of)
            .into_iter()
            .collect(),
    };

    rule.evaluate(&RuleInput::new(node.entity, &own, &related))
}

fn read(store: &EntityStore, entity: EntityId, attr: AttrId) -> Value {
    store
        .peek(NodeKey::new(entity, attr))
        .cloned()
        .unwrap_or_default()
}

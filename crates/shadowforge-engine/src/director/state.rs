//! The state a director maintains: store, mirrors and graph together.

use std::sync::Arc;

use shadowforge_core::{
    EntityDraft, EntityStore, InverseMirrors, NodeKey, Result, ShadowError, ShadowRegistry,
};

use crate::graph::DependencyGraph;
use crate::propagation::{derive_value, CommitObserver};

#[derive(Debug, Clone)]
pub(crate) struct WorkingState {
    pub(crate) store: EntityStore,
    pub(crate) mirrors: InverseMirrors,
    pub(crate) graph: DependencyGraph,
}

impl WorkingState {
    pub(crate) fn new(registry: Arc<ShadowRegistry>) -> Self {
        Self {
            mirrors: InverseMirrors::from_registry(&registry),
            graph: DependencyGraph::new(registry.clone()),
            store: EntityStore::new(registry),
        }
    }

    /// Registers a batch of entities and derives everything from scratch.
    pub(crate) fn load(&mut self, drafts: &[EntityDraft]) -> Result<()> {
        self.store.register_batch(drafts)?;
        self.rebuild()
    }

    /// Rebuilds mirrors, adjacency and heights from the store, then runs a
    /// full derivation pass.
    pub(crate) fn rebuild(&mut self) -> Result<()> {
        let registry = self.store.registry().clone();
        self.graph = DependencyGraph::new(registry);
        self.graph.rebuild_incoming(&self.store);
        self.mirrors.rebuild(&self.store);
        let ids: Vec<_> = self.store.ids().collect();
        self.graph.assign_heights(&self.store, &self.mirrors, ids)?;
        self.recompute_all(&mut ());
        Ok(())
    }

    /// Derives every node once in topological order.
    ///
    /// Returns the number of values that changed.
    pub(crate) fn recompute_all<O: CommitObserver>(&mut self, observer: &mut O) -> usize {
        let mut commits = 0;
        for node in self.graph.ordered_nodes() {
            let new = derive_value(&self.store, &self.mirrors, node);
            if self.store.peek(node) == Some(&new) {
                continue;
            }
            observer.before_commit(&self.store, node, &new);
            if let Some(old) = self.store.write_derived(node, new.clone()) {
                observer.committed(node, &old, &new);
                commits += 1;
            }
        }
        commits
    }

    /// Compares every derived value against a from-scratch derivation of
    /// the same decisions.
    pub(crate) fn verify_derivations(&self) -> Result<()> {
        let mut scratch = Self {
            store: self.store.clone(),
            mirrors: self.mirrors.clone(),
            graph: self.graph.clone(),
        };
        scratch.rebuild()?;

        let registry = self.store.registry();
        for node in scratch.graph.ordered_nodes() {
            let expected = scratch.store.peek(node);
            let actual = self.store.peek(node);
            if expected != actual {
                return Err(ShadowError::Corrupted(format!(
                    "{} of {} is {} but derives to {}",
                    registry.qualified_name(node.attr),
                    node.entity,
                    display(actual),
                    display(expected)
                )));
            }
        }
        if scratch.graph.node_count() != self.graph.node_count() {
            return Err(ShadowError::Corrupted(format!(
                "graph tracks {} derived nodes, the store holds {}",
                self.graph.node_count(),
                scratch.graph.node_count()
            )));
        }
        Ok(())
    }

    /// Checks that every derived node reads only lower nodes.
    pub(crate) fn verify_heights(&self) -> Result<()> {
        for node in self.graph.ordered_nodes() {
            let height = self.graph.height(node).unwrap_or(0);
            for input in self.graph.inputs(&self.store, &self.mirrors, node) {
                if self.graph.height(input).unwrap_or(0) >= height {
                    return Err(ShadowError::Corrupted(format!(
                        "{} of {} is not above its input {} of {}",
                        self.store.registry().qualified_name(node.attr),
                        node.entity,
                        self.store.registry().qualified_name(input.attr),
                        input.entity
                    )));
                }
            }
        }
        Ok(())
    }
}

fn display(value: Option<&shadowforge_core::Value>) -> String {
    value.map_or_else(|| "missing".to_string(), ToString::to_string)
}

/// A copy of a director's state taken between edit sessions.
///
/// Restoring it is rollback by replay: the whole state is swapped back,
/// nothing is undone step by step.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub(crate) state: WorkingState,
}

impl Snapshot {
    /// Number of entities captured.
    pub fn len(&self) -> usize {
        self.state.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.store.is_empty()
    }

    /// Reads a captured value.
    pub fn peek(&self, node: NodeKey) -> Option<&shadowforge_core::Value> {
        self.state.store.peek(node)
    }
}

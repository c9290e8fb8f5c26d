//! Edit sessions over the maintained shadow state.
//!
//! The director is the only writer of the entity store. Every edit runs
//! propagation to a fixed point before it returns, so reads between edits
//! always see settled derived values.
//!
//! # Session lifecycle
//!
//! ```text
//! begin_edit ─► set_decision / add_entity / remove_entity ... ─► end_edit ─► ChangeList
//! ```
//!
//! An unknown entity aborts the session: later operations fail with
//! `SessionAborted` and `end_edit` reports the abort. Other errors leave
//! the session usable.

mod change;
mod state;

#[cfg(test)]
mod tests;

pub use change::{AttributeChange, ChangeList};
pub use state::Snapshot;

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info, warn};

use shadowforge_config::EngineConfig;
use shadowforge_core::{
    AttrId, AttrSelector, AttributeKind, Cardinality, EntityDraft, EntityId, EntityStore,
    InverseMirrors, InverseView, NodeKey, RemovalPolicy, Result, ShadowError, ShadowRegistry,
    Value,
};

use crate::graph::DependencyGraph;
use crate::listener::ShadowListener;
use crate::propagation::{derive_value, CommitObserver, Propagator};

use change::ChangeLog;
use state::WorkingState;

struct EditSession {
    log: ChangeLog,
    aborted: bool,
    started: Instant,
}

/// Forwards derived commits to the session log and the listeners.
struct SessionObserver<'a> {
    log: Option<&'a mut ChangeLog>,
    listeners: &'a mut [Box<dyn ShadowListener>],
}

impl CommitObserver for SessionObserver<'_> {
    fn before_commit(&mut self, store: &EntityStore, node: NodeKey, new: &Value) {
        for listener in self.listeners.iter_mut() {
            listener.before_attribute_changed(store, node, new);
        }
    }

    fn committed(&mut self, node: NodeKey, old: &Value, new: &Value) {
        if let Some(log) = self.log.as_deref_mut() {
            log.record(node, AttributeKind::Derived, old, new);
        }
        if self.listeners.is_empty() {
            return;
        }
        let change = AttributeChange {
            entity: node.entity,
            attribute: node.attr,
            kind: AttributeKind::Derived,
            old: old.clone(),
            new: new.clone(),
        };
        for listener in self.listeners.iter_mut() {
            listener.after_attribute_changed(&change);
        }
    }
}

/// Collects the commits of a full recompute.
#[derive(Default)]
struct Collector(Vec<AttributeChange>);

impl CommitObserver for Collector {
    fn committed(&mut self, node: NodeKey, old: &Value, new: &Value) {
        self.0.push(AttributeChange {
            entity: node.entity,
            attribute: node.attr,
            kind: AttributeKind::Derived,
            old: old.clone(),
            new: new.clone(),
        });
    }
}

/// Maintains derived attributes of a set of entities under edits.
///
/// # Example
///
/// ```
/// use shadowforge_core::{DerivationRule, EntityDraft, EntityId, RegistryBuilder, RelationDef, Value};
/// use shadowforge_engine::ShadowDirector;
///
/// let registry = RegistryBuilder::default()
///     .entity("Task", |t| {
///         t.decision("duration", 0)
///             .relation("after", RelationDef::one("Task"))
///             .derived(
///                 "end",
///                 0,
///                 DerivationRule::via("after", ["end"])
///                     .reading(["duration"])
///                     .compute(|input| {
///                         let start = input.first().map_or(0, |prev| prev.int(0));
///                         Value::Int(start + input.own_int(0))
///                     }),
///             )
///     })
///     .build()
///     .unwrap();
///
/// let drafts = [
///     EntityDraft::new(1u64, "Task").with("duration", 4),
///     EntityDraft::new(2u64, "Task").with("duration", 2).with("after", EntityId(1)),
/// ];
/// let mut director = ShadowDirector::load(registry, &drafts).unwrap();
/// assert_eq!(director.get(EntityId(2), "end").unwrap(), &Value::Int(6));
///
/// director.begin_edit().unwrap();
/// director.set_decision(EntityId(1), "duration", 10).unwrap();
/// let changes = director.end_edit().unwrap();
///
/// assert_eq!(director.get(EntityId(2), "end").unwrap(), &Value::Int(12));
/// assert_eq!(changes.derived().count(), 2);
/// ```
pub struct ShadowDirector {
    registry: Arc<ShadowRegistry>,
    config: EngineConfig,
    state: WorkingState,
    propagator: Propagator,
    session: Option<EditSession>,
    listeners: Vec<Box<dyn ShadowListener>>,
}

impl ShadowDirector {
    /// Creates a director with no entities.
    pub fn new(registry: impl Into<Arc<ShadowRegistry>>) -> Self {
        Self::with_config(registry, EngineConfig::default())
    }

    pub fn with_config(registry: impl Into<Arc<ShadowRegistry>>, config: EngineConfig) -> Self {
        let registry = registry.into();
        let propagator = Propagator::with_capacity(
            config.propagation.queue_capacity,
            config.propagation.trace_commits,
        );
        Self {
            state: WorkingState::new(registry.clone()),
            registry,
            config,
            propagator,
            session: None,
            listeners: Vec::new(),
        }
    }

    /// Registers an initial population and derives every attribute.
    ///
    /// Relations may point anywhere inside `drafts`.
    pub fn load(registry: impl Into<Arc<ShadowRegistry>>, drafts: &[EntityDraft]) -> Result<Self> {
        Self::load_with_config(registry, drafts, EngineConfig::default())
    }

    pub fn load_with_config(
        registry: impl Into<Arc<ShadowRegistry>>,
        drafts: &[EntityDraft],
        config: EngineConfig,
    ) -> Result<Self> {
        let started = Instant::now();
        let mut director = Self::with_config(registry, config);
        director.state.load(drafts)?;
        info!(
            event = "load",
            entities = director.state.store.len(),
            derived_nodes = director.state.graph.node_count(),
            duration_ms = started.elapsed().as_millis() as u64,
        );
        director.check()?;
        Ok(director)
    }

    pub fn registry(&self) -> &Arc<ShadowRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Read access to the settled store.
    pub fn store(&self) -> &EntityStore {
        &self.state.store
    }

    pub fn mirrors(&self) -> &InverseMirrors {
        &self.state.mirrors
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.state.graph
    }

    /// Reads any attribute of a registered entity.
    pub fn get(&self, entity: EntityId, attr: impl AttrSelector) -> Result<&Value> {
        self.state.store.get(entity, attr)
    }

    /// Entities whose mirrored `relation` points at `target`, in mirror order.
    pub fn inverse_of(&self, target: EntityId, relation: AttrId) -> InverseView<'_> {
        self.state.mirrors.inverse_of(target, relation)
    }

    /// Derived nodes a change of `attr` on `entity` would reach, in the
    /// order propagation would visit them.
    pub fn affected_by(&self, entity: EntityId, attr: impl AttrSelector) -> Result<Vec<NodeKey>> {
        let attr = self.state.store.resolve(entity, attr)?;
        let state = &self.state;
        Ok(state
            .graph
            .affected_by(&state.store, &state.mirrors, NodeKey::new(entity, attr)))
    }

    pub fn add_listener(&mut self, listener: impl ShadowListener + 'static) {
        self.listeners.push(Box::new(listener));
    }

    pub fn is_editing(&self) -> bool {
        self.session.is_some()
    }

    /// Opens an edit session.
    ///
    /// # Errors
    ///
    /// `SessionAlreadyActive` when a session is open.
    pub fn begin_edit(&mut self) -> Result<()> {
        if self.session.is_some() {
            return Err(ShadowError::SessionAlreadyActive);
        }
        self.session = Some(EditSession {
            log: ChangeLog::default(),
            aborted: false,
            started: Instant::now(),
        });
        debug!(event = "edit_begin", entities = self.state.store.len());
        Ok(())
    }

    /// Writes a decision attribute and settles everything downstream.
    ///
    /// Returns the previous value. Writing the current value is a no-op.
    ///
    /// # Errors
    ///
    /// Validation errors leave the store untouched. `CyclicDependency`
    /// means the write was applied, found to close a cycle and rolled back.
    pub fn set_decision(
        &mut self,
        entity: EntityId,
        attr: impl AttrSelector,
        value: impl Into<Value>,
    ) -> Result<Value> {
        self.session_guard()?;
        let result = match self.state.store.resolve(entity, attr) {
            Ok(attr) => self.apply_decision(entity, attr, value.into()),
            Err(error) => Err(error),
        };
        result.map_err(|error| self.fail(error))
    }

    /// Registers a new entity and derives its attributes.
    ///
    /// Its relations must point at registered entities.
    pub fn add_entity(&mut self, draft: EntityDraft) -> Result<()> {
        self.session_guard()?;
        self.insert_entity(draft).map_err(|error| self.fail(error))
    }

    /// Removes an entity after rewriting every reference to it.
    ///
    /// References are dropped, or spliced for relations declared with
    /// [`RemovalPolicy::Splice`]. Each rewrite is a regular decision write,
    /// so it shows up in the change list of the session.
    pub fn remove_entity(&mut self, entity: EntityId) -> Result<()> {
        self.session_guard()?;
        self.evict(entity).map_err(|error| self.fail(error))
    }

    /// Closes the session and returns its coalesced change list.
    ///
    /// # Errors
    ///
    /// `NoActiveSession` without a session. In the assert modes,
    /// `Corrupted` when the maintained state disagrees with a from-scratch
    /// derivation; the session is closed either way.
    pub fn end_edit(&mut self) -> Result<ChangeList> {
        let Some(session) = self.session.take() else {
            return Err(ShadowError::NoActiveSession);
        };
        let elapsed = session.started.elapsed();
        let changes = session
            .log
            .finish(self.config.session.report_decision_changes, session.aborted);
        debug!(
            event = "edit_end",
            changes = changes.len(),
            added = changes.added.len(),
            removed = changes.removed.len(),
            aborted = changes.aborted,
            elapsed_us = elapsed.as_micros() as u64,
        );

        if let Err(error) = self.check() {
            error!(event = "verification_failed", error = %error);
            return Err(error);
        }
        for listener in &mut self.listeners {
            listener.after_edit(&changes);
        }
        Ok(changes)
    }

    /// Runs `edit` inside a session and returns its result with the change
    /// list.
    ///
    /// The session is closed when `edit` fails too.
    pub fn edit<T, F>(&mut self, edit: F) -> Result<(T, ChangeList)>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        self.begin_edit()?;
        match edit(self) {
            Ok(value) => self.end_edit().map(|changes| (value, changes)),
            Err(error) => {
                if self.session.is_some() {
                    if let Err(check) = self.end_edit() {
                        warn!(event = "edit_close_failed", error = %check);
                    }
                }
                Err(error)
            }
        }
    }

    /// Recomputes every derived node in topological order.
    ///
    /// A consistent state comes out unchanged, so the result is empty.
    pub fn recompute_all(&mut self) -> Result<Vec<AttributeChange>> {
        if self.session.is_some() {
            return Err(ShadowError::SessionAlreadyActive);
        }
        let mut collector = Collector::default();
        self.state.recompute_all(&mut collector);
        if !collector.0.is_empty() {
            warn!(event = "recompute_drift", changes = collector.0.len());
        }
        Ok(collector.0)
    }

    /// Copies the current state.
    ///
    /// # Errors
    ///
    /// `SessionAlreadyActive` inside a session.
    pub fn snapshot(&self) -> Result<Snapshot> {
        if self.session.is_some() {
            return Err(ShadowError::SessionAlreadyActive);
        }
        Ok(Snapshot {
            state: self.state.clone(),
        })
    }

    /// Swaps in a state taken by [`snapshot`](Self::snapshot).
    ///
    /// # Errors
    ///
    /// `SessionAlreadyActive` inside a session, `Config` when the snapshot
    /// belongs to a director built on another registry.
    pub fn restore(&mut self, snapshot: Snapshot) -> Result<()> {
        if self.session.is_some() {
            return Err(ShadowError::SessionAlreadyActive);
        }
        if !Arc::ptr_eq(snapshot.state.store.registry(), &self.registry) {
            return Err(ShadowError::Config(
                "snapshot was taken under another registry".into(),
            ));
        }
        self.state = snapshot.state;
        self.propagator = Propagator::with_capacity(
            self.config.propagation.queue_capacity,
            self.config.propagation.trace_commits,
        );
        debug!(event = "restore", entities = self.state.store.len());
        Ok(())
    }

    /// Checks mirrors, heights and every derived value against a
    /// from-scratch derivation.
    pub fn verify(&self) -> Result<()> {
        self.state.mirrors.verify(&self.state.store)?;
        self.state.verify_heights()?;
        self.state.verify_derivations()
    }

    fn check(&self) -> Result<()> {
        if self.config.checks_mirrors() {
            self.state.mirrors.verify(&self.state.store)?;
        }
        if self.config.checks_derivations() {
            self.state.verify_heights()?;
            self.state.verify_derivations()?;
        }
        Ok(())
    }

    fn session_guard(&self) -> Result<()> {
        match &self.session {
            None => Err(ShadowError::NoActiveSession),
            Some(session) if session.aborted => Err(ShadowError::SessionAborted),
            Some(_) => Ok(()),
        }
    }

    /// Marks the session aborted when `error` is fatal to it.
    fn fail(&mut self, error: ShadowError) -> ShadowError {
        if let ShadowError::UnknownEntity(entity) = &error {
            if let Some(session) = &mut self.session {
                session.aborted = true;
                warn!(event = "edit_aborted", entity = %entity);
            }
        }
        error
    }

    fn apply_decision(&mut self, entity: EntityId, attr: AttrId, value: Value) -> Result<Value> {
        let node = NodeKey::new(entity, attr);
        let value = self.state.store.validate(entity, attr, value)?;
        let old = self.state.store.peek(node).cloned().unwrap_or_default();
        if old == value {
            return Ok(old);
        }

        for listener in &mut self.listeners {
            listener.before_attribute_changed(&self.state.store, node, &value);
        }
        self.state.store.set(entity, attr, value.clone())?;

        let mut seeds = Vec::new();
        let structural = if self.registry.attribute(attr).is_relation() {
            self.relink(node, &old, &value, &mut seeds)
        } else if !self.registry.keyed_relations(attr).is_empty() {
            self.reposition(node, &old, &value, &mut seeds)
        } else {
            Ok(())
        };
        if let Err(error) = structural {
            self.state.store.restore(node, old);
            self.state.store.take_dirty();
            for listener in &mut self.listeners {
                listener.change_rejected(node, &error);
            }
            return Err(error);
        }

        if let Some(session) = &mut self.session {
            session.log.record(node, AttributeKind::Decision, &old, &value);
        }
        if !self.listeners.is_empty() {
            let change = AttributeChange {
                entity,
                attribute: attr,
                kind: AttributeKind::Decision,
                old: old.clone(),
                new: value,
            };
            for listener in &mut self.listeners {
                listener.after_attribute_changed(&change);
            }
        }

        let WorkingState {
            store,
            mirrors,
            graph,
        } = &mut self.state;
        for dirty in store.take_dirty() {
            self.propagator.mark_dependents(graph, store, mirrors, dirty);
        }
        for seed in seeds {
            self.propagator.mark(graph, seed);
        }
        self.settle();
        Ok(old)
    }

    /// Moves a relation edge in the adjacency and the mirrors, raising
    /// heights for the new structure.
    ///
    /// Nodes whose input set changed are pushed to `seeds`. On a cycle the
    /// structure is put back and the store is left to the caller.
    fn relink(
        &mut self,
        node: NodeKey,
        old: &Value,
        new: &Value,
        seeds: &mut Vec<NodeKey>,
    ) -> Result<()> {
        let registry = &self.registry;
        let state = &mut self.state;
        let (relation, source) = (node.attr, node.entity);

        state.graph.on_edge_changed(relation, source, old, new);
        let key = state.mirrors.order_key_of(&state.store, relation, source);
        let neighbors = state.mirrors.relink(relation, source, old, new, &key);

        let mut touched: Vec<NodeKey> = registry
            .own_dependents(relation)
            .iter()
            .map(|d| NodeKey::new(source, *d))
            .collect();
        let moved = old
            .targets()
            .iter()
            .filter(|t| !new.targets().contains(t))
            .chain(new.targets().iter().filter(|t| !old.targets().contains(t)));
        for &target in moved {
            touched.extend(
                registry
                    .inverse_rules(relation)
                    .iter()
                    .map(|d| NodeKey::new(target, *d)),
            );
        }
        for neighbor in &neighbors {
            touched.extend(
                registry
                    .previous_rules(neighbor.relation)
                    .iter()
                    .map(|d| NodeKey::new(neighbor.entity, *d)),
            );
        }

        if let Err(error) = state
            .graph
            .restore_order(&state.store, &state.mirrors, &touched)
        {
            state.mirrors.relink(relation, source, new, old, &key);
            state.graph.on_edge_changed(relation, source, new, old);
            return Err(error);
        }
        seeds.extend(touched);
        Ok(())
    }

    /// Moves `node.entity` inside every mirror ordered by `node.attr`.
    fn reposition(
        &mut self,
        node: NodeKey,
        old: &Value,
        new: &Value,
        seeds: &mut Vec<NodeKey>,
    ) -> Result<()> {
        let registry = &self.registry;
        let state = &mut self.state;
        let neighbors = state.mirrors.rekey(registry, node.attr, node.entity, new);
        let touched: Vec<NodeKey> = neighbors
            .iter()
            .flat_map(|n| {
                registry
                    .previous_rules(n.relation)
                    .iter()
                    .map(move |d| NodeKey::new(n.entity, *d))
            })
            .collect();

        if let Err(error) = state
            .graph
            .restore_order(&state.store, &state.mirrors, &touched)
        {
            state.mirrors.rekey(registry, node.attr, node.entity, old);
            return Err(error);
        }
        seeds.extend(touched);
        Ok(())
    }

    fn insert_entity(&mut self, draft: EntityDraft) -> Result<()> {
        let entity = draft.id;
        self.state.store.register(&draft)?;
        let registry = self.registry.clone();
        let entity_type = self.state.store.entity_type(entity)?;
        let state = &mut self.state;
        state.graph.link(&state.store, entity);

        let mut touched = Vec::new();
        for relation in registry.relations_of(entity_type) {
            let value = state
                .store
                .peek(NodeKey::new(entity, relation))
                .cloned()
                .unwrap_or_default();
            if value.targets().is_empty() {
                continue;
            }
            let key = state.mirrors.order_key_of(&state.store, relation, entity);
            let neighbors = state
                .mirrors
                .relink(relation, entity, &Value::Null, &value, &key);
            for &target in value.targets() {
                touched.extend(
                    registry
                        .inverse_rules(relation)
                        .iter()
                        .map(|d| NodeKey::new(target, *d)),
                );
            }
            for neighbor in neighbors {
                touched.extend(
                    registry
                        .previous_rules(neighbor.relation)
                        .iter()
                        .map(|d| NodeKey::new(neighbor.entity, *d)),
                );
            }
        }

        let ordered = state
            .graph
            .assign_heights(&state.store, &state.mirrors, [entity])
            .and_then(|()| {
                state
                    .graph
                    .restore_order(&state.store, &state.mirrors, &touched)
            });
        if let Err(error) = ordered {
            for relation in registry.relations_of(entity_type) {
                if let Some(value) = state.store.peek(NodeKey::new(entity, relation)) {
                    let key = state.mirrors.order_key_of(&state.store, relation, entity);
                    state
                        .mirrors
                        .relink(relation, entity, value, &Value::Null, &key);
                    state
                        .graph
                        .on_edge_changed(relation, entity, value, &Value::Null);
                }
            }
            state.graph.forget(entity, entity_type);
            state.store.unregister(entity)?;
            return Err(error);
        }

        let own = &registry.entity_type(entity_type).derivation_order;
        for &attr in own {
            self.propagator.mark(&state.graph, NodeKey::new(entity, attr));
        }
        for node in touched {
            self.propagator.mark(&state.graph, node);
        }
        if let Some(session) = &mut self.session {
            session.log.entity_added(entity);
        }
        self.settle();

        for listener in &mut self.listeners {
            listener.after_entity_added(&self.state.store, entity);
        }
        debug!(event = "entity_added", entity = %entity);
        Ok(())
    }

    fn evict(&mut self, entity: EntityId) -> Result<()> {
        let entity_type = self.state.store.entity_type(entity)?;
        for listener in &mut self.listeners {
            listener.before_entity_removed(&self.state.store, entity);
        }
        let registry = self.registry.clone();

        for &relation in registry.relations_targeting(entity_type) {
            let Some(desc) = &registry.attribute(relation).relation else {
                continue;
            };
            let splice: Vec<EntityId> = match desc.removal {
                RemovalPolicy::Splice => self
                    .state
                    .store
                    .peek(NodeKey::new(entity, relation))
                    .map(|v| v.targets().to_vec())
                    .unwrap_or_default(),
                RemovalPolicy::Detach => Vec::new(),
            };
            let sources: Vec<EntityId> = self
                .state
                .graph
                .incoming(relation, entity)
                .filter(|s| *s != entity)
                .collect();

            for source in sources {
                let current = self
                    .state
                    .store
                    .peek(NodeKey::new(source, relation))
                    .cloned()
                    .unwrap_or_default();
                let mut replacement = splice.iter().copied().filter(|t| *t != source);
                let rewritten = match desc.cardinality {
                    Cardinality::Many => Value::refs(
                        current
                            .targets()
                            .iter()
                            .copied()
                            .filter(|t| *t != entity)
                            .chain(replacement),
                    ),
                    Cardinality::One => replacement.next().map_or(Value::Null, Value::Ref),
                };
                self.apply_decision(source, relation, rewritten)?;
            }
        }

        for relation in registry.relations_of(entity_type) {
            if let Some(desc) = &registry.attribute(relation).relation {
                self.apply_decision(entity, relation, desc.empty_value())?;
            }
        }

        self.propagator.discard(entity);
        self.state.mirrors.forget(entity);
        self.state.graph.forget(entity, entity_type);
        self.state.store.unregister(entity)?;
        if let Some(session) = &mut self.session {
            session.log.entity_removed(entity);
        }
        debug!(event = "entity_removed", entity = %entity);
        Ok(())
    }

    /// Runs propagation until nothing is pending.
    fn settle(&mut self) -> usize {
        let mut observer = SessionObserver {
            log: self.session.as_mut().map(|s| &mut s.log),
            listeners: &mut self.listeners,
        };
        let state = &mut self.state;
        self.propagator
            .run(&state.graph, &mut state.store, &state.mirrors, &mut observer)
    }

    /// The value `node` would take if derived now; the stored value for
    /// decision nodes.
    pub fn derive(&self, node: NodeKey) -> Value {
        derive_value(&self.state.store, &self.state.mirrors, node)
    }
}

impl fmt::Debug for ShadowDirector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShadowDirector")
            .field("entities", &self.state.store.len())
            .field("derived_nodes", &self.state.graph.node_count())
            .field("editing", &self.session.is_some())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

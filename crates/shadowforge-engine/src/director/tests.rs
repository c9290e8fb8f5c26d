//! Tests for edit sessions.

use std::sync::{Arc, Mutex};

use super::*;
use shadowforge_config::EnvironmentMode;
use shadowforge_test::{chain, precedence, roster, routing};

fn precedence_director(durations: &[i64]) -> ShadowDirector {
    ShadowDirector::load(precedence::registry().unwrap(), &precedence::chain(durations)).unwrap()
}

fn roster_director() -> ShadowDirector {
    let drafts = [
        roster::employee(1, "BRU"),
        roster::employee(2, "LHR"),
        roster::assigned_flight(10, "BRU", "LHR", 100, 1),
        roster::assigned_flight(11, "LHR", "BRU", 200, 1),
        roster::assigned_flight(12, "LHR", "AMS", 150, 2),
    ];
    ShadowDirector::load(roster::registry().unwrap(), &drafts).unwrap()
}

fn int(director: &ShadowDirector, id: u64, name: &str) -> i64 {
    director.get(EntityId(id), name).unwrap().int_or(i64::MIN)
}

fn value(director: &ShadowDirector, id: u64, name: &str) -> Value {
    director.get(EntityId(id), name).unwrap().clone()
}

fn attr(director: &ShadowDirector, entity_type: &str, name: &str) -> AttrId {
    director.registry().attr(entity_type, name).unwrap()
}

/// Listener writing one line per hook into a shared log.
#[derive(Clone, Default)]
struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    fn events(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    fn push(&self, event: String) {
        self.0.lock().unwrap().push(event);
    }
}

impl ShadowListener for EventLog {
    fn before_attribute_changed(&mut self, store: &EntityStore, node: NodeKey, new: &Value) {
        let old = store.peek(node).cloned().unwrap_or_default();
        self.push(format!("before {} {} -> {}", node.entity, old, new));
    }

    fn after_attribute_changed(&mut self, change: &AttributeChange) {
        self.push(format!("after {} {} -> {}", change.entity, change.old, change.new));
    }

    fn change_rejected(&mut self, node: NodeKey, _error: &ShadowError) {
        self.push(format!("rejected {}", node.entity));
    }

    fn after_entity_added(&mut self, _store: &EntityStore, entity: EntityId) {
        self.push(format!("added {entity}"));
    }

    fn before_entity_removed(&mut self, store: &EntityStore, entity: EntityId) {
        assert!(store.contains(entity));
        self.push(format!("removing {entity}"));
    }

    fn after_edit(&mut self, changes: &ChangeList) {
        self.push(format!("edit {}", changes.len()));
    }
}

// ============================================================================
// Loading
// ============================================================================

mod loading {
    use super::*;

    #[test]
    fn test_load_derives_every_attribute() {
        let director = precedence_director(&[5, 3, 2]);

        let starts: Vec<i64> = (1..=3).map(|id| int(&director, id, precedence::START_DATE)).collect();
        let ends: Vec<i64> = (1..=3).map(|id| int(&director, id, precedence::END_DATE)).collect();
        assert_eq!(starts, vec![0, 5, 8]);
        assert_eq!(ends, vec![5, 8, 10]);
        assert!(director.verify().is_ok());
    }

    #[test]
    fn test_load_rejects_cycles() {
        let drafts = [chain::cell(1, 0, Some(2)), chain::cell(2, 0, Some(1))];
        let result = ShadowDirector::load(chain::registry().unwrap(), &drafts);

        assert!(matches!(result, Err(ShadowError::CyclicDependency(_))));
    }

    #[test]
    fn test_load_accepts_forward_references() {
        let drafts = [
            precedence::allocation(2, 3, &[1]),
            precedence::allocation(1, 5, &[]),
        ];
        let director = ShadowDirector::load(precedence::registry().unwrap(), &drafts).unwrap();

        assert_eq!(int(&director, 2, precedence::START_DATE), 5);
    }

    #[test]
    fn test_inverse_of_follows_order_key() {
        let director = roster_director();
        let employee = attr(&director, roster::FLIGHT_ASSIGNMENT, roster::ASSIGNED_EMPLOYEE);

        assert_eq!(
            director.inverse_of(EntityId(1), employee).to_vec(),
            vec![EntityId(10), EntityId(11)]
        );
        assert!(director.inverse_of(EntityId(10), employee).is_empty());
    }

    #[test]
    fn test_affected_by_lists_downstream_in_order() {
        let director = precedence_director(&[5, 3, 2]);

        let affected = director.affected_by(EntityId(1), precedence::DURATION).unwrap();

        assert_eq!(affected.len(), 7);
        assert_eq!(affected[0].entity, EntityId(1));
        assert_eq!(affected[6].entity, EntityId(3));
        let heights: Vec<u32> = affected
            .iter()
            .map(|n| director.graph().height(*n).unwrap())
            .collect();
        assert!(heights.windows(2).all(|w| w[0] <= w[1]));
    }
}

// ============================================================================
// Sessions
// ============================================================================

mod sessions {
    use super::*;

    #[test]
    fn test_edit_requires_a_session() {
        let mut director = precedence_director(&[5]);

        assert_eq!(
            director.set_decision(EntityId(1), precedence::DURATION, 1),
            Err(ShadowError::NoActiveSession)
        );
        assert_eq!(director.end_edit(), Err(ShadowError::NoActiveSession));
        assert_eq!(
            director.remove_entity(EntityId(1)),
            Err(ShadowError::NoActiveSession)
        );
    }

    #[test]
    fn test_sessions_do_not_nest() {
        let mut director = precedence_director(&[5]);

        director.begin_edit().unwrap();
        assert_eq!(director.begin_edit(), Err(ShadowError::SessionAlreadyActive));
        assert!(director.is_editing());
        director.end_edit().unwrap();
        assert!(!director.is_editing());
    }

    #[test]
    fn test_unknown_entity_aborts_the_session() {
        let mut director = precedence_director(&[5, 3]);

        director.begin_edit().unwrap();
        director.set_decision(EntityId(1), precedence::DURATION, 1).unwrap();
        assert_eq!(
            director.set_decision(EntityId(99), precedence::DURATION, 1),
            Err(ShadowError::UnknownEntity(EntityId(99)))
        );
        assert_eq!(
            director.set_decision(EntityId(2), precedence::DURATION, 1),
            Err(ShadowError::SessionAborted)
        );

        let changes = director.end_edit().unwrap();
        assert!(changes.aborted);
        assert!(changes.get(EntityId(1), attr(&director, precedence::ALLOCATION, precedence::DURATION)).is_some());
        assert_eq!(int(&director, 2, precedence::DURATION), 3);

        director.begin_edit().unwrap();
        director.set_decision(EntityId(2), precedence::DURATION, 1).unwrap();
        assert!(!director.end_edit().unwrap().aborted);
    }

    #[test]
    fn test_removing_unknown_entity_aborts() {
        let mut director = precedence_director(&[5]);

        director.begin_edit().unwrap();
        assert_eq!(
            director.remove_entity(EntityId(7)),
            Err(ShadowError::UnknownEntity(EntityId(7)))
        );
        assert!(director.end_edit().unwrap().aborted);
    }

    #[test]
    fn test_validation_errors_keep_the_session() {
        let mut director = precedence_director(&[5, 3]);

        director.begin_edit().unwrap();
        assert!(matches!(
            director.set_decision(EntityId(1), precedence::END_DATE, 3),
            Err(ShadowError::InvalidAttributeKind { .. })
        ));
        assert!(matches!(
            director.set_decision(EntityId(1), "colour", 3),
            Err(ShadowError::UnknownAttribute { .. })
        ));
        assert!(matches!(
            director.set_decision(EntityId(2), precedence::PREDECESSORS, Value::refs([42u64])),
            Err(ShadowError::InvalidValue { .. })
        ));
        assert_eq!(
            director.add_entity(precedence::allocation(1, 1, &[])),
            Err(ShadowError::DuplicateEntity(EntityId(1)))
        );

        director.set_decision(EntityId(1), precedence::DURATION, 1).unwrap();
        let changes = director.end_edit().unwrap();
        assert!(!changes.aborted);
        assert_eq!(int(&director, 2, precedence::START_DATE), 1);
    }

    #[test]
    fn test_edit_closure_returns_result_and_changes() {
        let mut director = precedence_director(&[5, 3]);

        let (old, changes) = director
            .edit(|d| d.set_decision(EntityId(1), precedence::DURATION, 2))
            .unwrap();

        assert_eq!(old, Value::Int(5));
        assert_eq!(changes.derived().count(), 4);
        assert!(!director.is_editing());
    }

    #[test]
    fn test_failed_edit_closure_closes_the_session() {
        let mut director = precedence_director(&[5]);

        let result = director.edit(|d| d.set_decision(EntityId(1), precedence::END_DATE, 2));

        assert!(result.is_err());
        assert!(!director.is_editing());
    }
}

// ============================================================================
// Decisions
// ============================================================================

mod decisions {
    use super::*;

    #[test]
    fn test_duration_change_runs_down_the_chain() {
        let mut director = precedence_director(&[5, 3, 2]);

        director.begin_edit().unwrap();
        let old = director.set_decision(EntityId(1), precedence::DURATION, 1).unwrap();
        let changes = director.end_edit().unwrap();

        assert_eq!(old, Value::Int(5));
        let spans: Vec<(i64, i64)> = (1..=3)
            .map(|id| {
                (
                    int(&director, id, precedence::START_DATE),
                    int(&director, id, precedence::END_DATE),
                )
            })
            .collect();
        assert_eq!(spans, vec![(0, 1), (1, 4), (4, 6)]);
        assert_eq!(changes.len(), 8);
        assert_eq!(changes.derived().count(), 7);
    }

    #[test]
    fn test_writing_the_current_value_changes_nothing() {
        let mut director = precedence_director(&[5, 3]);

        director.begin_edit().unwrap();
        let old = director.set_decision(EntityId(1), precedence::DURATION, 5).unwrap();
        let changes = director.end_edit().unwrap();

        assert_eq!(old, Value::Int(5));
        assert!(changes.is_empty());
    }

    #[test]
    fn test_changes_coalesce_per_attribute() {
        let mut director = precedence_director(&[5, 3]);
        let end = attr(&director, precedence::ALLOCATION, precedence::END_DATE);

        director.begin_edit().unwrap();
        director.set_decision(EntityId(1), precedence::DURATION, 1).unwrap();
        director.set_decision(EntityId(1), precedence::DURATION, 9).unwrap();
        let changes = director.end_edit().unwrap();

        let change = changes.get(EntityId(2), end).unwrap();
        assert_eq!(change.old, Value::Int(8));
        assert_eq!(change.new, Value::Int(12));
        assert_eq!(change.kind, AttributeKind::Derived);
        assert_eq!(changes.len(), 5);
    }

    #[test]
    fn test_oscillation_cancels_out() {
        let mut director = precedence_director(&[5, 3]);

        director.begin_edit().unwrap();
        director.set_decision(EntityId(1), precedence::DURATION, 1).unwrap();
        director.set_decision(EntityId(1), precedence::DURATION, 5).unwrap();
        let changes = director.end_edit().unwrap();

        assert!(changes.is_empty());
    }

    #[test]
    fn test_unchanged_derivation_is_not_reported() {
        let mut director = precedence_director(&[5, 3]);

        director.begin_edit().unwrap();
        director.set_decision(EntityId(2), precedence::RELEASE_DATE, 4).unwrap();
        let changes = director.end_edit().unwrap();

        assert_eq!(changes.len(), 1);
        assert_eq!(changes.derived().count(), 0);
    }

    #[test]
    fn test_decision_changes_can_be_hidden() {
        let config = EngineConfig::default().with_decision_changes(false);
        let mut director = ShadowDirector::load_with_config(
            precedence::registry().unwrap(),
            &precedence::chain(&[5, 3]),
            config,
        )
        .unwrap();

        director.begin_edit().unwrap();
        director.set_decision(EntityId(1), precedence::DURATION, 1).unwrap();
        let changes = director.end_edit().unwrap();

        assert!(changes.iter().all(|c| c.kind.is_derived()));
        assert_eq!(changes.len(), 4);
    }
}

// ============================================================================
// Structure
// ============================================================================

mod structure {
    use super::*;

    #[test]
    fn test_reassigning_moves_between_mirrors() {
        let mut director = roster_director();
        let employee = attr(&director, roster::FLIGHT_ASSIGNMENT, roster::ASSIGNED_EMPLOYEE);

        director.begin_edit().unwrap();
        director
            .set_decision(EntityId(11), roster::ASSIGNED_EMPLOYEE, EntityId(2))
            .unwrap();
        let changes = director.end_edit().unwrap();

        assert_eq!(director.inverse_of(EntityId(1), employee).to_vec(), vec![EntityId(10)]);
        assert_eq!(
            director.inverse_of(EntityId(2), employee).to_vec(),
            vec![EntityId(12), EntityId(11)]
        );
        assert_eq!(int(&director, 1, roster::ASSIGNMENT_COUNT), 1);
        assert_eq!(int(&director, 2, roster::ASSIGNMENT_COUNT), 2);
        assert_eq!(value(&director, 1, roster::LAST_ARRIVES_HOME), Value::Bool(false));
        assert_eq!(int(&director, 2, roster::INVALID_CONNECTIONS), 1);
        assert_eq!(value(&director, 11, roster::PREVIOUS_ARRIVAL), Value::from("AMS"));
        assert!(changes.touches(EntityId(1)));
        assert!(changes.touches(EntityId(2)));
        assert!(director.verify().is_ok());
    }

    #[test]
    fn test_unassigning_clears_previous() {
        let mut director = roster_director();

        director.begin_edit().unwrap();
        director
            .set_decision(EntityId(10), roster::ASSIGNED_EMPLOYEE, Value::Null)
            .unwrap();
        director.end_edit().unwrap();

        assert_eq!(value(&director, 11, roster::PREVIOUS_ARRIVAL), Value::Null);
        assert_eq!(value(&director, 1, roster::FIRST_DEPARTS_HOME), Value::Bool(false));
        assert!(director.verify().is_ok());
    }

    #[test]
    fn test_order_key_change_reorders_the_mirror() {
        let mut director = roster_director();
        let employee = attr(&director, roster::FLIGHT_ASSIGNMENT, roster::ASSIGNED_EMPLOYEE);

        director.begin_edit().unwrap();
        director.set_decision(EntityId(11), roster::DEPARTURE_TIME, 50).unwrap();
        director.end_edit().unwrap();

        assert_eq!(
            director.inverse_of(EntityId(1), employee).to_vec(),
            vec![EntityId(11), EntityId(10)]
        );
        assert_eq!(value(&director, 11, roster::PREVIOUS_ARRIVAL), Value::Null);
        assert_eq!(value(&director, 10, roster::PREVIOUS_ARRIVAL), Value::from("BRU"));
        assert_eq!(value(&director, 1, roster::FIRST_DEPARTS_HOME), Value::Bool(false));
        assert!(director.verify().is_ok());
    }

    #[test]
    fn test_relinking_chain_recomputes_tail() {
        let mut director =
            ShadowDirector::load(chain::registry().unwrap(), &chain::linked(&[1, 2, 3])).unwrap();

        director.begin_edit().unwrap();
        director.set_decision(EntityId(3), chain::UPSTREAM, EntityId(1)).unwrap();
        director.end_edit().unwrap();

        assert_eq!(int(&director, 3, chain::D), chain::expected_tail(&[1, 3]));
        assert!(director.verify().is_ok());
    }

    #[test]
    fn test_cycle_is_rejected_and_rolled_back() {
        let mut director =
            ShadowDirector::load(chain::registry().unwrap(), &chain::linked(&[1, 2, 3])).unwrap();
        let log = EventLog::default();
        director.add_listener(log.clone());
        let tail = int(&director, 3, chain::D);

        director.begin_edit().unwrap();
        let result = director.set_decision(EntityId(1), chain::UPSTREAM, EntityId(3));
        assert!(matches!(result, Err(ShadowError::CyclicDependency(_))));

        assert_eq!(value(&director, 1, chain::UPSTREAM), Value::Null);
        assert_eq!(int(&director, 3, chain::D), tail);
        assert!(log.events().contains(&"rejected #1".to_string()));

        director.set_decision(EntityId(1), chain::A, 5).unwrap();
        let changes = director.end_edit().unwrap();
        assert!(!changes.aborted);
        assert_eq!(int(&director, 3, chain::D), chain::expected_tail(&[5, 2, 3]));
        assert!(director.verify().is_ok());
    }

    #[test]
    fn test_self_reference_is_a_cycle() {
        let mut director =
            ShadowDirector::load(chain::registry().unwrap(), &chain::linked(&[1])).unwrap();

        director.begin_edit().unwrap();
        let result = director.set_decision(EntityId(1), chain::UPSTREAM, EntityId(1));
        director.end_edit().unwrap();

        assert!(matches!(result, Err(ShadowError::CyclicDependency(_))));
        assert!(director.verify().is_ok());
    }
}

// ============================================================================
// Entity lifecycle
// ============================================================================

mod lifecycle {
    use super::*;

    #[test]
    fn test_added_entity_is_derived_and_listed() {
        let mut director = precedence_director(&[5, 3, 2]);

        director.begin_edit().unwrap();
        director.add_entity(precedence::allocation(4, 4, &[3])).unwrap();
        let changes = director.end_edit().unwrap();

        assert_eq!(int(&director, 4, precedence::START_DATE), 10);
        assert_eq!(int(&director, 4, precedence::END_DATE), 14);
        assert_eq!(changes.added, vec![EntityId(4)]);
        assert!(!changes.touches(EntityId(4)));
        assert!(changes.changes.is_empty());
        assert!(director.verify().is_ok());
    }

    #[test]
    fn test_added_entity_updates_inverse_readers() {
        let mut director = roster_director();
        let count = attr(&director, roster::EMPLOYEE, roster::ASSIGNMENT_COUNT);

        director.begin_edit().unwrap();
        director
            .add_entity(roster::assigned_flight(13, "BRU", "CDG", 300, 1))
            .unwrap();
        let changes = director.end_edit().unwrap();

        assert_eq!(int(&director, 1, roster::ASSIGNMENT_COUNT), 3);
        assert_eq!(value(&director, 1, roster::LAST_ARRIVES_HOME), Value::Bool(false));
        assert_eq!(value(&director, 13, roster::PREVIOUS_ARRIVAL), Value::from("BRU"));
        assert_eq!(changes.get(EntityId(1), count).unwrap().new, Value::Int(3));
        assert!(director.verify().is_ok());
    }

    #[test]
    fn test_added_entity_may_slot_in_between() {
        let mut director = roster_director();

        director.begin_edit().unwrap();
        director
            .add_entity(roster::assigned_flight(13, "LHR", "LHR", 150, 1))
            .unwrap();
        director.end_edit().unwrap();

        assert_eq!(value(&director, 13, roster::PREVIOUS_ARRIVAL), Value::from("LHR"));
        assert_eq!(value(&director, 11, roster::PREVIOUS_ARRIVAL), Value::from("LHR"));
        assert!(director.verify().is_ok());
    }

    #[test]
    fn test_removal_splices_predecessors() {
        let mut director = precedence_director(&[5, 3, 2]);
        let predecessors = attr(&director, precedence::ALLOCATION, precedence::PREDECESSORS);

        director.begin_edit().unwrap();
        director.remove_entity(EntityId(2)).unwrap();
        let changes = director.end_edit().unwrap();

        assert!(!director.store().contains(EntityId(2)));
        assert_eq!(value(&director, 3, precedence::PREDECESSORS), Value::refs([1u64]));
        assert_eq!(int(&director, 3, precedence::START_DATE), 5);
        assert_eq!(int(&director, 3, precedence::END_DATE), 7);
        assert_eq!(
            director.inverse_of(EntityId(1), predecessors).to_vec(),
            vec![EntityId(3)]
        );
        assert!(director.inverse_of(EntityId(2), predecessors).is_empty());
        assert_eq!(changes.removed, vec![EntityId(2)]);
        assert!(!changes.touches(EntityId(2)));
        assert!(director.verify().is_ok());
    }

    #[test]
    fn test_removal_drops_only_the_entity_from_the_graph() {
        let mut director = precedence_director(&[5, 3, 2]);
        let predecessors = attr(&director, precedence::ALLOCATION, precedence::PREDECESSORS);
        let end_date = attr(&director, precedence::ALLOCATION, precedence::END_DATE);
        let height_of_3 = director.graph().height(NodeKey::new(EntityId(3), end_date));

        director
            .edit(|d| d.remove_entity(EntityId(2)))
            .unwrap();

        let graph = director.graph();
        assert_eq!(graph.node_count(), 6);
        assert_eq!(graph.height(NodeKey::new(EntityId(2), end_date)), None);
        assert_eq!(graph.height(NodeKey::new(EntityId(3), end_date)), height_of_3);
        assert_eq!(graph.incoming(predecessors, EntityId(2)).count(), 0);
        assert_eq!(
            graph.incoming(predecessors, EntityId(1)).collect::<Vec<_>>(),
            vec![EntityId(3)]
        );
    }

    #[test]
    fn test_removing_the_head_detaches_successors() {
        let mut director = precedence_director(&[5, 3, 2]);

        director.begin_edit().unwrap();
        director.remove_entity(EntityId(1)).unwrap();
        director.end_edit().unwrap();

        assert_eq!(value(&director, 2, precedence::PREDECESSORS), Value::Refs(Vec::new()));
        assert_eq!(int(&director, 2, precedence::START_DATE), 0);
        assert_eq!(int(&director, 3, precedence::START_DATE), 3);
        assert!(director.verify().is_ok());
    }

    #[test]
    fn test_removal_detaches_one_relations() {
        let mut director = roster_director();

        director.begin_edit().unwrap();
        director.remove_entity(EntityId(1)).unwrap();
        let changes = director.end_edit().unwrap();

        assert_eq!(value(&director, 10, roster::ASSIGNED_EMPLOYEE), Value::Null);
        assert_eq!(value(&director, 11, roster::ASSIGNED_EMPLOYEE), Value::Null);
        assert_eq!(value(&director, 11, roster::PREVIOUS_ARRIVAL), Value::Null);
        assert_eq!(changes.removed, vec![EntityId(1)]);
        assert!(changes.touches(EntityId(11)));
        assert!(director.verify().is_ok());
    }

    #[test]
    fn test_add_then_remove_leaves_no_trace() {
        let mut director = precedence_director(&[5, 3]);

        director.begin_edit().unwrap();
        director.add_entity(precedence::allocation(3, 4, &[2])).unwrap();
        director.remove_entity(EntityId(3)).unwrap();
        let changes = director.end_edit().unwrap();

        assert!(changes.is_empty());
        assert!(!director.store().contains(EntityId(3)));
        assert!(director.verify().is_ok());
    }

    #[test]
    fn test_removed_entity_can_be_added_back() {
        let mut director = precedence_director(&[5, 3, 2]);

        director
            .edit(|d| d.remove_entity(EntityId(3)))
            .unwrap();
        director
            .edit(|d| d.add_entity(precedence::allocation(3, 2, &[2])))
            .unwrap();

        assert_eq!(int(&director, 3, precedence::END_DATE), 10);
        assert!(director.verify().is_ok());
    }
}

// ============================================================================
// Listeners
// ============================================================================

mod listeners {
    use super::*;

    #[test]
    fn test_hooks_fire_in_session_order() {
        let mut director = precedence_director(&[5, 3]);
        let log = EventLog::default();
        director.add_listener(log.clone());

        director.begin_edit().unwrap();
        director.set_decision(EntityId(1), precedence::DURATION, 1).unwrap();
        director.end_edit().unwrap();

        let events = log.events();
        assert_eq!(events.first().map(String::as_str), Some("before #1 5 -> 1"));
        assert_eq!(events.get(1).map(String::as_str), Some("after #1 5 -> 1"));
        assert_eq!(events.last().map(String::as_str), Some("edit 5"));
        assert_eq!(events.iter().filter(|e| e.starts_with("before")).count(), 5);
        assert_eq!(events.iter().filter(|e| e.starts_with("after")).count(), 5);
    }

    #[test]
    fn test_entity_hooks() {
        let mut director = precedence_director(&[5, 3]);
        let log = EventLog::default();
        director.add_listener(log.clone());

        director.begin_edit().unwrap();
        director.add_entity(precedence::allocation(3, 1, &[])).unwrap();
        director.remove_entity(EntityId(2)).unwrap();
        director.end_edit().unwrap();

        let events = log.events();
        assert!(events.contains(&"added #3".to_string()));
        assert!(events.contains(&"removing #2".to_string()));
    }

    #[test]
    fn test_no_hooks_for_no_ops() {
        let mut director = precedence_director(&[5]);
        let log = EventLog::default();
        director.add_listener(log.clone());

        director.begin_edit().unwrap();
        director.set_decision(EntityId(1), precedence::DURATION, 5).unwrap();
        director.end_edit().unwrap();

        assert_eq!(log.events(), vec!["edit 0".to_string()]);
    }
}

// ============================================================================
// Snapshots and checks
// ============================================================================

mod snapshots {
    use super::*;

    #[test]
    fn test_restore_puts_the_state_back() {
        let mut director = precedence_director(&[5, 3, 2]);
        let snapshot = director.snapshot().unwrap();

        director
            .edit(|d| {
                d.set_decision(EntityId(1), precedence::DURATION, 1)?;
                d.remove_entity(EntityId(2))
            })
            .unwrap();
        director.restore(snapshot).unwrap();

        assert!(director.store().contains(EntityId(2)));
        assert_eq!(int(&director, 3, precedence::END_DATE), 10);
        assert!(director.verify().is_ok());
    }

    #[test]
    fn test_snapshot_requires_a_closed_session() {
        let mut director = precedence_director(&[5]);
        let snapshot = director.snapshot().unwrap();
        assert_eq!(snapshot.len(), 1);

        director.begin_edit().unwrap();
        assert!(matches!(director.snapshot(), Err(ShadowError::SessionAlreadyActive)));
        assert_eq!(director.restore(snapshot), Err(ShadowError::SessionAlreadyActive));
    }

    #[test]
    fn test_restore_rejects_foreign_snapshots() {
        let mut director = precedence_director(&[5]);
        let other = precedence_director(&[5]);

        let result = director.restore(other.snapshot().unwrap());

        assert!(matches!(result, Err(ShadowError::Config(_))));
    }

    #[test]
    fn test_recompute_all_is_a_no_op_on_settled_state() {
        let mut director = precedence_director(&[5, 3, 2]);
        director
            .edit(|d| d.set_decision(EntityId(2), precedence::DURATION, 7))
            .unwrap();

        assert_eq!(director.recompute_all().unwrap(), Vec::new());

        director.begin_edit().unwrap();
        assert_eq!(director.recompute_all(), Err(ShadowError::SessionAlreadyActive));
    }

    #[test]
    fn test_full_assert_accepts_consistent_sessions() {
        let config = EngineConfig::default().with_environment_mode(EnvironmentMode::FullAssert);
        let mut director = ShadowDirector::load_with_config(
            roster::registry().unwrap(),
            &[
                roster::employee(1, "BRU"),
                roster::assigned_flight(10, "BRU", "LHR", 100, 1),
            ],
            config,
        )
        .unwrap();

        let (_, changes) = director
            .edit(|d| {
                d.add_entity(roster::assigned_flight(11, "LHR", "BRU", 200, 1))?;
                d.set_decision(EntityId(10), roster::DEPARTURE_TIME, 300)
            })
            .unwrap();

        assert_eq!(changes.added, vec![EntityId(11)]);
        assert_eq!(value(&director, 10, roster::PREVIOUS_ARRIVAL), Value::from("BRU"));
    }
}

// ============================================================================
// Randomized edits
// ============================================================================

mod randomized {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    /// Reloads the current decisions into a fresh director.
    fn from_scratch(director: &ShadowDirector) -> ShadowDirector {
        let drafts: Vec<_> = director
            .store()
            .ids()
            .map(|id| {
                let a = director.get(id, chain::A).unwrap().int_or(0);
                let upstream = director.get(id, chain::UPSTREAM).unwrap().as_entity();
                chain::cell(id.0, a, upstream.map(|e| e.0))
            })
            .collect();
        ShadowDirector::load(chain::registry().unwrap(), &drafts).unwrap()
    }

    fn assert_matches_scratch(director: &ShadowDirector) {
        let scratch = from_scratch(director);
        for id in director.store().ids() {
            for name in [chain::B, chain::C, chain::D] {
                assert_eq!(director.get(id, name), scratch.get(id, name), "{name} of {id}");
            }
        }
    }

    #[test]
    fn test_random_edits_match_from_scratch() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut director =
            ShadowDirector::load(chain::registry().unwrap(), &chain::linked(&[1, 2, 3, 4, 5, 6]))
                .unwrap();
        let mut next_id = 7u64;

        for _ in 0..150 {
            director.begin_edit().unwrap();
            for _ in 0..rng.random_range(1..=3) {
                let ids: Vec<EntityId> = director.store().ids().collect();
                let pick = |rng: &mut ChaCha8Rng| ids[rng.random_range(0..ids.len())];
                match rng.random_range(0..10) {
                    0..=4 => {
                        let id = pick(&mut rng);
                        director.set_decision(id, chain::A, rng.random_range(-5..=5)).unwrap();
                    }
                    5..=7 => {
                        let id = pick(&mut rng);
                        let upstream = rng.random_bool(0.8).then(|| pick(&mut rng));
                        match director.set_decision(id, chain::UPSTREAM, upstream) {
                            Ok(_) | Err(ShadowError::CyclicDependency(_)) => {}
                            Err(other) => panic!("unexpected error: {other}"),
                        }
                    }
                    8 if ids.len() > 2 => {
                        director.remove_entity(pick(&mut rng)).unwrap();
                    }
                    _ => {
                        let upstream = pick(&mut rng);
                        director
                            .add_entity(chain::cell(next_id, rng.random_range(-5..=5), Some(upstream.0)))
                            .unwrap();
                        next_id += 1;
                    }
                }
            }
            director.end_edit().unwrap();

            director.verify().unwrap();
            assert_matches_scratch(&director);
        }
    }

    /// Reloads the decision attributes of every entity into a director built
    /// on `registry`.
    fn reload(director: &ShadowDirector, registry: ShadowRegistry) -> ShadowDirector {
        let current = director.registry();
        let drafts: Vec<EntityDraft> = director
            .store()
            .ids()
            .map(|id| {
                let t = current.entity_type(director.store().entity_type(id).unwrap());
                t.attributes
                    .iter()
                    .map(|&a| current.attribute(a))
                    .filter(|a| !a.kind.is_derived())
                    .fold(EntityDraft::new(id, t.name.clone()), |draft, a| {
                        draft.with(a.name.clone(), director.get(id, a.id).unwrap().clone())
                    })
            })
            .collect();
        ShadowDirector::load(registry, &drafts).unwrap()
    }

    /// Checks the director against itself and against a fresh load of its
    /// decisions.
    fn assert_consistent(director: &mut ShadowDirector, registry: ShadowRegistry) {
        director.verify().unwrap();
        assert_eq!(director.recompute_all().unwrap(), Vec::new());

        let scratch = reload(director, registry);
        let current = director.registry().clone();
        for id in director.store().ids() {
            let t = current.entity_type(director.store().entity_type(id).unwrap());
            for &derived in &t.derivation_order {
                assert_eq!(
                    director.get(id, derived),
                    scratch.get(id, derived),
                    "{} of {id}",
                    current.qualified_name(derived)
                );
            }
        }
    }

    fn ids_of(director: &ShadowDirector, entity_type: &str) -> Vec<EntityId> {
        let wanted = director.registry().type_index(entity_type).unwrap();
        director
            .store()
            .ids()
            .filter(|id| director.store().entity_type(*id).unwrap() == wanted)
            .collect()
    }

    fn pick(rng: &mut ChaCha8Rng, ids: &[EntityId]) -> EntityId {
        ids[rng.random_range(0..ids.len())]
    }

    #[test]
    fn test_random_route_edits_stay_consistent() {
        for seed in 0..8 {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let mut drafts = vec![routing::vehicle(1, 20), routing::vehicle(2, 30)];
            drafts.extend((0..8).map(|i| {
                routing::visit(1000 + i, rng.random_range(0..10), rng.random_range(1..=5), Some(1 + i % 2))
            }));
            let mut director = ShadowDirector::load(routing::registry().unwrap(), &drafts).unwrap();
            let (mut next_vehicle, mut next_visit) = (3u64, 1008u64);

            for _ in 0..40 {
                director.begin_edit().unwrap();
                for _ in 0..rng.random_range(1..=4) {
                    let vehicles = ids_of(&director, routing::VEHICLE);
                    let visits = ids_of(&director, routing::VISIT);
                    match rng.random_range(0..12) {
                        0..=2 => {
                            let visit = pick(&mut rng, &visits);
                            let vehicle = rng.random_bool(0.85).then(|| pick(&mut rng, &vehicles));
                            director.set_decision(visit, routing::ASSIGNED_VEHICLE, vehicle).unwrap();
                        }
                        3..=5 => {
                            let visit = pick(&mut rng, &visits);
                            director
                                .set_decision(visit, routing::SEQUENCE, rng.random_range(0..10))
                                .unwrap();
                        }
                        6 | 7 => {
                            let visit = pick(&mut rng, &visits);
                            director
                                .set_decision(visit, routing::SERVICE, rng.random_range(0..=6))
                                .unwrap();
                        }
                        8 => {
                            let vehicle = pick(&mut rng, &vehicles);
                            director
                                .set_decision(vehicle, routing::SHIFT_END, rng.random_range(0..=40))
                                .unwrap();
                        }
                        9 if visits.len() > 1 => {
                            director.remove_entity(pick(&mut rng, &visits)).unwrap();
                        }
                        10 if vehicles.len() > 1 => {
                            director.remove_entity(pick(&mut rng, &vehicles)).unwrap();
                        }
                        10 => {
                            director
                                .add_entity(routing::vehicle(next_vehicle, rng.random_range(0..=40)))
                                .unwrap();
                            next_vehicle += 1;
                        }
                        _ => {
                            let vehicle = pick(&mut rng, &vehicles);
                            director
                                .add_entity(routing::visit(
                                    next_visit,
                                    rng.random_range(0..10),
                                    rng.random_range(0..=6),
                                    Some(vehicle.0),
                                ))
                                .unwrap();
                            next_visit += 1;
                        }
                    }
                }
                director.end_edit().unwrap();

                assert_consistent(&mut director, routing::registry().unwrap());
            }
        }
    }

    #[test]
    fn test_random_roster_edits_stay_consistent() {
        const AIRPORTS: [&str; 3] = ["BRU", "LHR", "AMS"];

        for seed in 0..8 {
            let mut rng = ChaCha8Rng::seed_from_u64(100 + seed);
            let mut director = roster_director();
            let mut next_id = 20u64;

            for _ in 0..40 {
                director.begin_edit().unwrap();
                for _ in 0..rng.random_range(1..=4) {
                    let employees = ids_of(&director, roster::EMPLOYEE);
                    let flights = ids_of(&director, roster::FLIGHT_ASSIGNMENT);
                    let airport = AIRPORTS[rng.random_range(0..AIRPORTS.len())];
                    match rng.random_range(0..10) {
                        0..=2 => {
                            let flight = pick(&mut rng, &flights);
                            let employee = rng.random_bool(0.85).then(|| pick(&mut rng, &employees));
                            director.set_decision(flight, roster::ASSIGNED_EMPLOYEE, employee).unwrap();
                        }
                        3 | 4 => {
                            let flight = pick(&mut rng, &flights);
                            director
                                .set_decision(flight, roster::DEPARTURE_TIME, rng.random_range(0..300))
                                .unwrap();
                        }
                        5 => {
                            let flight = pick(&mut rng, &flights);
                            let name = if rng.random_bool(0.5) {
                                roster::DEPARTURE_AIRPORT
                            } else {
                                roster::ARRIVAL_AIRPORT
                            };
                            director.set_decision(flight, name, airport).unwrap();
                        }
                        6 if flights.len() > 1 => {
                            director.remove_entity(pick(&mut rng, &flights)).unwrap();
                        }
                        7 if employees.len() > 1 => {
                            director.remove_entity(pick(&mut rng, &employees)).unwrap();
                        }
                        7 => {
                            director.add_entity(roster::employee(next_id, airport)).unwrap();
                            next_id += 1;
                        }
                        _ => {
                            let employee = pick(&mut rng, &employees);
                            let to = AIRPORTS[rng.random_range(0..AIRPORTS.len())];
                            director
                                .add_entity(roster::assigned_flight(
                                    next_id,
                                    airport,
                                    to,
                                    rng.random_range(0..300),
                                    employee.0,
                                ))
                                .unwrap();
                            next_id += 1;
                        }
                    }
                }
                director.end_edit().unwrap();

                assert_consistent(&mut director, roster::registry().unwrap());
            }
        }
    }

    #[test]
    fn test_session_changes_replay_onto_a_snapshot() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let mut director =
            ShadowDirector::load(chain::registry().unwrap(), &chain::linked(&[0, 0, 0, 0])).unwrap();

        for _ in 0..50 {
            let before = director.snapshot().unwrap();
            let (_, changes) = director
                .edit(|d| {
                    let id = EntityId(rng.random_range(1..=4));
                    d.set_decision(id, chain::A, rng.random_range(-3..=3))
                })
                .unwrap();

            for change in changes.iter() {
                assert_eq!(before.peek(change.node()), Some(&change.old));
                assert_eq!(director.store().peek(change.node()), Some(&change.new));
                assert_ne!(change.old, change.new);
            }
        }
    }
}

//! Project allocation fixtures.
//!
//! Each allocation starts once all of its predecessors have ended and not
//! before its release date:
//!
//! - `predecessors_done_date = max(end_date over predecessors)`, 0 without any
//! - `start_date = max(predecessors_done_date, release_date)`
//! - `end_date = start_date + duration`
//!
//! Removing an allocation splices its predecessors into its successors.
//!
//! # Example
//!
//! ```
//! use shadowforge_test::precedence;
//!
//! let registry = precedence::registry().unwrap();
//! let drafts = precedence::chain(&[5, 3, 2]);
//!
//! assert!(registry.attr(precedence::ALLOCATION, precedence::END_DATE).is_some());
//! assert_eq!(drafts.len(), 3);
//! ```

use shadowforge_core::{
    DerivationRule, EntityDraft, RelationDef, RemovalPolicy, Result, ShadowRegistry, Value,
};

pub const ALLOCATION: &str = "Allocation";
pub const DURATION: &str = "duration";
pub const RELEASE_DATE: &str = "release_date";
pub const PREDECESSORS: &str = "predecessors";
pub const PREDECESSORS_DONE_DATE: &str = "predecessors_done_date";
pub const START_DATE: &str = "start_date";
pub const END_DATE: &str = "end_date";

/// Registry with the single `Allocation` entity type.
pub fn registry() -> Result<ShadowRegistry> {
    ShadowRegistry::builder()
        .entity(ALLOCATION, |t| {
            t.decision(DURATION, 0)
                .decision(RELEASE_DATE, 0)
                .relation(
                    PREDECESSORS,
                    RelationDef::many(ALLOCATION)
                        .removal(RemovalPolicy::Splice)
                        .mirrored(),
                )
                .derived(
                    PREDECESSORS_DONE_DATE,
                    0,
                    DerivationRule::via(PREDECESSORS, [END_DATE])
                        .compute(|input| Value::Int(input.related_ints(0).max().unwrap_or(0))),
                )
                .derived(
                    START_DATE,
                    0,
                    DerivationRule::local([PREDECESSORS_DONE_DATE, RELEASE_DATE])
                        .compute(|input| Value::Int(input.own_int(0).max(input.own_int(1)))),
                )
                .derived(
                    END_DATE,
                    0,
                    DerivationRule::local([START_DATE, DURATION])
                        .compute(|input| Value::Int(input.own_int(0) + input.own_int(1))),
                )
        })
        .build()
}

/// An allocation with zero release date.
pub fn allocation(id: u64, duration: i64, predecessors: &[u64]) -> EntityDraft {
    EntityDraft::new(id, ALLOCATION)
        .with(DURATION, duration)
        .with(PREDECESSORS, Value::refs(predecessors.iter().copied()))
}

/// Allocations `1..=n`, each preceded by the one before it.
pub fn chain(durations: &[i64]) -> Vec<EntityDraft> {
    durations
        .iter()
        .enumerate()
        .map(|(i, &duration)| {
            let id = i as u64 + 1;
            let predecessors: Vec<u64> = (id > 1).then(|| id - 1).into_iter().collect();
            allocation(id, duration, &predecessors)
        })
        .collect()
}

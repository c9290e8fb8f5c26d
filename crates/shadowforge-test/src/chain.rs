//! Synthetic derived chain across linked cells.
//!
//! Every cell carries `b = a + upstream.d`, `c = 2 * b` and `d = c - 1`,
//! so a change to one cell's `a` runs through `b`, `c` and `d` of every cell
//! downstream of it.

use shadowforge_core::{DerivationRule, EntityDraft, EntityId, RelationDef, Result, ShadowRegistry, Value};

pub const CELL: &str = "Cell";
pub const A: &str = "a";
pub const UPSTREAM: &str = "upstream";
pub const B: &str = "b";
pub const C: &str = "c";
pub const D: &str = "d";

/// Registry with the single `Cell` entity type.
pub fn registry() -> Result<ShadowRegistry> {
    ShadowRegistry::builder()
        .entity(CELL, |t| {
            t.decision(A, 0)
                .relation(UPSTREAM, RelationDef::one(CELL).mirrored())
                .derived(
                    B,
                    0,
                    DerivationRule::via(UPSTREAM, [D])
                        .reading([A])
                        .compute(|input| Value::Int(input.own_int(0) + input.related_ints(0).sum::<i64>())),
                )
                .derived(
                    C,
                    0,
                    DerivationRule::local([B]).compute(|input| Value::Int(2 * input.own_int(0))),
                )
                .derived(
                    D,
                    0,
                    DerivationRule::local([C]).compute(|input| Value::Int(input.own_int(0) - 1)),
                )
        })
        .build()
}

pub fn cell(id: u64, a: i64, upstream: Option<u64>) -> EntityDraft {
    EntityDraft::new(id, CELL)
        .with(A, a)
        .with(UPSTREAM, upstream.map(EntityId))
}

/// Cells `1..=n` with the given `a` values, each fed by the one before it.
pub fn linked(values: &[i64]) -> Vec<EntityDraft> {
    values
        .iter()
        .enumerate()
        .map(|(i, &a)| {
            let id = i as u64 + 1;
            cell(id, a, (id > 1).then(|| id - 1))
        })
        .collect()
}

/// The value `d` of the last cell takes after a full derivation.
pub fn expected_tail(values: &[i64]) -> i64 {
    values.iter().fold(0, |upstream_d, a| 2 * (a + upstream_d) - 1)
}

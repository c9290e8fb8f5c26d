//! Vehicle routing fixtures.
//!
//! Visits point at the vehicle serving them; each vehicle mirrors its visits
//! ordered by `sequence`. Unlike the roster, the ordered reads go through
//! derived values:
//!
//! - `Visit.arrival`: departure of the previous visit on the route, `0` for
//!   the first one
//! - `Visit.departure`: `arrival + service`
//! - `Vehicle.route_end`: departure of the last visit, `0` when idle
//! - `Vehicle.late_visits`: visits departing after `shift_end`

use shadowforge_core::{
    DerivationRule, EntityDraft, EntityId, RelationDef, Result, ShadowRegistry, Value,
};

pub const VEHICLE: &str = "Vehicle";
pub const SHIFT_END: &str = "shift_end";
pub const ROUTE_END: &str = "route_end";
pub const LATE_VISITS: &str = "late_visits";

pub const VISIT: &str = "Visit";
pub const SEQUENCE: &str = "sequence";
pub const SERVICE: &str = "service";
pub const ASSIGNED_VEHICLE: &str = "vehicle";
pub const ARRIVAL: &str = "arrival";
pub const DEPARTURE: &str = "departure";

/// Registry with `Vehicle` and `Visit`.
pub fn registry() -> Result<ShadowRegistry> {
    ShadowRegistry::builder()
        .entity(VEHICLE, |t| {
            t.decision(SHIFT_END, 0)
                .derived(
                    ROUTE_END,
                    0,
                    DerivationRule::inverse(VISIT, ASSIGNED_VEHICLE, [DEPARTURE])
                        .compute(|input| Value::Int(input.last().map_or(0, |v| v.int(0)))),
                )
                .derived(
                    LATE_VISITS,
                    0,
                    DerivationRule::inverse(VISIT, ASSIGNED_VEHICLE, [DEPARTURE])
                        .reading([SHIFT_END])
                        .compute(|input| {
                            let shift_end = input.own_int(0);
                            let late = input.related_ints(0).filter(|d| *d > shift_end).count();
                            Value::Int(late as i64)
                        }),
                )
        })
        .entity(VISIT, |t| {
            t.decision(SEQUENCE, 0)
                .decision(SERVICE, 0)
                .relation(
                    ASSIGNED_VEHICLE,
                    RelationDef::one(VEHICLE).mirrored_by(SEQUENCE),
                )
                .derived(
                    ARRIVAL,
                    0,
                    DerivationRule::previous(ASSIGNED_VEHICLE, [DEPARTURE])
                        .compute(|input| Value::Int(input.first().map_or(0, |v| v.int(0)))),
                )
                .derived(
                    DEPARTURE,
                    0,
                    DerivationRule::local([ARRIVAL, SERVICE])
                        .compute(|input| Value::Int(input.own_int(0) + input.own_int(1))),
                )
        })
        .build()
}

pub fn vehicle(id: u64, shift_end: i64) -> EntityDraft {
    EntityDraft::new(id, VEHICLE).with(SHIFT_END, shift_end)
}

/// A visit at position `sequence` on `vehicle`'s route, unassigned when `None`.
pub fn visit(id: u64, sequence: i64, service: i64, vehicle: Option<u64>) -> EntityDraft {
    EntityDraft::new(id, VISIT)
        .with(SEQUENCE, sequence)
        .with(SERVICE, service)
        .with(ASSIGNED_VEHICLE, vehicle.map(EntityId))
}

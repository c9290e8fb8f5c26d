//! Flight crew roster fixtures.
//!
//! Flight assignments point at the employee working them; each employee
//! mirrors its assignments ordered by departure time. Derived attributes
//! read that ordered inverse:
//!
//! - `Employee.assignment_count`
//! - `Employee.first_departs_home`: the earliest flight leaves from home
//! - `Employee.last_arrives_home`: the latest flight lands at home
//! - `Employee.invalid_connections`: consecutive flights where one lands
//!   somewhere other than where the next departs
//! - `FlightAssignment.previous_arrival`: where the employee's previous
//!   flight landed, `Null` for the first one

use shadowforge_core::{
    DerivationRule, EntityDraft, EntityId, RelationDef, Result, ShadowRegistry, Value,
};

pub const EMPLOYEE: &str = "Employee";
pub const HOME_AIRPORT: &str = "home_airport";
pub const ASSIGNMENT_COUNT: &str = "assignment_count";
pub const FIRST_DEPARTS_HOME: &str = "first_departs_home";
pub const LAST_ARRIVES_HOME: &str = "last_arrives_home";
pub const INVALID_CONNECTIONS: &str = "invalid_connections";

pub const FLIGHT_ASSIGNMENT: &str = "FlightAssignment";
pub const DEPARTURE_AIRPORT: &str = "departure_airport";
pub const ARRIVAL_AIRPORT: &str = "arrival_airport";
pub const DEPARTURE_TIME: &str = "departure_time";
pub const ASSIGNED_EMPLOYEE: &str = "employee";
pub const PREVIOUS_ARRIVAL: &str = "previous_arrival";

/// Registry with `Employee` and `FlightAssignment`.
pub fn registry() -> Result<ShadowRegistry> {
    ShadowRegistry::builder()
        .entity(EMPLOYEE, |t| {
            t.decision(HOME_AIRPORT, Value::Null)
                .derived(
                    ASSIGNMENT_COUNT,
                    0,
                    DerivationRule::inverse(FLIGHT_ASSIGNMENT, ASSIGNED_EMPLOYEE, Vec::<String>::new())
                        .compute(|input| Value::Int(input.related().len() as i64)),
                )
                .derived(
                    FIRST_DEPARTS_HOME,
                    true,
                    DerivationRule::inverse(FLIGHT_ASSIGNMENT, ASSIGNED_EMPLOYEE, [DEPARTURE_AIRPORT])
                        .reading([HOME_AIRPORT])
                        .compute(|input| {
                            let home = input.own(0);
                            Value::Bool(input.first().map_or(true, |f| f.value(0) == home))
                        }),
                )
                .derived(
                    LAST_ARRIVES_HOME,
                    true,
                    DerivationRule::inverse(FLIGHT_ASSIGNMENT, ASSIGNED_EMPLOYEE, [ARRIVAL_AIRPORT])
                        .reading([HOME_AIRPORT])
                        .compute(|input| {
                            let home = input.own(0);
                            Value::Bool(input.last().map_or(true, |f| f.value(0) == home))
                        }),
                )
                .derived(
                    INVALID_CONNECTIONS,
                    0,
                    DerivationRule::inverse(
                        FLIGHT_ASSIGNMENT,
                        ASSIGNED_EMPLOYEE,
                        [DEPARTURE_AIRPORT, ARRIVAL_AIRPORT],
                    )
                    .compute(|input| {
                        let invalid = input
                            .related()
                            .windows(2)
                            .filter(|pair| pair[0].value(1) != pair[1].value(0))
                            .count();
                        Value::Int(invalid as i64)
                    }),
                )
        })
        .entity(FLIGHT_ASSIGNMENT, |t| {
            t.decision(DEPARTURE_AIRPORT, Value::Null)
                .decision(ARRIVAL_AIRPORT, Value::Null)
                .decision(DEPARTURE_TIME, 0)
                .relation(
                    ASSIGNED_EMPLOYEE,
                    RelationDef::one(EMPLOYEE).mirrored_by(DEPARTURE_TIME),
                )
                .derived(
                    PREVIOUS_ARRIVAL,
                    Value::Null,
                    DerivationRule::previous(ASSIGNED_EMPLOYEE, [ARRIVAL_AIRPORT])
                        .compute(|input| {
                            input.first().map(|f| f.value(0).clone()).unwrap_or_default()
                        }),
                )
        })
        .build()
}

pub fn employee(id: u64, home: &str) -> EntityDraft {
    EntityDraft::new(id, EMPLOYEE).with(HOME_AIRPORT, home)
}

/// An unassigned flight leaving `from` at `departure_time` for `to`.
pub fn flight(id: u64, from: &str, to: &str, departure_time: i64) -> EntityDraft {
    EntityDraft::new(id, FLIGHT_ASSIGNMENT)
        .with(DEPARTURE_AIRPORT, from)
        .with(ARRIVAL_AIRPORT, to)
        .with(DEPARTURE_TIME, departure_time)
}

/// A flight already assigned to `employee`.
pub fn assigned_flight(
    id: u64,
    from: &str,
    to: &str,
    departure_time: i64,
    employee: u64,
) -> EntityDraft {
    flight(id, from, to, departure_time).with(ASSIGNED_EMPLOYEE, EntityId(employee))
}

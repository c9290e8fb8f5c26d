//! Incremental shadow-variable propagation for ShadowForge.
//!
//! This crate provides the active half of shadow-variable maintenance:
//! - The entity-level dependency graph with topological heights
//! - Height-ordered propagation to a fixed point
//! - Edit sessions producing coalesced change lists (`ShadowDirector`)
//! - Listener hooks for an external score consumer
//!
//! # Architecture
//!
//! Every derived node carries a height above all of its inputs. Edits mark
//! direct dependents dirty and the propagator pops them lowest height
//! first, so each node is recomputed at most once per edit and a node whose
//! value did not change stops the wave.

pub mod director;
pub mod graph;
pub mod listener;
pub mod propagation;

// ============================================================================
// Edit Sessions
// ============================================================================

pub use director::{AttributeChange, ChangeList, ShadowDirector, Snapshot};
pub use listener::ShadowListener;

// ============================================================================
// Propagation Internals
// ============================================================================

pub use graph::DependencyGraph;
pub use propagation::{derive_value, CommitObserver, Propagator};

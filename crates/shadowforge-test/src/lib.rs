//! Shared test fixtures for ShadowForge crates.
//!
//! This crate provides registries and entity drafts for testing.
//! It depends on `shadowforge-core` only, so the engine can use it as a
//! dev-dependency without a cycle.
//!
//! - [`precedence`] - Project allocations with precedence-driven dates
//! - [`roster`] - Flight crew roster with an ordered inverse relation
//! - [`routing`] - Vehicle routes reading derived values of ordered visits
//! - [`chain`] - Synthetic derived chain across linked cells
//!
//! # Usage
//!
//! Add as a dev-dependency in your crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! shadowforge-test = { workspace = true }
//! ```
//!
//! Then import the fixtures you need:
//!
//! ```ignore
//! use shadowforge_test::precedence::{allocation, chain, registry};
//! ```

pub mod chain;
pub mod precedence;
pub mod roster;
pub mod routing;

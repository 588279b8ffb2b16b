//! Test support shared by unit and scenario tests
//!
//! Stands in for the external zero-knowledge credential system with a
//! deterministic mock, and builds groups from seeded users.

pub mod assertions;
pub mod fixtures;

pub use assertions::*;
pub use fixtures::*;

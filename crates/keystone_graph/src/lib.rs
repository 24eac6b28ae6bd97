//! KEYSTONE Dependency Graph
//!
//! Builds the "must be realized before" graph from declared references and
//! orders it into provisioning phases whose members can be realized
//! concurrently.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cycle;
pub mod error;
pub mod graph;
pub mod schedule;

pub use error::{GraphError, GraphResult};
pub use graph::{DependencyGraph, Edge};
pub use schedule::{ProvisioningPhase, Schedule, Scheduler};

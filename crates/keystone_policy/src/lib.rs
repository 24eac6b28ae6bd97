//! KEYSTONE Policy Synthesis
//!
//! Derives access policy statements from the dependency graph. A principal
//! is granted exactly what its declared references need, scoped to the
//! referenced resources, and every emitted statement is audited against
//! those references before it leaves the crate.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod audit;
pub mod capability;
pub mod error;
pub mod statement;
pub mod synthesize;

pub use audit::GrantAuditor;
pub use capability::{ActionTemplate, CapabilityTable, KindCapabilities};
pub use error::{PolicyError, PolicyResult};
pub use statement::{Grant, PolicySet, PolicyStatement, ResourceRef};
pub use synthesize::PolicySynthesizer;

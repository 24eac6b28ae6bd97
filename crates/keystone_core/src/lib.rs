//! KEYSTONE Core Types
//!
//! Resource descriptors, references and the primitives shared by every
//! planning stage. This crate contains pure types and logic with no I/O.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod descriptor;
pub mod error;
pub mod hash;
pub mod id;
pub mod kind;
pub mod reference;
pub mod version;

// Re-exports
pub use descriptor::{AttributeValue, Attributes, DescriptorBuilder, ResourceDescriptor};
pub use error::{CoreError, CoreResult};
pub use hash::{Hash, HashError};
pub use id::ResourceId;
pub use kind::ResourceKind;
pub use reference::{Access, Reference};
pub use version::{Version, VersionError};

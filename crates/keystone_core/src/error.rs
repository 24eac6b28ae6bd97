//! Core error types for KEYSTONE.

/// Core result type
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised while constructing ids and descriptors.
///
/// Ids are carried as plain strings because the error may describe an id
/// that never made it through validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    /// Id is empty or contains characters that cannot name a resource
    #[error("invalid resource id {id:?}: {reason}")]
    InvalidId {
        /// The rejected id
        id: String,
        /// Why it was rejected
        reason: String,
    },

    /// A reference carried by one descriptor names a different source
    #[error("reference carried by {descriptor} claims source {claimed}")]
    MisattributedReference {
        /// Descriptor carrying the reference
        descriptor: String,
        /// Source id written on the reference
        claimed: String,
    },

    /// Attribute path is substituted twice, or shadows a literal attribute
    #[error("{id}: attribute path {path:?} conflicts with another substitution or a literal value")]
    ConflictingSubstitution {
        /// Descriptor id
        id: String,
        /// Conflicting path
        path: String,
    },

    /// Attribute path is empty or has an empty segment
    #[error("{id}: invalid attribute path {path:?}")]
    InvalidAttributePath {
        /// Descriptor id
        id: String,
        /// Offending path
        path: String,
    },
}

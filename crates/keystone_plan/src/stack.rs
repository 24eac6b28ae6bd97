//! Stack definitions.
//!
//! A stack is the named descriptor set the pipeline starts from. On disk it is
//! `{ "name": ..., "resources": [...] }`; each resource lists its references
//! without a source, since the source is the enclosing descriptor.

use crate::error::PlanResult;
use keystone_core::ResourceDescriptor;
use serde::{Deserialize, Serialize};

/// A named set of resource descriptors
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackDefinition {
    /// Stack name
    pub name: String,
    /// Descriptors, in declaration order
    #[serde(default)]
    pub resources: Vec<ResourceDescriptor>,
}

impl StackDefinition {
    /// Create an empty stack
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            resources: Vec::new(),
        }
    }

    /// Add a descriptor
    #[must_use]
    pub fn with_resource(mut self, descriptor: ResourceDescriptor) -> Self {
        self.resources.push(descriptor);
        self
    }

    /// Parse a JSON stack definition
    ///
    /// # Errors
    ///
    /// Returns error if the JSON is malformed or a descriptor is invalid
    pub fn from_json(json: &str) -> PlanResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize to pretty JSON
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails
    pub fn to_json(&self) -> PlanResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Replace the descriptor with the same id, or append it when new.
    /// Returns the replaced descriptor.
    pub fn replace(&mut self, descriptor: ResourceDescriptor) -> Option<ResourceDescriptor> {
        match self.resources.iter_mut().find(|d| d.id() == descriptor.id()) {
            Some(slot) => Some(std::mem::replace(slot, descriptor)),
            None => {
                self.resources.push(descriptor);
                None
            }
        }
    }

    /// Hand the descriptors to the graph builder
    #[must_use]
    pub fn into_descriptors(self) -> Vec<ResourceDescriptor> {
        self.resources
    }

    /// Number of descriptors
    #[must_use]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Check if the stack declares nothing
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

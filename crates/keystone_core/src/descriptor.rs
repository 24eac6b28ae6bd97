//! Immutable resource descriptors.
//!
//! A descriptor is the definition-time record of one resource: its kind, its
//! literal attributes and the references it makes to other resources. Once
//! built it cannot be changed; re-planning builds a fresh descriptor set.

use crate::error::{CoreError, CoreResult};
use crate::id::ResourceId;
use crate::kind::ResourceKind;
use crate::reference::{Access, Reference};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Literal attribute value
pub type AttributeValue = serde_json::Value;

/// Attribute bag keyed by top-level attribute name
pub type Attributes = BTreeMap<String, AttributeValue>;

/// Definition-time record of one resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "DescriptorRecord", into = "DescriptorRecord")]
pub struct ResourceDescriptor {
    id: ResourceId,
    kind: ResourceKind,
    attributes: Attributes,
    references: BTreeSet<Reference>,
}

impl ResourceDescriptor {
    /// Create a descriptor from its parts
    ///
    /// # Errors
    ///
    /// Returns error if a reference names another source, if an attribute
    /// path is malformed, or if two substitutions (or a substitution and a
    /// literal attribute) claim the same path
    pub fn new(
        id: ResourceId,
        kind: ResourceKind,
        attributes: Attributes,
        references: impl IntoIterator<Item = Reference>,
    ) -> CoreResult<Self> {
        let references: BTreeSet<Reference> = references.into_iter().collect();
        let mut paths: Vec<&str> = Vec::with_capacity(references.len());

        for reference in &references {
            if reference.source_id() != &id {
                return Err(CoreError::MisattributedReference {
                    descriptor: id.to_string(),
                    claimed: reference.source_id().to_string(),
                });
            }

            let path = reference.attribute_path();
            if path.is_empty() || path.split('.').any(str::is_empty) {
                return Err(CoreError::InvalidAttributePath {
                    id: id.to_string(),
                    path: path.to_string(),
                });
            }

            if shadows_literal(&attributes, path) || paths.iter().any(|p| overlaps(p, path)) {
                return Err(CoreError::ConflictingSubstitution {
                    id: id.to_string(),
                    path: path.to_string(),
                });
            }
            paths.push(path);
        }

        Ok(Self {
            id,
            kind,
            attributes,
            references,
        })
    }

    /// Start building a descriptor
    #[must_use]
    pub fn builder(id: impl Into<String>, kind: ResourceKind) -> DescriptorBuilder {
        DescriptorBuilder::new(id, kind)
    }

    /// Descriptor id
    #[must_use]
    pub fn id(&self) -> &ResourceId {
        &self.id
    }

    /// Resource kind
    #[must_use]
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Literal attributes
    #[must_use]
    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    /// Get a top-level literal attribute
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }

    /// Declared references, ordered
    #[must_use]
    pub fn references(&self) -> &BTreeSet<Reference> {
        &self.references
    }

    /// Ids this descriptor references
    #[must_use]
    pub fn referenced_ids(&self) -> BTreeSet<&ResourceId> {
        self.references.iter().map(Reference::target_id).collect()
    }
}

/// Whether `path` lands on (or inside) a literal attribute value
fn shadows_literal(attributes: &Attributes, path: &str) -> bool {
    let mut segments = path.split('.');
    let Some(mut current) = segments.next().and_then(|first| attributes.get(first)) else {
        return false;
    };

    for segment in segments {
        match current {
            AttributeValue::Object(map) => match map.get(segment) {
                Some(next) => current = next,
                None => return false,
            },
            // Substituting below a scalar or array would overwrite it
            _ => return true,
        }
    }

    true
}

/// Whether one dotted path equals or contains the other
fn overlaps(a: &str, b: &str) -> bool {
    fn contains(outer: &str, inner: &str) -> bool {
        inner.len() > outer.len()
            && inner.starts_with(outer)
            && inner.as_bytes()[outer.len()] == b'.'
    }
    a == b || contains(a, b) || contains(b, a)
}

/// Builder for [`ResourceDescriptor`]
#[derive(Debug, Clone)]
pub struct DescriptorBuilder {
    id: String,
    kind: ResourceKind,
    attributes: Attributes,
    references: Vec<PendingReference>,
}

#[derive(Debug, Clone)]
struct PendingReference {
    path: String,
    target: String,
    output: String,
    access: Access,
}

impl DescriptorBuilder {
    /// Create a new builder
    #[must_use]
    pub fn new(id: impl Into<String>, kind: ResourceKind) -> Self {
        Self {
            id: id.into(),
            kind,
            attributes: Attributes::new(),
            references: Vec::new(),
        }
    }

    /// Set a literal attribute
    #[must_use]
    pub fn attribute(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Declare a read-only reference
    #[must_use]
    pub fn reference(
        self,
        path: impl Into<String>,
        target: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        self.reference_with(path, target, output, Access::Read)
    }

    /// Declare a reference with an explicit access mode
    #[must_use]
    pub fn reference_with(
        mut self,
        path: impl Into<String>,
        target: impl Into<String>,
        output: impl Into<String>,
        access: Access,
    ) -> Self {
        self.references.push(PendingReference {
            path: path.into(),
            target: target.into(),
            output: output.into(),
            access,
        });
        self
    }

    /// Build the descriptor
    ///
    /// # Errors
    ///
    /// Returns error if any id is invalid or substitutions conflict
    pub fn build(self) -> CoreResult<ResourceDescriptor> {
        let id = ResourceId::new(self.id)?;
        let references = self
            .references
            .into_iter()
            .map(|pending| {
                Ok(Reference::new(
                    id.clone(),
                    ResourceId::new(pending.target)?,
                    pending.path,
                    pending.output,
                )
                .with_access(pending.access))
            })
            .collect::<CoreResult<Vec<_>>>()?;

        ResourceDescriptor::new(id, self.kind, self.attributes, references)
    }
}

/// On-disk form: references omit their source, which is the enclosing record
#[derive(Debug, Clone, Serialize, Deserialize)]
struct DescriptorRecord {
    id: String,
    kind: ResourceKind,
    #[serde(default)]
    attributes: Attributes,
    #[serde(default)]
    references: Vec<ReferenceRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ReferenceRecord {
    path: String,
    target: String,
    output: String,
    #[serde(default)]
    access: Access,
}

impl TryFrom<DescriptorRecord> for ResourceDescriptor {
    type Error = CoreError;

    fn try_from(record: DescriptorRecord) -> Result<Self, Self::Error> {
        let mut builder = DescriptorBuilder::new(record.id, record.kind);
        builder.attributes = record.attributes;
        for r in record.references {
            builder = builder.reference_with(r.path, r.target, r.output, r.access);
        }
        builder.build()
    }
}

impl From<ResourceDescriptor> for DescriptorRecord {
    fn from(descriptor: ResourceDescriptor) -> Self {
        Self {
            id: descriptor.id.into(),
            kind: descriptor.kind,
            attributes: descriptor.attributes,
            references: descriptor
                .references
                .into_iter()
                .map(|r| ReferenceRecord {
                    path: r.attribute_path().to_string(),
                    target: r.target_id().to_string(),
                    output: r.output().to_string(),
                    access: r.access(),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn make_lambda() -> ResourceDescriptor {
        ResourceDescriptor::builder("LMSLambda", ResourceKind::ComputeFunction)
            .attribute("runtime", "nodejs18.x")
            .attribute("handler", "index.handler")
            .attribute("environment", json!({ "STAGE": "prod" }))
            .reference_with("environment.TABLE_NAME", "CourseProgress", "tableName", Access::ReadWrite)
            .reference("environment.DB_HOST", "LMSDatabase", "endpoint")
            .build()
            .unwrap()
    }

    #[test]
    fn test_builder_sets_source() {
        let d = make_lambda();
        assert_eq!(d.id().as_str(), "LMSLambda");
        assert_eq!(d.kind(), ResourceKind::ComputeFunction);
        assert_eq!(d.references().len(), 2);
        assert!(d.references().iter().all(|r| r.source_id() == d.id()));
        assert_eq!(d.attribute("runtime"), Some(&json!("nodejs18.x")));
    }

    #[test]
    fn test_referenced_ids() {
        let d = make_lambda();
        let ids: Vec<&str> = d.referenced_ids().into_iter().map(ResourceId::as_str).collect();
        assert_eq!(ids, vec!["CourseProgress", "LMSDatabase"]);
    }

    #[test]
    fn test_misattributed_reference() {
        let id = ResourceId::new("LMSLambda").unwrap();
        let foreign = Reference::new(
            ResourceId::new("LMSApi").unwrap(),
            ResourceId::new("CourseProgress").unwrap(),
            "table",
            "tableName",
        );
        let result = ResourceDescriptor::new(id, ResourceKind::ComputeFunction, Attributes::new(), [foreign]);
        assert!(matches!(result, Err(CoreError::MisattributedReference { .. })));
    }

    #[test]
    fn test_substitution_shadowing_literal() {
        let result = ResourceDescriptor::builder("LMSLambda", ResourceKind::ComputeFunction)
            .attribute("environment", json!({ "TABLE_NAME": "fixed" }))
            .reference("environment.TABLE_NAME", "CourseProgress", "tableName")
            .build();
        assert!(matches!(result, Err(CoreError::ConflictingSubstitution { .. })));
    }

    #[test]
    fn test_substitution_below_scalar() {
        let result = ResourceDescriptor::builder("LMSLambda", ResourceKind::ComputeFunction)
            .attribute("environment", "none")
            .reference("environment.TABLE_NAME", "CourseProgress", "tableName")
            .build();
        assert!(matches!(result, Err(CoreError::ConflictingSubstitution { .. })));
    }

    #[test]
    fn test_overlapping_substitutions() {
        let result = ResourceDescriptor::builder("LMSLambda", ResourceKind::ComputeFunction)
            .reference("environment", "LMSDatabase", "endpoint")
            .reference("environment.TABLE_NAME", "CourseProgress", "tableName")
            .build();
        assert!(matches!(result, Err(CoreError::ConflictingSubstitution { .. })));

        let ok = ResourceDescriptor::builder("LMSLambda", ResourceKind::ComputeFunction)
            .reference("env", "LMSDatabase", "endpoint")
            .reference("environment", "CourseProgress", "tableName")
            .build();
        assert!(ok.is_ok());
    }

    #[test]
    fn test_invalid_path() {
        let result = ResourceDescriptor::builder("LMSLambda", ResourceKind::ComputeFunction)
            .reference("environment..TABLE", "CourseProgress", "tableName")
            .build();
        assert!(matches!(result, Err(CoreError::InvalidAttributePath { .. })));
    }

    #[test]
    fn test_invalid_target_id() {
        let result = ResourceDescriptor::builder("LMSLambda", ResourceKind::ComputeFunction)
            .reference("table", "", "tableName")
            .build();
        assert!(matches!(result, Err(CoreError::InvalidId { .. })));
    }

    #[test]
    fn test_serde_record_form() {
        let json = json!({
            "id": "LMSDatabase",
            "kind": "RelationalDatabase",
            "attributes": { "allocatedStorage": 20, "databaseName": "lmsdb" },
            "references": [
                { "path": "vpc", "target": "LMSVpc", "output": "vpcId" }
            ]
        });
        let d: ResourceDescriptor = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(d.kind(), ResourceKind::RelationalDatabase);
        let r = d.references().iter().next().unwrap();
        assert_eq!(r.source_id().as_str(), "LMSDatabase");
        assert_eq!(r.target_id().as_str(), "LMSVpc");
        assert_eq!(r.access(), Access::Read);

        let back = serde_json::to_value(&d).unwrap();
        let again: ResourceDescriptor = serde_json::from_value(back).unwrap();
        assert_eq!(again, d);
    }

    #[test]
    fn test_serde_rejects_conflict() {
        let json = json!({
            "id": "LMSLambda",
            "kind": "ComputeFunction",
            "attributes": { "handler": "index.handler" },
            "references": [
                { "path": "handler", "target": "LMSApi", "output": "url" }
            ]
        });
        let result: Result<ResourceDescriptor, _> = serde_json::from_value(json);
        assert!(result.is_err());
    }
}

//! Deterministic plan emission.
//!
//! The emitted plan is compact JSON with every map ordered, so the same graph
//! always yields the same bytes. The digest covers everything except itself and
//! lets an executor (or a later diff) detect a plan that was edited by hand.

use crate::error::{EmitError, EmitResult};
use keystone_core::{Attributes, Hash, Reference, ResourceDescriptor, ResourceId, ResourceKind, Version};
use keystone_graph::{DependencyGraph, Schedule};
use keystone_policy::{PolicySet, PolicyStatement};
use serde::{Deserialize, Serialize};

/// Current plan format version
pub const PLAN_FORMAT: u32 = 1;

/// A substitution the executor performs before activating a resource
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Binding {
    /// Dotted attribute path receiving the value
    pub path: String,
    /// Resource producing the value
    pub target: ResourceId,
    /// Output of the target
    pub output: String,
}

impl From<&Reference> for Binding {
    fn from(reference: &Reference) -> Self {
        Self {
            path: reference.attribute_path().to_string(),
            target: reference.target_id().clone(),
            output: reference.output().to_string(),
        }
    }
}

/// One resource as the executor sees it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedResource {
    /// Logical id
    pub id: ResourceId,
    /// Kind
    pub kind: ResourceKind,
    /// Literal attributes
    pub attributes: Attributes,
    /// Substitutions, ascending by path
    pub bindings: Vec<Binding>,
}

impl PlannedResource {
    fn from_descriptor(descriptor: &ResourceDescriptor) -> Self {
        let mut bindings: Vec<Binding> = descriptor.references().iter().map(Binding::from).collect();
        bindings.sort();
        Self {
            id: descriptor.id().clone(),
            kind: descriptor.kind(),
            attributes: descriptor.attributes().clone(),
            bindings,
        }
    }
}

/// Resources that may be realized concurrently
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedPhase {
    /// Position in the plan
    pub index: usize,
    /// Members, ascending by id
    pub resources: Vec<PlannedResource>,
}

/// An emitted provisioning plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    /// Plan format version
    pub format: u32,
    /// Capability table the policies were synthesized against
    pub capabilities_version: Version,
    /// Phases in provisioning order
    pub phases: Vec<PlannedPhase>,
    /// Statements ascending by principal
    pub policies: Vec<PolicyStatement>,
    /// BLAKE3 of the canonical encoding of the fields above
    pub digest: Hash,
}

/// Digested part of a plan, in field order
#[derive(Serialize)]
struct PlanContent<'a> {
    format: u32,
    capabilities_version: Version,
    phases: &'a [PlannedPhase],
    policies: &'a [PolicyStatement],
}

impl Plan {
    fn content(&self) -> PlanContent<'_> {
        PlanContent {
            format: self.format,
            capabilities_version: self.capabilities_version,
            phases: &self.phases,
            policies: &self.policies,
        }
    }

    /// Digest of the plan content, ignoring the recorded digest
    ///
    /// # Errors
    ///
    /// Returns error if the content cannot be encoded
    pub fn compute_digest(&self) -> EmitResult<Hash> {
        Ok(Hash::of_json(&self.content())?)
    }

    /// Check the recorded digest against the content
    ///
    /// # Errors
    ///
    /// Returns [`EmitError::DigestMismatch`] if the plan was altered
    pub fn verify(&self) -> EmitResult<()> {
        let computed = self.compute_digest()?;
        if computed != self.digest {
            return Err(EmitError::DigestMismatch {
                recorded: self.digest,
                computed,
            });
        }
        Ok(())
    }

    /// Parse a plan and verify its digest
    ///
    /// # Errors
    ///
    /// Returns error if the JSON is malformed or the digest does not match
    pub fn from_json(json: &str) -> EmitResult<Self> {
        let plan: Self = serde_json::from_str(json)?;
        plan.verify()?;
        Ok(plan)
    }

    /// Every planned resource in provisioning order
    pub fn resources(&self) -> impl Iterator<Item = &PlannedResource> {
        self.phases.iter().flat_map(|p| p.resources.iter())
    }

    /// Find a planned resource and its phase index
    #[must_use]
    pub fn find(&self, id: &str) -> Option<(usize, &PlannedResource)> {
        self.phases.iter().find_map(|phase| {
            phase
                .resources
                .iter()
                .find(|r| r.id.as_str() == id)
                .map(|r| (phase.index, r))
        })
    }

    /// Statement for one principal
    #[must_use]
    pub fn policy_for(&self, principal: &str) -> Option<&PolicyStatement> {
        self.policies.iter().find(|s| s.principal_id.as_str() == principal)
    }
}

/// A plan together with the exact bytes it was emitted as
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmittedPlan {
    plan: Plan,
    bytes: Vec<u8>,
}

impl EmittedPlan {
    /// The plan
    #[must_use]
    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    /// Canonical encoding
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Plan digest
    #[must_use]
    pub fn digest(&self) -> Hash {
        self.plan.digest
    }

    /// Human-readable rendering. Not canonical; use [`Self::bytes`] for
    /// anything that gets compared or hashed.
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails
    pub fn to_json_pretty(&self) -> EmitResult<String> {
        Ok(serde_json::to_string_pretty(&self.plan)?)
    }

    /// Consume into the plan
    #[must_use]
    pub fn into_plan(self) -> Plan {
        self.plan
    }
}

/// Serializes a scheduled, policy-resolved graph
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanEmitter {
    max_id_len: usize,
}

impl PlanEmitter {
    /// Create an emitter enforcing the given id length limit
    #[must_use]
    pub fn new(max_id_len: usize) -> Self {
        Self { max_id_len }
    }

    /// Check an id can be used as an executor logical id
    ///
    /// # Errors
    ///
    /// Returns error if the id is too long or uses characters outside
    /// `[A-Za-z0-9]`
    pub fn check_id(&self, id: &ResourceId) -> EmitResult<()> {
        let len = id.as_str().chars().count();
        if len > self.max_id_len {
            return Err(EmitError::IdTooLong {
                id: id.clone(),
                len,
                max: self.max_id_len,
            });
        }
        if !id.as_str().chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(EmitError::IdNotRepresentable { id: id.clone() });
        }
        Ok(())
    }

    /// Emit the plan
    ///
    /// # Errors
    ///
    /// Returns error if an id cannot be represented or encoding fails
    pub fn emit(
        &self,
        graph: &DependencyGraph,
        schedule: &Schedule,
        policies: &PolicySet,
    ) -> EmitResult<EmittedPlan> {
        let phases = schedule
            .phases()
            .iter()
            .map(|phase| {
                let resources = phase
                    .resources
                    .iter()
                    .map(|id| {
                        self.check_id(id)?;
                        let descriptor = graph
                            .get_node(id.as_str())
                            .ok_or_else(|| EmitError::UnknownResource { id: id.clone() })?;
                        Ok(PlannedResource::from_descriptor(descriptor))
                    })
                    .collect::<EmitResult<Vec<_>>>()?;
                Ok(PlannedPhase {
                    index: phase.index,
                    resources,
                })
            })
            .collect::<EmitResult<Vec<_>>>()?;

        let statements = policies.statements();
        let digest = Hash::of_json(&PlanContent {
            format: PLAN_FORMAT,
            capabilities_version: policies.capabilities_version(),
            phases: &phases,
            policies: statements,
        })?;
        let plan = Plan {
            format: PLAN_FORMAT,
            capabilities_version: policies.capabilities_version(),
            phases,
            policies: statements.to_vec(),
            digest,
        };
        let bytes = serde_json::to_vec(&plan)?;

        tracing::debug!(
            digest = %plan.digest,
            bytes = bytes.len(),
            phases = plan.phases.len(),
            "plan encoded"
        );

        Ok(EmittedPlan { plan, bytes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keystone_core::Access;
    use keystone_graph::Scheduler;
    use keystone_policy::{ActionTemplate, CapabilityTable, KindCapabilities, PolicySynthesizer};
    use serde_json::json;

    fn fixture() -> (DependencyGraph, Schedule, PolicySet) {
        let table = CapabilityTable::new(Version::new(1, 2, 0)).with_kind(
            ResourceKind::KeyValueTable,
            KindCapabilities::new("tableArn")
                .with_action(ActionTemplate::read("dynamodb:GetItem"))
                .with_action(ActionTemplate::write("dynamodb:PutItem")),
        );
        let graph = DependencyGraph::build(vec![
            ResourceDescriptor::builder("Progress", ResourceKind::KeyValueTable)
                .attribute("billingMode", "PAY_PER_REQUEST")
                .build()
                .unwrap(),
            ResourceDescriptor::builder("Handler", ResourceKind::ComputeFunction)
                .attribute("runtime", "nodejs18.x")
                .attribute("environment", json!({ "STAGE": "prod" }))
                .reference_with("environment.TABLE_NAME", "Progress", "tableName", Access::ReadWrite)
                .build()
                .unwrap(),
        ])
        .unwrap();
        let schedule = Scheduler::new().schedule(&graph).unwrap();
        let policies = PolicySynthesizer::new(&table, [ResourceKind::ComputeFunction])
            .unwrap()
            .synthesize(&graph)
            .unwrap();
        (graph, schedule, policies)
    }

    #[test]
    fn test_emit_layout() {
        let (graph, schedule, policies) = fixture();
        let emitted = PlanEmitter::new(255).emit(&graph, &schedule, &policies).unwrap();
        let plan = emitted.plan();

        assert_eq!(plan.format, PLAN_FORMAT);
        assert_eq!(plan.capabilities_version, Version::new(1, 2, 0));
        assert_eq!(plan.phases.len(), 2);

        let (phase, handler) = plan.find("Handler").unwrap();
        assert_eq!(phase, 1);
        assert_eq!(
            handler.bindings,
            vec![Binding {
                path: "environment.TABLE_NAME".into(),
                target: ResourceId::new("Progress").unwrap(),
                output: "tableName".into(),
            }]
        );
        assert_eq!(
            plan.policy_for("Handler").unwrap().grant_on("Progress").unwrap().actions.len(),
            2,
            "read-write reference grants both actions"
        );
    }

    #[test]
    fn test_emit_is_byte_identical() {
        let (graph, schedule, policies) = fixture();
        let emitter = PlanEmitter::new(255);
        let first = emitter.emit(&graph, &schedule, &policies).unwrap();
        let second = emitter.emit(&graph, &schedule, &policies).unwrap();
        assert_eq!(first.bytes(), second.bytes());
        assert_eq!(first.digest(), second.digest());
    }

    #[test]
    fn test_bytes_parse_back_and_verify() {
        let (graph, schedule, policies) = fixture();
        let emitted = PlanEmitter::new(255).emit(&graph, &schedule, &policies).unwrap();
        let json = std::str::from_utf8(emitted.bytes()).unwrap();
        let plan = Plan::from_json(json).unwrap();
        assert_eq!(&plan, emitted.plan());

        let pretty = emitted.to_json_pretty().unwrap();
        assert_eq!(Plan::from_json(&pretty).unwrap(), plan);
    }

    #[test]
    fn test_tampered_plan_fails_verification() {
        let (graph, schedule, policies) = fixture();
        let mut plan = PlanEmitter::new(255)
            .emit(&graph, &schedule, &policies)
            .unwrap()
            .into_plan();
        plan.policies[0].grants[0].actions.insert("dynamodb:DeleteTable".into());

        let json = serde_json::to_string(&plan).unwrap();
        assert!(matches!(
            Plan::from_json(&json),
            Err(EmitError::DigestMismatch { .. })
        ));
    }

    #[test]
    fn test_id_too_long() {
        let (graph, schedule, policies) = fixture();
        let result = PlanEmitter::new(5).emit(&graph, &schedule, &policies);
        match result {
            Err(EmitError::IdTooLong { id, len, max }) => {
                assert_eq!(id.as_str(), "Progress");
                assert_eq!(len, 8);
                assert_eq!(max, 5);
            }
            other => panic!("expected IdTooLong, got {other:?}"),
        }
    }

    #[test]
    fn test_id_not_representable() {
        let graph = DependencyGraph::build(vec![
            ResourceDescriptor::builder("course-bucket", ResourceKind::ObjectStore)
                .build()
                .unwrap(),
        ])
        .unwrap();
        let schedule = Scheduler::new().schedule(&graph).unwrap();
        let policies = PolicySet::new(Version::new(1, 0, 0), Vec::new());
        let result = PlanEmitter::new(255).emit(&graph, &schedule, &policies);
        assert!(matches!(result, Err(EmitError::IdNotRepresentable { .. })));
    }

    #[test]
    fn test_attributes_encoded_in_key_order() {
        let (graph, schedule, policies) = fixture();
        let emitted = PlanEmitter::new(255).emit(&graph, &schedule, &policies).unwrap();
        let json = std::str::from_utf8(emitted.bytes()).unwrap();
        let env = json.find("\"environment\"").unwrap();
        let runtime = json.find("\"runtime\"").unwrap();
        assert!(env < runtime);
    }
}

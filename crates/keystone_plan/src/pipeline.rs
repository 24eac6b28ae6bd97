//! The planning pipeline.
//!
//! `Defined -> Validated -> Scheduled -> PolicyResolved -> Emitted`. Each stage
//! consumes the previous stage's value and nothing is mutated after
//! validation, so a re-plan is simply a fresh run over a new stack.

use crate::config::PlannerConfig;
use crate::emit::{EmittedPlan, PlanEmitter};
use crate::error::{PlanResult, Stage};
use crate::stack::StackDefinition;
use keystone_core::ResourceDescriptor;
use keystone_graph::{DependencyGraph, Schedule, Scheduler};
use keystone_policy::{CapabilityTable, PolicySet, PolicySynthesizer};

/// A stack that passed every stage short of emission
#[derive(Debug, Clone)]
pub struct ResolvedStack {
    /// Stack name
    pub name: String,
    /// Validated graph
    pub graph: DependencyGraph,
    /// Provisioning phases
    pub schedule: Schedule,
    /// Audited policy statements
    pub policies: PolicySet,
}

/// Runs stacks through the pipeline
#[derive(Debug, Clone)]
pub struct Planner {
    config: PlannerConfig,
    capabilities: CapabilityTable,
}

impl Planner {
    /// Create a planner
    ///
    /// # Errors
    ///
    /// Returns error if the capability table is invalid
    pub fn new(config: PlannerConfig, capabilities: CapabilityTable) -> PlanResult<Self> {
        capabilities.validate()?;
        Ok(Self {
            config,
            capabilities,
        })
    }

    /// Planner configuration
    #[must_use]
    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Capability table in use
    #[must_use]
    pub fn capabilities(&self) -> &CapabilityTable {
        &self.capabilities
    }

    /// Validate, schedule and synthesize policies without emitting
    ///
    /// # Errors
    ///
    /// Returns the first failure; [`crate::PlanError::stage`] tells which stage
    pub fn resolve(&self, stack: StackDefinition) -> PlanResult<ResolvedStack> {
        let name = stack.name.clone();
        tracing::info!(stack = %name, resources = stack.len(), stage = %Stage::Defined, "planning");

        let graph = DependencyGraph::build(stack.into_descriptors())?;
        tracing::info!(
            stack = %name,
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            stage = %Stage::Validated,
            "graph validated"
        );

        let schedule = Scheduler::new().schedule(&graph)?;
        tracing::info!(
            stack = %name,
            phases = schedule.len(),
            width = schedule.width(),
            stage = %Stage::Scheduled,
            "phases assigned"
        );

        let policies = PolicySynthesizer::new(&self.capabilities, self.config.principal_kinds.iter().copied())?
            .synthesize(&graph)?;
        tracing::info!(
            stack = %name,
            statements = policies.len(),
            capabilities = %policies.capabilities_version(),
            stage = %Stage::PolicyResolved,
            "policies resolved"
        );

        Ok(ResolvedStack {
            name,
            graph,
            schedule,
            policies,
        })
    }

    /// Run the whole pipeline
    ///
    /// # Errors
    ///
    /// Returns the first failure; [`crate::PlanError::stage`] tells which stage
    pub fn plan(&self, stack: StackDefinition) -> PlanResult<EmittedPlan> {
        let resolved = self.resolve(stack)?;
        let emitted = PlanEmitter::new(self.config.max_id_len).emit(
            &resolved.graph,
            &resolved.schedule,
            &resolved.policies,
        )?;
        tracing::info!(
            stack = %resolved.name,
            digest = %emitted.digest().short(),
            stage = %Stage::Emitted,
            "plan emitted"
        );
        Ok(emitted)
    }

    /// Substitute one descriptor (or add it) and plan again from scratch
    ///
    /// # Errors
    ///
    /// Same as [`Self::plan`]
    pub fn replan(
        &self,
        mut stack: StackDefinition,
        replacement: ResourceDescriptor,
    ) -> PlanResult<EmittedPlan> {
        let id = replacement.id().clone();
        let replaced = stack.replace(replacement).is_some();
        tracing::debug!(stack = %stack.name, resource = %id, replaced, "re-planning");
        self.plan(stack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::PlanDiff;
    use crate::emit::Plan;
    use crate::error::{EmitError, PlanError};
    use keystone_core::{Access, ResourceKind, Version};
    use keystone_graph::GraphError;
    use keystone_policy::{ActionTemplate, KindCapabilities, PolicyError};
    use proptest::prelude::*;
    use serde_json::json;

    fn table() -> CapabilityTable {
        CapabilityTable::new(Version::new(1, 0, 0))
            .with_kind(ResourceKind::Network, KindCapabilities::new("vpcArn"))
            .with_kind(
                ResourceKind::RelationalDatabase,
                KindCapabilities::new("instanceArn").with_action(ActionTemplate::read("rds-db:connect")),
            )
            .with_kind(
                ResourceKind::KeyValueTable,
                KindCapabilities::new("tableArn")
                    .with_action(ActionTemplate::read("dynamodb:GetItem"))
                    .with_action(ActionTemplate::read("dynamodb:Query"))
                    .with_action(ActionTemplate::write("dynamodb:PutItem"))
                    .with_action(ActionTemplate::write("dynamodb:UpdateItem")),
            )
            .with_kind(
                ResourceKind::ObjectStore,
                KindCapabilities::new("bucketArn")
                    .with_action(ActionTemplate::read("s3:GetObject"))
                    .with_action(ActionTemplate::write("s3:PutObject")),
            )
            .with_kind(
                ResourceKind::IdentityPool,
                KindCapabilities::new("userPoolArn").with_action(ActionTemplate::read("cognito-idp:GetUser")),
            )
            .with_kind(
                ResourceKind::ComputeFunction,
                KindCapabilities::new("functionArn").with_action(ActionTemplate::read("lambda:InvokeFunction")),
            )
    }

    fn planner() -> Planner {
        Planner::new(PlannerConfig::default(), table()).unwrap()
    }

    fn function(refs: &[(&str, &str, &str, Access)]) -> ResourceDescriptor {
        refs.iter()
            .fold(
                ResourceDescriptor::builder("F", ResourceKind::ComputeFunction).attribute("runtime", "nodejs18.x"),
                |b, (path, target, output, access)| b.reference_with(*path, *target, *output, *access),
            )
            .build()
            .unwrap()
    }

    fn lms() -> StackDefinition {
        StackDefinition::new("lms")
            .with_resource(
                ResourceDescriptor::builder("N", ResourceKind::Network)
                    .attribute("maxAzs", 2)
                    .build()
                    .unwrap(),
            )
            .with_resource(
                ResourceDescriptor::builder("D", ResourceKind::RelationalDatabase)
                    .attribute("engine", json!({ "postgres": "14" }))
                    .reference("vpc", "N", "vpcId")
                    .build()
                    .unwrap(),
            )
            .with_resource(
                ResourceDescriptor::builder("T", ResourceKind::KeyValueTable)
                    .attribute("billingMode", "PAY_PER_REQUEST")
                    .build()
                    .unwrap(),
            )
            .with_resource(ResourceDescriptor::builder("Bk", ResourceKind::ObjectStore).build().unwrap())
            .with_resource(ResourceDescriptor::builder("I", ResourceKind::IdentityPool).build().unwrap())
            .with_resource(function(&[
                ("environment.TABLE_NAME", "T", "tableName", Access::ReadWrite),
                ("environment.BUCKET_NAME", "Bk", "bucketName", Access::ReadWrite),
                ("environment.DB_HOST", "D", "endpoint", Access::Read),
            ]))
            .with_resource(
                ResourceDescriptor::builder("Api", ResourceKind::ApiFront)
                    .attribute("proxy", true)
                    .reference("handler", "F", "functionArn")
                    .build()
                    .unwrap(),
            )
    }

    fn phase_ids(plan: &Plan) -> Vec<Vec<&str>> {
        plan.phases
            .iter()
            .map(|p| p.resources.iter().map(|r| r.id.as_str()).collect())
            .collect()
    }

    #[test]
    fn test_lms_scenario() {
        let emitted = planner().plan(lms()).unwrap();
        let plan = emitted.plan();

        assert_eq!(
            phase_ids(plan),
            vec![vec!["Bk", "I", "N", "T"], vec!["D"], vec!["F"], vec!["Api"]]
        );

        assert_eq!(plan.policies.len(), 1);
        let statement = plan.policy_for("F").unwrap();
        let scoped: Vec<String> = statement.grants.iter().map(|g| g.resource.to_string()).collect();
        assert_eq!(
            scoped,
            vec!["${Bk.bucketArn}", "${D.instanceArn}", "${T.tableArn}"]
        );
        assert!(statement.allows("dynamodb:PutItem", "T"));
        assert!(statement.allows("s3:PutObject", "Bk"));
        assert!(statement.allows("rds-db:connect", "D"));
        assert!(!statement.allows("rds-db:connect", "T"));
        assert!(!statement.actions().contains("cognito-idp:GetUser"));
    }

    #[test]
    fn test_replan_is_byte_identical() {
        let planner = planner();
        let first = planner.plan(lms()).unwrap();
        let second = planner.plan(lms()).unwrap();
        assert_eq!(first.bytes(), second.bytes());
    }

    #[test]
    fn test_declaration_order_does_not_matter() {
        let planner = planner();
        let mut reversed = lms();
        reversed.resources.reverse();
        assert_eq!(
            planner.plan(lms()).unwrap().bytes(),
            planner.plan(reversed).unwrap().bytes()
        );
    }

    #[test]
    fn test_cycle_scenario() {
        let stack = StackDefinition::new("cycle")
            .with_resource(
                ResourceDescriptor::builder("A", ResourceKind::ComputeFunction)
                    .reference("peer", "B", "functionArn")
                    .build()
                    .unwrap(),
            )
            .with_resource(
                ResourceDescriptor::builder("B", ResourceKind::ComputeFunction)
                    .reference("peer", "A", "functionArn")
                    .build()
                    .unwrap(),
            );
        let err = planner().plan(stack).unwrap_err();
        assert_eq!(err.stage(), Stage::Scheduled);
        let ids: Vec<&str> = err.resource_ids().into_iter().map(|id| id.as_str()).collect();
        assert_eq!(ids, vec!["A", "B"]);
    }

    #[test]
    fn test_dangling_scenario() {
        let stack = StackDefinition::new("dangling").with_resource(
            ResourceDescriptor::builder("A", ResourceKind::ComputeFunction)
                .reference("environment.TABLE", "Z", "tableName")
                .build()
                .unwrap(),
        );
        let err = planner().plan(stack).unwrap_err();
        assert_eq!(err.stage(), Stage::Validated);
        match err {
            PlanError::Graph(GraphError::DanglingReference {
                source_id,
                target_id,
                ..
            }) => {
                assert_eq!(source_id.as_str(), "A");
                assert_eq!(target_id.as_str(), "Z");
            }
            other => panic!("expected dangling reference, got {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_scenario() {
        let stack = StackDefinition::new("dup")
            .with_resource(ResourceDescriptor::builder("T", ResourceKind::KeyValueTable).build().unwrap())
            .with_resource(ResourceDescriptor::builder("T", ResourceKind::ObjectStore).build().unwrap());
        let err = planner().plan(stack).unwrap_err();
        assert!(matches!(err, PlanError::Graph(GraphError::DuplicateId { .. })));
        assert_eq!(err.stage(), Stage::Validated);
    }

    #[test]
    fn test_uncovered_kind_is_policy_stage() {
        let table = CapabilityTable::new(Version::new(1, 0, 0));
        let planner = Planner::new(PlannerConfig::default(), table).unwrap();
        let err = planner.plan(lms()).unwrap_err();
        assert!(matches!(err, PlanError::Policy(PolicyError::UncoveredKind { .. })));
        assert_eq!(err.stage(), Stage::PolicyResolved);
    }

    #[test]
    fn test_id_limit_is_emit_stage() {
        let planner = Planner::new(PlannerConfig::default().with_max_id_len(2), table()).unwrap();
        let err = planner.plan(lms()).unwrap_err();
        assert!(matches!(err, PlanError::Emit(EmitError::IdTooLong { .. })));
        assert_eq!(err.stage(), Stage::Emitted);
    }

    #[test]
    fn test_api_front_as_principal() {
        let config = PlannerConfig::default().with_principal(ResourceKind::ApiFront);
        let planner = Planner::new(config, table()).unwrap();
        let plan = planner.plan(lms()).unwrap().into_plan();
        let api = plan.policy_for("Api").unwrap();
        assert_eq!(api.actions().into_iter().collect::<Vec<_>>(), vec!["lambda:InvokeFunction"]);
        assert!(api.allows("lambda:InvokeFunction", "F"));
    }

    #[test]
    fn test_replan_replaces_descriptor() {
        let planner = planner();
        let before = planner.plan(lms()).unwrap().into_plan();

        // F no longer writes to the bucket and reads the user pool instead
        let narrowed = function(&[
            ("environment.TABLE_NAME", "T", "tableName", Access::ReadWrite),
            ("environment.BUCKET_NAME", "Bk", "bucketName", Access::Read),
            ("environment.DB_HOST", "D", "endpoint", Access::Read),
            ("environment.POOL_ID", "I", "userPoolId", Access::Read),
        ]);
        let after = planner.replan(lms(), narrowed).unwrap().into_plan();

        let diff = PlanDiff::compute(&before, &after);
        assert!(diff.added.is_empty() && diff.removed.is_empty());
        assert_eq!(diff.changed.len(), 1);
        assert_eq!(diff.changed[0].id.as_str(), "F");
        assert_eq!(
            diff.changed[0].bindings.iter().map(String::as_str).collect::<Vec<_>>(),
            vec!["environment.POOL_ID"]
        );

        assert_eq!(diff.grants.len(), 1);
        let grants = &diff.grants[0];
        let scoped: Vec<&str> = grants.resources.iter().map(|r| r.resource.resource.as_str()).collect();
        assert_eq!(scoped, vec!["Bk", "I"]);
        let bucket = grants.on("Bk").unwrap();
        assert!(bucket.revoked.contains("s3:PutObject") && bucket.granted.is_empty());
        let pool = grants.on("I").unwrap();
        assert!(pool.granted.contains("cognito-idp:GetUser") && pool.revoked.is_empty());
        assert!(diff.to_string().contains("    on ${Bk.bucketArn}\n        - s3:PutObject\n"));
    }

    #[test]
    fn test_replan_adds_new_descriptor() {
        let planner = planner();
        let before = planner.plan(lms()).unwrap().into_plan();
        let worker = ResourceDescriptor::builder("W", ResourceKind::ComputeFunction)
            .reference("environment.TABLE", "T", "tableName")
            .build()
            .unwrap();
        let after = planner.replan(lms(), worker).unwrap().into_plan();

        let diff = PlanDiff::compute(&before, &after);
        assert_eq!(diff.added.len(), 1);
        assert_eq!(diff.added[0].id.as_str(), "W");
        assert_eq!(diff.added[0].phase, 1);
        assert_eq!(diff.summary().grant_change_count, 1);
        assert!(!diff.to_string().contains("equivalent"));
    }

    #[test]
    fn test_diff_of_identical_plans_is_empty() {
        let plan = planner().plan(lms()).unwrap().into_plan();
        let diff = PlanDiff::compute(&plan, &plan);
        assert!(diff.is_empty());
        assert_eq!(diff.to_string(), "plans are equivalent\n");
    }

    #[test]
    fn test_diff_reports_moves() {
        let planner = planner();
        let before = planner.plan(lms()).unwrap().into_plan();
        // T now waits for the network, which moves it to phase 1
        let table = ResourceDescriptor::builder("T", ResourceKind::KeyValueTable)
            .attribute("billingMode", "PAY_PER_REQUEST")
            .reference("vpc", "N", "vpcId")
            .build()
            .unwrap();
        let after = planner.replan(lms(), table).unwrap().into_plan();

        let diff = PlanDiff::compute(&before, &after);
        let moved = diff.changed.iter().find(|c| c.id.as_str() == "T").unwrap();
        assert_eq!((moved.before_phase, moved.after_phase), (0, 1));
        assert!(!moved.is_move_only());
        assert!(diff.grants.is_empty());
    }

    proptest! {
        #[test]
        fn prop_policy_scoped_to_references(
            picks in prop::collection::vec((any::<bool>(), any::<bool>()), 4),
        ) {
            let targets = [("D", "endpoint"), ("T", "tableName"), ("Bk", "bucketName"), ("I", "userPoolId")];
            let refs: Vec<(String, &str, &str, Access)> = targets
                .iter()
                .zip(&picks)
                .filter(|(_, (pick, _))| *pick)
                .map(|((target, output), (_, write))| {
                    let access = if *write { Access::ReadWrite } else { Access::Read };
                    (format!("environment.{target}"), *target, *output, access)
                })
                .collect();
            let borrowed: Vec<(&str, &str, &str, Access)> =
                refs.iter().map(|(p, t, o, a)| (p.as_str(), *t, *o, *a)).collect();

            let mut stack = lms();
            stack.replace(function(&borrowed));
            let plan = planner().plan(stack).unwrap().into_plan();

            let expected: Vec<&str> = {
                let mut ids: Vec<&str> = borrowed.iter().map(|(_, t, _, _)| *t).collect();
                ids.sort_unstable();
                ids
            };
            match plan.policy_for("F") {
                Some(statement) => {
                    let scoped: Vec<&str> = statement.scoped_ids().map(|id| id.as_str()).collect();
                    prop_assert_eq!(scoped, expected);
                    for (_, target, _, access) in &borrowed {
                        let grant = statement.grant_on(target).unwrap();
                        let has_write = grant.actions.iter().any(|a| a.ends_with("PutObject") || a.ends_with("PutItem"));
                        prop_assert!(!has_write || *access == Access::ReadWrite);
                    }
                }
                None => prop_assert!(expected.is_empty()),
            }
        }
    }
}

//! Subcommand implementations.

use color_eyre::Result;
use color_eyre::eyre::{WrapErr, eyre};
use console::style;
use keystone_graph::Schedule;
use keystone_plan::{Plan, PlanDiff, PlanError, Planner, PlannerConfig, StackDefinition};
use keystone_policy::{CapabilityTable, PolicySet};
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

fn read(path: &Path) -> Result<String> {
    fs::read_to_string(path).wrap_err_with(|| format!("failed to read {}", path.display()))
}

/// Attach the failing stage to a pipeline error
fn staged(err: PlanError) -> color_eyre::Report {
    let stage = err.stage();
    color_eyre::Report::new(err).wrap_err(format!("planning failed at the {stage} stage"))
}

/// Build a planner from a capability table and an optional config file
pub fn load_planner(capabilities: &Path, config: Option<&Path>) -> Result<Planner> {
    let table = CapabilityTable::from_json(&read(capabilities)?)
        .wrap_err_with(|| format!("invalid capability table {}", capabilities.display()))?;
    let config = match config {
        Some(path) => PlannerConfig::from_json(&read(path)?)
            .wrap_err_with(|| format!("invalid planner config {}", path.display()))?,
        None => PlannerConfig::default(),
    };
    tracing::debug!(
        capabilities = %table.version,
        max_id_len = config.max_id_len,
        principals = config.principal_kinds.len(),
        "planner configured"
    );
    Ok(Planner::new(config, table)?)
}

/// Read a stack definition
pub fn load_stack(path: &Path) -> Result<StackDefinition> {
    StackDefinition::from_json(&read(path)?)
        .wrap_err_with(|| format!("invalid stack definition {}", path.display()))
}

/// Read and verify an emitted plan
pub fn load_plan(path: &Path) -> Result<Plan> {
    Plan::from_json(&read(path)?).wrap_err_with(|| format!("invalid plan {}", path.display()))
}

/// Emit the plan, to `output` when given, else return it for stdout
pub fn plan(planner: &Planner, stack: StackDefinition, output: Option<&Path>) -> Result<Option<String>> {
    let emitted = planner.plan(stack).map_err(staged)?;
    match output {
        Some(path) => {
            fs::write(path, emitted.bytes())
                .wrap_err_with(|| format!("failed to write {}", path.display()))?;
            tracing::info!(path = %path.display(), digest = %emitted.digest().short(), "plan written");
            Ok(None)
        }
        None => {
            let json = String::from_utf8(emitted.bytes().to_vec())
                .map_err(|e| eyre!("plan is not UTF-8: {e}"))?;
            Ok(Some(json))
        }
    }
}

/// Validate, schedule and audit a stack, rendering the outcome
pub fn check(planner: &Planner, stack: StackDefinition) -> Result<String> {
    let resolved = planner.resolve(stack).map_err(staged)?;
    let mut out = String::new();
    writeln!(
        out,
        "{} {} ({} resources, {} references)",
        style("ok").green().bold(),
        resolved.name,
        resolved.graph.node_count(),
        resolved.graph.edge_count()
    )?;
    render_phases(&mut out, &resolved.schedule)?;
    render_policies(&mut out, &resolved.policies)?;
    Ok(out)
}

fn render_phases(out: &mut String, schedule: &Schedule) -> std::fmt::Result {
    for phase in schedule.phases() {
        let ids: Vec<&str> = phase.resources.iter().map(|id| id.as_str()).collect();
        writeln!(out, "{} {}", style(format!("phase {}:", phase.index)).cyan(), ids.join(", "))?;
    }
    Ok(())
}

fn render_policies(out: &mut String, policies: &PolicySet) -> std::fmt::Result {
    writeln!(
        out,
        "{} (capabilities {})",
        style("policies").bold(),
        policies.capabilities_version()
    )?;
    if policies.is_empty() {
        writeln!(out, "  none")?;
    }
    for statement in policies.statements() {
        writeln!(out, "  {}", style(&statement.principal_id).yellow())?;
        for grant in &statement.grants {
            writeln!(out, "    on {}", grant.resource)?;
            for action in &grant.actions {
                writeln!(out, "      allow {action}")?;
            }
        }
    }
    Ok(())
}

/// Compare two emitted plans
pub fn diff(left: &Path, right: &Path) -> Result<String> {
    let before = load_plan(left)?;
    let after = load_plan(right)?;
    let diff = PlanDiff::compute(&before, &after);
    let summary = diff.summary();
    tracing::debug!(
        added = summary.added_count,
        removed = summary.removed_count,
        moved = summary.moved_count,
        modified = summary.modified_count,
        grants = summary.grant_change_count,
        "plans compared"
    );
    Ok(diff.to_string())
}

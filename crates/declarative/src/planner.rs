//! Planner - diffs desired vs. probed state into an ordered action list

use crate::error::ConfigError;
use crate::model::topological_order;
use crate::types::{Action, Ensure, Operation, ProbeResult, Resource};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Build the dependency-ordered list of remediation actions
///
/// Resources are visited in topological order (declaration order breaks
/// ties) and contribute one action each when their probe does not match
/// the desired state. A resource without a probe result is treated as
/// absent. The output is deterministic for the same inputs.
pub fn plan(resources: &[Resource], probes: &[ProbeResult]) -> Result<Vec<Action>, ConfigError> {
    let order = topological_order(resources)?;
    let by_id: HashMap<&str, &ProbeResult> = probes
        .iter()
        .map(|p| (p.resource_id.as_str(), p))
        .collect();

    let mut actions = Vec::new();
    for i in order {
        let resource = &resources[i];
        let (present, matches) = by_id
            .get(resource.id.as_str())
            .map_or((false, false), |p| (p.present, p.matches_desired));

        if matches {
            continue;
        }

        actions.push(Action {
            resource_id: resource.id.clone(),
            operation: operation_for(resource, present),
            ordinal: actions.len(),
        });
    }

    log::debug!(
        "planned {} action(s) for {} resource(s)",
        actions.len(),
        resources.len()
    );
    Ok(actions)
}

fn operation_for(resource: &Resource, present: bool) -> Operation {
    match (resource.desired.ensure, present) {
        (Ensure::Absent, _) => Operation::Remove,
        (Ensure::Present, false) => Operation::Install,
        (Ensure::Present, true) => Operation::Modify,
    }
}

/// Plan summary statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSummary {
    pub installs: usize,
    pub modifies: usize,
    pub removes: usize,
}

impl PlanSummary {
    pub fn from_actions(actions: &[Action]) -> Self {
        let mut summary = Self::default();
        for action in actions {
            match action.operation {
                Operation::Install => summary.installs += 1,
                Operation::Modify => summary.modifies += 1,
                Operation::Remove => summary.removes += 1,
            }
        }
        summary
    }

    pub fn total(&self) -> usize {
        self.installs + self.modifies + self.removes
    }

    pub fn has_changes(&self) -> bool {
        self.total() > 0
    }
}

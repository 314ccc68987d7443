//! Plan summary counting from the tool's machine-readable plan output.
//!
//! Mirrors the tool's own presentation rules: no-op and read-only entries
//! are filtered out, and a [delete, create] action pair is one replace.

use serde::{Deserialize, Serialize};

use crate::error::EngineResult;

/// One entry of `resource_changes`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceChange {
    pub address: String,
    #[serde(rename = "type", default)]
    pub resource_type: String,
    pub change: ChangeActions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeActions {
    #[serde(default)]
    pub actions: Vec<String>,
}

impl ResourceChange {
    /// True when the planned actions are exactly [delete, create]: the
    /// tool's encoding of a destroy-then-create replacement.
    pub fn is_replace(&self) -> bool {
        self.change.actions.len() == 2
            && self.change.actions[0] == "delete"
            && self.change.actions[1] == "create"
    }
}

#[derive(Debug, Clone, Deserialize)]
struct WirePlan {
    #[serde(default)]
    terraform_version: String,
    #[serde(default)]
    resource_changes: Vec<ResourceChange>,
}

/// Counts over the filtered changes. A replace increments create, delete
/// and replace by one each, and total by one.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct PlanCounts {
    pub total: u32,
    pub create: u32,
    pub update: u32,
    pub delete: u32,
    pub replace: u32,
}

/// The plan reduced to actual changes plus its summary, serializable for
/// the saved changes artifact.
#[derive(Debug, Clone, Serialize)]
pub struct PlanSummary {
    pub terraform_version: String,
    pub resource_changes: Vec<ResourceChange>,
    pub summary: PlanCounts,
}

/// Parse `show -json` output and summarize the actual changes.
pub fn summarize_plan(json: &str) -> EngineResult<PlanSummary> {
    let plan: WirePlan = serde_json::from_str(json)?;
    let mut counts = PlanCounts::default();
    let mut changes = Vec::new();

    for change in plan.resource_changes {
        let first = match change.change.actions.first() {
            Some(action) => action.as_str(),
            None => continue,
        };
        if first == "no-op" || first == "read" {
            continue;
        }

        if change.is_replace() {
            counts.replace += 1;
            counts.delete += 1;
            counts.create += 1;
        } else {
            match first {
                "create" => counts.create += 1,
                "update" => counts.update += 1,
                "delete" => counts.delete += 1,
                _ => {}
            }
        }
        changes.push(change);
    }
    counts.total = changes.len() as u32;

    Ok(PlanSummary {
        terraform_version: plan.terraform_version,
        resource_changes: changes,
        summary: counts,
    })
}

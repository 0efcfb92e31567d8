//! Migration planning: turn explicit activity instructions plus identity
//! fallback into a full mapping from source activities to target
//! activities, and validate that mapping against a live execution tree.

use crate::migration::{MigrationError, MigrationValidationError};
use crate::types::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use uuid::Uuid;

/// Explicit mapping of one source plan item onto a target plan item.
/// Activities not covered by an instruction map by identical id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MigrationInstruction {
    pub source_activity: ActivityId,
    pub target_activity: ActivityId,
}

impl MigrationInstruction {
    pub fn new(source: &str, target: &str) -> Self {
        Self {
            source_activity: source.to_string(),
            target_activity: target.to_string(),
        }
    }
}

/// A validated mapping between two definition versions.
///
/// `mapping` covers every source activity that survives the migration,
/// including the case plan model itself. `additions` lists target plan
/// items with no source counterpart; the executor instantiates them as
/// Available.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationPlan {
    pub source_definition_id: Uuid,
    pub target_definition_id: Uuid,
    pub mapping: BTreeMap<ActivityId, ActivityId>,
    pub additions: Vec<ActivityId>,
}

/// Build a migration plan from two definitions and explicit instructions.
///
/// Rules checked here (model-level):
///  - M1: both definitions share the same case key
///  - M2: source and target are different definitions
///  - M3: each instruction source exists in the source definition
///  - M4: each instruction target exists in the target definition
///  - M5: mapped plan items have the same kind on both sides
///  - M6: no source activity is mapped twice
pub fn plan_migration(
    source: &CaseDefinition,
    target: &CaseDefinition,
    instructions: &[MigrationInstruction],
) -> Result<MigrationPlan, MigrationError> {
    let mut errors = Vec::new();

    if source.key != target.key {
        errors.push(MigrationValidationError::new(
            "M1",
            format!(
                "Source case key '{}' differs from target case key '{}'",
                source.key, target.key
            ),
        ));
    }
    if source.definition_id == target.definition_id {
        errors.push(MigrationValidationError::new(
            "M2",
            "Source and target are the same definition",
        ));
    }

    let mut seen_sources: HashSet<&str> = HashSet::new();
    for instruction in instructions {
        if source.plan_item(&instruction.source_activity).is_none() {
            errors.push(MigrationValidationError::new(
                "M3",
                format!(
                    "Instruction source '{}' is not a plan item of the source definition",
                    instruction.source_activity
                ),
            ));
        }
        if target.plan_item(&instruction.target_activity).is_none() {
            errors.push(MigrationValidationError::new(
                "M4",
                format!(
                    "Instruction target '{}' is not a plan item of the target definition",
                    instruction.target_activity
                ),
            ));
        }
        if !seen_sources.insert(instruction.source_activity.as_str()) {
            errors.push(MigrationValidationError::new(
                "M6",
                format!(
                    "Source activity '{}' is mapped more than once",
                    instruction.source_activity
                ),
            ));
        }
    }

    let mut mapping: BTreeMap<ActivityId, ActivityId> = BTreeMap::new();
    mapping.insert(source.plan_model_id.clone(), target.plan_model_id.clone());
    for instruction in instructions {
        mapping.insert(
            instruction.source_activity.clone(),
            instruction.target_activity.clone(),
        );
    }
    // Identity fallback for items present in both versions
    for item in &source.plan_items {
        if !mapping.contains_key(&item.id) && target.plan_item(&item.id).is_some() {
            mapping.insert(item.id.clone(), item.id.clone());
        }
    }

    // M5 over the full mapping, identity pairs included
    for (from, to) in &mapping {
        let (Some(src_item), Some(tgt_item)) = (source.plan_item(from), target.plan_item(to))
        else {
            continue;
        };
        if src_item.kind != tgt_item.kind {
            errors.push(MigrationValidationError::new(
                "M5",
                format!(
                    "Cannot map {:?} '{}' onto {:?} '{}'",
                    src_item.kind, from, tgt_item.kind, to
                ),
            ));
        }
    }

    if !errors.is_empty() {
        return Err(MigrationError::Rejected(errors));
    }

    let mapped_targets: HashSet<&str> = mapping.values().map(|v| v.as_str()).collect();
    let additions = target
        .plan_items
        .iter()
        .filter(|i| !mapped_targets.contains(i.id.as_str()))
        .map(|i| i.id.clone())
        .collect();

    Ok(MigrationPlan {
        source_definition_id: source.definition_id,
        target_definition_id: target.definition_id,
        mapping,
        additions,
    })
}

/// Validate a plan against a live execution tree (instance-level rules):
///  - M7: every non-terminal plan item execution is covered by the mapping
///  - M8: the root execution rebinds to the target case plan model
///  - M9: sentries referenced by unsatisfied sentry parts exist in the
///        target definition
///
/// Terminal executions with no mapping keep their activity id; history is
/// preserved even when the item was removed from the new version.
pub fn validate_executions(
    plan: &MigrationPlan,
    target: &CaseDefinition,
    executions: &[PlanItemExecution],
    sentry_parts: &[SentryPart],
) -> Vec<MigrationValidationError> {
    let mut errors = Vec::new();

    for execution in executions {
        if execution.parent.is_none() {
            if plan.mapping.get(&execution.activity_id) != Some(&target.plan_model_id) {
                errors.push(MigrationValidationError::new(
                    "M8",
                    format!(
                        "Root execution '{}' does not map to the target case plan model '{}'",
                        execution.activity_id, target.plan_model_id
                    ),
                ));
            }
            continue;
        }
        if !execution.state.is_terminal() && !plan.mapping.contains_key(&execution.activity_id) {
            errors.push(MigrationValidationError::new(
                "M7",
                format!(
                    "Plan item '{}' has a {:?} execution but no mapping in the target",
                    execution.activity_id, execution.state
                ),
            ));
        }
    }

    for part in sentry_parts.iter().filter(|p| !p.satisfied) {
        if target.sentry(&part.sentry_id).is_none() {
            errors.push(MigrationValidationError::new(
                "M9",
                format!(
                    "Unsatisfied sentry part references sentry '{}' missing from the target",
                    part.sentry_id
                ),
            ));
        }
    }

    errors
}

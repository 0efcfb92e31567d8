//! Migration executor: turns a validated plan into a single atomic store
//! patch — retarget every execution and task to the new definition,
//! instantiate added plan items as Available, and arm their sentry parts
//! unsatisfied.

use crate::events::CaseEvent;
use crate::migration::{validate_executions, MigrationError, MigrationPlan};
use crate::sentry;
use crate::store::{CaseStore, MigrationPatch};
use crate::types::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// What a migration changed, for callers and the event log.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct MigrationReport {
    pub retargeted_executions: usize,
    pub retargeted_tasks: usize,
    pub added_executions: usize,
    pub added_sentry_parts: usize,
}

pub struct MigrationExecutor {
    store: Arc<dyn CaseStore>,
}

impl MigrationExecutor {
    pub fn new(store: Arc<dyn CaseStore>) -> Self {
        Self { store }
    }

    /// Apply `plan` to a live instance. Validates the plan against the
    /// instance's execution tree first; a rejected plan leaves the instance
    /// untouched.
    pub async fn execute(
        &self,
        instance: &CaseInstance,
        plan: &MigrationPlan,
        target: &CaseDefinition,
    ) -> Result<MigrationReport, MigrationError> {
        let executions = self.store.load_executions(instance.instance_id).await?;
        let tasks = self.store.load_tasks(instance.instance_id).await?;
        let parts = self.store.load_sentry_parts(instance.instance_id).await?;

        let errors = validate_executions(plan, target, &executions, &parts);
        if !errors.is_empty() {
            return Err(MigrationError::Rejected(errors));
        }

        // Retarget the whole tree. Terminal executions of removed items keep
        // their activity id so history survives the version change.
        let execution_retargets: Vec<(Uuid, ActivityId)> = executions
            .iter()
            .map(|e| {
                let activity = plan
                    .mapping
                    .get(&e.activity_id)
                    .cloned()
                    .unwrap_or_else(|| e.activity_id.clone());
                (e.execution_id, activity)
            })
            .collect();
        let task_retargets: Vec<(Uuid, ActivityId)> = tasks
            .iter()
            .map(|t| {
                let activity = plan
                    .mapping
                    .get(&t.activity_id)
                    .cloned()
                    .unwrap_or_else(|| t.activity_id.clone());
                (t.task_id, activity)
            })
            .collect();
        // Armed on-parts must follow their source across a rename, else the
        // sentry can never fire on the migrated instance.
        let sentry_part_retargets: Vec<(Uuid, ActivityId)> = parts
            .iter()
            .filter(|p| !p.satisfied)
            .filter_map(|p| {
                let source = p.source.as_deref()?;
                let mapped = plan.mapping.get(source)?;
                (mapped != source).then(|| (p.part_id, mapped.clone()))
            })
            .collect();

        // Instantiate additions. Items inside a stage only materialize when
        // their stage is already active; otherwise the stage instantiates
        // them itself on activation.
        let root = executions
            .iter()
            .find(|e| e.parent.is_none())
            .ok_or_else(|| anyhow::anyhow!("Instance has no root execution: {}", instance.instance_id))?;
        let mut new_executions = Vec::new();
        let mut new_sentry_parts = Vec::new();
        for activity_id in &plan.additions {
            let Some(item) = target.plan_item(activity_id) else {
                continue;
            };
            let scope = match &item.parent {
                None => Some(root.execution_id),
                Some(parent_id) => executions
                    .iter()
                    .find(|e| {
                        e.state == PlanItemState::Active
                            && plan
                                .mapping
                                .get(&e.activity_id)
                                .is_some_and(|mapped| mapped == parent_id)
                    })
                    .map(|e| e.execution_id),
            };
            let Some(scope) = scope else {
                debug!(activity = %activity_id, "added item deferred to stage activation");
                continue;
            };
            let execution = PlanItemExecution {
                execution_id: Uuid::now_v7(),
                instance_id: instance.instance_id,
                parent: Some(scope),
                definition_id: plan.target_definition_id,
                activity_id: item.id.clone(),
                state: PlanItemState::Available,
                prev_state: PlanItemState::Available,
                required: item.required,
            };
            new_sentry_parts.extend(sentry::arm_sentry_parts(
                target,
                item,
                instance.instance_id,
                scope,
            ));
            new_executions.push(execution);
        }

        let report = MigrationReport {
            retargeted_executions: execution_retargets.len(),
            retargeted_tasks: task_retargets.len(),
            added_executions: new_executions.len(),
            added_sentry_parts: new_sentry_parts.len(),
        };
        let patch = MigrationPatch {
            instance_id: instance.instance_id,
            target_definition_id: plan.target_definition_id,
            execution_retargets,
            task_retargets,
            sentry_part_retargets,
            new_executions,
            new_sentry_parts,
        };
        self.store.apply_migration(&patch).await?;
        self.store
            .append_event(
                instance.instance_id,
                &CaseEvent::MigrationApplied {
                    from_definition: plan.source_definition_id,
                    to_definition: plan.target_definition_id,
                    retargeted_executions: report.retargeted_executions,
                    retargeted_tasks: report.retargeted_tasks,
                    added_executions: report.added_executions,
                    added_sentry_parts: report.added_sentry_parts,
                },
            )
            .await?;
        Ok(report)
    }
}

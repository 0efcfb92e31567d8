use crate::authoring::{build_definition, CaseModelDto};
use crate::events::CaseEvent;
use crate::migration::{plan_migration, MigrationError, MigrationExecutor, MigrationInstruction, MigrationReport};
use crate::sentry;
use crate::store::CaseStore;
use crate::types::*;
use anyhow::{anyhow, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// The cmmn-lite case engine. Deploys definitions, runs instances, and
/// migrates live instances between definition versions. All state lives
/// behind a CaseStore.
pub struct CaseEngine {
    store: Arc<dyn CaseStore>,
}

impl CaseEngine {
    pub fn new(store: Arc<dyn CaseStore>) -> Self {
        Self { store }
    }

    // ── Deployment ──

    /// Deploy a set of authored case models as one deployment.
    ///
    /// Each model is validated, built, and assigned `latest(key) + 1` as its
    /// version. Duplicate filtering: a model whose content hash equals the
    /// latest deployed version of the same key reuses that definition
    /// instead of bumping the version.
    pub async fn deploy(&self, name: &str, models: &[CaseModelDto]) -> Result<Deployment> {
        let deployment_id = Uuid::now_v7();
        let mut definition_ids = Vec::new();

        for model in models {
            let mut definition = build_definition(model)?;
            let latest = self.store.latest_definition(&definition.key).await?;

            if let Some(latest) = &latest {
                if latest.content_hash == definition.content_hash {
                    debug!(
                        key = %definition.key,
                        version = latest.version,
                        "duplicate deployment filtered"
                    );
                    definition_ids.push(latest.definition_id);
                    continue;
                }
            }

            definition.definition_id = Uuid::now_v7();
            definition.deployment_id = deployment_id;
            definition.version = latest.map(|l| l.version).unwrap_or(0) + 1;
            self.store.save_definition(&definition).await?;
            info!(
                key = %definition.key,
                version = definition.version,
                "deployed case definition"
            );
            definition_ids.push(definition.definition_id);
        }

        let deployment = Deployment {
            deployment_id,
            name: name.to_string(),
            definition_ids,
            created_at: now_ms(),
        };
        self.store.save_deployment(&deployment).await?;
        Ok(deployment)
    }

    // ── Instance lifecycle ──

    /// Create a case instance from the latest definition for `key`.
    pub async fn create_instance(
        &self,
        key: &str,
        business_key: Option<String>,
        variables: BTreeMap<String, VariableValue>,
    ) -> Result<CaseInstance> {
        let definition = self
            .store
            .latest_definition(key)
            .await?
            .ok_or_else(|| anyhow!("No definition deployed for key: {}", key))?;

        let instance = CaseInstance {
            instance_id: Uuid::now_v7(),
            definition_id: definition.definition_id,
            key: key.to_string(),
            business_key: business_key.clone(),
            variables,
            state: CaseState::Active,
            created_at: now_ms(),
        };
        self.store.save_instance(&instance).await?;
        self.store
            .append_event(
                instance.instance_id,
                &CaseEvent::InstanceCreated {
                    instance_id: instance.instance_id,
                    definition_id: definition.definition_id,
                    business_key,
                },
            )
            .await?;

        // Root execution for the case plan model
        let root = PlanItemExecution {
            execution_id: Uuid::now_v7(),
            instance_id: instance.instance_id,
            parent: None,
            definition_id: definition.definition_id,
            activity_id: definition.plan_model_id.clone(),
            state: PlanItemState::Active,
            prev_state: PlanItemState::Available,
            required: false,
        };
        self.store.save_execution(&root).await?;

        // Top-level plan items; stage children instantiate when their stage
        // activates.
        for item in definition.plan_items.iter().filter(|i| i.parent.is_none()) {
            self.instantiate_item(&definition, item, instance.instance_id, root.execution_id)
                .await?;
        }

        self.evaluate(instance.instance_id).await?;
        info!(instance_id = %instance.instance_id, key, "case instance created");
        self.instance(instance.instance_id).await
    }

    /// Set a case variable and re-evaluate if-part sentries.
    pub async fn set_variable(
        &self,
        instance_id: Uuid,
        name: &str,
        value: VariableValue,
    ) -> Result<()> {
        let mut instance = self.instance(instance_id).await?;
        if instance.state.is_terminal() {
            return Err(anyhow!(
                "Cannot set variable on terminal case instance: {}",
                instance_id
            ));
        }
        instance.variables.insert(name.to_string(), value.clone());
        self.store.save_instance(&instance).await?;
        self.store
            .append_event(
                instance_id,
                &CaseEvent::VariableSet {
                    name: name.to_string(),
                    value,
                },
            )
            .await?;
        self.evaluate(instance_id).await
    }

    /// Complete an open task; its plan item completes and dependent sentries
    /// fire.
    pub async fn complete_task(&self, task_id: Uuid) -> Result<()> {
        let mut task = self
            .store
            .load_task(task_id)
            .await?
            .ok_or_else(|| anyhow!("Task not found: {}", task_id))?;
        if task.state != TaskState::Created {
            return Err(anyhow!("Task already completed: {}", task_id));
        }
        let instance = self.instance(task.instance_id).await?;
        if instance.state.is_terminal() {
            return Err(anyhow!(
                "Cannot complete task of terminal case instance: {}",
                task.instance_id
            ));
        }

        task.state = TaskState::Completed;
        self.store.save_task(&task).await?;
        self.store
            .append_event(
                task.instance_id,
                &CaseEvent::TaskCompleted {
                    task_id,
                    activity_id: task.activity_id.clone(),
                },
            )
            .await?;

        let mut execution = self
            .store
            .load_execution(task.execution_id)
            .await?
            .ok_or_else(|| anyhow!("Execution not found: {}", task.execution_id))?;
        self.transition(&mut execution, PlanItemState::Completed)
            .await?;
        self.fire_standard_event(task.instance_id, &execution.activity_id, StandardEvent::Complete)
            .await?;

        self.evaluate(task.instance_id).await
    }

    /// Terminate a case instance: every non-terminal plan item terminates
    /// and the case ends. Open tasks stay behind but can no longer be
    /// completed.
    pub async fn terminate_instance(&self, instance_id: Uuid) -> Result<()> {
        let mut instance = self.instance(instance_id).await?;
        if instance.state.is_terminal() {
            return Err(anyhow!("Case instance already terminal: {}", instance_id));
        }
        let executions = self.store.load_executions(instance_id).await?;
        let (root, children): (Vec<_>, Vec<_>) =
            executions.into_iter().partition(|e| e.parent.is_none());
        for mut execution in children {
            if !execution.state.is_terminal() {
                self.transition(&mut execution, PlanItemState::Terminated)
                    .await?;
            }
        }
        for mut execution in root {
            if !execution.state.is_terminal() {
                self.transition(&mut execution, PlanItemState::Terminated)
                    .await?;
            }
        }
        let at = now_ms();
        instance.state = CaseState::Terminated { at };
        self.store.save_instance(&instance).await?;
        self.store
            .append_event(instance_id, &CaseEvent::CaseTerminated { at })
            .await?;
        info!(instance_id = %instance_id, "case instance terminated");
        Ok(())
    }

    // ── Migration ──

    /// Migrate a live instance to another deployed definition version.
    ///
    /// Plans the activity mapping, validates it against the instance's
    /// execution tree, applies the rewrite atomically, then re-evaluates
    /// sentries so entry criteria already satisfied by current variables
    /// fire immediately.
    pub async fn migrate_instance(
        &self,
        instance_id: Uuid,
        target_definition_id: Uuid,
        instructions: &[MigrationInstruction],
    ) -> Result<MigrationReport, MigrationError> {
        let instance = self
            .store
            .load_instance(instance_id)
            .await?
            .ok_or(MigrationError::InstanceNotFound(instance_id))?;
        if instance.state.is_terminal() {
            return Err(MigrationError::InstanceNotActive(instance_id));
        }
        let source = self
            .store
            .load_definition(instance.definition_id)
            .await?
            .ok_or(MigrationError::DefinitionNotFound(instance.definition_id))?;
        let target = self
            .store
            .load_definition(target_definition_id)
            .await?
            .ok_or(MigrationError::DefinitionNotFound(target_definition_id))?;

        let plan = plan_migration(&source, &target, instructions)?;
        let executor = MigrationExecutor::new(self.store.clone());
        let report = executor.execute(&instance, &plan, &target).await?;

        info!(
            instance_id = %instance_id,
            from = source.version,
            to = target.version,
            "case instance migrated"
        );
        self.evaluate(instance_id).await?;
        Ok(report)
    }

    // ── Queries ──

    pub async fn instance(&self, instance_id: Uuid) -> Result<CaseInstance> {
        self.store
            .load_instance(instance_id)
            .await?
            .ok_or_else(|| anyhow!("Case instance not found: {}", instance_id))
    }

    pub async fn executions(&self, instance_id: Uuid) -> Result<Vec<PlanItemExecution>> {
        self.store.load_executions(instance_id).await
    }

    /// Execution bound to the given activity id (plan item or plan model).
    pub async fn execution_by_activity(
        &self,
        instance_id: Uuid,
        activity_id: &str,
    ) -> Result<Option<PlanItemExecution>> {
        let executions = self.store.load_executions(instance_id).await?;
        Ok(executions.into_iter().find(|e| e.activity_id == activity_id))
    }

    /// Open (not yet completed) tasks of an instance.
    pub async fn open_tasks(&self, instance_id: Uuid) -> Result<Vec<TaskEntry>> {
        let tasks = self.store.load_tasks(instance_id).await?;
        Ok(tasks
            .into_iter()
            .filter(|t| t.state == TaskState::Created)
            .collect())
    }

    pub async fn history(&self, instance_id: Uuid) -> Result<Vec<(u64, CaseEvent)>> {
        self.store.read_events(instance_id, 1).await
    }

    // ── Internals ──

    /// Create an Available execution for a plan item and arm its entry
    /// criteria as unsatisfied sentry parts.
    async fn instantiate_item(
        &self,
        definition: &CaseDefinition,
        item: &PlanItem,
        instance_id: Uuid,
        parent_execution: Uuid,
    ) -> Result<PlanItemExecution> {
        let execution = PlanItemExecution {
            execution_id: Uuid::now_v7(),
            instance_id,
            parent: Some(parent_execution),
            definition_id: definition.definition_id,
            activity_id: item.id.clone(),
            state: PlanItemState::Available,
            prev_state: PlanItemState::Available,
            required: item.required,
        };
        self.store.save_execution(&execution).await?;
        for part in sentry::arm_sentry_parts(definition, item, instance_id, parent_execution) {
            self.store.save_sentry_part(&part).await?;
        }
        Ok(execution)
    }

    async fn transition(
        &self,
        execution: &mut PlanItemExecution,
        to: PlanItemState,
    ) -> Result<()> {
        let from = execution.state;
        execution.transition(to);
        self.store.save_execution(execution).await?;
        self.store
            .append_event(
                execution.instance_id,
                &CaseEvent::PlanItemTransitioned {
                    execution_id: execution.execution_id,
                    activity_id: execution.activity_id.clone(),
                    from,
                    to,
                },
            )
            .await?;
        Ok(())
    }

    /// Mark on-parts subscribed to `(source, event)` satisfied.
    async fn fire_standard_event(
        &self,
        instance_id: Uuid,
        source: &str,
        event: StandardEvent,
    ) -> Result<()> {
        let parts = self.store.load_sentry_parts(instance_id).await?;
        for (part_id, sentry_id) in sentry::triggered_on_parts(&parts, source, event) {
            self.store.mark_part_satisfied(instance_id, part_id).await?;
            self.store
                .append_event(
                    instance_id,
                    &CaseEvent::SentryPartSatisfied {
                        part_id,
                        sentry_id,
                        part_type: SentryPartType::OnPart,
                    },
                )
                .await?;
        }
        Ok(())
    }

    /// Run the sentry evaluation / activation loop to fixpoint, then check
    /// case completion.
    pub(crate) async fn evaluate(&self, instance_id: Uuid) -> Result<()> {
        let instance = self.instance(instance_id).await?;
        if instance.state.is_terminal() {
            return Ok(());
        }
        let definition = self
            .store
            .load_definition(instance.definition_id)
            .await?
            .ok_or_else(|| anyhow!("Definition not found: {}", instance.definition_id))?;

        loop {
            let mut progress = false;

            // 1. If-parts whose condition now holds
            let parts = self.store.load_sentry_parts(instance_id).await?;
            for (part_id, sentry_id) in
                sentry::satisfiable_if_parts(&definition, &instance.variables, &parts)
            {
                self.store.mark_part_satisfied(instance_id, part_id).await?;
                self.store
                    .append_event(
                        instance_id,
                        &CaseEvent::SentryPartSatisfied {
                            part_id,
                            sentry_id,
                            part_type: SentryPartType::IfPart,
                        },
                    )
                    .await?;
                progress = true;
            }

            let parts = self.store.load_sentry_parts(instance_id).await?;
            let satisfied = sentry::satisfied_sentries(&parts);

            // 2. Activate Available items whose entry criteria fired
            let executions = self.store.load_executions(instance_id).await?;
            for mut execution in executions {
                if execution.state != PlanItemState::Available {
                    continue;
                }
                let Some(item) = definition.plan_item(&execution.activity_id) else {
                    continue;
                };
                let via_sentry = item
                    .entry_criteria
                    .iter()
                    .find(|c| satisfied.contains(c.as_str()));
                if !item.entry_criteria.is_empty() && via_sentry.is_none() {
                    continue;
                }
                if let Some(sentry_id) = via_sentry {
                    self.store
                        .append_event(
                            instance_id,
                            &CaseEvent::SentrySatisfied {
                                sentry_id: sentry_id.clone(),
                            },
                        )
                        .await?;
                }
                self.activate(&definition, item, &mut execution).await?;
                progress = true;
            }

            // 3. Stages whose children are all terminal complete
            let executions = self.store.load_executions(instance_id).await?;
            for mut execution in executions.clone() {
                if execution.state != PlanItemState::Active {
                    continue;
                }
                let is_stage = definition
                    .plan_item(&execution.activity_id)
                    .is_some_and(|i| i.kind == PlanItemKind::Stage);
                if !is_stage {
                    continue;
                }
                let all_done = executions
                    .iter()
                    .filter(|e| e.parent == Some(execution.execution_id))
                    .all(|e| e.state.is_terminal());
                if all_done {
                    let activity = execution.activity_id.clone();
                    self.transition(&mut execution, PlanItemState::Completed)
                        .await?;
                    self.fire_standard_event(instance_id, &activity, StandardEvent::Complete)
                        .await?;
                    progress = true;
                }
            }

            if !progress {
                break;
            }
        }

        self.maybe_complete_case(instance_id).await
    }

    async fn activate(
        &self,
        definition: &CaseDefinition,
        item: &PlanItem,
        execution: &mut PlanItemExecution,
    ) -> Result<()> {
        match item.kind {
            PlanItemKind::HumanTask => {
                self.transition(execution, PlanItemState::Active).await?;
                let task = TaskEntry {
                    task_id: Uuid::now_v7(),
                    instance_id: execution.instance_id,
                    execution_id: execution.execution_id,
                    definition_id: execution.definition_id,
                    activity_id: item.id.clone(),
                    name: item.name.clone(),
                    state: TaskState::Created,
                    created_at: now_ms(),
                };
                self.store.save_task(&task).await?;
                self.store
                    .append_event(
                        execution.instance_id,
                        &CaseEvent::TaskCreated {
                            task_id: task.task_id,
                            execution_id: execution.execution_id,
                            activity_id: item.id.clone(),
                            name: item.name.clone(),
                        },
                    )
                    .await?;
            }
            PlanItemKind::Milestone => {
                // Milestones occur and complete in one step.
                self.transition(execution, PlanItemState::Completed).await?;
                self.store
                    .append_event(
                        execution.instance_id,
                        &CaseEvent::MilestoneOccurred {
                            execution_id: execution.execution_id,
                            activity_id: item.id.clone(),
                        },
                    )
                    .await?;
                self.fire_standard_event(execution.instance_id, &item.id, StandardEvent::Occur)
                    .await?;
            }
            PlanItemKind::Stage => {
                self.transition(execution, PlanItemState::Active).await?;
                for child in definition
                    .plan_items
                    .iter()
                    .filter(|i| i.parent.as_deref() == Some(item.id.as_str()))
                {
                    self.instantiate_item(
                        definition,
                        child,
                        execution.instance_id,
                        execution.execution_id,
                    )
                    .await?;
                }
            }
        }
        Ok(())
    }

    /// Complete the case when no child is Active/Enabled and every required
    /// child reached a terminal state.
    async fn maybe_complete_case(&self, instance_id: Uuid) -> Result<()> {
        let mut instance = self.instance(instance_id).await?;
        if instance.state.is_terminal() {
            return Ok(());
        }
        let executions = self.store.load_executions(instance_id).await?;
        let active_work = executions.iter().filter(|e| e.parent.is_some()).any(|e| {
            matches!(e.state, PlanItemState::Active | PlanItemState::Enabled)
        });
        let required_pending = executions
            .iter()
            .filter(|e| e.parent.is_some())
            .any(|e| e.required && !e.state.is_terminal());
        if active_work || required_pending {
            return Ok(());
        }

        let Some(mut root) = executions.into_iter().find(|e| e.parent.is_none()) else {
            return Ok(());
        };
        self.transition(&mut root, PlanItemState::Completed).await?;
        let at = now_ms();
        instance.state = CaseState::Completed { at };
        self.store.save_instance(&instance).await?;
        self.store
            .append_event(instance_id, &CaseEvent::CaseCompleted { at })
            .await?;
        debug!(instance_id = %instance_id, "case completed");
        Ok(())
    }
}

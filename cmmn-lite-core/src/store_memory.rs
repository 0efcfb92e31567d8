use crate::events::CaseEvent;
use crate::store::{CaseStore, MigrationPatch};
use crate::types::*;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    definitions: HashMap<Uuid, CaseDefinition>,
    /// (key, version) → definition id.
    definition_index: HashMap<(String, u32), Uuid>,
    deployments: HashMap<Uuid, Deployment>,
    instances: HashMap<Uuid, CaseInstance>,
    executions: HashMap<Uuid, PlanItemExecution>,
    sentry_parts: HashMap<Uuid, Vec<SentryPart>>,
    tasks: HashMap<Uuid, TaskEntry>,
    events: HashMap<Uuid, Vec<(u64, CaseEvent)>>,
}

/// In-memory CaseStore for testing and POC.
///
/// One lock around the whole state so `apply_migration` is a single critical
/// section. Enforces definition immutability: a saved `(key, version)` can
/// never be overwritten.
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CaseStore for MemoryStore {
    async fn save_definition(&self, definition: &CaseDefinition) -> Result<()> {
        let mut inner = self.inner.write().map_err(|e| anyhow!("Lock: {}", e))?;
        let index_key = (definition.key.clone(), definition.version);
        if inner.definition_index.contains_key(&index_key) {
            return Err(anyhow!(
                "Cannot overwrite deployed definition {}:v{}",
                definition.key,
                definition.version
            ));
        }
        if inner.definitions.contains_key(&definition.definition_id) {
            return Err(anyhow!(
                "Cannot overwrite deployed definition {}",
                definition.definition_id
            ));
        }
        inner
            .definition_index
            .insert(index_key, definition.definition_id);
        inner
            .definitions
            .insert(definition.definition_id, definition.clone());
        Ok(())
    }

    async fn load_definition(&self, id: Uuid) -> Result<Option<CaseDefinition>> {
        let inner = self.inner.read().map_err(|e| anyhow!("Lock: {}", e))?;
        Ok(inner.definitions.get(&id).cloned())
    }

    async fn find_definition(&self, key: &str, version: u32) -> Result<Option<CaseDefinition>> {
        let inner = self.inner.read().map_err(|e| anyhow!("Lock: {}", e))?;
        let id = inner.definition_index.get(&(key.to_string(), version));
        Ok(id.and_then(|id| inner.definitions.get(id)).cloned())
    }

    async fn latest_definition(&self, key: &str) -> Result<Option<CaseDefinition>> {
        let inner = self.inner.read().map_err(|e| anyhow!("Lock: {}", e))?;
        let latest = inner
            .definitions
            .values()
            .filter(|d| d.key == key)
            .max_by_key(|d| d.version)
            .cloned();
        Ok(latest)
    }

    async fn list_definitions(&self, key: &str) -> Result<Vec<CaseDefinition>> {
        let inner = self.inner.read().map_err(|e| anyhow!("Lock: {}", e))?;
        let mut defs: Vec<_> = inner
            .definitions
            .values()
            .filter(|d| d.key == key)
            .cloned()
            .collect();
        defs.sort_by_key(|d| d.version);
        Ok(defs)
    }

    async fn save_deployment(&self, deployment: &Deployment) -> Result<()> {
        let mut inner = self.inner.write().map_err(|e| anyhow!("Lock: {}", e))?;
        inner
            .deployments
            .insert(deployment.deployment_id, deployment.clone());
        Ok(())
    }

    async fn load_deployment(&self, id: Uuid) -> Result<Option<Deployment>> {
        let inner = self.inner.read().map_err(|e| anyhow!("Lock: {}", e))?;
        Ok(inner.deployments.get(&id).cloned())
    }

    async fn save_instance(&self, instance: &CaseInstance) -> Result<()> {
        let mut inner = self.inner.write().map_err(|e| anyhow!("Lock: {}", e))?;
        inner
            .instances
            .insert(instance.instance_id, instance.clone());
        Ok(())
    }

    async fn load_instance(&self, id: Uuid) -> Result<Option<CaseInstance>> {
        let inner = self.inner.read().map_err(|e| anyhow!("Lock: {}", e))?;
        Ok(inner.instances.get(&id).cloned())
    }

    async fn save_execution(&self, execution: &PlanItemExecution) -> Result<()> {
        let mut inner = self.inner.write().map_err(|e| anyhow!("Lock: {}", e))?;
        inner
            .executions
            .insert(execution.execution_id, execution.clone());
        Ok(())
    }

    async fn load_execution(&self, execution_id: Uuid) -> Result<Option<PlanItemExecution>> {
        let inner = self.inner.read().map_err(|e| anyhow!("Lock: {}", e))?;
        Ok(inner.executions.get(&execution_id).cloned())
    }

    async fn load_executions(&self, instance_id: Uuid) -> Result<Vec<PlanItemExecution>> {
        let inner = self.inner.read().map_err(|e| anyhow!("Lock: {}", e))?;
        let mut executions: Vec<_> = inner
            .executions
            .values()
            .filter(|e| e.instance_id == instance_id)
            .cloned()
            .collect();
        executions.sort_by_key(|e| e.execution_id);
        Ok(executions)
    }

    async fn save_sentry_part(&self, part: &SentryPart) -> Result<()> {
        let mut inner = self.inner.write().map_err(|e| anyhow!("Lock: {}", e))?;
        let parts = inner.sentry_parts.entry(part.instance_id).or_default();
        match parts.iter_mut().find(|p| p.part_id == part.part_id) {
            Some(existing) => *existing = part.clone(),
            None => parts.push(part.clone()),
        }
        Ok(())
    }

    async fn load_sentry_parts(&self, instance_id: Uuid) -> Result<Vec<SentryPart>> {
        let inner = self.inner.read().map_err(|e| anyhow!("Lock: {}", e))?;
        Ok(inner
            .sentry_parts
            .get(&instance_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn mark_part_satisfied(&self, instance_id: Uuid, part_id: Uuid) -> Result<()> {
        let mut inner = self.inner.write().map_err(|e| anyhow!("Lock: {}", e))?;
        let part = inner
            .sentry_parts
            .get_mut(&instance_id)
            .and_then(|parts| parts.iter_mut().find(|p| p.part_id == part_id))
            .ok_or_else(|| anyhow!("Sentry part not found: {}", part_id))?;
        part.satisfied = true;
        Ok(())
    }

    async fn save_task(&self, task: &TaskEntry) -> Result<()> {
        let mut inner = self.inner.write().map_err(|e| anyhow!("Lock: {}", e))?;
        inner.tasks.insert(task.task_id, task.clone());
        Ok(())
    }

    async fn load_task(&self, task_id: Uuid) -> Result<Option<TaskEntry>> {
        let inner = self.inner.read().map_err(|e| anyhow!("Lock: {}", e))?;
        Ok(inner.tasks.get(&task_id).cloned())
    }

    async fn load_tasks(&self, instance_id: Uuid) -> Result<Vec<TaskEntry>> {
        let inner = self.inner.read().map_err(|e| anyhow!("Lock: {}", e))?;
        let mut tasks: Vec<_> = inner
            .tasks
            .values()
            .filter(|t| t.instance_id == instance_id)
            .cloned()
            .collect();
        tasks.sort_by_key(|t| (t.created_at, t.task_id));
        Ok(tasks)
    }

    async fn apply_migration(&self, patch: &MigrationPatch) -> Result<()> {
        let mut inner = self.inner.write().map_err(|e| anyhow!("Lock: {}", e))?;

        // Check everything up front so a partial patch never lands.
        if !inner.instances.contains_key(&patch.instance_id) {
            return Err(anyhow!("Instance not found: {}", patch.instance_id));
        }
        if !inner.definitions.contains_key(&patch.target_definition_id) {
            return Err(anyhow!(
                "Target definition not found: {}",
                patch.target_definition_id
            ));
        }
        for (execution_id, _) in &patch.execution_retargets {
            if !inner.executions.contains_key(execution_id) {
                return Err(anyhow!("Execution not found: {}", execution_id));
            }
        }
        for (task_id, _) in &patch.task_retargets {
            if !inner.tasks.contains_key(task_id) {
                return Err(anyhow!("Task not found: {}", task_id));
            }
        }
        let instance_parts = inner
            .sentry_parts
            .get(&patch.instance_id)
            .cloned()
            .unwrap_or_default();
        for (part_id, _) in &patch.sentry_part_retargets {
            if !instance_parts.iter().any(|p| p.part_id == *part_id) {
                return Err(anyhow!("Sentry part not found: {}", part_id));
            }
        }

        let instance = inner.instances.get_mut(&patch.instance_id).unwrap();
        instance.definition_id = patch.target_definition_id;

        for (execution_id, activity_id) in &patch.execution_retargets {
            let execution = inner.executions.get_mut(execution_id).unwrap();
            execution.definition_id = patch.target_definition_id;
            execution.activity_id = activity_id.clone();
        }
        for (task_id, activity_id) in &patch.task_retargets {
            let task = inner.tasks.get_mut(task_id).unwrap();
            task.definition_id = patch.target_definition_id;
            task.activity_id = activity_id.clone();
        }
        for (part_id, source) in &patch.sentry_part_retargets {
            let part = inner
                .sentry_parts
                .get_mut(&patch.instance_id)
                .and_then(|parts| parts.iter_mut().find(|p| p.part_id == *part_id))
                .unwrap();
            part.source = Some(source.clone());
        }
        for execution in &patch.new_executions {
            inner
                .executions
                .insert(execution.execution_id, execution.clone());
        }
        for part in &patch.new_sentry_parts {
            inner
                .sentry_parts
                .entry(part.instance_id)
                .or_default()
                .push(part.clone());
        }

        Ok(())
    }

    async fn append_event(&self, instance_id: Uuid, event: &CaseEvent) -> Result<u64> {
        let mut inner = self.inner.write().map_err(|e| anyhow!("Lock: {}", e))?;
        let log = inner.events.entry(instance_id).or_default();
        let seq = log.len() as u64 + 1;
        log.push((seq, event.clone()));
        Ok(seq)
    }

    async fn read_events(
        &self,
        instance_id: Uuid,
        from_seq: u64,
    ) -> Result<Vec<(u64, CaseEvent)>> {
        let inner = self.inner.read().map_err(|e| anyhow!("Lock: {}", e))?;
        Ok(inner
            .events
            .get(&instance_id)
            .map(|log| {
                log.iter()
                    .filter(|(seq, _)| *seq >= from_seq)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn sample_definition(key: &str, version: u32) -> CaseDefinition {
        CaseDefinition {
            definition_id: Uuid::now_v7(),
            key: key.to_string(),
            name: key.to_string(),
            version,
            deployment_id: Uuid::now_v7(),
            content_hash: [version as u8; 32],
            plan_model_id: "CasePlanModel_1".to_string(),
            plan_items: vec![],
            sentries: vec![],
        }
    }

    fn sample_instance(definition_id: Uuid) -> CaseInstance {
        CaseInstance {
            instance_id: Uuid::now_v7(),
            definition_id,
            key: "Case_1".to_string(),
            business_key: None,
            variables: BTreeMap::new(),
            state: CaseState::Active,
            created_at: 0,
        }
    }

    /// T-STORE-1: definition save + lookup paths.
    #[tokio::test]
    async fn t_store_1_definition_lookups() {
        let store = MemoryStore::new();
        let v1 = sample_definition("Case_1", 1);
        let v2 = sample_definition("Case_1", 2);
        store.save_definition(&v1).await.unwrap();
        store.save_definition(&v2).await.unwrap();

        let by_id = store.load_definition(v1.definition_id).await.unwrap();
        assert_eq!(by_id.unwrap().version, 1);

        let by_pair = store.find_definition("Case_1", 2).await.unwrap();
        assert_eq!(by_pair.unwrap().definition_id, v2.definition_id);

        let latest = store.latest_definition("Case_1").await.unwrap().unwrap();
        assert_eq!(latest.version, 2);

        let all = store.list_definitions("Case_1").await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].version, 1);
    }

    /// T-STORE-2: deployed definitions are immutable.
    #[tokio::test]
    async fn t_store_2_definition_immutable() {
        let store = MemoryStore::new();
        let v1 = sample_definition("Case_1", 1);
        store.save_definition(&v1).await.unwrap();

        let mut clash = sample_definition("Case_1", 1);
        clash.name = "changed".to_string();
        let result = store.save_definition(&clash).await;
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Cannot overwrite"));
    }

    /// T-STORE-3: apply_migration rebinds instance, executions, and tasks in
    /// one call and inserts the additions.
    #[tokio::test]
    async fn t_store_3_apply_migration_atomic() {
        let store = MemoryStore::new();
        let v1 = sample_definition("Case_1", 1);
        let v2 = sample_definition("Case_1", 2);
        store.save_definition(&v1).await.unwrap();
        store.save_definition(&v2).await.unwrap();

        let instance = sample_instance(v1.definition_id);
        store.save_instance(&instance).await.unwrap();

        let execution = PlanItemExecution {
            execution_id: Uuid::now_v7(),
            instance_id: instance.instance_id,
            parent: None,
            definition_id: v1.definition_id,
            activity_id: "CasePlanModel_1".to_string(),
            state: PlanItemState::Active,
            prev_state: PlanItemState::Available,
            required: false,
        };
        store.save_execution(&execution).await.unwrap();

        let task = TaskEntry {
            task_id: Uuid::now_v7(),
            instance_id: instance.instance_id,
            execution_id: execution.execution_id,
            definition_id: v1.definition_id,
            activity_id: "PlanItem_1".to_string(),
            name: "Task 1".to_string(),
            state: TaskState::Created,
            created_at: 0,
        };
        store.save_task(&task).await.unwrap();

        let part = SentryPart {
            part_id: Uuid::now_v7(),
            instance_id: instance.instance_id,
            execution_id: execution.execution_id,
            sentry_id: "Sentry_1".to_string(),
            part_type: SentryPartType::OnPart,
            source: Some("PlanItem_1".to_string()),
            standard_event: Some(StandardEvent::Complete),
            variable_name: None,
            satisfied: false,
        };
        store.save_sentry_part(&part).await.unwrap();

        let added = PlanItemExecution {
            execution_id: Uuid::now_v7(),
            instance_id: instance.instance_id,
            parent: Some(execution.execution_id),
            definition_id: v2.definition_id,
            activity_id: "PlanItem_2".to_string(),
            state: PlanItemState::Available,
            prev_state: PlanItemState::Available,
            required: false,
        };

        let patch = MigrationPatch {
            instance_id: instance.instance_id,
            target_definition_id: v2.definition_id,
            execution_retargets: vec![(execution.execution_id, "CasePlanModel_1".to_string())],
            task_retargets: vec![(task.task_id, "PlanItem_1".to_string())],
            sentry_part_retargets: vec![(part.part_id, "PlanItem_1b".to_string())],
            new_executions: vec![added.clone()],
            new_sentry_parts: vec![],
        };
        store.apply_migration(&patch).await.unwrap();

        let instance = store
            .load_instance(instance.instance_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(instance.definition_id, v2.definition_id);

        let executions = store.load_executions(instance.instance_id).await.unwrap();
        assert_eq!(executions.len(), 2);
        assert!(executions
            .iter()
            .all(|e| e.definition_id == v2.definition_id));

        let task = store.load_task(task.task_id).await.unwrap().unwrap();
        assert_eq!(task.definition_id, v2.definition_id);

        let parts = store.load_sentry_parts(instance.instance_id).await.unwrap();
        assert_eq!(parts[0].source.as_deref(), Some("PlanItem_1b"));
    }

    /// T-STORE-4: apply_migration with a dangling execution id leaves the
    /// store untouched.
    #[tokio::test]
    async fn t_store_4_apply_migration_rejects_dangling() {
        let store = MemoryStore::new();
        let v1 = sample_definition("Case_1", 1);
        let v2 = sample_definition("Case_1", 2);
        store.save_definition(&v1).await.unwrap();
        store.save_definition(&v2).await.unwrap();
        let instance = sample_instance(v1.definition_id);
        store.save_instance(&instance).await.unwrap();

        let patch = MigrationPatch {
            instance_id: instance.instance_id,
            target_definition_id: v2.definition_id,
            execution_retargets: vec![(Uuid::now_v7(), "X".to_string())],
            task_retargets: vec![],
            sentry_part_retargets: vec![],
            new_executions: vec![],
            new_sentry_parts: vec![],
        };
        assert!(store.apply_migration(&patch).await.is_err());

        let instance = store
            .load_instance(instance.instance_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(instance.definition_id, v1.definition_id, "rolled back");
    }

    /// T-STORE-5: event sequence numbers are contiguous from 1 per instance.
    #[tokio::test]
    async fn t_store_5_event_seq_contiguous() {
        let store = MemoryStore::new();
        let instance_id = Uuid::now_v7();
        for i in 0..3 {
            let seq = store
                .append_event(
                    instance_id,
                    &CaseEvent::VariableSet {
                        name: format!("v{i}"),
                        value: VariableValue::I64(i),
                    },
                )
                .await
                .unwrap();
            assert_eq!(seq, i as u64 + 1);
        }
        let events = store.read_events(instance_id, 2).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].0, 2);
    }
}

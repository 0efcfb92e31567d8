use crate::events::CaseEvent;
use crate::types::*;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Everything the Migration Executor rewrites in one atomic store
/// transaction. Backends apply the whole patch or none of it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MigrationPatch {
    pub instance_id: Uuid,
    pub target_definition_id: Uuid,
    /// Execution id → activity id it carries after migration.
    pub execution_retargets: Vec<(Uuid, ActivityId)>,
    /// Task id → activity id it carries after migration.
    pub task_retargets: Vec<(Uuid, ActivityId)>,
    /// Armed on-part id → source activity it subscribes to after migration.
    pub sentry_part_retargets: Vec<(Uuid, ActivityId)>,
    /// Executions for plan items that exist only in the target definition.
    pub new_executions: Vec<PlanItemExecution>,
    /// Unsatisfied sentry parts for the new executions' entry criteria.
    pub new_sentry_parts: Vec<SentryPart>,
}

/// Persistence trait for all cmmn-lite state.
///
/// 21 async methods organized by concern. The engine, sentry evaluator, and
/// migration executor operate exclusively through this trait, enabling
/// pluggable backends (MemoryStore today).
#[async_trait]
pub trait CaseStore: Send + Sync {
    // ── Definitions (immutable once saved) ──

    async fn save_definition(&self, definition: &CaseDefinition) -> Result<()>;
    async fn load_definition(&self, id: Uuid) -> Result<Option<CaseDefinition>>;
    async fn find_definition(&self, key: &str, version: u32) -> Result<Option<CaseDefinition>>;
    async fn latest_definition(&self, key: &str) -> Result<Option<CaseDefinition>>;
    async fn list_definitions(&self, key: &str) -> Result<Vec<CaseDefinition>>;

    // ── Deployments ──

    async fn save_deployment(&self, deployment: &Deployment) -> Result<()>;
    async fn load_deployment(&self, id: Uuid) -> Result<Option<Deployment>>;

    // ── Instances ──

    async fn save_instance(&self, instance: &CaseInstance) -> Result<()>;
    async fn load_instance(&self, id: Uuid) -> Result<Option<CaseInstance>>;

    // ── Executions ──

    /// Insert or replace by `execution_id`.
    async fn save_execution(&self, execution: &PlanItemExecution) -> Result<()>;
    async fn load_execution(&self, execution_id: Uuid) -> Result<Option<PlanItemExecution>>;
    async fn load_executions(&self, instance_id: Uuid) -> Result<Vec<PlanItemExecution>>;

    // ── Sentry parts ──

    async fn save_sentry_part(&self, part: &SentryPart) -> Result<()>;
    async fn load_sentry_parts(&self, instance_id: Uuid) -> Result<Vec<SentryPart>>;
    async fn mark_part_satisfied(&self, instance_id: Uuid, part_id: Uuid) -> Result<()>;

    // ── Tasks ──

    async fn save_task(&self, task: &TaskEntry) -> Result<()>;
    async fn load_task(&self, task_id: Uuid) -> Result<Option<TaskEntry>>;
    async fn load_tasks(&self, instance_id: Uuid) -> Result<Vec<TaskEntry>>;

    // ── Migration ──

    /// Apply a validated migration patch atomically. Either every retarget,
    /// insert, and the instance rebind land, or the store is unchanged.
    async fn apply_migration(&self, patch: &MigrationPatch) -> Result<()>;

    // ── Event log (append-only) ──

    /// Append an event and return its sequence number.
    async fn append_event(&self, instance_id: Uuid, event: &CaseEvent) -> Result<u64>;
    async fn read_events(&self, instance_id: Uuid, from_seq: u64)
        -> Result<Vec<(u64, CaseEvent)>>;
}

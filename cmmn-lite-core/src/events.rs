use crate::types::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Case events — the durable audit trail for every case instance.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum CaseEvent {
    InstanceCreated {
        instance_id: Uuid,
        definition_id: Uuid,
        business_key: Option<String>,
    },
    PlanItemTransitioned {
        execution_id: Uuid,
        activity_id: ActivityId,
        from: PlanItemState,
        to: PlanItemState,
    },
    TaskCreated {
        task_id: Uuid,
        execution_id: Uuid,
        activity_id: ActivityId,
        name: String,
    },
    TaskCompleted {
        task_id: Uuid,
        activity_id: ActivityId,
    },
    VariableSet {
        name: String,
        value: VariableValue,
    },
    SentryPartSatisfied {
        part_id: Uuid,
        sentry_id: SentryId,
        part_type: SentryPartType,
    },
    SentrySatisfied {
        sentry_id: SentryId,
    },
    MilestoneOccurred {
        execution_id: Uuid,
        activity_id: ActivityId,
    },
    CaseCompleted {
        at: Timestamp,
    },
    CaseTerminated {
        at: Timestamp,
    },
    /// An instance was rebound from one definition version to another.
    MigrationApplied {
        from_definition: Uuid,
        to_definition: Uuid,
        retargeted_executions: usize,
        retargeted_tasks: usize,
        added_executions: usize,
        added_sentry_parts: usize,
    },
}

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

// ─── Scalar aliases ───────────────────────────────────────────

/// Plan item / sentry identifier as declared in the case model.
pub type ActivityId = String;

/// Sentry identifier as declared in the case model.
pub type SentryId = String;

/// Epoch milliseconds (UTC).
pub type Timestamp = i64;

// ─── Variables ────────────────────────────────────────────────

/// A case variable value. Flat primitives only — the engine branches on
/// these, it never interprets structured domain data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VariableValue {
    Bool(bool),
    I64(i64),
    Str(String),
}

/// Comparison operator in an if-part condition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Neq,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">")]
    Gt,
}

/// A boolean condition over one case variable. The whole expression language:
/// one variable, one operator, one literal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VariableCondition {
    pub variable: String,
    pub op: CompareOp,
    pub value: VariableValue,
}

// ─── Definition model ─────────────────────────────────────────

/// Standard events a plan item fires during its lifecycle. On-parts subscribe
/// to these.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StandardEvent {
    Complete,
    Occur,
    Terminate,
}

/// What a plan item instantiates as.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlanItemKind {
    HumanTask,
    Milestone,
    Stage,
}

/// One plan item in a case definition.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlanItem {
    pub id: ActivityId,
    pub name: String,
    pub kind: PlanItemKind,
    /// Containing stage. `None` = direct child of the case plan model.
    pub parent: Option<ActivityId>,
    /// Entry criteria: sentry ids. Empty = activates on instantiation.
    pub entry_criteria: Vec<SentryId>,
    /// Required items block case completion until they reach a terminal state.
    pub required: bool,
}

/// On-part: fires when `source` raises `event`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OnPart {
    pub source: ActivityId,
    pub event: StandardEvent,
}

/// If-part: satisfied when the condition holds against instance variables.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IfPart {
    pub condition: VariableCondition,
}

/// A sentry gates plan-item activation. Satisfied when ALL parts are
/// satisfied.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Sentry {
    pub id: SentryId,
    pub on_parts: Vec<OnPart>,
    pub if_part: Option<IfPart>,
}

/// An immutable, versioned case definition. The Definition Store assigns
/// `version` and `deployment_id` at deploy time; `content_hash` is the
/// SHA-256 of the authored model and drives duplicate-deployment filtering.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CaseDefinition {
    pub definition_id: Uuid,
    pub key: String,
    pub name: String,
    pub version: u32,
    pub deployment_id: Uuid,
    pub content_hash: [u8; 32],
    /// Activity id of the case plan model — the root of the execution tree.
    pub plan_model_id: ActivityId,
    pub plan_items: Vec<PlanItem>,
    pub sentries: Vec<Sentry>,
}

impl CaseDefinition {
    pub fn plan_item(&self, id: &str) -> Option<&PlanItem> {
        self.plan_items.iter().find(|p| p.id == id)
    }

    pub fn sentry(&self, id: &str) -> Option<&Sentry> {
        self.sentries.iter().find(|s| s.id == id)
    }
}

/// A deployment groups the definitions registered in one deploy call.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Deployment {
    pub deployment_id: Uuid,
    pub name: String,
    pub definition_ids: Vec<Uuid>,
    pub created_at: Timestamp,
}

// ─── Runtime state ────────────────────────────────────────────

/// Plan item lifecycle. Available → Enabled → Active → {Completed,
/// Terminated}. Enabled is reserved for manual-start items; the engine
/// auto-starts, so transitions normally skip it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlanItemState {
    Available,
    Enabled,
    Active,
    Completed,
    Terminated,
}

impl PlanItemState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PlanItemState::Completed | PlanItemState::Terminated)
    }
}

/// Top-level case state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum CaseState {
    Active,
    Completed { at: Timestamp },
    Terminated { at: Timestamp },
}

impl CaseState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, CaseState::Active)
    }
}

/// A running case instance — the top-level execution context.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CaseInstance {
    pub instance_id: Uuid,
    pub definition_id: Uuid,
    pub key: String,
    pub business_key: Option<String>,
    pub variables: BTreeMap<String, VariableValue>,
    pub state: CaseState,
    pub created_at: Timestamp,
}

/// One node of the execution tree: a plan item (or the plan model root)
/// bound to a definition version.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlanItemExecution {
    pub execution_id: Uuid,
    pub instance_id: Uuid,
    /// `None` only for the plan model root.
    pub parent: Option<Uuid>,
    pub definition_id: Uuid,
    pub activity_id: ActivityId,
    pub state: PlanItemState,
    pub prev_state: PlanItemState,
    pub required: bool,
}

impl PlanItemExecution {
    pub fn transition(&mut self, to: PlanItemState) {
        self.prev_state = self.state;
        self.state = to;
    }
}

/// Which half of a sentry a runtime part tracks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SentryPartType {
    IfPart,
    OnPart,
}

/// Runtime tracking row for one part of one sentry within an instance.
/// Satisfaction is sticky: once recorded it survives until the guarded item
/// activates.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SentryPart {
    pub part_id: Uuid,
    pub instance_id: Uuid,
    /// Scope execution the part is attached to (the guarded item's parent).
    pub execution_id: Uuid,
    pub sentry_id: SentryId,
    pub part_type: SentryPartType,
    /// On-parts only: the source plan item and the event subscribed to.
    pub source: Option<ActivityId>,
    pub standard_event: Option<StandardEvent>,
    /// If-parts only: the variable the condition reads.
    pub variable_name: Option<String>,
    pub satisfied: bool,
}

/// Task list entry state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskState {
    Created,
    Completed,
}

/// A human task produced by an Active human-task plan item.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskEntry {
    pub task_id: Uuid,
    pub instance_id: Uuid,
    pub execution_id: Uuid,
    pub definition_id: Uuid,
    pub activity_id: ActivityId,
    pub name: String,
    pub state: TaskState,
    pub created_at: Timestamp,
}

pub(crate) fn now_ms() -> Timestamp {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

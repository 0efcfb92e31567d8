use crate::types::{StandardEvent, VariableCondition};
use serde::{Deserialize, Serialize};

// ── Helper defaults for serde ──

fn is_false(v: &bool) -> bool {
    !v
}

// ── Top-level DTO ──

/// Authored case model, before versioning. Parsed from YAML or imported from
/// CMMN XML; validated and built into a `CaseDefinition` at deploy time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseModelDto {
    /// Case key — stable across versions.
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub plan_model_id: String,
    pub items: Vec<PlanItemDto>,
    #[serde(default)]
    pub sentries: Vec<SentryDto>,
}

// ── Plan item (tagged enum) ──

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum PlanItemDto {
    HumanTask {
        id: String,
        #[serde(default)]
        name: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        entry_criteria: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent: Option<String>,
        #[serde(default, skip_serializing_if = "is_false")]
        required: bool,
    },
    Milestone {
        id: String,
        #[serde(default)]
        name: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        entry_criteria: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent: Option<String>,
        #[serde(default, skip_serializing_if = "is_false")]
        required: bool,
    },
    Stage {
        id: String,
        #[serde(default)]
        name: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        entry_criteria: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent: Option<String>,
        #[serde(default, skip_serializing_if = "is_false")]
        required: bool,
    },
}

impl PlanItemDto {
    pub fn id(&self) -> &str {
        match self {
            PlanItemDto::HumanTask { id, .. }
            | PlanItemDto::Milestone { id, .. }
            | PlanItemDto::Stage { id, .. } => id,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            PlanItemDto::HumanTask { name, .. }
            | PlanItemDto::Milestone { name, .. }
            | PlanItemDto::Stage { name, .. } => name.as_deref(),
        }
    }

    pub fn entry_criteria(&self) -> &[String] {
        match self {
            PlanItemDto::HumanTask { entry_criteria, .. }
            | PlanItemDto::Milestone { entry_criteria, .. }
            | PlanItemDto::Stage { entry_criteria, .. } => entry_criteria,
        }
    }

    pub fn parent(&self) -> Option<&str> {
        match self {
            PlanItemDto::HumanTask { parent, .. }
            | PlanItemDto::Milestone { parent, .. }
            | PlanItemDto::Stage { parent, .. } => parent.as_deref(),
        }
    }

    pub fn required(&self) -> bool {
        match self {
            PlanItemDto::HumanTask { required, .. }
            | PlanItemDto::Milestone { required, .. }
            | PlanItemDto::Stage { required, .. } => *required,
        }
    }
}

// ── Sentry ──

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentryDto {
    pub id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub on_parts: Vec<OnPartDto>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub if_part: Option<VariableCondition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnPartDto {
    pub source: String,
    pub event: StandardEvent,
}

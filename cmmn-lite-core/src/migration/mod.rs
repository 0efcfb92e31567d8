//! Live-instance version migration: plan an activity mapping between two
//! deployed definitions of the same case, validate it against the
//! instance's execution tree, and apply it atomically.

pub mod executor;
pub mod plan;

pub use executor::{MigrationExecutor, MigrationReport};
pub use plan::{plan_migration, validate_executions, MigrationInstruction, MigrationPlan};

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error("Definition not found: {0}")]
    DefinitionNotFound(Uuid),

    #[error("Case instance not found: {0}")]
    InstanceNotFound(Uuid),

    #[error("Case instance is not active: {0}")]
    InstanceNotActive(Uuid),

    #[error("Migration rejected:\n{}", format_rejections(.0))]
    Rejected(Vec<MigrationValidationError>),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// One rule violation found while planning or validating a migration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MigrationValidationError {
    pub rule: String,
    pub message: String,
}

impl MigrationValidationError {
    pub fn new(rule: &str, message: impl Into<String>) -> Self {
        Self {
            rule: rule.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for MigrationValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.rule, self.message)
    }
}

fn format_rejections(errors: &[MigrationValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

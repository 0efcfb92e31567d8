//! cmmn-lite-core — a small case engine with live-instance version
//! migration.
//!
//! Case definitions (plan items, sentries, stages) are authored in YAML or
//! imported from CMMN 1.1 XML, deployed with per-key versioning, and run as
//! case instances. A running instance can be migrated onto a newer
//! definition version: every execution and task is rebound, plan items
//! added in the new version are instantiated as Available, and their entry
//! criteria are armed as unsatisfied sentry parts.

pub mod authoring;
pub mod engine;
pub mod events;
pub mod migration;
pub mod sentry;
pub mod store;
pub mod store_memory;
pub mod types;

pub use engine::CaseEngine;
pub use events::CaseEvent;
pub use migration::{MigrationError, MigrationInstruction, MigrationPlan, MigrationReport};
pub use store::{CaseStore, MigrationPatch};
pub use store_memory::MemoryStore;
pub use types::*;

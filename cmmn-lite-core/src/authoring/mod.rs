//! Definition authoring: serde DTO, YAML parse, CMMN XML import, structural
//! validation, and the DTO → CaseDefinition build step.

pub mod dto;
pub mod dto_to_model;
pub mod validate;
pub mod xml;
pub mod yaml;

pub use dto::{CaseModelDto, OnPartDto, PlanItemDto, SentryDto};
pub use dto_to_model::{build_definition, content_hash};
pub use validate::{validate_dto, ValidationError};
pub use xml::{parse_cmmn_xml, parse_expression};
pub use yaml::parse_case_yaml;

use super::dto::CaseModelDto;
use anyhow::Result;

/// Parse a YAML string into a CaseModelDto.
///
/// Validation is NOT performed here — call `validate_dto()` or go through
/// `CaseEngine::deploy()` which validates before building the definition.
pub fn parse_case_yaml(yaml_str: &str) -> Result<CaseModelDto> {
    let dto: CaseModelDto = serde_yaml::from_str(yaml_str)?;
    Ok(dto)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authoring::dto::PlanItemDto;
    use crate::types::{CompareOp, VariableValue};

    #[test]
    fn test_basic_yaml_parse() {
        let yaml = r#"
id: Case_1
name: Case 1
plan_model_id: CasePlanModel_1
items:
  - kind: HumanTask
    id: PlanItem_1
    name: Task 1
  - kind: HumanTask
    id: PlanItem_2
    name: Task 2
    entry_criteria: [Sentry_1]
sentries:
  - id: Sentry_1
    if_part:
      variable: readyToGo
      op: "=="
      value: true
"#;
        let dto = parse_case_yaml(yaml).unwrap();
        assert_eq!(dto.id, "Case_1");
        assert_eq!(dto.items.len(), 2);
        assert_eq!(dto.sentries.len(), 1);

        let condition = dto.sentries[0].if_part.as_ref().unwrap();
        assert_eq!(condition.variable, "readyToGo");
        assert!(matches!(condition.op, CompareOp::Eq));
        assert!(matches!(condition.value, VariableValue::Bool(true)));
    }

    #[test]
    fn test_yaml_with_stage_and_on_part() {
        let yaml = r#"
id: Case_2
plan_model_id: CasePlanModel_1
items:
  - kind: Stage
    id: Stage_1
    required: true
  - kind: HumanTask
    id: Task_a
    parent: Stage_1
  - kind: Milestone
    id: Milestone_1
    entry_criteria: [Sentry_done]
sentries:
  - id: Sentry_done
    on_parts:
      - source: Stage_1
        event: complete
"#;
        let dto = parse_case_yaml(yaml).unwrap();
        assert_eq!(dto.items.len(), 3);
        match &dto.items[1] {
            PlanItemDto::HumanTask { parent, .. } => {
                assert_eq!(parent.as_deref(), Some("Stage_1"));
            }
            other => panic!("Expected HumanTask, got {:?}", other),
        }
        assert!(dto.items[0].required());
        assert_eq!(dto.sentries[0].on_parts.len(), 1);
    }

    /// A condition must be a struct, not a bare expression string.
    #[test]
    fn test_bare_string_condition_fails() {
        let yaml = r#"
id: bad
plan_model_id: root
items:
  - kind: HumanTask
    id: t
    entry_criteria: [s]
sentries:
  - id: s
    if_part: "readyToGo == true"
"#;
        assert!(
            parse_case_yaml(yaml).is_err(),
            "Bare string condition should fail deserialization"
        );
    }
}

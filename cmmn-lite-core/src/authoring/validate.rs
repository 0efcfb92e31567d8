use super::dto::*;
use crate::types::{PlanItemKind, StandardEvent};
use petgraph::algo::is_cyclic_directed;
use petgraph::graph::DiGraph;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub rule: String,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.rule, self.message)
    }
}

fn kind_of(item: &PlanItemDto) -> PlanItemKind {
    match item {
        PlanItemDto::HumanTask { .. } => PlanItemKind::HumanTask,
        PlanItemDto::Milestone { .. } => PlanItemKind::Milestone,
        PlanItemDto::Stage { .. } => PlanItemKind::Stage,
    }
}

/// Validate a CaseModelDto before building a definition. Returns all errors
/// found.
pub fn validate_dto(dto: &CaseModelDto) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    // Build lookup maps
    let mut item_map: HashMap<&str, &PlanItemDto> = HashMap::new();
    let mut sentry_map: HashMap<&str, &SentryDto> = HashMap::new();

    // C1: Plan item ids must be unique and distinct from the plan model id
    for item in &dto.items {
        let id = item.id();
        if id == dto.plan_model_id {
            errors.push(ValidationError {
                rule: "C1".to_string(),
                message: format!("Plan item id collides with plan model id: {}", id),
            });
        }
        if item_map.insert(id, item).is_some() {
            errors.push(ValidationError {
                rule: "C1".to_string(),
                message: format!("Duplicate plan item id: {}", id),
            });
        }
    }

    // C2: Sentry ids must be unique
    for sentry in &dto.sentries {
        if sentry_map.insert(sentry.id.as_str(), sentry).is_some() {
            errors.push(ValidationError {
                rule: "C2".to_string(),
                message: format!("Duplicate sentry id: {}", sentry.id),
            });
        }
    }

    // C3: Entry criteria reference declared sentries
    for item in &dto.items {
        for criterion in item.entry_criteria() {
            if !sentry_map.contains_key(criterion.as_str()) {
                errors.push(ValidationError {
                    rule: "C3".to_string(),
                    message: format!(
                        "Plan item {}: entry criterion references unknown sentry {}",
                        item.id(),
                        criterion
                    ),
                });
            }
        }
    }

    // C4: On-part sources reference declared plan items
    for sentry in &dto.sentries {
        for on_part in &sentry.on_parts {
            if !item_map.contains_key(on_part.source.as_str()) {
                errors.push(ValidationError {
                    rule: "C4".to_string(),
                    message: format!(
                        "Sentry {}: on-part references unknown plan item {}",
                        sentry.id, on_part.source
                    ),
                });
            }
        }
    }

    // C5: Parent references an existing Stage
    for item in &dto.items {
        if let Some(parent) = item.parent() {
            let valid = item_map
                .get(parent)
                .is_some_and(|p| kind_of(p) == PlanItemKind::Stage);
            if !valid {
                errors.push(ValidationError {
                    rule: "C5".to_string(),
                    message: format!(
                        "Plan item {}: parent '{}' not found or not a Stage",
                        item.id(),
                        parent
                    ),
                });
            }
        }
    }

    // C6: On-part event must match the source kind (`occur` ⇔ milestone,
    // `complete` ⇔ task/stage; `terminate` valid anywhere)
    for sentry in &dto.sentries {
        for on_part in &sentry.on_parts {
            let Some(source) = item_map.get(on_part.source.as_str()) else {
                continue; // C4 already reported
            };
            let kind = kind_of(source);
            let valid = match on_part.event {
                StandardEvent::Occur => kind == PlanItemKind::Milestone,
                StandardEvent::Complete => kind != PlanItemKind::Milestone,
                StandardEvent::Terminate => true,
            };
            if !valid {
                errors.push(ValidationError {
                    rule: "C6".to_string(),
                    message: format!(
                        "Sentry {}: event {:?} is not fired by {:?} {}",
                        sentry.id, on_part.event, kind, on_part.source
                    ),
                });
            }
        }
    }

    // C7: A sentry must have at least one part
    for sentry in &dto.sentries {
        if sentry.on_parts.is_empty() && sentry.if_part.is_none() {
            errors.push(ValidationError {
                rule: "C7".to_string(),
                message: format!("Sentry {} has no on-part and no if-part", sentry.id),
            });
        }
    }

    // C8: A plan item must not be guarded by a sentry triggered by itself
    for item in &dto.items {
        for criterion in item.entry_criteria() {
            let Some(sentry) = sentry_map.get(criterion.as_str()) else {
                continue;
            };
            if sentry.on_parts.iter().any(|p| p.source == item.id()) {
                errors.push(ValidationError {
                    rule: "C8".to_string(),
                    message: format!(
                        "Plan item {}: guarded by sentry {} which it triggers itself",
                        item.id(),
                        sentry.id
                    ),
                });
            }
        }
    }

    // C9: The sentry dependency graph (on-part source → guarded item) must
    // be acyclic, otherwise no member of the cycle can ever activate.
    let mut graph: DiGraph<&str, ()> = DiGraph::new();
    let mut index: HashMap<&str, petgraph::graph::NodeIndex> = HashMap::new();
    for item in &dto.items {
        index.insert(item.id(), graph.add_node(item.id()));
    }
    for item in &dto.items {
        for criterion in item.entry_criteria() {
            let Some(sentry) = sentry_map.get(criterion.as_str()) else {
                continue;
            };
            for on_part in &sentry.on_parts {
                if let (Some(&from), Some(&to)) = (
                    index.get(on_part.source.as_str()),
                    index.get(item.id()),
                ) {
                    graph.add_edge(from, to, ());
                }
            }
        }
    }
    if is_cyclic_directed(&graph) {
        errors.push(ValidationError {
            rule: "C9".to_string(),
            message: "Sentry dependency graph contains a cycle".to_string(),
        });
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CompareOp, VariableCondition, VariableValue};

    fn minimal_valid_dto() -> CaseModelDto {
        CaseModelDto {
            id: "Case_1".to_string(),
            name: Some("Case 1".to_string()),
            plan_model_id: "CasePlanModel_1".to_string(),
            items: vec![
                PlanItemDto::HumanTask {
                    id: "PlanItem_1".to_string(),
                    name: Some("Task 1".to_string()),
                    entry_criteria: vec![],
                    parent: None,
                    required: false,
                },
                PlanItemDto::HumanTask {
                    id: "PlanItem_2".to_string(),
                    name: Some("Task 2".to_string()),
                    entry_criteria: vec!["Sentry_1".to_string()],
                    parent: None,
                    required: false,
                },
            ],
            sentries: vec![SentryDto {
                id: "Sentry_1".to_string(),
                on_parts: vec![],
                if_part: Some(VariableCondition {
                    variable: "readyToGo".to_string(),
                    op: CompareOp::Eq,
                    value: VariableValue::Bool(true),
                }),
            }],
        }
    }

    #[test]
    fn test_minimal_valid_passes() {
        let errors = validate_dto(&minimal_valid_dto());
        assert!(errors.is_empty(), "Expected no errors, got: {:?}", errors);
    }

    /// T-VAL-1: C1 — duplicate plan item id.
    #[test]
    fn t_val_1_c1_duplicate_id() {
        let mut dto = minimal_valid_dto();
        dto.items.push(PlanItemDto::Milestone {
            id: "PlanItem_1".to_string(),
            name: None,
            entry_criteria: vec![],
            parent: None,
            required: false,
        });
        let errors = validate_dto(&dto);
        assert!(errors.iter().any(|e| e.rule == "C1"), "Expected C1 error");
    }

    /// T-VAL-2: C3 — entry criterion names an unknown sentry.
    #[test]
    fn t_val_2_c3_unknown_sentry() {
        let mut dto = minimal_valid_dto();
        if let PlanItemDto::HumanTask { entry_criteria, .. } = &mut dto.items[1] {
            entry_criteria.push("Sentry_missing".to_string());
        }
        let errors = validate_dto(&dto);
        assert!(errors.iter().any(|e| e.rule == "C3"), "Expected C3 error");
    }

    /// T-VAL-3: C4 — on-part names an unknown plan item.
    #[test]
    fn t_val_3_c4_unknown_source() {
        let mut dto = minimal_valid_dto();
        dto.sentries[0].on_parts.push(OnPartDto {
            source: "PlanItem_missing".to_string(),
            event: StandardEvent::Complete,
        });
        let errors = validate_dto(&dto);
        assert!(errors.iter().any(|e| e.rule == "C4"), "Expected C4 error");
    }

    /// T-VAL-4: C5 — parent is not a stage.
    #[test]
    fn t_val_4_c5_parent_not_stage() {
        let mut dto = minimal_valid_dto();
        dto.items.push(PlanItemDto::HumanTask {
            id: "PlanItem_3".to_string(),
            name: None,
            entry_criteria: vec![],
            parent: Some("PlanItem_1".to_string()),
            required: false,
        });
        let errors = validate_dto(&dto);
        assert!(errors.iter().any(|e| e.rule == "C5"), "Expected C5 error");
    }

    /// T-VAL-5: C6 — `occur` from a human task.
    #[test]
    fn t_val_5_c6_event_kind_mismatch() {
        let mut dto = minimal_valid_dto();
        dto.sentries[0].on_parts.push(OnPartDto {
            source: "PlanItem_1".to_string(),
            event: StandardEvent::Occur,
        });
        let errors = validate_dto(&dto);
        assert!(errors.iter().any(|e| e.rule == "C6"), "Expected C6 error");
    }

    /// T-VAL-6: C7 — empty sentry.
    #[test]
    fn t_val_6_c7_empty_sentry() {
        let mut dto = minimal_valid_dto();
        dto.sentries.push(SentryDto {
            id: "Sentry_empty".to_string(),
            on_parts: vec![],
            if_part: None,
        });
        let errors = validate_dto(&dto);
        assert!(errors.iter().any(|e| e.rule == "C7"), "Expected C7 error");
    }

    /// T-VAL-7: C8 — self-triggering sentry.
    #[test]
    fn t_val_7_c8_self_trigger() {
        let mut dto = minimal_valid_dto();
        dto.sentries[0].on_parts.push(OnPartDto {
            source: "PlanItem_2".to_string(),
            event: StandardEvent::Complete,
        });
        let errors = validate_dto(&dto);
        assert!(errors.iter().any(|e| e.rule == "C8"), "Expected C8 error");
    }

    /// T-VAL-8: C9 — two items each gated on the other completing.
    #[test]
    fn t_val_8_c9_cycle() {
        let dto = CaseModelDto {
            id: "Case_cycle".to_string(),
            name: None,
            plan_model_id: "CasePlanModel_1".to_string(),
            items: vec![
                PlanItemDto::HumanTask {
                    id: "A".to_string(),
                    name: None,
                    entry_criteria: vec!["S_a".to_string()],
                    parent: None,
                    required: false,
                },
                PlanItemDto::HumanTask {
                    id: "B".to_string(),
                    name: None,
                    entry_criteria: vec!["S_b".to_string()],
                    parent: None,
                    required: false,
                },
            ],
            sentries: vec![
                SentryDto {
                    id: "S_a".to_string(),
                    on_parts: vec![OnPartDto {
                        source: "B".to_string(),
                        event: StandardEvent::Complete,
                    }],
                    if_part: None,
                },
                SentryDto {
                    id: "S_b".to_string(),
                    on_parts: vec![OnPartDto {
                        source: "A".to_string(),
                        event: StandardEvent::Complete,
                    }],
                    if_part: None,
                },
            ],
        };
        let errors = validate_dto(&dto);
        assert!(errors.iter().any(|e| e.rule == "C9"), "Expected C9 error");
    }
}

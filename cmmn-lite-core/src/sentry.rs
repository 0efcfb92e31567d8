//! Sentry Evaluator — pure satisfaction logic over sentry parts and
//! instance variables. The engine owns all state mutation; this module only
//! decides.

use crate::types::*;
use std::collections::{BTreeMap, HashSet};
use uuid::Uuid;

/// Evaluate an if-part condition against current variables. A missing
/// variable is unsatisfied, never an error.
pub fn evaluate_condition(
    condition: &VariableCondition,
    variables: &BTreeMap<String, VariableValue>,
) -> bool {
    let Some(actual) = variables.get(&condition.variable) else {
        return false;
    };
    match condition.op {
        CompareOp::Eq => actual == &condition.value,
        CompareOp::Neq => actual != &condition.value,
        // Ordering is defined for integers only; a type mismatch is
        // unsatisfied rather than an error.
        CompareOp::Lt => match (actual, &condition.value) {
            (VariableValue::I64(a), VariableValue::I64(b)) => a < b,
            _ => false,
        },
        CompareOp::Gt => match (actual, &condition.value) {
            (VariableValue::I64(a), VariableValue::I64(b)) => a > b,
            _ => false,
        },
    }
}

/// If-parts that are currently unsatisfied but whose condition now holds.
/// Returns `(part_id, sentry_id)` pairs for the engine to mark satisfied.
pub fn satisfiable_if_parts(
    definition: &CaseDefinition,
    variables: &BTreeMap<String, VariableValue>,
    parts: &[SentryPart],
) -> Vec<(Uuid, SentryId)> {
    parts
        .iter()
        .filter(|p| p.part_type == SentryPartType::IfPart && !p.satisfied)
        .filter_map(|p| {
            let sentry = definition.sentry(&p.sentry_id)?;
            let if_part = sentry.if_part.as_ref()?;
            if evaluate_condition(&if_part.condition, variables) {
                Some((p.part_id, p.sentry_id.clone()))
            } else {
                None
            }
        })
        .collect()
}

/// On-parts that are currently unsatisfied and subscribe to `(source,
/// event)`. Returns `(part_id, sentry_id)` pairs to mark satisfied.
pub fn triggered_on_parts(
    parts: &[SentryPart],
    source: &str,
    event: StandardEvent,
) -> Vec<(Uuid, SentryId)> {
    parts
        .iter()
        .filter(|p| {
            p.part_type == SentryPartType::OnPart
                && !p.satisfied
                && p.source.as_deref() == Some(source)
                && p.standard_event == Some(event)
        })
        .map(|p| (p.part_id, p.sentry_id.clone()))
        .collect()
}

/// Sentry ids whose parts are all satisfied. A sentry with no runtime parts
/// for this instance is NOT satisfied — absence means it was never armed.
pub fn satisfied_sentries(parts: &[SentryPart]) -> HashSet<SentryId> {
    let mut by_sentry: BTreeMap<&str, bool> = BTreeMap::new();
    for part in parts {
        let all = by_sentry.entry(&part.sentry_id).or_insert(true);
        *all = *all && part.satisfied;
    }
    by_sentry
        .into_iter()
        .filter(|(_, all)| *all)
        .map(|(id, _)| id.to_string())
        .collect()
}

/// Instantiate unsatisfied runtime parts for every entry-criterion sentry of
/// a plan item. `scope_execution_id` is the execution the parts attach to
/// (the guarded item's parent scope).
pub fn arm_sentry_parts(
    definition: &CaseDefinition,
    plan_item: &PlanItem,
    instance_id: Uuid,
    scope_execution_id: Uuid,
) -> Vec<SentryPart> {
    let mut out = Vec::new();
    for sentry_id in &plan_item.entry_criteria {
        let Some(sentry) = definition.sentry(sentry_id) else {
            continue;
        };
        for on_part in &sentry.on_parts {
            out.push(SentryPart {
                part_id: Uuid::now_v7(),
                instance_id,
                execution_id: scope_execution_id,
                sentry_id: sentry.id.clone(),
                part_type: SentryPartType::OnPart,
                source: Some(on_part.source.clone()),
                standard_event: Some(on_part.event),
                variable_name: None,
                satisfied: false,
            });
        }
        if let Some(if_part) = &sentry.if_part {
            out.push(SentryPart {
                part_id: Uuid::now_v7(),
                instance_id,
                execution_id: scope_execution_id,
                sentry_id: sentry.id.clone(),
                part_type: SentryPartType::IfPart,
                source: None,
                standard_event: None,
                variable_name: Some(if_part.condition.variable.clone()),
                satisfied: false,
            });
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, VariableValue)]) -> BTreeMap<String, VariableValue> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn part(sentry_id: &str, part_type: SentryPartType, satisfied: bool) -> SentryPart {
        SentryPart {
            part_id: Uuid::now_v7(),
            instance_id: Uuid::now_v7(),
            execution_id: Uuid::now_v7(),
            sentry_id: sentry_id.to_string(),
            part_type,
            source: None,
            standard_event: None,
            variable_name: None,
            satisfied,
        }
    }

    /// T-SENTRY-1: condition evaluation per operator and missing variable.
    #[test]
    fn t_sentry_1_condition_eval() {
        let condition = VariableCondition {
            variable: "readyToGo".to_string(),
            op: CompareOp::Eq,
            value: VariableValue::Bool(true),
        };
        assert!(!evaluate_condition(&condition, &vars(&[])));
        assert!(!evaluate_condition(
            &condition,
            &vars(&[("readyToGo", VariableValue::Bool(false))])
        ));
        assert!(evaluate_condition(
            &condition,
            &vars(&[("readyToGo", VariableValue::Bool(true))])
        ));

        let lt = VariableCondition {
            variable: "amount".to_string(),
            op: CompareOp::Lt,
            value: VariableValue::I64(10),
        };
        assert!(evaluate_condition(
            &lt,
            &vars(&[("amount", VariableValue::I64(5))])
        ));
        // Ordering against a non-integer is unsatisfied, not an error.
        assert!(!evaluate_condition(
            &lt,
            &vars(&[("amount", VariableValue::Str("5".to_string()))])
        ));
    }

    /// T-SENTRY-2: a sentry is satisfied only when every part is.
    #[test]
    fn t_sentry_2_all_parts_required() {
        let parts = vec![
            part("S1", SentryPartType::OnPart, true),
            part("S1", SentryPartType::IfPart, false),
            part("S2", SentryPartType::IfPart, true),
        ];
        let satisfied = satisfied_sentries(&parts);
        assert!(!satisfied.contains("S1"));
        assert!(satisfied.contains("S2"));
    }

    /// T-SENTRY-3: on-part triggering matches source AND event.
    #[test]
    fn t_sentry_3_on_part_matching() {
        let mut a = part("S1", SentryPartType::OnPart, false);
        a.source = Some("PlanItem_1".to_string());
        a.standard_event = Some(StandardEvent::Complete);
        let mut b = part("S2", SentryPartType::OnPart, false);
        b.source = Some("PlanItem_1".to_string());
        b.standard_event = Some(StandardEvent::Terminate);

        let parts = vec![a.clone(), b];
        let hits = triggered_on_parts(&parts, "PlanItem_1", StandardEvent::Complete);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, a.part_id);
        assert!(triggered_on_parts(&parts, "PlanItem_9", StandardEvent::Complete).is_empty());
    }
}

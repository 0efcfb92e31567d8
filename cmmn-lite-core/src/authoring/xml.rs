//! Minimal CMMN 1.1 XML import.
//!
//! Covers the subset the engine executes: `<case>`, `<casePlanModel>`,
//! `<planItem>` with `<entryCriterion>`, `<humanTask>`, `<milestone>`,
//! `<stage>` definitions (flat — nested stage plan items are not imported),
//! and `<sentry>` with `<planItemOnPart>`/`<ifPart>`. Conditions are the
//! `${...}` single-comparison form.

use super::dto::*;
use crate::types::{CompareOp, PlanItemKind, StandardEvent, VariableCondition};
use anyhow::{anyhow, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;

/// Expression parse failures for if-part condition bodies.
#[derive(Debug, thiserror::Error)]
pub enum ExpressionError {
    #[error("expression must be wrapped in ${{...}}: {0}")]
    MissingDelimiters(String),
    #[error("empty expression")]
    Empty,
    #[error("cannot parse literal: {0}")]
    BadLiteral(String),
}

/// Parse a `${...}` condition body into a VariableCondition.
///
/// `${flag}` is shorthand for `${flag == true}`.
pub fn parse_expression(raw: &str) -> Result<VariableCondition, ExpressionError> {
    let trimmed = raw.trim();
    let body = trimmed
        .strip_prefix("${")
        .and_then(|s| s.strip_suffix('}'))
        .ok_or_else(|| ExpressionError::MissingDelimiters(trimmed.to_string()))?
        .trim();
    if body.is_empty() {
        return Err(ExpressionError::Empty);
    }

    for (token, op) in [
        ("==", CompareOp::Eq),
        ("!=", CompareOp::Neq),
        ("<", CompareOp::Lt),
        (">", CompareOp::Gt),
    ] {
        if let Some((lhs, rhs)) = body.split_once(token) {
            let variable = lhs.trim().to_string();
            let literal = rhs.trim();
            if variable.is_empty() || literal.is_empty() {
                return Err(ExpressionError::BadLiteral(body.to_string()));
            }
            return Ok(VariableCondition {
                variable,
                op,
                value: parse_literal(literal)?,
            });
        }
    }

    // Bare variable — truthiness shorthand
    Ok(VariableCondition {
        variable: body.to_string(),
        op: CompareOp::Eq,
        value: crate::types::VariableValue::Bool(true),
    })
}

fn parse_literal(raw: &str) -> Result<crate::types::VariableValue, ExpressionError> {
    use crate::types::VariableValue;
    match raw {
        "true" => return Ok(VariableValue::Bool(true)),
        "false" => return Ok(VariableValue::Bool(false)),
        _ => {}
    }
    if let Ok(n) = raw.parse::<i64>() {
        return Ok(VariableValue::I64(n));
    }
    let quoted = (raw.starts_with('\'') && raw.ends_with('\'') && raw.len() >= 2)
        || (raw.starts_with('"') && raw.ends_with('"') && raw.len() >= 2);
    if quoted {
        return Ok(VariableValue::Str(raw[1..raw.len() - 1].to_string()));
    }
    Err(ExpressionError::BadLiteral(raw.to_string()))
}

fn attr(e: &BytesStart<'_>, name: &str) -> Result<Option<String>> {
    Ok(e.try_get_attribute(name)?
        .map(|a| a.unescape_value().map(|v| v.into_owned()))
        .transpose()?)
}

fn require_attr(e: &BytesStart<'_>, name: &str, element: &str) -> Result<String> {
    attr(e, name)?.ok_or_else(|| anyhow!("<{}> missing '{}' attribute", element, name))
}

#[derive(Default)]
struct RawPlanItem {
    id: String,
    definition_ref: String,
    entry_criteria: Vec<String>,
}

#[derive(Default)]
struct RawSentry {
    id: String,
    on_parts: Vec<(String, StandardEvent)>,
    condition: Option<String>,
}

/// Parse a CMMN XML document into a CaseModelDto. Only the first `<case>`
/// is imported.
pub fn parse_cmmn_xml(xml: &str) -> Result<CaseModelDto> {
    let mut reader = Reader::from_str(xml);

    let mut case_id: Option<String> = None;
    let mut case_name: Option<String> = None;
    let mut plan_model_id: Option<String> = None;
    let mut plan_items: Vec<RawPlanItem> = Vec::new();
    let mut sentries: Vec<RawSentry> = Vec::new();
    // Plan item definition id → (kind, name)
    let mut definitions: HashMap<String, (PlanItemKind, Option<String>)> = HashMap::new();

    enum Capture {
        Condition,
        StandardEvent,
    }

    let mut in_case = false;
    let mut current_item: Option<RawPlanItem> = None;
    let mut current_sentry: Option<RawSentry> = None;
    let mut pending_source: Option<String> = None;
    let mut capture: Option<Capture> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| anyhow!("XML parse error at byte {}: {}", reader.buffer_position(), e))?;
        match event {
            ev @ (Event::Start(_) | Event::Empty(_)) => {
                let self_closed = matches!(ev, Event::Empty(_));
                let e = match ev {
                    Event::Start(e) | Event::Empty(e) => e,
                    _ => unreachable!(),
                };
                let name = e.local_name();
                match name.as_ref() {
                    b"case" => {
                        if case_id.is_some() {
                            // Only the first case is imported.
                            break;
                        }
                        in_case = true;
                        case_id = Some(require_attr(&e, "id", "case")?);
                        case_name = attr(&e, "name")?;
                    }
                    b"casePlanModel" if in_case => {
                        plan_model_id = Some(require_attr(&e, "id", "casePlanModel")?);
                    }
                    b"planItem" if in_case => {
                        let item = RawPlanItem {
                            id: require_attr(&e, "id", "planItem")?,
                            definition_ref: require_attr(&e, "definitionRef", "planItem")?,
                            entry_criteria: Vec::new(),
                        };
                        // Self-closed items get no End event.
                        if self_closed {
                            plan_items.push(item);
                        } else {
                            current_item = Some(item);
                        }
                    }
                    b"entryCriterion" => {
                        if let Some(item) = current_item.as_mut() {
                            item.entry_criteria
                                .push(require_attr(&e, "sentryRef", "entryCriterion")?);
                        }
                    }
                    b"sentry" if in_case => {
                        let sentry = RawSentry {
                            id: require_attr(&e, "id", "sentry")?,
                            ..RawSentry::default()
                        };
                        if self_closed {
                            sentries.push(sentry);
                        } else {
                            current_sentry = Some(sentry);
                        }
                    }
                    b"planItemOnPart" => {
                        pending_source = Some(require_attr(&e, "sourceRef", "planItemOnPart")?);
                    }
                    b"standardEvent" => {
                        capture = Some(Capture::StandardEvent);
                    }
                    b"condition" => {
                        capture = Some(Capture::Condition);
                    }
                    b"humanTask" | b"milestone" | b"stage" if in_case => {
                        let kind = match name.as_ref() {
                            b"humanTask" => PlanItemKind::HumanTask,
                            b"milestone" => PlanItemKind::Milestone,
                            _ => PlanItemKind::Stage,
                        };
                        let id = require_attr(&e, "id", "plan item definition")?;
                        definitions.insert(id, (kind, attr(&e, "name")?));
                    }
                    _ => {}
                }
            }
            Event::Text(t) => {
                let text = t.unescape()?.trim().to_string();
                if text.is_empty() {
                    continue;
                }
                match capture {
                    Some(Capture::Condition) => {
                        if let Some(sentry) = current_sentry.as_mut() {
                            sentry.condition = Some(text);
                        }
                    }
                    Some(Capture::StandardEvent) => {
                        let event = match text.as_str() {
                            "complete" => StandardEvent::Complete,
                            "occur" => StandardEvent::Occur,
                            "terminate" => StandardEvent::Terminate,
                            other => return Err(anyhow!("Unknown standard event: {}", other)),
                        };
                        if let (Some(sentry), Some(source)) =
                            (current_sentry.as_mut(), pending_source.take())
                        {
                            sentry.on_parts.push((source, event));
                        }
                    }
                    None => {}
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"case" => in_case = false,
                b"planItem" => {
                    if let Some(item) = current_item.take() {
                        plan_items.push(item);
                    }
                }
                b"sentry" => {
                    if let Some(sentry) = current_sentry.take() {
                        sentries.push(sentry);
                    }
                }
                b"standardEvent" | b"condition" => capture = None,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    let case_id = case_id.ok_or_else(|| anyhow!("No <case> element found"))?;
    let plan_model_id = plan_model_id.ok_or_else(|| anyhow!("No <casePlanModel> element found"))?;

    let items = plan_items
        .into_iter()
        .map(|raw| {
            let (kind, name) = definitions.get(&raw.definition_ref).cloned().ok_or_else(|| {
                anyhow!(
                    "planItem {}: definitionRef '{}' not found",
                    raw.id,
                    raw.definition_ref
                )
            })?;
            Ok(match kind {
                PlanItemKind::HumanTask => PlanItemDto::HumanTask {
                    id: raw.id,
                    name,
                    entry_criteria: raw.entry_criteria,
                    parent: None,
                    required: false,
                },
                PlanItemKind::Milestone => PlanItemDto::Milestone {
                    id: raw.id,
                    name,
                    entry_criteria: raw.entry_criteria,
                    parent: None,
                    required: false,
                },
                PlanItemKind::Stage => PlanItemDto::Stage {
                    id: raw.id,
                    name,
                    entry_criteria: raw.entry_criteria,
                    parent: None,
                    required: false,
                },
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let sentries = sentries
        .into_iter()
        .map(|raw| {
            let if_part = raw
                .condition
                .map(|text| parse_expression(&text))
                .transpose()
                .map_err(|e| anyhow!("sentry {}: {}", raw.id, e))?;
            Ok(SentryDto {
                id: raw.id,
                on_parts: raw
                    .on_parts
                    .into_iter()
                    .map(|(source, event)| OnPartDto { source, event })
                    .collect(),
                if_part,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(CaseModelDto {
        id: case_id,
        name: case_name,
        plan_model_id,
        items,
        sentries,
    })
}

use super::dto::*;
use super::validate::validate_dto;
use crate::types::*;
use anyhow::{anyhow, Result};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Convert a validated CaseModelDto into an unversioned CaseDefinition.
///
/// `version`, `definition_id`, and `deployment_id` are placeholders here —
/// the Definition Store assigns them at deploy time. `content_hash` covers
/// the authored model and drives duplicate-deployment filtering.
pub fn build_definition(dto: &CaseModelDto) -> Result<CaseDefinition> {
    let errors = validate_dto(dto);
    if !errors.is_empty() {
        let msgs: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        return Err(anyhow!("Case model validation failed:\n{}", msgs.join("\n")));
    }

    let plan_items = dto
        .items
        .iter()
        .map(|item| {
            let kind = match item {
                PlanItemDto::HumanTask { .. } => PlanItemKind::HumanTask,
                PlanItemDto::Milestone { .. } => PlanItemKind::Milestone,
                PlanItemDto::Stage { .. } => PlanItemKind::Stage,
            };
            PlanItem {
                id: item.id().to_string(),
                name: item.name().unwrap_or(item.id()).to_string(),
                kind,
                parent: item.parent().map(str::to_string),
                entry_criteria: item.entry_criteria().to_vec(),
                required: item.required(),
            }
        })
        .collect();

    let sentries = dto
        .sentries
        .iter()
        .map(|sentry| Sentry {
            id: sentry.id.clone(),
            on_parts: sentry
                .on_parts
                .iter()
                .map(|p| OnPart {
                    source: p.source.clone(),
                    event: p.event,
                })
                .collect(),
            if_part: sentry.if_part.clone().map(|condition| IfPart { condition }),
        })
        .collect();

    Ok(CaseDefinition {
        definition_id: Uuid::nil(),
        key: dto.id.clone(),
        name: dto.name.clone().unwrap_or_else(|| dto.id.clone()),
        version: 0,
        deployment_id: Uuid::nil(),
        content_hash: content_hash(dto)?,
        plan_model_id: dto.plan_model_id.clone(),
        plan_items,
        sentries,
    })
}

/// SHA-256 over the canonical JSON rendering of the authored model.
pub fn content_hash(dto: &CaseModelDto) -> Result<[u8; 32]> {
    let canonical = serde_json::to_vec(dto)?;
    let mut hasher = Sha256::new();
    hasher.update(&canonical);
    Ok(hasher.finalize().into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dto() -> CaseModelDto {
        CaseModelDto {
            id: "Case_1".to_string(),
            name: None,
            plan_model_id: "CasePlanModel_1".to_string(),
            items: vec![PlanItemDto::HumanTask {
                id: "PlanItem_1".to_string(),
                name: Some("Task 1".to_string()),
                entry_criteria: vec![],
                parent: None,
                required: false,
            }],
            sentries: vec![],
        }
    }

    /// T-BUILD-1: build produces placeholders plus a stable hash.
    #[test]
    fn t_build_1_placeholders_and_hash() {
        let definition = build_definition(&dto()).unwrap();
        assert_eq!(definition.version, 0);
        assert!(definition.definition_id.is_nil());
        assert_eq!(definition.key, "Case_1");
        assert_eq!(definition.name, "Case_1", "name falls back to the key");
        assert_eq!(definition.plan_items.len(), 1);
        assert_eq!(definition.content_hash, content_hash(&dto()).unwrap());
    }

    /// T-BUILD-2: different models hash differently.
    #[test]
    fn t_build_2_hash_differs() {
        let mut changed = dto();
        changed.items.push(PlanItemDto::Milestone {
            id: "PlanItem_2".to_string(),
            name: None,
            entry_criteria: vec![],
            parent: None,
            required: false,
        });
        assert_ne!(
            content_hash(&dto()).unwrap(),
            content_hash(&changed).unwrap()
        );
    }

    /// T-BUILD-3: an invalid model is rejected with every rule listed.
    #[test]
    fn t_build_3_invalid_rejected() {
        let mut bad = dto();
        if let PlanItemDto::HumanTask { entry_criteria, .. } = &mut bad.items[0] {
            entry_criteria.push("Sentry_missing".to_string());
        }
        let result = build_definition(&bad);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("[C3]"));
    }
}

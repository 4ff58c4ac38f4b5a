use serde::{Deserialize, Serialize};

use super::domain::{FactValue, FieldPath, Rule};
use super::evaluation::{Delta, Gap, Truth, Verdict};

/// Headline of an explanation, mapped to phrasing by the localization collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryKind {
    Eligible,
    Ineligible,
    Pending,
}

impl From<Truth> for SummaryKind {
    fn from(truth: Truth) -> Self {
        match truth {
            Truth::Satisfied => SummaryKind::Eligible,
            Truth::Failed => SummaryKind::Ineligible,
            Truth::Unknown => SummaryKind::Pending,
        }
    }
}

/// One actionable line of a gap, flattened for templates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GapItem {
    MissingField {
        field: FieldPath,
    },
    Condition {
        rule_id: String,
        field: FieldPath,
        actual: FactValue,
        required: FactValue,
        delta: Delta,
        negated: bool,
    },
}

/// Language-neutral explanation of one verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplanationRecord {
    pub summary_kind: SummaryKind,
    pub matched_rule_ids: Vec<String>,
    pub failed_rule_ids: Vec<String>,
    pub unknown_rule_ids: Vec<String>,
    pub gap_items: Vec<GapItem>,
}

pub fn build_explanation(verdict: &Verdict, gap: Option<&Gap>) -> ExplanationRecord {
    let gap_items = gap
        .map(|gap| {
            let missing = gap
                .missing_fields
                .iter()
                .map(|field| GapItem::MissingField {
                    field: field.clone(),
                });
            let conditions = gap
                .failed_conditions
                .iter()
                .map(|condition| GapItem::Condition {
                    rule_id: condition.rule.rule_id(),
                    field: condition.rule.field.clone(),
                    actual: condition.actual.clone(),
                    required: condition.required.clone(),
                    delta: condition.delta.clone(),
                    negated: condition.negated,
                });
            missing.chain(conditions).collect()
        })
        .unwrap_or_default();

    ExplanationRecord {
        summary_kind: SummaryKind::from(verdict.truth),
        matched_rule_ids: rule_ids(&verdict.matched),
        failed_rule_ids: rule_ids(&verdict.failed),
        unknown_rule_ids: rule_ids(&verdict.unknown),
        gap_items,
    }
}

fn rule_ids(rules: &[Rule]) -> Vec<String> {
    let mut ids: Vec<String> = Vec::with_capacity(rules.len());
    for id in rules.iter().map(Rule::rule_id) {
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    ids
}

/// BCP-47 style language tag handed to the renderer (`hi-IN`, `ta`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LanguageTag(pub String);

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("no templates available for language `{0}`")]
    UnsupportedLanguage(String),
    #[error("template for `{0}` is missing")]
    MissingTemplate(String),
}

/// Localization collaborator that turns an explanation record into user-facing text.
pub trait ExplanationRenderer: Send + Sync {
    fn render(
        &self,
        record: &ExplanationRecord,
        language: &LanguageTag,
    ) -> Result<String, RenderError>;
}

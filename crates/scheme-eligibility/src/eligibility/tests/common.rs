use std::sync::Arc;

use axum::response::Response;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use crate::eligibility::catalog::{load_snapshot_at, CatalogHandle, CatalogSnapshot, LoadPolicy};
use crate::eligibility::domain::{
    BenefitTier, CriteriaExpr, FactTree, FactValue, Operator, Rule, SchemeDefinition, SchemeId,
    SchemeMetadata,
};
use crate::eligibility::service::EligibilityService;

pub(super) fn rule(field: &str, operator: Operator, value: impl Into<FactValue>) -> CriteriaExpr {
    CriteriaExpr::Rule(Rule::new(field, operator, value))
}

pub(super) fn weighted(
    field: &str,
    operator: Operator,
    value: impl Into<FactValue>,
    weight: f64,
) -> CriteriaExpr {
    CriteriaExpr::Rule(Rule::new(field, operator, value).with_weight(weight))
}

pub(super) fn reserved_categories() -> FactValue {
    FactValue::list(["sc", "st", "obc"])
}

/// `AND(age >= 18, category in [sc, st, obc])`, both weight 1.
pub(super) fn adult_reserved_category() -> CriteriaExpr {
    CriteriaExpr::all([
        rule("age", Operator::Gte, 18),
        rule("category", Operator::In, reserved_categories()),
    ])
}

pub(super) fn minor_profile() -> FactTree {
    FactTree::default().with_fact("age", 17)
}

pub(super) fn farmer_profile() -> FactTree {
    FactTree::default()
        .with_fact("age", 42)
        .with_fact("category", "obc")
        .with_fact("occupation", "farmer")
        .with_fact("land.hectares", 1.5)
        .with_fact("income.annual", 96000)
        .with_fact("location.state", "Bihar")
        .with_fact("has_bank_account", true)
}

pub(super) fn definition(
    id: &str,
    criteria: CriteriaExpr,
    benefit: BenefitTier,
) -> SchemeDefinition {
    SchemeDefinition {
        id: SchemeId::new(id),
        criteria,
        metadata: SchemeMetadata::named(id).with_benefit(benefit),
    }
}

/// Catalog mixing an eligible, a pending, and an ineligible scheme for [`farmer_profile`].
pub(super) fn catalog_definitions() -> Vec<SchemeDefinition> {
    vec![
        definition(
            "PM-KISAN",
            CriteriaExpr::all([
                rule("occupation", Operator::Eq, "farmer"),
                rule("land.hectares", Operator::Lte, 2),
                CriteriaExpr::negate(rule("is_income_tax_payer", Operator::Eq, true)),
            ]),
            BenefitTier::High,
        ),
        definition(
            "MGNREGA",
            CriteriaExpr::all([
                rule("age", Operator::Gte, 18),
                rule("location.state", Operator::In, FactValue::list(["Bihar", "Odisha"])),
            ]),
            BenefitTier::Medium,
        ),
        definition(
            "PMAY-G",
            CriteriaExpr::all([
                rule("income.annual", Operator::Lte, 300000),
                rule("owns_pucca_house", Operator::Eq, false),
            ]),
            BenefitTier::High,
        ),
        definition(
            "IGNOAPS",
            CriteriaExpr::all([
                rule("age", Operator::Gte, 60),
                rule("income.annual", Operator::Lte, 120000),
            ]),
            BenefitTier::Low,
        ),
    ]
}

pub(super) fn fixed_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 15, 9, 30, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn snapshot(version: u64, definitions: Vec<SchemeDefinition>) -> CatalogSnapshot {
    load_snapshot_at(definitions, version, LoadPolicy::Strict, fixed_time())
        .expect("fixture catalog is well formed")
        .snapshot
}

pub(super) fn build_service(policy: LoadPolicy) -> Arc<EligibilityService> {
    let handle = Arc::new(CatalogHandle::new(snapshot(1, catalog_definitions())));
    Arc::new(EligibilityService::new(handle, policy))
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

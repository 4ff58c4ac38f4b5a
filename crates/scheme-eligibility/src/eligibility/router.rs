use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;

use super::catalog::CatalogError;
use super::domain::{CriteriaExpr, FactTree};
use super::evaluation::GapError;
use super::service::{CriteriaError, EligibilityService};

/// Body shared by the single-criteria endpoints.
#[derive(Debug, Deserialize)]
pub struct CriteriaRequest {
    pub facts: FactTree,
    pub criteria: CriteriaExpr,
}

#[derive(Debug, Deserialize)]
pub struct MatchRequest {
    pub facts: FactTree,
    #[serde(default)]
    pub include_rejections: bool,
}

/// Router builder exposing the eligibility engine over HTTP.
pub fn eligibility_router(service: Arc<EligibilityService>) -> Router {
    Router::new()
        .route("/api/v1/eligibility/evaluate", post(evaluate_handler))
        .route("/api/v1/eligibility/gap", post(gap_handler))
        .route("/api/v1/eligibility/matches", post(matches_handler))
        .route(
            "/api/v1/catalog",
            get(catalog_handler).put(reload_handler),
        )
        .with_state(service)
}

pub(crate) async fn evaluate_handler(
    State(service): State<Arc<EligibilityService>>,
    axum::Json(request): axum::Json<CriteriaRequest>,
) -> Response {
    match service.evaluate(&request.facts, &request.criteria) {
        Ok(outcome) => (StatusCode::OK, axum::Json(outcome)).into_response(),
        Err(error) => criteria_error_response(error),
    }
}

pub(crate) async fn gap_handler(
    State(service): State<Arc<EligibilityService>>,
    axum::Json(request): axum::Json<CriteriaRequest>,
) -> Response {
    match service.compute_gap(&request.facts, &request.criteria) {
        Ok(gap) => (StatusCode::OK, axum::Json(gap)).into_response(),
        Err(error) => criteria_error_response(error),
    }
}

fn criteria_error_response(error: CriteriaError) -> Response {
    let status = match error {
        CriteriaError::Shape(_) => StatusCode::UNPROCESSABLE_ENTITY,
        CriteriaError::Gap(GapError::MissingGapPrecondition) => StatusCode::CONFLICT,
    };
    let payload = json!({
        "error": error.to_string(),
    });
    (status, axum::Json(payload)).into_response()
}

pub(crate) async fn matches_handler(
    State(service): State<Arc<EligibilityService>>,
    axum::Json(request): axum::Json<MatchRequest>,
) -> Response {
    let report = service.find_matches(&request.facts);
    let report = if request.include_rejections {
        report
    } else {
        report.without_rejections()
    };
    (StatusCode::OK, axum::Json(report)).into_response()
}

pub(crate) async fn catalog_handler(State(service): State<Arc<EligibilityService>>) -> Response {
    (StatusCode::OK, axum::Json(service.snapshot_summary())).into_response()
}

pub(crate) async fn reload_handler(
    State(service): State<Arc<EligibilityService>>,
    body: String,
) -> Response {
    match service.reload(&body) {
        Ok(report) => (StatusCode::OK, axum::Json(report)).into_response(),
        Err(CatalogError::Rejected(rejected)) => {
            let payload = json!({
                "error": "catalog rejected",
                "rejected": rejected,
            });
            (StatusCode::UNPROCESSABLE_ENTITY, axum::Json(payload)).into_response()
        }
        Err(CatalogError::Document(error)) => {
            let payload = json!({
                "error": error.to_string(),
            });
            (StatusCode::BAD_REQUEST, axum::Json(payload)).into_response()
        }
        Err(other @ CatalogError::StaleSnapshot { .. }) => {
            let payload = json!({
                "error": other.to_string(),
            });
            (StatusCode::CONFLICT, axum::Json(payload)).into_response()
        }
    }
}

use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use super::catalog::{
    load_snapshot, parse_definitions, validate_criteria, CatalogError, CatalogHandle,
    CatalogSnapshot, DataShapeError, LoadPolicy, RejectedScheme, SnapshotSummary,
};
use super::domain::{CriteriaExpr, FactTree};
use super::evaluation::{compute_gap, evaluate, Gap, GapError, Verdict};
use super::explanation::{build_explanation, ExplanationRecord};
use super::matcher::{find_matches, MatchReport};

/// Service composing the catalog handle with the stateless evaluators.
pub struct EligibilityService {
    catalog: Arc<CatalogHandle>,
    policy: LoadPolicy,
}

/// Verdict of an ad-hoc criteria evaluation with its gap and explanation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationOutcome {
    pub verdict: Verdict,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gap: Option<Gap>,
    pub explanation: ExplanationRecord,
}

/// Why an ad-hoc criteria request could not be answered.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CriteriaError {
    #[error("criteria rejected: {0}")]
    Shape(#[from] DataShapeError),
    #[error(transparent)]
    Gap(#[from] GapError),
}

/// Result of replacing the catalog.
#[derive(Debug, Clone, Serialize)]
pub struct ReloadReport {
    pub snapshot: SnapshotSummary,
    pub rejected: Vec<RejectedScheme>,
}

impl EligibilityService {
    pub fn new(catalog: Arc<CatalogHandle>, policy: LoadPolicy) -> Self {
        Self { catalog, policy }
    }

    pub fn catalog(&self) -> Arc<CatalogSnapshot> {
        self.catalog.current()
    }

    pub fn snapshot_summary(&self) -> SnapshotSummary {
        self.catalog.current().summary()
    }

    /// Evaluate a single criteria expression, attaching the gap when it is not satisfied.
    /// Ad-hoc criteria pass the same structural checks as catalog entries first.
    pub fn evaluate(
        &self,
        facts: &FactTree,
        criteria: &CriteriaExpr,
    ) -> Result<EvaluationOutcome, CriteriaError> {
        validate_criteria(criteria)?;
        let verdict = evaluate(criteria, facts);
        let gap = if verdict.is_eligible() {
            None
        } else {
            compute_gap(criteria, facts).ok()
        };
        let explanation = build_explanation(&verdict, gap.as_ref());

        Ok(EvaluationOutcome {
            verdict,
            gap,
            explanation,
        })
    }

    pub fn compute_gap(
        &self,
        facts: &FactTree,
        criteria: &CriteriaExpr,
    ) -> Result<Gap, CriteriaError> {
        validate_criteria(criteria)?;
        Ok(compute_gap(criteria, facts)?)
    }

    /// Match a profile against the snapshot current at call time.
    pub fn find_matches(&self, facts: &FactTree) -> MatchReport {
        let snapshot = self.catalog.current();
        find_matches(facts, &snapshot)
    }

    /// Parse, validate, and publish a new catalog under the next version. Concurrent reloads
    /// are serialized by the catalog handle and publish consecutive versions.
    pub fn reload(&self, document: &str) -> Result<ReloadReport, CatalogError> {
        let parsed = parse_definitions(document)?;
        if self.policy == LoadPolicy::Strict && !parsed.rejected.is_empty() {
            return Err(CatalogError::Rejected(parsed.rejected));
        }

        let policy = self.policy;
        let (published, rejected) = self.catalog.publish_next(|version| {
            let load = load_snapshot(parsed.definitions, version, policy)?;
            let mut rejected = parsed.rejected;
            rejected.extend(load.rejected);
            Ok((load.snapshot, rejected))
        })?;
        info!(
            version = published.version(),
            schemes = published.len(),
            rejected = rejected.len(),
            "catalog reloaded"
        );

        Ok(ReloadReport {
            snapshot: published.summary(),
            rejected,
        })
    }
}

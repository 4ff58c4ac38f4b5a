//! Eligibility decision engine for government welfare schemes.
//!
//! Profiles arrive as [`FactTree`]s and schemes as [`CriteriaExpr`] trees inside a versioned
//! [`CatalogSnapshot`]. Every evaluation entry point is a pure function of its arguments; the
//! only shared state is the [`CatalogHandle`], which swaps whole snapshots.

pub mod catalog;
pub mod domain;
pub(crate) mod evaluation;
pub mod explanation;
pub mod facts;
pub mod matcher;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use catalog::{
    load_snapshot, load_snapshot_at, parse_definitions, validate_criteria, CatalogEntry,
    CatalogError, CatalogHandle, CatalogLoad, CatalogSnapshot, DataShapeError, LoadPolicy,
    ParsedDefinitions, RejectedScheme, SnapshotSummary, MAX_CRITERIA_DEPTH,
};
pub use domain::{
    BenefitTier, CriteriaExpr, FactTree, FactValue, FieldPath, Operator, Rule, SchemeDefinition,
    SchemeId, SchemeMetadata,
};
pub use evaluation::{
    compute_gap, evaluate, evaluate_rule, Delta, FailedCondition, Gap, GapError, Truth, Verdict,
};
pub use explanation::{
    build_explanation, ExplanationRecord, ExplanationRenderer, GapItem, LanguageTag, RenderError,
    SummaryKind,
};
pub use facts::{resolve, Resolved};
pub use matcher::{find_matches, rank_order, CatalogOutcome, MatchReport, MatchStatus, SchemeMatch};
pub use router::eligibility_router;
pub use service::{CriteriaError, EligibilityService, EvaluationOutcome, ReloadReport};

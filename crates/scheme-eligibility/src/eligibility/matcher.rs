use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::catalog::CatalogSnapshot;
use super::domain::{BenefitTier, FactTree, SchemeId};
use super::evaluation::{compute_gap, evaluate, Gap, Truth, Verdict};
use super::explanation::{build_explanation, ExplanationRecord};

/// How a match should be presented; pending matches are never shown as confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Eligible,
    Pending,
    Ineligible,
}

impl MatchStatus {
    pub const fn label(self) -> &'static str {
        match self {
            MatchStatus::Eligible => "eligible",
            MatchStatus::Pending => "pending",
            MatchStatus::Ineligible => "ineligible",
        }
    }
}

impl From<Truth> for MatchStatus {
    fn from(truth: Truth) -> Self {
        match truth {
            Truth::Satisfied => MatchStatus::Eligible,
            Truth::Unknown => MatchStatus::Pending,
            Truth::Failed => MatchStatus::Ineligible,
        }
    }
}

/// Evaluation of one scheme for one profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemeMatch {
    pub scheme_id: SchemeId,
    pub scheme_name: String,
    pub status: MatchStatus,
    pub verdict: Verdict,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gap: Option<Gap>,
    pub rank_priority: BenefitTier,
    pub explanation: ExplanationRecord,
}

/// Three-way summary of a report, keeping pending schemes apart from both outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogOutcome {
    Eligible { count: usize },
    PendingOnly { count: usize },
    NoMatch,
}

/// Ranked matches for one profile, tagged with the snapshot they were computed against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchReport {
    pub snapshot_version: u64,
    pub snapshot_taken_at: DateTime<Utc>,
    matches: Vec<SchemeMatch>,
    rejections: Vec<SchemeMatch>,
}

impl MatchReport {
    /// Eligible and pending schemes, best first.
    pub fn matches(&self) -> &[SchemeMatch] {
        &self.matches
    }

    /// Schemes the profile does not qualify for, with their gaps.
    pub fn rejections(&self) -> &[SchemeMatch] {
        &self.rejections
    }

    pub fn eligible(&self) -> impl Iterator<Item = &SchemeMatch> {
        self.matches
            .iter()
            .filter(|item| item.status == MatchStatus::Eligible)
    }

    pub fn pending(&self) -> impl Iterator<Item = &SchemeMatch> {
        self.matches
            .iter()
            .filter(|item| item.status == MatchStatus::Pending)
    }

    pub fn outcome(&self) -> CatalogOutcome {
        let eligible = self.eligible().count();
        if eligible > 0 {
            return CatalogOutcome::Eligible { count: eligible };
        }
        match self.pending().count() {
            0 => CatalogOutcome::NoMatch,
            count => CatalogOutcome::PendingOnly { count },
        }
    }

    pub fn without_rejections(mut self) -> Self {
        self.rejections.clear();
        self
    }

    /// Reconcile a cached report with a freshly computed one. The report computed against
    /// the newer snapshot wins outright; reports are never merged.
    pub fn supersede(self, fresh: MatchReport) -> MatchReport {
        if fresh.snapshot_version >= self.snapshot_version {
            fresh
        } else {
            self
        }
    }
}

/// Evaluate every active scheme in `snapshot` for one profile and rank the results.
pub fn find_matches(facts: &FactTree, snapshot: &CatalogSnapshot) -> MatchReport {
    let mut matches = Vec::new();
    let mut rejections = Vec::new();

    for (scheme_id, entry) in snapshot.schemes() {
        if !entry.metadata.active {
            continue;
        }

        let verdict = evaluate(&entry.criteria, facts);
        let gap = if verdict.is_eligible() {
            None
        } else {
            compute_gap(&entry.criteria, facts).ok()
        };
        let explanation = build_explanation(&verdict, gap.as_ref());

        let scheme_match = SchemeMatch {
            scheme_id: scheme_id.clone(),
            scheme_name: entry.metadata.name.clone(),
            status: MatchStatus::from(verdict.truth),
            verdict,
            gap,
            rank_priority: entry.metadata.benefit,
            explanation,
        };

        if scheme_match.status == MatchStatus::Ineligible {
            rejections.push(scheme_match);
        } else {
            matches.push(scheme_match);
        }
    }

    matches.sort_by(rank_order);
    rejections.sort_by(rank_order);

    debug!(
        snapshot_version = snapshot.version(),
        matches = matches.len(),
        rejections = rejections.len(),
        "profile matched against catalog"
    );

    MatchReport {
        snapshot_version: snapshot.version(),
        snapshot_taken_at: snapshot.taken_at(),
        matches,
        rejections,
    }
}

/// Score descending, benefit tier descending, scheme id ascending.
pub fn rank_order(left: &SchemeMatch, right: &SchemeMatch) -> Ordering {
    right
        .verdict
        .score
        .total_cmp(&left.verdict.score)
        .then_with(|| right.rank_priority.cmp(&left.rank_priority))
        .then_with(|| left.scheme_id.cmp(&right.scheme_id))
}

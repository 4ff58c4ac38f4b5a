mod gap;
mod rules;

pub use gap::{compute_gap, Delta, FailedCondition, Gap, GapError};
pub use rules::evaluate_rule;

use std::ops::Not;

use serde::{Deserialize, Serialize};

use super::domain::{CriteriaExpr, FactTree, Rule};

/// Kleene truth value. The ordering `Failed < Unknown < Satisfied` ranks how eligible an
/// outcome is, which makes AND a minimum and OR a maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Truth {
    Failed,
    Unknown,
    Satisfied,
}

impl Truth {
    pub const fn from_bool(value: bool) -> Self {
        if value {
            Truth::Satisfied
        } else {
            Truth::Failed
        }
    }

    pub fn and(self, other: Truth) -> Truth {
        self.min(other)
    }

    pub fn or(self, other: Truth) -> Truth {
        self.max(other)
    }

    pub const fn label(self) -> &'static str {
        match self {
            Truth::Failed => "failed",
            Truth::Unknown => "unknown",
            Truth::Satisfied => "satisfied",
        }
    }
}

impl Not for Truth {
    type Output = Truth;

    fn not(self) -> Truth {
        match self {
            Truth::Failed => Truth::Satisfied,
            Truth::Unknown => Truth::Unknown,
            Truth::Satisfied => Truth::Failed,
        }
    }
}

/// Full result of evaluating one criteria expression against one fact tree.
///
/// Rules are sorted into `matched`/`failed`/`unknown` by their contribution to the
/// verdict, so a rule under a `not` that did not hold lands in `matched`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub truth: Truth,
    pub score: f64,
    pub matched: Vec<Rule>,
    pub failed: Vec<Rule>,
    pub unknown: Vec<Rule>,
}

impl Verdict {
    pub fn is_eligible(&self) -> bool {
        self.truth == Truth::Satisfied
    }

    pub fn is_pending(&self) -> bool {
        self.truth == Truth::Unknown
    }
}

#[derive(Default)]
struct Tally {
    satisfied_weight: f64,
    total_weight: f64,
    matched: Vec<Rule>,
    failed: Vec<Rule>,
    unknown: Vec<Rule>,
}

impl Tally {
    fn record(&mut self, rule: &Rule, contribution: Truth) {
        if rule.scores() {
            self.total_weight += rule.weight;
            if contribution == Truth::Satisfied {
                self.satisfied_weight += rule.weight;
            }
        }

        let bucket = match contribution {
            Truth::Satisfied => &mut self.matched,
            Truth::Failed => &mut self.failed,
            Truth::Unknown => &mut self.unknown,
        };
        bucket.push(rule.clone());
    }
}

/// Evaluate `expr` against `facts`. Pure: identical inputs always yield an identical verdict.
pub fn evaluate(expr: &CriteriaExpr, facts: &FactTree) -> Verdict {
    let mut tally = Tally::default();
    let truth = walk(expr, facts, false, &mut tally).unwrap_or(Truth::Satisfied);

    let score = if tally.total_weight > 0.0 {
        tally.satisfied_weight / tally.total_weight
    } else if truth == Truth::Satisfied {
        1.0
    } else {
        0.0
    };

    Verdict {
        truth,
        score,
        matched: tally.matched,
        failed: tally.failed,
        unknown: tally.unknown,
    }
}

// An empty `and` holds vacuously and an empty `or` has no branch to satisfy. This differs
// from a combinator whose children are all informational, which stays neutral.
fn empty_combinator(expr: &CriteriaExpr) -> Truth {
    match expr {
        CriteriaExpr::Or(_) => Truth::Failed,
        _ => Truth::Satisfied,
    }
}

/// Truth of `expr` without scoring or rule bookkeeping. `None` means the subtree only holds
/// informational (zero-weight) rules and is neutral for its parent.
pub(crate) fn truth_of(expr: &CriteriaExpr, facts: &FactTree) -> Option<Truth> {
    match expr {
        CriteriaExpr::Rule(rule) if !rule.scores() => None,
        CriteriaExpr::Rule(rule) => Some(evaluate_rule(rule, facts)),
        CriteriaExpr::And(children) | CriteriaExpr::Or(children) if children.is_empty() => {
            Some(empty_combinator(expr))
        }
        CriteriaExpr::And(children) => children
            .iter()
            .filter_map(|child| truth_of(child, facts))
            .reduce(Truth::and),
        CriteriaExpr::Or(children) => children
            .iter()
            .filter_map(|child| truth_of(child, facts))
            .reduce(Truth::or),
        CriteriaExpr::Not(child) => truth_of(child, facts).map(Not::not),
    }
}

// Children are never short-circuited: every leaf must reach the tally.
fn walk(expr: &CriteriaExpr, facts: &FactTree, negated: bool, tally: &mut Tally) -> Option<Truth> {
    match expr {
        CriteriaExpr::Rule(rule) => {
            let outcome = evaluate_rule(rule, facts);
            let contribution = if negated { !outcome } else { outcome };
            tally.record(rule, contribution);
            rule.scores().then_some(outcome)
        }
        CriteriaExpr::And(children) | CriteriaExpr::Or(children) if children.is_empty() => {
            Some(empty_combinator(expr))
        }
        CriteriaExpr::And(children) => children
            .iter()
            .filter_map(|child| walk(child, facts, negated, tally))
            .reduce(Truth::and),
        CriteriaExpr::Or(children) => children
            .iter()
            .filter_map(|child| walk(child, facts, negated, tally))
            .reduce(Truth::or),
        CriteriaExpr::Not(child) => walk(child, facts, !negated, tally).map(Not::not),
    }
}

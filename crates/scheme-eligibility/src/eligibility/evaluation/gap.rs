use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use super::super::domain::{CriteriaExpr, FactTree, FactValue, FieldPath, Operator, Rule};
use super::super::facts::{resolve, Resolved};
use super::rules::ordering;
use super::{truth_of, Truth};

/// Corrections separating a profile from eligibility under one criteria expression.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Gap {
    pub missing_fields: Vec<FieldPath>,
    pub failed_conditions: Vec<FailedCondition>,
}

impl Gap {
    pub fn is_empty(&self) -> bool {
        self.missing_fields.is_empty() && self.failed_conditions.is_empty()
    }
}

/// One rule the profile currently does not meet. `negated` marks conditions reached
/// through a `not`, where the profile must stop matching `rule` rather than start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedCondition {
    pub rule: Rule,
    pub actual: FactValue,
    pub required: FactValue,
    pub delta: Delta,
    #[serde(default)]
    pub negated: bool,
}

/// Distance between the actual and the required value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Delta {
    /// `actual - required`; negative for a shortfall against a lower bound.
    Numeric { value: f64 },
    /// `actual - required` in whole days.
    Days { value: i64 },
    /// Closest value the rule's accepted set offers.
    Nearest { accepted: FactValue },
    Mismatch,
}

impl Delta {
    fn magnitude(&self) -> f64 {
        match self {
            Delta::Numeric { value } => value.abs(),
            Delta::Days { value } => value.unsigned_abs() as f64,
            Delta::Nearest { .. } | Delta::Mismatch => 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GapError {
    #[error("gap requested for a satisfied verdict; the caller must only ask for gaps of unmet criteria")]
    MissingGapPrecondition,
}

/// Compute the gap for a profile that does not satisfy `expr`.
pub fn compute_gap(expr: &CriteriaExpr, facts: &FactTree) -> Result<Gap, GapError> {
    if truth_of(expr, facts).unwrap_or(Truth::Satisfied) == Truth::Satisfied {
        return Err(GapError::MissingGapPrecondition);
    }

    let items = branch_gap(expr, facts, false).unwrap_or_default();

    let mut gap = Gap::default();
    for item in items {
        match item {
            GapItem::Missing { field, .. } => {
                if !gap.missing_fields.contains(&field) {
                    gap.missing_fields.push(field);
                }
            }
            GapItem::Failed(condition) => {
                let duplicate = gap.failed_conditions.iter().any(|existing| {
                    existing.negated == condition.negated
                        && existing.rule.rule_id() == condition.rule.rule_id()
                });
                if !duplicate {
                    gap.failed_conditions.push(condition);
                }
            }
        }
    }

    Ok(gap)
}

enum GapItem {
    Missing { field: FieldPath, weight: f64 },
    Failed(FailedCondition),
}

impl GapItem {
    fn weight(&self) -> f64 {
        match self {
            GapItem::Missing { weight, .. } => *weight,
            GapItem::Failed(condition) => condition.rule.weight,
        }
    }

    fn magnitude(&self) -> f64 {
        match self {
            GapItem::Missing { .. } => 0.0,
            GapItem::Failed(condition) => condition.delta.magnitude(),
        }
    }
}

/// Gap items for `expr` under the given polarity, or `None` when the node already holds.
fn branch_gap(expr: &CriteriaExpr, facts: &FactTree, negated: bool) -> Option<Vec<GapItem>> {
    let truth = truth_of(expr, facts)?;
    let effective = if negated { !truth } else { truth };
    if effective == Truth::Satisfied {
        return None;
    }

    match expr {
        CriteriaExpr::Rule(rule) => Some(vec![leaf_gap(rule, facts, negated)]),
        CriteriaExpr::Not(child) => branch_gap(child, facts, !negated),
        CriteriaExpr::And(children) | CriteriaExpr::Or(children) => {
            let conjunctive = matches!(expr, CriteriaExpr::And(_)) != negated;
            let branches = children
                .iter()
                .filter_map(|child| branch_gap(child, facts, negated));

            if conjunctive {
                Some(branches.flatten().collect())
            } else {
                Some(closest_branch(branches).unwrap_or_default())
            }
        }
    }
}

// Fewest items, then lightest, then smallest numeric distance; earlier branches win ties.
fn closest_branch(branches: impl Iterator<Item = Vec<GapItem>>) -> Option<Vec<GapItem>> {
    branches.reduce(|best, candidate| {
        if branch_cost(&candidate).cmp_to(&branch_cost(&best)) == Ordering::Less {
            candidate
        } else {
            best
        }
    })
}

struct BranchCost {
    items: usize,
    weight: f64,
    magnitude: f64,
}

impl BranchCost {
    fn cmp_to(&self, other: &BranchCost) -> Ordering {
        self.items
            .cmp(&other.items)
            .then_with(|| self.weight.total_cmp(&other.weight))
            .then_with(|| self.magnitude.total_cmp(&other.magnitude))
    }
}

fn branch_cost(items: &[GapItem]) -> BranchCost {
    BranchCost {
        items: items.len(),
        weight: items.iter().map(GapItem::weight).sum(),
        magnitude: items.iter().map(GapItem::magnitude).sum(),
    }
}

fn leaf_gap(rule: &Rule, facts: &FactTree, negated: bool) -> GapItem {
    let actual = match resolve(facts, &rule.field) {
        Resolved::Value(actual) => actual,
        Resolved::Unknown => {
            return GapItem::Missing {
                field: rule.field.clone(),
                weight: rule.weight,
            }
        }
    };

    GapItem::Failed(FailedCondition {
        rule: rule.clone(),
        actual: actual.clone(),
        required: rule.value.clone(),
        delta: delta_for(rule.operator, actual, &rule.value, negated),
        negated,
    })
}

fn delta_for(operator: Operator, actual: &FactValue, required: &FactValue, negated: bool) -> Delta {
    match (actual, required) {
        (FactValue::Number(actual), FactValue::Number(required))
            if operator.is_ordering() || operator == Operator::Eq || operator == Operator::Ne =>
        {
            Delta::Numeric {
                value: actual - required,
            }
        }
        (FactValue::Date(actual), FactValue::Date(required))
            if operator.is_ordering() || operator == Operator::Eq || operator == Operator::Ne =>
        {
            Delta::Days {
                value: actual.signed_duration_since(*required).num_days(),
            }
        }
        (_, FactValue::List(members)) if operator == Operator::In && !negated => {
            nearest_member(actual, members)
                .map(|accepted| Delta::Nearest {
                    accepted: accepted.clone(),
                })
                .unwrap_or(Delta::Mismatch)
        }
        _ => Delta::Mismatch,
    }
}

fn nearest_member<'a>(actual: &FactValue, members: &'a [FactValue]) -> Option<&'a FactValue> {
    if let FactValue::Number(value) = actual {
        let closest = members
            .iter()
            .filter_map(|member| member.as_number().map(|number| (member, (number - value).abs())))
            .reduce(|best, candidate| if candidate.1 < best.1 { candidate } else { best });
        if let Some((member, _)) = closest {
            return Some(member);
        }
    }

    if let FactValue::Date(_) = actual {
        if let Some(member) = members
            .iter()
            .filter(|member| ordering(actual, member).is_some())
            .min_by_key(|member| match (actual, member) {
                (FactValue::Date(actual), FactValue::Date(member)) => {
                    actual.signed_duration_since(*member).num_days().unsigned_abs()
                }
                _ => u64::MAX,
            })
        {
            return Some(member);
        }
    }

    members.first()
}

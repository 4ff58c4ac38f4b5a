use std::cmp::Ordering;
use std::mem::discriminant;

use super::super::domain::{FactTree, FactValue, Operator, Rule};
use super::super::facts::{resolve, Resolved};
use super::Truth;

/// Evaluate one leaf rule. Unknown is reserved for absent facts; every type mismatch
/// degrades to Failed.
pub fn evaluate_rule(rule: &Rule, facts: &FactTree) -> Truth {
    match resolve(facts, &rule.field) {
        Resolved::Unknown => Truth::Unknown,
        Resolved::Value(actual) => Truth::from_bool(compare(actual, rule.operator, &rule.value)),
    }
}

pub(crate) fn compare(actual: &FactValue, operator: Operator, expected: &FactValue) -> bool {
    match operator {
        Operator::Eq => actual == expected,
        Operator::Ne => same_kind(actual, expected) && actual != expected,
        Operator::Gt => ordering(actual, expected) == Some(Ordering::Greater),
        Operator::Lt => ordering(actual, expected) == Some(Ordering::Less),
        Operator::Gte => matches!(
            ordering(actual, expected),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        Operator::Lte => matches!(
            ordering(actual, expected),
            Some(Ordering::Less | Ordering::Equal)
        ),
        Operator::In => match expected {
            FactValue::List(members) => members.iter().any(|member| member == actual),
            _ => false,
        },
        Operator::Contains => match (actual, expected) {
            (FactValue::List(items), _) => items.iter().any(|item| item == expected),
            (FactValue::Text(haystack), FactValue::Text(needle)) => haystack.contains(needle),
            _ => false,
        },
    }
}

fn same_kind(left: &FactValue, right: &FactValue) -> bool {
    discriminant(left) == discriminant(right)
}

/// Numbers and dates are the only ordered fact kinds.
pub(crate) fn ordering(left: &FactValue, right: &FactValue) -> Option<Ordering> {
    match (left, right) {
        (FactValue::Number(left), FactValue::Number(right)) => left.partial_cmp(right),
        (FactValue::Date(left), FactValue::Date(right)) => Some(left.cmp(right)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn facts() -> FactTree {
        FactTree::default()
            .with_fact("age", 17)
            .with_fact("category", "sc")
            .with_fact("is_farmer", true)
            .with_fact("crops", FactValue::list(["paddy", "wheat"]))
            .with_fact(
                "registered_on",
                NaiveDate::from_ymd_opt(2019, 2, 1).expect("valid date"),
            )
    }

    #[test]
    fn absent_field_is_unknown_for_every_operator() {
        let facts = facts();
        for operator in [
            Operator::Eq,
            Operator::Ne,
            Operator::Gt,
            Operator::Lt,
            Operator::Gte,
            Operator::Lte,
            Operator::In,
            Operator::Contains,
        ] {
            let rule = Rule::new("income.annual", operator, 200000);
            assert_eq!(evaluate_rule(&rule, &facts), Truth::Unknown, "{operator:?}");
        }
    }

    #[test]
    fn type_mismatch_fails_rather_than_unknown() {
        let facts = facts();
        assert_eq!(
            evaluate_rule(&Rule::new("category", Operator::Gte, 18), &facts),
            Truth::Failed
        );
        assert_eq!(
            evaluate_rule(&Rule::new("age", Operator::Eq, "17"), &facts),
            Truth::Failed
        );
        assert_eq!(
            evaluate_rule(&Rule::new("age", Operator::Ne, "17"), &facts),
            Truth::Failed
        );
        assert_eq!(
            evaluate_rule(&Rule::new("is_farmer", Operator::In, true), &facts),
            Truth::Failed
        );
    }

    #[test]
    fn numeric_and_date_ordering() {
        let facts = facts();
        assert_eq!(
            evaluate_rule(&Rule::new("age", Operator::Gte, 18), &facts),
            Truth::Failed
        );
        assert_eq!(
            evaluate_rule(&Rule::new("age", Operator::Lt, 18), &facts),
            Truth::Satisfied
        );
        assert_eq!(
            evaluate_rule(&Rule::new("age", Operator::Lte, 17), &facts),
            Truth::Satisfied
        );
        let cutoff = NaiveDate::from_ymd_opt(2019, 2, 1).expect("valid date");
        assert_eq!(
            evaluate_rule(&Rule::new("registered_on", Operator::Lte, cutoff), &facts),
            Truth::Satisfied
        );
        assert_eq!(
            evaluate_rule(&Rule::new("registered_on", Operator::Gt, cutoff), &facts),
            Truth::Failed
        );
    }

    #[test]
    fn membership_and_containment() {
        let facts = facts();
        let categories = FactValue::list(["sc", "st", "obc"]);
        assert_eq!(
            evaluate_rule(&Rule::new("category", Operator::In, categories), &facts),
            Truth::Satisfied
        );
        assert_eq!(
            evaluate_rule(&Rule::new("crops", Operator::Contains, "wheat"), &facts),
            Truth::Satisfied
        );
        assert_eq!(
            evaluate_rule(&Rule::new("crops", Operator::Contains, "cotton"), &facts),
            Truth::Failed
        );
        assert_eq!(
            evaluate_rule(&Rule::new("age", Operator::Contains, 1), &facts),
            Truth::Failed
        );
    }

    #[test]
    fn text_contains_matches_substrings() {
        let facts = FactTree::default().with_fact("occupation", "marginal farmer");
        assert_eq!(
            evaluate_rule(&Rule::new("occupation", Operator::Contains, "farmer"), &facts),
            Truth::Satisfied
        );
    }
}

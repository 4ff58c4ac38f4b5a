use std::sync::Arc;

use super::common::*;
use crate::eligibility::catalog::{
    load_snapshot, parse_definitions, validate_criteria, CatalogError, CatalogHandle,
    CatalogSnapshot, DataShapeError, LoadPolicy, MAX_CRITERIA_DEPTH,
};
use crate::eligibility::domain::{BenefitTier, CriteriaExpr, FactValue, Operator, SchemeId};
use crate::eligibility::matcher::find_matches;

const CATALOG_JSON: &str = r#"[
  {
    "id": "PM-KISAN",
    "criteria": {"and": [
      {"rule": {"field": "occupation", "operator": "eq", "value": "farmer"}},
      {"rule": {"field": "land.hectares", "operator": "lte", "value": 2, "weight": 2}}
    ]},
    "metadata": {"name": "Pradhan Mantri Kisan Samman Nidhi", "benefit": "high"}
  },
  {
    "id": "BROKEN-OPERATOR",
    "criteria": {"rule": {"field": "age", "operator": "between", "value": [18, 40]}},
    "metadata": {"name": "Malformed"}
  },
  {
    "id": "NEGATIVE-WEIGHT",
    "criteria": {"rule": {"field": "age", "operator": "gte", "value": 18, "weight": -1}},
    "metadata": {"name": "Negative"}
  }
]"#;

#[test]
fn lenient_load_excludes_only_offending_schemes() {
    let parsed = parse_definitions(CATALOG_JSON).expect("document is an array");
    assert_eq!(parsed.definitions.len(), 2);
    assert_eq!(parsed.rejected.len(), 1);
    assert_eq!(
        parsed.rejected[0].scheme_id,
        Some(SchemeId::new("BROKEN-OPERATOR"))
    );
    assert!(matches!(parsed.rejected[0].error, DataShapeError::Malformed(_)));

    let load = load_snapshot(parsed.definitions, 7, LoadPolicy::Lenient).expect("lenient load");

    assert_eq!(load.snapshot.version(), 7);
    assert_eq!(load.snapshot.len(), 1);
    let entry = load
        .snapshot
        .get(&SchemeId::new("PM-KISAN"))
        .expect("valid scheme kept");
    assert_eq!(entry.metadata.benefit, BenefitTier::High);
    assert!(entry.metadata.active);
    assert_eq!(load.rejected.len(), 1);
    assert!(matches!(
        load.rejected[0].error,
        DataShapeError::InvalidWeight { weight, .. } if weight == -1.0
    ));
}

#[test]
fn strict_load_rejects_everything_on_any_violation() {
    let mut definitions = catalog_definitions();
    definitions.push(definition(
        "BAD-PATH",
        rule("location..state", Operator::Eq, "Bihar"),
        BenefitTier::Low,
    ));

    let err = load_snapshot(definitions, 2, LoadPolicy::Strict).expect_err("strict rejects");

    match err {
        CatalogError::Rejected(rejected) => {
            assert_eq!(rejected.len(), 1);
            assert!(matches!(
                rejected[0].error,
                DataShapeError::InvalidFieldPath { .. }
            ));
        }
        other => panic!("expected rejection, got {other:?}"),
    }
}

#[test]
fn structural_checks_cover_each_violation() {
    assert!(matches!(
        validate_criteria(&rule("category", Operator::In, "sc")),
        Err(DataShapeError::MembershipWithoutSet { .. })
    ));
    assert_eq!(
        validate_criteria(&CriteriaExpr::all([])),
        Err(DataShapeError::EmptyCombinator("and"))
    );
    assert_eq!(
        validate_criteria(&CriteriaExpr::any([rule("age", Operator::Gte, 18), CriteriaExpr::any([])])),
        Err(DataShapeError::EmptyCombinator("or"))
    );
    assert!(matches!(
        validate_criteria(&weighted("age", Operator::Gte, 18, f64::NAN)),
        Err(DataShapeError::InvalidWeight { .. })
    ));
    assert!(validate_criteria(&rule("location.district-code", Operator::Eq, 204)).is_ok());
    assert!(validate_criteria(&weighted("age", Operator::Gte, 18, 0.0)).is_ok());
}

#[test]
fn overly_deep_criteria_are_rejected() {
    let mut criteria = rule("age", Operator::Gte, 18);
    for _ in 0..MAX_CRITERIA_DEPTH {
        criteria = CriteriaExpr::negate(criteria);
    }

    assert!(matches!(
        validate_criteria(&criteria),
        Err(DataShapeError::TooDeep { .. })
    ));
}

#[test]
fn duplicate_scheme_ids_keep_the_first_declaration() {
    let definitions = vec![
        definition("PMAY-G", rule("age", Operator::Gte, 18), BenefitTier::High),
        definition("PMAY-G", rule("age", Operator::Gte, 60), BenefitTier::Low),
        definition(" ", rule("age", Operator::Gte, 18), BenefitTier::Low),
    ];

    let load = load_snapshot(definitions, 1, LoadPolicy::Lenient).expect("lenient load");

    assert_eq!(load.snapshot.len(), 1);
    let entry = load
        .snapshot
        .get(&SchemeId::new("PMAY-G"))
        .expect("first declaration kept");
    assert_eq!(entry.metadata.benefit, BenefitTier::High);
    assert_eq!(load.rejected[0].error, DataShapeError::DuplicateScheme);
    assert_eq!(load.rejected[1].error, DataShapeError::BlankSchemeId);
}

#[test]
fn document_that_is_not_an_array_is_refused() {
    let err = parse_definitions(r#"{"id": "PM-KISAN"}"#).expect_err("object is not a catalog");
    assert!(matches!(err, CatalogError::Document(_)));
}

#[test]
fn handle_swaps_snapshots_without_disturbing_readers() {
    let handle = CatalogHandle::new(snapshot(3, catalog_definitions()));
    let in_flight = handle.current();

    let tightened = vec![definition(
        "MGNREGA",
        rule("age", Operator::Gte, 65),
        BenefitTier::Medium,
    )];
    handle
        .publish(snapshot(5, tightened))
        .expect("newer version publishes");

    assert_eq!(in_flight.version(), 3);
    assert_eq!(in_flight.len(), 4);
    assert_eq!(handle.current().version(), 5);
    assert_eq!(handle.next_version(), 6);

    let facts = farmer_profile();
    assert_eq!(find_matches(&facts, &in_flight).eligible().count(), 1);
    assert_eq!(find_matches(&facts, &handle.current()).eligible().count(), 0);
}

#[test]
fn handle_refuses_stale_versions() {
    let handle = CatalogHandle::new(snapshot(5, catalog_definitions()));

    let err = handle
        .publish(snapshot(5, Vec::new()))
        .expect_err("same version is stale");

    assert!(matches!(
        err,
        CatalogError::StaleSnapshot {
            offered: 5,
            current: 5
        }
    ));
    assert_eq!(handle.current().len(), 4);
}

#[test]
fn concurrent_readers_see_whole_snapshots() {
    let handle = Arc::new(CatalogHandle::new(snapshot(1, catalog_definitions())));
    let facts = farmer_profile();

    std::thread::scope(|scope| {
        for _ in 0..4 {
            let handle = Arc::clone(&handle);
            let facts = &facts;
            scope.spawn(move || {
                for _ in 0..100 {
                    let snapshot = handle.current();
                    let report = find_matches(facts, &snapshot);
                    let expected = if snapshot.version() == 1 { 4 } else { 1 };
                    assert_eq!(report.matches().len() + report.rejections().len(), expected);
                }
            });
        }

        for version in 2..=20 {
            let only_one = vec![definition(
                "MGNREGA",
                rule("age", Operator::Gte, 18),
                BenefitTier::Medium,
            )];
            handle
                .publish(snapshot(version, only_one))
                .expect("monotonic publish");
        }
    });

    assert_eq!(handle.current().version(), 20);
    assert_eq!(
        handle
            .current()
            .get(&SchemeId::new("MGNREGA"))
            .map(|entry| entry.criteria.leaves()[0].value.clone()),
        Some(FactValue::Number(18.0))
    );
}

#[test]
fn concurrent_reloads_publish_consecutive_versions() {
    let service = build_service(LoadPolicy::Lenient);
    let document = r#"[{"id": "MGNREGA",
        "criteria": {"rule": {"field": "age", "operator": "gte", "value": 18}},
        "metadata": {"name": "MGNREGA"}}]"#;

    let mut versions: Vec<u64> = std::thread::scope(|scope| {
        let workers: Vec<_> = (0..8)
            .map(|_| {
                let service = &service;
                scope.spawn(move || service.reload(document).expect("reload never goes stale"))
            })
            .collect();
        workers
            .into_iter()
            .map(|worker| worker.join().expect("worker finished").snapshot.version)
            .collect()
    });

    versions.sort_unstable();
    assert_eq!(versions, (2..=9).collect::<Vec<_>>());
    assert_eq!(service.catalog().version(), 9);
}

#[test]
fn publish_next_rejects_a_snapshot_built_for_another_version() {
    let handle = CatalogHandle::new(snapshot(4, catalog_definitions()));

    let err = handle
        .publish_next(|_| Ok((CatalogSnapshot::empty(), ())))
        .expect_err("version 0 is not the next version");

    assert!(matches!(
        err,
        CatalogError::StaleSnapshot {
            offered: 0,
            current: 4
        }
    ));
    assert_eq!(handle.current().version(), 4);
}

use crate::infra::{offline_service, read_profile};
use clap::Args;
use scheme_eligibility::eligibility::{
    CatalogHandle, Delta, EligibilityService, ExplanationRecord, ExplanationRenderer, FactTree,
    GapItem, LanguageTag, LoadPolicy, MatchReport, RenderError, SchemeMatch, SummaryKind,
};
use scheme_eligibility::error::AppError;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Args, Debug)]
pub(crate) struct EvaluateArgs {
    /// JSON file holding the citizen fact tree
    #[arg(long)]
    pub(crate) profile: PathBuf,
    /// JSON array of scheme definitions to match against
    #[arg(long)]
    pub(crate) catalog: PathBuf,
    /// Reject the whole catalog when any scheme is malformed
    #[arg(long)]
    pub(crate) strict: bool,
    /// List the schemes the profile does not qualify for, with reasons
    #[arg(long)]
    pub(crate) include_rejections: bool,
    /// Print the match report as JSON instead of text
    #[arg(long)]
    pub(crate) json: bool,
}

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Also list schemes each sample profile does not qualify for.
    #[arg(long)]
    pub(crate) include_rejections: bool,
    /// Skip the online catalog resync portion of the demo.
    #[arg(long)]
    pub(crate) skip_resync: bool,
}

const OFFLINE_CATALOG: &str = r#"[
  {
    "id": "PM-KISAN",
    "criteria": {"and": [
      {"rule": {"field": "occupation", "operator": "eq", "value": "farmer"}},
      {"rule": {"field": "land.hectares", "operator": "lte", "value": 2}},
      {"not": {"rule": {"field": "is_income_tax_payer", "operator": "eq", "value": true}}}
    ]},
    "metadata": {"name": "PM Kisan Samman Nidhi", "benefit": "high", "tags": ["agriculture"]}
  },
  {
    "id": "MGNREGA",
    "criteria": {"and": [
      {"rule": {"field": "age", "operator": "gte", "value": 18}},
      {"rule": {"field": "location.area", "operator": "eq", "value": "rural"}}
    ]},
    "metadata": {"name": "Rural employment guarantee", "benefit": "medium"}
  },
  {
    "id": "PMAY-G",
    "criteria": {"and": [
      {"rule": {"field": "income.annual", "operator": "lte", "value": 300000, "weight": 2}},
      {"rule": {"field": "owns_pucca_house", "operator": "eq", "value": false, "weight": 2}},
      {"rule": {"field": "has_bank_account", "operator": "eq", "value": true, "weight": 0}}
    ]},
    "metadata": {"name": "Rural housing", "benefit": "high"}
  },
  {
    "id": "IGNOAPS",
    "criteria": {"and": [
      {"rule": {"field": "age", "operator": "gte", "value": 60}},
      {"or": [
        {"rule": {"field": "category", "operator": "in", "value": ["sc", "st"]}},
        {"rule": {"field": "income.annual", "operator": "lte", "value": 120000}}
      ]}
    ]},
    "metadata": {"name": "Old age pension", "benefit": "medium"}
  }
]"#;

const ONLINE_CATALOG: &str = r#"[
  {
    "id": "PM-KISAN",
    "criteria": {"and": [
      {"rule": {"field": "occupation", "operator": "eq", "value": "farmer"}},
      {"rule": {"field": "land.hectares", "operator": "lte", "value": 1}},
      {"not": {"rule": {"field": "is_income_tax_payer", "operator": "eq", "value": true}}}
    ]},
    "metadata": {"name": "PM Kisan Samman Nidhi", "benefit": "high", "tags": ["agriculture"]}
  },
  {
    "id": "MGNREGA",
    "criteria": {"and": [
      {"rule": {"field": "age", "operator": "gte", "value": 18}},
      {"rule": {"field": "location.area", "operator": "eq", "value": "rural"}}
    ]},
    "metadata": {"name": "Rural employment guarantee", "benefit": "medium"}
  }
]"#;

fn sample_profiles() -> Result<Vec<(&'static str, FactTree)>, AppError> {
    let smallholder = serde_json::from_value(serde_json::json!({
        "age": 41,
        "occupation": "farmer",
        "land": {"hectares": 1.6},
        "is_income_tax_payer": false,
        "income": {"annual": 90000},
        "location": {"state": "Bihar", "area": "rural"},
        "has_bank_account": true
    }))?;
    let pensioner = serde_json::from_value(serde_json::json!({
        "age": 67,
        "category": "general",
        "income": {"annual": 150000},
        "location": {"state": "Kerala", "area": "urban"},
        "owns_pucca_house": true
    }))?;
    Ok(vec![
        ("Smallholder farmer, 41", smallholder),
        ("Urban pensioner, 67", pensioner),
    ])
}

pub(crate) fn run_evaluate(args: EvaluateArgs) -> Result<(), AppError> {
    let EvaluateArgs {
        profile,
        catalog,
        strict,
        include_rejections,
        json,
    } = args;

    let policy = if strict {
        LoadPolicy::Strict
    } else {
        LoadPolicy::Lenient
    };
    let service = offline_service(&catalog, policy)?;
    let facts = read_profile(&profile)?;
    let report = service.find_matches(&facts);

    if json {
        let report = if include_rejections {
            report
        } else {
            report.without_rejections()
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        render_match_report(&report, include_rejections);
    }

    Ok(())
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        include_rejections,
        skip_resync,
    } = args;

    println!("Scheme eligibility demo");
    let service = Arc::new(EligibilityService::new(
        Arc::new(CatalogHandle::default()),
        LoadPolicy::Lenient,
    ));
    let loaded = service.reload(OFFLINE_CATALOG)?;
    println!(
        "Offline catalog v{} loaded with {} schemes",
        loaded.snapshot.version,
        loaded.snapshot.scheme_ids.len()
    );

    let profiles = sample_profiles()?;
    let mut offline_reports = Vec::with_capacity(profiles.len());
    for (label, facts) in &profiles {
        println!("\n== {label} ==");
        let report = service.find_matches(facts);
        render_match_report(&report, include_rejections);
        offline_reports.push(report);
    }

    if skip_resync {
        return Ok(());
    }

    let synced = service.reload(ONLINE_CATALOG)?;
    println!(
        "\nOnline resync published catalog v{} ({} schemes); offline results are replaced",
        synced.snapshot.version,
        synced.snapshot.scheme_ids.len()
    );
    for ((label, facts), offline) in profiles.iter().zip(offline_reports) {
        let reconciled = offline.supersede(service.find_matches(facts));
        println!("\n== {label} (catalog v{}) ==", reconciled.snapshot_version);
        render_match_report(&reconciled, include_rejections);
    }

    Ok(())
}

pub(crate) fn render_match_report(report: &MatchReport, include_rejections: bool) {
    let renderer = EnglishRenderer;
    let english = LanguageTag("en".to_string());

    println!(
        "Catalog v{} taken {}",
        report.snapshot_version,
        report.snapshot_taken_at.format("%Y-%m-%d %H:%M UTC")
    );
    if report.matches().is_empty() {
        println!("- no eligible or pending schemes");
    }
    for item in report.matches() {
        render_scheme(item, &renderer, &english);
    }

    if include_rejections && !report.rejections().is_empty() {
        println!("Not eligible:");
        for item in report.rejections() {
            render_scheme(item, &renderer, &english);
        }
    }
}

fn render_scheme(item: &SchemeMatch, renderer: &dyn ExplanationRenderer, language: &LanguageTag) {
    println!(
        "- {} [{}] {} | score {:.0}% | {} benefit",
        item.scheme_name,
        item.scheme_id,
        item.status.label(),
        item.verdict.score * 100.0,
        item.rank_priority.label()
    );
    let text = renderer
        .render(&item.explanation, language)
        .unwrap_or_else(|err| format!("explanation unavailable: {err}"));
    for line in text.lines() {
        println!("    {line}");
    }
}

/// Plain English rendering for terminal output.
pub(crate) struct EnglishRenderer;

impl ExplanationRenderer for EnglishRenderer {
    fn render(
        &self,
        record: &ExplanationRecord,
        language: &LanguageTag,
    ) -> Result<String, RenderError> {
        if !language.0.eq_ignore_ascii_case("en") && !language.0.starts_with("en-") {
            return Err(RenderError::UnsupportedLanguage(language.0.clone()));
        }

        let mut lines = vec![match record.summary_kind {
            SummaryKind::Eligible => "Eligible.".to_string(),
            SummaryKind::Pending => "Possibly eligible; more information is needed.".to_string(),
            SummaryKind::Ineligible => "Not eligible.".to_string(),
        }];
        for item in &record.gap_items {
            lines.push(match item {
                GapItem::MissingField { field } => format!("provide `{field}`"),
                GapItem::Condition {
                    rule_id,
                    actual,
                    delta,
                    negated,
                    ..
                } => {
                    let verb = if *negated { "must not hold" } else { "needs" };
                    format!("{verb} {rule_id} (currently {actual}{})", describe_delta(delta))
                }
            });
        }
        Ok(lines.join("\n"))
    }
}

fn describe_delta(delta: &Delta) -> String {
    match delta {
        Delta::Numeric { value } => format!(", off by {value}"),
        Delta::Days { value } => format!(", off by {value} days"),
        Delta::Nearest { accepted } => format!(", nearest accepted value {accepted}"),
        Delta::Mismatch => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn demo_service() -> EligibilityService {
        let service = EligibilityService::new(
            Arc::new(CatalogHandle::default()),
            LoadPolicy::Strict,
        );
        service.reload(OFFLINE_CATALOG).expect("demo catalog is valid");
        service
    }

    #[test]
    fn sample_catalogs_load_strictly() {
        let service = demo_service();
        assert_eq!(service.catalog().len(), 4);

        let synced = service.reload(ONLINE_CATALOG).expect("online catalog is valid");
        assert_eq!(synced.snapshot.version, 2);
        assert!(synced.rejected.is_empty());
    }

    #[test]
    fn resync_tightens_the_smallholder_result() {
        let service = demo_service();
        let profiles = sample_profiles().expect("profiles parse");
        let (_, smallholder) = &profiles[0];

        let offline = service.find_matches(smallholder);
        let top: Vec<_> = offline
            .eligible()
            .map(|item| item.scheme_id.as_str())
            .collect();
        assert_eq!(top, vec!["PM-KISAN", "MGNREGA"]);

        service.reload(ONLINE_CATALOG).expect("online catalog is valid");
        let reconciled = offline.supersede(service.find_matches(smallholder));
        let top: Vec<_> = reconciled
            .eligible()
            .map(|item| item.scheme_id.as_str())
            .collect();
        assert_eq!(reconciled.snapshot_version, 2);
        assert_eq!(top, vec!["MGNREGA"]);
    }

    #[test]
    fn english_renderer_describes_gap_items() {
        let service = demo_service();
        let profiles = sample_profiles().expect("profiles parse");
        let (_, pensioner) = &profiles[1];
        let report = service.find_matches(pensioner);
        let pension = report
            .rejections()
            .iter()
            .find(|item| item.scheme_id.as_str() == "IGNOAPS")
            .expect("pension evaluated");

        let text = EnglishRenderer
            .render(&pension.explanation, &LanguageTag("en".to_string()))
            .expect("english renders");

        assert!(text.starts_with("Not eligible."));
        // The category branch needs no numeric movement, so it is the closest one.
        assert!(text.contains("needs category in [sc, st] (currently general"));
        assert!(text.contains("nearest accepted value sc"));
        assert!(!text.contains("income.annual"));
        assert!(matches!(
            EnglishRenderer.render(&pension.explanation, &LanguageTag("ta".to_string())),
            Err(RenderError::UnsupportedLanguage(_))
        ));
    }
}

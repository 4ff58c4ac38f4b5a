use metrics_exporter_prometheus::PrometheusHandle;
use scheme_eligibility::config::CatalogConfig;
use scheme_eligibility::eligibility::{CatalogHandle, EligibilityService, FactTree, LoadPolicy};
use scheme_eligibility::error::AppError;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Build the service and, when a catalog file is configured, publish it as version 1.
pub(crate) fn build_service(config: &CatalogConfig) -> Result<Arc<EligibilityService>, AppError> {
    let service = Arc::new(EligibilityService::new(
        Arc::new(CatalogHandle::default()),
        config.load_policy(),
    ));

    match &config.path {
        Some(path) => {
            let report = service.reload(&read_catalog(path)?)?;
            for rejected in &report.rejected {
                warn!(
                    scheme_id = ?rejected.scheme_id,
                    error = %rejected.error,
                    "scheme excluded from startup catalog"
                );
            }
            info!(
                path = %path.display(),
                version = report.snapshot.version,
                schemes = report.snapshot.scheme_ids.len(),
                "startup catalog loaded"
            );
        }
        None => warn!("no catalog configured; serving an empty catalog until one is published"),
    }

    Ok(service)
}

pub(crate) fn offline_service(
    catalog: &Path,
    policy: LoadPolicy,
) -> Result<Arc<EligibilityService>, AppError> {
    build_service(&CatalogConfig {
        path: Some(catalog.to_path_buf()),
        strict: policy == LoadPolicy::Strict,
    })
}

pub(crate) fn read_catalog(path: &Path) -> Result<String, AppError> {
    Ok(std::fs::read_to_string(path)?)
}

pub(crate) fn read_profile(path: &Path) -> Result<FactTree, AppError> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn temp_file(name: &str, contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("{}-{name}", std::process::id()));
        let mut file = std::fs::File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes()).expect("write temp file");
        path
    }

    #[test]
    fn configured_catalog_is_published_as_first_version() {
        let path = temp_file(
            "catalog.json",
            r#"[{"id": "MGNREGA",
                 "criteria": {"rule": {"field": "age", "operator": "gte", "value": 18}},
                 "metadata": {"name": "MGNREGA"}}]"#,
        );

        let service = offline_service(&path, LoadPolicy::Strict).expect("service builds");

        assert_eq!(service.catalog().version(), 1);
        assert_eq!(service.catalog().len(), 1);
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn missing_catalog_path_starts_empty() {
        let service = build_service(&CatalogConfig::default()).expect("service builds");

        assert_eq!(service.catalog().version(), 0);
        assert!(service.catalog().is_empty());
    }

    #[test]
    fn unreadable_profile_is_a_profile_error() {
        let path = temp_file("profile.json", "{\"age\": ");

        let err = read_profile(&path).expect_err("truncated json");

        assert!(matches!(err, AppError::Profile(_)));
        std::fs::remove_file(path).ok();
    }
}

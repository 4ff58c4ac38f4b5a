use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use super::domain::{
    CriteriaExpr, FactValue, Operator, SchemeDefinition, SchemeId, SchemeMetadata,
};

/// Deepest criteria tree accepted at load time.
pub const MAX_CRITERIA_DEPTH: usize = 32;

/// Structural problem that excludes one scheme definition from a snapshot.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DataShapeError {
    #[error("definition is malformed: {0}")]
    Malformed(String),
    #[error("rule `{rule}` has invalid field path `{field}`")]
    InvalidFieldPath { rule: String, field: String },
    #[error("rule `{rule}` has weight {weight}; weights must be finite and non-negative")]
    InvalidWeight { rule: String, weight: f64 },
    #[error("rule `{rule}` uses `in` without a list of accepted values")]
    MembershipWithoutSet { rule: String },
    #[error("criteria contain an empty `{0}` combinator")]
    EmptyCombinator(&'static str),
    #[error("criteria nest {depth} levels deep (limit {limit})")]
    TooDeep { depth: usize, limit: usize },
    #[error("scheme id is blank")]
    BlankSchemeId,
    #[error("scheme id is declared more than once")]
    DuplicateScheme,
}

/// A definition that did not make it into the snapshot, with the reason.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectedScheme {
    pub scheme_id: Option<SchemeId>,
    #[serde(serialize_with = "serialize_display")]
    pub error: DataShapeError,
}

fn serialize_display<S: serde::Serializer>(
    error: &DataShapeError,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_str(error)
}

/// How structural violations affect the rest of a load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadPolicy {
    /// Exclude offending schemes and keep the rest.
    #[default]
    Lenient,
    /// Reject the whole load on the first violation.
    Strict,
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("catalog document is not a JSON array of scheme definitions: {0}")]
    Document(#[source] serde_json::Error),
    #[error("catalog rejected: {} scheme definition(s) violate the catalog shape", .0.len())]
    Rejected(Vec<RejectedScheme>),
    #[error("snapshot version {offered} is not newer than the published version {current}")]
    StaleSnapshot { offered: u64, current: u64 },
}

/// Criteria and metadata of one loaded scheme.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogEntry {
    pub criteria: CriteriaExpr,
    pub metadata: SchemeMetadata,
}

/// Immutable, versioned view of the scheme catalog.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogSnapshot {
    version: u64,
    taken_at: DateTime<Utc>,
    schemes: BTreeMap<SchemeId, CatalogEntry>,
}

impl CatalogSnapshot {
    /// Snapshot with no schemes, used before the first sync.
    pub fn empty() -> Self {
        Self {
            version: 0,
            taken_at: DateTime::<Utc>::UNIX_EPOCH,
            schemes: BTreeMap::new(),
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn taken_at(&self) -> DateTime<Utc> {
        self.taken_at
    }

    pub fn len(&self) -> usize {
        self.schemes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemes.is_empty()
    }

    pub fn get(&self, id: &SchemeId) -> Option<&CatalogEntry> {
        self.schemes.get(id)
    }

    /// Schemes in ascending id order.
    pub fn schemes(&self) -> impl Iterator<Item = (&SchemeId, &CatalogEntry)> {
        self.schemes.iter()
    }

    pub fn summary(&self) -> SnapshotSummary {
        SnapshotSummary {
            version: self.version,
            taken_at: self.taken_at,
            scheme_ids: self.schemes.keys().cloned().collect(),
        }
    }
}

/// Lightweight description of a snapshot for status endpoints.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotSummary {
    pub version: u64,
    pub taken_at: DateTime<Utc>,
    pub scheme_ids: Vec<SchemeId>,
}

/// Outcome of a load: the snapshot plus the definitions it left out.
#[derive(Debug, Clone)]
pub struct CatalogLoad {
    pub snapshot: CatalogSnapshot,
    pub rejected: Vec<RejectedScheme>,
}

/// Scheme definitions parsed one by one, so that a bad entry only costs itself.
#[derive(Debug, Clone, Default)]
pub struct ParsedDefinitions {
    pub definitions: Vec<SchemeDefinition>,
    pub rejected: Vec<RejectedScheme>,
}

/// Parse a JSON array of scheme definitions. Entries that do not deserialize (an unknown
/// operator, a missing field) become per-scheme rejections.
pub fn parse_definitions(document: &str) -> Result<ParsedDefinitions, CatalogError> {
    let raw: Vec<Value> = serde_json::from_str(document).map_err(CatalogError::Document)?;

    let mut parsed = ParsedDefinitions::default();
    for entry in raw {
        let scheme_id = entry
            .get("id")
            .and_then(Value::as_str)
            .map(SchemeId::new);
        match serde_json::from_value::<SchemeDefinition>(entry) {
            Ok(definition) => parsed.definitions.push(definition),
            Err(err) => parsed.rejected.push(RejectedScheme {
                scheme_id,
                error: DataShapeError::Malformed(err.to_string()),
            }),
        }
    }

    Ok(parsed)
}

/// Validate `definitions` and build the snapshot with the given version.
pub fn load_snapshot(
    definitions: Vec<SchemeDefinition>,
    version: u64,
    policy: LoadPolicy,
) -> Result<CatalogLoad, CatalogError> {
    load_snapshot_at(definitions, version, policy, Utc::now())
}

pub fn load_snapshot_at(
    definitions: Vec<SchemeDefinition>,
    version: u64,
    policy: LoadPolicy,
    taken_at: DateTime<Utc>,
) -> Result<CatalogLoad, CatalogError> {
    let mut schemes = BTreeMap::new();
    let mut rejected = Vec::new();
    let mut seen = HashSet::new();

    for definition in definitions {
        let SchemeDefinition {
            id,
            criteria,
            metadata,
        } = definition;

        let verdict = if id.as_str().trim().is_empty() {
            Err(DataShapeError::BlankSchemeId)
        } else if !seen.insert(id.clone()) {
            Err(DataShapeError::DuplicateScheme)
        } else {
            validate_criteria(&criteria)
        };

        match verdict {
            Ok(()) => {
                schemes.insert(id, CatalogEntry { criteria, metadata });
            }
            Err(error) => {
                warn!(scheme_id = %id, %error, "excluding scheme from catalog snapshot");
                rejected.push(RejectedScheme {
                    scheme_id: Some(id),
                    error,
                });
            }
        }
    }

    if policy == LoadPolicy::Strict && !rejected.is_empty() {
        return Err(CatalogError::Rejected(rejected));
    }

    info!(
        version,
        schemes = schemes.len(),
        rejected = rejected.len(),
        "catalog snapshot loaded"
    );

    Ok(CatalogLoad {
        snapshot: CatalogSnapshot {
            version,
            taken_at,
            schemes,
        },
        rejected,
    })
}

/// Structural checks run once per scheme at load time, so evaluation never has to.
pub fn validate_criteria(criteria: &CriteriaExpr) -> Result<(), DataShapeError> {
    let depth = criteria.depth();
    if depth > MAX_CRITERIA_DEPTH {
        return Err(DataShapeError::TooDeep {
            depth,
            limit: MAX_CRITERIA_DEPTH,
        });
    }
    validate_node(criteria)
}

fn validate_node(node: &CriteriaExpr) -> Result<(), DataShapeError> {
    match node {
        CriteriaExpr::Rule(rule) => {
            if !rule.field.is_well_formed() {
                return Err(DataShapeError::InvalidFieldPath {
                    rule: rule.rule_id(),
                    field: rule.field.to_string(),
                });
            }
            if !rule.weight.is_finite() || rule.weight < 0.0 {
                return Err(DataShapeError::InvalidWeight {
                    rule: rule.rule_id(),
                    weight: rule.weight,
                });
            }
            if rule.operator == Operator::In && !matches!(rule.value, FactValue::List(_)) {
                return Err(DataShapeError::MembershipWithoutSet {
                    rule: rule.rule_id(),
                });
            }
            Ok(())
        }
        CriteriaExpr::And(children) if children.is_empty() => {
            Err(DataShapeError::EmptyCombinator("and"))
        }
        CriteriaExpr::Or(children) if children.is_empty() => {
            Err(DataShapeError::EmptyCombinator("or"))
        }
        CriteriaExpr::And(children) | CriteriaExpr::Or(children) => {
            children.iter().try_for_each(validate_node)
        }
        CriteriaExpr::Not(child) => validate_node(child),
    }
}

/// Shared handle to the current snapshot. Readers take an `Arc` and keep evaluating
/// against it while a newer snapshot is swapped in.
#[derive(Debug)]
pub struct CatalogHandle {
    current: RwLock<Arc<CatalogSnapshot>>,
}

impl Default for CatalogHandle {
    fn default() -> Self {
        Self::new(CatalogSnapshot::empty())
    }
}

impl CatalogHandle {
    pub fn new(snapshot: CatalogSnapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(snapshot)),
        }
    }

    pub fn current(&self) -> Arc<CatalogSnapshot> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Version the next published snapshot should carry.
    pub fn next_version(&self) -> u64 {
        self.current().version() + 1
    }

    /// Atomically replace the current snapshot. Versions only move forward.
    pub fn publish(&self, snapshot: CatalogSnapshot) -> Result<Arc<CatalogSnapshot>, CatalogError> {
        let mut guard = match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if snapshot.version() <= guard.version() {
            return Err(CatalogError::StaleSnapshot {
                offered: snapshot.version(),
                current: guard.version(),
            });
        }

        let snapshot = Arc::new(snapshot);
        *guard = Arc::clone(&snapshot);
        info!(version = snapshot.version(), "catalog snapshot published");
        Ok(snapshot)
    }

    /// Build and publish a snapshot under the version following the current one. The write
    /// lock is held across `build`, so concurrent callers are serialized and each receives
    /// its own version instead of racing into [`CatalogError::StaleSnapshot`].
    pub fn publish_next<T, F>(&self, build: F) -> Result<(Arc<CatalogSnapshot>, T), CatalogError>
    where
        F: FnOnce(u64) -> Result<(CatalogSnapshot, T), CatalogError>,
    {
        let mut guard = match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let version = guard.version() + 1;
        let (snapshot, extra) = build(version)?;
        if snapshot.version() != version {
            return Err(CatalogError::StaleSnapshot {
                offered: snapshot.version(),
                current: guard.version(),
            });
        }

        let snapshot = Arc::new(snapshot);
        *guard = Arc::clone(&snapshot);
        info!(version, "catalog snapshot published");
        Ok((snapshot, extra))
    }
}

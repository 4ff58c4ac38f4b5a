use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize, Serializer};

/// Identifier wrapper for catalog schemes (e.g. `PM-KISAN`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemeId(pub String);

impl SchemeId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SchemeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single profile attribute. Enum tags (caste category, occupation, ...) are carried as text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FactValue {
    Bool(bool),
    Number(f64),
    Date(NaiveDate),
    Text(String),
    List(Vec<FactValue>),
    Tree(FactTree),
}

impl FactValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn list<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<FactValue>,
    {
        Self::List(values.into_iter().map(Into::into).collect())
    }

    pub const fn kind(&self) -> &'static str {
        match self {
            FactValue::Bool(_) => "bool",
            FactValue::Number(_) => "number",
            FactValue::Date(_) => "date",
            FactValue::Text(_) => "text",
            FactValue::List(_) => "list",
            FactValue::Tree(_) => "tree",
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            FactValue::Number(value) => Some(*value),
            _ => None,
        }
    }
}

impl fmt::Display for FactValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FactValue::Bool(value) => write!(f, "{value}"),
            FactValue::Number(value) => write!(f, "{value}"),
            FactValue::Date(value) => write!(f, "{value}"),
            FactValue::Text(value) => f.write_str(value),
            FactValue::List(values) => {
                f.write_str("[")?;
                for (index, value) in values.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{value}")?;
                }
                f.write_str("]")
            }
            FactValue::Tree(_) => f.write_str("{..}"),
        }
    }
}

impl From<f64> for FactValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i64> for FactValue {
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<i32> for FactValue {
    fn from(value: i32) -> Self {
        Self::Number(f64::from(value))
    }
}

impl From<bool> for FactValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for FactValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FactValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<NaiveDate> for FactValue {
    fn from(value: NaiveDate) -> Self {
        Self::Date(value)
    }
}

impl From<FactTree> for FactValue {
    fn from(value: FactTree) -> Self {
        Self::Tree(value)
    }
}

/// Read-only nested view of one profile's known attributes.
///
/// `null` entries in incoming JSON are dropped so that they resolve as unknown rather than
/// as a value of some arbitrary type.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(from = "BTreeMap<String, Option<FactValue>>")]
pub struct FactTree {
    entries: BTreeMap<String, FactValue>,
}

impl FactTree {
    pub fn new(entries: BTreeMap<String, FactValue>) -> Self {
        Self { entries }
    }

    pub fn get(&self, key: &str) -> Option<&FactValue> {
        self.entries.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FactValue)> {
        self.entries.iter()
    }

    /// Builder used by callers assembling a profile: places `value` at the dotted `path`,
    /// creating intermediate trees and replacing any scalar standing in the way.
    pub fn with_fact(mut self, path: &str, value: impl Into<FactValue>) -> Self {
        let segments: Vec<&str> = path.split('.').collect();
        insert_at(&mut self.entries, &segments, value.into());
        self
    }
}

fn insert_at(entries: &mut BTreeMap<String, FactValue>, segments: &[&str], value: FactValue) {
    match segments {
        [] => {}
        [last] => {
            entries.insert((*last).to_string(), value);
        }
        [head, rest @ ..] => {
            let slot = entries
                .entry((*head).to_string())
                .or_insert_with(|| FactValue::Tree(FactTree::default()));
            if !matches!(slot, FactValue::Tree(_)) {
                *slot = FactValue::Tree(FactTree::default());
            }
            if let FactValue::Tree(tree) = slot {
                insert_at(&mut tree.entries, rest, value);
            }
        }
    }
}

impl From<BTreeMap<String, Option<FactValue>>> for FactTree {
    fn from(raw: BTreeMap<String, Option<FactValue>>) -> Self {
        let entries = raw
            .into_iter()
            .filter_map(|(key, value)| value.map(|value| (key, value)))
            .collect();
        Self { entries }
    }
}

impl<K: Into<String>, V: Into<FactValue>> FromIterator<(K, V)> for FactTree {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        iter.into_iter()
            .fold(FactTree::default(), |tree, (key, value)| {
                let key: String = key.into();
                tree.with_fact(&key, value)
            })
    }
}

impl Serialize for FactTree {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(&self.entries)
    }
}

/// Dotted path into a fact tree, e.g. `location.state`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldPath(pub String);

impl FieldPath {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('.')
    }

    /// Non-empty segments of ASCII alphanumerics, `_` or `-`, separated by single dots.
    pub fn is_well_formed(&self) -> bool {
        !self.0.is_empty()
            && self.segments().all(|segment| {
                !segment.is_empty()
                    && segment
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
            })
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FieldPath {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Comparison applied between a resolved fact and a rule literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Lt,
    Gte,
    Lte,
    In,
    Contains,
}

impl Operator {
    pub const fn symbol(self) -> &'static str {
        match self {
            Operator::Eq => "==",
            Operator::Ne => "!=",
            Operator::Gt => ">",
            Operator::Lt => "<",
            Operator::Gte => ">=",
            Operator::Lte => "<=",
            Operator::In => "in",
            Operator::Contains => "contains",
        }
    }

    pub const fn is_ordering(self) -> bool {
        matches!(
            self,
            Operator::Gt | Operator::Lt | Operator::Gte | Operator::Lte
        )
    }
}

fn default_weight() -> f64 {
    1.0
}

/// Leaf condition of a criteria expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub field: FieldPath,
    pub operator: Operator,
    pub value: FactValue,
    #[serde(default = "default_weight")]
    pub weight: f64,
}

impl Rule {
    pub fn new(field: &str, operator: Operator, value: impl Into<FactValue>) -> Self {
        Self {
            id: None,
            field: FieldPath::from(field),
            operator,
            value: value.into(),
            weight: default_weight(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    /// Stable identifier used by explanations: the declared id, else `field op value`.
    pub fn rule_id(&self) -> String {
        match &self.id {
            Some(id) if !id.trim().is_empty() => id.clone(),
            _ => format!("{} {} {}", self.field, self.operator.symbol(), self.value),
        }
    }

    pub(crate) fn scores(&self) -> bool {
        self.weight > 0.0
    }
}

/// Eligibility logic of one scheme: rules at the leaves, boolean combinators above them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CriteriaExpr {
    Rule(Rule),
    And(Vec<CriteriaExpr>),
    Or(Vec<CriteriaExpr>),
    Not(Box<CriteriaExpr>),
}

impl CriteriaExpr {
    pub fn all(children: impl IntoIterator<Item = CriteriaExpr>) -> Self {
        Self::And(children.into_iter().collect())
    }

    pub fn any(children: impl IntoIterator<Item = CriteriaExpr>) -> Self {
        Self::Or(children.into_iter().collect())
    }

    pub fn negate(child: CriteriaExpr) -> Self {
        Self::Not(Box::new(child))
    }

    /// Leaf rules in depth-first declaration order.
    pub fn leaves(&self) -> Vec<&Rule> {
        let mut out = Vec::new();
        collect_leaves(self, &mut out);
        out
    }

    pub fn depth(&self) -> usize {
        match self {
            CriteriaExpr::Rule(_) => 1,
            CriteriaExpr::And(children) | CriteriaExpr::Or(children) => {
                1 + children.iter().map(CriteriaExpr::depth).max().unwrap_or(0)
            }
            CriteriaExpr::Not(child) => 1 + child.depth(),
        }
    }
}

impl From<Rule> for CriteriaExpr {
    fn from(rule: Rule) -> Self {
        Self::Rule(rule)
    }
}

fn collect_leaves<'a>(expr: &'a CriteriaExpr, out: &mut Vec<&'a Rule>) {
    match expr {
        CriteriaExpr::Rule(rule) => out.push(rule),
        CriteriaExpr::And(children) | CriteriaExpr::Or(children) => {
            for child in children {
                collect_leaves(child, out);
            }
        }
        CriteriaExpr::Not(child) => collect_leaves(child, out),
    }
}

/// Estimated benefit bucket used as the secondary ranking key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BenefitTier {
    Low,
    #[default]
    Medium,
    High,
}

impl BenefitTier {
    pub const fn label(self) -> &'static str {
        match self {
            BenefitTier::Low => "low",
            BenefitTier::Medium => "medium",
            BenefitTier::High => "high",
        }
    }
}

fn default_active() -> bool {
    true
}

/// Descriptive data carried alongside a scheme's criteria.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemeMetadata {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub benefit: BenefitTier,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl SchemeMetadata {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            benefit: BenefitTier::default(),
            active: true,
            tags: Vec::new(),
        }
    }

    pub fn with_benefit(mut self, benefit: BenefitTier) -> Self {
        self.benefit = benefit;
        self
    }
}

/// Scheme definition as handed over by the catalog sync process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemeDefinition {
    pub id: SchemeId,
    pub criteria: CriteriaExpr,
    pub metadata: SchemeMetadata,
}

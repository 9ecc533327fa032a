//! Decision model: versioned key-value records with metadata.

use serde::{Deserialize, Serialize};

use super::enums::{DecisionStatus, Layer};

/// Parse error for [`TagMatchMode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagMatchModeError;

impl std::fmt::Display for TagMatchModeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tag match mode must be AND or OR")
    }
}

impl std::error::Error for TagMatchModeError {}

/// A decision value is either text or numeric; the two live in sibling
/// tables and are mutually exclusive per key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DecisionValue {
    Text(String),
    Number(f64),
}

impl DecisionValue {
    #[must_use]
    pub fn as_display(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Number(n) => n.to_string(),
        }
    }
}

impl From<&str> for DecisionValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<f64> for DecisionValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

/// Validated input for `decision.set`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetDecision {
    pub key: String,
    pub value: DecisionValue,
    #[serde(default)]
    pub layer: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub agent: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

impl SetDecision {
    #[must_use]
    pub fn new(key: &str, value: impl Into<DecisionValue>) -> Self {
        Self {
            key: key.to_string(),
            value: value.into(),
            layer: None,
            tags: Vec::new(),
            scopes: Vec::new(),
            agent: None,
            version: None,
            status: None,
        }
    }

    #[must_use]
    pub fn with_layer(mut self, layer: &str) -> Self {
        self.layer = Some(layer.to_string());
        self
    }

    #[must_use]
    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.tags = tags.iter().map(ToString::to_string).collect();
        self
    }

    #[must_use]
    pub fn with_version(mut self, version: &str) -> Self {
        self.version = Some(version.to_string());
        self
    }
}

/// Resolved decision projection returned by `get` and searches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub key: String,
    pub value: DecisionValue,
    pub version: String,
    pub status: DecisionStatus,
    pub layer: Option<Layer>,
    pub tags: Vec<String>,
    pub scopes: Vec<String>,
    pub agent: Option<String>,
    /// ISO8601 timestamp (display form; rows store epoch seconds).
    pub updated_at: String,
}

/// One history row: the value a decision had *before* a mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionVersion {
    pub version: String,
    pub value: String,
    pub agent: Option<String>,
    pub updated_at: String,
}

/// Input for `add_decision_context`. `alternatives` must be a JSON array;
/// `tradeoffs` a JSON object with optional `pros[]` / `cons[]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionContextInput {
    pub key: String,
    pub rationale: String,
    #[serde(default)]
    pub alternatives: Option<serde_json::Value>,
    #[serde(default)]
    pub tradeoffs: Option<serde_json::Value>,
    #[serde(default)]
    pub agent: Option<String>,
    #[serde(default)]
    pub related_task_id: Option<i64>,
    #[serde(default)]
    pub related_constraint_id: Option<i64>,
}

/// Tag match rule for `search_by_tags`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TagMatchMode {
    And,
    Or,
}

impl std::str::FromStr for TagMatchMode {
    type Err = TagMatchModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "AND" => Ok(Self::And),
            "OR" => Ok(Self::Or),
            _ => Err(TagMatchModeError),
        }
    }
}

/// Conjunctive filter for `search_advanced`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchFilter {
    #[serde(default)]
    pub layers: Vec<String>,
    #[serde(default)]
    pub tags_any: Vec<String>,
    #[serde(default)]
    pub tags_all: Vec<String>,
    /// Relative ("5m", "1h", "2d") or ISO8601.
    #[serde(default)]
    pub updated_after: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Named defaults applied by `set_from_template`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTemplate {
    pub name: String,
    #[serde(default)]
    pub layer: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub status: Option<String>,
}

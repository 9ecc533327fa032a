//! Constraint model: priority-tagged rules enforced by agents.

use serde::{Deserialize, Serialize};

use super::enums::{ConstraintCategory, Layer, Priority};

/// Resolved constraint projection (from the pre-joined view).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Constraint {
    pub id: i64,
    pub category: ConstraintCategory,
    pub constraint_text: String,
    pub priority: Priority,
    pub layer: Option<Layer>,
    pub active: bool,
    pub created_by: Option<String>,
    pub created_at: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Validated input for `constraint.add`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstraintInput {
    pub category: String,
    pub constraint_text: String,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub layer: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub created_by: Option<String>,
    /// Constraints captured during plan mode start inactive and are
    /// committed later via `activate_by_tag`.
    #[serde(default)]
    pub active: Option<bool>,
}

impl ConstraintInput {
    #[must_use]
    pub fn new(category: &str, text: &str) -> Self {
        Self {
            category: category.to_string(),
            constraint_text: text.to_string(),
            priority: None,
            layer: None,
            tags: Vec::new(),
            created_by: None,
            active: None,
        }
    }
}

/// Filter for `constraint.get`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConstraintFilter {
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub layer: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_active_only")]
    pub active_only: bool,
    #[serde(default)]
    pub limit: Option<usize>,
}

fn default_active_only() -> bool {
    true
}

//! Task model: workflow items with a status state machine, dependency
//! edges, and watched-file links.

use serde::{Deserialize, Serialize};

use super::enums::{Layer, Priority, TaskStatus};

/// Resolved task projection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub title: String,
    pub status: TaskStatus,
    pub priority: Priority,
    pub layer: Option<Layer>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub assigned_agent: Option<String>,
    pub created_by: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub watched_files: Vec<String>,
}

/// Validated input for `task.create`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskInput {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub layer: Option<String>,
    #[serde(default)]
    pub assigned_agent: Option<String>,
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub files: Vec<String>,
}

impl TaskInput {
    #[must_use]
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            description: None,
            status: None,
            priority: None,
            layer: None,
            assigned_agent: None,
            created_by: None,
            tags: Vec::new(),
            files: Vec::new(),
        }
    }
}

/// What a task may be linked to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskLinkKind {
    Decision,
    File,
    Constraint,
}

/// A blocker → blocked edge in the dependency graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDependency {
    pub blocker_task_id: i64,
    pub blocked_task_id: i64,
    pub created_at: String,
    /// Populated when `get_dependencies(include_details)` is set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocker_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocker_status: Option<TaskStatus>,
}

/// Audit row for a watched file that vanished from disk before task
/// completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrunedFile {
    pub id: i64,
    pub task_id: i64,
    pub path: String,
    pub pruned_at: String,
    /// Optional back-link to a decision key explaining the deletion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision_key: Option<String>,
}

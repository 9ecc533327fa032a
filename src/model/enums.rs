//! Integer-coded enums shared across the data model.
//!
//! Every enum value travels as a small integer in database rows; the
//! string forms exist only at the tool-call boundary and in projections.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Architectural layer; coarse classifier for decisions, constraints,
/// tasks, and file changes. Seeded at migration time, never auto-created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Layer {
    Presentation,
    Business,
    Data,
    Infrastructure,
    CrossCutting,
    Planning,
}

impl Layer {
    pub const ALL: [Layer; 6] = [
        Layer::Presentation,
        Layer::Business,
        Layer::Data,
        Layer::Infrastructure,
        Layer::CrossCutting,
        Layer::Planning,
    ];

    #[must_use]
    pub const fn id(self) -> i64 {
        match self {
            Self::Presentation => 1,
            Self::Business => 2,
            Self::Data => 3,
            Self::Infrastructure => 4,
            Self::CrossCutting => 5,
            Self::Planning => 6,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Presentation => "presentation",
            Self::Business => "business",
            Self::Data => "data",
            Self::Infrastructure => "infrastructure",
            Self::CrossCutting => "cross-cutting",
            Self::Planning => "planning",
        }
    }

    #[must_use]
    pub fn valid_names() -> Vec<String> {
        Self::ALL.iter().map(|l| l.as_str().to_string()).collect()
    }

    /// Resolve a layer name; a miss is a Validation error listing the
    /// seeded options.
    pub fn parse(name: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|l| l.as_str() == name)
            .ok_or_else(|| Error::UnknownLayer {
                name: name.to_string(),
                valid: Self::valid_names(),
            })
    }

    #[must_use]
    pub fn from_id(id: i64) -> Option<Self> {
        Self::ALL.iter().copied().find(|l| l.id() == id)
    }
}

/// Task workflow status. `archived` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Todo,
    InProgress,
    WaitingReview,
    Blocked,
    Done,
    Archived,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 6] = [
        TaskStatus::Todo,
        TaskStatus::InProgress,
        TaskStatus::WaitingReview,
        TaskStatus::Blocked,
        TaskStatus::Done,
        TaskStatus::Archived,
    ];

    #[must_use]
    pub const fn id(self) -> i64 {
        match self {
            Self::Todo => 1,
            Self::InProgress => 2,
            Self::WaitingReview => 3,
            Self::Blocked => 4,
            Self::Done => 5,
            Self::Archived => 6,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::InProgress => "in_progress",
            Self::WaitingReview => "waiting_review",
            Self::Blocked => "blocked",
            Self::Done => "done",
            Self::Archived => "archived",
        }
    }

    #[must_use]
    pub fn valid_names() -> Vec<String> {
        Self::ALL.iter().map(|s| s.as_str().to_string()).collect()
    }

    pub fn parse(name: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|s| s.as_str() == name)
            .ok_or_else(|| Error::UnknownStatus {
                name: name.to_string(),
                valid: Self::valid_names(),
            })
    }

    #[must_use]
    pub fn from_id(id: i64) -> Option<Self> {
        Self::ALL.iter().copied().find(|s| s.id() == id)
    }

    /// Permitted state-machine edges. All transitions not listed here are
    /// rejected; `archived` has no outgoing edges.
    #[must_use]
    pub fn can_transition_to(self, to: TaskStatus) -> bool {
        use TaskStatus::{Archived, Blocked, Done, InProgress, Todo, WaitingReview};
        match self {
            Todo => matches!(to, InProgress | Blocked | Archived),
            InProgress => matches!(to, Todo | WaitingReview | Blocked | Done | Archived),
            WaitingReview => matches!(to, Todo | InProgress | Blocked | Done | Archived),
            Blocked => matches!(to, Todo | InProgress | Archived),
            Done => matches!(to, InProgress | Archived),
            Archived => false,
        }
    }
}

/// Decision lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionStatus {
    Active,
    Deprecated,
    Draft,
}

impl DecisionStatus {
    pub const ALL: [DecisionStatus; 3] = [
        DecisionStatus::Active,
        DecisionStatus::Deprecated,
        DecisionStatus::Draft,
    ];

    #[must_use]
    pub const fn id(self) -> i64 {
        match self {
            Self::Active => 1,
            Self::Deprecated => 2,
            Self::Draft => 3,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Deprecated => "deprecated",
            Self::Draft => "draft",
        }
    }

    pub fn parse(name: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|s| s.as_str() == name)
            .ok_or_else(|| Error::UnknownStatus {
                name: name.to_string(),
                valid: Self::ALL.iter().map(|s| s.as_str().to_string()).collect(),
            })
    }

    #[must_use]
    pub fn from_id(id: i64) -> Option<Self> {
        Self::ALL.iter().copied().find(|s| s.id() == id)
    }
}

/// Priority for constraints and tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    pub const ALL: [Priority; 4] = [
        Priority::Low,
        Priority::Medium,
        Priority::High,
        Priority::Critical,
    ];

    #[must_use]
    pub const fn id(self) -> i64 {
        match self {
            Self::Low => 1,
            Self::Medium => 2,
            Self::High => 3,
            Self::Critical => 4,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    pub fn parse(name: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == name)
            .ok_or_else(|| Error::UnknownPriority {
                name: name.to_string(),
            })
    }

    #[must_use]
    pub fn from_id(id: i64) -> Option<Self> {
        Self::ALL.iter().copied().find(|p| p.id() == id)
    }
}

/// Constraint category. Seeded at migration time, never auto-created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintCategory {
    Architecture,
    Security,
    Performance,
    Testing,
    Naming,
    Process,
}

impl ConstraintCategory {
    pub const ALL: [ConstraintCategory; 6] = [
        ConstraintCategory::Architecture,
        ConstraintCategory::Security,
        ConstraintCategory::Performance,
        ConstraintCategory::Testing,
        ConstraintCategory::Naming,
        ConstraintCategory::Process,
    ];

    #[must_use]
    pub const fn id(self) -> i64 {
        match self {
            Self::Architecture => 1,
            Self::Security => 2,
            Self::Performance => 3,
            Self::Testing => 4,
            Self::Naming => 5,
            Self::Process => 6,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Architecture => "architecture",
            Self::Security => "security",
            Self::Performance => "performance",
            Self::Testing => "testing",
            Self::Naming => "naming",
            Self::Process => "process",
        }
    }

    #[must_use]
    pub fn valid_names() -> Vec<String> {
        Self::ALL.iter().map(|c| c.as_str().to_string()).collect()
    }

    pub fn parse(name: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == name)
            .ok_or_else(|| Error::UnknownCategory {
                name: name.to_string(),
                valid: Self::valid_names(),
            })
    }

    #[must_use]
    pub fn from_id(id: i64) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.id() == id)
    }
}

/// File change kind recorded by `file.record`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Created,
    Modified,
    Deleted,
}

impl ChangeType {
    pub const ALL: [ChangeType; 3] = [
        ChangeType::Created,
        ChangeType::Modified,
        ChangeType::Deleted,
    ];

    #[must_use]
    pub const fn id(self) -> i64 {
        match self {
            Self::Created => 1,
            Self::Modified => 2,
            Self::Deleted => 3,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Modified => "modified",
            Self::Deleted => "deleted",
        }
    }

    pub fn parse(name: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == name)
            .ok_or_else(|| Error::Validation(format!(
                "unknown change type '{name}' (expected created, modified, deleted)"
            )))
    }

    #[must_use]
    pub fn from_id(id: i64) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.id() == id)
    }
}

/// How a project binding was detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionSource {
    Git,
    Config,
    Manual,
}

impl DetectionSource {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Git => "git",
            Self::Config => "config",
            Self::Manual => "manual",
        }
    }

    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "git" => Ok(Self::Git),
            "config" => Ok(Self::Config),
            "manual" => Ok(Self::Manual),
            other => Err(Error::Validation(format!(
                "unknown detection source '{other}' (expected git, config, manual)"
            ))),
        }
    }
}

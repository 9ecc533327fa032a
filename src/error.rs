//! Error types for the sqlew engine.
//!
//! Provides structured error handling with:
//! - Machine-readable error codes (`ErrorCode`)
//! - Retryability flags for agent self-correction
//! - Context-aware recovery hints
//! - Structured JSON output for piped / non-TTY consumers
//!
//! Every failure exits the process with code 1; the SCREAMING_SNAKE code
//! string is what agents and the backend dispatcher match on.

use thiserror::Error;

/// Result type alias for sqlew operations.
pub type Result<T> = std::result::Result<T, Error>;

// ── Error Code ────────────────────────────────────────────────

/// Machine-readable error codes grouped by category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Validation
    ValidationFailed,
    InvalidLayer,
    InvalidCategory,
    InvalidStatus,
    InvalidPriority,
    InvalidJson,
    InvalidConfig,
    CycleDetected,
    InvalidTransition,
    BatchRejected,

    // Not found
    KeyNotFound,
    TaskNotFound,
    TemplateNotFound,
    NotFound,

    // Conflict / integrity
    Conflict,
    ForeignKeyViolation,

    // Schema
    SchemaMismatch,

    // Backend dispatch
    UnsupportedTool,
    LocalOnlyAction,

    // Infrastructure
    DatabaseError,
    QueueError,
    IoError,
    InternalError,
}

impl ErrorCode {
    /// Machine-readable SCREAMING_SNAKE code string.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::ValidationFailed => "VALIDATION_FAILED",
            Self::InvalidLayer => "INVALID_LAYER",
            Self::InvalidCategory => "INVALID_CATEGORY",
            Self::InvalidStatus => "INVALID_STATUS",
            Self::InvalidPriority => "INVALID_PRIORITY",
            Self::InvalidJson => "INVALID_JSON",
            Self::InvalidConfig => "INVALID_CONFIG",
            Self::CycleDetected => "CYCLE_DETECTED",
            Self::InvalidTransition => "INVALID_TRANSITION",
            Self::BatchRejected => "BATCH_REJECTED",
            Self::KeyNotFound => "KEY_NOT_FOUND",
            Self::TaskNotFound => "TASK_NOT_FOUND",
            Self::TemplateNotFound => "TEMPLATE_NOT_FOUND",
            Self::NotFound => "NOT_FOUND",
            Self::Conflict => "CONFLICT",
            Self::ForeignKeyViolation => "FOREIGN_KEY_VIOLATION",
            Self::SchemaMismatch => "SCHEMA_MISMATCH",
            Self::UnsupportedTool => "UNSUPPORTED_TOOL",
            Self::LocalOnlyAction => "LOCAL_ONLY_ACTION",
            Self::DatabaseError => "DATABASE_ERROR",
            Self::QueueError => "QUEUE_ERROR",
            Self::IoError => "IO_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Whether an agent should retry with corrected input.
    ///
    /// True for validation errors (wrong layer, status, priority, JSON
    /// shape). False for not-found, integrity, or infrastructure errors.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ValidationFailed
                | Self::InvalidLayer
                | Self::InvalidCategory
                | Self::InvalidStatus
                | Self::InvalidPriority
                | Self::InvalidJson
                | Self::InvalidTransition
                | Self::BatchRejected
        )
    }
}

// ── Error Enum ────────────────────────────────────────────────

/// Errors that can occur in sqlew operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Unknown layer '{name}'. Valid layers: {}", valid.join(", "))]
    UnknownLayer { name: String, valid: Vec<String> },

    #[error("Unknown constraint category '{name}'. Valid categories: {}", valid.join(", "))]
    UnknownCategory { name: String, valid: Vec<String> },

    #[error("Unknown status '{name}'. Valid statuses: {}", valid.join(", "))]
    UnknownStatus { name: String, valid: Vec<String> },

    #[error("Unknown priority '{name}'. Valid priorities: low, medium, high, critical")]
    UnknownPriority { name: String },

    #[error("Invalid {field}: {message}")]
    InvalidJsonShape { field: String, message: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Batch rejected:\n{0}")]
    BatchRejected(String),

    #[error("Circular dependency detected: {path}")]
    CircularDependency { path: String },

    #[error("Invalid task transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Task {id} has no work evidenced: all watched files are missing")]
    NoWorkEvidence { id: i64 },

    #[error("Decision key not found: {key}")]
    KeyNotFound { key: String },

    #[error("Task not found: {id}")]
    TaskNotFound { id: i64 },

    #[error("Template not found: {name}")]
    TemplateNotFound { name: String },

    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    #[error("{0}")]
    Conflict(String),

    #[error("Schema mismatch:\n{report}")]
    SchemaMismatch { report: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Tool '{tool}' is not supported by this backend")]
    UnsupportedTool { tool: String },

    #[error("Action '{action}' on tool '{tool}' is local-only")]
    LocalOnlyAction { tool: String, action: String },

    #[error("Remote backend error: {0}")]
    Remote(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Map this error to its structured `ErrorCode`.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::UnknownLayer { .. } => ErrorCode::InvalidLayer,
            Self::UnknownCategory { .. } => ErrorCode::InvalidCategory,
            Self::UnknownStatus { .. } => ErrorCode::InvalidStatus,
            Self::UnknownPriority { .. } => ErrorCode::InvalidPriority,
            Self::InvalidJsonShape { .. } => ErrorCode::InvalidJson,
            Self::Validation(_) => ErrorCode::ValidationFailed,
            Self::BatchRejected(_) => ErrorCode::BatchRejected,
            Self::CircularDependency { .. } => ErrorCode::CycleDetected,
            Self::InvalidTransition { .. } | Self::NoWorkEvidence { .. } => {
                ErrorCode::InvalidTransition
            }
            Self::KeyNotFound { .. } => ErrorCode::KeyNotFound,
            Self::TaskNotFound { .. } => ErrorCode::TaskNotFound,
            Self::TemplateNotFound { .. } => ErrorCode::TemplateNotFound,
            Self::NotFound { .. } => ErrorCode::NotFound,
            Self::Conflict(_) => ErrorCode::Conflict,
            Self::SchemaMismatch { .. } => ErrorCode::SchemaMismatch,
            Self::Config(_) => ErrorCode::InvalidConfig,
            Self::Queue(_) => ErrorCode::QueueError,
            Self::UnsupportedTool { .. } => ErrorCode::UnsupportedTool,
            Self::LocalOnlyAction { .. } => ErrorCode::LocalOnlyAction,
            Self::Remote(_) | Self::Database(_) => ErrorCode::DatabaseError,
            Self::Io(_) => ErrorCode::IoError,
            Self::Json(_) => ErrorCode::InvalidJson,
            Self::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Whether this error should trigger a local retry when returned by a
    /// remote backend.
    #[must_use]
    pub fn triggers_local_fallback(&self) -> bool {
        matches!(
            self.error_code(),
            ErrorCode::UnsupportedTool | ErrorCode::LocalOnlyAction
        ) || self.to_string().contains("not supported in SaaS mode")
    }

    /// Context-aware recovery hint for agents and humans.
    ///
    /// Returns `None` if no actionable suggestion exists.
    #[must_use]
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::UnknownLayer { valid, .. }
            | Self::UnknownCategory { valid, .. }
            | Self::UnknownStatus { valid, .. } => {
                Some(format!("Use one of: {}", valid.join(", ")))
            }
            Self::UnknownPriority { .. } => {
                Some("Use one of: low, medium, high, critical".to_string())
            }
            Self::KeyNotFound { key } => Some(format!(
                "No decision with key '{key}'. Use `sqlew query decisions` to list keys."
            )),
            Self::CircularDependency { .. } => Some(
                "Remove one of the edges on the reported path before retrying".to_string(),
            ),
            Self::NoWorkEvidence { .. } => Some(
                "Link at least one existing file to the task, or archive it instead"
                    .to_string(),
            ),
            Self::SchemaMismatch { .. } => Some(
                "Back up the database file and re-run migrations, point SQLEW_DB_PATH \
                 at a fresh location, or restore from backup"
                    .to_string(),
            ),
            _ => None,
        }
    }

    /// Structured JSON representation for machine consumption.
    #[must_use]
    pub fn to_structured_json(&self) -> serde_json::Value {
        let code = self.error_code();
        let mut obj = serde_json::json!({
            "error": {
                "code": code.as_str(),
                "message": self.to_string(),
                "retryable": code.is_retryable(),
            }
        });

        if let Some(hint) = self.hint() {
            obj["error"]["hint"] = serde_json::Value::String(hint);
        }

        obj
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_are_stable_strings() {
        assert_eq!(ErrorCode::UnsupportedTool.as_str(), "UNSUPPORTED_TOOL");
        assert_eq!(ErrorCode::LocalOnlyAction.as_str(), "LOCAL_ONLY_ACTION");
        assert_eq!(ErrorCode::CycleDetected.as_str(), "CYCLE_DETECTED");
    }

    #[test]
    fn validation_errors_are_retryable() {
        let e = Error::UnknownLayer {
            name: "ether".to_string(),
            valid: vec!["business".to_string()],
        };
        assert!(e.error_code().is_retryable());
        assert!(e.hint().is_some());
    }

    #[test]
    fn fallback_detection_covers_legacy_phrase() {
        let e = Error::Remote("this tool is not supported in SaaS mode".to_string());
        assert!(e.triggers_local_fallback());

        let e = Error::UnsupportedTool {
            tool: "decision".to_string(),
        };
        assert!(e.triggers_local_fallback());

        let e = Error::Remote("connection reset".to_string());
        assert!(!e.triggers_local_fallback());
    }

    #[test]
    fn structured_json_includes_hint() {
        let e = Error::KeyNotFound {
            key: "auth_method".to_string(),
        };
        let json = e.to_structured_json();
        assert_eq!(json["error"]["code"], "KEY_NOT_FOUND");
        assert!(json["error"]["hint"].as_str().unwrap().contains("auth_method"));
    }
}

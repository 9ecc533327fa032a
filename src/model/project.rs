//! Project, agent, file-change, and message models.

use serde::{Deserialize, Serialize};

use super::enums::{ChangeType, DetectionSource, Layer, Priority};

/// The top-level tenant; every transaction row carries a project ID.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: i64,
    pub name: String,
    pub display_name: Option<String>,
    pub detection_source: DetectionSource,
    pub root_path: Option<String>,
    pub created_at: String,
    pub last_active_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// An agent, auto-created on first reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: i64,
    pub name: String,
    pub last_active_at: String,
}

/// Resolved file-change projection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileChange {
    pub id: i64,
    pub path: String,
    pub change_type: ChangeType,
    pub layer: Option<Layer>,
    pub agent: Option<String>,
    pub description: Option<String>,
    pub recorded_at: String,
}

/// Validated input for `file.record`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileChangeInput {
    pub path: String,
    pub change_type: String,
    #[serde(default)]
    pub layer: Option<String>,
    #[serde(default)]
    pub agent: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// An agent-to-agent message; subject to retention.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub from_agent: String,
    pub to_agent: Option<String>,
    pub content: String,
    pub priority: Priority,
    pub sent_at: String,
}

/// Validated input for `message.send`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageInput {
    pub from_agent: String,
    #[serde(default)]
    pub to_agent: Option<String>,
    pub content: String,
    #[serde(default)]
    pub priority: Option<String>,
}

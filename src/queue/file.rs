//! Queue file format and producer-side operations.
//!
//! The queue is UTF-8 JSON of shape `{ "items": [ QueueItem ] }`. A file
//! that is absent or fails to parse reads as empty (Transient, per the
//! error taxonomy). Writes go through a temp file plus atomic rename; on
//! rename failure (e.g. cross-device) the producer falls back to a direct
//! write and unlinks the temp.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::queue::pending_path;

/// Entity kind carried by a queue item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueKind {
    Decision,
    Constraint,
    /// Forward-compatibility: items with kinds this build does not know
    /// land in the retry set instead of poisoning the whole file.
    #[serde(other)]
    Unknown,
}

/// Action carried by a queue item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueAction {
    Create,
    Update,
    Activate,
    #[serde(other)]
    Unknown,
}

/// One queued intention. `data` stays opaque at this layer: unknown keys
/// inside it are ignored, and missing required keys surface at drain time
/// (sending the item to the retry set).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem {
    #[serde(rename = "type")]
    pub kind: QueueKind,
    pub action: QueueAction,
    pub timestamp: String,
    pub data: serde_json::Value,
}

impl QueueItem {
    #[must_use]
    pub fn new(kind: QueueKind, action: QueueAction, data: serde_json::Value) -> Self {
        Self {
            kind,
            action,
            timestamp: chrono::Utc::now().to_rfc3339(),
            data,
        }
    }

    fn data_str(&self, field: &str) -> Option<&str> {
        self.data.get(field).and_then(|v| v.as_str())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct QueueFile {
    #[serde(default)]
    items: Vec<QueueItem>,
}

/// Read the queue. Absent or unparseable files read as empty.
#[must_use]
pub fn read_queue(queue_dir: &Path) -> Vec<QueueItem> {
    let path = pending_path(queue_dir);
    let Ok(content) = fs::read_to_string(&path) else {
        return Vec::new();
    };
    match serde_json::from_str::<QueueFile>(&content) {
        Ok(file) => file.items,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Queue file unparseable, treating as empty");
            Vec::new()
        }
    }
}

/// Write the full item list via temp-then-rename.
///
/// After this returns, readers see either the previous complete file or
/// the new complete file, never a truncated one.
pub fn write_queue(queue_dir: &Path, items: &[QueueItem]) -> Result<()> {
    fs::create_dir_all(queue_dir)?;
    let path = pending_path(queue_dir);
    let tmp = path.with_extension("json.tmp");

    let payload = serde_json::to_string_pretty(&QueueFile {
        items: items.to_vec(),
    })?;
    fs::write(&tmp, &payload)?;

    if let Err(rename_err) = fs::rename(&tmp, &path) {
        // Cross-device or similar: degrade to a direct write.
        debug!(error = %rename_err, "Atomic rename failed, falling back to direct write");
        fs::write(&path, &payload)?;
        let _ = fs::remove_file(&tmp);
    }
    Ok(())
}

/// Producer-side enqueue: read, deduplicate, append, rewrite.
///
/// Deduplication guarantee: a `decision`/`create` is skipped when the same
/// `data.key` is already queued; a `constraint`/`create` when the same
/// `data.text` is already queued. Existing items are never reordered.
/// Returns `false` when the item was dropped as a duplicate.
pub fn enqueue(queue_dir: &Path, item: QueueItem) -> Result<bool> {
    let items = read_queue(queue_dir);

    let duplicate = match (item.kind, item.action) {
        (QueueKind::Decision, QueueAction::Create) => {
            let Some(key) = item.data_str("key") else {
                return Err(Error::Queue(
                    "decision item is missing data.key".to_string(),
                ));
            };
            items.iter().any(|existing| {
                existing.kind == QueueKind::Decision
                    && existing.action == QueueAction::Create
                    && existing.data_str("key") == Some(key)
            })
        }
        (QueueKind::Constraint, QueueAction::Create) => {
            let Some(text) = item.data_str("text") else {
                return Err(Error::Queue(
                    "constraint item is missing data.text".to_string(),
                ));
            };
            items.iter().any(|existing| {
                existing.kind == QueueKind::Constraint
                    && existing.action == QueueAction::Create
                    && existing.data_str("text") == Some(text)
            })
        }
        _ => false,
    };

    if duplicate {
        debug!("Skipping duplicate queue item");
        return Ok(false);
    }

    let mut items = items;
    items.push(item);
    write_queue(queue_dir, &items)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn decision_item(key: &str) -> QueueItem {
        QueueItem::new(
            QueueKind::Decision,
            QueueAction::Create,
            json!({ "key": key, "value": "v", "tags": ["security"] }),
        )
    }

    #[test]
    fn absent_file_reads_empty() {
        let tmp = TempDir::new().unwrap();
        assert!(read_queue(tmp.path()).is_empty());
    }

    #[test]
    fn corrupt_file_reads_empty() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path()).unwrap();
        fs::write(pending_path(tmp.path()), "{ items: [ trunc").unwrap();
        assert!(read_queue(tmp.path()).is_empty());
    }

    #[test]
    fn enqueue_appends_and_round_trips() {
        let tmp = TempDir::new().unwrap();
        assert!(enqueue(tmp.path(), decision_item("security/jwt")).unwrap());
        assert!(enqueue(tmp.path(), decision_item("api/timeout")).unwrap());

        let items = read_queue(tmp.path());
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].data["key"], "security/jwt");
        assert_eq!(items[1].data["key"], "api/timeout");

        // The on-disk file is complete, parseable JSON.
        let raw = fs::read_to_string(pending_path(tmp.path())).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed["items"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn duplicate_decision_keys_are_skipped() {
        // Scenario D step 1: two enqueues of the same key leave one item.
        let tmp = TempDir::new().unwrap();
        assert!(enqueue(tmp.path(), decision_item("security/jwt")).unwrap());
        assert!(!enqueue(tmp.path(), decision_item("security/jwt")).unwrap());

        let items = read_queue(tmp.path());
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn duplicate_constraint_texts_are_skipped() {
        let tmp = TempDir::new().unwrap();
        let make = || {
            QueueItem::new(
                QueueKind::Constraint,
                QueueAction::Create,
                json!({ "text": "tokens expire in 15m", "category": "security" }),
            )
        };
        assert!(enqueue(tmp.path(), make()).unwrap());
        assert!(!enqueue(tmp.path(), make()).unwrap());
        assert_eq!(read_queue(tmp.path()).len(), 1);
    }

    #[test]
    fn activate_items_are_never_deduplicated() {
        let tmp = TempDir::new().unwrap();
        let make = || {
            QueueItem::new(
                QueueKind::Constraint,
                QueueAction::Activate,
                json!({ "plan_id": "plan-42", "active": true }),
            )
        };
        assert!(enqueue(tmp.path(), make()).unwrap());
        assert!(enqueue(tmp.path(), make()).unwrap());
        assert_eq!(read_queue(tmp.path()).len(), 2);
    }

    #[test]
    fn unknown_kind_survives_parsing() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            pending_path(tmp.path()),
            r#"{ "items": [
                { "type": "hologram", "action": "create", "timestamp": "t", "data": {} },
                { "type": "decision", "action": "create", "timestamp": "t",
                  "data": { "key": "k", "value": "v" } }
            ] }"#,
        )
        .unwrap();

        let items = read_queue(tmp.path());
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].kind, QueueKind::Unknown);
        assert_eq!(items[1].kind, QueueKind::Decision);
    }

    #[test]
    fn unknown_keys_in_data_are_preserved_opaquely() {
        let tmp = TempDir::new().unwrap();
        let item = QueueItem::new(
            QueueKind::Decision,
            QueueAction::Create,
            json!({ "key": "k", "value": "v", "surprise": { "nested": true } }),
        );
        enqueue(tmp.path(), item).unwrap();
        let items = read_queue(tmp.path());
        assert_eq!(items[0].data["surprise"]["nested"], true);
    }
}

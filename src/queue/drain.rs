//! The drain cycle: apply queued items to the engine under the lock.
//!
//! Protocol: acquire the lock, read the queue, clear it immediately
//! (closing the race where a drain triggered by the subsequent
//! file-change event would re-see the same items), apply items in
//! insertion order collecting failures, put failed items back for the
//! next cycle, release the lock.

use std::path::Path;

use serde::Deserialize;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::model::constraint::ConstraintInput;
use crate::model::decision::{DecisionValue, SetDecision};
use crate::queue::file::{read_queue, write_queue, QueueAction, QueueItem, QueueKind};
use crate::queue::lock::DrainLock;
use crate::storage::Engine;

/// What a drain cycle did.
#[derive(Debug, Default)]
pub struct DrainReport {
    /// False when another drain held the lock and this attempt backed off.
    pub ran: bool,
    pub applied: usize,
    pub failed: usize,
}

/// Typed payload of a `decision` item. Unknown keys are ignored.
#[derive(Debug, Deserialize)]
struct DecisionPayload {
    key: String,
    value: serde_json::Value,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    layer: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    agent: Option<String>,
}

/// Typed payload of a `constraint` create item.
#[derive(Debug, Deserialize)]
struct ConstraintPayload {
    text: String,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    priority: Option<String>,
    #[serde(default)]
    layer: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    active: Option<bool>,
    #[serde(default)]
    plan_id: Option<String>,
}

/// Typed payload of a `constraint` activate item.
#[derive(Debug, Deserialize)]
struct ActivatePayload {
    plan_id: String,
}

/// Run one drain cycle. Returns without work when the lock is busy.
pub fn drain(engine: &mut Engine, queue_dir: &Path) -> Result<DrainReport> {
    let Some(lock) = DrainLock::try_acquire(queue_dir)? else {
        return Ok(DrainReport::default());
    };

    let items = read_queue(queue_dir);
    if items.is_empty() {
        lock.release();
        return Ok(DrainReport {
            ran: true,
            ..DrainReport::default()
        });
    }

    // Clear before applying: a producer appending mid-drain lands in a
    // fresh file and triggers its own watch event.
    write_queue(queue_dir, &[])?;

    let mut failures: Vec<(QueueItem, Error)> = Vec::new();
    let mut applied = 0;
    for item in items {
        match apply_item(engine, &item) {
            Ok(()) => applied += 1,
            Err(e) => {
                warn!(error = %e, "Queue item failed, scheduling retry");
                failures.push((item, e));
            }
        }
    }

    let failed = failures.len();
    if failed > 0 {
        // Failed items go back in front of anything a producer appended
        // while we were applying; relative order is preserved.
        let appended = read_queue(queue_dir);
        let mut retry: Vec<QueueItem> = failures.into_iter().map(|(item, _)| item).collect();
        retry.extend(appended);
        write_queue(queue_dir, &retry)?;
    }

    lock.release();
    info!(applied, failed, "Drain cycle complete");
    Ok(DrainReport {
        ran: true,
        applied,
        failed,
    })
}

/// Apply one item. Decode failures (missing required keys, unknown
/// kind/action) are item-level errors that send the item to the retry
/// set; they never abort the cycle.
fn apply_item(engine: &mut Engine, item: &QueueItem) -> Result<()> {
    match (item.kind, item.action) {
        (QueueKind::Decision, QueueAction::Create | QueueAction::Update) => {
            let payload: DecisionPayload = serde_json::from_value(item.data.clone())
                .map_err(|e| Error::Queue(format!("decision payload invalid: {e}")))?;

            let value = match &payload.value {
                serde_json::Value::Number(n) => {
                    DecisionValue::Number(n.as_f64().unwrap_or_default())
                }
                serde_json::Value::String(s) => DecisionValue::Text(s.clone()),
                other => DecisionValue::Text(other.to_string()),
            };
            engine.set_decision(SetDecision {
                key: payload.key,
                value,
                layer: payload.layer,
                tags: payload.tags,
                scopes: Vec::new(),
                agent: payload.agent,
                version: None,
                status: payload.status,
            })
        }
        (QueueKind::Constraint, QueueAction::Create) => {
            let payload: ConstraintPayload = serde_json::from_value(item.data.clone())
                .map_err(|e| Error::Queue(format!("constraint payload invalid: {e}")))?;

            let mut tags = payload.tags;
            if let Some(plan_id) = &payload.plan_id {
                if !tags.contains(plan_id) {
                    tags.push(plan_id.clone());
                }
            }
            engine
                .add_constraint(ConstraintInput {
                    category: payload.category.unwrap_or_else(|| "process".to_string()),
                    constraint_text: payload.text,
                    priority: payload.priority,
                    layer: payload.layer,
                    tags,
                    created_by: None,
                    active: payload.active,
                })
                .map(|_| ())
        }
        (QueueKind::Constraint, QueueAction::Activate) => {
            let payload: ActivatePayload = serde_json::from_value(item.data.clone())
                .map_err(|e| Error::Queue(format!("activate payload invalid: {e}")))?;
            engine.activate_constraints_by_tag(&payload.plan_id).map(|_| ())
        }
        (kind, action) => Err(Error::Queue(format!(
            "unsupported queue item: {kind:?}/{action:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ConstraintFilter;
    use crate::queue::file::enqueue;
    use crate::queue::lock_path;
    use serde_json::json;
    use tempfile::TempDir;

    fn setup() -> (Engine, TempDir) {
        (Engine::open_memory("demo").unwrap(), TempDir::new().unwrap())
    }

    fn decision_item(key: &str) -> QueueItem {
        QueueItem::new(
            QueueKind::Decision,
            QueueAction::Create,
            json!({ "key": key, "value": "v", "status": "active",
                    "layer": "business", "tags": ["security"] }),
        )
    }

    #[test]
    fn drain_applies_items_and_empties_queue() {
        // Scenario D step 2.
        let (mut engine, tmp) = setup();
        enqueue(tmp.path(), decision_item("security/jwt")).unwrap();
        enqueue(tmp.path(), decision_item("security/jwt")).unwrap(); // dedup

        let report = drain(&mut engine, tmp.path()).unwrap();
        assert!(report.ran);
        assert_eq!(report.applied, 1);
        assert_eq!(report.failed, 0);

        assert!(engine.get_decision("security/jwt").is_ok());
        assert!(read_queue(tmp.path()).is_empty());
        assert!(!lock_path(tmp.path()).exists(), "lock released");
    }

    #[test]
    fn busy_lock_abandons_the_attempt() {
        let (mut engine, tmp) = setup();
        enqueue(tmp.path(), decision_item("k")).unwrap();
        let _held = DrainLock::try_acquire(tmp.path()).unwrap().unwrap();

        let report = drain(&mut engine, tmp.path()).unwrap();
        assert!(!report.ran);
        assert_eq!(read_queue(tmp.path()).len(), 1, "items untouched");
    }

    #[test]
    fn stale_lock_is_reaped_and_drain_proceeds() {
        let (mut engine, tmp) = setup();
        enqueue(tmp.path(), decision_item("k")).unwrap();
        std::fs::write(
            lock_path(tmp.path()),
            json!({ "pid": 1, "timestamp": chrono::Utc::now().timestamp_millis() - 40_000 })
                .to_string(),
        )
        .unwrap();

        let report = drain(&mut engine, tmp.path()).unwrap();
        assert!(report.ran);
        assert_eq!(report.applied, 1);
    }

    #[test]
    fn failed_items_return_to_queue_in_order() {
        let (mut engine, tmp) = setup();
        // Missing data.key: decodes to an item-level failure at apply time.
        let bad = QueueItem::new(
            QueueKind::Decision,
            QueueAction::Create,
            json!({ "value": "orphan" }),
        );
        write_queue(tmp.path(), &[bad]).unwrap();
        enqueue(tmp.path(), decision_item("good/one")).unwrap();

        let report = drain(&mut engine, tmp.path()).unwrap();
        assert_eq!(report.applied, 1);
        assert_eq!(report.failed, 1);

        let retry = read_queue(tmp.path());
        assert_eq!(retry.len(), 1);
        assert!(retry[0].data.get("key").is_none());
        assert!(engine.get_decision("good/one").is_ok());
    }

    #[test]
    fn constraint_flow_creates_inactive_then_activates_by_plan() {
        let (mut engine, tmp) = setup();
        enqueue(
            tmp.path(),
            QueueItem::new(
                QueueKind::Constraint,
                QueueAction::Create,
                json!({ "text": "no direct db access from ui", "category": "architecture",
                        "active": false, "plan_id": "plan-7" }),
            ),
        )
        .unwrap();
        drain(&mut engine, tmp.path()).unwrap();

        assert!(engine
            .get_constraints(&ConstraintFilter::default())
            .unwrap()
            .is_empty());

        enqueue(
            tmp.path(),
            QueueItem::new(
                QueueKind::Constraint,
                QueueAction::Activate,
                json!({ "plan_id": "plan-7", "active": true }),
            ),
        )
        .unwrap();
        drain(&mut engine, tmp.path()).unwrap();

        let active = engine.get_constraints(&ConstraintFilter::default()).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].constraint_text, "no direct db access from ui");
    }

    #[test]
    fn unknown_kinds_go_to_retry_not_poison() {
        let (mut engine, tmp) = setup();
        std::fs::write(
            crate::queue::pending_path(tmp.path()),
            r#"{ "items": [
                { "type": "hologram", "action": "create", "timestamp": "t", "data": {} },
                { "type": "decision", "action": "create", "timestamp": "t",
                  "data": { "key": "k", "value": "v" } }
            ] }"#,
        )
        .unwrap();

        let report = drain(&mut engine, tmp.path()).unwrap();
        assert_eq!(report.applied, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(read_queue(tmp.path()).len(), 1);
    }

    #[test]
    fn empty_queue_drain_is_a_noop() {
        let (mut engine, tmp) = setup();
        let report = drain(&mut engine, tmp.path()).unwrap();
        assert!(report.ran);
        assert_eq!(report.applied, 0);
    }
}

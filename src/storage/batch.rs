//! Batch executor: atomic vs best-effort with per-item validation.
//!
//! The same pattern backs `decision.set_batch`, `task.create_batch`,
//! `file.record_batch`, and `message.send_batch`. Pre-flight validation
//! runs over every item before any write; a structurally invalid batch is
//! rejected before a transaction opens, with the aggregated error listing
//! all offending items.

use rusqlite::Transaction;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{Error, Result};
use crate::model::decision::SetDecision;
use crate::model::enums::{ChangeType, DecisionStatus, Layer, Priority, TaskStatus};
use crate::model::project::{FileChangeInput, MessageInput};
use crate::model::task::TaskInput;
use crate::storage::{constraints, decisions, files, messages, tasks, Engine};

/// Hard cap on batch size.
pub const BATCH_LIMIT: usize = 50;

/// Per-item result in non-atomic mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchItemResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of a batch call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub success: bool,
    pub inserted: usize,
    pub failed: usize,
    pub results: Vec<BatchItemResult>,
}

/// Run a batch with the shared protocol.
///
/// `validate` is the structural pre-flight check; `apply` performs the
/// write for one item inside the supplied transaction.
fn run_batch<T>(
    engine: &mut Engine,
    items: &[T],
    atomic: bool,
    validate: impl Fn(&T) -> Result<()>,
    apply: impl Fn(&Transaction, i64, &T) -> Result<serde_json::Value>,
) -> Result<BatchOutcome> {
    if items.is_empty() {
        return Err(Error::Validation("batch contains no items".to_string()));
    }
    if items.len() > BATCH_LIMIT {
        return Err(Error::Validation(format!(
            "batch of {} items exceeds the limit of {BATCH_LIMIT}",
            items.len()
        )));
    }

    // Pre-flight: collect every structural violation before any write.
    let mut violations = Vec::new();
    for (index, item) in items.iter().enumerate() {
        if let Err(e) = validate(item) {
            violations.push(format!("Item {index} ❌ {e}"));
        }
    }
    if !violations.is_empty() {
        return Err(Error::BatchRejected(violations.join("\n")));
    }

    let project_id = engine.project_id();

    if atomic {
        // One transaction; the first failure rolls back every item.
        let results = engine.transaction(|tx| {
            let mut results = Vec::with_capacity(items.len());
            for (index, item) in items.iter().enumerate() {
                let data = apply(tx, project_id, item)
                    .map_err(|e| Error::BatchRejected(format!("Item {index} ❌ {e}")))?;
                results.push(BatchItemResult {
                    success: true,
                    data: Some(data),
                    error: None,
                });
            }
            Ok(results)
        })?;

        return Ok(BatchOutcome {
            success: true,
            inserted: results.len(),
            failed: 0,
            results,
        });
    }

    // Best-effort: each item in its own transaction.
    let mut results = Vec::with_capacity(items.len());
    let mut inserted = 0;
    let mut failed = 0;
    for item in items {
        match engine.transaction(|tx| apply(tx, project_id, item)) {
            Ok(data) => {
                inserted += 1;
                results.push(BatchItemResult {
                    success: true,
                    data: Some(data),
                    error: None,
                });
            }
            Err(e) => {
                failed += 1;
                results.push(BatchItemResult {
                    success: false,
                    data: None,
                    error: Some(e.to_string()),
                });
            }
        }
    }

    Ok(BatchOutcome {
        success: failed == 0,
        inserted,
        failed,
        results,
    })
}

// ── Per-type structural validation ────────────────────────────

fn validate_set_decision(item: &SetDecision) -> Result<()> {
    if item.key.trim().is_empty() {
        return Err(Error::Validation("key: must not be empty".to_string()));
    }
    if let Some(layer) = &item.layer {
        Layer::parse(layer)?;
    }
    if let Some(status) = &item.status {
        DecisionStatus::parse(status)?;
    }
    Ok(())
}

fn validate_task_input(item: &TaskInput) -> Result<()> {
    if item.title.trim().is_empty() {
        return Err(Error::Validation("title: must not be empty".to_string()));
    }
    if let Some(status) = &item.status {
        TaskStatus::parse(status)?;
    }
    if let Some(priority) = &item.priority {
        Priority::parse(priority)?;
    }
    if let Some(layer) = &item.layer {
        Layer::parse(layer)?;
    }
    Ok(())
}

fn validate_file_input(item: &FileChangeInput) -> Result<()> {
    if item.path.trim().is_empty() {
        return Err(Error::Validation("path: must not be empty".to_string()));
    }
    ChangeType::parse(&item.change_type)?;
    if let Some(layer) = &item.layer {
        Layer::parse(layer)?;
    }
    Ok(())
}

fn validate_message_input(item: &MessageInput) -> Result<()> {
    if item.from_agent.trim().is_empty() {
        return Err(Error::Validation("from_agent: must not be empty".to_string()));
    }
    if item.content.trim().is_empty() {
        return Err(Error::Validation("content: must not be empty".to_string()));
    }
    if let Some(priority) = &item.priority {
        Priority::parse(priority)?;
    }
    Ok(())
}

// ── Engine batch operations ───────────────────────────────────

impl Engine {
    /// `decision.set_batch`.
    pub fn set_decision_batch(
        &mut self,
        items: &[SetDecision],
        atomic: bool,
    ) -> Result<BatchOutcome> {
        run_batch(self, items, atomic, validate_set_decision, |tx, project_id, item| {
            decisions::set_decision_in(tx, project_id, item)?;
            Ok(json!({ "key": item.key }))
        })
    }

    /// `task.create_batch`.
    pub fn create_task_batch(&mut self, items: &[TaskInput], atomic: bool) -> Result<BatchOutcome> {
        run_batch(self, items, atomic, validate_task_input, |tx, project_id, item| {
            let id = tasks::create_task_in(tx, project_id, item)?;
            Ok(json!({ "id": id, "title": item.title }))
        })
    }

    /// `constraint.add_batch`.
    pub fn add_constraint_batch(
        &mut self,
        items: &[crate::model::ConstraintInput],
        atomic: bool,
    ) -> Result<BatchOutcome> {
        run_batch(
            self,
            items,
            atomic,
            |item| {
                if item.constraint_text.trim().is_empty() {
                    return Err(Error::Validation(
                        "constraint_text: must not be empty".to_string(),
                    ));
                }
                crate::model::ConstraintCategory::parse(&item.category)?;
                if let Some(priority) = &item.priority {
                    Priority::parse(priority)?;
                }
                Ok(())
            },
            |tx, project_id, item| {
                let id = constraints::add_constraint_in(tx, project_id, item)?;
                Ok(json!({ "id": id }))
            },
        )
    }

    /// `file.record_batch`.
    pub fn record_file_batch(
        &mut self,
        items: &[FileChangeInput],
        atomic: bool,
    ) -> Result<BatchOutcome> {
        run_batch(self, items, atomic, validate_file_input, |tx, project_id, item| {
            let id = files::record_file_change_in(tx, project_id, item)?;
            Ok(json!({ "id": id, "path": item.path }))
        })
    }

    /// `message.send_batch`.
    pub fn send_message_batch(
        &mut self,
        items: &[MessageInput],
        atomic: bool,
    ) -> Result<BatchOutcome> {
        let outcome = run_batch(
            self,
            items,
            atomic,
            validate_message_input,
            |tx, project_id, item| {
                let id = messages::send_message_in(tx, project_id, item)?;
                Ok(json!({ "id": id }))
            },
        )?;
        if let Err(e) = self.perform_auto_cleanup() {
            tracing::warn!(error = %e, "Post-batch retention failed");
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SetDecision;

    fn engine() -> Engine {
        Engine::open_memory("demo").unwrap()
    }

    fn decision_count(engine: &Engine) -> i64 {
        engine
            .conn()
            .query_row("SELECT COUNT(*) FROM t_decisions", [], |r| r.get(0))
            .unwrap()
    }

    #[test]
    fn atomic_batch_is_all_or_nothing() {
        // Scenario F: [valid, invalid-layer, valid] leaves no trace.
        let mut engine = engine();
        let items = vec![
            SetDecision::new("a", "1"),
            SetDecision::new("b", "2").with_layer("etheric"),
            SetDecision::new("c", "3"),
        ];

        let before = decision_count(&engine);
        let err = engine.set_decision_batch(&items, true).unwrap_err();
        assert!(matches!(err, Error::BatchRejected(_)));
        assert_eq!(decision_count(&engine), before);
    }

    #[test]
    fn preflight_aggregates_all_offending_items() {
        let mut engine = engine();
        let items = vec![
            SetDecision::new("", "1"),
            SetDecision::new("b", "2").with_layer("etheric"),
            SetDecision::new("c", "3"),
        ];

        let err = engine.set_decision_batch(&items, false).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("Item 0"));
        assert!(msg.contains("Item 1"));
        assert!(!msg.contains("Item 2"));
        assert!(msg.contains("Valid layers"), "lists enum options: {msg}");
        assert!(msg.contains("etheric"), "names the offending value: {msg}");
    }

    #[test]
    fn atomic_success_inserts_everything() {
        let mut engine = engine();
        let items: Vec<SetDecision> = (0..5)
            .map(|i| SetDecision::new(&format!("key_{i}"), "v"))
            .collect();

        let outcome = engine.set_decision_batch(&items, true).unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.inserted, 5);
        assert_eq!(outcome.failed, 0);
        assert_eq!(decision_count(&engine), 5);
    }

    #[test]
    fn non_atomic_reports_per_item_results() {
        let mut engine = engine();
        let items = vec![
            crate::model::TaskInput::new("one"),
            crate::model::TaskInput::new("two"),
        ];
        let outcome = engine.create_task_batch(&items, false).unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.inserted, 2);
        assert_eq!(outcome.results.len(), 2);
        assert!(outcome.results.iter().all(|r| r.success));
        assert!(outcome.results[0].data.as_ref().unwrap()["id"].is_i64());
    }

    #[test]
    fn batch_limit_enforced() {
        let mut engine = engine();
        let items: Vec<SetDecision> = (0..51)
            .map(|i| SetDecision::new(&format!("k{i}"), "v"))
            .collect();
        let err = engine.set_decision_batch(&items, true).unwrap_err();
        assert!(err.to_string().contains("limit of 50"));
    }

    #[test]
    fn empty_batch_rejected() {
        let mut engine = engine();
        assert!(engine.set_decision_batch(&[], true).is_err());
    }

    #[test]
    fn mixed_type_batches_share_the_pattern() {
        let mut engine = engine();
        let files = vec![
            crate::model::FileChangeInput {
                path: "src/a.rs".to_string(),
                change_type: "created".to_string(),
                layer: None,
                agent: None,
                description: None,
            },
            crate::model::FileChangeInput {
                path: "src/b.rs".to_string(),
                change_type: "sideways".to_string(),
                layer: None,
                agent: None,
                description: None,
            },
        ];
        let err = engine.record_file_batch(&files, true).unwrap_err();
        assert!(err.to_string().contains("Item 1"));

        let messages = vec![MessageInput {
            from_agent: "a".to_string(),
            to_agent: None,
            content: "hello".to_string(),
            priority: None,
        }];
        let outcome = engine.send_message_batch(&messages, false).unwrap();
        assert_eq!(outcome.inserted, 1);
    }
}

//! Hook entry points: short-lived, queue-only commands.
//!
//! These run from agent hooks while the supervisor may hold the database,
//! so they never open it. They write intentions to the queue file and
//! exit; the supervisor's watcher drains them.

use serde_json::json;

use crate::cli::commands::CommandContext;
use crate::cli::{HookConstraintArgs, HookDecisionArgs};
use crate::error::Result;
use crate::queue::{enqueue, read_queue, QueueAction, QueueItem, QueueKind};

/// `save` and `suggest`: queue a decision create. Deduplication in the
/// queue guarantees at most one pending item per key.
pub fn queue_decision(ctx: &CommandContext, args: &HookDecisionArgs, json_out: bool) -> Result<()> {
    let mut data = json!({
        "key": args.key,
        "value": args.value,
    });
    if let Some(layer) = &args.layer {
        data["layer"] = json!(layer);
    }
    if let Some(status) = &args.status {
        data["status"] = json!(status);
    }
    if !args.tags.is_empty() {
        data["tags"] = json!(args.tags);
    }

    let queued = enqueue(
        &ctx.queue_dir,
        QueueItem::new(QueueKind::Decision, QueueAction::Create, data),
    )?;

    if json_out {
        println!("{}", json!({ "queued": queued, "key": args.key }));
    } else if queued {
        println!("Queued decision '{}'", args.key);
    } else {
        println!("Decision '{}' already queued, skipped", args.key);
    }
    Ok(())
}

/// `track-plan`: queue a plan-mode constraint, created inactive so it
/// only binds once the plan is committed.
pub fn queue_plan_constraint(
    ctx: &CommandContext,
    args: &HookConstraintArgs,
    json_out: bool,
) -> Result<()> {
    let mut data = json!({
        "text": args.text,
        "active": false,
    });
    if let Some(category) = &args.category {
        data["category"] = json!(category);
    }
    if let Some(priority) = &args.priority {
        data["priority"] = json!(priority);
    }
    if let Some(layer) = &args.layer {
        data["layer"] = json!(layer);
    }
    if !args.tags.is_empty() {
        data["tags"] = json!(args.tags);
    }
    if let Some(plan_id) = &args.plan_id {
        data["plan_id"] = json!(plan_id);
    }

    let queued = enqueue(
        &ctx.queue_dir,
        QueueItem::new(QueueKind::Constraint, QueueAction::Create, data),
    )?;

    if json_out {
        println!("{}", json!({ "queued": queued }));
    } else if queued {
        println!("Queued plan constraint");
    } else {
        println!("Constraint already queued, skipped");
    }
    Ok(())
}

/// `on-exit-plan`: queue activation of everything captured under the
/// plan's tag.
pub fn queue_plan_activation(ctx: &CommandContext, plan_id: &str, json_out: bool) -> Result<()> {
    enqueue(
        &ctx.queue_dir,
        QueueItem::new(
            QueueKind::Constraint,
            QueueAction::Activate,
            json!({ "plan_id": plan_id, "active": true }),
        ),
    )?;

    if json_out {
        println!("{}", json!({ "queued": true, "plan_id": plan_id }));
    } else {
        println!("Queued activation for plan '{plan_id}'");
    }
    Ok(())
}

/// `on-enter-plan`: acknowledgement only. Plan flags are opaque planner
/// state; nothing reaches the store until constraints are tracked.
pub fn on_enter_plan(plan_id: &str, json_out: bool) -> Result<()> {
    if json_out {
        println!("{}", json!({ "plan_id": plan_id }));
    } else {
        println!("Plan '{plan_id}' started; use track-plan to capture constraints");
    }
    Ok(())
}

/// `check-completion`: report pending queue contents without opening the
/// database.
pub fn check_completion(ctx: &CommandContext, json_out: bool) -> Result<()> {
    let items = read_queue(&ctx.queue_dir);

    if json_out {
        println!(
            "{}",
            json!({ "pending": items.len(),
                    "keys": items.iter()
                        .filter_map(|i| i.data.get("key").and_then(|k| k.as_str()))
                        .collect::<Vec<_>>() })
        );
    } else if items.is_empty() {
        println!("Queue is empty; nothing pending");
    } else {
        println!("{} item(s) pending drain:", items.len());
        for item in &items {
            let hint = item
                .data
                .get("key")
                .or_else(|| item.data.get("text"))
                .and_then(|v| v.as_str())
                .unwrap_or("?");
            println!("  {:?}/{:?}: {hint}", item.kind, item.action);
        }
    }
    Ok(())
}

/// `mark-done`, `on-stop`, `on-subagent-stop`: acknowledgement hooks.
/// They exist so hook wiring can be uniform; the store is only touched by
/// the supervisor.
pub fn acknowledge(name: &str, json_out: bool) -> Result<()> {
    if json_out {
        println!("{}", json!({ "hook": name, "ok": true }));
    } else {
        println!("ok ({name})");
    }
    Ok(())
}

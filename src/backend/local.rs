//! Local backend: tool calls executed against the in-process engine.

use serde_json::{json, Value};

use crate::backend::{
    Backend, ConstraintAction, DecisionAction, FileAction, MessageAction, TaskAction,
};
use crate::error::{Error, Result};
use crate::storage::decisions::parse_updated_after;
use crate::storage::Engine;

/// The in-process Storage & Coordination Engine behind the backend trait.
#[derive(Debug)]
pub struct LocalBackend {
    engine: Engine,
}

impl LocalBackend {
    #[must_use]
    pub fn new(engine: Engine) -> Self {
        Self { engine }
    }

    #[must_use]
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    #[must_use]
    pub fn engine_mut(&mut self) -> &mut Engine {
        &mut self.engine
    }

    fn execute_decision(&mut self, action: DecisionAction) -> Result<Value> {
        match action {
            DecisionAction::Set(input) => {
                let key = input.key.clone();
                self.engine.set_decision(input)?;
                Ok(json!({ "key": key }))
            }
            DecisionAction::QuickSet(input) => {
                let key = input.key.clone();
                self.engine.quick_set(input)?;
                Ok(json!({ "key": key }))
            }
            DecisionAction::Get { key } => Ok(serde_json::to_value(
                self.engine.get_decision(&key)?,
            )?),
            DecisionAction::SetBatch { items, atomic } => Ok(serde_json::to_value(
                self.engine.set_decision_batch(&items, atomic)?,
            )?),
            DecisionAction::SearchByTags {
                tags,
                mode,
                layer,
                status,
                limit,
            } => Ok(serde_json::to_value(self.engine.search_by_tags(
                &tags,
                mode,
                layer.as_deref(),
                status.as_deref(),
                limit,
            )?)?),
            DecisionAction::SearchByLayer {
                layer,
                status,
                include_tags,
                limit,
            } => Ok(serde_json::to_value(self.engine.search_by_layer(
                &layer,
                status.as_deref(),
                include_tags,
                limit,
            )?)?),
            DecisionAction::SearchAdvanced(filter) => Ok(serde_json::to_value(
                self.engine.search_advanced(&filter)?,
            )?),
            DecisionAction::GetVersions { key } => Ok(serde_json::to_value(
                self.engine.get_versions(&key)?,
            )?),
            DecisionAction::AddContext(input) => {
                let id = self.engine.add_decision_context(input)?;
                Ok(json!({ "id": id }))
            }
            DecisionAction::HasUpdates { since_ts } => {
                Ok(json!({ "has_updates": self.engine.has_updates(since_ts)? }))
            }
            DecisionAction::CreateTemplate(template) => {
                let id = self.engine.create_template(&template)?;
                Ok(json!({ "id": id }))
            }
            DecisionAction::ListTemplates => Ok(serde_json::to_value(
                self.engine.list_templates()?,
            )?),
            DecisionAction::SetFromTemplate { template, item } => {
                let key = item.key.clone();
                self.engine.set_from_template(&template, item)?;
                Ok(json!({ "key": key }))
            }
            DecisionAction::Suggest { key, tags } => Ok(serde_json::to_value(
                self.engine.suggest(&key, &tags)?,
            )?),
        }
    }

    fn execute_constraint(&mut self, action: ConstraintAction) -> Result<Value> {
        match action {
            ConstraintAction::Add(input) => {
                let id = self.engine.add_constraint(input)?;
                Ok(json!({ "id": id }))
            }
            ConstraintAction::AddBatch { items, atomic } => Ok(serde_json::to_value(
                self.engine.add_constraint_batch(&items, atomic)?,
            )?),
            ConstraintAction::Get(filter) => Ok(serde_json::to_value(
                self.engine.get_constraints(&filter)?,
            )?),
            ConstraintAction::Deactivate { id } => {
                self.engine.deactivate_constraint(id)?;
                Ok(json!({ "id": id, "active": false }))
            }
            ConstraintAction::ActivateByTag { tag } => {
                let activated = self.engine.activate_constraints_by_tag(&tag)?;
                Ok(json!({ "activated": activated }))
            }
        }
    }

    fn execute_task(&mut self, action: TaskAction) -> Result<Value> {
        match action {
            TaskAction::Create(input) => {
                let id = self.engine.create_task(input)?;
                Ok(json!({ "id": id }))
            }
            TaskAction::CreateBatch { items, atomic } => Ok(serde_json::to_value(
                self.engine.create_task_batch(&items, atomic)?,
            )?),
            TaskAction::Get { id } => Ok(serde_json::to_value(self.engine.get_task(id)?)?),
            TaskAction::List { status, limit } => Ok(serde_json::to_value(
                self.engine.list_tasks(status.as_deref(), limit)?,
            )?),
            TaskAction::Update {
                id,
                title,
                description,
                priority,
                layer,
                assigned_agent,
            } => {
                self.engine.update_task(
                    id,
                    title.as_deref(),
                    description.as_deref(),
                    priority.as_deref(),
                    layer.as_deref(),
                    assigned_agent.as_deref(),
                )?;
                Ok(json!({ "id": id }))
            }
            TaskAction::Move { id, status, notes } => {
                self.engine.move_task(id, &status, notes.as_deref())?;
                Ok(json!({ "id": id, "status": status }))
            }
            TaskAction::Link { id, kind, target } => {
                self.engine.link_task(id, kind, &target)?;
                Ok(json!({ "id": id }))
            }
            TaskAction::Archive { id } => {
                self.engine.archive_task(id)?;
                Ok(json!({ "id": id, "status": "archived" }))
            }
            TaskAction::AddDependency { blocker, blocked } => {
                self.engine.add_dependency(blocker, blocked)?;
                Ok(json!({ "blocker": blocker, "blocked": blocked }))
            }
            TaskAction::RemoveDependency { blocker, blocked } => {
                self.engine.remove_dependency(blocker, blocked)?;
                Ok(json!({ "blocker": blocker, "blocked": blocked }))
            }
            TaskAction::GetDependencies { id, include_details } => Ok(serde_json::to_value(
                self.engine.get_dependencies(id, include_details)?,
            )?),
        }
    }

    fn execute_file(&mut self, action: FileAction) -> Result<Value> {
        match action {
            FileAction::Record(input) => {
                let id = self.engine.record_file_change(input)?;
                Ok(json!({ "id": id }))
            }
            FileAction::RecordBatch { items, atomic } => Ok(serde_json::to_value(
                self.engine.record_file_batch(&items, atomic)?,
            )?),
            FileAction::Query { layer, since, limit } => {
                let since_ts = since.as_deref().map(parse_updated_after).transpose()?;
                Ok(serde_json::to_value(self.engine.query_file_changes(
                    layer.as_deref(),
                    since_ts,
                    limit,
                )?)?)
            }
        }
    }

    fn execute_message(&mut self, action: MessageAction) -> Result<Value> {
        match action {
            MessageAction::Send(input) => {
                let id = self.engine.send_message(input)?;
                Ok(json!({ "id": id }))
            }
            MessageAction::SendBatch { items, atomic } => Ok(serde_json::to_value(
                self.engine.send_message_batch(&items, atomic)?,
            )?),
            MessageAction::List { agent, limit } => Ok(serde_json::to_value(
                self.engine.list_messages(agent.as_deref(), limit)?,
            )?),
        }
    }
}

impl Backend for LocalBackend {
    fn execute(&mut self, tool: &str, action: &str, params: Value) -> Result<Value> {
        match tool {
            "decision" => self.execute_decision(DecisionAction::decode(action, params)?),
            "constraint" => self.execute_constraint(ConstraintAction::decode(action, params)?),
            "task" => self.execute_task(TaskAction::decode(action, params)?),
            "file" => self.execute_file(FileAction::decode(action, params)?),
            "message" => self.execute_message(MessageAction::decode(action, params)?),
            other => Err(Error::UnsupportedTool {
                tool: other.to_string(),
            }),
        }
    }
}

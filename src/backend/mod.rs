//! Backend interface: tool calls dispatched to the local engine or a
//! remote implementation behind one trait.
//!
//! Action parameters are decoded into per-tool sum types at the boundary,
//! so an unknown action fails at decode time rather than deep inside a
//! handler.

pub mod dispatch;
pub mod local;

pub use dispatch::Dispatcher;
pub use local::LocalBackend;

use serde_json::Value;

use crate::error::{Error, Result};
use crate::model::constraint::{ConstraintFilter, ConstraintInput};
use crate::model::decision::{
    DecisionContextInput, DecisionTemplate, SearchFilter, SetDecision, TagMatchMode,
};
use crate::model::project::{FileChangeInput, MessageInput};
use crate::model::task::{TaskInput, TaskLinkKind};

/// A backend executes `(tool, action, params)` tool calls.
pub trait Backend {
    fn execute(&mut self, tool: &str, action: &str, params: Value) -> Result<Value>;
}

fn decode<T: serde::de::DeserializeOwned>(action: &str, params: Value) -> Result<T> {
    serde_json::from_value(params)
        .map_err(|e| Error::Validation(format!("invalid params for '{action}': {e}")))
}

fn unknown_action(tool: &str, action: &str, valid: &[&str]) -> Error {
    Error::Validation(format!(
        "unknown action '{action}' for tool '{tool}'. Valid actions: {}",
        valid.join(", ")
    ))
}

// ── Per-tool typed actions ────────────────────────────────────

/// Actions on the `decision` tool.
#[derive(Debug)]
pub enum DecisionAction {
    Set(SetDecision),
    QuickSet(SetDecision),
    Get { key: String },
    SetBatch { items: Vec<SetDecision>, atomic: bool },
    SearchByTags {
        tags: Vec<String>,
        mode: TagMatchMode,
        layer: Option<String>,
        status: Option<String>,
        limit: usize,
    },
    SearchByLayer {
        layer: String,
        status: Option<String>,
        include_tags: bool,
        limit: usize,
    },
    SearchAdvanced(SearchFilter),
    GetVersions { key: String },
    AddContext(DecisionContextInput),
    HasUpdates { since_ts: i64 },
    CreateTemplate(DecisionTemplate),
    ListTemplates,
    SetFromTemplate { template: String, item: SetDecision },
    Suggest { key: String, tags: Vec<String> },
}

impl DecisionAction {
    const VALID: &'static [&'static str] = &[
        "set",
        "quick_set",
        "get",
        "set_batch",
        "search_by_tags",
        "search_by_layer",
        "search_advanced",
        "get_versions",
        "add_context",
        "has_updates",
        "create_template",
        "list_templates",
        "set_from_template",
        "suggest",
    ];

    pub fn decode(action: &str, params: Value) -> Result<Self> {
        #[derive(serde::Deserialize)]
        struct KeyParams {
            key: String,
        }
        #[derive(serde::Deserialize)]
        struct BatchParams {
            items: Vec<SetDecision>,
            #[serde(default)]
            atomic: bool,
        }
        #[derive(serde::Deserialize)]
        struct TagSearchParams {
            tags: Vec<String>,
            #[serde(default = "default_mode")]
            mode: TagMatchMode,
            #[serde(default)]
            layer: Option<String>,
            #[serde(default)]
            status: Option<String>,
            #[serde(default = "default_limit")]
            limit: usize,
        }
        #[derive(serde::Deserialize)]
        struct LayerSearchParams {
            layer: String,
            #[serde(default)]
            status: Option<String>,
            #[serde(default)]
            include_tags: bool,
            #[serde(default = "default_limit")]
            limit: usize,
        }
        #[derive(serde::Deserialize)]
        struct HasUpdatesParams {
            since_ts: i64,
        }
        #[derive(serde::Deserialize)]
        struct FromTemplateParams {
            template: String,
            #[serde(flatten)]
            item: SetDecision,
        }
        #[derive(serde::Deserialize)]
        struct SuggestParams {
            key: String,
            #[serde(default)]
            tags: Vec<String>,
        }
        fn default_mode() -> TagMatchMode {
            TagMatchMode::Or
        }
        fn default_limit() -> usize {
            20
        }

        match action {
            "set" => Ok(Self::Set(decode(action, params)?)),
            "quick_set" => Ok(Self::QuickSet(decode(action, params)?)),
            "get" => {
                let p: KeyParams = decode(action, params)?;
                Ok(Self::Get { key: p.key })
            }
            "set_batch" => {
                let p: BatchParams = decode(action, params)?;
                Ok(Self::SetBatch {
                    items: p.items,
                    atomic: p.atomic,
                })
            }
            "search_by_tags" => {
                let p: TagSearchParams = decode(action, params)?;
                Ok(Self::SearchByTags {
                    tags: p.tags,
                    mode: p.mode,
                    layer: p.layer,
                    status: p.status,
                    limit: p.limit,
                })
            }
            "search_by_layer" => {
                let p: LayerSearchParams = decode(action, params)?;
                Ok(Self::SearchByLayer {
                    layer: p.layer,
                    status: p.status,
                    include_tags: p.include_tags,
                    limit: p.limit,
                })
            }
            "search_advanced" => Ok(Self::SearchAdvanced(decode(action, params)?)),
            "get_versions" => {
                let p: KeyParams = decode(action, params)?;
                Ok(Self::GetVersions { key: p.key })
            }
            "add_context" => Ok(Self::AddContext(decode(action, params)?)),
            "has_updates" => {
                let p: HasUpdatesParams = decode(action, params)?;
                Ok(Self::HasUpdates { since_ts: p.since_ts })
            }
            "create_template" => Ok(Self::CreateTemplate(decode(action, params)?)),
            "list_templates" => Ok(Self::ListTemplates),
            "set_from_template" => {
                let p: FromTemplateParams = decode(action, params)?;
                Ok(Self::SetFromTemplate {
                    template: p.template,
                    item: p.item,
                })
            }
            "suggest" => {
                let p: SuggestParams = decode(action, params)?;
                Ok(Self::Suggest {
                    key: p.key,
                    tags: p.tags,
                })
            }
            _ => Err(unknown_action("decision", action, Self::VALID)),
        }
    }
}

/// Actions on the `constraint` tool.
#[derive(Debug)]
pub enum ConstraintAction {
    Add(ConstraintInput),
    AddBatch { items: Vec<ConstraintInput>, atomic: bool },
    Get(ConstraintFilter),
    Deactivate { id: i64 },
    ActivateByTag { tag: String },
}

impl ConstraintAction {
    const VALID: &'static [&'static str] =
        &["add", "add_batch", "get", "deactivate", "activate_by_tag"];

    pub fn decode(action: &str, params: Value) -> Result<Self> {
        #[derive(serde::Deserialize)]
        struct IdParams {
            id: i64,
        }
        #[derive(serde::Deserialize)]
        struct TagParams {
            tag: String,
        }
        #[derive(serde::Deserialize)]
        struct BatchParams {
            items: Vec<ConstraintInput>,
            #[serde(default)]
            atomic: bool,
        }

        match action {
            "add" => Ok(Self::Add(decode(action, params)?)),
            "add_batch" => {
                let p: BatchParams = decode(action, params)?;
                Ok(Self::AddBatch {
                    items: p.items,
                    atomic: p.atomic,
                })
            }
            "get" => Ok(Self::Get(decode(action, params)?)),
            "deactivate" => {
                let p: IdParams = decode(action, params)?;
                Ok(Self::Deactivate { id: p.id })
            }
            "activate_by_tag" => {
                let p: TagParams = decode(action, params)?;
                Ok(Self::ActivateByTag { tag: p.tag })
            }
            _ => Err(unknown_action("constraint", action, Self::VALID)),
        }
    }
}

/// Actions on the `task` tool.
#[derive(Debug)]
pub enum TaskAction {
    Create(TaskInput),
    CreateBatch { items: Vec<TaskInput>, atomic: bool },
    Get { id: i64 },
    List { status: Option<String>, limit: usize },
    Update {
        id: i64,
        title: Option<String>,
        description: Option<String>,
        priority: Option<String>,
        layer: Option<String>,
        assigned_agent: Option<String>,
    },
    Move { id: i64, status: String, notes: Option<String> },
    Link { id: i64, kind: TaskLinkKind, target: String },
    Archive { id: i64 },
    AddDependency { blocker: i64, blocked: i64 },
    RemoveDependency { blocker: i64, blocked: i64 },
    GetDependencies { id: i64, include_details: bool },
}

impl TaskAction {
    const VALID: &'static [&'static str] = &[
        "create",
        "create_batch",
        "get",
        "list",
        "update",
        "move",
        "link",
        "archive",
        "add_dependency",
        "remove_dependency",
        "get_dependencies",
    ];

    pub fn decode(action: &str, params: Value) -> Result<Self> {
        #[derive(serde::Deserialize)]
        struct IdParams {
            id: i64,
        }
        #[derive(serde::Deserialize)]
        struct ListParams {
            #[serde(default)]
            status: Option<String>,
            #[serde(default = "default_limit")]
            limit: usize,
        }
        #[derive(serde::Deserialize)]
        struct UpdateParams {
            id: i64,
            #[serde(default)]
            title: Option<String>,
            #[serde(default)]
            description: Option<String>,
            #[serde(default)]
            priority: Option<String>,
            #[serde(default)]
            layer: Option<String>,
            #[serde(default)]
            assigned_agent: Option<String>,
        }
        #[derive(serde::Deserialize)]
        struct MoveParams {
            id: i64,
            status: String,
            #[serde(default)]
            notes: Option<String>,
        }
        #[derive(serde::Deserialize)]
        struct LinkParams {
            id: i64,
            kind: TaskLinkKind,
            target: String,
        }
        #[derive(serde::Deserialize)]
        struct EdgeParams {
            blocker: i64,
            blocked: i64,
        }
        #[derive(serde::Deserialize)]
        struct DepsParams {
            id: i64,
            #[serde(default)]
            include_details: bool,
        }
        #[derive(serde::Deserialize)]
        struct BatchParams {
            items: Vec<TaskInput>,
            #[serde(default)]
            atomic: bool,
        }
        fn default_limit() -> usize {
            20
        }

        match action {
            "create" => Ok(Self::Create(decode(action, params)?)),
            "create_batch" => {
                let p: BatchParams = decode(action, params)?;
                Ok(Self::CreateBatch {
                    items: p.items,
                    atomic: p.atomic,
                })
            }
            "get" => {
                let p: IdParams = decode(action, params)?;
                Ok(Self::Get { id: p.id })
            }
            "list" => {
                let p: ListParams = decode(action, params)?;
                Ok(Self::List {
                    status: p.status,
                    limit: p.limit,
                })
            }
            "update" => {
                let p: UpdateParams = decode(action, params)?;
                Ok(Self::Update {
                    id: p.id,
                    title: p.title,
                    description: p.description,
                    priority: p.priority,
                    layer: p.layer,
                    assigned_agent: p.assigned_agent,
                })
            }
            "move" => {
                let p: MoveParams = decode(action, params)?;
                Ok(Self::Move {
                    id: p.id,
                    status: p.status,
                    notes: p.notes,
                })
            }
            "link" => {
                let p: LinkParams = decode(action, params)?;
                Ok(Self::Link {
                    id: p.id,
                    kind: p.kind,
                    target: p.target,
                })
            }
            "archive" => {
                let p: IdParams = decode(action, params)?;
                Ok(Self::Archive { id: p.id })
            }
            "add_dependency" => {
                let p: EdgeParams = decode(action, params)?;
                Ok(Self::AddDependency {
                    blocker: p.blocker,
                    blocked: p.blocked,
                })
            }
            "remove_dependency" => {
                let p: EdgeParams = decode(action, params)?;
                Ok(Self::RemoveDependency {
                    blocker: p.blocker,
                    blocked: p.blocked,
                })
            }
            "get_dependencies" => {
                let p: DepsParams = decode(action, params)?;
                Ok(Self::GetDependencies {
                    id: p.id,
                    include_details: p.include_details,
                })
            }
            _ => Err(unknown_action("task", action, Self::VALID)),
        }
    }
}

/// Actions on the `file` tool.
#[derive(Debug)]
pub enum FileAction {
    Record(FileChangeInput),
    RecordBatch { items: Vec<FileChangeInput>, atomic: bool },
    Query {
        layer: Option<String>,
        since: Option<String>,
        limit: usize,
    },
}

impl FileAction {
    const VALID: &'static [&'static str] = &["record", "record_batch", "query"];

    pub fn decode(action: &str, params: Value) -> Result<Self> {
        #[derive(serde::Deserialize)]
        struct QueryParams {
            #[serde(default)]
            layer: Option<String>,
            #[serde(default)]
            since: Option<String>,
            #[serde(default = "default_limit")]
            limit: usize,
        }
        #[derive(serde::Deserialize)]
        struct BatchParams {
            items: Vec<FileChangeInput>,
            #[serde(default)]
            atomic: bool,
        }
        fn default_limit() -> usize {
            50
        }

        match action {
            "record" => Ok(Self::Record(decode(action, params)?)),
            "record_batch" => {
                let p: BatchParams = decode(action, params)?;
                Ok(Self::RecordBatch {
                    items: p.items,
                    atomic: p.atomic,
                })
            }
            "query" => {
                let p: QueryParams = decode(action, params)?;
                Ok(Self::Query {
                    layer: p.layer,
                    since: p.since,
                    limit: p.limit,
                })
            }
            _ => Err(unknown_action("file", action, Self::VALID)),
        }
    }
}

/// Actions on the `message` tool.
#[derive(Debug)]
pub enum MessageAction {
    Send(MessageInput),
    SendBatch { items: Vec<MessageInput>, atomic: bool },
    List { agent: Option<String>, limit: usize },
}

impl MessageAction {
    const VALID: &'static [&'static str] = &["send", "send_batch", "list"];

    pub fn decode(action: &str, params: Value) -> Result<Self> {
        #[derive(serde::Deserialize)]
        struct ListParams {
            #[serde(default)]
            agent: Option<String>,
            #[serde(default = "default_limit")]
            limit: usize,
        }
        #[derive(serde::Deserialize)]
        struct BatchParams {
            items: Vec<MessageInput>,
            #[serde(default)]
            atomic: bool,
        }
        fn default_limit() -> usize {
            50
        }

        match action {
            "send" => Ok(Self::Send(decode(action, params)?)),
            "send_batch" => {
                let p: BatchParams = decode(action, params)?;
                Ok(Self::SendBatch {
                    items: p.items,
                    atomic: p.atomic,
                })
            }
            "list" => {
                let p: ListParams = decode(action, params)?;
                Ok(Self::List {
                    agent: p.agent,
                    limit: p.limit,
                })
            }
            _ => Err(unknown_action("message", action, Self::VALID)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_action_fails_at_decode() {
        let err = DecisionAction::decode("transmogrify", json!({})).unwrap_err();
        assert!(err.to_string().contains("unknown action"));
        assert!(err.to_string().contains("set_batch"));
    }

    #[test]
    fn missing_required_field_fails_at_decode() {
        let err = DecisionAction::decode("get", json!({})).unwrap_err();
        assert!(err.to_string().contains("invalid params"));
    }

    #[test]
    fn set_decodes_full_params() {
        let action = DecisionAction::decode(
            "set",
            json!({ "key": "auth_method", "value": "JWT",
                    "layer": "business", "tags": ["auth"] }),
        )
        .unwrap();
        let DecisionAction::Set(input) = action else {
            panic!("wrong variant");
        };
        assert_eq!(input.key, "auth_method");
        assert_eq!(input.tags, vec!["auth"]);
    }

    #[test]
    fn task_move_decodes() {
        let action = TaskAction::decode(
            "move",
            json!({ "id": 3, "status": "in_progress", "notes": "picked up" }),
        )
        .unwrap();
        assert!(matches!(action, TaskAction::Move { id: 3, .. }));
    }
}

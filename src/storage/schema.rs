//! Schema definitions for the sqlew database.
//!
//! Entity groups use fixed name prefixes: `m_` master (interned/lookup),
//! `t_` transaction, `v_` view. Every transaction row carries `project_id`
//! except `m_context_keys`, which is project-global. DDL is generated per
//! dialect so `db:dump` scripts install cleanly on fresh MySQL/MariaDB and
//! PostgreSQL schemas; the live engine executes the SQLite shape.

use crate::model::enums::{ConstraintCategory, Layer, TaskStatus};
use crate::storage::dialect::Dialect;

/// Tables that must exist after migration, checked by integrity
/// verification on open.
pub const REQUIRED_TABLES: &[&str] = &[
    "m_projects",
    "m_agents",
    "m_files",
    "m_context_keys",
    "m_tags",
    "m_scopes",
    "m_layers",
    "m_task_statuses",
    "m_constraint_categories",
    "m_config",
    "t_decisions",
    "t_decision_values_text",
    "t_decision_values_numeric",
    "t_decision_history",
    "t_decision_tags",
    "t_decision_scopes",
    "t_decision_contexts",
    "t_decision_templates",
    "t_tag_index",
    "t_constraints",
    "t_constraint_tags",
    "t_file_changes",
    "t_tasks",
    "t_task_details",
    "t_task_tags",
    "t_task_files",
    "t_task_decisions",
    "t_task_dependencies",
    "t_task_pruned_files",
    "t_messages",
    "t_activity_log",
];

/// Views that must exist after migration.
pub const REQUIRED_VIEWS: &[&str] = &["v_decisions", "v_constraints", "v_tasks"];

/// Columns verified per table on open. Not exhaustive; covers the columns
/// the engine reads and the ones later migrations add.
pub const REQUIRED_COLUMNS: &[(&str, &[&str])] = &[
    ("m_projects", &["id", "name", "detection_source", "root_path", "last_active_ts", "metadata"]),
    ("m_agents", &["id", "name", "last_active_ts"]),
    ("m_files", &["id", "project_id", "path"]),
    ("m_context_keys", &["id", "key"]),
    ("t_decisions", &["key_id", "project_id", "agent_id", "layer_id", "version", "status", "ts"]),
    ("t_decision_history", &["key_id", "project_id", "version", "value", "agent_id", "ts"]),
    ("t_tag_index", &["tag_name", "key_id", "project_id"]),
    ("t_constraints", &["id", "project_id", "category_id", "constraint_text", "priority", "active"]),
    ("t_tasks", &["id", "project_id", "title", "status_id", "priority", "created_ts", "updated_ts"]),
    ("t_task_dependencies", &["project_id", "blocker_task_id", "blocked_task_id", "created_ts"]),
    ("t_task_pruned_files", &["id", "task_id", "project_id", "path", "pruned_ts", "decision_key_id"]),
    ("t_messages", &["id", "project_id", "from_agent_id", "content", "priority", "ts"]),
];

/// `CREATE TABLE` statements in dependency order.
#[must_use]
pub fn table_statements(d: Dialect) -> Vec<(&'static str, String)> {
    let pk = d.autoincrement_pk();
    let text = d.text_type();
    let key = d.keyed_text_type();

    vec![
        (
            "m_projects",
            format!(
                "CREATE TABLE IF NOT EXISTS m_projects (
                    id {pk},
                    name {key} NOT NULL UNIQUE,
                    display_name {text},
                    detection_source {key} NOT NULL DEFAULT 'manual',
                    root_path {text},
                    created_ts BIGINT NOT NULL,
                    last_active_ts BIGINT NOT NULL,
                    metadata {text}
                )"
            ),
        ),
        (
            "m_agents",
            format!(
                "CREATE TABLE IF NOT EXISTS m_agents (
                    id {pk},
                    name {key} NOT NULL UNIQUE,
                    last_active_ts BIGINT NOT NULL
                )"
            ),
        ),
        (
            "m_files",
            format!(
                "CREATE TABLE IF NOT EXISTS m_files (
                    id {pk},
                    project_id BIGINT NOT NULL REFERENCES m_projects(id),
                    path {key} NOT NULL,
                    UNIQUE (project_id, path)
                )"
            ),
        ),
        (
            // Project-global: a key name denotes the same logical decision
            // across projects; the decision row is per-project.
            "m_context_keys",
            format!(
                "CREATE TABLE IF NOT EXISTS m_context_keys (
                    id {pk},
                    key {key} NOT NULL UNIQUE
                )"
            ),
        ),
        (
            "m_tags",
            format!(
                "CREATE TABLE IF NOT EXISTS m_tags (
                    id {pk},
                    project_id BIGINT NOT NULL REFERENCES m_projects(id),
                    name {key} NOT NULL,
                    UNIQUE (project_id, name)
                )"
            ),
        ),
        (
            "m_scopes",
            format!(
                "CREATE TABLE IF NOT EXISTS m_scopes (
                    id {pk},
                    project_id BIGINT NOT NULL REFERENCES m_projects(id),
                    name {key} NOT NULL,
                    UNIQUE (project_id, name)
                )"
            ),
        ),
        (
            "m_layers",
            format!(
                "CREATE TABLE IF NOT EXISTS m_layers (
                    id BIGINT PRIMARY KEY,
                    name {key} NOT NULL UNIQUE
                )"
            ),
        ),
        (
            "m_task_statuses",
            format!(
                "CREATE TABLE IF NOT EXISTS m_task_statuses (
                    id BIGINT PRIMARY KEY,
                    name {key} NOT NULL UNIQUE
                )"
            ),
        ),
        (
            "m_constraint_categories",
            format!(
                "CREATE TABLE IF NOT EXISTS m_constraint_categories (
                    id BIGINT PRIMARY KEY,
                    name {key} NOT NULL UNIQUE
                )"
            ),
        ),
        (
            "m_config",
            format!(
                "CREATE TABLE IF NOT EXISTS m_config (
                    key {key} PRIMARY KEY,
                    value {text} NOT NULL,
                    project_id BIGINT REFERENCES m_projects(id)
                )"
            ),
        ),
        (
            "t_decisions",
            format!(
                "CREATE TABLE IF NOT EXISTS t_decisions (
                    key_id BIGINT NOT NULL REFERENCES m_context_keys(id),
                    project_id BIGINT NOT NULL REFERENCES m_projects(id),
                    agent_id BIGINT REFERENCES m_agents(id),
                    layer_id BIGINT REFERENCES m_layers(id),
                    version {key} NOT NULL DEFAULT '1.0.0',
                    status SMALLINT NOT NULL DEFAULT 1,
                    ts BIGINT NOT NULL,
                    PRIMARY KEY (key_id, project_id)
                )"
            ),
        ),
        (
            "t_decision_values_text",
            format!(
                "CREATE TABLE IF NOT EXISTS t_decision_values_text (
                    key_id BIGINT NOT NULL,
                    project_id BIGINT NOT NULL,
                    value {text} NOT NULL,
                    PRIMARY KEY (key_id, project_id),
                    FOREIGN KEY (key_id, project_id)
                        REFERENCES t_decisions(key_id, project_id) ON DELETE CASCADE
                )"
            ),
        ),
        (
            "t_decision_values_numeric",
            "CREATE TABLE IF NOT EXISTS t_decision_values_numeric (
                key_id BIGINT NOT NULL,
                project_id BIGINT NOT NULL,
                value DOUBLE PRECISION NOT NULL,
                PRIMARY KEY (key_id, project_id),
                FOREIGN KEY (key_id, project_id)
                    REFERENCES t_decisions(key_id, project_id) ON DELETE CASCADE
            )"
            .to_string(),
        ),
        (
            "t_decision_history",
            format!(
                "CREATE TABLE IF NOT EXISTS t_decision_history (
                    id {pk},
                    key_id BIGINT NOT NULL,
                    project_id BIGINT NOT NULL,
                    version {key} NOT NULL,
                    value {text},
                    agent_id BIGINT REFERENCES m_agents(id),
                    ts BIGINT NOT NULL,
                    FOREIGN KEY (key_id, project_id)
                        REFERENCES t_decisions(key_id, project_id) ON DELETE CASCADE
                )"
            ),
        ),
        (
            "t_decision_tags",
            "CREATE TABLE IF NOT EXISTS t_decision_tags (
                key_id BIGINT NOT NULL,
                tag_id BIGINT NOT NULL REFERENCES m_tags(id),
                project_id BIGINT NOT NULL,
                PRIMARY KEY (key_id, tag_id, project_id),
                FOREIGN KEY (key_id, project_id)
                    REFERENCES t_decisions(key_id, project_id) ON DELETE CASCADE
            )"
            .to_string(),
        ),
        (
            "t_decision_scopes",
            "CREATE TABLE IF NOT EXISTS t_decision_scopes (
                key_id BIGINT NOT NULL,
                scope_id BIGINT NOT NULL REFERENCES m_scopes(id),
                project_id BIGINT NOT NULL,
                PRIMARY KEY (key_id, scope_id, project_id),
                FOREIGN KEY (key_id, project_id)
                    REFERENCES t_decisions(key_id, project_id) ON DELETE CASCADE
            )"
            .to_string(),
        ),
        (
            "t_decision_contexts",
            format!(
                "CREATE TABLE IF NOT EXISTS t_decision_contexts (
                    id {pk},
                    key_id BIGINT NOT NULL,
                    project_id BIGINT NOT NULL,
                    rationale {text} NOT NULL,
                    alternatives_json {text},
                    tradeoffs_json {text},
                    agent_id BIGINT REFERENCES m_agents(id),
                    related_task_id BIGINT,
                    related_constraint_id BIGINT,
                    ts BIGINT NOT NULL,
                    FOREIGN KEY (key_id, project_id)
                        REFERENCES t_decisions(key_id, project_id) ON DELETE CASCADE
                )"
            ),
        ),
        (
            "t_decision_templates",
            format!(
                "CREATE TABLE IF NOT EXISTS t_decision_templates (
                    id {pk},
                    project_id BIGINT NOT NULL REFERENCES m_projects(id),
                    name {key} NOT NULL,
                    layer_id BIGINT REFERENCES m_layers(id),
                    status SMALLINT,
                    tags_json {text},
                    scopes_json {text},
                    created_ts BIGINT NOT NULL,
                    UNIQUE (project_id, name)
                )"
            ),
        ),
        (
            // Denormalized alongside t_decision_tags to serve
            // suggest-by-tag without joins.
            "t_tag_index",
            format!(
                "CREATE TABLE IF NOT EXISTS t_tag_index (
                    tag_name {key} NOT NULL,
                    key_id BIGINT NOT NULL,
                    project_id BIGINT NOT NULL,
                    PRIMARY KEY (tag_name, key_id, project_id)
                )"
            ),
        ),
        (
            "t_constraints",
            format!(
                "CREATE TABLE IF NOT EXISTS t_constraints (
                    id {pk},
                    project_id BIGINT NOT NULL REFERENCES m_projects(id),
                    category_id BIGINT NOT NULL REFERENCES m_constraint_categories(id),
                    layer_id BIGINT REFERENCES m_layers(id),
                    constraint_text {text} NOT NULL,
                    priority SMALLINT NOT NULL DEFAULT 2,
                    active SMALLINT NOT NULL DEFAULT 1,
                    created_by_agent_id BIGINT REFERENCES m_agents(id),
                    ts BIGINT NOT NULL
                )"
            ),
        ),
        (
            "t_constraint_tags",
            "CREATE TABLE IF NOT EXISTS t_constraint_tags (
                constraint_id BIGINT NOT NULL REFERENCES t_constraints(id) ON DELETE CASCADE,
                tag_id BIGINT NOT NULL REFERENCES m_tags(id),
                PRIMARY KEY (constraint_id, tag_id)
            )"
            .to_string(),
        ),
        (
            "t_file_changes",
            format!(
                "CREATE TABLE IF NOT EXISTS t_file_changes (
                    id {pk},
                    project_id BIGINT NOT NULL REFERENCES m_projects(id),
                    file_id BIGINT NOT NULL REFERENCES m_files(id),
                    agent_id BIGINT REFERENCES m_agents(id),
                    change_type SMALLINT NOT NULL,
                    layer_id BIGINT REFERENCES m_layers(id),
                    description {text},
                    ts BIGINT NOT NULL
                )"
            ),
        ),
        (
            "t_tasks",
            format!(
                "CREATE TABLE IF NOT EXISTS t_tasks (
                    id {pk},
                    project_id BIGINT NOT NULL REFERENCES m_projects(id),
                    title {text} NOT NULL,
                    status_id BIGINT NOT NULL DEFAULT 1 REFERENCES m_task_statuses(id),
                    priority SMALLINT NOT NULL DEFAULT 2,
                    layer_id BIGINT REFERENCES m_layers(id),
                    assigned_agent_id BIGINT REFERENCES m_agents(id),
                    created_by_agent_id BIGINT REFERENCES m_agents(id),
                    created_ts BIGINT NOT NULL,
                    updated_ts BIGINT NOT NULL
                )"
            ),
        ),
        (
            // Sibling table keeps the wide description column out of list
            // projections.
            "t_task_details",
            format!(
                "CREATE TABLE IF NOT EXISTS t_task_details (
                    task_id BIGINT PRIMARY KEY REFERENCES t_tasks(id) ON DELETE CASCADE,
                    description {text}
                )"
            ),
        ),
        (
            "t_task_tags",
            "CREATE TABLE IF NOT EXISTS t_task_tags (
                task_id BIGINT NOT NULL REFERENCES t_tasks(id) ON DELETE CASCADE,
                tag_id BIGINT NOT NULL REFERENCES m_tags(id),
                PRIMARY KEY (task_id, tag_id)
            )"
            .to_string(),
        ),
        (
            "t_task_files",
            "CREATE TABLE IF NOT EXISTS t_task_files (
                task_id BIGINT NOT NULL REFERENCES t_tasks(id) ON DELETE CASCADE,
                file_id BIGINT NOT NULL REFERENCES m_files(id),
                PRIMARY KEY (task_id, file_id)
            )"
            .to_string(),
        ),
        (
            "t_task_decisions",
            "CREATE TABLE IF NOT EXISTS t_task_decisions (
                task_id BIGINT NOT NULL REFERENCES t_tasks(id) ON DELETE CASCADE,
                key_id BIGINT NOT NULL REFERENCES m_context_keys(id),
                PRIMARY KEY (task_id, key_id)
            )"
            .to_string(),
        ),
        (
            "t_task_dependencies",
            "CREATE TABLE IF NOT EXISTS t_task_dependencies (
                project_id BIGINT NOT NULL REFERENCES m_projects(id),
                blocker_task_id BIGINT NOT NULL REFERENCES t_tasks(id) ON DELETE CASCADE,
                blocked_task_id BIGINT NOT NULL REFERENCES t_tasks(id) ON DELETE CASCADE,
                created_ts BIGINT NOT NULL,
                PRIMARY KEY (blocker_task_id, blocked_task_id)
            )"
            .to_string(),
        ),
        (
            "t_task_pruned_files",
            format!(
                "CREATE TABLE IF NOT EXISTS t_task_pruned_files (
                    id {pk},
                    task_id BIGINT NOT NULL REFERENCES t_tasks(id) ON DELETE CASCADE,
                    project_id BIGINT NOT NULL REFERENCES m_projects(id),
                    path {text} NOT NULL,
                    pruned_ts BIGINT NOT NULL,
                    decision_key_id BIGINT REFERENCES m_context_keys(id)
                )"
            ),
        ),
        (
            "t_messages",
            format!(
                "CREATE TABLE IF NOT EXISTS t_messages (
                    id {pk},
                    project_id BIGINT NOT NULL REFERENCES m_projects(id),
                    from_agent_id BIGINT NOT NULL REFERENCES m_agents(id),
                    to_agent_id BIGINT REFERENCES m_agents(id),
                    content {text} NOT NULL,
                    priority SMALLINT NOT NULL DEFAULT 2,
                    ts BIGINT NOT NULL
                )"
            ),
        ),
        (
            "t_activity_log",
            format!(
                "CREATE TABLE IF NOT EXISTS t_activity_log (
                    id {pk},
                    project_id BIGINT NOT NULL REFERENCES m_projects(id),
                    agent_id BIGINT REFERENCES m_agents(id),
                    action {key} NOT NULL,
                    detail {text},
                    ts BIGINT NOT NULL
                )"
            ),
        ),
    ]
}

/// Secondary index statements. SQLite/PostgreSQL accept `IF NOT EXISTS`;
/// MySQL scripts target fresh schemas so plain `CREATE INDEX` is emitted.
#[must_use]
pub fn index_statements(d: Dialect) -> Vec<String> {
    let ine = match d {
        Dialect::Mysql => "",
        Dialect::Sqlite | Dialect::Postgres => "IF NOT EXISTS ",
    };
    [
        ("idx_decisions_project_ts", "t_decisions", "project_id, ts"),
        ("idx_decision_history_key", "t_decision_history", "key_id, project_id"),
        ("idx_tag_index_tag", "t_tag_index", "tag_name, project_id"),
        ("idx_constraints_project_active", "t_constraints", "project_id, active"),
        ("idx_file_changes_project_ts", "t_file_changes", "project_id, ts"),
        ("idx_tasks_project_status", "t_tasks", "project_id, status_id"),
        ("idx_task_deps_blocked", "t_task_dependencies", "blocked_task_id"),
        ("idx_messages_project_ts", "t_messages", "project_id, ts"),
        ("idx_activity_project_ts", "t_activity_log", "project_id, ts"),
    ]
    .iter()
    .map(|(name, table, cols)| format!("CREATE INDEX {ine}{name} ON {table} ({cols})"))
    .collect()
}

/// Seed statements for predefined enums. Insert-if-absent so re-runs
/// preserve data.
#[must_use]
pub fn seed_statements(d: Dialect) -> Vec<String> {
    let mut stmts = Vec::new();

    let insert = |table: &str, id: i64, name: &str| -> String {
        match d {
            Dialect::Sqlite => format!(
                "INSERT OR IGNORE INTO {table} (id, name) VALUES ({id}, {})",
                d.quote_str(name)
            ),
            Dialect::Mysql => format!(
                "INSERT IGNORE INTO {table} (id, name) VALUES ({id}, {})",
                d.quote_str(name)
            ),
            Dialect::Postgres => format!(
                "INSERT INTO {table} (id, name) VALUES ({id}, {}) ON CONFLICT (id) DO NOTHING",
                d.quote_str(name)
            ),
        }
    };

    for layer in Layer::ALL {
        stmts.push(insert("m_layers", layer.id(), layer.as_str()));
    }
    for status in TaskStatus::ALL {
        stmts.push(insert("m_task_statuses", status.id(), status.as_str()));
    }
    for cat in ConstraintCategory::ALL {
        stmts.push(insert("m_constraint_categories", cat.id(), cat.as_str()));
    }

    stmts
}

/// View statements. SQLite gets `IF NOT EXISTS`; MySQL/PostgreSQL get
/// `CREATE OR REPLACE`.
#[must_use]
pub fn view_statements(d: Dialect) -> Vec<(&'static str, String)> {
    let create = match d {
        Dialect::Sqlite => "CREATE VIEW IF NOT EXISTS",
        Dialect::Mysql | Dialect::Postgres => "CREATE OR REPLACE VIEW",
    };
    let tag_agg = d.string_agg("tg.name", ",");
    let scope_agg = d.string_agg("sc.name", ",");
    let ctag_agg = d.string_agg("tg.name", ",");

    vec![
        (
            "v_decisions",
            format!(
                "{create} v_decisions AS
                 SELECT d.key_id, d.project_id, k.key AS key,
                        COALESCE(vt.value, CAST(vn.value AS {cast_text})) AS value,
                        d.version, d.status,
                        l.name AS layer, a.name AS agent, d.ts,
                        (SELECT {tag_agg} FROM t_decision_tags dt
                          JOIN m_tags tg ON tg.id = dt.tag_id
                         WHERE dt.key_id = d.key_id AND dt.project_id = d.project_id) AS tags,
                        (SELECT {scope_agg} FROM t_decision_scopes ds
                          JOIN m_scopes sc ON sc.id = ds.scope_id
                         WHERE ds.key_id = d.key_id AND ds.project_id = d.project_id) AS scopes
                 FROM t_decisions d
                 JOIN m_context_keys k ON k.id = d.key_id
                 LEFT JOIN t_decision_values_text vt
                        ON vt.key_id = d.key_id AND vt.project_id = d.project_id
                 LEFT JOIN t_decision_values_numeric vn
                        ON vn.key_id = d.key_id AND vn.project_id = d.project_id
                 LEFT JOIN m_layers l ON l.id = d.layer_id
                 LEFT JOIN m_agents a ON a.id = d.agent_id",
                cast_text = match d {
                    Dialect::Mysql => "CHAR",
                    Dialect::Sqlite | Dialect::Postgres => "TEXT",
                },
            ),
        ),
        (
            "v_constraints",
            format!(
                "{create} v_constraints AS
                 SELECT c.id, c.project_id, cat.name AS category, c.constraint_text,
                        c.priority, c.active, l.name AS layer, a.name AS created_by, c.ts,
                        (SELECT {ctag_agg} FROM t_constraint_tags ct
                          JOIN m_tags tg ON tg.id = ct.tag_id
                         WHERE ct.constraint_id = c.id) AS tags
                 FROM t_constraints c
                 JOIN m_constraint_categories cat ON cat.id = c.category_id
                 LEFT JOIN m_layers l ON l.id = c.layer_id
                 LEFT JOIN m_agents a ON a.id = c.created_by_agent_id"
            ),
        ),
        (
            "v_tasks",
            format!(
                "{create} v_tasks AS
                 SELECT t.id, t.project_id, t.title, s.name AS status, t.priority,
                        l.name AS layer, aa.name AS assigned_agent,
                        ca.name AS created_by, t.created_ts, t.updated_ts
                 FROM t_tasks t
                 JOIN m_task_statuses s ON s.id = t.status_id
                 LEFT JOIN m_layers l ON l.id = t.layer_id
                 LEFT JOIN m_agents aa ON aa.id = t.assigned_agent_id
                 LEFT JOIN m_agents ca ON ca.id = t.created_by_agent_id"
            ),
        ),
    ]
}

//! Self-describing JSON export of one project.
//!
//! The dump carries names instead of integer IDs so it can be merged into
//! any database (ID renumbering happens on import). Master rows are
//! included only where a transaction row of the exported project uses
//! them, which the name-based encoding gives for free.

use rusqlite::params;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::storage::Engine;

/// Format marker written into every dump.
pub const DUMP_FORMAT: &str = "sqlew-export";

/// Format version for forward-compatibility checks on import.
pub const DUMP_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectDump {
    pub format: String,
    pub version: u32,
    pub exported_at: String,
    pub project: ProjectRecord,
    pub decisions: Vec<DecisionRecord>,
    pub constraints: Vec<ConstraintRecord>,
    pub tasks: Vec<TaskRecord>,
    /// Edges reference positions in `tasks` (ID-renumbering safe).
    pub dependencies: Vec<DependencyRecord>,
    pub file_changes: Vec<FileChangeRecord>,
    pub messages: Vec<MessageRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub name: String,
    pub display_name: Option<String>,
    pub detection_source: String,
    pub root_path: Option<String>,
    pub metadata: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub key: String,
    pub text_value: Option<String>,
    pub numeric_value: Option<f64>,
    pub version: String,
    pub status: i64,
    pub layer: Option<String>,
    pub agent: Option<String>,
    pub ts: i64,
    pub tags: Vec<String>,
    pub scopes: Vec<String>,
    pub history: Vec<HistoryRecord>,
    pub contexts: Vec<ContextRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub version: String,
    pub value: Option<String>,
    pub agent: Option<String>,
    pub ts: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextRecord {
    pub rationale: String,
    pub alternatives_json: Option<String>,
    pub tradeoffs_json: Option<String>,
    pub agent: Option<String>,
    pub ts: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstraintRecord {
    pub category: String,
    pub constraint_text: String,
    pub priority: i64,
    pub active: bool,
    pub layer: Option<String>,
    pub created_by: Option<String>,
    pub ts: i64,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub title: String,
    pub status: i64,
    pub priority: i64,
    pub layer: Option<String>,
    pub assigned_agent: Option<String>,
    pub created_by: Option<String>,
    pub description: Option<String>,
    pub created_ts: i64,
    pub updated_ts: i64,
    pub tags: Vec<String>,
    pub files: Vec<String>,
    pub decisions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyRecord {
    pub blocker_index: usize,
    pub blocked_index: usize,
    pub created_ts: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileChangeRecord {
    pub path: String,
    pub change_type: i64,
    pub layer: Option<String>,
    pub agent: Option<String>,
    pub description: Option<String>,
    pub ts: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    pub from_agent: String,
    pub to_agent: Option<String>,
    pub content: String,
    pub priority: i64,
    pub ts: i64,
}

/// Export the engine's bound project (or a named one) as a dump.
pub fn export_project(engine: &Engine, project_name: Option<&str>) -> Result<ProjectDump> {
    let conn = engine.conn();
    let (project_id, project) = match project_name {
        Some(name) => {
            let row = conn
                .query_row(
                    "SELECT id, name, display_name, detection_source, root_path, metadata
                     FROM m_projects WHERE name = ?1",
                    params![name],
                    project_row,
                )
                .map_err(|_| Error::NotFound {
                    entity: "Project".to_string(),
                    id: name.to_string(),
                })?;
            row
        }
        None => conn.query_row(
            "SELECT id, name, display_name, detection_source, root_path, metadata
             FROM m_projects WHERE id = ?1",
            params![engine.project_id()],
            project_row,
        )?,
    };

    let mut dump = ProjectDump {
        format: DUMP_FORMAT.to_string(),
        version: DUMP_VERSION,
        exported_at: chrono::Utc::now().to_rfc3339(),
        project,
        decisions: Vec::new(),
        constraints: Vec::new(),
        tasks: Vec::new(),
        dependencies: Vec::new(),
        file_changes: Vec::new(),
        messages: Vec::new(),
    };

    export_decisions(engine, project_id, &mut dump)?;
    export_constraints(engine, project_id, &mut dump)?;
    export_tasks(engine, project_id, &mut dump)?;
    export_file_changes(engine, project_id, &mut dump)?;
    export_messages(engine, project_id, &mut dump)?;

    Ok(dump)
}

type ProjectRow = (i64, ProjectRecord);

fn project_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ProjectRow> {
    Ok((
        row.get(0)?,
        ProjectRecord {
            name: row.get(1)?,
            display_name: row.get(2)?,
            detection_source: row.get(3)?,
            root_path: row.get(4)?,
            metadata: row.get(5)?,
        },
    ))
}

fn names_for(
    engine: &Engine,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<String>> {
    let mut stmt = engine.conn().prepare(sql)?;
    let rows = stmt.query_map(params, |row| row.get(0))?;
    Ok(rows.collect::<std::result::Result<_, _>>()?)
}

fn export_decisions(engine: &Engine, project_id: i64, dump: &mut ProjectDump) -> Result<()> {
    let decision_rows: Vec<(i64, String, String, i64, Option<String>, Option<String>, i64)> =
        engine
            .conn()
            .prepare(
                "SELECT d.key_id, k.key, d.version, d.status, l.name, a.name, d.ts
                 FROM t_decisions d
                 JOIN m_context_keys k ON k.id = d.key_id
                 LEFT JOIN m_layers l ON l.id = d.layer_id
                 LEFT JOIN m_agents a ON a.id = d.agent_id
                 WHERE d.project_id = ?1 ORDER BY k.key",
            )?
            .query_map(params![project_id], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                ))
            })?
            .collect::<std::result::Result<_, _>>()?;

    for (key_id, key, version, status, layer, agent, ts) in decision_rows {
        let text_value: Option<String> = engine
            .conn()
            .query_row(
                "SELECT value FROM t_decision_values_text
                 WHERE key_id = ?1 AND project_id = ?2",
                params![key_id, project_id],
                |row| row.get(0),
            )
            .ok();
        let numeric_value: Option<f64> = engine
            .conn()
            .query_row(
                "SELECT value FROM t_decision_values_numeric
                 WHERE key_id = ?1 AND project_id = ?2",
                params![key_id, project_id],
                |row| row.get(0),
            )
            .ok();

        let tags = names_for(
            engine,
            "SELECT tg.name FROM t_decision_tags dt JOIN m_tags tg ON tg.id = dt.tag_id
             WHERE dt.key_id = ?1 AND dt.project_id = ?2 ORDER BY tg.name",
            params![key_id, project_id],
        )?;
        let scopes = names_for(
            engine,
            "SELECT sc.name FROM t_decision_scopes ds JOIN m_scopes sc ON sc.id = ds.scope_id
             WHERE ds.key_id = ?1 AND ds.project_id = ?2 ORDER BY sc.name",
            params![key_id, project_id],
        )?;

        let history: Vec<HistoryRecord> = engine
            .conn()
            .prepare(
                "SELECT h.version, h.value, a.name, h.ts FROM t_decision_history h
                 LEFT JOIN m_agents a ON a.id = h.agent_id
                 WHERE h.key_id = ?1 AND h.project_id = ?2 ORDER BY h.id",
            )?
            .query_map(params![key_id, project_id], |row| {
                Ok(HistoryRecord {
                    version: row.get(0)?,
                    value: row.get(1)?,
                    agent: row.get(2)?,
                    ts: row.get(3)?,
                })
            })?
            .collect::<std::result::Result<_, _>>()?;

        let contexts: Vec<ContextRecord> = engine
            .conn()
            .prepare(
                "SELECT c.rationale, c.alternatives_json, c.tradeoffs_json, a.name, c.ts
                 FROM t_decision_contexts c
                 LEFT JOIN m_agents a ON a.id = c.agent_id
                 WHERE c.key_id = ?1 AND c.project_id = ?2 ORDER BY c.id",
            )?
            .query_map(params![key_id, project_id], |row| {
                Ok(ContextRecord {
                    rationale: row.get(0)?,
                    alternatives_json: row.get(1)?,
                    tradeoffs_json: row.get(2)?,
                    agent: row.get(3)?,
                    ts: row.get(4)?,
                })
            })?
            .collect::<std::result::Result<_, _>>()?;

        dump.decisions.push(DecisionRecord {
            key,
            text_value,
            numeric_value,
            version,
            status,
            layer,
            agent,
            ts,
            tags,
            scopes,
            history,
            contexts,
        });
    }
    Ok(())
}

fn export_constraints(engine: &Engine, project_id: i64, dump: &mut ProjectDump) -> Result<()> {
    let rows: Vec<(i64, String, String, i64, i64, Option<String>, Option<String>, i64)> = engine
        .conn()
        .prepare(
            "SELECT c.id, cat.name, c.constraint_text, c.priority, c.active, l.name, a.name, c.ts
             FROM t_constraints c
             JOIN m_constraint_categories cat ON cat.id = c.category_id
             LEFT JOIN m_layers l ON l.id = c.layer_id
             LEFT JOIN m_agents a ON a.id = c.created_by_agent_id
             WHERE c.project_id = ?1 ORDER BY c.id",
        )?
        .query_map(params![project_id], |row| {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
                row.get(6)?,
                row.get(7)?,
            ))
        })?
        .collect::<std::result::Result<_, _>>()?;

    for (id, category, text, priority, active, layer, created_by, ts) in rows {
        let tags = names_for(
            engine,
            "SELECT tg.name FROM t_constraint_tags ct JOIN m_tags tg ON tg.id = ct.tag_id
             WHERE ct.constraint_id = ?1 ORDER BY tg.name",
            params![id],
        )?;
        dump.constraints.push(ConstraintRecord {
            category,
            constraint_text: text,
            priority,
            active: active != 0,
            layer,
            created_by,
            ts,
            tags,
        });
    }
    Ok(())
}

fn export_tasks(engine: &Engine, project_id: i64, dump: &mut ProjectDump) -> Result<()> {
    let rows: Vec<(i64, String, i64, i64, Option<String>, Option<String>, Option<String>, i64, i64)> =
        engine
            .conn()
            .prepare(
                "SELECT t.id, t.title, t.status_id, t.priority, l.name, aa.name, ca.name,
                        t.created_ts, t.updated_ts
                 FROM t_tasks t
                 LEFT JOIN m_layers l ON l.id = t.layer_id
                 LEFT JOIN m_agents aa ON aa.id = t.assigned_agent_id
                 LEFT JOIN m_agents ca ON ca.id = t.created_by_agent_id
                 WHERE t.project_id = ?1 ORDER BY t.id",
            )?
            .query_map(params![project_id], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                    row.get(7)?,
                    row.get(8)?,
                ))
            })?
            .collect::<std::result::Result<_, _>>()?;

    let mut id_to_index = std::collections::HashMap::new();
    for (index, (id, title, status, priority, layer, assigned, created_by, created, updated)) in
        rows.into_iter().enumerate()
    {
        id_to_index.insert(id, index);

        let description: Option<String> = engine
            .conn()
            .query_row(
                "SELECT description FROM t_task_details WHERE task_id = ?1",
                params![id],
                |row| row.get(0),
            )
            .ok()
            .flatten();
        let tags = names_for(
            engine,
            "SELECT tg.name FROM t_task_tags tt JOIN m_tags tg ON tg.id = tt.tag_id
             WHERE tt.task_id = ?1 ORDER BY tg.name",
            params![id],
        )?;
        let files = names_for(
            engine,
            "SELECT f.path FROM t_task_files tf JOIN m_files f ON f.id = tf.file_id
             WHERE tf.task_id = ?1 ORDER BY f.path",
            params![id],
        )?;
        let decisions = names_for(
            engine,
            "SELECT k.key FROM t_task_decisions td JOIN m_context_keys k ON k.id = td.key_id
             WHERE td.task_id = ?1 ORDER BY k.key",
            params![id],
        )?;

        dump.tasks.push(TaskRecord {
            title,
            status,
            priority,
            layer,
            assigned_agent: assigned,
            created_by,
            description,
            created_ts: created,
            updated_ts: updated,
            tags,
            files,
            decisions,
        });
    }

    let edges: Vec<(i64, i64, i64)> = engine
        .conn()
        .prepare(
            "SELECT blocker_task_id, blocked_task_id, created_ts
             FROM t_task_dependencies WHERE project_id = ?1",
        )?
        .query_map(params![project_id], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?))
        })?
        .collect::<std::result::Result<_, _>>()?;

    for (blocker, blocked, created_ts) in edges {
        if let (Some(&blocker_index), Some(&blocked_index)) =
            (id_to_index.get(&blocker), id_to_index.get(&blocked))
        {
            dump.dependencies.push(DependencyRecord {
                blocker_index,
                blocked_index,
                created_ts,
            });
        }
    }
    Ok(())
}

fn export_file_changes(engine: &Engine, project_id: i64, dump: &mut ProjectDump) -> Result<()> {
    let rows = engine
        .conn()
        .prepare(
            "SELECT f.path, c.change_type, l.name, a.name, c.description, c.ts
             FROM t_file_changes c
             JOIN m_files f ON f.id = c.file_id
             LEFT JOIN m_layers l ON l.id = c.layer_id
             LEFT JOIN m_agents a ON a.id = c.agent_id
             WHERE c.project_id = ?1 ORDER BY c.id",
        )?
        .query_map(params![project_id], |row| {
            Ok(FileChangeRecord {
                path: row.get(0)?,
                change_type: row.get(1)?,
                layer: row.get(2)?,
                agent: row.get(3)?,
                description: row.get(4)?,
                ts: row.get(5)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    dump.file_changes = rows;
    Ok(())
}

fn export_messages(engine: &Engine, project_id: i64, dump: &mut ProjectDump) -> Result<()> {
    let rows = engine
        .conn()
        .prepare(
            "SELECT fa.name, ta.name, m.content, m.priority, m.ts
             FROM t_messages m
             JOIN m_agents fa ON fa.id = m.from_agent_id
             LEFT JOIN m_agents ta ON ta.id = m.to_agent_id
             WHERE m.project_id = ?1 ORDER BY m.id",
        )?
        .query_map(params![project_id], |row| {
            Ok(MessageRecord {
                from_agent: row.get(0)?,
                to_agent: row.get(1)?,
                content: row.get(2)?,
                priority: row.get(3)?,
                ts: row.get(4)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    dump.messages = rows;
    Ok(())
}

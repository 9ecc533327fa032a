//! Append-merge import of a JSON project dump.
//!
//! All master references resolve by name through the registry (IDs are
//! renumbered freely); history and context rows are inserted directly so
//! the logical row set of the source project is preserved.

use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::enums::{DetectionSource, Layer};
use crate::storage::project::ensure_project;
use crate::storage::registry::{
    get_or_create_agent, get_or_create_context_key, get_or_create_file, get_or_create_scope,
    get_or_create_tag,
};
use crate::storage::Engine;
use crate::sync::export::{ProjectDump, DUMP_FORMAT};

/// Row counts inserted by an import.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ImportStats {
    pub decisions: usize,
    pub constraints: usize,
    pub tasks: usize,
    pub dependencies: usize,
    pub file_changes: usize,
    pub messages: usize,
}

/// Merge a dump into the current database under `project_name` (defaults
/// to the dump's own project name). Returns insertion counts.
pub fn import_dump(
    engine: &mut Engine,
    dump: &ProjectDump,
    project_name: Option<&str>,
) -> Result<ImportStats> {
    if dump.format != DUMP_FORMAT {
        return Err(Error::Validation(format!(
            "unrecognized dump format '{}'",
            dump.format
        )));
    }

    let name = project_name.unwrap_or(&dump.project.name).to_string();
    let detection = DetectionSource::parse(&dump.project.detection_source)
        .unwrap_or(DetectionSource::Manual);
    let root_path = dump.project.root_path.clone();

    engine.transaction(|tx| {
        let project_id = ensure_project(tx, &name, detection, root_path.as_deref())?;
        let mut stats = ImportStats::default();

        import_decisions(tx, project_id, dump, &mut stats)?;
        import_constraints(tx, project_id, dump, &mut stats)?;
        import_tasks(tx, project_id, dump, &mut stats)?;
        import_file_changes(tx, project_id, dump, &mut stats)?;
        import_messages(tx, project_id, dump, &mut stats)?;

        Ok(stats)
    })
}

fn layer_id_for(name: Option<&str>) -> Result<Option<i64>> {
    name.map(Layer::parse).transpose().map(|l| l.map(Layer::id))
}

fn agent_id_for(conn: &Connection, name: Option<&str>) -> Result<Option<i64>> {
    name.map(|a| get_or_create_agent(conn, a)).transpose()
}

fn import_decisions(
    conn: &Connection,
    project_id: i64,
    dump: &ProjectDump,
    stats: &mut ImportStats,
) -> Result<()> {
    for record in &dump.decisions {
        let key_id = get_or_create_context_key(conn, &record.key)?;
        let layer_id = layer_id_for(record.layer.as_deref())?;
        let agent_id = agent_id_for(conn, record.agent.as_deref())?;

        conn.execute(
            "INSERT INTO t_decisions (key_id, project_id, agent_id, layer_id, version, status, ts)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT (key_id, project_id) DO UPDATE SET
                 agent_id = excluded.agent_id,
                 layer_id = excluded.layer_id,
                 version = excluded.version,
                 status = excluded.status,
                 ts = excluded.ts",
            params![key_id, project_id, agent_id, layer_id, record.version, record.status, record.ts],
        )?;

        if let Some(text) = &record.text_value {
            conn.execute(
                "INSERT INTO t_decision_values_text (key_id, project_id, value)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT (key_id, project_id) DO UPDATE SET value = excluded.value",
                params![key_id, project_id, text],
            )?;
        } else if let Some(number) = record.numeric_value {
            conn.execute(
                "INSERT INTO t_decision_values_numeric (key_id, project_id, value)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT (key_id, project_id) DO UPDATE SET value = excluded.value",
                params![key_id, project_id, number],
            )?;
        }

        for tag in &record.tags {
            let tag_id = get_or_create_tag(conn, project_id, tag)?;
            conn.execute(
                "INSERT INTO t_decision_tags (key_id, tag_id, project_id) VALUES (?1, ?2, ?3)
                 ON CONFLICT (key_id, tag_id, project_id) DO NOTHING",
                params![key_id, tag_id, project_id],
            )?;
            conn.execute(
                "INSERT INTO t_tag_index (tag_name, key_id, project_id) VALUES (?1, ?2, ?3)
                 ON CONFLICT (tag_name, key_id, project_id) DO NOTHING",
                params![tag, key_id, project_id],
            )?;
        }
        for scope in &record.scopes {
            let scope_id = get_or_create_scope(conn, project_id, scope)?;
            conn.execute(
                "INSERT INTO t_decision_scopes (key_id, scope_id, project_id) VALUES (?1, ?2, ?3)
                 ON CONFLICT (key_id, scope_id, project_id) DO NOTHING",
                params![key_id, scope_id, project_id],
            )?;
        }

        for entry in &record.history {
            let history_agent = agent_id_for(conn, entry.agent.as_deref())?;
            conn.execute(
                "INSERT INTO t_decision_history (key_id, project_id, version, value, agent_id, ts)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![key_id, project_id, entry.version, entry.value, history_agent, entry.ts],
            )?;
        }
        for context in &record.contexts {
            let context_agent = agent_id_for(conn, context.agent.as_deref())?;
            conn.execute(
                "INSERT INTO t_decision_contexts
                     (key_id, project_id, rationale, alternatives_json, tradeoffs_json, agent_id, ts)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    key_id,
                    project_id,
                    context.rationale,
                    context.alternatives_json,
                    context.tradeoffs_json,
                    context_agent,
                    context.ts
                ],
            )?;
        }

        stats.decisions += 1;
    }
    Ok(())
}

fn import_constraints(
    conn: &Connection,
    project_id: i64,
    dump: &ProjectDump,
    stats: &mut ImportStats,
) -> Result<()> {
    for record in &dump.constraints {
        let category = crate::model::enums::ConstraintCategory::parse(&record.category)?;
        let layer_id = layer_id_for(record.layer.as_deref())?;
        let agent_id = agent_id_for(conn, record.created_by.as_deref())?;

        conn.execute(
            "INSERT INTO t_constraints
                 (project_id, category_id, layer_id, constraint_text, priority, active,
                  created_by_agent_id, ts)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                project_id,
                category.id(),
                layer_id,
                record.constraint_text,
                record.priority,
                i64::from(record.active),
                agent_id,
                record.ts
            ],
        )?;
        let constraint_id = conn.last_insert_rowid();

        for tag in &record.tags {
            let tag_id = get_or_create_tag(conn, project_id, tag)?;
            conn.execute(
                "INSERT INTO t_constraint_tags (constraint_id, tag_id) VALUES (?1, ?2)
                 ON CONFLICT (constraint_id, tag_id) DO NOTHING",
                params![constraint_id, tag_id],
            )?;
        }
        stats.constraints += 1;
    }
    Ok(())
}

fn import_tasks(
    conn: &Connection,
    project_id: i64,
    dump: &ProjectDump,
    stats: &mut ImportStats,
) -> Result<()> {
    let mut index_to_id = Vec::with_capacity(dump.tasks.len());

    for record in &dump.tasks {
        let layer_id = layer_id_for(record.layer.as_deref())?;
        let assigned = agent_id_for(conn, record.assigned_agent.as_deref())?;
        let created_by = agent_id_for(conn, record.created_by.as_deref())?;

        conn.execute(
            "INSERT INTO t_tasks
                 (project_id, title, status_id, priority, layer_id,
                  assigned_agent_id, created_by_agent_id, created_ts, updated_ts)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                project_id,
                record.title,
                record.status,
                record.priority,
                layer_id,
                assigned,
                created_by,
                record.created_ts,
                record.updated_ts
            ],
        )?;
        let task_id = conn.last_insert_rowid();
        index_to_id.push(task_id);

        if let Some(description) = &record.description {
            conn.execute(
                "INSERT INTO t_task_details (task_id, description) VALUES (?1, ?2)",
                params![task_id, description],
            )?;
        }
        for tag in &record.tags {
            let tag_id = get_or_create_tag(conn, project_id, tag)?;
            conn.execute(
                "INSERT INTO t_task_tags (task_id, tag_id) VALUES (?1, ?2)
                 ON CONFLICT (task_id, tag_id) DO NOTHING",
                params![task_id, tag_id],
            )?;
        }
        for file in &record.files {
            let file_id = get_or_create_file(conn, project_id, file)?;
            conn.execute(
                "INSERT INTO t_task_files (task_id, file_id) VALUES (?1, ?2)
                 ON CONFLICT (task_id, file_id) DO NOTHING",
                params![task_id, file_id],
            )?;
        }
        for key in &record.decisions {
            let key_id = get_or_create_context_key(conn, key)?;
            conn.execute(
                "INSERT INTO t_task_decisions (task_id, key_id) VALUES (?1, ?2)
                 ON CONFLICT (task_id, key_id) DO NOTHING",
                params![task_id, key_id],
            )?;
        }
        stats.tasks += 1;
    }

    for edge in &dump.dependencies {
        let (Some(&blocker), Some(&blocked)) = (
            index_to_id.get(edge.blocker_index),
            index_to_id.get(edge.blocked_index),
        ) else {
            return Err(Error::Validation(format!(
                "dependency references task index out of range: {} -> {}",
                edge.blocker_index, edge.blocked_index
            )));
        };
        conn.execute(
            "INSERT INTO t_task_dependencies
                 (project_id, blocker_task_id, blocked_task_id, created_ts)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (blocker_task_id, blocked_task_id) DO NOTHING",
            params![project_id, blocker, blocked, edge.created_ts],
        )?;
        stats.dependencies += 1;
    }
    Ok(())
}

fn import_file_changes(
    conn: &Connection,
    project_id: i64,
    dump: &ProjectDump,
    stats: &mut ImportStats,
) -> Result<()> {
    for record in &dump.file_changes {
        let file_id = get_or_create_file(conn, project_id, &record.path)?;
        let layer_id = layer_id_for(record.layer.as_deref())?;
        let agent_id = agent_id_for(conn, record.agent.as_deref())?;
        conn.execute(
            "INSERT INTO t_file_changes
                 (project_id, file_id, agent_id, change_type, layer_id, description, ts)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                project_id,
                file_id,
                agent_id,
                record.change_type,
                layer_id,
                record.description,
                record.ts
            ],
        )?;
        stats.file_changes += 1;
    }
    Ok(())
}

fn import_messages(
    conn: &Connection,
    project_id: i64,
    dump: &ProjectDump,
    stats: &mut ImportStats,
) -> Result<()> {
    for record in &dump.messages {
        let from = get_or_create_agent(conn, &record.from_agent)?;
        let to = agent_id_for(conn, record.to_agent.as_deref())?;
        conn.execute(
            "INSERT INTO t_messages (project_id, from_agent_id, to_agent_id, content, priority, ts)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![project_id, from, to, record.content, record.priority, record.ts],
        )?;
        stats.messages += 1;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ConstraintInput, SetDecision, TaskInput};
    use crate::sync::export::export_project;

    /// Property 7: export -> import preserves the logical rows of a
    /// project modulo ID renumbering.
    #[test]
    fn round_trip_preserves_logical_rows() {
        let mut source = Engine::open_memory("source").unwrap();
        source
            .set_decision(
                SetDecision::new("auth_method", "JWT")
                    .with_layer("business")
                    .with_tags(&["auth", "security"]),
            )
            .unwrap();
        source
            .set_decision(SetDecision::new("auth_method", "OAuth2").with_version("2.0.0"))
            .unwrap();
        source
            .set_decision(SetDecision::new("cache_ttl", 300.0).with_tags(&["performance"]))
            .unwrap();
        source
            .add_constraint(ConstraintInput {
                tags: vec!["auth".to_string()],
                ..ConstraintInput::new("security", "tokens expire in 15m")
            })
            .unwrap();
        let t1 = source.create_task(TaskInput::new("first")).unwrap();
        let t2 = source.create_task(TaskInput::new("second")).unwrap();
        source.add_dependency(t1, t2).unwrap();

        let dump = export_project(&source, None).unwrap();

        let mut target = Engine::open_memory("target").unwrap();
        let stats = import_dump(&mut target, &dump, Some("imported")).unwrap();
        assert_eq!(stats.decisions, 2);
        assert_eq!(stats.constraints, 1);
        assert_eq!(stats.tasks, 2);
        assert_eq!(stats.dependencies, 1);

        // Re-open the engine bound to the imported project to compare.
        let mut reexported = export_project(&target, Some("imported")).unwrap();
        let mut original = dump;

        // Normalize the envelope before comparing logical content.
        reexported.exported_at.clear();
        original.exported_at.clear();
        reexported.project.name.clear();
        original.project.name.clear();

        assert_eq!(
            serde_json::to_value(&original).unwrap(),
            serde_json::to_value(&reexported).unwrap()
        );
    }

    #[test]
    fn version_history_survives_round_trip() {
        let mut source = Engine::open_memory("source").unwrap();
        source
            .set_decision(SetDecision::new("k", "v1"))
            .unwrap();
        source
            .set_decision(SetDecision::new("k", "v2").with_version("2.0.0"))
            .unwrap();

        let dump = export_project(&source, None).unwrap();
        let mut target = Engine::open_memory("target").unwrap();
        import_dump(&mut target, &dump, None).unwrap();

        // The importing engine is bound to a different project; query the
        // imported project's rows directly.
        let history: i64 = target
            .conn()
            .query_row(
                "SELECT COUNT(*) FROM t_decision_history h
                 JOIN m_projects p ON p.id = h.project_id WHERE p.name = 'source'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(history, 1);
    }

    #[test]
    fn unrecognized_format_is_rejected() {
        let source = Engine::open_memory("source").unwrap();
        let mut dump = export_project(&source, None).unwrap();
        dump.format = "mystery".to_string();

        let mut target = Engine::open_memory("target").unwrap();
        assert!(import_dump(&mut target, &dump, None).is_err());
    }
}

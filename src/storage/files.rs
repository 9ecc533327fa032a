//! File-change recording.

use rusqlite::{params, Connection};

use crate::error::{Error, Result};
use crate::model::enums::{ChangeType, Layer};
use crate::model::project::{FileChange, FileChangeInput};
use crate::storage::registry::{get_or_create_agent, get_or_create_file};
use crate::storage::sqlite::{now_ts, ts_to_iso};
use crate::storage::Engine;

/// Apply a `file.record` inside an open transaction.
pub fn record_file_change_in(
    conn: &Connection,
    project_id: i64,
    input: &FileChangeInput,
) -> Result<i64> {
    if input.path.trim().is_empty() {
        return Err(Error::Validation("file path must not be empty".to_string()));
    }
    let change_type = ChangeType::parse(&input.change_type)?;
    let layer_id = input
        .layer
        .as_deref()
        .map(Layer::parse)
        .transpose()?
        .map(Layer::id);
    let agent_id = input
        .agent
        .as_deref()
        .map(|a| get_or_create_agent(conn, a))
        .transpose()?;
    let file_id = get_or_create_file(conn, project_id, &input.path)?;

    conn.execute(
        "INSERT INTO t_file_changes
             (project_id, file_id, agent_id, change_type, layer_id, description, ts)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            project_id,
            file_id,
            agent_id,
            change_type.id(),
            layer_id,
            input.description,
            now_ts()
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

impl Engine {
    /// `file.record`: insert one file-change event.
    pub fn record_file_change(&mut self, input: FileChangeInput) -> Result<i64> {
        let project_id = self.project_id();
        self.transaction(|tx| record_file_change_in(tx, project_id, &input))
    }

    /// `file.query`: recent changes, optionally filtered by layer and
    /// recency, most recent first.
    pub fn query_file_changes(
        &self,
        layer: Option<&str>,
        since_ts: Option<i64>,
        limit: usize,
    ) -> Result<Vec<FileChange>> {
        let layer_id = layer.map(Layer::parse).transpose()?.map(Layer::id);

        let mut stmt = self.conn().prepare(
            "SELECT c.id, f.path, c.change_type, l.name, a.name, c.description, c.ts
             FROM t_file_changes c
             JOIN m_files f ON f.id = c.file_id
             LEFT JOIN m_layers l ON l.id = c.layer_id
             LEFT JOIN m_agents a ON a.id = c.agent_id
             WHERE c.project_id = ?1
               AND (?2 IS NULL OR c.layer_id = ?2)
               AND (?3 IS NULL OR c.ts > ?3)
             ORDER BY c.ts DESC LIMIT ?4",
        )?;
        let rows = stmt.query_map(
            params![self.project_id(), layer_id, since_ts, limit as i64],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, i64>(6)?,
                ))
            },
        )?;

        let mut changes = Vec::new();
        for row in rows {
            let (id, path, change_type, layer, agent, description, ts) = row?;
            changes.push(FileChange {
                id,
                path,
                change_type: ChangeType::from_id(change_type).unwrap_or(ChangeType::Modified),
                layer: layer.as_deref().and_then(|l| Layer::parse(l).ok()),
                agent,
                description,
                recorded_at: ts_to_iso(ts),
            });
        }
        Ok(changes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_and_query() {
        let mut engine = Engine::open_memory("demo").unwrap();
        engine
            .record_file_change(FileChangeInput {
                path: "src/auth.rs".to_string(),
                change_type: "modified".to_string(),
                layer: Some("business".to_string()),
                agent: Some("claude".to_string()),
                description: Some("added refresh tokens".to_string()),
            })
            .unwrap();

        let changes = engine.query_file_changes(None, None, 10).unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].path, "src/auth.rs");
        assert_eq!(changes[0].change_type, ChangeType::Modified);
        assert_eq!(changes[0].agent.as_deref(), Some("claude"));

        let business = engine
            .query_file_changes(Some("business"), None, 10)
            .unwrap();
        assert_eq!(business.len(), 1);
        let data = engine.query_file_changes(Some("data"), None, 10).unwrap();
        assert!(data.is_empty());
    }

    #[test]
    fn invalid_change_type_rejected() {
        let mut engine = Engine::open_memory("demo").unwrap();
        let err = engine
            .record_file_change(FileChangeInput {
                path: "x".to_string(),
                change_type: "touched".to_string(),
                layer: None,
                agent: None,
                description: None,
            })
            .unwrap_err();
        assert!(err.to_string().contains("unknown change type"));
    }

    #[test]
    fn repeated_paths_intern_one_master_row() {
        let mut engine = Engine::open_memory("demo").unwrap();
        for _ in 0..3 {
            engine
                .record_file_change(FileChangeInput {
                    path: "src/lib.rs".to_string(),
                    change_type: "modified".to_string(),
                    layer: None,
                    agent: None,
                    description: None,
                })
                .unwrap();
        }
        let files: i64 = engine
            .conn()
            .query_row("SELECT COUNT(*) FROM m_files", [], |r| r.get(0))
            .unwrap();
        assert_eq!(files, 1);
        let changes: i64 = engine
            .conn()
            .query_row("SELECT COUNT(*) FROM t_file_changes", [], |r| r.get(0))
            .unwrap();
        assert_eq!(changes, 3);
    }
}

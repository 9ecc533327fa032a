//! Task graph: status state machine, dependency edges with cycle
//! detection, and the watched-file completion gate.
//!
//! The dependency graph is stored as edges only; cycle checks use a
//! bounded-depth reachability traversal (max depth 100) instead of
//! materializing an in-memory graph.

use std::collections::HashSet;
use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{Error, Result};
use crate::model::enums::{Layer, Priority, TaskStatus};
use crate::model::task::{PrunedFile, Task, TaskDependency, TaskInput, TaskLinkKind};
use crate::storage::registry::{
    get_or_create_agent, get_or_create_context_key, get_or_create_file, get_or_create_tag,
};
use crate::storage::sqlite::{now_ts, ts_to_iso};
use crate::storage::Engine;

/// Maximum depth for the transitive reachability check.
const MAX_CYCLE_DEPTH: usize = 100;

/// Create a task inside an open transaction. Returns the new task ID.
pub fn create_task_in(conn: &Connection, project_id: i64, input: &TaskInput) -> Result<i64> {
    if input.title.trim().is_empty() {
        return Err(Error::Validation("task title must not be empty".to_string()));
    }

    let status = input
        .status
        .as_deref()
        .map(TaskStatus::parse)
        .transpose()?
        .unwrap_or(TaskStatus::Todo);
    let priority = input
        .priority
        .as_deref()
        .map(Priority::parse)
        .transpose()?
        .unwrap_or(Priority::Medium);
    let layer_id = input
        .layer
        .as_deref()
        .map(Layer::parse)
        .transpose()?
        .map(Layer::id);
    let assigned = input
        .assigned_agent
        .as_deref()
        .map(|a| get_or_create_agent(conn, a))
        .transpose()?;
    let created_by = input
        .created_by
        .as_deref()
        .map(|a| get_or_create_agent(conn, a))
        .transpose()?;
    let now = now_ts();

    conn.execute(
        "INSERT INTO t_tasks
             (project_id, title, status_id, priority, layer_id,
              assigned_agent_id, created_by_agent_id, created_ts, updated_ts)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
        params![
            project_id,
            input.title,
            status.id(),
            priority.id(),
            layer_id,
            assigned,
            created_by,
            now
        ],
    )?;
    let task_id = conn.last_insert_rowid();

    if let Some(description) = &input.description {
        conn.execute(
            "INSERT INTO t_task_details (task_id, description) VALUES (?1, ?2)",
            params![task_id, description],
        )?;
    }
    for tag in &input.tags {
        let tag_id = get_or_create_tag(conn, project_id, tag)?;
        conn.execute(
            "INSERT INTO t_task_tags (task_id, tag_id) VALUES (?1, ?2)
             ON CONFLICT (task_id, tag_id) DO NOTHING",
            params![task_id, tag_id],
        )?;
    }
    for file in &input.files {
        let file_id = get_or_create_file(conn, project_id, file)?;
        conn.execute(
            "INSERT INTO t_task_files (task_id, file_id) VALUES (?1, ?2)
             ON CONFLICT (task_id, file_id) DO NOTHING",
            params![task_id, file_id],
        )?;
    }

    Ok(task_id)
}

fn task_status(conn: &Connection, project_id: i64, task_id: i64) -> Result<TaskStatus> {
    let status_id: Option<i64> = conn
        .query_row(
            "SELECT status_id FROM t_tasks WHERE id = ?1 AND project_id = ?2",
            params![task_id, project_id],
            |row| row.get(0),
        )
        .optional()?;
    status_id
        .and_then(TaskStatus::from_id)
        .ok_or(Error::TaskNotFound { id: task_id })
}

/// Depth-first reachability over "blocks" edges, recording the path.
/// Returns the path `from -> ... -> target` when `target` is reachable
/// within [`MAX_CYCLE_DEPTH`].
fn find_path(
    conn: &Connection,
    project_id: i64,
    from: i64,
    target: i64,
) -> Result<Option<Vec<i64>>> {
    fn dfs(
        conn: &Connection,
        project_id: i64,
        current: i64,
        target: i64,
        depth: usize,
        visited: &mut HashSet<i64>,
        path: &mut Vec<i64>,
    ) -> Result<bool> {
        if depth > MAX_CYCLE_DEPTH {
            return Ok(false);
        }
        if current == target {
            path.push(current);
            return Ok(true);
        }
        if !visited.insert(current) {
            return Ok(false);
        }
        path.push(current);

        let next: Vec<i64> = conn
            .prepare(
                "SELECT blocked_task_id FROM t_task_dependencies
                 WHERE blocker_task_id = ?1 AND project_id = ?2",
            )?
            .query_map(params![current, project_id], |row| row.get(0))?
            .collect::<std::result::Result<_, _>>()?;

        for node in next {
            if dfs(conn, project_id, node, target, depth + 1, visited, path)? {
                return Ok(true);
            }
        }
        path.pop();
        Ok(false)
    }

    let mut visited = HashSet::new();
    let mut path = Vec::new();
    if dfs(conn, project_id, from, target, 0, &mut visited, &mut path)? {
        Ok(Some(path))
    } else {
        Ok(None)
    }
}

impl Engine {
    /// `task.create`.
    pub fn create_task(&mut self, input: TaskInput) -> Result<i64> {
        let project_id = self.project_id();
        self.transaction(|tx| create_task_in(tx, project_id, &input))
    }

    /// `task.get`: full projection including description, tags, and
    /// watched files.
    pub fn get_task(&self, id: i64) -> Result<Task> {
        let row = self
            .conn()
            .query_row(
                "SELECT id, title, status, priority, layer, assigned_agent, created_by,
                        created_ts, updated_ts
                 FROM v_tasks WHERE id = ?1 AND project_id = ?2",
                params![id, self.project_id()],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, Option<String>>(4)?,
                        row.get::<_, Option<String>>(5)?,
                        row.get::<_, Option<String>>(6)?,
                        row.get::<_, i64>(7)?,
                        row.get::<_, i64>(8)?,
                    ))
                },
            )
            .optional()?;

        let Some((id, title, status, priority, layer, assigned, created_by, created, updated)) =
            row
        else {
            return Err(Error::TaskNotFound { id });
        };

        let description: Option<String> = self
            .conn()
            .query_row(
                "SELECT description FROM t_task_details WHERE task_id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?
            .flatten();

        let tags: Vec<String> = self
            .conn()
            .prepare(
                "SELECT tg.name FROM t_task_tags tt JOIN m_tags tg ON tg.id = tt.tag_id
                 WHERE tt.task_id = ?1 ORDER BY tg.name",
            )?
            .query_map(params![id], |row| row.get(0))?
            .collect::<std::result::Result<_, _>>()?;

        let watched_files: Vec<String> = self
            .conn()
            .prepare(
                "SELECT f.path FROM t_task_files tf JOIN m_files f ON f.id = tf.file_id
                 WHERE tf.task_id = ?1 ORDER BY f.path",
            )?
            .query_map(params![id], |row| row.get(0))?
            .collect::<std::result::Result<_, _>>()?;

        Ok(Task {
            id,
            title,
            status: TaskStatus::parse(&status)?,
            priority: Priority::from_id(priority).unwrap_or(Priority::Medium),
            layer: layer.as_deref().and_then(|l| Layer::parse(l).ok()),
            description,
            assigned_agent: assigned,
            created_by,
            created_at: ts_to_iso(created),
            updated_at: ts_to_iso(updated),
            tags,
            watched_files,
        })
    }

    /// `task.list`: tasks for the bound project, optionally filtered by
    /// status, most recently updated first.
    pub fn list_tasks(&self, status: Option<&str>, limit: usize) -> Result<Vec<Task>> {
        let status = status.map(TaskStatus::parse).transpose()?;
        let ids: Vec<i64> = self
            .conn()
            .prepare(
                "SELECT t.id FROM t_tasks t
                 WHERE t.project_id = ?1 AND (?2 IS NULL OR t.status_id = ?2)
                 ORDER BY t.updated_ts DESC LIMIT ?3",
            )?
            .query_map(
                params![self.project_id(), status.map(TaskStatus::id), limit as i64],
                |row| row.get(0),
            )?
            .collect::<std::result::Result<_, _>>()?;

        ids.into_iter().map(|id| self.get_task(id)).collect()
    }

    /// `task.update`: mutate title/description/priority/layer/assignee.
    pub fn update_task(
        &mut self,
        id: i64,
        title: Option<&str>,
        description: Option<&str>,
        priority: Option<&str>,
        layer: Option<&str>,
        assigned_agent: Option<&str>,
    ) -> Result<()> {
        let priority = priority.map(Priority::parse).transpose()?;
        let layer_id = layer.map(Layer::parse).transpose()?.map(Layer::id);
        let project_id = self.project_id();

        self.transaction(|tx| {
            task_status(tx, project_id, id)?;

            let assigned = assigned_agent
                .map(|a| get_or_create_agent(tx, a))
                .transpose()?;
            tx.execute(
                "UPDATE t_tasks SET
                     title = COALESCE(?1, title),
                     priority = COALESCE(?2, priority),
                     layer_id = COALESCE(?3, layer_id),
                     assigned_agent_id = COALESCE(?4, assigned_agent_id),
                     updated_ts = ?5
                 WHERE id = ?6 AND project_id = ?7",
                params![
                    title,
                    priority.map(Priority::id),
                    layer_id,
                    assigned,
                    now_ts(),
                    id,
                    project_id
                ],
            )?;

            if let Some(description) = description {
                tx.execute(
                    "INSERT INTO t_task_details (task_id, description) VALUES (?1, ?2)
                     ON CONFLICT (task_id) DO UPDATE SET description = excluded.description",
                    params![id, description],
                )?;
            }
            Ok(())
        })
    }

    /// `task.move`: transition along the permitted state-machine edges.
    ///
    /// Transitions into `done` run the completion quality gate: every
    /// watched file is checked against the filesystem. If all are missing
    /// the transition is refused ("no work evidenced"); if some are
    /// missing those links move to the pruned-files audit table and the
    /// task proceeds.
    pub fn move_task(&mut self, id: i64, new_status: &str, notes: Option<&str>) -> Result<()> {
        let new_status = TaskStatus::parse(new_status)?;
        let project_id = self.project_id();

        self.transaction(|tx| {
            let current = task_status(tx, project_id, id)?;
            if !current.can_transition_to(new_status) {
                return Err(Error::InvalidTransition {
                    from: current.as_str().to_string(),
                    to: new_status.as_str().to_string(),
                });
            }

            if new_status == TaskStatus::Done {
                prune_missing_files_in(tx, project_id, id)?;
            }

            tx.execute(
                "UPDATE t_tasks SET status_id = ?1, updated_ts = ?2
                 WHERE id = ?3 AND project_id = ?4",
                params![new_status.id(), now_ts(), id, project_id],
            )?;

            if let Some(notes) = notes {
                tx.execute(
                    "INSERT INTO t_activity_log (project_id, agent_id, action, detail, ts)
                     VALUES (?1, NULL, ?2, ?3, ?4)",
                    params![
                        project_id,
                        format!("task.move:{}", new_status.as_str()),
                        notes,
                        now_ts()
                    ],
                )?;
            }
            Ok(())
        })
    }

    /// `task.archive`: shorthand for moving into the terminal state.
    pub fn archive_task(&mut self, id: i64) -> Result<()> {
        self.move_task(id, TaskStatus::Archived.as_str(), None)
    }

    /// `task.link`: attach a decision, file, or constraint to a task.
    pub fn link_task(&mut self, id: i64, kind: TaskLinkKind, target: &str) -> Result<()> {
        let project_id = self.project_id();
        self.transaction(|tx| {
            task_status(tx, project_id, id)?;
            match kind {
                TaskLinkKind::Decision => {
                    let key_id = get_or_create_context_key(tx, target)?;
                    tx.execute(
                        "INSERT INTO t_task_decisions (task_id, key_id) VALUES (?1, ?2)
                         ON CONFLICT (task_id, key_id) DO NOTHING",
                        params![id, key_id],
                    )?;
                }
                TaskLinkKind::File => {
                    let file_id = get_or_create_file(tx, project_id, target)?;
                    tx.execute(
                        "INSERT INTO t_task_files (task_id, file_id) VALUES (?1, ?2)
                         ON CONFLICT (task_id, file_id) DO NOTHING",
                        params![id, file_id],
                    )?;
                }
                TaskLinkKind::Constraint => {
                    let constraint_id: i64 = target.parse().map_err(|_| {
                        Error::Validation(format!(
                            "constraint link target must be a numeric id, got '{target}'"
                        ))
                    })?;
                    let exists: i64 = tx.query_row(
                        "SELECT COUNT(*) FROM t_constraints WHERE id = ?1 AND project_id = ?2",
                        params![constraint_id, project_id],
                        |row| row.get(0),
                    )?;
                    if exists == 0 {
                        return Err(Error::NotFound {
                            entity: "Constraint".to_string(),
                            id: target.to_string(),
                        });
                    }
                    // Constraint links ride the activity log; there is no
                    // junction table for them.
                    tx.execute(
                        "INSERT INTO t_activity_log (project_id, agent_id, action, detail, ts)
                         VALUES (?1, NULL, 'task.link:constraint', ?2, ?3)",
                        params![project_id, format!("task {id} -> constraint {constraint_id}"), now_ts()],
                    )?;
                }
            }
            Ok(())
        })
    }

    /// `task.add_dependency`: insert a blocker → blocked edge after the
    /// full rule set: no self-dependency, both tasks exist and are
    /// non-archived, no direct reverse edge, no transitive cycle within
    /// depth 100 (the error carries the offending path).
    pub fn add_dependency(&mut self, blocker: i64, blocked: i64) -> Result<()> {
        let project_id = self.project_id();
        self.transaction(|tx| {
            if blocker == blocked {
                return Err(Error::Validation(
                    "a task cannot depend on itself".to_string(),
                ));
            }

            for id in [blocker, blocked] {
                let status = task_status(tx, project_id, id)?;
                if status == TaskStatus::Archived {
                    return Err(Error::Validation(format!(
                        "task {id} is archived and cannot take dependencies"
                    )));
                }
            }

            let reverse: i64 = tx.query_row(
                "SELECT COUNT(*) FROM t_task_dependencies
                 WHERE blocker_task_id = ?1 AND blocked_task_id = ?2 AND project_id = ?3",
                params![blocked, blocker, project_id],
                |row| row.get(0),
            )?;
            if reverse > 0 {
                return Err(Error::CircularDependency {
                    path: format!("{blocker} -> {blocked} -> {blocker}"),
                });
            }

            // Adding blocker -> blocked creates a cycle iff blocker is
            // already reachable from blocked over "blocks" edges.
            if let Some(tail) = find_path(tx, project_id, blocked, blocker)? {
                let mut path = vec![blocker.to_string()];
                path.extend(tail.iter().map(ToString::to_string));
                return Err(Error::CircularDependency {
                    path: path.join(" -> "),
                });
            }

            tx.execute(
                "INSERT INTO t_task_dependencies
                     (project_id, blocker_task_id, blocked_task_id, created_ts)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (blocker_task_id, blocked_task_id) DO NOTHING",
                params![project_id, blocker, blocked, now_ts()],
            )?;
            Ok(())
        })
    }

    /// `task.remove_dependency`: idempotent.
    pub fn remove_dependency(&mut self, blocker: i64, blocked: i64) -> Result<()> {
        self.conn().execute(
            "DELETE FROM t_task_dependencies
             WHERE blocker_task_id = ?1 AND blocked_task_id = ?2 AND project_id = ?3",
            params![blocker, blocked, self.project_id()],
        )?;
        Ok(())
    }

    /// `task.get_dependencies`: edges blocking the given task.
    pub fn get_dependencies(
        &self,
        task_id: i64,
        include_details: bool,
    ) -> Result<Vec<TaskDependency>> {
        task_status(self.conn(), self.project_id(), task_id)?;

        let mut stmt = self.conn().prepare(
            "SELECT d.blocker_task_id, d.blocked_task_id, d.created_ts, t.title, t.status_id
             FROM t_task_dependencies d
             JOIN t_tasks t ON t.id = d.blocker_task_id
             WHERE d.blocked_task_id = ?1 AND d.project_id = ?2
             ORDER BY d.created_ts",
        )?;
        let rows = stmt.query_map(params![task_id, self.project_id()], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, i64>(4)?,
            ))
        })?;

        let mut deps = Vec::new();
        for row in rows {
            let (blocker, blocked, created, title, status_id) = row?;
            deps.push(TaskDependency {
                blocker_task_id: blocker,
                blocked_task_id: blocked,
                created_at: ts_to_iso(created),
                blocker_title: include_details.then_some(title),
                blocker_status: include_details
                    .then(|| TaskStatus::from_id(status_id))
                    .flatten(),
            });
        }
        Ok(deps)
    }

    /// Pruned-file audit rows for a task.
    pub fn get_pruned_files(&self, task_id: i64) -> Result<Vec<PrunedFile>> {
        let mut stmt = self.conn().prepare(
            "SELECT p.id, p.task_id, p.path, p.pruned_ts, k.key
             FROM t_task_pruned_files p
             LEFT JOIN m_context_keys k ON k.id = p.decision_key_id
             WHERE p.task_id = ?1 AND p.project_id = ?2
             ORDER BY p.id",
        )?;
        let rows = stmt.query_map(params![task_id, self.project_id()], |row| {
            Ok(PrunedFile {
                id: row.get(0)?,
                task_id: row.get(1)?,
                path: row.get(2)?,
                pruned_at: ts_to_iso(row.get(3)?),
                decision_key: row.get(4)?,
            })
        })?;
        Ok(rows.collect::<std::result::Result<_, _>>()?)
    }

    /// Back-link a pruned file to the decision explaining the deletion.
    pub fn explain_pruned_file(&mut self, pruned_id: i64, decision_key: &str) -> Result<()> {
        let project_id = self.project_id();
        self.transaction(|tx| {
            let key_id = get_or_create_context_key(tx, decision_key)?;
            let affected = tx.execute(
                "UPDATE t_task_pruned_files SET decision_key_id = ?1
                 WHERE id = ?2 AND project_id = ?3",
                params![key_id, pruned_id, project_id],
            )?;
            if affected == 0 {
                return Err(Error::NotFound {
                    entity: "Pruned file".to_string(),
                    id: pruned_id.to_string(),
                });
            }
            Ok(())
        })
    }
}

/// Completion quality gate: check every watched file against the
/// filesystem. All missing -> refuse; some missing -> move those links to
/// the audit table and proceed.
fn prune_missing_files_in(conn: &Connection, project_id: i64, task_id: i64) -> Result<()> {
    let watched: Vec<(i64, String)> = conn
        .prepare(
            "SELECT f.id, f.path FROM t_task_files tf
             JOIN m_files f ON f.id = tf.file_id
             WHERE tf.task_id = ?1",
        )?
        .query_map(params![task_id], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<std::result::Result<_, _>>()?;

    if watched.is_empty() {
        return Ok(());
    }

    let missing: Vec<&(i64, String)> = watched
        .iter()
        .filter(|(_, path)| !Path::new(path).exists())
        .collect();

    if missing.len() == watched.len() {
        return Err(Error::NoWorkEvidence { id: task_id });
    }

    let now = now_ts();
    for (file_id, path) in missing {
        conn.execute(
            "INSERT INTO t_task_pruned_files (task_id, project_id, path, pruned_ts)
             VALUES (?1, ?2, ?3, ?4)",
            params![task_id, project_id, path, now],
        )?;
        conn.execute(
            "DELETE FROM t_task_files WHERE task_id = ?1 AND file_id = ?2",
            params![task_id, file_id],
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn engine() -> Engine {
        Engine::open_memory("demo").unwrap()
    }

    fn simple_task(engine: &mut Engine, title: &str) -> i64 {
        engine.create_task(TaskInput::new(title)).unwrap()
    }

    #[test]
    fn create_and_get_round_trips() {
        let mut engine = engine();
        let id = engine
            .create_task(TaskInput {
                description: Some("wire the auth flow".to_string()),
                priority: Some("high".to_string()),
                layer: Some("business".to_string()),
                assigned_agent: Some("claude".to_string()),
                tags: vec!["auth".to_string()],
                files: vec!["src/auth.rs".to_string()],
                ..TaskInput::new("Implement login")
            })
            .unwrap();

        let task = engine.get_task(id).unwrap();
        assert_eq!(task.title, "Implement login");
        assert_eq!(task.status, TaskStatus::Todo);
        assert_eq!(task.priority, Priority::High);
        assert_eq!(task.description.as_deref(), Some("wire the auth flow"));
        assert_eq!(task.watched_files, vec!["src/auth.rs"]);
    }

    #[test]
    fn move_enforces_state_machine() {
        let mut engine = engine();
        let id = simple_task(&mut engine, "t");

        // todo -> done is not a permitted edge.
        let err = engine.move_task(id, "done", None).unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));

        engine.move_task(id, "in_progress", None).unwrap();
        engine.move_task(id, "waiting_review", None).unwrap();
        engine.move_task(id, "done", None).unwrap();
        engine.move_task(id, "in_progress", Some("reopened")).unwrap();
        engine.move_task(id, "done", None).unwrap();
        engine.archive_task(id).unwrap();

        // archived is terminal.
        let err = engine.move_task(id, "todo", None).unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));
    }

    #[test]
    fn self_dependency_rejected() {
        let mut engine = engine();
        let id = simple_task(&mut engine, "t");
        assert!(engine.add_dependency(id, id).is_err());
    }

    #[test]
    fn reverse_edge_rejected() {
        let mut engine = engine();
        let a = simple_task(&mut engine, "a");
        let b = simple_task(&mut engine, "b");
        engine.add_dependency(a, b).unwrap();
        let err = engine.add_dependency(b, a).unwrap_err();
        assert!(matches!(err, Error::CircularDependency { .. }));
    }

    #[test]
    fn transitive_cycle_rejected_with_path() {
        // Scenario C: T1 -> T2 -> T3 -> T1 must fail, naming the cycle.
        let mut engine = engine();
        let t1 = simple_task(&mut engine, "T1");
        let t2 = simple_task(&mut engine, "T2");
        let t3 = simple_task(&mut engine, "T3");

        engine.add_dependency(t1, t2).unwrap();
        engine.add_dependency(t2, t3).unwrap();
        let err = engine.add_dependency(t3, t1).unwrap_err();

        let msg = err.to_string();
        assert!(msg.contains("Circular dependency detected"));
        for id in [t1, t2, t3] {
            assert!(msg.contains(&id.to_string()), "path missing {id}: {msg}");
        }
    }

    #[test]
    fn archived_tasks_cannot_take_dependencies() {
        let mut engine = engine();
        let a = simple_task(&mut engine, "a");
        let b = simple_task(&mut engine, "b");
        engine.archive_task(b).unwrap();
        assert!(engine.add_dependency(a, b).is_err());
    }

    #[test]
    fn remove_dependency_is_idempotent_and_cascade_cleans_up() {
        let mut engine = engine();
        let a = simple_task(&mut engine, "a");
        let b = simple_task(&mut engine, "b");
        engine.add_dependency(a, b).unwrap();

        engine.remove_dependency(a, b).unwrap();
        engine.remove_dependency(a, b).unwrap();

        engine.add_dependency(a, b).unwrap();
        engine
            .conn()
            .execute("DELETE FROM t_tasks WHERE id = ?1", params![a])
            .unwrap();
        let edges: i64 = engine
            .conn()
            .query_row("SELECT COUNT(*) FROM t_task_dependencies", [], |r| r.get(0))
            .unwrap();
        assert_eq!(edges, 0, "cascade delete should remove edges on either side");
    }

    #[test]
    fn get_dependencies_lists_blockers() {
        let mut engine = engine();
        let a = simple_task(&mut engine, "blocker");
        let b = simple_task(&mut engine, "blocked");
        engine.add_dependency(a, b).unwrap();

        let deps = engine.get_dependencies(b, true).unwrap();
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].blocker_task_id, a);
        assert_eq!(deps[0].blocker_title.as_deref(), Some("blocker"));

        let bare = engine.get_dependencies(b, false).unwrap();
        assert!(bare[0].blocker_title.is_none());
    }

    #[test]
    fn completion_gate_refuses_when_all_files_missing() {
        let mut engine = engine();
        let id = engine
            .create_task(TaskInput {
                files: vec!["/nonexistent/one.rs".to_string(), "/nonexistent/two.rs".to_string()],
                ..TaskInput::new("ghost work")
            })
            .unwrap();
        engine.move_task(id, "in_progress", None).unwrap();

        let err = engine.move_task(id, "done", None).unwrap_err();
        assert!(matches!(err, Error::NoWorkEvidence { .. }));
    }

    #[test]
    fn completion_gate_prunes_partial_missing() {
        let tmp = TempDir::new().unwrap();
        let real = tmp.path().join("real.rs");
        std::fs::write(&real, "fn main() {}").unwrap();

        let mut engine = engine();
        let id = engine
            .create_task(TaskInput {
                files: vec![
                    real.to_string_lossy().to_string(),
                    "/nonexistent/gone.rs".to_string(),
                ],
                ..TaskInput::new("partial work")
            })
            .unwrap();
        engine.move_task(id, "in_progress", None).unwrap();
        engine.move_task(id, "done", None).unwrap();

        let task = engine.get_task(id).unwrap();
        assert_eq!(task.status, TaskStatus::Done);
        assert_eq!(task.watched_files.len(), 1);

        let pruned = engine.get_pruned_files(id).unwrap();
        assert_eq!(pruned.len(), 1);
        assert_eq!(pruned[0].path, "/nonexistent/gone.rs");

        // Back-link the pruned row to an explaining decision.
        engine
            .explain_pruned_file(pruned[0].id, "cleanup/removed_legacy_module")
            .unwrap();
        let pruned = engine.get_pruned_files(id).unwrap();
        assert_eq!(
            pruned[0].decision_key.as_deref(),
            Some("cleanup/removed_legacy_module")
        );
    }

    #[test]
    fn tasks_without_watched_files_complete_freely() {
        let mut engine = engine();
        let id = simple_task(&mut engine, "no files");
        engine.move_task(id, "in_progress", None).unwrap();
        engine.move_task(id, "done", None).unwrap();
    }

    #[test]
    fn link_task_kinds() {
        let mut engine = engine();
        let id = simple_task(&mut engine, "t");

        engine
            .link_task(id, TaskLinkKind::Decision, "auth_method")
            .unwrap();
        engine
            .link_task(id, TaskLinkKind::File, "src/lib.rs")
            .unwrap();

        let err = engine
            .link_task(id, TaskLinkKind::Constraint, "999")
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));

        let task = engine.get_task(id).unwrap();
        assert_eq!(task.watched_files, vec!["src/lib.rs"]);
    }

    #[test]
    fn list_filters_by_status() {
        let mut engine = engine();
        let a = simple_task(&mut engine, "a");
        let _b = simple_task(&mut engine, "b");
        engine.move_task(a, "in_progress", None).unwrap();

        let todo = engine.list_tasks(Some("todo"), 10).unwrap();
        assert_eq!(todo.len(), 1);
        let all = engine.list_tasks(None, 10).unwrap();
        assert_eq!(all.len(), 2);
    }
}

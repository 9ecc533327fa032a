//! Master-ID registry: get-or-create helpers for interned strings.
//!
//! All helpers use the atomic insert-if-absent-then-select pattern so two
//! concurrent callers observe the same ID; the unique index makes the
//! insert race-safe. Layer, task-status, and constraint-category lookups
//! are read-only; misses are Validation errors handled by the enum
//! parsers before reaching this module.

use rusqlite::{params, Connection};

use crate::error::Result;
use crate::storage::sqlite::now_ts;

/// Get or create an agent by name, refreshing `last_active_ts`.
pub fn get_or_create_agent(conn: &Connection, name: &str) -> Result<i64> {
    let now = now_ts();
    conn.execute(
        "INSERT INTO m_agents (name, last_active_ts) VALUES (?1, ?2)
         ON CONFLICT (name) DO UPDATE SET last_active_ts = excluded.last_active_ts",
        params![name, now],
    )?;
    let id = conn.query_row(
        "SELECT id FROM m_agents WHERE name = ?1",
        params![name],
        |row| row.get(0),
    )?;
    Ok(id)
}

/// Get or create a file path, unique per project.
pub fn get_or_create_file(conn: &Connection, project_id: i64, path: &str) -> Result<i64> {
    conn.execute(
        "INSERT INTO m_files (project_id, path) VALUES (?1, ?2)
         ON CONFLICT (project_id, path) DO NOTHING",
        params![project_id, path],
    )?;
    let id = conn.query_row(
        "SELECT id FROM m_files WHERE project_id = ?1 AND path = ?2",
        params![project_id, path],
        |row| row.get(0),
    )?;
    Ok(id)
}

/// Get or create a tag, unique per project.
pub fn get_or_create_tag(conn: &Connection, project_id: i64, name: &str) -> Result<i64> {
    conn.execute(
        "INSERT INTO m_tags (project_id, name) VALUES (?1, ?2)
         ON CONFLICT (project_id, name) DO NOTHING",
        params![project_id, name],
    )?;
    let id = conn.query_row(
        "SELECT id FROM m_tags WHERE project_id = ?1 AND name = ?2",
        params![project_id, name],
        |row| row.get(0),
    )?;
    Ok(id)
}

/// Get or create a scope, unique per project.
pub fn get_or_create_scope(conn: &Connection, project_id: i64, name: &str) -> Result<i64> {
    conn.execute(
        "INSERT INTO m_scopes (project_id, name) VALUES (?1, ?2)
         ON CONFLICT (project_id, name) DO NOTHING",
        params![project_id, name],
    )?;
    let id = conn.query_row(
        "SELECT id FROM m_scopes WHERE project_id = ?1 AND name = ?2",
        params![project_id, name],
        |row| row.get(0),
    )?;
    Ok(id)
}

/// Get or create a context key. Project-global: the same key name denotes
/// the same logical decision across projects.
pub fn get_or_create_context_key(conn: &Connection, key: &str) -> Result<i64> {
    conn.execute(
        "INSERT INTO m_context_keys (key) VALUES (?1) ON CONFLICT (key) DO NOTHING",
        params![key],
    )?;
    let id = conn.query_row(
        "SELECT id FROM m_context_keys WHERE key = ?1",
        params![key],
        |row| row.get(0),
    )?;
    Ok(id)
}

/// Look up an existing context key without creating it.
pub fn find_context_key(conn: &Connection, key: &str) -> Result<Option<i64>> {
    use rusqlite::OptionalExtension;
    let id = conn
        .query_row(
            "SELECT id FROM m_context_keys WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()?;
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::sqlite::Storage;

    fn storage_with_project() -> (Storage, i64) {
        let storage = Storage::open_memory().unwrap();
        storage
            .conn()
            .execute(
                "INSERT INTO m_projects (name, detection_source, created_ts, last_active_ts)
                 VALUES ('p', 'manual', 0, 0)",
                [],
            )
            .unwrap();
        let project_id = storage.conn().last_insert_rowid();
        (storage, project_id)
    }

    #[test]
    fn get_or_create_is_stable() {
        let (storage, project_id) = storage_with_project();
        let conn = storage.conn();

        let a1 = get_or_create_agent(conn, "claude").unwrap();
        let a2 = get_or_create_agent(conn, "claude").unwrap();
        assert_eq!(a1, a2);

        let t1 = get_or_create_tag(conn, project_id, "auth").unwrap();
        let t2 = get_or_create_tag(conn, project_id, "auth").unwrap();
        assert_eq!(t1, t2);

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM m_tags", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn tags_are_scoped_per_project() {
        let (storage, project_id) = storage_with_project();
        let conn = storage.conn();
        conn.execute(
            "INSERT INTO m_projects (name, detection_source, created_ts, last_active_ts)
             VALUES ('q', 'manual', 0, 0)",
            [],
        )
        .unwrap();
        let other = conn.last_insert_rowid();

        let t1 = get_or_create_tag(conn, project_id, "auth").unwrap();
        let t2 = get_or_create_tag(conn, other, "auth").unwrap();
        assert_ne!(t1, t2);
    }

    #[test]
    fn context_keys_are_project_global() {
        let (storage, _) = storage_with_project();
        let conn = storage.conn();
        let k1 = get_or_create_context_key(conn, "auth_method").unwrap();
        let k2 = get_or_create_context_key(conn, "auth_method").unwrap();
        assert_eq!(k1, k2);
        assert_eq!(find_context_key(conn, "auth_method").unwrap(), Some(k1));
        assert_eq!(find_context_key(conn, "absent").unwrap(), None);
    }

    #[test]
    fn agent_reference_refreshes_activity() {
        let (storage, _) = storage_with_project();
        let conn = storage.conn();
        get_or_create_agent(conn, "claude").unwrap();
        conn.execute("UPDATE m_agents SET last_active_ts = 0", [])
            .unwrap();
        get_or_create_agent(conn, "claude").unwrap();
        let ts: i64 = conn
            .query_row("SELECT last_active_ts FROM m_agents WHERE name = 'claude'", [], |r| {
                r.get(0)
            })
            .unwrap();
        assert!(ts > 0);
    }
}

//! Project binding: the top-level tenant every write is scoped to.

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{Error, Result};
use crate::model::enums::DetectionSource;
use crate::model::Project;
use crate::storage::sqlite::{now_ts, ts_to_iso};

/// Create the project row if absent and refresh `last_active_ts`.
/// Returns the project ID.
pub fn ensure_project(
    conn: &Connection,
    name: &str,
    detection_source: DetectionSource,
    root_path: Option<&str>,
) -> Result<i64> {
    let now = now_ts();
    conn.execute(
        "INSERT INTO m_projects (name, detection_source, root_path, created_ts, last_active_ts)
         VALUES (?1, ?2, ?3, ?4, ?4)
         ON CONFLICT (name) DO UPDATE SET last_active_ts = excluded.last_active_ts",
        params![name, detection_source.as_str(), root_path, now],
    )?;
    let id = conn.query_row(
        "SELECT id FROM m_projects WHERE name = ?1",
        params![name],
        |row| row.get(0),
    )?;
    Ok(id)
}

/// Fetch a project by name.
pub fn get_project(conn: &Connection, name: &str) -> Result<Project> {
    conn.query_row(
        "SELECT id, name, display_name, detection_source, root_path,
                created_ts, last_active_ts, metadata
         FROM m_projects WHERE name = ?1",
        params![name],
        |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, i64>(5)?,
                row.get::<_, i64>(6)?,
                row.get::<_, Option<String>>(7)?,
            ))
        },
    )
    .optional()?
    .map_or_else(
        || {
            Err(Error::NotFound {
                entity: "Project".to_string(),
                id: name.to_string(),
            })
        },
        |(id, name, display_name, source, root_path, created, active, metadata)| {
            Ok(Project {
                id,
                name,
                display_name,
                detection_source: DetectionSource::parse(&source)?,
                root_path,
                created_at: ts_to_iso(created),
                last_active_at: ts_to_iso(active),
                metadata: metadata.and_then(|m| serde_json::from_str(&m).ok()),
            })
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::sqlite::Storage;

    #[test]
    fn ensure_project_creates_then_refreshes() {
        let storage = Storage::open_memory().unwrap();
        let conn = storage.conn();

        let id1 = ensure_project(conn, "myproj", DetectionSource::Git, Some("/src/myproj")).unwrap();
        let id2 = ensure_project(conn, "myproj", DetectionSource::Git, None).unwrap();
        assert_eq!(id1, id2);

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM m_projects", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);

        let project = get_project(conn, "myproj").unwrap();
        assert_eq!(project.root_path.as_deref(), Some("/src/myproj"));
        assert_eq!(project.detection_source, DetectionSource::Git);
    }

    #[test]
    fn missing_project_is_not_found() {
        let storage = Storage::open_memory().unwrap();
        let err = get_project(storage.conn(), "ghost").unwrap_err();
        assert!(err.to_string().contains("Project not found"));
    }
}

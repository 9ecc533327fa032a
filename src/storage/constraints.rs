//! Constraint store: priority-tagged rules with soft delete.
//!
//! Constraints are created active (unless captured during plan mode) and
//! never removed by the core; `deactivate` flips the flag and
//! `activate_by_tag` commits a batch captured under a plan tag.

use rusqlite::{params, Connection};

use crate::error::{Error, Result};
use crate::model::constraint::{Constraint, ConstraintFilter, ConstraintInput};
use crate::model::enums::{ConstraintCategory, Layer, Priority};
use crate::storage::registry::{get_or_create_agent, get_or_create_tag};
use crate::storage::sqlite::{now_ts, ts_to_iso};
use crate::storage::Engine;

/// Apply a `constraint.add` inside an open transaction. Returns the new
/// constraint ID.
pub fn add_constraint_in(
    conn: &Connection,
    project_id: i64,
    input: &ConstraintInput,
) -> Result<i64> {
    if input.constraint_text.trim().is_empty() {
        return Err(Error::Validation(
            "constraint text must not be empty".to_string(),
        ));
    }

    let category = ConstraintCategory::parse(&input.category)?;
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
    let agent_id = input
        .created_by
        .as_deref()
        .map(|a| get_or_create_agent(conn, a))
        .transpose()?;
    let active = input.active.unwrap_or(true);

    conn.execute(
        "INSERT INTO t_constraints
             (project_id, category_id, layer_id, constraint_text, priority, active,
              created_by_agent_id, ts)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            project_id,
            category.id(),
            layer_id,
            input.constraint_text,
            priority.id(),
            i64::from(active),
            agent_id,
            now_ts()
        ],
    )?;
    let constraint_id = conn.last_insert_rowid();

    for tag in &input.tags {
        let tag_id = get_or_create_tag(conn, project_id, tag)?;
        conn.execute(
            "INSERT INTO t_constraint_tags (constraint_id, tag_id) VALUES (?1, ?2)
             ON CONFLICT (constraint_id, tag_id) DO NOTHING",
            params![constraint_id, tag_id],
        )?;
    }

    Ok(constraint_id)
}

impl Engine {
    /// `constraint.add`: validate category and priority against the
    /// seeded enums, then insert.
    pub fn add_constraint(&mut self, input: ConstraintInput) -> Result<i64> {
        let project_id = self.project_id();
        self.transaction(|tx| add_constraint_in(tx, project_id, &input))
    }

    /// `constraint.get`: query the pre-joined view. A tag filter matches
    /// any of the given tags.
    pub fn get_constraints(&self, filter: &ConstraintFilter) -> Result<Vec<Constraint>> {
        let category = filter
            .category
            .as_deref()
            .map(ConstraintCategory::parse)
            .transpose()?;
        let layer = filter.layer.as_deref().map(Layer::parse).transpose()?;
        let priority = filter
            .priority
            .as_deref()
            .map(Priority::parse)
            .transpose()?;

        let mut stmt = self.conn().prepare(
            "SELECT id, category, constraint_text, priority, active, layer, created_by, ts, tags
             FROM v_constraints WHERE project_id = ?1 ORDER BY priority DESC, ts DESC",
        )?;
        let rows = stmt.query_map(params![self.project_id()], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, Option<String>>(5)?,
                row.get::<_, Option<String>>(6)?,
                row.get::<_, i64>(7)?,
                row.get::<_, Option<String>>(8)?,
            ))
        })?;

        let limit = filter.limit.unwrap_or(100);
        let mut constraints = Vec::new();
        for row in rows {
            let (id, cat, text, prio, active, lay, created_by, ts, tags) = row?;
            let active = active != 0;
            if filter.active_only && !active {
                continue;
            }

            let cat = ConstraintCategory::parse(&cat)?;
            if category.is_some_and(|c| c != cat) {
                continue;
            }
            let lay = lay.as_deref().and_then(|l| Layer::parse(l).ok());
            if layer.is_some_and(|l| lay != Some(l)) {
                continue;
            }
            let prio = Priority::from_id(prio).unwrap_or(Priority::Medium);
            if priority.is_some_and(|p| p != prio) {
                continue;
            }

            let tags: Vec<String> = tags
                .as_deref()
                .map(|t| t.split(',').filter(|s| !s.is_empty()).map(ToString::to_string).collect())
                .unwrap_or_default();
            if !filter.tags.is_empty() && !filter.tags.iter().any(|t| tags.contains(t)) {
                continue;
            }

            constraints.push(Constraint {
                id,
                category: cat,
                constraint_text: text,
                priority: prio,
                layer: lay,
                active,
                created_by,
                created_at: ts_to_iso(ts),
                tags,
            });
            if constraints.len() >= limit {
                break;
            }
        }
        Ok(constraints)
    }

    /// `constraint.deactivate`: idempotent soft delete.
    pub fn deactivate_constraint(&mut self, id: i64) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE t_constraints SET active = 0 WHERE id = ?1 AND project_id = ?2",
            params![id, self.project_id()],
        )?;
        if affected == 0 {
            let exists: i64 = self.conn().query_row(
                "SELECT COUNT(*) FROM t_constraints WHERE id = ?1 AND project_id = ?2",
                params![id, self.project_id()],
                |row| row.get(0),
            )?;
            if exists == 0 {
                return Err(Error::NotFound {
                    entity: "Constraint".to_string(),
                    id: id.to_string(),
                });
            }
        }
        Ok(())
    }

    /// `constraint.activate_by_tag`: set `active = true` for every
    /// constraint carrying the tag. Used to commit constraints captured
    /// during plan mode. Returns the number of activated rows.
    pub fn activate_constraints_by_tag(&mut self, tag: &str) -> Result<usize> {
        let affected = self.conn().execute(
            "UPDATE t_constraints SET active = 1
             WHERE project_id = ?1 AND id IN (
                 SELECT ct.constraint_id FROM t_constraint_tags ct
                 JOIN m_tags tg ON tg.id = ct.tag_id
                 WHERE tg.name = ?2 AND tg.project_id = ?1)",
            params![self.project_id(), tag],
        )?;
        Ok(affected)
    }
}

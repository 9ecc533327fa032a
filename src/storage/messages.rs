//! Agent-to-agent messages.
//!
//! Every insert triggers auto-cleanup; messages are the one entity class
//! with hard expiry.

use rusqlite::{params, Connection};

use crate::error::{Error, Result};
use crate::model::enums::Priority;
use crate::model::project::{Message, MessageInput};
use crate::storage::registry::get_or_create_agent;
use crate::storage::sqlite::{now_ts, ts_to_iso};
use crate::storage::Engine;

/// Apply a `message.send` inside an open transaction.
pub fn send_message_in(conn: &Connection, project_id: i64, input: &MessageInput) -> Result<i64> {
    if input.content.trim().is_empty() {
        return Err(Error::Validation(
            "message content must not be empty".to_string(),
        ));
    }
    let priority = input
        .priority
        .as_deref()
        .map(Priority::parse)
        .transpose()?
        .unwrap_or(Priority::Medium);
    let from = get_or_create_agent(conn, &input.from_agent)?;
    let to = input
        .to_agent
        .as_deref()
        .map(|a| get_or_create_agent(conn, a))
        .transpose()?;

    conn.execute(
        "INSERT INTO t_messages (project_id, from_agent_id, to_agent_id, content, priority, ts)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![project_id, from, to, input.content, priority.id(), now_ts()],
    )?;
    Ok(conn.last_insert_rowid())
}

impl Engine {
    /// `message.send`: insert, then run retention.
    pub fn send_message(&mut self, input: MessageInput) -> Result<i64> {
        let project_id = self.project_id();
        let id = self.transaction(|tx| send_message_in(tx, project_id, &input))?;
        if let Err(e) = self.perform_auto_cleanup() {
            tracing::warn!(error = %e, "Post-send retention failed");
        }
        Ok(id)
    }

    /// `message.list`: messages for an agent (or broadcast), newest first.
    pub fn list_messages(&self, for_agent: Option<&str>, limit: usize) -> Result<Vec<Message>> {
        let mut stmt = self.conn().prepare(
            "SELECT m.id, fa.name, ta.name, m.content, m.priority, m.ts
             FROM t_messages m
             JOIN m_agents fa ON fa.id = m.from_agent_id
             LEFT JOIN m_agents ta ON ta.id = m.to_agent_id
             WHERE m.project_id = ?1
               AND (?2 IS NULL OR ta.name = ?2 OR m.to_agent_id IS NULL)
             ORDER BY m.ts DESC LIMIT ?3",
        )?;
        let rows = stmt.query_map(
            params![self.project_id(), for_agent, limit as i64],
            |row| {
                Ok(Message {
                    id: row.get(0)?,
                    from_agent: row.get(1)?,
                    to_agent: row.get(2)?,
                    content: row.get(3)?,
                    priority: Priority::from_id(row.get(4)?).unwrap_or(Priority::Medium),
                    sent_at: ts_to_iso(row.get::<_, i64>(5)?),
                })
            },
        )?;
        Ok(rows.collect::<std::result::Result<_, _>>()?)
    }
}

//! Weekend-aware retention and cleanup.
//!
//! Two rules, run on startup and after every message insert: messages
//! older than `autodelete.message_hours` and file-change rows older than
//! `autodelete.file_history_days` are deleted. When `ignore_weekend` is
//! set, only non-weekend hours count toward the cutoff, so a message
//! posted Friday afternoon survives the weekend untouched.
//!
//! Decisions, decision history, constraints, and tasks are never
//! auto-deleted; constraints use soft delete only.

use chrono::{Datelike, Local, NaiveDateTime, TimeDelta, Weekday};
use rusqlite::params;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::storage::Engine;

/// Rows removed by one cleanup pass.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CleanupStats {
    pub messages_deleted: usize,
    pub file_changes_deleted: usize,
    /// Done tasks moved to archived past `tasks.auto_archive_done_days`.
    pub tasks_archived: usize,
}

/// Seconds between `start` and `end` that fall on Monday through Friday,
/// in local wall-clock terms.
#[must_use]
pub fn non_weekend_seconds(start: NaiveDateTime, end: NaiveDateTime) -> i64 {
    if end <= start {
        return 0;
    }

    let mut total = 0i64;
    let mut day = start.date();
    while day <= end.date() {
        if !matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
            let day_start = day.and_hms_opt(0, 0, 0).expect("midnight is valid");
            let day_end = day_start + TimeDelta::days(1);
            let span_start = day_start.max(start);
            let span_end = day_end.min(end);
            if span_end > span_start {
                total += (span_end - span_start).num_seconds();
            }
        }
        day = day.succ_opt().expect("date overflow");
    }
    total
}

/// Whether a row stamped `row_time` has aged past `retention_secs` by
/// `now`. With `ignore_weekend`, full Saturday-Sunday spans between the
/// two instants do not count.
#[must_use]
pub fn is_expired(
    row_time: NaiveDateTime,
    now: NaiveDateTime,
    retention_secs: i64,
    ignore_weekend: bool,
) -> bool {
    if ignore_weekend {
        non_weekend_seconds(row_time, now) > retention_secs
    } else {
        (now - row_time).num_seconds() > retention_secs
    }
}

fn epoch_to_local_naive(ts: i64) -> Option<NaiveDateTime> {
    chrono::DateTime::from_timestamp(ts, 0).map(|dt| dt.with_timezone(&Local).naive_local())
}

impl Engine {
    /// Run both retention rules for the bound project.
    pub fn perform_auto_cleanup(&mut self) -> Result<CleanupStats> {
        let ignore_weekend = self.settings().autodelete.ignore_weekend;
        let message_secs = i64::from(self.settings().autodelete.message_hours) * 3600;
        let file_secs = i64::from(self.settings().autodelete.file_history_days) * 86_400;
        let now_local = Local::now().naive_local();
        let now_epoch = chrono::Utc::now().timestamp();
        let project_id = self.project_id();

        let mut stats = CleanupStats::default();

        // Wall-clock age is an upper bound on non-weekend age, so the SQL
        // pre-filter is safe in both modes; the weekend math runs only on
        // the candidate set.
        stats.messages_deleted = self.expire_rows(
            "t_messages",
            project_id,
            now_epoch - message_secs,
            |ts| {
                epoch_to_local_naive(ts)
                    .is_some_and(|t| is_expired(t, now_local, message_secs, ignore_weekend))
            },
        )?;
        stats.file_changes_deleted = self.expire_rows(
            "t_file_changes",
            project_id,
            now_epoch - file_secs,
            |ts| {
                epoch_to_local_naive(ts)
                    .is_some_and(|t| is_expired(t, now_local, file_secs, ignore_weekend))
            },
        )?;

        // Done tasks age into the terminal state; rows are never deleted.
        let archive_cutoff =
            now_epoch - i64::from(self.settings().tasks.auto_archive_done_days) * 86_400;
        stats.tasks_archived = self.conn().execute(
            "UPDATE t_tasks SET status_id = ?1, updated_ts = ?2
             WHERE project_id = ?3 AND status_id = ?4 AND updated_ts <= ?5",
            params![
                crate::model::TaskStatus::Archived.id(),
                now_epoch,
                project_id,
                crate::model::TaskStatus::Done.id(),
                archive_cutoff
            ],
        )?;

        if stats.messages_deleted > 0 || stats.file_changes_deleted > 0 || stats.tasks_archived > 0
        {
            tracing::info!(
                messages = stats.messages_deleted,
                file_changes = stats.file_changes_deleted,
                tasks_archived = stats.tasks_archived,
                "Retention pass removed expired rows"
            );
        }
        Ok(stats)
    }

    /// Tasks sitting in `in_progress` or `waiting_review` past their
    /// configured staleness thresholds, most stale first.
    pub fn list_stale_tasks(&self) -> Result<Vec<crate::model::Task>> {
        let now = chrono::Utc::now().timestamp();
        let in_progress_cutoff =
            now - i64::from(self.settings().tasks.stale_hours_in_progress) * 3600;
        let review_cutoff =
            now - i64::from(self.settings().tasks.stale_hours_waiting_review) * 3600;

        let ids: Vec<i64> = self
            .conn()
            .prepare(
                "SELECT id FROM t_tasks
                 WHERE project_id = ?1
                   AND ((status_id = ?2 AND updated_ts <= ?3)
                     OR (status_id = ?4 AND updated_ts <= ?5))
                 ORDER BY updated_ts",
            )?
            .query_map(
                params![
                    self.project_id(),
                    crate::model::TaskStatus::InProgress.id(),
                    in_progress_cutoff,
                    crate::model::TaskStatus::WaitingReview.id(),
                    review_cutoff
                ],
                |row| row.get(0),
            )?
            .collect::<std::result::Result<_, _>>()?;

        ids.into_iter().map(|id| self.get_task(id)).collect()
    }

    fn expire_rows(
        &mut self,
        table: &str,
        project_id: i64,
        wall_cutoff: i64,
        expired: impl Fn(i64) -> bool,
    ) -> Result<usize> {
        let candidates: Vec<(i64, i64)> = self
            .conn()
            .prepare(&format!(
                "SELECT id, ts FROM {table} WHERE project_id = ?1 AND ts <= ?2"
            ))?
            .query_map(params![project_id, wall_cutoff], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })?
            .collect::<std::result::Result<_, _>>()?;

        let doomed: Vec<i64> = candidates
            .into_iter()
            .filter(|(_, ts)| expired(*ts))
            .map(|(id, _)| id)
            .collect();

        if doomed.is_empty() {
            return Ok(0);
        }

        let sql = format!("DELETE FROM {table} WHERE id = ?1");
        self.transaction(|tx| {
            for id in &doomed {
                tx.execute(&sql, params![id])?;
            }
            Ok(())
        })?;
        Ok(doomed.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::model::project::MessageInput;
    use chrono::NaiveDate;

    fn dt(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    #[test]
    fn weekday_span_counts_fully() {
        // Tuesday 10:00 -> Wednesday 10:00, no weekend involved.
        let start = dt(2026, 1, 6, 10, 0);
        let end = dt(2026, 1, 7, 10, 0);
        assert_eq!(non_weekend_seconds(start, end), 86_400);
    }

    #[test]
    fn weekend_span_counts_zero() {
        // Saturday 00:00 -> Monday 00:00.
        let start = dt(2026, 1, 3, 0, 0);
        let end = dt(2026, 1, 5, 0, 0);
        assert_eq!(non_weekend_seconds(start, end), 0);
    }

    #[test]
    fn friday_message_survives_until_monday_afternoon() {
        // Scenario E: posted Friday 15:00, 24h retention.
        let posted = dt(2026, 1, 2, 15, 0); // Friday
        let h24 = 24 * 3600;

        assert!(!is_expired(posted, dt(2026, 1, 5, 14, 59), h24, true));
        assert!(is_expired(posted, dt(2026, 1, 5, 15, 1), h24, true));

        // Without the flag, wall-clock retention applies.
        assert!(is_expired(posted, dt(2026, 1, 3, 15, 1), h24, false));
    }

    #[test]
    fn expiry_requires_strictly_more_than_budget() {
        let posted = dt(2026, 1, 6, 10, 0); // Tuesday
        let h24 = 24 * 3600;
        assert!(!is_expired(posted, dt(2026, 1, 7, 10, 0), h24, true));
        assert!(is_expired(posted, dt(2026, 1, 7, 10, 1), h24, true));
    }

    #[test]
    fn cleanup_removes_old_messages_and_file_changes() {
        let mut engine = Engine::open_memory_with_settings("demo", Settings::default()).unwrap();
        engine
            .send_message(MessageInput {
                from_agent: "a".to_string(),
                to_agent: None,
                content: "old news".to_string(),
                priority: None,
            })
            .unwrap();

        // Age the row far past any weekend allowance.
        engine
            .conn()
            .execute("UPDATE t_messages SET ts = ts - 40 * 86400", [])
            .unwrap();

        let stats = engine.perform_auto_cleanup().unwrap();
        assert_eq!(stats.messages_deleted, 1);

        let remaining: i64 = engine
            .conn()
            .query_row("SELECT COUNT(*) FROM t_messages", [], |r| r.get(0))
            .unwrap();
        assert_eq!(remaining, 0);
    }

    #[test]
    fn cleanup_never_touches_decisions_or_tasks() {
        let mut engine = Engine::open_memory("demo").unwrap();
        engine
            .set_decision(crate::model::SetDecision::new("k", "v"))
            .unwrap();
        let task = engine
            .create_task(crate::model::TaskInput::new("old task"))
            .unwrap();
        engine
            .conn()
            .execute("UPDATE t_decisions SET ts = 0", [])
            .unwrap();
        engine
            .conn()
            .execute("UPDATE t_tasks SET updated_ts = 0", [])
            .unwrap();

        engine.perform_auto_cleanup().unwrap();

        assert!(engine.get_decision("k").is_ok());
        assert!(engine.get_task(task).is_ok());
    }

    #[test]
    fn old_done_tasks_are_archived_not_deleted() {
        let mut engine = Engine::open_memory("demo").unwrap();
        let id = engine
            .create_task(crate::model::TaskInput::new("shipped long ago"))
            .unwrap();
        engine.move_task(id, "in_progress", None).unwrap();
        engine.move_task(id, "done", None).unwrap();
        engine
            .conn()
            .execute("UPDATE t_tasks SET updated_ts = updated_ts - 40 * 86400", [])
            .unwrap();

        let stats = engine.perform_auto_cleanup().unwrap();
        assert_eq!(stats.tasks_archived, 1);

        let task = engine.get_task(id).unwrap();
        assert_eq!(task.status, crate::model::TaskStatus::Archived);
    }

    #[test]
    fn stale_tasks_respect_per_status_thresholds() {
        let mut engine = Engine::open_memory("demo").unwrap();
        let fresh = engine
            .create_task(crate::model::TaskInput::new("fresh"))
            .unwrap();
        let stuck = engine
            .create_task(crate::model::TaskInput::new("stuck"))
            .unwrap();
        engine.move_task(fresh, "in_progress", None).unwrap();
        engine.move_task(stuck, "in_progress", None).unwrap();

        // Default threshold is 24h for in_progress; age one task past it.
        engine
            .conn()
            .execute(
                "UPDATE t_tasks SET updated_ts = updated_ts - 2 * 86400 WHERE id = ?1",
                params![stuck],
            )
            .unwrap();

        let stale = engine.list_stale_tasks().unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].title, "stuck");
    }

    #[test]
    fn fresh_messages_survive_cleanup() {
        let mut engine = Engine::open_memory("demo").unwrap();
        engine
            .send_message(MessageInput {
                from_agent: "a".to_string(),
                to_agent: None,
                content: "hot off the press".to_string(),
                priority: None,
            })
            .unwrap();
        let stats = engine.perform_auto_cleanup().unwrap();
        assert_eq!(stats.messages_deleted, 0);
    }
}

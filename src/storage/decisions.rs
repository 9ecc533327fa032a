//! Decision store: set/get/version/search, tag-index maintenance, JSON
//! rationale validation, and templates.
//!
//! A decision is identified by `(key_id, project_id)` and is mutable;
//! every mutation appends exactly one history row holding the *prior*
//! value before overwriting. The denormalized tag index is updated in the
//! same transaction as the junction table, so the two never diverge.

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{Error, Result};
use crate::model::decision::{
    Decision, DecisionContextInput, DecisionTemplate, DecisionValue, DecisionVersion,
    SearchFilter, SetDecision, TagMatchMode,
};
use crate::model::enums::{DecisionStatus, Layer};
use crate::storage::registry::{
    find_context_key, get_or_create_agent, get_or_create_context_key, get_or_create_scope,
    get_or_create_tag,
};
use crate::storage::sqlite::{now_ts, ts_to_iso};
use crate::storage::Engine;

/// Default version assigned on first set.
const INITIAL_VERSION: &str = "1.0.0";

/// Prefix inference for `quick_set`: first `/`-separated segment of the
/// key maps to a layer and a baseline tag. Unknown prefixes default to
/// cross-cutting with no inferred tag.
const PREFIX_RULES: &[(&str, Layer, Option<&str>)] = &[
    ("api", Layer::Business, Some("api")),
    ("auth", Layer::Business, Some("auth")),
    ("ui", Layer::Presentation, Some("ui")),
    ("db", Layer::Data, Some("db")),
    ("cache", Layer::Data, Some("cache")),
    ("infra", Layer::Infrastructure, Some("infra")),
    ("config", Layer::Infrastructure, Some("config")),
    ("deploy", Layer::Infrastructure, Some("deploy")),
    ("test", Layer::CrossCutting, Some("testing")),
    ("perf", Layer::CrossCutting, Some("performance")),
    ("security", Layer::CrossCutting, Some("security")),
    ("plan", Layer::Planning, Some("plan")),
];

/// Resolve the quick-set inference for a key.
#[must_use]
pub fn infer_from_key(key: &str) -> (Layer, Option<&'static str>) {
    let prefix = key.split('/').next().unwrap_or(key);
    PREFIX_RULES
        .iter()
        .find(|(p, _, _)| *p == prefix)
        .map_or((Layer::CrossCutting, None), |(_, layer, tag)| (*layer, *tag))
}

// ── Write path ────────────────────────────────────────────────

/// Apply a `set` inside an open transaction.
///
/// Resolves all IDs (auto-creating tags/scopes/agents, rejecting unknown
/// layers), appends the prior value to history when the decision already
/// exists, upserts the decision and its value sibling, and reconciles the
/// tag junction + index.
pub fn set_decision_in(conn: &Connection, project_id: i64, input: &SetDecision) -> Result<()> {
    if input.key.trim().is_empty() {
        return Err(Error::Validation("decision key must not be empty".to_string()));
    }

    let key_id = get_or_create_context_key(conn, &input.key)?;
    let layer_id = input
        .layer
        .as_deref()
        .map(Layer::parse)
        .transpose()?
        .map(Layer::id);
    let status = input
        .status
        .as_deref()
        .map(DecisionStatus::parse)
        .transpose()?;
    let agent_id = input
        .agent
        .as_deref()
        .map(|a| get_or_create_agent(conn, a))
        .transpose()?;
    let now = now_ts();

    // Snapshot the existing row before overwriting: exactly one history
    // row per mutation.
    let existing: Option<(String, Option<i64>, i64)> = conn
        .query_row(
            "SELECT version, agent_id, ts FROM t_decisions
             WHERE key_id = ?1 AND project_id = ?2",
            params![key_id, project_id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()?;

    if let Some((prior_version, prior_agent, prior_ts)) = &existing {
        let prior_value = current_value(conn, key_id, project_id)?
            .map(|v| v.as_display())
            .unwrap_or_default();
        conn.execute(
            "INSERT INTO t_decision_history (key_id, project_id, version, value, agent_id, ts)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![key_id, project_id, prior_version, prior_value, prior_agent, prior_ts],
        )?;
    }

    let version = input.version.clone().unwrap_or_else(|| {
        existing
            .as_ref()
            .map_or_else(|| INITIAL_VERSION.to_string(), |(v, _, _)| v.clone())
    });

    // An omitted status behaves like omitted layer/tags: first insert
    // defaults to active, a re-set preserves the existing row's status.
    conn.execute(
        "INSERT INTO t_decisions (key_id, project_id, agent_id, layer_id, version, status, ts)
         VALUES (?1, ?2, ?3, ?4, ?5, COALESCE(?6, 1), ?7)
         ON CONFLICT (key_id, project_id) DO UPDATE SET
             agent_id = excluded.agent_id,
             layer_id = COALESCE(excluded.layer_id, t_decisions.layer_id),
             version = excluded.version,
             status = COALESCE(?6, t_decisions.status),
             ts = excluded.ts",
        params![
            key_id,
            project_id,
            agent_id,
            layer_id,
            version,
            status.map(DecisionStatus::id),
            now
        ],
    )?;

    // String and numeric values are mutually exclusive per key.
    match &input.value {
        DecisionValue::Text(text) => {
            conn.execute(
                "DELETE FROM t_decision_values_numeric WHERE key_id = ?1 AND project_id = ?2",
                params![key_id, project_id],
            )?;
            conn.execute(
                "INSERT INTO t_decision_values_text (key_id, project_id, value)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT (key_id, project_id) DO UPDATE SET value = excluded.value",
                params![key_id, project_id, text],
            )?;
        }
        DecisionValue::Number(n) => {
            conn.execute(
                "DELETE FROM t_decision_values_text WHERE key_id = ?1 AND project_id = ?2",
                params![key_id, project_id],
            )?;
            conn.execute(
                "INSERT INTO t_decision_values_numeric (key_id, project_id, value)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT (key_id, project_id) DO UPDATE SET value = excluded.value",
                params![key_id, project_id, n],
            )?;
        }
    }

    // Tags: a non-empty list replaces the whole set; an omitted/empty list
    // leaves the existing set untouched.
    if !input.tags.is_empty() {
        reconcile_tags(conn, project_id, key_id, &input.tags)?;
    }
    if !input.scopes.is_empty() {
        reconcile_scopes(conn, project_id, key_id, &input.scopes)?;
    }

    Ok(())
}

/// Bring the tag junction and the denormalized index in line with the
/// requested tag set: insert index rows for added tags, delete rows for
/// removed ones.
fn reconcile_tags(
    conn: &Connection,
    project_id: i64,
    key_id: i64,
    tags: &[String],
) -> Result<()> {
    let current: Vec<(i64, String)> = conn
        .prepare(
            "SELECT tg.id, tg.name FROM t_decision_tags dt
             JOIN m_tags tg ON tg.id = dt.tag_id
             WHERE dt.key_id = ?1 AND dt.project_id = ?2",
        )?
        .query_map(params![key_id, project_id], |row| {
            Ok((row.get(0)?, row.get(1)?))
        })?
        .collect::<std::result::Result<_, _>>()?;

    for (tag_id, name) in &current {
        if !tags.iter().any(|t| t == name) {
            conn.execute(
                "DELETE FROM t_decision_tags
                 WHERE key_id = ?1 AND tag_id = ?2 AND project_id = ?3",
                params![key_id, tag_id, project_id],
            )?;
            conn.execute(
                "DELETE FROM t_tag_index
                 WHERE tag_name = ?1 AND key_id = ?2 AND project_id = ?3",
                params![name, key_id, project_id],
            )?;
        }
    }

    for tag in tags {
        let tag_id = get_or_create_tag(conn, project_id, tag)?;
        conn.execute(
            "INSERT INTO t_decision_tags (key_id, tag_id, project_id)
             VALUES (?1, ?2, ?3)
             ON CONFLICT (key_id, tag_id, project_id) DO NOTHING",
            params![key_id, tag_id, project_id],
        )?;
        conn.execute(
            "INSERT INTO t_tag_index (tag_name, key_id, project_id)
             VALUES (?1, ?2, ?3)
             ON CONFLICT (tag_name, key_id, project_id) DO NOTHING",
            params![tag, key_id, project_id],
        )?;
    }

    Ok(())
}

fn reconcile_scopes(
    conn: &Connection,
    project_id: i64,
    key_id: i64,
    scopes: &[String],
) -> Result<()> {
    conn.execute(
        "DELETE FROM t_decision_scopes WHERE key_id = ?1 AND project_id = ?2",
        params![key_id, project_id],
    )?;
    for scope in scopes {
        let scope_id = get_or_create_scope(conn, project_id, scope)?;
        conn.execute(
            "INSERT INTO t_decision_scopes (key_id, scope_id, project_id)
             VALUES (?1, ?2, ?3)
             ON CONFLICT (key_id, scope_id, project_id) DO NOTHING",
            params![key_id, scope_id, project_id],
        )?;
    }
    Ok(())
}

fn current_value(
    conn: &Connection,
    key_id: i64,
    project_id: i64,
) -> Result<Option<DecisionValue>> {
    let text: Option<String> = conn
        .query_row(
            "SELECT value FROM t_decision_values_text WHERE key_id = ?1 AND project_id = ?2",
            params![key_id, project_id],
            |row| row.get(0),
        )
        .optional()?;
    if let Some(text) = text {
        return Ok(Some(DecisionValue::Text(text)));
    }

    let number: Option<f64> = conn
        .query_row(
            "SELECT value FROM t_decision_values_numeric WHERE key_id = ?1 AND project_id = ?2",
            params![key_id, project_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(number.map(DecisionValue::Number))
}

// ── Validation ────────────────────────────────────────────────

/// Validate the JSON shapes on a decision context before insert:
/// `alternatives` must be an array; `tradeoffs` an object whose `pros` /
/// `cons`, when present, are arrays.
pub fn validate_context_json(input: &DecisionContextInput) -> Result<()> {
    if let Some(alternatives) = &input.alternatives {
        if !alternatives.is_array() {
            return Err(Error::InvalidJsonShape {
                field: "alternatives".to_string(),
                message: "must be a JSON array".to_string(),
            });
        }
    }
    if let Some(tradeoffs) = &input.tradeoffs {
        let Some(obj) = tradeoffs.as_object() else {
            return Err(Error::InvalidJsonShape {
                field: "tradeoffs".to_string(),
                message: "must be a JSON object".to_string(),
            });
        };
        for side in ["pros", "cons"] {
            if let Some(v) = obj.get(side) {
                if !v.is_array() {
                    return Err(Error::InvalidJsonShape {
                        field: format!("tradeoffs.{side}"),
                        message: "must be a JSON array".to_string(),
                    });
                }
            }
        }
    }
    Ok(())
}

/// Parse an `updated_after` expression: "5m", "1h", "2d", or ISO8601.
/// Returns the cutoff as epoch seconds.
pub fn parse_updated_after(expr: &str) -> Result<i64> {
    let expr = expr.trim();
    if let Some(n) = expr.strip_suffix('m').and_then(|p| p.parse::<i64>().ok()) {
        return Ok(now_ts() - n * 60);
    }
    if let Some(n) = expr.strip_suffix('h').and_then(|p| p.parse::<i64>().ok()) {
        return Ok(now_ts() - n * 3600);
    }
    if let Some(n) = expr.strip_suffix('d').and_then(|p| p.parse::<i64>().ok()) {
        return Ok(now_ts() - n * 86_400);
    }
    chrono::DateTime::parse_from_rfc3339(expr)
        .map(|dt| dt.timestamp())
        .map_err(|_| {
            Error::Validation(format!(
                "updated_after '{expr}' is neither a relative duration (5m, 1h, 2d) nor ISO8601"
            ))
        })
}

// ── Read path ─────────────────────────────────────────────────

fn row_to_decision(row: &rusqlite::Row<'_>) -> rusqlite::Result<(Decision, i64)> {
    let value: Option<String> = row.get("value")?;
    let status_id: i64 = row.get("status")?;
    let ts: i64 = row.get("ts")?;
    let layer: Option<String> = row.get("layer")?;
    let tags: Option<String> = row.get("tags")?;
    let scopes: Option<String> = row.get("scopes")?;

    Ok((
        Decision {
            key: row.get("key")?,
            value: DecisionValue::Text(value.unwrap_or_default()),
            version: row.get("version")?,
            status: DecisionStatus::from_id(status_id).unwrap_or(DecisionStatus::Active),
            layer: layer.as_deref().and_then(|l| Layer::parse(l).ok()),
            tags: split_csv(tags.as_deref()),
            scopes: split_csv(scopes.as_deref()),
            agent: row.get("agent")?,
            updated_at: ts_to_iso(ts),
        },
        ts,
    ))
}

fn split_csv(value: Option<&str>) -> Vec<String> {
    value
        .map(|v| {
            v.split(',')
                .filter(|s| !s.is_empty())
                .map(ToString::to_string)
                .collect()
        })
        .unwrap_or_default()
}

// ── Engine operations ─────────────────────────────────────────

impl Engine {
    /// `decision.set`: upsert one decision, recording history and keeping
    /// the tag index in lockstep, all within one transaction.
    pub fn set_decision(&mut self, input: SetDecision) -> Result<()> {
        let project_id = self.project_id();
        self.transaction(|tx| set_decision_in(tx, project_id, &input))
    }

    /// `decision.quick_set`: like `set`, but infers the layer and a
    /// baseline tag from the key's first segment.
    pub fn quick_set(&mut self, mut input: SetDecision) -> Result<()> {
        let (layer, tag) = infer_from_key(&input.key);
        if input.layer.is_none() {
            input.layer = Some(layer.as_str().to_string());
        }
        if let Some(tag) = tag {
            if !input.tags.iter().any(|t| t == tag) {
                input.tags.push(tag.to_string());
            }
        }
        self.set_decision(input)
    }

    /// `decision.get`: resolve a decision with full metadata.
    pub fn get_decision(&self, key: &str) -> Result<Decision> {
        let row = self
            .conn()
            .query_row(
                "SELECT key, value, version, status, layer, agent, ts, tags, scopes
                 FROM v_decisions WHERE key = ?1 AND project_id = ?2",
                params![key, self.project_id()],
                |row| row_to_decision(row),
            )
            .optional()?;

        let (mut decision, _) = row.ok_or_else(|| Error::KeyNotFound {
            key: key.to_string(),
        })?;

        // Surface numeric values as numbers, not their text rendering.
        if let Some(key_id) = find_context_key(self.conn(), key)? {
            if let Some(value) = current_value(self.conn(), key_id, self.project_id())? {
                decision.value = value;
            }
        }
        Ok(decision)
    }

    /// `decision.search_by_tags`: candidates come from the denormalized
    /// tag index, grouped per decision, then joined for metadata.
    pub fn search_by_tags(
        &self,
        tags: &[String],
        mode: TagMatchMode,
        layer: Option<&str>,
        status: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Decision>> {
        if tags.is_empty() {
            return Ok(Vec::new());
        }
        let layer = layer.map(Layer::parse).transpose()?;
        let status = status.map(DecisionStatus::parse).transpose()?;

        let placeholders = (1..=tags.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT key_id, COUNT(DISTINCT tag_name) AS matched
             FROM t_tag_index
             WHERE project_id = ?{p} AND tag_name IN ({placeholders})
             GROUP BY key_id",
            p = tags.len() + 1
        );

        let mut stmt = self.conn().prepare(&sql)?;
        let mut sql_params: Vec<&dyn rusqlite::ToSql> =
            tags.iter().map(|t| t as &dyn rusqlite::ToSql).collect();
        let project_id = self.project_id();
        sql_params.push(&project_id);

        let required = match mode {
            TagMatchMode::And => tags.len() as i64,
            TagMatchMode::Or => 1,
        };
        let key_ids: Vec<i64> = stmt
            .query_map(sql_params.as_slice(), |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
            })?
            .filter_map(std::result::Result::ok)
            .filter(|(_, matched)| *matched >= required)
            .map(|(key_id, _)| key_id)
            .collect();

        let mut decisions = Vec::new();
        for key_id in key_ids {
            let row = self
                .conn()
                .query_row(
                    "SELECT key, value, version, status, layer, agent, ts, tags, scopes
                     FROM v_decisions WHERE key_id = ?1 AND project_id = ?2",
                    params![key_id, project_id],
                    |row| row_to_decision(row),
                )
                .optional()?;
            if let Some((decision, ts)) = row {
                if layer.is_some_and(|l| decision.layer != Some(l)) {
                    continue;
                }
                if status.is_some_and(|s| decision.status != s) {
                    continue;
                }
                decisions.push((decision, ts));
            }
        }

        decisions.sort_by(|a, b| b.1.cmp(&a.1));
        decisions.truncate(limit);
        Ok(decisions.into_iter().map(|(d, _)| d).collect())
    }

    /// `decision.search_by_layer`: straight projection with optional tag
    /// aggregation.
    pub fn search_by_layer(
        &self,
        layer: &str,
        status: Option<&str>,
        include_tags: bool,
        limit: usize,
    ) -> Result<Vec<Decision>> {
        let layer = Layer::parse(layer)?;
        let status = status.map(DecisionStatus::parse).transpose()?;

        let mut stmt = self.conn().prepare(
            "SELECT key, value, version, status, layer, agent, ts, tags, scopes
             FROM v_decisions
             WHERE project_id = ?1 AND layer = ?2
             ORDER BY ts DESC",
        )?;
        let rows = stmt.query_map(params![self.project_id(), layer.as_str()], |row| {
            row_to_decision(row)
        })?;

        let mut decisions = Vec::new();
        for row in rows {
            let (mut decision, _) = row?;
            if status.is_some_and(|s| decision.status != s) {
                continue;
            }
            if !include_tags {
                decision.tags.clear();
            }
            decisions.push(decision);
            if decisions.len() >= limit {
                break;
            }
        }
        Ok(decisions)
    }

    /// `decision.search_advanced`: conjunctive filter over layers, tags,
    /// recency, version, and status.
    pub fn search_advanced(&self, filter: &SearchFilter) -> Result<Vec<Decision>> {
        let layers = filter
            .layers
            .iter()
            .map(|l| Layer::parse(l))
            .collect::<Result<Vec<_>>>()?;
        let status = filter
            .status
            .as_deref()
            .map(DecisionStatus::parse)
            .transpose()?;
        let cutoff = filter
            .updated_after
            .as_deref()
            .map(parse_updated_after)
            .transpose()?;

        let mut stmt = self.conn().prepare(
            "SELECT key, value, version, status, layer, agent, ts, tags, scopes
             FROM v_decisions WHERE project_id = ?1 ORDER BY ts DESC",
        )?;
        let rows = stmt.query_map(params![self.project_id()], |row| row_to_decision(row))?;

        let limit = filter.limit.unwrap_or(50);
        let mut decisions = Vec::new();
        for row in rows {
            let (decision, ts) = row?;
            if !layers.is_empty() && !decision.layer.is_some_and(|l| layers.contains(&l)) {
                continue;
            }
            if status.is_some_and(|s| decision.status != s) {
                continue;
            }
            if let Some(cutoff) = cutoff {
                if ts <= cutoff {
                    continue;
                }
            }
            if let Some(version) = &filter.version {
                if &decision.version != version {
                    continue;
                }
            }
            if !filter.tags_all.is_empty()
                && !filter.tags_all.iter().all(|t| decision.tags.contains(t))
            {
                continue;
            }
            if !filter.tags_any.is_empty()
                && !filter.tags_any.iter().any(|t| decision.tags.contains(t))
            {
                continue;
            }
            decisions.push(decision);
            if decisions.len() >= limit {
                break;
            }
        }
        Ok(decisions)
    }

    /// `decision.get_versions`: history rows ordered most-recent first.
    /// Empty when the decision has never been mutated; an error when the
    /// key never existed.
    pub fn get_versions(&self, key: &str) -> Result<Vec<DecisionVersion>> {
        let key_id = find_context_key(self.conn(), key)?.ok_or_else(|| Error::KeyNotFound {
            key: key.to_string(),
        })?;

        let exists: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM t_decisions WHERE key_id = ?1 AND project_id = ?2",
            params![key_id, self.project_id()],
            |row| row.get(0),
        )?;
        if exists == 0 {
            return Err(Error::KeyNotFound {
                key: key.to_string(),
            });
        }

        let mut stmt = self.conn().prepare(
            "SELECT h.version, h.value, a.name, h.ts
             FROM t_decision_history h
             LEFT JOIN m_agents a ON a.id = h.agent_id
             WHERE h.key_id = ?1 AND h.project_id = ?2
             ORDER BY h.ts DESC, h.id DESC",
        )?;
        let rows = stmt.query_map(params![key_id, self.project_id()], |row| {
            Ok(DecisionVersion {
                version: row.get(0)?,
                value: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                agent: row.get(2)?,
                updated_at: ts_to_iso(row.get(3)?),
            })
        })?;
        Ok(rows.collect::<std::result::Result<_, _>>()?)
    }

    /// `decision.add_context`: attach rationale/alternatives/tradeoffs to
    /// an existing decision. JSON shapes are validated before insert.
    pub fn add_decision_context(&mut self, input: DecisionContextInput) -> Result<i64> {
        validate_context_json(&input)?;
        let project_id = self.project_id();

        self.transaction(|tx| {
            let key_id =
                find_context_key(tx, &input.key)?.ok_or_else(|| Error::KeyNotFound {
                    key: input.key.clone(),
                })?;
            let agent_id = input
                .agent
                .as_deref()
                .map(|a| get_or_create_agent(tx, a))
                .transpose()?;

            tx.execute(
                "INSERT INTO t_decision_contexts
                     (key_id, project_id, rationale, alternatives_json, tradeoffs_json,
                      agent_id, related_task_id, related_constraint_id, ts)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    key_id,
                    project_id,
                    input.rationale,
                    input.alternatives.as_ref().map(ToString::to_string),
                    input.tradeoffs.as_ref().map(ToString::to_string),
                    agent_id,
                    input.related_task_id,
                    input.related_constraint_id,
                    now_ts()
                ],
            )?;
            Ok(tx.last_insert_rowid())
        })
    }

    // ── Templates ─────────────────────────────────────────────

    /// Record default `{layer, tags, scopes, status}` under a name.
    pub fn create_template(&mut self, template: &DecisionTemplate) -> Result<i64> {
        if let Some(layer) = &template.layer {
            Layer::parse(layer)?;
        }
        if let Some(status) = &template.status {
            DecisionStatus::parse(status)?;
        }
        let project_id = self.project_id();

        self.transaction(|tx| {
            let result = tx.execute(
                "INSERT INTO t_decision_templates
                     (project_id, name, layer_id, status, tags_json, scopes_json, created_ts)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    project_id,
                    template.name,
                    template.layer.as_deref().map(|l| Layer::parse(l).map(Layer::id)).transpose()?,
                    template
                        .status
                        .as_deref()
                        .map(|s| DecisionStatus::parse(s).map(DecisionStatus::id))
                        .transpose()?,
                    serde_json::to_string(&template.tags)?,
                    serde_json::to_string(&template.scopes)?,
                    now_ts()
                ],
            );
            match result {
                Ok(_) => Ok(tx.last_insert_rowid()),
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    Err(Error::Conflict(format!(
                        "template '{}' already exists",
                        template.name
                    )))
                }
                Err(e) => Err(e.into()),
            }
        })
    }

    /// List templates for the bound project.
    pub fn list_templates(&self) -> Result<Vec<DecisionTemplate>> {
        let mut stmt = self.conn().prepare(
            "SELECT t.name, l.name, t.status, t.tags_json, t.scopes_json
             FROM t_decision_templates t
             LEFT JOIN m_layers l ON l.id = t.layer_id
             WHERE t.project_id = ?1
             ORDER BY t.name",
        )?;
        let rows = stmt.query_map(params![self.project_id()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, Option<i64>>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, Option<String>>(4)?,
            ))
        })?;

        let mut templates = Vec::new();
        for row in rows {
            let (name, layer, status, tags_json, scopes_json) = row?;
            templates.push(DecisionTemplate {
                name,
                layer,
                tags: tags_json
                    .as_deref()
                    .and_then(|j| serde_json::from_str(j).ok())
                    .unwrap_or_default(),
                scopes: scopes_json
                    .as_deref()
                    .and_then(|j| serde_json::from_str(j).ok())
                    .unwrap_or_default(),
                status: status
                    .and_then(DecisionStatus::from_id)
                    .map(|s| s.as_str().to_string()),
            });
        }
        Ok(templates)
    }

    /// `decision.set_from_template`: apply a template's defaults to a set.
    /// Explicit fields on the input win over template defaults.
    pub fn set_from_template(&mut self, name: &str, mut input: SetDecision) -> Result<()> {
        let template = self
            .list_templates()?
            .into_iter()
            .find(|t| t.name == name)
            .ok_or_else(|| Error::TemplateNotFound {
                name: name.to_string(),
            })?;

        if input.layer.is_none() {
            input.layer = template.layer;
        }
        if input.status.is_none() {
            input.status = template.status;
        }
        for tag in template.tags {
            if !input.tags.contains(&tag) {
                input.tags.push(tag);
            }
        }
        for scope in template.scopes {
            if !input.scopes.contains(&scope) {
                input.scopes.push(scope);
            }
        }
        self.set_decision(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SetDecision;

    fn engine() -> Engine {
        Engine::open_memory("demo").unwrap()
    }

    #[test]
    fn set_then_get_round_trips_metadata() {
        let mut engine = engine();
        engine
            .set_decision(
                SetDecision::new("auth_method", "JWT")
                    .with_layer("business")
                    .with_tags(&["auth", "security"]),
            )
            .unwrap();

        let decision = engine.get_decision("auth_method").unwrap();
        assert_eq!(decision.value, DecisionValue::Text("JWT".to_string()));
        assert_eq!(decision.layer, Some(Layer::Business));
        assert_eq!(decision.status, DecisionStatus::Active);
        assert_eq!(decision.tags, vec!["auth", "security"]);
        assert!(!decision.updated_at.is_empty());
    }

    #[test]
    fn versioning_appends_prior_value_to_history() {
        // Scenario A from the acceptance suite.
        let mut engine = engine();
        engine
            .set_decision(
                SetDecision::new("auth_method", "JWT")
                    .with_layer("business")
                    .with_tags(&["auth", "security"]),
            )
            .unwrap();
        engine
            .set_decision(SetDecision::new("auth_method", "OAuth2").with_version("2.0.0"))
            .unwrap();

        let versions = engine.get_versions("auth_method").unwrap();
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].value, "JWT");
        assert_eq!(versions[0].version, "1.0.0");

        let current = engine.get_decision("auth_method").unwrap();
        assert_eq!(current.value, DecisionValue::Text("OAuth2".to_string()));
        assert_eq!(current.version, "2.0.0");
    }

    #[test]
    fn history_count_is_sets_minus_one() {
        let mut engine = engine();
        for i in 0..5 {
            engine
                .set_decision(SetDecision::new("cache_ttl", format!("{i}").as_str()))
                .unwrap();
        }
        assert_eq!(engine.get_versions("cache_ttl").unwrap().len(), 4);
    }

    #[test]
    fn get_versions_unknown_key_errors() {
        let engine = engine();
        assert!(matches!(
            engine.get_versions("ghost"),
            Err(Error::KeyNotFound { .. })
        ));
    }

    #[test]
    fn numeric_and_text_values_are_mutually_exclusive() {
        let mut engine = engine();
        engine
            .set_decision(SetDecision::new("cache_ttl", 300.0))
            .unwrap();
        assert_eq!(
            engine.get_decision("cache_ttl").unwrap().value,
            DecisionValue::Number(300.0)
        );

        engine
            .set_decision(SetDecision::new("cache_ttl", "unbounded"))
            .unwrap();
        assert_eq!(
            engine.get_decision("cache_ttl").unwrap().value,
            DecisionValue::Text("unbounded".to_string())
        );

        let numeric_rows: i64 = engine
            .conn()
            .query_row("SELECT COUNT(*) FROM t_decision_values_numeric", [], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(numeric_rows, 0);
    }

    #[test]
    fn tag_index_tracks_junction() {
        // Scenario B: dropping a tag removes it from search.
        let mut engine = engine();
        engine
            .set_decision(
                SetDecision::new("cache_ttl", 300.0).with_tags(&["performance", "caching"]),
            )
            .unwrap();

        let hits = engine
            .search_by_tags(
                &["performance".to_string()],
                TagMatchMode::Or,
                None,
                None,
                10,
            )
            .unwrap();
        assert!(hits.iter().any(|d| d.key == "cache_ttl"));

        engine
            .set_decision(SetDecision::new("cache_ttl", 600.0).with_tags(&["performance"]))
            .unwrap();

        let hits = engine
            .search_by_tags(&["caching".to_string()], TagMatchMode::Or, None, None, 10)
            .unwrap();
        assert!(!hits.iter().any(|d| d.key == "cache_ttl"));

        // Index is a total function of the junction table.
        let mismatch: i64 = engine
            .conn()
            .query_row(
                "SELECT COUNT(*) FROM t_decision_tags dt
                 JOIN m_tags tg ON tg.id = dt.tag_id
                 WHERE NOT EXISTS (
                     SELECT 1 FROM t_tag_index ti
                     WHERE ti.tag_name = tg.name
                       AND ti.key_id = dt.key_id
                       AND ti.project_id = dt.project_id)",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(mismatch, 0);
    }

    #[test]
    fn and_mode_requires_all_tags() {
        let mut engine = engine();
        engine
            .set_decision(SetDecision::new("a", "1").with_tags(&["x", "y"]))
            .unwrap();
        engine
            .set_decision(SetDecision::new("b", "2").with_tags(&["x"]))
            .unwrap();

        let and_hits = engine
            .search_by_tags(
                &["x".to_string(), "y".to_string()],
                TagMatchMode::And,
                None,
                None,
                10,
            )
            .unwrap();
        assert_eq!(and_hits.len(), 1);
        assert_eq!(and_hits[0].key, "a");

        let or_hits = engine
            .search_by_tags(
                &["x".to_string(), "y".to_string()],
                TagMatchMode::Or,
                None,
                None,
                10,
            )
            .unwrap();
        assert_eq!(or_hits.len(), 2);
    }

    #[test]
    fn unknown_layer_is_rejected_with_options() {
        let mut engine = engine();
        let err = engine
            .set_decision(SetDecision::new("k", "v").with_layer("etheric"))
            .unwrap_err();
        assert!(err.to_string().contains("Valid layers"));
    }

    #[test]
    fn quick_set_infers_layer_and_tag() {
        let mut engine = engine();
        engine
            .quick_set(SetDecision::new("api/rate_limit", "100rps"))
            .unwrap();
        let decision = engine.get_decision("api/rate_limit").unwrap();
        assert_eq!(decision.layer, Some(Layer::Business));
        assert!(decision.tags.contains(&"api".to_string()));

        engine
            .quick_set(SetDecision::new("mystery/thing", "x"))
            .unwrap();
        let decision = engine.get_decision("mystery/thing").unwrap();
        assert_eq!(decision.layer, Some(Layer::CrossCutting));
        assert!(decision.tags.is_empty());
    }

    #[test]
    fn context_json_shapes_are_validated() {
        let mut engine = engine();
        engine
            .set_decision(SetDecision::new("auth_method", "JWT"))
            .unwrap();

        let bad_alternatives = DecisionContextInput {
            key: "auth_method".to_string(),
            rationale: "stateless".to_string(),
            alternatives: Some(serde_json::json!({"not": "array"})),
            tradeoffs: None,
            agent: None,
            related_task_id: None,
            related_constraint_id: None,
        };
        assert!(matches!(
            engine.add_decision_context(bad_alternatives),
            Err(Error::InvalidJsonShape { .. })
        ));

        let bad_tradeoffs = DecisionContextInput {
            key: "auth_method".to_string(),
            rationale: "stateless".to_string(),
            alternatives: None,
            tradeoffs: Some(serde_json::json!({"pros": "fast"})),
            agent: None,
            related_task_id: None,
            related_constraint_id: None,
        };
        assert!(matches!(
            engine.add_decision_context(bad_tradeoffs),
            Err(Error::InvalidJsonShape { .. })
        ));

        let good = DecisionContextInput {
            key: "auth_method".to_string(),
            rationale: "stateless".to_string(),
            alternatives: Some(serde_json::json!(["sessions", "api keys"])),
            tradeoffs: Some(serde_json::json!({"pros": ["stateless"], "cons": ["revocation"]})),
            agent: Some("claude".to_string()),
            related_task_id: None,
            related_constraint_id: None,
        };
        assert!(engine.add_decision_context(good).is_ok());
    }

    #[test]
    fn search_advanced_filters_conjunctively() {
        let mut engine = engine();
        engine
            .set_decision(
                SetDecision::new("a", "1")
                    .with_layer("business")
                    .with_tags(&["x", "y"]),
            )
            .unwrap();
        engine
            .set_decision(
                SetDecision::new("b", "2")
                    .with_layer("data")
                    .with_tags(&["x"]),
            )
            .unwrap();

        let hits = engine
            .search_advanced(&SearchFilter {
                layers: vec!["business".to_string()],
                tags_all: vec!["x".to_string(), "y".to_string()],
                ..Default::default()
            })
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].key, "a");

        let hits = engine
            .search_advanced(&SearchFilter {
                updated_after: Some("5m".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn parse_updated_after_forms() {
        assert!(parse_updated_after("5m").unwrap() <= now_ts() - 299);
        assert!(parse_updated_after("1h").unwrap() <= now_ts() - 3599);
        assert!(parse_updated_after("2d").unwrap() <= now_ts() - 172_799);
        assert_eq!(
            parse_updated_after("2026-01-01T00:00:00Z").unwrap(),
            1_767_225_600
        );
        assert!(parse_updated_after("fortnight").is_err());
    }

    #[test]
    fn omitted_status_is_preserved_on_reset() {
        let mut engine = engine();
        let mut input = SetDecision::new("auth_method", "JWT");
        input.status = Some("draft".to_string());
        engine.set_decision(input).unwrap();

        // A version-only re-set must not strip metadata.
        engine
            .set_decision(SetDecision::new("auth_method", "OAuth2").with_version("2.0.0"))
            .unwrap();
        let decision = engine.get_decision("auth_method").unwrap();
        assert_eq!(decision.status, DecisionStatus::Draft);
        assert_eq!(decision.version, "2.0.0");

        // An explicit status still wins.
        let mut input = SetDecision::new("auth_method", "OAuth2");
        input.status = Some("deprecated".to_string());
        engine.set_decision(input).unwrap();
        assert_eq!(
            engine.get_decision("auth_method").unwrap().status,
            DecisionStatus::Deprecated
        );

        // First insert without a status defaults to active.
        engine.set_decision(SetDecision::new("cache_ttl", "300")).unwrap();
        assert_eq!(
            engine.get_decision("cache_ttl").unwrap().status,
            DecisionStatus::Active
        );
    }

    #[test]
    fn templates_apply_defaults() {
        let mut engine = engine();
        engine
            .create_template(&DecisionTemplate {
                name: "api-default".to_string(),
                layer: Some("business".to_string()),
                tags: vec!["api".to_string()],
                scopes: vec![],
                status: Some("draft".to_string()),
            })
            .unwrap();

        let err = engine
            .create_template(&DecisionTemplate {
                name: "api-default".to_string(),
                layer: None,
                tags: vec![],
                scopes: vec![],
                status: None,
            })
            .unwrap_err();
        assert!(err.to_string().contains("already exists"));

        engine
            .set_from_template("api-default", SetDecision::new("api/timeout", "30s"))
            .unwrap();
        let decision = engine.get_decision("api/timeout").unwrap();
        assert_eq!(decision.layer, Some(Layer::Business));
        assert_eq!(decision.status, DecisionStatus::Draft);
        assert!(decision.tags.contains(&"api".to_string()));

        assert!(matches!(
            engine.set_from_template("ghost", SetDecision::new("k", "v")),
            Err(Error::TemplateNotFound { .. })
        ));
    }
}

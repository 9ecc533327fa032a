//! Similarity scoring and three-tier duplicate detection.
//!
//! Candidates come from the denormalized tag index; scores are computed
//! on the candidate set only, never on the full decision table.
//!
//! Scoring: key similarity contributes 0-20 (equal keys score 20;
//! otherwise common prefix up to 10 plus normalized Levenshtein closeness
//! up to 10), tag overlap contributes 0-40 (10 per shared tag). Jaccard
//! over the tag sets is reported as an additional 0-100 metric but does
//! not enter the composite score.

use std::collections::HashSet;

use rusqlite::params;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::storage::Engine;

/// Tier boundaries: >=60 near duplicate, 45-59 hard block, 35-44 gentle
/// nudge, <35 not a duplicate.
pub const TIER3_THRESHOLD: f64 = 60.0;
pub const TIER2_THRESHOLD: f64 = 45.0;
pub const TIER1_THRESHOLD: f64 = 35.0;

/// Classification of a scored suggestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionTier {
    /// Score >= 60: near-duplicate; the tool offers auto-update.
    NearDuplicate,
    /// Score 45-59: recommends merging.
    HardBlock,
    /// Score 35-44: advisory only.
    GentleNudge,
    /// Score < 35.
    None,
}

impl SuggestionTier {
    #[must_use]
    pub fn classify(score: f64) -> Self {
        if score >= TIER3_THRESHOLD {
            Self::NearDuplicate
        } else if score >= TIER2_THRESHOLD {
            Self::HardBlock
        } else if score >= TIER1_THRESHOLD {
            Self::GentleNudge
        } else {
            Self::None
        }
    }

    #[must_use]
    pub const fn recommendation(self) -> &'static str {
        match self {
            Self::NearDuplicate => "near-duplicate: update the existing decision instead",
            Self::HardBlock => "strong overlap: merge with the existing decision",
            Self::GentleNudge => "possible overlap: review the existing decision",
            Self::None => "no overlap detected",
        }
    }
}

/// A ranked suggestion against an existing decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suggestion {
    pub key: String,
    pub score: f64,
    pub key_similarity: f64,
    pub tag_overlap: f64,
    /// Jaccard similarity over tag sets, 0-100.
    pub jaccard: f64,
    pub tier: SuggestionTier,
    pub is_duplicate: bool,
    pub shared_tags: Vec<String>,
}

/// Compute the Levenshtein edit distance between two strings.
#[must_use]
pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let a_len = a.len();
    let b_len = b.len();

    if a_len == 0 {
        return b_len;
    }
    if b_len == 0 {
        return a_len;
    }

    // Single-row optimization (O(min(m,n)) space).
    let mut prev: Vec<usize> = (0..=b_len).collect();
    let mut curr = vec![0; b_len + 1];

    for i in 1..=a_len {
        curr[0] = i;
        for j in 1..=b_len {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            curr[j] = (prev[j] + 1)
                .min(curr[j - 1] + 1)
                .min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b_len]
}

/// Key-edit similarity, 0-20. Equal keys score 20; otherwise the common
/// prefix contributes min(2 * prefix_length, 10) and normalized
/// Levenshtein closeness contributes up to 10. The sum is capped at 20.
#[must_use]
pub fn key_similarity(a: &str, b: &str) -> f64 {
    if a == b {
        return 20.0;
    }

    let prefix_len = a
        .chars()
        .zip(b.chars())
        .take_while(|(x, y)| x == y)
        .count();
    let prefix_score = (2.0 * prefix_len as f64).min(10.0);

    let max_len = a.chars().count().max(b.chars().count());
    let closeness = if max_len == 0 {
        0.0
    } else {
        (1.0 - levenshtein_distance(a, b) as f64 / max_len as f64) * 10.0
    };

    (prefix_score + closeness).min(20.0)
}

/// Tag-overlap score, 0-40: 10 points per shared tag.
#[must_use]
pub fn tag_overlap_score(shared: usize) -> f64 {
    (shared as f64 * 10.0).min(40.0)
}

/// Jaccard similarity over two tag sets, 0-100.
#[must_use]
pub fn jaccard_similarity(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    intersection as f64 / union as f64 * 100.0
}

/// Score one candidate against the input.
#[must_use]
pub fn score_candidate(
    key: &str,
    tags: &HashSet<String>,
    candidate_key: &str,
    candidate_tags: &HashSet<String>,
) -> Suggestion {
    let mut shared: Vec<String> = tags.intersection(candidate_tags).cloned().collect();
    shared.sort();

    let key_sim = key_similarity(key, candidate_key);
    let overlap = tag_overlap_score(shared.len());
    let score = key_sim + overlap;
    let tier = SuggestionTier::classify(score);

    Suggestion {
        key: candidate_key.to_string(),
        score,
        key_similarity: key_sim,
        tag_overlap: overlap,
        jaccard: jaccard_similarity(tags, candidate_tags),
        tier,
        is_duplicate: tier == SuggestionTier::NearDuplicate,
        shared_tags: shared,
    }
}

impl Engine {
    /// Rank existing decisions against a candidate `(key, tags)`.
    ///
    /// Candidates are decisions sharing at least one tag (via the tag
    /// index), plus the exact key when it already exists. Results are
    /// ordered by descending score; entries below the gentle-nudge tier
    /// are dropped.
    pub fn suggest(&self, key: &str, tags: &[String]) -> Result<Vec<Suggestion>> {
        let tag_set: HashSet<String> = tags.iter().cloned().collect();
        let mut candidate_keys: HashSet<String> = HashSet::new();

        if !tags.is_empty() {
            let placeholders = (1..=tags.len())
                .map(|i| format!("?{i}"))
                .collect::<Vec<_>>()
                .join(", ");
            let sql = format!(
                "SELECT DISTINCT k.key
                 FROM t_tag_index ti
                 JOIN m_context_keys k ON k.id = ti.key_id
                 WHERE ti.project_id = ?{p} AND ti.tag_name IN ({placeholders})",
                p = tags.len() + 1
            );
            let mut stmt = self.conn().prepare(&sql)?;
            let mut sql_params: Vec<&dyn rusqlite::ToSql> =
                tags.iter().map(|t| t as &dyn rusqlite::ToSql).collect();
            let project_id = self.project_id();
            sql_params.push(&project_id);

            let rows = stmt.query_map(sql_params.as_slice(), |row| row.get::<_, String>(0))?;
            for row in rows {
                candidate_keys.insert(row?);
            }
        }

        // The exact key is always worth reporting when it exists.
        let exact_exists: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM t_decisions d
             JOIN m_context_keys k ON k.id = d.key_id
             WHERE k.key = ?1 AND d.project_id = ?2",
            params![key, self.project_id()],
            |row| row.get(0),
        )?;
        if exact_exists > 0 {
            candidate_keys.insert(key.to_string());
        }

        let mut suggestions = Vec::new();
        for candidate in candidate_keys {
            let candidate_tags: HashSet<String> = self
                .conn()
                .prepare(
                    "SELECT ti.tag_name FROM t_tag_index ti
                     JOIN m_context_keys k ON k.id = ti.key_id
                     WHERE k.key = ?1 AND ti.project_id = ?2",
                )?
                .query_map(params![candidate, self.project_id()], |row| row.get(0))?
                .collect::<std::result::Result<_, _>>()?;

            let suggestion = score_candidate(key, &tag_set, &candidate, &candidate_tags);
            if suggestion.tier != SuggestionTier::None {
                suggestions.push(suggestion);
            }
        }

        suggestions.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(suggestions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SetDecision;

    #[test]
    fn levenshtein_basics() {
        assert_eq!(levenshtein_distance("", ""), 0);
        assert_eq!(levenshtein_distance("abc", "abc"), 0);
        assert_eq!(levenshtein_distance("abc", "abd"), 1);
        assert_eq!(levenshtein_distance("kitten", "sitting"), 3);
    }

    #[test]
    fn equal_keys_score_twenty() {
        assert!((key_similarity("auth_method", "auth_method") - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn key_similarity_is_capped() {
        let score = key_similarity("security/jwt_expiry", "security/jwt_expiration");
        assert!(score > 10.0, "long shared prefix should score high: {score}");
        assert!(score <= 20.0);

        assert!(key_similarity("alpha", "zzzzz") < 5.0);
    }

    #[test]
    fn tag_overlap_caps_at_forty() {
        assert!((tag_overlap_score(2) - 20.0).abs() < f64::EPSILON);
        assert!((tag_overlap_score(9) - 40.0).abs() < f64::EPSILON);
    }

    #[test]
    fn jaccard_ranges() {
        let a: HashSet<String> = ["x", "y"].iter().map(ToString::to_string).collect();
        let b: HashSet<String> = ["y", "z"].iter().map(ToString::to_string).collect();
        assert!((jaccard_similarity(&a, &a) - 100.0).abs() < f64::EPSILON);
        assert!((jaccard_similarity(&a, &b) - 100.0 / 3.0).abs() < 0.001);
        assert!(jaccard_similarity(&HashSet::new(), &HashSet::new()).abs() < f64::EPSILON);
    }

    #[test]
    fn tier_boundaries_match_test_literals() {
        assert_eq!(SuggestionTier::classify(60.0), SuggestionTier::NearDuplicate);
        assert_eq!(SuggestionTier::classify(59.9), SuggestionTier::HardBlock);
        assert_eq!(SuggestionTier::classify(45.0), SuggestionTier::HardBlock);
        assert_eq!(SuggestionTier::classify(44.9), SuggestionTier::GentleNudge);
        assert_eq!(SuggestionTier::classify(35.0), SuggestionTier::GentleNudge);
        assert_eq!(SuggestionTier::classify(34.9), SuggestionTier::None);
    }

    #[test]
    fn exact_key_with_full_tag_overlap_is_duplicate() {
        let mut engine = Engine::open_memory("demo").unwrap();
        engine
            .set_decision(
                SetDecision::new("security/jwt", "RS256").with_tags(&["security", "auth"]),
            )
            .unwrap();

        let suggestions = engine
            .suggest(
                "security/jwt",
                &["security".to_string(), "auth".to_string()],
            )
            .unwrap();
        assert_eq!(suggestions.len(), 1);
        let top = &suggestions[0];
        // 20 (equal key) + 20 (two shared tags) = 40... below tier 3 but
        // above nudge; with four shared tags it crosses 60.
        assert!(top.score >= 35.0);
        assert_eq!(top.tier, SuggestionTier::GentleNudge);
        assert!((top.jaccard - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn heavy_overlap_triggers_auto_update_offer() {
        let mut engine = Engine::open_memory("demo").unwrap();
        engine
            .set_decision(SetDecision::new("security/jwt_expiry", "15m").with_tags(&[
                "security",
                "auth",
                "jwt",
                "session",
            ]))
            .unwrap();

        let suggestions = engine
            .suggest(
                "security/jwt_expiry",
                &[
                    "security".to_string(),
                    "auth".to_string(),
                    "jwt".to_string(),
                    "session".to_string(),
                ],
            )
            .unwrap();
        let top = &suggestions[0];
        // 40 points of tag overlap plus the identical key crosses tier 3.
        assert!(top.score >= 60.0, "score was {}", top.score);
        assert!(top.is_duplicate);
        assert_eq!(top.tier, SuggestionTier::NearDuplicate);
    }

    #[test]
    fn unrelated_candidates_are_dropped() {
        let mut engine = Engine::open_memory("demo").unwrap();
        engine
            .set_decision(SetDecision::new("ui/theme", "dark").with_tags(&["ui"]))
            .unwrap();

        let suggestions = engine
            .suggest("db/pool_size", &["db".to_string()])
            .unwrap();
        assert!(suggestions.is_empty());
    }

    #[test]
    fn candidates_come_from_tag_index_only() {
        let mut engine = Engine::open_memory("demo").unwrap();
        // A decision with a similar key but disjoint tags is not a
        // candidate unless the key matches exactly.
        engine
            .set_decision(SetDecision::new("api/timeout_ms", "30000").with_tags(&["api"]))
            .unwrap();

        let suggestions = engine
            .suggest("api/timeout", &["latency".to_string()])
            .unwrap();
        assert!(suggestions.is_empty());
    }
}

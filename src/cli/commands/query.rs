//! `query decisions|files`: read-only projections for humans and scripts.

use crate::cli::commands::CommandContext;
use crate::cli::QueryTarget;
use crate::error::Result;
use crate::model::decision::{SearchFilter, TagMatchMode};
use crate::storage::decisions::parse_updated_after;

pub fn execute(ctx: &CommandContext, target: &QueryTarget) -> Result<()> {
    let engine = ctx.open_engine()?;

    match target {
        QueryTarget::Decisions {
            layer,
            tags,
            since,
            limit,
            output,
        } => {
            let decisions = if tags.is_empty() && layer.is_none() && since.is_none() {
                engine.search_advanced(&SearchFilter {
                    limit: Some(*limit),
                    ..Default::default()
                })?
            } else if !tags.is_empty() && layer.is_none() && since.is_none() {
                engine.search_by_tags(tags, TagMatchMode::Or, None, None, *limit)?
            } else {
                engine.search_advanced(&SearchFilter {
                    layers: layer.iter().cloned().collect(),
                    tags_any: tags.clone(),
                    updated_after: since.clone(),
                    limit: Some(*limit),
                    ..Default::default()
                })?
            };

            if output == "json" {
                println!("{}", serde_json::to_string_pretty(&decisions)?);
            } else {
                for d in &decisions {
                    println!(
                        "{:<40} {:<24} {:<14} {} [{}]",
                        d.key,
                        truncate(&d.value.as_display(), 24),
                        d.layer.map_or("-", |l| l.as_str()),
                        d.updated_at,
                        d.tags.join(",")
                    );
                }
                if decisions.is_empty() {
                    println!("No decisions match.");
                }
            }
        }
        QueryTarget::Files {
            layer,
            since,
            limit,
            output,
        } => {
            let since_ts = since.as_deref().map(parse_updated_after).transpose()?;
            let changes = engine.query_file_changes(layer.as_deref(), since_ts, *limit)?;

            if output == "json" {
                println!("{}", serde_json::to_string_pretty(&changes)?);
            } else {
                for c in &changes {
                    println!(
                        "{:<50} {:<9} {:<14} {}",
                        c.path,
                        c.change_type.as_str(),
                        c.agent.as_deref().unwrap_or("-"),
                        c.recorded_at
                    );
                }
                if changes.is_empty() {
                    println!("No file changes match.");
                }
            }
        }
    }
    Ok(())
}

fn truncate(value: &str, max: usize) -> String {
    if value.chars().count() <= max {
        value.to_string()
    } else {
        let cut: String = value.chars().take(max.saturating_sub(1)).collect();
        format!("{cut}…")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_preserves_short_values() {
        assert_eq!(truncate("JWT", 24), "JWT");
        let long = "x".repeat(40);
        let cut = truncate(&long, 24);
        assert!(cut.chars().count() <= 24);
        assert!(cut.ends_with('…'));
    }
}

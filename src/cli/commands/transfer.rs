//! `db:export` and `db:import`: JSON dump transfer between databases.

use std::fs;
use std::path::{Path, PathBuf};

use colored::Colorize;

use crate::cli::commands::CommandContext;
use crate::error::Result;
use crate::sync::export::export_project;
use crate::sync::import::import_dump;

pub fn execute_export(
    ctx: &CommandContext,
    project: &str,
    output: Option<&PathBuf>,
    quiet: bool,
) -> Result<()> {
    let engine = ctx.open_engine()?;
    let dump = export_project(&engine, Some(project))?;
    let payload = serde_json::to_string_pretty(&dump)?;

    match output {
        Some(path) => {
            fs::write(path, payload)?;
            if !quiet {
                println!(
                    "{} project '{project}' ({} decisions, {} tasks) to {}",
                    "Exported".green(),
                    dump.decisions.len(),
                    dump.tasks.len(),
                    path.display()
                );
            }
        }
        None => println!("{payload}"),
    }
    Ok(())
}

pub fn execute_import(
    ctx: &CommandContext,
    source: &Path,
    project_name: Option<&str>,
    quiet: bool,
) -> Result<()> {
    let payload = fs::read_to_string(source)?;
    let dump = serde_json::from_str(&payload)?;

    let mut engine = ctx.open_engine()?;
    let stats = import_dump(&mut engine, &dump, project_name)?;

    if quiet {
        return Ok(());
    }
    println!(
        "{} {} decisions, {} constraints, {} tasks ({} dependency edges), \
         {} file changes, {} messages",
        "Imported".green(),
        stats.decisions,
        stats.constraints,
        stats.tasks,
        stats.dependencies,
        stats.file_changes,
        stats.messages
    );
    Ok(())
}

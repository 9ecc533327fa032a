//! `db:dump`: emit a SQL script for migration between engines.

use std::fs;
use std::path::{Path, PathBuf};

use colored::Colorize;

use crate::cli::commands::CommandContext;
use crate::cli::DumpArgs;
use crate::error::{Error, Result};
use crate::storage::dialect::Dialect;
use crate::storage::Storage;
use crate::sync::dump::{dump_statements, split_statements, DumpOptions, OnConflict};

pub fn execute(ctx: &CommandContext, args: &DumpArgs, quiet: bool) -> Result<()> {
    let dialect: Dialect = args.format.parse().map_err(Error::Validation)?;
    let on_conflict: OnConflict = args.on_conflict.parse().map_err(Error::Validation)?;

    let source = args.from.clone().unwrap_or_else(|| ctx.db_path.clone());
    if !source.exists() {
        return Err(Error::NotFound {
            entity: "Database".to_string(),
            id: source.display().to_string(),
        });
    }
    let storage = Storage::open(&source)?;

    let statements = dump_statements(
        storage.conn(),
        &DumpOptions {
            dialect,
            tables: args.tables.clone(),
            on_conflict,
            exclude_schema: args.exclude_schema,
        },
    )?;

    match (&args.output, args.max_statements) {
        (None, None) => {
            for statement in &statements {
                println!("{statement};");
            }
        }
        (None, Some(_)) => {
            return Err(Error::Validation(
                "--max-statements requires --output".to_string(),
            ));
        }
        (Some(output), None) => {
            write_script(output, &statements)?;
            if !quiet {
                println!(
                    "{} {} statements to {}",
                    "Dumped".green(),
                    statements.len(),
                    output.display()
                );
            }
        }
        (Some(output), Some(max)) => {
            let parts = split_statements(&statements, max);
            for (index, part) in parts.iter().enumerate() {
                let path = part_path(output, index + 1);
                write_script(&path, part)?;
                if !quiet {
                    println!(
                        "{} part {} ({} statements) to {}",
                        "Dumped".green(),
                        index + 1,
                        part.len(),
                        path.display()
                    );
                }
            }
        }
    }
    Ok(())
}

fn write_script(path: &Path, statements: &[String]) -> Result<()> {
    let mut script = String::new();
    for statement in statements {
        script.push_str(statement);
        script.push_str(";\n");
    }
    fs::write(path, script)?;
    Ok(())
}

/// `name.sql` with part 2 becomes `name-part2.sql`.
fn part_path(base: &Path, part: usize) -> PathBuf {
    let stem = base
        .file_stem()
        .map_or_else(|| "dump".to_string(), |s| s.to_string_lossy().to_string());
    let extension = base
        .extension()
        .map_or_else(|| "sql".to_string(), |e| e.to_string_lossy().to_string());
    base.with_file_name(format!("{stem}-part{part}.{extension}"))
}

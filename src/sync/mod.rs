//! Export/import and cross-engine dump.
//!
//! - [`export`] - Self-describing JSON dump of one project
//! - [`import`] - Append-merge of a JSON dump into the current database
//! - [`dump`] - SQL script emission for migration between engines

pub mod dump;
pub mod export;
pub mod import;

pub use dump::{dump_statements, DumpOptions, OnConflict};
pub use export::{export_project, ProjectDump};
pub use import::import_dump;

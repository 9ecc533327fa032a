//! sqlew - shared context store for cooperating AI coding agents.
//!
//! A long-lived, local-first service recording decisions, constraints,
//! tasks, file-change events, and agent messages across sessions, exposed
//! over a tool-call interface.
//!
//! # Architecture
//!
//! - [`cli`] - Command-line interface using clap
//! - [`model`] - Data types (decisions, constraints, tasks, projects)
//! - [`storage`] - The storage & coordination engine (SQLite + dialects)
//! - [`queue`] - File-based hook queue with watcher-driven drains
//! - [`backend`] - Tool-call dispatch, local engine, remote fallback
//! - [`sync`] - JSON export/import and cross-engine SQL dump
//! - [`config`] - Layered TOML configuration
//! - [`error`] - Error types and handling

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod cli;
pub mod config;
pub mod error;
pub mod model;
pub mod queue;
pub mod storage;
pub mod sync;

pub use error::{Error, Result};
